use axum::extract::{Query, State};
use axum::Json;
use common::smartico::DateRange;
use std::sync::Arc;
use tracing::error;

use crate::aggregation::history;
use crate::api::{AppState, HistoryResponse};
use crate::metrics::record_aggregation;

pub async fn overview_history(
    State(state): State<Arc<AppState>>,
    Query(range): Query<DateRange>,
) -> Json<HistoryResponse> {
    let task_state = Arc::clone(&state);
    let joined = tokio::spawn(async move {
        history::overview_history(&task_state.client, &range, &task_state.exclusion).await
    })
    .await;

    let history = match joined {
        Ok(history) => {
            record_aggregation("overview_history", "ok", history.len());
            history
        }
        Err(e) => {
            error!(error = %e, "overview history failed");
            record_aggregation("overview_history", "error", 0);
            Vec::new()
        }
    };
    Json(HistoryResponse { history })
}
