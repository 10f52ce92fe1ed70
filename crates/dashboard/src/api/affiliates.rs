use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::smartico::DateRange;
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::aggregation::{affiliates, history, players};
use crate::api::{ApiError, AppState, HistoryResponse};
use crate::metrics::record_aggregation;
use crate::models::{AffiliateAggregate, PlayerActivity};

#[derive(Serialize)]
pub struct AffiliatesResponse {
    pub affiliates: Vec<AffiliateAggregate>,
}

#[derive(Serialize)]
pub struct PlayersResponse {
    pub players: Vec<PlayerActivity>,
}

/// Aggregations run on their own task so a disconnecting client does not cut
/// an upstream page loop short.
pub async fn list_affiliates(
    State(state): State<Arc<AppState>>,
    Query(range): Query<DateRange>,
) -> Response {
    let task_state = Arc::clone(&state);
    let joined = tokio::spawn(async move {
        affiliates::build_affiliate_list(
            &task_state.client,
            &range,
            &task_state.pages,
            &task_state.exclusion,
        )
        .await
    })
    .await;

    match joined {
        Ok(list) => {
            record_aggregation("affiliates", "ok", list.len());
            Json(AffiliatesResponse { affiliates: list }).into_response()
        }
        Err(e) => {
            error!(error = %e, "affiliate aggregation failed");
            record_aggregation("affiliates", "error", 0);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError {
                    error: "internal error".to_string(),
                }),
            )
                .into_response()
        }
    }
}

pub async fn list_players(
    State(state): State<Arc<AppState>>,
    Path(affiliate_id): Path<String>,
    Query(range): Query<DateRange>,
) -> Json<PlayersResponse> {
    let task_state = Arc::clone(&state);
    let task_id = affiliate_id.clone();
    let joined = tokio::spawn(async move {
        players::build_player_report(&task_state.client, &task_id, &range, &task_state.players)
            .await
    })
    .await;

    let players = match joined {
        Ok(players) => {
            record_aggregation("players", "ok", players.len());
            players
        }
        Err(e) => {
            error!(affiliate_id = %affiliate_id, error = %e, "player aggregation failed");
            record_aggregation("players", "error", 0);
            Vec::new()
        }
    };
    Json(PlayersResponse { players })
}

pub async fn affiliate_history(
    State(state): State<Arc<AppState>>,
    Path(affiliate_id): Path<String>,
    Query(range): Query<DateRange>,
) -> Json<HistoryResponse> {
    let task_state = Arc::clone(&state);
    let task_id = affiliate_id.clone();
    let joined = tokio::spawn(async move {
        history::affiliate_history(&task_state.client, &task_id, &range).await
    })
    .await;

    let history = match joined {
        Ok(history) => {
            record_aggregation("affiliate_history", "ok", history.len());
            history
        }
        Err(e) => {
            error!(affiliate_id = %affiliate_id, error = %e, "affiliate history failed");
            record_aggregation("affiliate_history", "error", 0);
            Vec::new()
        }
    };
    Json(HistoryResponse { history })
}
