use common::fields::{resolve_date, resolve_id};
use common::smartico::{DateRange, ReportPager, ReportQuery};
use common::types::AggregationPeriod;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::error;

use super::{row_affiliate_id, ExclusionRule};
use crate::models::{DailyHistoryPoint, PeriodMetrics};

/// Sum rows per calendar day, oldest day first. Rows without a date are skipped.
///
/// Upstream can split one day across several rows (one per country, say);
/// those are added together.
pub fn bucket_by_day<'a>(rows: impl IntoIterator<Item = &'a Value>) -> Vec<DailyHistoryPoint> {
    let mut days: BTreeMap<String, PeriodMetrics> = BTreeMap::new();
    for row in rows {
        let Some(date) = resolve_date(row) else {
            continue;
        };
        days.entry(date).or_default().add_row(row);
    }
    days.into_iter()
        .map(|(date, metrics)| DailyHistoryPoint { date, metrics })
        .collect()
}

async fn fetch_day_rows<P: ReportPager + Sync>(pager: &P, query: &ReportQuery) -> Vec<Value> {
    match pager.fetch_report_once(query).await {
        Ok(rows) => rows,
        Err(e) => {
            error!(group_by = %query.group_by, error = %e, "history fetch failed");
            Vec::new()
        }
    }
}

/// Daily series for one affiliate.
pub async fn affiliate_history<P: ReportPager + Sync>(
    pager: &P,
    affiliate_id: &str,
    range: &DateRange,
) -> Vec<DailyHistoryPoint> {
    let query =
        ReportQuery::new(AggregationPeriod::Day, "day,affiliate_id", range).for_affiliate(affiliate_id);
    let rows = fetch_day_rows(pager, &query).await;

    // The upstream filter has leaked other affiliates' rows before.
    let wanted = affiliate_id.trim();
    bucket_by_day(
        rows.iter()
            .filter(|row| resolve_id(row, "affiliate_id").is_some_and(|id| id.trim() == wanted)),
    )
}

/// Daily series across all affiliates except the sentinel one.
pub async fn overview_history<P: ReportPager + Sync>(
    pager: &P,
    range: &DateRange,
    rule: &ExclusionRule,
) -> Vec<DailyHistoryPoint> {
    let query = ReportQuery::new(AggregationPeriod::Day, "day", range);
    let rows = fetch_day_rows(pager, &query).await;

    bucket_by_day(
        rows.iter()
            .filter(|row| !rule.is_sentinel_id(row_affiliate_id(row))),
    )
}
