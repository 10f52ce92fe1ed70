//! Per-player activity for one affiliate, rebuilt from day-level report rows.

use chrono::NaiveDate;
use common::fields::{resolve_date, resolve_id, resolve_text, Metric};
use common::smartico::{DateRange, ReportPager, ReportQuery};
use common::types::AggregationPeriod;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{error, info};

use crate::models::PlayerActivity;

const GROUP_BY: &str = "affiliate_id,registration_id,ext_customer_id,username,day";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSettings {
    pub ftd_fallback_amount: f64,
    pub report_limit: u32,
}

/// External customer id, or the registration id when the external one is
/// missing or a placeholder.
pub fn resolve_player_id(row: &Value) -> Option<String> {
    let usable = |id: &String| {
        let trimmed = id.trim();
        !trimmed.is_empty() && trimmed != "0" && trimmed != "null"
    };
    if let Some(ext) = resolve_id(row, "ext_customer_id").filter(usable) {
        return Some(ext);
    }
    resolve_id(row, "registration_id").filter(|id| !id.is_empty() && id != "null")
}

/// A row belongs to another affiliate only if it names one explicitly.
fn belongs_to_other_affiliate(row: &Value, affiliate_id: &str) -> bool {
    match resolve_id(row, "affiliate_id") {
        Some(id) if !id.is_empty() && id != "0" => id.trim() != affiliate_id.trim(),
        _ => false,
    }
}

fn row_date(row: &Value) -> Option<NaiveDate> {
    resolve_date(row)
        .and_then(|d| {
            NaiveDate::parse_and_remainder(&d, "%Y-%m-%d")
                .ok()
                .map(|(date, _)| date)
        })
}

fn keep_earliest(slot: &mut Option<NaiveDate>, date: NaiveDate) -> bool {
    match slot {
        Some(existing) if *existing <= date => false,
        _ => {
            *slot = Some(date);
            true
        }
    }
}

fn apply_row(player: &mut PlayerActivity, row: &Value, ftd_fallback_amount: f64) {
    let registrations = Metric::Registrations.read(row);
    let ftds = Metric::Ftds.read(row);
    let deposits = Metric::Deposits.read(row);

    if let Some(date) = row_date(row) {
        if registrations > 0.0 {
            keep_earliest(&mut player.registered_at, date);
        }
        if ftds > 0.0 && keep_earliest(&mut player.ftd_date, date) && player.ftd_amount == 0.0 {
            player.ftd_amount = if deposits == 0.0 {
                ftd_fallback_amount
            } else {
                deposits
            };
        }
    }

    player.deposits_count += Metric::DepositCount.read(row) as i64;
    player.withdrawals += Metric::Withdrawals.read(row);
    player.net_pl += Metric::PlayerNetPnl.read(row);
    player.volume += Metric::Volume.read(row);

    if player.ftd_date.is_some() {
        player.qualified_cpa = true;
    }
}

/// Fold day rows into one activity record per player, most recent first.
pub fn aggregate_players(
    affiliate_id: &str,
    rows: &[Value],
    ftd_fallback_amount: f64,
) -> Vec<PlayerActivity> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut players: Vec<PlayerActivity> = Vec::new();

    for row in rows {
        if belongs_to_other_affiliate(row, affiliate_id) {
            continue;
        }
        let Some(player_id) = resolve_player_id(row) else {
            continue;
        };

        let i = *index.entry(player_id.clone()).or_insert_with(|| {
            players.push(PlayerActivity::new(
                player_id,
                resolve_text(row, "username"),
                resolve_text(row, "country"),
            ));
            players.len() - 1
        });
        apply_row(&mut players[i], row, ftd_fallback_amount);
    }

    players.retain(|p| !p.is_inactive());
    // Undated players sort last.
    players.sort_by(|a, b| {
        let recency = |p: &PlayerActivity| p.registered_at.or(p.ftd_date);
        recency(b).cmp(&recency(a))
    });
    players
}

/// `GET /api/affiliates/{id}/players`. Upstream failures are logged and
/// reported as an empty list.
pub async fn build_player_report<P: ReportPager + Sync>(
    pager: &P,
    affiliate_id: &str,
    range: &DateRange,
    settings: &PlayerSettings,
) -> Vec<PlayerActivity> {
    let query = ReportQuery::new(AggregationPeriod::Day, GROUP_BY, range)
        .for_affiliate(affiliate_id)
        .with_limit(settings.report_limit);

    let rows = match pager.fetch_report_once(&query).await {
        Ok(rows) => rows,
        Err(e) => {
            error!(affiliate_id, error = %e, "player report fetch failed");
            return Vec::new();
        }
    };

    let players = aggregate_players(affiliate_id, &rows, settings.ftd_fallback_amount);
    info!(
        affiliate_id,
        rows = rows.len(),
        players = players.len(),
        "player report built"
    );
    players
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::smartico::UpstreamError;
    use serde_json::json;

    fn date(s: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
    }

    #[test]
    fn test_player_id_falls_back_to_registration_id() {
        let row = json!({"ext_customer_id": "0", "registration_id": "R1"});
        assert_eq!(resolve_player_id(&row).as_deref(), Some("R1"));

        for placeholder in [json!(null), json!("null"), json!("  "), json!(0)] {
            let row = json!({"ext_customer_id": placeholder, "registration_id": 55});
            assert_eq!(resolve_player_id(&row).as_deref(), Some("55"));
        }
    }

    #[test]
    fn test_player_id_prefers_external_id() {
        let row = json!({"ext_customer_id": "C-9", "registration_id": "R1"});
        assert_eq!(resolve_player_id(&row).as_deref(), Some("C-9"));
    }

    #[test]
    fn test_player_id_unresolvable() {
        assert_eq!(resolve_player_id(&json!({"ext_customer_id": "0"})), None);
        assert_eq!(
            resolve_player_id(&json!({"ext_customer_id": "", "registration_id": "null"})),
            None
        );
    }

    #[test]
    fn test_earliest_dates_win_regardless_of_row_order() {
        let rows = vec![
            json!({"ext_customer_id": "P", "dt": "2024-01-10", "registration_count": 1}),
            json!({"ext_customer_id": "P", "dt": "2024-01-03T00:00:00", "registration_count": 1}),
            json!({"ext_customer_id": "P", "dt": "2024-01-07", "registration_count": 1}),
            json!({"ext_customer_id": "P", "dt": "2024-01-09", "ftd_count": 1, "deposit_total": 40}),
            json!({"ext_customer_id": "P", "dt": "2024-01-05", "ftd_count": 1, "deposit_total": 25}),
            json!({"ext_customer_id": "P", "dt": "2024-01-01", "registration_count": 0}),
        ];
        let players = aggregate_players("7", &rows, 10.0);
        assert_eq!(players.len(), 1);
        let p = &players[0];
        assert_eq!(p.registered_at, date("2024-01-03"));
        assert_eq!(p.ftd_date, date("2024-01-05"));
        // Amount comes from the first FTD row seen and is never replaced.
        assert_eq!(p.ftd_amount, 40.0);
        assert!(p.qualified_cpa);
    }

    #[test]
    fn test_ftd_amount_fallback_when_deposit_zero() {
        let rows = vec![json!({"ext_customer_id": "P", "dt": "2024-02-01", "ftd_count": 1})];
        let players = aggregate_players("7", &rows, 12.5);
        assert_eq!(players[0].ftd_amount, 12.5);
    }

    #[test]
    fn test_space_separated_timestamp_sets_dates() {
        let rows = vec![json!({
            "ext_customer_id": "P",
            "dt": "2024-01-05 00:00:00",
            "registration_count": 1,
            "ftd_count": 1,
            "deposit_total": 30
        })];
        let players = aggregate_players("7", &rows, 10.0);
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].registered_at, date("2024-01-05"));
        assert_eq!(players[0].ftd_date, date("2024-01-05"));
        assert_eq!(players[0].ftd_amount, 30.0);
    }

    #[test]
    fn test_row_date_ignores_trailing_text() {
        assert_eq!(
            row_date(&json!({"dt": "2024-01-05+03:00"})),
            date("2024-01-05")
        );
        assert_eq!(row_date(&json!({"dt": "not-a-date"})), None);
    }

    #[test]
    fn test_totals_accumulate_across_rows() {
        let rows = vec![
            json!({"ext_customer_id": "P", "deposit_count": 2, "withdrawal_total": 5, "net_pl": 10, "volume": 100}),
            json!({"ext_customer_id": "P", "deposit_count": 1, "withdrawals": 3, "net_pl_casino": -4, "turnover": 50}),
        ];
        let players = aggregate_players("7", &rows, 10.0);
        let p = &players[0];
        assert_eq!(p.deposits_count, 3);
        assert_eq!(p.withdrawals, 8.0);
        assert_eq!(p.net_pl, 6.0);
        assert_eq!(p.volume, 150.0);
        assert!(!p.qualified_cpa);
        assert_eq!(p.ftd_amount, 0.0);
    }

    #[test]
    fn test_rows_for_other_affiliates_are_dropped() {
        let rows = vec![
            json!({"affiliate_id": 8, "ext_customer_id": "A", "net_pl": 1}),
            json!({"affiliate_id": "7", "ext_customer_id": "B", "net_pl": 1}),
            json!({"ext_customer_id": "C", "net_pl": 1}),
        ];
        let players = aggregate_players("7", &rows, 10.0);
        let mut ids: Vec<&str> = players.iter().map(|p| p.player_id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["B", "C"]);
    }

    #[test]
    fn test_inactive_players_are_dropped() {
        let rows = vec![
            json!({"ext_customer_id": "idle", "dt": "2024-01-01", "volume": 500}),
            json!({"ext_customer_id": "busy", "deposit_count": 1}),
        ];
        let players = aggregate_players("7", &rows, 10.0);
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].player_id, "busy");
    }

    #[test]
    fn test_sorted_most_recent_first() {
        let rows = vec![
            json!({"ext_customer_id": "old", "dt": "2024-01-01", "registration_count": 1}),
            json!({"ext_customer_id": "undated", "net_pl": 3}),
            json!({"ext_customer_id": "ftd_only", "dt": "2024-01-20", "ftd_count": 1}),
            json!({"ext_customer_id": "new", "dt": "2024-01-15", "registration_count": 1}),
        ];
        let players = aggregate_players("7", &rows, 10.0);
        let ids: Vec<&str> = players.iter().map(|p| p.player_id.as_str()).collect();
        assert_eq!(ids, vec!["ftd_only", "new", "old", "undated"]);
    }

    #[test]
    fn test_username_and_country_from_first_row() {
        let rows = vec![
            json!({"ext_customer_id": "P", "username": "joe", "country": "PT", "net_pl": 1}),
            json!({"ext_customer_id": "P", "username": "other", "country": "ES", "net_pl": 1}),
        ];
        let players = aggregate_players("7", &rows, 10.0);
        assert_eq!(players[0].username, "joe");
        assert_eq!(players[0].country, "PT");
    }

    struct FailingPager;

    impl ReportPager for FailingPager {
        async fn fetch_report_page(
            &self,
            _query: &ReportQuery,
            _limit: u32,
            _offset: u32,
        ) -> Result<Vec<Value>, UpstreamError> {
            Err(UpstreamError::Status {
                status: 500,
                body: String::new(),
            })
        }

        async fn fetch_report_once(&self, _query: &ReportQuery) -> Result<Vec<Value>, UpstreamError> {
            Err(UpstreamError::Status {
                status: 500,
                body: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_upstream_failure_yields_empty_report() {
        let settings = PlayerSettings {
            ftd_fallback_amount: 10.0,
            report_limit: 3000,
        };
        let players =
            build_player_report(&FailingPager, "7", &DateRange::default(), &settings).await;
        assert!(players.is_empty());
    }
}
