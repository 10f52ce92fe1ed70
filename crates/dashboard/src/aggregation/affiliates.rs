//! Affiliate list: profile listing merged with the monthly financial report.

use common::fields::resolve_text;
use common::smartico::{
    fetch_all_profiles, fetch_all_report_rows, DateRange, PageSettings, ProfilesPager, ReportPager,
    ReportQuery,
};
use common::types::{AggregationPeriod, ApiAffiliateProfile};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

use super::{row_affiliate_id, ExclusionRule};
use crate::models::{AffiliateAggregate, AffiliateProfile, PeriodMetrics};

const GROUP_BY: &str = "affiliate_id,username";

/// Aggregates keyed by affiliate id, kept in first-seen order.
#[derive(Debug, Default)]
struct AffiliateBook {
    index: HashMap<i64, usize>,
    rows: Vec<AffiliateAggregate>,
}

impl AffiliateBook {
    /// Insert or replace the profile for `profile.id`, keeping any metrics.
    fn put_profile(&mut self, profile: AffiliateProfile) {
        match self.index.get(&profile.id) {
            Some(&i) => self.rows[i].profile = profile,
            None => {
                self.index.insert(profile.id, self.rows.len());
                self.rows.push(AffiliateAggregate {
                    profile,
                    metrics: PeriodMetrics::default(),
                });
            }
        }
    }

    /// Existing aggregate for `id`, or a new one built from `make_profile`.
    fn upsert(
        &mut self,
        id: i64,
        make_profile: impl FnOnce() -> AffiliateProfile,
    ) -> &mut AffiliateAggregate {
        let i = *self.index.entry(id).or_insert_with(|| {
            self.rows.push(AffiliateAggregate {
                profile: make_profile(),
                metrics: PeriodMetrics::default(),
            });
            self.rows.len() - 1
        });
        &mut self.rows[i]
    }

    fn into_sorted(mut self) -> Vec<AffiliateAggregate> {
        // Stable: ties keep first-seen order.
        self.rows
            .sort_by(|a, b| b.metrics.net_pnl.total_cmp(&a.metrics.net_pnl));
        self.rows
    }
}

/// Merge raw profile and report rows into one aggregate per affiliate,
/// sorted by net P&L, highest first.
///
/// Pure over its inputs; calling it twice on the same pages gives the same list.
pub fn merge_affiliates(
    profiles: &[Value],
    report_rows: &[Value],
    rule: &ExclusionRule,
) -> Vec<AffiliateAggregate> {
    let mut book = AffiliateBook::default();

    for raw in profiles {
        let api: ApiAffiliateProfile = match serde_json::from_value(raw.clone()) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "skipping unreadable profile row");
                continue;
            }
        };
        let Some(id) = api.affiliate_id() else {
            continue;
        };
        if rule.excludes(Some(id), api.username.as_deref()) {
            continue;
        }
        book.put_profile(AffiliateProfile::from_api(id, &api));
    }

    for row in report_rows {
        let username = resolve_text(row, "username");
        let id = row_affiliate_id(row);
        if rule.excludes(id, username) {
            continue;
        }
        let Some(id) = id else {
            debug!("skipping report row without affiliate id");
            continue;
        };
        book.upsert(id, || AffiliateProfile::synthesized(id, username))
            .metrics
            .add_row(row);
    }

    book.into_sorted()
}

/// `GET /api/affiliates`: both upstream listings fetched concurrently, then merged.
pub async fn build_affiliate_list<P>(
    pager: &P,
    range: &DateRange,
    settings: &PageSettings,
    rule: &ExclusionRule,
) -> Vec<AffiliateAggregate>
where
    P: ProfilesPager + ReportPager + Sync,
{
    let query = ReportQuery::new(AggregationPeriod::Month, GROUP_BY, range);
    let (profiles, report_rows) = tokio::join!(
        fetch_all_profiles(pager, settings),
        fetch_all_report_rows(pager, &query, settings),
    );

    let list = merge_affiliates(&profiles, &report_rows, rule);
    info!(
        profiles = profiles.len(),
        report_rows = report_rows.len(),
        affiliates = list.len(),
        "affiliate list built"
    );
    list
}
