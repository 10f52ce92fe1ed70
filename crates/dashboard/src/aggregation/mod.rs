pub mod affiliates;
pub mod history;
pub mod players;

use common::config::AggregationConfig;

/// Identifies the system/default affiliate that is kept out of every total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionRule {
    pub sentinel_id: i64,
    pub username_marker: String,
}

impl ExclusionRule {
    pub fn from_config(config: &AggregationConfig) -> Self {
        Self {
            sentinel_id: config.sentinel_affiliate_id,
            username_marker: config.sentinel_username_marker.clone(),
        }
    }

    pub fn is_sentinel_id(&self, id: Option<i64>) -> bool {
        id == Some(self.sentinel_id)
    }

    pub fn excludes(&self, id: Option<i64>, username: Option<&str>) -> bool {
        self.is_sentinel_id(id)
            || (!self.username_marker.is_empty()
                && username.is_some_and(|u| u.contains(self.username_marker.as_str())))
    }
}

/// Affiliate id of a report row, whether sent as a number or a string.
pub(crate) fn row_affiliate_id(row: &serde_json::Value) -> Option<i64> {
    common::fields::resolve_id(row, "affiliate_id")?.trim().parse().ok()
}

#[cfg(test)]
pub(crate) fn test_rule() -> ExclusionRule {
    ExclusionRule {
        sentinel_id: 468904,
        username_marker: "DEFAULT".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_excludes_sentinel_id_and_marker() {
        let rule = test_rule();
        assert!(rule.excludes(Some(468904), Some("real_name")));
        assert!(rule.excludes(Some(1), Some("DEFAULT_AFF")));
        assert!(rule.excludes(None, Some("xDEFAULTx")));
        assert!(!rule.excludes(Some(1), Some("default")));
        assert!(!rule.excludes(Some(1), None));
    }

    #[test]
    fn test_empty_marker_matches_nothing() {
        let rule = ExclusionRule {
            sentinel_id: 1,
            username_marker: String::new(),
        };
        assert!(!rule.excludes(Some(2), Some("anything")));
    }

    #[test]
    fn test_row_affiliate_id_number_or_string() {
        assert_eq!(row_affiliate_id(&json!({"affiliate_id": 7})), Some(7));
        assert_eq!(row_affiliate_id(&json!({"affiliate_id": "7"})), Some(7));
        assert_eq!(row_affiliate_id(&json!({"affiliate_id": "abc"})), None);
        assert_eq!(row_affiliate_id(&json!({})), None);
    }
}
