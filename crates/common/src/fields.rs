//! Lookup of loosely-typed fields in upstream report rows.
//!
//! The Smartico report endpoint is not consistent about field names: the same
//! metric can arrive as `registration_count` on one row and `RegistrationCount`
//! on another, and numbers can arrive as JSON strings. Everything that reads a
//! metric out of a raw row goes through this module.

use serde_json::Value;

/// Keys probed, in order, when looking for a row's calendar date.
const DATE_KEYS: [&str; 6] = ["dt", "period_date", "PeriodDate", "date", "Date", "day"];

/// Minimum length of a usable date string (`YYYY-MM-DD`).
const MIN_DATE_LEN: usize = 10;

/// Numeric report metrics and their ordered alias lists. snake_case comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Registrations,
    Ftds,
    Commission,
    NetPnl,
    Deposits,
    DepositCount,
    Withdrawals,
    /// Player-level P&L, which may be split per vertical.
    PlayerNetPnl,
    Volume,
}

impl Metric {
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Registrations => &["registration_count", "RegistrationCount"],
            Self::Ftds => &["ftd_count", "FtdCount"],
            Self::Commission => &["commissions_total", "CommissionsTotal"],
            Self::NetPnl => &["net_pl", "NetPL"],
            Self::Deposits => &["deposit_total", "deposits"],
            Self::DepositCount => &["deposit_count"],
            Self::Withdrawals => &["withdrawal_total", "withdrawals"],
            Self::PlayerNetPnl => &["net_pl", "net_pl_casino", "net_pl_sport"],
            Self::Volume => &["volume", "turnover"],
        }
    }

    pub fn read(self, record: &Value) -> f64 {
        resolve_numeric(Some(record), self.aliases())
    }
}

/// First non-null alias, coerced to a number. Absent records and missing
/// aliases read as zero.
pub fn resolve_numeric(record: Option<&Value>, aliases: &[&str]) -> f64 {
    let Some(record) = record else {
        return 0.0;
    };
    aliases
        .iter()
        .filter_map(|key| record.get(key))
        .find(|v| !v.is_null())
        .map_or(0.0, coerce_number)
}

/// Calendar date (`YYYY-MM-DD`) carried by a row, with any time part dropped.
pub fn resolve_date(record: &Value) -> Option<String> {
    match record {
        Value::String(s) if !s.is_empty() => Some(date_part(s).to_string()),
        Value::Object(_) => DATE_KEYS
            .iter()
            .filter_map(|key| record.get(key).and_then(Value::as_str))
            .find(|s| s.chars().count() >= MIN_DATE_LEN)
            .map(|s| date_part(s).to_string()),
        _ => None,
    }
}

/// An identifier that upstream sends as either a JSON number or a string.
pub fn resolve_id(record: &Value, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Optional string field; blank strings count as absent.
pub fn resolve_text<'a>(record: &'a Value, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Everything before the time part, whether it follows `T` or a space.
fn date_part(s: &str) -> &str {
    s.split(['T', ' ']).next().unwrap_or(s)
}

fn coerce_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
            }
        }
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => 0.0,
    }
}
