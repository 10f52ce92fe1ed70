use chrono::NaiveDate;
use common::fields::Metric;
use common::types::ApiAffiliateProfile;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AffiliateStatus {
    Active,
    Pending,
    Blocked,
    Unknown,
}

impl AffiliateStatus {
    pub fn from_upstream(name: Option<&str>) -> Self {
        match name {
            Some("Approved") => Self::Active,
            Some("Pending") => Self::Pending,
            Some("Blocked") => Self::Blocked,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AffiliateProfile {
    pub id: i64,
    pub display_name: String,
    pub username: Option<String>,
    pub manager: String,
    pub country: String,
    pub deal_group: String,
    pub status: AffiliateStatus,
    pub email: String,
    pub phone: String,
    pub messaging_handle: String,
    pub full_name: String,
    pub balance: f64,
    pub total_paid: f64,
    pub label: String,
    pub created_at: Option<String>,
}

fn default_display_name(id: i64) -> String {
    format!("Affiliate {id}")
}

fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl AffiliateProfile {
    /// Minimal profile for an affiliate that shows up in the report but not
    /// in the profile listing.
    pub fn synthesized(id: i64, username: Option<&str>) -> Self {
        Self {
            id,
            display_name: non_blank(username).unwrap_or_else(|| default_display_name(id)),
            username: username.map(str::to_string),
            manager: "No manager".to_string(),
            country: "Global".to_string(),
            deal_group: "Default".to_string(),
            status: AffiliateStatus::Active,
            email: String::new(),
            phone: String::new(),
            messaging_handle: String::new(),
            full_name: String::new(),
            balance: 0.0,
            total_paid: 0.0,
            label: String::new(),
            created_at: None,
        }
    }

    pub fn from_api(id: i64, p: &ApiAffiliateProfile) -> Self {
        Self {
            id,
            display_name: non_blank(p.username.as_deref())
                .unwrap_or_else(|| default_display_name(id)),
            username: p.username.clone(),
            manager: non_blank(p.manager_username.as_deref())
                .unwrap_or_else(|| "No manager".to_string()),
            country: non_blank(p.country.as_deref()).unwrap_or_else(|| "Global".to_string()),
            deal_group: p
                .default_deal_info
                .as_ref()
                .and_then(|d| non_blank(d.deal_group_name.as_deref()))
                .unwrap_or_else(|| "Default".to_string()),
            status: AffiliateStatus::from_upstream(p.aff_status_name.as_deref()),
            email: p.bo_user_email.clone().unwrap_or_default(),
            phone: p.phone_number.clone().unwrap_or_default(),
            messaging_handle: p.skype.clone().unwrap_or_default(),
            full_name: p.full_name(),
            balance: p.balance.unwrap_or(0.0),
            total_paid: p.payments.unwrap_or(0.0),
            label: p.label_name.clone().unwrap_or_default(),
            created_at: p
                .create_date
                .as_deref()
                .and_then(|d| common::fields::resolve_date(&Value::String(d.to_string()))),
        }
    }
}

/// Additive per-period KPIs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PeriodMetrics {
    pub registrations: i64,
    pub ftds: i64,
    pub commission: f64,
    pub net_pnl: f64,
}

impl PeriodMetrics {
    pub fn add_row(&mut self, row: &Value) {
        self.registrations += Metric::Registrations.read(row) as i64;
        self.ftds += Metric::Ftds.read(row) as i64;
        self.commission += Metric::Commission.read(row);
        self.net_pnl += Metric::NetPnl.read(row);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AffiliateAggregate {
    #[serde(flatten)]
    pub profile: AffiliateProfile,
    #[serde(flatten)]
    pub metrics: PeriodMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerActivity {
    pub player_id: String,
    pub username: String,
    pub country: String,
    pub registered_at: Option<NaiveDate>,
    pub ftd_date: Option<NaiveDate>,
    pub ftd_amount: f64,
    pub deposits_count: i64,
    pub withdrawals: f64,
    pub net_pl: f64,
    pub volume: f64,
    pub qualified_cpa: bool,
}

impl PlayerActivity {
    pub fn new(player_id: String, username: Option<&str>, country: Option<&str>) -> Self {
        Self {
            player_id,
            username: username.unwrap_or("-").to_string(),
            country: country.unwrap_or("BR").to_string(),
            registered_at: None,
            ftd_date: None,
            ftd_amount: 0.0,
            deposits_count: 0,
            withdrawals: 0.0,
            net_pl: 0.0,
            volume: 0.0,
            qualified_cpa: false,
        }
    }

    /// No registration, no FTD, no P&L and no deposits in the window.
    pub fn is_inactive(&self) -> bool {
        self.registered_at.is_none()
            && self.ftd_date.is_none()
            && self.net_pl == 0.0
            && self.deposits_count == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyHistoryPoint {
    pub date: String,
    #[serde(flatten)]
    pub metrics: PeriodMetrics,
}
