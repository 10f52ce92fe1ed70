use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationPeriod {
    Day,
    Month,
}

impl AggregationPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "DAY",
            Self::Month => "MONTH",
        }
    }
}

/// Affiliate row from the profile-listing endpoint (`/api/af2_aff_op`).
///
/// Upstream types are inconsistent: ids, names and money fields have been seen
/// as numbers, strings and occasionally objects. Every field goes through a
/// lenient deserializer so one odd field never costs the whole row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiAffiliateProfile {
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub affiliate_id: Option<String>,
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub username: Option<String>,
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub manager_username: Option<String>,
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub country: Option<String>,
    #[serde(deserialize_with = "de_opt_deal_info", default)]
    pub default_deal_info: Option<ApiDealInfo>,
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub aff_status_name: Option<String>,
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub bo_user_email: Option<String>,
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub phone_number: Option<String>,
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub skype: Option<String>,
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub first_name: Option<String>,
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub last_name: Option<String>,
    #[serde(deserialize_with = "de_opt_f64_any", default)]
    pub balance: Option<f64>,
    #[serde(deserialize_with = "de_opt_f64_any", default)]
    pub payments: Option<f64>,
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub label_name: Option<String>,
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub create_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiDealInfo {
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub deal_group_name: Option<String>,
}

impl ApiAffiliateProfile {
    pub fn affiliate_id(&self) -> Option<i64> {
        self.affiliate_id.as_deref()?.trim().parse().ok()
    }

    /// First and last name joined by a space, blanks skipped.
    pub fn full_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Deserialize a field that can be either a string or a number into Option<String>.
/// Booleans are stringified; arrays and objects are consumed and read as absent.
fn de_opt_string_any<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct StringOrNumber;

    impl<'de> de::Visitor<'de> for StringOrNumber {
        type Value = Option<String>;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a string or number")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            while seq.next_element::<de::IgnoredAny>()?.is_some() {}
            Ok(None)
        }

        fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            while map
                .next_entry::<de::IgnoredAny, de::IgnoredAny>()?
                .is_some()
            {}
            Ok(None)
        }
    }

    deserializer.deserialize_any(StringOrNumber)
}

/// Deal info is only read when upstream sends an object; any other shape is absent.
fn de_opt_deal_info<'de, D>(deserializer: D) -> Result<Option<ApiDealInfo>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(v @ serde_json::Value::Object(_)) => Ok(serde_json::from_value(v).ok()),
        _ => Ok(None),
    }
}

/// Money amounts: numbers as-is, numeric strings parsed, anything else absent.
fn de_opt_f64_any<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(de_opt_string_any(deserializer)?.and_then(|s| s.trim().parse::<f64>().ok()))
}
