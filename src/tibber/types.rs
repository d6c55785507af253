//! Wire and domain types for the Tibber GraphQL API

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Qualitative price level relative to the trailing three-day average
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceLevel {
    VeryCheap,
    Cheap,
    Normal,
    Expensive,
    VeryExpensive,
}

// Unknown labels read as Normal instead of failing the whole price series
impl<'de> Deserialize<'de> for PriceLevel {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let label = String::deserialize(deserializer)?;
        Ok(PriceLevel::from_label(&label))
    }
}

impl PriceLevel {
    /// Map a wire label to a level; unknown labels read as `Normal`
    pub fn from_label(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "VERY_CHEAP" => Self::VeryCheap,
            "CHEAP" => Self::Cheap,
            "EXPENSIVE" => Self::Expensive,
            "VERY_EXPENSIVE" => Self::VeryExpensive,
            _ => Self::Normal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryCheap => "VERY_CHEAP",
            Self::Cheap => "CHEAP",
            Self::Normal => "NORMAL",
            Self::Expensive => "EXPENSIVE",
            Self::VeryExpensive => "VERY_EXPENSIVE",
        }
    }
}

/// A single hour's price quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceEntry {
    /// Start of the hour this quote covers
    pub starts_at: DateTime<FixedOffset>,

    /// Total price including taxes and fees
    pub total: f64,

    /// Energy component of the price
    pub energy: f64,

    /// Tax component of the price
    pub tax: f64,

    /// Qualitative level assigned by the provider
    pub level: PriceLevel,
}

/// Today's and tomorrow's hourly price series as published by the provider.
/// `tomorrow` is empty until the daily publication has happened.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceInfo {
    #[serde(default)]
    pub today: Vec<PriceEntry>,
    #[serde(default)]
    pub tomorrow: Vec<PriceEntry>,
}

/// One live measurement pushed over the subscription stream.
///
/// Most fields are nullable on the wire; a home without production hardware
/// never reports production values.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LiveMeasurement {
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub power: Option<f64>,
    pub power_production: Option<f64>,
    pub min_power: Option<f64>,
    pub average_power: Option<f64>,
    pub max_power: Option<f64>,
    pub accumulated_consumption: Option<f64>,
    pub accumulated_production: Option<f64>,
    pub accumulated_cost: Option<f64>,
    pub accumulated_reward: Option<f64>,
    pub currency: Option<String>,
    pub current_l1: Option<f64>,
    pub current_l2: Option<f64>,
    pub current_l3: Option<f64>,
    pub last_meter_consumption: Option<f64>,
    pub last_meter_production: Option<f64>,
}

/// One node of the consumption history
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionNode {
    pub from: DateTime<FixedOffset>,
    pub to: DateTime<FixedOffset>,
    pub consumption: Option<f64>,
    pub total_cost: Option<f64>,
    #[serde(default)]
    pub unit_cost: Option<f64>,
    #[serde(default)]
    pub unit_price: Option<f64>,
}

/// A page of consumption nodes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsumptionPage {
    #[serde(default)]
    pub nodes: Vec<ConsumptionNode>,
}

/// Daily and hourly consumption history
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsumptionData {
    pub daily: Option<ConsumptionPage>,
    pub hourly: Option<ConsumptionPage>,
}

/// Street address of a home
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub address1: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
}

/// Feature flags of a home
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeFeatures {
    pub real_time_consumption_enabled: Option<bool>,
}

/// Subscription status of a home
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HomeSubscription {
    pub status: Option<String>,
}

/// Home metadata as returned by the viewer queries
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Home {
    pub id: String,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub features: Option<HomeFeatures>,
    #[serde(default)]
    pub current_subscription: Option<HomeSubscription>,
}

impl Home {
    /// Whether the home has a live measurement feed available
    pub fn has_real_time_consumption(&self) -> bool {
        self.features
            .as_ref()
            .and_then(|f| f.real_time_consumption_enabled)
            .unwrap_or(false)
    }
}

/// Result of the push-notification mutation
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResult {
    pub successful: bool,
    pub pushed_to_number_of_devices: i64,
}

/// Viewer payload of the homes listing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomesViewer {
    #[serde(default)]
    pub homes: Vec<Home>,
    #[serde(default)]
    pub websocket_subscription_url: Option<String>,
}

/// Viewer payload of the single-home features query
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeViewer {
    pub home: Option<Home>,
    #[serde(default)]
    pub websocket_subscription_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HomesResponse {
    pub viewer: HomesViewer,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HomeFeaturesResponse {
    pub viewer: HomeViewer,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceInfoWrapper {
    #[serde(default)]
    pub price_info: Option<PriceInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSubscriptionWrapper {
    #[serde(default)]
    pub current_subscription: Option<PriceInfoWrapper>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceHomeWrapper {
    #[serde(default)]
    pub home: Option<PriceSubscriptionWrapper>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceInfoResponse {
    pub viewer: PriceHomeWrapper,
}

impl PriceInfoResponse {
    /// Unwrap the nested viewer envelope into the price info payload
    pub fn into_price_info(self) -> PriceInfo {
        self.viewer
            .home
            .and_then(|h| h.current_subscription)
            .and_then(|s| s.price_info)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsumptionHomeWrapper {
    #[serde(default)]
    pub home: Option<ConsumptionData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsumptionResponse {
    pub viewer: ConsumptionHomeWrapper,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub send_push_notification: PushResult,
}
