//! GraphQL-over-HTTPS client for the Tibber API

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::config::ApiConfig;
use crate::error::{HeliosError, Result};
use crate::logging::get_logger;
use crate::settings::{SettingsExt, SettingsStore};
use crate::tibber::queries;
use crate::tibber::types::{
    ConsumptionData, ConsumptionResponse, HomeFeaturesResponse, HomeViewer, HomesResponse,
    HomesViewer, PriceInfo, PriceInfoResponse, PushResponse, PushResult,
};

/// Structured error code the API reports for an invalid or rotated token
pub const ERROR_CODE_UNAUTHENTICATED: &str = "UNAUTHENTICATED";

/// Structured error code the API reports for an unknown home id
pub const ERROR_CODE_HOME_NOT_FOUND: &str = "HOME_NOT_FOUND";

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
    extensions: Option<GraphQlExtensions>,
}

#[derive(Debug, Deserialize)]
struct GraphQlExtensions {
    code: Option<String>,
}

/// Tibber GraphQL API client
///
/// The access token is resolved lazily on every request: an explicit token
/// from configuration wins, otherwise the shared token is re-read from the
/// settings store so external rotation is picked up without a restart.
pub struct ApiClient {
    cfg: ApiConfig,
    home_id: String,
    settings: Arc<dyn SettingsStore>,
    http: reqwest::Client,
    logger: crate::logging::StructuredLogger,
}

impl ApiClient {
    /// Create a new API client for one home
    pub fn new(
        cfg: ApiConfig,
        home_id: impl Into<String>,
        settings: Arc<dyn SettingsStore>,
    ) -> Result<Self> {
        let home_id = home_id.into();
        let logger = get_logger("api");
        logger.debug(&format!("Initialize API client for home {}", home_id));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;

        Ok(Self {
            cfg,
            home_id,
            settings,
            http,
            logger,
        })
    }

    /// Home id this client operates on
    pub fn home_id(&self) -> &str {
        &self.home_id
    }

    /// Resolve the access token: an explicit configuration token wins,
    /// otherwise the shared token is re-read from the settings store
    pub fn access_token(&self) -> Result<String> {
        if !self.cfg.access_token.trim().is_empty() {
            return Ok(self.cfg.access_token.trim().to_string());
        }
        self.settings
            .access_token()
            .ok_or_else(|| HeliosError::auth("Access token not set"))
    }

    /// Execute a GraphQL document and decode the `data` payload
    pub async fn request<T: DeserializeOwned>(&self, query: &str) -> Result<T> {
        let token = self.access_token()?;

        let response = self
            .http
            .post(&self.cfg.endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, &self.cfg.user_agent)
            .json(&json!({ "query": query, "variables": {} }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(HeliosError::auth(format!("API rejected token: {}", status)));
        }
        if !status.is_success() {
            return Err(HeliosError::api(format!("API error: {}", status)));
        }

        let envelope: GraphQlEnvelope<T> = response.json().await?;
        if let Some(errors) = envelope.errors
            && let Some(first) = errors.first()
        {
            return Err(map_graphql_error(first));
        }

        envelope
            .data
            .ok_or_else(|| HeliosError::api("Response contained no data"))
    }

    /// List all homes on the account, with the subscription endpoint
    pub async fn get_homes(&self) -> Result<HomesViewer> {
        self.logger.debug("Get homes");
        let response: HomesResponse = self.request(&queries::homes_query()).await.map_err(|e| {
            self.logger.error(&format!("Error while fetching home data: {}", e));
            e
        })?;
        Ok(response.viewer)
    }

    /// Fetch features of this client's home plus a fresh subscription endpoint
    pub async fn get_home_features(&self) -> Result<HomeViewer> {
        self.logger
            .debug(&format!("Get features for home {}", self.home_id));
        let response: HomeFeaturesResponse = self
            .request(&queries::home_features_query(&self.home_id))
            .await
            .map_err(|e| {
                self.logger
                    .error(&format!("Error while fetching home features: {}", e));
                e
            })?;
        Ok(response.viewer)
    }

    /// Fetch today's and tomorrow's hourly prices
    pub async fn fetch_price_info(&self) -> Result<PriceInfo> {
        self.logger.debug("Get prices");
        let response: PriceInfoResponse = self
            .request(&queries::price_query(&self.home_id))
            .await
            .map_err(|e| {
                self.logger
                    .error(&format!("Error while fetching price data: {}", e));
                e
            })?;
        Ok(response.into_price_info())
    }

    /// Fetch consumption history at daily and hourly resolution
    pub async fn get_consumption(
        &self,
        days_to_fetch: u32,
        hours_to_fetch: u32,
    ) -> Result<ConsumptionData> {
        self.logger.debug(&format!(
            "Get consumption for {} days {} hours",
            days_to_fetch, hours_to_fetch
        ));
        let response: ConsumptionResponse = self
            .request(&queries::consumption_query(
                &self.home_id,
                days_to_fetch,
                hours_to_fetch,
            ))
            .await
            .map_err(|e| {
                self.logger
                    .error(&format!("Error while fetching consumption data: {}", e));
                e
            })?;
        Ok(response.viewer.home.unwrap_or_default())
    }

    /// Send a push notification to the account's devices
    pub async fn send_push(&self, title: &str, message: &str) -> Result<PushResult> {
        self.logger.debug("Send push notification");
        let response: PushResponse = self
            .request(&queries::push_notification_mutation(title, message))
            .await
            .map_err(|e| {
                self.logger
                    .error(&format!("Error sending push notification: {}", e));
                e
            })?;
        let result = response.send_push_notification;
        self.logger.info(&format!(
            "Push notification sent to {} devices",
            result.pushed_to_number_of_devices
        ));
        Ok(result)
    }
}

fn map_graphql_error(error: &GraphQlError) -> HeliosError {
    match error.extensions.as_ref().and_then(|e| e.code.as_deref()) {
        Some(ERROR_CODE_UNAUTHENTICATED) => HeliosError::auth(error.message.clone()),
        Some(ERROR_CODE_HOME_NOT_FOUND) => HeliosError::home_not_found(error.message.clone()),
        _ => HeliosError::api(error.message.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettings;

    fn envelope(json: &str) -> GraphQlEnvelope<serde_json::Value> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn graphql_error_codes_map_to_variants() {
        let env = envelope(
            r#"{"errors":[{"message":"bad token","extensions":{"code":"UNAUTHENTICATED"}}]}"#,
        );
        let err = map_graphql_error(&env.errors.unwrap()[0]);
        assert!(matches!(err, HeliosError::Auth { .. }));
        assert!(err.is_fatal_for_device());

        let env = envelope(
            r#"{"errors":[{"message":"no such home","extensions":{"code":"HOME_NOT_FOUND"}}]}"#,
        );
        let err = map_graphql_error(&env.errors.unwrap()[0]);
        assert!(matches!(err, HeliosError::HomeNotFound { .. }));

        let env = envelope(r#"{"errors":[{"message":"upstream hiccup"}]}"#);
        let err = map_graphql_error(&env.errors.unwrap()[0]);
        assert!(matches!(err, HeliosError::Api { .. }));
    }

    #[test]
    fn explicit_token_wins_over_settings() {
        let settings = Arc::new(MemorySettings::with_token("from-settings"));
        let cfg = ApiConfig {
            access_token: "from-config".to_string(),
            ..ApiConfig::default()
        };
        let client = ApiClient::new(cfg, "home-1", settings).unwrap();
        assert_eq!(client.access_token().unwrap(), "from-config");
    }

    #[test]
    fn token_is_reread_from_settings_between_requests() {
        let settings = Arc::new(MemorySettings::with_token("first"));
        let client = ApiClient::new(ApiConfig::default(), "home-1", settings.clone()).unwrap();
        assert_eq!(client.access_token().unwrap(), "first");

        settings.set_access_token("rotated").unwrap();
        assert_eq!(client.access_token().unwrap(), "rotated");
    }

    #[test]
    fn missing_token_is_an_auth_error() {
        let settings = Arc::new(MemorySettings::new());
        let client = ApiClient::new(ApiConfig::default(), "home-1", settings).unwrap();
        assert!(matches!(
            client.access_token(),
            Err(HeliosError::Auth { .. })
        ));
    }
}
