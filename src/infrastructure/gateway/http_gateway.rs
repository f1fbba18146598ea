use crate::application::ports::RemoteGateway;
use crate::domain::entities::{ScanLog, SyncAction};
use crate::shared::config::GatewayConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanTicketRequest<'a> {
    qr_payload: &'a str,
    scanner_id: &'a str,
}

/// `RemoteGateway` over the dashboard's REST API.
#[derive(Clone)]
pub struct HttpRemoteGateway {
    client: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpRemoteGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|err| AppError::ConfigurationError(format!("HTTP client: {err}")))?;
        Self::with_client(client, &config.base_url, config.auth_token.clone())
    }

    pub fn with_client(
        client: Client,
        base_url: &str,
        auth_token: Option<String>,
    ) -> Result<Self, AppError> {
        // 末尾スラッシュがないと join で最後のセグメントが置き換わる
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized).map_err(|err| {
            AppError::ConfigurationError(format!("Invalid gateway url `{base_url}`: {err}"))
        })?;

        Ok(Self {
            client,
            base_url,
            auth_token: auth_token.filter(|token| !token.trim().is_empty()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `GET /health`; any 2xx counts as reachable.
    pub async fn health(&self) -> Result<(), AppError> {
        let response = self
            .request(Method::GET, &["health"])?
            .send()
            .await
            .map_err(|err| AppError::Network(err.to_string()))?;
        check_status(response).await.map(|_| ())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, AppError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                AppError::ConfigurationError(format!(
                    "Gateway url `{}` cannot be a base",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<reqwest::RequestBuilder, AppError> {
        let url = self.endpoint(segments)?;
        let builder = self.client.request(method, url);
        Ok(match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }
}

#[async_trait]
impl RemoteGateway for HttpRemoteGateway {
    async fn scan_ticket(&self, qr_payload: &str, scanner_id: &str) -> Result<ScanLog, AppError> {
        let builder = self
            .request(Method::POST, &["tickets", "scan"])?
            .json(&ScanTicketRequest {
                qr_payload,
                scanner_id,
            });
        request_json(builder).await
    }

    async fn apply(&self, action: &SyncAction) -> Result<(), AppError> {
        let builder = match action {
            SyncAction::SaveRecord { collection, record } => {
                let id = crate::domain::entities::sync_action::record_id(record).ok_or_else(
                    || AppError::ValidationError(format!("Record for `{collection}` has no id")),
                )?;
                self.request(Method::PUT, &[collection.as_str(), id])?
                    .json(record)
            }
            SyncAction::DeleteRecord { collection, id } => {
                self.request(Method::DELETE, &[collection.as_str(), id])?
            }
            SyncAction::RecordScan { scan_log } => {
                self.request(Method::POST, &["scan-logs"])?.json(scan_log)
            }
            SyncAction::UpdateSettings { settings } => {
                self.request(Method::PUT, &["settings"])?.json(settings)
            }
        };

        request_empty(builder).await?;
        tracing::debug!(target: "gateway::http", action = action.name(), "action applied");
        Ok(())
    }
}

async fn request_json<T: DeserializeOwned>(
    builder: reqwest::RequestBuilder,
) -> Result<T, AppError> {
    let response = builder
        .send()
        .await
        .map_err(|err| AppError::Network(err.to_string()))?;
    let body = check_status(response).await?;
    serde_json::from_str(&body).map_err(|err| AppError::DeserializationError(err.to_string()))
}

async fn request_empty(builder: reqwest::RequestBuilder) -> Result<(), AppError> {
    let response = builder
        .send()
        .await
        .map_err(|err| AppError::Network(err.to_string()))?;
    check_status(response).await.map(|_| ())
}

async fn check_status(response: reqwest::Response) -> Result<String, AppError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| AppError::Network(err.to_string()))?;
    if status.is_success() {
        return Ok(body);
    }

    let message = error_message(&body).unwrap_or_else(|| body.trim().to_string());
    tracing::warn!(
        target: "gateway::http",
        status = status.as_u16(),
        message = %message,
        "gateway request rejected"
    );
    if status == StatusCode::UNAUTHORIZED {
        return Err(AppError::Unauthorized(if message.is_empty() {
            "Gateway session rejected".to_string()
        } else {
            message
        }));
    }
    Err(AppError::Network(format!("Gateway error ({status}): {message}")))
}

/// Pulls `message` or `error` out of a JSON error body.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(base: &str) -> HttpRemoteGateway {
        HttpRemoteGateway::with_client(Client::new(), base, Some("token".into())).unwrap()
    }

    #[test]
    fn endpoints_are_joined_under_the_base_path() {
        let gateway = gateway("https://api.example.com/v1");
        assert_eq!(
            gateway.endpoint(&["tickets", "scan"]).unwrap().as_str(),
            "https://api.example.com/v1/tickets/scan"
        );
        assert_eq!(
            gateway.endpoint(&["ticket-types", "tt-1"]).unwrap().as_str(),
            "https://api.example.com/v1/ticket-types/tt-1"
        );
    }

    #[test]
    fn record_ids_are_percent_encoded() {
        let gateway = gateway("https://api.example.com/");
        assert_eq!(
            gateway.endpoint(&["events", "a/b c"]).unwrap().as_str(),
            "https://api.example.com/events/a%2Fb%20c"
        );
    }

    #[test]
    fn blank_token_is_ignored() {
        let gateway =
            HttpRemoteGateway::with_client(Client::new(), "http://localhost:8080", Some(" ".into()))
                .unwrap();
        assert!(gateway.auth_token.is_none());
    }

    #[test]
    fn invalid_base_url_is_a_configuration_error() {
        let err = HttpRemoteGateway::with_client(Client::new(), "not a url", None)
            .err()
            .unwrap();
        assert!(matches!(err, AppError::ConfigurationError(_)));
    }

    #[test]
    fn error_message_prefers_json_fields() {
        assert_eq!(
            error_message(r#"{"message":"token expired"}"#).as_deref(),
            Some("token expired")
        );
        assert_eq!(
            error_message(r#"{"error":"bad request"}"#).as_deref(),
            Some("bad request")
        );
        assert_eq!(error_message("plain text"), None);
    }
}
