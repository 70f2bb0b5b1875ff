//! Provider API client.
//!
//! [`StripeClient`] is the boundary the engine programs against; it must stay
//! object-safe so tests and the daemon can hold an `Arc<dyn StripeClient>`.
//! [`HttpStripeClient`] is the production implementation: Bearer auth, pinned
//! API version, and a retry loop that absorbs rate limits and transient
//! transport faults before the engine ever sees them.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use ssync_config::{SecretString, SyncConfig};
use tracing::{debug, warn};

use crate::error::StripeError;
use crate::kinds::ObjectKind;
use crate::types::{ListPage, ListParams, WebhookEndpoint, WebhookEndpointCreate};

/// Attempts per logical call, including the first.
const MAX_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Abstract provider operations the engine requires.
#[async_trait]
pub trait StripeClient: Send + Sync {
    /// `GET /v1/account` — the acting account, as raw payload.
    async fn retrieve_account(&self) -> Result<Value, StripeError>;

    /// One page of a list call for `kind`.
    async fn list(&self, kind: ObjectKind, params: &ListParams) -> Result<ListPage, StripeError>;

    /// Single-object retrieve. `Ok(None)` when the provider reports 404.
    async fn retrieve(&self, kind: ObjectKind, id: &str) -> Result<Option<Value>, StripeError>;

    async fn create_webhook_endpoint(
        &self,
        req: &WebhookEndpointCreate,
    ) -> Result<WebhookEndpoint, StripeError>;

    async fn retrieve_webhook_endpoint(
        &self,
        id: &str,
    ) -> Result<Option<WebhookEndpoint>, StripeError>;

    /// Returns `false` when the endpoint was already gone.
    async fn delete_webhook_endpoint(&self, id: &str) -> Result<bool, StripeError>;

    /// One page of webhook endpoints; `bool` is `has_more`.
    async fn list_webhook_endpoints(
        &self,
        starting_after: Option<&str>,
    ) -> Result<(Vec<WebhookEndpoint>, bool), StripeError>;
}

/// Production client over reqwest.
pub struct HttpStripeClient {
    http: reqwest::Client,
    base: String,
    secret_key: SecretString,
    api_version: Option<String>,
}

impl HttpStripeClient {
    pub fn new(cfg: &SyncConfig) -> Result<Self, StripeError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| StripeError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base: cfg.stripe_api_base.trim_end_matches('/').to_string(),
            secret_key: cfg.stripe_secret_key.clone(),
            api_version: cfg.stripe_api_version.clone(),
        })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        form: Option<&[(String, String)]>,
    ) -> Result<Value, StripeError> {
        let url = format!("{}/{}", self.base, path);
        let mut last_retryable: Option<StripeError> = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let delay = backoff_delay(attempt, retry_after_hint(&last_retryable));
                debug!(%url, attempt, delay_ms = delay.as_millis() as u64, "retrying provider call");
                tokio::time::sleep(delay).await;
            }

            let mut req = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(self.secret_key.expose())
                .query(query);
            if let Some(v) = &self.api_version {
                req = req.header("Stripe-Version", v);
            }
            if let Some(form) = form {
                req = req.form(form);
            }

            let resp = match req.send().await {
                Ok(r) => r,
                Err(e) => {
                    last_retryable = Some(StripeError::Transport(e.to_string()));
                    continue;
                }
            };

            let status = resp.status();
            if status.is_success() {
                return resp
                    .json::<Value>()
                    .await
                    .map_err(|e| StripeError::Decode(e.to_string()));
            }

            match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    return Err(StripeError::Auth(format!("provider returned {status}")));
                }
                StatusCode::NOT_FOUND => return Err(StripeError::NotFound),
                StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = resp
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .map(Duration::from_secs);
                    last_retryable = Some(StripeError::RateLimited { retry_after });
                    continue;
                }
                s if s.is_server_error() => {
                    last_retryable =
                        Some(StripeError::Transport(format!("provider returned {s}")));
                    continue;
                }
                s => {
                    let body: Value = resp.json().await.unwrap_or(Value::Null);
                    let code = body
                        .pointer("/error/code")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    let message = body
                        .pointer("/error/message")
                        .and_then(Value::as_str)
                        .unwrap_or("request rejected")
                        .to_string();
                    return Err(StripeError::Api {
                        status: s.as_u16(),
                        code,
                        message,
                    });
                }
            }
        }

        // Out of attempts; rate limits surface as transient at this point.
        let last = last_retryable
            .unwrap_or_else(|| StripeError::Transport("retries exhausted".to_string()));
        warn!(%url, attempts = MAX_ATTEMPTS, error = %last, "provider call exhausted retries");
        Err(StripeError::Transport(format!(
            "exhausted {MAX_ATTEMPTS} attempts: {last}"
        )))
    }
}

fn retry_after_hint(err: &Option<StripeError>) -> Option<Duration> {
    match err {
        Some(StripeError::RateLimited {
            retry_after: Some(d),
        }) => Some(*d),
        _ => None,
    }
}

/// Exponential backoff starting at 500 ms, doubling per attempt, capped at
/// 30 s. A provider-suggested delay wins over the schedule.
fn backoff_delay(attempt: u32, suggested: Option<Duration>) -> Duration {
    if let Some(d) = suggested {
        return d.min(MAX_BACKOFF);
    }
    let exp = INITIAL_BACKOFF.saturating_mul(1u32 << (attempt.saturating_sub(1)).min(10));
    exp.min(MAX_BACKOFF)
}

#[async_trait]
impl StripeClient for HttpStripeClient {
    async fn retrieve_account(&self) -> Result<Value, StripeError> {
        self.request(Method::GET, "v1/account", &[], None).await
    }

    async fn list(&self, kind: ObjectKind, params: &ListParams) -> Result<ListPage, StripeError> {
        let mut query: Vec<(String, String)> = vec![("limit".into(), params.limit.to_string())];
        if let Some(cursor) = &params.starting_after {
            query.push(("starting_after".into(), cursor.clone()));
        }
        if let Some(gte) = params.created_gte {
            query.push(("created[gte]".into(), gte.to_string()));
        }
        if let Some(lte) = params.created_lte {
            query.push(("created[lte]".into(), lte.to_string()));
        }
        for (k, v) in kind.extra_list_params() {
            query.push(((*k).into(), (*v).into()));
        }

        let body = self
            .request(Method::GET, &format!("v1/{}", kind.list_path()), &query, None)
            .await?;
        serde_json::from_value(body).map_err(|e| StripeError::Decode(e.to_string()))
    }

    async fn retrieve(&self, kind: ObjectKind, id: &str) -> Result<Option<Value>, StripeError> {
        let path = format!("v1/{}/{id}", kind.list_path());
        match self.request(Method::GET, &path, &[], None).await {
            Ok(v) => Ok(Some(v)),
            Err(StripeError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_webhook_endpoint(
        &self,
        req: &WebhookEndpointCreate,
    ) -> Result<WebhookEndpoint, StripeError> {
        let mut form: Vec<(String, String)> = vec![
            ("url".into(), req.url.clone()),
            ("description".into(), req.description.clone()),
        ];
        for (i, ev) in req.enabled_events.iter().enumerate() {
            form.push((format!("enabled_events[{i}]"), ev.clone()));
        }
        for (k, v) in &req.metadata {
            form.push((format!("metadata[{k}]"), v.clone()));
        }

        let body = self
            .request(Method::POST, "v1/webhook_endpoints", &[], Some(&form))
            .await?;
        serde_json::from_value(body).map_err(|e| StripeError::Decode(e.to_string()))
    }

    async fn retrieve_webhook_endpoint(
        &self,
        id: &str,
    ) -> Result<Option<WebhookEndpoint>, StripeError> {
        match self
            .request(Method::GET, &format!("v1/webhook_endpoints/{id}"), &[], None)
            .await
        {
            Ok(body) => serde_json::from_value(body)
                .map(Some)
                .map_err(|e| StripeError::Decode(e.to_string())),
            Err(StripeError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete_webhook_endpoint(&self, id: &str) -> Result<bool, StripeError> {
        match self
            .request(
                Method::DELETE,
                &format!("v1/webhook_endpoints/{id}"),
                &[],
                None,
            )
            .await
        {
            Ok(_) => Ok(true),
            Err(StripeError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_webhook_endpoints(
        &self,
        starting_after: Option<&str>,
    ) -> Result<(Vec<WebhookEndpoint>, bool), StripeError> {
        let mut query: Vec<(String, String)> = vec![("limit".into(), "100".into())];
        if let Some(cursor) = starting_after {
            query.push(("starting_after".into(), cursor.to_string()));
        }

        let body = self
            .request(Method::GET, "v1/webhook_endpoints", &query, None)
            .await?;
        let page: ListPage =
            serde_json::from_value(body).map_err(|e| StripeError::Decode(e.to_string()))?;
        let endpoints = page
            .data
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<WebhookEndpoint>, _>>()
            .map_err(|e| StripeError::Decode(e.to_string()))?;
        Ok((endpoints, page.has_more))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule_doubles_and_caps() {
        assert_eq!(backoff_delay(1, None), Duration::from_millis(500));
        assert_eq!(backoff_delay(2, None), Duration::from_millis(1000));
        assert_eq!(backoff_delay(3, None), Duration::from_millis(2000));
        assert_eq!(backoff_delay(4, None), Duration::from_millis(4000));
        // Far attempts saturate at the cap.
        assert_eq!(backoff_delay(12, None), MAX_BACKOFF);
    }

    #[test]
    fn provider_suggested_delay_wins() {
        assert_eq!(
            backoff_delay(1, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
        // But never beyond the cap.
        assert_eq!(
            backoff_delay(1, Some(Duration::from_secs(600))),
            MAX_BACKOFF
        );
    }
}
