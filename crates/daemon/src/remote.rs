//! Client for the external visit-count provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};
use visits_core::FetchResult;

/// Field carrying the counter in provider responses.
pub const VISITS_FIELD: &str = "SuccessfulVisits";

const USER_AGENT: &str = "VisitsTracker/1.0";

/// Source of visit counters for a user.
///
/// Implementations never fail: every error is folded into
/// [`FetchResult::Failed`].
#[async_trait]
pub trait VisitSource: Send + Sync {
    async fn fetch(&self, uid: &str) -> FetchResult;
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned HTTP {0}")]
    Status(u16),
}

/// HTTP GET against a URL template with a `{uid}` placeholder.
#[derive(Clone)]
pub struct HttpVisitSource {
    client: Client,
    template: String,
}

impl HttpVisitSource {
    pub fn new(template: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            template: template.into(),
        })
    }

    pub fn url_for(&self, uid: &str) -> String {
        self.template.replace("{uid}", &urlencoding::encode(uid))
    }

    async fn request(&self, uid: &str) -> Result<Value, RemoteError> {
        let url = self.url_for(uid);
        debug!(%url, "calling visit provider");

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status.as_u16()));
        }
        let text = resp.text().await?;
        Ok(serde_json::from_str(&text).unwrap_or_else(|_| json!({ "raw": text })))
    }
}

#[async_trait]
impl VisitSource for HttpVisitSource {
    async fn fetch(&self, uid: &str) -> FetchResult {
        match self.request(uid).await {
            Ok(raw) => FetchResult::Ok {
                observed: successful_visits(&raw),
                raw,
            },
            Err(e) => {
                warn!(uid, error = %e, "visit provider call failed");
                FetchResult::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

/// Pulls the visit counter out of an arbitrary response document.
///
/// Accepts integers, floats (truncated toward zero) and strings holding an
/// integer. Any other shape yields `None`.
pub fn successful_visits(raw: &Value) -> Option<i64> {
    match raw.as_object()?.get(VISITS_FIELD)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|v| i64::try_from(v).unwrap_or(i64::MAX)))
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_coercion() {
        assert_eq!(successful_visits(&json!({"SuccessfulVisits": 42})), Some(42));
        assert_eq!(successful_visits(&json!({"SuccessfulVisits": " 17 "})), Some(17));
        assert_eq!(successful_visits(&json!({"SuccessfulVisits": 9.9})), Some(9));
        assert_eq!(successful_visits(&json!({"SuccessfulVisits": -3})), Some(-3));
        assert_eq!(
            successful_visits(&json!({"SuccessfulVisits": u64::MAX})),
            Some(i64::MAX)
        );
    }

    #[test]
    fn counter_shape_mismatch_is_absent() {
        assert_eq!(successful_visits(&json!({"SuccessfulVisits": "many"})), None);
        assert_eq!(successful_visits(&json!({"SuccessfulVisits": "1.5"})), None);
        assert_eq!(successful_visits(&json!({"SuccessfulVisits": null})), None);
        assert_eq!(successful_visits(&json!({"SuccessfulVisits": [1]})), None);
        assert_eq!(successful_visits(&json!({"SuccessfulVisits": true})), None);
        assert_eq!(successful_visits(&json!({"visits": 3})), None);
        assert_eq!(successful_visits(&json!([{"SuccessfulVisits": 3}])), None);
        assert_eq!(successful_visits(&json!("SuccessfulVisits")), None);
    }

    #[test]
    fn uid_is_url_encoded() {
        let src = HttpVisitSource::new(
            "http://provider.test/visit?uid={uid}&server_name=ind",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            src.url_for("a b&c"),
            "http://provider.test/visit?uid=a%20b%26c&server_name=ind"
        );
    }
}
