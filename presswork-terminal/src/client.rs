//! HTTP client for the presswork-server command surface

use std::time::Duration;

use async_trait::async_trait;
use presswork_common::models::{
    Activity, Department, NewReprintRequest, ReprintFilter, ReprintRequest, Resolution,
};
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::error::{TerminalError, TerminalResult};
use crate::poller::{SnapshotSource, DEFAULT_FETCH_TIMEOUT_SECS};

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Client for one presswork-server
#[derive(Clone)]
pub struct ServerClient {
    http: reqwest::Client,
    base: Url,
    base_url: String,
    timeout: Duration,
}

impl ServerClient {
    pub fn new(base_url: impl Into<String>) -> TerminalResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let base = Url::parse(&base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| TerminalError::InvalidUrl(base_url.clone()))?;

        let timeout = Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS);
        // No client-wide timeout: the push channel shares this client and
        // stays open indefinitely. Requests set their own.
        let http = reqwest::Client::builder()
            .user_agent(concat!("presswork-terminal/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base,
            base_url,
            timeout,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Underlying client, shared with the push channel
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Endpoint URL; each segment is percent-encoded on its own, so ids may
    /// contain `/`, `?` or `#`
    fn endpoint(&self, segments: &[&str]) -> TerminalResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| TerminalError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> TerminalResult<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let text = response.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (body.error.code, body.error.message),
            Err(_) => ("HTTP_ERROR".to_string(), text),
        };
        Err(TerminalError::Server {
            status: status.as_u16(),
            code,
            message,
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: serde_json::Value,
    ) -> TerminalResult<T> {
        let url = self.endpoint(segments)?;
        debug!(path = url.path(), "POST");
        let response = self
            .http
            .post(url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        self.decode(response).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> TerminalResult<T> {
        let url = self.endpoint(segments)?;
        debug!(path = url.path(), "GET");
        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .query(query)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        self.decode(response).await
    }

    fn request_error(&self, err: reqwest::Error) -> TerminalError {
        if err.is_timeout() {
            TerminalError::Timeout(self.timeout)
        } else {
            err.into()
        }
    }

    pub async fn complete(
        &self,
        activity_id: &str,
        actor: &str,
        notes: Option<&str>,
    ) -> TerminalResult<Activity> {
        self.post(
            &["activities", activity_id, "complete"],
            json!({"completedBy": actor, "notes": notes}),
        )
        .await
    }

    pub async fn return_activity(
        &self,
        activity_id: &str,
        actor: &str,
        notes: Option<&str>,
    ) -> TerminalResult<Activity> {
        self.post(
            &["activities", activity_id, "return"],
            json!({"returnedBy": actor, "notes": notes}),
        )
        .await
    }

    pub async fn advance(
        &self,
        activity_id: &str,
        actor: &str,
        notes: Option<&str>,
    ) -> TerminalResult<Activity> {
        self.post(
            &["activities", activity_id, "advance"],
            json!({"advancedBy": actor, "notes": notes}),
        )
        .await
    }

    pub async fn create_reprint(&self, request: &NewReprintRequest) -> TerminalResult<ReprintRequest> {
        let body = serde_json::to_value(request).map_err(|e| TerminalError::Decode(e.to_string()))?;
        self.post(&["reprints"], body).await
    }

    pub async fn process_reprint(
        &self,
        request_id: Uuid,
        actor: &str,
        resolution: Resolution,
    ) -> TerminalResult<ReprintRequest> {
        let request_id = request_id.to_string();
        self.post(
            &["reprints", request_id.as_str(), "process"],
            json!({"processedBy": actor, "resolution": resolution}),
        )
        .await
    }

    pub async fn list_reprints(&self, filter: &ReprintFilter) -> TerminalResult<Vec<ReprintRequest>> {
        let mut query = Vec::new();
        if let Some(department) = filter.to_department {
            query.push(("toDepartment", department.as_str().to_string()));
        }
        if let Some(status) = filter.status {
            query.push(("status", status.as_str().to_string()));
        }
        self.get(&["reprints"], &query).await
    }
}

#[async_trait]
impl SnapshotSource for ServerClient {
    async fn fetch_pending(&self, department: Department) -> TerminalResult<Vec<ReprintRequest>> {
        self.list_reprints(&ReprintFilter::pending_for(department)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_encoded_as_one_segment() {
        let client = ServerClient::new("http://127.0.0.1:5780/").unwrap();

        let url = client.endpoint(&["activities", "2026/001", "complete"]).unwrap();
        assert_eq!(url.path(), "/activities/2026%2F001/complete");

        let url = client.endpoint(&["activities", "ORD#7", "return"]).unwrap();
        assert_eq!(url.path(), "/activities/ORD%237/return");
        assert_eq!(url.fragment(), None);

        let url = client.endpoint(&["activities", "A?1", "advance"]).unwrap();
        assert_eq!(url.path(), "/activities/A%3F1/advance");
        assert_eq!(url.query(), None);
    }

    #[test]
    fn test_base_path_is_kept() {
        let client = ServerClient::new("http://shop.local/presswork").unwrap();
        let url = client.endpoint(&["reprints"]).unwrap();
        assert_eq!(url.as_str(), "http://shop.local/presswork/reprints");
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(matches!(
            ServerClient::new("not a url"),
            Err(TerminalError::InvalidUrl(_))
        ));
        assert!(matches!(
            ServerClient::new("mailto:ops@shop.local"),
            Err(TerminalError::InvalidUrl(_))
        ));
    }
}
