use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::FalConfig;
use crate::error::GatewayError;
use crate::gateway::{VideoRequest, VideoService};

const PROVIDER: &str = "fal";

/// Handle for a queued image-to-video job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueTicket {
    pub request_id: String,
    #[serde(default)]
    pub status_url: Option<String>,
    #[serde(default)]
    pub response_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueLog {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueStatus {
    pub status: String,
    #[serde(default)]
    pub logs: Option<Vec<QueueLog>>,
    #[serde(default)]
    pub queue_position: Option<u64>,
}

impl QueueStatus {
    pub fn is_completed(&self) -> bool {
        self.status == "COMPLETED"
    }

    /// Whether the queue reported one of the states it documents.
    pub fn is_known(&self) -> bool {
        matches!(self.status.as_str(), "IN_QUEUE" | "IN_PROGRESS" | "COMPLETED")
    }
}

pub struct FalClient {
    config: FalConfig,
    client: reqwest::Client,
}

impl FalClient {
    pub fn new(config: FalConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Status and result routes live under the app root (`owner/app`), not
    /// under the full endpoint path.
    fn app_root(&self) -> String {
        self.config
            .model
            .split('/')
            .filter(|segment| !segment.is_empty())
            .take(2)
            .collect::<Vec<_>>()
            .join("/")
    }

    fn status_url(&self, ticket: &QueueTicket) -> String {
        ticket.status_url.clone().unwrap_or_else(|| {
            format!(
                "{}/{}/requests/{}/status",
                self.config.queue_base,
                self.app_root(),
                ticket.request_id
            )
        })
    }

    fn response_url(&self, ticket: &QueueTicket) -> String {
        ticket.response_url.clone().unwrap_or_else(|| {
            format!(
                "{}/{}/requests/{}",
                self.config.queue_base,
                self.app_root(),
                ticket.request_id
            )
        })
    }

    fn authorization(&self) -> String {
        format!("Key {}", self.config.api_key)
    }

    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let err = GatewayError::from_response(PROVIDER, response).await;
        error!("fal request failed: {}", err);
        Err(err)
    }

    /// Queues a job and returns its ticket.
    pub async fn submit(&self, request: &VideoRequest) -> Result<QueueTicket, GatewayError> {
        let endpoint = format!("{}/{}", self.config.queue_base, self.config.model);
        info!("Queuing video generation with prompt: {}", request.prompt);
        debug!("Submitting {:?} to {}", request, endpoint);

        let response = self
            .client
            .post(&endpoint)
            .header(AUTHORIZATION, self.authorization())
            .json(request)
            .send()
            .await?;
        let ticket: QueueTicket = Self::checked(response).await?.json().await?;

        info!("Video generation queued with ID: {}", ticket.request_id);
        Ok(ticket)
    }

    pub async fn status(&self, ticket: &QueueTicket) -> Result<QueueStatus, GatewayError> {
        let response = self
            .client
            .get(self.status_url(ticket))
            .header(AUTHORIZATION, self.authorization())
            .query(&[("logs", "1")])
            .send()
            .await?;
        Ok(Self::checked(response).await?.json().await?)
    }

    /// Fetches the finished job's output and returns its video URL, if any.
    pub async fn result(&self, ticket: &QueueTicket) -> Result<Option<String>, GatewayError> {
        let response = self
            .client
            .get(self.response_url(ticket))
            .header(AUTHORIZATION, self.authorization())
            .send()
            .await?;
        let output: Value = Self::checked(response).await?.json().await?;
        debug!("Video generation completed: {}", output);

        let Some(raw) = output
            .get("video")
            .and_then(|video| video.get("url"))
            .and_then(Value::as_str)
        else {
            warn!("Video output carried no video URL");
            return Ok(None);
        };

        match Url::parse(raw) {
            Ok(url) => Ok(Some(url.to_string())),
            Err(e) => {
                warn!("Video output carried an invalid URL {:?}: {}", raw, e);
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl VideoService for FalClient {
    async fn animate(&self, request: &VideoRequest) -> Result<Option<String>, GatewayError> {
        let ticket = self.submit(request).await?;
        let mut logs_seen = 0usize;

        loop {
            let status = self.status(&ticket).await?;
            if let Some(logs) = &status.logs {
                for log in logs.iter().skip(logs_seen) {
                    debug!("[{}] {}", ticket.request_id, log.message);
                }
                logs_seen = logs_seen.max(logs.len());
            }

            if status.is_completed() {
                break;
            }
            if !status.is_known() {
                warn!("[{}] unexpected queue status {:?}; still polling", ticket.request_id, status.status);
            }
            if let Some(position) = status.queue_position {
                debug!("[{}] {} at queue position {}", ticket.request_id, status.status, position);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }

        self.result(&ticket).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(server: &MockServer) -> FalClient {
        FalClient::new(
            FalConfig::new("fal-test")
                .with_queue_base(server.uri())
                .with_poll_interval(Duration::from_millis(5)),
        )
    }

    fn ticket(id: &str) -> QueueTicket {
        QueueTicket {
            request_id: id.to_string(),
            status_url: None,
            response_url: None,
        }
    }

    #[test]
    fn default_routes_use_the_app_root() {
        let fal = FalClient::new(FalConfig::new("k"));
        assert_eq!(fal.app_root(), "fal-ai/veo2");
        assert_eq!(
            fal.status_url(&ticket("abc")),
            "https://queue.fal.run/fal-ai/veo2/requests/abc/status"
        );
        assert_eq!(
            fal.response_url(&ticket("abc")),
            "https://queue.fal.run/fal-ai/veo2/requests/abc"
        );
    }

    #[test]
    fn provider_supplied_routes_win() {
        let fal = FalClient::new(FalConfig::new("k"));
        let ticket = QueueTicket {
            request_id: "abc".to_string(),
            status_url: Some("https://example.test/s".to_string()),
            response_url: Some("https://example.test/r".to_string()),
        };
        assert_eq!(fal.status_url(&ticket), "https://example.test/s");
        assert_eq!(fal.response_url(&ticket), "https://example.test/r");
    }

    #[tokio::test]
    async fn animate_submits_polls_and_fetches_result() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/fal-ai/veo2/image-to-video"))
            .and(header("authorization", "Key fal-test"))
            .and(body_partial_json(json!({
                "prompt": "slow zoom",
                "image_url": "data:image/png;base64,QUJD",
                "aspect_ratio": "auto",
                "duration": "5s"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "request_id": "req-1",
                "status": "IN_QUEUE"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/fal-ai/veo2/requests/req-1/status"))
            .and(query_param("logs", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "IN_PROGRESS",
                "logs": [{ "message": "warming up" }]
            })))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/fal-ai/veo2/requests/req-1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "COMPLETED",
                "logs": [{ "message": "warming up" }, { "message": "done" }]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/fal-ai/veo2/requests/req-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "video": { "url": "https://v3.fal.media/files/out.mp4", "content_type": "video/mp4" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = VideoRequest::new("slow zoom", "data:image/png;base64,QUJD");
        let url = client(&server).animate(&request).await.unwrap();
        assert_eq!(url.as_deref(), Some("https://v3.fal.media/files/out.mp4"));
    }

    #[test]
    fn queue_states_are_recognised() {
        let status = |s: &str| QueueStatus {
            status: s.to_string(),
            logs: None,
            queue_position: None,
        };
        assert!(status("IN_QUEUE").is_known());
        assert!(status("IN_PROGRESS").is_known());
        assert!(status("COMPLETED").is_known());
        assert!(status("COMPLETED").is_completed());
        assert!(!status("RETRYING").is_known());
        assert!(!status("RETRYING").is_completed());
    }

    #[tokio::test]
    async fn unexpected_status_keeps_polling_until_completed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/fal-ai/veo2/image-to-video"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "request_id": "req-4" })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/fal-ai/veo2/requests/req-4/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "RETRYING" })))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/fal-ai/veo2/requests/req-4/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "COMPLETED" })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/fal-ai/veo2/requests/req-4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "video": { "url": "https://v3.fal.media/files/late.mp4" }
            })))
            .mount(&server)
            .await;

        let request = VideoRequest::new("drift", "data:image/png;base64,QUJD");
        let url = client(&server).animate(&request).await.unwrap();
        assert_eq!(url.as_deref(), Some("https://v3.fal.media/files/late.mp4"));
    }

    #[tokio::test]
    async fn result_without_video_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fal-ai/veo2/requests/req-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "detail": "nsfw" })))
            .mount(&server)
            .await;

        assert_eq!(client(&server).result(&ticket("req-2")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn result_with_invalid_url_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fal-ai/veo2/requests/req-3"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "video": { "url": "not a url" } })),
            )
            .mount(&server)
            .await;

        assert_eq!(client(&server).result(&ticket("req-3")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejected_submission_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fal-ai/veo2/image-to-video"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let request = VideoRequest::new("slow zoom", "data:image/png;base64,QUJD");
        let err = client(&server).animate(&request).await.unwrap_err();
        assert!(matches!(err, GatewayError::Api { status: 401, .. }));
    }
}
