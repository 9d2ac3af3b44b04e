//! Fetch engine
//!
//! Sends catalog requests through [`RetryPolicy`] as an explicit bounded
//! loop, and walks the pages from 1 upward, handing each page's items to the
//! publisher as soon as it arrives.

use super::policy::{AttemptState, Decision, FailureKind, Outcome, RetryPolicy};
use super::Pause;
use crate::api::{endpoints, ApiClient, PageResponse, RawResponse};
use crate::config::SyncConfig;
use crate::credentials::CredentialCache;
use crate::error::{excerpt, Result, SyncError};
use crate::publisher::StreamingPublisher;
use dsz_common::SyncLog;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Counters for one pagination run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Pages that were requested successfully
    pub pages: u32,
    /// Page count reported by the last page
    pub total_pages: u32,
    /// Records handed to the publisher
    pub records: u64,
}

/// Paginated catalog reader
pub struct FetchEngine {
    api: ApiClient,
    credentials: CredentialCache,
    policy: RetryPolicy,
    batch_limit: u32,
    page_delay: Duration,
    pause: Arc<dyn Pause>,
    log: SyncLog,
}

impl FetchEngine {
    pub fn new(
        api: ApiClient,
        credentials: CredentialCache,
        config: &SyncConfig,
        pause: Arc<dyn Pause>,
        log: SyncLog,
    ) -> Self {
        Self {
            api,
            credentials,
            policy: RetryPolicy {
                max_retries: config.sync.retries,
                backoff: config.sync.retry_backoff(),
                rate_limit_fallback: config.sync.rate_limit_fallback(),
            },
            batch_limit: config.sync.batch_limit,
            page_delay: config.sync.page_delay(),
            pause,
            log,
        }
    }

    pub fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    /// Fetch one page, applying the retry policy
    pub async fn request_page(&self, page: u32) -> Result<PageResponse> {
        let url = endpoints::products_url(self.api.base_url(), page, self.batch_limit);
        let mut token = self.credentials.get_token_quiet(false).await?;
        let mut state = AttemptState::first();
        let mut sends: u32 = 0;

        loop {
            sends += 1;
            debug!(page, attempt = state.attempt, sends, "Requesting catalog page");

            let response = self
                .api
                .get_products(page, self.batch_limit, &token)
                .await;
            let outcome = match &response {
                Ok(r) => Outcome::from_status(r.status, r.retry_after.as_deref()),
                Err(e) => Outcome::NetworkError(e.to_string()),
            };

            match self.policy.decide(&outcome, state) {
                Decision::Accept => {
                    let body = response.map(|r| r.body).unwrap_or_default();
                    return serde_json::from_str(&body).map_err(|e| {
                        SyncError::MalformedResponse {
                            url: url.clone(),
                            message: format!("{} (body: {})", e, excerpt(&body)),
                        }
                    });
                },

                Decision::Retry { after, next } => {
                    self.log_retry(&outcome, state, after);
                    self.pause.pause(after).await;
                    state = next;
                },

                Decision::RefreshAndRetry { next } => {
                    self.log.warning("Token expired (401). Refreshing token...");
                    token = self.credentials.get_token_quiet(true).await?;
                    state = next;
                },

                Decision::Fail(kind) => {
                    let error = failure(kind, &url, sends, &outcome, response.ok());
                    self.log.error(error.to_string());
                    return Err(error);
                },
            }
        }
    }

    /// Walk every page and stream its items into `publisher`
    ///
    /// Any request failure aborts the run; nothing is published by this call.
    pub async fn run(&self, publisher: &mut StreamingPublisher) -> Result<FetchReport> {
        let mut report = FetchReport::default();
        let mut page: u32 = 1;

        loop {
            let data = self.request_page(page).await.map_err(|e| {
                self.log
                    .error(format!("Failed to download page {}. Aborting.", page));
                e
            })?;
            report.pages += 1;

            let Some(items) = data.items() else {
                debug!(page, "Response carries no item list, stopping");
                break;
            };

            let count = publisher.append_items(items).await?;
            report.records += count as u64;
            self.log
                .info(format!("Page {} streamed ({} items).", page, count));

            report.total_pages = data.total_pages();
            if page >= report.total_pages {
                break;
            }

            page += 1;
            self.pause.pause(self.page_delay).await;
        }

        Ok(report)
    }

    fn log_retry(&self, outcome: &Outcome, state: AttemptState, after: Duration) {
        match outcome {
            Outcome::RateLimited { .. } => self.log.warning(format!(
                "Rate Limit Hit (429). Waiting {}s.",
                after.as_secs()
            )),
            Outcome::NetworkError(message) => self.log.error(format!(
                "Network Error: {}. Retrying (attempt {}/{}).",
                message,
                state.attempt,
                self.policy.max_retries
            )),
            Outcome::ServerError { status } => self.log.warning(format!(
                "Server Error {}. Retrying (attempt {}/{}).",
                status, state.attempt, self.policy.max_retries
            )),
            _ => {},
        }
    }
}

fn failure(
    kind: FailureKind,
    url: &str,
    sends: u32,
    outcome: &Outcome,
    response: Option<RawResponse>,
) -> SyncError {
    let body = response.map(|r| excerpt(&r.body)).unwrap_or_default();
    let url = url.to_string();

    match kind {
        FailureKind::Transport => SyncError::Transport {
            url,
            attempts: sends,
            message: match outcome {
                Outcome::NetworkError(message) => message.clone(),
                _ => "no response".to_string(),
            },
        },
        FailureKind::Server { status } => SyncError::Server {
            url,
            status,
            attempts: sends,
            body,
        },
        FailureKind::Client { status } => SyncError::Client { url, status, body },
        FailureKind::Unauthorized => SyncError::Unauthorized { url },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::credentials::Credential;
    use crate::fetch::RecordingPause;
    use chrono::Utc;
    use dsz_common::sink::MemorySink;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        engine: FetchEngine,
        pause: Arc<RecordingPause>,
        sink: Arc<MemorySink>,
        dir: TempDir,
    }

    async fn harness(server: &MockServer, retries: u32) -> Harness {
        let dir = TempDir::new().unwrap();
        let mut config = SyncConfig::new(server.uri(), "ops@example.com", "pw", dir.path());
        config.sync.retries = retries;
        config.sync.batch_limit = 2;

        let sink = Arc::new(MemorySink::new());
        let log = SyncLog::new(sink.clone());
        let api = ApiClient::from_config(&config).unwrap();
        let credentials = CredentialCache::new(api.clone(), &config, log.clone());

        let now = Utc::now().timestamp();
        credentials
            .store()
            .save(&Credential::issue("cached", now, 3_600))
            .await
            .unwrap();

        let pause = Arc::new(RecordingPause::new());
        let engine = FetchEngine::new(api, credentials, &config, pause.clone(), log);
        Harness {
            engine,
            pause,
            sink,
            dir,
        }
    }

    fn page_body(skus: &[&str], total_pages: u32) -> serde_json::Value {
        let items: Vec<_> = skus
            .iter()
            .map(|s| json!({"sku": s, "stock_qty": 3, "price": 1.5}))
            .collect();
        json!({"result": items, "total_pages": total_pages})
    }

    #[tokio::test]
    async fn test_transport_failure_exhausts_ceiling() {
        // Nothing listens on the discard port
        let server = MockServer::start().await;
        let mut h = harness(&server, 3).await;
        h.engine.api = ApiClient::new("http://127.0.0.1:9", "t", Duration::from_secs(2)).unwrap();

        let err = h.engine.request_page(1).await.unwrap_err();

        match err {
            SyncError::Transport { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(h.pause.waits(), vec![Duration::from_secs(2); 3]);
    }

    #[tokio::test]
    async fn test_server_errors_retry_then_succeed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/products"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/products"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&["A"], 1)))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server, 5).await;
        let page = h.engine.request_page(1).await.unwrap();

        assert_eq!(page.items().unwrap().len(), 1);
        assert_eq!(h.pause.waits().len(), 2);
        assert!(h.sink.contains("Server Error 503. Retrying"));
    }

    #[tokio::test]
    async fn test_server_error_exhaustion_reports_status_and_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/products"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .expect(3)
            .mount(&server)
            .await;

        let h = harness(&server, 2).await;
        let err = h.engine.request_page(1).await.unwrap_err();

        match err {
            SyncError::Server {
                status,
                attempts,
                body,
                url,
            } => {
                assert_eq!(status, 500);
                assert_eq!(attempts, 3);
                assert_eq!(body, "upstream down");
                assert!(url.contains("page_no=1"));
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_waits_and_does_not_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/products"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
            .up_to_n_times(3)
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/products"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&["A"], 1)))
            .mount(&server)
            .await;

        // Zero retries: only the 429 exemption lets this succeed
        let h = harness(&server, 0).await;
        h.engine.request_page(1).await.unwrap();

        assert_eq!(h.pause.waits(), vec![Duration::from_secs(30); 3]);
        assert!(h.sink.contains("Rate Limit Hit (429). Waiting 30s."));
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_and_retries_with_new_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/products"))
            .and(header("authorization", "jwt cached"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"token":"renewed"}"#))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/products"))
            .and(header("authorization", "jwt renewed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&["A"], 1)))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server, 5).await;
        h.engine.request_page(1).await.unwrap();

        assert!(h.sink.contains("Token expired (401). Refreshing token..."));
        assert!(h.pause.waits().is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_after_refresh_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/products"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"token":"renewed"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server, 5).await;
        let err = h.engine.request_page(1).await.unwrap_err();

        assert!(matches!(err, SyncError::Unauthorized { .. }));
        assert!(h.sink.contains("Token refresh failed"));
    }

    #[tokio::test]
    async fn test_refresh_rejected_by_auth_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/products"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(403).set_body_string("account locked"))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server, 5).await;
        let temp = h.dir.path().join("temp.json");
        let out = h.dir.path().join("out.json");
        let mut publisher = StreamingPublisher::create(&temp, &out, 0).await.unwrap();

        let err = h.engine.run(&mut publisher).await.unwrap_err();

        assert!(matches!(err, SyncError::Auth { status: 403, .. }));
        assert!(h.pause.waits().is_empty());
        assert!(h.sink.contains("Failed to download page 1. Aborting."));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/products"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such route"))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server, 5).await;
        let err = h.engine.request_page(1).await.unwrap_err();

        assert!(matches!(err, SyncError::Client { status: 404, .. }));
        assert!(h.pause.waits().is_empty());
    }

    #[tokio::test]
    async fn test_ok_with_garbage_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/products"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let h = harness(&server, 5).await;
        let err = h.engine.request_page(1).await.unwrap_err();
        assert!(matches!(err, SyncError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_run_walks_pages_with_delay_between_only() {
        let server = MockServer::start().await;
        for (page, skus) in [("1", vec!["A", "B"]), ("2", vec!["C", "D"]), ("3", vec!["E"])] {
            Mock::given(method("GET"))
                .and(path("/v2/products"))
                .and(query_param("page_no", page))
                .and(query_param("limit", "2"))
                .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&skus, 3)))
                .expect(1)
                .mount(&server)
                .await;
        }

        let h = harness(&server, 5).await;
        let temp = h.dir.path().join("temp.json");
        let out = h.dir.path().join("out.json");
        let mut publisher = StreamingPublisher::create(&temp, &out, 0).await.unwrap();

        let report = h.engine.run(&mut publisher).await.unwrap();

        assert_eq!(
            report,
            FetchReport {
                pages: 3,
                total_pages: 3,
                records: 5
            }
        );
        assert_eq!(h.pause.waits(), vec![Duration::from_millis(6_500); 2]);
        assert!(h.sink.contains("Page 2 streamed (2 items)."));
        assert!(h.sink.contains("Page 3 streamed (1 items)."));
    }

    #[tokio::test]
    async fn test_run_stops_when_item_list_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/products"))
            .and(query_param("page_no", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&["A"], 5)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/products"))
            .and(query_param("page_no", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total_pages": 5})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/products"))
            .and(query_param("page_no", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&["X"], 5)))
            .expect(0)
            .mount(&server)
            .await;

        let h = harness(&server, 5).await;
        let temp = h.dir.path().join("temp.json");
        let out = h.dir.path().join("out.json");
        let mut publisher = StreamingPublisher::create(&temp, &out, 0).await.unwrap();

        let report = h.engine.run(&mut publisher).await.unwrap();

        assert_eq!(report.records, 1);
        assert_eq!(report.pages, 2);
        assert_eq!(h.pause.waits().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_total_pages_means_single_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/products"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"result": [{"sku": "A"}]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server, 5).await;
        let temp = h.dir.path().join("temp.json");
        let out = h.dir.path().join("out.json");
        let mut publisher = StreamingPublisher::create(&temp, &out, 0).await.unwrap();

        let report = h.engine.run(&mut publisher).await.unwrap();
        assert_eq!(report.pages, 1);
        assert!(h.pause.waits().is_empty());
    }

    #[tokio::test]
    async fn test_run_aborts_on_failed_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/products"))
            .and(query_param("page_no", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&["A", "B"], 2)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/products"))
            .and(query_param("page_no", "2"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let h = harness(&server, 5).await;
        let temp = h.dir.path().join("temp.json");
        let out = h.dir.path().join("out.json");
        let mut publisher = StreamingPublisher::create(&temp, &out, 0).await.unwrap();

        let err = h.engine.run(&mut publisher).await.unwrap_err();
        assert!(matches!(err, SyncError::Client { status: 400, .. }));
        assert!(h.sink.contains("Failed to download page 2. Aborting."));
        assert!(!out.exists());
    }
}
