use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::activity::ActivityLogger;
use crate::config::ApiConfig;
use crate::error::{Error, FetchError, Result};
use crate::news::{ArticleRecord, UserPreferences};

pub const SORT_BY: &str = "popularity";

/// Anything that can produce an article list for a customer's preferences.
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch(&self, preferences: &UserPreferences) -> std::result::Result<Vec<ArticleRecord>, FetchError>;
}

/// Query string sent upstream. Field order is the wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsQuery {
    pub q: String,
    pub from: String,
    pub to: String,
    pub domains: String,
    #[serde(rename = "sortBy")]
    pub sort_by: String,
    #[serde(rename = "apiKey")]
    pub api_key: String,
}

impl NewsQuery {
    pub fn new(api_key: &str, preferences: &UserPreferences) -> Self {
        Self {
            q: preferences.interest.clone(),
            from: preferences.date_from.clone(),
            to: preferences.date_to.clone(),
            domains: preferences.domains.clone(),
            sort_by: SORT_BY.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    articles: Option<Vec<Value>>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the upstream news API.
#[derive(Debug, Clone)]
pub struct NewsClient {
    client: Client,
    endpoint: String,
    api_key: String,
    timeout_duration: Duration,
    user_agent: String,
    activity: ActivityLogger,
}

impl NewsClient {
    pub fn new(config: &ApiConfig, activity: ActivityLogger) -> Result<Self> {
        config.validate()?;

        if config.accept_invalid_certs {
            warn!("TLS certificate verification is disabled for {}", config.api_endpoint);
        }

        let client = Client::builder()
            .timeout(config.http_timeout())
            .redirect(reqwest::redirect::Policy::limited(10))
            .gzip(true)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.api_endpoint.clone(),
            api_key: config.api_key.clone(),
            timeout_duration: config.timeout(),
            user_agent: config.user_agent.clone(),
            activity,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_duration = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn build_query(&self, preferences: &UserPreferences) -> NewsQuery {
        NewsQuery::new(&self.api_key, preferences)
    }

    pub async fn fetch_news(&self, preferences: &UserPreferences) -> std::result::Result<Vec<ArticleRecord>, FetchError> {
        let user_id = preferences.user_id.as_str();
        let query = self.build_query(preferences);

        self.activity.write(
            user_id,
            &format!("NOTICE: Fetching news for customer ID, {} started.", user_id),
        );
        let payload = serde_json::to_string(&query).unwrap_or_default();
        self.activity.write(user_id, &format!("NOTICE: API Payload: {}", payload));

        debug!("Fetching news for user {} from {}", user_id, self.endpoint);

        let response = match timeout(self.timeout_duration, self.send(&query)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(self.transport_failure(user_id, e.to_string(), e.is_timeout())),
            Err(_) => {
                let message = format!("Request to {} timed out after {:?}", self.endpoint, self.timeout_duration);
                return Err(self.transport_failure(user_id, message, true));
            }
        };

        let status = response.status();
        self.activity.write(
            user_id,
            &format!("NOTICE: API Response Code: {}", status.as_u16()),
        );

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Err(self.transport_failure(user_id, format!("Failed to read response body: {}", e), e.is_timeout())),
        };
        let decoded: NewsApiResponse = serde_json::from_str(&body).unwrap_or_default();

        if status != StatusCode::OK {
            let message = decoded
                .message
                .filter(|m| !m.is_empty())
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_default();
            self.activity.write(
                user_id,
                &format!(
                    "FAILURE: The API couldn't proceed due to the response code received: {}. Response message: {}",
                    status.as_u16(),
                    message
                ),
            );
            warn!("News API returned HTTP {} for user {}: {}", status.as_u16(), user_id, message);
            return Err(FetchError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let articles = normalize_articles(decoded.articles.unwrap_or_default());
        if articles.is_empty() {
            self.activity.write(
                user_id,
                &format!(
                    "FAILURE: The API responded with code {} but returned no articles.",
                    status.as_u16()
                ),
            );
            warn!("News API returned HTTP {} with no articles for user {}", status.as_u16(), user_id);
            return Err(FetchError::EmptyResult { status: status.as_u16() });
        }

        self.activity.write(user_id, "SUCCESS: News retrieved.");
        info!("Retrieved {} articles for user {}", articles.len(), user_id);
        Ok(articles)
    }

    async fn send(&self, query: &NewsQuery) -> reqwest::Result<Response> {
        self.client
            .get(&self.endpoint)
            .query(query)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
    }

    fn transport_failure(&self, user_id: &str, message: String, timed_out: bool) -> FetchError {
        let error = FetchError::Transport { message, timed_out };
        self.activity.write(
            user_id,
            &format!(
                "FAILURE: The API request could not be completed ({}): {}",
                error.status_label(),
                error
            ),
        );
        warn!("News API transport failure for user {}: {}", user_id, error);
        error
    }
}

fn normalize_articles(raw: Vec<Value>) -> Vec<ArticleRecord> {
    raw.into_iter()
        .filter_map(|value| match serde_json::from_value::<ArticleRecord>(value) {
            Ok(article) => Some(article),
            Err(e) => {
                warn!("Skipping malformed article: {}", e);
                None
            }
        })
        .collect()
}

#[async_trait]
impl NewsSource for NewsClient {
    async fn fetch(&self, preferences: &UserPreferences) -> std::result::Result<Vec<ArticleRecord>, FetchError> {
        self.fetch_news(preferences).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TWO_ARTICLES: &str = r#"{
        "status": "ok",
        "totalResults": 2,
        "articles": [
            {
                "source": { "id": "techcrunch", "name": "TechCrunch" },
                "author": "Jane Smith",
                "title": "Startups rethink hardware",
                "description": "Hardware is hard, again.",
                "url": "https://techcrunch.com/hardware",
                "urlToImage": "https://techcrunch.com/hardware.jpg",
                "publishedAt": "2024-01-03T09:00:00Z",
                "content": "..."
            },
            {
                "source": { "id": null, "name": "The Next Web" },
                "author": null,
                "title": "Match report",
                "description": null,
                "url": "https://thenextweb.com/match",
                "urlToImage": null,
                "publishedAt": "2024-01-04T18:45:00Z",
                "content": null
            }
        ]
    }"#;

    fn client_for(server: &MockServer, logs: &TempDir) -> NewsClient {
        let config = ApiConfig::new("test-key", format!("{}/v2/everything", server.uri()));
        NewsClient::new(&config, ActivityLogger::new(logs.path()).with_timestamps(false)).unwrap()
    }

    fn sports_preferences() -> UserPreferences {
        UserPreferences::new("42", "sports", "", "2024-01-01", "2024-01-08")
    }

    #[test]
    fn test_query_follows_preferences() {
        let query = NewsQuery::new("k", &sports_preferences());
        assert_eq!(query.q, "sports");
        assert_eq!(query.from, "2024-01-01");
        assert_eq!(query.to, "2024-01-08");
        assert_eq!(query.domains, "");
        assert_eq!(query.sort_by, "popularity");

        let json = serde_json::to_string(&query).unwrap();
        assert_eq!(
            json,
            r#"{"q":"sports","from":"2024-01-01","to":"2024-01-08","domains":"","sortBy":"popularity","apiKey":"k"}"#
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let logs = TempDir::new().unwrap();
        let config = ApiConfig::new("", "https://newsapi.org/v2/everything");
        let result = NewsClient::new(&config, ActivityLogger::new(logs.path()));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_fetch_sends_exact_query() {
        let server = MockServer::start().await;
        let logs = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/v2/everything"))
            .and(query_param("q", "sports"))
            .and(query_param("domains", ""))
            .and(query_param("sortBy", "popularity"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(TWO_ARTICLES))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, &logs);
        let articles = client.fetch_news(&sports_preferences()).await.unwrap();
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].source_name(), Some("TechCrunch"));
        assert!(articles[1].description.is_none());

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].url.query(),
            Some("q=sports&from=2024-01-01&to=2024-01-08&domains=&sortBy=popularity&apiKey=test-key")
        );
    }

    #[tokio::test]
    async fn test_success_log_lines() {
        let server = MockServer::start().await;
        let logs = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(TWO_ARTICLES))
            .mount(&server)
            .await;

        let client = client_for(&server, &logs);
        client.fetch_news(&sports_preferences()).await.unwrap();

        let entries = ActivityLogger::new(logs.path()).entries("42").unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0], "NOTICE: Fetching news for customer ID, 42 started.");
        assert!(entries[1].starts_with("NOTICE: API Payload: {\"q\":\"sports\""));
        assert_eq!(entries[2], "NOTICE: API Response Code: 200");
        assert_eq!(entries[3], "SUCCESS: News retrieved.");
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_http_error() {
        let server = MockServer::start().await;
        let logs = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"message":"invalid key"}"#))
            .mount(&server)
            .await;

        let client = client_for(&server, &logs);
        let result = client.fetch_news(&sports_preferences()).await;
        assert_eq!(
            result.unwrap_err(),
            FetchError::Http {
                status: 401,
                message: "invalid key".to_string()
            }
        );

        let entries = ActivityLogger::new(logs.path()).entries("42").unwrap();
        let last = entries.last().unwrap();
        assert!(last.starts_with("FAILURE:"));
        assert!(last.contains("401"));
        assert!(last.contains("invalid key"));
    }

    #[tokio::test]
    async fn test_error_without_body_uses_reason_phrase() {
        let server = MockServer::start().await;
        let logs = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server, &logs);
        match client.fetch_news(&sports_preferences()).await {
            Err(FetchError::Http { status, message }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "Service Unavailable");
            }
            other => panic!("Expected Http error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_articles_is_not_success() {
        let server = MockServer::start().await;
        let logs = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"articles":[]}"#))
            .mount(&server)
            .await;

        let client = client_for(&server, &logs);
        let result = client.fetch_news(&sports_preferences()).await;
        assert_eq!(result.unwrap_err(), FetchError::EmptyResult { status: 200 });

        let entries = ActivityLogger::new(logs.path()).entries("42").unwrap();
        assert!(entries.last().unwrap().contains("200"));
    }

    /// Collects formatted `tracing` output for assertions.
    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    #[tokio::test]
    async fn test_empty_articles_emits_warning() {
        let captured = CapturedLogs::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let server = MockServer::start().await;
        let logs = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"articles":[]}"#))
            .mount(&server)
            .await;

        let client = client_for(&server, &logs);
        assert!(client.fetch_news(&sports_preferences()).await.is_err());

        let output = captured.contents();
        assert!(output.contains("WARN"));
        assert!(output.contains("News API returned HTTP 200 with no articles for user 42"));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_empty_result() {
        let server = MockServer::start().await;
        let logs = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let client = client_for(&server, &logs);
        let result = client.fetch_news(&sports_preferences()).await;
        assert!(matches!(result, Err(FetchError::EmptyResult { status: 200 })));
    }

    #[tokio::test]
    async fn test_timeout_is_transport_failure() {
        let server = MockServer::start().await;
        let logs = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(5))
                    .set_body_string(TWO_ARTICLES),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, &logs).with_timeout(Duration::from_millis(100));
        match client.fetch_news(&sports_preferences()).await {
            Err(FetchError::Transport { timed_out, .. }) => assert!(timed_out),
            other => panic!("Expected Transport error, got {:?}", other),
        }

        let entries = ActivityLogger::new(logs.path()).entries("42").unwrap();
        assert!(entries.last().unwrap().contains("transport-timeout"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_failure() {
        let logs = TempDir::new().unwrap();
        let config = ApiConfig::new("test-key", "http://127.0.0.1:9/v2/everything");
        let client = NewsClient::new(&config, ActivityLogger::new(logs.path())).unwrap();

        let result = client.fetch_news(&sports_preferences()).await;
        assert!(matches!(result, Err(FetchError::Transport { .. })));

        let entries = ActivityLogger::new(logs.path()).entries("42").unwrap();
        assert!(entries.last().unwrap().contains("transport-"));
    }

    #[tokio::test]
    async fn test_malformed_articles_are_skipped() {
        let server = MockServer::start().await;
        let logs = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"articles":[42, {"title":"Kept","url":"https://example.com/kept"}]}"#,
            ))
            .mount(&server)
            .await;

        let client = client_for(&server, &logs);
        let articles = client.fetch_news(&sports_preferences()).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Kept");
    }

    #[tokio::test]
    async fn test_custom_user_agent_is_sent() {
        let server = MockServer::start().await;
        let logs = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(header("user-agent", "Storefront/2.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(TWO_ARTICLES))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, &logs).with_user_agent("Storefront/2.0".to_string());
        assert!(client.fetch_news(&sports_preferences()).await.is_ok());
    }
}
