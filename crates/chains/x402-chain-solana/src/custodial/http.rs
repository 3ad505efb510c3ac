//! JSON-over-HTTP plumbing shared by the custodian and wallet directory clients.

use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Errors that can occur while talking to a custodial REST service.
#[derive(Debug, thiserror::Error)]
pub enum HttpClientError {
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("HTTP error: {context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        context: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

/// Deadline applied to every request unless overridden with [`JsonHttpClient::with_timeout`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Pooled `reqwest` client with a base URL and headers attached to every request.
#[derive(Clone, Debug)]
pub struct JsonHttpClient {
    client: Client,
    base_url: Url,
    headers: HeaderMap,
    timeout: Duration,
}

impl JsonHttpClient {
    /// Normalizes `base_url` to end with a single slash so relative joins keep its path.
    pub fn new(base_url: &Url) -> Result<Self, HttpClientError> {
        let mut normalized = base_url.as_str().trim_end_matches('/').to_string();
        normalized.push('/');
        let base_url = Url::parse(&normalized).map_err(|e| HttpClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        Ok(Self {
            client: Client::new(),
            base_url,
            headers: HeaderMap::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves a path relative to the base URL.
    pub fn url(&self, path: &str, context: &'static str) -> Result<Url, HttpClientError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| HttpClientError::UrlParse { context, source: e })
    }

    /// POSTs `payload` as JSON and decodes a JSON response.
    ///
    /// `context` names the call in error messages (e.g. `"POST /wallets/{address}/transactions"`).
    pub async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, HttpClientError>
    where
        T: serde::Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let req = self.client.post(url.clone()).json(payload);
        self.execute(req, context).await
    }

    /// GETs a JSON response.
    pub async fn get_json<R>(&self, url: &Url, context: &'static str) -> Result<R, HttpClientError>
    where
        R: serde::de::DeserializeOwned,
    {
        let req = self.client.get(url.clone());
        self.execute(req, context).await
    }

    async fn execute<R>(
        &self,
        mut req: reqwest::RequestBuilder,
        context: &'static str,
    ) -> Result<R, HttpClientError>
    where
        R: serde::de::DeserializeOwned,
    {
        for (key, value) in self.headers.iter() {
            req = req.header(key, value);
        }
        let http_response = req
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| HttpClientError::Http { context, source: e })?;

        if http_response.status().is_success() {
            http_response
                .json::<R>()
                .await
                .map_err(|e| HttpClientError::JsonDeserialization { context, source: e })
        } else {
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|e| HttpClientError::ResponseBodyRead { context, source: e })?;
            Err(HttpClientError::HttpStatus {
                context,
                status,
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pong {
        ok: bool,
    }

    #[test]
    fn test_url_keeps_base_path() {
        let client = JsonHttpClient::new(&Url::parse("https://custodian.test/api/v1").unwrap())
            .unwrap();
        let url = client.url("/wallets/abc", "test").unwrap();
        assert_eq!(url.as_str(), "https://custodian.test/api/v1/wallets/abc");
    }

    #[tokio::test]
    async fn test_get_json_sends_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header("x-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = HeaderMap::new();
        headers.insert("X-API-KEY", "secret".parse().unwrap());
        let client = JsonHttpClient::new(&server.uri().parse().unwrap())
            .unwrap()
            .with_headers(headers);
        let url = client.url("ping", "GET /ping").unwrap();
        let pong: Pong = client.get_json(&url, "GET /ping").await.unwrap();
        assert_eq!(pong, Pong { ok: true });
    }

    #[tokio::test]
    async fn test_non_success_status_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let client = JsonHttpClient::new(&server.uri().parse().unwrap()).unwrap();
        let url = client.url("ping", "POST /ping").unwrap();
        let err = client
            .post_json::<_, Pong>(&url, "POST /ping", &serde_json::json!({}))
            .await
            .unwrap_err();
        match err {
            HttpClientError::HttpStatus { status, body, .. } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "busy");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unresponsive_server_hits_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"ok": true}))
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let client = JsonHttpClient::new(&server.uri().parse().unwrap())
            .unwrap()
            .with_timeout(Duration::from_millis(100));
        let url = client.url("ping", "GET /ping").unwrap();
        let err = tokio::time::timeout(
            Duration::from_secs(5),
            client.get_json::<Pong>(&url, "GET /ping"),
        )
        .await
        .expect("request outlived its deadline")
        .unwrap_err();
        match err {
            HttpClientError::Http { source, .. } => assert!(source.is_timeout()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_requests_have_a_deadline_by_default() {
        let client = JsonHttpClient::new(&Url::parse("https://custodian.test").unwrap()).unwrap();
        assert_eq!(client.timeout(), DEFAULT_REQUEST_TIMEOUT);
    }
}
