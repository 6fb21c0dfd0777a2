//! Fallback-aware HTTP calls against the candidate endpoints
//!
//! `EndpointResolver::call` hides which physical host answers a request:
//! candidates are tried strictly in order and the first 2xx JSON response
//! wins. A candidate that fails (network error, timeout, non-2xx status, or
//! a body that is not JSON) is logged and skipped; only when every candidate
//! has failed does the caller see an error.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::endpoints::{candidate_urls, DeploymentEnv, SystemEnv};
use crate::error::{Result, TmsError};
use crate::io::{HttpClient, Method, ReqwestHttpClient};

/// Options for a single logical API call
///
/// Immutable once constructed; `timeout` falls back to the configured
/// request timeout when not set.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Option<Method>,
    pub data: Option<serde_json::Value>,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Outcome of probing one candidate endpoint
#[derive(Debug, Clone)]
pub struct EndpointProbe {
    pub url: String,
    pub reachable: bool,
    pub status: Option<u16>,
    pub error: Option<String>,
}

/// Fallback-aware client for the TMS backend
pub struct EndpointResolver {
    config: ApiConfig,
    env: Arc<dyn DeploymentEnv>,
    http: Arc<dyn HttpClient>,
}

impl EndpointResolver {
    /// Create a resolver with the production environment probe and HTTP client
    pub fn new(config: ApiConfig) -> Self {
        Self::with_parts(config, Arc::new(SystemEnv::new()), Arc::new(ReqwestHttpClient::new()))
    }

    /// Create a resolver with injected probe and HTTP client
    ///
    /// This is useful for testing without a network or a real environment.
    pub fn with_parts(
        config: ApiConfig,
        env: Arc<dyn DeploymentEnv>,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        Self { config, env, http }
    }

    /// The candidate base URLs in the order they would be tried right now
    pub fn candidates(&self) -> Vec<String> {
        candidate_urls(self.env.as_ref(), &self.config)
    }

    /// Call the backend, falling back through the candidate endpoints
    ///
    /// `path` must begin with `/`. Returns the parsed JSON payload from the
    /// first candidate that answers with a 2xx JSON body.
    pub async fn call(&self, path: &str, options: RequestOptions) -> Result<serde_json::Value> {
        if !path.starts_with('/') {
            return Err(TmsError::InvalidPath(format!(
                "Path must begin with '/': {}",
                path
            )));
        }

        let method = options.method.unwrap_or(Method::Get);
        let timeout = options
            .timeout
            .unwrap_or_else(|| Duration::from_secs(self.config.request_timeout_seconds));
        let headers = merge_headers(&options.headers);

        let candidates = self.candidates();
        let mut attempted = Vec::with_capacity(candidates.len());
        let mut last_error = TmsError::Config("No candidate endpoints".to_string());

        for base in &candidates {
            let url = format!("{}{}", base, path);
            debug!("Trying {} {}", method, url);
            attempted.push(url.clone());

            match self
                .attempt(method, &url, options.data.clone(), &headers, timeout)
                .await
            {
                Ok(value) => {
                    debug!("{} {} succeeded", method, url);
                    return Ok(value);
                }
                Err(e) => {
                    warn!("{} {} failed: {}", method, url, e);
                    last_error = e;
                }
            }
        }

        Err(TmsError::AllEndpointsFailed {
            attempted,
            last: Box::new(last_error),
        })
    }

    /// Typed convenience over [`call`](Self::call)
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T> {
        let value = self.call(path, options).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// One-shot reachability report for every candidate endpoint
    ///
    /// Unlike [`call`](Self::call) this does not stop at the first success;
    /// every candidate is probed so an operator can see which hosts answer.
    pub async fn probe(&self, path: &str) -> Vec<EndpointProbe> {
        let headers = merge_headers(&[]);
        let timeout = Duration::from_secs(self.config.request_timeout_seconds);

        let mut probes = Vec::new();
        for base in self.candidates() {
            let url = format!("{}{}", base, path);
            let probe = match self
                .http
                .request(Method::Get, &url, None, &headers, timeout)
                .await
            {
                Ok(response) => EndpointProbe {
                    url,
                    reachable: response.is_success(),
                    status: Some(response.status),
                    error: None,
                },
                Err(e) => EndpointProbe {
                    url,
                    reachable: false,
                    status: None,
                    error: Some(e.to_string()),
                },
            };
            probes.push(probe);
        }
        probes
    }

    async fn attempt(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        let response = self.http.request(method, url, body, headers, timeout).await?;

        if !response.is_success() {
            return Err(TmsError::Status {
                url: url.to_string(),
                status: response.status,
            });
        }

        Ok(serde_json::from_str(&response.body)?)
    }
}

/// Merge caller headers over the JSON defaults; caller values win on conflict
fn merge_headers(caller: &[(String, String)]) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = vec![
        ("Content-Type".to_string(), "application/json".to_string()),
        ("Accept".to_string(), "application/json".to_string()),
    ];
    for (name, value) in caller {
        if let Some(existing) = merged
            .iter_mut()
            .find(|(existing_name, _)| existing_name.eq_ignore_ascii_case(name))
        {
            existing.1 = value.clone();
        } else {
            merged.push((name.clone(), value.clone()));
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::MockDeploymentEnv;
    use crate::io::{HttpResponse, MockHttpClient};

    const LOCAL: &str = "http://localhost:8000";
    const DEPLOYED: &str = "https://tms.example.org";

    fn local_dev_env() -> MockDeploymentEnv {
        let mut env = MockDeploymentEnv::new();
        env.expect_host_name().returning(|| None);
        env.expect_production_mode().returning(|| false);
        env.expect_deployed_override().returning(|| None);
        env.expect_local_override().returning(|| None);
        env
    }

    fn config() -> ApiConfig {
        ApiConfig {
            local_url: LOCAL.to_string(),
            deployed_url: DEPLOYED.to_string(),
            ..ApiConfig::default()
        }
    }

    fn resolver(http: MockHttpClient) -> EndpointResolver {
        EndpointResolver::with_parts(config(), Arc::new(local_dev_env()), Arc::new(http))
    }

    fn ok_json(body: &str) -> Result<HttpResponse> {
        Ok(HttpResponse {
            status: 200,
            body: body.to_string(),
        })
    }

    #[tokio::test]
    async fn first_candidate_success_short_circuits() {
        let mut http = MockHttpClient::new();
        http.expect_request()
            .withf(|method, url, _, _, _| {
                *method == Method::Get && url == "http://localhost:8000/api/tickets"
            })
            .times(1)
            .returning(|_, _, _, _, _| Box::pin(async { ok_json(r#"[{"ticket_id":"T1"}]"#) }));

        let result = resolver(http)
            .call("/api/tickets", RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(result[0]["ticket_id"], "T1");
    }

    #[tokio::test]
    async fn network_failure_falls_back_to_next_candidate() {
        let mut http = MockHttpClient::new();
        http.expect_request()
            .withf(|_, url, _, _, _| url.starts_with(LOCAL))
            .times(1)
            .returning(|_, _, _, _, _| {
                Box::pin(async { Err(TmsError::Http("connection refused".to_string())) })
            });
        http.expect_request()
            .withf(|_, url, _, _, _| url.starts_with(DEPLOYED))
            .times(1)
            .returning(|_, _, _, _, _| Box::pin(async { ok_json(r#"{"ok":true}"#) }));

        let result = resolver(http)
            .call("/api/tickets", RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(result["ok"], true);
    }

    #[tokio::test]
    async fn timeout_falls_back_to_next_candidate() {
        let mut http = MockHttpClient::new();
        http.expect_request()
            .withf(|_, url, _, _, _| url.starts_with(LOCAL))
            .times(1)
            .returning(|_, _, _, _, _| {
                Box::pin(async { Err(TmsError::Timeout("timed out".to_string())) })
            });
        http.expect_request()
            .withf(|_, url, _, _, _| url.starts_with(DEPLOYED))
            .times(1)
            .returning(|_, _, _, _, _| Box::pin(async { ok_json("[]") }));

        let result = resolver(http)
            .call("/api/tickets", RequestOptions::default())
            .await
            .unwrap();
        assert!(result.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_2xx_status_falls_back_to_next_candidate() {
        let mut http = MockHttpClient::new();
        http.expect_request()
            .withf(|_, url, _, _, _| url.starts_with(LOCAL))
            .times(1)
            .returning(|_, _, _, _, _| {
                Box::pin(async {
                    Ok(HttpResponse {
                        status: 502,
                        body: "bad gateway".to_string(),
                    })
                })
            });
        http.expect_request()
            .withf(|_, url, _, _, _| url.starts_with(DEPLOYED))
            .times(1)
            .returning(|_, _, _, _, _| Box::pin(async { ok_json(r#"{"ok":true}"#) }));

        let result = resolver(http)
            .call("/api/tickets", RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(result["ok"], true);
    }

    #[tokio::test]
    async fn malformed_json_body_falls_back_to_next_candidate() {
        let mut http = MockHttpClient::new();
        http.expect_request()
            .withf(|_, url, _, _, _| url.starts_with(LOCAL))
            .times(1)
            .returning(|_, _, _, _, _| Box::pin(async { ok_json("<html>not json</html>") }));
        http.expect_request()
            .withf(|_, url, _, _, _| url.starts_with(DEPLOYED))
            .times(1)
            .returning(|_, _, _, _, _| Box::pin(async { ok_json(r#"{"ok":true}"#) }));

        let result = resolver(http)
            .call("/api/tickets", RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(result["ok"], true);
    }

    #[tokio::test]
    async fn all_candidates_failing_aggregates_the_error() {
        let mut http = MockHttpClient::new();
        http.expect_request()
            .times(2)
            .returning(|_, url, _, _, _| {
                let url = url.to_string();
                Box::pin(async move { Err(TmsError::Http(format!("{} refused", url))) })
            });

        let err = resolver(http)
            .call("/api/tickets", RequestOptions::default())
            .await
            .unwrap_err();

        match err {
            TmsError::AllEndpointsFailed { attempted, last } => {
                assert_eq!(
                    attempted,
                    vec![
                        "http://localhost:8000/api/tickets",
                        "https://tms.example.org/api/tickets"
                    ]
                );
                assert!(last.to_string().contains("tms.example.org"));
            }
            other => panic!("expected AllEndpointsFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn aggregated_error_mentions_all_endpoints_failed() {
        let mut http = MockHttpClient::new();
        http.expect_request()
            .returning(|_, _, _, _, _| {
                Box::pin(async { Err(TmsError::Http("refused".to_string())) })
            });

        let err = resolver(http)
            .call("/api/tickets", RequestOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("All API endpoints failed"));
    }

    #[tokio::test]
    async fn path_without_leading_slash_is_rejected() {
        let mut http = MockHttpClient::new();
        http.expect_request().times(0);

        let err = resolver(http)
            .call("api/tickets", RequestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TmsError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn default_headers_are_sent() {
        let mut http = MockHttpClient::new();
        http.expect_request()
            .withf(|_, _, _, headers, _| {
                headers.contains(&("Content-Type".to_string(), "application/json".to_string()))
                    && headers.contains(&("Accept".to_string(), "application/json".to_string()))
            })
            .times(1)
            .returning(|_, _, _, _, _| Box::pin(async { ok_json("{}") }));

        resolver(http)
            .call("/api/tickets", RequestOptions::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn caller_headers_win_on_conflict() {
        let mut http = MockHttpClient::new();
        http.expect_request()
            .withf(|_, _, _, headers, _| {
                headers.contains(&("Content-Type".to_string(), "text/plain".to_string()))
                    && headers.contains(&("X-Request-Id".to_string(), "abc".to_string()))
                    && !headers
                        .contains(&("Content-Type".to_string(), "application/json".to_string()))
            })
            .times(1)
            .returning(|_, _, _, _, _| Box::pin(async { ok_json("{}") }));

        let options = RequestOptions::default()
            .header("content-type", "text/plain")
            .header("X-Request-Id", "abc");
        resolver(http).call("/api/tickets", options).await.unwrap();
    }

    #[tokio::test]
    async fn method_and_body_are_passed_through() {
        let mut http = MockHttpClient::new();
        http.expect_request()
            .withf(|method, _, body, _, _| {
                *method == Method::Post
                    && body.as_ref().is_some_and(|b| b["message"] == "hello")
            })
            .times(1)
            .returning(|_, _, _, _, _| Box::pin(async { ok_json(r#"{"reply":"ok"}"#) }));

        let options = RequestOptions::default()
            .method(Method::Post)
            .data(serde_json::json!({"message": "hello"}));
        let result = resolver(http).call("/api/chat", options).await.unwrap();
        assert_eq!(result["reply"], "ok");
    }

    #[tokio::test]
    async fn explicit_timeout_overrides_configured_default() {
        let mut http = MockHttpClient::new();
        http.expect_request()
            .withf(|_, _, _, _, timeout| *timeout == Duration::from_secs(3))
            .times(1)
            .returning(|_, _, _, _, _| Box::pin(async { ok_json("{}") }));

        let options = RequestOptions::default().timeout(Duration::from_secs(3));
        resolver(http).call("/api/tickets", options).await.unwrap();
    }

    #[tokio::test]
    async fn call_as_deserializes_the_payload() {
        #[derive(serde::Deserialize)]
        struct Reply {
            reply: String,
        }

        let mut http = MockHttpClient::new();
        http.expect_request()
            .returning(|_, _, _, _, _| Box::pin(async { ok_json(r#"{"reply":"ok"}"#) }));

        let reply: Reply = resolver(http)
            .call_as("/api/chat", RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(reply.reply, "ok");
    }

    #[tokio::test]
    async fn probe_reports_every_candidate() {
        let mut http = MockHttpClient::new();
        http.expect_request()
            .withf(|_, url, _, _, _| url.starts_with(LOCAL))
            .times(1)
            .returning(|_, _, _, _, _| {
                Box::pin(async { Err(TmsError::Http("refused".to_string())) })
            });
        http.expect_request()
            .withf(|_, url, _, _, _| url.starts_with(DEPLOYED))
            .times(1)
            .returning(|_, _, _, _, _| Box::pin(async { ok_json("{}") }));

        let probes = resolver(http).probe("/api/tickets").await;
        assert_eq!(probes.len(), 2);
        assert!(!probes[0].reachable);
        assert!(probes[0].error.as_deref().unwrap().contains("refused"));
        assert!(probes[1].reachable);
        assert_eq!(probes[1].status, Some(200));
    }

    #[test]
    fn merge_headers_preserves_caller_only_headers() {
        let merged = merge_headers(&[("Authorization".to_string(), "Bearer t".to_string())]);
        assert_eq!(merged.len(), 3);
        assert!(merged.contains(&("Authorization".to_string(), "Bearer t".to_string())));
    }
}
