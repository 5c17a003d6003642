use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use super::models::{ErrorBody, Host, Metric};
use super::{host_by_name_path, metric_path, MetricQuery, MmsApi, API_PREFIX};
use crate::probe_modules::config::Credentials;
use crate::probe_modules::error::ProbeError;
use crate::version::VERSION;

/// HTTP client for the public API, one GET per call and no retries.
pub struct MmsClient {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl MmsClient {
    /// `timeout` bounds the connect phase and the whole exchange. Idle
    /// connections are never pooled, so every request dials fresh.
    pub fn new(
        server: &str,
        timeout: Duration,
        credentials: Option<Credentials>,
    ) -> Result<Self, ProbeError> {
        let builder = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .user_agent(format!("check_mongodb_mms/{VERSION}"));
        // Loopback test servers must not be routed through an ambient proxy.
        #[cfg(test)]
        let builder = builder.no_proxy();
        let client = builder
            .build()
            .map_err(|e| ProbeError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: server.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    async fn do_get(&self, path: &str) -> Result<String, ProbeError> {
        let url = Url::parse(&format!("{}{API_PREFIX}{path}", self.base_url))
            .map_err(|e| ProbeError::Config(format!("Invalid API URL. Error: {e}")))?;
        debug!(url = %url, "Sending API request.");

        let mut response = self.client.get(url.clone()).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            if let Some(credentials) = &self.credentials {
                if let Some(authorization) = digest_authorization(&response, credentials, &url)? {
                    debug!("Answering digest challenge.");
                    response = self
                        .client
                        .get(url.clone())
                        .header(AUTHORIZATION, authorization)
                        .send()
                        .await?;
                }
            }
        }

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ProbeError::Transport(format!("Failed to read HTTP response body. Error: {e}"))
        })?;
        debug!(status = status.as_u16(), bytes = body.len(), "Received API response.");

        if status != StatusCode::OK {
            return Err(handle_error(status.as_u16(), &body));
        }
        Ok(body)
    }
}

#[async_trait]
impl MmsApi for MmsClient {
    async fn fetch_host_by_name(
        &self,
        group_id: &str,
        hostname: &str,
    ) -> Result<Host, ProbeError> {
        let body = self.do_get(&host_by_name_path(group_id, hostname)).await?;
        decode_json(&body)
    }

    async fn fetch_metric(&self, query: &MetricQuery<'_>) -> Result<Metric, ProbeError> {
        let body = self.do_get(&metric_path(query)).await?;
        decode_json(&body)
    }
}

/// Builds the `Authorization` value answering a `WWW-Authenticate: Digest`
/// challenge. Returns `None` when the response carries no usable challenge,
/// leaving the 401 body to be reported as is.
fn digest_authorization(
    response: &Response,
    credentials: &Credentials,
    url: &Url,
) -> Result<Option<String>, ProbeError> {
    let Some(challenge) = response
        .headers()
        .get(WWW_AUTHENTICATE)
        .and_then(|value| value.to_str().ok())
    else {
        return Ok(None);
    };

    let mut prompt = match digest_auth::parse(challenge) {
        Ok(prompt) => prompt,
        Err(e) => {
            warn!(error = %e, "Server sent a non-digest authentication challenge.");
            return Ok(None);
        }
    };

    let request_uri = match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    };
    let context = digest_auth::AuthContext::new(
        credentials.username.as_str(),
        credentials.api_key.as_str(),
        request_uri.as_str(),
    );
    let answer = prompt.respond(&context).map_err(|e| ProbeError::Auth {
        status: StatusCode::UNAUTHORIZED.as_u16(),
        reason: "Unauthorized".to_string(),
        detail: format!("could not answer digest challenge: {e}"),
    })?;
    Ok(Some(answer.to_header_string()))
}

fn decode_json<T: DeserializeOwned>(body: &str) -> Result<T, ProbeError> {
    serde_json::from_str(body).map_err(|e| {
        ProbeError::Decode(format!(
            "Response did not contain valid JSON. Error: {e}, Body: {body}"
        ))
    })
}

fn handle_error(status: u16, body: &str) -> ProbeError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(error_body) => ProbeError::from_status(
            status,
            error_body.reason.unwrap_or_else(|| "<none>".to_string()),
            error_body.detail.unwrap_or_else(|| "<none>".to_string()),
        ),
        Err(_) => ProbeError::Decode(format!(
            "API response did not contain valid JSON. Body: {body}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe_modules::config::Granularity;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    const HOST_JSON: &str = r#"{"id":"h1","hostname":"db1","port":27017,"lastPing":"2015-06-01T12:00:00Z"}"#;

    fn http_response(status: &str, extra_headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{extra_headers}\r\n{body}",
            body.len()
        )
    }

    /// Answers one connection per canned response and hands back the raw
    /// request heads it saw.
    async fn serve(responses: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 16 * 1024];
                let mut read = 0;
                loop {
                    let n = socket.read(&mut buf[read..]).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    read += n;
                    if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                requests.push(String::from_utf8_lossy(&buf[..read]).into_owned());
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
            requests
        });
        (format!("http://{addr}"), handle)
    }

    fn client(server: &str, credentials: Option<Credentials>) -> MmsClient {
        MmsClient::new(server, Duration::from_secs(5), credentials).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_host_by_name() {
        let (server, handle) = serve(vec![http_response("200 OK", "", HOST_JSON)]).await;
        let host = client(&server, None)
            .fetch_host_by_name("grp", "db1:27017")
            .await
            .unwrap();
        assert_eq!(host.id, "h1");

        let requests = handle.await.unwrap();
        assert!(requests[0].starts_with("GET /api/public/v1.0/groups/grp/hosts/byName/db1:27017 HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_fetch_db_metric_path_is_encoded() {
        let body = r#"{"metricName":"DB_STORAGE_TOTAL","dataPoints":[]}"#;
        let (server, handle) = serve(vec![http_response("200 OK", "", body)]).await;
        let query = MetricQuery {
            group_id: "grp",
            host_id: "h1",
            metric_name: "DB_STORAGE_TOTAL",
            granularity: Granularity::Minute,
            period: "1H",
            db_name: Some("sales db/2015"),
        };
        let metric = client(&server, None).fetch_metric(&query).await.unwrap();
        assert!(metric.data_points.is_empty());

        let requests = handle.await.unwrap();
        assert!(requests[0].starts_with(
            "GET /api/public/v1.0/groups/grp/hosts/h1/metrics/DB_STORAGE_TOTAL/sales%20db%2F2015?granularity=MINUTE&period=PT1H HTTP/1.1"
        ));
    }

    #[tokio::test]
    async fn test_structured_error_body() {
        let body = r#"{"error":404,"reason":"Not Found","detail":"No host with hostname db9 exists."}"#;
        let (server, _handle) = serve(vec![http_response("404 Not Found", "", body)]).await;
        let err = client(&server, None)
            .fetch_host_by_name("grp", "db9")
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::NotFound { status: 404, .. }));
        assert_eq!(err.to_string(), "API Error: Not Found (No host with hostname db9 exists.)");
    }

    #[tokio::test]
    async fn test_unstructured_error_body() {
        let (server, _handle) =
            serve(vec![http_response("502 Bad Gateway", "", "<html>bad gateway</html>")]).await;
        let err = client(&server, None)
            .fetch_host_by_name("grp", "db1")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ProbeError::Decode(
                "API response did not contain valid JSON. Body: <html>bad gateway</html>".into()
            )
        );
    }

    #[tokio::test]
    async fn test_malformed_success_body() {
        let (server, _handle) = serve(vec![http_response("200 OK", "", "{\"id\": 5")]).await;
        let err = client(&server, None)
            .fetch_host_by_name("grp", "db1")
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Decode(_)));
        assert!(err.to_string().starts_with("Response did not contain valid JSON. Error: "));
        assert!(err.to_string().ends_with("Body: {\"id\": 5"));
    }

    #[tokio::test]
    async fn test_answers_digest_challenge_once() {
        let challenge = "WWW-Authenticate: Digest realm=\"MMS Public API\", domain=\"\", nonce=\"abc123\", algorithm=MD5, qop=\"auth\", stale=false\r\n";
        let unauthorized = r#"{"error":401,"reason":"Unauthorized","detail":"You are not authorized for this resource."}"#;
        let (server, handle) = serve(vec![
            http_response("401 Unauthorized", challenge, unauthorized),
            http_response("200 OK", "", HOST_JSON),
        ])
        .await;
        let credentials = Credentials {
            username: "alice".into(),
            api_key: "secret".into(),
        };
        let host = client(&server, Some(credentials))
            .fetch_host_by_name("grp", "db1")
            .await
            .unwrap();
        assert_eq!(host.hostname, "db1");

        let requests = handle.await.unwrap();
        assert_eq!(requests.len(), 2);
        assert!(!requests[0].to_lowercase().contains("authorization:"));
        let second = requests[1].to_lowercase();
        assert!(second.contains("authorization: digest "));
        assert!(second.contains("username=\"alice\""));
    }

    #[tokio::test]
    async fn test_unauthorized_without_credentials() {
        let unauthorized = r#"{"reason":"Unauthorized","detail":"Missing credentials."}"#;
        let (server, _handle) =
            serve(vec![http_response("401 Unauthorized", "", unauthorized)]).await;
        let err = client(&server, None)
            .fetch_host_by_name("grp", "db1")
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Auth { status: 401, .. }));
        assert!(err.to_string().contains("Missing credentials."));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}"), None)
            .fetch_host_by_name("grp", "db1")
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Transport(_)));
        assert!(err.to_string().starts_with("Failed to make HTTP request. Error: "));
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _silent = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let api = MmsClient::new(&format!("http://{addr}"), Duration::from_millis(200), None).unwrap();
        let err = api.fetch_host_by_name("grp", "db1").await.unwrap_err();
        assert!(matches!(err, ProbeError::Transport(_)));
        assert!(err.to_string().contains("timed out"));
    }
}
