use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::domain::models::UserSession;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("sync service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("sync service rejected login with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Credentials {
    Anonymous,
    ApiKey(String),
}

impl Credentials {
    fn provider(&self) -> &'static str {
        match self {
            Self::Anonymous => "anon-user",
            Self::ApiKey(_) => "api-key",
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            Self::Anonymous => json!({}),
            Self::ApiKey(key) => json!({ "key": key }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    user_id: String,
    device_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SyncAuthClient {
    http: reqwest::Client,
    base_url: String,
}

impl SyncAuthClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn login_url(&self, app_id: &str, credentials: &Credentials) -> String {
        format!(
            "{}/api/client/v2.0/app/{}/auth/providers/{}/login",
            self.base_url,
            app_id,
            credentials.provider()
        )
    }

    pub async fn login(
        &self,
        app_id: &str,
        credentials: &Credentials,
    ) -> Result<UserSession, AuthError> {
        let response = self
            .http
            .post(self.login_url(app_id, credentials))
            .json(&credentials.body())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let login: LoginResponse = response.json().await?;
        tracing::debug!(user_id = %login.user_id, provider = credentials.provider(), "sync login succeeded");

        Ok(UserSession {
            user_id: login.user_id,
            device_id: login.device_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    use super::{AuthError, Credentials, SyncAuthClient};

    struct CapturedRequest {
        request_line: String,
        body: String,
    }

    // Answers exactly one HTTP request with the given status and body.
    fn spawn_responder(
        status_line: &'static str,
        response_body: &'static str,
    ) -> (String, JoinHandle<CapturedRequest>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let port = listener
            .local_addr()
            .expect("addr should be available")
            .port();

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("client should connect");
            let mut reader = BufReader::new(stream.try_clone().expect("stream should clone"));

            let mut request_line = String::new();
            reader
                .read_line(&mut request_line)
                .expect("request line should be readable");

            let mut content_length = 0_usize;
            loop {
                let mut header = String::new();
                reader.read_line(&mut header).expect("header should be readable");
                let header = header.trim_end();
                if header.is_empty() {
                    break;
                }
                if let Some((name, value)) = header.split_once(':')
                    && name.eq_ignore_ascii_case("content-length")
                {
                    content_length = value.trim().parse().expect("length should parse");
                }
            }

            let mut body = vec![0_u8; content_length];
            reader.read_exact(&mut body).expect("body should be readable");

            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{response_body}",
                response_body.len()
            );
            let mut stream = stream;
            stream
                .write_all(response.as_bytes())
                .expect("response should be written");

            CapturedRequest {
                request_line: request_line.trim_end().to_string(),
                body: String::from_utf8(body).expect("body should be utf-8"),
            }
        });

        (format!("http://127.0.0.1:{port}"), handle)
    }

    #[test]
    fn builds_login_url_per_provider() {
        let client = SyncAuthClient::new("https://sync.example.com/", Duration::from_secs(5))
            .expect("client should build");

        assert_eq!(
            client.login_url("demo-app", &Credentials::Anonymous),
            "https://sync.example.com/api/client/v2.0/app/demo-app/auth/providers/anon-user/login"
        );
        assert_eq!(
            client.login_url("demo-app", &Credentials::ApiKey("k".to_string())),
            "https://sync.example.com/api/client/v2.0/app/demo-app/auth/providers/api-key/login"
        );
    }

    #[actix_web::test]
    async fn anonymous_login_returns_user_session() {
        let (base_url, responder) = spawn_responder(
            "HTTP/1.1 200 OK",
            r#"{"access_token":"at","refresh_token":"rt","user_id":"user-1","device_id":"dev-1"}"#,
        );
        let client =
            SyncAuthClient::new(&base_url, Duration::from_secs(5)).expect("client should build");

        let session = client
            .login("demo-app", &Credentials::Anonymous)
            .await
            .expect("login should succeed");

        assert_eq!(session.user_id, "user-1");
        assert_eq!(session.device_id.as_deref(), Some("dev-1"));

        let captured = responder.join().expect("responder should finish");
        assert_eq!(
            captured.request_line,
            "POST /api/client/v2.0/app/demo-app/auth/providers/anon-user/login HTTP/1.1"
        );
        assert_eq!(captured.body, "{}");
    }

    #[actix_web::test]
    async fn api_key_login_sends_key_in_body() {
        let (base_url, responder) = spawn_responder(
            "HTTP/1.1 200 OK",
            r#"{"access_token":"at","user_id":"user-2"}"#,
        );
        let client =
            SyncAuthClient::new(&base_url, Duration::from_secs(5)).expect("client should build");

        let session = client
            .login("demo-app", &Credentials::ApiKey("secret".to_string()))
            .await
            .expect("login should succeed");

        assert_eq!(session.user_id, "user-2");
        assert_eq!(session.device_id, None);

        let captured = responder.join().expect("responder should finish");
        assert!(captured.request_line.contains("/auth/providers/api-key/login"));
        assert_eq!(captured.body, r#"{"key":"secret"}"#);
    }

    #[actix_web::test]
    async fn rejected_login_maps_to_error() {
        let (base_url, responder) = spawn_responder(
            "HTTP/1.1 401 Unauthorized",
            r#"{"error":"invalid app id"}"#,
        );
        let client =
            SyncAuthClient::new(&base_url, Duration::from_secs(5)).expect("client should build");

        let result = client.login("insert-key", &Credentials::Anonymous).await;

        match result {
            Err(AuthError::Rejected { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, r#"{"error":"invalid app id"}"#);
            }
            other => panic!("expected rejected login, got {other:?}"),
        }
        responder.join().expect("responder should finish");
    }
}
