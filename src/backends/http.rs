//! HTTP client for the remote assistant
//!
//! Endpoints are relative to the configured base URL. Requests carry the
//! access token as a bearer token; a 401 surfaces as
//! [`ApiError::Unauthorized`] so the caller's refresh policy can run.

use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::blocking::{multipart, Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::BackendError;
use crate::collab::{ApiError, RemoteApi, Tokens};

const LOGIN_ENDPOINT: &str = "users/login/";
const REFRESH_ENDPOINT: &str = "users/token/refresh/";
const TRANSCRIBE_ENDPOINT: &str = "transcribe-audio/";
const CHAT_ENDPOINT: &str = "chat/";

const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(120);
const CHAT_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct TokenResponse {
    access: String,
    refresh: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    response: String,
}

pub struct HttpApiClient {
    client: Client,
    base_url: String,
    probe_addr: SocketAddr,
    probe_timeout: Duration,
    tokens: Mutex<Option<Tokens>>,
}

impl HttpApiClient {
    /// Build the client. Must not run inside an async context.
    pub fn new(
        base_url: &str,
        probe_addr: SocketAddr,
        probe_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            client,
            base_url,
            probe_addr,
            probe_timeout,
            tokens: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn access_token(&self) -> Result<String, ApiError> {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|tokens| tokens.access.clone())
            .ok_or(ApiError::NotLoggedIn)
    }

    fn store_tokens(&self, tokens: Tokens) {
        *self.tokens.lock().unwrap_or_else(|e| e.into_inner()) = Some(tokens);
    }
}

/// Map non-success statuses onto API errors
fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized);
    }
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: body.trim().to_string(),
        });
    }
    Ok(response)
}

fn transport(e: reqwest::Error) -> ApiError {
    ApiError::Transport(e.to_string())
}

fn image_mime(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

fn file_part(path: &Path, mime: &str) -> Result<multipart::Part, ApiError> {
    let bytes = std::fs::read(path).map_err(|_| ApiError::MissingFile(path.to_path_buf()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    multipart::Part::bytes(bytes)
        .file_name(name)
        .mime_str(mime)
        .map_err(transport)
}

impl RemoteApi for HttpApiClient {
    fn is_connected(&self) -> bool {
        match TcpStream::connect_timeout(&self.probe_addr, self.probe_timeout) {
            Ok(_) => true,
            Err(e) => {
                debug!(addr = %self.probe_addr, error = %e, "connectivity probe failed");
                false
            }
        }
    }

    fn login(&self, username: &str, password: &str) -> Result<Tokens, ApiError> {
        let response = self
            .client
            .post(self.endpoint(LOGIN_ENDPOINT))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .map_err(transport)?;

        let body: TokenResponse = check(response)?
            .json()
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        let tokens = Tokens {
            access: body.access,
            refresh: body.refresh,
        };
        self.store_tokens(tokens.clone());
        info!(username, "logged in to remote assistant");
        Ok(tokens)
    }

    fn refresh_token(&self) -> bool {
        let refresh = self
            .tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .and_then(|tokens| tokens.refresh.clone());
        let Some(refresh) = refresh else {
            warn!("no refresh token available");
            return false;
        };

        let response = self
            .client
            .post(self.endpoint(REFRESH_ENDPOINT))
            .json(&serde_json::json!({ "refresh": refresh }))
            .send();
        let body: TokenResponse = match response.map_err(transport).and_then(check) {
            Ok(response) => match response.json() {
                Ok(body) => body,
                Err(e) => {
                    warn!(error = %e, "unreadable token refresh response");
                    return false;
                }
            },
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                return false;
            }
        };

        self.store_tokens(Tokens {
            access: body.access,
            refresh: body.refresh.or(Some(refresh)),
        });
        info!("access token refreshed");
        true
    }

    fn transcribe_audio(&self, audio: &Path) -> Result<String, ApiError> {
        if !audio.exists() {
            return Err(ApiError::MissingFile(audio.to_path_buf()));
        }
        let token = self.access_token()?;
        let form = multipart::Form::new().part("audio", file_part(audio, "audio/wav")?);

        let response = self
            .client
            .post(self.endpoint(TRANSCRIBE_ENDPOINT))
            .bearer_auth(token)
            .multipart(form)
            .timeout(TRANSCRIBE_TIMEOUT)
            .send()
            .map_err(transport)?;

        let text = check(response)?
            .text()
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(text.trim().to_string())
    }

    fn send_chat(&self, prompt: &str, image: Option<&Path>) -> Result<String, ApiError> {
        let token = self.access_token()?;
        let mut form = multipart::Form::new().text("prompt", prompt.to_string());
        if let Some(image) = image.filter(|path| path.exists()) {
            form = form.part("image", file_part(image, image_mime(image))?);
        }

        let response = self
            .client
            .post(self.endpoint(CHAT_ENDPOINT))
            .bearer_auth(token)
            .multipart(form)
            .timeout(CHAT_TIMEOUT)
            .send()
            .map_err(transport)?;

        let body: ChatResponse = check(response)?
            .json()
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(body.response.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    use super::*;

    /// Answer exactly one request with `status` and a JSON `body`, returning
    /// the request head and body
    fn serve_once(status: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}/api/", listener.local_addr().unwrap());
        let reply = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut head = String::new();
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
                head.push_str(&line);
                if line == "\r\n" {
                    break;
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();
            reader.get_mut().write_all(reply.as_bytes()).unwrap();
            head + &String::from_utf8_lossy(&body)
        });

        (base_url, handle)
    }

    fn client(base_url: &str) -> HttpApiClient {
        HttpApiClient::new(
            base_url,
            "127.0.0.1:9".parse().unwrap(),
            Duration::from_millis(200),
        )
        .unwrap()
    }

    #[test]
    fn test_login_stores_tokens() {
        let (base_url, server) = serve_once("200 OK", r#"{"access":"a1","refresh":"r1"}"#);
        let api = client(&base_url);

        let tokens = api.login("amal", "secret").unwrap();
        assert_eq!(tokens.access, "a1");
        assert_eq!(tokens.refresh.as_deref(), Some("r1"));
        assert_eq!(api.access_token().unwrap(), "a1");

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /api/users/login/ "));
        assert!(request.contains(r#""username":"amal""#));
    }

    #[test]
    fn test_unauthorized_status_is_mapped() {
        let (base_url, server) = serve_once("401 Unauthorized", r#"{"detail":"expired"}"#);
        let api = client(&base_url);
        api.store_tokens(Tokens {
            access: "stale".to_string(),
            refresh: None,
        });

        let err = api.send_chat("hello", None).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));

        let request = server.join().unwrap();
        assert!(request.contains("authorization: Bearer stale") || request.contains("Authorization: Bearer stale"));
    }

    #[test]
    fn test_chat_reply_is_trimmed() {
        let (base_url, server) = serve_once("200 OK", r#"{"response":"  It is noon. \n"}"#);
        let api = client(&base_url);
        api.store_tokens(Tokens {
            access: "a1".to_string(),
            refresh: None,
        });

        assert_eq!(api.send_chat("what time is it", None).unwrap(), "It is noon.");
        let request = server.join().unwrap();
        assert!(request.contains("what time is it"));
    }

    #[test]
    fn test_server_error_keeps_body() {
        let (base_url, _server) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#);
        let api = client(&base_url);
        api.store_tokens(Tokens {
            access: "a1".to_string(),
            refresh: None,
        });

        match api.send_chat("hi", None).unwrap_err() {
            ApiError::Status { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("boom"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_calls_without_login() {
        let api = client("http://127.0.0.1:9/api");
        assert!(matches!(api.send_chat("hi", None), Err(ApiError::NotLoggedIn)));
        assert!(!api.refresh_token());
    }

    #[test]
    fn test_missing_audio_file() {
        let api = client("http://127.0.0.1:9/api/");
        let err = api
            .transcribe_audio(Path::new("/nonexistent/recording.wav"))
            .unwrap_err();
        assert!(matches!(err, ApiError::MissingFile(_)));
    }

    #[test]
    fn test_connectivity_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let api = HttpApiClient::new("http://localhost/", addr, Duration::from_secs(1)).unwrap();
        assert!(api.is_connected());

        drop(listener);
        assert!(!api.is_connected());
    }

    #[test]
    fn test_endpoint_join_and_mime() {
        let api = client("http://host/api");
        assert_eq!(api.endpoint(CHAT_ENDPOINT), "http://host/api/chat/");
        assert_eq!(image_mime(Path::new("shot.JPG")), "image/jpeg");
        assert_eq!(image_mime(Path::new("shot")), "application/octet-stream");
    }
}
