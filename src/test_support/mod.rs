//! Shared test doubles for the provider, observer and identity seams

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::services::credential_pool::Credential;
use crate::services::dispatcher::AttemptObserver;
use crate::services::gemini::{GenerationProvider, ProviderError};
use crate::services::identity::{IdentityVerifier, Principal, VerifyError};

pub const TEST_KID: &str = "test-kid";

const TEST_PRIVATE_KEY: &str = include_str!("rsa_test_key.pem");
const TEST_MODULUS: &str = include_str!("rsa_test_key.n");

/// JWK set holding the public half of the test signing key
pub fn test_key_set() -> JwkSet {
    serde_json::from_value(serde_json::json!({
        "keys": [{
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "kid": TEST_KID,
            "n": TEST_MODULUS.trim(),
            "e": "AQAB"
        }]
    }))
    .unwrap()
}

/// Sign claims with the test key as an RS256 JWT
pub fn sign_token(kid: &str, claims: &serde_json::Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(TEST_PRIVATE_KEY.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

/// Provider that succeeds only for scripted keys and records every call
#[derive(Default)]
pub struct ScriptedProvider {
    replies: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeed(mut self, api_key: &str, text: &str) -> Self {
        self.replies.insert(api_key.to_string(), text.to_string());
        self
    }

    pub fn delay(mut self, api_key: &str, delay: Duration) -> Self {
        self.delays.insert(api_key.to_string(), delay);
        self
    }

    /// API keys used, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn generate(&self, credential: &Credential, _prompt: &str) -> Result<String, ProviderError> {
        self.calls.lock().unwrap().push(credential.api_key().to_string());
        if let Some(delay) = self.delays.get(credential.api_key()) {
            tokio::time::sleep(*delay).await;
        }
        match self.replies.get(credential.api_key()) {
            Some(text) => Ok(text.clone()),
            None => Err(ProviderError::ApiError {
                code: 429,
                message: format!("quota exceeded for {}", credential.api_key()),
            }),
        }
    }
}

/// Observer that keeps the index of every failed attempt
#[derive(Default)]
pub struct RecordingObserver {
    failed: Mutex<Vec<usize>>,
}

impl RecordingObserver {
    pub fn failures(&self) -> Vec<usize> {
        self.failed.lock().unwrap().clone()
    }
}

impl AttemptObserver for RecordingObserver {
    fn attempt_failed(&self, credential: &Credential, _cause: &ProviderError) {
        self.failed.lock().unwrap().push(credential.index());
    }
}

/// Verifier that accepts exactly one token
pub struct StubVerifier {
    valid_token: String,
    calls: AtomicUsize,
}

/// Detail a real verifier would produce; must never reach a response body
pub const STUB_REJECTION_DETAIL: &str = "Firebase ID token has expired at 1700000000";

impl StubVerifier {
    pub fn accepting(token: &str) -> Self {
        Self {
            valid_token: token.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityVerifier for StubVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if token == self.valid_token {
            let mut principal = Principal::new("uid-123");
            principal.email = Some("student@example.com".to_string());
            Ok(principal)
        } else {
            Err(VerifyError::Rejected(STUB_REJECTION_DETAIL.to_string()))
        }
    }
}

/// Single-route HTTP/1.1 server on a loopback port
///
/// Answers every request with the same status and JSON body and keeps the
/// raw request text (head and body) for assertions.
pub struct StubHttpServer {
    addr: std::net::SocketAddr,
    requests: std::sync::Arc<Mutex<Vec<String>>>,
}

impl StubHttpServer {
    pub async fn start(status: u16, body: impl Into<String>) -> Self {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = std::sync::Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();
        let body = body.into();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let raw = read_http_request(&mut stream).await;
                recorded.lock().unwrap().push(raw);
                let response = format!(
                    "HTTP/1.1 {} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self { addr, requests }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Raw requests received so far, in arrival order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_http_request(stream: &mut tokio::net::TcpStream) -> String {
    use tokio::io::AsyncReadExt;

    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
