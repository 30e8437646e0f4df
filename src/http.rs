//! json-over-http implementation of both services.
//!
//! native: blocking `ureq` calls moved onto tokio's blocking pool, so this
//! backend must be driven from inside a tokio runtime (the plugin's
//! `TokioRt` does that). wasm: `gloo-net` fetch.

use crate::config::EndpointConfig;
use crate::remote::{
    ChatBody, ChatReply, ChatService, QuizService, RemoteError, StatusBody, StatusReply,
    SubmitBody, SubmitReply, decode,
};
use crate::scorer::BiasLabel;
use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct HttpBackend {
    endpoints: EndpointConfig,
    #[cfg(not(target_arch = "wasm32"))]
    agent: ureq::Agent,
}

impl HttpBackend {
    pub fn new(endpoints: EndpointConfig) -> Self {
        #[cfg(not(target_arch = "wasm32"))]
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(endpoints.timeout()))
            .build()
            .into();
        Self {
            endpoints,
            #[cfg(not(target_arch = "wasm32"))]
            agent,
        }
    }

    pub fn endpoints(&self) -> &EndpointConfig {
        &self.endpoints
    }

    async fn post<B: Serialize>(&self, url: String, body: &B) -> Result<String, RemoteError> {
        let payload = serde_json::to_string(body).map_err(|e| RemoteError::Decode(e.to_string()))?;
        #[cfg(not(target_arch = "wasm32"))]
        {
            post_native(self.agent.clone(), url, payload).await
        }
        #[cfg(target_arch = "wasm32")]
        {
            post_wasm(url, payload).await
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
async fn post_native(agent: ureq::Agent, url: String, payload: String) -> Result<String, RemoteError> {
    tokio::task::spawn_blocking(move || {
        let res = agent
            .post(&url)
            .header("content-type", "application/json")
            .header("accept", "application/json")
            .send(payload)
            .map_err(map_ureq)?;
        // ureq 3.1: read body via Body::read_to_string()
        res.into_body().read_to_string().map_err(map_ureq)
    })
    .await
    .map_err(|e| RemoteError::Network(format!("request task failed: {e}")))?
}

#[cfg(not(target_arch = "wasm32"))]
fn map_ureq(err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::StatusCode(code) => RemoteError::Server {
            status: Some(code),
            message: format!("http status {code}"),
        },
        other => RemoteError::Network(other.to_string()),
    }
}

#[cfg(target_arch = "wasm32")]
async fn post_wasm(url: String, payload: String) -> Result<String, RemoteError> {
    use gloo_net::http::Request;

    let req = Request::post(&url)
        .header("content-type", "application/json")
        .header("accept", "application/json")
        .body(payload)
        .map_err(|e| RemoteError::Network(e.to_string()))?;
    let resp = req.send().await.map_err(|e| RemoteError::Network(e.to_string()))?;
    if !resp.ok() {
        return Err(RemoteError::Server {
            status: Some(resp.status()),
            message: resp.status_text(),
        });
    }
    resp.text().await.map_err(|e| RemoteError::Network(e.to_string()))
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl QuizService for HttpBackend {
    async fn check_status(&self, identity: &str) -> Result<bool, RemoteError> {
        let body = StatusBody { username: identity };
        let text = self.post(self.endpoints.status_url(), &body).await?;
        Ok(decode::<StatusReply>(&text)?.taken)
    }

    async fn submit(&self, answers: &[String], identity: &str) -> Result<BiasLabel, RemoteError> {
        let body = SubmitBody::new(self.endpoints.identity_field, answers, identity);
        let text = self.post(self.endpoints.submit_url(), &body).await?;
        Ok(decode::<SubmitReply>(&text)?.bias)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ChatService for HttpBackend {
    async fn chat(&self, prompt: &str, identity: &str) -> Result<String, RemoteError> {
        let body = ChatBody {
            prompt,
            username: (!identity.is_empty()).then_some(identity),
        };
        let text = self.post(self.endpoints.chat_url(), &body).await?;
        Ok(decode::<ChatReply>(&text)?.response)
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::config::IdentityField;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// serves one request with `status`/`body`, hands back the request body.
    fn one_shot_server(status: u16, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                let lower = line.to_ascii_lowercase();
                if let Some(v) = lower.strip_prefix("content-length:") {
                    content_length = v.trim().parse().unwrap();
                }
            }
            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).unwrap();

            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
            stream.flush().unwrap();
            String::from_utf8(request_body).unwrap()
        });
        (base, handle)
    }

    #[tokio::test]
    async fn legacy_submit_sends_user_id() {
        let (base, server) = one_shot_server(200, r#"{"bias":"left"}"#);
        let backend = HttpBackend::new(EndpointConfig::legacy(base));
        let answers = vec!["yes".to_string(), "no".to_string()];

        let bias = backend.submit(&answers, "anon-1").await.unwrap();
        assert_eq!(bias, BiasLabel::Left);

        let sent: serde_json::Value = serde_json::from_str(&server.join().unwrap()).unwrap();
        assert_eq!(sent, serde_json::json!({"answers": ["yes", "no"], "user_id": "anon-1"}));
        assert_eq!(backend.endpoints().identity_field, IdentityField::UserId);
    }

    #[tokio::test]
    async fn chat_reads_response_field() {
        let (base, server) = one_shot_server(200, r#"{"response":"hi there"}"#);
        let backend = HttpBackend::new(EndpointConfig::new(base));

        let reply = backend.chat("hello", "ana").await.unwrap();
        assert_eq!(reply, "hi there");

        let sent: serde_json::Value = serde_json::from_str(&server.join().unwrap()).unwrap();
        assert_eq!(sent, serde_json::json!({"prompt": "hello", "username": "ana"}));
    }

    #[tokio::test]
    async fn non_success_status_is_server_error() {
        let (base, server) = one_shot_server(500, r#"{"error":"boom"}"#);
        let backend = HttpBackend::new(EndpointConfig::new(base));

        let err = backend.check_status("ana").await.unwrap_err();
        assert!(matches!(err, RemoteError::Server { status: Some(500), .. }));
        server.join().unwrap();
    }

    #[tokio::test]
    async fn bad_body_is_decode_error() {
        let (base, server) = one_shot_server(200, r#"{"taken":"maybe"}"#);
        let backend = HttpBackend::new(EndpointConfig::new(base));

        let err = backend.check_status("ana").await.unwrap_err();
        assert!(matches!(err, RemoteError::Decode(_)));
        server.join().unwrap();
    }

    #[tokio::test]
    async fn refused_connection_is_network_failure() {
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let backend = HttpBackend::new(EndpointConfig::new(format!("http://127.0.0.1:{port}")));

        let err = backend.chat("hello", "").await.unwrap_err();
        assert!(err.is_network(), "got {err:?}");
    }
}
