//! Thin client for the hosted OpenAI HTTP API
//!
//! Every call is a single request with no retries. Callers decide which
//! failures are fatal and how they are reported.

use std::{io, sync::Arc};

use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use futures_util::{StreamExt, stream::BoxStream};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::models::Conversation;

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Answer clearly and concisely, and say so when you are unsure.";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// `None` disables every AI endpoint
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub vision_model: String,
    pub system_prompt: String,
}

impl OpenAiConfig {
    /// # Environment Variables
    /// - `OPEN_AI_SECRET_KEY`
    /// - `OPENAI_BASE_URL` (default: "https://api.openai.com/v1")
    /// - `OPENAI_MODEL` (default: "gpt-4")
    /// - `OPENAI_VISION_MODEL` (default: "gpt-4o")
    /// - `AI_SYSTEM_PROMPT`
    pub fn from_env() -> Self {
        let var = |name: &str, default: &str| {
            std::env::var(name).unwrap_or_else(|_| default.to_string())
        };

        Self {
            api_key: std::env::var("OPEN_AI_SECRET_KEY")
                .ok()
                .filter(|key| !key.is_empty()),
            base_url: var("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            model: var("OPENAI_MODEL", "gpt-4"),
            vision_model: var("OPENAI_VISION_MODEL", "gpt-4o"),
            system_prompt: var("AI_SYSTEM_PROMPT", DEFAULT_SYSTEM_PROMPT),
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Transcription {
    text: String,
}

#[derive(Deserialize)]
struct Images {
    data: Vec<Image>,
}

#[derive(Deserialize)]
struct Image {
    url: Option<String>,
}

/// One line of a server-sent event stream
#[derive(Debug, PartialEq)]
pub(crate) enum SseLine {
    Delta(String),
    Done,
    Skip,
}

pub(crate) fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return SseLine::Skip;
    };

    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map_or(SseLine::Skip, SseLine::Delta),
        Err(e) => {
            debug!("Skipping unparsable stream event: {}", e);
            SseLine::Skip
        }
    }
}

fn first_content(completion: ChatCompletion) -> Result<String> {
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| anyhow!("completion returned no content"))
}

#[derive(Clone)]
pub struct OpenAi {
    http: reqwest::Client,
    config: Arc<OpenAiConfig>,
}

impl OpenAi {
    pub fn new(http: reqwest::Client, config: OpenAiConfig) -> Self {
        Self {
            http,
            config: Arc::new(config),
        }
    }

    fn request(&self, path: &str) -> Result<reqwest::RequestBuilder> {
        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("OPEN_AI_SECRET_KEY is not configured"))?;

        Ok(self
            .http
            .post(format!("{}{}", self.config.base_url, path))
            .bearer_auth(key))
    }

    fn completion_body(&self, messages: Vec<Value>, stream: bool) -> Value {
        json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": 0.5,
            "max_tokens": 1000,
            "stream": stream,
        })
    }

    /// Answer the last turn of a stored chat history
    pub async fn complete(&self, history: &[Conversation]) -> Result<String> {
        let mut messages = vec![json!({ "role": "system", "content": self.config.system_prompt })];
        messages.extend(
            history
                .iter()
                .map(|c| json!({ "role": c.role, "content": c.content })),
        );

        let completion: ChatCompletion = self
            .request("/chat/completions")?
            .json(&self.completion_body(messages, false))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        first_content(completion)
    }

    /// Start a streamed completion and yield the text of each delta.
    ///
    /// Errors returned here happen before any byte reaches the client.
    pub async fn stream(
        &self,
        text: &str,
    ) -> Result<BoxStream<'static, Result<Bytes, io::Error>>> {
        let messages = vec![
            json!({ "role": "system", "content": self.config.system_prompt }),
            json!({ "role": "user", "content": text }),
        ];

        let response = self
            .request("/chat/completions")?
            .json(&self.completion_body(messages, true))
            .send()
            .await?
            .error_for_status()?;

        let mut upstream = response.bytes_stream();

        let relay = async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk) = upstream.next().await {
                match chunk {
                    Ok(bytes) => buffer.extend_from_slice(&bytes),
                    Err(e) => {
                        yield Err(io::Error::other(e));
                        return;
                    }
                }

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    match parse_sse_line(&String::from_utf8_lossy(&line)) {
                        SseLine::Delta(content) => yield Ok(Bytes::from(content)),
                        SseLine::Done => return,
                        SseLine::Skip => {}
                    }
                }
            }
        };

        Ok(relay.boxed())
    }

    pub async fn transcribe(&self, audio: Vec<u8>, file_name: &str, mime: &str) -> Result<String> {
        let file = Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(mime)?;

        let form = Form::new()
            .text("model", "whisper-1")
            .text("language", "en")
            .text("response_format", "json")
            .part("file", file);

        let transcription: Transcription = self
            .request("/audio/transcriptions")?
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(transcription.text)
    }

    /// Generate one image and return its hosted URL
    pub async fn image(&self, prompt: &str) -> Result<String> {
        let images: Images = self
            .request("/images/generations")?
            .json(&json!({
                "model": "dall-e-3",
                "prompt": prompt,
                "n": 1,
                "size": "1024x1024",
                "style": "natural",
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        images
            .data
            .into_iter()
            .next()
            .and_then(|image| image.url)
            .context("image generation returned no URL")
    }

    /// MP3 bytes of `text` read aloud
    pub async fn speech(&self, text: &str) -> Result<Vec<u8>> {
        let audio = self
            .request("/audio/speech")?
            .json(&json!({
                "model": "tts-1-hd",
                "voice": "alloy",
                "input": text,
                "response_format": "mp3",
            }))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        Ok(audio.to_vec())
    }

    pub async fn vision(&self, text: &str, urls: &[String]) -> Result<String> {
        let mut content = vec![json!({ "type": "text", "text": text })];
        content.extend(
            urls.iter()
                .map(|url| json!({ "type": "image_url", "image_url": { "url": url } })),
        );

        let completion: ChatCompletion = self
            .request("/chat/completions")?
            .json(&json!({
                "model": self.config.vision_model,
                "messages": [{ "role": "user", "content": content }],
                "max_tokens": 1000,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        first_content(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_line() {
        let delta = r#"data: {"choices":[{"index":0,"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_sse_line(delta), SseLine::Delta("Hel".to_string()));

        let role_only = r#"data: {"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_line(role_only), SseLine::Skip);

        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_sse_line(""), SseLine::Skip);
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_any_request() {
        let client = OpenAi::new(
            reqwest::Client::new(),
            OpenAiConfig {
                api_key: None,
                base_url: "http://127.0.0.1:1".to_string(),
                model: "gpt-4".to_string(),
                vision_model: "gpt-4o".to_string(),
                system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            },
        );

        let err = client.image("a cat").await.unwrap_err();
        assert!(err.to_string().contains("OPEN_AI_SECRET_KEY"));
        assert!(client.stream("hi").await.is_err());
    }

    async fn serve_completion_stream(chunks: Vec<Vec<u8>>) -> String {
        use axum::{Router, body::Body, http::HeaderMap, routing::post};

        let app = Router::new().route(
            "/chat/completions",
            post(move |headers: HeaderMap, axum::Json(body): axum::Json<Value>| async move {
                assert_eq!(headers["authorization"], "Bearer test-key");
                assert_eq!(body["stream"], true);
                let chunks = chunks.into_iter().map(Ok::<_, io::Error>);
                Body::from_stream(futures_util::stream::iter(chunks))
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_stream_reassembles_split_events_and_stops_at_done() {
        let first = "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Héllo\"}}]}\n\n";
        let split = first.find('é').unwrap() + 1;
        let first = first.as_bytes();

        let chunks = vec![
            first[..split].to_vec(),
            first[split..].to_vec(),
            b": keep-alive\n\ndata: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\" world\"}}]}"
                .to_vec(),
            b"\n\ndata: [DONE]\n\n".to_vec(),
            b"data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"!\"}}]}\n\n".to_vec(),
        ];

        let client = OpenAi::new(
            reqwest::Client::new(),
            OpenAiConfig {
                api_key: Some("test-key".to_string()),
                base_url: serve_completion_stream(chunks).await,
                model: "gpt-4".to_string(),
                vision_model: "gpt-4o".to_string(),
                system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            },
        );

        let parts: Vec<Bytes> = client
            .stream("hi")
            .await
            .unwrap()
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;

        let text = String::from_utf8(parts.concat()).unwrap();
        assert_eq!(text, "Héllo world");
    }

    #[test]
    fn test_first_content() {
        let completion: ChatCompletion = serde_json::from_value(json!({
            "choices": [{ "message": { "role": "assistant", "content": "Hi there" } }]
        }))
        .unwrap();
        assert_eq!(first_content(completion).unwrap(), "Hi there");

        let empty: ChatCompletion = serde_json::from_value(json!({ "choices": [] })).unwrap();
        assert!(first_content(empty).is_err());
    }
}
