use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use snafu::prelude::*;
use tracing::{debug, info};

use super::{
    system_prompt, ClientSnafu, DecodeSnafu, DescriptionError, EmptyResponseSnafu,
    MissingApiKeySnafu, RequestSnafu, VisionDescriber,
};
use crate::exam::ExamCategory;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_MAX_TOKENS: u32 = 300;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Chat-completions client for OpenAI compatible vision models
pub struct OpenAiDescriber {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiDescriber {
    pub fn new(
        api_key: &str,
        endpoint: Option<&str>,
        model: Option<&str>,
        max_tokens: Option<u32>,
        timeout_secs: Option<u64>,
    ) -> Result<Self, DescriptionError> {
        ensure!(!api_key.trim().is_empty(), MissingApiKeySnafu);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)))
            .build()
            .context(ClientSnafu)?;

        Ok(Self {
            client,
            api_key: api_key.trim().to_string(),
            endpoint: endpoint.unwrap_or(DEFAULT_ENDPOINT).trim_end_matches('/').to_string(),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }

    fn request_body(&self, image: &[u8], mime_type: &str, category: ExamCategory) -> serde_json::Value {
        let b64 = STANDARD.encode(image);
        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt(category) },
                { "role": "user", "content": [
                    { "type": "image_url",
                      "image_url": { "url": format!("data:{};base64,{}", mime_type, b64) } }
                ]}
            ],
            "max_tokens": self.max_tokens
        })
    }
}

#[async_trait]
impl VisionDescriber for OpenAiDescriber {
    async fn describe(
        &self,
        image: &[u8],
        mime_type: &str,
        category: ExamCategory,
    ) -> Result<String, DescriptionError> {
        info!("Describing {} image ({} bytes) via {}", category, image.len(), self.model);

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(image, mime_type, category))
            .send()
            .await
            .context(RequestSnafu)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DescriptionError::Status { status: status.as_u16(), body });
        }

        let completion: ChatCompletionResponse = resp.json().await.context(DecodeSnafu)?;
        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context(EmptyResponseSnafu)?;

        debug!("Received description of {} characters", text.len());
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use warp::Filter;

    type Captured = Arc<Mutex<Option<(String, serde_json::Value)>>>;

    fn spawn_provider(status: u16, reply: serde_json::Value) -> (SocketAddr, Captured) {
        let captured: Captured = Arc::new(Mutex::new(None));
        let sink = captured.clone();
        let route = warp::path!("v1" / "chat" / "completions")
            .and(warp::post())
            .and(warp::header::<String>("authorization"))
            .and(warp::body::json())
            .map(move |auth: String, body: serde_json::Value| {
                *sink.lock().unwrap() = Some((auth, body));
                warp::reply::with_status(
                    warp::reply::json(&reply),
                    warp::http::StatusCode::from_u16(status).unwrap(),
                )
            });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        (addr, captured)
    }

    fn describer(addr: SocketAddr) -> OpenAiDescriber {
        let endpoint = format!("http://{}/v1", addr);
        OpenAiDescriber::new("sk-test", Some(&endpoint), None, None, Some(5)).unwrap()
    }

    #[tokio::test]
    async fn test_describe_sends_inline_image_and_trims() {
        let (addr, captured) = spawn_provider(
            200,
            serde_json::json!({
                "choices": [
                    { "message": { "role": "assistant", "content": "  Macular OCT, foveal contour preserved.\n" } },
                    { "message": { "role": "assistant", "content": "ignored" } }
                ]
            }),
        );

        let text = describer(addr)
            .describe(&[1, 2, 3], "image/png", ExamCategory::Oct)
            .await
            .unwrap();
        assert_eq!(text, "Macular OCT, foveal contour preserved.");

        let (auth, body) = captured.lock().unwrap().take().unwrap();
        assert_eq!(auth, "Bearer sk-test");
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body["messages"][0]["content"].as_str().unwrap().contains("OCT exam"));
        assert_eq!(
            body["messages"][1]["content"][0]["image_url"]["url"],
            "data:image/png;base64,AQID"
        );
    }

    #[tokio::test]
    async fn test_describe_surfaces_provider_status() {
        let (addr, _) = spawn_provider(429, serde_json::json!({ "error": { "message": "rate limited" } }));
        let err = describer(addr)
            .describe(&[1], "image/jpeg", ExamCategory::Pentacam)
            .await
            .unwrap_err();
        match err {
            DescriptionError::Status { status, body } => {
                assert_eq!(status, 429);
                assert!(body.contains("rate limited"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_describe_without_choices_fails() {
        let (addr, _) = spawn_provider(200, serde_json::json!({ "choices": [] }));
        let err = describer(addr)
            .describe(&[1], "image/jpeg", ExamCategory::Pentacam)
            .await
            .unwrap_err();
        assert!(matches!(err, DescriptionError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_describe_malformed_body_fails() {
        let (addr, _) = spawn_provider(200, serde_json::json!({ "choices": "nope" }));
        let err = describer(addr)
            .describe(&[1], "image/jpeg", ExamCategory::Pentacam)
            .await
            .unwrap_err();
        assert!(matches!(err, DescriptionError::Decode { .. }));
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        assert!(matches!(
            OpenAiDescriber::new("  ", None, None, None, None),
            Err(DescriptionError::MissingApiKey)
        ));
    }
}
