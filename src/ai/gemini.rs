use crate::ai::prompt::ReportRequest;
use crate::ai::{BackendResponse, Citation, ReportBackend, resolve_api_key};
use crate::config::Config;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebChunk>,
}

#[derive(Debug, Deserialize)]
struct WebChunk {
    title: Option<String>,
    uri: Option<String>,
}

/// Gemini `generateContent` client with Google Search grounding.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            bail!("AI API key is empty");
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut key_value =
            HeaderValue::from_str(api_key.trim()).context("Failed to build API key header")?;
        key_value.set_sensitive(true);
        headers.insert(HeaderName::from_static(API_KEY_HEADER), key_value);

        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("Failed to create AI HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            model: model.trim().to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = resolve_api_key().context(
            "AI API key is missing. Export `ZHAOWEN_API_KEY` (or `GEMINI_API_KEY`) before running.",
        )?;

        Self::new(
            &config.ai_api_base_url,
            &config.ai_model,
            &api_key,
            config.ai_timeout_seconds.map(Duration::from_secs),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ReportBackend for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &ReportRequest) -> Result<BackendResponse> {
        let response = self
            .http
            .post(self.endpoint())
            .json(&request_body(request))
            .send()
            .await
            .context("AI API request failed")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read AI response body")?;

        if !status.is_success() {
            bail!("AI API error {}: {}", status, body);
        }

        parse_response(&body)
    }
}

fn request_body(request: &ReportRequest) -> Value {
    let mut body = json!({
        "contents": [
            {"role": "user", "parts": [{"text": request.prompt}]}
        ],
        "systemInstruction": {
            "parts": [{"text": request.system_instruction}]
        }
    });

    if request.search_grounding {
        body["tools"] = json!([{"google_search": {}}]);
    }

    body
}

fn parse_response(body: &str) -> Result<BackendResponse> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)
        .with_context(|| format!("Failed to parse AI response: {body}"))?;

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        return Ok(BackendResponse::default());
    };

    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .filter(|text| !text.trim().is_empty());

    let citations = candidate
        .grounding_metadata
        .map(|metadata| metadata.grounding_chunks)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|chunk| chunk.web)
        .map(|web| Citation {
            title: web.title,
            uri: web.uri,
        })
        .collect();

    Ok(BackendResponse { text, citations })
}

#[cfg(test)]
mod tests {
    use super::{GeminiClient, parse_response, request_body};
    use crate::ai::Citation;
    use crate::ai::prompt::ReportRequest;

    #[test]
    fn parses_text_parts_and_web_chunks() {
        let body = r####"{
            "candidates": [{
                "content": {"parts": [{"text": "## 体育\n"}, {"text": "### #夺冠#"}]},
                "groundingMetadata": {
                    "groundingChunks": [
                        {"web": {"uri": "https://weibo.com/1", "title": "微博"}},
                        {"retrievedContext": {"uri": "ignored"}},
                        {"web": {"uri": "https://weibo.com/2"}}
                    ]
                }
            }]
        }"####;

        let response = parse_response(body).expect("parsed");

        assert_eq!(response.text.as_deref(), Some("## 体育\n### #夺冠#"));
        assert_eq!(
            response.citations,
            vec![
                Citation {
                    title: Some("微博".to_string()),
                    uri: Some("https://weibo.com/1".to_string())
                },
                Citation {
                    title: None,
                    uri: Some("https://weibo.com/2".to_string())
                },
            ]
        );
    }

    #[test]
    fn empty_candidates_yield_empty_response() {
        let response = parse_response(r#"{"candidates": []}"#).expect("parsed");
        assert!(response.text.is_none());
        assert!(response.citations.is_empty());

        let response = parse_response("{}").expect("parsed");
        assert!(response.text.is_none());
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(parse_response("<html>bad gateway</html>").is_err());
    }

    #[test]
    fn request_body_carries_grounding_tool_and_system_instruction() {
        let body = request_body(&ReportRequest {
            prompt: "今日早报".to_string(),
            system_instruction: "编辑".to_string(),
            search_grounding: true,
        });

        assert_eq!(body["contents"][0]["parts"][0]["text"], "今日早报");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "编辑");
        assert!(body["tools"][0]["google_search"].is_object());
    }

    #[test]
    fn endpoint_joins_base_url_and_model() {
        let client = GeminiClient::new(
            "https://generativelanguage.googleapis.com/v1beta/",
            "gemini-2.5-flash",
            "secret",
            None,
        )
        .expect("client");

        assert_eq!(
            client.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert!(GeminiClient::new("https://example.com", "m", " ", None).is_err());
    }
}
