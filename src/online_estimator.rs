// src/online_estimator.rs
//
// Online hazard estimation: two strictly sequential remote calls. A
// vision service captions the redacted image, then a chat completion
// turns the caption into the report. A failed caption degrades to an
// error placeholder string and the chain continues; only transport
// failures surface as errors, and the pipeline folds those into the
// report text too.

use crate::codec;
use crate::error::EstimationError;
use crate::types::{AnalysisMode, HazardReport, OnlineConfig, PrivacyStats, RasterImage};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

const CHAT_MAX_TOKENS: u32 = 800;
const VISION_API_VERSION: &str = "2024-02-01";

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct CaptionResponse {
    #[serde(rename = "captionResult")]
    caption_result: Option<CaptionResult>,
}

#[derive(Debug, Deserialize)]
struct CaptionResult {
    text: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

// ============================================================================
// ESTIMATOR
// ============================================================================

pub struct OnlineHazardEstimator {
    http_client: reqwest::Client,
    config: OnlineConfig,
}

impl OnlineHazardEstimator {
    pub fn new(config: OnlineConfig) -> Result<Self, EstimationError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EstimationError::RemoteChain(e.to_string()))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    pub async fn estimate(
        &self,
        image: &RasterImage,
        stats: PrivacyStats,
    ) -> Result<HazardReport, EstimationError> {
        let jpeg = codec::encode_jpeg(image, 100)
            .map_err(|e| EstimationError::RemoteChain(e.to_string()))?;

        let (caption, degraded) = self.request_caption(jpeg).await?;
        info!("🌐 Vision caption: {}", caption);

        let content = self.request_report(&caption).await?;

        let degraded_note = if degraded { Some(caption.as_str()) } else { None };
        let text = compose_online_report(degraded_note, &content, stats);
        Ok(HazardReport::new(text, AnalysisMode::Online))
    }

    /// First call: POST the JPEG bytes to the vision caption endpoint.
    /// A non-200 answer becomes a placeholder caption (flagged as
    /// degraded) so the chain can still produce a report.
    async fn request_caption(&self, jpeg: Vec<u8>) -> Result<(String, bool), EstimationError> {
        let url = format!(
            "{}/computervision/imageanalysis:analyze?features=caption&model-version=latest&language=en&api-version={}",
            self.config.vision_endpoint.trim_end_matches('/'),
            VISION_API_VERSION,
        );

        let response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/octet-stream")
            .header("Ocp-Apim-Subscription-Key", &self.config.vision_key)
            .body(jpeg)
            .send()
            .await
            .map_err(|e| EstimationError::RemoteChain(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!("🌐 Vision API returned {}", status);
            return Ok((vision_failure_caption(status.as_u16()), true));
        }

        let body = response
            .text()
            .await
            .map_err(|e| EstimationError::RemoteChain(e.to_string()))?;
        Ok((parse_caption_body(&body), false))
    }

    /// Second call: feed the caption into the chat completion template.
    async fn request_report(&self, caption: &str) -> Result<String, EstimationError> {
        let request = ChatRequest {
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: build_chat_prompt(caption),
            }],
            max_tokens: CHAT_MAX_TOKENS,
        };

        let response = self
            .http_client
            .post(&self.config.chat_endpoint)
            .header("api-key", &self.config.chat_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| EstimationError::RemoteChain(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!("🌐 Chat API returned {}", status);
            return Err(EstimationError::ChatService(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| EstimationError::RemoteChain(e.to_string()))?;
        parse_chat_content(&body)
            .ok_or_else(|| EstimationError::RemoteChain("no choices in chat response".to_string()))
    }
}

// ============================================================================
// PURE HELPERS (kept separate so the chain logic is testable offline)
// ============================================================================

pub(crate) fn vision_failure_caption(status: u16) -> String {
    format!("Vision API Failed: {}", status)
}

pub(crate) fn parse_caption_body(body: &str) -> String {
    serde_json::from_str::<CaptionResponse>(body)
        .ok()
        .and_then(|r| r.caption_result)
        .map(|c| c.text)
        .unwrap_or_else(|| "No caption".to_string())
}

pub(crate) fn build_chat_prompt(caption: &str) -> String {
    format!(
        "Image Description: {}. Create a sidewalk safety report with headings: \
         AI Notes, Issues, Est. Length/Breadth, Confidence.",
        caption
    )
}

pub(crate) fn parse_chat_content(body: &str) -> Option<String> {
    serde_json::from_str::<ChatResponse>(body)
        .ok()?
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
}

/// Assemble the final report text. A degraded caption is surfaced as its
/// own line so the exported report keeps evidence that the vision stage
/// failed, even when the chat stage produced content anyway.
pub(crate) fn compose_online_report(
    degraded_caption: Option<&str>,
    content: &str,
    stats: PrivacyStats,
) -> String {
    let mut body = String::new();
    if let Some(note) = degraded_caption {
        body.push_str(note);
        body.push('\n');
    }
    body.push_str(content);

    format!(
        "=== Online Report ===\n{}\nPrivacy: {} faces, {} plates redacted.",
        body, stats.faces, stats.plates
    )
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caption_parse_success() {
        let body = r#"{"captionResult":{"text":"a cracked sidewalk next to a road"}}"#;
        assert_eq!(parse_caption_body(body), "a cracked sidewalk next to a road");
    }

    #[test]
    fn test_caption_parse_missing_field() {
        assert_eq!(parse_caption_body(r#"{"metadata":{}}"#), "No caption");
        assert_eq!(parse_caption_body("not json"), "No caption");
    }

    #[test]
    fn test_vision_failure_becomes_placeholder_caption() {
        // HTTP 500 degrades the caption; the chain still proceeds and the
        // failure text travels inside the prompt.
        let caption = vision_failure_caption(500);
        assert_eq!(caption, "Vision API Failed: 500");

        let prompt = build_chat_prompt(&caption);
        assert!(prompt.contains("Vision API Failed: 500"));
        assert!(prompt.contains("sidewalk safety report"));
    }

    #[test]
    fn test_chat_prompt_template() {
        let prompt = build_chat_prompt("a person on a sidewalk");
        assert!(prompt.starts_with("Image Description: a person on a sidewalk."));
        assert!(prompt.contains("AI Notes, Issues, Est. Length/Breadth, Confidence"));
    }

    #[test]
    fn test_chat_content_extraction() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"AI Notes: clear."}}]}"#;
        assert_eq!(parse_chat_content(body).unwrap(), "AI Notes: clear.");
        assert!(parse_chat_content(r#"{"choices":[]}"#).is_none());
    }

    #[test]
    fn test_degraded_caption_surfaces_in_report_text() {
        let report = compose_online_report(
            Some("Vision API Failed: 500"),
            "AI Notes: unable to assess.",
            PrivacyStats { faces: 0, plates: 1 },
        );
        assert!(report.starts_with("=== Online Report ==="));
        assert!(report.contains("Vision API Failed: 500"));
        assert!(report.contains("AI Notes: unable to assess."));
        assert!(report.ends_with("Privacy: 0 faces, 1 plates redacted."));
    }

    #[test]
    fn test_healthy_caption_leaves_report_clean() {
        let report = compose_online_report(
            None,
            "AI Notes: clear path.",
            PrivacyStats { faces: 2, plates: 0 },
        );
        assert!(!report.contains("Vision API Failed"));
        assert!(report.contains("AI Notes: clear path."));
    }

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatRequest {
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "hello".to_string(),
            }],
            max_tokens: CHAT_MAX_TOKENS,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["max_tokens"], 800);
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
