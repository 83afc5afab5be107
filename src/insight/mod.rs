//! Turns a page snapshot into a score, issues and a narrative summary.
//!
//! The generator never fails: transport errors, timeouts and replies that
//! do not match the response schema all produce the same fixed fallback.

pub mod client;
pub mod decode;
pub mod prompt;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub use client::{CompletionRequest, InferenceClient, InferenceError, OpenAiClient};
pub use decode::{decode, DecodeOutcome};

use crate::config::{FALLBACK_SCORE, INFERENCE_MAX_TOKENS, INFERENCE_TEMPERATURE};
use crate::extractor::PageSnapshot;
use crate::model::{ComplianceLevel, IssueDraft, Severity};

pub const FALLBACK_INSIGHTS: &str =
    "AI analysis was unavailable. A basic scan was performed instead.";

#[derive(Debug, Clone, PartialEq)]
pub struct InsightResult {
    pub score: i64,
    pub issues: Vec<IssueDraft>,
    pub insights: String,
}

impl InsightResult {
    pub fn fallback() -> Self {
        Self {
            score: FALLBACK_SCORE,
            issues: vec![IssueDraft {
                issue_type: "AI Analysis Unavailable".to_string(),
                severity: Severity::Info,
                description: "AI analysis could not be completed. Manual review recommended."
                    .to_string(),
                element: "N/A".to_string(),
                recommendation: "Please try scanning again or contact support.".to_string(),
                compliance_reference: "N/A".to_string(),
            }],
            insights: FALLBACK_INSIGHTS.to_string(),
        }
    }
}

/// Generator output. `fallback_reason` is set when `result` is the fallback.
#[derive(Debug, Clone)]
pub struct Generation {
    pub result: InsightResult,
    pub fallback_reason: Option<String>,
}

impl Generation {
    fn fallback(reason: String) -> Self {
        Self {
            result: InsightResult::fallback(),
            fallback_reason: Some(reason),
        }
    }
}

pub struct InsightGenerator {
    client: Arc<dyn InferenceClient>,
    model: String,
    timeout: Duration,
}

impl InsightGenerator {
    pub fn new(client: Arc<dyn InferenceClient>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
        }
    }

    pub async fn generate(&self, snapshot: &PageSnapshot, level: ComplianceLevel) -> Generation {
        let request = CompletionRequest {
            model: self.model.clone(),
            system: prompt::SYSTEM_INSTRUCTION.to_string(),
            prompt: prompt::build_prompt(snapshot, level),
            temperature: INFERENCE_TEMPERATURE,
            max_tokens: INFERENCE_MAX_TOKENS,
        };
        debug!("Inference prompt is {} chars", request.prompt.len());

        let raw = match tokio::time::timeout(self.timeout, self.client.complete(&request)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!("Inference call failed: {}", e);
                return Generation::fallback(e.to_string());
            }
            Err(_) => {
                let e = InferenceError::Timeout(self.timeout.as_secs());
                warn!("{}", e);
                return Generation::fallback(e.to_string());
            }
        };

        match decode(&raw) {
            DecodeOutcome::Decoded(result) => Generation {
                result,
                fallback_reason: None,
            },
            DecodeOutcome::Malformed(raw) => {
                let preview: String = raw.chars().take(120).collect();
                warn!("Malformed inference response: {:?}", preview);
                Generation::fallback(format!("malformed inference response ({} chars)", raw.len()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Stub(Result<&'static str, ()>);

    #[async_trait]
    impl InferenceClient for Stub {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, InferenceError> {
            match self.0 {
                Ok(text) => Ok(text.to_string()),
                Err(()) => Err(InferenceError::Unavailable("connection refused".to_string())),
            }
        }
    }

    struct Hang;

    #[async_trait]
    impl InferenceClient for Hang {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, InferenceError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    fn generator(client: impl InferenceClient + 'static) -> InsightGenerator {
        InsightGenerator::new(Arc::new(client), "gpt-4", Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_decoded_response() {
        let gen = generator(Stub(Ok(r#"{"score": 91, "issues": [], "insights": "good"}"#)));
        let out = gen.generate(&PageSnapshot::default(), ComplianceLevel::Standard).await;
        assert!(out.fallback_reason.is_none());
        assert_eq!(out.result.score, 91);
    }

    #[tokio::test]
    async fn test_transport_error_and_malformed_share_fallback() {
        let failed = generator(Stub(Err(())))
            .generate(&PageSnapshot::default(), ComplianceLevel::Standard)
            .await;
        let malformed = generator(Stub(Ok("not json at all")))
            .generate(&PageSnapshot::default(), ComplianceLevel::Standard)
            .await;

        assert_eq!(failed.result, InsightResult::fallback());
        assert_eq!(malformed.result, InsightResult::fallback());
        assert!(failed.fallback_reason.is_some());
        assert!(malformed.fallback_reason.is_some());
    }

    #[tokio::test]
    async fn test_local_timeout_falls_back() {
        let out = generator(Hang)
            .generate(&PageSnapshot::default(), ComplianceLevel::Minimal)
            .await;
        assert_eq!(out.result.score, FALLBACK_SCORE);
        assert!(out.fallback_reason.unwrap().contains("timed out"));
    }

    #[test]
    fn test_fallback_shape() {
        let fb = InsightResult::fallback();
        assert_eq!(fb.score, 75);
        assert_eq!(fb.issues.len(), 1);
        assert_eq!(fb.issues[0].severity, Severity::Info);
        assert_eq!(fb.insights, FALLBACK_INSIGHTS);
    }
}
