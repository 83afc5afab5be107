//! In-process stand-ins for the browser and inference boundaries.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use a11y_scanner::extractor::{
    BrowserSession, ElementDescriptor, ExtractionError, PageExtractor, PageSnapshot,
};
use a11y_scanner::insight::{CompletionRequest, InferenceClient, InferenceError};

#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(dead_code)]
pub enum FailAt {
    Nothing,
    Launch,
    Navigate,
    Capture,
    /// `launch` never returns.
    HangOnLaunch,
}

/// Hands out [`FakeSession`]s that replay a fixed snapshot.
pub struct FakeExtractor {
    pub snapshot: PageSnapshot,
    pub fail_at: FailAt,
    pub launched: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl FakeExtractor {
    pub fn new(snapshot: PageSnapshot) -> Self {
        Self {
            snapshot,
            fail_at: FailAt::Nothing,
            launched: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(fail_at: FailAt) -> Self {
        Self {
            fail_at,
            ..Self::new(sample_snapshot())
        }
    }

    pub fn launches(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageExtractor for FakeExtractor {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, ExtractionError> {
        match self.fail_at {
            FailAt::Launch => {
                return Err(ExtractionError::LaunchFailure("no chrome here".to_string()))
            }
            FailAt::HangOnLaunch => futures::future::pending::<()>().await,
            _ => {}
        }
        self.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            snapshot: self.snapshot.clone(),
            fail_at: self.fail_at,
            navigated: false,
            closed: self.closed.clone(),
        }))
    }
}

pub struct FakeSession {
    snapshot: PageSnapshot,
    fail_at: FailAt,
    navigated: bool,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), ExtractionError> {
        if self.fail_at == FailAt::Navigate {
            return Err(ExtractionError::NavigationTimeout {
                url: url.to_string(),
                secs: timeout.as_secs(),
            });
        }
        self.navigated = true;
        Ok(())
    }

    async fn capture(&mut self) -> Result<PageSnapshot, ExtractionError> {
        if self.fail_at == FailAt::Capture {
            return Err(ExtractionError::EvaluationFailure("script threw".to_string()));
        }
        assert!(self.navigated, "capture before navigate");
        Ok(self.snapshot.clone())
    }

    async fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Replays a canned reply and remembers every prompt it was sent.
pub struct StubInference {
    reply: Result<String, String>,
    pub prompts: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl StubInference {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl InferenceClient for StubInference {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, InferenceError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        self.reply.clone().map_err(InferenceError::Unavailable)
    }
}

fn element(tag: &str, attrs: &[(&str, &str)], text: &str) -> ElementDescriptor {
    ElementDescriptor {
        tag_name: tag.to_string(),
        attributes: attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>(),
        text_content: text.to_string(),
        inner_html: text.to_string(),
    }
}

/// Three images (two without alt), one heading, one input.
pub fn sample_snapshot() -> PageSnapshot {
    PageSnapshot {
        title: "Example Domain".to_string(),
        url: "https://example.com/".to_string(),
        images: vec![
            element("img", &[("src", "/logo.png"), ("alt", "Company logo")], ""),
            element("img", &[("src", "/hero.jpg")], ""),
            element("img", &[("src", "/team.jpg")], ""),
        ],
        headings: vec![element("h1", &[], "Example Domain")],
        inputs: vec![element("input", &[("type", "email"), ("name", "email")], "")],
        ..Default::default()
    }
}

/// A model reply for [`sample_snapshot`] using mixed-case and synonym
/// severities.
pub const SAMPLE_REPLY: &str = r#"```json
{
  "score": 62,
  "issues": [
    {"type": "Missing alt text", "severity": "critical", "description": "Image /hero.jpg has no alt attribute",
     "element": "<img src=\"/hero.jpg\">", "recommendation": "Add descriptive alt text", "wcagReference": "1.1.1"},
    {"type": "Missing alt text", "severity": "Serious", "description": "Image /team.jpg has no alt attribute",
     "element": "<img src=\"/team.jpg\">", "recommendation": "Add descriptive alt text", "wcagReference": "1.1.1"},
    {"type": "Unlabelled input", "severity": "moderate", "description": "Email input has no label",
     "element": "<input type=\"email\">", "recommendation": "Associate a <label>", "complianceReference": "3.3.2"},
    {"type": "Heading structure", "severity": "notice", "description": "Single h1 present",
     "element": "<h1>", "recommendation": "None required"}
  ],
  "insights": "Two images lack alternative text and the email field is unlabelled."
}
```"#;
