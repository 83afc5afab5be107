//! Page extraction: one isolated headless browser per scan, producing a
//! structured snapshot of the accessibility-relevant parts of a page.

pub mod browser;
pub mod script;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use browser::ChromiumExtractor;

/// One matched DOM element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    /// Lowercase tag name.
    pub tag_name: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// Trimmed visible text, empty when the element has none.
    #[serde(default)]
    pub text_content: String,
    #[serde(default, rename = "innerHTML")]
    pub inner_html: String,
}

impl ElementDescriptor {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Transient extraction result for one page. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub images: Vec<ElementDescriptor>,
    #[serde(default)]
    pub links: Vec<ElementDescriptor>,
    #[serde(default)]
    pub buttons: Vec<ElementDescriptor>,
    #[serde(default)]
    pub forms: Vec<ElementDescriptor>,
    #[serde(default)]
    pub headings: Vec<ElementDescriptor>,
    #[serde(default)]
    pub inputs: Vec<ElementDescriptor>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailure(String),

    #[error("Navigation to {url} timed out after {secs}s")]
    NavigationTimeout { url: String, secs: u64 },

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Page evaluation failed: {0}")]
    EvaluationFailure(String),
}

/// Launches browser sessions. One session per scan, never shared.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, ExtractionError>;
}

/// A live browser process plus one tab.
///
/// Implementations must release the process when dropped; `close` is the
/// orderly path and is safe to call more than once.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate and wait for the network to go idle, all within `timeout`.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), ExtractionError>;

    async fn capture(&mut self) -> Result<PageSnapshot, ExtractionError>;

    async fn close(&mut self);
}
