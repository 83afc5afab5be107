use crate::config::{PROMPT_ELEMENTS_PER_CATEGORY, PROMPT_MARKUP_CHARS};
use crate::extractor::{ElementDescriptor, PageSnapshot};
use crate::model::ComplianceLevel;

pub const SYSTEM_INSTRUCTION: &str = "You are an expert web accessibility auditor. \
Analyze websites for WCAG compliance and provide detailed, actionable feedback.";

const RESPONSE_SCHEMA: &str = r#"{
  "score": number,
  "issues": [
    {
      "type": "string",
      "severity": "CRITICAL" | "WARNING" | "INFO",
      "description": "string",
      "element": "string",
      "recommendation": "string",
      "complianceReference": "string"
    }
  ],
  "insights": "string"
}"#;

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Serialize a category, keeping at most `cap` elements and trimming markup.
fn render_elements(elements: &[ElementDescriptor], cap: Option<usize>) -> String {
    let take = cap.unwrap_or(elements.len());
    let bounded: Vec<ElementDescriptor> = elements
        .iter()
        .take(take)
        .map(|el| ElementDescriptor {
            inner_html: truncate_chars(&el.inner_html, PROMPT_MARKUP_CHARS),
            ..el.clone()
        })
        .collect();
    serde_json::to_string_pretty(&bounded).unwrap_or_else(|_| "[]".to_string())
}

pub fn build_prompt(snapshot: &PageSnapshot, level: ComplianceLevel) -> String {
    let cap = Some(PROMPT_ELEMENTS_PER_CATEGORY);
    let mut prompt = format!(
        "Analyze this webpage for accessibility issues according to WCAG {} standards:\n\n\
         Page Title: {}\nURL: {}\n\n",
        level.wcag_label(),
        snapshot.title,
        snapshot.url,
    );

    let sections: [(&str, &[ElementDescriptor], Option<usize>); 6] = [
        ("Images", snapshot.images.as_slice(), cap),
        ("Links", snapshot.links.as_slice(), cap),
        ("Buttons", snapshot.buttons.as_slice(), cap),
        ("Forms", snapshot.forms.as_slice(), cap),
        ("Form Inputs", snapshot.inputs.as_slice(), cap),
        // Headings carry the document outline and are sent in full.
        ("Headings", snapshot.headings.as_slice(), None),
    ];
    for (label, elements, cap) in sections {
        prompt.push_str(&format!(
            "{} ({}):\n{}\n\n",
            label,
            elements.len(),
            render_elements(elements, cap)
        ));
    }

    prompt.push_str(
        "Please provide:\n\
         1. An accessibility score (0-100)\n\
         2. A list of specific issues found\n\
         3. Overall insights and recommendations\n\n\
         Focus on:\n\
         - Missing alt text for images\n\
         - Missing ARIA labels\n\
         - Keyboard navigation issues\n\
         - Form accessibility\n\
         - Heading structure\n\
         - Link descriptions\n\n\
         Return your response as JSON in this format:\n",
    );
    prompt.push_str(RESPONSE_SCHEMA);
    prompt.push('\n');
    prompt
}
