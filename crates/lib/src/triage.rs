//! Lead triage for direct messages from unknown senders.
//!
//! An LLM decides whether the message is a real-estate lead and what the sender wants. When the
//! call fails, times out, or returns something that is not the expected JSON, a keyword match over
//! a fixed Hebrew vocabulary decides instead. The keyword path is pure and needs no network.

use crate::llm::TextGenerator;
use crate::model::Intent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const TRIAGE_SYSTEM_PROMPT: &str = "You classify WhatsApp messages sent to an Israeli real-estate agency. \
Messages are usually in Hebrew. Decide whether the sender is a potential real-estate client \
(buying, renting, selling, or asking about a property). \
Respond with ONLY a JSON object, no prose and no markdown, with exactly these fields: \
{\"isRealEstateLead\": boolean, \"summary\": string (one short sentence in Hebrew), \
\"intent\": \"buy\" | \"rent\" | \"sell\" | \"inquiry\"}";

/// Vocabulary for the offline fallback. Any hit marks the message as a lead.
pub const LEAD_KEYWORDS: &[&str] = &[
    "דירה",
    "דירות",
    "נכס",
    "בית",
    "וילה",
    "פנטהאוז",
    "מגרש",
    "חדרים",
    "למכירה",
    "להשכרה",
    "שכירות",
    "לקנות",
    "לשכור",
    "קנייה",
    "משכנתא",
    "מחיר",
    "תיווך",
    "מתווך",
];

pub const FALLBACK_SUMMARY: &str = "פנייה בנושא נדל\"ן (זוהתה לפי מילות מפתח)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictSource {
    Ai,
    Keywords,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageVerdict {
    pub is_lead: bool,
    pub summary: String,
    pub intent: Intent,
    pub source: VerdictSource,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AiVerdict {
    is_real_estate_lead: bool,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    intent: String,
}

/// Remove a surrounding markdown code fence (```json ... ``` or ``` ... ```).
pub fn strip_code_fences(raw: &str) -> &str {
    let t = raw.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = match rest.find('\n') {
        Some(i) if rest[..i].trim().chars().all(|c| c.is_ascii_alphanumeric()) => &rest[i + 1..],
        _ => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse the model's reply. `None` when it is not the expected JSON object.
pub fn parse_ai_verdict(raw: &str) -> Option<TriageVerdict> {
    let v: AiVerdict = serde_json::from_str(strip_code_fences(raw)).ok()?;
    Some(TriageVerdict {
        is_lead: v.is_real_estate_lead,
        summary: v.summary.trim().to_string(),
        intent: Intent::parse_lenient(&v.intent),
        source: VerdictSource::Ai,
    })
}

/// Offline decision: lead iff any vocabulary word occurs (case-insensitive substring).
pub fn keyword_verdict(text: &str) -> TriageVerdict {
    let lower = text.to_lowercase();
    let is_lead = LEAD_KEYWORDS.iter().any(|k| lower.contains(k));
    TriageVerdict {
        is_lead,
        summary: if is_lead {
            FALLBACK_SUMMARY.to_string()
        } else {
            String::new()
        },
        intent: Intent::Inquiry,
        source: VerdictSource::Keywords,
    }
}

/// Triage with an optional AI backend and a hard time bound per call.
#[derive(Clone)]
pub struct Triage {
    generator: Option<Arc<dyn TextGenerator>>,
    timeout: Duration,
}

impl Triage {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    pub fn keywords_only() -> Self {
        Self::new(None, Duration::from_secs(1))
    }

    /// Always returns a decision.
    pub async fn triage(&self, text: &str) -> TriageVerdict {
        let Some(generator) = self.generator.as_ref() else {
            return keyword_verdict(text);
        };
        let call = generator.generate(TRIAGE_SYSTEM_PROMPT, text);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(raw)) => match parse_ai_verdict(&raw) {
                Some(v) => v,
                None => {
                    log::warn!(
                        "triage: {} reply is not the expected JSON, using keyword fallback",
                        generator.name()
                    );
                    keyword_verdict(text)
                }
            },
            Ok(Err(e)) => {
                log::warn!("triage: {} call failed ({}), using keyword fallback", generator.name(), e);
                keyword_verdict(text)
            }
            Err(_) => {
                log::warn!(
                    "triage: {} timed out after {:?}, using keyword fallback",
                    generator.name(),
                    self.timeout
                );
                keyword_verdict(text)
            }
        }
    }
}
