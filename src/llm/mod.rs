// LLM judgement — trait-based abstraction for the deep-analysis backend.
//
// The ThreatJudge trait defines the interface. OpenAiJudge implements it
// against any OpenAI-compatible chat-completions endpoint. The judge is
// optional everywhere: when it is unconfigured or fails, reports degrade
// to heuristic findings alone.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::report::{Finding, ThreatLevel, ThreatType};

pub mod openai;
pub mod prompts;

pub use openai::OpenAiJudge;

/// Structured judgement parsed from the model's JSON response.
/// Fields are optional because models do not always fill every slot;
/// missing values degrade to conservative defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmJudgement {
    #[serde(default)]
    pub threat_level: Option<String>,
    #[serde(default)]
    pub threat_types: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub indicators: Vec<String>,
    #[serde(default)]
    pub suspicious_patterns: Vec<String>,
    #[serde(default)]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub behavior_prediction: Option<String>,
}

/// Trait for LLM-backed threat judgement. Implementations must be async
/// (network-bound) and independently timeboxed from the heuristic path.
#[async_trait]
pub trait ThreatJudge: Send + Sync {
    /// Run one judgement round with the given prompts.
    async fn judge(&self, system_prompt: &str, user_prompt: &str) -> Result<LlmJudgement>;
}

/// Convert a judgement into a Finding.
///
/// A SAFE (or unparseable) verdict is an abstention, mirroring the
/// heuristic analyzer contract. Confidence defaults to 0.5 and is clamped.
pub fn judgement_to_finding(judgement: LlmJudgement, default_type: ThreatType) -> Option<Finding> {
    let threat_level = ThreatLevel::from_name(judgement.threat_level.as_deref().unwrap_or("SAFE"));
    if threat_level == ThreatLevel::Safe {
        return None;
    }

    let confidence = judgement.confidence.unwrap_or(0.5).clamp(0.0, 1.0);

    let threat_type = judgement
        .threat_types
        .first()
        .and_then(|t| ThreatType::from_name(t))
        .unwrap_or(default_type);

    let indicators = if !judgement.indicators.is_empty() {
        judgement.indicators
    } else {
        judgement.suspicious_patterns
    };

    let mut metadata = HashMap::new();
    metadata.insert("source".into(), "llm".into());
    if let Some(rec) = judgement.recommendation {
        metadata.insert("recommendation".into(), rec.into());
    }
    if let Some(pred) = judgement.behavior_prediction {
        metadata.insert("behavior_prediction".into(), pred.into());
    }

    Some(Finding {
        threat_type,
        threat_level,
        confidence,
        description: judgement
            .reasoning
            .unwrap_or_else(|| "LLM analysis result".to_string()),
        indicators,
        metadata,
    })
}

/// Extract a JSON object from model output, tolerating markdown code
/// fences and leading/trailing prose.
pub fn parse_json_response(content: &str) -> Result<LlmJudgement> {
    let trimmed = content.trim();

    // Strip ```json ... ``` fences
    let stripped = if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else {
        trimmed
    };

    if let Ok(judgement) = serde_json::from_str(stripped) {
        return Ok(judgement);
    }

    // Fall back to the outermost brace pair
    let start = stripped
        .find('{')
        .ok_or_else(|| anyhow::anyhow!("no JSON object in LLM response"))?;
    let end = stripped
        .rfind('}')
        .ok_or_else(|| anyhow::anyhow!("unterminated JSON object in LLM response"))?;
    Ok(serde_json::from_str(&stripped[start..=end])?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_judgement_abstains() {
        let judgement = LlmJudgement {
            threat_level: Some("SAFE".to_string()),
            confidence: Some(0.95),
            ..Default::default()
        };
        assert!(judgement_to_finding(judgement, ThreatType::Phishing).is_none());
    }

    #[test]
    fn high_judgement_becomes_finding() {
        let judgement = LlmJudgement {
            threat_level: Some("HIGH".to_string()),
            threat_types: vec!["malware".to_string()],
            confidence: Some(0.92),
            reasoning: Some("obfuscated dropper".to_string()),
            suspicious_patterns: vec!["eval(atob(...))".to_string()],
            ..Default::default()
        };
        let finding = judgement_to_finding(judgement, ThreatType::Phishing).unwrap();
        assert_eq!(finding.threat_type, ThreatType::Malware);
        assert_eq!(finding.threat_level, ThreatLevel::High);
        assert_eq!(finding.indicators, vec!["eval(atob(...))".to_string()]);
        assert_eq!(finding.metadata.get("source").unwrap(), "llm");
    }

    #[test]
    fn confidence_is_clamped_and_defaulted() {
        let judgement = LlmJudgement {
            threat_level: Some("LOW".to_string()),
            confidence: Some(3.5),
            ..Default::default()
        };
        let finding = judgement_to_finding(judgement, ThreatType::Phishing).unwrap();
        assert_eq!(finding.confidence, 1.0);

        let judgement = LlmJudgement {
            threat_level: Some("LOW".to_string()),
            ..Default::default()
        };
        let finding = judgement_to_finding(judgement, ThreatType::Phishing).unwrap();
        assert_eq!(finding.confidence, 0.5);
    }

    #[test]
    fn unknown_level_is_abstention() {
        let judgement = LlmJudgement {
            threat_level: Some("BANANAS".to_string()),
            ..Default::default()
        };
        assert!(judgement_to_finding(judgement, ThreatType::Phishing).is_none());
    }

    #[test]
    fn parse_plain_json() {
        let judgement =
            parse_json_response(r#"{"threat_level": "HIGH", "confidence": 0.8}"#).unwrap();
        assert_eq!(judgement.threat_level.as_deref(), Some("HIGH"));
    }

    #[test]
    fn parse_fenced_json() {
        let content = "```json\n{\"threat_level\": \"MEDIUM\", \"confidence\": 0.6}\n```";
        let judgement = parse_json_response(content).unwrap();
        assert_eq!(judgement.threat_level.as_deref(), Some("MEDIUM"));
    }

    #[test]
    fn parse_json_with_surrounding_prose() {
        let content = "Here is my analysis: {\"threat_level\": \"LOW\"} — stay careful.";
        let judgement = parse_json_response(content).unwrap();
        assert_eq!(judgement.threat_level.as_deref(), Some("LOW"));
    }

    #[test]
    fn parse_garbage_errors() {
        assert!(parse_json_response("no json here at all").is_err());
    }
}
