// Threat report model — findings, severity rollup, and the wire enums.
//
// A ThreatReport accumulates Findings from independent analyzers and keeps
// its overall level/score correct after every insertion. The rollup is
// order-independent (max + confidence-weighted average), so findings can be
// merged in whatever order the analyzers happen to complete.

use std::collections::HashMap;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

pub mod recommend;

pub use recommend::generate_recommendations;

/// Threat severity. The integer values are part of the wire contract
/// (SAFE=0 .. CRITICAL=4) and must stay stable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(into = "u8", try_from = "u8")]
pub enum ThreatLevel {
    #[default]
    Safe = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl ThreatLevel {
    /// Map a 0.0-1.0 confidence score to a severity level.
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 0.9 => ThreatLevel::Critical,
            s if s >= 0.75 => ThreatLevel::High,
            s if s >= 0.5 => ThreatLevel::Medium,
            s if s >= 0.3 => ThreatLevel::Low,
            _ => ThreatLevel::Safe,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Safe => "SAFE",
            ThreatLevel::Low => "LOW",
            ThreatLevel::Medium => "MEDIUM",
            ThreatLevel::High => "HIGH",
            ThreatLevel::Critical => "CRITICAL",
        }
    }

    /// Parse the SCREAMING_CASE name used in LLM responses. Unknown
    /// strings map to Safe so a malformed response degrades to abstention.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "LOW" => ThreatLevel::Low,
            "MEDIUM" => ThreatLevel::Medium,
            "HIGH" => ThreatLevel::High,
            "CRITICAL" => ThreatLevel::Critical,
            _ => ThreatLevel::Safe,
        }
    }
}

impl From<ThreatLevel> for u8 {
    fn from(level: ThreatLevel) -> u8 {
        level as u8
    }
}

impl TryFrom<u8> for ThreatLevel {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ThreatLevel::Safe),
            1 => Ok(ThreatLevel::Low),
            2 => Ok(ThreatLevel::Medium),
            3 => Ok(ThreatLevel::High),
            4 => Ok(ThreatLevel::Critical),
            other => Err(anyhow!("invalid threat level: {other}")),
        }
    }
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Threat category. Wire mapping PHISHING=0 .. CERT=4 is stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ThreatType {
    Phishing = 0,
    Malware = 1,
    Xss = 2,
    Privacy = 3,
    Cert = 4,
}

impl ThreatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatType::Phishing => "phishing",
            ThreatType::Malware => "malware",
            ThreatType::Xss => "xss",
            ThreatType::Privacy => "privacy",
            ThreatType::Cert => "cert",
        }
    }

    /// Parse the lowercase name used in LLM responses.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "phishing" => Some(ThreatType::Phishing),
            "malware" => Some(ThreatType::Malware),
            "xss" => Some(ThreatType::Xss),
            "privacy" => Some(ThreatType::Privacy),
            "cert" | "certificate" => Some(ThreatType::Cert),
            _ => None,
        }
    }
}

impl From<ThreatType> for u8 {
    fn from(t: ThreatType) -> u8 {
        t as u8
    }
}

impl TryFrom<u8> for ThreatType {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ThreatType::Phishing),
            1 => Ok(ThreatType::Malware),
            2 => Ok(ThreatType::Xss),
            3 => Ok(ThreatType::Privacy),
            4 => Ok(ThreatType::Cert),
            other => Err(anyhow!("invalid threat type: {other}")),
        }
    }
}

impl std::fmt::Display for ThreatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One analyzer's verdict about a target.
///
/// Analyzers never emit Safe findings — a safe verdict is an abstention
/// (`Ok(None)` from the adapter), so every Finding carries level >= Low.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub threat_type: ThreatType,
    pub threat_level: ThreatLevel,
    /// Analyzer confidence, 0.0 to 1.0.
    pub confidence: f64,
    pub description: String,
    /// Evidence strings, in the order the analyzer collected them.
    pub indicators: Vec<String>,
    /// Analyzer-specific context (feature values, source tags).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// The merged, scored aggregate of all findings for one analysis target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatReport {
    /// URL or synthetic `script:<hash>` identifier.
    pub target: String,
    pub overall_level: ThreatLevel,
    /// Confidence-weighted severity, 0.0 (safe) to 1.0 (critical).
    pub overall_score: f64,
    /// Findings in analyzer completion order.
    pub findings: Vec<Finding>,
    pub recommendations: Vec<String>,
    pub analysis_time_ms: f64,
    pub cached: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ThreatReport {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            overall_level: ThreatLevel::Safe,
            overall_score: 0.0,
            findings: Vec::new(),
            recommendations: Vec::new(),
            analysis_time_ms: 0.0,
            cached: false,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Append a finding and recompute the rollup.
    pub fn add_finding(&mut self, finding: Finding) {
        self.findings.push(finding);
        self.recalculate();
    }

    /// Recompute overall_level (max) and overall_score (confidence-weighted
    /// average of level/CRITICAL, clamped to [0, 1]).
    fn recalculate(&mut self) {
        if self.findings.is_empty() {
            self.overall_level = ThreatLevel::Safe;
            self.overall_score = 0.0;
            return;
        }

        self.overall_level = self
            .findings
            .iter()
            .map(|f| f.threat_level)
            .max()
            .unwrap_or(ThreatLevel::Safe);

        let total_weight: f64 = self.findings.iter().map(|f| f.confidence).sum();
        if total_weight > 0.0 {
            let weighted_sum: f64 = self
                .findings
                .iter()
                .map(|f| f.confidence * (f.threat_level as u8 as f64 / ThreatLevel::Critical as u8 as f64))
                .sum();
            self.overall_score = (weighted_sum / total_weight).clamp(0.0, 1.0);
        } else {
            self.overall_score = 0.0;
        }
    }

    /// Derive and stamp the advisory list from the current findings.
    pub fn finalize_recommendations(&mut self) {
        self.recommendations = generate_recommendations(self);
    }

    /// Security score on the 0-100 scale served by page analysis
    /// (100 = fully safe).
    pub fn security_score(&self) -> u32 {
        100u32.saturating_sub((self.overall_score * 100.0).round() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(t: ThreatType, level: ThreatLevel, confidence: f64) -> Finding {
        Finding {
            threat_type: t,
            threat_level: level,
            confidence,
            description: format!("{t} test finding"),
            indicators: vec![],
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn empty_report_is_safe() {
        let report = ThreatReport::new("https://example.com");
        assert_eq!(report.overall_level, ThreatLevel::Safe);
        assert_eq!(report.overall_score, 0.0);
    }

    #[test]
    fn overall_level_is_max_of_findings() {
        let mut report = ThreatReport::new("https://example.com");
        report.add_finding(finding(ThreatType::Privacy, ThreatLevel::Low, 0.4));
        report.add_finding(finding(ThreatType::Phishing, ThreatLevel::High, 0.8));
        report.add_finding(finding(ThreatType::Malware, ThreatLevel::Medium, 0.6));
        assert_eq!(report.overall_level, ThreatLevel::High);
    }

    #[test]
    fn overall_score_is_confidence_weighted() {
        let mut report = ThreatReport::new("https://example.com");
        // 0.8 * (3/4) + 0.4 * (1/4) over weight 1.2 = (0.6 + 0.1) / 1.2
        report.add_finding(finding(ThreatType::Phishing, ThreatLevel::High, 0.8));
        report.add_finding(finding(ThreatType::Privacy, ThreatLevel::Low, 0.4));
        let expected = (0.8 * 0.75 + 0.4 * 0.25) / 1.2;
        assert!(
            (report.overall_score - expected).abs() < 1e-9,
            "expected {expected}, got {}",
            report.overall_score
        );
    }

    #[test]
    fn score_is_order_independent() {
        let findings = [
            finding(ThreatType::Malware, ThreatLevel::Critical, 0.9),
            finding(ThreatType::Privacy, ThreatLevel::Low, 0.3),
            finding(ThreatType::Xss, ThreatLevel::Medium, 0.55),
        ];

        let mut forward = ThreatReport::new("a");
        for f in findings.iter().cloned() {
            forward.add_finding(f);
        }
        let mut reverse = ThreatReport::new("b");
        for f in findings.iter().rev().cloned() {
            reverse.add_finding(f);
        }

        assert_eq!(forward.overall_level, reverse.overall_level);
        assert!((forward.overall_score - reverse.overall_score).abs() < 1e-12);
    }

    #[test]
    fn zero_confidence_mass_scores_zero() {
        let mut report = ThreatReport::new("https://example.com");
        report.add_finding(finding(ThreatType::Phishing, ThreatLevel::High, 0.0));
        assert_eq!(report.overall_level, ThreatLevel::High);
        assert_eq!(report.overall_score, 0.0);
    }

    #[test]
    fn single_critical_full_confidence_scores_one() {
        let mut report = ThreatReport::new("https://example.com");
        report.add_finding(finding(ThreatType::Malware, ThreatLevel::Critical, 1.0));
        assert!((report.overall_score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn level_from_score_boundaries() {
        assert_eq!(ThreatLevel::from_score(0.9), ThreatLevel::Critical);
        assert_eq!(ThreatLevel::from_score(0.75), ThreatLevel::High);
        assert_eq!(ThreatLevel::from_score(0.749), ThreatLevel::Medium);
        assert_eq!(ThreatLevel::from_score(0.5), ThreatLevel::Medium);
        assert_eq!(ThreatLevel::from_score(0.3), ThreatLevel::Low);
        assert_eq!(ThreatLevel::from_score(0.299), ThreatLevel::Safe);
        assert_eq!(ThreatLevel::from_score(0.0), ThreatLevel::Safe);
    }

    #[test]
    fn level_ordering() {
        assert!(ThreatLevel::Safe < ThreatLevel::Low);
        assert!(ThreatLevel::Low < ThreatLevel::Medium);
        assert!(ThreatLevel::Medium < ThreatLevel::High);
        assert!(ThreatLevel::High < ThreatLevel::Critical);
    }

    #[test]
    fn wire_enums_serialize_as_integers() {
        let json = serde_json::to_string(&ThreatLevel::Critical).unwrap();
        assert_eq!(json, "4");
        let json = serde_json::to_string(&ThreatType::Privacy).unwrap();
        assert_eq!(json, "3");

        let level: ThreatLevel = serde_json::from_str("2").unwrap();
        assert_eq!(level, ThreatLevel::Medium);
        assert!(serde_json::from_str::<ThreatLevel>("9").is_err());
    }

    #[test]
    fn security_score_inverts_overall_score() {
        let mut report = ThreatReport::new("https://example.com");
        assert_eq!(report.security_score(), 100);
        report.add_finding(finding(ThreatType::Phishing, ThreatLevel::Critical, 1.0));
        assert_eq!(report.security_score(), 0);
    }
}
