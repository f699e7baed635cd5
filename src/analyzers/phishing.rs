// Phishing analyzer — URL-structure and page-content heuristics.
//
// URL mode scores structural signals (IP-literal hosts, homoglyphs,
// typosquatting against well-known domains, suspicious TLDs). Page mode
// scores content signals (login forms, favicon origin mismatch, phishing
// keywords, auto-submitting forms). Each signal carries a fixed weight;
// the sum is clamped to 0.0-1.0 and gated by the configured threshold.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use regex_lite::Regex;
use tracing::debug;

use super::features::{extract_url_features, ParsedUrl, UrlFeatures};
use super::{AnalysisTarget, Analyzer};
use crate::report::{Finding, ThreatLevel, ThreatType};

// ============================================================
// Pattern tables
// ============================================================

/// Unicode characters that render like common Latin letters.
const HOMOGLYPHS: &[(char, char)] = &[
    ('а', 'a'), // Cyrillic
    ('е', 'e'),
    ('о', 'o'),
    ('р', 'p'),
    ('с', 'c'),
    ('у', 'y'),
    ('х', 'x'),
    ('ѕ', 's'),
    ('і', 'i'),
    ('ј', 'j'),
    ('ԁ', 'd'),
    ('ɡ', 'g'),
    ('ɩ', 'l'),
    ('ո', 'n'),
    ('ν', 'v'), // Greek
    ('τ', 't'),
    ('ω', 'w'),
    ('ℓ', 'l'),
    ('０', '0'), // fullwidth
    ('１', '1'),
    ('ⅰ', 'i'),
];

const SUSPICIOUS_TLDS: &[&str] = &[
    ".tk", ".ml", ".ga", ".cf", ".gq", // free registrations
    ".top", ".xyz", ".club", ".work", ".buzz", ".icu", ".cam", ".rest", ".surf", ".monster",
    ".uno", ".click", ".link", ".info", ".pw", ".cc", ".ws", ".ru", ".cn",
];

/// High-value domains checked for typosquatting.
const FAMOUS_DOMAINS: &[&str] = &[
    "google.com",
    "facebook.com",
    "amazon.com",
    "apple.com",
    "microsoft.com",
    "netflix.com",
    "paypal.com",
    "instagram.com",
    "twitter.com",
    "linkedin.com",
    "github.com",
    "yahoo.com",
    "dropbox.com",
    "chase.com",
    "wellsfargo.com",
    "bankofamerica.com",
    "citibank.com",
    "usbank.com",
    "ebay.com",
    "walmart.com",
    "naver.com",
    "kakao.com",
    "daum.net",
    "samsung.com",
    "coinbase.com",
    "binance.com",
    "blockchain.com",
    "icloud.com",
    "outlook.com",
    "gmail.com",
];

const BRAND_NAMES: &[&str] = &[
    "google", "facebook", "amazon", "apple", "microsoft", "netflix", "paypal", "instagram",
    "twitter", "linkedin", "github", "yahoo", "dropbox", "chase", "wells", "citibank", "ebay",
    "walmart", "naver", "kakao", "samsung", "coinbase", "binance", "icloud",
];

const PHISHING_KEYWORDS: &[&str] = &[
    "verify your account",
    "confirm your identity",
    "update your payment",
    "suspended",
    "unusual activity",
    "unauthorized",
    "limited access",
    "click here immediately",
    "act now",
    "urgent action",
];

/// Phishing detector. Scores URL structure on Url targets and page
/// content on Page targets; abstains on Script targets.
pub struct PhishingAnalyzer {
    threshold: f64,
    login_form: Regex,
    password_field: Regex,
    resource: Regex,
    favicon: Regex,
    hidden_element: Regex,
    data_uri: Regex,
    auto_submit: Regex,
    right_click_block: Regex,
}

impl PhishingAnalyzer {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            login_form: Regex::new(r"(?i)<form[^>]*(?:login|signin|log-in|sign-in|auth)[^>]*>")
                .expect("static regex"),
            password_field: Regex::new(r#"(?i)<input[^>]*type\s*=\s*["']password["'][^>]*>"#)
                .expect("static regex"),
            resource: Regex::new(r#"(?i)(?:src|href)\s*=\s*["']?(https?://[^"'\s>]+)"#)
                .expect("static regex"),
            favicon: Regex::new(
                r#"(?i)<link[^>]*rel\s*=\s*["'](?:shortcut\s+)?icon["'][^>]*href\s*=\s*["']?(https?://[^"'\s>]+)"#,
            )
            .expect("static regex"),
            hidden_element: Regex::new(
                r#"(?i)display\s*:\s*none|visibility\s*:\s*hidden|type\s*=\s*["']hidden["']"#,
            )
            .expect("static regex"),
            data_uri: Regex::new(r#"(?i)src\s*=\s*["']data:"#).expect("static regex"),
            auto_submit: Regex::new(r"(?i)(?:onload|setTimeout|setInterval)[^>]*submit")
                .expect("static regex"),
            right_click_block: Regex::new(
                r#"(?i)oncontextmenu\s*=\s*["']?\s*(?:return\s+false|event\.preventDefault)"#,
            )
            .expect("static regex"),
        }
    }

    // ============================
    // URL scoring
    // ============================

    fn score_url(&self, url: &str) -> (f64, Vec<String>, HashMap<String, serde_json::Value>) {
        let features = extract_url_features(url);
        let homoglyphs = detect_homoglyphs(&features.domain);
        let typosquat = detect_typosquatting(&features.domain);
        let brand_in_domain = contains_brand_name(&features.domain);

        let mut score = 0.0;
        let mut indicators = Vec::new();

        if features.is_ip_address {
            score += 0.30;
            indicators.push("IP address used as domain".to_string());
        }
        if !features.is_https {
            score += 0.10;
            indicators.push("No HTTPS".to_string());
        }
        if SUSPICIOUS_TLDS.contains(&features.tld.as_str()) {
            score += 0.15;
            indicators.push(format!("Suspicious TLD: {}", features.tld));
        }
        if features.subdomain_count >= 3 {
            score += 0.15;
            indicators.push(format!("Excessive subdomains: {}", features.subdomain_count));
        } else if features.subdomain_count >= 2 {
            score += 0.08;
        }
        if features.length > 100 {
            score += 0.12;
            indicators.push(format!("Unusually long URL: {} chars", features.length));
        } else if features.length > 75 {
            score += 0.08;
            indicators.push(format!("Long URL: {} chars", features.length));
        }
        if features.entropy > 5.0 {
            score += 0.12;
            indicators.push(format!("Very high URL entropy: {:.2}", features.entropy));
        } else if features.entropy > 4.5 {
            score += 0.08;
            indicators.push(format!("High URL entropy: {:.2}", features.entropy));
        }
        if features.has_at_symbol {
            score += 0.20;
            indicators.push("@ symbol in URL (possible URL spoofing)".to_string());
        }
        if features.has_unusual_port {
            score += 0.15;
            if let Some(port) = features.port {
                indicators.push(format!("Unusual port: {port}"));
            }
        }
        if !homoglyphs.chars.is_empty() {
            score += 0.30;
            indicators.push(format!(
                "Homoglyph characters detected: {}",
                homoglyphs.chars.iter().collect::<String>()
            ));
        }
        if let Some((similar, similarity)) = &typosquat {
            score += 0.25 + similarity * 0.10;
            indicators.push(format!("Possible typosquatting of '{similar}'"));
        }
        if brand_in_domain {
            score += 0.15;
            indicators.push("Well-known brand name inside domain".to_string());
        }
        if features.digit_ratio > 0.3 {
            score += 0.08;
        }
        if features.special_char_ratio > 0.2 {
            score += 0.08;
        }
        if features.encoded_char_count > 3 {
            score += 0.10;
            indicators.push(format!(
                "Many percent-encoded characters: {}",
                features.encoded_char_count
            ));
        }
        if features.has_double_hyphen {
            score += 0.05;
        }
        if features.path_depth > 5 {
            score += 0.05;
        }

        let metadata = url_metadata(&features, &typosquat);
        (score.clamp(0.0, 1.0), indicators, metadata)
    }

    // ============================
    // Content scoring
    // ============================

    fn score_content(
        &self,
        url: &str,
        html: &str,
    ) -> (f64, Vec<String>, HashMap<String, serde_json::Value>) {
        let page_host = ParsedUrl::parse(url).host;

        let mut score = 0.0;
        let mut indicators = Vec::new();

        let login_forms = self.login_form.find_iter(html).count();
        if login_forms > 0 {
            score += 0.15;
            indicators.push("Login form detected".to_string());
        }

        let password_fields = self.password_field.find_iter(html).count();
        if password_fields > 0 {
            score += 0.15;
            indicators.push(format!("{password_fields} password field(s)"));
        }

        let resources: Vec<&str> = self
            .resource
            .captures_iter(html)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        let external = resources
            .iter()
            .filter(|r| !page_host.is_empty() && !r.contains(&page_host))
            .count();
        let external_ratio = external as f64 / resources.len().max(1) as f64;
        if external_ratio > 0.8 {
            score += 0.15;
            indicators.push("Very high external resource ratio".to_string());
        } else if external_ratio > 0.5 {
            score += 0.08;
        }

        let favicon_mismatch = self
            .favicon
            .captures_iter(html)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .any(|fav| !page_host.is_empty() && !fav.contains(&page_host));
        if favicon_mismatch {
            score += 0.20;
            indicators.push("Favicon served from a different origin".to_string());
        }

        let html_lower = html.to_ascii_lowercase();
        let matched_keywords: Vec<&str> = PHISHING_KEYWORDS
            .iter()
            .copied()
            .filter(|kw| html_lower.contains(kw))
            .collect();
        if !matched_keywords.is_empty() {
            score += (matched_keywords.len() as f64 * 0.05).min(0.20);
            indicators.push(format!(
                "Phishing keywords: {}",
                matched_keywords
                    .iter()
                    .take(3)
                    .copied()
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        let iframe_count = html_lower.matches("<iframe").count();
        if iframe_count > 0 {
            score += 0.10;
            indicators.push(format!("{iframe_count} iframe(s)"));
        }

        let hidden = self.hidden_element.find_iter(html).count();
        if hidden > 3 {
            score += 0.10;
            indicators.push(format!("{hidden} hidden elements"));
        }

        if self.data_uri.is_match(html) {
            score += 0.10;
            indicators.push("data: URI resources".to_string());
        }

        if self.auto_submit.is_match(html) {
            score += 0.20;
            indicators.push("Automatic form submission detected".to_string());
        }

        if self.right_click_block.is_match(html) {
            score += 0.10;
            indicators.push("Right-click blocking (common phishing trait)".to_string());
        }

        let mut metadata = HashMap::new();
        metadata.insert("analysis_method".into(), "content_heuristic".into());
        metadata.insert("login_form_count".into(), login_forms.into());
        metadata.insert("password_field_count".into(), password_fields.into());
        metadata.insert("external_resource_ratio".into(), external_ratio.into());

        (score.clamp(0.0, 1.0), indicators, metadata)
    }

    fn finding_from(
        &self,
        score: f64,
        description: String,
        indicators: Vec<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Option<Finding> {
        if score < self.threshold {
            return None;
        }
        let threat_level = ThreatLevel::from_score(score);
        if threat_level == ThreatLevel::Safe {
            return None;
        }
        Some(Finding {
            threat_type: ThreatType::Phishing,
            threat_level,
            confidence: score,
            description,
            indicators,
            metadata,
        })
    }
}

#[async_trait]
impl Analyzer for PhishingAnalyzer {
    fn name(&self) -> &'static str {
        "phishing"
    }

    async fn analyze(&self, target: &AnalysisTarget<'_>) -> Result<Option<Finding>> {
        match target {
            AnalysisTarget::Url(url) => {
                let (score, indicators, metadata) = self.score_url(url);
                debug!(url = %url, score, "phishing URL heuristic");
                Ok(self.finding_from(
                    score,
                    format!("URL structure suggests phishing (score {score:.2})"),
                    indicators,
                    metadata,
                ))
            }
            AnalysisTarget::Page { url, html } => {
                let (score, indicators, metadata) = self.score_content(url, html);
                debug!(url = %url, score, "phishing content heuristic");
                Ok(self.finding_from(
                    score,
                    format!("Page content suggests phishing (score {score:.2})"),
                    indicators,
                    metadata,
                ))
            }
            AnalysisTarget::Script { .. } => Ok(None),
        }
    }
}

// ============================================================
// Homoglyphs / typosquatting
// ============================================================

struct HomoglyphResult {
    chars: Vec<char>,
    #[allow(dead_code)]
    normalized: String,
}

fn detect_homoglyphs(domain: &str) -> HomoglyphResult {
    let mut chars = Vec::new();
    let mut normalized = String::with_capacity(domain.len());

    for c in domain.chars() {
        match HOMOGLYPHS.iter().find(|(glyph, _)| *glyph == c) {
            Some((_, latin)) => {
                chars.push(c);
                normalized.push(*latin);
            }
            None => normalized.push(c),
        }
    }

    HomoglyphResult { chars, normalized }
}

/// Edit-distance check against well-known domains. Returns the matched
/// domain and its similarity when the base domain is close (>= 0.80) but
/// not an exact match.
fn detect_typosquatting(domain: &str) -> Option<(String, f64)> {
    let parts: Vec<&str> = domain.split('.').filter(|p| !p.is_empty()).collect();
    let base = if parts.len() >= 2 {
        parts[parts.len() - 2..].join(".")
    } else {
        domain.to_string()
    };

    let mut best_match = "";
    let mut best_similarity = 0.0f64;

    for famous in FAMOUS_DOMAINS {
        if base == *famous {
            return None;
        }
        let distance = levenshtein(&base, famous);
        let max_len = base.chars().count().max(famous.chars().count());
        let similarity = if max_len > 0 {
            1.0 - distance as f64 / max_len as f64
        } else {
            0.0
        };
        if similarity > best_similarity {
            best_similarity = similarity;
            best_match = famous;
        }
    }

    (best_similarity >= 0.80).then(|| (best_match.to_string(), best_similarity))
}

fn levenshtein(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    if b.is_empty() {
        return a.len();
    }

    let mut prev_row: Vec<usize> = (0..=b.len()).collect();
    for (i, c1) in a.iter().enumerate() {
        let mut curr_row = vec![i + 1];
        for (j, c2) in b.iter().enumerate() {
            let insertions = prev_row[j + 1] + 1;
            let deletions = curr_row[j] + 1;
            let substitutions = prev_row[j] + usize::from(c1 != c2);
            curr_row.push(insertions.min(deletions).min(substitutions));
        }
        prev_row = curr_row;
    }
    prev_row[b.len()]
}

/// A famous brand name inside a domain that is not the brand's own domain.
fn contains_brand_name(domain: &str) -> bool {
    let domain_lower = domain.to_ascii_lowercase();
    BRAND_NAMES.iter().any(|brand| {
        if !domain_lower.contains(brand) {
            return false;
        }
        let official = format!("{brand}.com");
        domain_lower != official && !domain_lower.ends_with(&format!(".{official}"))
    })
}

fn url_metadata(
    features: &UrlFeatures,
    typosquat: &Option<(String, f64)>,
) -> HashMap<String, serde_json::Value> {
    let mut metadata = HashMap::new();
    metadata.insert("analysis_method".into(), "url_heuristic".into());
    metadata.insert("domain".into(), features.domain.clone().into());
    metadata.insert("is_ip_address".into(), features.is_ip_address.into());
    metadata.insert("is_https".into(), features.is_https.into());
    metadata.insert("entropy".into(), features.entropy.into());
    metadata.insert("subdomain_count".into(), features.subdomain_count.into());
    if let Some((similar, similarity)) = typosquat {
        metadata.insert("similar_domain".into(), similar.clone().into());
        metadata.insert("domain_similarity".into(), (*similarity).into());
    }
    metadata
}
