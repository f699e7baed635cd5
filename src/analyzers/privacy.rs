// Privacy analyzer — trackers, fingerprinting, third-party cookies,
// pixel beacons, and data-exfiltration risk.
//
// The tracker table is a condensed EasyList/EasyPrivacy-style URL pattern
// set. Fingerprinting patterns carry per-API severity weights; using three
// or more APIs together amplifies the combined severity.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use regex_lite::Regex;
use tracing::debug;

use super::features::ParsedUrl;
use super::{AnalysisTarget, Analyzer};
use crate::report::{Finding, ThreatLevel, ThreatType};

// ============================================================
// Tracker patterns (EasyList/EasyPrivacy derived)
// ============================================================

const TRACKER_PATTERNS: &[&str] = &[
    // Google Analytics / Ads
    r"google-analytics\.com",
    r"googletagmanager\.com",
    r"googlesyndication\.com",
    r"doubleclick\.net",
    r"googleadservices\.com",
    r"adservice\.google\.",
    // Facebook
    r"facebook\.com/tr",
    r"connect\.facebook\.net",
    r"pixel\.facebook\.com",
    // Twitter/X
    r"analytics\.twitter\.com",
    r"platform\.twitter\.com/widgets",
    // Microsoft / LinkedIn
    r"bat\.bing\.com",
    r"clarity\.ms",
    r"snap\.licdn\.com",
    r"linkedin\.com/px",
    // Amazon
    r"amazon-adsystem\.com",
    // Session replay / analytics
    r"scorecardresearch\.com",
    r"quantserve\.com",
    r"hotjar\.com",
    r"fullstory\.com",
    r"mouseflow\.com",
    r"crazyegg\.com",
    r"mixpanel\.com",
    r"segment\.com/analytics",
    r"amplitude\.com",
    r"heapanalytics\.com",
    r"optimizely\.com",
    // Ad exchanges
    r"adnxs\.com",
    r"criteo\.com",
    r"taboola\.com",
    r"outbrain\.com",
    r"chartbeat\.com",
    r"comscore\.com",
    // Self-hosted analytics
    r"matomo\.",
    r"piwik\.",
];

/// A fingerprinting API pattern with its severity weight.
struct FingerprintPattern {
    name: &'static str,
    pattern: Regex,
    severity: f64,
    description: &'static str,
}

fn fingerprint_patterns() -> Vec<FingerprintPattern> {
    let table: &[(&str, &str, f64, &str)] = &[
        (
            "canvas_fingerprint",
            r#"(?i)\.toDataURL\s*\(|\.getImageData\s*\(|getContext\s*\(\s*["']2d["']"#,
            0.7,
            "Canvas API fingerprinting",
        ),
        (
            "webgl_fingerprint",
            r#"(?i)getContext\s*\(\s*["'](?:webgl|experimental-webgl)["']|WEBGL_debug_renderer_info|UNMASKED_(?:VENDOR|RENDERER)_WEBGL"#,
            0.8,
            "WebGL GPU fingerprinting",
        ),
        (
            "audio_fingerprint",
            r"(?is)(?:AudioContext|webkitAudioContext|OfflineAudioContext)[^;]*(?:createOscillator|createAnalyser|createDynamicsCompressor|getFloatFrequencyData)",
            0.8,
            "AudioContext fingerprinting",
        ),
        (
            "font_enumeration",
            r"(?is)(?:document\.fonts|FontFace)\s*[^;]*(?:check|load)|(?:offsetWidth|offsetHeight|getBoundingClientRect)[^;]*(?:monospace|serif|sans-serif)",
            0.6,
            "Font-enumeration fingerprinting",
        ),
        (
            "navigator_fingerprint",
            r"(?i)navigator\s*\.\s*(?:plugins|mimeTypes|languages|hardwareConcurrency|deviceMemory|maxTouchPoints|connection|getBattery|mediaDevices\.enumerateDevices)",
            0.5,
            "Navigator property harvesting",
        ),
        (
            "screen_fingerprint",
            r"(?i)screen\s*\.\s*(?:width|height|availWidth|availHeight|colorDepth|pixelDepth|orientation)",
            0.3,
            "Screen/display fingerprinting",
        ),
        (
            "webrtc_leak",
            r"(?is)(?:RTCPeerConnection|webkitRTCPeerConnection|mozRTCPeerConnection)[^;]*(?:createDataChannel|createOffer|onicecandidate)",
            0.9,
            "WebRTC local IP leak",
        ),
    ];

    table
        .iter()
        .map(|(name, pattern, severity, description)| FingerprintPattern {
            name,
            pattern: Regex::new(pattern).expect("static regex"),
            severity: *severity,
            description,
        })
        .collect()
}

const PIXEL_TRACKER_PATTERNS: &[(&str, &str)] = &[
    (
        r#"(?i)<img[^>]*(?:width\s*=\s*["']?1["']?\s+height\s*=\s*["']?1["']?|height\s*=\s*["']?1["']?\s+width\s*=\s*["']?1["']?)"#,
        "1x1 tracking pixel",
    ),
    (
        r#"(?i)(?:src|href)\s*=\s*["'][^"']*(?:blank\.gif|pixel\.gif|spacer\.gif|clear\.gif|track\.gif|beacon)"#,
        "blank/transparent GIF tracker",
    ),
    (r"(?i)navigator\s*\.\s*sendBeacon\s*\(", "sendBeacon call"),
    (r"(?i)new\s+Image\s*\(\s*\)\s*\.\s*src\s*=", "Image() tracking"),
];

/// Privacy threat detector for Page targets.
pub struct PrivacyAnalyzer {
    threshold: f64,
    trackers: Vec<Regex>,
    fingerprints: Vec<FingerprintPattern>,
    pixels: Vec<(Regex, &'static str)>,
    resource_url: Regex,
    script_url: Regex,
    cookie_set: Regex,
    external_form: Regex,
}

impl PrivacyAnalyzer {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            trackers: TRACKER_PATTERNS
                .iter()
                .map(|p| Regex::new(&format!("(?i){p}")).expect("static regex"))
                .collect(),
            fingerprints: fingerprint_patterns(),
            pixels: PIXEL_TRACKER_PATTERNS
                .iter()
                .map(|(p, label)| (Regex::new(p).expect("static regex"), *label))
                .collect(),
            resource_url: Regex::new(
                r#"(?i)(?:src|href|action|data-src)\s*=\s*["']?(https?://[^"'\s>]+)"#,
            )
            .expect("static regex"),
            script_url: Regex::new(r#"["'](https?://[^"']+)["']"#).expect("static regex"),
            cookie_set: Regex::new(r"(?i)document\.cookie\s*=").expect("static regex"),
            external_form: Regex::new(r#"(?i)<form[^>]*action\s*=\s*["']?(https?://[^"'\s>]+)"#)
                .expect("static regex"),
        }
    }

    /// Check whether a single URL matches the tracker table.
    pub fn match_tracker(&self, url: &str) -> Option<&'static str> {
        self.trackers
            .iter()
            .position(|p| p.is_match(url))
            .map(|i| TRACKER_PATTERNS[i])
    }

    fn analyze_page(&self, url: &str, html: &str) -> (f64, Vec<String>, HashMap<String, serde_json::Value>) {
        let page_host = ParsedUrl::parse(url).host;
        let page_base = base_domain(&page_host);

        // Collect every URL referenced by the page, including ones inside
        // inline scripts.
        let mut found_urls: Vec<String> = self
            .resource_url
            .captures_iter(html)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect();
        for block in super::features::inline_scripts(html).lines() {
            found_urls.extend(
                self.script_url
                    .captures_iter(block)
                    .filter_map(|c| c.get(1).map(|m| m.as_str().to_string())),
            );
        }

        // Tracker matching
        let mut tracker_domains: Vec<String> = Vec::new();
        let mut seen_domains: HashSet<String> = HashSet::new();
        let mut tracker_hits = 0usize;
        for u in &found_urls {
            if self.trackers.iter().any(|p| p.is_match(u)) {
                tracker_hits += 1;
                let domain = ParsedUrl::parse(u).host;
                let domain = if domain.is_empty() { u.clone() } else { domain };
                if seen_domains.insert(domain.clone()) {
                    tracker_domains.push(domain);
                }
            }
        }
        let tracker_score = (tracker_hits as f64 / 10.0).min(1.0);

        // Fingerprinting APIs in inline scripts
        let combined_script = super::features::inline_scripts(html);
        let mut fp_apis: Vec<&'static str> = Vec::new();
        let mut fp_descriptions: Vec<String> = Vec::new();
        let mut fp_severity = 0.0;
        for fp in &self.fingerprints {
            let hits = fp.pattern.find_iter(&combined_script).count();
            if hits > 0 {
                fp_apis.push(fp.name);
                fp_descriptions.push(format!("{} ({hits}x)", fp.description));
                fp_severity += fp.severity;
            }
        }
        if fp_apis.len() >= 3 {
            fp_severity *= 1.3;
        }
        let fp_score = (fp_severity / 3.0).min(1.0);

        // Third-party domains
        let mut third_party: HashSet<String> = HashSet::new();
        for u in &found_urls {
            let host = ParsedUrl::parse(u).host;
            let base = base_domain(&host);
            if !base.is_empty() && base != page_base {
                third_party.insert(base);
            }
        }
        let cookie_sets = self.cookie_set.find_iter(html).count();
        let cookie_score = (third_party.len() as f64 / 15.0 + cookie_sets as f64 * 0.05).min(1.0);

        // Pixel trackers
        let mut pixel_hits = 0usize;
        let mut pixel_labels: Vec<&'static str> = Vec::new();
        for (pattern, label) in &self.pixels {
            let count = pattern.find_iter(html).count();
            if count > 0 {
                pixel_hits += count;
                pixel_labels.push(label);
            }
        }
        let pixel_score = (pixel_hits as f64 / 5.0).min(1.0);

        // External form targets (data leaving the page's origin)
        let external_forms = self
            .external_form
            .captures_iter(html)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .filter(|action| {
                let base = base_domain(&ParsedUrl::parse(action).host);
                !base.is_empty() && base != page_base
            })
            .count();
        let exfil_score = (external_forms as f64 * 0.4).min(1.0);

        // Weighted combination, mirroring the per-signal ceilings above
        let combined = (tracker_score * 0.35
            + fp_score * 0.30
            + cookie_score * 0.15
            + pixel_score * 0.10
            + exfil_score * 0.10)
            .clamp(0.0, 1.0);

        let mut indicators = Vec::new();
        for domain in &tracker_domains {
            indicators.push(format!("Tracker detected: {domain}"));
        }
        for desc in &fp_descriptions {
            indicators.push(format!("Fingerprinting API: {desc}"));
        }
        if fp_apis.len() >= 3 {
            indicators.push(format!(
                "Multiple fingerprinting APIs in combination ({} kinds)",
                fp_apis.len()
            ));
        }
        if third_party.len() > 10 {
            indicators.push(format!(
                "Resources loaded from {} third-party domains",
                third_party.len()
            ));
        }
        if cookie_sets > 0 {
            indicators.push(format!("JavaScript cookie writes: {cookie_sets}"));
        }
        for label in &pixel_labels {
            indicators.push(format!("Pixel tracking: {label}"));
        }
        if external_forms > 0 {
            indicators.push(format!("{external_forms} form(s) posting to external domains"));
        }

        let mut metadata = HashMap::new();
        metadata.insert("tracker_count".into(), tracker_hits.into());
        metadata.insert("tracker_domains".into(), tracker_domains.into());
        metadata.insert(
            "fingerprint_apis".into(),
            fp_apis
                .iter()
                .map(|a| serde_json::Value::from(*a))
                .collect::<Vec<_>>()
                .into(),
        );
        metadata.insert("third_party_domain_count".into(), third_party.len().into());
        metadata.insert("pixel_tracker_count".into(), pixel_hits.into());

        (combined, indicators, metadata)
    }
}

#[async_trait]
impl Analyzer for PrivacyAnalyzer {
    fn name(&self) -> &'static str {
        "privacy"
    }

    async fn analyze(&self, target: &AnalysisTarget<'_>) -> Result<Option<Finding>> {
        let AnalysisTarget::Page { url, html } = target else {
            return Ok(None);
        };

        let (score, indicators, metadata) = self.analyze_page(url, html);
        debug!(url = %url, score, "privacy heuristic");

        if score < self.threshold {
            return Ok(None);
        }
        let threat_level = ThreatLevel::from_score(score);
        if threat_level == ThreatLevel::Safe {
            return Ok(None);
        }

        Ok(Some(Finding {
            threat_type: ThreatType::Privacy,
            threat_level,
            confidence: score,
            description: format!("Privacy threats detected (score {score:.2})"),
            indicators,
            metadata,
        }))
    }
}

/// Registrable base domain: last two labels. Good enough for third-party
/// grouping without a public-suffix list.
fn base_domain(host: &str) -> String {
    let parts: Vec<&str> = host.split('.').filter(|p| !p.is_empty()).collect();
    if parts.len() >= 2 {
        parts[parts.len() - 2..].join(".")
    } else {
        host.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> PrivacyAnalyzer {
        PrivacyAnalyzer::new(0.3)
    }

    #[test]
    fn known_trackers_match() {
        let a = analyzer();
        for url in [
            "https://www.googletagmanager.com/gtm.js",
            "https://connect.facebook.net/en_US/fbevents.js",
            "https://www.google-analytics.com/analytics.js",
        ] {
            assert!(a.match_tracker(url).is_some(), "missed tracker: {url}");
        }
    }

    #[test]
    fn clean_urls_do_not_match() {
        let a = analyzer();
        for url in [
            "https://example.com/style.css",
            "https://example.com/app.js",
            "https://example.com/image.png",
        ] {
            assert!(a.match_tracker(url).is_none(), "false positive: {url}");
        }
    }

    #[tokio::test]
    async fn tracker_heavy_page_is_flagged() {
        let mut html = String::from("<html><body>");
        for tracker in [
            "https://www.google-analytics.com/analytics.js",
            "https://www.googletagmanager.com/gtm.js",
            "https://connect.facebook.net/en_US/fbevents.js",
            "https://static.hotjar.com/c/hotjar.js",
            "https://cdn.mxpnl.com/libs/mixpanel.com/track.js",
            "https://bat.bing.com/bat.js",
            "https://snap.licdn.com/li.lms-analytics/insight.min.js",
            "https://secure.quantserve.com/quant.js",
        ] {
            html.push_str(&format!("<script src=\"{tracker}\"></script>"));
        }
        html.push_str(
            "<script>var c = canvas.getContext('2d'); var d = canvas.toDataURL(); \
             navigator.sendBeacon('https://t.example.net');</script>",
        );
        html.push_str("</body></html>");

        let target = AnalysisTarget::Page {
            url: "https://news.example.com/article",
            html: &html,
        };
        let finding = analyzer().analyze(&target).await.unwrap().unwrap();
        assert_eq!(finding.threat_type, ThreatType::Privacy);
        assert!(finding.confidence >= 0.3);
        assert!(finding.indicators.iter().any(|i| i.contains("Tracker")));
    }

    #[tokio::test]
    async fn clean_page_abstains() {
        let html = r#"<html><body>
            <img src="https://example.com/logo.png">
            <script src="https://example.com/app.js"></script>
        </body></html>"#;
        let target = AnalysisTarget::Page {
            url: "https://example.com",
            html,
        };
        assert!(analyzer().analyze(&target).await.unwrap().is_none());
    }

    #[test]
    fn canvas_fingerprinting_detected() {
        let html = r#"<script>
            var canvas = document.createElement('canvas');
            var ctx = canvas.getContext('2d');
            ctx.fillText('fingerprint', 0, 0);
            var data = canvas.toDataURL();
        </script>"#;
        let (_, indicators, metadata) =
            analyzer().analyze_page("https://example.com", html);
        assert!(indicators.iter().any(|i| i.contains("Canvas")));
        let apis = metadata.get("fingerprint_apis").unwrap();
        assert!(apis.as_array().unwrap().iter().any(|a| a == "canvas_fingerprint"));
    }

    #[test]
    fn base_domain_strips_subdomains() {
        assert_eq!(base_domain("cdn.static.example.com"), "example.com");
        assert_eq!(base_domain("example.com"), "example.com");
        assert_eq!(base_domain("localhost"), "localhost");
    }
}
