// Shared feature extraction for URLs, JavaScript, and HTML documents.
//
// These are the structural signals the heuristic analyzers score against
// and the LLM prompts summarize. Extraction is pure string work, no
// network and no DOM, so all of it is synchronous and cheap.

use std::collections::HashMap;

use regex_lite::Regex;

/// Minimal URL decomposition. We only need scheme/host/port/path/query for
/// scoring, so this is a hand-split rather than a full RFC 3986 parser;
/// malformed URLs degrade to empty components instead of erroring.
#[derive(Debug, Clone, Default)]
pub struct ParsedUrl {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
    pub query: String,
    pub fragment: String,
}

impl ParsedUrl {
    pub fn parse(url: &str) -> Self {
        let mut parsed = ParsedUrl::default();

        let rest = match url.split_once("://") {
            Some((scheme, rest)) => {
                parsed.scheme = scheme.to_ascii_lowercase();
                rest
            }
            None => url,
        };

        let (rest, fragment) = match rest.split_once('#') {
            Some((r, f)) => (r, f),
            None => (rest, ""),
        };
        parsed.fragment = fragment.to_string();

        let (rest, query) = match rest.split_once('?') {
            Some((r, q)) => (r, q),
            None => (rest, ""),
        };
        parsed.query = query.to_string();

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        parsed.path = path.to_string();

        // Strip userinfo; `user@host` is itself a phishing signal that the
        // analyzer picks up from the raw URL.
        let host_port = match authority.rsplit_once('@') {
            Some((_, hp)) => hp,
            None => authority,
        };

        match host_port.rsplit_once(':') {
            Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => {
                parsed.host = host.to_ascii_lowercase();
                parsed.port = port.parse().ok();
            }
            _ => parsed.host = host_port.to_ascii_lowercase(),
        }

        parsed
    }
}

/// Shannon entropy of a string, in bits per character.
pub fn shannon_entropy(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }

    let mut counts: HashMap<char, usize> = HashMap::new();
    let mut length = 0usize;
    for c in text.chars() {
        *counts.entry(c).or_insert(0) += 1;
        length += 1;
    }

    let len = length as f64;
    counts
        .values()
        .map(|&count| {
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

// ============================================================
// URL features
// ============================================================

/// Structural features of a URL relevant to phishing detection.
#[derive(Debug, Clone, Default)]
pub struct UrlFeatures {
    pub domain: String,
    pub length: usize,
    pub entropy: f64,
    pub subdomain_count: usize,
    pub is_ip_address: bool,
    pub is_https: bool,
    pub has_unusual_port: bool,
    pub port: Option<u16>,
    pub special_char_ratio: f64,
    pub digit_ratio: f64,
    pub has_at_symbol: bool,
    pub hyphen_count: usize,
    pub has_double_hyphen: bool,
    pub encoded_char_count: usize,
    pub tld: String,
    pub path_depth: usize,
}

pub fn extract_url_features(url: &str) -> UrlFeatures {
    let parsed = ParsedUrl::parse(url);
    let domain = parsed.host.clone();

    let ip_pattern = Regex::new(r"^(\d{1,3}\.){3}\d{1,3}$").expect("static regex");
    let encoded_pattern = Regex::new(r"%[0-9a-fA-F]{2}").expect("static regex");

    let domain_parts: Vec<&str> = domain.split('.').filter(|p| !p.is_empty()).collect();
    let subdomain_count = domain_parts.len().saturating_sub(2);

    let special_char_count = url
        .chars()
        .filter(|c| !c.is_alphanumeric() && !matches!(c, ':' | '/' | '.' | '-' | '_'))
        .count();
    let digit_count = domain.chars().filter(|c| c.is_ascii_digit()).count();

    let tld = domain_parts
        .last()
        .map(|p| format!(".{p}"))
        .unwrap_or_default();

    UrlFeatures {
        length: url.len(),
        entropy: shannon_entropy(url),
        subdomain_count,
        is_ip_address: ip_pattern.is_match(&domain),
        is_https: parsed.scheme == "https",
        has_unusual_port: parsed.port.is_some_and(|p| p != 80 && p != 443),
        port: parsed.port,
        special_char_ratio: special_char_count as f64 / url.len().max(1) as f64,
        digit_ratio: digit_count as f64 / domain.chars().count().max(1) as f64,
        has_at_symbol: url.contains('@'),
        hyphen_count: domain.matches('-').count(),
        has_double_hyphen: domain.contains("--"),
        encoded_char_count: encoded_pattern.find_iter(url).count(),
        tld,
        path_depth: parsed.path.matches('/').count().saturating_sub(1),
        domain,
    }
}

// ============================================================
// JavaScript features
// ============================================================

/// Structural features of a JavaScript source relevant to malware detection.
#[derive(Debug, Clone, Default)]
pub struct JsFeatures {
    pub length: usize,
    pub eval_count: usize,
    pub function_constructor_count: usize,
    pub document_write_count: usize,
    pub atob_count: usize,
    pub from_char_code_count: usize,
    pub escape_sequence_count: usize,
    pub hex_identifier_count: usize,
    pub variable_name_entropy: f64,
    pub code_density: f64,
    pub avg_line_length: f64,
    pub obfuscation_score: f64,
}

pub fn extract_js_features(code: &str) -> JsFeatures {
    let hex_ident = Regex::new(r"_0x[0-9a-fA-F]+").expect("static regex");
    let var_name = Regex::new(r"(?:var|let|const)\s+([A-Za-z_$][A-Za-z0-9_$]*)").expect("static regex");

    let eval_count = code.matches("eval(").count() + code.matches("eval (").count();
    let function_constructor_count =
        code.matches("Function(").count() + code.matches("Function (").count();
    let document_write_count = code.matches("document.write").count();
    let atob_count = code.matches("atob(").count() + code.matches("btoa(").count();
    let from_char_code_count = code.matches("String.fromCharCode").count();
    let escape_sequence_count = code.matches("\\x").count() + code.matches("\\u").count();
    let hex_identifier_count = hex_ident.find_iter(code).count();

    let names: Vec<String> = var_name
        .captures_iter(code)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect();
    let variable_name_entropy = shannon_entropy(&names.join(""));

    let non_ws = code.chars().filter(|c| !c.is_whitespace()).count();
    let code_density = non_ws as f64 / code.chars().count().max(1) as f64;

    let line_count = code.lines().count().max(1);
    let avg_line_length = code.len() as f64 / line_count as f64;

    let mut features = JsFeatures {
        length: code.len(),
        eval_count,
        function_constructor_count,
        document_write_count,
        atob_count,
        from_char_code_count,
        escape_sequence_count,
        hex_identifier_count,
        variable_name_entropy,
        code_density,
        avg_line_length,
        obfuscation_score: 0.0,
    };
    features.obfuscation_score = obfuscation_score(&features);
    features
}

/// Composite obfuscation score (0.0-1.0) from the individual JS signals.
fn obfuscation_score(f: &JsFeatures) -> f64 {
    let mut score = 0.0;

    if f.variable_name_entropy > 0.0 {
        score += (f.variable_name_entropy / 5.0).min(1.0) * 0.20;
    }

    let encoding_total = (f.atob_count + f.from_char_code_count + f.escape_sequence_count / 5) as f64;
    if encoding_total > 0.0 {
        score += (encoding_total / 10.0).min(1.0) * 0.25;
    }

    if f.code_density > 0.85 {
        score += ((f.code_density - 0.85) / 0.15).max(0.0) * 0.20;
    }

    if f.avg_line_length > 200.0 {
        score += ((f.avg_line_length - 200.0) / 500.0).min(1.0) * 0.15;
    }

    if f.hex_identifier_count > 0 {
        score += (f.hex_identifier_count as f64 / 20.0).min(1.0) * 0.20;
    }

    score.clamp(0.0, 1.0)
}

// ============================================================
// DOM features
// ============================================================

/// Structural features of an HTML document relevant to page analysis.
#[derive(Debug, Clone, Default)]
pub struct DomFeatures {
    pub title: String,
    pub form_count: usize,
    pub password_field_count: usize,
    pub iframe_count: usize,
    pub hidden_element_count: usize,
    pub script_count: usize,
    pub external_script_count: usize,
    pub external_resource_ratio: f64,
}

pub fn extract_dom_features(html: &str, page_host: &str) -> DomFeatures {
    let title = Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static regex");
    let password_field =
        Regex::new(r#"(?i)<input[^>]*type\s*=\s*["']password["']"#).expect("static regex");
    let hidden = Regex::new(
        r#"(?i)display\s*:\s*none|visibility\s*:\s*hidden|type\s*=\s*["']hidden["']"#,
    )
    .expect("static regex");
    let resource = Regex::new(r#"(?i)(?:src|href)\s*=\s*["']?(https?://[^"'\s>]+)"#)
        .expect("static regex");
    let external_script =
        Regex::new(r#"(?i)<script[^>]*src\s*=\s*["']?(https?://[^"'\s>]+)"#).expect("static regex");

    let resources: Vec<&str> = resource
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    let external: usize = resources
        .iter()
        .filter(|r| !page_host.is_empty() && !r.contains(page_host))
        .count();

    DomFeatures {
        title: title
            .captures(html)
            .and_then(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
            .unwrap_or_default(),
        form_count: html.to_ascii_lowercase().matches("<form").count(),
        password_field_count: password_field.find_iter(html).count(),
        iframe_count: html.to_ascii_lowercase().matches("<iframe").count(),
        hidden_element_count: hidden.find_iter(html).count(),
        script_count: html.to_ascii_lowercase().matches("<script").count(),
        external_script_count: external_script.find_iter(html).count(),
        external_resource_ratio: external as f64 / resources.len().max(1) as f64,
    }
}

/// Extract the concatenated bodies of all inline `<script>` blocks.
pub fn inline_scripts(html: &str) -> String {
    let script_block = Regex::new(r"(?is)<script[^>]*>(.*?)</script>").expect("static regex");
    script_block
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect::<Vec<_>>()
        .join("\n")
}
