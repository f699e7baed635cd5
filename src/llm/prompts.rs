// Prompt templates for LLM threat judgement.
//
// Every template demands a JSON-only response whose shape matches
// LlmJudgement. User prompts embed the extracted feature summaries so the
// model reasons over the same signals the heuristics score.

use crate::analyzers::features::{DomFeatures, JsFeatures, UrlFeatures};

pub const URL_SYSTEM_PROMPT: &str = "\
You are a web security expert. Analyze URLs for phishing, malware, and \
suspicious patterns. Respond ONLY in JSON format:\n\
{\n\
  \"threat_level\": \"SAFE|LOW|MEDIUM|HIGH|CRITICAL\",\n\
  \"threat_types\": [\"phishing\", \"malware\", ...],\n\
  \"confidence\": 0.0-1.0,\n\
  \"reasoning\": \"analysis rationale\",\n\
  \"indicators\": [\"indicator1\", \"indicator2\"],\n\
  \"recommendation\": \"recommended action\"\n\
}";

pub const SCRIPT_SYSTEM_PROMPT: &str = "\
You are a JavaScript security analyst. Detect malicious patterns, \
obfuscation, data exfiltration, and crypto mining in the provided code. \
Respond ONLY in JSON format:\n\
{\n\
  \"threat_level\": \"SAFE|LOW|MEDIUM|HIGH|CRITICAL\",\n\
  \"threat_types\": [\"malware\", ...],\n\
  \"confidence\": 0.0-1.0,\n\
  \"reasoning\": \"chain-of-thought analysis\",\n\
  \"suspicious_patterns\": [\"pattern1\", \"pattern2\"],\n\
  \"behavior_prediction\": \"predicted behavior\"\n\
}";

pub const PAGE_SYSTEM_PROMPT: &str = "\
You are a web page security analyst. Analyze the HTML content and URL \
together for phishing, XSS, malware, and privacy violations. \
Respond ONLY in JSON format:\n\
{\n\
  \"threat_level\": \"SAFE|LOW|MEDIUM|HIGH|CRITICAL\",\n\
  \"threat_types\": [\"phishing\", \"xss\", ...],\n\
  \"confidence\": 0.0-1.0,\n\
  \"reasoning\": \"analysis rationale\",\n\
  \"indicators\": [\"indicator1\", \"indicator2\"],\n\
  \"recommendation\": \"recommended action\"\n\
}";

pub fn url_user_prompt(url: &str, features: &UrlFeatures) -> String {
    format!(
        "Analyze this URL for security threats:\n\n\
         URL: {url}\n\
         Domain: {}\n\
         Subdomain count: {}\n\
         URL length: {}\n\
         Special character ratio: {:.2}\n\
         IP-literal host: {}\n\
         HTTPS: {}\n\
         URL entropy: {:.2}\n\n\
         Assess the likelihood that this URL is a phishing or malicious site.",
        features.domain,
        features.subdomain_count,
        features.length,
        features.special_char_ratio,
        features.is_ip_address,
        features.is_https,
        features.entropy,
    )
}

pub fn script_user_prompt(code: &str, features: &JsFeatures) -> String {
    // Long scripts are truncated; the statistics cover the full source.
    let snippet = if code.len() > 4000 {
        &code[..floor_char_boundary(code, 4000)]
    } else {
        code
    };
    format!(
        "Analyze this JavaScript code for security threats:\n\n\
         ```javascript\n{snippet}\n```\n\n\
         Code statistics:\n\
         - eval() calls: {}\n\
         - document.write() calls: {}\n\
         - Encoded-string conversions: {}\n\
         - Variable-name entropy: {:.2}\n\
         - Obfuscation score: {:.2}\n\n\
         Determine whether this code is malicious. Reason step by step.",
        features.eval_count,
        features.document_write_count,
        features.atob_count + features.from_char_code_count,
        features.variable_name_entropy,
        features.obfuscation_score,
    )
}

pub fn page_user_prompt(url: &str, html: &str, features: &DomFeatures) -> String {
    let snippet = if html.len() > 2000 {
        &html[..floor_char_boundary(html, 2000)]
    } else {
        html
    };
    format!(
        "Perform a comprehensive security analysis of this web page:\n\n\
         URL: {url}\n\
         Page title: {}\n\n\
         HTML summary:\n\
         - Forms: {}\n\
         - Password fields: {}\n\
         - External scripts: {}\n\
         - External resource ratio: {:.2}\n\
         - iframes: {}\n\
         - Hidden elements: {}\n\n\
         HTML excerpt (first 2000 chars):\n\
         ```html\n{snippet}\n```",
        features.title,
        features.form_count,
        features.password_field_count,
        features.external_script_count,
        features.external_resource_ratio,
        features.iframe_count,
        features.hidden_element_count,
    )
}

/// Largest index <= `max` that falls on a char boundary.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut idx = max.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
