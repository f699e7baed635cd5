// Security agent — the orchestration core.
//
// Runs the applicable analyzers concurrently for a target, merges their
// findings into one ThreatReport in completion order, consults/populates
// the result cache, and optionally augments with an LLM judgement.
//
// Failure policy: one analyzer failing (or the optional LLM being
// unavailable) never aborts its siblings or the call — the analyzer is
// treated as having abstained. Exceeding the overall deadline cancels
// whatever is still in flight and finalizes the report from the findings
// gathered so far. The only call-level errors are "not initialized" and
// invalid input rejected at the service boundary.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::analyzers::{
    AnalysisTarget, Analyzer, MalwareAnalyzer, PhishingAnalyzer, PrivacyAnalyzer,
};
use crate::config::Config;
use crate::llm::{judgement_to_finding, prompts, OpenAiJudge, ThreatJudge};
use crate::report::{Finding, ThreatReport, ThreatType};

pub mod cache;

pub use cache::{cache_key, ReportCache};

/// Scripts larger than this skip LLM augmentation entirely.
const LLM_SCRIPT_MAX_BYTES: usize = 10_000;

/// Error returned when an analysis operation runs before `initialize()`.
/// Fatal to the call, not to the process.
#[derive(Debug, Clone, Copy)]
pub struct NotInitialized;

impl std::fmt::Display for NotInitialized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "security agent is not initialized; call initialize() first")
    }
}

impl std::error::Error for NotInitialized {}

/// Analyzer wiring created by `initialize()` and dropped by `shutdown()`.
struct AgentInner {
    phishing: Arc<PhishingAnalyzer>,
    malware: Arc<MalwareAnalyzer>,
    privacy: Arc<PrivacyAnalyzer>,
    judge: Option<Arc<dyn ThreatJudge>>,
}

pub struct SecurityAgent {
    config: Config,
    cache: ReportCache,
    inner: RwLock<Option<Arc<AgentInner>>>,
}

impl SecurityAgent {
    pub fn new(config: Config) -> Self {
        let cache = ReportCache::new(config.cache_max_size);
        Self {
            config,
            cache,
            inner: RwLock::new(None),
        }
    }

    /// Wire up the analyzer adapters and, when configured, the LLM judge.
    /// Idempotent: a second call is a warning, not an error. LLM setup
    /// failure degrades to heuristic-only operation.
    pub async fn initialize(&self) -> Result<()> {
        let judge: Option<Arc<dyn ThreatJudge>> = if self.config.llm_configured() {
            match OpenAiJudge::new(
                self.config.llm_base_url.clone(),
                self.config.llm_api_key.clone(),
                self.config.llm_model.clone(),
                self.config.llm_timeout(),
            ) {
                Ok(judge) => {
                    info!(model = %self.config.llm_model, "LLM judge initialized");
                    Some(Arc::new(judge))
                }
                Err(e) => {
                    warn!(error = %e, "LLM judge setup failed, running heuristics only");
                    None
                }
            }
        } else {
            debug!("No LLM key configured, running heuristics only");
            None
        };

        self.initialize_with(judge).await
    }

    /// Initialization seam used by `initialize()` and by tests that inject
    /// a scripted judge.
    pub async fn initialize_with(&self, judge: Option<Arc<dyn ThreatJudge>>) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.is_some() {
            warn!("SecurityAgent is already initialized");
            return Ok(());
        }

        *inner = Some(Arc::new(AgentInner {
            phishing: Arc::new(PhishingAnalyzer::new(self.config.phishing_threshold)),
            malware: Arc::new(MalwareAnalyzer::new(self.config.malware_threshold)),
            privacy: Arc::new(PrivacyAnalyzer::new(self.config.privacy_threshold)),
            judge,
        }));

        info!(version = %self.config.version, "SecurityAgent initialized");
        Ok(())
    }

    /// Release the analyzers and clear the cache.
    pub async fn shutdown(&self) {
        info!("SecurityAgent shutting down");
        *self.inner.write().await = None;
        self.cache.clear().await;
    }

    pub async fn is_initialized(&self) -> bool {
        self.inner.read().await.is_some()
    }

    pub async fn cache_size(&self) -> usize {
        self.cache.len().await
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        info!("Analysis result cache cleared");
    }

    async fn require_inner(&self) -> Result<Arc<AgentInner>> {
        self.inner
            .read()
            .await
            .clone()
            .ok_or_else(|| anyhow::Error::new(NotInitialized))
    }

    // ============================
    // URL analysis
    // ============================

    pub async fn analyze_url(&self, url: &str, use_llm: bool) -> Result<ThreatReport> {
        let inner = self.require_inner().await?;

        let key = cache_key("url", url.as_bytes());
        if let Some(hit) = self.cache.get(&key).await {
            debug!(url = %url, "cache hit");
            return Ok(hit);
        }

        let start = Instant::now();
        let deadline = start + self.config.analysis_timeout();
        let mut report = ThreatReport::new(url);

        let target = AnalysisTarget::Url(url);
        let tasks: Vec<(&'static str, BoxFuture<'_, Result<Option<Finding>>>)> =
            vec![("phishing", inner.phishing.analyze(&target))];
        for finding in run_adapters(tasks, deadline).await {
            report.add_finding(finding);
        }

        if use_llm {
            if let Some(finding) = self.judge_url(&inner, url, deadline).await {
                report.add_finding(finding);
            }
        }

        self.finalize(&key, &mut report, start).await;
        info!(
            url = %url,
            level = %report.overall_level,
            elapsed_ms = report.analysis_time_ms,
            "URL analysis complete"
        );
        Ok(report)
    }

    // ============================
    // Script analysis
    // ============================

    pub async fn analyze_script(&self, code: &str, source_url: &str) -> Result<ThreatReport> {
        let inner = self.require_inner().await?;

        let key = cache_key("script", code.as_bytes());
        if let Some(hit) = self.cache.get(&key).await {
            debug!(target_id = %hit.target, "cache hit");
            return Ok(hit);
        }

        let start = Instant::now();
        let deadline = start + self.config.analysis_timeout();

        // Content-addressed identity when the script has no source URL
        let target_id = if source_url.is_empty() {
            key.clone()
        } else {
            source_url.to_string()
        };
        let mut report = ThreatReport::new(&target_id);

        let target = AnalysisTarget::Script { code, source_url };
        let tasks: Vec<(&'static str, BoxFuture<'_, Result<Option<Finding>>>)> =
            vec![("malware", inner.malware.analyze(&target))];
        for finding in run_adapters(tasks, deadline).await {
            report.add_finding(finding);
        }

        if code.len() <= LLM_SCRIPT_MAX_BYTES {
            if let Some(finding) = self.judge_script(&inner, code, deadline).await {
                report.add_finding(finding);
            }
        }

        self.finalize(&key, &mut report, start).await;
        info!(
            target_id = %report.target,
            level = %report.overall_level,
            elapsed_ms = report.analysis_time_ms,
            "script analysis complete"
        );
        Ok(report)
    }

    // ============================
    // Page analysis (full fan-out)
    // ============================

    pub async fn analyze_page(
        &self,
        url: &str,
        html: &str,
        use_llm: bool,
    ) -> Result<ThreatReport> {
        let inner = self.require_inner().await?;

        // Fingerprint over the URL plus a content prefix: stable for
        // unchanged pages without rehashing multi-megabyte payloads.
        let mut key_payload = Vec::with_capacity(url.len() + 1001);
        key_payload.extend_from_slice(url.as_bytes());
        key_payload.push(b':');
        key_payload.extend_from_slice(&html.as_bytes()[..html.len().min(1000)]);
        let key = cache_key("page", &key_payload);

        if let Some(hit) = self.cache.get(&key).await {
            debug!(url = %url, "cache hit");
            return Ok(hit);
        }

        let start = Instant::now();
        let deadline = start + self.config.analysis_timeout();
        let mut report = ThreatReport::new(url);

        let url_target = AnalysisTarget::Url(url);
        let page_target = AnalysisTarget::Page { url, html };

        let tasks: Vec<(&'static str, BoxFuture<'_, Result<Option<Finding>>>)> = vec![
            ("phishing-url", inner.phishing.analyze(&url_target)),
            ("phishing-content", inner.phishing.analyze(&page_target)),
            ("malware-html", inner.malware.analyze(&page_target)),
            ("privacy", inner.privacy.analyze(&page_target)),
        ];
        for finding in run_adapters(tasks, deadline).await {
            report.add_finding(finding);
        }

        if use_llm {
            if let Some(finding) = self.judge_page(&inner, url, html, deadline).await {
                report.add_finding(finding);
            }
        }

        self.finalize(&key, &mut report, start).await;
        info!(
            url = %url,
            level = %report.overall_level,
            score = report.overall_score,
            elapsed_ms = report.analysis_time_ms,
            "page analysis complete"
        );
        Ok(report)
    }

    // ============================
    // LLM augmentation
    // ============================

    async fn judge_url(
        &self,
        inner: &AgentInner,
        url: &str,
        deadline: Instant,
    ) -> Option<Finding> {
        let judge = inner.judge.as_ref()?;
        let features = crate::analyzers::features::extract_url_features(url);
        let prompt = prompts::url_user_prompt(url, &features);
        self.run_judge(judge, prompts::URL_SYSTEM_PROMPT, &prompt, ThreatType::Phishing, deadline)
            .await
    }

    async fn judge_script(
        &self,
        inner: &AgentInner,
        code: &str,
        deadline: Instant,
    ) -> Option<Finding> {
        let judge = inner.judge.as_ref()?;
        let features = crate::analyzers::features::extract_js_features(code);
        let prompt = prompts::script_user_prompt(code, &features);
        self.run_judge(judge, prompts::SCRIPT_SYSTEM_PROMPT, &prompt, ThreatType::Malware, deadline)
            .await
    }

    async fn judge_page(
        &self,
        inner: &AgentInner,
        url: &str,
        html: &str,
        deadline: Instant,
    ) -> Option<Finding> {
        let judge = inner.judge.as_ref()?;
        let host = crate::analyzers::features::ParsedUrl::parse(url).host;
        let features = crate::analyzers::features::extract_dom_features(html, &host);
        let prompt = prompts::page_user_prompt(url, html, &features);
        self.run_judge(judge, prompts::PAGE_SYSTEM_PROMPT, &prompt, ThreatType::Phishing, deadline)
            .await
    }

    /// Run one judgement under the remaining request budget. Any failure
    /// (transport, parse, timeout) degrades to None and is logged.
    async fn run_judge(
        &self,
        judge: &Arc<dyn ThreatJudge>,
        system_prompt: &str,
        user_prompt: &str,
        default_type: ThreatType,
        deadline: Instant,
    ) -> Option<Finding> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!("skipping LLM augmentation: request deadline exhausted");
            return None;
        }

        match tokio::time::timeout(remaining, judge.judge(system_prompt, user_prompt)).await {
            Ok(Ok(judgement)) => judgement_to_finding(judgement, default_type),
            Ok(Err(e)) => {
                warn!(error = %e, "LLM judgement failed, continuing without it");
                None
            }
            Err(_) => {
                warn!("LLM judgement timed out, continuing without it");
                None
            }
        }
    }

    async fn finalize(&self, key: &str, report: &mut ThreatReport, start: Instant) {
        report.finalize_recommendations();
        report.analysis_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.cache
            .set(key, report.clone(), self.config.cache_ttl())
            .await;
    }
}

/// Fan-out/fan-in over analyzer adapters with isolate-and-continue.
///
/// All futures run concurrently; results are drained in completion order.
/// A failing adapter is logged and contributes nothing. Once the deadline
/// passes, remaining futures are dropped (cancelling them) and whatever
/// findings were gathered so far are returned.
async fn run_adapters(
    tasks: Vec<(&'static str, BoxFuture<'_, Result<Option<Finding>>>)>,
    deadline: Instant,
) -> Vec<Finding> {
    let total = tasks.len();
    let mut in_flight: FuturesUnordered<_> = tasks
        .into_iter()
        .map(|(name, fut)| async move { (name, fut.await) })
        .collect();

    let mut findings = Vec::new();
    let mut completed = 0usize;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let next = tokio::time::timeout(remaining, in_flight.next()).await;
        match next {
            Ok(Some((name, Ok(Some(finding))))) => {
                completed += 1;
                debug!(analyzer = name, level = %finding.threat_level, "finding");
                findings.push(finding);
            }
            Ok(Some((name, Ok(None)))) => {
                completed += 1;
                debug!(analyzer = name, "abstained");
            }
            Ok(Some((name, Err(e)))) => {
                // Isolate-and-continue: a broken analyzer never suppresses
                // its siblings' findings.
                completed += 1;
                warn!(analyzer = name, error = %e, "analyzer failed, treating as abstention");
            }
            Ok(None) => break,
            Err(_) => {
                warn!(
                    completed,
                    total, "analysis deadline exceeded, returning partial findings"
                );
                break;
            }
        }
    }

    findings
}
