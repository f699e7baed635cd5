// Analyzer adapters — the swap-ready abstraction over heuristic scorers.
//
// Every analyzer implements the same three-state contract:
//   Ok(Some(finding))  — a verdict at Low severity or above
//   Ok(None)           — abstention: the target is below the analyzer's
//                        threshold (not an error)
//   Err(_)             — infrastructure failure; the orchestrator isolates
//                        it and treats the analyzer as having abstained
//
// Adapters never emit Safe findings: the abstention path is how a safe
// verdict is expressed.

use anyhow::Result;
use async_trait::async_trait;

use crate::report::Finding;

pub mod features;
pub mod malware;
pub mod phishing;
pub mod privacy;

pub use malware::MalwareAnalyzer;
pub use phishing::PhishingAnalyzer;
pub use privacy::PrivacyAnalyzer;

/// One analysis target, borrowed for the duration of the call.
///
/// A Page target carries both the URL and the HTML so an analyzer can
/// cross-check them (external-resource ratios, favicon origin).
#[derive(Debug, Clone, Copy)]
pub enum AnalysisTarget<'a> {
    Url(&'a str),
    Script { code: &'a str, source_url: &'a str },
    Page { url: &'a str, html: &'a str },
}

impl AnalysisTarget<'_> {
    /// The identifier recorded as the report target.
    pub fn identifier(&self) -> String {
        match self {
            AnalysisTarget::Url(url) => (*url).to_string(),
            AnalysisTarget::Script { source_url, .. } => (*source_url).to_string(),
            AnalysisTarget::Page { url, .. } => (*url).to_string(),
        }
    }
}

/// Trait for threat analyzers. Implementations must be async so network- or
/// model-backed adapters fit behind the same interface as pure heuristics,
/// and must abstain (not error) on target classes they do not cover.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Short stable name used in logs and finding metadata.
    fn name(&self) -> &'static str;

    /// Score one target. See the module docs for the three-state contract.
    async fn analyze(&self, target: &AnalysisTarget<'_>) -> Result<Option<Finding>>;
}
