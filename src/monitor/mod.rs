// Real-time page monitor — DOM mutations, network requests, mining detection.
//
// Each monitored page gets its own mutable state: a capped alert list,
// a monotonically increasing anomaly score, and request/block/mutation
// counters. Alerts are immutable event records, optionally forwarded to
// an unbounded channel for the embedding browser core to consume.

use std::collections::{HashMap, HashSet};

use regex_lite::Regex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Danger,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    ScriptInjection,
    IframeInsertion,
    FormHijack,
    SuspiciousRequest,
    CryptoMining,
    DataExfiltration,
    DomClobbering,
}

/// Immutable security event emitted by the monitor.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityAlert {
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub page_id: String,
    pub message: String,
    pub details: HashMap<String, serde_json::Value>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl SecurityAlert {
    fn new(
        alert_type: AlertType,
        severity: AlertSeverity,
        page_id: &str,
        message: String,
    ) -> Self {
        Self {
            alert_type,
            severity,
            page_id: page_id.to_string(),
            message,
            details: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Per-page monitoring state. Created by `start_monitoring`, destroyed by
/// `cleanup`. The anomaly score never decreases within a session.
#[derive(Debug)]
pub struct PageMonitorState {
    pub page_id: String,
    pub is_active: bool,
    pub alerts: Vec<SecurityAlert>,
    pub anomaly_score: f64,
    pub request_count: u64,
    pub blocked_count: u64,
    pub mutation_count: u64,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl PageMonitorState {
    fn new(page_id: &str) -> Self {
        Self {
            page_id: page_id.to_string(),
            is_active: true,
            alerts: Vec::new(),
            anomaly_score: 0.0,
            request_count: 0,
            blocked_count: 0,
            mutation_count: 0,
            started_at: chrono::Utc::now(),
        }
    }
}

/// One observed DOM mutation, as reported by the browser core.
#[derive(Debug, Clone, Default)]
pub struct DomMutation {
    pub mutation_type: String,
    pub added_nodes: Vec<String>,
    pub attribute_name: Option<String>,
    pub target_tag: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// One observed network request, as reported by the browser core.
#[derive(Debug, Clone, Default)]
pub struct NetworkRequest {
    pub url: String,
    pub method: String,
    pub body: Option<String>,
}

/// Page summary served to the UI layer.
#[derive(Debug, Clone, Serialize)]
pub struct PageSummary {
    pub page_id: String,
    pub active: bool,
    pub duration_seconds: f64,
    pub anomaly_score: f64,
    pub total_alerts: usize,
    pub critical_alerts: usize,
    pub requests: u64,
    pub blocked: u64,
    pub mutations: u64,
}

pub struct RealtimeMonitor {
    pages: HashMap<String, PageMonitorState>,
    known_threats: HashSet<String>,
    alert_tx: Option<mpsc::UnboundedSender<SecurityAlert>>,
    max_alerts_per_page: usize,
    mining_patterns: Vec<Regex>,
    suspicious_script_patterns: Vec<Regex>,
    exfiltration_patterns: Vec<Regex>,
}

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

const SUSPICIOUS_SCRIPT_PATTERNS: &[&str] = &[
    r"(?i)document\.write\s*\(",
    r"(?i)eval\s*\(",
    r"(?i)Function\s*\(",
    r"(?i)innerHTML\s*=.*<script",
];

const EXFILTRATION_PATTERNS: &[&str] = &[
    r"(?i)document\.cookie",
    r"(?i)localStorage\.getItem",
    r"(?i)navigator\.sendBeacon\s*\(",
    r"(?i)new\s+Image\(\)\.src\s*=",
];

impl RealtimeMonitor {
    pub fn new(alert_tx: Option<mpsc::UnboundedSender<SecurityAlert>>) -> Self {
        Self::with_alert_cap(alert_tx, 100)
    }

    pub fn with_alert_cap(
        alert_tx: Option<mpsc::UnboundedSender<SecurityAlert>>,
        max_alerts_per_page: usize,
    ) -> Self {
        let compile = |patterns: &[&str]| {
            patterns
                .iter()
                .map(|p| Regex::new(p).expect("static regex"))
                .collect()
        };
        Self {
            pages: HashMap::new(),
            known_threats: HashSet::new(),
            alert_tx,
            max_alerts_per_page,
            mining_patterns: compile(MINING_PATTERNS),
            suspicious_script_patterns: compile(SUSPICIOUS_SCRIPT_PATTERNS),
            exfiltration_patterns: compile(EXFILTRATION_PATTERNS),
        }
    }

    // ============================
    // Lifecycle
    // ============================

    pub fn start_monitoring(&mut self, page_id: &str) {
        match self.pages.get_mut(page_id) {
            Some(state) => state.is_active = true,
            None => {
                self.pages
                    .insert(page_id.to_string(), PageMonitorState::new(page_id));
            }
        }
    }

    /// Deactivate a page and return a reference to its final state.
    pub fn stop_monitoring(&mut self, page_id: &str) -> Option<&PageMonitorState> {
        let state = self.pages.get_mut(page_id)?;
        state.is_active = false;
        Some(state)
    }

    pub fn get_state(&self, page_id: &str) -> Option<&PageMonitorState> {
        self.pages.get(page_id)
    }

    /// All alerts across pages, newest first.
    pub fn all_alerts(&self) -> Vec<&SecurityAlert> {
        let mut alerts: Vec<&SecurityAlert> = self
            .pages
            .values()
            .flat_map(|s| s.alerts.iter())
            .collect();
        alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        alerts
    }

    pub fn cleanup(&mut self, page_id: &str) {
        self.pages.remove(page_id);
    }

    pub fn cleanup_all(&mut self) {
        self.pages.clear();
    }

    // ============================
    // Known-threat URL set
    // ============================

    pub fn add_known_threat(&mut self, url: &str) {
        self.known_threats.insert(url.to_string());
    }

    pub fn remove_known_threat(&mut self, url: &str) {
        self.known_threats.remove(url);
    }

    // ============================
    // DOM mutation events
    // ============================

    /// Process a batch of DOM mutations, returning the alerts they raised.
    pub fn on_dom_mutation(&mut self, page_id: &str, mutations: &[DomMutation]) -> Vec<SecurityAlert> {
        let Some(state) = self.pages.get(page_id) else {
            return Vec::new();
        };
        if !state.is_active {
            return Vec::new();
        }

        let mut alerts: Vec<(SecurityAlert, f64)> = Vec::new();

        for mutation in mutations {
            for node in &mutation.added_nodes {
                let node_lower = node.to_ascii_lowercase();

                if node_lower.contains("<script") {
                    alerts.push((
                        SecurityAlert::new(
                            AlertType::ScriptInjection,
                            AlertSeverity::Danger,
                            page_id,
                            "Dynamically inserted script tag".to_string(),
                        )
                        .with_detail("node", truncate(node, 500)),
                        0.3,
                    ));
                }

                if node_lower.contains("<iframe") {
                    alerts.push((
                        SecurityAlert::new(
                            AlertType::IframeInsertion,
                            AlertSeverity::Warning,
                            page_id,
                            "Dynamically inserted iframe".to_string(),
                        )
                        .with_detail("node", truncate(node, 500)),
                        0.2,
                    ));
                }

                if let Some(pattern) = self
                    .suspicious_script_patterns
                    .iter()
                    .find(|p| p.is_match(node))
                {
                    alerts.push((
                        SecurityAlert::new(
                            AlertType::DomClobbering,
                            AlertSeverity::Warning,
                            page_id,
                            "Suspicious DOM manipulation pattern".to_string(),
                        )
                        .with_detail("pattern", pattern.as_str())
                        .with_detail("content", truncate(node, 300)),
                        0.15,
                    ));
                }
            }

            // Form hijacking: the action attribute changed under us
            if mutation.mutation_type == "attributes"
                && mutation.attribute_name.as_deref() == Some("action")
                && mutation.target_tag.as_deref() == Some("form")
                && mutation.old_value != mutation.new_value
            {
                alerts.push((
                    SecurityAlert::new(
                        AlertType::FormHijack,
                        AlertSeverity::Critical,
                        page_id,
                        format!(
                            "Form action changed: {} -> {}",
                            mutation.old_value.as_deref().unwrap_or(""),
                            mutation.new_value.as_deref().unwrap_or("")
                        ),
                    ),
                    0.5,
                ));
            }
        }

        let state = self.pages.get_mut(page_id).expect("checked above");
        state.mutation_count += mutations.len() as u64;

        let mut raised = Vec::with_capacity(alerts.len());
        for (alert, score_delta) in alerts {
            state.anomaly_score += score_delta;
            Self::emit(state, &self.alert_tx, self.max_alerts_per_page, alert.clone());
            raised.push(alert);
        }
        raised
    }

    // ============================
    // Network request events
    // ============================

    /// Inspect one outgoing request. Returns an alert when it is blocked
    /// or looks like exfiltration/mining traffic.
    pub fn on_network_request(
        &mut self,
        page_id: &str,
        request: &NetworkRequest,
    ) -> Option<SecurityAlert> {
        let state = self.pages.get(page_id)?;
        if !state.is_active {
            return None;
        }

        let known_threat = self.known_threats.contains(&request.url);
        let exfil = request
            .body
            .as_deref()
            .and_then(|body| self.exfiltration_patterns.iter().find(|p| p.is_match(body)));
        let mining = self.mining_patterns.iter().any(|p| p.is_match(&request.url));

        let state = self.pages.get_mut(page_id).expect("checked above");
        state.request_count += 1;

        let alert = if known_threat {
            state.blocked_count += 1;
            SecurityAlert::new(
                AlertType::SuspiciousRequest,
                AlertSeverity::Danger,
                page_id,
                format!("Blocked request to known threat URL: {}", truncate(&request.url, 100)),
            )
            .with_detail("url", request.url.clone())
            .with_detail("method", request.method.clone())
        } else if let Some(pattern) = exfil {
            state.anomaly_score += 0.4;
            SecurityAlert::new(
                AlertType::DataExfiltration,
                AlertSeverity::Critical,
                page_id,
                format!("Suspected data exfiltration: {}", truncate(&request.url, 80)),
            )
            .with_detail("url", request.url.clone())
            .with_detail("pattern", pattern.as_str())
        } else if mining {
            state.anomaly_score += 0.6;
            SecurityAlert::new(
                AlertType::CryptoMining,
                AlertSeverity::Danger,
                page_id,
                format!("Crypto-mining script load: {}", truncate(&request.url, 100)),
            )
            .with_detail("url", request.url.clone())
        } else {
            return None;
        };

        Self::emit(state, &self.alert_tx, self.max_alerts_per_page, alert.clone());
        Some(alert)
    }

    // ============================
    // Mining detection
    // ============================

    /// Heuristic crypto-mining detection on raw script source.
    pub fn detect_crypto_mining(&self, js_code: &str) -> bool {
        if self.mining_patterns.iter().any(|p| p.is_match(js_code)) {
            return true;
        }

        // WebAssembly-based miners
        let code_lower = js_code.to_ascii_lowercase();
        let wasm_indicators = [
            js_code.contains("WebAssembly.instantiate"),
            js_code.contains("WebAssembly.compile")
                && (code_lower.contains("hash") || code_lower.contains("nonce")),
            js_code.contains("SharedArrayBuffer") && js_code.contains("Atomics"),
        ];
        if wasm_indicators.iter().filter(|&&x| x).count() >= 2 {
            return true;
        }

        // Worker farms hashing something
        let worker_count = js_code.matches("new Worker").count();
        worker_count >= 4 && (code_lower.contains("hash") || code_lower.contains("nonce"))
    }

    // ============================
    // Summaries
    // ============================

    pub fn page_summary(&self, page_id: &str) -> Option<PageSummary> {
        let state = self.pages.get(page_id)?;
        let duration = (chrono::Utc::now() - state.started_at).num_milliseconds() as f64 / 1000.0;
        Some(PageSummary {
            page_id: state.page_id.clone(),
            active: state.is_active,
            duration_seconds: duration,
            anomaly_score: state.anomaly_score.min(1.0),
            total_alerts: state.alerts.len(),
            critical_alerts: state
                .alerts
                .iter()
                .filter(|a| a.severity == AlertSeverity::Critical)
                .count(),
            requests: state.request_count,
            blocked: state.blocked_count,
            mutations: state.mutation_count,
        })
    }

    fn emit(
        state: &mut PageMonitorState,
        alert_tx: &Option<mpsc::UnboundedSender<SecurityAlert>>,
        max_alerts: usize,
        alert: SecurityAlert,
    ) {
        debug!(
            page_id = %alert.page_id,
            alert_type = ?alert.alert_type,
            severity = ?alert.severity,
            "security alert"
        );
        if state.alerts.len() < max_alerts {
            state.alerts.push(alert.clone());
        }
        if let Some(tx) = alert_tx {
            // A closed consumer is not the monitor's problem
            let _ = tx.send(alert);
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
