// Report hub — retained-report ring plus live fan-out to subscribers.
//
// Fan-out rides on tokio's broadcast channel: the producer never blocks,
// and a subscriber that falls behind loses its oldest queued reports
// (drop-oldest back-pressure), never affecting the producer or its
// sibling subscribers. Severity filtering happens at delivery time, so
// subscribers with different thresholds share one retained stream.
//
// Safe reports are stored for aggregate queries but never broadcast —
// they are not actionable alerts.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::Mutex;
use tracing::debug;

use crate::report::{ThreatLevel, ThreatReport};

/// Aggregate answer for GetSecurityReport.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReportSummary {
    pub reports: Vec<ThreatReport>,
    pub total_analyzed: usize,
    pub safe_count: usize,
    pub threat_count: usize,
}

pub struct ReportHub {
    ring: Mutex<RingState>,
    sender: broadcast::Sender<Arc<ThreatReport>>,
    max_reports: usize,
}

struct RingState {
    reports: VecDeque<Arc<ThreatReport>>,
    total_analyzed: usize,
    safe_count: usize,
}

impl ReportHub {
    pub fn new(max_reports: usize, stream_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(stream_capacity.max(1));
        Self {
            ring: Mutex::new(RingState {
                reports: VecDeque::new(),
                total_analyzed: 0,
                safe_count: 0,
            }),
            sender,
            max_reports: max_reports.max(1),
        }
    }

    /// Store a finished report and fan it out to live subscribers.
    pub async fn publish(&self, report: ThreatReport) {
        let report = Arc::new(report);

        {
            let mut ring = self.ring.lock().await;
            ring.total_analyzed += 1;
            if report.overall_level == ThreatLevel::Safe {
                ring.safe_count += 1;
            }
            ring.reports.push_back(report.clone());
            while ring.reports.len() > self.max_reports {
                ring.reports.pop_front();
            }
        }

        if report.overall_level == ThreatLevel::Safe {
            return;
        }

        // send() only fails when no subscriber exists — not an error here.
        let delivered = self.sender.send(report.clone()).unwrap_or(0);
        debug!(
            target_id = %report.target,
            level = %report.overall_level,
            subscribers = delivered,
            "threat broadcast"
        );
    }

    /// Register a live subscriber with its own severity threshold.
    pub fn subscribe(&self, min_level: ThreatLevel) -> ThreatStream {
        ThreatStream {
            receiver: self.sender.subscribe(),
            min_level,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Most recent reports at or above `min_level` (newest first), plus
    /// summary counts over everything ever stored.
    pub async fn snapshot(&self, limit: usize, min_level: ThreatLevel) -> ReportSummary {
        let ring = self.ring.lock().await;

        let reports: Vec<ThreatReport> = ring
            .reports
            .iter()
            .rev()
            .filter(|r| r.overall_level >= min_level)
            .take(limit)
            .map(|r| r.as_ref().clone())
            .collect();

        ReportSummary {
            reports,
            total_analyzed: ring.total_analyzed,
            safe_count: ring.safe_count,
            threat_count: ring.total_analyzed - ring.safe_count,
        }
    }

    pub async fn stored_count(&self) -> usize {
        self.ring.lock().await.total_analyzed
    }
}

/// A live threat subscription. Reports below the subscriber's threshold
/// are skipped at delivery time; falling behind drops the oldest queued
/// reports for this subscriber only.
pub struct ThreatStream {
    receiver: broadcast::Receiver<Arc<ThreatReport>>,
    min_level: ThreatLevel,
}

impl ThreatStream {
    /// Next report at or above this subscriber's threshold, or None once
    /// the hub is gone.
    pub async fn recv(&mut self) -> Option<Arc<ThreatReport>> {
        loop {
            match self.receiver.recv().await {
                Ok(report) if report.overall_level >= self.min_level => return Some(report),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "slow subscriber dropped oldest reports");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Finding, ThreatType};
    use std::collections::HashMap;

    fn report(target: &str, level: ThreatLevel) -> ThreatReport {
        let mut r = ThreatReport::new(target);
        if level != ThreatLevel::Safe {
            r.add_finding(Finding {
                threat_type: ThreatType::Phishing,
                threat_level: level,
                confidence: 0.8,
                description: String::new(),
                indicators: vec![],
                metadata: HashMap::new(),
            });
        }
        r
    }

    #[tokio::test]
    async fn safe_reports_are_stored_but_not_broadcast() {
        let hub = ReportHub::new(10, 10);
        let mut stream = hub.subscribe(ThreatLevel::Low);

        hub.publish(report("safe", ThreatLevel::Safe)).await;
        hub.publish(report("threat", ThreatLevel::Medium)).await;

        let delivered = stream.recv().await.unwrap();
        assert_eq!(delivered.target, "threat");

        let summary = hub.snapshot(10, ThreatLevel::Safe).await;
        assert_eq!(summary.total_analyzed, 2);
        assert_eq!(summary.safe_count, 1);
        assert_eq!(summary.threat_count, 1);
    }

    #[tokio::test]
    async fn subscriber_filter_applies_at_delivery() {
        let hub = ReportHub::new(10, 10);
        let mut strict = hub.subscribe(ThreatLevel::High);
        let mut lax = hub.subscribe(ThreatLevel::Low);

        hub.publish(report("low", ThreatLevel::Low)).await;
        hub.publish(report("critical", ThreatLevel::Critical)).await;

        // The strict subscriber skips straight to the critical report
        let got = strict.recv().await.unwrap();
        assert_eq!(got.target, "critical");

        // The lax subscriber sees both, in order
        assert_eq!(lax.recv().await.unwrap().target, "low");
        assert_eq!(lax.recv().await.unwrap().target, "critical");
    }

    #[tokio::test]
    async fn overflow_drops_oldest_without_blocking_producer() {
        let hub = ReportHub::new(200, 4);
        let mut stream = hub.subscribe(ThreatLevel::Low);

        // Publish far beyond the queue capacity while the subscriber is idle.
        for i in 0..20 {
            hub.publish(report(&format!("t{i}"), ThreatLevel::Medium)).await;
        }

        // The subscriber lost the oldest entries but still reaches the
        // newest report.
        let mut last_seen = None;
        while let Some(r) = stream.recv().await {
            let seen = r.target.clone();
            last_seen = Some(seen);
            if last_seen.as_deref() == Some("t19") {
                break;
            }
        }
        assert_eq!(last_seen.as_deref(), Some("t19"));
    }

    #[tokio::test]
    async fn ring_is_bounded() {
        let hub = ReportHub::new(3, 4);
        for i in 0..5 {
            hub.publish(report(&format!("t{i}"), ThreatLevel::Safe)).await;
        }
        let summary = hub.snapshot(10, ThreatLevel::Safe).await;
        assert_eq!(summary.reports.len(), 3);
        assert_eq!(summary.reports[0].target, "t4", "newest first");
        assert_eq!(summary.total_analyzed, 5);
    }

    #[tokio::test]
    async fn snapshot_filters_and_limits() {
        let hub = ReportHub::new(10, 4);
        hub.publish(report("safe", ThreatLevel::Safe)).await;
        hub.publish(report("medium", ThreatLevel::Medium)).await;
        hub.publish(report("critical", ThreatLevel::Critical)).await;

        let summary = hub.snapshot(1, ThreatLevel::High).await;
        assert_eq!(summary.reports.len(), 1);
        assert_eq!(summary.reports[0].target, "critical");
        assert_eq!(summary.total_analyzed, 3);
    }

    #[tokio::test]
    async fn subscriber_count_tracks_drops() {
        let hub = ReportHub::new(10, 4);
        assert_eq!(hub.subscriber_count(), 0);
        let a = hub.subscribe(ThreatLevel::Low);
        let b = hub.subscribe(ThreatLevel::High);
        assert_eq!(hub.subscriber_count(), 2);
        drop(a);
        drop(b);
        assert_eq!(hub.subscriber_count(), 0);
    }
}
