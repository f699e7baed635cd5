// Broadcast hub integration tests — subscriber filtering, drop-oldest
// back-pressure, and the analyze -> publish -> subscribe pipeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use palisade::agent::SecurityAgent;
use palisade::config::Config;
use palisade::hub::ReportHub;
use palisade::report::{Finding, ThreatLevel, ThreatReport, ThreatType};

fn report(target: &str, level: ThreatLevel) -> ThreatReport {
    let mut r = ThreatReport::new(target);
    if level != ThreatLevel::Safe {
        r.add_finding(Finding {
            threat_type: ThreatType::Phishing,
            threat_level: level,
            confidence: 0.7,
            description: String::new(),
            indicators: vec![],
            metadata: HashMap::new(),
        });
    }
    r
}

// ============================================================
// Severity filtering (per subscriber, at delivery time)
// ============================================================

#[tokio::test]
async fn high_threshold_subscriber_never_sees_lower_levels() {
    let hub = ReportHub::new(100, 16);
    let mut strict = hub.subscribe(ThreatLevel::High);

    for level in [ThreatLevel::Low, ThreatLevel::Medium] {
        hub.publish(report("below", level)).await;
    }
    hub.publish(report("high", ThreatLevel::High)).await;
    hub.publish(report("critical", ThreatLevel::Critical)).await;

    assert_eq!(strict.recv().await.unwrap().target, "high");
    assert_eq!(strict.recv().await.unwrap().target, "critical");
}

#[tokio::test]
async fn low_threshold_subscriber_sees_every_non_safe_report() {
    let hub = ReportHub::new(100, 16);
    let mut lax = hub.subscribe(ThreatLevel::Low);

    hub.publish(report("safe", ThreatLevel::Safe)).await;
    for (i, level) in [
        ThreatLevel::Low,
        ThreatLevel::Medium,
        ThreatLevel::High,
        ThreatLevel::Critical,
    ]
    .iter()
    .enumerate()
    {
        hub.publish(report(&format!("t{i}"), *level)).await;
    }

    for i in 0..4 {
        let got = lax.recv().await.unwrap();
        assert_eq!(got.target, format!("t{i}"), "safe must be skipped");
    }
}

// ============================================================
// Drop-oldest back-pressure
// ============================================================

#[tokio::test]
async fn producer_never_blocks_on_a_stuck_subscriber() {
    let hub = ReportHub::new(500, 8);
    let mut stuck = hub.subscribe(ThreatLevel::Low);

    // Publish far past the queue capacity without consuming. If the
    // producer blocked, this would deadlock the test; the timeout guards
    // against regressions.
    let publish_all = async {
        for i in 0..100 {
            hub.publish(report(&format!("t{i}"), ThreatLevel::Medium)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), publish_all)
        .await
        .expect("publishing must not block on slow subscribers");

    // The stuck subscriber lost the oldest reports but still converges on
    // the newest one.
    let newest = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let r = stuck.recv().await.expect("hub still alive");
            if r.target == "t99" {
                return r;
            }
        }
    })
    .await
    .expect("newest report must be reachable");
    assert_eq!(newest.target, "t99");
}

#[tokio::test]
async fn one_slow_subscriber_does_not_affect_its_siblings() {
    let hub = ReportHub::new(500, 4);
    let _stuck = hub.subscribe(ThreatLevel::Low);
    let mut live = hub.subscribe(ThreatLevel::Low);

    // Interleave publish/consume: the live subscriber keeps up and sees
    // everything even though its sibling never drains.
    for i in 0..50 {
        hub.publish(report(&format!("t{i}"), ThreatLevel::Low)).await;
        let got = live.recv().await.unwrap();
        assert_eq!(got.target, format!("t{i}"));
    }
}

// ============================================================
// Full pipeline: agent -> hub -> subscriber
// ============================================================

#[tokio::test]
async fn analyzed_threats_reach_subscribers_but_safe_does_not() {
    let config = Config::default();
    let agent = Arc::new(SecurityAgent::new(config.clone()));
    agent.initialize().await.unwrap();
    let hub = Arc::new(ReportHub::new(config.max_reports, config.stream_capacity));

    let mut subscriber = hub.subscribe(ThreatLevel::Low);

    let safe = agent.analyze_url("https://www.google.com", false).await.unwrap();
    hub.publish(safe).await;

    let threat = agent
        .analyze_url("http://192.168.1.1/login", false)
        .await
        .unwrap();
    hub.publish(threat).await;

    let delivered = tokio::time::timeout(Duration::from_secs(5), subscriber.recv())
        .await
        .expect("threat must be delivered")
        .unwrap();
    assert_eq!(delivered.target, "http://192.168.1.1/login");
    assert!(delivered.overall_level >= ThreatLevel::Low);

    let summary = hub.snapshot(10, ThreatLevel::Safe).await;
    assert_eq!(summary.total_analyzed, 2);
    assert_eq!(summary.safe_count, 1);
    assert_eq!(summary.threat_count, 1);
}
