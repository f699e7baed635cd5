// Advisory generation — a pure function of the report's threat types and
// overall level. Deterministic and idempotent: the same report state always
// yields the same advisory list, so it is safe to recompute at any time.

use std::collections::HashSet;

use super::{ThreatLevel, ThreatReport, ThreatType};

/// Derive user-facing advisories from a report.
///
/// Ordering is fixed: per-type advisories (phishing, malware, xss, privacy,
/// cert) followed by a severity addendum. A report with no findings gets
/// exactly one "safe" message.
pub fn generate_recommendations(report: &ThreatReport) -> Vec<String> {
    let mut recommendations = Vec::new();

    if report.overall_level == ThreatLevel::Safe {
        recommendations.push("This page appears to be safe.".to_string());
        return recommendations;
    }

    let types_found: HashSet<ThreatType> =
        report.findings.iter().map(|f| f.threat_type).collect();

    if types_found.contains(&ThreatType::Phishing) {
        recommendations
            .push("Suspected phishing: do not enter personal information on this site.".to_string());
        recommendations.push(
            "Check the URL carefully and compare it against the official site address.".to_string(),
        );
    }

    if types_found.contains(&ThreatType::Malware) {
        recommendations
            .push("Suspected malware: do not download files from this page.".to_string());
        recommendations.push("JavaScript execution may be blocked.".to_string());
    }

    if types_found.contains(&ThreatType::Xss) {
        recommendations.push(
            "XSS vulnerability detected: data entered on this page may be exfiltrated.".to_string(),
        );
    }

    if types_found.contains(&ThreatType::Privacy) {
        recommendations.push(
            "Privacy threat: trackers were detected. Enable tracking protection.".to_string(),
        );
    }

    if types_found.contains(&ThreatType::Cert) {
        recommendations.push(
            "Certificate problem: the connection to this site may not be trustworthy.".to_string(),
        );
    }

    if report.overall_level >= ThreatLevel::High {
        recommendations
            .push("High threat level: leaving this site immediately is recommended.".to_string());
    } else if report.overall_level >= ThreatLevel::Medium {
        recommendations.push("Moderate threat level: proceed with caution.".to_string());
    }

    recommendations
}
