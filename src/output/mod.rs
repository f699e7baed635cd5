// Colored terminal output for threat reports.
//
// This module handles all terminal-specific formatting. The main.rs
// command handlers delegate here.

use colored::{ColoredString, Colorize};

use crate::report::{ThreatLevel, ThreatReport};

/// Display a full threat report in the terminal.
pub fn display_report(report: &ThreatReport) {
    println!("\n{}", format!("=== Threat Report: {} ===", report.target).bold());
    println!();
    println!("  Overall level: {}", colorize_level(report.overall_level));
    println!("  Overall score: {:.2}", report.overall_score);
    println!("  Analysis time: {:.1} ms", report.analysis_time_ms);
    if report.cached {
        println!("  {}", "(served from cache)".dimmed());
    }

    if report.findings.is_empty() {
        println!("\n  No findings.");
    } else {
        println!("\n  {} finding(s):", report.findings.len());
        for (i, finding) in report.findings.iter().enumerate() {
            println!(
                "  {:>3}. [{}] {} ({}, confidence {:.2})",
                i + 1,
                colorize_level(finding.threat_level),
                finding.description,
                finding.threat_type,
                finding.confidence,
            );
            for indicator in &finding.indicators {
                println!("       - {indicator}");
            }
        }
    }

    if !report.recommendations.is_empty() {
        println!("\n  Recommendations:");
        for rec in &report.recommendations {
            println!("   * {rec}");
        }
    }
    println!();
}

/// One-line summary used by the batch scan command.
pub fn display_report_line(report: &ThreatReport) {
    println!(
        "  {:<60} {}  {:.2}",
        truncate_chars(&report.target, 60),
        colorize_level(report.overall_level),
        report.overall_score,
    );
}

pub fn colorize_level(level: ThreatLevel) -> ColoredString {
    match level {
        ThreatLevel::Safe => level.as_str().green(),
        ThreatLevel::Low => level.as_str().yellow(),
        ThreatLevel::Medium => level.as_str().bright_yellow(),
        ThreatLevel::High => level.as_str().bright_red(),
        ThreatLevel::Critical => level.as_str().red().bold(),
    }
}

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
///
/// Unlike byte slicing (`&text[..120]`), this respects UTF-8 character boundaries
/// and will never panic on multi-byte characters like emoji or accented letters.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}
