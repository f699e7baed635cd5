use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use palisade::agent::SecurityAgent;
use palisade::config::Config;
use palisade::output;
use palisade::report::ThreatLevel;

/// Palisade: web-security analysis agent.
///
/// Scores URLs, JavaScript, and HTML pages for phishing, malware, and
/// privacy-tracking risk, and serves threat reports to a browser core.
#[derive(Parser)]
#[command(name = "palisade", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP analysis service
    Serve,

    /// Analyze a single URL
    AnalyzeUrl {
        /// The URL to analyze
        url: String,

        /// Enable LLM deep analysis (requires OPENAI_API_KEY)
        #[arg(long)]
        llm: bool,
    },

    /// Analyze a JavaScript file
    AnalyzeScript {
        /// Path to the script file
        file: String,

        /// URL the script was served from, if known
        #[arg(long, default_value = "")]
        source_url: String,
    },

    /// Analyze a saved HTML page
    AnalyzePage {
        /// The page URL
        url: String,

        /// Path to the HTML file
        file: String,

        /// Enable LLM deep analysis (requires OPENAI_API_KEY)
        #[arg(long)]
        llm: bool,
    },

    /// Batch-analyze a file of URLs (one per line)
    Scan {
        /// Path to the URL list
        file: String,

        /// Number of URLs to analyze in parallel (default: 8)
        #[arg(long, default_value = "8")]
        concurrency: usize,

        /// Enable LLM deep analysis (requires OPENAI_API_KEY)
        #[arg(long)]
        llm: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("palisade=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Serve => {
            palisade::server::run_server(config).await?;
        }

        Commands::AnalyzeUrl { url, llm } => {
            let agent = SecurityAgent::new(config);
            agent.initialize().await?;
            let report = agent.analyze_url(&url, llm).await?;
            output::display_report(&report);
            agent.shutdown().await;
        }

        Commands::AnalyzeScript { file, source_url } => {
            let code = std::fs::read_to_string(&file)?;
            let agent = SecurityAgent::new(config);
            agent.initialize().await?;
            let report = agent.analyze_script(&code, &source_url).await?;
            output::display_report(&report);
            agent.shutdown().await;
        }

        Commands::AnalyzePage { url, file, llm } => {
            let html = std::fs::read_to_string(&file)?;
            let agent = SecurityAgent::new(config);
            agent.initialize().await?;
            let report = agent.analyze_page(&url, &html, llm).await?;
            output::display_report(&report);
            agent.shutdown().await;
        }

        Commands::Scan {
            file,
            concurrency,
            llm,
        } => {
            let urls: Vec<String> = std::fs::read_to_string(&file)?
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(String::from)
                .collect();

            if urls.is_empty() {
                println!("No URLs found in {file}");
                return Ok(());
            }

            let agent = Arc::new(SecurityAgent::new(config));
            agent.initialize().await?;

            println!("Analyzing {} URLs ({concurrency} concurrent)...", urls.len());
            let pb = ProgressBar::new(urls.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  Scanning [{bar:30}] {pos}/{len} ({eta})")
                    .unwrap(),
            );

            let results: Vec<_> = stream::iter(urls.into_iter().map(|url| {
                let agent = agent.clone();
                let pb = pb.clone();
                async move {
                    let result = agent.analyze_url(&url, llm).await;
                    pb.inc(1);
                    (url, result)
                }
            }))
            .buffer_unordered(concurrency)
            .collect()
            .await;
            pb.finish_and_clear();

            let mut reports = Vec::new();
            for (url, result) in results {
                match result {
                    Ok(report) => reports.push(report),
                    Err(e) => warn!(url = %url, error = %e, "analysis failed, skipping"),
                }
            }

            // Most dangerous first
            reports.sort_by(|a, b| {
                b.overall_score
                    .partial_cmp(&a.overall_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            println!(
                "\n{}",
                format!("=== Scan Results ({} URLs) ===", reports.len()).bold()
            );
            println!();
            for report in &reports {
                output::display_report_line(report);
            }

            let threats = reports
                .iter()
                .filter(|r| r.overall_level > ThreatLevel::Safe)
                .count();
            if threats > 0 {
                println!("\n  {} {} threat(s) found", "!!".red().bold(), threats);
            } else {
                println!("\n  {}", "All URLs look safe.".green());
            }

            agent.shutdown().await;
        }
    }

    Ok(())
}
