//! Offline analyzer - run the detection pipeline on a CSV file
//!
//! Run with: cargo run --bin analyze -- transactions.csv

use std::fs::File;
use std::io::BufReader;

use clap::Parser;
use console::style;
use eyre::Result;

use mulewatch::config::Config;
use mulewatch::pipeline::analyze_csv;

#[derive(Parser)]
#[command(name = "analyze", about = "Run money mule detection on a CSV file")]
struct Cli {
    /// Transaction CSV to analyze
    file: String,

    /// Cap on rows read (whole file when omitted)
    #[arg(long)]
    limit: Option<usize>,

    /// Write the JSON report to this path
    #[arg(long)]
    output: Option<String>,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mulewatch=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    config.validate()?;

    println!("🔍 Analyzing {}\n", cli.file);

    let file = File::open(&cli.file)?;
    let report = analyze_csv(BufReader::new(file), cli.limit, &config)?;

    let s = &report.summary;
    println!("═══════════════════════════════════════════════════");
    println!("                     SUMMARY                       ");
    println!("═══════════════════════════════════════════════════");
    println!("  Accounts analyzed:   {}", s.total_accounts_analyzed);
    println!("  Rows processed:      {}", s.rows_processed);
    println!("  Flagged accounts:    {}", s.suspicious_accounts_flagged);
    println!("  Fraud rings:         {}", s.fraud_rings_detected);
    println!("  Elapsed:             {:.2}s", s.processing_time_seconds);
    if s.is_partial {
        println!(
            "  {}",
            style("PARTIAL RESULT (row cap or search budget hit)").yellow()
        );
    }
    println!();

    if !report.fraud_rings.is_empty() {
        println!("{}", style("FRAUD RINGS").red().bold());
        for ring in &report.fraud_rings {
            println!(
                "  {} [{}] risk {:.1} - {} members, {} txns",
                style(&ring.ring_id).red(),
                ring.pattern_type,
                ring.risk_score,
                ring.member_accounts.len(),
                ring.transaction_count
            );
        }
        println!();
    }

    if !report.suspicious_accounts.is_empty() {
        println!("{}", style("TOP SUSPICIOUS ACCOUNTS").yellow().bold());
        for row in report.suspicious_accounts.iter().take(10) {
            println!(
                "  {:>5.1}  {}  ({})",
                row.suspicion_score,
                row.account_id,
                row.detected_patterns.join(", ")
            );
        }
        println!();
    }

    if let Some(path) = &cli.output {
        let json = if cli.pretty {
            serde_json::to_string_pretty(&report)?
        } else {
            serde_json::to_string(&report)?
        };
        std::fs::write(path, json)?;
        println!("{} Report written to {}", style("✓").green(), path);
    }

    Ok(())
}
