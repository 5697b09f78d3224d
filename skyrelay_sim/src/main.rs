//! SkyRelay Simulator CLI
//!
//! Run the EQC/VQC delivery protocol over simulated missions and check its
//! invariants.

use clap::Parser;
use skyrelay_core::{MissionConfig, PolicyKind};
use skyrelay_sim::scenarios::ScenarioId;
use skyrelay_sim::{ScenarioResult, ScenarioRunner};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// SkyRelay mission simulator
#[derive(Parser, Debug)]
#[command(name = "skyrelay-sim")]
#[command(about = "Simulate PoI assignment and delivery between quadcopters", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of consecutive seeds to run
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Scenario to run (baseline, dense, crowded, tight_buffer, sparse, all)
    #[arg(short = 'S', long, default_value = "baseline")]
    scenario: String,

    /// Assignment policy (greedy, round_robin, load_balancing, all)
    #[arg(short, long)]
    policy: Option<String>,

    /// Number of visiting agents
    #[arg(long)]
    vqcs: Option<usize>,

    /// Number of PoIs
    #[arg(long)]
    pois: Option<usize>,

    /// Buffer capacity per visiting agent
    #[arg(long)]
    buffer: Option<usize>,

    /// Side of the square area in meters
    #[arg(long)]
    area: Option<f64>,

    /// Mission duration in seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// World steps per simulated second
    #[arg(long, default_value = "10")]
    tick_rate: u32,

    /// Base configuration (JSON); flags override it
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

impl Args {
    fn base_config(&self) -> MissionConfig {
        let mut config = match &self.config {
            Some(path) => MissionConfig::from_json_file(path).unwrap_or_else(|e| {
                eprintln!("Error: {}: {}", path, e);
                std::process::exit(1);
            }),
            None => MissionConfig::default(),
        };

        if let Some(n) = self.vqcs {
            config.num_vqcs = n;
        }
        if let Some(n) = self.pois {
            config.num_pois = n;
        }
        if let Some(m) = self.buffer {
            config.buffer_capacity = m;
        }
        if let Some(area) = self.area {
            config.area = area;
        }
        if let Some(secs) = self.duration {
            config.duration_secs = secs;
        }
        config
    }
}

fn main() {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = match (args.verbose, args.json) {
        (true, _) => "debug",
        (false, true) => "warn",
        (false, false) => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    if !args.json {
        info!("SkyRelay Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!("Available scenarios: baseline, dense, crowded, tight_buffer, sparse, all");
            std::process::exit(1);
        })]
    };

    let base = args.base_config();

    // Parse policies; an unknown name is passed through so the run shows
    // how the coordinator copes with it
    let policies: Vec<String> = match args.policy.as_deref() {
        Some("all") => PolicyKind::all().iter().map(|p| p.name().to_string()).collect(),
        Some(name) => vec![name.parse::<PolicyKind>()
            .map(|p| p.name().to_string())
            .unwrap_or_else(|_| name.to_string())],
        None => vec![base.policy.clone()],
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    // Track results
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);

        for policy in &policies {
            let config = MissionConfig {
                policy: policy.clone(),
                ..base.clone()
            };
            let runner = ScenarioRunner::new(seed, config).with_tick_rate(args.tick_rate);

            for scenario in &scenarios {
                let result = runner.run(*scenario);

                if !args.json {
                    report_text(&result);
                }
                if !result.passed {
                    failed_count += 1;
                }
                all_results.push(result);
            }
        }
    }

    // Summary
    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "policy": r.policy,
                    "passed": r.passed,
                    "ticks": r.total_ticks,
                    "time_secs": r.final_time_secs,
                    "failure_reason": r.failure_reason,
                    "metrics": r.report.as_ref().map(|report| &report.metrics),
                    "radio": r.report.as_ref().map(|report| &report.radio),
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to serialize results: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);

            for result in &all_results {
                if !result.passed {
                    error!(
                        "  - {} seed={} policy={}: {}",
                        result.scenario.name(),
                        result.seed,
                        result.policy,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}

fn report_text(result: &ScenarioResult) {
    let Some(report) = result.report.as_ref().filter(|_| result.passed) else {
        error!(
            "✗ {} (seed={}, policy={}) FAILED: {}",
            result.scenario.name(),
            result.seed,
            result.policy,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
        return;
    };

    let m = &report.metrics;
    let rate = |v: Option<f64>| v.map_or("undefined".to_string(), |v| format!("{:.3}", v));
    info!(
        "✓ {} (seed={}, policy={}) PASSED: {} delivered, {} redundant, success rate {}, avg latency {}",
        result.scenario.name(),
        result.seed,
        result.policy,
        m.unique_delivered,
        m.redundant_delivers,
        rate(m.success_rate),
        rate(m.avg_latency_secs)
    );
}
