use clap::Parser;
use std::path::PathBuf;
use std::process;
use stressrpc_harness::config::{
    duration_from_secs, parse_targets, positive_count, StressConfig, TlsOptions, DEFAULT_METRICS_PORT,
};
use stressrpc_harness::metrics::RunSummary;
use stressrpc_harness::selector::WeightedTestCases;
use stressrpc_harness::{Coordinator, ExitOutcome, StressError};

#[derive(Parser)]
#[command(name = "stressrpc-stress", about = "StressRPC stress test client")]
struct Args {
    /// Comma-separated list of host:port of the servers to drive
    #[arg(long, default_value = "localhost:8080")]
    server_addresses: String,

    /// Comma-separated list of test_case:weight of the tests to run
    #[arg(long, default_value = "large_unary:100")]
    test_cases: String,

    /// How long to run (seconds); negative runs until a failure or Ctrl-C
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    test_duration_secs: i64,

    /// Number of channels opened to each server
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    num_channels_per_server: i64,

    /// Number of stubs created on each channel
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    num_stubs_per_channel: i64,

    /// Port the metrics endpoint listens on
    #[arg(long, default_value_t = DEFAULT_METRICS_PORT)]
    metrics_port: u16,

    /// Connect over TLS
    #[arg(long, default_value_t = false)]
    use_tls: bool,

    /// Trust the test CA in --test-ca-file. Requires --use-tls
    #[arg(long, default_value_t = false)]
    use_test_ca: bool,

    /// PEM file holding the test CA certificate
    #[arg(long, default_value = "certs/ca.pem")]
    test_ca_file: PathBuf,

    /// The server host to claim to connect to during the TLS handshake
    #[arg(long, default_value = "foo.test.google.fr")]
    server_host_override: String,
}

impl Args {
    fn into_config(self) -> Result<StressConfig, StressError> {
        if self.use_test_ca && !self.use_tls {
            return Err(StressError::config("--use-test-ca requires --use-tls"));
        }
        let tls = self.use_tls.then(|| TlsOptions {
            use_test_ca: self.use_test_ca,
            ca_file: self.test_ca_file.clone(),
            server_host_override: Some(self.server_host_override.clone()).filter(|s| !s.is_empty()),
        });
        Ok(StressConfig {
            targets: parse_targets(&self.server_addresses),
            test_cases: WeightedTestCases::parse(&self.test_cases)?,
            duration: duration_from_secs(self.test_duration_secs),
            channels_per_server: positive_count("num_channels_per_server", self.num_channels_per_server)?,
            stubs_per_channel: positive_count("num_stubs_per_channel", self.num_stubs_per_channel)?,
            metrics_port: self.metrics_port,
            tls,
        })
    }
}

#[tokio::main]
async fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = Args::parse().into_config().unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(3);
    });

    let weights: Vec<String> = config
        .test_cases
        .weights()
        .iter()
        .map(|(case, weight)| format!("{case}:{weight}"))
        .collect();
    tracing::info!(
        targets = ?config.targets,
        test_cases = %weights.join(","),
        runners = config.runner_count(),
        "starting stress run"
    );

    let coordinator = Coordinator::connect(&config).await.unwrap_or_else(|e| {
        eprintln!("Failed to start: {e}");
        process::exit(3);
    });

    let outcome = coordinator.with_interrupt_handling().run(None).await.unwrap_or_else(|e| {
        eprintln!("Failed to start: {e}");
        process::exit(3);
    });

    print_report(&config, &outcome);

    if let Some(error) = outcome.error() {
        eprintln!("FAILURE: {error}");
    }
    process::exit(outcome.exit_code());
}

fn print_report(config: &StressConfig, outcome: &ExitOutcome) {
    let summary: &RunSummary = outcome.summary();

    println!("StressRPC Stress Test Results");
    println!("=============================");
    println!("Duration:              {:.1} s", summary.elapsed.as_secs_f64());
    println!("Servers:               {}", config.targets.join(", "));
    println!(
        "Runners:               {} ({} channel(s) x {} stub(s) per server)",
        summary.runners, config.channels_per_server, config.stubs_per_channel
    );
    println!();
    println!("Calls:                 {}", format_thousands(summary.completed_calls));
    println!("Throughput:            {:.1} qps", summary.throughput_qps());
    println!("Mean latency:          {:.1} ms", ns_to_ms(summary.mean_ns()));
    println!("P50 latency:           {:.1} ms", ns_to_ms(summary.p50_ns()));
    println!("P99 latency:           {:.1} ms", ns_to_ms(summary.p99_ns()));
    println!();
    println!("Result: {}", if outcome.is_success() { "PASS" } else { "FAIL" });
}

fn format_thousands(n: u64) -> String {
    if n >= 1_000_000 {
        format!("~{}M", n / 1_000_000)
    } else if n >= 1_000 {
        format!("~{}K", n / 1_000)
    } else {
        n.to_string()
    }
}

fn ns_to_ms(ns: f64) -> f64 {
    ns / 1_000_000.0
}
