use clap::Parser;
use std::process;
use stressrpc_harness::metrics_client::MetricsClient;

#[derive(Parser)]
#[command(name = "stressrpc-metrics", about = "Poll a running stress harness for its gauges")]
struct Args {
    /// host:port of the harness metrics endpoint
    #[arg(long, default_value = "localhost:8081")]
    metrics_server_address: String,

    /// Print the raw latency histogram instead of the gauges
    #[arg(long, default_value_t = false)]
    histogram: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let client = MetricsClient::new(&args.metrics_server_address);

    let result = if args.histogram {
        client.histogram().await.map(|h| {
            println!("count={} mean={:.1}ns p50={:.1}ns p99={:.1}ns", h.count, h.mean(), h.percentile(50.0), h.percentile(99.0));
        })
    } else {
        client.all_gauges().await.map(|gauges| {
            for g in gauges {
                println!("{}: {}", g.name, g.long_value);
            }
        })
    };

    if let Err(e) = result {
        eprintln!("Failed to poll {}: {e}", args.metrics_server_address);
        process::exit(1);
    }
}
