use std::time::Duration;
use stressrpc_harness::config::{duration_from_secs, parse_targets, positive_count, StressConfig};
use stressrpc_harness::selector::WeightedTestCases;
use stressrpc_harness::StressError;

fn config(targets: &[&str]) -> StressConfig {
    StressConfig {
        targets: targets.iter().map(|t| t.to_string()).collect(),
        test_cases: WeightedTestCases::parse("large_unary:100").unwrap(),
        duration: Some(Duration::from_secs(1)),
        channels_per_server: 2,
        stubs_per_channel: 3,
        metrics_port: 0,
        tls: None,
    }
}

#[test]
fn test_parse_targets() {
    assert_eq!(parse_targets("localhost:8080"), vec!["localhost:8080"]);
    assert_eq!(parse_targets(" a:1, b:2 ,,"), vec!["a:1", "b:2"]);
    assert!(parse_targets("").is_empty());
}

#[test]
fn test_negative_duration_means_unbounded() {
    assert_eq!(duration_from_secs(-1), None);
    assert_eq!(duration_from_secs(0), Some(Duration::ZERO));
    assert_eq!(duration_from_secs(30), Some(Duration::from_secs(30)));
}

#[test]
fn test_positive_count() {
    assert_eq!(positive_count("num_channels_per_server", 4).unwrap(), 4);
    assert!(matches!(
        positive_count("num_channels_per_server", 0),
        Err(StressError::Configuration(ref m)) if m.contains("num_channels_per_server")
    ));
    assert!(positive_count("num_stubs_per_channel", -2).is_err());
}

#[test]
fn test_runner_count_is_servers_times_channels_times_stubs() {
    assert_eq!(config(&["a:1"]).runner_count(), 6);
    assert_eq!(config(&["a:1", "b:2"]).runner_count(), 12);
}

#[test]
fn test_validate() {
    assert_eq!(config(&["localhost:8080", "[::1]:9000"]).validate(), Ok(()));

    assert!(matches!(config(&[]).validate(), Err(StressError::Configuration(_))));
    assert!(matches!(config(&["localhost"]).validate(), Err(StressError::Configuration(_))));
    assert!(matches!(config(&[":8080"]).validate(), Err(StressError::Configuration(_))));
    assert!(matches!(config(&["localhost:http"]).validate(), Err(StressError::Configuration(_))));

    let mut no_channels = config(&["a:1"]);
    no_channels.channels_per_server = 0;
    assert!(no_channels.validate().is_err());

    let mut no_stubs = config(&["a:1"]);
    no_stubs.stubs_per_channel = 0;
    assert!(no_stubs.validate().is_err());
}
