//! Configuration, error and runtime tests.

mod common;

use common::{assert_err, assert_ok, create_config, load_config, temp_test_dir, wait_for_state};
use messagevault::api::front_end::WriteOutcome;
use messagevault::core::config::{Config, ConfigOverrides};
use messagevault::core::error::VaultError;
use messagevault::core::runtime::Runtime;
use messagevault::election::elector::ElectionState;
use messagevault::election::location::{FileLocationRecord, LocationRecord};
use messagevault::storage::cache::CheckpointedCacheReader;
use messagevault::storage::frame::{ChainAssembler, Frame, FrameFlags, LogicalMessage};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn empty_config_is_a_valid_single_node() {
    let config = assert_ok(Config::from_toml(""));
    assert_eq!(config.node.node_id, "local");
    assert_eq!(config.node.endpoint, "127.0.0.1:8001");
    assert_eq!(config.election.lease_ttl_ms, 15_000);
    assert_eq!(config.election.renew_interval_ms, 5_000);
    assert_eq!(config.election.shutdown_grace_ms, 5_000);
    assert_eq!(config.stream.max_frame_size, 64 * 1024);
    assert_eq!(config.stream.read_messages_buffer, 1000);
    assert_eq!(config.stream.read_bytes_buffer, 2 * 1024 * 1024);
    assert!(config.stream.mirror_cache);
    assert_eq!(config.storage.cache_dir, PathBuf::from("data/cache"));
    assert_eq!(config.telemetry.log_level, "info");
}

#[test]
fn config_file_sections_are_parsed() {
    let file = create_config(
        r#"
[node]
node_id = "vault-2"
endpoint = "http://10.0.0.2:8001"

[election]
lease_ttl_ms = 9000
renew_interval_ms = 3000
retry_delay_ms = 500

[stream]
name = "inventory"
max_frame_size = 4096
mirror_cache = false

[storage]
cache_dir = "/var/lib/messagevault/cache"

[telemetry]
log_level = "debug"
"#,
    );
    let config = load_config(&file);
    assert_eq!(config.node.node_id, "vault-2");
    assert_eq!(config.stream.name, "inventory");
    assert_eq!(config.stream.max_frame_size, 4096);
    assert!(!config.stream.mirror_cache);
    assert_eq!(config.telemetry.log_level, "debug");

    let election = config.election.to_election_config();
    assert_eq!(election.lease_ttl_ms, 9000);
    assert_eq!(election.renew_interval_ms, 3000);
    assert_eq!(election.retry_delay_ms, 500);
    assert_eq!(election.write_queue_depth, 256);
}

#[test]
fn renew_interval_must_be_below_ttl() {
    let err = assert_err(Config::from_toml(
        "[election]\nlease_ttl_ms = 1000\nrenew_interval_ms = 1000\n",
    ));
    assert!(format!("{:#}", err).contains("renew_interval_ms"));
}

#[test]
fn invalid_values_are_rejected() {
    assert_err(Config::from_toml("[stream]\nmax_frame_size = 0\n"));
    assert_err(Config::from_toml("[stream]\nmax_frame_size = 999999999\n"));
    assert_err(Config::from_toml("[stream]\nname = \"\"\n"));
    assert_err(Config::from_toml("[node]\nnode_id = \"  \"\n"));
    assert_err(Config::from_toml("[telemetry]\nlog_level = \"verbose\"\n"));
    assert_err(Config::from_toml("[election]\nwrite_queue_depth = 0\n"));
    assert_err(Config::from_toml(&format!(
        "[node]\nendpoint = \"{}\"\n",
        "h".repeat(600)
    )));
    assert_err(Config::from_toml("[stream\n"));
}

#[test]
fn zero_election_delays_are_rejected() {
    let err = assert_err(Config::from_toml("[election]\nretry_delay_ms = 0\n"));
    assert!(format!("{:#}", err).contains("retry_delay_ms"));
    let err = assert_err(Config::from_toml("[election]\nshutdown_grace_ms = 0\n"));
    assert!(format!("{:#}", err).contains("shutdown_grace_ms"));
    assert_ok(Config::from_toml(
        "[election]\nretry_delay_ms = 1\nshutdown_grace_ms = 1\n",
    ));

    let mut config = Config::default();
    config.election.retry_delay_ms = 0;
    assert!(Runtime::new(config).is_err());
}

#[test]
fn missing_config_file_reports_path() {
    let err = assert_err(Config::from_file(std::path::Path::new(
        "/nonexistent/messagevault.toml",
    )));
    assert!(err.to_string().contains("/nonexistent/messagevault.toml"));
}

#[test]
fn overrides_replace_file_values() {
    let mut config = Config::default();
    config.apply_overrides(&ConfigOverrides {
        log_level: Some("warn".to_string()),
        node_id: Some("vault-9".to_string()),
        endpoint: None,
        cache_dir: Some("/tmp/cache".to_string()),
    });
    assert_eq!(config.telemetry.log_level, "warn");
    assert_eq!(config.node.node_id, "vault-9");
    assert_eq!(config.node.endpoint, "127.0.0.1:8001");
    assert_eq!(config.storage.cache_dir, PathBuf::from("/tmp/cache"));
    assert_ok(config.validate());
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn error_classification() {
    let corrupt = VaultError::corrupt(42, "unknown frame flags 0xf0");
    assert_eq!(
        corrupt.to_string(),
        "corrupt frame at offset 42: unknown frame flags 0xf0"
    );
    assert!(corrupt.is_corruption());
    assert!(!corrupt.should_forward());

    assert!(VaultError::WriterShutDown.should_forward());
    assert!(!VaultError::WriterShutDown.is_corruption());
    assert!(!VaultError::append_log("throttled").should_forward());

    let claim = VaultError::LeadershipClaim {
        holder: "vault-1".to_string(),
        reason: "unreachable".to_string(),
    };
    assert!(claim.to_string().contains("vault-1"));
}

// ============================================================================
// Runtime
// ============================================================================

fn runtime_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.node.node_id = "vault-1".to_string();
    config.node.endpoint = "http://vault-1:8001".to_string();
    config.election.lease_ttl_ms = 600;
    config.election.renew_interval_ms = 200;
    config.election.retry_delay_ms = 50;
    config.election.shutdown_grace_ms = 500;
    config.stream.name = "orders".to_string();
    config.stream.max_frame_size = 512;
    config.storage.cache_dir = dir.join("cache");
    config.storage.location_path = dir.join("leader.loc");
    config
}

#[tokio::test]
async fn runtime_serves_writes_and_mirrors_the_stream() {
    let dir = temp_test_dir();
    let config = runtime_config(dir.path());
    let mut runtime = Runtime::new(config.clone()).unwrap();
    runtime.start().await.unwrap();
    assert!(runtime.is_running());

    wait_for_state(&mut runtime.election_state(), ElectionState::Leader).await;
    assert!(runtime.gate().is_enabled());
    let location = FileLocationRecord::new(&config.storage.location_path);
    assert_eq!(
        location.read().await.unwrap().as_deref(),
        Some("http://vault-1:8001")
    );

    // raw write through the front end
    let frame = Frame::new("audit", FrameFlags::empty(), &b"hello"[..]);
    match runtime.front_end().post("audit", vec![frame]).await.unwrap() {
        WriteOutcome::Accepted(posted) => assert_eq!(posted.offsets, vec![0]),
        other => panic!("expected local write, got {:?}", other),
    }

    // chunked messages on the mirrored stream
    let client = runtime.client().unwrap();
    let sent: Vec<LogicalMessage> = (0..20)
        .map(|i| LogicalMessage::new(format!("order-{}", i), common::random_bytes(i, 1500)))
        .collect();
    let published = client.publish(&sent).await.unwrap();

    let cache_dir = config.storage.cache_dir.clone();
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let reader = CheckpointedCacheReader::open_standalone(&cache_dir, "orders").unwrap();
            if reader.durable_checkpoint().unwrap().origin_cached == published.position {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("mirror never caught up");

    let mut state = runtime.election_state();
    runtime.stop().await.unwrap();
    assert!(!runtime.is_running());
    assert!(!runtime.gate().is_enabled());
    assert!(runtime.shutdown_token().is_cancelled());
    assert_eq!(*state.borrow_and_update(), ElectionState::Cancelled);

    // the cache reassembles into the published messages
    let mut reader = CheckpointedCacheReader::open_standalone(&cache_dir, "orders").unwrap();
    let bulk = reader.read_all_bulk(0, usize::MAX).unwrap();
    let mut chain = ChainAssembler::new();
    let mut cached = Vec::new();
    for record in bulk.records {
        if let Some(message) = chain.push(record.frame).unwrap() {
            cached.push(message);
        }
    }
    assert_eq!(cached, sent);
}

#[tokio::test]
async fn runtime_rejects_invalid_config() {
    let mut config = Config::default();
    config.election.renew_interval_ms = config.election.lease_ttl_ms;
    assert!(Runtime::new(config).is_err());
}
