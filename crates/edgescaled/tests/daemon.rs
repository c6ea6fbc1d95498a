//! Daemon end to end: real UDP socket in, aggregator and orchestrator out.

use std::io::Write;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::oneshot;

use edgescale_autoscale::DryRunOrchestrator;
use edgescale_core::EdgescaleConfig;
use edgescale_core::SystemClock;
use edgescale_core::config::Settings;
use edgescaled::Edgescale;

const CONFIG: &str = r#"
ingress_type = "nginx"

[listen]
address = "127.0.0.1"
port = 0

[dispatch]
pool_size = 3
queue_depth = 16

[autoscale]
services = ["checkout"]
max_qps = 100.0
safe_qps = 10.0
samples_per_minute = 1
min_replicas = 1
scale_step = 1
cooldown = "5m"
"#;

fn settings() -> Settings {
    EdgescaleConfig::from_toml_str(CONFIG).unwrap().resolve().unwrap()
}

fn nginx_line(service: &str) -> String {
    format!(
        r#"<190>Oct 19 12:00:00 edge-1 nginx: {{"service":"{service}","msec":"1697716800.123","status":"200","request_time":"0.010"}}"#
    )
}

#[tokio::test]
async fn datagrams_flow_from_socket_to_aggregator() {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    let orchestrator = Arc::new(DryRunOrchestrator::new(1));
    let app = Edgescale::new(settings(), orchestrator, Arc::new(SystemClock));
    let aggregator = Arc::clone(app.aggregator());
    let pipeline = Arc::clone(app.pipeline());
    let autoscaler = Arc::clone(app.autoscaler());

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let daemon = tokio::spawn(app.run(socket, None, async {
        let _ = stop_rx.await;
    }));

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for _ in 0..5 {
        client.send_to(nginx_line("checkout").as_bytes(), addr).await.unwrap();
    }
    client.send_to(nginx_line("unrelated").as_bytes(), addr).await.unwrap();
    client.send_to(b"garbage", addr).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while pipeline.stats().datagrams() < 7 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("datagrams not processed in time");

    stop_tx.send(()).unwrap();
    daemon.await.unwrap().unwrap();

    // Shutdown finalizes the drained events into a window of their own.
    assert_eq!(aggregator.current_count("checkout"), 0);
    let last = aggregator.latest().await.expect("final window");
    assert_eq!(last.sequence, 1);
    assert_eq!(last.services["checkout"].requests, 5);
    assert!(!last.services.contains_key("unrelated"));
    assert!(!aggregator.is_tracked("unrelated"));
    // One-minute evaluation interval: the controller never ran.
    let state = autoscaler.scale_state("checkout").await.unwrap();
    assert_eq!(state.last_action, None);
    assert_eq!(state.last_window, None);
    assert_eq!(pipeline.stats().events(), 5);
    assert_eq!(pipeline.stats().filtered(), 1);
    assert_eq!(pipeline.stats().malformed(), 1);
}

#[tokio::test]
async fn stops_cleanly_without_traffic() {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let app = Edgescale::new(
        settings(),
        Arc::new(DryRunOrchestrator::new(1)),
        Arc::new(SystemClock),
    );

    let aggregator = Arc::clone(app.aggregator());

    tokio::time::timeout(Duration::from_secs(5), app.run(socket, None, async {}))
        .await
        .expect("daemon did not stop")
        .unwrap();

    let last = aggregator.latest().await.expect("final window");
    assert_eq!(last.services["checkout"].requests, 0);
}

#[test]
fn invalid_config_exits_with_status_one() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.replace("\"nginx\"", "\"haproxy\"").as_bytes())
        .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_edgescaled"))
        .arg("--config")
        .arg(file.path())
        .env("RUST_LOG", "error")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("invalid configuration"));
    assert!(stdout.contains("haproxy"));
}

#[test]
fn missing_config_exits_with_status_one() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_edgescaled"))
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
}
