use assert_cmd::Command;
use predicates::prelude::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STUB_STATUS: &str = "Active connections: 43
server accepts handled requests
 7368 7360 10993
Reading: 0 Writing: 5 Waiting: 38
";

fn binary(name: &str, cache: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin(name).unwrap();
    cmd.env_clear().arg("--cache-path").arg(cache);
    cmd
}

async fn stub_status_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Server", "nginx/1.25.3")
                .set_body_string(STUB_STATUS),
        )
        .mount(&server)
        .await;
    server
}

#[test]
fn test_help_lists_common_options() {
    let dir = tempfile::tempdir().unwrap();

    binary("nr-mysql", &dir.path().join("rates.json"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--pretty"))
        .stdout(predicate::str::contains("--extended-innodb-metrics"));
}

#[test]
fn test_unreachable_endpoint_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();

    binary("nr-apache", &dir.path().join("rates.json"))
        .args(["--metrics", "--status-url", "http://127.0.0.1:1/server-status?auto"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("127.0.0.1:1"));
}

#[test]
fn test_missing_cassandra_config_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();

    binary("nr-cassandra", &dir.path().join("rates.json"))
        .arg("--inventory")
        .arg("--config-path")
        .arg(dir.path().join("missing.yaml"))
        .assert()
        .failure()
        .stdout(predicate::str::is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_nginx_publishes_document() {
    let server = stub_status_server().await;
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("rates.json");
    let config = dir.path().join("nginx.conf");
    std::fs::write(&config, "worker_processes 2;\nevents {\n    worker_connections 512;\n}\n").unwrap();
    let url = format!("{}/status", server.uri());

    let output = tokio::task::spawn_blocking(move || {
        binary("nr-nginx", &cache)
            .args(["--status-url", url.as_str()])
            .arg("--config-path")
            .arg(&config)
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.lines().count(), 1);

    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["name"], "nginx");
    assert_eq!(json["protocol_version"], "1");
    assert_eq!(json["integration_version"], "0.2.0");
    let metrics = &json["metrics"][0];
    assert_eq!(metrics["event_type"], "LoadBalancerSample");
    assert_eq!(metrics["provider"], "NGINX");
    assert_eq!(metrics["provider.connectionsActive"], 43);
    assert_eq!(metrics["software.version"], "1.25.3");
    assert_eq!(metrics["software.edition"], "open source");
    assert!(metrics.get("provider.requestsPerSecond").is_none());
    assert_eq!(json["inventory"]["events/worker_connections"]["value"], "512");
}

#[test]
fn test_missing_nginx_config_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();

    binary("nr-nginx", &dir.path().join("rates.json"))
        .arg("--inventory")
        .arg("--config-path")
        .arg(dir.path().join("nginx.conf"))
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("nginx.conf"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_nginx_rates_appear_on_second_run() {
    let server = stub_status_server().await;
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("rates.json");
    let url = format!("{}/status", server.uri());

    let (first, second) = tokio::task::spawn_blocking(move || {
        let run = || {
            binary("nr-nginx", &cache)
                .args(["--metrics", "--pretty", "--status-url", url.as_str()])
                .output()
                .unwrap()
        };
        let first = run();
        std::thread::sleep(std::time::Duration::from_millis(20));
        (first, run())
    })
    .await
    .unwrap();

    assert!(first.status.success());
    assert!(second.status.success());

    let stdout = String::from_utf8(second.stdout).unwrap();
    assert!(stdout.contains("\n\t"), "expected tab-indented output: {}", stdout);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["metrics"][0]["provider.requestsPerSecond"], 0.0);
    assert_eq!(json["metrics"][0]["provider.connectionsDroppedPerSecond"], 0.0);
}
