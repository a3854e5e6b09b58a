use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Duration, Utc};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn unique_temp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    std::env::temp_dir().join(format!("install-guard-{nanos}-{name}"))
}

fn run_cli(args: &[&str], mock_uri: &str, scratch: &Path) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_install-guard"));
    cmd.args(args)
        .env("INSTALL_GUARD_NPM_REGISTRY_BASE_URL", mock_uri)
        .env("INSTALL_GUARD_NPM_DOWNLOADS_API_BASE_URL", mock_uri)
        .env("INSTALL_GUARD_OSV_API_BASE_URL", mock_uri)
        .env(
            "INSTALL_GUARD_CONFIG_GLOBAL_PATH",
            scratch.join("global-config.toml"),
        )
        .env(
            "INSTALL_GUARD_CONFIG_PROJECT_PATH",
            scratch.join("project-config.toml"),
        )
        .env("INSTALL_GUARD_CACHE_DB_PATH", scratch.join("cache.db"));
    cmd.output().expect("failed to run install-guard")
}

async fn mount_package(
    mock_server: &MockServer,
    name: &str,
    peers: serde_json::Value,
    vulns: serde_json::Value,
) {
    let published = (Utc::now() - Duration::days(10)).to_rfc3339();
    Mock::given(method("GET"))
        .and(path(format!("/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "dist-tags": { "latest": "1.0.0" },
            "maintainers": [{ "name": "alice" }, { "name": "bob" }],
            "versions": { "1.0.0": { "peerDependencies": peers } },
            "time": { "1.0.0": published }
        })))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/downloads/point/last-week/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "downloads": 50_000
        })))
        .mount(mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/query"))
        .and(wiremock::matchers::body_partial_json(serde_json::json!({
            "package": { "name": name, "ecosystem": "npm" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(vulns))
        .mount(mock_server)
        .await;
}

fn risky_vulns() -> serde_json::Value {
    serde_json::json!({
        "vulns": [
            { "id": "GHSA-crit", "summary": "RCE", "database_specific": { "severity": "CRITICAL" } },
            { "id": "GHSA-high", "summary": "ReDoS", "database_specific": { "severity": "HIGH" } }
        ]
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn check_blocks_incompatible_vulnerable_package() {
    let mock_server = MockServer::start().await;
    mount_package(
        &mock_server,
        "widget-kit",
        serde_json::json!({ "react": "^18.2.0" }),
        risky_vulns(),
    )
    .await;

    let project = unique_temp_path("project");
    fs::create_dir_all(&project).expect("create project dir");
    fs::write(
        project.join("package.json"),
        r#"{"dependencies": {"react": "^17.0.2"}}"#,
    )
    .expect("write manifest");
    let project_arg = project.to_string_lossy().to_string();

    let output = run_cli(
        &["check", "widget-kit", "--path", &project_arg],
        &mock_server.uri(),
        &project,
    );
    assert_eq!(output.status.code(), Some(1));

    let body: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(body["packageName"], "widget-kit");
    assert_eq!(body["compatibility"]["compatible"], false);
    assert_eq!(body["compatibility"]["checks"][0]["status"], "INCOMPATIBLE");
    assert_eq!(
        body["compatibility"]["checks"][0]["fixCommand"],
        "install react@^18.2.0"
    );
    assert_eq!(body["security"]["hasCritical"], true);
    assert_eq!(body["packageInfo"]["resolvedVersion"], "1.0.0");
    // 0 + 7 + 15 + 15
    assert_eq!(body["riskScore"]["score"], 37);
    assert_eq!(body["action"], "BLOCK");

    let forced = run_cli(
        &["check", "widget-kit", "--path", &project_arg, "--force"],
        &mock_server.uri(),
        &project,
    );
    assert_eq!(forced.status.code(), Some(0));

    let _ = fs::remove_dir_all(project);
}

#[tokio::test(flavor = "multi_thread")]
async fn check_file_summarizes_declared_dependencies() {
    let mock_server = MockServer::start().await;
    mount_package(
        &mock_server,
        "tiny-utils",
        serde_json::json!({}),
        serde_json::json!({ "vulns": [] }),
    )
    .await;

    let project = unique_temp_path("scan");
    fs::create_dir_all(&project).expect("create project dir");
    let manifest = project.join("package.json");
    fs::write(&manifest, r#"{"dependencies": {"tiny-utils": "^1.0.0"}}"#)
        .expect("write manifest");
    let manifest_arg = manifest.to_string_lossy().to_string();

    let output = run_cli(&["check-file", &manifest_arg], &mock_server.uri(), &project);
    assert_eq!(output.status.code(), Some(0));

    let body: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(body["total"], 1);
    assert_eq!(body["allowed"], 1);
    assert_eq!(body["blocked"], 0);
    assert_eq!(body["action"], "ALLOW");
    assert_eq!(body["packages"][0]["riskScore"]["score"], 100);

    let _ = fs::remove_dir_all(project);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_package_degrades_to_neutral_verdict() {
    let mock_server = MockServer::start().await;
    let scratch = unique_temp_path("unknown");
    fs::create_dir_all(&scratch).expect("create scratch dir");

    let output = run_cli(&["check", "no-such-package"], &mock_server.uri(), &scratch);
    assert_eq!(output.status.code(), Some(0));

    let body: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert!(body.get("packageInfo").is_none());
    assert_eq!(body["action"], "ALLOW");

    let _ = fs::remove_dir_all(scratch);
}
