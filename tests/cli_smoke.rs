use predicates::prelude::*;
use std::fs;

fn companion(data_dir: &std::path::Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("companion");
    cmd.env_remove("COMPANION_UID")
        .env_remove("COMPANION_ID_TOKEN")
        .env("RUST_LOG", "info")
        .arg("--data-dir")
        .arg(data_dir);
    cmd
}

#[test]
fn migrate_initializes_local_storage() {
    let tmp = tempfile::tempdir().unwrap();

    companion(tmp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));

    let raw = fs::read_to_string(tmp.path().join("local_storage.json")).unwrap();
    let entries: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let state: serde_json::Value =
        serde_json::from_str(entries["idleon-companion"].as_str().unwrap()).unwrap();
    assert_eq!(state["tasks"]["dailyReset"], "12:00");
    assert!(state["statues"].as_object().unwrap().contains_key("Power"));
}

#[test]
fn show_prints_state_json() {
    let tmp = tempfile::tempdir().unwrap();

    let out = companion(tmp.path()).arg("show").assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).unwrap();
    let state: serde_json::Value = serde_json::from_str(&stdout).unwrap();

    assert_eq!(state["version"], env!("CARGO_PKG_VERSION"));
    assert!(state["alchemy"]["goals"]["Purple"].is_array());
}

#[test]
fn load_without_uid_reports_not_logged_in() {
    let tmp = tempfile::tempdir().unwrap();

    companion(tmp.path())
        .args(["load", "--database-url", "http://127.0.0.1:9"])
        .assert()
        .success()
        .stderr(predicate::str::contains("You are not logged in!"));
}

#[tokio::test]
async fn save_writes_cloud_copy() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/users/u1.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("\"ok\""))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    companion(tmp.path())
        .args(["save", "--uid", "u1", "--database-url", &server.uri()])
        .assert()
        .success()
        .stderr(predicate::str::contains("Data saved to the cloud."));
}
