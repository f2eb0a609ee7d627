use std::fs;
use std::path::Path;

use anyhow::Result;
use assert_cmd::Command as AssertCommand;
use serde_json::Value;
use tempfile::tempdir;

fn card(home: &Path) -> AssertCommand {
    let mut cmd = AssertCommand::new(env!("CARGO_BIN_EXE_card"));
    cmd.env("CARD_HOME", home).env_remove("RUST_LOG");
    cmd
}

fn run_json(home: &Path, args: &[&str]) -> Result<Value> {
    let output = card(home).args(["-o", "json"]).args(args).output()?;
    assert!(
        output.status.success(),
        "card {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(serde_json::from_slice(&output.stdout)?)
}

#[test]
fn init_seeds_default_card_once() -> Result<()> {
    let home = tempdir()?;
    let first = run_json(home.path(), &["init"])?;
    assert_eq!(first["added"].as_array().map(Vec::len), Some(1));

    let second = run_json(home.path(), &["init"])?;
    assert_eq!(second["added"], Value::Array(vec![]));

    let list = run_json(home.path(), &["list"])?;
    let cards = list["cards"].as_array().expect("cards array");
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0]["user"], "admin");
    assert_eq!(cards[0]["indestructible"], true);
    assert!(home.path().join("config.json").exists());
    Ok(())
}

#[test]
fn create_use_export_and_delete_secret_card() -> Result<()> {
    let home = tempdir()?;
    let created = run_json(
        home.path(),
        &["create", "alice", "--network", "basic-sample-network", "--secret", "pw"],
    )?;
    let reference = created["reference"].as_str().expect("reference").to_string();

    let exported = run_json(home.path(), &["export", &reference])?;
    assert_eq!(exported["card"]["credentials"], serde_json::json!({}));
    assert_eq!(exported["card"]["metadata"]["userName"], "alice");

    let used = run_json(home.path(), &["use", &reference[..8]])?;
    assert_eq!(used["reference"], reference.as_str());
    assert!(home.path().join("profiles").join("web-$default.json").exists());

    let shown = run_json(home.path(), &["show"])?;
    assert_eq!(shown["reference"], reference.as_str());
    assert_eq!(shown["state"]["current"], true);
    assert_eq!(shown["active_identity"]["user_name"], "alice");

    let exported = run_json(home.path(), &["export", &reference])?;
    assert_eq!(exported["card"]["credentials"], serde_json::json!({}));

    run_json(home.path(), &["-y", "delete", &reference])?;
    assert!(!home.path().join("active.json").exists());
    let list = run_json(home.path(), &["list"])?;
    assert_eq!(list["cards"].as_array().map(Vec::len), Some(0));
    assert!(!home.path().join("profiles").join("web-$default.json").exists());
    Ok(())
}

#[test]
fn certificate_card_exports_imported_credentials() -> Result<()> {
    let home = tempdir()?;
    let cert = home.path().join("cert.pem");
    let key = home.path().join("key.pem");
    fs::write(&cert, "CERTIFICATE")?;
    fs::write(&key, "PRIVATE_KEY")?;

    let created = run_json(
        home.path(),
        &[
            "create",
            "peeradmin",
            "--certificate",
            cert.to_str().unwrap(),
            "--private-key",
            key.to_str().unwrap(),
            "--peer-admin",
        ],
    )?;
    let reference = created["reference"].as_str().unwrap().to_string();

    let out = home.path().join("export.json");
    run_json(
        home.path(),
        &["export", &reference, "-f", out.to_str().unwrap()],
    )?;
    let exported: Value = serde_json::from_slice(&fs::read(&out)?)?;
    assert_eq!(exported["credentials"]["certificate"], "CERTIFICATE");
    assert_eq!(exported["credentials"]["privateKey"], "PRIVATE_KEY");
    assert_eq!(exported["metadata"]["roles"][0], "PeerAdmin");
    Ok(())
}

#[test]
fn incomplete_card_is_rejected() -> Result<()> {
    let home = tempdir()?;
    card(home.path())
        .args(["create", "alice", "--secret", "pw"])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn indestructible_card_needs_force() -> Result<()> {
    let home = tempdir()?;
    let init = run_json(home.path(), &["init"])?;
    let reference = init["added"][0].as_str().unwrap().to_string();

    card(home.path())
        .args(["-y", "delete", &reference])
        .assert()
        .failure();
    run_json(home.path(), &["-y", "delete", &reference, "--force"])?;

    card(home.path())
        .args(["use", &reference])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn used_default_card_exports_empty_credentials() -> Result<()> {
    let home = tempdir()?;
    let init = run_json(home.path(), &["init"])?;
    let reference = init["added"][0].as_str().unwrap().to_string();

    run_json(home.path(), &["use", &reference])?;
    let exported = run_json(home.path(), &["export", &reference])?;
    assert_eq!(exported["card"]["credentials"], serde_json::json!({}));
    assert_eq!(exported["card"]["metadata"]["enrollmentSecret"], "adminpw");
    Ok(())
}
