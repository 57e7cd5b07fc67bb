// CLI behaviour that needs no database or network

use assert_cmd::Command;
use predicates::prelude::*;

fn cli() -> Command {
    Command::cargo_bin("item-lifecycle").unwrap()
}

#[test]
fn test_stages_prints_new_item_registry_in_order() {
    cli()
        .args(["stages", "NEW_ITEM"])
        .assert()
        .success()
        .stdout(predicate::str::contains("NEW_ITEM"))
        .stdout(predicate::str::is_match(r"(?s)Draft.*Freight Strategy.*KINEXO Pricing.*In Transition.*Completed").unwrap())
        .stdout(predicate::str::contains("DELETING_ITEM").not());
}

#[test]
fn test_stages_accepts_lowercase_lifecycle() {
    cli()
        .args(["stages", "deleting_item"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Impact Analysis"))
        .stdout(predicate::str::contains("(terminal)"));
}

#[test]
fn test_stages_json_lists_every_lifecycle() {
    let output = cli().args(["stages", "--json"]).output().unwrap();
    assert!(output.status.success());

    let registry: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(registry["NEW_ITEM"].as_array().unwrap().len(), 8);
    assert_eq!(registry["TRANSITIONING_ITEM"].as_array().unwrap().len(), 9);
    assert_eq!(registry["DELETING_ITEM"][4]["requiredRole"], "Admin");
    assert!(registry["DELETING_ITEM"][5]["requiredRole"].is_null());
}

#[test]
fn test_stages_rejects_unknown_lifecycle() {
    cli()
        .args(["stages", "RENAMING_ITEM"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("RENAMING_ITEM"));
}

#[test]
fn test_help_lists_subcommands() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("stages"))
        .stdout(predicate::str::contains("seed"));
}
