use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::tempdir;

fn run_json(dir: &Path, args: &[&str]) -> Value {
    let mut cmd = cargo_bin_cmd!("stockroom");
    cmd.current_dir(dir);
    cmd.args(args);
    cmd.args(["--format", "json"]);

    let assert = cmd.assert().success();
    serde_json::from_slice(&assert.get_output().stdout).expect("valid json output")
}

fn seed(dir: &Path) {
    run_json(dir, &["add-store", "Corner Shop", "--location", "Main St"]);
    run_json(dir, &["add-item", "Mug", "--price", "250", "--store-id", "1"]);
    run_json(dir, &["add-item", "Kettle", "--price", "2500", "--store-id", "1"]);
}

#[test]
fn cli_sale_records_lines_and_total() {
    let tmp = tempdir().expect("tempdir");
    seed(tmp.path());

    let receipt = run_json(
        tmp.path(),
        &[
            "sale",
            "--store-id",
            "1",
            "--customer",
            "alice",
            "--line",
            "1:2",
            "--line",
            "2:1@2000",
        ],
    );

    assert_eq!(receipt["sale"]["id"], 1);
    assert_eq!(receipt["sale"]["customer"], "alice");
    assert_eq!(receipt["sale"]["total"], 2 * 250 + 2000);

    let lines = receipt["lines"].as_array().expect("lines array");
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["unit_price"], 250);
    assert_eq!(lines[1]["unit_price"], 2000);

    let found = run_json(
        tmp.path(),
        &["find", "--target", "sales", "customer:alice total:>=2500"],
    );
    let sales = found["sales"].as_array().expect("sales array");
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0]["total"], 2500);
}

#[test]
fn cli_sale_reports_committed_header_when_a_line_fails() {
    let tmp = tempdir().expect("tempdir");
    seed(tmp.path());

    let mut cmd = cargo_bin_cmd!("stockroom");
    cmd.current_dir(tmp.path());
    cmd.args(["sale", "--line", "1:1", "--line", "9:1"]);
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains(
            "post-action failed after committing sale 1",
        ))
        .stderr(predicate::str::contains("item 9 not found"));

    let info = run_json(tmp.path(), &["info"]);
    assert_eq!(info["sales"], 1);
}

#[test]
fn cli_sale_requires_a_line_and_validates_its_syntax() {
    let tmp = tempdir().expect("tempdir");

    let mut cmd = cargo_bin_cmd!("stockroom");
    cmd.current_dir(tmp.path());
    cmd.args(["sale", "--customer", "bob"]);
    cmd.assert().failure();

    let mut cmd = cargo_bin_cmd!("stockroom");
    cmd.current_dir(tmp.path());
    cmd.args(["sale", "--line", "mug:2"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("invalid item id `mug`"));
}

#[test]
fn cli_add_item_rejects_unknown_store() {
    let tmp = tempdir().expect("tempdir");

    let mut cmd = cargo_bin_cmd!("stockroom");
    cmd.current_dir(tmp.path());
    cmd.args(["add-item", "Mug", "--price", "250", "--store-id", "42"]);
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("store 42 not found"));
}
