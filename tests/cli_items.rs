use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn add_item(dir: &Path, extra: &[&str], name: &str, price: i64) {
    let mut cmd = cargo_bin_cmd!("stockroom");
    cmd.current_dir(dir);
    cmd.args(["add-item", name, "--price", &price.to_string()]);
    cmd.args(extra);
    cmd.assert().success();
}

fn find_json(dir: &Path, args: &[&str]) -> Value {
    let mut cmd = cargo_bin_cmd!("stockroom");
    cmd.current_dir(dir);
    cmd.arg("find");
    cmd.args(args);
    cmd.args(["--format", "json"]);

    let assert = cmd.assert().success();
    serde_json::from_slice(&assert.get_output().stdout).expect("valid json output")
}

fn prices(value: &Value) -> Vec<i64> {
    value["items"]
        .as_array()
        .expect("items array")
        .iter()
        .map(|item| item["price"].as_i64().expect("price"))
        .collect()
}

#[test]
fn cli_find_between_returns_inclusive_price_range() {
    let tmp = tempdir().expect("tempdir");
    for (i, price) in [100, 500, 525, 550, 900].iter().enumerate() {
        add_item(tmp.path(), &[], &format!("item-{i}"), *price);
    }

    let value = find_json(
        tmp.path(),
        &["--filter", r#"{"price":{"between":[500,550]}}"#],
    );
    assert_eq!(prices(&value), vec![500, 525, 550]);
    assert_eq!(value["version"], "1.0.0");
    assert_eq!(value["summary"]["total_matches"], 3);
    assert_eq!(value["summary"]["truncated"], false);

    let dsl = find_json(tmp.path(), &["price:500..550"]);
    assert_eq!(prices(&dsl), vec![500, 525, 550]);
}

#[test]
fn cli_find_works_the_same_on_sqlite() {
    let tmp = tempdir().expect("tempdir");
    let sqlite_args = ["--store-path", "shop.sqlite"];
    for (i, price) in [100, 500, 525, 550, 900].iter().enumerate() {
        add_item(tmp.path(), &sqlite_args, &format!("item-{i}"), *price);
    }
    assert!(tmp.path().join("shop.sqlite").is_file());

    let value = find_json(
        tmp.path(),
        &[
            "--store-path",
            "shop.sqlite",
            "--filter",
            r#"{"price":{"between":[500,550]}}"#,
        ],
    );
    assert_eq!(prices(&value), vec![500, 525, 550]);
}

#[test]
fn cli_find_rejects_inverted_bounds() {
    let tmp = tempdir().expect("tempdir");

    let mut cmd = cargo_bin_cmd!("stockroom");
    cmd.current_dir(tmp.path());
    cmd.args(["find", "--filter", r#"{"price":{"between":[550,500]}}"#]);
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error: invalid filter"))
        .stderr(predicate::str::contains("inverted bounds"));

    // Validation happens before the store is opened.
    assert!(!tmp.path().join(".stockroom").exists());
}

#[test]
fn cli_find_on_missing_store_fails_without_creating_it() {
    let tmp = tempdir().expect("tempdir");

    let mut cmd = cargo_bin_cmd!("stockroom");
    cmd.current_dir(tmp.path());
    cmd.args(["find", "price:500..550"]);
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("store not found at"));

    assert!(!tmp.path().join(".stockroom").exists());
}

#[test]
fn cli_find_rejects_unknown_fields_and_operators() {
    let tmp = tempdir().expect("tempdir");

    let mut cmd = cargo_bin_cmd!("stockroom");
    cmd.current_dir(tmp.path());
    cmd.args(["find", "colour:red"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unknown item field `colour`"));

    let mut cmd = cargo_bin_cmd!("stockroom");
    cmd.current_dir(tmp.path());
    cmd.args(["find", "--filter", r#"{"price":{"around":5}}"#]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unknown operator `around`"));
}

#[test]
fn cli_find_limit_sets_truncated_and_text_output_lists_items() {
    let tmp = tempdir().expect("tempdir");
    add_item(tmp.path(), &["--sku", "W-1", "--quantity", "4"], "Widget", 250);
    add_item(tmp.path(), &[], "Gadget", 300);
    add_item(tmp.path(), &[], "Widget Pro", 900);

    let value = find_json(tmp.path(), &["Widget", "--limit", "1"]);
    assert_eq!(value["items"].as_array().expect("items").len(), 1);
    assert_eq!(value["summary"]["truncated"], true);

    let mut cmd = cargo_bin_cmd!("stockroom");
    cmd.current_dir(tmp.path());
    cmd.args(["find", "price:<500"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("#1 Widget price=250 qty=4 sku=W-1"))
        .stdout(predicate::str::contains("#2 Gadget price=300"))
        .stdout(predicate::str::contains("Widget Pro").not());
}

#[test]
fn cli_add_item_rejects_duplicate_sku() {
    let tmp = tempdir().expect("tempdir");
    add_item(tmp.path(), &["--sku", "W-1"], "Widget", 250);

    let mut cmd = cargo_bin_cmd!("stockroom");
    cmd.current_dir(tmp.path());
    cmd.args(["add-item", "Other", "--price", "10", "--sku", "W-1"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("sku `W-1` is already in use"));
}

#[test]
fn cli_import_reports_partial_success() {
    let tmp = tempdir().expect("tempdir");
    let file = tmp.path().join("items.json");
    fs::write(
        &file,
        r#"[
            {"name": "Mug", "price": 400},
            {"name": "", "price": 100},
            {"name": "Kettle", "price": 2500, "quantity": 2},
            {"name": "Broken", "price": -1}
        ]"#,
    )
    .expect("write import file");

    let mut cmd = cargo_bin_cmd!("stockroom");
    cmd.current_dir(tmp.path());
    cmd.args(["import", "items.json", "--format", "json"]);

    let assert = cmd.assert().success();
    let value: Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("valid json output");

    assert_eq!(value["total"], 4);
    assert_eq!(value["succeeded"], 2);
    assert_eq!(value["failed"], 2);
    let failed_indexes: Vec<u64> = value["failures"]
        .as_array()
        .expect("failures")
        .iter()
        .map(|f| f["index"].as_u64().expect("index"))
        .collect();
    assert_eq!(failed_indexes, vec![1, 3]);

    let all = find_json(tmp.path(), &[]);
    assert_eq!(prices(&all), vec![400, 2500]);
}

#[test]
fn cli_info_reports_counts_and_missing_store() {
    let tmp = tempdir().expect("tempdir");

    let mut cmd = cargo_bin_cmd!("stockroom");
    cmd.current_dir(tmp.path());
    cmd.arg("info");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("store not found at"));

    add_item(tmp.path(), &[], "Mug", 400);

    let mut cmd = cargo_bin_cmd!("stockroom");
    cmd.current_dir(tmp.path());
    cmd.args(["info", "--format", "json"]);
    let assert = cmd.assert().success();
    let value: Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("valid json output");
    assert_eq!(value["backend"], "file");
    assert_eq!(value["items"], 1);
    assert_eq!(value["stores"], 0);

    let mut cmd = cargo_bin_cmd!("stockroom");
    cmd.current_dir(tmp.path());
    cmd.arg("info");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("backend      : file"))
        .stdout(predicate::str::contains("items        : 1"));
}
