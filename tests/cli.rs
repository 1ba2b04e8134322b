use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

const CORPUS: &str = "the cat sat on the mat.\nthe dog sat on the log.\n<|endoftext|>\nthe cat ate the rat.\n";

fn temp_workspace() -> TempDir {
    tempfile::tempdir().expect("create tempdir")
}

fn bytebpe() -> Command {
    Command::cargo_bin("bytebpe").expect("binary exists")
}

fn train_model(workspace: &TempDir) {
    fs::write(workspace.path().join("corpus.txt"), CORPUS).expect("write corpus");
    bytebpe()
        .current_dir(workspace.path())
        .args([
            "--quiet",
            "train",
            "corpus.txt",
            "--vocab-size",
            "300",
            "--no-progress",
            "--metrics",
            "metrics.json",
            "-o",
            "model",
        ])
        .assert()
        .success();
}

#[test]
fn train_encode_decode_round_trip() {
    let workspace = temp_workspace();
    train_model(&workspace);
    assert!(workspace.path().join("model/vocab.json").exists());
    assert!(workspace.path().join("model/merges.txt").exists());

    let metrics: Value = serde_json::from_slice(
        &fs::read(workspace.path().join("metrics.json")).expect("metrics written"),
    )
    .expect("metrics are JSON");
    assert!(metrics["iterations"].as_array().is_some_and(|it| !it.is_empty()));

    let encode_output = bytebpe()
        .current_dir(workspace.path())
        .args(["--quiet", "encode", "-m", "model", "corpus.txt", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let encoded: Value =
        serde_json::from_slice(&encode_output).expect("encoded output is valid JSON");
    let tokens: Vec<String> = encoded["tokens"]
        .as_array()
        .expect("tokens array")
        .iter()
        .map(|v| v.as_u64().expect("u64 token").to_string())
        .collect();
    assert!(tokens.len() < CORPUS.len(), "merges compress the corpus");

    let mut args = vec![
        "--quiet".to_string(),
        "decode".to_string(),
        "-m".to_string(),
        "model".to_string(),
        "--output".to_string(),
        "decoded.txt".to_string(),
    ];
    args.extend(tokens);
    bytebpe()
        .current_dir(workspace.path())
        .args(&args)
        .assert()
        .success();

    let decoded = fs::read_to_string(workspace.path().join("decoded.txt")).expect("decoded");
    assert_eq!(decoded, CORPUS);
}

#[test]
fn encoding_a_file_matches_encoding_its_text() {
    let workspace = temp_workspace();
    train_model(&workspace);

    let run = |args: &[&str]| -> Value {
        let output = bytebpe()
            .current_dir(workspace.path())
            .args(args)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&output).expect("json")
    };
    let from_file = run(&["--quiet", "encode", "-m", "model", "corpus.txt", "--json"]);
    let from_text = run(&["--quiet", "encode", "-m", "model", "--text", CORPUS, "--json"]);
    assert_eq!(from_file["tokens"], from_text["tokens"]);
}

#[test]
fn encode_text_keeps_special_token_whole() {
    let workspace = temp_workspace();
    train_model(&workspace);

    let output = bytebpe()
        .current_dir(workspace.path())
        .args(["--quiet", "encode", "-m", "model", "--text", "<|endoftext|>", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let encoded: Value = serde_json::from_slice(&output).expect("json");
    assert_eq!(encoded["tokens"], serde_json::json!([256]));
}

#[test]
fn info_reports_model_summary() {
    let workspace = temp_workspace();
    train_model(&workspace);

    let output = bytebpe()
        .current_dir(workspace.path())
        .args(["--quiet", "info", "-m", "model", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let summary: Value = serde_json::from_slice(&output).expect("json");
    let vocab_size = summary["vocab_size"].as_u64().expect("vocab size");
    assert!((257..=300).contains(&vocab_size));
    let merges = summary["merges"].as_u64().expect("merge count");
    assert!(merges >= vocab_size - 257);
    assert_eq!(summary["skipped_merge_lines"].as_u64(), Some(0));
    assert_eq!(summary["has_end_of_text"], Value::Bool(true));
}

#[test]
fn train_rejects_vocab_smaller_than_alphabet() {
    let workspace = temp_workspace();
    fs::write(workspace.path().join("corpus.txt"), CORPUS).expect("write corpus");
    bytebpe()
        .current_dir(workspace.path())
        .args(["--quiet", "train", "corpus.txt", "--vocab-size", "100", "--no-progress"])
        .assert()
        .failure();
}

#[test]
fn missing_model_directory_fails() {
    let workspace = temp_workspace();
    bytebpe()
        .current_dir(workspace.path())
        .args(["--quiet", "encode", "-m", "absent", "--text", "hi"])
        .assert()
        .failure();
}
