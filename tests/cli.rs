//! CLI tests: check, apply, list and cache clear against a temp tree

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const PATTERNS: &str = r#"
[meta]
name = "strict-equality"

[[patterns]]
id = "strict-eq"
search = "<a> == <b>"
replace = "<a> === <b>"
cache_key = "strict_eq"

[patterns.named_patterns]
a = { kind = "ident" }
b = { kind = "token" }

[[patterns]]
id = "debug-call"
search = "var_dump ( <arg> )"

[patterns.named_patterns]
arg = { kind = "balanced" }
"#;

fn setup() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(
        dir.path().join("src/index.php"),
        "<?php\nif ($a == 1) {\n    var_dump($a);\n}\n",
    )
    .unwrap();
    fs::write(dir.path().join("src/notes.txt"), "$a == 1\n").unwrap();
    fs::write(dir.path().join("patterns.toml"), PATTERNS).unwrap();
    dir
}

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_token-refactor"))
        .args(args)
        .arg("--cache-dir")
        .arg(dir.join("cache"))
        .current_dir(dir)
        .output()
        .expect("failed to run token-refactor")
}

fn run_plain(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_token-refactor"))
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run token-refactor")
}

#[test]
fn check_reports_and_fails_without_writing() {
    let dir = setup();
    let before = fs::read_to_string(dir.path().join("src/index.php")).unwrap();

    let output = run(dir.path(), &["check", "--patterns", "patterns.toml", "--root", "src"]);

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("strict-eq"), "stdout: {stdout}");
    assert!(stdout.contains("debug-call"), "stdout: {stdout}");
    assert_eq!(
        fs::read_to_string(dir.path().join("src/index.php")).unwrap(),
        before
    );
}

#[test]
fn apply_with_yes_rewrites_matching_files_only() {
    let dir = setup();

    let output = run(
        dir.path(),
        &["apply", "--patterns", "patterns.toml", "--root", "src", "--yes"],
    );

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("src/index.php")).unwrap(),
        "<?php\nif ($a === 1) {\n    var_dump($a);\n}\n"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("src/notes.txt")).unwrap(),
        "$a == 1\n"
    );

    let again = run(
        dir.path(),
        &["check", "--patterns", "patterns.toml", "--root", "src", "--ext", "txt"],
    );
    assert!(!again.status.success());
}

#[test]
fn apply_without_confirmation_changes_nothing() {
    let dir = setup();
    let before = fs::read_to_string(dir.path().join("src/index.php")).unwrap();

    // stdin is empty, so the prompt reads "no"
    let output = run(
        dir.path(),
        &["apply", "--patterns", "patterns.toml", "--root", "src", "--no-cache"],
    );

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Is everything committed in git?"));
    assert!(stdout.contains("Aborted, nothing changed"));
    assert_eq!(
        fs::read_to_string(dir.path().join("src/index.php")).unwrap(),
        before
    );
}

#[test]
fn list_shows_modes_and_cache_keys() {
    let dir = setup();

    let output = run_plain(dir.path(), &["list", "--patterns", "patterns.toml"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("strict-eq"));
    assert!(stdout.contains("strict_eq"));
    assert!(stdout.contains("debug-call"));
    assert!(stdout.contains("detect"));
}

#[test]
fn list_reports_broken_patterns() {
    let dir = setup();
    fs::write(
        dir.path().join("broken.toml"),
        r#"
[[patterns]]
id = "typo"
search = "foo ( <arg> )"
replace = "bar ( <agr> )"

[patterns.named_patterns]
arg = { kind = "balanced" }
"#,
    )
    .unwrap();

    let output = run_plain(dir.path(), &["list", "--patterns", "broken.toml"]);

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("did you mean"), "stdout: {stdout}");
}

#[test]
fn cache_clear_removes_tables() {
    let dir = setup();
    fs::write(dir.path().join("src/clean.php"), "<?php echo 1;\n").unwrap();

    run(dir.path(), &["apply", "--patterns", "patterns.toml", "--root", "src", "--yes"]);
    assert!(dir.path().join("cache/strict_eq.json").exists());

    let output = Command::new(env!("CARGO_BIN_EXE_token-refactor"))
        .args(["cache", "clear", "--cache-dir"])
        .arg(dir.path().join("cache"))
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(!dir.path().join("cache/strict_eq.json").exists());
}
