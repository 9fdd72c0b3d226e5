use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

struct Sandbox {
    _temp: tempfile::TempDir,
    root: PathBuf,
    manifest: PathBuf,
    config_home: PathBuf,
}

impl Sandbox {
    fn new() -> Self {
        let temp = tempfile::tempdir().expect("temp dir");
        let base = fs::canonicalize(temp.path()).expect("canonical temp dir");
        let root = base.join("proj");
        fs::create_dir_all(root.join("src")).expect("project dirs");
        fs::create_dir_all(root.join(".promptpack")).expect("config dir");
        fs::write(
            root.join(".promptpack/config.toml"),
            "[bundle]\nuse_external_tree = false\n",
        )
        .expect("project config");
        fs::write(root.join("src/lib.rs"), "pub fn greet() -> &'static str {\n    \"hello\"\n}\n")
            .expect("lib.rs");
        fs::write(root.join("README.md"), "# Demo\n").expect("readme");
        Self {
            manifest: base.join("manifest"),
            config_home: base.join("config"),
            root,
            _temp: temp,
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("promptpack").expect("binary exists");
        cmd.current_dir(&self.root)
            .env("PROMPTPACK_MANIFEST", &self.manifest)
            .env("XDG_CONFIG_HOME", &self.config_home)
            .env_remove("PROMPTPACK_OUTPUT")
            .env_remove("RUST_LOG");
        cmd
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).expect("readable file")
}

#[test]
fn help_displays_usage() {
    Command::cargo_bin("promptpack")
        .expect("binary exists")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("patch"));
}

#[test]
fn quick_fails_without_manifest_entries() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .arg("--quick")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("No files in"));
}

#[test]
fn add_writes_manifest_and_bundle() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["add", "src/lib.rs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✅ code.txt created!"))
        .stdout(predicate::str::contains("Included 1 files"))
        .stdout(predicate::str::contains("Tokensize: "))
        .stdout(predicate::str::contains("\tClaude"));

    assert_eq!(
        read(&sandbox.manifest).trim_end(),
        sandbox.path("src/lib.rs").display().to_string()
    );
    let bundle = read(&sandbox.path("code.txt"));
    assert!(bundle.contains("## Project Structure\n.\n├── src/\n│   └── lib.rs\n└── README.md\n"));
    assert!(bundle.ends_with("\n### ./src/lib.rs\n\npub fn greet() -> &'static str {\n    \"hello\"\n}\n"));

    sandbox
        .cmd()
        .arg("quick")
        .assert()
        .success()
        .stdout(predicate::str::contains("Included 1 files"));
}

#[test]
fn add_rejects_files_outside_project() {
    let sandbox = Sandbox::new();
    let outside = sandbox.root.parent().expect("parent").join("outside.txt");
    fs::write(&outside, "x").expect("outside file");

    sandbox
        .cmd()
        .arg("add")
        .arg(&outside)
        .assert()
        .failure()
        .stderr(predicate::str::contains("outside of project root"));
    assert!(!sandbox.manifest.exists());
}

#[test]
fn patch_unapply_reapply_through_cli() {
    let sandbox = Sandbox::new();
    let lib = sandbox.path("src/lib.rs");

    sandbox
        .cmd()
        .args(["patch", "src/lib.rs", "say", "goodbye"])
        .write_stdin("    \"hello\"\n=====\n    \"goodbye\"\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Patch #1 applied"));
    assert!(read(&lib).contains("\"goodbye\""));

    sandbox
        .cmd()
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("#1"))
        .stdout(predicate::str::contains("say goodbye"));

    sandbox.cmd().args(["unapply", "1"]).assert().success();
    assert!(read(&lib).contains("\"hello\""));

    sandbox
        .cmd()
        .args(["unapply", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not applied"));

    sandbox.cmd().args(["reapply", "1"]).assert().success();
    assert!(read(&lib).contains("\"goodbye\""));
}

#[test]
fn ambiguous_patch_is_rejected() {
    let sandbox = Sandbox::new();
    fs::write(sandbox.path("dup.txt"), "foo baz foo").expect("dup file");

    sandbox
        .cmd()
        .args(["patch", "dup.txt", "rename", "foo"])
        .write_stdin("foo\n=====\nbar\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("appears 2 times"));
    assert_eq!(read(&sandbox.path("dup.txt")), "foo baz foo");
    assert!(!sandbox.path(".promptpack/patches.json").exists());
}

#[test]
fn stage_accumulates_line_ranges() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["stage", "src/lib.rs", "--lines", "2-3"])
        .assert()
        .success();

    let staged = read(&sandbox.path(".promptpack/staging.txt"));
    assert_eq!(staged, "\n### ./src/lib.rs (lines 2-3)\n\n    \"hello\"\n}\n");
}

#[test]
fn completions_are_generated() {
    Command::cargo_bin("promptpack")
        .expect("binary exists")
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("promptpack"));
}
