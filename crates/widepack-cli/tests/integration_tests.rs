//! Integration tests for the widepack CLI.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;
use widepack_core::fixtures::PeImage;
use widepack_core::index::count_packages;

/// A distribution tree, an output folder and a deployment root.
struct TestContext {
    root: TempDir,
    out: TempDir,
}

impl TestContext {
    /// `bin/a.dll` (x64, 1.2.3), `bin/a.pdb` and `src/b.cpp`.
    fn new() -> Self {
        let root = TempDir::new().expect("failed to create root");
        std::fs::create_dir_all(root.path().join("bin")).unwrap();
        std::fs::create_dir_all(root.path().join("src")).unwrap();
        PeImage::new(0x8664)
            .product_version("1.2.3")
            .write_to(&root.path().join("bin/a.dll"))
            .unwrap();
        std::fs::write(root.path().join("bin/a.pdb"), b"symbols").unwrap();
        std::fs::write(root.path().join("src/b.cpp"), b"int main() {}").unwrap();

        let out = TempDir::new().expect("failed to create output dir");
        Self { root, out }
    }

    fn index(&self) -> PathBuf {
        self.out.path().join("index.xml")
    }

    fn destination(&self) -> PathBuf {
        self.out.path().join("deploy")
    }

    fn widepack_cmd(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_widepack"));
        cmd.env_remove("RUST_LOG")
            .env_remove("WIDEPACK_STRICT")
            .env_remove("WIDEPACK_CASE_INSENSITIVE_PATHS");
        cmd
    }

    fn run(&self, extra: &[&str]) -> Output {
        self.widepack_cmd()
            .arg(self.root.path())
            .arg(self.index())
            .args(["Foo", "1.2.3", "d", "Foo App"])
            .args(extra)
            .output()
            .expect("failed to run widepack")
    }

    fn index_text(&self) -> String {
        std::fs::read_to_string(self.index()).expect("index not written")
    }
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "widepack failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

fn file_exists(path: &Path) -> bool {
    path.is_file()
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.widepack_cmd().arg("--help").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage:"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    let output = ctx.widepack_cmd().arg("--version").output().unwrap();
    assert!(output.status.success());
}

#[test]
fn test_wrong_argument_count_prints_usage_and_succeeds() {
    let ctx = TestContext::new();
    let output = ctx
        .widepack_cmd()
        .arg(ctx.root.path())
        .arg(ctx.index())
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage:"));
    assert!(!ctx.index().exists());
}

#[test]
fn test_package_record() {
    let ctx = TestContext::new();
    let output = ctx.run(&[]);
    assert_success(&output);

    let index = ctx.index_text();
    assert!(index.contains(
        r#"<Package Type="ewam" Id="foo-app" Name="Foo" Version="1.2.3" Description="d">"#
    ));
    assert!(index.contains(r#"<Component Name="Binaries">"#));
    assert!(index.contains(r#"<File Path="bin/a.dll" Platform="x64" Version="1.2.3"/>"#));
    assert!(index.contains(r#"<Component Name="Symbols">"#));
    assert!(index.contains(r#"<File Path="bin/a.pdb"/>"#));
    assert!(index.contains(r#"<Component Name="Source">"#));
    assert!(index.contains(r#"<File Path="src/b.cpp"/>"#));
    assert_eq!(index.matches("<Component ").count(), 3);

    let binaries = index.find("Binaries").unwrap();
    let symbols = index.find("Symbols").unwrap();
    let source = index.find(r#"Name="Source""#).unwrap();
    assert!(binaries < symbols && symbols < source);
}

#[test]
fn test_second_run_appends() {
    let ctx = TestContext::new();
    assert_success(&ctx.run(&[]));
    assert_success(&ctx.run(&[]));

    let bytes = std::fs::read(ctx.index()).unwrap();
    assert_eq!(count_packages(&bytes).unwrap(), 2);
}

#[test]
fn test_deployment() {
    let ctx = TestContext::new();
    let dest = ctx.destination();
    let output = ctx.run(&[dest.to_str().unwrap()]);
    assert_success(&output);

    let package = dest.join("foo-app");
    assert!(file_exists(&package.join("bin/a.dll")));
    assert!(file_exists(&package.join("bin/a.pdb")));
    assert_eq!(
        std::fs::read(package.join("src/b.cpp")).unwrap(),
        b"int main() {}"
    );
    assert!(!file_exists(&dest.join("index.xml")));
}

#[test]
fn test_deployment_twice_is_idempotent() {
    let ctx = TestContext::new();
    let dest = ctx.destination();
    assert_success(&ctx.run(&[dest.to_str().unwrap()]));
    let first = std::fs::read(dest.join("foo-app/bin/a.dll")).unwrap();

    assert_success(&ctx.run(&[dest.to_str().unwrap()]));
    assert_eq!(std::fs::read(dest.join("foo-app/bin/a.dll")).unwrap(), first);
}

#[test]
fn test_publish_index() {
    let ctx = TestContext::new();
    let dest = ctx.destination();
    assert_success(&ctx.run(&[dest.to_str().unwrap(), "--publish-index"]));

    assert_eq!(
        std::fs::read_to_string(dest.join("index.xml")).unwrap(),
        ctx.index_text()
    );
}

#[test]
fn test_dry_run_writes_nothing() {
    let ctx = TestContext::new();
    let dest = ctx.destination();
    let output = ctx.run(&[dest.to_str().unwrap(), "--dry-run"]);
    assert_success(&output);

    assert!(!ctx.index().exists());
    assert!(!dest.exists());
    assert!(String::from_utf8_lossy(&output.stdout).contains("[dry-run]"));
}

#[test]
fn test_json_report() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--json"]);
    assert_success(&output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.trim_start().starts_with('{'));
    assert!(stdout.contains(r#""package_id": "foo-app""#));
    assert!(stdout.contains(r#""files": 3"#));
}

#[test]
fn test_malformed_binary_is_skipped_unless_strict() {
    let ctx = TestContext::new();
    std::fs::write(ctx.root.path().join("bin/broken.dll"), b"garbage").unwrap();

    let output = ctx.run(&[]);
    assert_success(&output);
    assert!(ctx.index_text().contains(r#"<File Path="bin/broken.dll"/>"#));
    assert!(String::from_utf8_lossy(&output.stdout).contains("skipped"));

    std::fs::remove_file(ctx.index()).unwrap();
    let output = ctx.run(&["--strict"]);
    assert!(!output.status.success());
    assert!(!ctx.index().exists());
}

#[test]
fn test_foreign_index_is_rejected() {
    let ctx = TestContext::new();
    std::fs::write(ctx.index(), "<Catalog/>").unwrap();

    let output = ctx.run(&[]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Root element mismatch"));
    assert_eq!(std::fs::read_to_string(ctx.index()).unwrap(), "<Catalog/>");
}
