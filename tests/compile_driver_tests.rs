//! Tests for the file-level build driver: suffix checks, overwrite
//! policies, timestamp comparison, and directory compilation.

use std::fs;
use std::thread::sleep;
use std::time::Duration;

use tempfile::TempDir;

use chr_engine::compile::{chr_compile, chr_compile_module, CompileError, OverwritePolicy};

const GCD: &str = r"
class GCDSolver.
constraints gcd/1.
r1 @ gcd($N) <=> $N == 0 | true.
r2 @ gcd($M) \ gcd($N) <=> $M <= $N | gcd($N - $M).
";

#[test]
fn test_compile_writes_output() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("gcd.chr");
    let output = dir.path().join("gcd.rs");
    fs::write(&input, GCD).unwrap();

    let written = chr_compile(&input, &output, OverwritePolicy::Always, false).unwrap();
    assert!(written);
    let generated = fs::read_to_string(&output).unwrap();
    assert!(generated.contains("pub struct GCDSolver"));
}

#[test]
fn test_timestamp_policy_skips_fresh_output() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("gcd.chr");
    let output = dir.path().join("gcd.rs");
    fs::write(&input, GCD).unwrap();

    assert!(chr_compile(&input, &output, OverwritePolicy::Timestamp, false).unwrap());
    // Output is newer than the input: nothing to do.
    assert!(!chr_compile(&input, &output, OverwritePolicy::Timestamp, false).unwrap());

    // Touch the source; the output is now outdated.
    sleep(Duration::from_millis(100));
    fs::write(&input, GCD).unwrap();
    assert!(chr_compile(&input, &output, OverwritePolicy::Timestamp, false).unwrap());
}

#[test]
fn test_never_policy_keeps_existing_output() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("gcd.chr");
    let output = dir.path().join("gcd.rs");
    fs::write(&input, GCD).unwrap();
    fs::write(&output, "// sentinel").unwrap();

    assert!(!chr_compile(&input, &output, OverwritePolicy::Never, false).unwrap());
    assert_eq!(fs::read_to_string(&output).unwrap(), "// sentinel");

    assert!(chr_compile(&input, &output, OverwritePolicy::Always, false).unwrap());
    assert!(fs::read_to_string(&output).unwrap().contains("GCDSolver"));
}

#[test]
fn test_input_validation() {
    let dir = TempDir::new().unwrap();
    let not_chr = dir.path().join("gcd.txt");
    fs::write(&not_chr, GCD).unwrap();
    let out = dir.path().join("gcd.rs");

    assert!(matches!(
        chr_compile(&not_chr, &out, OverwritePolicy::Always, false),
        Err(CompileError::NotChrFile(_))
    ));
    assert!(matches!(
        chr_compile(&dir.path().join("missing.chr"), &out, OverwritePolicy::Always, false),
        Err(CompileError::MissingInput(_))
    ));
}

#[test]
fn test_parse_error_carries_position() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("bad.chr");
    fs::write(&input, "class P.\nconstraints a/0.\na <=> .\n").unwrap();

    let err = chr_compile(
        &input,
        &dir.path().join("bad.rs"),
        OverwritePolicy::Always,
        false,
    )
    .unwrap_err();
    let CompileError::Parse(parse) = err else {
        panic!("expected a parse error");
    };
    assert_eq!(parse.line, 3);
}

#[test]
fn test_module_compilation() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("gcd.chr"), GCD).unwrap();
    fs::write(
        dir.path().join("prop.chr"),
        "class P. constraints a/0, b/0. t @ a ==> b.",
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let written = chr_compile_module(dir.path(), OverwritePolicy::Timestamp, false).unwrap();
    assert_eq!(written, 2);
    assert!(dir.path().join("gcd.rs").is_file());
    assert!(dir.path().join("prop.rs").is_file());

    // Everything is up to date on the second run.
    let written = chr_compile_module(dir.path(), OverwritePolicy::Timestamp, false).unwrap();
    assert_eq!(written, 0);
}
