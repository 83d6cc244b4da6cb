//! E2E Integration tests for dewrap
//!
//! Run with: cargo test --test integration
//! Verbose:  TEST_VERBOSE=1 cargo test --test integration -- --nocapture

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tempfile::TempDir;

/// Test logging macro - prints when TEST_VERBOSE is set
macro_rules! test_log {
    ($level:expr, $($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            eprintln!("[{}] [integration:{}] {}",
                $level,
                line!(),
                format!($($arg)*)
            );
        }
    };
}

fn get_binary_path() -> PathBuf {
    if let Ok(bin_path) = std::env::var("CARGO_BIN_EXE_dewrap") {
        let path = PathBuf::from(bin_path);
        if path.exists() {
            return path;
        }
    }

    // Try release first, then debug
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let release_path = PathBuf::from(manifest_dir).join("target/release/dewrap");
    let debug_path = PathBuf::from(manifest_dir).join("target/debug/dewrap");

    // Check CARGO_TARGET_DIR override
    if let Ok(target_dir) = std::env::var("CARGO_TARGET_DIR") {
        let custom_release = PathBuf::from(&target_dir).join("release/dewrap");
        let custom_debug = PathBuf::from(&target_dir).join("debug/dewrap");
        if custom_release.exists() {
            return custom_release;
        }
        if custom_debug.exists() {
            return custom_debug;
        }
    }

    if release_path.exists() {
        release_path
    } else if debug_path.exists() {
        debug_path
    } else {
        panic!(
            "dewrap binary not found. Run 'cargo build' or 'cargo build --release' first.\n\
             Looked in:\n  - {}\n  - {}",
            release_path.display(),
            debug_path.display()
        );
    }
}

fn run_dewrap_stdin(input: &str, args: &[&str]) -> (String, String, i32) {
    test_log!("RUN", "dewrap with args: {:?}", args);
    test_log!("INPUT", "Input length: {} bytes", input.len());

    let binary = get_binary_path();
    test_log!("BIN", "Using binary: {}", binary.display());

    let mut child = Command::new(&binary)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn dewrap");

    // Write input to stdin
    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input.as_bytes())
            .expect("Failed to write to stdin");
    }

    let output = child.wait_with_output().expect("Failed to wait on dewrap");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    test_log!("OUTPUT", "Exit code: {}", code);
    test_log!("OUTPUT", "Stdout length: {} bytes", stdout.len());
    if !stderr.is_empty() {
        test_log!("STDERR", "{}", stderr);
    }

    (stdout, stderr, code)
}

fn run_dewrap_file(file_path: &str, args: &[&str]) -> (String, String, i32) {
    test_log!("RUN", "dewrap {} with args: {:?}", file_path, args);

    let binary = get_binary_path();
    let mut cmd_args: Vec<&str> = args.to_vec();
    cmd_args.push(file_path);

    let output = Command::new(&binary)
        .args(&cmd_args)
        .output()
        .expect("Failed to run dewrap");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    test_log!("OUTPUT", "Exit code: {}", code);

    (stdout, stderr, code)
}

fn run_dewrap_args(args: &[&str]) -> (String, String, i32) {
    test_log!("RUN", "dewrap with args: {:?}", args);

    let binary = get_binary_path();
    let output = Command::new(&binary)
        .args(args)
        .output()
        .expect("Failed to run dewrap");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

// ============================================================================
// Basic Functionality Tests
// ============================================================================

#[test]
fn test_e2e_basic_rejoin() {
    test_log!("START", "Basic wrapped-line rejoin");

    let input = "This is a line that wraps\nat a fixed width boundary\nand ends with punctuation.";
    let expected =
        "This is a line that wraps at a fixed width boundary and ends with punctuation.";

    let (stdout, _stderr, code) = run_dewrap_stdin(input, &[]);

    assert_eq!(code, 0, "Should exit successfully");
    assert_eq!(stdout.trim(), expected, "Output should be a single joined line");

    test_log!("END", "Test PASSED");
}

#[test]
fn test_e2e_paragraph_break_preserved() {
    test_log!("START", "Blank line preserved between paragraphs");

    let input = "Line one.\n\nLine two.";

    let (stdout, _stderr, code) = run_dewrap_stdin(input, &[]);

    assert_eq!(code, 0, "Should exit successfully");
    assert_eq!(
        stdout, "Line one.\n\nLine two.\n",
        "Paragraph break should survive"
    );

    test_log!("END", "Test PASSED");
}

#[test]
fn test_e2e_numbered_list_preserved() {
    test_log!("START", "Numbered list items never merged");

    let input = "1. First item\nwraps here\n2. Second item";

    let (stdout, _stderr, code) = run_dewrap_stdin(input, &[]);

    assert_eq!(code, 0, "Should exit successfully");
    assert_eq!(
        stdout, "1. First item wraps here\n2. Second item\n",
        "Continuation joins, next item stays separate"
    );

    test_log!("END", "Test PASSED");
}

#[test]
fn test_e2e_gutter_stripped() {
    test_log!("START", "Uniform left gutter removed");

    let input = "    This indented paragraph was pasted\n    from somewhere with a uniform gutter\n    and short wrapped lines throughout.";

    let (stdout, _stderr, code) = run_dewrap_stdin(input, &[]);

    assert_eq!(code, 0, "Should exit successfully");
    assert!(
        stdout.starts_with("This indented"),
        "Gutter should be stripped"
    );
    assert_eq!(stdout.trim().split('\n').count(), 1, "Lines should join");

    test_log!("END", "Test PASSED");
}

#[test]
fn test_e2e_margin_wrapped_paragraph() {
    test_log!("START", "Margin-wrapped paragraph folds to one line");

    let input = "\
The quick brown fox jumps over the lazy dog while the rain
keeps falling on the quiet rooftops of the little mountain
village where nobody expects anything exciting to happen on
a gray afternoon in the middle of an otherwise dull autumn
week but everyone keeps watching the road anyway since the
mail cart is late again and gossip travels fast out here.";

    let (stdout, _stderr, code) = run_dewrap_stdin(input, &[]);

    assert_eq!(code, 0, "Should exit successfully");
    assert_eq!(
        stdout.trim().split('\n').count(),
        1,
        "Paragraph should fold to a single line"
    );
    assert!(stdout.trim().ends_with("travels fast out here."));

    test_log!("END", "Test PASSED");
}

#[test]
fn test_e2e_empty_input() {
    test_log!("START", "Empty input handling");

    let (stdout, _stderr, code) = run_dewrap_stdin("", &[]);

    assert_eq!(code, 0, "Should exit successfully on empty input");
    assert!(
        stdout.is_empty() || stdout.trim().is_empty(),
        "Should produce empty output"
    );

    test_log!("END", "Test PASSED");
}

#[test]
fn test_e2e_whitespace_only() {
    test_log!("START", "Whitespace-only input");

    let input = "   \n      \n   \n";

    let (stdout, _stderr, code) = run_dewrap_stdin(input, &[]);

    assert_eq!(code, 0, "Should handle whitespace-only input");
    assert_eq!(stdout, "\n\n\n", "Whitespace lines collapse to blank lines");

    test_log!("END", "Test PASSED");
}

// ============================================================================
// CLI Options Tests
// ============================================================================

#[test]
fn test_e2e_verbose_mode() {
    test_log!("START", "Verbose mode output");

    let input = "first part\nsecond part.";

    let (stdout, stderr, code) = run_dewrap_stdin(input, &["-v"]);

    assert_eq!(code, 0, "Should exit successfully");
    assert!(
        stdout.contains("first part second part."),
        "Stdout should contain joined text"
    );
    assert!(
        stderr.contains("Processing stdin"),
        "Stderr should show progress"
    );
    assert!(stderr.contains("Summary"), "Stderr should show summary");

    test_log!("END", "Test PASSED");
}

#[test]
fn test_e2e_clipboard_rejects_file_args() {
    test_log!("START", "Clipboard mode with file arguments is invalid");

    let (_stdout, stderr, code) = run_dewrap_args(&["-c", "somefile.txt"]);

    assert_eq!(code, 2, "Should return 2 (INVALID_ARGS)");
    assert!(
        stderr.contains("--clipboard"),
        "Error message should mention --clipboard"
    );

    test_log!("END", "Test PASSED");
}

// ============================================================================
// Diff Mode Tests
// ============================================================================

#[test]
fn test_e2e_diff_mode_with_changes() {
    test_log!("START", "Diff mode with changes");

    let input = "first part\nsecond part.";

    let (stdout, _stderr, code) = run_dewrap_stdin(input, &["--diff"]);

    assert_eq!(code, 0, "Should exit successfully");
    assert!(stdout.contains("--- a/stdin"), "Should contain diff header");
    assert!(stdout.contains("+++ b/stdin"), "Should contain diff header");
    assert!(stdout.contains("-first part"), "Should show removed line");
    assert!(
        stdout.contains("+first part second part."),
        "Should show joined line"
    );

    test_log!("END", "Test PASSED");
}

#[test]
fn test_e2e_diff_mode_no_changes() {
    test_log!("START", "Diff mode with no changes");

    let input = "Line one.\n\nLine two.";

    let (stdout, _stderr, code) = run_dewrap_stdin(input, &["--diff"]);

    assert_eq!(code, 0, "Should exit successfully");
    assert!(
        stdout.is_empty() || stdout.trim().is_empty(),
        "Should produce no diff when no changes"
    );

    test_log!("END", "Test PASSED");
}

// ============================================================================
// Exit Code Tests
// ============================================================================

#[test]
fn test_e2e_exit_code_success() {
    test_log!("START", "Exit code 0 on success");

    let (_stdout, _stderr, code) = run_dewrap_stdin("Line one.\n\nLine two.", &[]);
    assert_eq!(code, 0, "Should return 0 on success");

    test_log!("END", "Test PASSED");
}

#[test]
fn test_e2e_exit_code_dry_run_no_changes() {
    test_log!("START", "Exit code 0 on dry-run with no changes");

    let (_stdout, _stderr, code) = run_dewrap_stdin("Line one.\n\nLine two.", &["-n"]);
    assert_eq!(code, 0, "Should return 0 when no changes needed");

    test_log!("END", "Test PASSED");
}

#[test]
fn test_e2e_exit_code_dry_run_would_change() {
    test_log!("START", "Exit code 3 on dry-run when changes would be made");

    let (_stdout, _stderr, code) = run_dewrap_stdin("first part\nsecond part.", &["-n"]);
    assert_eq!(code, 3, "Should return 3 (WOULD_CHANGE) when changes needed");

    test_log!("END", "Test PASSED");
}

#[test]
fn test_e2e_exit_code_nonexistent_file() {
    test_log!("START", "Non-zero exit code for non-existent file");

    let (_stdout, _stderr, code) = run_dewrap_file("/nonexistent/path/file.txt", &[]);
    assert_ne!(code, 0, "Should return non-zero for non-existent file");

    test_log!("END", "Test PASSED");
}

#[test]
fn test_e2e_exit_code_invalid_utf8() {
    test_log!("START", "Exit code 4 for invalid UTF-8");

    let temp_dir = std::env::temp_dir();
    let temp_file = temp_dir.join("dewrap_test_invalid_utf8.bin");
    fs::write(&temp_file, [0xff, 0xfe]).expect("Failed to write temp file");

    let (_stdout, _stderr, code) = run_dewrap_file(temp_file.to_str().unwrap(), &[]);

    let _ = fs::remove_file(&temp_file);

    assert_eq!(code, 4, "Should return 4 (PARSE_ERROR) for invalid UTF-8");

    test_log!("END", "Test PASSED");
}

#[test]
fn test_e2e_binary_file_detection() {
    test_log!("START", "Binary file detection with null bytes");

    let temp_dir = std::env::temp_dir();
    let temp_file = temp_dir.join("dewrap_test_binary.bin");
    fs::write(&temp_file, b"some\0text").expect("Failed to write temp file");

    let (_stdout, stderr, code) = run_dewrap_file(temp_file.to_str().unwrap(), &[]);

    let _ = fs::remove_file(&temp_file);

    assert_eq!(code, 4, "Should return 4 (PARSE_ERROR) for binary input");
    assert!(
        stderr.contains("binary"),
        "Error message should mention binary"
    );

    test_log!("END", "Test PASSED");
}

// ============================================================================
// JSON Output Tests
// ============================================================================

#[test]
fn test_e2e_json_output() {
    test_log!("START", "JSON output structure");

    let input = "first part\nsecond part.";

    let (stdout, _stderr, code) = run_dewrap_stdin(input, &["--json"]);

    assert_eq!(code, 0, "Should exit successfully");
    assert!(stdout.contains("\"status\": \"success\""), "Should report status");
    assert!(stdout.contains("\"lines_joined\": 1"), "Should count joins");
    assert!(
        stdout.contains("\"margin_detected\": false"),
        "Short input has no margin"
    );
    assert!(
        stdout.contains("first part second part."),
        "Should embed cleaned content"
    );

    test_log!("END", "Test PASSED");
}

#[test]
fn test_e2e_json_dry_run_status() {
    test_log!("START", "JSON dry-run status");

    let input = "first part\nsecond part.";

    let (stdout, _stderr, code) = run_dewrap_stdin(input, &["--json", "-n"]);

    assert_eq!(code, 3, "Dry run with changes should exit 3");
    assert!(stdout.contains("\"status\": \"dry_run\""), "Should report dry_run");

    test_log!("END", "Test PASSED");
}

// ============================================================================
// In-Place and Multiple Files Tests
// ============================================================================

#[test]
fn test_e2e_in_place_edit() {
    test_log!("START", "In-place editing");

    let temp = TempDir::new().unwrap();
    let file = temp.path().join("wrapped.txt");
    fs::write(&file, "first part\nsecond part.\n").unwrap();

    let (_stdout, _stderr, code) = run_dewrap_args(&["-i", file.to_str().unwrap()]);

    assert_eq!(code, 0, "Should exit successfully");
    let contents = fs::read_to_string(&file).unwrap();
    assert_eq!(contents, "first part second part.\n");

    test_log!("END", "Test PASSED");
}

#[test]
fn test_e2e_in_place_with_backup() {
    test_log!("START", "In-place editing with backup");

    let temp = TempDir::new().unwrap();
    let file = temp.path().join("wrapped.txt");
    fs::write(&file, "first part\nsecond part.\n").unwrap();

    let (_stdout, _stderr, code) =
        run_dewrap_args(&["-i", "--backup", file.to_str().unwrap()]);

    assert_eq!(code, 0, "Should exit successfully");
    let backup = temp.path().join("wrapped.txt.bak");
    assert!(backup.exists(), "Backup file should exist");
    assert_eq!(
        fs::read_to_string(&backup).unwrap(),
        "first part\nsecond part.\n",
        "Backup should hold the original"
    );
    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        "first part second part.\n",
        "File should hold the cleaned text"
    );

    test_log!("END", "Test PASSED");
}

#[test]
fn test_e2e_multiple_files_headers() {
    test_log!("START", "Multiple file input with headers");

    let temp = TempDir::new().unwrap();
    let file1 = temp.path().join("one.txt");
    let file2 = temp.path().join("two.txt");
    fs::write(&file1, "alpha part\nbeta part.\n").unwrap();
    fs::write(&file2, "gamma part\ndelta part.\n").unwrap();

    let (stdout, _stderr, code) =
        run_dewrap_args(&[file1.to_str().unwrap(), file2.to_str().unwrap()]);

    assert_eq!(code, 0, "Should process multiple files successfully");
    assert!(stdout.contains("==>"), "Should print file headers");
    assert!(stdout.contains("alpha part beta part."));
    assert!(stdout.contains("gamma part delta part."));

    test_log!("END", "Test PASSED");
}

// ============================================================================
// Recursive Mode Tests
// ============================================================================

#[test]
fn test_e2e_recursive_in_place() {
    test_log!("START", "Recursive in-place processing");

    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let nested = root.join("nested");
    fs::create_dir_all(&nested).unwrap();

    let input = "first part\nsecond part.\n";
    fs::write(root.join("a.md"), input).unwrap();
    fs::write(nested.join("b.md"), input).unwrap();

    let dir_arg = root.to_str().unwrap();
    let (_stdout, _stderr, code) = run_dewrap_args(&["-r", "-i", "--glob", "*.md", dir_arg]);

    assert_eq!(code, 0, "Should exit successfully");

    let a_contents = fs::read_to_string(root.join("a.md")).unwrap();
    let b_contents = fs::read_to_string(nested.join("b.md")).unwrap();
    assert!(a_contents.contains("first part second part."));
    assert!(b_contents.contains("first part second part."));

    test_log!("END", "Test PASSED");
}

#[test]
fn test_e2e_recursive_respects_gitignore() {
    test_log!("START", "Recursive mode respects .gitignore by default");

    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir(root.join(".git")).unwrap();
    fs::write(root.join(".gitignore"), "ignored.md\n").unwrap();

    let input = "first part\nsecond part.\n";
    fs::write(root.join("included.md"), input).unwrap();
    fs::write(root.join("ignored.md"), input).unwrap();

    let dir_arg = root.to_str().unwrap();
    let (_stdout, _stderr, code) = run_dewrap_args(&["-r", "-i", "--glob", "*.md", dir_arg]);

    assert_eq!(code, 0, "Should exit successfully");

    let included = fs::read_to_string(root.join("included.md")).unwrap();
    let ignored = fs::read_to_string(root.join("ignored.md")).unwrap();
    assert!(
        included.contains("first part second part."),
        "Included file should be cleaned"
    );
    assert!(
        ignored.contains("first part\nsecond part."),
        "Ignored file should remain unchanged"
    );

    test_log!("END", "Test PASSED");
}

// ============================================================================
// Config File Tests
// ============================================================================

#[test]
fn test_e2e_config_file_enables_json() {
    test_log!("START", "Config file next to the input enables JSON output");

    let temp = TempDir::new().unwrap();
    let file = temp.path().join("wrapped.txt");
    fs::write(&file, "first part\nsecond part.\n").unwrap();
    fs::write(temp.path().join(".dewraprc"), "json = true\n").unwrap();

    let (stdout, _stderr, code) = run_dewrap_args(&[file.to_str().unwrap()]);

    assert_eq!(code, 0, "Should exit successfully");
    assert!(
        stdout.contains("\"status\": \"success\""),
        "Config file should switch output to JSON"
    );

    test_log!("END", "Test PASSED");
}

#[test]
fn test_e2e_no_config_ignores_config_file() {
    test_log!("START", "--no-config ignores the config file");

    let temp = TempDir::new().unwrap();
    let file = temp.path().join("wrapped.txt");
    fs::write(&file, "first part\nsecond part.\n").unwrap();
    fs::write(temp.path().join(".dewraprc"), "json = true\n").unwrap();

    let (stdout, _stderr, code) = run_dewrap_args(&["--no-config", file.to_str().unwrap()]);

    assert_eq!(code, 0, "Should exit successfully");
    assert!(
        !stdout.contains("\"status\""),
        "Output should be plain text, not JSON"
    );
    assert!(stdout.contains("first part second part."));

    test_log!("END", "Test PASSED");
}
