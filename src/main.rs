//! # Hard-Wrap Text Cleaner (dewrap)
//!
//! A CLI tool that rejoins text lines broken by fixed-width wrapping.
//! Uses statistical margin detection to tell forced wraps from intentional
//! line breaks.
//!
//! ## Overview
//!
//! `dewrap` reformats text that was hard-wrapped at a fixed line width
//! (pasted from a PDF, terminal, or email client) by folding artificially
//! broken lines back into flowing paragraphs. Blank lines, bullet and
//! numbered list items, and naturally ending sentences are preserved.
//!
//! ## Key Components
//!
//! - **Gutter Stripping**: Removes a consistent left indent shared by most
//!   non-empty lines (common in quoted email and indented pastes).
//! - **Margin Detection**: Infers, from the length distribution of the
//!   text's own lines, whether a fixed right-margin wrap was applied and at
//!   what width.
//! - **Join Decision**: For each adjacent line pair, merges or stops based
//!   on blank lines, list markers, margin proximity, and terminal
//!   punctuation.
//! - **Line Reassembly**: A single left-to-right scan that folds wrapped
//!   paragraphs into single logical lines.
//!
//! ## Algorithm Flow
//!
//! ```text
//! Input → Split Lines → Gutter Stripping → Margin Detection → Reassembly → Output
//!                                                                 ↓
//!                                                      For each line:
//!                                                        - blank? emit verbatim
//!                                                        - else join following
//!                                                          lines while the
//!                                                          decider says merge
//! ```
//!
//! ## Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Success |
//! | 1 | General error (file not found, permission denied, empty clipboard) |
//! | 2 | Invalid command-line arguments |
//! | 3 | Dry-run mode: changes would be made |
//! | 4 | Parse error (invalid UTF-8 or binary input) |
//! | 5 | Clipboard access error |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use anyhow::{Context, Result};
use arboard::Clipboard;
use clap::ValueEnum;
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use colored::Colorize;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};
use std::fmt;
use std::fs;
use std::io::{self, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

// ─────────────────────────────────────────────────────────────────────────────
// Exit Codes
// ─────────────────────────────────────────────────────────────────────────────

/// Semantic exit codes for scripting and CI integration
mod exit_codes {
    /// Success - completed without errors
    pub const SUCCESS: i32 = 0;
    /// General error (file not found, permission denied, empty clipboard)
    pub const ERROR: i32 = 1;
    /// Invalid command-line arguments
    pub const INVALID_ARGS: i32 = 2;
    /// Dry-run mode: changes would be made
    pub const WOULD_CHANGE: i32 = 3;
    /// Parse error (invalid UTF-8 or binary file detected)
    pub const PARSE_ERROR: i32 = 4;
    /// Clipboard could not be read or written
    pub const CLIPBOARD_ERROR: i32 = 5;
}

#[derive(Debug)]
struct ArgError(String);

impl fmt::Display for ArgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ArgError {}

#[derive(Debug)]
struct ParseError(String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug)]
struct ClipboardError(String);

impl fmt::Display for ClipboardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ClipboardError {}

#[derive(Debug)]
struct RunOutcome {
    dry_run: bool,
    would_change: bool,
}

fn error_chain_has<T: std::error::Error + 'static>(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<T>())
}

fn exit_code_for_error(err: &anyhow::Error) -> i32 {
    if error_chain_has::<ArgError>(err) {
        exit_codes::INVALID_ARGS
    } else if error_chain_has::<ParseError>(err) {
        exit_codes::PARSE_ERROR
    } else if error_chain_has::<ClipboardError>(err) {
        exit_codes::CLIPBOARD_ERROR
    } else {
        exit_codes::ERROR
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CLI Arguments
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ColorMode {
    /// Auto-detect color support
    Auto,
    /// Always emit colors (even when not a TTY)
    Always,
    /// Never emit colors
    Never,
}

/// Hard-Wrap Text Cleaner: rejoins lines broken by fixed-width wrapping
#[derive(Parser, Debug)]
#[command(
    name = "dewrap",
    version,
    about,
    long_about = None,
    after_help = "EXIT CODES:\n  0  Success\n  1  General error (file not found, permission denied, empty clipboard)\n  2  Invalid command-line arguments\n  3  Dry-run mode: changes would be made\n  4  Parse error (invalid UTF-8 or binary input)\n  5  Clipboard access error\n"
)]
struct Args {
    /// Input file(s). Reads from stdin if not provided.
    /// Multiple files can be specified.
    #[arg(value_name = "FILE")]
    inputs: Vec<PathBuf>,

    /// Path to config file (default: search for .dewraprc)
    #[arg(long = "config", value_name = "FILE")]
    config_file: Option<PathBuf>,

    /// Ignore config files
    #[arg(long = "no-config")]
    no_config: bool,

    /// Clean the system clipboard: read, rejoin, preview, and write back
    #[arg(short = 'c', long, conflicts_with_all = ["in_place", "recursive", "watch", "diff", "dry_run", "json"])]
    clipboard: bool,

    /// Process files recursively in directories
    #[arg(short = 'r', long)]
    recursive: bool,

    /// Glob pattern to match files when recursing (comma-separated)
    #[arg(long, default_value = "*.txt,*.md", requires = "recursive")]
    glob: String,

    /// Do not respect .gitignore when recursing
    #[arg(long = "no-gitignore", requires = "recursive")]
    no_gitignore: bool,

    /// Maximum directory depth (0 = unlimited)
    #[arg(long, default_value = "0", requires = "recursive")]
    max_depth: usize,

    /// Edit file(s) in place
    #[arg(short = 'i', long)]
    in_place: bool,

    /// Verbose output showing detection and join progress
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Color output: auto, always, or never
    #[arg(long, value_enum, default_value = "auto")]
    color: ColorMode,

    /// Show unified diff of changes instead of full output
    #[arg(short = 'd', long)]
    diff: bool,

    /// Preview changes without modifying files (exit 0=no changes, 3=would change)
    #[arg(short = 'n', long, conflicts_with = "in_place")]
    dry_run: bool,

    /// Watch file for changes and auto-clean
    #[arg(short = 'w', long, conflicts_with_all = ["in_place", "recursive", "diff", "dry_run", "json"])]
    watch: bool,

    /// Debounce interval in milliseconds (for --watch mode)
    #[arg(long, default_value = "500", requires = "watch")]
    debounce_ms: u64,

    /// Create backup file before in-place editing
    #[arg(long, requires = "in_place")]
    backup: bool,

    /// Extension for backup files (default: .bak)
    #[arg(long, default_value = ".bak", requires = "backup")]
    backup_ext: String,

    /// Output results as JSON for programmatic processing
    #[arg(long, conflicts_with_all = ["verbose", "diff"])]
    json: bool,

    /// Subcommand (config management)
    #[command(subcommand)]
    command: Option<Commands>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Subcommands
// ─────────────────────────────────────────────────────────────────────────────

/// Available subcommands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config management actions
#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Initialize a new .dewraprc config file
    Init {
        /// Create in home directory instead of current
        #[arg(long)]
        global: bool,
    },
    /// Show effective configuration (merged file + CLI)
    Show,
    /// Show path to active config file
    Path,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration and Statistics
// ─────────────────────────────────────────────────────────────────────────────

/// Runtime configuration derived from CLI args
#[derive(Debug)]
struct Config {
    clipboard: bool,
    recursive: bool,
    glob: String,
    gitignore: bool,
    max_depth: usize,
    color: ColorMode,
    verbose: bool,
    diff: bool,
    dry_run: bool,
    watch: bool,
    debounce_ms: u64,
    backup: bool,
    backup_ext: String,
    json: bool,
}

impl From<&Args> for Config {
    fn from(args: &Args) -> Self {
        Self {
            clipboard: args.clipboard,
            recursive: args.recursive,
            glob: args.glob.clone(),
            gitignore: !args.no_gitignore,
            max_depth: args.max_depth,
            color: args.color,
            verbose: args.verbose,
            diff: args.diff,
            dry_run: args.dry_run,
            watch: args.watch,
            debounce_ms: args.debounce_ms,
            backup: args.backup,
            backup_ext: args.backup_ext.clone(),
            json: args.json,
        }
    }
}

struct VerboseStyle {
    use_color: bool,
}

impl VerboseStyle {
    fn new(use_color: bool) -> Self {
        Self { use_color }
    }

    fn header(&self, text: impl fmt::Display) -> String {
        if self.use_color {
            text.to_string().cyan().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn warn(&self, text: impl fmt::Display) -> String {
        if self.use_color {
            text.to_string().yellow().to_string()
        } else {
            text.to_string()
        }
    }

    fn success(&self, text: impl fmt::Display) -> String {
        if self.use_color {
            text.to_string().green().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn dim(&self, text: impl fmt::Display) -> String {
        if self.use_color {
            text.to_string().dimmed().to_string()
        } else {
            text.to_string()
        }
    }

    fn bold(&self, text: impl fmt::Display) -> String {
        if self.use_color {
            text.to_string().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn stat_label(&self, text: impl fmt::Display) -> String {
        if self.use_color {
            text.to_string().blue().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn error(&self, text: impl fmt::Display) -> String {
        if self.use_color {
            text.to_string().red().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn separator(&self) -> String {
        self.dim("───")
    }
}

/// Print a statistics summary to stderr
fn print_stats_summary(
    stats: &Stats,
    files_processed: usize,
    files_changed: usize,
    errors: usize,
    styles: &VerboseStyle,
) {
    eprintln!();
    eprintln!("{} Summary {}", styles.separator(), styles.separator());

    // File statistics (for multiple files)
    if files_processed > 1 {
        eprintln!(
            "  {} {} processed, {} modified, {} unchanged",
            styles.stat_label("Files:"),
            files_processed,
            files_changed,
            files_processed.saturating_sub(files_changed)
        );
    }

    // Line statistics
    eprintln!(
        "  {} {} in, {} out",
        styles.stat_label("Lines:"),
        stats.total_lines,
        stats.lines_emitted
    );

    eprintln!(
        "  {} {} line break(s) rejoined",
        styles.stat_label("Joins:"),
        stats.joins_applied
    );

    // Detection results are per-file diagnostics; only meaningful for one file
    if files_processed == 1 {
        match stats.margin {
            Some(margin) => eprintln!(
                "  {} {} chars (±{})",
                styles.stat_label("Margin:"),
                margin.length,
                margin.tolerance
            ),
            None => eprintln!("  {} not detected", styles.stat_label("Margin:")),
        }
        if stats.gutter_columns > 0 {
            eprintln!(
                "  {} {} column(s) stripped",
                styles.stat_label("Gutter:"),
                stats.gutter_columns
            );
        }
    }

    // Performance statistics
    let elapsed_ms = stats.elapsed.as_secs_f64() * 1000.0;
    eprintln!(
        "  {} {:.2}ms ({:.0} lines/sec)",
        styles.stat_label("Time:"),
        elapsed_ms,
        stats.lines_per_second()
    );

    // Error count if any
    if errors > 0 {
        eprintln!("  {} {}", styles.error("Errors:"), errors);
    }

    eprintln!();
}

fn build_styles(color: ColorMode) -> VerboseStyle {
    match color {
        ColorMode::Never => {
            colored::control::set_override(false);
            VerboseStyle::new(false)
        }
        ColorMode::Always => {
            colored::control::set_override(true);
            VerboseStyle::new(true)
        }
        ColorMode::Auto => {
            if std::env::var("NO_COLOR").is_ok() {
                colored::control::set_override(false);
                return VerboseStyle::new(false);
            }

            if std::env::var("FORCE_COLOR").is_ok() {
                colored::control::set_override(true);
                return VerboseStyle::new(true);
            }

            VerboseStyle::new(io::stderr().is_terminal())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config File Support
// ─────────────────────────────────────────────────────────────────────────────

/// Config file names searched in order
const CONFIG_FILENAMES: &[&str] = &[".dewraprc", ".dewraprc.toml", "dewraprc.toml"];

/// Configuration loaded from a .dewraprc file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    /// Show verbose output
    verbose: Option<bool>,
    /// Color mode: auto, always, never
    color: Option<ColorMode>,
    /// Output as JSON
    json: Option<bool>,
    /// Create backup before in-place edit
    backup: Option<bool>,
    /// Backup file extension
    backup_ext: Option<String>,
    /// Enable recursive mode
    recursive: Option<bool>,
    /// Glob patterns for recursive mode
    glob: Option<String>,
    /// Respect .gitignore
    gitignore: Option<bool>,
    /// Maximum directory depth
    max_depth: Option<usize>,
}

/// Search for a config file starting from the given directory
fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();

    // Search up the directory tree
    loop {
        for filename in CONFIG_FILENAMES {
            let config_path = current.join(filename);
            if config_path.exists() {
                return Some(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    // Check home directory
    if let Some(home) = dirs::home_dir() {
        for filename in CONFIG_FILENAMES {
            let config_path = home.join(filename);
            if config_path.exists() {
                return Some(config_path);
            }
        }
    }

    None
}

/// Load and parse a config file
fn load_config_file(path: &Path) -> Result<FileConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Create Config by merging file config with CLI args (CLI wins)
fn create_config(args: &Args) -> Result<Config> {
    let mut config = Config::from(args);

    // Skip config file loading if --no-config is set
    if args.no_config {
        return Ok(config);
    }

    // Find and load config file
    let config_path = if let Some(ref path) = args.config_file {
        // Explicit config file specified
        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }
        Some(path.clone())
    } else {
        // Search for config file
        let start_dir = args
            .inputs
            .first()
            .and_then(|p| {
                if p.is_dir() {
                    Some(p.clone())
                } else {
                    p.parent().map(|p| p.to_path_buf())
                }
            })
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

        find_config_file(&start_dir)
    };

    if let Some(path) = config_path {
        let file_config = load_config_file(&path)?;

        // Merge file config with CLI config (CLI wins)
        // Only apply file config values when CLI used defaults
        if !args.verbose {
            if let Some(v) = file_config.verbose {
                config.verbose = v;
            }
        }

        if args.color == ColorMode::Auto {
            if let Some(c) = file_config.color {
                config.color = c;
            }
        }

        if !args.json {
            if let Some(j) = file_config.json {
                config.json = j;
            }
        }

        if !args.backup {
            if let Some(b) = file_config.backup {
                config.backup = b;
            }
        }

        // backup_ext: use file value if CLI used default
        if args.backup_ext == ".bak" {
            if let Some(ext) = file_config.backup_ext {
                config.backup_ext = ext;
            }
        }

        // Recursive options
        if !args.recursive {
            if let Some(r) = file_config.recursive {
                config.recursive = r;
            }
        }

        if args.glob == "*.txt,*.md" {
            if let Some(g) = file_config.glob {
                config.glob = g;
            }
        }

        if !args.no_gitignore {
            if let Some(gi) = file_config.gitignore {
                config.gitignore = gi;
            }
        }

        if args.max_depth == 0 {
            if let Some(d) = file_config.max_depth {
                config.max_depth = d;
            }
        }
    }

    Ok(config)
}

/// Default config file content
const DEFAULT_CONFIG: &str = r#"# .dewraprc - dewrap configuration file

# Output options
# verbose = false
# color = "auto"
# json = false

# Backup options (for --in-place)
# backup = false
# backup_ext = ".bak"

# Recursive mode defaults
# recursive = false
# glob = "*.txt,*.md"
# gitignore = true
# max_depth = 0
"#;

/// Handle the config subcommand
fn run_config_command(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init { global } => {
            let path = if *global {
                dirs::home_dir()
                    .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?
                    .join(".dewraprc")
            } else {
                PathBuf::from(".dewraprc")
            };

            if path.exists() {
                return Err(anyhow::anyhow!(
                    "Config file already exists: {}",
                    path.display()
                ));
            }

            fs::write(&path, DEFAULT_CONFIG)
                .with_context(|| format!("Failed to create config file: {}", path.display()))?;

            eprintln!("Created config file: {}", path.display());
            Ok(())
        }

        ConfigAction::Show => {
            // Parse minimal args to get effective config
            let args = Args::parse_from(["dewrap"]);
            let config = create_config(&args)?;

            eprintln!("Effective configuration:");
            eprintln!("  verbose: {}", config.verbose);
            eprintln!("  color: {:?}", config.color);
            eprintln!("  json: {}", config.json);
            eprintln!("  backup: {}", config.backup);
            eprintln!("  backup_ext: {}", config.backup_ext);
            eprintln!("  recursive: {}", config.recursive);
            eprintln!("  glob: {}", config.glob);
            eprintln!("  gitignore: {}", config.gitignore);
            eprintln!("  max_depth: {}", config.max_depth);

            // Show config file path if found
            let start_dir = std::env::current_dir().unwrap_or_default();
            if let Some(path) = find_config_file(&start_dir) {
                eprintln!();
                eprintln!("Config file: {}", path.display());
            }

            Ok(())
        }

        ConfigAction::Path => {
            let start_dir = std::env::current_dir().unwrap_or_default();
            if let Some(path) = find_config_file(&start_dir) {
                println!("{}", path.display());
                Ok(())
            } else {
                eprintln!("No config file found");
                std::process::exit(1);
            }
        }
    }
}

fn validate_args(args: &Args) -> Result<()> {
    if args.clipboard && !args.inputs.is_empty() {
        return Err(ArgError(
            "--clipboard reads from the system clipboard; file arguments are not allowed"
                .to_string(),
        )
        .into());
    }

    if args.in_place && args.inputs.is_empty() {
        return Err(ArgError("--in-place requires at least one input file".to_string()).into());
    }

    if args.recursive && args.inputs.is_empty() {
        return Err(ArgError("--recursive requires at least one input path".to_string()).into());
    }

    Ok(())
}

/// Statistics collected during cleaning
#[derive(Default, Clone)]
struct Stats {
    /// Total number of input lines
    total_lines: usize,
    /// Number of lines after rejoining
    lines_emitted: usize,
    /// Number of line breaks folded away
    joins_applied: usize,
    /// Width of the stripped left gutter (0 = none detected)
    gutter_columns: usize,
    /// Detected wrap margin, if any
    margin: Option<Margin>,
    /// Processing elapsed time
    elapsed: Duration,
}

impl Stats {
    /// Merge another Stats into this one (for aggregating across files).
    /// Detection results (gutter, margin) are per-file diagnostics and are
    /// not aggregated.
    fn merge(&mut self, other: &Stats) {
        self.total_lines += other.total_lines;
        self.lines_emitted += other.lines_emitted;
        self.joins_applied += other.joins_applied;
        self.elapsed += other.elapsed;
    }

    /// Calculate lines processed per second
    fn lines_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_lines as f64 / secs
        } else {
            self.total_lines as f64
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON Output Structures
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct JsonOutput {
    version: &'static str,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    input: InputStats,
    processing: ProcessingStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<OutputStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Serialize)]
struct InputStats {
    lines: usize,
    bytes: usize,
}

#[derive(Serialize)]
struct ProcessingStats {
    gutter_columns: usize,
    margin_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    margin_length: Option<usize>,
    lines_joined: usize,
}

#[derive(Serialize)]
struct OutputStats {
    lines: usize,
    bytes: usize,
    changed: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Gutter Stripping
// ─────────────────────────────────────────────────────────────────────────────

/// Percentile of the indent distribution used to pick the gutter candidate.
/// Sitting at the 20th percentile tolerates a minority of zero-indent
/// outliers (e.g. a stray status line) without defeating detection.
const GUTTER_PERCENTILE: f64 = 0.20;

/// Minimum fraction of non-empty lines that must carry at least the candidate
/// indent for the gutter to be accepted.
const GUTTER_COVERAGE: f64 = 0.70;

/// Count leading whitespace characters on a line
fn leading_whitespace(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

/// Index of the given percentile in a sorted sample of `len` elements
fn percentile_index(len: usize, percentile: f64) -> usize {
    ((len as f64) * percentile).floor() as usize
}

/// Detect a uniform left gutter shared by most non-empty lines.
///
/// Returns the gutter width in characters, or 0 when no robust gutter
/// exists. Lines that are empty after trimming are ignored; the candidate
/// is the 20th-percentile indent and must be carried by at least 70% of
/// the non-empty lines.
fn detect_gutter(lines: &[String]) -> usize {
    let indents: Vec<usize> = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| leading_whitespace(line))
        .collect();

    if indents.is_empty() {
        return 0;
    }

    let mut sorted = indents.clone();
    sorted.sort_unstable();

    let candidate = sorted[percentile_index(sorted.len(), GUTTER_PERCENTILE)];
    if candidate == 0 {
        return 0;
    }

    let covered = indents.iter().filter(|&&indent| indent >= candidate).count();
    if (covered as f64) < (indents.len() as f64) * GUTTER_COVERAGE {
        return 0;
    }

    candidate
}

/// Remove the detected gutter from every qualifying line.
///
/// Lines that are blank or indented less than the gutter pass through
/// unmodified, so short or flush-left lines are never corrupted. Returns
/// the rewritten lines and the stripped width (0 = nothing stripped).
fn strip_gutter(lines: Vec<String>) -> (Vec<String>, usize) {
    let gutter = detect_gutter(&lines);
    if gutter == 0 {
        return (lines, 0);
    }

    let stripped = lines
        .into_iter()
        .map(|line| {
            if line.trim().is_empty() || leading_whitespace(&line) < gutter {
                return line;
            }
            let offset = line
                .char_indices()
                .nth(gutter)
                .map(|(idx, _)| idx)
                .unwrap_or(line.len());
            line[offset..].to_string()
        })
        .collect();

    (stripped, gutter)
}

// ─────────────────────────────────────────────────────────────────────────────
// Margin Detection
// ─────────────────────────────────────────────────────────────────────────────

/// Lines shorter than this (right-trimmed) carry no information about a
/// wrap margin and are excluded from the sample.
const MIN_MEASURABLE_LEN: usize = 30;

/// Minimum number of measurable lines required before attempting detection
const MIN_MARGIN_SAMPLES: usize = 5;

/// Accepted distance between a line's length and the margin length
const MARGIN_TOLERANCE: usize = 10;

/// Lower bound of the length-distribution window inspected for the margin.
/// A forced-wrap margin clusters in the upper body of the distribution,
/// above the bulk of naturally short lines.
const MARGIN_WINDOW_LO: f64 = 0.75;

/// Upper bound of the window; the extreme tail is excluded because it may
/// contain intentionally long lines.
const MARGIN_WINDOW_HI: f64 = 0.90;

/// Minimum fraction of measurable lines that must fall within tolerance of
/// the candidate for the margin to be accepted.
const MARGIN_COVERAGE: f64 = 0.40;

/// An inferred fixed-width wrap margin.
///
/// Only produced when the length distribution clusters tightly enough;
/// an undetected margin is represented by `None` and never consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Margin {
    /// Estimated wrap width in characters
    length: usize,
    /// Accepted distance from `length` for a line to count as wrapped
    tolerance: usize,
}

impl Margin {
    /// Whether a right-trimmed line length sits within the margin band
    fn is_near(&self, len: usize) -> bool {
        len.abs_diff(self.length) <= self.tolerance
    }
}

/// Infer a fixed-width wrap margin from the line length distribution.
///
/// Collects right-trimmed lengths of all lines at least
/// [`MIN_MEASURABLE_LEN`] characters long. With at least
/// [`MIN_MARGIN_SAMPLES`] of them, the candidate is the middle element of
/// the 75th–90th percentile window of the sorted lengths; it is accepted
/// when at least 40% of the measurable lines fall within
/// [`MARGIN_TOLERANCE`] of it.
fn detect_margin(lines: &[String]) -> Option<Margin> {
    let lengths: Vec<usize> = lines
        .iter()
        .map(|line| line.trim_end().chars().count())
        .filter(|&len| len >= MIN_MEASURABLE_LEN)
        .collect();

    if lengths.len() < MIN_MARGIN_SAMPLES {
        return None;
    }

    let mut sorted = lengths.clone();
    sorted.sort_unstable();

    let lo = percentile_index(sorted.len(), MARGIN_WINDOW_LO);
    let hi = percentile_index(sorted.len(), MARGIN_WINDOW_HI);
    let window = &sorted[lo..=hi.min(sorted.len() - 1)];
    if window.is_empty() {
        return None;
    }

    let margin = Margin {
        length: window[window.len() / 2],
        tolerance: MARGIN_TOLERANCE,
    };

    let near = lengths.iter().filter(|&&len| margin.is_near(len)).count();
    if (near as f64) < (lengths.len() as f64) * MARGIN_COVERAGE {
        return None;
    }

    Some(margin)
}

// ─────────────────────────────────────────────────────────────────────────────
// Join Decision
// ─────────────────────────────────────────────────────────────────────────────

/// Check if a line opens a bullet or numbered list item.
///
/// A line whose first non-whitespace character is an ASCII digit, hyphen,
/// asterisk, or bullet glyph is treated as a list item. A bare digit is
/// enough: "2023 was a good year" at line start counts, matching the
/// deliberately permissive marker set.
fn is_list_item(line: &str) -> bool {
    line.trim_start()
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '*' | '•'))
}

/// Check if a line ends with a strong sentence terminator
fn ends_sentence(line: &str) -> bool {
    line.chars()
        .next_back()
        .is_some_and(|c| matches!(c, '.' | '!' | '?'))
}

/// Check if a line ends with any punctuation that suggests an intentional
/// break (sentence terminators plus `:` and `-`)
fn ends_clause(line: &str) -> bool {
    line.chars()
        .next_back()
        .is_some_and(|c| matches!(c, '.' | '!' | '?' | ':' | '-'))
}

/// Decide whether `next` should be folded into the accumulated `current`
/// line.
///
/// Rules, in order:
/// 1. An empty `next` always stops the fold (paragraph break).
/// 2. A `next` opening a list item always stops the fold.
/// 3. With a detected margin, a `current` whose length sits in the margin
///    band is presumed force-wrapped and joins unless it ends a sentence;
///    away from the band, any break punctuation stops the fold.
/// 4. Without a margin, break punctuation alone decides.
///
/// Near-margin length is the strongest signal of an artificial break;
/// terminal punctuation still overrides it because a genuine sentence end
/// can coincide with the wrap width.
fn should_join(current: &str, next: &str, margin: Option<&Margin>) -> bool {
    if next.trim().is_empty() {
        return false;
    }

    if is_list_item(next) {
        return false;
    }

    let trimmed = current.trim_end();
    match margin {
        Some(margin) if margin.is_near(trimmed.chars().count()) => !ends_sentence(trimmed),
        _ => !ends_clause(trimmed),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Line Reassembly
// ─────────────────────────────────────────────────────────────────────────────

/// Fold wrapped lines back into logical lines.
///
/// A single left-to-right scan: blank lines are emitted verbatim; any other
/// line accumulates following lines (single interposed space, segments
/// right-trimmed) while the join decider allows. Lines are only ever
/// merged, never split. Returns the emitted lines and the number of joins
/// performed.
fn reflow_lines(lines: &[String], margin: Option<&Margin>) -> (Vec<String>, usize) {
    let mut emitted = Vec::with_capacity(lines.len());
    let mut joins = 0;
    let mut i = 0;

    while i < lines.len() {
        let mut current = lines[i].trim_end().to_string();

        // Preserve blank lines as paragraph separators
        if current.is_empty() {
            emitted.push(String::new());
            i += 1;
            continue;
        }

        while i + 1 < lines.len() && should_join(&current, &lines[i + 1], margin) {
            current.push(' ');
            current.push_str(lines[i + 1].trim());
            joins += 1;
            i += 1;
        }

        emitted.push(current);
        i += 1;
    }

    (emitted, joins)
}

// ─────────────────────────────────────────────────────────────────────────────
// Cleaning Pipeline
// ─────────────────────────────────────────────────────────────────────────────

/// What one cleaning pass detected and did
#[derive(Debug)]
struct CleanReport {
    /// Width of the stripped left gutter (0 = none)
    gutter_columns: usize,
    /// Detected wrap margin, if any
    margin: Option<Margin>,
    /// Number of line breaks folded away
    joins_applied: usize,
}

/// Run the full cleaning pipeline over a line sequence.
///
/// Gutter stripping and margin detection each run once over the whole
/// text before the reassembly scan; the pipeline is a pure function of its
/// input and performs no I/O.
fn clean_lines(lines: Vec<String>) -> (Vec<String>, CleanReport) {
    let (lines, gutter_columns) = strip_gutter(lines);
    let margin = detect_margin(&lines);
    let (cleaned, joins_applied) = reflow_lines(&lines, margin.as_ref());

    (
        cleaned,
        CleanReport {
            gutter_columns,
            margin,
            joins_applied,
        },
    )
}

/// Clean a text: rejoin hard-wrapped lines into flowing paragraphs.
///
/// Total over all inputs; the empty string yields the empty string.
fn clean(text: &str) -> String {
    let lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    let (cleaned, _) = clean_lines(lines);
    cleaned.join("\n")
}

// ─────────────────────────────────────────────────────────────────────────────
// Recursive File Discovery
// ─────────────────────────────────────────────────────────────────────────────

fn build_globset(patterns: &str) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    let mut added = 0;

    for raw in patterns.split(',') {
        let pattern = raw.trim();
        if pattern.is_empty() {
            continue;
        }

        let glob = Glob::new(pattern)
            .map_err(|err| ArgError(format!("Invalid glob pattern '{}': {}", pattern, err)))?;
        builder.add(glob);
        added += 1;
    }

    if added == 0 {
        return Err(ArgError("--glob must include at least one pattern".to_string()).into());
    }

    builder
        .build()
        .map_err(|err| ArgError(format!("Invalid glob set: {}", err)).into())
}

fn discover_recursive_files(
    paths: &[PathBuf],
    config: &Config,
    styles: &VerboseStyle,
) -> Result<Vec<PathBuf>> {
    let globs = build_globset(&config.glob)?;
    let mut files = std::collections::BTreeSet::new();

    for path in paths {
        if path.is_file() {
            files.insert(path.clone());
            continue;
        }

        if !path.is_dir() {
            if config.verbose {
                eprintln!(
                    "{}",
                    styles.dim(format!("Warning: path does not exist: {}", path.display()))
                );
            }
            continue;
        }

        let mut walker = WalkBuilder::new(path);
        walker.git_ignore(config.gitignore);
        walker.git_exclude(config.gitignore);
        walker.git_global(config.gitignore);
        walker.ignore(config.gitignore);
        walker.hidden(false);

        if config.max_depth > 0 {
            walker.max_depth(Some(config.max_depth));
        }

        for entry in walker.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    if config.verbose {
                        eprintln!("{}", styles.dim(format!("Warning: {}", err)));
                    }
                    continue;
                }
            };

            let entry_path = entry.path();
            if entry_path.is_file() {
                if let Some(name) = entry_path.file_name() {
                    if globs.is_match(name) {
                        files.insert(entry_path.to_path_buf());
                    }
                }
            }
        }
    }

    Ok(files.into_iter().collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// Backup
// ─────────────────────────────────────────────────────────────────────────────

/// Creates a backup of the file by appending the extension to the filename.
/// For example: "file.txt" with extension ".bak" becomes "file.txt.bak"
fn create_backup(path: &Path, ext: &str) -> Result<PathBuf> {
    let mut backup_name = path.as_os_str().to_owned();
    backup_name.push(ext);
    let backup_path = PathBuf::from(backup_name);

    fs::copy(path, &backup_path)
        .with_context(|| format!("Failed to create backup at {}", backup_path.display()))?;

    Ok(backup_path)
}

/// Maximum file size (100 MB) - reject larger files to prevent memory issues
const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Read content from a file path and return lines
fn read_file(path: &Path) -> Result<Vec<String>> {
    // Check file size before reading
    let metadata = fs::metadata(path)
        .with_context(|| format!("Failed to read file metadata: {}", path.display()))?;

    if metadata.len() > MAX_FILE_SIZE {
        return Err(ParseError(format!(
            "File too large: {} ({} MB). Maximum supported size is {} MB.",
            path.display(),
            metadata.len() / (1024 * 1024),
            MAX_FILE_SIZE / (1024 * 1024)
        ))
        .into());
    }

    let source_label = path.display().to_string();
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read input file: {}", path.display()))?;

    parse_bytes_to_lines(bytes, &source_label)
}

/// Read content from stdin and return lines
fn read_stdin_content() -> Result<Vec<String>> {
    let mut buf = Vec::new();
    io::stdin()
        .read_to_end(&mut buf)
        .context("Failed to read stdin")?;
    parse_bytes_to_lines(buf, "stdin")
}

/// Convert raw bytes to lines, checking for binary content and valid UTF-8
fn parse_bytes_to_lines(bytes: Vec<u8>, source_label: &str) -> Result<Vec<String>> {
    if bytes.contains(&0) {
        return Err(ParseError(format!("Input appears to be binary: {}", source_label)).into());
    }

    let content = String::from_utf8(bytes).map_err(|err| {
        let utf8_err = err.utf8_error();
        let valid_up_to = utf8_err.valid_up_to();
        let byte = err.as_bytes().get(valid_up_to).copied();
        let detail = match byte {
            Some(b) => format!(
                "Invalid UTF-8 at byte position {} (byte value: 0x{:02X}) in {}",
                valid_up_to, b, source_label
            ),
            None => format!("Invalid UTF-8 in {}", source_label),
        };
        ParseError(detail)
    })?;

    Ok(content.lines().map(String::from).collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// Clipboard Mode
// ─────────────────────────────────────────────────────────────────────────────

/// Read the system clipboard, clean it, preview the result on stdout, and
/// write it back.
///
/// An empty or whitespace-only clipboard is a user-facing warning and the
/// pipeline is not invoked; a clipboard that cannot be read or written is a
/// distinct platform error.
fn run_clipboard(styles: &VerboseStyle) -> Result<RunOutcome> {
    let mut clipboard = Clipboard::new().map_err(|err| {
        ClipboardError(format!("Could not access the system clipboard: {}", err))
    })?;

    let content = clipboard
        .get_text()
        .map_err(|err| ClipboardError(format!("Could not read from the clipboard: {}", err)))?;

    if content.trim().is_empty() {
        anyhow::bail!("Clipboard is empty; copy some text first");
    }

    let cleaned = clean(&content);
    let would_change = cleaned != content;

    // Preview the cleaned text on stdout
    {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", cleaned)?;
    }

    if would_change {
        clipboard.set_text(cleaned).map_err(|err| {
            ClipboardError(format!("Could not write back to the clipboard: {}", err))
        })?;
        eprintln!(
            "{}",
            styles.success("✓ Cleaned and copied back to clipboard")
        );
    } else {
        eprintln!("{}", styles.dim("No changes needed; clipboard left as-is"));
    }

    Ok(RunOutcome {
        dry_run: false,
        would_change,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry Point
// ─────────────────────────────────────────────────────────────────────────────

/// Result of processing a single file or stdin
struct FileResult {
    filename: String,
    original: Vec<String>,
    cleaned: Vec<String>,
    stats: Stats,
    would_change: bool,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit_codes::SUCCESS,
                _ => exit_codes::INVALID_ARGS,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    // Handle subcommands first
    if let Some(command) = &args.command {
        let exit_code = match run_command(command) {
            Ok(()) => exit_codes::SUCCESS,
            Err(err) => {
                eprintln!("Error: {:#}", err);
                exit_code_for_error(&err)
            }
        };
        std::process::exit(exit_code);
    }

    let exit_code = match run(args) {
        Ok(outcome) => {
            if outcome.dry_run && outcome.would_change {
                exit_codes::WOULD_CHANGE
            } else {
                exit_codes::SUCCESS
            }
        }
        Err(err) => {
            eprintln!("Error: {:#}", err);
            exit_code_for_error(&err)
        }
    };

    std::process::exit(exit_code);
}

/// Run a subcommand
fn run_command(command: &Commands) -> Result<()> {
    match command {
        Commands::Config { action } => run_config_command(action),
    }
}

/// Process a single input (file or stdin) and return the result
fn process_input(
    lines: Vec<String>,
    filename: String,
    config: &Config,
    styles: &VerboseStyle,
) -> FileResult {
    if config.verbose {
        eprintln!(
            "{}",
            styles.bold(format!("Processing {} ({} lines)...", filename, lines.len()))
        );
    }

    let start_time = Instant::now();
    let original = lines.clone();
    let (cleaned, report) = clean_lines(lines);

    let stats = Stats {
        total_lines: original.len(),
        lines_emitted: cleaned.len(),
        joins_applied: report.joins_applied,
        gutter_columns: report.gutter_columns,
        margin: report.margin,
        elapsed: start_time.elapsed(),
    };

    if config.verbose {
        if stats.gutter_columns > 0 {
            eprintln!(
                "{}",
                styles.dim(format!(
                    "  Stripped a {}-column left gutter",
                    stats.gutter_columns
                ))
            );
        }
        match stats.margin {
            Some(margin) => eprintln!(
                "{}",
                styles.header(format!(
                    "  Wrap margin detected at {} chars (±{})",
                    margin.length, margin.tolerance
                ))
            ),
            None => eprintln!(
                "{}",
                styles.dim("  No wrap margin detected; joining on punctuation only")
            ),
        }
        eprintln!(
            "{}",
            styles.dim(format!("  Rejoined {} line break(s)", stats.joins_applied))
        );
    }

    let original_text = original.join("\n");
    let cleaned_text = cleaned.join("\n");
    let would_change = original_text != cleaned_text;

    FileResult {
        filename,
        original,
        cleaned,
        stats,
        would_change,
    }
}

/// Output a unified diff for a file result
fn output_diff(result: &FileResult, proposed: bool) -> Result<()> {
    if !result.would_change {
        return Ok(());
    }

    let original_text = result.original.join("\n");
    let cleaned_text = result.cleaned.join("\n");
    let diff = TextDiff::from_lines(&original_text, &cleaned_text);
    let mut stdout = io::stdout().lock();

    writeln!(stdout, "--- a/{}", result.filename)?;
    if proposed {
        writeln!(stdout, "+++ b/{} (proposed)", result.filename)?;
    } else {
        writeln!(stdout, "+++ b/{}", result.filename)?;
    }

    for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
        writeln!(stdout, "{}", hunk.header())?;
        for change in hunk.iter_changes() {
            let sign = match change.tag() {
                ChangeTag::Delete => "-",
                ChangeTag::Insert => "+",
                ChangeTag::Equal => " ",
            };
            let line = change.value();
            if line.ends_with('\n') {
                write!(stdout, "{}{}", sign, line)?;
            } else {
                writeln!(stdout, "{}{}", sign, line)?;
            }
        }
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Watch Mode
// ─────────────────────────────────────────────────────────────────────────────

/// Watch a file for changes and auto-clean on each save
fn watch_and_clean(path: &Path, config: &Config, styles: &VerboseStyle) -> Result<RunOutcome> {
    // Validate that the file exists and is readable
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    if !path.is_file() {
        anyhow::bail!(
            "--watch requires a file, not a directory: {}",
            path.display()
        );
    }

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    // Set up file watcher
    let (tx, rx) = mpsc::channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        notify::Config::default(),
    )
    .context("Failed to create file watcher")?;

    watcher
        .watch(path, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch file: {}", path.display()))?;

    let debounce = Duration::from_millis(config.debounce_ms);
    let mut last_event = Instant::now() - debounce; // Allow immediate first run

    eprintln!(
        "Watching {} for changes (Ctrl+C to stop)...",
        path.display()
    );

    let mut any_changes = false;

    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                // Only process file modification events
                if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    let now = Instant::now();
                    if now.duration_since(last_event) >= debounce {
                        last_event = now;

                        // Re-read and process the file
                        match read_file(path) {
                            Ok(lines) => {
                                let result = process_input(
                                    lines,
                                    path.display().to_string(),
                                    config,
                                    styles,
                                );

                                if result.would_change {
                                    // Write the cleaned content back with trailing newline
                                    let mut output = result.cleaned.join("\n");
                                    if !output.is_empty() {
                                        output.push('\n');
                                    }
                                    match fs::write(path, &output) {
                                        Ok(()) => {
                                            eprintln!(
                                                "✓ Rejoined {} line break(s)",
                                                result.stats.joins_applied
                                            );
                                            any_changes = true;
                                        }
                                        Err(e) => {
                                            eprintln!("✗ Failed to write: {}", e);
                                        }
                                    }
                                } else {
                                    eprintln!("✓ No changes needed");
                                }
                            }
                            Err(e) => {
                                eprintln!("✗ Error reading file: {}", e);
                            }
                        }
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // Just continue waiting
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                // Watcher disconnected, exit
                break;
            }
        }
    }

    eprintln!("\nWatch mode stopped.");

    Ok(RunOutcome {
        dry_run: false,
        would_change: any_changes,
    })
}

fn run(args: Args) -> Result<RunOutcome> {
    validate_args(&args)?;

    let config = create_config(&args)?;
    let styles = build_styles(config.color);

    // Clipboard mode stands alone: read, clean, preview, write back
    if config.clipboard {
        return run_clipboard(&styles);
    }

    // Handle watch mode - must have exactly one file input
    if config.watch {
        if args.inputs.len() != 1 {
            anyhow::bail!("--watch requires exactly one input file");
        }
        let path = &args.inputs[0];
        return watch_and_clean(path, &config, &styles);
    }

    if config.recursive {
        let files = discover_recursive_files(&args.inputs, &config, &styles)?;
        if files.is_empty() {
            let message = format!(
                "Warning: No files matched pattern '{}' in provided paths",
                config.glob
            );
            if config.verbose {
                eprintln!("{}", styles.dim(message));
            } else {
                eprintln!("{}", message);
            }
            return Ok(RunOutcome {
                dry_run: config.dry_run,
                would_change: false,
            });
        }

        return output_multiple_results(&args, &config, &styles, &files);
    }

    // Determine if we're processing stdin or files
    if args.inputs.is_empty() {
        // Stdin mode - single input
        let lines = read_stdin_content()?;
        let result = process_input(lines, "stdin".to_string(), &config, &styles);
        output_single_result(&args, &config, &styles, result)
    } else if args.inputs.len() == 1 {
        // Single file mode
        let path = &args.inputs[0];
        let lines = read_file(path)?;
        let result = process_input(lines, path.display().to_string(), &config, &styles);
        output_single_result(&args, &config, &styles, result)
    } else {
        // Multiple file mode
        output_multiple_results(&args, &config, &styles, &args.inputs)
    }
}

/// Handle output for a single file/stdin result
fn output_single_result(
    args: &Args,
    config: &Config,
    styles: &VerboseStyle,
    result: FileResult,
) -> Result<RunOutcome> {
    let would_change = result.would_change;

    if config.json {
        output_json_single(args, config, &result)?;
    } else if config.dry_run {
        output_dry_run_single(config, styles, &result)?;
    } else if config.diff {
        output_diff(&result, false)?;
    } else if args.in_place {
        // Must have a file path for in-place
        let path = args
            .inputs
            .first()
            .ok_or_else(|| ArgError("--in-place requires an input file".to_string()))?;

        if config.backup {
            let backup_path = create_backup(path, &config.backup_ext)?;
            if config.verbose {
                eprintln!(
                    "{}",
                    styles.dim(format!("Created backup: {}", backup_path.display()))
                );
            }
        }

        // Write with trailing newline to preserve Unix text file convention
        let mut output = result.cleaned.join("\n");
        if !output.is_empty() {
            output.push('\n');
        }
        fs::write(path, &output)
            .with_context(|| format!("Failed to write to file: {}", path.display()))?;
    } else {
        // Stdout mode - writeln! already adds newlines
        let mut stdout = io::stdout().lock();
        for line in &result.cleaned {
            writeln!(stdout, "{}", line)?;
        }
    }

    // Print summary in verbose mode for single file
    if config.verbose {
        print_stats_summary(&result.stats, 1, if would_change { 1 } else { 0 }, 0, styles);
    }

    Ok(RunOutcome {
        dry_run: config.dry_run,
        would_change,
    })
}

/// Output JSON for a single file result
fn output_json_single(args: &Args, config: &Config, result: &FileResult) -> Result<()> {
    let original_text = result.original.join("\n");
    let cleaned_text = result.cleaned.join("\n");

    let json_output = JsonOutput {
        version: "1.0",
        status: if config.dry_run {
            "dry_run".to_string()
        } else {
            "success".to_string()
        },
        file: Some(result.filename.clone()),
        input: InputStats {
            lines: result.original.len(),
            bytes: original_text.len(),
        },
        processing: ProcessingStats {
            gutter_columns: result.stats.gutter_columns,
            margin_detected: result.stats.margin.is_some(),
            margin_length: result.stats.margin.map(|m| m.length),
            lines_joined: result.stats.joins_applied,
        },
        output: Some(OutputStats {
            lines: result.cleaned.len(),
            bytes: cleaned_text.len(),
            changed: result.would_change,
        }),
        content: if !config.dry_run && !args.in_place {
            Some(cleaned_text.clone())
        } else {
            None
        },
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&json_output).context("Failed to serialize JSON output")?
    );

    // If in-place mode with JSON, still write the file
    if args.in_place {
        if let Some(ref path) = args.inputs.first() {
            if config.backup {
                create_backup(path, &config.backup_ext)?;
            }
            fs::write(path, &cleaned_text)
                .with_context(|| format!("Failed to write to file: {}", path.display()))?;
        }
    }

    Ok(())
}

/// Output dry-run info for a single file
fn output_dry_run_single(
    config: &Config,
    styles: &VerboseStyle,
    result: &FileResult,
) -> Result<()> {
    if config.diff && result.would_change {
        output_diff(result, true)?;
    }

    if config.verbose {
        if result.would_change {
            eprintln!(
                "{}",
                styles.warn(format!("Would modify: {}", result.filename))
            );
            eprintln!(
                "{}",
                styles.dim(format!(
                    "  {} line break(s) would be rejoined",
                    result.stats.joins_applied
                ))
            );
        } else {
            eprintln!(
                "{}",
                styles.success(format!("No changes needed: {}", result.filename))
            );
        }
    }

    Ok(())
}

/// Handle output for multiple files
fn output_multiple_results(
    args: &Args,
    config: &Config,
    styles: &VerboseStyle,
    paths: &[PathBuf],
) -> Result<RunOutcome> {
    let mut total_files_processed = 0;
    let mut total_files_changed = 0;
    let mut aggregated_stats = Stats::default();
    let mut any_would_change = false;
    let mut errors: Vec<(PathBuf, anyhow::Error)> = Vec::new();

    let show_file_headers = !args.in_place && !config.diff && !config.json && paths.len() > 1;

    for path in paths {
        match read_file(path) {
            Ok(lines) => {
                let result = process_input(lines, path.display().to_string(), config, styles);

                if result.would_change {
                    any_would_change = true;
                    total_files_changed += 1;
                }
                total_files_processed += 1;
                aggregated_stats.merge(&result.stats);

                // Handle output based on mode
                if config.json {
                    // For JSON with multiple files, output each file's JSON separately
                    output_json_single(args, config, &result)?;
                } else if config.dry_run {
                    output_dry_run_single(config, styles, &result)?;
                } else if config.diff {
                    output_diff(&result, false)?;
                } else if args.in_place {
                    // Write file in-place
                    if config.backup {
                        let backup_path = create_backup(path, &config.backup_ext)?;
                        if config.verbose {
                            eprintln!(
                                "{}",
                                styles.dim(format!("Created backup: {}", backup_path.display()))
                            );
                        }
                    }

                    // Write with trailing newline to preserve Unix text file convention
                    let mut output = result.cleaned.join("\n");
                    if !output.is_empty() {
                        output.push('\n');
                    }
                    fs::write(path, &output)
                        .with_context(|| format!("Failed to write to file: {}", path.display()))?;

                    if config.verbose {
                        if result.would_change {
                            eprintln!(
                                "{}",
                                styles.success(format!(
                                    "{}: {} line break(s) rejoined",
                                    path.display(),
                                    result.stats.joins_applied
                                ))
                            );
                        } else {
                            eprintln!(
                                "{}",
                                styles.dim(format!("{}: No changes needed", path.display()))
                            );
                        }
                    }
                } else {
                    // Stdout mode - concatenate output with file headers
                    let mut stdout = io::stdout().lock();

                    if show_file_headers {
                        writeln!(stdout, "==> {} <==", path.display())?;
                    }

                    for line in &result.cleaned {
                        writeln!(stdout, "{}", line)?;
                    }

                    if show_file_headers {
                        writeln!(stdout)?; // Blank line between files
                    }
                }
            }
            Err(e) => {
                eprintln!("Error processing {}: {:#}", path.display(), e);
                errors.push((path.clone(), e));
            }
        }
    }

    // Print summary in verbose mode
    if config.verbose {
        print_stats_summary(
            &aggregated_stats,
            total_files_processed,
            total_files_changed,
            errors.len(),
            styles,
        );
    }

    // If any files had errors, report them
    if !errors.is_empty() {
        let files = errors
            .iter()
            .map(|(p, _)| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let has_parse_error = errors
            .iter()
            .any(|(_, err)| error_chain_has::<ParseError>(err));

        if has_parse_error {
            return Err(ParseError(format!(
                "{} file(s) had parse errors: {}",
                errors.len(),
                files
            ))
            .into());
        }

        anyhow::bail!("{} file(s) had errors: {}", errors.len(), files);
    }

    Ok(RunOutcome {
        dry_run: config.dry_run,
        would_change: any_would_change,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
