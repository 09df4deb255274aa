//! Command-line front end for the MemBrowse memory report analyzer (§6.3).

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use membrowse::report::MemoryReport;
use membrowse::{analyze, AnalyzeOptions, AnalysisError};

#[derive(Parser)]
#[command(name = "membrowse", version, about = "Firmware memory report analyzer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze an ELF binary and its linker scripts into a memory report.
    Analyze(AnalyzeArgs),
}

#[derive(Args)]
struct AnalyzeArgs {
    /// The compiled ELF binary to analyze.
    elf: PathBuf,

    /// GNU linker scripts (`.ld`) the binary was linked with, in `-T` order.
    ld: Vec<PathBuf>,

    /// Defines a variable the linker scripts may reference (`NAME=VALUE`), taking
    /// precedence over both the script's own assignments and architecture defaults.
    #[arg(long = "def", value_name = "VAR=VALUE")]
    def: Vec<String>,

    /// Deprecated alias for `--def`, kept for scripts written against earlier releases.
    #[arg(long = "linker-vars", value_name = "VAR=VALUE", hide = true)]
    linker_vars: Vec<String>,

    /// Skips the `.debug_line` fallback tier of source resolution.
    #[arg(long)]
    skip_line_program: bool,

    /// Disables C++/Rust symbol demangling.
    #[arg(long)]
    no_demangle: bool,

    /// Emits the JSON wire format (default).
    #[arg(long, conflicts_with = "human")]
    json: bool,

    /// Emits a human-readable tabular report instead of JSON.
    #[arg(long)]
    human: bool,

    /// Writes the report to this file instead of stdout.
    #[arg(short = 'o', long = "output", value_name = "OUT")]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Command::Analyze(args) = cli.command;

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Analysis(err)) => {
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
        Err(CliError::Io(message)) => {
            eprintln!("error: {message}");
            ExitCode::from(3)
        }
        Err(CliError::InvalidArgs(message)) => {
            eprintln!("error: {message}");
            ExitCode::from(2)
        }
    }
}

enum CliError {
    Analysis(AnalysisError),
    Io(String),
    InvalidArgs(String),
}

impl From<AnalysisError> for CliError {
    fn from(err: AnalysisError) -> Self {
        CliError::Analysis(err)
    }
}

fn run(args: AnalyzeArgs) -> Result<(), CliError> {
    let var_overrides = parse_def_overrides(&args.def, &args.linker_vars)?;

    let ld_paths: Vec<&Path> = args.ld.iter().map(|p| p.as_path()).collect();

    let opts = AnalyzeOptions {
        var_overrides,
        skip_line_program: args.skip_line_program,
        cancel_token: None,
        demangle: !args.no_demangle,
    };

    let report = analyze(&args.elf, &ld_paths, opts)?;

    let rendered = if args.human {
        render_human(&report)
    } else {
        serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::Io(format!("failed to serialize report: {e}")))?
    };

    match args.output {
        Some(path) => {
            fs::write(&path, rendered.as_bytes())
                .map_err(|e| CliError::Io(format!("failed to write {}: {e}", path.display())))?;
        }
        None => {
            let mut stdout = std::io::stdout();
            let _ = writeln!(stdout, "{rendered}");
        }
    }

    Ok(())
}

fn parse_def_overrides(def: &[String], linker_vars: &[String]) -> Result<BTreeMap<String, i64>, CliError> {
    let mut overrides = BTreeMap::new();
    for entry in def.iter().chain(linker_vars.iter()) {
        let (name, value) = entry.split_once('=').ok_or_else(|| {
            CliError::InvalidArgs(format!("--def expects NAME=VALUE, got {entry:?}"))
        })?;
        let parsed = membrowse_common::parse_linker_integer(value).ok_or_else(|| {
            CliError::InvalidArgs(format!("--def value {value:?} is not a valid integer literal"))
        })?;
        overrides.insert(name.to_string(), parsed);
    }
    Ok(overrides)
}

/// Renders the report as a terminal-friendly table (§2's human-readable supplement),
/// independent of the JSON wire format's field layout.
fn render_human(report: &MemoryReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("architecture: {}\n\n", report.architecture));

    out.push_str("MEMORY REGIONS\n");
    out.push_str(&format!(
        "{:<16} {:>12} {:>10} {:>10} {:>8}\n",
        "name", "address", "size", "used", "util%"
    ));
    for (name, region) in report.memory_regions.iter() {
        out.push_str(&format!(
            "{:<16} {:>12} {:>10} {:>10} {:>8.1}\n",
            name, region.address, region.size, region.used, region.utilization
        ));
    }

    out.push_str("\nSECTIONS\n");
    out.push_str(&format!(
        "{:<20} {:>12} {:>10} {:<10}\n",
        "name", "address", "size", "region"
    ));
    for section in &report.sections {
        out.push_str(&format!(
            "{:<20} {:>12} {:>10} {:<10}\n",
            section.name,
            section.address,
            section.size,
            section.region.as_deref().unwrap_or("-")
        ));
    }

    out.push_str(&format!(
        "\n{} symbols across {} compilation units. elf_sha256={}\n",
        report.symbols.len(),
        report.compilation_units.len(),
        report.meta.elf_sha256
    ));

    if !report.meta.warnings.is_empty() {
        out.push_str("\nWARNINGS\n");
        for warning in &report.meta.warnings {
            out.push_str(&format!("  [{}] {}\n", warning.kind, warning.message));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_def_overrides() {
        let overrides = parse_def_overrides(&["FLASH_SIZE=0x100000".to_string()], &[]).unwrap();
        assert_eq!(overrides.get("FLASH_SIZE"), Some(&0x100000));
    }

    #[test]
    fn linker_vars_alias_merges_with_def() {
        let overrides =
            parse_def_overrides(&["A=1".to_string()], &["B=2".to_string()]).unwrap();
        assert_eq!(overrides.len(), 2);
    }

    #[test]
    fn rejects_malformed_def() {
        assert!(parse_def_overrides(&["not_a_binding".to_string()], &[]).is_err());
    }
}
