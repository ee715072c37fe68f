//! dtei - theatrical DOCX manuscript to TEI XML converter
//!
//! Usage:
//!   dtei build [MAIN]    - Validate, then write the TEI document
//!   dtei check [MAIN]    - Report style and note problems only
//!   dtei preview [MAIN]  - Print the TEI document (or an HTML preview)

use clap::{Args, Parser, Subcommand};
use drama_tei::{
    ConversionError, ConversionOutput, ConvertOptions, Diagnostic, DiagnosticKind, EditionConfig,
    HeaderMode, Severity, convert, render_preview, validate_files,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dtei")]
#[command(author, version, about = "Theatrical DOCX manuscript to TEI XML converter")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log progress (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and write the TEI document
    Build {
        #[command(flatten)]
        input: InputArgs,
        /// Output file (default: first three words of the title)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check for problems without converting
    Check {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Print the TEI document, or write it to OUTPUT
    Preview {
        #[command(flatten)]
        input: InputArgs,
        /// Render an HTML page instead of XML
        #[arg(long)]
        html: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Main manuscript (.docx)
    main: Option<PathBuf>,
    /// General notes file
    #[arg(long)]
    notes: Option<PathBuf>,
    /// Critical apparatus file
    #[arg(long)]
    apparatus: Option<PathBuf>,
    /// Metadata document with the header tables
    #[arg(long)]
    metadata: Option<PathBuf>,
    /// Header flavour: prolope or minimal
    #[arg(long)]
    header_mode: Option<HeaderMode>,
    /// Edition file (default: ./edition.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Command-line values layered over the edition file.
struct Inputs {
    main: PathBuf,
    options: ConvertOptions,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Build { input, output } => with_inputs(input, output, build_command),
        Commands::Check { input } => with_inputs(input, None, check_command),
        Commands::Preview { input, html, output } => {
            with_inputs(input, output, |inputs| preview_command(inputs, html))
        }
    }
}

fn init_logging(verbose: bool) {
    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, rust_log.as_deref()))
        .with_writer(std::io::stderr)
        .init();
}

/// RUST_LOG wins when set; otherwise warnings, or progress with `--verbose`.
fn log_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    match rust_log.map(str::trim).filter(|s| !s.is_empty()) {
        Some(directives) => EnvFilter::new(directives),
        None => {
            let level = if verbose { Level::INFO } else { Level::WARN };
            EnvFilter::default().add_directive(level.into())
        }
    }
}

fn with_inputs(
    args: InputArgs,
    output: Option<PathBuf>,
    command: impl FnOnce(Inputs) -> ExitCode,
) -> ExitCode {
    match resolve_inputs(args, output) {
        Ok(inputs) => command(inputs),
        Err(msg) => {
            print_error(&msg);
            ExitCode::FAILURE
        }
    }
}

fn resolve_inputs(args: InputArgs, output: Option<PathBuf>) -> Result<Inputs, String> {
    let config = match &args.config {
        Some(path) => EditionConfig::load(path).map_err(|e| e.to_string())?,
        None => EditionConfig::discover(Path::new("."))
            .map_err(|e| e.to_string())?
            .unwrap_or_default(),
    };

    let main = args
        .main
        .or(config.main)
        .ok_or_else(|| "no main document given (pass MAIN or set `main` in edition.toml)".to_string())?;

    Ok(Inputs {
        main,
        options: ConvertOptions {
            notes: args.notes.or(config.notes),
            apparatus: args.apparatus.or(config.apparatus),
            metadata: args.metadata.or(config.metadata),
            header_override: None,
            output: output.or(config.output),
            persist: false,
            header_mode: args.header_mode.or(config.header_mode).unwrap_or_default(),
        },
    })
}

fn build_command(inputs: Inputs) -> ExitCode {
    let path = &inputs.main;
    println!("   \x1b[1;32mCompiling\x1b[0m {}", path.display());

    let diagnostics = match run_validation(&inputs) {
        Ok(d) => d,
        Err(e) => {
            print_conversion_error(&e, path);
            return ExitCode::FAILURE;
        }
    };

    let error_count = print_diagnostics(&diagnostics, path);

    if error_count > 0 {
        print_summary(error_count, diagnostics.len() - error_count, true);
        return ExitCode::FAILURE;
    }

    let options = ConvertOptions { persist: true, ..inputs.options };
    match convert(path, &options) {
        Ok(output) => {
            if !diagnostics.is_empty() {
                print_summary(0, diagnostics.len(), false);
            }
            let written = match output {
                ConversionOutput::Written(p) => p,
                ConversionOutput::Xml(_) => path.clone(),
            };
            println!("    \x1b[1;32mFinished\x1b[0m {}", written.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            print_conversion_error(&e, path);
            ExitCode::FAILURE
        }
    }
}

fn check_command(inputs: Inputs) -> ExitCode {
    let path = &inputs.main;
    println!("    \x1b[1;32mChecking\x1b[0m {}", path.display());

    let diagnostics = match run_validation(&inputs) {
        Ok(d) => d,
        Err(e) => {
            print_conversion_error(&e, path);
            return ExitCode::FAILURE;
        }
    };

    let error_count = print_diagnostics(&diagnostics, path);
    print_summary(error_count, diagnostics.len() - error_count, error_count > 0);

    if error_count > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn preview_command(inputs: Inputs, html: bool) -> ExitCode {
    let path = &inputs.main;
    let xml = match convert(path, &inputs.options) {
        Ok(ConversionOutput::Xml(xml)) => xml,
        Ok(ConversionOutput::Written(_)) => return ExitCode::SUCCESS,
        Err(e) => {
            print_conversion_error(&e, path);
            return ExitCode::FAILURE;
        }
    };

    let rendered = if html {
        match render_preview(&xml) {
            Ok(page) => page,
            Err(e) => {
                print_error(&format!("could not render preview: {}", e));
                return ExitCode::FAILURE;
            }
        }
    } else {
        xml
    };

    match &inputs.options.output {
        Some(out) => match fs::write(out, rendered) {
            Ok(()) => {
                eprintln!("    \x1b[1;32mFinished\x1b[0m {}", out.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                print_error(&format!("could not write {}: {}", out.display(), e));
                ExitCode::FAILURE
            }
        },
        None => {
            println!("{}", rendered);
            ExitCode::SUCCESS
        }
    }
}

fn run_validation(inputs: &Inputs) -> Result<Vec<Diagnostic>, ConversionError> {
    validate_files(
        &inputs.main,
        inputs.options.apparatus.as_deref(),
        inputs.options.notes.as_deref(),
    )
}

fn print_diagnostics(diagnostics: &[Diagnostic], path: &Path) -> usize {
    let mut error_count = 0;

    for d in diagnostics {
        let (color, label) = match d.severity {
            Severity::Error => {
                error_count += 1;
                ("\x1b[1;31m", "error")
            }
            Severity::Warning => ("\x1b[1;33m", "warning"),
            Severity::Info => ("\x1b[1;36m", "info"),
        };

        println!("{}{}\x1b[0m: {}", color, label, d.message);
        // note-file findings carry a line number instead of a paragraph index
        let in_note_file = matches!(d.kind, DiagnosticKind::MalformedNote(_) | DiagnosticKind::EmptyNote(..));
        match (d.location, d.after_verse) {
            (Some(line), _) if in_note_file => {
                println!("  \x1b[1;34m-->\x1b[0m line {}", line);
            }
            (Some(at), Some(verse)) => {
                println!("  \x1b[1;34m-->\x1b[0m {}:{} (after verse {})", path.display(), at, verse);
            }
            (Some(at), None) => println!("  \x1b[1;34m-->\x1b[0m {}:{}", path.display(), at),
            (None, _) => {}
        }
        println!();
    }

    error_count
}

fn print_summary(errors: usize, warnings: usize, is_error: bool) {
    if is_error {
        print!("\x1b[1;31merror\x1b[0m: ");
        println!(
            "aborting due to {} error{}{}",
            errors,
            if errors == 1 { "" } else { "s" },
            if warnings > 0 {
                format!("; {} other diagnostic{} emitted", warnings, if warnings == 1 { "" } else { "s" })
            } else {
                String::new()
            }
        );
    } else if warnings > 0 {
        println!(
            "\x1b[1;33mwarning\x1b[0m: {} diagnostic{} emitted",
            warnings,
            if warnings == 1 { "" } else { "s" }
        );
    }
}

fn print_error(msg: &str) {
    eprintln!("\x1b[1;31merror\x1b[0m: {}", msg);
}

fn print_conversion_error(e: &ConversionError, path: &Path) {
    eprintln!("\x1b[1;31merror\x1b[0m: {}", e);
    eprintln!("  \x1b[1;34m-->\x1b[0m {}", path.display());
}
