//! chrc - the CHR compiler
//!
//! Compiles `.chr` source files into Rust solver modules that link against
//! the `chr_engine` runtime.
//!
//! ## Usage
//!
//! ```bash
//! # Compile a single file (output lands next to the source)
//! chrc examples.chr
//!
//! # Explicit output path, always overwrite
//! chrc gcd.chr -o src/gcd_solver.rs --overwrite always
//!
//! # Compile every .chr file in a directory, timestamp-checked
//! chrc solvers/
//!
//! # Inspect the parsed AST
//! chrc gcd.chr --dump-ast
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use chr_engine::compile::{chr_compile, chr_compile_module, OverwritePolicy, RUST_SUFFIX};
use chr_engine::config::Config;
use chr_engine::parser::parse_program;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OverwriteArg {
    Always,
    Never,
    Timestamp,
}

impl From<OverwriteArg> for OverwritePolicy {
    fn from(arg: OverwriteArg) -> Self {
        match arg {
            OverwriteArg::Always => OverwritePolicy::Always,
            OverwriteArg::Never => OverwritePolicy::Never,
            OverwriteArg::Timestamp => OverwritePolicy::Timestamp,
        }
    }
}

/// Compile CHR source files into Rust solver modules.
#[derive(Parser, Debug)]
#[command(name = "chrc", version, about)]
struct Args {
    /// A .chr source file, or a directory of them
    input: PathBuf,

    /// Output file path (single-file mode only; defaults to the input
    /// with a .rs extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// When to replace an existing output file
    #[arg(long, value_enum)]
    overwrite: Option<OverwriteArg>,

    /// Configuration file (defaults to chrc.toml / chrc.local.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the parsed AST as JSON instead of compiling
    #[arg(long)]
    dump_ast: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> Result<Config> {
    match &args.config {
        Some(path) => {
            let path = path.to_str().context("config path is not valid UTF-8")?;
            Config::from_file(path).with_context(|| format!("failed to load config {path}"))
        }
        None => Config::load().context("failed to load configuration"),
    }
}

fn init_logging(config: &Config, verbose: bool) {
    let fallback = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(args: &Args) -> Result<()> {
    let config = load_config(args)?;
    init_logging(&config, args.verbose);

    if args.dump_ast {
        let source = std::fs::read_to_string(&args.input)
            .with_context(|| format!("cannot read {}", args.input.display()))?;
        let program = parse_program(&source)?;
        println!("{}", serde_json::to_string_pretty(&program)?);
        return Ok(());
    }

    let overwrite = args
        .overwrite
        .map_or(config.build.overwrite, OverwritePolicy::from);

    if args.input.is_dir() {
        if args.output.is_some() {
            bail!("-o/--output cannot be combined with a directory input");
        }
        let written = chr_compile_module(&args.input, overwrite, args.verbose)?;
        println!("{written} file(s) compiled");
        return Ok(());
    }

    let output = match (&args.output, &config.build.output_dir) {
        (Some(path), _) => path.clone(),
        (None, Some(dir)) => {
            let stem = args.input.with_extension(RUST_SUFFIX);
            let name = stem
                .file_name()
                .context("input path has no file name")?
                .to_owned();
            dir.join(name)
        }
        (None, None) => args.input.with_extension(RUST_SUFFIX),
    };

    let written = chr_compile(&args.input, &output, overwrite, args.verbose)?;
    if written {
        println!("compiled {} -> {}", args.input.display(), output.display());
    } else {
        println!("{} is up to date", output.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("chrc: {error:#}");
            ExitCode::FAILURE
        }
    }
}
