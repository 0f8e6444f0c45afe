//! # Build Driver
//!
//! File-level compilation: read a `.chr` source, run it through the
//! parse → normalize → expand → emit pipeline, and write the rendered Rust
//! module. `chr_compile_module` walks a directory and compiles every `.chr`
//! file next to its output.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::emit::render::render_solver;
use crate::emit::{emit_program, EmitError};
use crate::ir::SolverDef;
use crate::parser::{parse_program, ParseError};

pub const CHR_SUFFIX: &str = "chr";
pub const RUST_SUFFIX: &str = "rs";

/// Errors fatal to a compilation run.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Emit(#[from] EmitError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}: not a CHR source file (expected a .{CHR_SUFFIX} extension)")]
    NotChrFile(PathBuf),

    #[error("CHR source file {0} does not exist")]
    MissingInput(PathBuf),
}

pub type CompileResult<T> = Result<T, CompileError>;

/// When an existing output file may be replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverwritePolicy {
    /// Always write the output.
    Always,
    /// Never replace an existing output.
    Never,
    /// Replace the output only when the source is newer than it.
    #[default]
    Timestamp,
}

/// Compile CHR source text to the solver IR.
pub fn chr_compile_def(source: &str) -> CompileResult<SolverDef> {
    let program = parse_program(source)?;
    Ok(emit_program(&program)?)
}

/// Compile CHR source text to a rendered Rust module.
pub fn chr_compile_source(source: &str) -> CompileResult<String> {
    Ok(render_solver(&chr_compile_def(source)?))
}

/// Compile one `.chr` file into `output_path`.
///
/// Returns true when output was written, false when the overwrite policy
/// kept the existing file.
pub fn chr_compile(
    input_path: &Path,
    output_path: &Path,
    overwrite: OverwritePolicy,
    verbose: bool,
) -> CompileResult<bool> {
    if input_path.extension().and_then(|e| e.to_str()) != Some(CHR_SUFFIX) {
        return Err(CompileError::NotChrFile(input_path.to_path_buf()));
    }
    if !input_path.is_file() {
        return Err(CompileError::MissingInput(input_path.to_path_buf()));
    }

    if output_path.is_file() {
        match overwrite {
            OverwritePolicy::Never => {
                debug!(output = %output_path.display(), "output exists, not overwriting");
                return Ok(false);
            }
            OverwritePolicy::Timestamp => {
                let input_mtime = fs::metadata(input_path)?.modified()?;
                let output_mtime = fs::metadata(output_path)?.modified()?;
                if input_mtime <= output_mtime {
                    debug!(output = %output_path.display(), "output up to date");
                    return Ok(false);
                }
            }
            OverwritePolicy::Always => {}
        }
    }

    let source = fs::read_to_string(input_path)?;
    let rust_source = chr_compile_source(&source)?;
    fs::write(output_path, rust_source)?;
    if verbose {
        info!(
            input = %input_path.display(),
            output = %output_path.display(),
            "compiled"
        );
    }
    Ok(true)
}

/// Compile every `.chr` file directly inside `module_path`, writing each
/// output next to its source. Returns the number of files written.
pub fn chr_compile_module(
    module_path: &Path,
    overwrite: OverwritePolicy,
    verbose: bool,
) -> CompileResult<usize> {
    let mut written = 0;
    for entry in fs::read_dir(module_path)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(CHR_SUFFIX) {
            continue;
        }
        let output = path.with_extension(RUST_SUFFIX);
        if chr_compile(&path, &output, overwrite, verbose)? {
            written += 1;
        } else if verbose {
            info!(input = %path.display(), "skipped, output up to date");
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_source_end_to_end() {
        let source = "
            class P.
            constraints a/0, b/0.
            t @ a ==> b.
        ";
        let rust = chr_compile_source(source).unwrap();
        assert!(rust.contains("pub struct P"));
        assert!(rust.contains("__activate_a_0"));
    }

    #[test]
    fn test_parse_errors_surface() {
        let err = chr_compile_source("class P").unwrap_err();
        assert!(matches!(err, CompileError::Parse(_)));
    }
}
