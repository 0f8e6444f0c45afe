//! # CHR Engine
//!
//! A compiler and runtime for Constraint Handling Rules (CHR): multi-headed
//! guarded rules over a multiset constraint store, compiled ahead-of-time
//! into imperative solver code and driven under the refined operational
//! semantics ω_r.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! CHR Source Code
//!     ↓
//! [Parser]            → AST (terms, rules, declarations)
//!     ↓
//! [Normalizer]        → linear heads + explicit matchings
//!     ↓
//! [ω_r Expansion]     → occurrence schemes (removed before kept)
//!     ↓
//! [Code Emitter]      → SolverDef (target IR)
//!     ↓
//! [Back-End]          → printed Rust module      [Interpreter] → in-process solver
//! ```
//!
//! At runtime, every newly inserted or re-activated constraint is driven
//! through each of its rule occurrences in textual order; each occurrence
//! searches the store for partners over fixed snapshots, checks its guard
//! speculatively against the trail, records in the propagation history, and
//! commits by removing consumed constraints and executing the body.
//!
//! ## Usage
//!
//! Compile and run a program in-process:
//!
//! ```rust
//! use chr_engine::interp::DynSolver;
//! use chr_engine::runtime::Value;
//!
//! let source = r"
//!     class GCDSolver.
//!     constraints gcd/1.
//!     r1 @ gcd($N) <=> $N == 0 | true.
//!     r2 @ gcd($M) \ gcd($N) <=> $M <= $N | gcd($N - $M).
//! ";
//! let mut solver = DynSolver::from_source(source).unwrap();
//! solver.post("gcd", &[Value::Int(100)]).unwrap();
//! solver.post("gcd", &[Value::Int(66)]).unwrap();
//! assert_eq!(solver.dump().len(), 1);
//! ```
//!
//! Or compile `.chr` files to Rust modules with the `chrc` binary.
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `parser` | CHR source → AST |
//! | `ast` | Terms, rules, programs, unparse |
//! | `normalize` | Head linearization, matchings |
//! | `occurrence` | ω_r occurrence expansion |
//! | `ir` | Target IR (procedures, dispatchers, entries) |
//! | `emit` | AST → IR, plus the Rust printing back-end |
//! | `interp` | Direct IR execution |
//! | `runtime` | Builtin store, constraint store, solver base |
//! | `compile` | File-level build driver |
//! | `config` | chrc.toml / environment configuration |

pub mod ast;
pub mod compile;
pub mod config;
pub mod emit;
pub mod interp;
pub mod ir;
pub mod normalize;
pub mod occurrence;
pub mod parser;
pub mod runtime;

// Re-export the pipeline surface for convenience.
pub use crate::ast::{Constraint, Program, Rule, Signature, Term};
pub use crate::compile::{
    chr_compile, chr_compile_def, chr_compile_module, chr_compile_source, CompileError,
    OverwritePolicy,
};
pub use crate::config::Config;
pub use crate::emit::render::render_solver;
pub use crate::emit::{emit_program, EmitError};
pub use crate::interp::DynSolver;
pub use crate::ir::SolverDef;
pub use crate::normalize::{normalize_program, NormalizedProgram};
pub use crate::occurrence::{omega_r, ProcessedProgram};
pub use crate::parser::{parse_program, ParseError};
pub use crate::runtime::{ChrSolver, LogicVariable, RuntimeError, StoredConstraint, Value};
