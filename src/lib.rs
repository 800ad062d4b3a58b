//! Architect build scripts: lexer, parser, node tree and runner.
//!
//! A script is an indentation-structured list of calls. Loading turns
//! the calls into namespaces, targets, statements and commands;
//! running a target executes its dependencies first, in a
//! deterministic order, with lexically scoped variables.
//!
//! # Quick start
//!
//! ## Parse and re-format a script
//!
//! ```
//! use architect::{format, parse};
//!
//! let input = "target build depends compile:\n    echo \"linking\"\n";
//! let nodes = parse(input).unwrap();
//! assert_eq!(format(&nodes), input);
//! ```
//!
//! ## Load and run a target
//!
//! ```
//! use std::sync::Arc;
//! use architect::{Capture, Environment, Registry};
//!
//! let capture = Arc::new(Capture::default());
//! let mut env = Environment::new(Registry::default()).with_output(capture.clone());
//! let script = env
//!     .load_str(
//!         "architect",
//!         "target compile:\n    echo compiling\ntarget build depends compile:\n    echo linking\n",
//!     )
//!     .unwrap();
//! env.run(&script, "build").unwrap();
//! assert_eq!(capture.lines(), ["compiling", "linking"]);
//! ```

// Allow noisy pedantic lints that don't add value for
// a library crate.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod ast;
pub mod builder;
pub mod command;
pub mod config;
pub mod env;
pub mod formatter;
pub mod graph;
pub mod lexer;
pub mod loader;
pub mod node;
pub mod parser;
pub mod registry;
pub mod scope;
pub mod token;
pub mod types;

pub use ast::{SyntaxNode, Value};
pub use command::{Capture, Command, CommandError, CommandType, EchoType, Output, RunContext, Stdout};
pub use config::{ConfigBag, ConfigStore};
pub use env::{Environment, LoadError, RunError, Script};
pub use formatter::format;
pub use graph::{ResolveError, TargetGraph};
pub use lexer::{LexError, LexErrorKind, LexOptions, Lexer, tokenize};
pub use loader::{FsLoader, MemoryLoader, SourceLoader};
pub use node::{BuildError, NodeId, NodeKind, Tree};
pub use parser::{Event, ParseError, ParseErrorKind, Parser, SyntaxError, parse};
pub use registry::{Builtin, Capability, NodeType, Registry};
pub use scope::{Frame, Scope};
pub use token::{Span, Token, TokenKind};
pub use types::{ArgumentType, Args, EvalError, FileSet, Scalar, Shape, ValidationError, ValidationErrorKind};

/// Default build file name.
pub const DEFAULT_FILENAME: &str = "architect";

/// Default target when none is named.
pub const DEFAULT_TARGET: &str = "default";

/// Unified error type covering loading and running.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Syntax(#[from] SyntaxError),
    #[error("{0}")]
    Load(#[from] LoadError),
    #[error("{0}")]
    Run(#[from] RunError),
}

impl From<LexError> for Error {
    fn from(e: LexError) -> Self {
        Self::Syntax(e.into())
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Self::Syntax(e.into())
    }
}

/// Load `source` with the default registry and run `targets`, printing
/// to standard output.
pub fn run_str(source: &str, targets: &[&str]) -> Result<(), Error> {
    let mut env = Environment::default();
    let script = env.load_str(DEFAULT_FILENAME, source)?;
    env.run_all(&script, targets)?;
    Ok(())
}
