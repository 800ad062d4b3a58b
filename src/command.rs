//! The contract between the execution engine and action nodes.
//!
//! A [`CommandType`] is registered under a node name. It declares the
//! argument [`Shape`], may run a one-time `configure` step, and builds
//! a [`Command`] per node instance. The engine calls
//! [`Command::run`] when the node executes.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use crate::config::ConfigBag;
use crate::scope::Scope;
use crate::token::Span;
use crate::types::{Arg, Args, ArgumentType, EvalError, Scalar, Shape, ValidationErrorKind};

/// Failure of a command's `run` or `configure`.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Factory for one kind of action node.
pub trait CommandType: Send + Sync {
    fn shape(&self) -> Shape;

    /// One-time setup, run the first time a node of this type is
    /// loaded. Receives the bag stored by a previous run, if any, and
    /// returns the bag to keep.
    fn configure(&self, values: Option<ConfigBag>) -> Result<Option<ConfigBag>, CommandError> {
        Ok(values)
    }

    /// Build the command for one node from its validated arguments.
    fn build(&self, args: Args) -> Result<Box<dyn Command>, ValidationErrorKind>;
}

/// An action node instance.
pub trait Command: Send + Sync + fmt::Debug {
    fn run(&self, ctx: &mut RunContext<'_, '_>) -> Result<(), CommandError>;
}

/// Line-oriented sink for command output.
pub trait Output: Send + Sync {
    fn line(&self, text: &str) -> io::Result<()>;
}

/// Writes to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stdout;

impl Output for Stdout {
    fn line(&self, text: &str) -> io::Result<()> {
        writeln!(io::stdout().lock(), "{text}")
    }
}

/// Collects lines in memory.
#[derive(Debug, Default)]
pub struct Capture(Mutex<Vec<String>>);

impl Capture {
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Output for Capture {
    fn line(&self, text: &str) -> io::Result<()> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());
        Ok(())
    }
}

/// What a running command can see.
pub struct RunContext<'s, 'a> {
    pub(crate) scope: &'s mut Scope<'a>,
    pub(crate) output: &'s dyn Output,
    pub(crate) target: Option<&'s str>,
    pub(crate) span: &'s Span,
}

impl RunContext<'_, '_> {
    pub fn resolve(&self, arg: &Arg) -> Result<Scalar, EvalError> {
        arg.resolve(&*self.scope)
    }

    /// Resolve `args` and render each as text.
    pub fn texts(&self, args: &[Arg]) -> Result<Vec<String>, EvalError> {
        args.iter()
            .map(|arg| {
                self.resolve(arg)?
                    .coerce(ArgumentType::String)
                    .map(|v| v.to_string())
            })
            .collect()
    }

    /// Bind `name` in the innermost frame.
    pub fn bind(&mut self, name: &str, value: Scalar) {
        self.scope.bind(name, value);
    }

    #[must_use]
    pub fn output(&self) -> &dyn Output {
        self.output
    }

    /// Name of the running target, `None` in namespace pre/post steps.
    #[must_use]
    pub const fn target(&self) -> Option<&str> {
        self.target
    }

    #[must_use]
    pub const fn span(&self) -> &Span {
        self.span
    }
}

/// `echo words...`: print the arguments joined by spaces.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoType;

#[derive(Debug)]
struct Echo {
    args: Vec<Arg>,
}

impl CommandType for EchoType {
    fn shape(&self) -> Shape {
        Shape {
            rest: Some(ArgumentType::String),
            ..Shape::EMPTY
        }
    }

    fn build(&self, args: Args) -> Result<Box<dyn Command>, ValidationErrorKind> {
        Ok(Box::new(Echo {
            args: args.positional,
        }))
    }
}

impl Command for Echo {
    fn run(&self, ctx: &mut RunContext<'_, '_>) -> Result<(), CommandError> {
        let line = ctx.texts(&self.args)?.join(" ");
        ctx.output().line(&line)?;
        Ok(())
    }
}
