//! A simulated Docker CLI.
//!
//! The core is three pure pieces: [`parse`] turns a command line into a
//! [`ParsedCommand`], [`validate`] lints Dockerfiles and compose files, and
//! [`evaluate`] runs a parsed command against an [`EngineContext`] snapshot,
//! returning a [`StateDelta`], the events to log and the lines to print.
//! Nothing is executed for real. [`session::Session`] is the store a host
//! keeps between commands.

pub mod config;
pub mod engine;
pub mod error;
pub mod parser;
pub mod schema;
pub mod session;
pub mod state;
pub mod validators;
pub mod workspace;

pub use engine::{evaluate, CommandResult, Evaluator};
pub use error::{Error, Result};
pub use parser::{parse, ParsedCommand};
pub use state::{EngineContext, EngineEvent, EventKind, StateDelta};
pub use validators::{validate, Diagnostic, FileKind, Severity};
pub use workspace::{WorkspaceFile, WorkspaceFiles};
