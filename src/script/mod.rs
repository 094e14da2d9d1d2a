//! C4: the line-oriented script interpreter.

pub mod commands;
pub mod interp;
pub mod lexer;

pub use commands::{Host, InputEcho, Suspend};
pub use interp::{Interpreter, ScriptError, StepResult};
