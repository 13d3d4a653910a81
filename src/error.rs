//! Provides [InterpretationError], the error that most things return.
use thiserror::Error;

/// Any error that can occur while interpreting Atto source code.
///
/// Diagnostics have already been written to standard error by the time one of
/// these is returned; the variant only says which phase failed.
#[derive(Debug, Error)]
pub enum InterpretationError {
    /// A compile-time error, such as a syntax error or a bad assignment target.
    #[error("compile-time error")]
    CompileError,
    /// A runtime error, such as a type error or an undefined variable.
    #[error("runtime error")]
    RuntimeError,
}
