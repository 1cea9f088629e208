//! Error types for typst-math.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for resolver and directive operations.
pub type TypstMathResult<T> = Result<T, TypstMathError>;

/// Common interface for reporting errors with stable codes.
pub trait CodedError: std::error::Error {
    /// Get the error code for reporting.
    ///
    /// Returns a static string like "TYPST_001". Codes are stable and can be
    /// matched on by tooling.
    fn code(&self) -> &'static str;

    /// Get the error category for grouping related errors.
    fn category(&self) -> &'static str;

    /// Get a human-readable message describing the error.
    fn message(&self) -> String {
        self.to_string()
    }
}

/// Errors reported by a [`Compiler`](crate::compiler::Compiler).
#[derive(Debug, Error)]
pub enum CompileError {
    /// The configured compiler did not resolve to an executable.
    #[error("Typst compiler '{program}' not found. Ensure typst is installed and in PATH, or set typst_math_typst / TYPST_MATH_TYPST")]
    CompilerNotFound { program: String },

    /// Failed to spawn the compiler process.
    #[error("Failed to spawn typst process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    /// Failed to feed the document on stdin.
    #[error("Failed to write document to typst stdin: {0}")]
    WriteStdinFailed(#[source] std::io::Error),

    /// Compiler process timed out.
    #[error("Typst process timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Compiler process exited with non-zero status.
    #[error("Typst process exited with status {exit_code}: {stderr}")]
    ProcessFailed { exit_code: i32, stderr: String },

    /// Compiler exited successfully without writing the artifact.
    #[error("Typst exited successfully but produced no output at {}", path.display())]
    NoOutput { path: PathBuf },

    /// Waiting on the process failed.
    #[error("Failed to wait for typst process: {0}")]
    WaitFailed(#[source] std::io::Error),
}

impl CompileError {
    /// Creates a new process failed error.
    pub fn process_failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self::ProcessFailed {
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Creates a new compiler not found error.
    pub fn compiler_not_found(program: impl Into<String>) -> Self {
        Self::CompilerNotFound {
            program: program.into(),
        }
    }

    /// Returns true if this is a configuration problem rather than a
    /// failure to compile a particular expression.
    pub fn is_configuration(&self) -> bool {
        matches!(self, CompileError::CompilerNotFound { .. })
    }
}

impl CodedError for CompileError {
    fn code(&self) -> &'static str {
        match self {
            CompileError::CompilerNotFound { .. } => "TYPST_001",
            CompileError::SpawnFailed(_) => "TYPST_002",
            CompileError::WriteStdinFailed(_) => "TYPST_003",
            CompileError::Timeout { .. } => "TYPST_004",
            CompileError::ProcessFailed { .. } => "TYPST_005",
            CompileError::WaitFailed(_) => "TYPST_006",
            CompileError::NoOutput { .. } => "TYPST_007",
        }
    }

    fn category(&self) -> &'static str {
        if self.is_configuration() {
            "configuration"
        } else {
            "compilation"
        }
    }
}

/// Errors that can occur while resolving an artifact.
#[derive(Debug, Error)]
pub enum TypstMathError {
    /// The directive body contained no lines.
    #[error("typst-math directive has no content")]
    EmptyExpression,

    /// The cache directory could not be created.
    #[error("Failed to create cache directory {path}: {source}")]
    CacheDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The compiler reported a configuration or compilation failure.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A configuration value had the wrong shape.
    #[error("Invalid configuration value for '{name}': {message}")]
    InvalidConfig { name: String, message: String },

    /// No directive is registered under the given name.
    #[error("Unknown directive '{name}'")]
    UnknownDirective { name: String },

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TypstMathError {
    /// Creates a new invalid config error.
    pub fn invalid_config(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Returns true for errors caused by configuration (missing compiler,
    /// malformed config values).
    pub fn is_configuration(&self) -> bool {
        match self {
            TypstMathError::Compile(e) => e.is_configuration(),
            TypstMathError::InvalidConfig { .. } | TypstMathError::UnknownDirective { .. } => true,
            _ => false,
        }
    }

    /// Returns true for filesystem errors.
    pub fn is_filesystem(&self) -> bool {
        matches!(
            self,
            TypstMathError::CacheDirFailed { .. } | TypstMathError::Io(_)
        )
    }

    /// Returns true when a particular expression failed to compile.
    pub fn is_compilation(&self) -> bool {
        matches!(self, TypstMathError::Compile(e) if !e.is_configuration())
    }
}

impl CodedError for TypstMathError {
    fn code(&self) -> &'static str {
        match self {
            TypstMathError::Compile(e) => e.code(),
            TypstMathError::EmptyExpression => "TYPST_010",
            TypstMathError::CacheDirFailed { .. } => "TYPST_011",
            TypstMathError::InvalidConfig { .. } => "TYPST_012",
            TypstMathError::UnknownDirective { .. } => "TYPST_013",
            TypstMathError::Io(_) => "TYPST_014",
        }
    }

    fn category(&self) -> &'static str {
        if self.is_configuration() {
            "configuration"
        } else if self.is_filesystem() {
            "filesystem"
        } else if self.is_compilation() {
            "compilation"
        } else {
            "directive"
        }
    }
}
