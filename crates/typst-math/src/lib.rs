//! typst-math
//!
//! Render math written in [Typst](https://typst.app) syntax as images for
//! documentation builds.
//!
//! # Overview
//!
//! A `typst-math` block body is wrapped in a fixed Typst document, hashed,
//! and compiled by the external `typst` binary into
//! `<out_dir>/assets/typst_math/<sha1>.<ext>`. The host receives an image
//! reference with a `.*` extension, a `typst-math` class and a centered
//! alignment hint.
//!
//! | Builder format | Artifact |
//! |----------------|----------|
//! | `html`         | `.svg`   |
//! | `pdf`          | `.pdf`   |
//! | anything else  | `.png`   |
//!
//! # Example
//!
//! ```no_run
//! use typst_math::{ArtifactResolver, OutputFormat, ResolverConfig, TypstCompiler};
//!
//! let resolver = ArtifactResolver::new(
//!     ResolverConfig::new("_build/html/assets/typst_math"),
//!     TypstCompiler::new(),
//! );
//! let res = resolver.resolve(&["x^2 + y^2 = z^2"], OutputFormat::Vector)?;
//! println!("{}", res.artifact_path.display());
//! # Ok::<(), typst_math::TypstMathError>(())
//! ```
//!
//! # Typst Requirements
//!
//! The compiler is resolved through `PATH` on every compilation. Override the
//! program with the `typst_math_typst` config value or the
//! `TYPST_MATH_TYPST` environment variable.
//!
//! # Crate Structure
//!
//! - [`template`] - The Typst document wrapped around expressions
//! - [`key`] - Content keys
//! - [`format`] - Output formats
//! - [`compiler`] - Typst subprocess management
//! - [`resolver`] - Content-addressed artifact resolution
//! - [`directive`] - Host integration
//! - [`config`] - Configuration
//! - [`error`] - Error types

pub mod compiler;
pub mod config;
pub mod directive;
pub mod error;
pub mod format;
pub mod key;
pub mod resolver;
pub mod template;

// Re-export main types at crate root
pub use compiler::{CompileOutput, CompileRequest, Compiler, CompilerConfig, TypstCompiler};
pub use config::TypstMathConfig;
pub use directive::{setup, Application, BuilderInfo, ExtensionMetadata, SourceLocation};
pub use error::{CodedError, CompileError, TypstMathError, TypstMathResult};
pub use format::OutputFormat;
pub use key::ContentKey;
pub use resolver::{
    cache_dir_for, resolve, ArtifactReference, ArtifactResolver, FailurePolicy, RecompilePolicy,
    Resolution, ResolveStatus, ResolverConfig,
};
