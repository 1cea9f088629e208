//! Content-addressed artifact resolution.
//!
//! The resolver turns math expression lines into an image reference:
//!
//! 1. Template the lines into a Typst document.
//! 2. Hash the document into a [`ContentKey`].
//! 3. Place the artifact at `<cache_dir>/<key>.<ext>`.
//! 4. Run the compiler with the cache directory as working directory.
//! 5. Return an [`ArtifactReference`] with a wildcard extension.
//!
//! Whether step 4 is skipped for existing artifacts and how compile failures
//! are surfaced is controlled by [`RecompilePolicy`] and [`FailurePolicy`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use crate::compiler::{CompileRequest, Compiler, CompilerConfig, TypstCompiler};
use crate::error::{CodedError, TypstMathError, TypstMathResult};
use crate::format::OutputFormat;
use crate::key::ContentKey;
use crate::template::render_document;

/// CSS class attached to every generated image.
pub const CSS_CLASS: &str = "typst-math";

/// Alignment hint attached to every generated image.
pub const ALIGN: &str = "center";

/// Cache directory relative to the build output directory.
pub const CACHE_SUBDIR: [&str; 2] = ["assets", "typst_math"];

/// Returns the cache directory for a build output directory.
pub fn cache_dir_for(out_dir: &Path) -> PathBuf {
    CACHE_SUBDIR.iter().fold(out_dir.to_path_buf(), |p, s| p.join(s))
}

/// Resolves one expression with the typst program `compiler` and default
/// policies.
///
/// Convenience for one-off calls; builds that resolve many expressions should
/// keep one [`ArtifactResolver`] so same-key calls share a lock.
pub fn resolve<S: AsRef<str>>(
    lines: &[S],
    format: OutputFormat,
    cache_dir: &Path,
    compiler: &str,
) -> TypstMathResult<Resolution> {
    ArtifactResolver::new(
        ResolverConfig::new(cache_dir),
        TypstCompiler::with_config(CompilerConfig::with_program(compiler)),
    )
    .resolve(lines, format)
}

/// When to invoke the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecompilePolicy {
    /// Compile on every call, overwriting any existing artifact.
    #[default]
    Always,
    /// Skip the compiler when a non-empty artifact already exists.
    IfMissing,
}

impl FromStr for RecompilePolicy {
    type Err = TypstMathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(RecompilePolicy::Always),
            "if_missing" | "if-missing" => Ok(RecompilePolicy::IfMissing),
            _ => Err(TypstMathError::invalid_config(
                "typst_math_recompile",
                format!("expected 'always' or 'if_missing', got '{}'", s),
            )),
        }
    }
}

/// How a failed compilation is surfaced.
///
/// Missing compilers are configuration errors and always fail, whatever the
/// policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Discard the failure; the reference points at a possibly missing file.
    Ignore,
    /// Return the reference together with a warning.
    #[default]
    Warn,
    /// Fail the resolution.
    Error,
}

impl FromStr for FailurePolicy {
    type Err = TypstMathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignore" => Ok(FailurePolicy::Ignore),
            "warn" => Ok(FailurePolicy::Warn),
            "error" => Ok(FailurePolicy::Error),
            _ => Err(TypstMathError::invalid_config(
                "typst_math_on_error",
                format!("expected 'ignore', 'warn' or 'error', got '{}'", s),
            )),
        }
    }
}

/// Configuration for [`ArtifactResolver`].
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Directory holding all artifacts. Created on demand.
    pub cache_dir: PathBuf,
    /// When to invoke the compiler.
    pub recompile: RecompilePolicy,
    /// How compile failures are surfaced.
    pub on_compile_error: FailurePolicy,
}

impl ResolverConfig {
    /// Creates a config with default policies.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            recompile: RecompilePolicy::default(),
            on_compile_error: FailurePolicy::default(),
        }
    }

    /// Sets the recompile policy.
    pub fn recompile(mut self, policy: RecompilePolicy) -> Self {
        self.recompile = policy;
        self
    }

    /// Sets the failure policy.
    pub fn on_compile_error(mut self, policy: FailurePolicy) -> Self {
        self.on_compile_error = policy;
        self
    }
}

/// Image reference handed to the host's rendering layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactReference {
    /// Artifact path with a `.*` extension; the host picks the concrete one.
    pub uri: PathBuf,
    /// Style classes.
    pub classes: Vec<String>,
    /// Alignment hint for the rendering layer, e.g. `center`.
    pub align: String,
}

impl ArtifactReference {
    /// Creates a centered, `typst-math` classed reference for an artifact.
    pub fn for_artifact(artifact_path: &Path) -> Self {
        Self {
            uri: artifact_path.with_extension("*"),
            classes: vec![CSS_CLASS.to_string()],
            align: ALIGN.to_string(),
        }
    }

    /// Substitutes the wildcard extension with the one for `format`.
    pub fn concrete_uri(&self, format: OutputFormat) -> PathBuf {
        self.uri.with_extension(format.extension())
    }
}

/// What happened to the artifact during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveStatus {
    /// The compiler ran and succeeded.
    Compiled,
    /// An existing artifact was reused without running the compiler.
    Reused,
    /// The compiler ran and failed; the artifact may be missing.
    Failed,
}

/// Result of a successful [`ArtifactResolver::resolve`] call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    /// Content key of the templated document.
    pub key: ContentKey,
    /// Requested format.
    pub format: OutputFormat,
    /// Concrete artifact path.
    pub artifact_path: PathBuf,
    /// Reference for the rendering layer.
    pub reference: ArtifactReference,
    /// Outcome of the compile step.
    pub status: ResolveStatus,
    /// Compile failure message under [`FailurePolicy::Warn`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Resolves math expressions to compiled artifacts in a shared cache
/// directory.
///
/// A resolver may be shared between threads. Calls for the same key and
/// format are serialized; everything else runs in parallel.
pub struct ArtifactResolver<C> {
    config: ResolverConfig,
    compiler: C,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl<C: Compiler> ArtifactResolver<C> {
    /// Creates a resolver.
    pub fn new(config: ResolverConfig, compiler: C) -> Self {
        Self {
            config,
            compiler,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Returns a reference to the compiler.
    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    /// Returns the artifact path an expression resolves to, without touching
    /// the filesystem.
    pub fn artifact_path<S: AsRef<str>>(
        &self,
        lines: &[S],
        format: OutputFormat,
    ) -> TypstMathResult<PathBuf> {
        let key = ContentKey::of_expression(lines);
        Ok(self.absolute_cache_dir()?.join(key.file_name(format)))
    }

    /// Resolves an expression into an artifact reference.
    ///
    /// # Errors
    /// * [`TypstMathError::EmptyExpression`] if `lines` is empty
    /// * [`TypstMathError::CacheDirFailed`] if the cache directory cannot be
    ///   created
    /// * [`TypstMathError::Compile`] if the compiler is not installed, or if
    ///   it fails under [`FailurePolicy::Error`]
    pub fn resolve<S: AsRef<str>>(
        &self,
        lines: &[S],
        format: OutputFormat,
    ) -> TypstMathResult<Resolution> {
        if lines.is_empty() {
            return Err(TypstMathError::EmptyExpression);
        }

        let document = render_document(lines);
        let key = ContentKey::of_document(&document);

        let span = tracing::debug_span!("resolve", key = %key, format = %format);
        let _enter = span.enter();

        let cache_dir = self.ensure_cache_dir()?;
        let artifact_path = cache_dir.join(key.file_name(format));
        let reference = ArtifactReference::for_artifact(&artifact_path);

        let lock = self.key_lock(&artifact_path);
        let outcome = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.produce(&document, &artifact_path, &cache_dir)
        };
        self.release_key_lock(&artifact_path, lock);
        let (status, warning) = outcome?;

        Ok(Resolution {
            key,
            format,
            artifact_path,
            reference,
            status,
            warning,
        })
    }

    fn produce(
        &self,
        document: &str,
        artifact_path: &Path,
        cache_dir: &Path,
    ) -> TypstMathResult<(ResolveStatus, Option<String>)> {
        if self.config.recompile == RecompilePolicy::IfMissing && has_artifact(artifact_path) {
            tracing::debug!(path = %artifact_path.display(), "reusing cached artifact");
            return Ok((ResolveStatus::Reused, None));
        }

        let request = CompileRequest {
            document,
            output_path: artifact_path,
            working_dir: cache_dir,
        };

        match self.compiler.compile(&request) {
            Ok(output) => {
                tracing::info!(
                    path = %artifact_path.display(),
                    elapsed_ms = output.duration.as_millis() as u64,
                    "compiled typst math"
                );
                Ok((ResolveStatus::Compiled, None))
            }
            Err(e) if e.is_configuration() => Err(e.into()),
            Err(e) => match self.config.on_compile_error {
                FailurePolicy::Ignore => {
                    tracing::debug!(code = e.code(), error = %e, "ignoring typst failure");
                    Ok((ResolveStatus::Failed, None))
                }
                FailurePolicy::Warn => {
                    tracing::warn!(
                        code = e.code(),
                        path = %artifact_path.display(),
                        "typst failed to compile math: {}",
                        e
                    );
                    Ok((ResolveStatus::Failed, Some(e.to_string())))
                }
                FailurePolicy::Error => Err(e.into()),
            },
        }
    }

    fn absolute_cache_dir(&self) -> TypstMathResult<PathBuf> {
        let dir = &self.config.cache_dir;
        if dir.is_absolute() {
            return Ok(dir.clone());
        }
        let cwd = std::env::current_dir().map_err(|source| TypstMathError::CacheDirFailed {
            path: dir.clone(),
            source,
        })?;
        Ok(cwd.join(dir))
    }

    fn ensure_cache_dir(&self) -> TypstMathResult<PathBuf> {
        let dir = self.absolute_cache_dir()?;
        // create_dir_all succeeds when another worker created it first.
        std::fs::create_dir_all(&dir).map_err(|source| TypstMathError::CacheDirFailed {
            path: dir.clone(),
            source,
        })?;
        Ok(dir)
    }

    fn key_lock(&self, artifact_path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(artifact_path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release_key_lock(&self, artifact_path: &Path, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one held here: nobody else is waiting.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(artifact_path);
        }
    }

    #[cfg(test)]
    fn pending_locks(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Whether a usable artifact exists. Empty files are leftovers of an
/// interrupted compile.
fn has_artifact(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompileOutput;
    use crate::error::CompileError;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Writes the document to the output path and counts invocations.
    #[derive(Default)]
    struct RecordingCompiler {
        calls: AtomicUsize,
    }

    impl Compiler for RecordingCompiler {
        fn compile(&self, request: &CompileRequest<'_>) -> Result<CompileOutput, CompileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(request.output_path.parent(), Some(request.working_dir));
            std::fs::write(request.output_path, request.document).unwrap();
            Ok(CompileOutput {
                exit_code: 0,
                stderr: String::new(),
                duration: Duration::ZERO,
            })
        }
    }

    struct FailingCompiler;

    impl Compiler for FailingCompiler {
        fn compile(&self, _: &CompileRequest<'_>) -> Result<CompileOutput, CompileError> {
            Err(CompileError::process_failed(1, "error: unclosed delimiter"))
        }
    }

    struct MissingCompiler;

    impl Compiler for MissingCompiler {
        fn compile(&self, _: &CompileRequest<'_>) -> Result<CompileOutput, CompileError> {
            Err(CompileError::compiler_not_found("typst"))
        }
    }

    #[test]
    fn test_cache_dir_for() {
        assert_eq!(
            cache_dir_for(Path::new("/build/html")),
            PathBuf::from("/build/html/assets/typst_math")
        );
    }

    #[test]
    fn test_resolve_compiles_into_cache_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_dir = tmp.path().join("nested").join("cache");
        let resolver = ArtifactResolver::new(
            ResolverConfig::new(&cache_dir),
            RecordingCompiler::default(),
        );

        let res = resolver.resolve(&["a + b"], OutputFormat::Vector).unwrap();

        assert!(cache_dir.is_dir());
        assert_eq!(res.status, ResolveStatus::Compiled);
        assert_eq!(
            res.artifact_path,
            cache_dir.join(format!("{}.svg", res.key))
        );
        assert_eq!(
            std::fs::read_to_string(&res.artifact_path).unwrap(),
            render_document(&["a + b"])
        );
        assert_eq!(res.reference.uri, cache_dir.join(format!("{}.*", res.key)));
        assert_eq!(res.reference.classes, vec![CSS_CLASS.to_string()]);
        assert_eq!(res.reference.align, "center");
        assert_eq!(resolver.pending_locks(), 0);
    }

    #[test]
    fn test_always_policy_recompiles() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = ArtifactResolver::new(
            ResolverConfig::new(tmp.path()),
            RecordingCompiler::default(),
        );

        resolver.resolve(&["x"], OutputFormat::Raster).unwrap();
        let res = resolver.resolve(&["x"], OutputFormat::Raster).unwrap();

        assert_eq!(res.status, ResolveStatus::Compiled);
        assert_eq!(resolver.compiler().calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_if_missing_policy_reuses() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = ArtifactResolver::new(
            ResolverConfig::new(tmp.path()).recompile(RecompilePolicy::IfMissing),
            RecordingCompiler::default(),
        );

        let first = resolver.resolve(&["x"], OutputFormat::Raster).unwrap();
        let second = resolver.resolve(&["x"], OutputFormat::Raster).unwrap();
        let other_format = resolver.resolve(&["x"], OutputFormat::Document).unwrap();

        assert_eq!(first.status, ResolveStatus::Compiled);
        assert_eq!(second.status, ResolveStatus::Reused);
        assert_eq!(other_format.status, ResolveStatus::Compiled);
        assert_eq!(first.artifact_path, second.artifact_path);
        assert_eq!(resolver.compiler().calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_if_missing_recompiles_empty_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = ArtifactResolver::new(
            ResolverConfig::new(tmp.path()).recompile(RecompilePolicy::IfMissing),
            RecordingCompiler::default(),
        );
        let stale = resolver.artifact_path(&["x"], OutputFormat::Vector).unwrap();
        std::fs::write(&stale, b"").unwrap();

        let res = resolver.resolve(&["x"], OutputFormat::Vector).unwrap();

        assert_eq!(res.status, ResolveStatus::Compiled);
        assert_eq!(resolver.compiler().calls.load(Ordering::SeqCst), 1);
        assert!(std::fs::metadata(&stale).unwrap().len() > 0);
    }

    #[test]
    fn test_if_missing_concurrent_same_key_compiles_once() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = ArtifactResolver::new(
            ResolverConfig::new(tmp.path()).recompile(RecompilePolicy::IfMissing),
            RecordingCompiler::default(),
        );

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    resolver
                        .resolve(&["e^(i pi) + 1 = 0"], OutputFormat::Vector)
                        .unwrap()
                });
            }
        });

        assert_eq!(resolver.compiler().calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.pending_locks(), 0);
    }

    #[test]
    fn test_empty_expression_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = ArtifactResolver::new(
            ResolverConfig::new(tmp.path()),
            RecordingCompiler::default(),
        );
        let lines: [&str; 0] = [];
        let err = resolver.resolve(&lines, OutputFormat::Vector).unwrap_err();
        assert!(matches!(err, TypstMathError::EmptyExpression));
        assert_eq!(resolver.compiler().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failure_policy_warn() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = ArtifactResolver::new(ResolverConfig::new(tmp.path()), FailingCompiler);

        let res = resolver.resolve(&["$"], OutputFormat::Vector).unwrap();
        assert_eq!(res.status, ResolveStatus::Failed);
        assert!(res.warning.unwrap().contains("unclosed delimiter"));
        assert!(!res.artifact_path.exists());
    }

    #[test]
    fn test_failure_policy_ignore() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = ArtifactResolver::new(
            ResolverConfig::new(tmp.path()).on_compile_error(FailurePolicy::Ignore),
            FailingCompiler,
        );

        let res = resolver.resolve(&["$"], OutputFormat::Vector).unwrap();
        assert_eq!(res.status, ResolveStatus::Failed);
        assert_eq!(res.warning, None);
    }

    #[test]
    fn test_failure_policy_error() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = ArtifactResolver::new(
            ResolverConfig::new(tmp.path()).on_compile_error(FailurePolicy::Error),
            FailingCompiler,
        );

        let err = resolver.resolve(&["$"], OutputFormat::Vector).unwrap_err();
        assert!(err.is_compilation());
        assert_eq!(resolver.pending_locks(), 0);
    }

    #[test]
    fn test_missing_compiler_is_fatal_under_every_policy() {
        for policy in [FailurePolicy::Ignore, FailurePolicy::Warn, FailurePolicy::Error] {
            let tmp = tempfile::tempdir().unwrap();
            let resolver = ArtifactResolver::new(
                ResolverConfig::new(tmp.path()).on_compile_error(policy),
                MissingCompiler,
            );
            let err = resolver.resolve(&["x"], OutputFormat::Vector).unwrap_err();
            assert!(err.is_configuration(), "policy {:?}", policy);
        }
    }

    #[test]
    fn test_cache_dir_blocked_by_file() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let resolver = ArtifactResolver::new(
            ResolverConfig::new(blocker.join("cache")),
            RecordingCompiler::default(),
        );

        let err = resolver.resolve(&["x"], OutputFormat::Vector).unwrap_err();
        assert!(err.is_filesystem());
        assert_eq!(resolver.compiler().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_artifact_path_matches_resolve() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = ArtifactResolver::new(
            ResolverConfig::new(tmp.path()),
            RecordingCompiler::default(),
        );
        let planned = resolver.artifact_path(&["x"], OutputFormat::Document).unwrap();
        let res = resolver.resolve(&["x"], OutputFormat::Document).unwrap();
        assert_eq!(planned, res.artifact_path);
    }

    #[test]
    fn test_concrete_uri() {
        let reference = ArtifactReference::for_artifact(Path::new("/c/abc.svg"));
        assert_eq!(reference.uri, PathBuf::from("/c/abc.*"));
        assert_eq!(
            reference.concrete_uri(OutputFormat::Document),
            PathBuf::from("/c/abc.pdf")
        );
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "if_missing".parse::<RecompilePolicy>().unwrap(),
            RecompilePolicy::IfMissing
        );
        assert!("sometimes".parse::<RecompilePolicy>().is_err());
        assert_eq!("warn".parse::<FailurePolicy>().unwrap(), FailurePolicy::Warn);
        assert!("panic".parse::<FailurePolicy>().is_err());
    }
}
