//! Host integration: the `typst-math` directive.
//!
//! A documentation host owns an [`Application`] and calls [`setup`] once to
//! register the directive and its config values. When the host meets a
//! `typst-math` block it calls [`Application::run_directive`] with the block
//! body and receives image nodes plus any diagnostics.
//!
//! ```
//! use typst_math::directive::{setup, Application, BuilderInfo};
//!
//! let mut app = Application::new(BuilderInfo::new("_build/html", "html"));
//! let meta = setup(&mut app);
//! assert!(meta.parallel_read_safe);
//! assert!(app.directive("typst-math").is_some());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::compiler::TypstCompiler;
use crate::config::{
    TypstMathConfig, CONFIG_ON_ERROR, CONFIG_RECOMPILE, CONFIG_TIMEOUT, CONFIG_TYPST,
};
use crate::error::{TypstMathError, TypstMathResult};
use crate::format::OutputFormat;
use crate::resolver::{cache_dir_for, ArtifactReference, ArtifactResolver};

/// Name the directive is registered under.
pub const DIRECTIVE_NAME: &str = "typst-math";

/// Metadata returned from [`setup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtensionMetadata {
    pub version: &'static str,
    pub parallel_read_safe: bool,
    pub parallel_write_safe: bool,
}

/// The host's current builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderInfo {
    /// Build output directory.
    pub out_dir: PathBuf,
    /// Builder format name, e.g. `html` or `pdf`.
    pub format: String,
}

impl BuilderInfo {
    pub fn new(out_dir: impl Into<PathBuf>, format: impl Into<String>) -> Self {
        Self {
            out_dir: out_dir.into(),
            format: format.into(),
        }
    }

    /// Artifact format for this builder.
    pub fn output_format(&self) -> OutputFormat {
        OutputFormat::from_builder_format(&self.format)
    }
}

/// Location of a directive in its source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub path: PathBuf,
    /// 1-based line of the directive start.
    pub line: usize,
}

impl SourceLocation {
    pub fn new(path: impl Into<PathBuf>, line: usize) -> Self {
        Self {
            path: path.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path.display(), self.line)
    }
}

/// A build warning attached to a source location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub location: SourceLocation,
    pub message: String,
}

impl Diagnostic {
    /// Creates a warning.
    pub fn warning(location: SourceLocation, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: WARNING: {}", self.location, self.message)
    }
}

/// Document node produced by a directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Image(ArtifactReference),
}

/// Nodes and diagnostics produced by one directive run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectiveOutput {
    pub nodes: Vec<Node>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Registered config values and their current settings.
#[derive(Debug, Clone, Default)]
pub struct ConfigRegistry {
    values: BTreeMap<String, ConfigEntry>,
}

#[derive(Debug, Clone)]
struct ConfigEntry {
    default: Value,
    value: Option<Value>,
}

impl ConfigRegistry {
    /// Effective value: the explicit setting, else the default.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .get(name)
            .map(|e| e.value.as_ref().unwrap_or(&e.default))
    }

    /// Explicit setting only.
    pub fn explicit(&self, name: &str) -> Option<&Value> {
        self.values.get(name).and_then(|e| e.value.as_ref())
    }

    /// Names of all registered values.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Everything a directive sees when it runs.
#[derive(Debug, Clone, Copy)]
pub struct DirectiveContext<'a> {
    /// Body lines, verbatim.
    pub content: &'a [String],
    pub location: &'a SourceLocation,
    pub builder: &'a BuilderInfo,
    pub config: &'a ConfigRegistry,
}

/// A block directive.
pub trait Directive: Send + Sync {
    /// Whether the directive takes a body.
    fn has_content(&self) -> bool;

    /// Runs the directive for one occurrence.
    fn run(&self, ctx: &DirectiveContext<'_>) -> TypstMathResult<DirectiveOutput>;
}

/// Handle to the host application.
pub struct Application {
    builder: BuilderInfo,
    directives: BTreeMap<String, Arc<dyn Directive>>,
    config: ConfigRegistry,
}

impl Application {
    /// Creates an application for the given builder.
    pub fn new(builder: BuilderInfo) -> Self {
        Self {
            builder,
            directives: BTreeMap::new(),
            config: ConfigRegistry::default(),
        }
    }

    /// Returns the builder.
    pub fn builder(&self) -> &BuilderInfo {
        &self.builder
    }

    /// Returns the config registry.
    pub fn config(&self) -> &ConfigRegistry {
        &self.config
    }

    /// Registers a directive, replacing any previous one of the same name.
    pub fn add_directive(&mut self, name: impl Into<String>, directive: Arc<dyn Directive>) {
        self.directives.insert(name.into(), directive);
    }

    /// Looks up a directive.
    pub fn directive(&self, name: &str) -> Option<Arc<dyn Directive>> {
        self.directives.get(name).cloned()
    }

    /// Registers a config value with its default. Re-registering keeps an
    /// explicit setting made in between.
    pub fn add_config_value(&mut self, name: impl Into<String>, default: Value) {
        let name = name.into();
        let value = self.config.values.get(&name).and_then(|e| e.value.clone());
        self.config
            .values
            .insert(name, ConfigEntry { default, value });
    }

    /// Sets a registered config value.
    pub fn set_config(&mut self, name: &str, value: Value) -> TypstMathResult<()> {
        let entry = self
            .config
            .values
            .get_mut(name)
            .ok_or_else(|| TypstMathError::invalid_config(name, "unknown config value"))?;
        entry.value = Some(value);
        Ok(())
    }

    /// Runs a registered directive.
    pub fn run_directive(
        &self,
        name: &str,
        content: &[String],
        location: &SourceLocation,
    ) -> TypstMathResult<DirectiveOutput> {
        let directive = self
            .directives
            .get(name)
            .ok_or_else(|| TypstMathError::UnknownDirective {
                name: name.to_string(),
            })?;
        let ctx = DirectiveContext {
            content,
            location,
            builder: &self.builder,
            config: &self.config,
        };
        directive.run(&ctx)
    }
}

/// Registers the `typst-math` directive and its config values.
///
/// Call once per application. Calling again replaces the directive and keeps
/// explicitly set config values.
pub fn setup(app: &mut Application) -> ExtensionMetadata {
    app.add_directive(DIRECTIVE_NAME, Arc::new(TypstMathDirective::new()));

    let defaults = TypstMathConfig::default();
    app.add_config_value(CONFIG_TYPST, Value::from(defaults.typst));
    app.add_config_value(
        CONFIG_RECOMPILE,
        serde_json::to_value(defaults.recompile).unwrap_or(Value::Null),
    );
    app.add_config_value(
        CONFIG_ON_ERROR,
        serde_json::to_value(defaults.on_compile_error).unwrap_or(Value::Null),
    );
    app.add_config_value(CONFIG_TIMEOUT, Value::from(defaults.timeout_secs));

    ExtensionMetadata {
        version: env!("CARGO_PKG_VERSION"),
        parallel_read_safe: true,
        parallel_write_safe: true,
    }
}

type SharedResolver = Arc<ArtifactResolver<TypstCompiler>>;

/// Renders its body as Typst math and emits one centered image node.
#[derive(Default)]
pub struct TypstMathDirective {
    resolver: Mutex<Option<(PathBuf, TypstMathConfig, SharedResolver)>>,
}

impl TypstMathDirective {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the effective config: defaults, then the environment, then
    /// values set explicitly on the host.
    fn effective_config(&self, registry: &ConfigRegistry) -> TypstMathResult<TypstMathConfig> {
        let mut config = TypstMathConfig::default().with_env_overrides();
        for name in [CONFIG_TYPST, CONFIG_RECOMPILE, CONFIG_ON_ERROR, CONFIG_TIMEOUT] {
            if let Some(value) = registry.explicit(name) {
                config.set_value(name, value)?;
            }
        }
        Ok(config)
    }

    /// Reuses the resolver across runs while cache dir and config are
    /// unchanged, so concurrent runs share per-key locking.
    fn resolver_for(&self, out_dir: &Path, config: &TypstMathConfig) -> SharedResolver {
        let cache_dir = cache_dir_for(out_dir);
        let mut slot = self.resolver.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((dir, cfg, resolver)) = slot.as_ref() {
            if *dir == cache_dir && cfg == config {
                return Arc::clone(resolver);
            }
        }
        let resolver = Arc::new(ArtifactResolver::new(
            config.resolver_config(&cache_dir),
            TypstCompiler::with_config(config.compiler_config()),
        ));
        *slot = Some((cache_dir, config.clone(), Arc::clone(&resolver)));
        resolver
    }
}

impl Directive for TypstMathDirective {
    fn has_content(&self) -> bool {
        true
    }

    fn run(&self, ctx: &DirectiveContext<'_>) -> TypstMathResult<DirectiveOutput> {
        if ctx.content.is_empty() {
            return Ok(DirectiveOutput {
                nodes: Vec::new(),
                diagnostics: vec![Diagnostic::warning(
                    ctx.location.clone(),
                    format!("typst-math: {}", TypstMathError::EmptyExpression),
                )],
            });
        }

        let config = self.effective_config(ctx.config)?;
        let resolver = self.resolver_for(&ctx.builder.out_dir, &config);
        let resolution = resolver.resolve(ctx.content, ctx.builder.output_format())?;

        let mut output = DirectiveOutput {
            nodes: vec![Node::Image(resolution.reference)],
            diagnostics: Vec::new(),
        };
        if let Some(warning) = resolution.warning {
            tracing::warn!(location = %ctx.location, "{}", warning);
            output.diagnostics.push(Diagnostic::warning(
                ctx.location.clone(),
                format!("typst-math: {}", warning),
            ));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_setup_registers_directive_and_config() {
        let mut app = Application::new(BuilderInfo::new("/tmp/out", "html"));
        let meta = setup(&mut app);

        assert_eq!(meta.version, env!("CARGO_PKG_VERSION"));
        assert!(meta.parallel_read_safe);
        assert!(meta.parallel_write_safe);

        let directive = app.directive(DIRECTIVE_NAME).unwrap();
        assert!(directive.has_content());

        assert_eq!(app.config().get(CONFIG_TYPST), Some(&json!("typst")));
        assert_eq!(app.config().explicit(CONFIG_TYPST), None);
        assert_eq!(app.config().get(CONFIG_RECOMPILE), Some(&json!("always")));
        assert_eq!(app.config().get(CONFIG_ON_ERROR), Some(&json!("warn")));
        assert_eq!(app.config().get(CONFIG_TIMEOUT), Some(&json!(60)));
    }

    #[test]
    fn test_setup_twice_keeps_explicit_values() {
        let mut app = Application::new(BuilderInfo::new("/tmp/out", "html"));
        setup(&mut app);
        app.set_config(CONFIG_TYPST, json!("/opt/typst")).unwrap();
        setup(&mut app);
        assert_eq!(app.config().get(CONFIG_TYPST), Some(&json!("/opt/typst")));
        assert_eq!(app.config().names().count(), 4);
    }

    #[test]
    fn test_set_unknown_config_fails() {
        let mut app = Application::new(BuilderInfo::new("/tmp/out", "html"));
        setup(&mut app);
        assert!(app.set_config("typst_math_color", json!("red")).is_err());
    }

    #[test]
    fn test_run_unknown_directive() {
        let app = Application::new(BuilderInfo::new("/tmp/out", "html"));
        let err = app
            .run_directive("math", &[], &SourceLocation::new("index.md", 1))
            .unwrap_err();
        assert!(matches!(err, TypstMathError::UnknownDirective { .. }));
    }

    #[test]
    fn test_missing_compiler_is_configuration_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut app = Application::new(BuilderInfo::new(tmp.path(), "html"));
        setup(&mut app);
        app.set_config(CONFIG_TYPST, json!("typst-math-definitely-not-installed"))
            .unwrap();

        let err = app
            .run_directive(
                DIRECTIVE_NAME,
                &["x".to_string()],
                &SourceLocation::new("index.md", 3),
            )
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(cache_dir_for(tmp.path()).is_dir());
    }

    #[test]
    fn test_effective_config_invalid_value() {
        let mut app = Application::new(BuilderInfo::new("/tmp/out", "html"));
        setup(&mut app);
        app.set_config(CONFIG_RECOMPILE, json!("sometimes")).unwrap();

        let directive = TypstMathDirective::new();
        let err = directive.effective_config(app.config()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_resolver_reused_for_same_config() {
        let directive = TypstMathDirective::new();
        let config = TypstMathConfig::default();
        let a = directive.resolver_for(Path::new("/tmp/out"), &config);
        let b = directive.resolver_for(Path::new("/tmp/out"), &config);
        assert!(Arc::ptr_eq(&a, &b));

        let c = directive.resolver_for(Path::new("/tmp/other"), &config);
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_empty_body_warns_without_nodes() {
        let mut app = Application::new(BuilderInfo::new("/tmp/out", "html"));
        setup(&mut app);
        let output = app
            .run_directive(DIRECTIVE_NAME, &[], &SourceLocation::new("index.md", 5))
            .unwrap();
        assert!(output.nodes.is_empty());
        assert_eq!(output.diagnostics.len(), 1);
        assert!(output.diagnostics[0].message.contains("no content"));
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::warning(SourceLocation::new("docs/index.md", 12), "bad math");
        assert_eq!(diag.to_string(), "docs/index.md:12: WARNING: bad math");
    }

    #[test]
    fn test_node_serialization() {
        let node = Node::Image(ArtifactReference::for_artifact(Path::new("/c/abc.svg")));
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], json!("image"));
        assert_eq!(value["uri"], json!("/c/abc.*"));
        assert_eq!(value["classes"], json!(["typst-math"]));
        assert_eq!(value["align"], json!("center"));
    }
}
