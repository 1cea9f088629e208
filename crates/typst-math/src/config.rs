//! Extension configuration.
//!
//! Values come from, in increasing precedence: built-in defaults, a JSON
//! config file, the `TYPST_MATH_TYPST` environment variable, and explicit
//! overrides by the caller (CLI flags or host config values).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::compiler::{CompilerConfig, DEFAULT_PROGRAM, DEFAULT_TIMEOUT_SECS};
use crate::error::{TypstMathError, TypstMathResult};
use crate::resolver::{FailurePolicy, RecompilePolicy, ResolverConfig};

/// Environment variable overriding the compiler program.
pub const TYPST_ENV: &str = "TYPST_MATH_TYPST";

/// Config value name for the compiler program.
pub const CONFIG_TYPST: &str = "typst_math_typst";
/// Config value name for the recompile policy.
pub const CONFIG_RECOMPILE: &str = "typst_math_recompile";
/// Config value name for the failure policy.
pub const CONFIG_ON_ERROR: &str = "typst_math_on_error";
/// Config value name for the compile timeout in seconds.
pub const CONFIG_TIMEOUT: &str = "typst_math_timeout";

/// Settings for the typst-math extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TypstMathConfig {
    /// Program name or path of the typst executable.
    pub typst: String,
    /// When to invoke the compiler.
    pub recompile: RecompilePolicy,
    /// How compile failures are surfaced.
    pub on_compile_error: FailurePolicy,
    /// Timeout per compilation in seconds. Zero disables the timeout.
    pub timeout_secs: u64,
}

impl Default for TypstMathConfig {
    fn default() -> Self {
        Self {
            typst: DEFAULT_PROGRAM.to_string(),
            recompile: RecompilePolicy::default(),
            on_compile_error: FailurePolicy::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl TypstMathConfig {
    /// Parses a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> TypstMathResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| TypstMathError::invalid_config("config", e.to_string()))
    }

    /// Loads a config from a JSON file.
    pub fn from_file(path: &Path) -> TypstMathResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Applies the `TYPST_MATH_TYPST` environment override, if set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(program) = std::env::var(TYPST_ENV) {
            if !program.is_empty() {
                self.typst = program;
            }
        }
        self
    }

    /// Sets one value by its host config name.
    pub fn set_value(&mut self, name: &str, value: &serde_json::Value) -> TypstMathResult<()> {
        let as_str = move || {
            value
                .as_str()
                .ok_or_else(|| TypstMathError::invalid_config(name, "expected a string"))
        };
        match name {
            CONFIG_TYPST => self.typst = as_str()?.to_string(),
            CONFIG_RECOMPILE => self.recompile = as_str()?.parse()?,
            CONFIG_ON_ERROR => self.on_compile_error = as_str()?.parse()?,
            CONFIG_TIMEOUT => {
                self.timeout_secs = value.as_u64().ok_or_else(|| {
                    TypstMathError::invalid_config(name, "expected a non-negative integer")
                })?
            }
            _ => return Err(TypstMathError::invalid_config(name, "unknown config value")),
        }
        Ok(())
    }

    /// Returns the compile timeout, `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Builds the compiler configuration.
    pub fn compiler_config(&self) -> CompilerConfig {
        CompilerConfig::with_program(&self.typst).timeout(self.timeout())
    }

    /// Builds the resolver configuration for a cache directory.
    pub fn resolver_config(&self, cache_dir: &Path) -> ResolverConfig {
        ResolverConfig::new(cache_dir)
            .recompile(self.recompile)
            .on_compile_error(self.on_compile_error)
    }
}
