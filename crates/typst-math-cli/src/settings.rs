//! Configuration loading for CLI commands.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use typst_math::{FailurePolicy, RecompilePolicy, TypstMathConfig};

/// Config file and override flags shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// JSON config file (fields: typst, recompile, on_compile_error, timeout_secs)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Typst executable name or path (default: typst, or $TYPST_MATH_TYPST)
    #[arg(long, global = true)]
    pub typst: Option<String>,

    /// When to run typst: always, if_missing
    #[arg(long, global = true)]
    pub recompile: Option<RecompilePolicy>,

    /// How compile failures are reported: ignore, warn, error
    #[arg(long, global = true)]
    pub on_error: Option<FailurePolicy>,

    /// Compile timeout in seconds (0 disables)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

impl ConfigArgs {
    /// Resolves the effective configuration: defaults, config file,
    /// environment, then flags.
    pub fn load(&self) -> Result<TypstMathConfig> {
        let config = match &self.config {
            Some(path) => TypstMathConfig::from_file(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?,
            None => TypstMathConfig::default(),
        };
        Ok(self.apply(config.with_env_overrides()))
    }

    fn apply(&self, mut config: TypstMathConfig) -> TypstMathConfig {
        if let Some(typst) = &self.typst {
            config.typst = typst.clone();
        }
        if let Some(recompile) = self.recompile {
            config.recompile = recompile;
        }
        if let Some(on_error) = self.on_error {
            config.on_compile_error = on_error;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flags_override_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("typst-math.json");
        std::fs::write(
            &path,
            r#"{"typst": "typst-file", "recompile": "if_missing", "timeout_secs": 9}"#,
        )
        .unwrap();

        let args = ConfigArgs {
            config: Some(path),
            typst: Some("typst-flag".to_string()),
            timeout: Some(0),
            ..Default::default()
        };
        let config = args.load().unwrap();

        assert_eq!(config.typst, "typst-flag");
        assert_eq!(config.recompile, RecompilePolicy::IfMissing);
        assert_eq!(config.timeout_secs, 0);
    }

    #[test]
    fn test_missing_config_file() {
        let args = ConfigArgs {
            config: Some(PathBuf::from("/definitely/not/here.json")),
            ..Default::default()
        };
        let err = args.load().unwrap_err();
        assert!(err.to_string().contains("Failed to load config file"));
    }
}
