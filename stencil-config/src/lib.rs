//! Shared configuration loader for the stencil toolchain.
//!
//! `defaults/stencil.default.toml` is embedded into every binary so that docs and
//! runtime behavior stay in sync. Applications layer user-specific files on top
//! of those defaults via [`Loader`] before deserializing into [`StencilConfig`].

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, ValueKind};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use stencil::CompileOptions;

const DEFAULT_TOML: &str = include_str!("../defaults/stencil.default.toml");

/// Top-level configuration consumed by stencil applications.
#[derive(Debug, Clone, Deserialize)]
pub struct StencilConfig {
    pub syntax: SyntaxConfig,
    pub limits: LimitsConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
}

/// Directive delimiters.
#[derive(Debug, Clone, Deserialize)]
pub struct SyntaxConfig {
    pub operator_open: String,
    pub operator_close: String,
    pub swallow_newline: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    pub max_depth: usize,
}

/// Where named templates live. Without a root, the CLI reads a template path as given
/// and resolves its includes next to it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplatesConfig {
    pub root: Option<PathBuf>,
}

impl StencilConfig {
    /// Compile options matching the syntax and limits sections.
    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions::default()
            .with_delimiters(
                self.syntax.operator_open.clone(),
                self.syntax.operator_close.clone(),
            )
            .with_swallow_newline(self.syntax.swallow_newline)
            .with_max_depth(self.limits.max_depth)
    }
}

/// Helper for layering user overrides over the built-in defaults.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    /// Start a loader seeded with the embedded defaults.
    pub fn new() -> Self {
        let builder = Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Self { builder }
    }

    /// Layer a configuration file. Missing files trigger an error.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(true);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer an optional configuration file (ignored if the file is absent).
    pub fn with_optional_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(false);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Apply a single key/value override (useful for CLI settings).
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Finalize the builder and deserialize the resulting configuration.
    pub fn build(self) -> Result<StencilConfig, ConfigError> {
        self.builder.build()?.try_deserialize()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for callers that only need the defaults.
pub fn load_defaults() -> Result<StencilConfig, ConfigError> {
    Loader::new().build()
}
