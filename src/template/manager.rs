//! Named templates with compile caching
//!
//! A [TemplateManager] loads template sources by name from a [TemplateSource], compiles
//! them with its [CompileOptions] and keeps the compiled form until the source reports a
//! newer modification stamp. Output functions registered on the manager are available to
//! every template it renders, and `{include}` resolves through the same manager with the
//! including template's variables.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::UNIX_EPOCH;

use log::debug;
use thiserror::Error;

use super::compiler::{compile, CompileOptions, CompiledTemplate};
use super::diagnostics::CompileError;
use super::fragments::Fragments;
use super::expressions::ast::Expr;
use super::runtime::{Bindings, Environment, Function, Includer, RenderError, Value};

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template `{0}` not found")]
    NotFound(String),
    #[error("invalid template name `{0}`")]
    InvalidName(String),
    #[error("failed to read template `{name}`: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to compile template `{name}`: {source}")]
    Compile {
        name: String,
        #[source]
        source: CompileError,
    },
    #[error("failed to render template `{name}`: {source}")]
    Render {
        name: String,
        #[source]
        source: RenderError,
    },
}

/// Where template sources come from.
pub trait TemplateSource {
    fn source(&self, name: &str) -> Result<String, TemplateError>;

    /// A stamp that grows whenever the source of `name` changes.
    fn modified(&self, name: &str) -> Result<u128, TemplateError>;
}

/// Templates stored as files below a root directory.
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileSource { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names are relative paths without `..` or root components.
    fn path(&self, name: &str) -> Result<PathBuf, TemplateError> {
        let relative = Path::new(name);
        let plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if name.is_empty() || !plain {
            return Err(TemplateError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn io_error(name: &str, source: io::Error) -> TemplateError {
        if source.kind() == io::ErrorKind::NotFound {
            TemplateError::NotFound(name.to_string())
        } else {
            TemplateError::Io {
                name: name.to_string(),
                source,
            }
        }
    }
}

impl TemplateSource for FileSource {
    fn source(&self, name: &str) -> Result<String, TemplateError> {
        let path = self.path(name)?;
        fs::read_to_string(path).map_err(|err| Self::io_error(name, err))
    }

    fn modified(&self, name: &str) -> Result<u128, TemplateError> {
        let path = self.path(name)?;
        let modified = fs::metadata(path)
            .and_then(|metadata| metadata.modified())
            .map_err(|err| Self::io_error(name, err))?;
        Ok(modified
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or(0))
    }
}

/// Templates held in memory. Every insert bumps a revision counter.
#[derive(Debug, Default)]
pub struct MemorySource {
    templates: Mutex<HashMap<String, (u128, String)>>,
    revision: AtomicU64,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&self, name: impl Into<String>, source: impl Into<String>) {
        let revision = u128::from(self.revision.fetch_add(1, Ordering::SeqCst) + 1);
        self.templates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), (revision, source.into()));
    }

    fn entry(&self, name: &str) -> Result<(u128, String), TemplateError> {
        self.templates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }
}

impl TemplateSource for MemorySource {
    fn source(&self, name: &str) -> Result<String, TemplateError> {
        self.entry(name).map(|(_, source)| source)
    }

    fn modified(&self, name: &str) -> Result<u128, TemplateError> {
        self.entry(name).map(|(revision, _)| revision)
    }
}

struct Cached {
    stamp: u128,
    template: Arc<CompiledTemplate>,
}

pub struct TemplateManager<S> {
    source: S,
    options: CompileOptions,
    functions: BTreeMap<String, Function>,
    cache: Mutex<HashMap<String, Cached>>,
}

impl<S: TemplateSource> TemplateManager<S> {
    pub fn new(source: S) -> Self {
        TemplateManager {
            source,
            options: CompileOptions::default(),
            functions: BTreeMap::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the compile options. Registered functions and directives stay registered
    /// unless `options` brings a handler of the same name.
    pub fn with_options(mut self, mut options: CompileOptions) -> Self {
        options
            .output_functions
            .extend(self.functions.keys().cloned());
        for (name, handler) in &self.options.directive_handlers {
            options
                .directive_handlers
                .entry(name.clone())
                .or_insert_with(|| Arc::clone(handler));
        }
        self.options = options;
        self.invalidate();
        self
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Register an output function: `{name args...}` prints its result.
    pub fn register_function<F>(&mut self, name: impl Into<String>, body: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Value, RenderError> + Send + Sync + 'static,
    {
        let name = name.into();
        self.options.register_output_function(name.clone());
        self.functions.insert(name, Function::new(body));
        self.invalidate();
        self
    }

    /// Register a compile-time directive handler. Handlers take precedence over output
    /// functions of the same name.
    pub fn register_directive<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&mut Fragments, &[Expr]) + Send + Sync + 'static,
    {
        self.options.register_directive(name, handler);
        self.invalidate();
        self
    }

    /// Drop every cached compile.
    pub fn invalidate(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// The compiled form of `name`, recompiled when its source is newer than the cache.
    pub fn compile(&self, name: &str) -> Result<Arc<CompiledTemplate>, TemplateError> {
        let stamp = self.source.modified(name)?;
        {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = cache.get(name) {
                if cached.stamp >= stamp {
                    return Ok(cached.template.clone());
                }
            }
        }

        debug!("compiling template `{}`", name);
        let text = self.source.source(name)?;
        let template = compile(&text, &self.options).map_err(|source| TemplateError::Compile {
            name: name.to_string(),
            source,
        })?;
        let template = Arc::new(template);
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                name.to_string(),
                Cached {
                    stamp,
                    template: template.clone(),
                },
            );
        Ok(template)
    }

    pub fn render(&self, name: &str, bindings: &Bindings) -> Result<String, TemplateError> {
        self.render_at(name, bindings, 0)
    }

    fn render_at(
        &self,
        name: &str,
        bindings: &Bindings,
        depth: usize,
    ) -> Result<String, TemplateError> {
        let template = self.compile(name)?;
        let env = Environment::new()
            .with_functions(&self.functions)
            .with_includer(self, depth);
        template
            .render_with(bindings, &env)
            .map_err(|source| TemplateError::Render {
                name: name.to_string(),
                source,
            })
    }
}

impl<S: TemplateSource> Includer for TemplateManager<S> {
    fn include(&self, name: &str, bindings: &Bindings, depth: usize) -> Result<String, RenderError> {
        self.render_at(name, bindings, depth).map_err(|err| match err {
            // Nested include failures pass through unchanged.
            TemplateError::Render {
                source: source @ (RenderError::IncludeDepth(_) | RenderError::Include { .. }),
                ..
            } => source,
            other => RenderError::Include {
                name: name.to_string(),
                message: other.to_string(),
            },
        })
    }
}
