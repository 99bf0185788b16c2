//! Compile facade
//!
//! [compile] is the single entry point: it validates the [CompileOptions], builds the
//! directive table and a fresh [CompileContext], runs the statement parser over the whole
//! source and assembles the resulting fragments into a [CompiledTemplate].
//!
//! All mutable compiler state lives in the [CompileContext] of one call: the scanner
//! position, the operator lookahead cache, the temporary-name counter and the nesting depth.
//! Nothing is shared between calls, so compiling the same source with the same options
//! always yields the same template, and independent compiles may run concurrently.
//!
//! Example:
//!
//! ```rust-example
//! let template = compile("Hello {echo name}!", &CompileOptions::default())?;
//! let out = template.render(&Bindings::new().with("name", "World"))?;
//! assert_eq!(out, "Hello World!");
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use log::debug;
use once_cell::sync::Lazy;

use super::assembling::{assemble, Program};
use super::diagnostics::{CompileError, CompileResult};
use super::expressions::ast::Expr;
use super::expressions::operators::{Operator, OperatorTable, DEFAULT_OPERATORS};
use super::fragments::Fragments;
use super::keywords::{KeywordMatcher, KEYWORDS, RESERVED};
use super::runtime::{self, Bindings, Environment, RenderError};
use super::scanning::{Scanner, IDENTIFIER};
use super::statements::directives::DirectiveTable;
use super::statements::StatementParser;

/// A compiler extension: receives the code of each argument expression and appends
/// fragments in place of the directive.
pub type Handler = Arc<dyn Fn(&mut Fragments, &[Expr]) + Send + Sync>;

/// Default nesting bound for expressions and directive bodies.
pub const DEFAULT_MAX_DEPTH: usize = 32;

#[derive(Clone)]
pub struct CompileOptions {
    pub operator_open: String,
    pub operator_close: String,
    /// Consume one line break right after each directive close.
    pub swallow_newline: bool,
    /// Output functions usable as directives: `{name args}` prints the function's result.
    pub output_functions: BTreeSet<String>,
    /// Compiler extensions by directive name. These win over output functions of the
    /// same name.
    pub directive_handlers: BTreeMap<String, Handler>,
    pub max_depth: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            operator_open: "{".to_string(),
            operator_close: "}".to_string(),
            swallow_newline: true,
            output_functions: BTreeSet::new(),
            directive_handlers: BTreeMap::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl fmt::Debug for CompileOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileOptions")
            .field("operator_open", &self.operator_open)
            .field("operator_close", &self.operator_close)
            .field("swallow_newline", &self.swallow_newline)
            .field("output_functions", &self.output_functions)
            .field(
                "directive_handlers",
                &self.directive_handlers.keys().collect::<Vec<_>>(),
            )
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiters(mut self, open: impl Into<String>, close: impl Into<String>) -> Self {
        self.operator_open = open.into();
        self.operator_close = close.into();
        self
    }

    pub fn with_swallow_newline(mut self, swallow: bool) -> Self {
        self.swallow_newline = swallow;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_output_function(mut self, name: impl Into<String>) -> Self {
        self.register_output_function(name);
        self
    }

    pub fn with_directive<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Fragments, &[Expr]) + Send + Sync + 'static,
    {
        self.register_directive(name, handler);
        self
    }

    pub fn register_output_function(&mut self, name: impl Into<String>) {
        self.output_functions.insert(name.into());
    }

    pub fn register_directive<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&mut Fragments, &[Expr]) + Send + Sync + 'static,
    {
        self.directive_handlers.insert(name.into(), Arc::new(handler));
    }

    /// Names registered through output functions or handlers.
    pub fn registered_names(&self) -> impl Iterator<Item = &str> {
        self.output_functions
            .iter()
            .chain(self.directive_handlers.keys())
            .map(String::as_str)
    }

    fn validate(&self) -> CompileResult<()> {
        let invalid = |message: String| Err(CompileError::at("", 0, message));
        if self.operator_open.is_empty() {
            return invalid("operator-open delimiter must not be empty".to_string());
        }
        if self.operator_close.is_empty() {
            return invalid("operator-close delimiter must not be empty".to_string());
        }
        for name in self.registered_names() {
            let is_identifier = IDENTIFIER
                .find(name)
                .is_some_and(|found| found.end() == name.len());
            if !is_identifier {
                return invalid(format!("`{}` is not a valid directive name", name));
            }
            if KEYWORDS.contains(&name) && !RESERVED.contains(&name) {
                return invalid(format!("`{}` is a built-in directive", name));
            }
        }
        Ok(())
    }
}

/// Per-invocation compiler state, threaded through every parse function.
pub struct CompileContext<'a> {
    pub scanner: Scanner<'a>,
    pub keywords: KeywordMatcher,
    pub operators: &'static OperatorTable,
    pub options: &'a CompileOptions,
    operator_cache: Option<(usize, Option<(Operator, usize)>)>,
    temp_counter: usize,
    depth: usize,
}

impl<'a> CompileContext<'a> {
    pub fn new(source: &'a str, options: &'a CompileOptions, directives: &DirectiveTable) -> Self {
        CompileContext {
            scanner: Scanner::new(source),
            keywords: KeywordMatcher::new(options.operator_open.as_str(), directives.names()),
            operators: Lazy::force(&DEFAULT_OPERATORS),
            options,
            operator_cache: None,
            temp_counter: 0,
            depth: 0,
        }
    }

    /// An error at the current position.
    pub fn error(&self, message: impl Into<String>) -> CompileError {
        self.error_at(self.scanner.position(), message)
    }

    pub fn error_at(&self, offset: usize, message: impl Into<String>) -> CompileError {
        CompileError::at(self.scanner.source(), offset, message)
    }

    /// A fresh temporary variable name, unique within this compile.
    pub fn temp_name(&mut self) -> String {
        self.temp_counter += 1;
        format!("___tplUniqVar{}", self.temp_counter)
    }

    /// True when the operator-close delimiter starts at the current position.
    pub fn at_close(&self) -> bool {
        self.scanner.rest().starts_with(self.options.operator_close.as_str())
    }

    /// Enter one nesting level, failing once `max_depth` is exceeded.
    pub fn enter(&mut self) -> CompileResult<()> {
        if self.depth >= self.options.max_depth {
            return Err(self.error(format!(
                "nesting exceeds the maximum depth of {}",
                self.options.max_depth
            )));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Run `parse` one nesting level deeper.
    pub fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> CompileResult<T>,
    ) -> CompileResult<T> {
        self.enter()?;
        let result = parse(self);
        self.leave();
        result
    }

    pub(crate) fn cached_operator(&self, start: usize) -> Option<Option<(Operator, usize)>> {
        match self.operator_cache {
            Some((cached_start, found)) if cached_start == start => Some(found),
            _ => None,
        }
    }

    pub(crate) fn cache_operator(&mut self, start: usize, found: Option<(Operator, usize)>) {
        self.operator_cache = Some((start, found));
    }
}

/// The artifact of one successful compile.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTemplate {
    fragments: Fragments,
    program: Program,
}

impl CompiledTemplate {
    pub fn fragments(&self) -> &Fragments {
        &self.fragments
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// The reference target-source listing.
    pub fn listing(&self) -> String {
        self.program.to_string()
    }

    pub fn render(&self, bindings: &Bindings) -> Result<String, RenderError> {
        self.render_with(bindings, &Environment::new())
    }

    /// Render with output functions and include resolution from `env`.
    pub fn render_with(
        &self,
        bindings: &Bindings,
        env: &Environment<'_>,
    ) -> Result<String, RenderError> {
        runtime::execute(&self.program, bindings, env)
    }
}

impl fmt::Display for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)
    }
}

/// Compile `source` into a template.
pub fn compile(source: &str, options: &CompileOptions) -> CompileResult<CompiledTemplate> {
    options.validate()?;
    let directives = DirectiveTable::new(options);
    let mut ctx = CompileContext::new(source, options, &directives);
    let fragments = StatementParser::new(&mut ctx, &directives).parse_template()?;
    let program = assemble(&fragments).map_err(|err| {
        CompileError::at(
            source,
            source.len(),
            format!("directive output is malformed: {}", err),
        )
    })?;
    debug!(
        "compiled {} bytes into {} program lines",
        source.len(),
        program.len()
    );
    Ok(CompiledTemplate { fragments, program })
}
