//! Testing utilities for template rendering
//!
//! # Writing Template Tests
//!
//! Most template behavior is easiest to state as "this source, with these variables,
//! renders exactly this text" or "this source fails with this message". Spelling that out
//! by hand means compiling, building bindings, wiring an environment and unwrapping at
//! every step, which buries the one line that matters.
//!
//! Use [render_case](fn@render_case) instead:
//!
//! ```rust-example
//! use crate::template::testing::render_case;
//!
//! render_case("Hello {echo name}!")
//!     .bind("name", "World")
//!     .renders("Hello World!");
//!
//! render_case("{if x}open")
//!     .fails_with("expected one of `{endif}`, `{elif}`, `{else}`");
//! ```
//!
//! ## Output functions
//!
//! `.function(name, body)` registers the name as an output function for the compile and
//! makes the body available at render time, in one call:
//!
//! ```rust-example
//! render_case("{upper name}")
//!     .bind("name", "ann")
//!     .function("upper", |args| Ok(Value::from(args[0].to_key().to_uppercase())))
//!     .renders("ANN");
//! ```
//!
//! ## Failures
//!
//! `.fails_with` accepts either a compile or a render failure and compares the bare
//! message, without position or snippet. Use [CompileError] fields directly when the
//! position is what the test is about.
//!
//! [CompileError]: crate::template::diagnostics::CompileError

use super::compiler::{compile, CompileOptions, CompiledTemplate};
use super::diagnostics::CompileResult;
use super::runtime::{Bindings, Environment, RenderError, Value};

/// Start a render test for `source`.
pub fn render_case(source: &str) -> RenderCase {
    RenderCase {
        source: source.to_string(),
        options: CompileOptions::default(),
        bindings: Bindings::new(),
        environment: Environment::new(),
    }
}

pub struct RenderCase {
    source: String,
    options: CompileOptions,
    bindings: Bindings,
    environment: Environment<'static>,
}

impl RenderCase {
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.bindings.insert(name, value);
        self
    }

    /// Bind every entry of a JSON object.
    pub fn bind_json(mut self, json: &str) -> Self {
        let bindings = match Bindings::from_json(json) {
            Ok(bindings) => bindings,
            Err(err) => panic!("invalid JSON bindings {:?}: {}", json, err),
        };
        for (name, value) in bindings.iter() {
            self.bindings.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn function<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, RenderError> + Send + Sync + 'static,
    {
        self.options.register_output_function(name);
        self.environment = self.environment.with_function(name, body);
        self
    }

    pub fn compile(&self) -> CompileResult<CompiledTemplate> {
        compile(&self.source, &self.options)
    }

    pub fn render(&self) -> Result<String, String> {
        let template = self.compile().map_err(|err| err.message)?;
        template
            .render_with(&self.bindings, &self.environment)
            .map_err(|err| err.to_string())
    }

    /// Assert the case renders exactly `expected`.
    #[track_caller]
    pub fn renders(self, expected: &str) {
        match self.render() {
            Ok(output) => assert_eq!(
                output, expected,
                "unexpected output for template {:?}",
                self.source
            ),
            Err(message) => panic!(
                "template {:?} failed to render: {}",
                self.source, message
            ),
        }
    }

    /// Assert the case fails to compile or render with `message`.
    #[track_caller]
    pub fn fails_with(self, message: &str) {
        match self.render() {
            Ok(output) => panic!(
                "template {:?} rendered {:?}, expected failure {:?}",
                self.source, output, message
            ),
            Err(actual) => assert_eq!(
                actual, message,
                "unexpected failure for template {:?}",
                self.source
            ),
        }
    }
}
