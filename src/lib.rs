//! # stencil
//!
//! A compiler for a small template directive language.
//!
//! Template source mixes literal content with directives bracketed by a configurable
//! delimiter pair (`{` and `}` by default):
//!
//! ```text
//! Hello {echo name}!
//! {for items key value}{echo key}={echo value}
//! {else}nothing to list
//! {endfor}
//! ```
//!
//! Compiling a template produces a [CompiledTemplate](template::compiler::CompiledTemplate):
//! a flat program that can be rendered against [Bindings](template::runtime::Bindings), or
//! lowered to its reference source listing.
//!
//! File Layout
//!
//!     src/template
//!       ├── scanning       Position-tracked anchored matching over the source
//!       ├── keywords       Directive keyword recognition
//!       ├── expressions    Leveled operator-precedence expression parser
//!       ├── statements     Recursive-descent directive parser and directive table
//!       ├── fragments      Typed code fragments produced while parsing
//!       ├── assembling     Fragment linearization into a program
//!       ├── diagnostics    Positional compile errors
//!       ├── compiler       The compile facade and per-invocation context
//!       ├── runtime        Values, bindings and program execution
//!       ├── manager        Named templates, caching and includes
//!       └── testing        Fluent helpers for tests
//!
//! For testing guidelines, see the [testing module](template::testing).

pub mod template;

pub use template::compiler::{compile, CompileOptions, CompiledTemplate};
pub use template::diagnostics::CompileError;
pub use template::runtime::{Bindings, Environment, RenderError, Value};
