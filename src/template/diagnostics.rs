//! Positional compile errors
//!
//! Every failure while compiling a template is fatal and is reported as a single
//! [CompileError]. There is no recovery and no multi-error collection: the first
//! required construct that cannot be matched ends the compile.
//!
//! The error carries the codepoint offset of the failure together with a 1-based
//! line and column and a two-line snippet: the offending source line and a caret
//! aligned under the failing position.
//!
//! ```text
//! line 1, column 9: expected directive close
//! {if x > }
//!         ^
//! ```

use thiserror::Error;

/// A fatal compile error positioned in the template source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}, column {column}: {message}\n{snippet}")]
pub struct CompileError {
    pub message: String,
    /// Codepoint offset into the source.
    pub offset: usize,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column, counted in codepoints.
    pub column: usize,
    /// The source line followed by a caret line.
    pub snippet: String,
}

/// Result alias used throughout the compiler.
pub type CompileResult<T> = Result<T, CompileError>;

impl CompileError {
    /// Build an error for `byte_offset` in `source`.
    ///
    /// Offsets past the end are clamped to the end of the source, and offsets that
    /// fall inside a multi-byte character are moved back to its start.
    pub fn at(source: &str, byte_offset: usize, message: impl Into<String>) -> Self {
        let mut offset = byte_offset.min(source.len());
        while !source.is_char_boundary(offset) {
            offset -= 1;
        }

        let before = &source[..offset];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_end = source[offset..]
            .find('\n')
            .map(|i| offset + i)
            .unwrap_or(source.len());

        let line_text = source[line_start..line_end].trim_end_matches('\r');
        let prefix = &source[line_start..offset];
        let caret: String = prefix
            .chars()
            .map(|c| if c == '\t' { '\t' } else { ' ' })
            .chain(std::iter::once('^'))
            .collect();

        CompileError {
            message: message.into(),
            offset: before.chars().count(),
            line,
            column: prefix.chars().count() + 1,
            snippet: format!("{}\n{}", line_text, caret),
        }
    }
}
