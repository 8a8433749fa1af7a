//! Crate-wide error taxonomy.
//!
//! Mirrors the categories laid out for the original engine: resource
//! exhaustion, malformed input, unresolved references and runtime
//! evaluation failures are all distinct variants so callers (in
//! particular the NACM engine) can tell "this PCB never compiled" apart
//! from "this PCB compiled but the document didn't have the node".
//! Authorisation decisions are never represented as errors - a deny is a
//! normal [`crate::nacm::Decision`].

use thiserror::Error;

/// A source position used for tokenizer and parser error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("{pos}: unterminated quoted string")]
    UnterminatedString { pos: Position },

    #[error("{pos}: unterminated comment")]
    UnterminatedComment { pos: Position },

    #[error("{pos}: quoted string exceeds 65535 bytes after concatenation")]
    StringTooLong { pos: Position },

    #[error("{pos}: invalid number literal {literal:?}")]
    InvalidNumber { pos: Position, literal: String },

    #[error("{pos}: invalid identifier {literal:?}")]
    InvalidIdentifier { pos: Position, literal: String },

    #[error("{pos}: invalid escape sequence in quoted string")]
    InvalidEscape { pos: Position },

    #[error("{pos}: unexpected character {ch:?}")]
    UnexpectedChar { pos: Position, ch: char },

    #[error("{pos}: empty token chain cannot be re-tokenized")]
    EmptyRetokenize { pos: Position },
}

#[derive(Debug, Error)]
pub enum SchemaNodeidError {
    #[error("unknown prefix {prefix:?} while resolving {path_so_far:?}")]
    UnknownPrefix { prefix: String, path_so_far: String },

    #[error("no such child {step:?} while resolving {path_so_far:?}")]
    NoSuchChild { step: String, path_so_far: String },

    #[error("step {step:?} in {path_so_far:?} resolves to an augment clone, not the original")]
    AugmentClone { step: String, path_so_far: String },

    #[error("invalid step identifier {step:?} in {path_so_far:?}")]
    InvalidStep { step: String, path_so_far: String },

    #[error("empty path")]
    EmptyPath,
}

#[derive(Debug, Error)]
pub enum XPathError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    SchemaNodeid(#[from] SchemaNodeidError),

    #[error("unknown function {name:?}")]
    UnknownFunction { name: String },

    #[error("function {name:?} expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        name: String,
        expected: String,
        actual: usize,
    },

    #[error("unresolved prefix {prefix:?}")]
    UnresolvedPrefix { prefix: String },

    #[error("unresolved variable ${name}")]
    UnresolvedVariable { name: String },

    #[error("malformed expression: {reason}")]
    MalformedExpression { reason: String },

    #[error("missing schema node for step {step:?}")]
    MissingSchemaNode { step: String },

    #[error("missing value node for step {step:?}")]
    MissingValueNode { step: String },

    #[error("cannot evaluate: earlier phase failed")]
    PhaseGated,

    #[error("type error: {reason}")]
    TypeError { reason: String },
}

#[derive(Debug, Error)]
pub enum NacmError {
    #[error(transparent)]
    XPath(#[from] XPathError),

    #[error("out of memory building {what}")]
    OutOfMemory { what: &'static str },

    #[error("malformed /nacm configuration: {reason}")]
    MalformedConfig { reason: String },

    #[error(transparent)]
    Xml(#[from] XmlIngestError),
}

#[derive(Debug, Error)]
pub enum XmlIngestError {
    #[error("XML parsing failed: {0}")]
    Xml(String),

    #[error("invalid rule effect {0:?}")]
    InvalidEffect(String),

    #[error("invalid operation {0:?}")]
    InvalidOperation(String),
}

#[derive(Debug, Error)]
pub enum RunstackError {
    #[error("script nesting depth exceeded (max {max})")]
    NestingTooDeep { max: u32 },

    #[error("unmatched 'end' for {kind} block")]
    UnmatchedEnd { kind: &'static str },

    #[error("'{keyword}' outside of a matching block")]
    StrayKeyword { keyword: &'static str },

    #[error("loop exceeded its maximum iteration count ({max})")]
    IterationCapExceeded { max: u32 },

    #[error(transparent)]
    XPath(#[from] XPathError),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Top-level error aggregating every layer, for callers (CLI, integration
/// tests) that just want one `Result` type.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    SchemaNodeid(#[from] SchemaNodeidError),
    #[error(transparent)]
    XPath(#[from] XPathError),
    #[error(transparent)]
    Nacm(#[from] NacmError),
    #[error(transparent)]
    Runstack(#[from] RunstackError),
}
