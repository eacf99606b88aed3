// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types shared across the nj workspace.

use thiserror::Error;

/// Result alias used throughout the workspace.
pub type Result<T, E = NjError> = std::result::Result<T, E>;

/// Errors raised while lexing, parsing, or compiling a JSONPath query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The query does not begin with the root selector `$`.
    #[error("query should start with root ($)")]
    MissingRoot,
    /// An unexpected character was found while lexing.
    #[error("unexpected character '{ch}' at {pos}")]
    UnexpectedCharacter {
        /// Offending character.
        ch: char,
        /// Byte offset into the query string.
        pos: usize,
    },
    /// An unexpected token was found while parsing.
    #[error("unexpected {kind} token at {pos}")]
    UnexpectedToken {
        /// Human-readable token kind.
        kind: &'static str,
        /// Byte offset into the query string.
        pos: usize,
    },
    /// The query ended in the middle of a segment.
    #[error("unexpected end of query")]
    UnexpectedEnd,
    /// A numeric selector did not fit in an index.
    #[error("invalid number '{text}' at {pos}")]
    InvalidNumber {
        /// The raw number text.
        text: String,
        /// Byte offset into the query string.
        pos: usize,
    },
    /// A slice selector with an empty range, e.g. `[3:3]`.
    #[error("empty range [{start}:{end}]")]
    EmptyRange {
        /// Range start (inclusive).
        start: usize,
        /// Range end (exclusive).
        end: usize,
    },
    /// A segment kind the bytecode compiler cannot express.
    #[error("unsupported segment: {0}")]
    UnsupportedSegment(&'static str),
}

/// Internal invariant violations in the structural indexer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexerError {
    /// A structural position did not fit in 32 bits.
    #[error("structural position {0} exceeds the 32-bit index range")]
    PositionOverflow(u64),
    /// More structural characters than chunk bytes; the index is corrupt.
    #[error("structural count {count} overflows chunk capacity {capacity}")]
    CountOverflow {
        /// Number of structural characters produced.
        count: usize,
        /// Maximum the chunk can hold.
        capacity: usize,
    },
    /// The indexer worker disappeared without finishing.
    #[error("indexer worker terminated unexpectedly")]
    WorkerLost,
}

/// Fatal errors raised by the query automaton.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The structural stream ended while a handler still needed input.
    #[error("unexpected end of input")]
    UnexpectedEndOfInput,
    /// A colon appeared where no object member can be.
    #[error("unexpected ':' at byte {0}")]
    UnexpectedColon(u64),
    /// Open and close brackets did not balance.
    #[error("unbalanced structural characters at byte {0}")]
    UnbalancedStructures(u64),
    /// The document failed a basic well-formedness check.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    /// The document was empty.
    #[error("empty document")]
    EmptyDocument,
    /// The bytecode program was empty or did not end in a record step.
    #[error("invalid program: {0}")]
    InvalidProgram(&'static str),
    /// The engine configuration was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Top-level error type surfaced by the engine and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NjError {
    /// Query front-end failure.
    #[error(transparent)]
    Query(#[from] QueryError),
    /// Indexer invariant violation.
    #[error(transparent)]
    Indexer(#[from] IndexerError),
    /// Automaton failure.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_error_display() {
        let err = QueryError::UnexpectedCharacter { ch: '!', pos: 3 };
        assert_eq!(err.to_string(), "unexpected character '!' at 3");
    }

    #[test]
    fn engine_error_wraps_into_nj_error() {
        let err: NjError = EngineError::UnexpectedEndOfInput.into();
        assert_eq!(err.to_string(), "unexpected end of input");
    }
}
