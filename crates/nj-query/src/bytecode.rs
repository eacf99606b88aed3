// SPDX-License-Identifier: MIT OR Apache-2.0
//! Compilation of parsed queries into the linear bytecode the automaton
//! interprets.

use nj_core::error::QueryError;

use crate::parser::{Query, Segment};

/// One bytecode instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Expect the cursor to be positioned at a `{`.
    OpenObject,
    /// Expect the cursor to be positioned at a `[`.
    OpenArray,
    /// Locate the member of the current object with this key.
    FindKey(String),
    /// Locate the array element at this index.
    FindIndex(usize),
    /// Locate each array element with index in the half-open range.
    FindRange(usize, usize),
    /// Recurse into every child of the current container.
    Wildcard,
    /// Emit the span of the current value.
    RecordResult,
}

impl Op {
    /// Whether this instruction opens one level of JSON nesting.
    #[must_use]
    pub const fn opens_depth(&self) -> bool {
        matches!(self, Self::OpenObject | Self::OpenArray | Self::Wildcard)
    }
}

/// A compiled program: the instruction list plus each instruction's query
/// depth (the JSON nesting depth at which it operates).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    ops: Vec<Op>,
    depths: Vec<usize>,
}

impl Program {
    /// Compile a parsed query.
    ///
    /// Every `Member` becomes `OpenObject; FindKey`, every `Index`/`Range`
    /// becomes `OpenArray; FindIndex`/`FindRange`, and a single
    /// `RecordResult` terminates the program.
    ///
    /// # Errors
    ///
    /// `Descendant` segments are not expressible in the bytecode.
    pub fn compile(query: &Query) -> Result<Self, QueryError> {
        let mut ops = Vec::with_capacity(query.segments.len() * 2 + 1);
        for segment in &query.segments {
            match segment {
                Segment::Member(name) => {
                    ops.push(Op::OpenObject);
                    ops.push(Op::FindKey(name.clone()));
                }
                Segment::Index(n) => {
                    ops.push(Op::OpenArray);
                    ops.push(Op::FindIndex(*n));
                }
                Segment::Range(a, b) => {
                    ops.push(Op::OpenArray);
                    ops.push(Op::FindRange(*a, *b));
                }
                Segment::Wildcard => ops.push(Op::Wildcard),
                Segment::Descendant(_) => {
                    return Err(QueryError::UnsupportedSegment("descendant"));
                }
            }
        }
        ops.push(Op::RecordResult);

        let mut depths = Vec::with_capacity(ops.len());
        let mut depth = 0;
        for op in &ops {
            if op.opens_depth() {
                depth += 1;
            }
            depths.push(depth);
        }

        Ok(Self { ops, depths })
    }

    /// The instruction list.
    #[must_use]
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// The instruction at `ip`.
    #[must_use]
    pub fn op(&self, ip: usize) -> &Op {
        &self.ops[ip]
    }

    /// The query depth of the instruction at `ip`.
    #[must_use]
    pub fn depth(&self, ip: usize) -> usize {
        self.depths[ip]
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// A compiled program always holds at least `RecordResult`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Whether the program is well-formed for execution.
    #[must_use]
    pub fn ends_with_record(&self) -> bool {
        self.ops.last() == Some(&Op::RecordResult)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(input: &str) -> Program {
        Program::compile(&Query::parse(input).unwrap()).unwrap()
    }

    #[test]
    fn member_compiles_to_open_and_find() {
        let program = compile("$.a.b");
        assert_eq!(
            program.ops(),
            [
                Op::OpenObject,
                Op::FindKey("a".into()),
                Op::OpenObject,
                Op::FindKey("b".into()),
                Op::RecordResult,
            ]
        );
    }

    #[test]
    fn index_and_range_compile_to_open_array() {
        let program = compile("$.a[1].b[2:5]");
        assert_eq!(
            program.ops(),
            [
                Op::OpenObject,
                Op::FindKey("a".into()),
                Op::OpenArray,
                Op::FindIndex(1),
                Op::OpenObject,
                Op::FindKey("b".into()),
                Op::OpenArray,
                Op::FindRange(2, 5),
                Op::RecordResult,
            ]
        );
    }

    #[test]
    fn query_depths_count_opening_instructions() {
        let program = compile("$.a.b[1]");
        // OpenObject FindKey OpenObject FindKey OpenArray FindIndex Record
        assert_eq!(
            (0..program.len()).map(|i| program.depth(i)).collect::<Vec<_>>(),
            [1, 1, 2, 2, 3, 3, 3]
        );
    }

    #[test]
    fn wildcard_opens_depth() {
        let program = compile("$.items[*].v");
        assert_eq!(
            program.ops(),
            [
                Op::OpenObject,
                Op::FindKey("items".into()),
                Op::Wildcard,
                Op::OpenObject,
                Op::FindKey("v".into()),
                Op::RecordResult,
            ]
        );
        assert_eq!(
            (0..program.len()).map(|i| program.depth(i)).collect::<Vec<_>>(),
            [1, 1, 2, 3, 3, 3]
        );
    }

    #[test]
    fn bare_root_compiles_to_single_record() {
        let program = compile("$");
        assert_eq!(program.ops(), [Op::RecordResult]);
        assert!(program.ends_with_record());
    }

    #[test]
    fn descendants_are_rejected() {
        let query = Query::parse("$..decl.name").unwrap();
        assert_eq!(
            Program::compile(&query),
            Err(QueryError::UnsupportedSegment("descendant"))
        );
    }
}
