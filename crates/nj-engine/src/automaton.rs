// SPDX-License-Identifier: MIT OR Apache-2.0
//! The bytecode interpreter over the structural stream.
//!
//! Each opcode has a handler that scans structural characters and reacts to
//! the byte found at each position. Handlers share three control verbs:
//! `advance` pushes the current registers and moves to the next instruction,
//! `back` pops them (terminating the query when the stack is empty), and
//! `abort` pushes the current position back onto the stream before `back`,
//! for tokens that also belong to the parent state.
//!
//! Depth bookkeeping: a handler is "at query depth" when the JSON nesting
//! depth it observes equals the instruction's precomputed query depth. A
//! fresh open/wildcard handler starts one below and enters; everything else
//! runs at query depth and tracks nested containers up and down.

use nj_core::error::EngineError;
use nj_core::result::ResultSet;
use nj_index::pipeline::StructuralStream;
use nj_query::{Op, Program};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    ip: usize,
    container: Container,
    depth: usize,
    matched_key: bool,
    array_pos: usize,
}

enum Flow {
    Continue,
    Done,
}

/// Single-threaded interpreter state.
pub(crate) struct Automaton<'a> {
    program: &'a Program,
    doc: &'a [u8],
    stream: &'a mut StructuralStream,
    results: ResultSet,
    ip: usize,
    depth: usize,
    container: Container,
    matched_key: bool,
    array_pos: usize,
    stack: Vec<Frame>,
}

impl<'a> Automaton<'a> {
    pub(crate) fn new(
        program: &'a Program,
        doc: &'a [u8],
        stream: &'a mut StructuralStream,
    ) -> Self {
        Self {
            program,
            doc,
            stream,
            results: ResultSet::new(),
            ip: 0,
            depth: 0,
            container: Container::Object,
            matched_key: false,
            array_pos: 0,
            stack: Vec::new(),
        }
    }

    /// Execute the program to completion.
    pub(crate) fn run(mut self) -> Result<ResultSet, EngineError> {
        loop {
            let flow = match self.program.op(self.ip) {
                Op::OpenObject => self.open_container(Container::Object)?,
                Op::OpenArray => self.open_container(Container::Array)?,
                Op::FindKey(_) => self.find_key()?,
                Op::FindIndex(n) => {
                    let lo = *n;
                    self.find_in_range(lo, lo + 1)?
                }
                Op::FindRange(a, b) => {
                    let (lo, hi) = (*a, *b);
                    self.find_in_range(lo, hi)?
                }
                Op::Wildcard => self.wildcard()?,
                Op::RecordResult => self.record_result()?,
            };
            if let Flow::Done = flow {
                return Ok(self.results);
            }
        }
    }

    // ---- stream access ------------------------------------------------

    fn pull(&mut self) -> Option<(u32, u8)> {
        self.stream
            .next_structural()
            .map(|pos| (pos, self.doc.get(pos as usize).copied().unwrap_or(b' ')))
    }

    /// End of the structural stream: benign exactly when nothing is left to
    /// unwind.
    fn end_of_input(&self) -> Result<Flow, EngineError> {
        if self.stack.is_empty() {
            Ok(Flow::Done)
        } else {
            Err(EngineError::UnexpectedEndOfInput)
        }
    }

    // ---- control verbs ------------------------------------------------

    fn advance(&mut self) -> Flow {
        self.stack.push(Frame {
            ip: self.ip,
            container: self.container,
            depth: self.depth,
            matched_key: self.matched_key,
            array_pos: self.array_pos,
        });
        self.ip += 1;
        Flow::Continue
    }

    /// Advance, handing `pos` to the next state as its first structural.
    fn advance_with(&mut self, pos: u32) -> Flow {
        self.stream.put_back(pos);
        self.advance()
    }

    fn back(&mut self) -> Flow {
        match self.stack.pop() {
            Some(frame) => {
                self.ip = frame.ip;
                self.container = frame.container;
                self.depth = frame.depth;
                self.matched_key = frame.matched_key;
                self.array_pos = frame.array_pos;
                Flow::Continue
            }
            None => Flow::Done,
        }
    }

    fn abort(&mut self, pos: u32) -> Flow {
        self.stream.put_back(pos);
        self.back()
    }

    fn enter(&mut self, kind: Container) {
        self.depth += 1;
        self.container = kind;
        self.matched_key = false;
        self.array_pos = 0;
    }

    fn exit(&mut self) {
        self.depth -= 1;
    }

    /// Tail-skip: consume forward to the close of the container `level`
    /// levels above the current scan point and return its position.
    fn skip_to_close(&mut self, mut level: usize) -> Result<u32, EngineError> {
        loop {
            let Some((pos, ch)) = self.pull() else {
                return Err(EngineError::UnexpectedEndOfInput);
            };
            match ch {
                b'{' | b'[' => level += 1,
                b'}' | b']' => {
                    if level == 0 {
                        return Ok(pos);
                    }
                    level -= 1;
                }
                _ => {}
            }
        }
    }

    // ---- handlers -----------------------------------------------------

    /// `OpenObject` / `OpenArray`: position the automaton inside the
    /// expected container kind.
    fn open_container(&mut self, expected: Container) -> Result<Flow, EngineError> {
        let qd = self.program.depth(self.ip);
        loop {
            let Some((pos, ch)) = self.pull() else {
                return self.end_of_input();
            };
            match ch {
                b'{' | b'[' => {
                    let observed = if ch == b'{' {
                        Container::Object
                    } else {
                        Container::Array
                    };
                    self.enter(observed);
                    if observed == expected {
                        // An index selector needs the opening bracket too:
                        // it marks element 0.
                        return Ok(
                            if expected == Container::Array && self.next_op_is_index_selector() {
                                self.advance_with(pos)
                            } else {
                                self.advance()
                            },
                        );
                    }
                    // Wrong kind: the value cannot match, skip it whole.
                    self.skip_to_close(0)?;
                    self.exit();
                    return Ok(self.back());
                }
                b'}' | b']' => {
                    if self.depth == qd {
                        self.exit();
                        return Ok(self.back());
                    }
                    if self.depth + 1 == qd {
                        // The surrounding scope closed before the expected
                        // container appeared; its owner consumes this.
                        return Ok(self.abort(pos));
                    }
                    return Err(EngineError::UnbalancedStructures(u64::from(pos)));
                }
                b',' => {
                    // No container in this member/element; the parent may
                    // treat the comma as the start of the next element.
                    return Ok(self.abort(pos));
                }
                b':' => {
                    if self.depth == qd {
                        return Err(EngineError::UnexpectedColon(u64::from(pos)));
                    }
                    // The selector that matched handed its colon down.
                }
                _ => {}
            }
        }
    }

    /// `FindKey`: scan the current object for the member with this key.
    fn find_key(&mut self) -> Result<Flow, EngineError> {
        let program = self.program;
        let Op::FindKey(key) = program.op(self.ip) else {
            unreachable!("find_key dispatched on a FindKey instruction")
        };
        let key = key.as_bytes();
        let qd = program.depth(self.ip);
        let mut entering = true;
        loop {
            let Some((pos, ch)) = self.pull() else {
                return self.end_of_input();
            };
            if entering && self.matched_key && !matches!(ch, b'}' | b']') {
                // The matched member's value is recorded and keys are
                // unique: nothing else in this object can match. Skip to
                // its close and let the parent state exit the scope.
                let level = usize::from(matches!(ch, b'{' | b'['));
                let close = self.skip_to_close(level)?;
                return Ok(self.abort(close));
            }
            entering = false;
            match ch {
                b':' if self.depth == qd => {
                    if self.key_matches(key, pos) {
                        self.matched_key = true;
                        // The next state positions itself on the value via
                        // this colon.
                        return Ok(self.advance_with(pos));
                    }
                }
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    if self.depth == qd {
                        // Object ends without a further match.
                        return Ok(self.abort(pos));
                    }
                    self.depth -= 1;
                }
                _ => {} // member separators and nested colons
            }
        }
    }

    /// `FindIndex` / `FindRange`: select array elements with index in
    /// `lo..hi`.
    fn find_in_range(&mut self, lo: usize, hi: usize) -> Result<Flow, EngineError> {
        let qd = self.program.depth(self.ip);
        let record_next = matches!(self.program.op(self.ip + 1), Op::RecordResult);
        let mut entering = true;
        loop {
            let Some((pos, ch)) = self.pull() else {
                return self.end_of_input();
            };
            match ch {
                b'[' if entering && self.depth == qd => {
                    // The opening bracket, handed down by OpenArray, marks
                    // element 0.
                    self.array_pos = 0;
                    if lo == 0 {
                        return Ok(if record_next {
                            self.advance_with(pos)
                        } else {
                            self.advance()
                        });
                    }
                }
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    if self.depth == qd {
                        return Ok(self.abort(pos));
                    }
                    self.depth -= 1;
                }
                b',' if self.depth == qd => {
                    // This comma opens the next element.
                    self.array_pos += 1;
                    if self.array_pos >= hi {
                        // Past the range; nothing further can match.
                        let close = self.skip_to_close(0)?;
                        return Ok(self.abort(close));
                    }
                    if self.array_pos >= lo {
                        return Ok(if record_next {
                            self.advance_with(pos)
                        } else {
                            self.advance()
                        });
                    }
                }
                b':' if self.depth == qd => {
                    return Err(EngineError::UnexpectedColon(u64::from(pos)));
                }
                _ => {}
            }
            entering = false;
        }
    }

    /// `Wildcard`: recurse into every child of the current container.
    fn wildcard(&mut self) -> Result<Flow, EngineError> {
        let qd = self.program.depth(self.ip);
        let record_next = matches!(self.program.op(self.ip + 1), Op::RecordResult);
        loop {
            let Some((pos, ch)) = self.pull() else {
                return self.end_of_input();
            };
            match ch {
                b'{' if self.depth + 1 == qd => {
                    // Member colons drive the iteration; advance happens
                    // per-colon below.
                    self.enter(Container::Object);
                }
                b'[' if self.depth + 1 == qd => {
                    self.enter(Container::Array);
                    // Hand the bracket to the recorder so the first
                    // element's span starts right after it.
                    return Ok(if record_next {
                        self.advance_with(pos)
                    } else {
                        self.advance()
                    });
                }
                b':' if self.depth == qd && self.container == Container::Object => {
                    // Positioned at a member value.
                    return Ok(self.advance_with(pos));
                }
                b':' if self.depth == qd => {
                    return Err(EngineError::UnexpectedColon(u64::from(pos)));
                }
                b',' if self.depth == qd && self.container == Container::Array => {
                    return Ok(if record_next {
                        self.advance_with(pos)
                    } else {
                        self.advance()
                    });
                }
                b',' if self.depth + 1 == qd => {
                    // The selected member was a scalar; it has no children.
                    return Ok(self.abort(pos));
                }
                b'}' | b']' if self.depth == qd => {
                    self.exit();
                    return Ok(self.back());
                }
                b'}' | b']' if self.depth + 1 == qd => {
                    return Ok(self.abort(pos));
                }
                _ => {} // handed-down colons, object member separators
            }
        }
    }

    /// `RecordResult`: emit the span of the current value.
    fn record_result(&mut self) -> Result<Flow, EngineError> {
        let program = self.program;
        let qd = program.depth(self.ip);
        let prev = self.ip.checked_sub(1).map(|i| program.op(i));
        let prev_is_index = matches!(prev, Some(Op::FindIndex(_) | Op::FindRange(_, _)));
        let prev_is_wildcard = matches!(prev, Some(Op::Wildcard));

        let Some((start_pos, _)) = self.pull() else {
            return self.end_of_input();
        };
        let mut start = start_pos;
        loop {
            let Some((pos, ch)) = self.pull() else {
                return self.end_of_input();
            };
            match ch {
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    if self.depth == qd {
                        self.emit(start, pos);
                        return Ok(self.abort(pos));
                    }
                    self.depth -= 1;
                }
                b',' if self.depth == qd => {
                    self.emit(start, pos);
                    if prev_is_index {
                        // The index selector counts elements off this comma.
                        return Ok(self.abort(pos));
                    }
                    if prev_is_wildcard && self.container == Container::Array {
                        // Stream sibling elements without unwinding.
                        start = pos;
                        continue;
                    }
                    return Ok(self.back());
                }
                _ => {} // nested colons and separators
            }
        }
    }

    // ---- helpers ------------------------------------------------------

    fn next_op_is_index_selector(&self) -> bool {
        matches!(
            self.program.op(self.ip + 1),
            Op::FindIndex(_) | Op::FindRange(_, _)
        )
    }

    /// Verify that the key string immediately left of `colon` equals `key`,
    /// enclosed in unescaped quotes.
    fn key_matches(&self, key: &[u8], colon: u32) -> bool {
        let colon = colon as usize;
        let mut end = colon;
        while end > 0 && self.doc[end - 1].is_ascii_whitespace() {
            end -= 1;
        }
        if end == 0 || self.doc[end - 1] != b'"' {
            return false;
        }
        let quote_end = end - 1;
        let Some(start) = quote_end.checked_sub(key.len()) else {
            return false;
        };
        if start == 0 || self.doc[start - 1] != b'"' {
            return false;
        }
        if &self.doc[start..quote_end] != key {
            return false;
        }
        // The opening quote must not be escaped.
        let mut backslashes = 0;
        let mut i = start - 1;
        while i > 0 && self.doc[i - 1] == b'\\' {
            backslashes += 1;
            i -= 1;
        }
        backslashes % 2 == 0
    }

    /// Record the value between two structurals, trimmed of surrounding
    /// whitespace. Nothing is recorded when the region is empty.
    fn emit(&mut self, start: u32, end_structural: u32) {
        let mut lo = start as usize + 1;
        let mut hi = end_structural as usize;
        while lo < hi && self.doc[lo].is_ascii_whitespace() {
            lo += 1;
        }
        while hi > lo && self.doc[hi - 1].is_ascii_whitespace() {
            hi -= 1;
        }
        if lo < hi {
            self.results.record(lo, hi - 1);
        }
    }
}
