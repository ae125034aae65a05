/*! Emits VM code from regexp ASTs.

The [`CodeEmitter`] visits the AST in post-order, producing an
[`InstructionBuffer`] for each node out of the buffers already produced for
its children. While the code is being built, jump offsets are expressed in
number of lines (instructions) relative to the line that follows the jump,
and calls to token subroutines refer to the token key. Once all the nodes
have been visited, the subroutines are appended after the main code, calls
are resolved, and the buffer is printed as bytecode. Line offsets are
converted to byte offsets at that point.

The code for each token is placed in a subroutine that is called from the
main code:

```text
  JSR token_subroutine
  ACCEPT key
  RTS
  ...
token_subroutine:
  BEGIN_GROUP 0
  <token regexp>
  END_GROUP 0
  CONSUME
  RTS
```

Tokens that are referenced from other tokens with `{name}` are called with
`JSR` too. Tokens marked as subroutine-only have a subroutine, but they are
not part of the top-level alternation.
*/

use std::fmt::{Display, Formatter};

use log::*;
use rustc_hash::FxHashMap;

use crate::re::ast::{Ast, NodeId, NodeKind, Operator, Repetition};
use crate::re::bytecode::Bytecode;
use crate::re::instr::{ByteOrder, Instr};
use crate::re::intervals::Interval;
use crate::re::{Error, TokenKey};

/// Maximum number of instructions in the code emitted for an AST. Nested
/// bounded repetitions multiply the size of their operands, this limit
/// keeps them from exhausting the memory.
pub const MAX_CODE_LINES: usize = 1 << 20;

/// Gives the emitter access to the properties of each token.
pub trait TokenTable {
    /// Returns whether the token can only be used as a subroutine by other
    /// tokens, or `None` if the token doesn't exist.
    fn is_subroutine_only(&self, key: TokenKey) -> Option<bool>;
}

impl<F> TokenTable for F
where
    F: Fn(TokenKey) -> Option<bool>,
{
    fn is_subroutine_only(&self, key: TokenKey) -> Option<bool> {
        self(key)
    }
}

/// Target of a subroutine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsrTarget {
    /// The subroutine of a token, not yet placed in the code.
    Token(TokenKey),
    /// Index of the first line of the subroutine.
    Line(usize),
}

/// An instruction whose jump offsets are expressed in lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    Bra(isize),
    Jsr(JsrTarget),
    Rts,
    Accept(TokenKey),
    Fork { prioritized: bool, goto: isize, new_thread: isize },
    Skip,
    Consume,
    BeginGroup(u8),
    EndGroup(u8),
    TestCode(u32),
    TestRange(u32),
    TestRanges(u32),
}

impl Line {
    fn opcode(&self) -> u8 {
        match self {
            Self::Bra(_) => Instr::BRA,
            Self::Jsr(_) => Instr::JSR,
            Self::Rts => Instr::RTS,
            Self::Accept(_) => Instr::ACCEPT,
            Self::Fork { prioritized: false, .. } => Instr::FORK,
            Self::Fork { prioritized: true, .. } => Instr::PFORK,
            Self::Skip => Instr::SKIP,
            Self::Consume => Instr::CONSUME,
            Self::BeginGroup(_) => Instr::BEGIN_GROUP,
            Self::EndGroup(_) => Instr::END_GROUP,
            Self::TestCode(_) => Instr::TEST_CODE,
            Self::TestRange(_) => Instr::TEST_RANGE,
            Self::TestRanges(_) => Instr::TEST_RANGES,
        }
    }

    /// Size in bytes of the encoded instruction.
    pub fn size(&self) -> usize {
        Instr::size_of(self.opcode()).unwrap_or(1)
    }
}

impl Display for Line {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mnemonic = Instr::mnemonic(self.opcode()).unwrap_or("???");
        write!(f, "{}", mnemonic)?;
        match self {
            Self::Bra(offset) => write!(f, " {:+}", offset),
            Self::Jsr(JsrTarget::Token(key)) => write!(f, " <token {}>", key),
            Self::Jsr(JsrTarget::Line(line)) => write!(f, " @{}", line),
            Self::Fork { goto, new_thread, .. } => {
                write!(f, " {:+} {:+}", goto, new_thread)
            }
            Self::Accept(value)
            | Self::TestCode(value)
            | Self::TestRange(value)
            | Self::TestRanges(value) => write!(f, " {}", value),
            Self::BeginGroup(index) | Self::EndGroup(index) => {
                write!(f, " {}", index)
            }
            Self::Rts | Self::Skip | Self::Consume => Ok(()),
        }
    }
}

/// A sequence of instruction lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionBuffer {
    lines: Vec<Line>,
}

impl InstructionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer with room for `capacity` lines.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { lines: Vec::with_capacity(capacity) }
    }

    /// Number of lines in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[inline]
    pub fn lines(&self) -> &[Line] {
        self.lines.as_slice()
    }

    /// Appends a line at the end of the buffer.
    #[inline]
    pub fn put(&mut self, line: Line) {
        self.lines.push(line)
    }

    /// Appends a copy of the lines in `other`.
    pub fn append(&mut self, other: &InstructionBuffer) {
        self.lines.extend_from_slice(other.lines.as_slice())
    }

    /// Appends the lines in `other`, consuming it.
    pub fn consume(&mut self, other: InstructionBuffer) {
        self.lines.extend(other.lines)
    }

    /// Size in bytes of the encoded lines.
    pub fn byte_len(&self) -> usize {
        self.lines.iter().map(|line| line.size()).sum()
    }

    /// Encodes the lines, converting offsets expressed in lines into offsets
    /// expressed in bytes, and line indexes into addresses.
    pub fn print(&self, byte_order: ByteOrder) -> Result<Vec<u8>, Error> {
        // addrs[i] is the address of line i, the last item is the size of
        // the whole code.
        let mut addrs = Vec::with_capacity(self.lines.len() + 1);
        let mut addr = 0;
        for line in self.lines.iter() {
            addrs.push(addr);
            addr += line.size();
        }
        addrs.push(addr);

        let mut code = Vec::with_capacity(addr);

        for (i, line) in self.lines.iter().enumerate() {
            let instr = match *line {
                Line::Bra(offset) => {
                    Instr::Bra(byte_offset(&addrs, i, offset)?)
                }
                Line::Jsr(JsrTarget::Line(target)) => {
                    let addr = addrs.get(target).ok_or(
                        Error::MalformedAst("call target outside of the code"),
                    )?;
                    Instr::Jsr(u32::try_from(*addr).map_err(|_| Error::TooLarge)?)
                }
                Line::Jsr(JsrTarget::Token(key)) => {
                    return Err(Error::UnresolvedSubroutine(key))
                }
                Line::Rts => Instr::Rts,
                Line::Accept(key) => Instr::Accept(key),
                Line::Fork { prioritized, goto, new_thread } => {
                    let goto = byte_offset(&addrs, i, goto)?;
                    let new_thread = byte_offset(&addrs, i, new_thread)?;
                    if prioritized {
                        Instr::PFork { goto, new_thread }
                    } else {
                        Instr::Fork { goto, new_thread }
                    }
                }
                Line::Skip => Instr::Skip,
                Line::Consume => Instr::Consume,
                Line::BeginGroup(index) => Instr::BeginGroup(index),
                Line::EndGroup(index) => Instr::EndGroup(index),
                Line::TestCode(c) => Instr::TestCode(c),
                Line::TestRange(index) => Instr::TestRange(index),
                Line::TestRanges(index) => Instr::TestRanges(index),
            };
            instr.encode(byte_order, &mut code);
        }

        Ok(code)
    }
}

/// Converts an offset in lines, relative to the line that follows line `i`,
/// into an offset in bytes relative to the address that follows line `i`.
fn byte_offset(addrs: &[usize], i: usize, lines: isize) -> Result<i16, Error> {
    let target = (i as isize + 1 + lines) as usize;
    let target_addr = addrs
        .get(target)
        .ok_or(Error::MalformedAst("branch target outside of the code"))?;
    let offset = *target_addr as isize - addrs[i + 1] as isize;
    i16::try_from(offset).map_err(|_| Error::TooLarge)
}

impl From<Vec<Line>> for InstructionBuffer {
    fn from(lines: Vec<Line>) -> Self {
        Self { lines }
    }
}

impl Display for InstructionBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        for (i, line) in self.lines.iter().enumerate() {
            writeln!(f, "{:4}: {}", i, line)?;
        }
        Ok(())
    }
}

/// Produces [`Bytecode`] from an AST.
#[derive(Debug, Default)]
pub struct CodeEmitter {
    byte_order: ByteOrder,
    intervals: Vec<Interval>,
    interval_index: FxHashMap<Interval, u32>,
    interval_sets: Vec<Vec<u32>>,
    interval_set_index: FxHashMap<Vec<u32>, u32>,
    subroutines: Vec<(TokenKey, InstructionBuffer)>,
}

impl CodeEmitter {
    /// Creates a new emitter that produces little-endian code.
    pub fn new() -> Self {
        Self::default()
    }

    /// Specifies whether multi-byte operands are encoded in little-endian
    /// (the default) or big-endian.
    pub fn little_endian(mut self, yes: bool) -> Self {
        self.byte_order = ByteOrder::from_little_endian(yes);
        self
    }

    /// Emits the code for the tree rooted at `root`.
    ///
    /// `tokens` must contain every token referenced by `Accept` and
    /// `TokenExpressionCall` nodes in the tree.
    pub fn emit_code<T>(
        &mut self,
        ast: &Ast,
        root: NodeId,
        tokens: &T,
    ) -> Result<Bytecode, Error>
    where
        T: TokenTable + ?Sized,
    {
        let buffer = self.emit_lines(ast, root, tokens)?;
        let code = buffer.print(self.byte_order)?;

        debug!(
            "emitted {} lines ({} bytes), {} intervals, {} interval sets",
            buffer.len(),
            code.len(),
            self.intervals.len(),
            self.interval_sets.len()
        );

        self.interval_index.clear();
        self.interval_set_index.clear();

        Ok(Bytecode::new(
            std::mem::take(&mut self.intervals),
            std::mem::take(&mut self.interval_sets),
            self.byte_order,
            code,
        ))
    }

    /// Same as [`CodeEmitter::emit_code`], but returns the linked
    /// instruction lines before they are encoded.
    pub fn emit_lines<T>(
        &mut self,
        ast: &Ast,
        root: NodeId,
        tokens: &T,
    ) -> Result<InstructionBuffer, Error>
    where
        T: TokenTable + ?Sized,
    {
        self.intervals.clear();
        self.interval_index.clear();
        self.interval_sets.clear();
        self.interval_set_index.clear();
        self.subroutines.clear();

        let mut code: Vec<Option<InstructionBuffer>> = vec![None; ast.len()];

        for id in ast.postfix(root) {
            let mut children = Vec::with_capacity(ast.child_count(id));
            for child in ast.children(id) {
                children.push(code[child.index()].take().ok_or(
                    Error::MalformedAst("node visited before its children"),
                )?);
            }

            let mut buffer = match ast.kind(id) {
                NodeKind::Terminal(intervals) => {
                    self.visit_terminal(intervals)?
                }
                NodeKind::Operator(op) => {
                    self.visit_operator(ast, id, op, children, tokens)?
                }
            };

            if ast.is_group_root(id) {
                let mut group = InstructionBuffer::new();
                group.put(Line::BeginGroup(0));
                group.consume(buffer);
                group.put(Line::EndGroup(0));
                buffer = group;
            }

            if buffer.len() > MAX_CODE_LINES {
                return Err(Error::TooLarge);
            }

            code[id.index()] = Some(buffer);
        }

        let mut main = code[root.index()]
            .take()
            .ok_or(Error::MalformedAst("no code for the root node"))?;

        self.link(&mut main)?;

        Ok(main)
    }

    fn visit_terminal(
        &mut self,
        intervals: &[Interval],
    ) -> Result<InstructionBuffer, Error> {
        let line = match intervals {
            [] => return Err(Error::EmptyTerminal),
            [interval] if interval.is_single() => {
                Line::TestCode(interval.min())
            }
            [interval] => Line::TestRange(self.intern_interval(*interval)?),
            _ => {
                let set = intervals
                    .iter()
                    .map(|interval| self.intern_interval(*interval))
                    .collect::<Result<Vec<_>, _>>()?;
                Line::TestRanges(self.intern_interval_set(set)?)
            }
        };
        Ok(InstructionBuffer::from(vec![line]))
    }

    fn visit_operator<T>(
        &mut self,
        ast: &Ast,
        id: NodeId,
        op: &Operator,
        children: Vec<InstructionBuffer>,
        tokens: &T,
    ) -> Result<InstructionBuffer, Error>
    where
        T: TokenTable + ?Sized,
    {
        let buffer = match op {
            Operator::Concatenation => {
                let mut buffer = InstructionBuffer::new();
                for child in children {
                    buffer.consume(child);
                }
                buffer
            }
            Operator::Alternation => alternation(children, true),
            Operator::Repetition(rep) => {
                let [child] = <[_; 1]>::try_from(children).map_err(|_| {
                    Error::MalformedAst("repetition must have one operand")
                })?;
                repetition(child, rep)?
            }
            Operator::TokenExpressionCall(key) => {
                InstructionBuffer::from(vec![Line::Jsr(JsrTarget::Token(
                    *key,
                ))])
            }
            Operator::Accept(key) => {
                let [child] = <[_; 1]>::try_from(children).map_err(|_| {
                    Error::MalformedAst("accept must have one operand")
                })?;
                self.create_subroutine(*key, child)?;
                InstructionBuffer::from(vec![
                    Line::Jsr(JsrTarget::Token(*key)),
                    Line::Accept(*key),
                    Line::Rts,
                ])
            }
            Operator::RegexAlternation => {
                let mut included = Vec::with_capacity(children.len());
                for (child_id, child) in ast.children(id).iter().zip(children)
                {
                    let Some(Operator::Accept(key)) = ast.operator(*child_id)
                    else {
                        return Err(Error::MalformedAst(
                            "operands of regex alternation must be accepts",
                        ));
                    };
                    match tokens.is_subroutine_only(*key) {
                        Some(true) => {}
                        Some(false) => included.push(child),
                        None => return Err(Error::UnknownToken(*key)),
                    }
                }
                if included.is_empty() {
                    InstructionBuffer::from(vec![Line::Rts])
                } else {
                    alternation(included, false)
                }
            }
        };
        Ok(buffer)
    }

    /// Creates the subroutine that matches the regexp of a token.
    fn create_subroutine(
        &mut self,
        key: TokenKey,
        code: InstructionBuffer,
    ) -> Result<(), Error> {
        let mut subroutine = InstructionBuffer::new();
        subroutine.put(Line::BeginGroup(0));
        subroutine.consume(code);
        subroutine.put(Line::EndGroup(0));
        label_groups(&mut subroutine)?;
        subroutine.put(Line::Consume);
        subroutine.put(Line::Rts);
        self.subroutines.push((key, subroutine));
        Ok(())
    }

    /// Appends the subroutines after the main code, and resolves the calls
    /// to them.
    fn link(&mut self, main: &mut InstructionBuffer) -> Result<(), Error> {
        let mut starts = FxHashMap::default();

        for (key, subroutine) in self.subroutines.drain(..) {
            starts.insert(key, main.len());
            main.consume(subroutine);
        }

        if main.len() > MAX_CODE_LINES {
            return Err(Error::TooLarge);
        }

        for line in main.lines.iter_mut() {
            if let Line::Jsr(JsrTarget::Token(key)) = *line {
                let start = starts
                    .get(&key)
                    .ok_or(Error::UnresolvedSubroutine(key))?;
                *line = Line::Jsr(JsrTarget::Line(*start));
            }
        }

        Ok(())
    }

    fn intern_interval(&mut self, interval: Interval) -> Result<u32, Error> {
        if let Some(index) = self.interval_index.get(&interval) {
            return Ok(*index);
        }
        let index =
            u32::try_from(self.intervals.len()).map_err(|_| Error::TooLarge)?;
        self.intervals.push(interval);
        self.interval_index.insert(interval, index);
        Ok(index)
    }

    fn intern_interval_set(&mut self, set: Vec<u32>) -> Result<u32, Error> {
        if let Some(index) = self.interval_set_index.get(&set) {
            return Ok(*index);
        }
        let index = u32::try_from(self.interval_sets.len())
            .map_err(|_| Error::TooLarge)?;
        self.interval_sets.push(set.clone());
        self.interval_set_index.insert(set, index);
        Ok(index)
    }
}

/// Emits an alternation. Each alternative except the last one is preceded
/// by a fork, and followed by a branch to the end of the alternation.
///
/// ```text
///   FORK +0 +(len_0 + 1)
///   <alternative 0>
///   BRA <end>
///   FORK +0 +(len_1 + 1)
///   <alternative 1>
///   BRA <end>
///   <alternative 2>
/// end:
/// ```
fn alternation(
    children: Vec<InstructionBuffer>,
    prioritized: bool,
) -> InstructionBuffer {
    let n = children.len();
    let mut remaining: isize = children.iter().map(|c| c.len() as isize).sum();
    let mut buffer = InstructionBuffer::new();

    for (i, child) in children.into_iter().enumerate() {
        let len = child.len() as isize;
        if i + 1 < n {
            remaining -= len;
            buffer.put(Line::Fork { prioritized, goto: 0, new_thread: len + 1 });
            buffer.consume(child);
            // Skips the remaining alternatives, each one except the last is
            // surrounded by a fork and a branch.
            buffer.put(Line::Bra((n - 2 - i) as isize * 2 + remaining));
        } else {
            buffer.consume(child);
        }
    }

    buffer
}

/// Emits a repetition. The mandatory copies of the operand are emitted
/// first, followed by either a loop (for unbounded repetitions) or a number
/// of optional copies, each one preceded by a fork.
///
/// Fails with [`Error::TooLarge`] before emitting anything if the result
/// would exceed [`MAX_CODE_LINES`].
fn repetition(
    child: InstructionBuffer,
    rep: &Repetition,
) -> Result<InstructionBuffer, Error> {
    let optional = match rep.max {
        None => Some(child.len() + 2),
        Some(max) => (max.saturating_sub(rep.min) as usize)
            .checked_mul(child.len() + 1),
    };

    let size = (rep.min as usize)
        .checked_mul(child.len())
        .zip(optional)
        .and_then(|(mandatory, optional)| mandatory.checked_add(optional))
        .filter(|size| *size <= MAX_CODE_LINES)
        .ok_or(Error::TooLarge)?;

    let len = child.len() as isize;
    let mut buffer = InstructionBuffer::with_capacity(size);

    for _ in 0..rep.min {
        buffer.append(&child);
    }

    match rep.max {
        None => {
            let (goto, new_thread) =
                if rep.greedy { (0, len + 1) } else { (len + 1, 0) };
            buffer.put(Line::Fork { prioritized: true, goto, new_thread });
            buffer.append(&child);
            buffer.put(Line::Bra(-(len + 2)));
        }
        Some(max) => {
            let (goto, new_thread) =
                if rep.greedy { (0, len) } else { (len, 0) };
            for _ in rep.min..max {
                buffer.put(Line::Fork { prioritized: true, goto, new_thread });
                buffer.append(&child);
            }
        }
    }

    Ok(buffer)
}

/// Numbers the groups in a subroutine sequentially, in the order in which
/// they are opened. The end marker of a group gets the number of the group.
fn label_groups(buffer: &mut InstructionBuffer) -> Result<(), Error> {
    let mut next = 0_usize;
    let mut open = Vec::new();

    for line in buffer.lines.iter_mut() {
        match line {
            Line::BeginGroup(index) => {
                *index = u8::try_from(next).map_err(|_| Error::TooLarge)?;
                open.push(*index);
                next += 1;
            }
            Line::EndGroup(index) => {
                *index = open.pop().ok_or(Error::UnbalancedGroups)?;
            }
            _ => {}
        }
    }

    if !open.is_empty() {
        return Err(Error::UnbalancedGroups);
    }

    Ok(())
}
