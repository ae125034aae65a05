/*! Virtual machine that executes the code produced by
[`crate::re::emitter::CodeEmitter`].

The VM simulates an NFA by running many threads in lockstep. All the threads
alive at a given moment are waiting for the same input character, and the
execution proceeds in generations: in each generation every thread runs until
it executes an instruction that tests the current character, dies, or
accepts a token. Threads created by fork instructions during a generation run
in that same generation. When the generation ends, the VM advances to the
next character.

Each thread records a path: one point per fork instruction executed, with
the address of the fork, the priority the thread got at the fork, and the
number of characters consumed since then. Paths are used for deciding which
thread wins when several of them accept, and for discarding threads that
converge into the same state. See [`Thread::compare_priority`].
*/

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::ops::Range;

use log::*;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::re::bytecode::Bytecode;
use crate::re::instr::Instr;
use crate::re::{Error, TokenKey, MAX_CALL_DEPTH};

/// A match found by the VM.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchResult {
    /// Key of the accepted token.
    pub token_key: TokenKey,
    /// Text consumed by the token.
    pub text: String,
    /// Byte range within the input, from the position where the search
    /// started to the position where the token was accepted.
    pub range: Range<usize>,
}

impl Display for MatchResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{{}, {:?}, [{}, {})}}",
            self.token_key, self.text, self.range.start, self.range.end
        )
    }
}

/// Events recorded by a thread when tracing is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trace {
    /// The thread consumed a character.
    Consumed(char),
    /// The thread went through the fork at the given address. `preferred`
    /// is true if the thread was the one preferred by the fork.
    Fork { addr: usize, preferred: bool },
    BeginGroup(u8),
    EndGroup(u8),
}

/// A frame in the call stack of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    return_addr: usize,
}

impl Frame {
    fn new(return_addr: usize) -> Self {
        Self { return_addr }
    }

    /// Address where the execution continues when the subroutine returns.
    #[inline]
    pub fn return_addr(&self) -> usize {
        self.return_addr
    }
}

/// A decision taken by a thread at some fork instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathPoint {
    /// Address of the fork instruction.
    pub fork_addr: usize,
    /// Hash of the return addresses in the call stack at the fork. The same
    /// fork reached through different calls is a different decision.
    pub call_site: u64,
    /// 1 if the thread is the one preferred by the fork, 0 otherwise.
    pub priority: u8,
    /// Number of characters consumed since the fork.
    pub rep_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsumeMark {
    At(usize),
    /// The text between the previous mark and the next one is not part of
    /// the accepted text.
    Skip,
}

/// The input seen by threads during a generation.
struct Input<'t> {
    text: &'t str,
    cursor: usize,
}

impl<'t> Input<'t> {
    /// Character at the cursor, or `None` past the end of the input.
    #[inline]
    fn current(&self) -> Option<char> {
        self.text.get(self.cursor..)?.chars().next()
    }
}

/// A thread of execution.
#[derive(Debug, Clone)]
pub struct Thread {
    id: usize,
    pc: usize,
    frames: SmallVec<[Frame; 4]>,
    path: Vec<PathPoint>,
    consumed: Vec<ConsumeMark>,
    groups: Vec<u8>,
    tracing: bool,
    trace: Vec<Trace>,
    result: Option<MatchResult>,
}

impl Thread {
    fn root(start: usize, tracing: bool) -> Self {
        let mut frames = SmallVec::new();
        frames.push(Frame::new(0));
        Self {
            id: 0,
            pc: 0,
            frames,
            path: Vec::new(),
            consumed: vec![ConsumeMark::At(start)],
            groups: Vec::new(),
            tracing,
            trace: Vec::new(),
            result: None,
        }
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Address of the next instruction to execute.
    #[inline]
    pub fn pc(&self) -> usize {
        self.pc
    }

    #[inline]
    pub fn frames(&self) -> &[Frame] {
        self.frames.as_slice()
    }

    #[inline]
    pub fn path(&self) -> &[PathPoint] {
        self.path.as_slice()
    }

    /// Indexes of the groups that are currently open.
    #[inline]
    pub fn groups(&self) -> &[u8] {
        self.groups.as_slice()
    }

    /// Events recorded by the thread. Empty unless tracing is enabled.
    #[inline]
    pub fn trace(&self) -> &[Trace] {
        self.trace.as_slice()
    }

    /// The match found by the thread, if it accepted some token.
    #[inline]
    pub fn match_result(&self) -> Option<&MatchResult> {
        self.result.as_ref()
    }

    /// A thread is dead when its call stack is empty. Dead threads either
    /// accepted a token or failed.
    #[inline]
    pub fn is_dead(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    fn kill(&mut self) {
        self.frames.clear();
    }

    #[inline]
    fn record(&mut self, event: Trace) {
        if self.tracing {
            self.trace.push(event);
        }
    }

    /// Compares the priority of two threads. `Ordering::Greater` means that
    /// `self` takes precedence over `other`.
    ///
    /// The paths are compared point by point while both threads went
    /// through the same forks, called from the same places. At the first fork where they took different
    /// sides, the thread preferred by the fork wins. If no decision is
    /// reached that way:
    ///
    /// * Between two alive threads, the one with the shorter path wins.
    /// * An alive thread wins over a dead one, as it may still produce a
    ///   longer match.
    /// * Between two dead threads, the one that has a match wins. If both
    ///   have a match, the longest text wins, then the token defined first,
    ///   and finally the shorter path.
    pub fn compare_priority(&self, other: &Thread) -> Ordering {
        for (lhs, rhs) in self.path.iter().zip(other.path.iter()) {
            if lhs.fork_addr != rhs.fork_addr || lhs.call_site != rhs.call_site
            {
                break;
            }
            if lhs.priority != rhs.priority {
                return lhs.priority.cmp(&rhs.priority);
            }
        }

        let shorter_path = other.path.len().cmp(&self.path.len());

        match (self.is_dead(), other.is_dead()) {
            (false, false) => shorter_path,
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (true, true) => match (&self.result, &other.result) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(lhs), Some(rhs)) => lhs
                    .text
                    .chars()
                    .count()
                    .cmp(&rhs.text.chars().count())
                    .then(rhs.token_key.cmp(&lhs.token_key))
                    .then(shorter_path),
            },
        }
    }

    /// Returns true if `self` takes precedence over `other`.
    #[inline]
    pub fn is_prior_to(&self, other: &Thread) -> bool {
        self.compare_priority(other) == Ordering::Greater
    }

    /// Returns true if both threads are in the same state and reached it
    /// through the same last fork decision. Only one of them needs to be
    /// kept.
    fn converges_with(&self, other: &Thread) -> bool {
        self.pc == other.pc
            && self.frames == other.frames
            && match (self.path.last(), other.path.last()) {
                (Some(lhs), Some(rhs)) => lhs == rhs,
                _ => false,
            }
    }

    /// Runs the thread until it tests the current character, dies, or
    /// accepts a token. Threads created by forks are appended to `spawned`.
    fn run(
        &mut self,
        bytecode: &Bytecode,
        input: &Input,
        spawned: &mut Vec<Thread>,
        next_id: &mut usize,
    ) -> Result<(), Error> {
        while !self.is_dead() {
            let addr = self.pc;
            let (instr, size) = bytecode.decode(addr)?;
            let opcode = instr.opcode();

            self.pc = addr + size;

            match instr {
                Instr::Bra(offset) => {
                    self.pc = jump(self.pc, offset, addr)?;
                }
                Instr::Bsr(_) | Instr::Jmp(_) => {
                    return Err(Error::UnimplementedOpcode {
                        opcode: instr.opcode(),
                        addr,
                    });
                }
                Instr::Jsr(target) => {
                    if self.frames.len() >= MAX_CALL_DEPTH {
                        debug!(
                            "thread {} exceeded the maximum call depth at {:05x}",
                            self.id, addr
                        );
                        self.kill();
                    } else {
                        self.frames.push(Frame::new(self.pc));
                        self.pc = target as usize;
                    }
                }
                Instr::Rts => {
                    let frame = self
                        .frames
                        .pop()
                        .ok_or(Error::FrameStackUnderflow(addr))?;
                    self.pc = frame.return_addr;
                }
                Instr::Accept(key) => self.accept(key, input),
                Instr::Fork { goto, new_thread } => {
                    self.fork(addr, goto, new_thread, false, spawned, next_id)?
                }
                Instr::PFork { goto, new_thread } => {
                    self.fork(addr, goto, new_thread, true, spawned, next_id)?
                }
                Instr::Skip => {
                    self.consumed.push(ConsumeMark::Skip);
                    self.consumed.push(ConsumeMark::At(input.cursor));
                }
                Instr::Consume => {
                    self.consumed.push(ConsumeMark::At(input.cursor));
                }
                Instr::BeginGroup(index) => {
                    self.groups.push(index);
                    self.record(Trace::BeginGroup(index));
                }
                Instr::EndGroup(index) => {
                    self.groups
                        .pop()
                        .ok_or(Error::UnbalancedGroupMarker(addr))?;
                    self.record(Trace::EndGroup(index));
                }
                Instr::TestCode(code) => {
                    self.test(input, |c| c == code);
                }
                Instr::TestRange(index) => {
                    let interval = bytecode.interval(index);
                    self.test(input, |c| {
                        interval.is_some_and(|interval| interval.contains(c))
                    });
                }
                Instr::TestRanges(index) => {
                    self.test(input, |c| {
                        bytecode.interval_set(index).is_some_and(|mut set| {
                            set.any(|interval| interval.contains(c))
                        })
                    });
                }
            }

            // The thread waits for the next generation after testing the
            // current character.
            if Instr::tests_input(opcode) {
                break;
            }
        }
        Ok(())
    }

    /// Tests the current character. On success the consumption is counted
    /// in the last path point, on failure the thread dies.
    fn test<F>(&mut self, input: &Input, accepts: F)
    where
        F: Fn(u32) -> bool,
    {
        match input.current() {
            Some(c) if accepts(c as u32) => {
                if let Some(last) = self.path.last_mut() {
                    last.rep_count += 1;
                }
                self.record(Trace::Consumed(c));
            }
            _ => self.kill(),
        }
    }

    fn fork(
        &mut self,
        addr: usize,
        goto: i16,
        new_thread: i16,
        prioritized: bool,
        spawned: &mut Vec<Thread>,
        next_id: &mut usize,
    ) -> Result<(), Error> {
        // A thread that reaches the same fork again without consuming any
        // character is in a loop that can't make progress.
        for point in self.path.iter().rev() {
            if point.rep_count > 0 {
                break;
            }
            if point.fork_addr == addr {
                self.kill();
                return Ok(());
            }
        }

        let goto = jump(self.pc, goto, addr)?;
        let new_thread = jump(self.pc, new_thread, addr)?;

        let mut child = self.clone();
        child.id = *next_id;
        *next_id += 1;

        let call_site = self.call_site();

        self.path.push(PathPoint {
            fork_addr: addr,
            call_site,
            priority: prioritized as u8,
            rep_count: 0,
        });

        child.path.push(PathPoint {
            fork_addr: addr,
            call_site,
            priority: 0,
            rep_count: 0,
        });

        self.record(Trace::Fork { addr, preferred: prioritized });
        child.record(Trace::Fork { addr, preferred: false });

        self.pc = goto;
        child.pc = new_thread;

        trace!("thread {} forked thread {} at {:05x}", self.id, child.id, addr);

        spawned.push(child);
        Ok(())
    }

    /// Identifies the chain of calls that led the thread to the subroutine
    /// it is running.
    fn call_site(&self) -> u64 {
        let mut hasher = FxHasher::default();
        for frame in self.frames.iter() {
            frame.return_addr.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Accepts the token, building the accepted text out of the consumption
    /// marks. The thread dies after accepting.
    fn accept(&mut self, key: TokenKey, input: &Input) {
        let mut text = String::new();
        let mut span_start = None;

        for mark in self.consumed.iter() {
            match mark {
                ConsumeMark::Skip => span_start = None,
                ConsumeMark::At(pos) => {
                    if let Some(s) = span_start {
                        if let Some(slice) = input.text.get(s..*pos) {
                            text.push_str(slice);
                        }
                    }
                    span_start = Some(*pos);
                }
            }
        }

        let start = match self.consumed.first() {
            Some(ConsumeMark::At(pos)) => *pos,
            _ => input.cursor,
        };

        self.result =
            Some(MatchResult { token_key: key, text, range: start..input.cursor });

        self.kill();
    }
}

/// Computes the target of a relative jump. `pc` is the address that follows
/// the jump instruction, which starts at `addr`.
fn jump(pc: usize, offset: i16, addr: usize) -> Result<usize, Error> {
    usize::try_from(pc as isize + offset as isize)
        .map_err(|_| Error::InvalidJumpTarget(addr))
}

/// A match together with the events recorded by the thread that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracedMatch {
    pub result: MatchResult,
    pub trace: Vec<Trace>,
}

/// Executes [`Bytecode`] against some input.
#[derive(Debug, Clone, Copy)]
pub struct RegexVm<'b> {
    bytecode: &'b Bytecode,
}

impl<'b> RegexVm<'b> {
    pub fn new(bytecode: &'b Bytecode) -> Self {
        Self { bytecode }
    }

    /// Finds the highest priority match that starts at `start`.
    ///
    /// `start` is a byte offset within `text`, and must be at a character
    /// boundary.
    pub fn find(
        &self,
        text: &str,
        start: usize,
    ) -> Result<Option<MatchResult>, Error> {
        Ok(self.run(text, start, false)?.and_then(|th| th.result))
    }

    /// Same as [`RegexVm::find`], but also returns the events recorded by
    /// the thread that found the match.
    pub fn find_traced(
        &self,
        text: &str,
        start: usize,
    ) -> Result<Option<TracedMatch>, Error> {
        Ok(self.run(text, start, true)?.and_then(|th| {
            th.result.map(|result| TracedMatch { result, trace: th.trace })
        }))
    }

    /// Finds all the successive matches between `start` and `end`.
    ///
    /// After each match the search continues at the end of the match. At
    /// positions where nothing matches the search advances one character.
    /// Only matches that start before `end` are returned, although they may
    /// extend beyond it. The search also stops when a match is identical to
    /// the previous one, which happens with matches that don't consume any
    /// character.
    pub fn find_all(
        &self,
        text: &str,
        start: usize,
        end: usize,
    ) -> Result<Vec<MatchResult>, Error> {
        self.matches(text, start, end).collect()
    }

    /// Returns an iterator that yields the same matches as
    /// [`RegexVm::find_all`], lazily.
    pub fn matches<'t>(
        &self,
        text: &'t str,
        start: usize,
        end: usize,
    ) -> Matches<'b, 't> {
        Matches {
            vm: *self,
            text,
            pos: start,
            end: end.min(text.len()),
            last: None,
            done: false,
        }
    }

    fn run(
        &self,
        text: &str,
        start: usize,
        tracing: bool,
    ) -> Result<Option<Thread>, Error> {
        if start > text.len() || !text.is_char_boundary(start) {
            return Err(Error::InvalidPosition(start));
        }

        let mut input = Input { text, cursor: start };
        let mut next_id = 1;
        let mut threads = vec![Thread::root(start, tracing)];
        let mut matched: Option<Thread> = None;
        let mut final_found = false;

        while !threads.is_empty() && !final_found {
            let mut current = std::mem::take(&mut threads);

            trace!(
                "generation at {}: {} threads ({:?})",
                input.cursor,
                current.len(),
                input.current()
            );

            let mut i = 0;
            while i < current.len() {
                let mut spawned = Vec::new();
                current[i].run(
                    self.bytecode,
                    &input,
                    &mut spawned,
                    &mut next_id,
                )?;
                current.extend(spawned);
                i += 1;
            }

            let mut alive: Vec<Thread> = Vec::with_capacity(current.len());
            let mut accepted: Vec<Thread> = Vec::new();

            for th in current {
                if th.is_dead() {
                    if th.result.is_some() {
                        accepted.push(th);
                    }
                    continue;
                }

                let mut keep = true;
                let mut j = alive.len();
                while j > 0 {
                    j -= 1;
                    if alive[j].converges_with(&th) {
                        if th.is_prior_to(&alive[j]) {
                            alive.remove(j);
                        } else {
                            keep = false;
                            break;
                        }
                    }
                }

                if keep {
                    alive.push(th);
                }
            }

            threads = alive;

            for th in accepted.into_iter().rev() {
                let replace = match &matched {
                    None => true,
                    Some(m) => th.is_prior_to(m),
                };
                if replace {
                    matched = Some(th);
                }
            }

            if let Some(m) = &matched {
                // Threads with lower priority than the match can't
                // produce a better one.
                threads.retain(|th| th.compare_priority(m) != Ordering::Less);
                final_found = !threads.iter().any(|th| th.is_prior_to(m));
            }

            match input.current() {
                Some(c) => input.cursor += c.len_utf8(),
                None => input.cursor += 1,
            }
        }

        if let Some(th) = &matched {
            if let Some(result) = &th.result {
                debug!("thread {} matched {}", th.id, result);
            }
        }

        Ok(matched)
    }
}

/// Iterator returned by [`RegexVm::matches`].
pub struct Matches<'b, 't> {
    vm: RegexVm<'b>,
    text: &'t str,
    pos: usize,
    end: usize,
    last: Option<MatchResult>,
    done: bool,
}

impl<'b, 't> Iterator for Matches<'b, 't> {
    type Item = Result<MatchResult, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if self.pos >= self.end {
                self.done = true;
                break;
            }
            match self.vm.find(self.text, self.pos) {
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
                Ok(Some(result)) => {
                    if self.last.as_ref() == Some(&result) {
                        self.done = true;
                        return None;
                    }
                    self.pos = result.range.end;
                    self.last = Some(result.clone());
                    return Some(Ok(result));
                }
                Ok(None) => {
                    self.pos = match self.text.get(self.pos..) {
                        Some(rest) => rest
                            .chars()
                            .next()
                            .map_or(self.pos + 1, |c| self.pos + c.len_utf8()),
                        None => self.pos + 1,
                    };
                }
            }
        }
        None
    }
}
