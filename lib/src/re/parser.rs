/*! Parser that converts the source code of a regexp into an [`Ast`].

The parser is an operator-precedence parser. It keeps a stack of
[`ExprContext`], one per parenthesized group that is currently open, and each
context has its own operator and operand stacks. Concatenation is implicit in
the regexp syntax, so the parser inserts a concatenation operator whenever a
term follows another term.

Escape sequences, character classes, repetition operators and references to
other tokens (`{name}`) are recognized by dedicated scanners that return the
scanned value together with the span of characters they consumed.

All positions reported in errors are character indexes within the regexp.
*/

use std::ops::Range;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::re;
use crate::re::ast::{Associativity, Ast, NodeId, Operator, Repetition};
use crate::re::intervals::{self, CharClass, Interval, MAX_CODE_POINT};
use crate::re::TokenKey;

/// Maximum value accepted as the bound of a repetition operator like
/// `{m,n}`.
pub const MAX_REPETITIONS: u32 = 1000;

/// Error returned by [`RegexParser::parse`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} (at position {position})")]
pub struct Error {
    kind: ErrorKind,
    position: usize,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, position: usize) -> Self {
        Self { kind, position }
    }

    #[inline]
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Numeric code that identifies the kind of error.
    #[inline]
    pub fn code(&self) -> u32 {
        self.kind.code()
    }

    /// Character index within the regexp where the error was found.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }
}

/// Each of the errors that can occur while parsing a regexp.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("start of string anchor `^` is not supported")]
    StartAnchor,

    #[error("end of string anchor `$` is not supported")]
    EndAnchor,

    #[error("there's no open parenthesis to close")]
    UnmatchedCloseParen,

    #[error("missing closing parenthesis")]
    UnclosedGroup,

    #[error("unexpected `}}`")]
    UnexpectedCloseBrace,

    #[error("unexpected `]`")]
    UnexpectedCloseBracket,

    #[error("nothing to repeat")]
    NothingToRepeat,

    #[error("an operator lacks one of its operands")]
    MissingOperand,

    #[error("some operands are not used by any operator")]
    TooManyOperands,

    #[error("empty expression")]
    EmptyExpression,

    #[error("a repetition operator must start with `*`, `+`, `?` or `{{m`")]
    InvalidRepetition,

    #[error("a repetition operator must end with `}}`")]
    UnclosedRepetition,

    #[error("the minimum value of a repetition must be equal to or less than the maximum value")]
    InvertedRepetition,

    #[error("repetition bound is larger than {}", MAX_REPETITIONS)]
    RepetitionTooLarge,

    #[error("possessive quantifiers are not supported")]
    PossessiveQuantifier,

    #[error("incomplete escape sequence")]
    IncompleteEscape,

    #[error("the escape sequence requires at least one digit")]
    MissingDigits,

    #[error("code point is larger than {:#x}", MAX_CODE_POINT)]
    CodePointOutOfRange,

    #[error("back-references are not supported")]
    BackReference,

    #[error("unicode code point escapes are not supported")]
    UnicodeEscape,

    #[error("unicode categories are not supported")]
    UnicodeCategory,

    #[error("missing closing `]`")]
    UnclosedClass,

    #[error("the character class doesn't match any character")]
    EmptyClass,

    #[error("range operators must appear after a left hand side term")]
    MissingRangeLhs,

    #[error("the left hand side of range operators must be a single character")]
    InvalidRangeLhs,

    #[error("the right hand side of range operators must be a single character")]
    InvalidRangeRhs,

    #[error("the lower bound of the range is greater than the upper bound")]
    InvertedRange,

    #[error("unknown POSIX character class `{0}`")]
    UnknownPosixClass(String),

    #[error("a POSIX character class must end with `:]`")]
    UnclosedPosixClass,

    #[error("POSIX collating sequences are not supported")]
    CollatingSequence,

    #[error("POSIX character equivalences are not supported")]
    CharacterEquivalence,

    #[error("character class intersection is not supported")]
    ClassIntersection,

    #[error("character class difference is not supported")]
    ClassDifference,

    #[error("back-references can't be used inside character classes")]
    BackReferenceInClass,

    #[error("invalid character in token name")]
    InvalidIdentifier,

    #[error("a token name in braces must end with `}}`")]
    UnclosedIdentifier,

    #[error("'{0}' is not defined")]
    UndefinedToken(String),

    #[error(transparent)]
    MalformedTree(#[from] re::Error),
}

impl ErrorKind {
    /// Numeric code that identifies the kind of error.
    pub fn code(&self) -> u32 {
        match self {
            Self::StartAnchor => 1,
            Self::EndAnchor => 2,
            Self::UnmatchedCloseParen => 3,
            Self::UnclosedGroup => 4,
            Self::UnexpectedCloseBrace => 5,
            Self::UnexpectedCloseBracket => 6,
            Self::NothingToRepeat => 7,
            Self::MissingOperand => 8,
            Self::TooManyOperands => 9,
            Self::EmptyExpression => 10,
            Self::InvalidRepetition => 11,
            Self::UnclosedRepetition => 12,
            Self::InvertedRepetition => 13,
            Self::RepetitionTooLarge => 14,
            Self::PossessiveQuantifier => 15,
            Self::IncompleteEscape => 16,
            Self::MissingDigits => 17,
            Self::CodePointOutOfRange => 18,
            Self::BackReference => 19,
            Self::UnicodeEscape => 20,
            Self::UnicodeCategory => 21,
            Self::UnclosedClass => 22,
            Self::EmptyClass => 23,
            Self::MissingRangeLhs => 24,
            Self::InvalidRangeLhs => 25,
            Self::InvalidRangeRhs => 26,
            Self::InvertedRange => 27,
            Self::UnknownPosixClass(_) => 28,
            Self::UnclosedPosixClass => 29,
            Self::CollatingSequence => 30,
            Self::CharacterEquivalence => 31,
            Self::ClassIntersection => 32,
            Self::ClassDifference => 33,
            Self::BackReferenceInClass => 34,
            Self::InvalidIdentifier => 35,
            Self::UnclosedIdentifier => 36,
            Self::UndefinedToken(_) => 37,
            Self::MalformedTree(_) => 38,
        }
    }
}

/// A regular expression parser.
///
/// Takes the source code of a regexp and produces an [`Ast`] whose root is
/// an [`Operator::Accept`] node for the given token key.
#[derive(Debug, Default)]
pub struct RegexParser {}

impl RegexParser {
    pub fn new() -> Self {
        Self {}
    }

    /// Parses the regexp and returns an arena together with the root of the
    /// tree, an [`Operator::Accept`] for `token_key`.
    ///
    /// `names` maps token names to token keys, and it's used for resolving
    /// references to other tokens, like `{name}`.
    pub fn parse(
        &self,
        pattern: &str,
        token_key: TokenKey,
        names: &FxHashMap<String, TokenKey>,
    ) -> Result<(Ast, NodeId), Error> {
        ParserState::new(pattern, names).parse(token_key)
    }
}

/// Value returned by a scanner, together with the span of characters that
/// were consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Scanned<T> {
    pub value: T,
    pub span: Range<usize>,
}

/// Value of an escape sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Escape {
    CodePoint(u32),
    Class(CharClass),
    BackReference(u32),
}

/// Operator and operand stacks for a parenthesized group.
#[derive(Debug, Default)]
struct ExprContext {
    operators: Vec<Operator>,
    terms: Vec<NodeId>,
    last_was_term: bool,
}

impl ExprContext {
    fn push_term(
        &mut self,
        ast: &mut Ast,
        node: NodeId,
    ) -> Result<(), ErrorKind> {
        if self.last_was_term {
            self.push_operator(ast, Operator::Concatenation)?;
        }
        self.terms.push(node);
        self.last_was_term = true;
        Ok(())
    }

    fn push_operator(
        &mut self,
        ast: &mut Ast,
        op: Operator,
    ) -> Result<(), ErrorKind> {
        let op_type = op.op_type();

        // Operators that take less than two operands are reduced as soon as
        // they are found.
        if op_type.arity() < 2 {
            match op {
                Operator::TokenExpressionCall(_) if self.last_was_term => {
                    self.push_operator(ast, Operator::Concatenation)?;
                }
                Operator::Repetition(_) if !self.last_was_term => {
                    return Err(ErrorKind::NothingToRepeat);
                }
                _ => {}
            }
            return self.reduce(ast, op);
        }

        while let Some(last) = self.operators.last() {
            let last_type = last.op_type();
            let reduce_last = last_type.precedes(op_type)
                || (op_type.associativity() == Associativity::LeftToRight
                    && !op_type.precedes(last_type));
            if !reduce_last {
                break;
            }
            if let Some(last) = self.operators.pop() {
                self.reduce(ast, last)?;
            }
        }

        self.operators.push(op);
        self.last_was_term = false;
        Ok(())
    }

    /// Creates a node for the operator, taking its operands from the top of
    /// the term stack, and pushes the node as a new term.
    fn reduce(&mut self, ast: &mut Ast, op: Operator) -> Result<(), ErrorKind> {
        let arity = op.op_type().arity();

        if self.terms.len() < arity {
            return Err(match op {
                Operator::Repetition(_) => ErrorKind::NothingToRepeat,
                _ => ErrorKind::MissingOperand,
            });
        }

        let operands = self.terms.split_off(self.terms.len() - arity);
        let node = ast.add_operator(op);

        for operand in operands {
            ast.add_child(node, operand)?;
        }

        if arity >= 2 {
            flatten(ast, node)?;
        }

        self.terms.push(node);
        self.last_was_term = true;
        Ok(())
    }

    /// Reduces all the pending operators and returns the root of the
    /// resulting expression.
    fn evaluate_all(mut self, ast: &mut Ast) -> Result<NodeId, ErrorKind> {
        while let Some(op) = self.operators.pop() {
            self.reduce(ast, op)?;
        }
        match self.terms.as_slice() {
            [] => Err(ErrorKind::EmptyExpression),
            [root] => Ok(*root),
            _ => Err(ErrorKind::TooManyOperands),
        }
    }
}

/// If the operand of a binary operator is a node with the same operator,
/// the operand's children are moved into the node and the operand is
/// discarded. This turns `concatenation(concatenation(a, b), c)` into
/// `concatenation(a, b, c)`.
///
/// Operands that are the root of a group are not flattened.
fn flatten(ast: &mut Ast, node: NodeId) -> Result<(), re::Error> {
    let Some(op) = ast.operator(node).cloned() else {
        return Ok(());
    };

    if op.has_static_args() {
        return Ok(());
    }

    let (operand, insert_at) = match op.op_type().associativity() {
        Associativity::LeftToRight => match ast.child_at(node, 0) {
            Some(first) => (first, 0),
            None => return Ok(()),
        },
        Associativity::RightToLeft => {
            match ast.children(node).last().copied() {
                Some(last) => (last, usize::MAX),
                None => return Ok(()),
            }
        }
    };

    let same_op = match ast.operator(operand) {
        Some(child_op) => {
            child_op.op_type() == op.op_type() && !child_op.has_static_args()
        }
        None => false,
    };

    if !same_op || ast.is_group_root(operand) {
        return Ok(());
    }

    ast.remove_child(node, operand);
    let grandchildren = ast.remove_all_children(operand);
    let index = insert_at.min(ast.child_count(node));
    ast.insert_children(node, index, &grandchildren)
}

struct ParserState<'a> {
    chars: Vec<char>,
    pos: usize,
    names: &'a FxHashMap<String, TokenKey>,
    ast: Ast,
    contexts: Vec<ExprContext>,
}

impl<'a> ParserState<'a> {
    fn new(pattern: &str, names: &'a FxHashMap<String, TokenKey>) -> Self {
        Self {
            chars: pattern.chars().collect(),
            pos: 0,
            names,
            ast: Ast::new(),
            contexts: vec![ExprContext::default()],
        }
    }

    fn parse(mut self, token_key: TokenKey) -> Result<(Ast, NodeId), Error> {
        while let Some(c) = self.chars.get(self.pos).copied() {
            match c {
                '\r' | '\n' => self.pos += 1,
                '^' => return Err(self.error(ErrorKind::StartAnchor)),
                '$' => return Err(self.error(ErrorKind::EndAnchor)),
                '(' => {
                    self.contexts.push(ExprContext::default());
                    self.pos += 1;
                }
                ')' => {
                    self.close_group()?;
                    self.pos += 1;
                }
                '{' => {
                    match self.chars.get(self.pos + 1) {
                        Some(c) if c.is_ascii_digit() => {
                            self.parse_repetition()?
                        }
                        _ => self.parse_token_call()?,
                    };
                }
                '*' | '+' | '?' => self.parse_repetition()?,
                '}' => {
                    return Err(self.error(ErrorKind::UnexpectedCloseBrace))
                }
                ']' => {
                    return Err(self.error(ErrorKind::UnexpectedCloseBracket))
                }
                '|' => {
                    self.push_operator(Operator::Alternation)?;
                    self.pos += 1;
                }
                '\\' => {
                    let scanned = scan_escape(&self.chars, self.pos)?;
                    let intervals = match scanned.value {
                        Escape::CodePoint(c) => vec![Interval::single(c)],
                        Escape::Class(class) => intervals::merge(class.intervals()),
                        Escape::BackReference(_) => {
                            return Err(self.error(ErrorKind::BackReference))
                        }
                    };
                    self.push_terminal(intervals)?;
                    self.pos = scanned.span.end;
                }
                '[' => {
                    let scanned = scan_class(&self.chars, self.pos)?;
                    self.push_terminal(scanned.value)?;
                    self.pos = scanned.span.end;
                }
                '.' => {
                    self.push_terminal(vec![Interval::any()])?;
                    self.pos += 1;
                }
                c => {
                    self.push_terminal(vec![Interval::single(c as u32)])?;
                    self.pos += 1;
                }
            }
        }

        if self.contexts.len() > 1 {
            return Err(self.error(ErrorKind::UnclosedGroup));
        }

        let position = self.pos;
        let context = self
            .contexts
            .pop()
            .ok_or_else(|| Error::new(ErrorKind::EmptyExpression, position))?;

        let expr = context
            .evaluate_all(&mut self.ast)
            .map_err(|kind| Error::new(kind, position))?;

        let root = self.ast.add_operator(Operator::Accept(token_key));

        self.ast
            .add_child(root, expr)
            .map_err(|err| Error::new(err.into(), position))?;

        Ok((self.ast, root))
    }

    #[inline]
    fn error(&self, kind: ErrorKind) -> Error {
        Error::new(kind, self.pos)
    }

    fn push_operator(&mut self, op: Operator) -> Result<(), Error> {
        let position = self.pos;
        let context = self.contexts.last_mut().ok_or_else(|| {
            Error::new(ErrorKind::UnmatchedCloseParen, position)
        })?;
        context
            .push_operator(&mut self.ast, op)
            .map_err(|kind| Error::new(kind, position))
    }

    fn push_term(&mut self, node: NodeId) -> Result<(), Error> {
        let position = self.pos;
        let context = self.contexts.last_mut().ok_or_else(|| {
            Error::new(ErrorKind::UnmatchedCloseParen, position)
        })?;
        context
            .push_term(&mut self.ast, node)
            .map_err(|kind| Error::new(kind, position))
    }

    fn push_terminal(&mut self, intervals: Vec<Interval>) -> Result<(), Error> {
        let node = self.ast.add_terminal(intervals);
        self.push_term(node)
    }

    fn close_group(&mut self) -> Result<(), Error> {
        if self.contexts.len() < 2 {
            return Err(self.error(ErrorKind::UnmatchedCloseParen));
        }

        let position = self.pos;
        let context = self.contexts.pop().ok_or_else(|| {
            Error::new(ErrorKind::UnmatchedCloseParen, position)
        })?;

        let node = context
            .evaluate_all(&mut self.ast)
            .map_err(|kind| Error::new(kind, position))?;

        self.ast.set_group_root(node, true);
        self.push_term(node)
    }

    fn parse_repetition(&mut self) -> Result<(), Error> {
        let scanned = scan_repetition(&self.chars, self.pos)?;
        self.push_operator(Operator::Repetition(scanned.value))?;
        self.pos = scanned.span.end;
        Ok(())
    }

    fn parse_token_call(&mut self) -> Result<(), Error> {
        let scanned = scan_identifier(&self.chars, self.pos)?;
        let key = match self.names.get(&scanned.value) {
            Some(key) => *key,
            None => {
                return Err(self.error(ErrorKind::UndefinedToken(
                    scanned.value,
                )))
            }
        };
        self.push_operator(Operator::TokenExpressionCall(key))?;
        self.pos = scanned.span.end;
        Ok(())
    }
}

/// Scans an integer in the given radix starting at `start`. Returns the
/// value, or `None` if there's no digit at `start`, together with the
/// position that follows the last digit. Values that don't fit in a `u32`
/// saturate to `u32::MAX`.
fn scan_integer(chars: &[char], start: usize, radix: u32) -> (Option<u32>, usize) {
    let mut value: Option<u32> = None;
    let mut pos = start;
    while let Some(digit) = chars.get(pos).and_then(|c| c.to_digit(radix)) {
        value = Some(
            value.unwrap_or(0).saturating_mul(radix).saturating_add(digit),
        );
        pos += 1;
    }
    (value, pos)
}

/// Scans a repetition operator (`*`, `+`, `?`, `{m}`, `{m,}`, `{m,n}`),
/// including the `?` suffix that makes it non-greedy.
pub(crate) fn scan_repetition(
    chars: &[char],
    start: usize,
) -> Result<Scanned<Repetition>, Error> {
    let mut pos = start;

    let (min, max) = match chars.get(pos) {
        Some('*') => {
            pos += 1;
            (0, None)
        }
        Some('+') => {
            pos += 1;
            (1, None)
        }
        Some('?') => {
            pos += 1;
            (0, Some(1))
        }
        Some('{') => {
            pos += 1;
            let (min, next) = scan_integer(chars, pos, 10);
            let min = min
                .ok_or_else(|| Error::new(ErrorKind::InvalidRepetition, pos))?;
            pos = next;
            let max = if chars.get(pos) == Some(&',') {
                let (max, next) = scan_integer(chars, pos + 1, 10);
                pos = next;
                max
            } else {
                Some(min)
            };
            if chars.get(pos) != Some(&'}') {
                return Err(Error::new(ErrorKind::UnclosedRepetition, pos));
            }
            pos += 1;
            if max.is_some_and(|max| min > max) {
                return Err(Error::new(ErrorKind::InvertedRepetition, start));
            }
            if min > MAX_REPETITIONS
                || max.is_some_and(|max| max > MAX_REPETITIONS)
            {
                return Err(Error::new(ErrorKind::RepetitionTooLarge, start));
            }
            (min, max)
        }
        _ => return Err(Error::new(ErrorKind::InvalidRepetition, start)),
    };

    let greedy = match chars.get(pos) {
        Some('?') => {
            pos += 1;
            false
        }
        Some('+') => {
            return Err(Error::new(ErrorKind::PossessiveQuantifier, pos))
        }
        _ => true,
    };

    Ok(Scanned { value: Repetition { min, max, greedy }, span: start..pos })
}

/// Scans an escape sequence that starts with the `\` at `start`.
pub(crate) fn scan_escape(
    chars: &[char],
    start: usize,
) -> Result<Scanned<Escape>, Error> {
    if chars.get(start) != Some(&'\\') {
        return Err(Error::new(ErrorKind::IncompleteEscape, start));
    }

    let Some(c) = chars.get(start + 1).copied() else {
        return Err(Error::new(ErrorKind::IncompleteEscape, start));
    };

    let mut end = start + 2;

    let value = match c {
        's' => Escape::Class(CharClass::Space),
        'S' => Escape::Class(CharClass::NonSpace),
        'w' => Escape::Class(CharClass::Word),
        'W' => Escape::Class(CharClass::NonWord),
        '0'..='9' => {
            let (index, next) = scan_integer(chars, start + 1, 10);
            end = next;
            Escape::BackReference(index.unwrap_or_default())
        }
        'd' | 'x' => {
            let radix = if c == 'd' { 10 } else { 16 };
            let (value, next) = scan_integer(chars, start + 2, radix);
            let value = value.ok_or_else(|| {
                Error::new(ErrorKind::MissingDigits, start + 2)
            })?;
            if value > MAX_CODE_POINT {
                return Err(Error::new(ErrorKind::CodePointOutOfRange, start));
            }
            end = next;
            Escape::CodePoint(value)
        }
        'u' => return Err(Error::new(ErrorKind::UnicodeEscape, start)),
        'p' => return Err(Error::new(ErrorKind::UnicodeCategory, start)),
        't' => Escape::CodePoint(0x09),
        'n' => Escape::CodePoint(0x0A),
        'v' => Escape::CodePoint(0x0B),
        'f' => Escape::CodePoint(0x0C),
        'r' => Escape::CodePoint(0x0D),
        c => Escape::CodePoint(c as u32),
    };

    Ok(Scanned { value, span: start..end })
}

fn is_id_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_id_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Scans a reference to another token, like `{name}`, that starts with the
/// `{` at `start`.
pub(crate) fn scan_identifier(
    chars: &[char],
    start: usize,
) -> Result<Scanned<String>, Error> {
    let mut pos = start + 1;

    match chars.get(pos) {
        Some(c) if is_id_start(*c) => pos += 1,
        _ => return Err(Error::new(ErrorKind::InvalidIdentifier, pos)),
    }

    while chars.get(pos).is_some_and(|c| is_id_continue(*c)) {
        pos += 1;
    }

    match chars.get(pos) {
        Some('}') => {}
        Some(_) => return Err(Error::new(ErrorKind::InvalidIdentifier, pos)),
        None => return Err(Error::new(ErrorKind::UnclosedIdentifier, pos)),
    }

    let name = chars[start + 1..pos].iter().collect();

    Ok(Scanned { value: name, span: start..pos + 1 })
}

enum ClassTerm {
    Char(u32),
    Set(Vec<Interval>),
}

/// A bracket expression that is being scanned.
struct ClassContext {
    negated: bool,
    terms: Vec<ClassTerm>,
}

impl ClassContext {
    /// Consumes the `[` at `pos`, and the `^` that follows it, if any.
    fn open(chars: &[char], pos: &mut usize) -> Self {
        *pos += 1;
        let negated = chars.get(*pos) == Some(&'^');
        if negated {
            *pos += 1;
        }
        Self { negated, terms: Vec::new() }
    }

    fn evaluate(self) -> Vec<Interval> {
        let intervals = self.terms.into_iter().flat_map(|term| match term {
            ClassTerm::Char(c) => vec![Interval::single(c)],
            ClassTerm::Set(set) => set,
        });
        if self.negated {
            intervals::negate(intervals)
        } else {
            intervals::merge(intervals)
        }
    }
}

/// Scans a POSIX character class like `[:alpha:]` or `[:^alpha:]` that
/// starts at `start`. Returns the intervals in the class and the position
/// that follows the class.
fn scan_posix_class(
    chars: &[char],
    start: usize,
) -> Result<(Vec<Interval>, usize), Error> {
    let mut pos = start + 2;

    let negated = chars.get(pos) == Some(&'^');
    if negated {
        pos += 1;
    }

    let name_start = pos;
    while chars.get(pos).is_some_and(|c| c.is_ascii_alphabetic()) {
        pos += 1;
    }

    if chars.get(pos) != Some(&':') || chars.get(pos + 1) != Some(&']') {
        return Err(Error::new(ErrorKind::UnclosedPosixClass, pos));
    }

    let name: String = chars[name_start..pos].iter().collect();

    let class = CharClass::from_posix_name(&name).ok_or_else(|| {
        Error::new(ErrorKind::UnknownPosixClass(name), name_start)
    })?;

    let intervals = if negated {
        intervals::negate(class.intervals())
    } else {
        class.intervals()
    };

    Ok((intervals, pos + 2))
}

/// Scans a bracket expression like `[a-z_]` that starts with the `[` at
/// `start`. Bracket expressions can be nested, the result is the union of
/// all the sets.
pub(crate) fn scan_class(
    chars: &[char],
    start: usize,
) -> Result<Scanned<Vec<Interval>>, Error> {
    let mut pos = start;
    let mut stack = vec![ClassContext::open(chars, &mut pos)];

    while let Some(top) = stack.last_mut() {
        let Some(c) = chars.get(pos).copied() else {
            return Err(Error::new(ErrorKind::UnclosedClass, start));
        };

        match c {
            '[' => match chars.get(pos + 1) {
                Some(':') => {
                    let (intervals, next) = scan_posix_class(chars, pos)?;
                    top.terms.push(ClassTerm::Set(intervals));
                    pos = next;
                }
                Some('=') => {
                    return Err(Error::new(
                        ErrorKind::CharacterEquivalence,
                        pos,
                    ))
                }
                Some('.') => {
                    return Err(Error::new(ErrorKind::CollatingSequence, pos))
                }
                _ => stack.push(ClassContext::open(chars, &mut pos)),
            },
            ']' => {
                pos += 1;
                let Some(context) = stack.pop() else {
                    break;
                };
                let intervals = context.evaluate();
                match stack.last_mut() {
                    Some(parent) => parent.terms.push(ClassTerm::Set(intervals)),
                    None if intervals.is_empty() => {
                        return Err(Error::new(ErrorKind::EmptyClass, start))
                    }
                    None => {
                        return Ok(Scanned {
                            value: intervals,
                            span: start..pos,
                        })
                    }
                }
            }
            '-' => match chars.get(pos + 1) {
                Some(']') => {
                    top.terms.push(ClassTerm::Char('-' as u32));
                    pos += 1;
                }
                Some('[') => {
                    return Err(Error::new(ErrorKind::ClassDifference, pos))
                }
                Some(rhs) => {
                    let lo = match top.terms.pop() {
                        Some(ClassTerm::Char(c)) => c,
                        Some(ClassTerm::Set(_)) => {
                            return Err(Error::new(
                                ErrorKind::InvalidRangeLhs,
                                pos,
                            ))
                        }
                        None => {
                            return Err(Error::new(
                                ErrorKind::MissingRangeLhs,
                                pos,
                            ))
                        }
                    };
                    let (hi, next) = if *rhs == '\\' {
                        let scanned = scan_escape(chars, pos + 1)?;
                        match scanned.value {
                            Escape::CodePoint(c) => (c, scanned.span.end),
                            _ => {
                                return Err(Error::new(
                                    ErrorKind::InvalidRangeRhs,
                                    pos + 1,
                                ))
                            }
                        }
                    } else {
                        (*rhs as u32, pos + 2)
                    };
                    if lo > hi {
                        return Err(Error::new(ErrorKind::InvertedRange, pos));
                    }
                    top.terms.push(ClassTerm::Set(vec![Interval::new(lo, hi)]));
                    pos = next;
                }
                None => {
                    return Err(Error::new(ErrorKind::UnclosedClass, start))
                }
            },
            '&' if chars.get(pos + 1) == Some(&'&') => {
                return Err(Error::new(ErrorKind::ClassIntersection, pos))
            }
            '\\' => {
                let scanned = scan_escape(chars, pos)?;
                let term = match scanned.value {
                    Escape::CodePoint(c) => ClassTerm::Char(c),
                    Escape::Class(class) => ClassTerm::Set(class.intervals()),
                    Escape::BackReference(_) => {
                        return Err(Error::new(
                            ErrorKind::BackReferenceInClass,
                            pos,
                        ))
                    }
                };
                top.terms.push(term);
                pos = scanned.span.end;
            }
            c => {
                top.terms.push(ClassTerm::Char(c as u32));
                pos += 1;
            }
        }
    }

    Err(Error::new(ErrorKind::UnclosedClass, start))
}
