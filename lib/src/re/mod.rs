/*! This module parses, compiles, and executes regular expressions.

A regular expression goes through three stages, each one implemented in its
own submodule:

1. [`parser::RegexParser`] turns the regexp source into an [`ast::Ast`]. The
   parser is an operator-precedence parser that keeps one operator stack and
   one operand stack per parenthesized group. Character classes and escape
   sequences are handled by dedicated scanners.

2. [`emitter::CodeEmitter`] walks the AST in post-order, producing a list of
   instruction lines for each node and combining them bottom-up. Jump offsets
   are expressed in lines while the code is being built, and converted into
   byte offsets when the final [`bytecode::Bytecode`] is printed.

3. [`vm::RegexVm`] executes the bytecode against some input. The VM simulates
   an NFA by running many lightweight threads in lockstep, one generation per
   input character. Each thread records the decisions taken at every fork,
   and those decisions are used for choosing deterministically among threads
   that accept at the same time.

The data flows in a single direction: text → AST → bytecode → match result.
*/

use thiserror::Error;

pub mod ast;
pub mod bytecode;
pub mod emitter;
pub mod instr;
pub mod intervals;
pub mod parser;
pub mod vm;

#[cfg(test)]
mod tests;

/// Integer key that identifies a token. Keys are assigned sequentially, in
/// the order in which tokens are defined.
pub type TokenKey = u32;

/// Maximum depth of the call stack in a VM thread. A thread that tries to
/// call a subroutine beyond this depth is killed. This prevents infinite
/// recursion with tokens that call themselves without consuming any input.
pub const MAX_CALL_DEPTH: usize = 1024;

/// Errors produced while building ASTs, emitting code, or executing it.
///
/// These errors indicate a violation of the contract between the parser, the
/// emitter and the VM, or some corruption in the bytecode. They are not
/// recoverable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A node was added as a child of itself.
    #[error("node {0} can't be a child of itself")]
    NodeIsOwnChild(ast::NodeId),

    /// A node was added twice to the same parent.
    #[error("node {child} is already a child of node {parent}")]
    DuplicateChild { parent: ast::NodeId, child: ast::NodeId },

    /// Adding a child would make a node its own ancestor.
    #[error("node {child} is an ancestor of node {parent}")]
    CyclicTree { parent: ast::NodeId, child: ast::NodeId },

    /// A child index is beyond the number of children of some node.
    #[error("child index {index} out of range (node has {count} children)")]
    ChildIndexOutOfRange { index: usize, count: usize },

    /// The AST doesn't have the shape expected by the emitter.
    #[error("malformed AST: {0}")]
    MalformedAst(&'static str),

    /// A terminal node without any interval.
    #[error("a terminal node must have at least one interval")]
    EmptyTerminal,

    /// Some group marker lacks its opening or closing counterpart.
    #[error("unbalanced group markers")]
    UnbalancedGroups,

    /// The code calls the subroutine of a token that was not emitted.
    #[error("no subroutine for token {0}")]
    UnresolvedSubroutine(TokenKey),

    /// The AST refers to a token that doesn't exist in the token table.
    #[error("unknown token {0}")]
    UnknownToken(TokenKey),

    /// The bytecode is too large, some offset, address or index doesn't fit
    /// in its operand.
    #[error("bytecode too large")]
    TooLarge,

    /// An opcode that is reserved or unknown.
    #[error("invalid opcode {opcode:#04x} at {addr:05x}")]
    InvalidOpcode { opcode: u8, addr: usize },

    /// An opcode that is defined but not implemented by the VM.
    #[error("opcode {opcode:#04x} at {addr:05x} is not implemented")]
    UnimplementedOpcode { opcode: u8, addr: usize },

    /// The bytecode ends in the middle of an instruction.
    #[error("truncated instruction at {0:05x}")]
    TruncatedInstruction(usize),

    /// A branch or fork whose target is before the start of the code.
    #[error("invalid jump target at {0:05x}")]
    InvalidJumpTarget(usize),

    /// A return instruction was executed with an empty call stack.
    #[error("frame stack underflow at {0:05x}")]
    FrameStackUnderflow(usize),

    /// A group end marker was executed without a matching group begin.
    #[error("unbalanced group marker at {0:05x}")]
    UnbalancedGroupMarker(usize),

    /// A position that is beyond the input or is not on a character
    /// boundary.
    #[error("invalid input position {0}")]
    InvalidPosition(usize),
}

/// Returned by callbacks for telling their caller whether to continue or
/// stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    Stop,
}
