/*! Abstract Syntax Tree (AST) for regular expressions.

The AST is stored in an arena ([`Ast`]). Nodes are identified by [`NodeId`]
handles, and each node keeps the handle of its parent and the handles of its
children. Nodes are never deallocated: a node that is removed from its parent
stays in the arena, detached from the tree, until the whole [`Ast`] is
dropped.

There are two kinds of nodes: operators and terminals. Terminals are always
leaves, and describe a set of accepted code points as a list of
[`Interval`]. Operators have children, except for the
[`Operator::TokenExpressionCall`], which is a leaf that refers to another
token.
*/

use std::fmt::{Display, Formatter};

use crate::re::intervals::Interval;
use crate::re::{Action, Error, TokenKey};

#[cfg(feature = "ascii-tree")]
mod ascii_tree;
pub mod dfs;

use dfs::{DFSEvent, DFSIter, Postfix, Prefix};

/// Handle that identifies a node in an [`Ast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Returns the index of the node in the arena.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Operator associativity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    LeftToRight,
    RightToLeft,
}

/// Each of the operators supported in the AST, without their arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorType {
    RegexAlternation,
    Accept,
    TokenExpressionCall,
    Alternation,
    Concatenation,
    Repetition,
}

impl OperatorType {
    /// Numeric key of the operator type.
    pub fn key(self) -> u8 {
        match self {
            Self::RegexAlternation => 0,
            Self::Accept => 1,
            Self::TokenExpressionCall => 2,
            Self::Alternation => 3,
            Self::Concatenation => 4,
            Self::Repetition => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::RegexAlternation => "regex_alternation",
            Self::Accept => "accept",
            Self::TokenExpressionCall => "call",
            Self::Alternation => "alternation",
            Self::Concatenation => "concatenation",
            Self::Repetition => "repetition",
        }
    }

    /// Number of operands taken by the operator. Binary operators can end
    /// up with more than two children after their operands are flattened.
    pub fn arity(self) -> usize {
        match self {
            Self::RegexAlternation => 2,
            Self::Accept => 0,
            Self::TokenExpressionCall => 0,
            Self::Alternation => 2,
            Self::Concatenation => 2,
            Self::Repetition => 1,
        }
    }

    pub fn priority(self) -> u32 {
        match self {
            Self::RegexAlternation => 1,
            Self::Accept => 20,
            Self::TokenExpressionCall => 10,
            Self::Alternation => 1,
            Self::Concatenation => 2,
            Self::Repetition => 3,
        }
    }

    pub fn associativity(self) -> Associativity {
        Associativity::LeftToRight
    }

    /// Returns true if `self` binds tighter than `other`.
    #[inline]
    pub fn precedes(self, other: OperatorType) -> bool {
        self.priority() > other.priority()
    }
}

/// Arguments of a repetition operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repetition {
    pub min: u32,
    /// Maximum number of repetitions, `None` means unbounded.
    pub max: Option<u32>,
    pub greedy: bool,
}

/// An operator together with its static arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    /// Top-level alternation between all the tokens in a lexer. All its
    /// children are [`Operator::Accept`] nodes.
    RegexAlternation,
    /// Accepts the token identified by the key when its only child matches.
    Accept(TokenKey),
    /// Matches whatever the regexp of another token matches.
    TokenExpressionCall(TokenKey),
    Alternation,
    Concatenation,
    Repetition(Repetition),
}

impl Operator {
    pub fn op_type(&self) -> OperatorType {
        match self {
            Self::RegexAlternation => OperatorType::RegexAlternation,
            Self::Accept(_) => OperatorType::Accept,
            Self::TokenExpressionCall(_) => OperatorType::TokenExpressionCall,
            Self::Alternation => OperatorType::Alternation,
            Self::Concatenation => OperatorType::Concatenation,
            Self::Repetition(_) => OperatorType::Repetition,
        }
    }

    /// Returns true if the operator carries static arguments.
    pub fn has_static_args(&self) -> bool {
        matches!(
            self,
            Self::Accept(_)
                | Self::TokenExpressionCall(_)
                | Self::Repetition(_)
        )
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = self.op_type().name();
        match self {
            Self::Accept(key) | Self::TokenExpressionCall(key) => {
                write!(f, "{}({})", name, key)
            }
            Self::Repetition(rep) => {
                write!(f, "{}{{{},", name, rep.min)?;
                if let Some(max) = rep.max {
                    write!(f, "{}", max)?;
                }
                write!(f, "}}{}", if rep.greedy { "" } else { "?" })
            }
            _ => write!(f, "{}", name),
        }
    }
}

/// The content of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Operator(Operator),
    /// Set of accepted code points.
    Terminal(Vec<Interval>),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    group_root: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena that owns the nodes of one or more trees.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes in the arena, including detached ones.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Creates a detached operator node.
    pub fn add_operator(&mut self, operator: Operator) -> NodeId {
        self.push(NodeKind::Operator(operator))
    }

    /// Creates a detached terminal node.
    pub fn add_terminal(&mut self, intervals: Vec<Interval>) -> NodeId {
        self.push(NodeKind::Terminal(intervals))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            group_root: false,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    #[inline]
    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    #[inline]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    /// Returns the operator in the node, or `None` if the node is a
    /// terminal.
    pub fn operator(&self, id: NodeId) -> Option<&Operator> {
        match &self.node(id).kind {
            NodeKind::Operator(op) => Some(op),
            NodeKind::Terminal(_) => None,
        }
    }

    /// Returns true if the node is the root of a parenthesized group.
    #[inline]
    pub fn is_group_root(&self, id: NodeId) -> bool {
        self.node(id).group_root
    }

    pub fn set_group_root(&mut self, id: NodeId, yes: bool) {
        self.node_mut(id).group_root = yes;
    }

    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    #[inline]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).children.as_slice()
    }

    #[inline]
    pub fn child_count(&self, id: NodeId) -> usize {
        self.node(id).children.len()
    }

    pub fn child_at(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.node(id).children.get(index).copied()
    }

    #[inline]
    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.node(id).children.is_empty()
    }

    /// Returns the root of the tree that contains the node.
    pub fn root(&self, mut id: NodeId) -> NodeId {
        while let Some(parent) = self.parent(id) {
            id = parent;
        }
        id
    }

    /// Returns the position of the node among its siblings, or `None` if
    /// the node has no parent.
    pub fn child_index(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|child| *child == id)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.child_index(id)?;
        self.child_at(parent, index + 1)
    }

    /// Returns the first leaf found while descending from the node through
    /// the first child at each level.
    pub fn leftmost_leaf(&self, mut id: NodeId) -> NodeId {
        while let Some(first) = self.child_at(id, 0) {
            id = first;
        }
        id
    }

    /// Makes sure that `child` can be adopted by `parent`.
    fn check_adoption(
        &self,
        parent: NodeId,
        child: NodeId,
    ) -> Result<(), Error> {
        if parent == child {
            return Err(Error::NodeIsOwnChild(child));
        }
        if self.node(parent).children.contains(&child) {
            return Err(Error::DuplicateChild { parent, child });
        }
        let mut ancestor = self.parent(parent);
        while let Some(id) = ancestor {
            if id == child {
                return Err(Error::CyclicTree { parent, child });
            }
            ancestor = self.parent(id);
        }
        Ok(())
    }

    /// Removes the node from its current parent, if any.
    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.node_mut(id).parent.take() {
            self.node_mut(parent).children.retain(|child| *child != id);
        }
    }

    /// Appends `child` to the children of `parent`. If `child` already had
    /// a parent it is removed from it first.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
    ) -> Result<(), Error> {
        self.check_adoption(parent, child)?;
        self.detach(child);
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.push(child);
        Ok(())
    }

    /// Inserts `children` at position `index` among the children of
    /// `parent`, preserving their order.
    pub fn insert_children(
        &mut self,
        parent: NodeId,
        index: usize,
        children: &[NodeId],
    ) -> Result<(), Error> {
        let count = self.child_count(parent);
        if index > count {
            return Err(Error::ChildIndexOutOfRange { index, count });
        }
        for (i, child) in children.iter().copied().enumerate() {
            self.check_adoption(parent, child)?;
            self.detach(child);
            self.node_mut(child).parent = Some(parent);
            self.node_mut(parent).children.insert(index + i, child);
        }
        Ok(())
    }

    /// Removes `child` from the children of `parent`. Returns the position
    /// the child had, or `None` if `child` was not a child of `parent`.
    pub fn remove_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
    ) -> Option<usize> {
        let index =
            self.children(parent).iter().position(|id| *id == child)?;
        self.node_mut(parent).children.remove(index);
        self.node_mut(child).parent = None;
        Some(index)
    }

    /// Removes the child at position `index` and returns it.
    pub fn remove_child_at(
        &mut self,
        parent: NodeId,
        index: usize,
    ) -> Result<NodeId, Error> {
        let count = self.child_count(parent);
        if index >= count {
            return Err(Error::ChildIndexOutOfRange { index, count });
        }
        let child = self.node_mut(parent).children.remove(index);
        self.node_mut(child).parent = None;
        Ok(child)
    }

    /// Removes all the children of `parent` and returns them.
    pub fn remove_all_children(&mut self, parent: NodeId) -> Vec<NodeId> {
        let children = std::mem::take(&mut self.node_mut(parent).children);
        for child in children.iter() {
            self.node_mut(*child).parent = None;
        }
        children
    }

    /// Returns a depth-first iterator that yields an event when entering
    /// and when leaving each node in the tree rooted at `id`.
    pub fn dfs(&self, id: NodeId) -> DFSIter<'_> {
        DFSIter::new(self, id)
    }

    /// Returns an iterator that yields the nodes in the tree rooted at `id`
    /// in prefix order (parents before children).
    pub fn prefix(&self, id: NodeId) -> Prefix<'_> {
        Prefix::new(self, id)
    }

    /// Returns an iterator that yields the nodes in the tree rooted at `id`
    /// in postfix order (children before parents).
    pub fn postfix(&self, id: NodeId) -> Postfix<'_> {
        Postfix::new(self, id)
    }

    /// Calls `f` for every node in prefix order until it returns
    /// [`Action::Stop`]. Returns [`Action::Stop`] if the traversal was
    /// interrupted.
    pub fn traverse_by_prefix<F>(&self, id: NodeId, mut f: F) -> Action
    where
        F: FnMut(NodeId) -> Action,
    {
        for node in self.prefix(id) {
            if f(node) == Action::Stop {
                return Action::Stop;
            }
        }
        Action::Continue
    }

    /// Same as [`Ast::traverse_by_prefix`] but in postfix order.
    pub fn traverse_by_postfix<F>(&self, id: NodeId, mut f: F) -> Action
    where
        F: FnMut(NodeId) -> Action,
    {
        for node in self.postfix(id) {
            if f(node) == Action::Stop {
                return Action::Stop;
            }
        }
        Action::Continue
    }

    /// Returns true if the tree rooted at `id` and the tree rooted at
    /// `other_id` in `other` have the same shape, and their nodes have the
    /// same content and group flags.
    pub fn subtree_equals(
        &self,
        id: NodeId,
        other: &Ast,
        other_id: NodeId,
    ) -> bool {
        let mut lhs = self.dfs(id);
        let mut rhs = other.dfs(other_id);
        loop {
            match (lhs.next(), rhs.next()) {
                (None, None) => return true,
                (Some(DFSEvent::Enter(l)), Some(DFSEvent::Enter(r))) => {
                    if self.kind(l) != other.kind(r)
                        || self.is_group_root(l) != other.is_group_root(r)
                    {
                        return false;
                    }
                }
                (Some(DFSEvent::Leave(_)), Some(DFSEvent::Leave(_))) => {}
                _ => return false,
            }
        }
    }

    /// Copies the tree rooted at `other_id` in `other` into this arena and
    /// returns the root of the copy, which is detached.
    pub fn graft(&mut self, other: &Ast, other_id: NodeId) -> NodeId {
        let mut stack: Vec<NodeId> = Vec::new();
        let mut root = None;
        for event in other.dfs(other_id) {
            match event {
                DFSEvent::Enter(id) => {
                    let copy = self.push(other.kind(id).clone());
                    self.set_group_root(copy, other.is_group_root(id));
                    if let Some(parent) = stack.last().copied() {
                        self.node_mut(copy).parent = Some(parent);
                        self.node_mut(parent).children.push(copy);
                    }
                    stack.push(copy);
                }
                DFSEvent::Leave(_) => {
                    root = stack.pop();
                }
            }
        }
        // The traversal always enters and leaves `other_id`.
        root.unwrap()
    }

    /// Returns a representation of the tree rooted at `id` as an ASCII
    /// tree.
    #[cfg(feature = "ascii-tree")]
    pub fn ascii_tree(&self, id: NodeId) -> ::ascii_tree::Tree {
        ascii_tree::node_ascii_tree(self, id)
    }
}

#[cfg(test)]
mod tests;
