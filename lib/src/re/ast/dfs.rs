//! Depth-first traversal of the regexp AST.
//!
//! [`DFSIter`] walks a tree in an [`Ast`] and emits a [`DFSEvent::Enter`]
//! when a node is visited for the first time, before visiting its children,
//! and a [`DFSEvent::Leave`] after all the node's children have been
//! visited. [`Prefix`] and [`Postfix`] are built on top of it, yielding only
//! the `Enter` and `Leave` events respectively.
//!
//! All the iterators are finite, and can be rewound to the beginning of
//! the traversal with their `rewind` method.
use crate::re::ast::{Ast, NodeId};

/// Events yielded by [`DFSIter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DFSEvent<T> {
    Enter(T),
    Leave(T),
}

/// An iterator that performs a depth-first search traversal of a tree.
#[derive(Debug, Clone)]
pub struct DFSIter<'a> {
    ast: &'a Ast,
    root: NodeId,
    stack: Vec<DFSEvent<NodeId>>,
}

impl<'a> DFSIter<'a> {
    /// Creates a new [`DFSIter`] that traverses the tree starting at the
    /// given node.
    pub fn new(ast: &'a Ast, root: NodeId) -> Self {
        Self { ast, root, stack: vec![DFSEvent::Enter(root)] }
    }

    /// Prevents the traversal of the children of the node that was entered
    /// most recently.
    ///
    /// The `Leave` event for that node is still emitted.
    pub fn prune(&mut self) {
        while let Some(DFSEvent::Enter(_)) = self.stack.last() {
            self.stack.pop();
        }
    }

    /// Restarts the traversal from the root.
    pub fn rewind(&mut self) {
        self.stack.clear();
        self.stack.push(DFSEvent::Enter(self.root));
    }
}

impl<'a> Iterator for DFSIter<'a> {
    type Item = DFSEvent<NodeId>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.stack.pop()? {
            DFSEvent::Enter(id) => {
                self.stack.push(DFSEvent::Leave(id));
                for child in self.ast.children(id).iter().rev() {
                    self.stack.push(DFSEvent::Enter(*child));
                }
                Some(DFSEvent::Enter(id))
            }
            DFSEvent::Leave(id) => Some(DFSEvent::Leave(id)),
        }
    }
}

/// Iterator that yields the nodes of a tree in prefix order.
#[derive(Debug, Clone)]
pub struct Prefix<'a>(DFSIter<'a>);

impl<'a> Prefix<'a> {
    pub fn new(ast: &'a Ast, root: NodeId) -> Self {
        Self(DFSIter::new(ast, root))
    }

    pub fn rewind(&mut self) {
        self.0.rewind()
    }
}

impl<'a> Iterator for Prefix<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let DFSEvent::Enter(id) = self.0.next()? {
                return Some(id);
            }
        }
    }
}

/// Iterator that yields the nodes of a tree in postfix order.
#[derive(Debug, Clone)]
pub struct Postfix<'a>(DFSIter<'a>);

impl<'a> Postfix<'a> {
    pub fn new(ast: &'a Ast, root: NodeId) -> Self {
        Self(DFSIter::new(ast, root))
    }

    pub fn rewind(&mut self) {
        self.0.rewind()
    }
}

impl<'a> Iterator for Postfix<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let DFSEvent::Leave(id) = self.0.next()? {
                return Some(id);
            }
        }
    }
}
