/*! Functions that return an ASCII representation of regexp ASTs.*/

use ::ascii_tree::Tree;
use ::ascii_tree::Tree::{Leaf, Node};
use itertools::Itertools;

use crate::re::ast::dfs::DFSEvent;
use crate::re::ast::{Ast, NodeId, NodeKind};
use crate::re::intervals::Interval;

/// Returns a representation of the tree rooted at `root` as an ASCII tree.
pub(crate) fn node_ascii_tree(ast: &Ast, root: NodeId) -> Tree {
    let mut tree_stack: Vec<Tree> = Vec::new();
    let mut len_stack: Vec<usize> = Vec::new();

    for event in ast.dfs(root) {
        match event {
            DFSEvent::Enter(_) => {
                len_stack.push(tree_stack.len());
            }
            DFSEvent::Leave(id) => {
                // Anything pushed into `tree_stack` after entering the node
                // is a child of the node.
                let children_start = len_stack.pop().unwrap();
                let children = tree_stack.drain(children_start..).collect();
                tree_stack.push(build_tree_for_node(ast, id, children));
            }
        }
    }

    assert_eq!(tree_stack.len(), 1);
    tree_stack.pop().unwrap()
}

fn build_tree_for_node(ast: &Ast, id: NodeId, children: Vec<Tree>) -> Tree {
    let mut label = match ast.kind(id) {
        NodeKind::Operator(op) => op.to_string(),
        NodeKind::Terminal(intervals) => {
            intervals.iter().map(interval_label).join(" ")
        }
    };

    if ast.is_group_root(id) {
        label = format!("group {}", label);
    }

    if children.is_empty() {
        Leaf(vec![label])
    } else {
        Node(label, children)
    }
}

fn interval_label(interval: &Interval) -> String {
    let fmt_char = |c: u32| match char::from_u32(c) {
        Some(ch) if ch.is_ascii_graphic() => format!("'{}'", ch),
        _ => format!("{:#x}", c),
    };
    if interval.is_single() {
        fmt_char(interval.min())
    } else {
        format!("{}-{}", fmt_char(interval.min()), fmt_char(interval.max()))
    }
}
