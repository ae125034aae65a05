use pretty_assertions::assert_eq;

use crate::re::ast::dfs::DFSEvent;
use crate::re::ast::{Ast, NodeId, Operator, OperatorType, Repetition};
use crate::re::intervals::Interval;
use crate::re::{Action, Error};

/// Builds `concatenation('a', repetition('b'), 'c')` and returns the arena
/// together with the handles of the nodes, in creation order.
fn sample() -> (Ast, Vec<NodeId>) {
    let mut ast = Ast::new();
    let concat = ast.add_operator(Operator::Concatenation);
    let a = ast.add_terminal(vec![Interval::single('a' as u32)]);
    let rep = ast.add_operator(Operator::Repetition(Repetition {
        min: 0,
        max: None,
        greedy: true,
    }));
    let b = ast.add_terminal(vec![Interval::single('b' as u32)]);
    let c = ast.add_terminal(vec![Interval::single('c' as u32)]);

    ast.add_child(concat, a).unwrap();
    ast.add_child(concat, rep).unwrap();
    ast.add_child(rep, b).unwrap();
    ast.add_child(concat, c).unwrap();

    (ast, vec![concat, a, rep, b, c])
}

#[test]
fn navigation() {
    let (ast, ids) = sample();
    let [concat, a, rep, b, c] = ids[..] else { unreachable!() };

    assert_eq!(ast.children(concat), &[a, rep, c]);
    assert_eq!(ast.parent(b), Some(rep));
    assert_eq!(ast.root(b), concat);
    assert_eq!(ast.child_index(rep), Some(1));
    assert_eq!(ast.child_index(concat), None);
    assert_eq!(ast.next_sibling(a), Some(rep));
    assert_eq!(ast.next_sibling(c), None);
    assert_eq!(ast.leftmost_leaf(concat), a);
    assert!(ast.is_leaf(b));
    assert!(!ast.is_leaf(rep));
}

#[test]
fn traversal_orders() {
    let (ast, ids) = sample();
    let [concat, a, rep, b, c] = ids[..] else { unreachable!() };

    assert_eq!(
        ast.prefix(concat).collect::<Vec<_>>(),
        vec![concat, a, rep, b, c]
    );
    assert_eq!(
        ast.postfix(concat).collect::<Vec<_>>(),
        vec![a, b, rep, c, concat]
    );

    let mut iter = ast.postfix(concat);
    assert_eq!(iter.next(), Some(a));
    iter.rewind();
    assert_eq!(iter.count(), 5);

    let mut dfs = ast.dfs(concat);
    assert_eq!(dfs.next(), Some(DFSEvent::Enter(concat)));
    assert_eq!(dfs.next(), Some(DFSEvent::Enter(a)));
    assert_eq!(dfs.next(), Some(DFSEvent::Leave(a)));
    assert_eq!(dfs.next(), Some(DFSEvent::Enter(rep)));
    dfs.prune();
    assert_eq!(dfs.next(), Some(DFSEvent::Leave(rep)));
    assert_eq!(dfs.next(), Some(DFSEvent::Enter(c)));
}

#[test]
fn traversal_callbacks() {
    let (ast, ids) = sample();
    let [concat, _, rep, _, _] = ids[..] else { unreachable!() };

    let mut visited = Vec::new();
    let action = ast.traverse_by_prefix(concat, |id| {
        visited.push(id);
        if id == rep {
            Action::Stop
        } else {
            Action::Continue
        }
    });

    assert_eq!(action, Action::Stop);
    assert_eq!(visited.len(), 3);

    let mut count = 0;
    let action = ast.traverse_by_postfix(concat, |_| {
        count += 1;
        Action::Continue
    });

    assert_eq!(action, Action::Continue);
    assert_eq!(count, 5);
}

#[test]
fn mutation() {
    let (mut ast, ids) = sample();
    let [concat, a, rep, b, c] = ids[..] else { unreachable!() };

    assert_eq!(
        ast.add_child(concat, concat),
        Err(Error::NodeIsOwnChild(concat))
    );
    assert_eq!(
        ast.add_child(concat, a),
        Err(Error::DuplicateChild { parent: concat, child: a })
    );
    assert_eq!(
        ast.add_child(b, concat),
        Err(Error::CyclicTree { parent: b, child: concat })
    );

    // Moving `c` under `rep` removes it from `concat`.
    ast.add_child(rep, c).unwrap();
    assert_eq!(ast.children(concat), &[a, rep]);
    assert_eq!(ast.children(rep), &[b, c]);

    assert_eq!(ast.remove_child(rep, b), Some(0));
    assert_eq!(ast.remove_child(rep, b), None);
    assert_eq!(ast.parent(b), None);

    ast.insert_children(concat, 0, &[b, c]).unwrap();
    assert_eq!(ast.children(concat), &[b, c, a, rep]);
    assert!(ast.is_leaf(rep));

    assert_eq!(
        ast.remove_child_at(concat, 4),
        Err(Error::ChildIndexOutOfRange { index: 4, count: 4 })
    );
    assert_eq!(ast.remove_child_at(concat, 2), Ok(a));
    assert_eq!(ast.remove_all_children(concat), vec![b, c, rep]);
    assert!(ast.is_leaf(concat));
}

#[test]
fn graft_and_compare() {
    let (ast, ids) = sample();
    let concat = ids[0];

    let mut other = Ast::new();
    let root = other.add_operator(Operator::RegexAlternation);
    let copy = other.graft(&ast, concat);

    assert_eq!(other.parent(copy), None);
    assert!(other.subtree_equals(copy, &ast, concat));

    other.add_child(root, copy).unwrap();
    assert_eq!(other.len(), 6);

    let second = other.children(copy)[1];
    other.set_group_root(second, true);
    assert!(!other.subtree_equals(copy, &ast, concat));
    assert!(!ast.subtree_equals(concat, &ast, ids[2]));
}

#[test]
fn operator_types() {
    let op = Operator::Repetition(Repetition {
        min: 1,
        max: Some(3),
        greedy: false,
    });

    assert_eq!(op.op_type(), OperatorType::Repetition);
    assert_eq!(op.op_type().key(), 5);
    assert_eq!(op.op_type().arity(), 1);
    assert_eq!(op.to_string(), "repetition{1,3}?");
    assert!(op.has_static_args());

    assert_eq!(Operator::Accept(7).to_string(), "accept(7)");
    assert_eq!(OperatorType::RegexAlternation.key(), 0);
    assert!(!Operator::Alternation.has_static_args());

    assert!(OperatorType::Concatenation.precedes(OperatorType::Alternation));
    assert!(OperatorType::Repetition.precedes(OperatorType::Concatenation));
    assert!(!OperatorType::Alternation.precedes(OperatorType::Alternation));
}
