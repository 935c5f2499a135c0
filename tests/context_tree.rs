// tests/context_tree.rs
//
// Document inheritance across branches, terminal-transition rules, and the
// abandoned-branch policy.

mod common;
use crate::common::init_tracing;

use taskloom::context::ContextTree;
use taskloom::errors::TaskloomError;
use taskloom::types::AbandonedBranchPolicy;

#[test]
fn sibling_branches_inherit_shared_docs_but_not_each_others_deltas() {
    init_tracing();
    let mut tree = ContextTree::new();
    let root_id = tree
        .init_root(vec!["spec.md".to_string()])
        .unwrap()
        .node_id
        .clone();

    let bp = tree
        .branch(&root_id, 2, Some("shared.md".to_string()))
        .unwrap();
    let (b1, b2) = (bp.branches[0].clone(), bp.branches[1].clone());

    assert_eq!(tree.get_docs(&b1), vec!["spec.md", "shared.md"]);
    assert_eq!(tree.get_docs(&b2), vec!["spec.md", "shared.md"]);

    tree.add_doc(&b1, "work.md".to_string()).unwrap();

    assert_eq!(tree.get_docs(&b1), vec!["spec.md", "shared.md", "work.md"]);
    assert_eq!(tree.get_docs(&b2), vec!["spec.md", "shared.md"]);

    // The shared prefix lives on the branches, not on the source.
    assert_eq!(tree.get_docs(&root_id), vec!["spec.md"]);
}

#[test]
fn forking_a_terminal_node_creates_zero_nodes() {
    init_tracing();
    let mut tree = ContextTree::new();
    let root_id = tree.init_root(vec![]).unwrap().node_id.clone();
    let bp = tree.branch(&root_id, 2, None).unwrap();

    tree.complete(&bp.branches[0]).unwrap();
    tree.abandon(&bp.branches[1]).unwrap();

    for node in &bp.branches {
        let before = tree.active_nodes().len();
        assert!(matches!(
            tree.branch(node, 3, None),
            Err(TaskloomError::InvalidTransition(_))
        ));
        assert_eq!(tree.active_nodes().len(), before);
        assert_eq!(tree.children(node).len(), 0);
    }
}

#[test]
fn branch_point_completes_only_when_every_branch_settles() {
    init_tracing();
    let mut tree = ContextTree::new();
    let root_id = tree.init_root(vec![]).unwrap().node_id.clone();
    let bp = tree.branch(&root_id, 3, None).unwrap();

    assert!(!tree.is_branch_complete(&bp.id).unwrap());

    tree.complete(&bp.branches[0]).unwrap();
    assert!(!tree.is_branch_complete(&bp.id).unwrap());

    tree.merge_into(&bp.branches[1], &root_id).unwrap();
    assert!(!tree.is_branch_complete(&bp.id).unwrap());

    tree.complete(&bp.branches[2]).unwrap();
    assert!(tree.is_branch_complete(&bp.id).unwrap());
}

#[test]
fn abandoned_branch_blocks_completion_under_default_policy() {
    init_tracing();
    let mut tree = ContextTree::new();
    let root_id = tree.init_root(vec![]).unwrap().node_id.clone();
    let bp = tree.branch(&root_id, 2, None).unwrap();

    tree.complete(&bp.branches[0]).unwrap();
    tree.abandon(&bp.branches[1]).unwrap();

    assert!(!tree.is_branch_complete(&bp.id).unwrap());
}

#[test]
fn count_policy_treats_abandoned_as_terminal() {
    init_tracing();
    let mut tree = ContextTree::with_abandoned_policy(AbandonedBranchPolicy::Count);
    let root_id = tree.init_root(vec![]).unwrap().node_id.clone();
    let bp = tree.branch(&root_id, 2, None).unwrap();

    tree.complete(&bp.branches[0]).unwrap();
    tree.abandon(&bp.branches[1]).unwrap();

    assert!(tree.is_branch_complete(&bp.id).unwrap());
}

#[test]
fn nested_forks_stack_their_prefixes() {
    init_tracing();
    let mut tree = ContextTree::new();
    let root_id = tree
        .init_root(vec!["spec.md".to_string()])
        .unwrap()
        .node_id
        .clone();

    let outer = tree
        .branch(&root_id, 1, Some("outer.md".to_string()))
        .unwrap();
    let mid = outer.branches[0].clone();
    tree.add_doc(&mid, "mid.md".to_string()).unwrap();

    let inner = tree.branch(&mid, 1, Some("inner.md".to_string())).unwrap();
    let leaf = inner.branches[0].clone();

    assert_eq!(
        tree.get_docs(&leaf),
        vec!["spec.md", "outer.md", "mid.md", "inner.md"]
    );
}
