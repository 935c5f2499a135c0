// tests/property_graph.rs
//
// Property tests over randomly generated DAGs and context trees.

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;

use taskloom::context::ContextTree;
use taskloom::graph::{Task, TaskGraph};

/// Random acyclic dependency lists: task N may only depend on tasks 0..N.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(move |raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, deps)| {
                    let valid: HashSet<usize> =
                        deps.into_iter().filter(|_| i > 0).map(|d| d % i).collect();
                    valid.into_iter().collect()
                })
                .collect()
        })
    })
}

fn build_graph(deps: &[Vec<usize>]) -> TaskGraph {
    let mut graph = TaskGraph::new();
    for i in 0..deps.len() {
        graph
            .add_task(Task::new(format!("Task {i}"), "").with_id(format!("task-{i}")))
            .unwrap();
    }
    for (i, task_deps) in deps.iter().enumerate() {
        for dep in task_deps {
            graph
                .add_dependency(&format!("task-{dep}"), &format!("task-{i}"))
                .unwrap();
        }
    }
    graph
}

proptest! {
    /// `execution_order` puts every dependency before its dependent.
    #[test]
    fn execution_order_is_topological(deps in dag_strategy(10)) {
        let graph = build_graph(&deps);
        let order = graph.execution_order().unwrap();
        prop_assert_eq!(order.len(), deps.len());

        let pos: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        for (i, task_deps) in deps.iter().enumerate() {
            let id = format!("task-{i}");
            for dep in task_deps {
                let dep_id = format!("task-{dep}");
                prop_assert!(
                    pos[dep_id.as_str()] < pos[id.as_str()],
                    "{} must precede {}", dep_id, id
                );
            }
        }
    }

    /// A ready task's dependencies are all completed, for an arbitrary
    /// completed subset of the tasks.
    #[test]
    fn ready_tasks_have_completed_dependencies(
        deps in dag_strategy(10),
        completed_mask in any::<u16>(),
    ) {
        let mut graph = build_graph(&deps);

        for i in 0..deps.len() {
            if completed_mask & (1 << i) != 0 {
                graph.mark_completed(&format!("task-{i}"), None).unwrap();
            }
        }

        let completed: HashSet<String> = graph
            .tasks()
            .filter(|t| t.is_completed())
            .map(|t| t.id.clone())
            .collect();

        for ready in graph.ready_tasks() {
            prop_assert!(ready.is_pending());
            for dep in graph.dependencies_of(&ready.id) {
                prop_assert!(completed.contains(&dep), "dep {} of ready {} not completed", dep, ready.id);
            }
        }
    }

    /// `get_docs` never yields duplicates and keeps first-occurrence order,
    /// however the doc names collide across levels.
    #[test]
    fn get_docs_is_duplicate_free(
        level_docs in proptest::collection::vec(
            proptest::collection::vec("[a-d]", 0..4),
            1..5,
        ),
    ) {
        let mut tree = ContextTree::new();
        let mut node_id = tree.init_root(vec![]).unwrap().node_id.clone();

        for docs in &level_docs {
            for doc in docs {
                tree.add_doc(&node_id, format!("{doc}.md")).unwrap();
            }
            let bp = tree.branch(&node_id, 1, Some("shared.md".to_string())).unwrap();
            node_id = bp.branches[0].clone();
        }

        let docs = tree.get_docs(&node_id);
        let unique: HashSet<&String> = docs.iter().collect();
        prop_assert_eq!(unique.len(), docs.len(), "duplicates in {:?}", docs);
    }
}
