use std::sync::{Arc, Mutex, MutexGuard};

use dagstore::{
    DagStoreError, GraphCreate, GraphError, GraphService, GraphStore, SqliteGraphStore,
    fault_injection::{FaultPoint, configure_fault, reset_faults},
};

// Fault registry is process-wide; tests in this binary take turns.
static FAULT_LOCK: Mutex<()> = Mutex::new(());

fn fault_guard() -> MutexGuard<'static, ()> {
    let guard = FAULT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    reset_faults();
    guard
}

fn service() -> GraphService<SqliteGraphStore> {
    GraphService::new(Arc::new(SqliteGraphStore::open_in_memory().unwrap()))
}

fn is_injected(err: &GraphError) -> bool {
    matches!(err, GraphError::Storage(DagStoreError::FaultInjected(_)))
}

#[test]
fn create_rolls_back_on_fault() {
    let _guard = fault_guard();
    let service = service();
    configure_fault(FaultPoint::CreateGraphBeforeCommit, 1);

    let request = GraphCreate::new(["a", "b", "c"], [("a", "b"), ("b", "c")]);
    let err = service.create_graph(&request).unwrap_err();
    assert!(is_injected(&err), "{err:?}");
    assert_eq!(service.store().graph_count().unwrap(), 0);

    // The fault fires once; the retry commits.
    let id = service.create_graph(&request).unwrap();
    assert_eq!(service.read_graph(id).unwrap().edge_count(), 2);
    assert_eq!(service.store().graph_count().unwrap(), 1);
}

#[test]
fn delete_rolls_back_on_fault() {
    let _guard = fault_guard();
    let service = service();
    let id = service
        .create_graph(&GraphCreate::new(["a", "b", "c"], [("a", "b"), ("b", "c")]))
        .unwrap();
    configure_fault(FaultPoint::DeleteNodeBeforeCommit, 1);

    let err = service.delete_node(id, "b").unwrap_err();
    assert!(is_injected(&err), "{err:?}");
    let snapshot = service.read_graph(id).unwrap();
    assert_eq!(snapshot.nodes, vec!["a", "b", "c"]);
    assert_eq!(snapshot.edge_count(), 2);

    service.delete_node(id, "b").unwrap();
    assert_eq!(service.read_graph(id).unwrap().edge_count(), 0);
}

#[test]
fn last_node_delete_rolls_back_graph_removal() {
    let _guard = fault_guard();
    let service = service();
    let id = service
        .create_graph(&GraphCreate::new(["a"], Vec::<(String, String)>::new()))
        .unwrap();
    configure_fault(FaultPoint::DeleteNodeBeforeCommit, 1);

    assert!(is_injected(&service.delete_node(id, "a").unwrap_err()));
    assert!(service.store().exists_any_node(id).unwrap());
    assert_eq!(service.read_graph(id).unwrap().nodes, vec!["a"]);
}

#[test]
fn fault_counts_down() {
    let _guard = fault_guard();
    let service = service();
    configure_fault(FaultPoint::CreateGraphBeforeCommit, 2);
    let request = GraphCreate::new(["a"], Vec::<(String, String)>::new());
    assert!(service.create_graph(&request).is_err());
    assert!(service.create_graph(&request).is_err());
    assert!(service.create_graph(&request).is_ok());
}

#[test]
fn reset_clears_pending_faults() {
    let _guard = fault_guard();
    let service = service();
    configure_fault(FaultPoint::CreateGraphBeforeCommit, 5);
    reset_faults();
    assert!(
        service
            .create_graph(&GraphCreate::new(["a"], Vec::<(String, String)>::new()))
            .is_ok()
    );
}

#[test]
fn unarmed_points_never_fire() {
    let _guard = fault_guard();
    let service = service();
    configure_fault(FaultPoint::DeleteNodeBeforeCommit, 3);
    configure_fault(FaultPoint::DeleteNodeBeforeCommit, 0);
    for _ in 0..20 {
        let id = service
            .create_graph(&GraphCreate::new(["a", "b"], [("a", "b")]))
            .unwrap();
        service.delete_node(id, "a").unwrap();
        service.delete_node(id, "b").unwrap();
    }
    assert_eq!(service.store().graph_count().unwrap(), 0);
}

#[test]
fn points_count_down_independently() {
    let _guard = fault_guard();
    let service = service();
    configure_fault(FaultPoint::DeleteNodeBeforeCommit, 1);
    let id = service
        .create_graph(&GraphCreate::new(["a"], Vec::<(String, String)>::new()))
        .unwrap();
    assert!(is_injected(&service.delete_node(id, "a").unwrap_err()));
    service.delete_node(id, "a").unwrap();
}
