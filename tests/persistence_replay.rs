//! Journal replay and crash recovery.

#![cfg(feature = "persistent")]

use std::fs;

use provenance_guard::storage::persistent::JOURNAL_FILE;
use provenance_guard::{
    DerivationSpec, GuardConfig, GuardError, NodeId, NodeKind, NodeSpec, PersistenceError, ProvenanceGuard, ScanRoot,
};
use tempfile::tempdir;

fn id(s: &str) -> NodeId {
    NodeId::new(s).unwrap()
}

fn config() -> GuardConfig {
    let mut cfg = GuardConfig::audit();
    cfg.journal.sync_on_write = false;
    cfg
}

fn populate(guard: &ProvenanceGuard) {
    guard
        .register(DerivationSpec::source(
            NodeSpec::builder("A").value(2.0).build().unwrap(),
            NodeKind::Axiom,
        ))
        .unwrap();
    guard
        .register(DerivationSpec::source(
            NodeSpec::builder("E").value(0.5).build().unwrap(),
            NodeKind::Empirical,
        ))
        .unwrap();
    guard
        .register(DerivationSpec::derived(
            NodeSpec::builder("B").formula("B = 2A").value(4.0).build().unwrap(),
            vec![id("A")],
        ))
        .unwrap();
    guard
        .register(DerivationSpec::derived(
            NodeSpec::builder("C").formula("C = A + E").value(2.5).build().unwrap(),
            vec![id("A"), id("E")],
        ))
        .unwrap();
    guard.seal(&id("A")).unwrap();
    guard.seal(&id("B")).unwrap();
    let obs = guard.record_observation(&id("B"), 4.0).unwrap();
    guard.compare(&id("B"), &obs, 0.0).unwrap();
}

#[test]
fn reopen_reconstructs_identical_state() {
    let dir = tempdir().unwrap();
    let (run_id, nodes, edges, seals, verdicts, last) = {
        let guard = ProvenanceGuard::open(dir.path(), config()).unwrap();
        populate(&guard);
        (
            guard.run_id(),
            guard.nodes().unwrap(),
            guard.edges().unwrap(),
            guard.seals().unwrap(),
            guard.verdicts().unwrap(),
            guard.current_sequence(),
        )
    };

    for _ in 0..2 {
        let guard = ProvenanceGuard::open(dir.path(), config()).unwrap();
        assert_eq!(guard.run_id(), run_id);
        assert_eq!(guard.nodes().unwrap(), nodes);
        assert_eq!(guard.edges().unwrap(), edges);
        assert_eq!(guard.seals().unwrap(), seals);
        assert_eq!(guard.verdicts().unwrap(), verdicts);
        assert_eq!(guard.current_sequence(), last);
        assert_eq!(guard.scan(&ScanRoot::All).unwrap().paths.len(), 1);
        assert!(guard.verify_latest(&id("B")).is_ok());
    }
}

#[test]
fn new_sequences_continue_after_replay() {
    let dir = tempdir().unwrap();
    let last = {
        let guard = ProvenanceGuard::open(dir.path(), config()).unwrap();
        populate(&guard);
        guard.current_sequence()
    };
    let guard = ProvenanceGuard::open(dir.path(), config()).unwrap();
    let seq = guard.add_node(NodeSpec::builder("late").build().unwrap()).unwrap();
    assert!(seq > last);
}

#[test]
fn torn_tail_is_dropped_on_reopen() {
    let dir = tempdir().unwrap();
    {
        let guard = ProvenanceGuard::open(dir.path(), config()).unwrap();
        populate(&guard);
    }

    let path = dir.path().join(JOURNAL_FILE);
    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    // Keep the header and the first three registrations, then half of the
    // next line.
    let kept = lines.len() / 2;
    let mut torn = lines[..kept].join("\n");
    torn.push('\n');
    torn.push_str(&lines[kept][..lines[kept].len() / 2]);
    fs::write(&path, torn).unwrap();

    let guard = ProvenanceGuard::open(dir.path(), config()).unwrap();
    assert!(guard.nodes().unwrap().len() < 4);
    assert!(guard.verdicts().unwrap().is_empty());
    // The journal is writable again after the cut.
    guard.add_node(NodeSpec::builder("after_crash").build().unwrap()).unwrap();
    drop(guard);

    let guard = ProvenanceGuard::open(dir.path(), config()).unwrap();
    assert!(guard.node(&id("after_crash")).is_ok());
}

#[test]
fn torn_registration_leaves_no_partial_node() {
    let dir = tempdir().unwrap();
    {
        let guard = ProvenanceGuard::open(dir.path(), config()).unwrap();
        populate(&guard);
    }

    let path = dir.path().join(JOURNAL_FILE);
    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    // Header, four registrations, two seals, one observation, one verdict.
    assert_eq!(lines.len(), 9);

    // Cut C's registration (node, two edges, classification) mid-line.
    let mut torn = lines[..4].join("\n");
    torn.push('\n');
    torn.push_str(&lines[4][..lines[4].len() - 10]);
    fs::write(&path, torn).unwrap();

    let guard = ProvenanceGuard::open(dir.path(), config()).unwrap();
    assert!(guard.node(&id("C")).is_err());
    assert!(guard.edges().unwrap().iter().all(|e| e.to != id("C")));
    assert!(guard.neighbors_out(&id("E")).unwrap().is_empty());
    assert!(guard.check_invariants().unwrap().is_empty());
}

#[test]
fn flipped_byte_stops_replay_at_that_line() {
    let dir = tempdir().unwrap();
    {
        let guard = ProvenanceGuard::open(dir.path(), config()).unwrap();
        populate(&guard);
    }

    let path = dir.path().join(JOURNAL_FILE);
    let text = fs::read_to_string(&path).unwrap();
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    // Line 2 is the first node registration; corrupt the one after it.
    lines[2] = lines[2].replacen('"', "'", 1);
    fs::write(&path, lines.join("\n") + "\n").unwrap();

    let guard = ProvenanceGuard::open(dir.path(), config()).unwrap();
    assert_eq!(guard.nodes().unwrap().len(), 1);
    assert!(guard.seals().unwrap().is_empty());
}

#[test]
fn second_open_is_locked_out() {
    let dir = tempdir().unwrap();
    let _first = ProvenanceGuard::open(dir.path(), config()).unwrap();
    assert!(matches!(
        ProvenanceGuard::open(dir.path(), config()),
        Err(GuardError::Persistence(PersistenceError::Locked { .. }))
    ));
}
