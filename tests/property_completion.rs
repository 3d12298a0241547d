//! Property-based tests for eager-future completion.
//!
//! # Strategy Equivalence
//! - Direct and Deferred store the same outcome for the same local invocation
//!
//! # Result Cell Invariants
//! - Exactly one write succeeds; later writes never change the stored outcome
//! - Reads are repeatable once an outcome is stored
//!
//! # Resolution Failure
//! - An unresolvable target never schedules work and never writes the cell

#[macro_use]
mod common;

use common::*;
use farcall::{
    CellState, DirectEagerFuture, EagerFuture, Error, ErrorKind, GlobalId, ResultCell,
};
use proptest::prelude::*;
use std::sync::OnceLock;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

/// One node shared by every case; building a worker pool per case is wasteful.
fn shared_node() -> &'static Node {
    static NODE: OnceLock<Node> = OnceLock::new();
    NODE.get_or_init(|| Node::new(0))
}

fn local_calculator() -> GlobalId {
    static CALC: OnceLock<GlobalId> = OnceLock::new();
    *CALC.get_or_init(|| shared_node().table.bind_local(Calculator))
}

/// A write attempt: `Ok(v)` stores a value, `Err(msg)` stores a failure.
fn arb_write() -> impl Strategy<Value = Result<i64, String>> {
    prop_oneof![
        any::<i64>().prop_map(Ok),
        "[a-z]{1,12}".prop_map(Err),
    ]
}

fn write(cell: &ResultCell<i64>, attempt: &Result<i64, String>) -> farcall::Result<()> {
    match attempt {
        Ok(value) => cell.write_value(*value),
        Err(msg) => cell.write_error(Error::action_failed(msg.clone())),
    }
}

fn summarize(outcome: farcall::Result<i64>) -> Result<i64, (ErrorKind, Option<String>)> {
    outcome.map_err(|err| (err.kind(), err.message().map(str::to_string)))
}

proptest! {
    #![proptest_config(test_proptest_config(64))]

    #[test]
    fn direct_and_deferred_agree_on_local_targets(a in any::<i64>(), b in any::<i64>()) {
        init_test_logging();
        let node = shared_node();
        let calc = local_calculator();

        let direct = DirectEagerFuture::<Add>::with_apply(&node.cx, &calc, (a, b))
            .expect("apply");
        let deferred = EagerFuture::<Add>::with_apply(&node.cx, &calc, (a, b))
            .expect("apply");

        let deferred = deferred.get_timeout(WAIT).expect("deferred completed");
        prop_assert_eq!(summarize(direct.get()), summarize(deferred));
    }

    #[test]
    fn direct_and_deferred_agree_on_failures(a in any::<i64>(), b in -2_i64..=2) {
        init_test_logging();
        let node = shared_node();
        let calc = local_calculator();

        let direct = DirectEagerFuture::<Div>::with_apply(&node.cx, &calc, (a, b))
            .expect("apply");
        let deferred = EagerFuture::<Div>::with_apply(&node.cx, &calc, (a, b))
            .expect("apply");

        let deferred = deferred.get_timeout(WAIT).expect("deferred completed");
        prop_assert_eq!(summarize(direct.get()), summarize(deferred));
    }

    #[test]
    fn only_the_first_write_is_stored(
        attempts in proptest::collection::vec(arb_write(), 1..8)
    ) {
        let cell = ResultCell::<i64>::new();
        let results: Vec<_> = attempts.iter().map(|a| write(&cell, a)).collect();

        prop_assert!(results[0].is_ok());
        for later in &results[1..] {
            let err = later.as_ref().expect_err("duplicate");
            prop_assert_eq!(err.kind(), ErrorKind::DuplicateCompletion);
        }

        let expected = match &attempts[0] {
            Ok(v) => Ok(*v),
            Err(msg) => Err((ErrorKind::ActionFailed, Some(msg.clone()))),
        };
        for _ in 0..3 {
            prop_assert_eq!(summarize(cell.read()), expected.clone());
        }
        let state = if attempts[0].is_ok() { CellState::Filled } else { CellState::Failed };
        prop_assert_eq!(cell.state(), state);
    }

    #[test]
    fn unresolvable_targets_never_write(msb in 1_u64..u64::MAX, lsb in any::<u64>()) {
        init_test_logging();
        let node = shared_node();
        let missing = GlobalId::new(msb, lsb);
        prop_assume!(!node.table.contains(&missing));

        let deferred = EagerFuture::<Add>::new(&node.cx);
        let direct = DirectEagerFuture::<Add>::new(&node.cx);
        prop_assert_eq!(
            deferred.apply(&missing, (1, 1)).map_err(|e| e.kind()),
            Err(ErrorKind::UnresolvedTarget)
        );
        prop_assert_eq!(
            direct.apply(&missing, (1, 1)).map_err(|e| e.kind()),
            Err(ErrorKind::UnresolvedTarget)
        );
        prop_assert_eq!(deferred.state(), CellState::Empty);
        prop_assert_eq!(direct.state(), CellState::Empty);
        prop_assert!(node.transport.is_empty());
    }
}
