#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use farcall::{
    Action, AddressTable, AnyComponent, Component, ComponentType, Config, Cx, Error, GlobalId, LocalityId,
    LocalityRouter, Metrics, QueueTransport, Result,
};
use proptest::prelude::ProptestConfig;
use proptest::test_runner::RngSeed;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Default seed for property tests when running under CI.
pub const DEFAULT_PROPTEST_SEED: u64 = 0x5EED5EED;

const PROPTEST_SEED_ENV: &str = "FARCALL_PROPTEST_SEED";

/// Build a ProptestConfig with deterministic seed support for CI.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    let mut config = ProptestConfig::with_cases(cases);
    // Honor existing PROPTEST_RNG_SEED, otherwise apply our own.
    if matches!(config.rng_seed, RngSeed::Random) {
        if let Some(seed) = read_proptest_seed() {
            config.rng_seed = RngSeed::Fixed(seed);
        }
    }
    config
}

fn read_proptest_seed() -> Option<u64> {
    if let Ok(value) = std::env::var(PROPTEST_SEED_ENV) {
        return value.parse::<u64>().ok();
    }
    if std::env::var("CI").is_ok() {
        return Some(DEFAULT_PROPTEST_SEED);
    }
    None
}

/// Initialize test logging with trace-level output.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Log a test phase header.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

// ============================================================================
// Components and actions
// ============================================================================

/// Stateless arithmetic component.
#[derive(Debug, Default)]
pub struct Calculator;

impl Component for Calculator {
    const COMPONENT_TYPE: ComponentType = ComponentType::new(100);
}

/// Component with a running total.
#[derive(Debug, Default)]
pub struct Tally {
    total: AtomicU64,
}

impl Component for Tally {
    const COMPONENT_TYPE: ComponentType = ComponentType::new(101);
}

/// Calculator extended with a scientific mode; serves every calculator action.
#[derive(Debug, Default)]
pub struct ScientificCalculator {
    base: Calculator,
}

impl Component for ScientificCalculator {
    const COMPONENT_TYPE: ComponentType = ComponentType::derived(100, 1);

    fn base(&self) -> Option<&dyn AnyComponent> {
        Some(&self.base)
    }
}

/// Component no calculator action may target.
#[derive(Debug, Default)]
pub struct Stranger;

impl Component for Stranger {
    const COMPONENT_TYPE: ComponentType = ComponentType::new(102);
}

/// `a + b`.
pub struct Add;

impl Action for Add {
    type Component = Calculator;
    type Args = (i64, i64);
    type Output = i64;
    const NAME: &'static str = "calculator::add";

    fn execute(_: &Calculator, (a, b): (i64, i64)) -> Result<i64> {
        a.checked_add(b)
            .ok_or_else(|| Error::action_failed("addition overflowed"))
    }
}

/// `a / b`; fails on a zero divisor.
pub struct Div;

impl Action for Div {
    type Component = Calculator;
    type Args = (i64, i64);
    type Output = i64;
    const NAME: &'static str = "calculator::div";

    fn execute(_: &Calculator, (a, b): (i64, i64)) -> Result<i64> {
        a.checked_div(b)
            .ok_or_else(|| Error::action_failed("division by zero"))
    }
}

/// Weighted sum over three slots.
pub struct Mix;

impl Action for Mix {
    type Component = Calculator;
    type Args = (i64, i64, String);
    type Output = String;
    const NAME: &'static str = "calculator::mix";

    fn execute(_: &Calculator, (a, b, label): (i64, i64, String)) -> Result<String> {
        Ok(format!("{label}={}", a * 2 + b))
    }
}

/// Always panics.
pub struct Explode;

impl Action for Explode {
    type Component = Calculator;
    type Args = ();
    type Output = i64;
    const NAME: &'static str = "calculator::explode";

    fn execute(_: &Calculator, (): ()) -> Result<i64> {
        panic!("calculator exploded")
    }
}

/// Increments a tally and returns the new total.
pub struct Bump;

impl Action for Bump {
    type Component = Tally;
    type Args = ();
    type Output = u64;
    const NAME: &'static str = "tally::bump";

    fn execute(tally: &Tally, (): ()) -> Result<u64> {
        Ok(tally.total.fetch_add(1, Ordering::AcqRel) + 1)
    }
}

// ============================================================================
// Node fixture
// ============================================================================

/// Configuration used by test nodes.
#[must_use]
pub fn test_config() -> Config {
    Config::default()
        .with_worker_threads(2)
        .with_thread_name_prefix("farcall-test")
}

/// One simulated locality: naming table, router, outbox and metrics.
pub struct Node {
    pub table: Arc<AddressTable>,
    pub transport: Arc<QueueTransport>,
    pub router: Arc<LocalityRouter>,
    pub metrics: Arc<Metrics>,
    pub cx: Cx,
}

impl Node {
    /// Builds a node for `locality` with the test configuration.
    #[must_use]
    pub fn new(locality: u32) -> Self {
        Self::with_config(locality, test_config())
    }

    /// Builds a node for `locality` with `config`.
    #[must_use]
    pub fn with_config(locality: u32, config: Config) -> Self {
        let table = Arc::new(AddressTable::new(LocalityId::new(locality)));
        let transport = Arc::new(QueueTransport::new());
        let router = Arc::new(
            LocalityRouter::from_config(table.clone(), transport.clone(), &config)
                .expect("router"),
        );
        let metrics = Arc::new(Metrics::new());
        let cx = Cx::new(table.clone(), router.clone())
            .with_metrics(metrics.clone())
            .with_config(config);
        Self {
            table,
            transport,
            router,
            metrics,
            cx,
        }
    }

    /// Returns this node's locality.
    #[must_use]
    pub fn here(&self) -> LocalityId {
        self.cx.here()
    }

    /// Makes `peer`'s component `id` reachable from this node.
    pub fn learn(&self, peer: &Self, id: GlobalId) {
        let address = peer.table.export(&id).expect("peer exports id");
        self.table.bind_remote(id, address).expect("bind remote");
    }

    /// Runs every invocation this node queued for `peer` on the peer's
    /// components and completes its continuation. Returns how many ran.
    pub fn serve_on(&self, peer: &Self) -> usize {
        let mut served = 0;
        while let Some(invocation) = self.transport.pop_for(peer.here()) {
            let handle = peer
                .table
                .local_handle(&invocation.target())
                .expect("peer owns target");
            invocation.execute(&handle).expect("completion accepted");
            served += 1;
        }
        served
    }
}

/// Two nodes where `origin` knows a calculator living on `peer`.
#[must_use]
pub fn linked_pair() -> (Node, Node, GlobalId) {
    let origin = Node::new(0);
    let peer = Node::new(1);
    let calc = peer.table.bind_local(Calculator);
    origin.learn(&peer, calc);
    (origin, peer, calc)
}
