//! The invocation context type.
//!
//! `Cx` is cheap to clone (every field is an `Arc`) and is captured by each
//! eager future at construction, so a future keeps using the collaborators
//! it was built with even if the caller later swaps them out.

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::naming::{LocalityId, Resolver};
use crate::observability::{InvocationMetrics, NoOpMetrics};
use std::fmt;
use std::sync::Arc;

/// Collaborators used to issue invocations.
#[derive(Clone)]
pub struct Cx {
    resolver: Arc<dyn Resolver>,
    dispatcher: Arc<dyn Dispatcher>,
    metrics: Arc<dyn InvocationMetrics>,
    config: Arc<Config>,
}

impl Cx {
    /// Creates a context with no-op metrics and the default configuration.
    #[must_use]
    pub fn new(resolver: Arc<dyn Resolver>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            resolver,
            dispatcher,
            metrics: Arc::new(NoOpMetrics),
            config: Arc::new(Config::default()),
        }
    }

    /// Replaces the metrics hook.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn InvocationMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Returns the resolver.
    #[must_use]
    pub fn resolver(&self) -> &dyn Resolver {
        self.resolver.as_ref()
    }

    /// Returns the dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &dyn Dispatcher {
        self.dispatcher.as_ref()
    }

    /// Returns the metrics hook.
    #[must_use]
    pub fn metrics(&self) -> &dyn InvocationMetrics {
        self.metrics.as_ref()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the locality this context issues invocations from.
    #[must_use]
    pub fn here(&self) -> LocalityId {
        self.resolver.here()
    }
}

impl fmt::Debug for Cx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cx")
            .field("here", &self.here())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DuplicateCompletionResponse;
    use crate::dispatch::Invocation;
    use crate::naming::AddressTable;
    use crate::observability::Metrics;

    struct Discard;

    impl Dispatcher for Discard {
        fn dispatch(&self, _: Invocation) {}
    }

    #[test]
    fn builders_replace_collaborators() {
        let metrics = Arc::new(Metrics::new());
        let cx = Cx::new(Arc::new(AddressTable::new(LocalityId::new(4))), Arc::new(Discard))
            .with_metrics(metrics.clone())
            .with_config(
                Config::default().with_duplicate_completion(DuplicateCompletionResponse::Log),
            );
        assert_eq!(cx.here(), LocalityId::new(4));
        assert_eq!(
            cx.config().duplicate_completion,
            DuplicateCompletionResponse::Log
        );
        cx.metrics().invocation_recorded("ping");
        assert_eq!(metrics.invocations("ping"), 1);
        assert!(format!("{cx:?}").contains("LocalityId(4)"));
    }
}
