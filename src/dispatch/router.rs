//! Default dispatcher: routes by locality.
//!
//! Local targets run on the [`WorkerPool`]; remote targets are handed to
//! the [`Transport`]. Every path ends in exactly one delivery into the
//! invocation's continuation: when routing fails (unresolvable target,
//! incompatible component, refused send) the failure itself is delivered.

use super::{Dispatcher, Invocation, SendError, Transport, WorkerPool};
use crate::config::Config;
use crate::error::{Error, ErrorKind, Result};
use crate::naming::{Address, Resolution, Resolver};
use std::fmt;
use std::sync::Arc;

/// Dispatcher that sends local work to a worker pool and remote work to a transport.
pub struct LocalityRouter {
    resolver: Arc<dyn Resolver>,
    pool: WorkerPool,
    transport: Arc<dyn Transport>,
}

impl LocalityRouter {
    /// Creates a router over existing collaborators.
    #[must_use]
    pub fn new(resolver: Arc<dyn Resolver>, pool: WorkerPool, transport: Arc<dyn Transport>) -> Self {
        Self {
            resolver,
            pool,
            transport,
        }
    }

    /// Creates a router with a worker pool sized and named by `config`.
    pub fn from_config(
        resolver: Arc<dyn Resolver>,
        transport: Arc<dyn Transport>,
        config: &Config,
    ) -> Result<Self> {
        let pool = WorkerPool::new(config.worker_threads, &config.thread_name_prefix)?;
        Ok(Self::new(resolver, pool, transport))
    }

    /// Returns the worker pool.
    #[must_use]
    pub const fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    fn route(&self, invocation: &mut Invocation) -> Result<Resolution> {
        let here = self.resolver.here();
        match invocation.take_address() {
            Some(addr) if addr.locality() != here => Ok(Resolution::Remote(addr)),
            Some(addr) if addr.handle().is_pinned() => Ok(Resolution::Local(addr)),
            _ => self.resolver.resolve_locality(&invocation.target()),
        }
    }

    fn run_local(&self, invocation: Invocation, address: Address) {
        if !address
            .component_type()
            .is_compatible_with(invocation.required_type())
        {
            let err = Error::new(ErrorKind::IncompatibleTarget).with_message(format!(
                "{} requires {}, target is {}",
                invocation.action(),
                invocation.required_type(),
                address.component_type()
            ));
            tracing::warn!(error = %err, "refusing local invocation");
            report(invocation.fail(err));
            return;
        }

        let job = move || report(invocation.execute(address.handle()));
        if let Err(job) = self.pool.spawn(job) {
            // The pool is shutting down; the work still has to complete.
            tracing::warn!("worker pool closed, running invocation on the dispatching thread");
            job();
        }
    }

    fn send_remote(&self, invocation: Invocation, address: &Address) {
        let destination = address.locality();
        if let Err(SendError { invocation, error }) = self.transport.send(destination, invocation) {
            tracing::warn!(
                action = invocation.action(),
                destination = %destination,
                error = %error,
                "transport refused invocation"
            );
            let err = Error::transport_failed(format!("send to {destination} failed"))
                .with_source(error);
            report(invocation.fail(err));
        }
    }
}

impl Dispatcher for LocalityRouter {
    fn dispatch(&self, mut invocation: Invocation) {
        match self.route(&mut invocation) {
            Ok(Resolution::Local(address)) => self.run_local(invocation, address),
            Ok(Resolution::Remote(address)) => self.send_remote(invocation, &address),
            Err(err) => {
                tracing::warn!(
                    action = invocation.action(),
                    id = %invocation.target(),
                    error = %err,
                    "cannot route invocation"
                );
                report(invocation.fail(err));
            }
        }
    }
}

impl fmt::Debug for LocalityRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalityRouter")
            .field("here", &self.resolver.here())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

fn report(delivery: Result<()>) {
    if let Err(err) = delivery {
        tracing::debug!(error = %err, "completion not accepted");
    }
}
