//! Per-node service bindings.
//!
//! # Responsibilities
//! - Hold the factory registered for a node
//! - Construct the service lazily, at most once for the node's lifetime
//! - Share one pending construction between concurrent callers
//!
//! # Design Decisions
//! - A failed or panicking construction is logged and remembered; the
//!   factory is not retried
//! - Leaving a node never drops its service

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use serde_json::Value;

use crate::lifecycle::hooks::{HookContext, HookError, HookKind, HookOutcome, HookResult};
use crate::routing::tree::MatchNode;

/// User-supplied behaviour bound to one route node.
///
/// Every method is optional. Hook methods run after the hooks registered
/// directly on the node.
#[async_trait]
pub trait RouteService: Send + Sync {
    async fn before_leave(&self, _ctx: &HookContext) -> HookResult {
        Ok(HookOutcome::Proceed)
    }

    async fn before_enter(&self, _ctx: &HookContext) -> HookResult {
        Ok(HookOutcome::Proceed)
    }

    async fn before_update(&self, _ctx: &HookContext) -> HookResult {
        Ok(HookOutcome::Proceed)
    }

    async fn after_leave(&self, _ctx: &HookContext) -> HookResult {
        Ok(HookOutcome::Proceed)
    }

    async fn after_enter(&self, _ctx: &HookContext) -> HookResult {
        Ok(HookOutcome::Proceed)
    }

    async fn after_update(&self, _ctx: &HookContext) -> HookResult {
        Ok(HookOutcome::Proceed)
    }

    /// Override for an extension key declared by the node's schema.
    fn extension(&self, _key: &str) -> Option<Value> {
        None
    }
}

/// Dispatch the service method matching `ctx.kind`.
pub(crate) fn call_service(
    service: Arc<dyn RouteService>,
    ctx: HookContext,
) -> BoxFuture<'static, HookResult> {
    async move {
        match ctx.kind {
            HookKind::BeforeLeave => service.before_leave(&ctx).await,
            HookKind::BeforeEnter => service.before_enter(&ctx).await,
            HookKind::BeforeUpdate => service.before_update(&ctx).await,
            HookKind::AfterLeave => service.after_leave(&ctx).await,
            HookKind::AfterEnter => service.after_enter(&ctx).await,
            HookKind::AfterUpdate => service.after_update(&ctx).await,
        }
    }
    .boxed()
}

/// Builds the service of a node. Receives the committed view of the node.
pub type ServiceFactory = Arc<
    dyn Fn(MatchNode) -> BoxFuture<'static, Result<Arc<dyn RouteService>, HookError>> + Send + Sync,
>;

/// Wrap a synchronous constructor into a [`ServiceFactory`].
pub fn sync_factory<F>(f: F) -> ServiceFactory
where
    F: Fn(MatchNode) -> Result<Arc<dyn RouteService>, HookError> + Send + Sync + 'static,
{
    Arc::new(move |node| futures_util::future::ready(f(node)).boxed())
}

/// Wrap an asynchronous constructor into a [`ServiceFactory`].
pub fn async_factory<F, Fut>(f: F) -> ServiceFactory
where
    F: Fn(MatchNode) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Arc<dyn RouteService>, HookError>> + Send + 'static,
{
    Arc::new(move |node| f(node).boxed())
}

type PendingService = Shared<BoxFuture<'static, Option<Arc<dyn RouteService>>>>;

enum SlotState {
    Unbound,
    Registered(ServiceFactory),
    Loading(PendingService),
    Ready(Option<Arc<dyn RouteService>>),
}

/// Lazily constructed service of one node.
pub struct ServiceSlot {
    state: Mutex<SlotState>,
}

impl Default for ServiceSlot {
    fn default() -> Self {
        Self {
            state: Mutex::new(SlotState::Unbound),
        }
    }
}

impl ServiceSlot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the factory. Returns `false` when one is already bound.
    pub fn register(&self, factory: ServiceFactory) -> bool {
        let mut state = self.lock();
        if !matches!(*state, SlotState::Unbound) {
            return false;
        }
        *state = SlotState::Registered(factory);
        true
    }

    pub fn is_bound(&self) -> bool {
        !matches!(*self.lock(), SlotState::Unbound)
    }

    /// The service, if construction already finished successfully.
    pub fn get(&self) -> Option<Arc<dyn RouteService>> {
        match &*self.lock() {
            SlotState::Ready(service) => service.clone(),
            SlotState::Loading(pending) => pending.peek().cloned().flatten(),
            SlotState::Unbound | SlotState::Registered(_) => None,
        }
    }

    /// The service, constructing it on first call.
    ///
    /// Concurrent callers await the same construction.
    pub async fn load(&self, node: MatchNode) -> Option<Arc<dyn RouteService>> {
        let pending = {
            let mut state = self.lock();
            match &*state {
                SlotState::Unbound => return None,
                SlotState::Ready(service) => return service.clone(),
                SlotState::Loading(pending) => pending.clone(),
                SlotState::Registered(factory) => {
                    let name = node.full_name().to_string();
                    let build = match panic::catch_unwind(AssertUnwindSafe(|| factory(node))) {
                        Ok(build) => build,
                        Err(_) => {
                            tracing::warn!(node = %name, "Service factory panicked");
                            *state = SlotState::Ready(None);
                            return None;
                        }
                    };
                    let pending = async move {
                        match AssertUnwindSafe(build).catch_unwind().await {
                            Ok(Ok(service)) => {
                                tracing::debug!(node = %name, "Service constructed");
                                Some(service)
                            }
                            Ok(Err(e)) => {
                                tracing::warn!(node = %name, error = %e, "Service construction failed");
                                None
                            }
                            Err(_) => {
                                tracing::warn!(node = %name, "Service construction panicked");
                                None
                            }
                        }
                    }
                    .boxed()
                    .shared();
                    *state = SlotState::Loading(pending.clone());
                    pending
                }
            }
        };

        let service = pending.await;

        let mut state = self.lock();
        if matches!(*state, SlotState::Loading(_)) {
            *state = SlotState::Ready(service.clone());
        }
        service
    }
}
