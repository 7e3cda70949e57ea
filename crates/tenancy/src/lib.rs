//! `nimbuserp-tenancy` — request-scoped tenant/principal context.
//!
//! The context is backed by a tokio task-local, so isolation per concurrent
//! request is a property of the storage primitive, not of discipline: two
//! tasks can never observe each other's context, and the context is popped
//! when the scoped future finishes, whether it completed, errored, panicked,
//! or was cancelled. There is no imperative `clear()`.

use std::future::Future;

use nimbuserp_auth::PrincipalId;
use nimbuserp_core::TenantId;

tokio::task_local! {
    static CURRENT: RequestContext;
}

/// Tenant/principal identity of the request being processed.
///
/// Created once by the authentication middleware after claims extraction and
/// read by every downstream component for the remainder of the request.
/// Either field may be unresolved; downstream components treat an absent
/// tenant as fail-closed (match nothing), never as "all tenants".
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct RequestContext {
    tenant_id: Option<TenantId>,
    principal_id: Option<PrincipalId>,
}

impl RequestContext {
    pub fn new(tenant_id: Option<TenantId>, principal_id: Option<PrincipalId>) -> Self {
        Self {
            tenant_id,
            principal_id,
        }
    }

    /// Context with nothing resolved (unauthenticated processing).
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn principal_id(&self) -> Option<PrincipalId> {
        self.principal_id
    }
}

/// Run `f` with `ctx` installed as the current task's request context.
///
/// This is the only way to set the context. The task-local is restored when
/// the future completes, so clearing happens on every exit path without any
/// explicit call.
pub async fn scope<F>(ctx: RequestContext, f: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(ctx, f).await
}

/// The request context of the running task, or `None` outside any [`scope`].
pub fn current() -> Option<RequestContext> {
    CURRENT.try_with(|ctx| *ctx).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_context_outside_a_scope() {
        assert_eq!(current(), None);
    }

    #[tokio::test]
    async fn scope_installs_and_removes_the_context() {
        let tenant = TenantId::new();
        let principal = PrincipalId::new();
        let ctx = RequestContext::new(Some(tenant), Some(principal));

        scope(ctx, async move {
            let seen = current().expect("context must be visible inside the scope");
            assert_eq!(seen.tenant_id(), Some(tenant));
            assert_eq!(seen.principal_id(), Some(principal));
        })
        .await;

        assert_eq!(current(), None);
    }

    #[tokio::test]
    async fn inner_scope_shadows_and_restores_outer_context() {
        let outer = RequestContext::new(Some(TenantId::new()), None);
        let inner = RequestContext::new(Some(TenantId::new()), None);

        scope(outer, async move {
            scope(inner, async move {
                assert_eq!(current(), Some(inner));
            })
            .await;

            assert_eq!(current(), Some(outer));
        })
        .await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_tasks_never_observe_each_others_tenant() {
        let mut handles = Vec::new();

        for _ in 0..16 {
            let tenant = TenantId::new();
            let ctx = RequestContext::new(Some(tenant), Some(PrincipalId::new()));

            handles.push(tokio::spawn(scope(ctx, async move {
                // Cross several suspension points while other tasks with
                // different tenants are in flight.
                for _ in 0..50 {
                    tokio::task::yield_now().await;
                    let seen = current().expect("context lost mid-request");
                    assert_eq!(seen.tenant_id(), Some(tenant));
                }
            })));
        }

        for handle in handles {
            handle.await.expect("task panicked");
        }
    }

    #[tokio::test]
    async fn context_is_cleared_even_when_the_scoped_future_panics() {
        let ctx = RequestContext::new(Some(TenantId::new()), None);

        let result = tokio::spawn(scope(ctx, async {
            panic!("handler blew up");
        }))
        .await;

        assert!(result.is_err());
        assert_eq!(current(), None);
    }
}
