//! Global registry of API functions, dispatched on `method`. This is the only place
//! a method name is resolved to behavior -- connections themselves know nothing
//! about what any given method does.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

/// Identifies where an incoming frame came from: the authenticated endpoint (if
/// any) and the specific connection, since an endpoint may have more than one.
#[derive(Debug, Clone)]
pub struct Origin {
    pub endpoint: Option<String>,
    pub connection_id: Uuid,
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Option<Value>> + Send>>;
pub type HandlerFn = Arc<dyn Fn(Origin, Value) -> HandlerFuture + Send + Sync>;

/// `method -> handler` table. Handlers return `Some(value)` to produce a reply for
/// a framed request (one carrying an `id`), or `None` for fire-and-forget events;
/// the caller decides whether to actually send a reply based on whether the
/// incoming frame had an `id` at all.
#[derive(Default)]
pub struct Router {
    handlers: DashMap<String, HandlerFn>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, method: impl Into<String>, handler: HandlerFn) {
        self.handlers.insert(method.into(), handler);
    }

    pub async fn dispatch(&self, method: &str, origin: Origin, params: Value) -> Option<Value> {
        let handler = self.handlers.get(method).map(|h| h.clone());
        match handler {
            Some(h) => h(origin, params).await,
            None => {
                tracing::warn!(method, "no handler registered for method");
                None
            }
        }
    }

    pub fn is_registered(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn dispatch_invokes_registered_handler() {
        let router = Router::new();
        router.register(
            "ping",
            Arc::new(|_origin, _params| Box::pin(async { Some(json!({"pong": true})) })),
        );
        let reply = router
            .dispatch(
                "ping",
                Origin { endpoint: None, connection_id: Uuid::nil() },
                Value::Null,
            )
            .await;
        assert_eq!(reply, Some(json!({"pong": true})));
    }

    #[tokio::test]
    async fn dispatch_unknown_method_returns_none() {
        let router = Router::new();
        let reply = router
            .dispatch(
                "missing",
                Origin { endpoint: None, connection_id: Uuid::nil() },
                Value::Null,
            )
            .await;
        assert_eq!(reply, None);
    }
}
