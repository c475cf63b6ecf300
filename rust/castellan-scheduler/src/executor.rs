use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use castellan_registry::{CheckResult, Checkable};

/// Runs a checkable's configured check command locally. Implementations own
/// whatever plugin-invocation mechanism the deployment uses (subprocess, embedded
/// function, etc.); this crate only needs the boundary.
pub trait CheckExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        checkable: &'a Checkable,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = CheckResult> + Send + 'a>>;
}
