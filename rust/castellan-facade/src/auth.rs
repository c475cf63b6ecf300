use castellan_registry::ObjectId;

/// The authenticated caller of a facade operation. Concrete authentication
/// (mTLS client identity, API token, session) happens outside this crate; by the
/// time a call reaches [`crate::CoreFacade`], it already carries a resolved
/// principal.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub principal: String,
}

impl AuthContext {
    pub fn new(principal: impl Into<String>) -> Self {
        Self { principal: principal.into() }
    }
}

/// Whether `principal` may view or mutate a given object. A production
/// implementation checks configured user/usergroup ACLs against the object's
/// zone and custom attributes; this crate only defines the seam.
pub trait PermissionChecker: Send + Sync {
    fn can_view(&self, principal: &str, object: &ObjectId) -> bool;
    fn can_mutate(&self, principal: &str, object: &ObjectId) -> bool;
}

/// Grants every principal access to everything. Useful for single-tenant
/// deployments and tests; never the default in a multi-tenant config.
pub struct AllowAll;

impl PermissionChecker for AllowAll {
    fn can_view(&self, _principal: &str, _object: &ObjectId) -> bool {
        true
    }

    fn can_mutate(&self, _principal: &str, _object: &ObjectId) -> bool {
        true
    }
}
