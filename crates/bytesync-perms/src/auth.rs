//! Capability checks consulted by the dispatcher.
//!
//! The dispatcher asks one predicate per operation kind before it touches
//! the store. Policies are pluggable: [`AllowAll`] for trusted deployments,
//! [`GrantAuth`] for a fixed set of scoped grants.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use bytesync_core::{now_millis, StackId};

/// Authorization policy.
///
/// Every method answers whether the caller may perform one kind of operation.
/// A `false` answer becomes a `forbidden` error response.
#[async_trait]
pub trait Auth: Send + Sync {
    /// May the caller create a new stack?
    async fn has_create_permission(&self) -> bool;

    /// May the caller read `stack`, or every stack when `None`?
    async fn has_read_permission(&self, stack: Option<&StackId>) -> bool;

    /// May the caller append blocks to `stack`?
    async fn has_block_permission(&self, stack: &StackId) -> bool;

    /// May the caller open a new version of `stack`?
    async fn has_version_permission(&self, stack: &StackId) -> bool;

    /// May the caller vacuum the store?
    async fn has_vacuum_permission(&self) -> bool;
}

/// Policy that permits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Auth for AllowAll {
    async fn has_create_permission(&self) -> bool {
        true
    }

    async fn has_read_permission(&self, _stack: Option<&StackId>) -> bool {
        true
    }

    async fn has_block_permission(&self, _stack: &StackId) -> bool {
        true
    }

    async fn has_version_permission(&self, _stack: &StackId) -> bool {
        true
    }

    async fn has_vacuum_permission(&self) -> bool {
        true
    }
}

/// Scope of a permission grant.
///
/// A scope with `stack: None` applies to every stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum PermissionScope {
    /// Create new stacks.
    Create,

    /// Read one stack, or all of them.
    Read {
        #[serde(default)]
        stack: Option<StackId>,
    },

    /// Append blocks to the current version.
    WriteBlock {
        #[serde(default)]
        stack: Option<StackId>,
    },

    /// Seal the current version and open a new one.
    WriteVersion {
        #[serde(default)]
        stack: Option<StackId>,
    },

    /// Delete superseded versions.
    Vacuum,

    /// Everything.
    Admin,
}

fn covers(granted: &Option<StackId>, stack: &StackId) -> bool {
    granted.as_ref().map_or(true, |g| g == stack)
}

impl PermissionScope {
    /// Check if this scope grants stack creation.
    pub fn can_create(&self) -> bool {
        matches!(self, PermissionScope::Create | PermissionScope::Admin)
    }

    /// Check if this scope grants read access.
    ///
    /// A request for every stack (`None`) needs an unrestricted read grant.
    pub fn can_read(&self, stack: Option<&StackId>) -> bool {
        match (self, stack) {
            (PermissionScope::Admin, _) => true,
            (PermissionScope::Read { stack: granted }, Some(stack)) => covers(granted, stack),
            (PermissionScope::Read { stack: granted }, None) => granted.is_none(),
            _ => false,
        }
    }

    /// Check if this scope grants block appends to `stack`.
    pub fn can_write_block(&self, stack: &StackId) -> bool {
        match self {
            PermissionScope::WriteBlock { stack: granted } => covers(granted, stack),
            PermissionScope::Admin => true,
            _ => false,
        }
    }

    /// Check if this scope grants new versions of `stack`.
    pub fn can_write_version(&self, stack: &StackId) -> bool {
        match self {
            PermissionScope::WriteVersion { stack: granted } => covers(granted, stack),
            PermissionScope::Admin => true,
            _ => false,
        }
    }

    /// Check if this scope grants vacuum.
    pub fn can_vacuum(&self) -> bool {
        matches!(self, PermissionScope::Vacuum | PermissionScope::Admin)
    }
}

/// A scope with an optional expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub scope: PermissionScope,

    /// When the grant expires (Unix milliseconds).
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl Grant {
    /// Check if the grant is still valid at `now`.
    pub fn is_active(&self, now: i64) -> bool {
        self.expires_at.map_or(true, |expires| now <= expires)
    }
}

impl From<PermissionScope> for Grant {
    fn from(scope: PermissionScope) -> Self {
        Self {
            scope,
            expires_at: None,
        }
    }
}

/// Policy backed by a fixed list of grants.
///
/// A check passes if any active grant covers it.
#[derive(Debug, Clone, Default)]
pub struct GrantAuth {
    grants: Vec<Grant>,
}

impl GrantAuth {
    /// Create a policy from grants.
    pub fn new(grants: impl IntoIterator<Item = impl Into<Grant>>) -> Self {
        Self {
            grants: grants.into_iter().map(Into::into).collect(),
        }
    }

    /// Add a grant.
    pub fn with(mut self, grant: impl Into<Grant>) -> Self {
        self.grants.push(grant.into());
        self
    }

    fn any(&self, check: impl Fn(&PermissionScope) -> bool) -> bool {
        let now = now_millis();
        let allowed = self
            .grants
            .iter()
            .any(|grant| grant.is_active(now) && check(&grant.scope));
        if !allowed {
            tracing::debug!(grants = self.grants.len(), "no grant covers request");
        }
        allowed
    }
}

#[async_trait]
impl Auth for GrantAuth {
    async fn has_create_permission(&self) -> bool {
        self.any(PermissionScope::can_create)
    }

    async fn has_read_permission(&self, stack: Option<&StackId>) -> bool {
        self.any(|scope| scope.can_read(stack))
    }

    async fn has_block_permission(&self, stack: &StackId) -> bool {
        self.any(|scope| scope.can_write_block(stack))
    }

    async fn has_version_permission(&self, stack: &StackId) -> bool {
        self.any(|scope| scope.can_write_version(stack))
    }

    async fn has_vacuum_permission(&self) -> bool {
        self.any(PermissionScope::can_vacuum)
    }
}
