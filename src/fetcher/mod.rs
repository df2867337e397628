//! Resource fetcher.
//!
//! [`ResourceFetcher`] is the only component that talks to the platform. It
//! wraps an [`InventorySource`] with a hard per-call timeout and the per-kind
//! result caps. It never retries: every failure is handed to the caller,
//! which decides whether stale cache data is good enough.

pub mod mock;
pub mod vsphere;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{FetchCaps, FetchConfig};
use crate::inventory::{InventoryNode, NodeKind, Scope};

pub use mock::MockInventorySource;
pub use vsphere::VsphereRestSource;

/// Errors returned by a fetch
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The platform did not answer within the per-call timeout
    #[error("Fetching {kind} list for '{scope}' timed out after {after:?}")]
    Timeout {
        kind: NodeKind,
        scope: String,
        after: Duration,
    },

    /// The platform rejected our credentials
    #[error("vSphere authentication failed: {message}")]
    Auth { message: String },

    /// Unexpected status or undecodable response
    #[error("vSphere protocol error: {message}")]
    Protocol { message: String },
}

impl FetchError {
    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Whether the same call may succeed later without operator action
    pub fn is_transient(&self) -> bool {
        !matches!(self, FetchError::Auth { .. })
    }
}

/// Result of one fetch
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    /// Nodes in platform order, at most the kind's cap
    pub nodes: Vec<InventoryNode>,
    /// The platform returned more than the cap
    pub truncated: bool,
    /// Number of nodes the platform returned
    pub total_available: usize,
}

impl FetchOutcome {
    /// Apply a cap to a platform listing, keeping the first `cap` nodes
    pub fn capped(mut nodes: Vec<InventoryNode>, cap: usize) -> Self {
        let total_available = nodes.len();
        let truncated = total_available > cap;
        nodes.truncate(cap);
        Self {
            nodes,
            truncated,
            total_available,
        }
    }
}

/// A backend that can enumerate one kind of inventory object under a scope
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// List nodes of `kind` under `scope` in platform order
    ///
    /// `limit` is the caller's cap. Sources may use it to skip expensive
    /// per-node lookups past the cap, but must still return every node they
    /// listed so truncation can be reported.
    async fn list(
        &self,
        kind: NodeKind,
        scope: &Scope,
        limit: usize,
    ) -> Result<Vec<InventoryNode>, FetchError>;
}

/// Timeout and cap enforcement around an [`InventorySource`]
#[derive(Clone)]
pub struct ResourceFetcher {
    source: Arc<dyn InventorySource>,
    timeout: Duration,
    caps: FetchCaps,
}

impl ResourceFetcher {
    /// Create a fetcher from configuration
    pub fn new(source: Arc<dyn InventorySource>, config: &FetchConfig) -> Self {
        Self {
            source,
            timeout: config.timeout,
            caps: config.caps.clone(),
        }
    }

    /// Override the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the per-kind caps
    pub fn with_caps(mut self, caps: FetchCaps) -> Self {
        self.caps = caps;
        self
    }

    /// Per-call timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Name of the wrapped source
    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Fetch the nodes of `kind` under `scope`
    pub async fn fetch(&self, kind: NodeKind, scope: &Scope) -> Result<FetchOutcome, FetchError> {
        if !scope.holds(kind) {
            return Err(FetchError::protocol(format!(
                "{} lists are not kept at {:?} scope",
                kind,
                scope.level()
            )));
        }

        let cap = self.caps.for_kind(kind);
        let started = Instant::now();
        let nodes = match tokio::time::timeout(self.timeout, self.source.list(kind, scope, cap)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(FetchError::Timeout {
                    kind,
                    scope: scope.path(),
                    after: self.timeout,
                })
            }
        };

        let outcome = FetchOutcome::capped(nodes, cap);
        if outcome.truncated {
            warn!(
                %kind,
                scope = %scope,
                cap,
                total = outcome.total_available,
                "inventory listing truncated"
            );
        }
        debug!(
            %kind,
            scope = %scope,
            source = self.source.name(),
            count = outcome.nodes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetched inventory"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Numbered(usize);

    #[async_trait]
    impl InventorySource for Numbered {
        fn name(&self) -> &str {
            "numbered"
        }

        async fn list(
            &self,
            kind: NodeKind,
            _scope: &Scope,
            _limit: usize,
        ) -> Result<Vec<InventoryNode>, FetchError> {
            Ok((0..self.0)
                .map(|i| InventoryNode::new(kind, format!("vm-{}", i), format!("template-{}", i)))
                .collect())
        }
    }

    struct Stalled;

    #[async_trait]
    impl InventorySource for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn list(
            &self,
            _kind: NodeKind,
            _scope: &Scope,
            _limit: usize,
        ) -> Result<Vec<InventoryNode>, FetchError> {
            futures::future::pending().await
        }
    }

    fn cluster() -> Scope {
        Scope::cluster("vc01", "dc-np", "cluster-np-1")
    }

    #[tokio::test]
    async fn test_truncates_first_n_in_platform_order() {
        let fetcher = ResourceFetcher::new(Arc::new(Numbered(80)), &FetchConfig::default());
        let outcome = fetcher.fetch(NodeKind::Template, &cluster()).await.unwrap();

        assert_eq!(outcome.nodes.len(), 50);
        assert!(outcome.truncated);
        assert_eq!(outcome.total_available, 80);
        assert_eq!(outcome.nodes[0].id, "vm-0");
        assert_eq!(outcome.nodes[49].id, "vm-49");
    }

    #[tokio::test]
    async fn test_under_cap_is_not_truncated() {
        let fetcher = ResourceFetcher::new(Arc::new(Numbered(3)), &FetchConfig::default());
        let outcome = fetcher.fetch(NodeKind::Datastore, &cluster()).await.unwrap();
        assert_eq!(outcome.nodes.len(), 3);
        assert!(!outcome.truncated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let fetcher = ResourceFetcher::new(Arc::new(Stalled), &FetchConfig::default())
            .with_timeout(Duration::from_secs(2));

        let err = fetcher
            .fetch(NodeKind::Datacenter, &Scope::server("vc01"))
            .await
            .unwrap_err();
        match err {
            FetchError::Timeout { kind, scope, after } => {
                assert_eq!(kind, NodeKind::Datacenter);
                assert_eq!(scope, "vc01");
                assert_eq!(after, Duration::from_secs(2));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_kind_must_match_scope() {
        let fetcher = ResourceFetcher::new(Arc::new(Numbered(1)), &FetchConfig::default());
        let err = fetcher
            .fetch(NodeKind::Template, &Scope::server("vc01"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Protocol { .. }));
    }
}
