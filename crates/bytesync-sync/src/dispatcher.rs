//! Request dispatcher.
//!
//! Maps each typed request to a capability check followed by a store call.
//! Every failure is turned into a `response.error`; nothing a client sends can
//! make [`Dispatcher::handle`] return early or panic.

use std::sync::Arc;

use bytes::Bytes;

use bytesync_core::{block_hash, next_version_hash, BlockRef, Sha256Hash, StackId, StackView, VersionRef};
use bytesync_perms::{AllowAll, Auth};
use bytesync_store::{AppendBlock, AppendVersion, Store};

use crate::error::{Result, SyncError};
use crate::messages::{ErrorCode, Request, Response};
use crate::reconcile::{reconcile, ReconcileConfig};

/// Default upper bound on a single block or info payload.
pub const DEFAULT_MAX_BLOCK_BYTES: usize = 16 * 1024 * 1024;

// Used only if a response cannot be encoded.
const ENCODE_FAILURE: &str =
    r#"{"type":"response.error","error":"failed to encode response","code":"internal"}"#;

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub reconcile: ReconcileConfig,
    /// Largest accepted block or info payload, in bytes.
    pub max_block_bytes: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            reconcile: ReconcileConfig::default(),
            max_block_bytes: DEFAULT_MAX_BLOCK_BYTES,
        }
    }
}

/// Server-side request handler.
pub struct Dispatcher<S: Store, A: Auth = AllowAll> {
    store: Arc<S>,
    auth: A,
    config: DispatcherConfig,
}

impl<S: Store> Dispatcher<S, AllowAll> {
    /// Create a dispatcher that permits every request.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_auth(store, AllowAll)
    }
}

impl<S: Store, A: Auth> Dispatcher<S, A> {
    /// Create a dispatcher with an authorization policy.
    pub fn with_auth(store: Arc<S>, auth: A) -> Self {
        Self {
            store,
            auth,
            config: DispatcherConfig::default(),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The active configuration.
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Handle one request.
    pub async fn handle(&self, request: Request) -> Response {
        let kind = request.kind();
        let stack = request.stack_id();
        match self.dispatch(request).await {
            Ok(response) => {
                tracing::debug!(request = kind, response = response.kind(), "handled");
                response
            }
            Err(e) => {
                tracing::warn!(
                    request = kind,
                    stack = ?stack.map(|s| s.short()),
                    code = %e.code(),
                    error = %e,
                    "request failed"
                );
                Response::error(e.code(), e.to_string())
            }
        }
    }

    /// Handle one request in its JSON wire form.
    pub async fn handle_json(&self, body: &str) -> String {
        let response = match serde_json::from_str::<Request>(body) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable request");
                Response::error(ErrorCode::MalformedRequest, format!("malformed request: {}", e))
            }
        };
        serde_json::to_string(&response).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to encode response");
            ENCODE_FAILURE.to_string()
        })
    }

    async fn dispatch(&self, request: Request) -> Result<Response> {
        match request {
            Request::Create { info, block } => self.create(info, block).await,
            Request::Block { stack, block } => self.block(stack, block).await,
            Request::Version { stack, info, block } => self.version(stack, info, block).await,
            Request::Sync { stack } => self.sync(stack).await,
            Request::Size { stack } => self.size(stack.map(|s| s.uuid)).await,
            Request::Read { stack, block } => self.read(stack, block).await,
            Request::Vacuum => self.vacuum().await,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    async fn create(&self, info: Bytes, block: Bytes) -> Result<Response> {
        if !self.auth.has_create_permission().await {
            return Err(forbidden("create"));
        }
        self.check_size("info", &info)?;
        self.check_size("block", &block)?;

        let uuid = StackId::generate();
        let hash = block_hash(&block);
        let stack = self.store.create(&uuid, info, block, hash).await?;
        tracing::info!(stack = %stack, "stack created");
        Ok(Response::Create { stack })
    }

    async fn block(&self, claimed: StackView, data: Bytes) -> Result<Response> {
        if !self.auth.has_block_permission(&claimed.uuid).await {
            return Err(forbidden("block"));
        }
        self.check_size("block", &data)?;
        let expected_hash = require_hash(&claimed)?;

        // The claimed hash is the current hash whenever the write can succeed.
        let hash = block_hash(&data);
        let stack = self
            .store
            .append_block(AppendBlock {
                uuid: claimed.uuid,
                version: claimed.version,
                height: claimed.height,
                expected_hash,
                next_hash: next_version_hash(&expected_hash, &hash),
                data,
                block_hash: hash,
            })
            .await?;

        let outcome = reconcile(self.store.as_ref(), &stack.view(), &self.config.reconcile).await?;
        Ok(outcome.into())
    }

    async fn version(&self, claimed: StackView, info: Bytes, data: Bytes) -> Result<Response> {
        if !self.auth.has_version_permission(&claimed.uuid).await {
            return Err(forbidden("version"));
        }
        self.check_size("info", &info)?;
        self.check_size("block", &data)?;
        let expected_hash = require_hash(&claimed)?;

        let hash = block_hash(&data);
        let stack = self
            .store
            .append_version(AppendVersion {
                uuid: claimed.uuid,
                version: claimed.version,
                expected_hash,
                info,
                data,
                block_hash: hash,
            })
            .await?;
        tracing::info!(stack = %stack, "version opened");

        let outcome = reconcile(self.store.as_ref(), &stack.view(), &self.config.reconcile).await?;
        Ok(outcome.into())
    }

    async fn vacuum(&self) -> Result<Response> {
        if !self.auth.has_vacuum_permission().await {
            return Err(forbidden("vacuum"));
        }
        let removed = self.store.vacuum().await?;
        tracing::info!(removed, "vacuum complete");
        Ok(Response::Vacuum)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    async fn sync(&self, claimed: StackView) -> Result<Response> {
        if !self.auth.has_read_permission(Some(&claimed.uuid)).await {
            return Err(forbidden("sync"));
        }
        let outcome = reconcile(self.store.as_ref(), &claimed, &self.config.reconcile).await?;
        Ok(outcome.into())
    }

    async fn size(&self, uuid: Option<StackId>) -> Result<Response> {
        if !self.auth.has_read_permission(uuid.as_ref()).await {
            return Err(forbidden("size"));
        }
        let size = self.store.size(uuid.as_ref()).await?;
        Ok(Response::Size { size })
    }

    async fn read(&self, stack: VersionRef, block: BlockRef) -> Result<Response> {
        if !self.auth.has_read_permission(Some(&stack.uuid)).await {
            return Err(forbidden("read"));
        }
        let version = self.store.read_version(&stack.uuid, stack.version).await?;
        let block = self
            .store
            .read_block(&stack.uuid, stack.version, block.index)
            .await?;
        Ok(Response::Block {
            stack: version,
            block,
        })
    }

    fn check_size(&self, field: &str, data: &Bytes) -> Result<()> {
        if data.len() > self.config.max_block_bytes {
            return Err(SyncError::MalformedRequest(format!(
                "{} of {} bytes exceeds limit of {}",
                field,
                data.len(),
                self.config.max_block_bytes
            )));
        }
        Ok(())
    }
}

fn forbidden(operation: &str) -> SyncError {
    SyncError::Forbidden(format!("{} not permitted", operation))
}

fn require_hash(claimed: &StackView) -> Result<Sha256Hash> {
    claimed
        .hash
        .ok_or_else(|| SyncError::MalformedRequest("write requires stack.hash".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytesync_core::Stack;
    use bytesync_perms::{GrantAuth, PermissionScope};
    use bytesync_store::MemoryStore;
    use serde_json::{json, Value};

    fn dispatcher() -> Dispatcher<MemoryStore> {
        Dispatcher::new(Arc::new(MemoryStore::new()))
    }

    async fn create<A: Auth>(dispatcher: &Dispatcher<MemoryStore, A>, block: &'static [u8]) -> Stack {
        match dispatcher
            .handle(Request::Create {
                info: Bytes::from_static(b"info"),
                block: Bytes::from_static(block),
            })
            .await
        {
            Response::Create { stack } => stack,
            other => panic!("expected create, got {:?}", other),
        }
    }

    fn error_code(response: &Response) -> ErrorCode {
        match response {
            Response::Error { code, .. } => *code,
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_uuid() {
        let dispatcher = dispatcher();
        let a = create(&dispatcher, b"A").await;
        let b = create(&dispatcher, b"A").await;

        assert_ne!(a.uuid, b.uuid);
        assert_eq!(a.version, 1);
        assert_eq!(a.height, 1);
        assert_eq!(a.hash, block_hash(b"A"));
    }

    #[tokio::test]
    async fn test_block_write_reports_synced() {
        let dispatcher = dispatcher();
        let stack = create(&dispatcher, b"A").await;

        let response = dispatcher
            .handle(Request::Block {
                stack: stack.view(),
                block: Bytes::from_static(b"B"),
            })
            .await;
        match response {
            Response::Sync { stack: after } => {
                assert_eq!(after.height, 2);
                assert_eq!(after.hash, next_version_hash(&stack.hash, &block_hash(b"B")));
            }
            other => panic!("expected sync, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stale_write_is_conflict() {
        let dispatcher = dispatcher();
        let stack = create(&dispatcher, b"A").await;
        let write = Request::Block {
            stack: stack.view(),
            block: Bytes::from_static(b"B"),
        };

        assert!(!dispatcher.handle(write.clone()).await.is_error());
        let second = dispatcher.handle(write).await;
        assert_eq!(error_code(&second), ErrorCode::Conflict);
        assert_eq!(dispatcher.store().read_stack(&stack.uuid).await.unwrap().height, 2);
    }

    #[tokio::test]
    async fn test_write_without_hash_is_malformed() {
        let dispatcher = dispatcher();
        let stack = create(&dispatcher, b"A").await;
        let response = dispatcher
            .handle(Request::Block {
                stack: StackView {
                    hash: None,
                    ..stack.view()
                },
                block: Bytes::from_static(b"B"),
            })
            .await;
        assert_eq!(error_code(&response), ErrorCode::MalformedRequest);
    }

    #[tokio::test]
    async fn test_version_write_opens_version() {
        let dispatcher = dispatcher();
        let stack = create(&dispatcher, b"A").await;
        let response = dispatcher
            .handle(Request::Version {
                stack: stack.view(),
                info: Bytes::from_static(b"info2"),
                block: Bytes::from_static(b"C"),
            })
            .await;
        match response {
            Response::Sync { stack: after } => {
                assert_eq!(after.version, 2);
                assert_eq!(after.height, 1);
                assert_eq!(after.hash, block_hash(b"C"));
            }
            other => panic!("expected sync, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sync_unknown_stack_not_found() {
        let dispatcher = dispatcher();
        let response = dispatcher
            .handle(Request::Sync {
                stack: StackView::origin(StackId::generate()),
            })
            .await;
        assert_eq!(error_code(&response), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_read_random_access() {
        let dispatcher = dispatcher();
        let stack = create(&dispatcher, b"A").await;
        let response = dispatcher
            .handle(Request::Read {
                stack: VersionRef {
                    uuid: stack.uuid,
                    version: 1,
                },
                block: BlockRef { index: 0 },
            })
            .await;
        match response {
            Response::Block { stack: version, block } => {
                assert_eq!(version, stack);
                assert_eq!(block.data, Bytes::from_static(b"A"));
            }
            other => panic!("expected block, got {:?}", other),
        }

        let missing = dispatcher
            .handle(Request::Read {
                stack: VersionRef {
                    uuid: stack.uuid,
                    version: 1,
                },
                block: BlockRef { index: 9 },
            })
            .await;
        assert_eq!(error_code(&missing), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_size_and_vacuum() {
        let dispatcher = dispatcher();
        let stack = create(&dispatcher, b"AAAA").await;
        dispatcher
            .handle(Request::Version {
                stack: stack.view(),
                info: Bytes::new(),
                block: Bytes::from_static(b"CC"),
            })
            .await;

        let before = match dispatcher.handle(Request::Size { stack: None }).await {
            Response::Size { size } => size,
            other => panic!("expected size, got {:?}", other),
        };
        assert_eq!(before.iter().map(|e| e.size()).collect::<Vec<_>>(), vec![4, 2]);

        assert_eq!(dispatcher.handle(Request::Vacuum).await, Response::Vacuum);

        let after = match dispatcher
            .handle(Request::Size {
                stack: Some(stack.view()),
            })
            .await
        {
            Response::Size { size } => size,
            other => panic!("expected size, got {:?}", other),
        };
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].size(), 2);
    }

    #[tokio::test]
    async fn test_forbidden_names_operation() {
        let dispatcher = Dispatcher::with_auth(
            Arc::new(MemoryStore::new()),
            GrantAuth::new([PermissionScope::Create, PermissionScope::Read { stack: None }]),
        );
        let stack = create(&dispatcher, b"A").await;

        let response = dispatcher
            .handle(Request::Block {
                stack: stack.view(),
                block: Bytes::from_static(b"B"),
            })
            .await;
        assert_eq!(error_code(&response), ErrorCode::Forbidden);
        match response {
            Response::Error { error, .. } => assert!(error.contains("block")),
            _ => unreachable!(),
        }

        let response = dispatcher.handle(Request::Vacuum).await;
        assert_eq!(error_code(&response), ErrorCode::Forbidden);

        let response = dispatcher
            .handle(Request::Sync {
                stack: stack.view(),
            })
            .await;
        assert!(matches!(response, Response::Sync { .. }));
    }

    #[tokio::test]
    async fn test_oversize_payload_rejected() {
        let dispatcher = dispatcher().with_config(DispatcherConfig {
            max_block_bytes: 4,
            ..DispatcherConfig::default()
        });
        let response = dispatcher
            .handle(Request::Create {
                info: Bytes::new(),
                block: Bytes::from_static(b"too large"),
            })
            .await;
        assert_eq!(error_code(&response), ErrorCode::MalformedRequest);
    }

    #[tokio::test]
    async fn test_handle_json() {
        let dispatcher = dispatcher();
        let reply: Value = serde_json::from_str(
            &dispatcher
                .handle_json(r#"{"type":"request.create","info":"","block":"QQ=="}"#)
                .await,
        )
        .unwrap();
        assert_eq!(reply["type"], "response.create");
        assert_eq!(reply["stack"]["hash"], block_hash(b"A").to_hex());

        let stack = reply["stack"].clone();
        let reply: Value = serde_json::from_str(
            &dispatcher
                .handle_json(&json!({"type": "request.sync", "stack": stack}).to_string())
                .await,
        )
        .unwrap();
        assert_eq!(reply["type"], "response.sync");
    }

    #[tokio::test]
    async fn test_handle_json_rejects_garbage() {
        let dispatcher = dispatcher();
        for body in ["not json", r#"{"type":"request.delete"}"#, r#"{"type":"request.block"}"#] {
            let reply: Value = serde_json::from_str(&dispatcher.handle_json(body).await).unwrap();
            assert_eq!(reply["type"], "response.error");
            assert_eq!(reply["code"], "malformed_request");
        }
    }

    #[test]
    fn test_encode_failure_fallback_is_valid() {
        let parsed: Response = serde_json::from_str(ENCODE_FAILURE).unwrap();
        assert_eq!(parsed, Response::error(ErrorCode::Internal, "failed to encode response"));
    }
}
