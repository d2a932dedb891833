//! End-to-end behaviour of server, client driver and encrypted client.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};

use bytesync::core::{block_hash, next_version_hash, Sha256Hash, SizeEntry, StackId};
use bytesync::perms::{AllowAll, ChaChaCipher, GrantAuth, PermissionScope, SymmetricCipher};
use bytesync::store::{AppendBlock, AppendVersion, MemoryStore, Store};
use bytesync::sync::{ErrorCode, SyncError};
use bytesync::{
    Block, Client, Outcome, SecureClient, SecureHandler, Server, ServerConfig, Stack, StackView,
    SyncHandler,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[derive(Default)]
struct Collect {
    seen: Vec<(u64, u64, Bytes)>,
}

#[async_trait]
impl SyncHandler for Collect {
    async fn on_block(&mut self, stack: &Stack, block: &Block) -> bytesync::sync::Result<()> {
        self.seen.push((stack.version, block.index, block.data.clone()));
        Ok(())
    }

    async fn on_version(
        &mut self,
        stack: &Stack,
        _info: &Bytes,
        block: &Block,
    ) -> bytesync::sync::Result<()> {
        self.seen.push((stack.version, block.index, block.data.clone()));
        Ok(())
    }
}

#[tokio::test]
async fn test_create_append_version_then_replay() -> anyhow::Result<()> {
    init_tracing();
    let server = Server::open(&ServerConfig::default())?;
    let client = Client::new(server.local_transport());

    let v1 = client
        .create(Bytes::from_static(b"info1"), Bytes::from_static(b"A"))
        .await?;
    assert_eq!((v1.version, v1.height), (1, 1));
    assert_eq!(v1.hash, block_hash(b"A"));

    let v1 = client.block(&v1.view(), Bytes::from_static(b"B")).await?;
    let v1 = v1.stack().clone();
    assert_eq!(v1.height, 2);
    assert_eq!(
        v1.hash,
        next_version_hash(&block_hash(b"A"), &block_hash(b"B"))
    );

    let v2 = client
        .version(
            &v1.view(),
            Bytes::from_static(b"info2"),
            Bytes::from_static(b"C"),
        )
        .await?;
    let v2 = v2.stack().clone();
    assert_eq!((v2.version, v2.height), (2, 1));
    assert_eq!(v2.hash, block_hash(b"C"));

    let mut cursor = StackView::origin(v2.uuid);
    let mut steps = Vec::new();
    loop {
        let outcome = client.sync_once(&cursor).await?;
        match &outcome {
            Outcome::NeedVersion { stack, info, block } => {
                steps.push(format!(
                    "version({},{})",
                    String::from_utf8_lossy(info),
                    String::from_utf8_lossy(&block.data)
                ));
                cursor = StackView {
                    uuid: stack.uuid,
                    version: stack.version,
                    height: 1,
                    hash: Some(block.hash),
                };
            }
            Outcome::NeedBlock { stack, block } => {
                steps.push(format!("block({})", String::from_utf8_lossy(&block.data)));
                cursor = StackView {
                    uuid: stack.uuid,
                    version: stack.version,
                    height: block.index + 1,
                    hash: cursor.hash.map(|h| next_version_hash(&h, &block.hash)),
                };
            }
            Outcome::Synced(stack) => {
                assert_eq!(stack, &v2);
                steps.push("synced".into());
                break;
            }
        }
    }

    assert_eq!(
        steps,
        vec!["version(info1,A)", "block(B)", "version(info2,C)", "synced"]
    );
    Ok(())
}

#[tokio::test]
async fn test_chain_survives_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = ServerConfig {
        database_path: Some(dir.path().join("chain.db")),
        ..ServerConfig::default()
    };

    let expected = {
        let server = Server::open(&config)?;
        let client = Client::new(server.local_transport());
        let mut stack = client.create(Bytes::new(), Bytes::from_static(b"A")).await?;
        for data in [&b"B"[..], &b"C"[..]] {
            stack = client
                .block(&stack.view(), Bytes::copy_from_slice(data))
                .await?
                .stack()
                .clone();
        }
        stack
    };
    assert_eq!(
        expected.hash.to_hex(),
        "dbe11e36aa89a963103de7f8ad09c1100c06ccd5c5ad424ca741efb0689dc427"
    );

    let server = Server::open(&config)?;
    let client = Client::new(server.local_transport());
    let outcome = client.sync_once(&expected.view()).await?;
    assert_eq!(outcome, Outcome::Synced(expected));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_appends_exactly_one_wins() -> anyhow::Result<()> {
    let server = Server::open(&ServerConfig::default())?;
    let stack = Client::new(server.local_transport())
        .create(Bytes::new(), Bytes::from_static(b"A"))
        .await?;

    let mut tasks = Vec::new();
    for i in 0..8u8 {
        let client = Client::new(server.local_transport());
        let claim = stack.view();
        tasks.push(tokio::spawn(async move {
            client.block(&claim, Bytes::from(vec![i])).await
        }));
    }

    let mut wins = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await? {
            Ok(_) => wins += 1,
            Err(e) if e.is_conflict() => conflicts += 1,
            Err(e) => return Err(e.into()),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(conflicts, 7);

    let after = server.store().read_stack(&stack.uuid).await;
    assert_eq!(after?.height, 2);
    Ok(())
}

#[tokio::test]
async fn test_round_trips_match_distance() -> anyhow::Result<()> {
    let server = Server::open(&ServerConfig::default())?;
    let client = Client::new(server.local_transport());

    let start = client.create(Bytes::new(), Bytes::from_static(b"0")).await?;
    let mut stack = start.clone();
    for i in 1..=5u8 {
        stack = client
            .block(&stack.view(), Bytes::from(vec![b'0' + i]))
            .await?
            .stack()
            .clone();
    }

    // k = 5 blocks behind within the version
    let mut handler = Collect::default();
    let report = client.sync(&start.view(), &mut handler).await?;
    assert_eq!(report.blocks, 5);
    assert_eq!(report.round_trips, 5 + 1);

    // m = 2 version boundaries on top
    let synced = report.stack.clone();
    let v2 = client
        .version(&synced.view(), Bytes::new(), Bytes::from_static(b"x"))
        .await?;
    let v3 = client
        .version(&v2.stack().view(), Bytes::new(), Bytes::from_static(b"y"))
        .await?;

    let mut handler = Collect::default();
    let report = client.sync(&synced.view(), &mut handler).await?;
    assert_eq!(report.versions, 2);
    assert_eq!(report.blocks, 0);
    assert_eq!(report.round_trips, 2 + 1);
    assert_eq!(&report.stack, v3.stack());
    Ok(())
}

#[tokio::test]
async fn test_vacuum_keeps_only_latest() -> anyhow::Result<()> {
    let server = Server::open(&ServerConfig::default())?;
    let client = Client::new(server.local_transport());

    let v1 = client.create(Bytes::new(), Bytes::from_static(b"A")).await?;
    let v1 = client
        .block(&v1.view(), Bytes::from_static(b"B"))
        .await?
        .stack()
        .clone();
    let v2 = client
        .version(&v1.view(), Bytes::new(), Bytes::from_static(b"C"))
        .await?
        .stack()
        .clone();
    let v2 = client
        .block(&v2.view(), Bytes::from_static(b"D"))
        .await?
        .stack()
        .clone();

    client.vacuum().await?;

    let err = client.read(&v1.uuid, 1, 0).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Remote {
            code: ErrorCode::NotFound,
            ..
        }
    ));

    let (_, block) = client.read(&v2.uuid, 2, 1).await?;
    assert_eq!(block.data, Bytes::from_static(b"D"));

    let sizes = client.size(None).await?;
    assert_eq!(sizes.len(), 1);

    // A replay from scratch now starts at the surviving version.
    let mut handler = Collect::default();
    let report = client
        .sync(&StackView::origin(v2.uuid), &mut handler)
        .await?;
    assert_eq!(
        handler.seen,
        vec![
            (2, 0, Bytes::from_static(b"C")),
            (2, 1, Bytes::from_static(b"D")),
        ]
    );
    assert_eq!(report.stack, v2);
    Ok(())
}

#[derive(Default)]
struct Plaintext {
    infos: Vec<Bytes>,
    blocks: Vec<Vec<u8>>,
}

#[async_trait]
impl SecureHandler for Plaintext {
    async fn on_block(&mut self, _stack: &Stack, _index: u64, data: Vec<u8>) -> bytesync::Result<()> {
        self.blocks.push(data);
        Ok(())
    }

    async fn on_version(&mut self, _stack: &Stack, info: Bytes, data: Vec<u8>) -> bytesync::Result<()> {
        self.infos.push(info);
        self.blocks.push(data);
        Ok(())
    }
}

#[tokio::test]
async fn test_encrypted_stack_round_trip() -> anyhow::Result<()> {
    init_tracing();
    let server = Server::open(&ServerConfig::default())?;
    let writer = SecureClient::new(Client::new(server.local_transport()));
    let master = ChaChaCipher.derive_key("correct horse battery staple", b"bytesync-tests")?;

    let stack = writer
        .create(&master, Bytes::from_static(b"notes"), b"first entry")
        .await?;
    let stack = writer.block(&stack, b"second entry").await?;
    let stack = writer
        .version(&master, &stack, Bytes::from_static(b"notes v2"), b"compacted")
        .await?;
    assert_eq!(writer.read(&stack, 0).await?, b"compacted");

    // The server only holds ciphertext.
    let (_, raw) = writer.client().read(&stack.stack.uuid, 1, 0).await?;
    assert!(!raw
        .data
        .windows(b"first entry".len())
        .any(|w| w == b"first entry"));

    let reader = SecureClient::new(Client::new(server.json_transport()));
    let mut plain = Plaintext::default();
    let (latest, report) = reader
        .open(&master, &stack.stack.uuid, &mut plain)
        .await?;

    assert_eq!(
        plain.infos,
        vec![Bytes::from_static(b"notes"), Bytes::from_static(b"notes v2")]
    );
    assert_eq!(
        plain.blocks,
        vec![
            b"first entry".to_vec(),
            b"second entry".to_vec(),
            b"compacted".to_vec()
        ]
    );
    assert_eq!(report.round_trips, 4);
    assert_eq!(latest.stack, stack.stack);
    assert_eq!(latest.info, stack.info);
    assert_eq!(latest.key, stack.key);

    // Continue writing from what the reader recovered.
    let next = reader.block(&latest, b"from reader").await?;
    let mut plain = Plaintext::default();
    writer.sync(&master, &stack, &mut plain).await?;
    assert_eq!(plain.blocks, vec![b"from reader".to_vec()]);
    assert_eq!(next.stack.height, 2);
    Ok(())
}

#[tokio::test]
async fn test_wrong_master_key_cannot_open() -> anyhow::Result<()> {
    let server = Server::open(&ServerConfig::default())?;
    let client = SecureClient::new(Client::new(server.local_transport()));
    let master = ChaChaCipher.generate_key();
    let stack = client.create(&master, Bytes::new(), b"secret").await?;

    let mut plain = Plaintext::default();
    let err = client
        .open(&ChaChaCipher.generate_key(), &stack.stack.uuid, &mut plain)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        bytesync::BytesyncError::Sync(SyncError::Handler(_))
    ));
    assert!(plain.blocks.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_json_wire_contract() -> anyhow::Result<()> {
    let server = Server::open(&ServerConfig::default())?;

    let reply: Value = serde_json::from_str(
        &server
            .handle_json(r#"{"type":"request.create","info":"aW5mbw==","block":"QQ=="}"#)
            .await,
    )?;
    assert_eq!(reply["type"], "response.create");
    let stack = reply["stack"].clone();
    assert_eq!(stack["version"], 1);
    assert_eq!(stack["height"], 1);
    assert_eq!(stack["hash"], block_hash(b"A").to_hex());

    let reply: Value = serde_json::from_str(
        &server
            .handle_json(
                &json!({
                    "type": "request.sync",
                    "stack": {"uuid": stack["uuid"], "version": 0, "height": 0},
                })
                .to_string(),
            )
            .await,
    )?;
    assert_eq!(reply["type"], "response.version");
    assert_eq!(reply["info"], "aW5mbw==");
    assert_eq!(reply["block"]["data"], "QQ==");
    assert_eq!(reply["block"]["index"], 0);

    let reply: Value = serde_json::from_str(
        &server
            .handle_json(&json!({"type": "request.block", "stack": stack, "block": "Qg=="}).to_string())
            .await,
    )?;
    assert_eq!(reply["type"], "response.sync");
    assert_eq!(reply["stack"]["height"], 2);

    // Same claim again: the stack has moved on.
    let reply: Value = serde_json::from_str(
        &server
            .handle_json(&json!({"type": "request.block", "stack": stack, "block": "Qg=="}).to_string())
            .await,
    )?;
    assert_eq!(reply["type"], "response.error");
    assert_eq!(reply["code"], "conflict");
    Ok(())
}

#[tokio::test]
async fn test_grants_gate_operations() -> anyhow::Result<()> {
    let store = Arc::new(bytesync::store::MemoryStore::new());
    let admin = Server::with_store(
        Arc::clone(&store),
        GrantAuth::new([PermissionScope::Admin]),
        &ServerConfig::default(),
    );
    let stack = Client::new(admin.local_transport())
        .create(Bytes::new(), Bytes::from_static(b"A"))
        .await?;

    let reader = Server::with_store(
        store,
        GrantAuth::new([PermissionScope::Read {
            stack: Some(stack.uuid),
        }]),
        &ServerConfig::default(),
    );
    let client = Client::new(reader.local_transport());

    assert!(client.sync_once(&stack.view()).await?.is_synced());

    let err = client
        .block(&stack.view(), Bytes::from_static(b"B"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::Remote {
            code: ErrorCode::Forbidden,
            ..
        }
    ));

    let err = client.size(None).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Remote {
            code: ErrorCode::Forbidden,
            ..
        }
    ));
    Ok(())
}

/// Store where a second writer slips a block in right after the next
/// accepted block write.
#[derive(Default)]
struct Interleaving {
    inner: MemoryStore,
    pending: Mutex<Option<Bytes>>,
}

impl Interleaving {
    fn append_after_next_write(&self, data: Bytes) {
        *self.pending.lock().unwrap() = Some(data);
    }
}

#[async_trait]
impl Store for Interleaving {
    async fn create(
        &self,
        uuid: &StackId,
        info: Bytes,
        data: Bytes,
        hash: Sha256Hash,
    ) -> bytesync::store::Result<Stack> {
        self.inner.create(uuid, info, data, hash).await
    }

    async fn append_block(&self, request: AppendBlock) -> bytesync::store::Result<Stack> {
        let stack = self.inner.append_block(request).await?;
        let pending = self.pending.lock().unwrap().take();
        if let Some(data) = pending {
            let hash = block_hash(&data);
            self.inner
                .append_block(AppendBlock {
                    uuid: stack.uuid,
                    version: stack.version,
                    height: stack.height,
                    expected_hash: stack.hash,
                    next_hash: next_version_hash(&stack.hash, &hash),
                    data,
                    block_hash: hash,
                })
                .await?;
        }
        Ok(stack)
    }

    async fn append_version(&self, request: AppendVersion) -> bytesync::store::Result<Stack> {
        self.inner.append_version(request).await
    }

    async fn read_stack(&self, uuid: &StackId) -> bytesync::store::Result<Stack> {
        self.inner.read_stack(uuid).await
    }

    async fn read_version(&self, uuid: &StackId, version: u64) -> bytesync::store::Result<Stack> {
        self.inner.read_version(uuid, version).await
    }

    async fn read_info(&self, uuid: &StackId, version: u64) -> bytesync::store::Result<Bytes> {
        self.inner.read_info(uuid, version).await
    }

    async fn read_block(
        &self,
        uuid: &StackId,
        version: u64,
        index: u64,
    ) -> bytesync::store::Result<Block> {
        self.inner.read_block(uuid, version, index).await
    }

    async fn size(&self, uuid: Option<&StackId>) -> bytesync::store::Result<Vec<SizeEntry>> {
        self.inner.size(uuid).await
    }

    async fn vacuum(&self) -> bytesync::store::Result<usize> {
        self.inner.vacuum().await
    }
}

#[tokio::test]
async fn test_overtaken_write_is_stored_once() -> anyhow::Result<()> {
    init_tracing();
    let store = Arc::new(Interleaving::default());
    let server = Server::with_store(Arc::clone(&store), AllowAll, &ServerConfig::default());
    let client = SecureClient::new(Client::new(server.local_transport()));
    let master = ChaChaCipher.generate_key();

    let first = client
        .create(&master, Bytes::from_static(b"notes"), b"first")
        .await?;
    let theirs = ChaChaCipher.encrypt(&first.key, b"theirs")?;
    store.append_after_next_write(Bytes::from(theirs));

    let err = client.block(&first, b"mine").await.unwrap_err();
    assert!(!err.is_conflict());
    let written = err.written().cloned().expect("write was stored");
    assert_eq!((written.version, written.height), (1, 2));
    assert_eq!(store.read_stack(&first.stack.uuid).await?.height, 3);

    // Resuming from the stored write sees it exactly once.
    let mut plain = Plaintext::default();
    let (latest, _) = client.sync_version(&master, &written, &mut plain).await?;
    assert_eq!(
        plain.blocks,
        vec![b"first".to_vec(), b"mine".to_vec(), b"theirs".to_vec()]
    );
    assert_eq!(plain.infos, vec![Bytes::from_static(b"notes")]);
    assert_eq!(latest.stack.height, 3);
    assert_eq!(latest.key, first.key);

    let next = client.block(&latest, b"after").await?;
    assert_eq!(next.stack.height, 4);
    Ok(())
}
