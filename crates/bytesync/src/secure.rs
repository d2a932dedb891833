//! Encrypted client.
//!
//! [`SecureClient`] wraps a [`Client`] so that every payload leaving the
//! process is ciphertext. Each version gets a fresh key; the key and the
//! caller's metadata are sealed under the master key into the version's
//! `info`. Reading a version means opening its `info` first.

use async_trait::async_trait;
use bytes::Bytes;

use bytesync_core::{block_hash, next_version_hash, Block, SizeEntry, Stack, StackId, StackView};
use bytesync_perms::{ChaChaCipher, SymmetricCipher, VersionInfo};
use bytesync_sync::{Client, Outcome, SyncError, SyncHandler, SyncReport, Transport};

use crate::error::{BytesyncError, Result};

/// What a writer needs to keep appending to a stack: its latest known state,
/// the plaintext metadata of that version and the version key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackInfo<K> {
    pub stack: Stack,
    pub info: Bytes,
    pub key: K,
}

/// Receives decrypted content from [`SecureClient::sync`].
#[async_trait]
pub trait SecureHandler: Send {
    /// Next block of the current version, decrypted.
    async fn on_block(&mut self, stack: &Stack, index: u64, data: Vec<u8>) -> Result<()>;

    /// A new version: its decrypted metadata and first block.
    async fn on_version(&mut self, stack: &Stack, info: Bytes, data: Vec<u8>) -> Result<()>;

    /// Checked once before every round trip.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Client that encrypts on write and decrypts on sync.
pub struct SecureClient<T: Transport, C: SymmetricCipher = ChaChaCipher> {
    client: Client<T>,
    cipher: C,
}

impl<T: Transport> SecureClient<T, ChaChaCipher> {
    /// Use ChaCha20-Poly1305 envelopes.
    pub fn new(client: Client<T>) -> Self {
        Self::with_cipher(client, ChaChaCipher)
    }
}

impl<T: Transport, C: SymmetricCipher> SecureClient<T, C> {
    pub fn with_cipher(client: Client<T>, cipher: C) -> Self {
        Self { client, cipher }
    }

    /// The underlying client, for raw (still encrypted) access.
    pub fn client(&self) -> &Client<T> {
        &self.client
    }

    pub fn cipher(&self) -> &C {
        &self.cipher
    }

    fn seal(&self, master: &C::Key, info: &Bytes, key: &C::Key) -> Result<Bytes> {
        let sealed = VersionInfo::new(info.clone(), key.clone()).seal(&self.cipher, master)?;
        Ok(Bytes::from(sealed))
    }

    fn encrypt(&self, key: &C::Key, data: &[u8]) -> Result<Bytes> {
        Ok(Bytes::from(self.cipher.encrypt(key, data)?))
    }

    /// The server answers a stored write by reconciling from `written`.
    fn written(
        &self,
        written: StackView,
        outcome: Outcome,
        info: Bytes,
        key: C::Key,
    ) -> Result<StackInfo<C::Key>> {
        match outcome {
            Outcome::Synced(stack) => Ok(StackInfo { stack, info, key }),
            other => {
                let latest = other.stack().clone();
                tracing::warn!(written = %written, latest = %latest, "stack moved on after write");
                Err(BytesyncError::Diverged { written, latest })
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a stack whose first version carries `info` and `block`.
    pub async fn create(
        &self,
        master: &C::Key,
        info: Bytes,
        block: &[u8],
    ) -> Result<StackInfo<C::Key>> {
        let key = self.cipher.generate_key();
        let sealed = self.seal(master, &info, &key)?;
        let data = self.encrypt(&key, block)?;

        let stack = self.client.create(sealed, data).await?;
        tracing::debug!(stack = %stack, "encrypted stack created");
        Ok(StackInfo { stack, info, key })
    }

    /// Append a block to the current version.
    pub async fn block(
        &self,
        current: &StackInfo<C::Key>,
        block: &[u8],
    ) -> Result<StackInfo<C::Key>> {
        let data = self.encrypt(&current.key, block)?;
        let written = StackView {
            uuid: current.stack.uuid,
            version: current.stack.version,
            height: current.stack.height + 1,
            hash: Some(next_version_hash(&current.stack.hash, &block_hash(&data))),
        };
        let outcome = self.client.block(&current.stack.view(), data).await?;
        self.written(written, outcome, current.info.clone(), current.key.clone())
    }

    /// Seal the current version and open a new one under a fresh key.
    pub async fn version(
        &self,
        master: &C::Key,
        current: &StackInfo<C::Key>,
        info: Bytes,
        block: &[u8],
    ) -> Result<StackInfo<C::Key>> {
        let key = self.cipher.generate_key();
        let sealed = self.seal(master, &info, &key)?;
        let data = self.encrypt(&key, block)?;
        let written = StackView {
            uuid: current.stack.uuid,
            version: current.stack.version + 1,
            height: 1,
            hash: Some(block_hash(&data)),
        };

        let outcome = self
            .client
            .version(&current.stack.view(), sealed, data)
            .await?;
        self.written(written, outcome, info, key)
    }

    /// Delete superseded versions on the server.
    pub async fn vacuum(&self) -> Result<()> {
        Ok(self.client.vacuum().await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Replay a whole stack from its first retained version.
    pub async fn open<H>(
        &self,
        master: &C::Key,
        uuid: &StackId,
        handler: &mut H,
    ) -> Result<(StackInfo<C::Key>, SyncReport)>
    where
        H: SecureHandler + ?Sized,
    {
        self.pull(master, StackView::origin(*uuid), None, handler)
            .await
    }

    /// Pull everything after `current`.
    pub async fn sync<H>(
        &self,
        master: &C::Key,
        current: &StackInfo<C::Key>,
        handler: &mut H,
    ) -> Result<(StackInfo<C::Key>, SyncReport)>
    where
        H: SecureHandler + ?Sized,
    {
        let known = Some((current.info.clone(), current.key.clone()));
        self.pull(master, current.stack.view(), known, handler)
            .await
    }

    /// Replay the version `cursor` is on from its first block.
    ///
    /// Needs no version key up front, so it also resumes after
    /// [`BytesyncError::Diverged`].
    pub async fn sync_version<H>(
        &self,
        master: &C::Key,
        cursor: &StackView,
        handler: &mut H,
    ) -> Result<(StackInfo<C::Key>, SyncReport)>
    where
        H: SecureHandler + ?Sized,
    {
        let unopened = StackView {
            uuid: cursor.uuid,
            version: cursor.version,
            height: 0,
            hash: None,
        };
        self.pull(master, unopened, None, handler).await
    }

    async fn pull<H>(
        &self,
        master: &C::Key,
        cursor: StackView,
        known: Option<(Bytes, C::Key)>,
        handler: &mut H,
    ) -> Result<(StackInfo<C::Key>, SyncReport)>
    where
        H: SecureHandler + ?Sized,
    {
        let mut decrypting = Decrypting {
            cipher: &self.cipher,
            master,
            current: known,
            handler,
        };
        let report = self.client.sync(&cursor, &mut decrypting).await?;

        let (info, key) = match decrypting.current {
            Some(current) => current,
            None => {
                return Err(SyncError::UnexpectedResponse(
                    "synced without receiving a version".into(),
                )
                .into())
            }
        };
        let latest = StackInfo {
            stack: report.stack.clone(),
            info,
            key,
        };
        Ok((latest, report))
    }

    /// Decrypt one block of the current version.
    pub async fn read(&self, current: &StackInfo<C::Key>, index: u64) -> Result<Vec<u8>> {
        let (_, block) = self
            .client
            .read(&current.stack.uuid, current.stack.version, index)
            .await?;
        Ok(self.cipher.decrypt(&current.key, &block.data)?)
    }

    /// Byte usage (of ciphertext) for one stack or all of them.
    pub async fn size(&self, stack: Option<&StackView>) -> Result<Vec<SizeEntry>> {
        Ok(self.client.size(stack).await?)
    }
}

/// Adapts a [`SecureHandler`] to the raw sync loop.
struct Decrypting<'a, C: SymmetricCipher, H: ?Sized> {
    cipher: &'a C,
    master: &'a C::Key,
    /// Metadata and key of the version the cursor is on.
    current: Option<(Bytes, C::Key)>,
    handler: &'a mut H,
}

fn handler_error(err: impl std::fmt::Display) -> SyncError {
    SyncError::Handler(err.to_string())
}

#[async_trait]
impl<'a, C, H> SyncHandler for Decrypting<'a, C, H>
where
    C: SymmetricCipher,
    H: SecureHandler + ?Sized,
{
    async fn on_block(&mut self, stack: &Stack, block: &Block) -> bytesync_sync::Result<()> {
        let key = match &self.current {
            Some((_, key)) => key,
            None => {
                return Err(SyncError::Handler(format!(
                    "no key for version {}",
                    stack.version
                )))
            }
        };
        let plain = self.cipher.decrypt(key, &block.data).map_err(handler_error)?;
        self.handler
            .on_block(stack, block.index, plain)
            .await
            .map_err(handler_error)
    }

    async fn on_version(
        &mut self,
        stack: &Stack,
        info: &Bytes,
        block: &Block,
    ) -> bytesync_sync::Result<()> {
        let opened = VersionInfo::open(self.cipher, self.master, info).map_err(handler_error)?;
        let plain = self
            .cipher
            .decrypt(&opened.key, &block.data)
            .map_err(handler_error)?;
        self.current = Some((opened.info.clone(), opened.key));
        self.handler
            .on_version(stack, opened.info, plain)
            .await
            .map_err(handler_error)
    }

    fn is_cancelled(&self) -> bool {
        self.handler.is_cancelled()
    }
}
