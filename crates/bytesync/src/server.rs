//! Server: a configured store behind a dispatcher.

use std::sync::Arc;

use bytesync_perms::{AllowAll, Auth};
use bytesync_store::{SqliteStore, Store};
use bytesync_sync::{Dispatcher, JsonTransport, LocalTransport, Request, Response};

use crate::config::ServerConfig;
use crate::error::Result;

/// A dispatcher wired to its store and authorization policy.
///
/// Transports hand requests to [`Server::handle`] or [`Server::handle_json`].
/// Cloning is cheap; clones share the dispatcher.
pub struct Server<S: Store = SqliteStore, A: Auth = AllowAll> {
    dispatcher: Arc<Dispatcher<S, A>>,
}

impl<S: Store, A: Auth> Clone for Server<S, A> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl Server<SqliteStore, AllowAll> {
    /// Open the SQLite store named by `config` and permit every request.
    pub fn open(config: &ServerConfig) -> Result<Self> {
        Self::open_with_auth(config, AllowAll)
    }
}

impl<A: Auth> Server<SqliteStore, A> {
    /// Open the SQLite store named by `config` under an authorization policy.
    pub fn open_with_auth(config: &ServerConfig, auth: A) -> Result<Self> {
        let store = match &config.database_path {
            Some(path) => SqliteStore::open(path)?,
            None => {
                tracing::info!("no database path configured, using in-memory store");
                SqliteStore::open_memory()?
            }
        };
        Ok(Self::with_store(Arc::new(store), auth, config))
    }
}

impl<S: Store, A: Auth> Server<S, A> {
    /// Serve an existing store.
    pub fn with_store(store: Arc<S>, auth: A, config: &ServerConfig) -> Self {
        let dispatcher =
            Dispatcher::with_auth(store, auth).with_config(config.dispatcher_config());
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher<S, A>> {
        &self.dispatcher
    }

    pub fn store(&self) -> &Arc<S> {
        self.dispatcher.store()
    }

    /// Handle one typed request.
    pub async fn handle(&self, request: Request) -> Response {
        self.dispatcher.handle(request).await
    }

    /// Handle one request in its JSON wire form.
    pub async fn handle_json(&self, body: &str) -> String {
        self.dispatcher.handle_json(body).await
    }

    /// An in-process transport with typed messages.
    pub fn local_transport(&self) -> LocalTransport<S, A> {
        LocalTransport::new(Arc::clone(&self.dispatcher))
    }

    /// An in-process transport through the JSON wire form.
    pub fn json_transport(&self) -> JsonTransport<S, A> {
        JsonTransport::new(Arc::clone(&self.dispatcher))
    }
}
