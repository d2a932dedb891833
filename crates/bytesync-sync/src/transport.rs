//! Transport abstraction for the sync protocol.
//!
//! A transport delivers one request to a dispatcher and returns its
//! response. Implementations may use HTTP, WebSockets, or anything else;
//! timeouts and retries belong here rather than in the client driver.

use std::sync::Arc;

use async_trait::async_trait;

use bytesync_perms::{AllowAll, Auth};
use bytesync_store::Store;

use crate::dispatcher::Dispatcher;
use crate::error::{Result, SyncError};
use crate::messages::{Request, Response};

/// Request/response delivery.
///
/// Implementations must be thread-safe (Send + Sync). An `Err` means the
/// request may not have been delivered; a `response.error` is an `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a request and wait for its response.
    async fn send(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: Request) -> Result<Response> {
        (**self).send(request).await
    }
}

/// Calls a dispatcher in-process with typed messages.
pub struct LocalTransport<S: Store, A: Auth = AllowAll> {
    dispatcher: Arc<Dispatcher<S, A>>,
}

impl<S: Store, A: Auth> LocalTransport<S, A> {
    pub fn new(dispatcher: Arc<Dispatcher<S, A>>) -> Self {
        Self { dispatcher }
    }
}

impl<S: Store, A: Auth> Clone for LocalTransport<S, A> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

#[async_trait]
impl<S: Store, A: Auth> Transport for LocalTransport<S, A> {
    async fn send(&self, request: Request) -> Result<Response> {
        Ok(self.dispatcher.handle(request).await)
    }
}

/// Calls a dispatcher in-process through the JSON wire form.
///
/// Exercises exactly the encoding a networked transport would carry.
pub struct JsonTransport<S: Store, A: Auth = AllowAll> {
    dispatcher: Arc<Dispatcher<S, A>>,
}

impl<S: Store, A: Auth> JsonTransport<S, A> {
    pub fn new(dispatcher: Arc<Dispatcher<S, A>>) -> Self {
        Self { dispatcher }
    }
}

impl<S: Store, A: Auth> Clone for JsonTransport<S, A> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

#[async_trait]
impl<S: Store, A: Auth> Transport for JsonTransport<S, A> {
    async fn send(&self, request: Request) -> Result<Response> {
        let body = serde_json::to_string(&request)?;
        tracing::trace!(body = %body, "request");
        let reply = self.dispatcher.handle_json(&body).await;
        tracing::trace!(body = %reply, "response");
        Ok(serde_json::from_str(&reply)?)
    }
}

/// A channel-backed transport for testing.
///
/// A served dispatcher runs on its own task and receives requests over an
/// mpsc channel, so clients and server only share the channel.
pub mod channel {
    use super::*;
    use std::time::Duration;
    use tokio::sync::{mpsc, oneshot};
    use tokio::task::JoinHandle;

    /// Request plus the slot its response goes into.
    struct Envelope {
        request: Request,
        reply: oneshot::Sender<Response>,
    }

    /// Spawn a task that serves `dispatcher` until every transport is dropped.
    pub fn serve<S, A>(dispatcher: Arc<Dispatcher<S, A>>) -> (ChannelTransport, JoinHandle<()>)
    where
        S: Store + 'static,
        A: Auth + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<Envelope>(1000);
        let handle = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    let response = dispatcher.handle(envelope.request).await;
                    // The client may have timed out and dropped its receiver.
                    let _ = envelope.reply.send(response);
                });
            }
            tracing::debug!("channel transport closed");
        });
        (
            ChannelTransport {
                sender: tx,
                timeout: None,
            },
            handle,
        )
    }

    /// Client half of a served dispatcher.
    #[derive(Clone)]
    pub struct ChannelTransport {
        sender: mpsc::Sender<Envelope>,
        timeout: Option<Duration>,
    }

    impl ChannelTransport {
        /// Fail requests that take longer than `timeout`.
        pub fn with_timeout(mut self, timeout: Duration) -> Self {
            self.timeout = Some(timeout);
            self
        }
    }

    #[async_trait]
    impl Transport for ChannelTransport {
        async fn send(&self, request: Request) -> Result<Response> {
            let (reply, rx) = oneshot::channel();
            self.sender
                .send(Envelope { request, reply })
                .await
                .map_err(|_| SyncError::TransportError("server stopped".into()))?;

            let received = match self.timeout {
                Some(timeout) => tokio::time::timeout(timeout, rx)
                    .await
                    .map_err(|_| SyncError::TransportError("request timed out".into()))?,
                None => rx.await,
            };
            received.map_err(|_| SyncError::TransportError("response dropped".into()))
        }
    }
}
