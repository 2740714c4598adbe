//! Forwarding engine
//!
//! [`StandardProxy`] forwards routing messages to a fixed pool of delegate
//! peers. Each call walks a fresh random permutation of the pool and stops
//! at the first remote that completes the exchange.
//!
//! ## Attempt
//!
//! 1. **CONNECT**: ask the host for a live connection to the remote
//! 2. **OPEN**: open a stream for the proxy's protocol identifier
//! 3. **EXCHANGE**: write the framed message (and, for requests, read one
//!    framed reply)
//! 4. **CLOSE**: close the stream, whatever happened in step 3
//!
//! A failed attempt moves on to the next remote. If all fail, the caller
//! gets the whole history, led by the last remote's error.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use delegate_core::{Host, PeerIdentity, ProtocolStream, StreamHandler};
use rand::seq::SliceRandom;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{Instrument, debug, trace, warn};

use crate::config::ProxyConfig;
use crate::context::CallContext;
use crate::error::{AttemptError, ExhaustedError, FailedAttempt, ProxyError};
use crate::protocol::{self, write_framed};
use crate::trace::{AttemptEvent, LogTracer, Tracer, events};

/// A client that hands routing messages to remote delegates
#[async_trait]
pub trait RoutingProxy<M>: Send + Sync {
    /// Stream type accepted by [`RoutingProxy::handle_stream`]
    type Stream: Send;

    /// Handle a stream a remote opened to us on the proxy protocol
    async fn handle_stream(&self, stream: Self::Stream);

    /// Deliver `message` to one remote, without waiting for a reply
    async fn send_message(&self, ctx: &CallContext, message: &M) -> Result<(), ProxyError>;

    /// Deliver `message` to one remote and return its reply
    async fn send_request(&self, ctx: &CallContext, message: &M) -> Result<M, ProxyError>;
}

/// What happens on the stream once it is open
#[async_trait]
trait Exchange: Send + Sync {
    type Output: Send;

    const EVENT: &'static str;

    async fn run<S>(&self, stream: &mut S, frame: &[u8], max: usize) -> Result<Self::Output, AttemptError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send;
}

/// Write the message, expect nothing back
struct OneWay;

#[async_trait]
impl Exchange for OneWay {
    type Output = ();

    const EVENT: &'static str = events::SEND_MESSAGE;

    async fn run<S>(&self, stream: &mut S, frame: &[u8], _max: usize) -> Result<(), AttemptError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        write_framed(stream, frame).await?;
        Ok(())
    }
}

/// Write the message, read exactly one reply
struct RequestReply<M>(PhantomData<fn() -> M>);

#[async_trait]
impl<M> Exchange for RequestReply<M>
where
    M: DeserializeOwned + Send + 'static,
{
    type Output = M;

    const EVENT: &'static str = events::SEND_REQUEST;

    async fn run<S>(&self, stream: &mut S, frame: &[u8], max: usize) -> Result<M, AttemptError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        write_framed(stream, frame).await?;
        // A reply only counts once it has been read and decoded
        let reply = protocol::read_message(stream, max).await?;
        Ok(reply)
    }
}

/// The standard forwarding proxy
///
/// Holds only the host, the remote pool, its configuration and a tracer;
/// every call's state lives on that call's stack, so one instance can serve
/// any number of concurrent callers.
pub struct StandardProxy<I, H, M>
where
    I: PeerIdentity,
    H: Host<I>,
{
    /// Connection and stream provider
    host: Arc<H>,
    /// Delegates, in configured order (duplicates kept)
    remotes: Arc<[I]>,
    config: ProxyConfig,
    tracer: Arc<dyn Tracer>,
    _message: PhantomData<fn() -> M>,
}

impl<I, H, M> Clone for StandardProxy<I, H, M>
where
    I: PeerIdentity,
    H: Host<I>,
{
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            remotes: self.remotes.clone(),
            config: self.config.clone(),
            tracer: self.tracer.clone(),
            _message: PhantomData,
        }
    }
}

impl<I, H, M> StandardProxy<I, H, M>
where
    I: PeerIdentity,
    H: Host<I>,
    M: Serialize + DeserializeOwned + Debug + Send + Sync + 'static,
{
    /// Create a proxy over `host` forwarding to `remotes`
    pub fn new(host: Arc<H>, remotes: Vec<I>) -> Self {
        Self::with_config(host, remotes, ProxyConfig::default())
    }

    /// Create a proxy with a custom configuration
    pub fn with_config(host: Arc<H>, remotes: Vec<I>, config: ProxyConfig) -> Self {
        Self {
            host,
            remotes: remotes.into(),
            config,
            tracer: Arc::new(LogTracer),
            _message: PhantomData,
        }
    }

    /// Replace the attempt tracer
    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn remotes(&self) -> &[I] {
        &self.remotes
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// A fresh uniformly random order over pool indices
    fn traversal_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.remotes.len()).collect();
        order.shuffle(&mut rand::rng());
        order
    }

    /// Try remotes in random order until one completes `exchange`
    async fn forward<E: Exchange>(
        &self,
        ctx: &CallContext,
        message: &M,
        exchange: E,
    ) -> Result<E::Output, ProxyError> {
        if self.remotes.is_empty() {
            warn!(event = E::EVENT, "no remotes configured");
            return Err(ProxyError::NoRemotes);
        }

        let frame = protocol::encode_message(message, self.config.max_message_size)
            .map_err(ProxyError::Encode)?;
        let local = self.host.local_id().short_id();
        let rendered = format!("{:?}", message);

        let mut failures: Vec<FailedAttempt> = Vec::new();
        for index in self.traversal_order() {
            let remote = &self.remotes[index];
            let mut event = self.tracer.begin(AttemptEvent {
                name: E::EVENT,
                local: local.clone(),
                remote: remote.short_id(),
                message: rendered.clone(),
            });

            let result = self
                .attempt(ctx, remote, &frame, &exchange)
                .instrument(event.span())
                .await;

            match result {
                Ok(output) => {
                    event.done();
                    debug!(
                        event = E::EVENT,
                        remote = %remote.short_id(),
                        failed_before = failures.len(),
                        "remote answered"
                    );
                    return Ok(output);
                }
                Err(error) => {
                    event.set_error(&error);
                    event.done();
                    debug!(event = E::EVENT, remote = %remote.short_id(), error = %error, "attempt failed");
                    failures.push(FailedAttempt {
                        remote: remote.full_id(),
                        error,
                    });
                    // Cancelled or past the deadline
                    if ctx.is_done() {
                        break;
                    }
                }
            }
        }

        match failures.pop() {
            Some(last) => {
                let err = ExhaustedError::new(failures, last);
                warn!(event = E::EVENT, attempts = err.len(), error = %err.last(), "all remotes failed");
                Err(err.into())
            }
            None => Err(ProxyError::NoRemotes),
        }
    }

    /// One attempt against one remote; the stream is closed on every path
    async fn attempt<E: Exchange>(
        &self,
        ctx: &CallContext,
        remote: &I,
        frame: &[u8],
        exchange: &E,
    ) -> Result<E::Output, AttemptError> {
        ctx.run(self.host.connect(remote))
            .await?
            .map_err(AttemptError::Connection)?;

        let mut stream = ctx
            .run(self.host.new_stream(&self.config.protocol, remote))
            .await?
            .map_err(AttemptError::Stream)?;
        trace!(remote = %remote.short_id(), protocol = %self.config.protocol, "stream opened");

        let result = ctx
            .run(exchange.run(&mut stream, frame, self.config.max_message_size))
            .await
            .and_then(|r| r);

        if let Err(e) = stream.close().await {
            debug!(remote = %remote.short_id(), error = %e, "stream close failed");
        }
        result
    }
}

#[async_trait]
impl<I, H, M> RoutingProxy<M> for StandardProxy<I, H, M>
where
    I: PeerIdentity,
    H: Host<I> + 'static,
    M: Serialize + DeserializeOwned + Debug + Send + Sync + 'static,
{
    type Stream = H::Stream;

    /// Reject an inbound stream
    ///
    /// This proxy only asks questions; answering routing queries is the
    /// delegates' job. Anything opened to us is logged and closed without
    /// reading or writing.
    async fn handle_stream(&self, mut stream: H::Stream) {
        warn!(
            remote = %stream.remote_peer().short_id(),
            protocol = %stream.protocol(),
            "routing proxy received (dropped) an inbound routing stream"
        );
        if let Err(e) = stream.close().await {
            debug!(error = %e, "failed to close rejected stream");
        }
    }

    async fn send_message(&self, ctx: &CallContext, message: &M) -> Result<(), ProxyError> {
        self.forward(ctx, message, OneWay).await
    }

    async fn send_request(&self, ctx: &CallContext, message: &M) -> Result<M, ProxyError> {
        self.forward(ctx, message, RequestReply(PhantomData)).await
    }
}

#[async_trait]
impl<I, H, M> StreamHandler<H::Stream> for StandardProxy<I, H, M>
where
    I: PeerIdentity,
    H: Host<I> + 'static,
    M: Serialize + DeserializeOwned + Debug + Send + Sync + 'static,
{
    async fn handle_stream(&self, stream: H::Stream) {
        <Self as RoutingProxy<M>>::handle_stream(self, stream).await
    }
}
