//! Composition root.
//!
//! Wires the byte stream, codec, dispatcher, and write queue together
//! with explicit construction: every component receives its
//! collaborators here, nothing is looked up globally. `Engine::mock`
//! swaps the transport for the mock bus and loops its replies back as
//! the inbound stream, so everything downstream of the transport is
//! identical in live and mock operation.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::dispatch::Dispatcher;
use crate::handlers;
use crate::mock::MockBus;
use crate::protocol::{BusCodec, Frame};
use crate::queue::{QueueConfig, QueueHandle, WriteQueue};
use crate::state::{self, SharedState};
use crate::tracing::prelude::*;
use crate::transport::{BusTransport, StreamTransport};

pub struct Engine {
    state: SharedState,
    queue: QueueHandle,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Engine {
    /// Run against a real byte stream (TCP serial bridge, pty, ...).
    pub fn new<R, W>(reader: R, writer: W, config: QueueConfig) -> Engine
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::build(reader, Box::new(StreamTransport::new(writer)), config)
    }

    /// Run against the mock equipment responder.
    pub fn mock(config: QueueConfig) -> Engine {
        let (loopback_tx, loopback_rx) = mpsc::channel::<Vec<u8>>(64);
        let reader = StreamReader::new(
            ReceiverStream::new(loopback_rx).map(|bytes| Ok::<_, io::Error>(Bytes::from(bytes))),
        );
        Self::build(reader, Box::new(MockBus::new(loopback_tx)), config)
    }

    fn build<R>(reader: R, transport: Box<dyn BusTransport>, config: QueueConfig) -> Engine
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let state = state::shared();
        let dispatcher = Arc::new(Dispatcher::new(handlers::default_table(), state.clone()));
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();

        // Every decoded inbound frame also reaches the queue for ack
        // correlation; dispatch happens first so state is current by the
        // time a submitter's future resolves.
        let (ack_tx, ack_rx) = mpsc::channel::<Frame>(64);
        let queue = WriteQueue::spawn(transport, config, ack_rx, shutdown.clone(), &tracker);

        tracker.spawn(read_task(
            reader,
            dispatcher.clone(),
            ack_tx,
            shutdown.clone(),
        ));
        tracker.close();

        Engine {
            state,
            queue,
            dispatcher,
            shutdown,
            tracker,
        }
    }

    pub fn queue(&self) -> QueueHandle {
        self.queue.clone()
    }

    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    pub fn messages_seen(&self) -> u64 {
        self.dispatcher.messages_seen()
    }

    /// Cancel all tasks and wait for them to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.tracker.wait().await;
    }
}

async fn read_task<R>(
    reader: R,
    dispatcher: Arc<Dispatcher>,
    ack_tx: mpsc::Sender<Frame>,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut frames = FramedRead::new(reader, BusCodec);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            item = frames.next() => match item {
                Some(Ok(frame)) => {
                    dispatcher.dispatch(&frame);
                    if ack_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                Some(Err(err)) => {
                    error!("bus read failed: {err}");
                    break;
                }
                None => {
                    info!("bus stream ended");
                    break;
                }
            }
        }
    }
}
