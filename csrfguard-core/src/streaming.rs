//! Chunked response bodies.
//!
//! A streamed body is a sequence of [`StreamChunk`]s. `Data` carries bytes
//! of arbitrary size, `Flush` asks the transport to push buffered bytes to
//! the client, and `End` closes the stream. Producers that need a push-style
//! API use [`ChunkStream::channel`].

use crate::Error;
use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// One unit of a streamed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Data(Bytes),
    Flush,
    End,
}

impl StreamChunk {
    pub fn data(bytes: impl Into<Bytes>) -> Self {
        StreamChunk::Data(bytes.into())
    }

    /// Payload bytes, if this is a data chunk.
    pub fn as_data(&self) -> Option<&Bytes> {
        match self {
            StreamChunk::Data(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl From<Bytes> for StreamChunk {
    fn from(b: Bytes) -> Self {
        StreamChunk::Data(b)
    }
}

impl From<&'static str> for StreamChunk {
    fn from(s: &'static str) -> Self {
        StreamChunk::Data(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for StreamChunk {
    fn from(s: String) -> Self {
        StreamChunk::Data(Bytes::from(s))
    }
}

/// Boxed stream of chunks, the shape every streamed body takes.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, Error>> + Send>>;

enum Message {
    Chunk(StreamChunk),
    Error(String),
}

/// Receiving half of a chunk channel.
pub struct ChunkStream {
    receiver: mpsc::Receiver<Message>,
    ended: bool,
}

/// Sending half of a chunk channel.
#[derive(Clone)]
pub struct ChunkSender {
    sender: mpsc::Sender<Message>,
    bytes_sent: Arc<AtomicU64>,
}

impl ChunkStream {
    /// Channel with the default capacity of 64 chunks.
    pub fn channel() -> (Self, ChunkSender) {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> (Self, ChunkSender) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                receiver,
                ended: false,
            },
            ChunkSender {
                sender,
                bytes_sent: Arc::new(AtomicU64::new(0)),
            },
        )
    }

    /// Stream that yields the given chunks, then ends.
    pub fn from_chunks<I>(chunks: I) -> BodyStream
    where
        I: IntoIterator<Item = StreamChunk>,
        I::IntoIter: Send + 'static,
    {
        Box::pin(futures_util::stream::iter(chunks.into_iter().map(Ok)))
    }
}

impl Stream for ChunkStream {
    type Item = Result<StreamChunk, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.ended {
            return Poll::Ready(None);
        }
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(Message::Chunk(chunk))) => {
                if chunk == StreamChunk::End {
                    self.ended = true;
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Message::Error(e))) => Poll::Ready(Some(Err(Error::Stream(e)))),
            Poll::Ready(None) => {
                self.ended = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl ChunkSender {
    pub async fn send(&self, data: impl Into<Bytes>) -> Result<(), Error> {
        let bytes = data.into();
        let len = bytes.len() as u64;
        self.push(Message::Chunk(StreamChunk::Data(bytes))).await?;
        self.bytes_sent.fetch_add(len, Ordering::Relaxed);
        Ok(())
    }

    pub async fn flush(&self) -> Result<(), Error> {
        self.push(Message::Chunk(StreamChunk::Flush)).await
    }

    pub async fn send_error(&self, error: impl Into<String>) -> Result<(), Error> {
        self.push(Message::Error(error.into())).await
    }

    /// Send `End`. Dropping every sender ends the stream as well.
    pub async fn close(&self) {
        let _ = self.push(Message::Chunk(StreamChunk::End)).await;
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn push(&self, message: Message) -> Result<(), Error> {
        self.sender
            .send(message)
            .await
            .map_err(|_| Error::Stream("receiver dropped".to_string()))
    }
}
