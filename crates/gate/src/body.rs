//! Single-read request body capture.
//!
//! Depending on how the gate is embedded, the body may arrive as a live
//! stream, as a [`BufferedBody`] left by an outer buffering layer, or as raw
//! [`Bytes`] the transport stashed in the request extensions.
//! [`BodyExtractor`] walks an ordered list of [`BodySource`]s, stops at the
//! first one that yields data and caches the result, so every later call
//! returns the same bytes without touching the transport again.

use async_trait::async_trait;
use axum::{body::Body, http::Extensions};
use bytes::Bytes;
use tokio::sync::Mutex;

/// Bytes an outer layer has already read off the wire and stashed in the
/// request extensions.
#[derive(Debug, Clone)]
pub struct BufferedBody(pub Bytes);

/// One way of getting at a request body.
#[async_trait]
pub trait BodySource: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Read the whole body. `None` means this source had nothing to give.
    async fn read(&mut self, limit: usize) -> Option<Bytes>;
}

/// The native streaming body.
pub struct StreamSource(Option<Body>);

impl StreamSource {
    /// Wrap a streaming body.
    pub const fn new(body: Body) -> Self {
        Self(Some(body))
    }
}

#[async_trait]
impl BodySource for StreamSource {
    fn name(&self) -> &'static str {
        "stream"
    }

    async fn read(&mut self, limit: usize) -> Option<Bytes> {
        let body = self.0.take()?;
        match axum::body::to_bytes(body, limit).await {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, limit, "streaming body read failed");
                None
            }
        }
    }
}

/// A body that was buffered before the gate saw the request.
pub struct BufferedSource {
    name: &'static str,
    bytes: Option<Bytes>,
}

impl BufferedSource {
    /// Take a [`BufferedBody`] out of `extensions`, if one was inserted.
    pub fn from_extensions(extensions: &mut Extensions) -> Self {
        Self { name: "buffered", bytes: extensions.remove::<BufferedBody>().map(|b| b.0) }
    }

    /// Take raw [`Bytes`] the transport left in `extensions`, if any.
    pub fn from_transport(extensions: &mut Extensions) -> Self {
        Self { name: "transport", bytes: extensions.remove::<Bytes>() }
    }
}

#[async_trait]
impl BodySource for BufferedSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn read(&mut self, limit: usize) -> Option<Bytes> {
        let bytes = self.bytes.take()?;
        if bytes.is_empty() {
            return None;
        }
        if bytes.len() > limit {
            warn!(len = bytes.len(), limit, "buffered body exceeds limit");
            return None;
        }
        Some(bytes)
    }
}

/// Reads a request body at most once across an ordered set of sources.
///
/// The mutex keeps the extractor `Sync` around a non-`Sync` [`Body`]. It is
/// only reached through `&mut self` and never contended.
pub struct BodyExtractor {
    sources: Mutex<Vec<Box<dyn BodySource>>>,
    limit: usize,
    captured: Option<Bytes>,
    transport_reads: usize,
}

impl BodyExtractor {
    /// An extractor with no sources; always yields an empty body.
    pub fn new(limit: usize) -> Self {
        Self { sources: Mutex::new(Vec::new()), limit, captured: None, transport_reads: 0 }
    }

    /// The standard chain: the streaming body, then a [`BufferedBody`]
    /// extension, then a raw [`Bytes`] extension.
    pub fn for_request(body: Body, extensions: &mut Extensions, limit: usize) -> Self {
        Self::new(limit)
            .with_source(StreamSource::new(body))
            .with_source(BufferedSource::from_extensions(extensions))
            .with_source(BufferedSource::from_transport(extensions))
    }

    /// Append a fallback source.
    #[must_use]
    pub fn with_source<S: BodySource + 'static>(mut self, source: S) -> Self {
        self.sources.get_mut().push(Box::new(source));
        self
    }

    /// The full body. The first call drains the sources; later calls return
    /// the captured bytes. Never fails: an exhausted chain yields empty bytes.
    pub async fn read(&mut self) -> Bytes {
        if let Some(bytes) = &self.captured {
            return bytes.clone();
        }

        self.transport_reads += 1;
        let sources = self.sources.get_mut();
        let mut body = Bytes::new();
        for source in sources.iter_mut() {
            if let Some(bytes) = source.read(self.limit).await {
                debug!(source = source.name(), len = bytes.len(), "request body captured");
                body = bytes;
                break;
            }
        }
        sources.clear();

        self.captured = Some(body.clone());
        body
    }

    /// How many times the sources were actually consulted.
    pub const fn transport_reads(&self) -> usize {
        self.transport_reads
    }
}

impl std::fmt::Debug for BodyExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyExtractor")
            .field("limit", &self.limit)
            .field("captured", &self.captured.as_ref().map(Bytes::len))
            .finish()
    }
}
