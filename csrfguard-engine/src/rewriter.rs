//! Streaming HTML injection.
//!
//! The rewriter sees a response body as a sequence of chunks of arbitrary
//! size. It looks for `<body`, then the `>` closing that tag, and inserts
//! the no-script fragment there; then it looks for `</body>` and inserts
//! the script fragment in front of it. Chunks are split with
//! [`Bytes::slice`] so the surrounding bytes are never copied.
//!
//! A marker may straddle two chunks. When a chunk ends with bytes that
//! could begin the current marker, those bytes (never more than the
//! marker length minus one) are held back and prepended to the next chunk.

use crate::fragment::Fragments;
use bytes::{Bytes, BytesMut};
use csrfguard_core::{BodyStream, Error, HeaderMap, StreamChunk};
use futures_util::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::trace;

const OPEN_MARKER: &[u8] = b"<body";
const CLOSE_MARKER: &[u8] = b"</body>";

const HTML_TYPES: &[&str] = &["text/html", "text/xhtml", "application/xhtml+xml"];

/// Externally visible progress of a rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteState {
    /// Looking for the opening body tag.
    Init,
    /// No-script fragment injected; looking for `</body>`.
    BodyTagFound,
    /// Script fragment injected; remaining bytes pass through.
    BodyCloseFound,
    /// Stream finished, or the response is not rewritten at all.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    SeekOpen,
    SeekTagEnd,
    SeekClose,
    Injected,
    Finished,
}

/// Per-response rewriter. Never shared between responses.
#[derive(Debug)]
pub struct ResponseRewriter {
    fragments: Arc<Fragments>,
    phase: Phase,
    held: Bytes,
    /// A fixed length was announced, so missing fragments are appended at
    /// the end to keep it truthful.
    length_declared: bool,
    noscript_done: bool,
}

impl ResponseRewriter {
    pub fn new(fragments: Arc<Fragments>) -> Self {
        Self {
            fragments,
            phase: Phase::SeekOpen,
            held: Bytes::new(),
            length_declared: false,
            noscript_done: false,
        }
    }

    /// Decide whether this response is rewritten and fix up its framing
    /// headers before any body byte is forwarded.
    pub fn begin(&mut self, headers: &mut HeaderMap, status: u16, method: &str) -> bool {
        if !self.is_rewritable(headers, status, method) {
            self.phase = Phase::Finished;
            return false;
        }

        if let Some(raw) = headers.content_length_raw() {
            let adjusted = raw
                .trim()
                .parse::<u64>()
                .ok()
                .and_then(|len| len.checked_add(self.fragments.total_len() as u64));
            match adjusted {
                Some(len) => {
                    headers.set_content_length(len);
                    self.length_declared = true;
                }
                None => {
                    trace!(value = raw, "dropping unusable Content-Length");
                    headers.remove("Content-Length");
                }
            }
        }
        true
    }

    fn is_rewritable(&self, headers: &HeaderMap, status: u16, method: &str) -> bool {
        if method.eq_ignore_ascii_case("HEAD") || status < 200 || status == 204 || status == 304 {
            return false;
        }
        if headers
            .get("Content-Encoding")
            .is_some_and(|enc| !enc.trim().eq_ignore_ascii_case("identity"))
        {
            return false;
        }
        headers
            .media_type()
            .is_some_and(|media| HTML_TYPES.contains(&media.as_str()))
    }

    pub fn state(&self) -> RewriteState {
        match self.phase {
            Phase::SeekOpen | Phase::SeekTagEnd => RewriteState::Init,
            Phase::SeekClose => RewriteState::BodyTagFound,
            Phase::Injected => RewriteState::BodyCloseFound,
            Phase::Finished => RewriteState::Done,
        }
    }

    /// Scan one chunk, pushing the rewritten output to `out`.
    pub fn feed<E: Extend<StreamChunk>>(&mut self, chunk: Bytes, out: &mut E) {
        if matches!(self.phase, Phase::Injected | Phase::Finished) {
            emit(out, chunk);
            return;
        }

        let buf = if self.held.is_empty() {
            chunk
        } else {
            let mut joined = BytesMut::with_capacity(self.held.len() + chunk.len());
            joined.extend_from_slice(&self.held);
            joined.extend_from_slice(&chunk);
            self.held = Bytes::new();
            joined.freeze()
        };

        let mut emit_from = 0;
        let mut pos = 0;
        loop {
            match self.phase {
                Phase::SeekOpen => match find_ignore_case(&buf[pos..], OPEN_MARKER) {
                    Some(i) => {
                        pos += i + OPEN_MARKER.len();
                        self.phase = Phase::SeekTagEnd;
                    }
                    None => break,
                },
                Phase::SeekTagEnd => match memchr::memchr(b'>', &buf[pos..]) {
                    Some(i) => {
                        let cut = pos + i + 1;
                        emit(out, buf.slice(emit_from..cut));
                        emit(out, self.fragments.noscript.clone());
                        self.noscript_done = true;
                        emit_from = cut;
                        pos = cut;
                        self.phase = Phase::SeekClose;
                    }
                    None => {
                        pos = buf.len();
                        break;
                    }
                },
                Phase::SeekClose => match find_ignore_case(&buf[pos..], CLOSE_MARKER) {
                    Some(i) => {
                        let cut = pos + i;
                        emit(out, buf.slice(emit_from..cut));
                        emit(out, self.fragments.script.clone());
                        emit_from = cut;
                        self.phase = Phase::Injected;
                        break;
                    }
                    None => break,
                },
                Phase::Injected | Phase::Finished => break,
            }
        }

        let keep = match self.phase {
            Phase::SeekOpen => partial_suffix(&buf[pos..], OPEN_MARKER),
            Phase::SeekClose => partial_suffix(&buf[pos..], CLOSE_MARKER),
            _ => 0,
        };
        let split = buf.len() - keep;
        emit(out, buf.slice(emit_from..split));
        self.held = buf.slice(split..);
    }

    /// Release held bytes and terminate the stream.
    pub fn finish<E: Extend<StreamChunk>>(&mut self, out: &mut E) {
        if self.phase == Phase::Finished {
            return;
        }
        emit(out, std::mem::take(&mut self.held));

        if self.length_declared && self.phase != Phase::Injected {
            trace!(state = ?self.state(), "body markers missing, appending fragments");
            if !self.noscript_done {
                emit(out, self.fragments.noscript.clone());
            }
            emit(out, self.fragments.script.clone());
        }

        self.phase = Phase::Finished;
        out.extend([StreamChunk::Flush, StreamChunk::End]);
    }

    /// Rewrite a fully buffered body in one pass.
    ///
    /// The caller sets the exact length afterwards, so a body without
    /// markers is never padded.
    pub fn rewrite_full(&mut self, body: Bytes) -> Bytes {
        self.length_declared = false;
        let mut chunks = Vec::new();
        self.feed(body, &mut chunks);
        self.finish(&mut chunks);

        let len = chunks.iter().filter_map(StreamChunk::as_data).map(Bytes::len).sum();
        let mut joined = BytesMut::with_capacity(len);
        for chunk in &chunks {
            if let Some(data) = chunk.as_data() {
                joined.extend_from_slice(data);
            }
        }
        joined.freeze()
    }
}

fn emit<E: Extend<StreamChunk>>(out: &mut E, bytes: Bytes) {
    if !bytes.is_empty() {
        out.extend(std::iter::once(StreamChunk::Data(bytes)));
    }
}

/// ASCII case-insensitive substring search.
fn find_ignore_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    let first = *needle.first()?;
    let mut offset = 0;
    while let Some(i) = memchr::memchr(first, &haystack[offset..]) {
        let start = offset + i;
        let end = start + needle.len();
        if end > haystack.len() {
            return None;
        }
        if haystack[start..end].eq_ignore_ascii_case(needle) {
            return Some(start);
        }
        offset = start + 1;
    }
    None
}

/// Length of the longest proper prefix of `needle` that ends `haystack`.
fn partial_suffix(haystack: &[u8], needle: &[u8]) -> usize {
    let max = needle.len().saturating_sub(1).min(haystack.len());
    (1..=max)
        .rev()
        .find(|&n| haystack[haystack.len() - n..].eq_ignore_ascii_case(&needle[..n]))
        .unwrap_or(0)
}

/// A body stream passed through a [`ResponseRewriter`].
pub struct RewriteStream {
    inner: BodyStream,
    rewriter: ResponseRewriter,
    pending: VecDeque<StreamChunk>,
    finished: bool,
}

impl RewriteStream {
    pub fn new(inner: BodyStream, rewriter: ResponseRewriter) -> Self {
        Self {
            inner,
            rewriter,
            pending: VecDeque::new(),
            finished: false,
        }
    }
}

impl Stream for RewriteStream {
    type Item = Result<StreamChunk, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(chunk) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(chunk)));
            }
            if this.finished {
                return Poll::Ready(None);
            }
            match this.inner.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(StreamChunk::Data(bytes)))) => {
                    this.rewriter.feed(bytes, &mut this.pending);
                }
                Poll::Ready(Some(Ok(StreamChunk::Flush))) => {
                    this.pending.push_back(StreamChunk::Flush);
                }
                Poll::Ready(Some(Ok(StreamChunk::End))) | Poll::Ready(None) => {
                    this.rewriter.finish(&mut this.pending);
                    this.finished = true;
                }
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csrfguard_core::ChunkStream;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const PAGE: &str = "<!doctype html><html><head><title>t</title></head>\
                        <BODY class=\"main\"><p>hello</p></Body></html>";

    fn fragments() -> Arc<Fragments> {
        Arc::new(Fragments::custom("<noscript>N</noscript>", "<script>S</script>"))
    }

    fn expected() -> String {
        "<!doctype html><html><head><title>t</title></head>\
         <BODY class=\"main\"><noscript>N</noscript><p>hello</p><script>S</script></Body></html>"
            .to_string()
    }

    fn run(parts: &[&[u8]]) -> (String, Vec<StreamChunk>) {
        let mut rewriter = ResponseRewriter::new(fragments());
        let mut out = Vec::new();
        for part in parts {
            rewriter.feed(Bytes::copy_from_slice(part), &mut out);
        }
        rewriter.finish(&mut out);
        let body: Vec<u8> = out
            .iter()
            .filter_map(StreamChunk::as_data)
            .flat_map(|b| b.iter().copied())
            .collect();
        (String::from_utf8(body).unwrap(), out)
    }

    fn html_headers(len: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "text/html; charset=utf-8");
        if let Some(len) = len {
            headers.insert("Content-Length", len);
        }
        headers
    }

    #[test]
    fn test_single_chunk() {
        let (body, out) = run(&[PAGE.as_bytes()]);
        assert_eq!(body, expected());
        assert_eq!(&out[out.len() - 2..], &[StreamChunk::Flush, StreamChunk::End]);
    }

    #[test]
    fn test_every_two_way_and_three_way_split() {
        let page = PAGE.as_bytes();
        for i in 0..=page.len() {
            let (body, _) = run(&[&page[..i], &page[i..]]);
            assert_eq!(body, expected(), "split at {i}");
            for j in i..=page.len() {
                let (body, _) = run(&[&page[..i], &page[i..j], &page[j..]]);
                assert_eq!(body, expected(), "split at {i}, {j}");
            }
        }
    }

    #[test]
    fn test_random_splits() {
        let page = PAGE.as_bytes();
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..500 {
            let mut parts = Vec::new();
            let mut start = 0;
            while start < page.len() {
                let end = (start + rng.gen_range(1..=6)).min(page.len());
                parts.push(&page[start..end]);
                start = end;
            }
            let (body, _) = run(&parts);
            assert_eq!(body, expected());
        }
    }

    #[test]
    fn test_one_byte_chunks() {
        let parts: Vec<&[u8]> = PAGE.as_bytes().chunks(1).collect();
        assert_eq!(run(&parts).0, expected());
    }

    #[test]
    fn test_state_progression() {
        let mut rewriter = ResponseRewriter::new(fragments());
        let mut out = Vec::new();
        assert_eq!(rewriter.state(), RewriteState::Init);
        rewriter.feed(Bytes::from_static(b"<html><body"), &mut out);
        assert_eq!(rewriter.state(), RewriteState::Init);
        rewriter.feed(Bytes::from_static(b">text"), &mut out);
        assert_eq!(rewriter.state(), RewriteState::BodyTagFound);
        rewriter.feed(Bytes::from_static(b"</body></html>"), &mut out);
        assert_eq!(rewriter.state(), RewriteState::BodyCloseFound);
        rewriter.finish(&mut out);
        assert_eq!(rewriter.state(), RewriteState::Done);
    }

    #[test]
    fn test_held_bytes_are_bounded() {
        let mut rewriter = ResponseRewriter::new(fragments());
        let mut out = Vec::new();
        rewriter.feed(Bytes::from_static(b"<p>a</p><bo"), &mut out);
        assert_eq!(rewriter.held.len(), 3);
        rewriter.feed(Bytes::from_static(b"dy>abc</bod"), &mut out);
        assert_eq!(rewriter.held.len(), 5);
        assert!(rewriter.held.len() < CLOSE_MARKER.len());
        rewriter.feed(Bytes::from_static(b"y>"), &mut out);
        assert!(rewriter.held.is_empty());
        assert_eq!(rewriter.state(), RewriteState::BodyCloseFound);
    }

    #[test]
    fn test_missing_close_keeps_noscript() {
        let (body, _) = run(&[b"<body><p>cut off"]);
        assert_eq!(body, "<body><noscript>N</noscript><p>cut off");
    }

    #[test]
    fn test_no_body_tag_passes_through() {
        let (body, _) = run(&[b"<p>fragment</p>", b"<bod"]);
        assert_eq!(body, "<p>fragment</p><bod");
    }

    #[test]
    fn test_begin_adjusts_content_length() {
        let mut headers = html_headers(Some("100"));
        let mut rewriter = ResponseRewriter::new(fragments());
        assert!(rewriter.begin(&mut headers, 200, "GET"));
        let added = fragments().total_len() as u64;
        assert_eq!(headers.content_length(), Some(100 + added));
    }

    #[test]
    fn test_begin_drops_bad_content_length() {
        let mut headers = html_headers(Some("lots"));
        let mut rewriter = ResponseRewriter::new(fragments());
        assert!(rewriter.begin(&mut headers, 200, "GET"));
        assert!(!headers.contains("Content-Length"));
    }

    #[test]
    fn test_begin_skips_non_html() {
        let mut rewriter = ResponseRewriter::new(fragments());
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "application/json");
        headers.insert("Content-Length", "10");
        assert!(!rewriter.begin(&mut headers, 200, "GET"));
        assert_eq!(headers.content_length(), Some(10));
        assert_eq!(rewriter.state(), RewriteState::Done);

        let mut out = Vec::new();
        rewriter.feed(Bytes::from_static(b"<body></body>"), &mut out);
        assert_eq!(out, vec![StreamChunk::data("<body></body>")]);
    }

    #[test]
    fn test_begin_skips_special_responses() {
        for (status, method, encoding) in [
            (200, "HEAD", None),
            (204, "GET", None),
            (304, "GET", None),
            (200, "GET", Some("gzip")),
        ] {
            let mut headers = html_headers(None);
            if let Some(encoding) = encoding {
                headers.insert("Content-Encoding", encoding);
            }
            let mut rewriter = ResponseRewriter::new(fragments());
            assert!(!rewriter.begin(&mut headers, status, method));
        }

        let mut headers = html_headers(None);
        headers.insert("Content-Type", "application/XHTML+xml");
        assert!(ResponseRewriter::new(fragments()).begin(&mut headers, 200, "POST"));
    }

    #[test]
    fn test_begin_drops_overflowing_content_length() {
        let mut headers = html_headers(Some("18446744073709551615"));
        let mut rewriter = ResponseRewriter::new(fragments());
        assert!(rewriter.begin(&mut headers, 200, "GET"));
        assert!(!headers.contains("Content-Length"));

        let (body, _) = run(&[b"<p>no body tag</p>"]);
        assert_eq!(body, "<p>no body tag</p>");
    }

    #[tokio::test]
    async fn test_declared_length_pads_missing_fragments() {
        let page = "<p>no body tag</p>";
        let mut headers = html_headers(Some(&page.len().to_string()));
        let mut rewriter = ResponseRewriter::new(fragments());
        assert!(rewriter.begin(&mut headers, 200, "GET"));

        let inner = ChunkStream::from_chunks(vec![StreamChunk::data(page), StreamChunk::End]);
        let chunks: Vec<StreamChunk> = RewriteStream::new(inner, rewriter)
            .map(|c| c.unwrap())
            .collect()
            .await;
        let len: usize = chunks.iter().filter_map(StreamChunk::as_data).map(Bytes::len).sum();
        assert_eq!(Some(len as u64), headers.content_length());
    }

    #[test]
    fn test_buffered_partial_is_not_padded() {
        let page = b"<tr><td>1</td></tr>";
        let mut headers = html_headers(Some(&page.len().to_string()));
        let mut rewriter = ResponseRewriter::new(fragments());
        assert!(rewriter.begin(&mut headers, 200, "GET"));
        let body = rewriter.rewrite_full(Bytes::from_static(page));
        assert_eq!(body, Bytes::from_static(page));
    }

    #[test]
    fn test_rewrite_full() {
        let mut rewriter = ResponseRewriter::new(fragments());
        let body = rewriter.rewrite_full(Bytes::from_static(PAGE.as_bytes()));
        assert_eq!(body, Bytes::from(expected()));
    }

    #[tokio::test]
    async fn test_stream_passes_flush_and_ends() {
        let inner = ChunkStream::from_chunks(vec![
            StreamChunk::data("<html><bo"),
            StreamChunk::Flush,
            StreamChunk::data("dy>hi</bo"),
            StreamChunk::data("dy></html>"),
            StreamChunk::End,
        ]);
        let stream = RewriteStream::new(inner, ResponseRewriter::new(fragments()));
        let chunks: Vec<StreamChunk> = stream.map(|c| c.unwrap()).collect().await;

        assert!(chunks.contains(&StreamChunk::Flush));
        assert_eq!(chunks.last(), Some(&StreamChunk::End));
        let body: Vec<u8> = chunks
            .iter()
            .filter_map(StreamChunk::as_data)
            .flat_map(|b| b.iter().copied())
            .collect();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            "<html><body><noscript>N</noscript>hi<script>S</script></body></html>"
        );
    }

    #[tokio::test]
    async fn test_stream_without_end_marker() {
        let inner = ChunkStream::from_chunks(vec![StreamChunk::data("<body>x</body>")]);
        let stream = RewriteStream::new(inner, ResponseRewriter::new(fragments()));
        let chunks: Vec<StreamChunk> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(&chunks[chunks.len() - 2..], &[StreamChunk::Flush, StreamChunk::End]);
    }

    #[tokio::test]
    async fn test_stream_error_terminates() {
        let (stream, sender) = ChunkStream::channel();
        sender.send("<body>").await.unwrap();
        sender.send_error("upstream reset").await.unwrap();
        let rewritten = RewriteStream::new(Box::pin(stream), ResponseRewriter::new(fragments()));
        let items: Vec<_> = rewritten.collect().await;
        assert!(items.last().unwrap().is_err());
    }
}
