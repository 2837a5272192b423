//! Line framing for incrementally delivered response bodies.
//!
//! Network reads do not line up with backend records: one read may carry
//! several records, or end halfway through one. [`FrameBuffer`] holds the
//! unfinished tail between reads and hands out complete lines only.

use futures::{Stream, StreamExt};
use runway_core::error::RuntimeError;
use runway_core::provider::ChunkStream;
use runway_core::types::StreamChunk;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Longest frame excerpt written to logs
const LOG_EXCERPT_CHARS: usize = 120;

/// Accumulates raw bytes and splits them on `\n`.
///
/// Works on bytes rather than text so a multi-byte character split across
/// two reads is reassembled before decoding.
#[derive(Debug, Default)]
pub(crate) struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a read and drain every complete, non-blank line
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(line) = Self::decode_line(&line) {
                lines.push(line);
            }
        }
        lines
    }

    /// Whatever is left once the body has ended
    pub(crate) fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        Self::decode_line(&rest)
    }

    fn decode_line(raw: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        (!line.is_empty()).then(|| line.to_string())
    }
}

/// Outcome of decoding one complete line
#[derive(Debug, PartialEq)]
pub(crate) enum Frame {
    Chunk(StreamChunk),
    /// Nothing to emit (keep-alive, metadata, empty delta)
    Ignore,
    /// Terminal sentinel
    Done,
}

/// Backend-specific line decoder
pub(crate) type Decoder = fn(&str) -> Result<Frame, RuntimeError>;

/// Turn a raw body into a chunk stream.
///
/// Malformed frames are logged and skipped. The stream ends at the decoder's
/// sentinel, at end of body, on a transport error (yielded once), or on
/// cancellation (yields `Cancelled` once and drops the body).
pub(crate) fn decode_frames<S, B>(body: S, decoder: Decoder, cancel: CancellationToken) -> Box<ChunkStream>
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut body = body;
        let mut buffer = FrameBuffer::new();

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                read = body.next() => Some(read),
            };
            let Some(read) = read else {
                debug!("stream cancelled, dropping response body");
                yield Err(RuntimeError::Cancelled);
                return;
            };

            let (lines, ended) = match read {
                Some(Ok(bytes)) => (buffer.push(bytes.as_ref()), false),
                Some(Err(e)) => {
                    yield Err(RuntimeError::Network(e));
                    return;
                }
                None => (buffer.finish().into_iter().collect::<Vec<_>>(), true),
            };

            for line in lines {
                match decoder(&line) {
                    Ok(Frame::Chunk(chunk)) if !chunk.is_empty() => yield Ok(chunk),
                    Ok(Frame::Chunk(_)) | Ok(Frame::Ignore) => {}
                    Ok(Frame::Done) => return,
                    Err(e) => warn!(frame = %excerpt(&line), error = %e, "skipping malformed stream frame"),
                }
            }

            if ended {
                return;
            }
        }
    };

    Box::new(Box::pin(stream))
}

fn excerpt(line: &str) -> String {
    if line.chars().count() <= LOG_EXCERPT_CHARS {
        return line.to_string();
    }
    let cut: String = line.chars().take(LOG_EXCERPT_CHARS).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use runway_core::provider::collect_stream;

    fn json_lines(line: &str) -> Result<Frame, RuntimeError> {
        match line {
            "END" => Ok(Frame::Done),
            "ping" => Ok(Frame::Ignore),
            _ => {
                let value: serde_json::Value = serde_json::from_str(line)?;
                let text = value["text"]
                    .as_str()
                    .ok_or_else(|| RuntimeError::parse("missing text"))?;
                Ok(Frame::Chunk(StreamChunk::text(text)))
            }
        }
    }

    fn body(reads: &[&str]) -> impl Stream<Item = Result<Vec<u8>, reqwest::Error>> + Send + Unpin {
        let reads: Vec<_> = reads.iter().map(|r| Ok::<_, reqwest::Error>(r.as_bytes().to_vec())).collect();
        futures::stream::iter(reads)
    }

    async fn drain(stream: Box<ChunkStream>) -> Vec<Result<StreamChunk, RuntimeError>> {
        stream.collect().await
    }

    #[test]
    fn test_buffer_holds_partial_line() {
        let mut buffer = FrameBuffer::new();
        assert!(buffer.push(b"{\"text\":\"he").is_empty());
        assert_eq!(buffer.push(b"llo\"}\n\n{\"a\""), vec!["{\"text\":\"hello\"}"]);
        assert_eq!(buffer.finish().as_deref(), Some("{\"a\""));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_buffer_reassembles_split_utf8() {
        let mut buffer = FrameBuffer::new();
        let bytes = "héllo\n".as_bytes();
        // split inside the two-byte 'é'
        assert!(buffer.push(&bytes[..2]).is_empty());
        assert_eq!(buffer.push(&bytes[2..]), vec!["héllo"]);
    }

    #[test]
    fn test_buffer_strips_crlf() {
        let mut buffer = FrameBuffer::new();
        assert_eq!(buffer.push(b"a\r\nb\r\n"), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_record_split_across_reads_yields_one_chunk() {
        let stream = decode_frames(
            body(&["{\"text\":\"Hel", "lo\"}\n"]),
            json_lines,
            CancellationToken::new(),
        );
        let chunks = drain(stream).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().text, "Hello");
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let stream = decode_frames(
            body(&["{\"text\":\"a\"}\n{not json}\n{\"text\":\"b\"}\n"]),
            json_lines,
            CancellationToken::new(),
        );
        let collected = collect_stream(stream).await.unwrap();
        assert_eq!(collected.content, "ab");
    }

    #[tokio::test]
    async fn test_sentinel_closes_stream() {
        let stream = decode_frames(
            body(&["{\"text\":\"a\"}\nping\nEND\n{\"text\":\"late\"}\n"]),
            json_lines,
            CancellationToken::new(),
        );
        let collected = collect_stream(stream).await.unwrap();
        assert_eq!(collected.content, "a");
    }

    #[tokio::test]
    async fn test_unterminated_tail_is_flushed_at_end_of_body() {
        let stream = decode_frames(
            body(&["{\"text\":\"a\"}\n{\"text\":", "\"b\"}"]),
            json_lines,
            CancellationToken::new(),
        );
        let collected = collect_stream(stream).await.unwrap();
        assert_eq!(collected.content, "ab");
    }

    #[tokio::test]
    async fn test_cancellation_ends_stream() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let stream = decode_frames(body(&["{\"text\":\"a\"}\n"]), json_lines, cancel);
        let chunks = drain(stream).await;
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].as_ref().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_excerpt_truncates_long_frames() {
        let long = "x".repeat(500);
        assert_eq!(excerpt(&long).chars().count(), LOG_EXCERPT_CHARS + 3);
        assert_eq!(excerpt("short"), "short");
    }
}
