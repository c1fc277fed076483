//! Incremental `text/event-stream` decoding.

use anyhow::{anyhow, Result};

/// Splits a server-sent-event body into the `data:` payloads of complete
/// events. Bytes stay undecoded until their event is complete, so a UTF-8
/// sequence cut by a network chunk boundary is reassembled intact.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    /// Feed one network chunk; returns payloads of the events it completes,
    /// in order.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.pending.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some((end, separator_len)) = event_boundary(&self.pending) {
            let raw: Vec<u8> = self.pending.drain(..end + separator_len).collect();
            let event = std::str::from_utf8(&raw[..end])
                .map_err(|e| anyhow!("sse event is not valid utf-8: {e}"))?;
            payloads.extend(
                event
                    .lines()
                    .filter_map(|line| line.strip_prefix("data:"))
                    .map(|data| data.trim_start().to_string()),
            );
        }
        Ok(payloads)
    }

    /// Bytes received but not yet part of a complete event.
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Offset and length of the first blank-line separator (`\n\n` or `\r\n\r\n`).
fn event_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = position(buf, b"\n\n").map(|at| (at, 2));
    let crlf = position(buf, b"\r\n\r\n").map(|at| (at, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 < b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn position(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
