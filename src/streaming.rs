//! Streaming response consumption: incremental chunks and SSE events.
//!
//! A [`StreamingResponse`] owns its connection outright; streaming
//! bypasses the pool because keep-alive boundaries cannot be inferred
//! from an open chunked or SSE stream, so the connection is destroyed
//! when the stream ends or the value is dropped.
//!
//! Bytes read past the header terminator during the header phase are
//! replayed through the same decode path before the first socket read.
//!
//! Two consumption shapes are offered: pull (`next_chunk`,
//! `next_event`, owned values) and callback (`for_each_chunk`,
//! `for_each_event`, borrowed values, halt by returning an error).

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;

use crate::chunked::ChunkedDecoder;
use crate::config::StreamConfig;
use crate::connection::Connection;
use crate::error::HttpError;
use crate::metrics;
use crate::response::{Response, TransferMode};
use crate::sse::{SseEvent, SseParser};

/// A response whose body is consumed incrementally off the socket.
pub struct StreamingResponse {
    conn: Connection,
    response: Response,
    mode: TransferMode,
    /// Body bytes that arrived with the headers, not yet decoded.
    leftover: Vec<u8>,
    decoder: ChunkedDecoder,
    sse: SseParser,
    pending: VecDeque<SseEvent>,
    /// Bytes still owed under fixed-length framing.
    remaining: usize,
    is_sse: bool,
    parse_sse: bool,
    chunk_buffer_size: usize,
    timeout_ms: u64,
    done: bool,
}

impl StreamingResponse {
    pub(crate) fn new(
        conn: Connection,
        response: Response,
        leftover: Vec<u8>,
        config: &StreamConfig,
    ) -> Self {
        let mode = response.transfer_mode();
        let remaining = match mode {
            TransferMode::FixedLength(n) => n,
            _ => 0,
        };
        let is_sse = response
            .get_header("content-type")
            .is_some_and(|ct| ct.len() >= 17 && ct[..17].eq_ignore_ascii_case("text/event-stream"));
        metrics::STREAMS_OPENED.increment();
        StreamingResponse {
            conn,
            response,
            mode,
            leftover,
            decoder: ChunkedDecoder::new(),
            sse: SseParser::with_limits(config.max_event_size, config.overflow_policy),
            pending: VecDeque::new(),
            remaining,
            is_sse,
            parse_sse: config.parse_sse,
            chunk_buffer_size: config.chunk_buffer_size.max(64),
            timeout_ms: config.timeout_ms,
            done: false,
        }
    }

    pub fn status(&self) -> u16 {
        self.response.status()
    }

    /// The parsed response head (headers only; the body streams).
    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.response.get_header(name)
    }

    pub fn transfer_mode(&self) -> TransferMode {
        self.mode
    }

    /// True when the response is `text/event-stream`.
    pub fn is_sse(&self) -> bool {
        self.is_sse
    }

    /// The next decoded body slice, or `None` at end of stream.
    ///
    /// For chunked transports the slice is post-decoding payload; the
    /// stream ends at the terminal chunk. Fixed-length streams end when
    /// the declared count has been delivered, read-until-close and SSE
    /// streams when the peer closes.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, HttpError> {
        loop {
            if self.done {
                return Ok(None);
            }
            match self.mode {
                TransferMode::Chunked => {
                    let input = self.next_input().await?;
                    if input.is_empty() {
                        self.finish();
                        return Err(HttpError::UnexpectedEof);
                    }
                    let mut out = Vec::new();
                    if let Err(e) = self.decoder.parse(&input, &mut out) {
                        self.finish();
                        return Err(e);
                    }
                    if self.decoder.is_complete() {
                        self.finish();
                    }
                    if !out.is_empty() {
                        return Ok(Some(Bytes::from(out)));
                    }
                    // no payload this round: loop for more input or end
                }
                TransferMode::FixedLength(_) => {
                    if self.remaining == 0 {
                        self.finish();
                        return Ok(None);
                    }
                    let mut input = self.next_input().await?;
                    if input.is_empty() {
                        self.finish();
                        return Err(HttpError::UnexpectedEndOfStream);
                    }
                    input.truncate(self.remaining);
                    self.remaining -= input.len();
                    if self.remaining == 0 {
                        self.finish();
                    }
                    return Ok(Some(Bytes::from(input)));
                }
                TransferMode::Sse | TransferMode::ReadUntilClose => {
                    let input = self.next_input().await?;
                    if input.is_empty() {
                        self.finish();
                        return Ok(None);
                    }
                    return Ok(Some(Bytes::from(input)));
                }
            }
        }
    }

    /// The next fully parsed SSE event as an owned value, or `None` at
    /// end of stream.
    pub async fn next_event(&mut self) -> Result<Option<SseEvent>, HttpError> {
        if !self.parse_sse || !self.is_sse {
            return Err(HttpError::NotSseResponse);
        }
        loop {
            if let Some(ev) = self.pending.pop_front() {
                return Ok(Some(ev));
            }
            match self.next_chunk().await? {
                Some(bytes) => {
                    let pending = &mut self.pending;
                    self.sse.parse_chunk(&bytes, |ev| {
                        pending.push_back(ev.clone());
                        Ok(())
                    })?;
                }
                None => return Ok(None),
            }
        }
    }

    /// Deliver every decoded body slice to `cb`. An error from the
    /// callback halts the stream and propagates; the connection is
    /// destroyed either way.
    pub async fn for_each_chunk<F>(mut self, mut cb: F) -> Result<(), HttpError>
    where
        F: FnMut(&[u8]) -> Result<(), HttpError>,
    {
        while let Some(chunk) = self.next_chunk().await? {
            cb(&chunk)?;
        }
        Ok(())
    }

    /// Deliver every SSE event to `cb` as a borrowed value whose strings
    /// are valid only for the duration of the call; copy inside the
    /// callback to retain. An error from the callback halts the stream
    /// and propagates.
    pub async fn for_each_event<F>(mut self, mut cb: F) -> Result<(), HttpError>
    where
        F: FnMut(&SseEvent) -> Result<(), HttpError>,
    {
        if !self.parse_sse || !self.is_sse {
            return Err(HttpError::NotSseResponse);
        }
        while let Some(bytes) = self.next_chunk().await? {
            self.sse.parse_chunk(&bytes, &mut cb)?;
        }
        Ok(())
    }

    /// Leftover header-phase bytes first, then a socket read.
    async fn next_input(&mut self) -> Result<Vec<u8>, HttpError> {
        if !self.leftover.is_empty() {
            return Ok(std::mem::take(&mut self.leftover));
        }
        let mut buf = vec![0u8; self.chunk_buffer_size];
        let n = if self.timeout_ms > 0 {
            match tokio::time::timeout(
                Duration::from_millis(self.timeout_ms),
                self.conn.recv_some(&mut buf),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => {
                    self.finish();
                    return Err(HttpError::Timeout);
                }
            }
        } else {
            self.conn.recv_some(&mut buf).await
        };
        match n {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) => {
                self.finish();
                Err(e)
            }
        }
    }

    fn finish(&mut self) {
        self.done = true;
        self.conn.close();
    }
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.response.status())
            .field("mode", &self.mode)
            .field("done", &self.done)
            .finish()
    }
}
