//! Incremental Server-Sent Events tokenizer.
//!
//! Follows the W3C EventSource processing model: input is split on `\n`
//! with a trailing `\r` trimmed per line, the remainder after the last
//! newline is buffered for the next call, and an empty line dispatches
//! the accumulated event. An event is emitted only if at least one
//! `data` field was seen; multiline data is joined with `\n`.
//!
//! The tokenizer owns its buffers. The callback entry point hands out a
//! borrowed [`SseEvent`] whose storage is reused after each dispatch;
//! callers that want to keep a message must copy inside the callback.
//! The pull-based consumers in the streaming layer clone events into
//! owned values instead.

use crate::error::HttpError;

/// Behavior when an event outgrows the configured size cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Fail the stream with [`HttpError::EventTooLarge`].
    #[default]
    ReturnError,
    /// Let the event buffers grow on the heap without bound.
    HeapFallback,
}

/// A parsed SSE event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Event id; inherits the last seen id when the block had no `id` field.
    pub id: Option<String>,
    /// Event name from the `event` field, if any.
    pub event: Option<String>,
    /// Data lines joined with `\n`, no trailing newline.
    pub data: String,
    /// Reconnection delay in milliseconds from a valid `retry` field.
    pub retry: Option<u64>,
}

/// Incremental SSE parser state.
#[derive(Debug)]
pub struct SseParser {
    /// Partial line carried across chunk boundaries.
    line_buf: Vec<u8>,
    /// Event under construction; reused between dispatches.
    building: SseEvent,
    has_data: bool,
    /// `id` field seen in the current block (may differ from inherited id).
    block_id: Option<String>,
    last_event_id: Option<String>,
    max_event_size: usize,
    overflow: OverflowPolicy,
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SseParser {
    /// Parser with no size cap enforcement (heap fallback).
    pub fn new() -> Self {
        Self::with_limits(usize::MAX, OverflowPolicy::HeapFallback)
    }

    /// Parser that enforces `max_event_size` under `policy`.
    pub fn with_limits(max_event_size: usize, policy: OverflowPolicy) -> Self {
        SseParser {
            line_buf: Vec::new(),
            building: SseEvent::default(),
            has_data: false,
            block_id: None,
            last_event_id: None,
            max_event_size,
            overflow: policy,
        }
    }

    /// The most recent event id seen, surviving across events.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Feed a chunk of bytes, invoking `on_event` for each dispatched
    /// event. The `&SseEvent` is valid only for the duration of the call.
    ///
    /// Splitting the stream at any byte boundary yields the same sequence
    /// of events as feeding it whole.
    pub fn parse_chunk<F>(&mut self, input: &[u8], mut on_event: F) -> Result<(), HttpError>
    where
        F: FnMut(&SseEvent) -> Result<(), HttpError>,
    {
        let mut pos = 0;
        while pos < input.len() {
            match input[pos..].iter().position(|&b| b == b'\n') {
                Some(nl) => {
                    self.line_buf.extend_from_slice(&input[pos..pos + nl]);
                    pos += nl + 1;
                    self.check_size()?;
                    let line = std::mem::take(&mut self.line_buf);
                    self.process_line(&line, &mut on_event)?;
                    self.line_buf = line;
                    self.line_buf.clear();
                }
                None => {
                    self.line_buf.extend_from_slice(&input[pos..]);
                    self.check_size()?;
                    pos = input.len();
                }
            }
        }
        Ok(())
    }

    fn check_size(&self) -> Result<(), HttpError> {
        if self.overflow == OverflowPolicy::ReturnError
            && self.line_buf.len() + self.building.data.len() > self.max_event_size
        {
            return Err(HttpError::EventTooLarge);
        }
        Ok(())
    }

    fn process_line<F>(&mut self, line: &[u8], on_event: &mut F) -> Result<(), HttpError>
    where
        F: FnMut(&SseEvent) -> Result<(), HttpError>,
    {
        let line = match line.last() {
            Some(b'\r') => &line[..line.len() - 1],
            _ => line,
        };

        if line.is_empty() {
            return self.dispatch(on_event);
        }
        if line[0] == b':' {
            return Ok(()); // comment
        }

        let (field, value) = match line.iter().position(|&b| b == b':') {
            Some(colon) => {
                let mut value = &line[colon + 1..];
                if value.first() == Some(&b' ') {
                    value = &value[1..];
                }
                (&line[..colon], value)
            }
            None => (line, &line[..0]),
        };
        let value = String::from_utf8_lossy(value);

        match field {
            b"data" => {
                if self.has_data {
                    self.building.data.push('\n');
                }
                self.building.data.push_str(&value);
                self.has_data = true;
            }
            b"id" => self.block_id = Some(value.into_owned()),
            b"event" => self.building.event = Some(value.into_owned()),
            b"retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.building.retry = Some(ms);
                }
            }
            _ => {} // unknown fields are ignored
        }
        Ok(())
    }

    /// Dispatch on empty line: emit iff data was seen, update
    /// `last_event_id` iff the block carried an `id` field, reset.
    fn dispatch<F>(&mut self, on_event: &mut F) -> Result<(), HttpError>
    where
        F: FnMut(&SseEvent) -> Result<(), HttpError>,
    {
        if let Some(id) = self.block_id.take() {
            self.last_event_id = Some(id);
        }
        if self.has_data {
            self.building.id = self.last_event_id.clone();
            let result = on_event(&self.building);
            self.building.id = None;
            self.building.event = None;
            self.building.data.clear();
            self.building.retry = None;
            self.has_data = false;
            return result;
        }
        self.building.event = None;
        self.building.retry = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(parser: &mut SseParser, input: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        parser
            .parse_chunk(input, |ev| {
                events.push(ev.clone());
                Ok(())
            })
            .unwrap();
        events
    }

    #[test]
    fn multiline_data_joined_with_newline() {
        let mut p = SseParser::new();
        let events = collect(&mut p, b"data: Line 1\ndata: Line 2\ndata: Line 3\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "Line 1\nLine 2\nLine 3");
        assert_eq!(events[0].id, None);
        assert_eq!(events[0].event, None);
    }

    #[test]
    fn id_event_and_last_event_id() {
        let mut p = SseParser::new();
        let events = collect(&mut p, b"id: 42\nevent: ping\ndata: hi\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id.as_deref(), Some("42"));
        assert_eq!(events[0].event.as_deref(), Some("ping"));
        assert_eq!(events[0].data, "hi");
        assert_eq!(p.last_event_id(), Some("42"));
    }

    #[test]
    fn id_survives_into_later_events() {
        let mut p = SseParser::new();
        collect(&mut p, b"id: 7\ndata: a\n\n");
        let events = collect(&mut p, b"data: b\n\n");
        assert_eq!(events[0].id.as_deref(), Some("7"));
    }

    #[test]
    fn any_split_point_gives_same_events() {
        let input = b"id: 1\ndata: alpha\n\n: comment\nevent: tick\ndata: beta\ndata: gamma\n\n";
        let mut whole = SseParser::new();
        let expected = collect(&mut whole, input);
        assert_eq!(expected.len(), 2);

        for split in 0..=input.len() {
            let mut p = SseParser::new();
            let mut events = collect(&mut p, &input[..split]);
            events.extend(collect(&mut p, &input[split..]));
            assert_eq!(events, expected, "split at {split}");
        }
    }

    #[test]
    fn crlf_lines_accepted() {
        let mut p = SseParser::new();
        let events = collect(&mut p, b"data: hi\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hi");
    }

    #[test]
    fn no_data_means_no_event() {
        let mut p = SseParser::new();
        let events = collect(&mut p, b"event: ping\n\n");
        assert!(events.is_empty());

        // but an id-only block still updates last_event_id
        collect(&mut p, b"id: 9\n\n");
        assert_eq!(p.last_event_id(), Some("9"));
    }

    #[test]
    fn comments_ignored() {
        let mut p = SseParser::new();
        let events = collect(&mut p, b": keepalive\ndata: x\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn at_most_one_leading_space_removed() {
        let mut p = SseParser::new();
        let events = collect(&mut p, b"data:  padded\n\n");
        assert_eq!(events[0].data, " padded");

        let events = collect(&mut p, b"data:tight\n\n");
        assert_eq!(events[0].data, "tight");
    }

    #[test]
    fn field_without_colon_has_empty_value() {
        let mut p = SseParser::new();
        let events = collect(&mut p, b"data\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "");
    }

    #[test]
    fn retry_parsed_and_bad_retry_ignored() {
        let mut p = SseParser::new();
        let events = collect(&mut p, b"retry: 3000\ndata: x\n\n");
        assert_eq!(events[0].retry, Some(3000));

        let events = collect(&mut p, b"retry: soon\ndata: y\n\n");
        assert_eq!(events[0].retry, None);
    }

    #[test]
    fn event_name_resets_between_dispatches() {
        let mut p = SseParser::new();
        collect(&mut p, b"event: tick\ndata: a\n\n");
        let events = collect(&mut p, b"data: b\n\n");
        assert_eq!(events[0].event, None);
    }

    #[test]
    fn oversized_event_errors_under_return_error() {
        let mut p = SseParser::with_limits(16, OverflowPolicy::ReturnError);
        let mut big = b"data: ".to_vec();
        big.extend_from_slice(&[b'x'; 64]);
        big.extend_from_slice(b"\n\n");
        let err = p.parse_chunk(&big, |_| Ok(())).unwrap_err();
        assert!(matches!(err, HttpError::EventTooLarge));
    }

    #[test]
    fn oversized_event_allowed_under_heap_fallback() {
        let mut p = SseParser::with_limits(16, OverflowPolicy::HeapFallback);
        let mut big = b"data: ".to_vec();
        big.extend_from_slice(&[b'y'; 64]);
        big.extend_from_slice(b"\n\n");
        let mut count = 0;
        p.parse_chunk(&big, |ev| {
            count += 1;
            assert_eq!(ev.data.len(), 64);
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn callback_error_halts_and_propagates() {
        let mut p = SseParser::new();
        let err = p
            .parse_chunk(b"data: a\n\ndata: b\n\n", |_| Err(HttpError::StreamClosed))
            .unwrap_err();
        assert!(matches!(err, HttpError::StreamClosed));
    }
}
