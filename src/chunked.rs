//! Incremental decoder for chunked transfer encoding (RFC 7230 §4.1).
//!
//! The decoder is a pure state machine driven by repeated
//! [`parse`](ChunkedDecoder::parse) calls. It never reads from a socket
//! itself; the streaming layer feeds it. Input may be split at any byte
//! boundary, including inside a chunk size line or inside the `\r\n`
//! that trails chunk data. Chunk extensions are ignored; trailer headers
//! are consumed but not surfaced.

use crate::error::HttpError;

/// Longest accepted chunk size line, hex digits plus extensions.
const MAX_SIZE_LINE: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Accumulating the `<hex>[;ext]\r\n` size line.
    WaitingSize,
    /// Copying chunk payload bytes through to the output.
    ReadingData,
    /// Consuming the exact `\r\n` after chunk payload.
    ReadingDataTrailer { got_cr: bool },
    /// Consuming trailer lines after the zero chunk, up to the empty line.
    ReadingTrailers,
    /// Terminal. Further input is ignored.
    Complete,
}

/// Streaming chunked-transfer decoder.
#[derive(Debug)]
pub struct ChunkedDecoder {
    state: State,
    /// Partial size or trailer line carried across calls.
    line: Vec<u8>,
    expected: usize,
    received: usize,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        ChunkedDecoder {
            state: State::WaitingSize,
            line: Vec::new(),
            expected: 0,
            received: 0,
        }
    }

    /// True once the terminal chunk and its trailers have been consumed.
    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    /// Feed `input`, appending decoded payload bytes to `out`.
    ///
    /// Returns the number of bytes appended. Once the decoder is
    /// complete, further calls are no-ops. Feeding the same stream in
    /// any partition yields identical output.
    pub fn parse(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<usize, HttpError> {
        let mut appended = 0;
        let mut pos = 0;

        while pos < input.len() {
            match self.state {
                State::WaitingSize => {
                    match input[pos..].iter().position(|&b| b == b'\n') {
                        Some(nl) => {
                            self.line.extend_from_slice(&input[pos..pos + nl]);
                            pos += nl + 1;
                            if self.line.len() > MAX_SIZE_LINE {
                                return Err(HttpError::InvalidChunkSize);
                            }
                            self.expected = parse_size_line(&self.line)?;
                            self.line.clear();
                            self.received = 0;
                            self.state = if self.expected == 0 {
                                State::ReadingTrailers
                            } else {
                                State::ReadingData
                            };
                        }
                        None => {
                            self.line.extend_from_slice(&input[pos..]);
                            if self.line.len() > MAX_SIZE_LINE {
                                return Err(HttpError::InvalidChunkSize);
                            }
                            pos = input.len();
                        }
                    }
                }
                State::ReadingData => {
                    let want = self.expected - self.received;
                    let take = want.min(input.len() - pos);
                    out.extend_from_slice(&input[pos..pos + take]);
                    appended += take;
                    self.received += take;
                    pos += take;
                    if self.received == self.expected {
                        self.state = State::ReadingDataTrailer { got_cr: false };
                    }
                }
                State::ReadingDataTrailer { got_cr } => {
                    let b = input[pos];
                    pos += 1;
                    if !got_cr {
                        if b != b'\r' {
                            return Err(HttpError::MalformedChunk);
                        }
                        self.state = State::ReadingDataTrailer { got_cr: true };
                    } else {
                        if b != b'\n' {
                            return Err(HttpError::MalformedChunk);
                        }
                        self.state = State::WaitingSize;
                    }
                }
                State::ReadingTrailers => {
                    match input[pos..].iter().position(|&b| b == b'\n') {
                        Some(nl) => {
                            self.line.extend_from_slice(&input[pos..pos + nl]);
                            pos += nl + 1;
                            let empty = self.line.is_empty() || self.line == b"\r";
                            self.line.clear();
                            if empty {
                                self.state = State::Complete;
                            }
                        }
                        None => {
                            self.line.extend_from_slice(&input[pos..]);
                            pos = input.len();
                        }
                    }
                }
                State::Complete => break,
            }
        }

        Ok(appended)
    }
}

/// Parse the hex size before any `;` extension, whitespace-tolerant.
fn parse_size_line(line: &[u8]) -> Result<usize, HttpError> {
    let text = std::str::from_utf8(line).map_err(|_| HttpError::InvalidChunkSize)?;
    let hex = text.split(';').next().unwrap_or("").trim();
    if hex.is_empty() {
        return Err(HttpError::InvalidChunkSize);
    }
    usize::from_str_radix(hex, 16).map_err(|_| HttpError::InvalidChunkSize)
}
