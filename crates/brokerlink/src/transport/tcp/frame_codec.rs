// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-prefix framing of frame bodies over TCP.
//!
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | Frame body        |
//! +----------------+-------------------+
//! ```
//!
//! The length excludes the 4-byte header.

use std::io::{self, Read};

/// Frame header size (4 bytes for length).
pub const FRAME_HEADER_SIZE: usize = 4;

/// Default maximum frame body size (16 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Incremental length-prefix decoder.
///
/// Keeps partial-read state between calls so it can sit on top of a
/// non-blocking socket.
#[derive(Debug)]
pub struct FrameCodec {
    state: ReadState,
    buffer: Vec<u8>,
    max_size: usize,
    frames_decoded: u64,
    frames_rejected: u64,
}

#[derive(Debug, Clone, Copy)]
enum ReadState {
    ReadingLength {
        bytes_read: usize,
    },
    ReadingBody {
        expected_len: usize,
        bytes_read: usize,
    },
}

impl Default for ReadState {
    fn default() -> Self {
        ReadState::ReadingLength { bytes_read: 0 }
    }
}

impl FrameCodec {
    pub fn new(max_size: usize) -> Self {
        Self {
            state: ReadState::default(),
            buffer: vec![0u8; FRAME_HEADER_SIZE],
            max_size,
            frames_decoded: 0,
            frames_rejected: 0,
        }
    }

    pub fn with_default_max() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected
    }

    /// Append `[len: u32 BE][body]` to `buf`.
    pub fn encode_into(body: &[u8], buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
        buf.extend_from_slice(body);
    }

    /// Try to decode one complete body from `reader`.
    ///
    /// - `Ok(Some(body))`: one body decoded
    /// - `Ok(None)`: reader would block; call again when readable
    /// - `Err(_)`: EOF, oversized frame or I/O error
    pub fn decode<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<Option<Vec<u8>>> {
        loop {
            match self.state {
                ReadState::ReadingLength { bytes_read } => {
                    match reader.read(&mut self.buffer[bytes_read..FRAME_HEADER_SIZE]) {
                        Ok(0) => {
                            let msg = if bytes_read == 0 {
                                "connection closed"
                            } else {
                                "incomplete frame header"
                            };
                            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, msg));
                        }
                        Ok(n) => {
                            let total = bytes_read + n;
                            if total < FRAME_HEADER_SIZE {
                                self.state = ReadState::ReadingLength { bytes_read: total };
                                continue;
                            }

                            let len = u32::from_be_bytes([
                                self.buffer[0],
                                self.buffer[1],
                                self.buffer[2],
                                self.buffer[3],
                            ]) as usize;

                            if len > self.max_size {
                                self.frames_rejected += 1;
                                self.state = ReadState::default();
                                return Err(io::Error::new(
                                    io::ErrorKind::InvalidData,
                                    format!("frame too large: {} bytes (max {})", len, self.max_size),
                                ));
                            }
                            if len == 0 {
                                self.frames_decoded += 1;
                                self.state = ReadState::default();
                                return Ok(Some(Vec::new()));
                            }

                            self.buffer.resize(len, 0);
                            self.state = ReadState::ReadingBody {
                                expected_len: len,
                                bytes_read: 0,
                            };
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e),
                    }
                }

                ReadState::ReadingBody {
                    expected_len,
                    bytes_read,
                } => match reader.read(&mut self.buffer[bytes_read..expected_len]) {
                    Ok(0) => {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "incomplete frame body",
                        ));
                    }
                    Ok(n) => {
                        let total = bytes_read + n;
                        if total < expected_len {
                            self.state = ReadState::ReadingBody {
                                expected_len,
                                bytes_read: total,
                            };
                            continue;
                        }

                        let body = self.buffer[..expected_len].to_vec();
                        self.frames_decoded += 1;
                        self.buffer.resize(FRAME_HEADER_SIZE, 0);
                        self.state = ReadState::default();
                        return Ok(Some(body));
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                },
            }
        }
    }

    /// True while in the middle of a frame.
    pub fn is_partial(&self) -> bool {
        match self.state {
            ReadState::ReadingLength { bytes_read } => bytes_read > 0,
            ReadState::ReadingBody { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Hands out scripted chunks, then WouldBlock.
    struct ChunkedReader {
        chunks: VecDeque<Vec<u8>>,
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.front_mut() {
                None => Err(io::Error::new(io::ErrorKind::WouldBlock, "empty")),
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    chunk.drain(..n);
                    if chunk.is_empty() {
                        self.chunks.pop_front();
                    }
                    Ok(n)
                }
            }
        }
    }

    #[test]
    fn test_decode_across_partial_reads() {
        let mut wire = Vec::new();
        FrameCodec::encode_into(b"hello", &mut wire);
        FrameCodec::encode_into(b"world!", &mut wire);

        let mut reader = ChunkedReader {
            chunks: vec![wire[..2].to_vec(), wire[2..7].to_vec()].into(),
        };
        let mut codec = FrameCodec::with_default_max();
        assert_eq!(codec.decode(&mut reader).unwrap(), None);
        assert!(codec.is_partial());

        reader.chunks.push_back(wire[7..].to_vec());
        assert_eq!(codec.decode(&mut reader).unwrap().unwrap(), b"hello");
        assert_eq!(codec.decode(&mut reader).unwrap().unwrap(), b"world!");
        assert_eq!(codec.frames_decoded(), 2);
        assert!(!codec.is_partial());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut wire = Vec::new();
        FrameCodec::encode_into(&[0u8; 64], &mut wire);
        let mut codec = FrameCodec::new(16);
        let err = codec.decode(&mut &wire[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(codec.frames_rejected(), 1);
    }

    #[test]
    fn test_eof_reported() {
        let mut codec = FrameCodec::with_default_max();
        let err = codec.decode(&mut &[][..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
