// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Deflate compression of frame bodies.
//!
//! - **Threshold**: payloads under [`COMPRESS_THRESHOLD`] bytes are sent as is
//! - **Ratio gate**: compressed output is used only when actually smaller
//!
//! ```text
//! compressed = orig_len (u32 BE) | deflate bytes
//! ```

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::{Error, Result};

/// Minimum payload size worth compressing.
pub const COMPRESS_THRESHOLD: usize = 64;

/// Compress `payload` at `level` (1..=9).
///
/// Returns `None` when compression would not help.
pub(crate) fn compress(payload: &[u8], level: u32) -> Option<Vec<u8>> {
    if level == 0 || payload.len() < COMPRESS_THRESHOLD {
        return None;
    }
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder.write_all(payload).ok()?;
    let deflated = encoder.finish().ok()?;

    if deflated.len() + 4 >= payload.len() {
        return None;
    }
    let mut out = Vec::with_capacity(4 + deflated.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&deflated);
    Some(out)
}

/// Inverse of [`compress`]; rejects bodies that inflate past `max_len`.
pub(crate) fn decompress(data: &[u8], max_len: usize) -> Result<Vec<u8>> {
    if data.len() < 4 {
        return Err(Error::Protocol("compressed body too short".into()));
    }
    let orig_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if orig_len > max_len {
        return Err(Error::Protocol(format!(
            "compressed body announces {} bytes (max {})",
            orig_len, max_len
        )));
    }

    let mut output = Vec::with_capacity(orig_len);
    DeflateDecoder::new(&data[4..])
        .take(orig_len as u64 + 1)
        .read_to_end(&mut output)
        .map_err(|e| Error::Protocol(format!("inflate failed: {}", e)))?;

    if output.len() != orig_len {
        return Err(Error::Protocol(format!(
            "inflated length mismatch: expected {}, got {}",
            orig_len,
            output.len()
        )));
    }
    Ok(output)
}
