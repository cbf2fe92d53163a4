// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Peer capabilities learned at login.

const CAP_GUARANTEED_PUBLISH: u8 = 0x01;
const CAP_GUARANTEED_CONSUME: u8 = 0x02;
const CAP_CACHE: u8 = 0x04;
const CAP_COMPRESSION: u8 = 0x08;

/// What the connected router supports.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub router_name: String,
    pub guaranteed_publish: bool,
    pub guaranteed_consume: bool,
    pub cache: bool,
    pub compression: bool,
    /// Largest publisher window the router accepts
    pub max_pub_window: u8,
}

impl Capabilities {
    /// Every capability on, window 255.
    pub fn full(router_name: impl Into<String>) -> Self {
        Self {
            router_name: router_name.into(),
            guaranteed_publish: true,
            guaranteed_consume: true,
            cache: true,
            compression: true,
            max_pub_window: u8::MAX,
        }
    }

    pub(crate) fn to_bits(&self) -> u8 {
        let mut bits = 0;
        if self.guaranteed_publish {
            bits |= CAP_GUARANTEED_PUBLISH;
        }
        if self.guaranteed_consume {
            bits |= CAP_GUARANTEED_CONSUME;
        }
        if self.cache {
            bits |= CAP_CACHE;
        }
        if self.compression {
            bits |= CAP_COMPRESSION;
        }
        bits
    }

    pub(crate) fn from_bits(router_name: String, bits: u8, max_pub_window: u8) -> Self {
        Self {
            router_name,
            guaranteed_publish: bits & CAP_GUARANTEED_PUBLISH != 0,
            guaranteed_consume: bits & CAP_GUARANTEED_CONSUME != 0,
            cache: bits & CAP_CACHE != 0,
            compression: bits & CAP_COMPRESSION != 0,
            max_pub_window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_roundtrip_partial() {
        let caps = Capabilities {
            router_name: "r".into(),
            guaranteed_publish: true,
            cache: true,
            max_pub_window: 10,
            ..Default::default()
        };
        assert_eq!(caps.to_bits(), CAP_GUARANTEED_PUBLISH | CAP_CACHE);
        assert_eq!(Capabilities::from_bits("r".into(), caps.to_bits(), 10), caps);
    }

    #[test]
    fn test_full() {
        let caps = Capabilities::full("router");
        assert_eq!(caps.to_bits(), 0x0F);
        assert_eq!(caps.max_pub_window, 255);
    }
}
