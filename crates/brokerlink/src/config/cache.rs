// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cache session configuration.

use std::time::Duration;

use super::keys;
use super::{Properties, DEFAULT_CACHE_REQUEST_TIMEOUT, MIN_CACHE_REQUEST_TIMEOUT};
use crate::error::{Error, Result};

/// Cache session configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Name of the cache cluster that serves the requests
    pub cache_name: String,
    /// Maximum messages returned per topic (0 = all)
    pub max_messages: u32,
    /// Oldest message age returned (zero = no limit)
    pub max_age: Duration,
    /// Protocol timer for each request exchange (>= 3 s)
    pub request_reply_timeout: Duration,
    /// Also ask peer clusters when the local one has no data
    pub include_other_clusters: bool,
}

impl CacheConfig {
    pub fn new(cache_name: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            max_messages: 1,
            max_age: Duration::ZERO,
            request_reply_timeout: DEFAULT_CACHE_REQUEST_TIMEOUT,
            include_other_clusters: true,
        }
    }

    pub fn with_max_messages(mut self, max: u32) -> Self {
        self.max_messages = max;
        self
    }

    pub fn with_max_age(mut self, age: Duration) -> Self {
        self.max_age = age;
        self
    }

    pub fn with_request_reply_timeout(mut self, timeout: Duration) -> Self {
        self.request_reply_timeout = timeout;
        self
    }

    pub fn with_include_other_clusters(mut self, include: bool) -> Self {
        self.include_other_clusters = include;
        self
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns `Err` with a description if any setting is out of range.
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if self.cache_name.is_empty() {
            return Err("cache_name must not be empty");
        }
        if self.request_reply_timeout < MIN_CACHE_REQUEST_TIMEOUT {
            return Err("request_reply_timeout must be >= 3000 ms");
        }
        Ok(())
    }

    /// Parse `cache.*` keys; other namespaces are ignored.
    pub fn from_properties(props: &Properties) -> Result<Self> {
        use keys::cache as k;
        props.check_namespace("cache.", k::ALL)?;

        let name = props
            .string(k::NAME)
            .ok_or_else(|| Error::InvalidParameter(format!("{} is required", k::NAME)))?;
        let mut c = Self::new(name);
        if let Some(v) = props.parse(k::MAX_MSGS)? {
            c.max_messages = v;
        }
        if let Some(v) = props.secs(k::MAX_AGE_S)? {
            c.max_age = v;
        }
        if let Some(v) = props.millis(k::REQUEST_REPLY_TIMEOUT_MS)? {
            c.request_reply_timeout = v;
        }
        if let Some(v) = props.bool(k::INCLUDE_OTHER_CLUSTERS)? {
            c.include_other_clusters = v;
        }
        c.validate()
            .map_err(|msg| Error::InvalidParameter(msg.into()))?;
        Ok(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = CacheConfig::new("cluster-a");
        assert!(c.validate().is_ok());
        assert_eq!(c.request_reply_timeout, Duration::from_millis(10000));
        assert_eq!(c.max_messages, 1);
    }

    #[test]
    fn test_minimum_timeout_enforced() {
        let c = CacheConfig::new("c").with_request_reply_timeout(Duration::from_millis(2999));
        assert!(c.validate().is_err());
        let c = CacheConfig::new("c").with_request_reply_timeout(Duration::from_millis(3000));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_from_properties() {
        let props = Properties::from_pairs([
            (keys::cache::NAME, "dc1-cache"),
            (keys::cache::MAX_MSGS, "0"),
            (keys::cache::MAX_AGE_S, "60"),
            (keys::cache::REQUEST_REPLY_TIMEOUT_MS, "5000"),
        ]);
        let c = CacheConfig::from_properties(&props).unwrap();
        assert_eq!(c.cache_name, "dc1-cache");
        assert_eq!(c.max_messages, 0);
        assert_eq!(c.max_age, Duration::from_secs(60));
        assert_eq!(c.request_reply_timeout, Duration::from_millis(5000));

        let short = Properties::from_pairs([
            (keys::cache::NAME, "c"),
            (keys::cache::REQUEST_REPLY_TIMEOUT_MS, "100"),
        ]);
        assert!(CacheConfig::from_properties(&short).is_err());
    }
}
