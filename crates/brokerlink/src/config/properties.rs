// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! String-keyed property store.
//!
//! `DashMap<Arc<str>, Arc<str>>` shared behind an `Arc`: cloning a
//! `Properties` is an Arc increment and every clone sees the same entries.
//!
//! With the `property-loaders` feature, properties can be read from a YAML
//! document of the form:
//!
//! ```yaml
//! properties:
//!   session.host: tcp://primary:55555,tcp://backup:55555
//!   session.pub_window_size: 10
//!   flow.ack_mode: client
//! ```

use dashmap::DashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::keys;
use crate::error::{Error, Result};

/// Shared string-keyed configuration.
#[derive(Clone, Default)]
pub struct Properties {
    entries: Arc<DashMap<Arc<str>, Arc<str>>>,
}

impl std::fmt::Debug for Properties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut entries = self.entries();
        entries.sort();
        let mut map = f.debug_map();
        for (k, v) in &entries {
            // Never print credentials
            if k.as_ref() == keys::session::PASSWORD {
                map.entry(k, &"***");
            } else {
                map.entry(k, v);
            }
        }
        map.finish()
    }
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(key, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let props = Self::new();
        for (k, v) in pairs {
            props.set(k.as_ref(), v.as_ref());
        }
        props
    }

    pub fn set(&self, key: &str, value: &str) {
        self.entries.insert(Arc::from(key), Arc::from(value));
    }

    pub fn get(&self, key: &str) -> Option<Arc<str>> {
        self.entries.get(key).map(|v| Arc::clone(v.value()))
    }

    pub fn remove(&self, key: &str) -> Option<Arc<str>> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all entries (unordered).
    pub fn entries(&self) -> Vec<(Arc<str>, Arc<str>)> {
        self.entries
            .iter()
            .map(|e| (Arc::clone(e.key()), Arc::clone(e.value())))
            .collect()
    }

    /// All entries whose key starts with `prefix`.
    pub fn search_prefix(&self, prefix: &str) -> Vec<(Arc<str>, Arc<str>)> {
        self.entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| (Arc::clone(e.key()), Arc::clone(e.value())))
            .collect()
    }

    /// Reject keys outside the known `session.*`, `flow.*` and `cache.*` sets.
    pub fn validate(&self) -> Result<()> {
        for entry in self.entries.iter() {
            let key = entry.key().as_ref();
            let known = keys::session::ALL.contains(&key)
                || keys::flow::ALL.contains(&key)
                || keys::cache::ALL.contains(&key);
            if !known {
                return Err(Error::UnknownProperty(key.to_string()));
            }
        }
        Ok(())
    }

    // ===================================================================
    // Typed accessors (used by the typed configs)
    // ===================================================================

    /// Reject keys under `prefix` that are not in `known`.
    pub(crate) fn check_namespace(&self, prefix: &str, known: &[&str]) -> Result<()> {
        for (key, _) in self.search_prefix(prefix) {
            if !known.contains(&key.as_ref()) {
                return Err(Error::UnknownProperty(key.to_string()));
            }
        }
        Ok(())
    }

    pub(crate) fn string(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| v.trim().to_string())
    }

    pub(crate) fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
                Error::InvalidParameter(format!("{}: cannot parse {:?}", key, raw.as_ref()))
            }),
        }
    }

    pub(crate) fn bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(Some(true)),
                "false" | "0" | "no" | "off" => Ok(Some(false)),
                _ => Err(Error::InvalidParameter(format!(
                    "{}: expected boolean, got {:?}",
                    key,
                    raw.as_ref()
                ))),
            },
        }
    }

    pub(crate) fn millis(&self, key: &str) -> Result<Option<Duration>> {
        Ok(self.parse::<u64>(key)?.map(Duration::from_millis))
    }

    pub(crate) fn secs(&self, key: &str) -> Result<Option<Duration>> {
        Ok(self.parse::<u64>(key)?.map(Duration::from_secs))
    }
}

// ===================================================================
// YAML loading
// ===================================================================

#[cfg(feature = "property-loaders")]
mod yaml {
    use super::Properties;
    use crate::error::{Error, Result};
    use serde::Deserialize;
    use std::collections::BTreeMap;
    use std::path::Path;

    /// Root YAML document structure.
    #[derive(Debug, Deserialize)]
    struct YamlPropertyDocument {
        #[serde(default)]
        properties: BTreeMap<String, serde_yaml::Value>,
    }

    fn scalar_to_string(key: &str, value: &serde_yaml::Value) -> Result<String> {
        match value {
            serde_yaml::Value::String(s) => Ok(s.clone()),
            serde_yaml::Value::Number(n) => Ok(n.to_string()),
            serde_yaml::Value::Bool(b) => Ok(b.to_string()),
            _ => Err(Error::InvalidParameter(format!(
                "{}: expected a scalar value",
                key
            ))),
        }
    }

    impl Properties {
        /// Parse properties from a YAML document.
        pub fn from_yaml_str(yaml_content: &str) -> Result<Self> {
            let doc: YamlPropertyDocument = serde_yaml::from_str(yaml_content)
                .map_err(|e| Error::InvalidParameter(format!("Failed to parse YAML: {}", e)))?;
            let props = Properties::new();
            for (key, value) in &doc.properties {
                props.set(key, &scalar_to_string(key, value)?);
            }
            props.validate()?;
            log::debug!("[config] loaded {} properties from YAML", props.len());
            Ok(props)
        }

        /// Load properties from a YAML file.
        pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
            let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
                Error::InvalidParameter(format!(
                    "Failed to read {}: {}",
                    path.as_ref().display(),
                    e
                ))
            })?;
            Self::from_yaml_str(&content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_shared_between_clones() {
        let props = Properties::new();
        let clone = props.clone();
        props.set(keys::session::HOST, "tcp://a");
        assert_eq!(clone.get(keys::session::HOST).as_deref(), Some("tcp://a"));
        assert_eq!(clone.len(), 1);
    }

    #[test]
    fn test_search_prefix() {
        let props = Properties::from_pairs([
            (keys::session::HOST, "h"),
            (keys::session::VPN_NAME, "v"),
            (keys::flow::ACK_MODE, "client"),
        ]);
        assert_eq!(props.search_prefix("session.").len(), 2);
        assert_eq!(props.search_prefix("flow.").len(), 1);
    }

    #[test]
    fn test_validate_rejects_unknown() {
        let props = Properties::from_pairs([("session.hots", "typo")]);
        assert!(matches!(props.validate(), Err(Error::UnknownProperty(_))));
    }

    #[test]
    fn test_typed_parsing() {
        let props = Properties::from_pairs([
            (keys::session::PUB_WINDOW_SIZE, " 10 "),
            (keys::session::REAPPLY_SUBSCRIPTIONS, "Yes"),
            (keys::session::PUB_ACK_TIME_MS, "1500"),
            (keys::session::KEEPALIVE_LIMIT, "many"),
        ]);
        assert_eq!(props.parse::<u8>(keys::session::PUB_WINDOW_SIZE).unwrap(), Some(10));
        assert_eq!(props.bool(keys::session::REAPPLY_SUBSCRIPTIONS).unwrap(), Some(true));
        assert_eq!(
            props.millis(keys::session::PUB_ACK_TIME_MS).unwrap(),
            Some(Duration::from_millis(1500))
        );
        assert!(props.parse::<u32>(keys::session::KEEPALIVE_LIMIT).is_err());
        assert_eq!(props.parse::<u32>(keys::session::CONNECT_RETRIES).unwrap(), None);
    }

    #[test]
    fn test_debug_hides_password() {
        let props = Properties::from_pairs([(keys::session::PASSWORD, "hunter2")]);
        let dbg = format!("{:?}", props);
        assert!(!dbg.contains("hunter2"));
    }

    #[cfg(feature = "property-loaders")]
    #[test]
    fn test_yaml_loading() {
        let yaml = r"
properties:
  session.host: tcp://primary:55555
  session.pub_window_size: 10
  session.reapply_subscriptions: true
";
        let props = Properties::from_yaml_str(yaml).unwrap();
        assert_eq!(props.get(keys::session::PUB_WINDOW_SIZE).as_deref(), Some("10"));
        assert_eq!(
            props.get(keys::session::REAPPLY_SUBSCRIPTIONS).as_deref(),
            Some("true")
        );

        let bad = "properties:\n  nope.key: 1\n";
        assert!(Properties::from_yaml_str(bad).is_err());
    }
}
