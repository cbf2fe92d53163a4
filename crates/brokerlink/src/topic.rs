// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic syntax and wildcard matching.
//!
//! Topics are `/`-separated levels. Subscription patterns may use:
//!
//! ```text
//! *        alone in a level   -> exactly one level        a/*/c   ~ a/b/c
//! abc*     at end of a level  -> prefix within one level  a/st*   ~ a/stock
//! >        as the last level  -> one or more levels       a/>     ~ a/b/c/d
//! ```
//!
//! A `*` anywhere else and a `>` that is not the last level are literal.

use crate::error::{Error, Result};

/// Maximum topic length in bytes.
pub const MAX_TOPIC_LEN: usize = 250;
/// Maximum queue / topic-endpoint name length in bytes.
pub const MAX_QUEUE_NAME_LEN: usize = 200;

const LEVEL_SEP: char = '/';
const MULTI_LEVEL: &str = ">";
const SINGLE_LEVEL: &str = "*";

/// Check a subscription pattern (wildcards allowed).
pub fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Err(Error::InvalidTopic("empty topic".into()));
    }
    if pattern.len() > MAX_TOPIC_LEN {
        return Err(Error::TopicTooLong(pattern.len()));
    }
    if pattern.contains('\0') {
        return Err(Error::InvalidTopic(format!("NUL byte in {:?}", pattern)));
    }
    if pattern.split(LEVEL_SEP).any(str::is_empty) {
        return Err(Error::InvalidTopic(format!("empty level in {:?}", pattern)));
    }
    Ok(())
}

/// Check a topic used as a publish destination (no wildcards).
pub fn validate_publish_topic(topic: &str) -> Result<()> {
    validate_pattern(topic)?;
    if is_wildcard(topic) {
        return Err(Error::InvalidTopic(format!(
            "cannot publish to wildcard topic {:?}",
            topic
        )));
    }
    Ok(())
}

/// Check a queue or topic-endpoint name.
pub fn validate_queue_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidParameter("empty endpoint name".into()));
    }
    if name.len() > MAX_QUEUE_NAME_LEN {
        return Err(Error::QueueNameTooLong(name.len()));
    }
    if name.contains('\0') {
        return Err(Error::InvalidParameter(format!("NUL byte in {:?}", name)));
    }
    Ok(())
}

/// True when `pattern` contains an effective wildcard.
pub fn is_wildcard(pattern: &str) -> bool {
    let mut levels = pattern.split(LEVEL_SEP).peekable();
    while let Some(level) = levels.next() {
        let last = levels.peek().is_none();
        if level.ends_with('*') || (last && level == MULTI_LEVEL) {
            return true;
        }
    }
    false
}

/// Match a concrete `topic` against a subscription `pattern`.
pub fn matches(pattern: &str, topic: &str) -> bool {
    let mut pat = pattern.split(LEVEL_SEP).peekable();
    let mut top = topic.split(LEVEL_SEP);

    loop {
        match (pat.next(), top.next()) {
            (Some(MULTI_LEVEL), Some(_)) if pat.peek().is_none() => return true,
            (Some(p), Some(t)) => {
                if !level_matches(p, t) {
                    return false;
                }
            }
            (None, None) => return true,
            _ => return false,
        }
    }
}

fn level_matches(pattern: &str, level: &str) -> bool {
    if pattern == SINGLE_LEVEL {
        return true;
    }
    match pattern.strip_suffix('*') {
        Some(prefix) => level.starts_with(prefix),
        None => pattern == level,
    }
}
