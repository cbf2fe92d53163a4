// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker host list.
//!
//! `session.host` holds up to [`MAX_HOSTS`] comma-separated entries of the
//! form `[tcp://|tcps://]host[:port]`. The connection machine walks them in
//! order with a cursor that wraps back to the head.

use std::fmt;

use crate::config::{DEFAULT_PORT, MAX_HOSTS};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheme {
    #[default]
    Tcp,
    Tcps,
}

/// One broker endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAddr {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl HostAddr {
    /// Parse `[scheme://]host[:port]`.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (scheme, rest) = if let Some(rest) = s.strip_prefix("tcp://") {
            (Scheme::Tcp, rest)
        } else if let Some(rest) = s.strip_prefix("tcps://") {
            (Scheme::Tcps, rest)
        } else if s.contains("://") {
            return Err(Error::InvalidParameter(format!("unknown scheme in host '{}'", s)));
        } else {
            (Scheme::Tcp, s)
        };

        let (host, port) = split_host_port(rest)?;
        if host.is_empty() {
            return Err(Error::InvalidParameter(format!("empty host in '{}'", s)));
        }
        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn split_host_port(s: &str) -> Result<(&str, u16)> {
    // [v6]:port
    if let Some(rest) = s.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| Error::InvalidParameter(format!("unterminated '[' in '{}'", s)))?;
        return match tail.strip_prefix(':') {
            Some(port) => Ok((host, parse_port(port)?)),
            None if tail.is_empty() => Ok((host, DEFAULT_PORT)),
            None => Err(Error::InvalidParameter(format!("junk after ']' in '{}'", s))),
        };
    }
    match s.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => Ok((host, parse_port(port)?)),
        // Bare IPv6 literal
        Some(_) => Ok((s, DEFAULT_PORT)),
        None => Ok((s, DEFAULT_PORT)),
    }
}

fn parse_port(s: &str) -> Result<u16> {
    match s.parse::<u16>() {
        Ok(0) | Err(_) => Err(Error::InvalidParameter(format!("invalid port '{}'", s))),
        Ok(p) => Ok(p),
    }
}

impl fmt::Display for HostAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            Scheme::Tcp => "tcp",
            Scheme::Tcps => "tcps",
        };
        write!(f, "{}://{}", scheme, self.authority())
    }
}

/// Ordered candidate hosts with a cursor.
#[derive(Debug, Clone)]
pub struct HostList {
    hosts: Vec<HostAddr>,
    cursor: usize,
}

impl HostList {
    /// Parse a comma-separated list of 1..=16 hosts.
    pub fn parse(s: &str) -> Result<Self> {
        let hosts = s
            .split(',')
            .filter(|h| !h.trim().is_empty())
            .map(HostAddr::parse)
            .collect::<Result<Vec<_>>>()?;
        if hosts.is_empty() {
            return Err(Error::InvalidParameter("host list is empty".into()));
        }
        if hosts.len() > MAX_HOSTS {
            return Err(Error::InvalidParameter(format!(
                "host list has {} entries (max {})",
                hosts.len(),
                MAX_HOSTS
            )));
        }
        Ok(Self { hosts, cursor: 0 })
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn current(&self) -> &HostAddr {
        &self.hosts[self.cursor]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move to the next host. Returns `true` when the cursor wrapped to the
    /// head, i.e. a full pass over the list just ended.
    pub fn advance(&mut self) -> bool {
        self.cursor += 1;
        if self.cursor == self.hosts.len() {
            self.cursor = 0;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = &HostAddr> {
        self.hosts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_forms() {
        let h = HostAddr::parse("broker").unwrap();
        assert_eq!((h.host(), h.port(), h.scheme()), ("broker", DEFAULT_PORT, Scheme::Tcp));

        let h = HostAddr::parse("tcps://10.0.0.1:55443").unwrap();
        assert_eq!((h.host(), h.port(), h.scheme()), ("10.0.0.1", 55443, Scheme::Tcps));

        let h = HostAddr::parse("[::1]:7000").unwrap();
        assert_eq!(h.host(), "::1");
        assert_eq!(h.authority(), "[::1]:7000");

        assert!(HostAddr::parse("udp://x").is_err());
        assert!(HostAddr::parse("host:0").is_err());
        assert!(HostAddr::parse("host:notaport").is_err());
        assert!(HostAddr::parse(":80").is_err());
    }

    #[test]
    fn test_list_cursor_wraps() {
        let mut list = HostList::parse("a, b ,c").unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.current().host(), "a");
        assert!(!list.advance());
        assert_eq!(list.current().host(), "b");
        assert!(!list.advance());
        assert!(list.advance());
        assert_eq!(list.cursor(), 0);
        list.advance();
        list.reset();
        assert_eq!(list.current().host(), "a");
    }

    #[test]
    fn test_list_bounds() {
        assert!(HostList::parse("").is_err());
        assert!(HostList::parse(" , ").is_err());
        let sixteen = (0..16).map(|i| format!("h{}", i)).collect::<Vec<_>>().join(",");
        assert_eq!(HostList::parse(&sixteen).unwrap().len(), 16);
        let seventeen = format!("{},h16", sixteen);
        assert!(HostList::parse(&seventeen).is_err());
    }
}
