//! Caller addresses.
//!
//! A [`ClientAddr`] is the textual network address a request arrived from.
//! It is kept exactly as observed: `::ffff:10.0.0.1` and `10.0.0.1` are two
//! different addresses as far as identity resolution is concerned. The only
//! place that tries to relate them is [`equivalent_forms`], used when a rate
//! budget is reset.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

const MAPPED_PREFIX: &str = "::ffff:";

/// Textual network address of a caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientAddr(String);

impl ClientAddr {
    /// Wrap an address as observed on the wire (surrounding whitespace trimmed).
    pub fn new(addr: impl AsRef<str>) -> Self {
        Self(addr.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<IpAddr> for ClientAddr {
    fn from(ip: IpAddr) -> Self {
        Self(ip.to_string())
    }
}

impl fmt::Display for ClientAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Every textual form that may denote the same physical client as `addr`.
///
/// Best-effort only. Covers IPv4-mapped IPv6 (`::ffff:a.b.c.d`), the loopback
/// pair `::1` / `127.0.0.1`, and IPv6 zone identifiers (`fe80::1%eth0`).
/// Anything else (NAT, proxies, privacy addresses) is not unified.
pub fn equivalent_forms(addr: &ClientAddr) -> BTreeSet<String> {
    let addr = addr.as_str();
    let mut forms = BTreeSet::new();
    forms.insert(addr.to_string());

    let unzoned = addr.split('%').next().unwrap_or(addr);
    forms.insert(unzoned.to_string());

    if let Some(v4) = unzoned.strip_prefix(MAPPED_PREFIX) {
        forms.insert(v4.to_string());
    }

    match unzoned {
        "::1" => {
            forms.insert("127.0.0.1".to_string());
        }
        "127.0.0.1" => {
            forms.insert("::1".to_string());
        }
        _ => {}
    }

    if unzoned.parse::<Ipv4Addr>().is_ok() {
        forms.insert(format!("{MAPPED_PREFIX}{unzoned}"));
    }

    forms
}
