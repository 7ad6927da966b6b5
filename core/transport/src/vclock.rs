//! Vector clocks for optimistic concurrency control.
//!
//! The client never merges or compares clocks; it only increments its own
//! counter before a write and otherwise treats the server's clock as
//! opaque authority.

use std::collections::BTreeMap;
use std::fmt;

use seedvault_common::{ClientId, Error, Result};

/// Per-client monotonic counters, wire-encoded as
/// `"client=count,client=count"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorClock {
    counters: BTreeMap<String, u64>,
}

impl VectorClock {
    /// Create an empty clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the wire encoding. An empty string is an empty clock.
    ///
    /// # Errors
    /// - Returns error on malformed `client=count` segments
    pub fn parse(encoded: &str) -> Result<Self> {
        let mut counters = BTreeMap::new();
        for segment in encoded.split(',') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (client, count) = segment.split_once('=').ok_or_else(|| {
                Error::InvalidInput(format!("Malformed vclock segment: {:?}", segment))
            })?;
            if client.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "Empty client id in vclock segment: {:?}",
                    segment
                )));
            }
            let count: u64 = count.parse().map_err(|_| {
                Error::InvalidInput(format!("Malformed vclock count: {:?}", segment))
            })?;
            counters.insert(client.to_string(), count);
        }
        Ok(Self { counters })
    }

    /// Encode to the wire form. Keys are emitted in sorted order.
    pub fn encode(&self) -> String {
        self.counters
            .iter()
            .map(|(client, count)| format!("{}={}", client, count))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Increment this client's own counter, appending `client=1` if the
    /// client has never written before.
    pub fn increment(&mut self, own_id: &ClientId) {
        *self.counters.entry(own_id.as_str().to_string()).or_insert(0) += 1;
    }

    /// Read a client's counter (0 if absent).
    pub fn get(&self, client: &ClientId) -> u64 {
        self.counters.get(client.as_str()).copied().unwrap_or(0)
    }

    /// Whether the clock has no counters.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(id: &str) -> ClientId {
        ClientId::new(id).unwrap()
    }

    #[test]
    fn test_parse_encode_roundtrip() {
        let clock = VectorClock::parse("alpha=3,beta=12").unwrap();
        assert_eq!(clock.get(&client("alpha")), 3);
        assert_eq!(clock.get(&client("beta")), 12);
        assert_eq!(clock.encode(), "alpha=3,beta=12");
    }

    #[test]
    fn test_parse_empty() {
        let clock = VectorClock::parse("").unwrap();
        assert!(clock.is_empty());
        assert_eq!(clock.encode(), "");
    }

    #[test]
    fn test_parse_malformed() {
        assert!(VectorClock::parse("alpha").is_err());
        assert!(VectorClock::parse("alpha=x").is_err());
        assert!(VectorClock::parse("=3").is_err());
    }

    #[test]
    fn test_increment_appends_then_counts() {
        let mut clock = VectorClock::parse("other=5").unwrap();
        let me = client("me");

        clock.increment(&me);
        assert_eq!(clock.get(&me), 1);
        clock.increment(&me);
        assert_eq!(clock.get(&me), 2);

        // Only our own counter moves.
        assert_eq!(clock.get(&client("other")), 5);
        assert_eq!(clock.encode(), "me=2,other=5");
    }
}
