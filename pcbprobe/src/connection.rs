//! The undirected pin-to-pin edge set.
//!
//! This is the source of truth for connectivity: nets are always derivable
//! from it alone. The set never holds a self-edge or a duplicate, and every
//! operation is idempotent when applied a second time.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{ProbeError, Result};
use crate::pin::PinId;

/// An unordered pair of distinct pins, stored with the lower pin first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Connection {
    a: PinId,
    b: PinId,
}

impl Connection {
    pub fn new(a: PinId, b: PinId) -> Result<Self> {
        if a == b {
            return Err(ProbeError::SelfConnection { pin: a.to_string() });
        }
        Ok(if a < b { Self { a, b } } else { Self { a: b, b: a } })
    }

    pub fn a(&self) -> &PinId {
        &self.a
    }

    pub fn b(&self) -> &PinId {
        &self.b
    }

    pub fn touches(&self, pin: &PinId) -> bool {
        self.a == *pin || self.b == *pin
    }

    /// The end that is not `pin`, if `pin` is an end.
    pub fn other(&self, pin: &PinId) -> Option<&PinId> {
        if self.a == *pin {
            Some(&self.b)
        } else if self.b == *pin {
            Some(&self.a)
        } else {
            None
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.a, self.b)
    }
}

/// What a pin merge did to the edge set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Edges rewritten onto the target pin
    pub moved: usize,
    /// Edges that became duplicates or self-edges and were discarded
    pub dropped: usize,
}

impl MergeOutcome {
    pub fn touched(&self) -> usize {
        self.moved + self.dropped
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionStore {
    edges: BTreeSet<Connection>,
}

impl ConnectionStore {
    /// Insert the edge `a`-`b`. Returns `false` if it was already present.
    pub fn add(&mut self, a: PinId, b: PinId) -> Result<bool> {
        let connection = Connection::new(a, b)?;
        Ok(self.edges.insert(connection))
    }

    /// Remove every edge touching `pin`, returning how many went.
    pub fn delete_by_pin(&mut self, pin: &PinId) -> usize {
        let before = self.edges.len();
        self.edges.retain(|c| !c.touches(pin));
        before - self.edges.len()
    }

    /// Remove every edge touching any pin of `reference`.
    pub fn delete_by_reference(&mut self, reference: &str) -> usize {
        let before = self.edges.len();
        self.edges
            .retain(|c| c.a.reference() != reference && c.b.reference() != reference);
        before - self.edges.len()
    }

    /// Remove exactly the edge `a`-`b`.
    pub fn delete_edge(&mut self, a: &PinId, b: &PinId) -> Result<()> {
        let missing = || ProbeError::EdgeNotFound {
            a: a.to_string(),
            b: b.to_string(),
        };
        let connection = Connection::new(a.clone(), b.clone()).map_err(|_| missing())?;
        if self.edges.remove(&connection) {
            Ok(())
        } else {
            Err(missing())
        }
    }

    /// Move every edge of `from` onto `to`, then forget `from`.
    ///
    /// Edges that would duplicate an existing `to` edge, or that would join
    /// `to` to itself, are dropped. Merging a pin that has no edges is a no-op.
    pub fn merge_pins(&mut self, from: &PinId, to: &PinId) -> Result<MergeOutcome> {
        if from == to {
            return Err(ProbeError::SelfMerge {
                pin: from.to_string(),
            });
        }

        let touching: Vec<Connection> = self.edges_of(from).cloned().collect();
        let mut outcome = MergeOutcome::default();
        for edge in touching {
            self.edges.remove(&edge);
            let other = match edge.other(from) {
                Some(other) => other.clone(),
                None => continue,
            };
            let inserted = Connection::new(other, to.clone())
                .map(|rewritten| self.edges.insert(rewritten))
                .unwrap_or(false);
            if inserted {
                outcome.moved += 1;
            } else {
                outcome.dropped += 1;
            }
        }
        Ok(outcome)
    }

    pub fn contains(&self, a: &PinId, b: &PinId) -> bool {
        Connection::new(a.clone(), b.clone())
            .map(|c| self.edges.contains(&c))
            .unwrap_or(false)
    }

    pub fn has_pin(&self, pin: &PinId) -> bool {
        self.edges.iter().any(|c| c.touches(pin))
    }

    pub fn edges_of<'a>(&'a self, pin: &'a PinId) -> impl Iterator<Item = &'a Connection> + 'a {
        self.edges.iter().filter(move |c| c.touches(pin))
    }

    /// Every pin that appears in some edge, in canonical order.
    pub fn pins(&self) -> BTreeSet<&PinId> {
        self.edges.iter().flat_map(|c| [&c.a, &c.b]).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.edges.iter()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Rewrite every pin through `rename`. Edges that collapse are dropped.
    pub(crate) fn rename_pins(&mut self, rename: impl Fn(&PinId) -> PinId) {
        self.edges = std::mem::take(&mut self.edges)
            .into_iter()
            .filter_map(|c| Connection::new(rename(&c.a), rename(&c.b)).ok())
            .collect();
    }
}
