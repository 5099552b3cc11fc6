//! Net derivation with a disjoint-set forest.
//!
//! Adding a connection unions its two pins in the live forest. Removing or
//! rewriting connections cannot be undone in a union-find structure, so every
//! destructive change marks the forest stale and the next query rebuilds it
//! from scratch by replaying the [`ConnectionStore`]. The edge set is the
//! source of truth; the forest is a cache over it.

use std::collections::{BTreeSet, HashMap};

use crate::connection::ConnectionStore;
use crate::pin::PinId;

/// Union-find over pins: path compression plus union by rank.
#[derive(Debug, Clone, Default)]
pub struct DisjointSet {
    index: HashMap<PinId, usize>,
    pins: Vec<PinId>,
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, pin: &PinId) -> usize {
        if let Some(&i) = self.index.get(pin) {
            return i;
        }
        let i = self.pins.len();
        self.index.insert(pin.clone(), i);
        self.pins.push(pin.clone());
        self.parent.push(i);
        self.rank.push(0);
        i
    }

    fn root(&mut self, mut i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[i] != root {
            let next = self.parent[i];
            self.parent[i] = root;
            i = next;
        }
        root
    }

    /// Representative of the set holding `pin`, or `None` for an unseen pin.
    pub fn find(&mut self, pin: &PinId) -> Option<&PinId> {
        let i = *self.index.get(pin)?;
        let root = self.root(i);
        Some(&self.pins[root])
    }

    /// Join the sets of `a` and `b`, adding either pin if unseen.
    /// Returns `false` when they were already in one set.
    pub fn union(&mut self, a: &PinId, b: &PinId) -> bool {
        let ia = self.slot(a);
        let ib = self.slot(b);
        let (ra, rb) = (self.root(ia), self.root(ib));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    /// Root lookup without compression, for read-only traversals.
    fn root_of(&self, mut i: usize) -> usize {
        while self.parent[i] != i {
            i = self.parent[i];
        }
        i
    }

    /// Every set, members sorted, sets ordered by their lowest member.
    pub fn groups(&self) -> Vec<BTreeSet<PinId>> {
        let mut by_root: HashMap<usize, BTreeSet<PinId>> = HashMap::new();
        for i in 0..self.pins.len() {
            let root = self.root_of(i);
            by_root.entry(root).or_default().insert(self.pins[i].clone());
        }
        let mut groups: Vec<BTreeSet<PinId>> = by_root.into_values().collect();
        groups.sort();
        groups
    }
}

/// A maximal set of transitively connected pins.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Net {
    representative: PinId,
    members: BTreeSet<PinId>,
}

impl Net {
    /// `None` for an empty member set.
    pub fn new(members: BTreeSet<PinId>) -> Option<Self> {
        let representative = members.first()?.clone();
        Some(Self {
            representative,
            members,
        })
    }

    /// Lowest canonical member pin. Stable no matter the order in which
    /// connections were unioned.
    pub fn representative(&self) -> &PinId {
        &self.representative
    }

    pub fn members(&self) -> &BTreeSet<PinId> {
        &self.members
    }

    pub fn contains(&self, pin: &PinId) -> bool {
        self.members.contains(pin)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Maintains nets for a [`ConnectionStore`].
#[derive(Debug, Clone, Default)]
pub struct NetBuilder {
    forest: DisjointSet,
    stale: bool,
    rebuilds: usize,
}

impl NetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder whose forest already reflects `connections`.
    pub fn from_connections(connections: &ConnectionStore) -> Self {
        let mut builder = Self::new();
        builder.rebuild(connections);
        builder
    }

    /// Record a newly added connection. Amortized O(1); no rebuild.
    pub fn connect(&mut self, a: &PinId, b: &PinId) {
        if !self.stale {
            self.forest.union(a, b);
        }
    }

    /// Mark the forest out of date after a deletion or merge.
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    /// Number of full rebuilds performed so far.
    pub fn rebuild_count(&self) -> usize {
        self.rebuilds
    }

    /// Throw the forest away and replay every connection.
    pub fn rebuild(&mut self, connections: &ConnectionStore) {
        let mut forest = DisjointSet::new();
        for connection in connections.iter() {
            forest.union(connection.a(), connection.b());
        }
        self.forest = forest;
        self.stale = false;
        self.rebuilds += 1;
        tracing::debug!(
            "Rebuilt nets from {} connections ({} pins)",
            connections.len(),
            self.forest.len()
        );
    }

    /// Rebuild only if a destructive change happened since the last build.
    pub fn refresh(&mut self, connections: &ConnectionStore) {
        if self.stale {
            self.rebuild(connections);
        }
    }

    /// All nets, ordered by representative.
    pub fn nets(&mut self, connections: &ConnectionStore) -> Vec<Net> {
        self.refresh(connections);
        self.forest.groups().into_iter().filter_map(Net::new).collect()
    }

    /// Nets from the live forest, without rebuilding. `None` while stale.
    pub fn current(&self) -> Option<Vec<Net>> {
        if self.stale {
            return None;
        }
        Some(self.forest.groups().into_iter().filter_map(Net::new).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(text: &str) -> PinId {
        match text.split_once('-') {
            Some((r, n)) => PinId::numbered(r, n.parse().unwrap()),
            None => PinId::single(text),
        }
    }

    fn sizes(nets: &[Net]) -> Vec<usize> {
        let mut sizes: Vec<usize> = nets.iter().map(Net::len).collect();
        sizes.sort();
        sizes
    }

    #[test]
    fn test_union_find() {
        let mut set = DisjointSet::new();
        assert!(set.union(&pin("A-1"), &pin("B-1")));
        assert!(set.union(&pin("C-1"), &pin("D-1")));
        assert!(!set.union(&pin("B-1"), &pin("A-1")));
        assert_ne!(set.find(&pin("A-1")).cloned(), set.find(&pin("C-1")).cloned());

        assert!(set.union(&pin("B-1"), &pin("D-1")));
        assert_eq!(set.find(&pin("A-1")).cloned(), set.find(&pin("C-1")).cloned());
        assert_eq!(set.find(&pin("Z-1")), None);
        assert_eq!(set.groups().len(), 1);
    }

    #[test]
    fn test_long_chain_compresses() {
        let mut set = DisjointSet::new();
        for i in 1..500 {
            set.union(&pin(&format!("N{i}-1")), &pin(&format!("N{}-1", i + 1)));
        }
        let root = set.find(&pin("N1-1")).cloned();
        assert_eq!(set.find(&pin("N500-1")).cloned(), root);
        assert_eq!(set.groups().len(), 1);
    }

    #[test]
    fn test_three_separate_nets_then_join() {
        let mut store = ConnectionStore::default();
        let mut builder = NetBuilder::new();
        for (a, b) in [("R01-1", "VCC-1"), ("R01-2", "U01-5"), ("C01-1", "GND-1")] {
            store.add(pin(a), pin(b)).unwrap();
            builder.connect(&pin(a), &pin(b));
        }
        assert_eq!(sizes(&builder.nets(&store)), [2, 2, 2]);

        store.add(pin("VCC-1"), pin("C01-1")).unwrap();
        builder.connect(&pin("VCC-1"), &pin("C01-1"));
        let nets = builder.nets(&store);
        assert_eq!(sizes(&nets), [2, 4]);
        assert_eq!(nets, NetBuilder::from_connections(&store).nets(&store));
        assert_eq!(builder.rebuild_count(), 0);
    }

    #[test]
    fn test_deletion_rebuilds() {
        let mut store = ConnectionStore::default();
        let mut builder = NetBuilder::new();
        for (a, b) in [("A-1", "B-1"), ("B-1", "C-1"), ("C-1", "D-1")] {
            store.add(pin(a), pin(b)).unwrap();
            builder.connect(&pin(a), &pin(b));
        }
        assert_eq!(builder.nets(&store).len(), 1);

        store.delete_edge(&pin("B-1"), &pin("C-1")).unwrap();
        builder.invalidate();
        assert!(builder.current().is_none());
        // a stale forest ignores incremental unions until rebuilt
        builder.connect(&pin("X-1"), &pin("Y-1"));
        store.add(pin("X-1"), pin("Y-1")).unwrap();

        let nets = builder.nets(&store);
        assert_eq!(builder.rebuild_count(), 1);
        assert_eq!(sizes(&nets), [2, 2, 2]);
        assert_eq!(builder.current(), Some(nets.clone()));
        let of = |p: &str| nets.iter().position(|net| net.contains(&pin(p)));
        assert_ne!(of("A-1"), of("D-1"));
        assert_eq!(of("C-1"), of("D-1"));
    }

    #[test]
    fn test_representative_is_lowest_member() {
        let mut store = ConnectionStore::default();
        store.add(pin("U1-8"), pin("C2-1")).unwrap();
        store.add(pin("C2-1"), pin("R5-2")).unwrap();
        let nets = NetBuilder::from_connections(&store).current().unwrap();

        assert_eq!(nets.len(), 1);
        assert_eq!(nets[0].len(), 3);
        assert_eq!(nets[0].representative(), &pin("C2-1"));
        assert!(!nets[0].contains(&pin("R5-1")));
    }
}
