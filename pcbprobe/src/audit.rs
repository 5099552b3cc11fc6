//! Independent net computation used to audit the union-find result.
//!
//! Builds an undirected `petgraph` graph over the connection store and walks
//! it depth-first. Slower than the forest, but it shares no code with it.

use std::collections::{BTreeSet, HashMap};

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::Dfs;

use crate::connection::ConnectionStore;
use crate::pin::PinId;

/// Connected components of the connection graph, members sorted and
/// components ordered by their lowest member.
pub fn reference_nets(connections: &ConnectionStore) -> Vec<BTreeSet<PinId>> {
    let mut graph: UnGraph<PinId, ()> = UnGraph::new_undirected();
    let mut indices: HashMap<PinId, NodeIndex> = HashMap::new();

    for connection in connections.iter() {
        let a = node(&mut graph, &mut indices, connection.a());
        let b = node(&mut graph, &mut indices, connection.b());
        graph.add_edge(a, b, ());
    }

    let mut seen: BTreeSet<NodeIndex> = BTreeSet::new();
    let mut nets = Vec::new();
    for start in graph.node_indices() {
        if seen.contains(&start) {
            continue;
        }
        let mut members = BTreeSet::new();
        let mut dfs = Dfs::new(&graph, start);
        while let Some(idx) = dfs.next(&graph) {
            seen.insert(idx);
            members.insert(graph[idx].clone());
        }
        nets.push(members);
    }
    nets.sort();
    nets
}

fn node(
    graph: &mut UnGraph<PinId, ()>,
    indices: &mut HashMap<PinId, NodeIndex>,
    pin: &PinId,
) -> NodeIndex {
    if let Some(&idx) = indices.get(pin) {
        return idx;
    }
    let idx = graph.add_node(pin.clone());
    indices.insert(pin.clone(), idx);
    idx
}
