//! Undirected table relationship graph built from foreign keys.
//!
//! One edge per unordered pair of tables, regardless of how many foreign
//! keys connect them or in which direction. Self-references are dropped.
//! The graph is built once per schema snapshot and read concurrently.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::graph::{NodeIndex, UnGraph};
use tracing::debug;

use crate::models::ForeignKey;

#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    graph: UnGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from each table's foreign keys.
    ///
    /// Every listed table becomes a node, with or without edges.
    /// Referred tables that are not listed are added as nodes too.
    pub fn from_foreign_keys<'a, I>(tables: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [ForeignKey])>,
    {
        let mut g = Self::new();
        for (table, fks) in tables {
            g.add_table(table);
            for fk in fks {
                g.add_edge(table, &fk.referred_table);
            }
        }
        debug!(
            tables = g.node_count(),
            edges = g.edge_count(),
            "built relationship graph"
        );
        g
    }

    pub fn add_table(&mut self, table: &str) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(table) {
            return idx;
        }
        let idx = self.graph.add_node(table.to_string());
        self.nodes.insert(table.to_string(), idx);
        idx
    }

    /// Insert the undirected edge `a – b`. Returns `false` for
    /// self-edges and edges that already exist.
    pub fn add_edge(&mut self, a: &str, b: &str) -> bool {
        if a == b {
            self.add_table(a);
            return false;
        }
        let ia = self.add_table(a);
        let ib = self.add_table(b);
        if self.graph.find_edge(ia, ib).is_some() {
            return false;
        }
        self.graph.add_edge(ia, ib, ());
        true
    }

    pub fn contains(&self, table: &str) -> bool {
        self.nodes.contains_key(table)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Tables reachable from `table` within `hops` edges, excluding
    /// `table` itself. Unknown tables and `hops == 0` give an empty set.
    pub fn neighbors(&self, table: &str, hops: usize) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let Some(&start) = self.nodes.get(table) else {
            return out;
        };
        if hops == 0 {
            return out;
        }

        let mut seen: HashSet<NodeIndex> = HashSet::from([start]);
        let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::from([(start, 0)]);

        while let Some((node, depth)) = queue.pop_front() {
            if depth == hops {
                continue;
            }
            for next in self.graph.neighbors(node) {
                if seen.insert(next) {
                    out.insert(self.graph[next].clone());
                    queue.push_back((next, depth + 1));
                }
            }
        }

        out
    }
}
