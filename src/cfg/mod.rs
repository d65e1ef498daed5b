pub mod builder;
pub mod callgraph;
pub mod signature;
pub mod ssa;
pub mod synthetic;

use crate::ast::NodeId;
use crate::oracle::AnalysisEntry;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

pub type BlockId = u32;

/// Labels on control-flow edges. Plain fall-through edges carry no label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EdgeLabel {
    True,
    False,
    Next,
    Stop,
    Entry,
    Resume,
    AsyncEnter,
    AsyncNext,
    AsyncStop,
    Loop,
}

/// Merge-point pseudo-instruction selecting per-predecessor versions.
#[derive(Debug, Clone, Serialize)]
pub struct PhiNode {
    pub var_name: String,
    pub result: String,
    /// predecessor block id -> SSA version arriving along that edge
    pub operands: BTreeMap<BlockId, String>,
}

impl std::fmt::Display for PhiNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let args: Vec<String> = self
            .operands
            .iter()
            .map(|(k, v)| format!("B{k}:{v}"))
            .collect();
        write!(f, "{} = phi({})", self.result, args.join(", "))
    }
}

/// A security finding delivered by the external scanner, mapped to a block.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub check_id: String,
    pub message: Option<String>,
    pub severity: Option<String>,
    pub line: usize,
    pub column: Option<usize>,
}

/// A cached oracle decision attached to a block.
#[derive(Debug, Clone, Serialize)]
pub struct Insight {
    pub provider: String,
    pub model: String,
    pub response: String,
    pub analysis: Vec<AnalysisEntry>,
    pub cached: bool,
    pub snippet: String,
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub scope: String,
    pub statements: Vec<NodeId>,
    pub phi_nodes: Vec<PhiNode>,
    pub findings: Vec<Finding>,
    pub insights: Vec<Insight>,
}

impl BasicBlock {
    pub fn new(id: BlockId, scope: impl Into<String>) -> Self {
        Self {
            id,
            scope: scope.into(),
            statements: Vec::new(),
            phi_nodes: Vec::new(),
            findings: Vec::new(),
            insights: Vec::new(),
        }
    }

    pub fn add_statement(&mut self, stmt: NodeId) {
        self.statements.push(stmt);
    }

    pub fn add_phi(&mut self, phi: PhiNode) {
        self.phi_nodes.push(phi);
    }
}

/// Per-file control-flow graph: blocks keyed by id, edges in a parallel
/// petgraph so dominator and reachability queries stay cheap. Traversals
/// pass block ids, never block references.
#[derive(Debug)]
pub struct ControlFlowGraph {
    pub name: String,
    pub entry_block: Option<BlockId>,
    pub exit_block: Option<BlockId>,
    /// scope name -> AST node of the defining function
    pub scopes: HashMap<String, NodeId>,
    blocks: BTreeMap<BlockId, BasicBlock>,
    graph: DiGraph<BlockId, Option<EdgeLabel>>,
    node_ix: HashMap<BlockId, NodeIndex>,
}

impl ControlFlowGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_block: None,
            exit_block: None,
            scopes: HashMap::new(),
            blocks: BTreeMap::new(),
            graph: DiGraph::new(),
            node_ix: HashMap::new(),
        }
    }

    pub fn add_block(&mut self, block: BasicBlock) {
        let id = block.id;
        let ix = self.graph.add_node(id);
        self.node_ix.insert(id, ix);
        self.blocks.insert(id, block);
    }

    pub fn add_edge(&mut self, source: BlockId, target: BlockId, label: Option<EdgeLabel>) {
        if let (Some(&s), Some(&t)) = (self.node_ix.get(&source), self.node_ix.get(&target)) {
            self.graph.add_edge(s, t, label);
        }
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(&id)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(&id)
    }

    /// Blocks in ascending id order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.values()
    }

    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut BasicBlock> {
        self.blocks.values_mut()
    }

    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks.keys().copied().collect()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn successors(&self, id: BlockId) -> Vec<BlockId> {
        let Some(&ix) = self.node_ix.get(&id) else {
            return Vec::new();
        };
        let mut out: Vec<BlockId> = self
            .graph
            .neighbors_directed(ix, Outgoing)
            .map(|n| self.graph[n])
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn predecessors(&self, id: BlockId) -> Vec<BlockId> {
        let Some(&ix) = self.node_ix.get(&id) else {
            return Vec::new();
        };
        let mut out: Vec<BlockId> = self
            .graph
            .neighbors_directed(ix, Incoming)
            .map(|n| self.graph[n])
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn out_degree(&self, id: BlockId) -> usize {
        self.node_ix
            .get(&id)
            .map(|&ix| self.graph.edges_directed(ix, Outgoing).count())
            .unwrap_or(0)
    }

    pub fn has_edge(&self, source: BlockId, target: BlockId) -> bool {
        match (self.node_ix.get(&source), self.node_ix.get(&target)) {
            (Some(&s), Some(&t)) => self.graph.find_edge(s, t).is_some(),
            _ => false,
        }
    }

    pub fn edge_label(&self, source: BlockId, target: BlockId) -> Option<Option<EdgeLabel>> {
        let (&s, &t) = (self.node_ix.get(&source)?, self.node_ix.get(&target)?);
        self.graph
            .find_edge(s, t)
            .map(|e| *self.graph.edge_weight(e).unwrap_or(&None))
    }

    /// All edges as `(source, target, label)` triples.
    pub fn edges(&self) -> Vec<(BlockId, BlockId, Option<EdgeLabel>)> {
        self.graph
            .edge_references()
            .map(|e| {
                (
                    self.graph[e.source()],
                    self.graph[e.target()],
                    *e.weight(),
                )
            })
            .collect()
    }

    pub fn labels_out(&self, id: BlockId) -> Vec<Option<EdgeLabel>> {
        let Some(&ix) = self.node_ix.get(&id) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(ix, Outgoing)
            .map(|e| *e.weight())
            .collect()
    }

    pub(crate) fn petgraph(&self) -> &DiGraph<BlockId, Option<EdgeLabel>> {
        &self.graph
    }

    pub(crate) fn node_index(&self, id: BlockId) -> Option<NodeIndex> {
        self.node_ix.get(&id).copied()
    }

    /// Count of blocks reachable from the entry block.
    pub fn reachable_from_entry(&self) -> usize {
        let Some(entry) = self.entry_block.and_then(|e| self.node_index(e)) else {
            return 0;
        };
        let mut reachable: HashSet<NodeIndex> = HashSet::new();
        let mut bfs = Bfs::new(&self.graph, entry);
        while let Some(nx) = bfs.next(&self.graph) {
            reachable.insert(nx);
        }
        reachable.len()
    }

    /// True when the graph contains a cycle (loop back edges included).
    pub fn has_cycle(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }
}
