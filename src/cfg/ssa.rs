use crate::ast::{Ast, NameCtx, NodeId, NodeKind};
use crate::cfg::{BlockId, ControlFlowGraph, PhiNode};
use crate::errors::ArgusResult;
use crate::pipeline::CancelToken;
use petgraph::algo::dominators::simple_fast;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

pub type SsaName = String;

/// Where an SSA version was born.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsaDef {
    Stmt { block: BlockId, node: NodeId },
    Phi { block: BlockId, index: usize },
}

#[derive(Debug, Default)]
pub struct SsaResult {
    /// Name/parameter occurrence -> version (`x_1`).
    pub ssa_map: HashMap<NodeId, SsaName>,
    /// version -> defining statement or Φ. Each version defined exactly once.
    pub version_defs: HashMap<SsaName, SsaDef>,
    pub vars: BTreeSet<String>,
    /// immediate dominators (entry has no entry here)
    pub idoms: HashMap<BlockId, BlockId>,
    /// dominator-tree children, deterministic order
    pub dom_children: BTreeMap<BlockId, Vec<BlockId>>,
}

impl SsaResult {
    /// True when `inner`'s idom chain passes through (or starts at) `outer`.
    pub fn dominated_by(&self, inner: BlockId, outer: BlockId) -> bool {
        let mut cur = inner;
        loop {
            if cur == outer {
                return true;
            }
            match self.idoms.get(&cur) {
                Some(&parent) if parent != cur => cur = parent,
                _ => return false,
            }
        }
    }
}

/// Converts a completed CFG to SSA form: dominators, dominance frontiers,
/// Φ insertion, then renaming over the dominator tree.
pub struct SsaTransformer<'a> {
    ast: &'a Ast,
    cfg: &'a mut ControlFlowGraph,
    cancel: &'a CancelToken,
    defs: BTreeMap<String, BTreeSet<BlockId>>,
    frontiers: HashMap<BlockId, BTreeSet<BlockId>>,
    counters: HashMap<String, u32>,
    stacks: HashMap<String, Vec<SsaName>>,
    out: SsaResult,
}

impl<'a> SsaTransformer<'a> {
    pub fn transform(
        ast: &'a Ast,
        cfg: &'a mut ControlFlowGraph,
        cancel: &'a CancelToken,
    ) -> ArgusResult<SsaResult> {
        let Some(entry) = cfg.entry_block else {
            return Ok(SsaResult::default());
        };

        let mut t = SsaTransformer {
            ast,
            cfg,
            cancel,
            defs: BTreeMap::new(),
            frontiers: HashMap::new(),
            counters: HashMap::new(),
            stacks: HashMap::new(),
            out: SsaResult::default(),
        };

        t.compute_dominance(entry);
        t.find_defs();
        t.insert_phi_nodes();
        t.rename(entry)?;

        debug!(
            target: "ssa",
            "SSA done — {} vars, {} versions",
            t.out.vars.len(),
            t.out.version_defs.len()
        );
        Ok(t.out)
    }

    fn compute_dominance(&mut self, entry: BlockId) {
        let graph = self.cfg.petgraph();
        let Some(entry_ix) = self.cfg.node_index(entry) else {
            return;
        };
        let doms = simple_fast(graph, entry_ix);

        for id in self.cfg.block_ids() {
            let Some(ix) = self.cfg.node_index(id) else {
                continue;
            };
            if let Some(idom_ix) = doms.immediate_dominator(ix) {
                let parent = graph[idom_ix];
                self.out.idoms.insert(id, parent);
                self.out.dom_children.entry(parent).or_default().push(id);
            }
        }
        for children in self.out.dom_children.values_mut() {
            children.sort_unstable();
        }

        // Cooper-Harvey-Kennedy frontiers: walk each join predecessor up to
        // the join's idom.
        for b in self.cfg.block_ids() {
            let preds = self.cfg.predecessors(b);
            if preds.len() < 2 {
                continue;
            }
            let Some(&idom_b) = self.out.idoms.get(&b) else {
                continue;
            };
            for p in preds {
                let mut runner = p;
                while runner != idom_b {
                    self.frontiers.entry(runner).or_default().insert(b);
                    match self.out.idoms.get(&runner) {
                        Some(&up) if up != runner => runner = up,
                        _ => break,
                    }
                }
            }
        }
    }

    fn find_defs(&mut self) {
        let mut found: Vec<(String, BlockId)> = Vec::new();
        for block in self.cfg.blocks() {
            for &stmt in &block.statements {
                self.defs_in_stmt(stmt, block.id, &mut found);
            }
        }
        for (var, block) in found {
            self.out.vars.insert(var.clone());
            self.defs.entry(var).or_default().insert(block);
        }
    }

    fn defs_in_stmt(&self, stmt: NodeId, block: BlockId, out: &mut Vec<(String, BlockId)>) {
        match self.ast.kind(stmt) {
            NodeKind::Assign { targets, .. } => {
                for &t in targets {
                    self.defs_in_target(t, block, out);
                }
            }
            NodeKind::AugAssign { target, .. } => self.defs_in_target(*target, block, out),
            NodeKind::Param { name, .. } => out.push((name.clone(), block)),
            // Loop targets appear as bare Store statements in headers.
            NodeKind::Name {
                id,
                ctx: NameCtx::Store,
            } => out.push((id.clone(), block)),
            NodeKind::TupleBind { .. } if self.is_store_tuple(stmt) => {
                self.defs_in_target(stmt, block, out)
            }
            _ => {}
        }
    }

    fn defs_in_target(&self, target: NodeId, block: BlockId, out: &mut Vec<(String, BlockId)>) {
        match self.ast.kind(target) {
            NodeKind::Name {
                id,
                ctx: NameCtx::Store,
            } => out.push((id.clone(), block)),
            NodeKind::TupleBind { elts } => {
                for &e in elts {
                    self.defs_in_target(e, block, out);
                }
            }
            // attribute / subscript targets define no local name
            _ => {}
        }
    }

    fn is_store_tuple(&self, node: NodeId) -> bool {
        let names = self.ast.collect_names(node, NameCtx::Store);
        !names.is_empty()
    }

    fn insert_phi_nodes(&mut self) {
        for var in self.out.vars.clone() {
            let mut worklist: Vec<BlockId> =
                self.defs.get(&var).map(|s| s.iter().copied().collect()).unwrap_or_default();
            let mut has_phi: BTreeSet<BlockId> = BTreeSet::new();

            while let Some(b) = worklist.pop() {
                let frontier = self.frontiers.get(&b).cloned().unwrap_or_default();
                for df in frontier {
                    if has_phi.contains(&df) {
                        continue;
                    }
                    if let Some(block) = self.cfg.block_mut(df) {
                        block.add_phi(PhiNode {
                            var_name: var.clone(),
                            result: var.clone(), // renamed below
                            operands: BTreeMap::new(),
                        });
                        has_phi.insert(df);

                        let defs = self.defs.entry(var.clone()).or_default();
                        if defs.insert(df) {
                            worklist.push(df);
                        }
                    }
                }
            }
        }
    }

    fn rename(&mut self, block_id: BlockId) -> ArgusResult<()> {
        self.cancel.check()?;

        let mut pushed: HashMap<String, usize> = HashMap::new();

        // 1. Φ results define new versions.
        let phi_count = self
            .cfg
            .block(block_id)
            .map(|b| b.phi_nodes.len())
            .unwrap_or(0);
        for i in 0..phi_count {
            let Some(var) = self
                .cfg
                .block(block_id)
                .map(|b| b.phi_nodes[i].var_name.clone())
            else {
                break;
            };
            let ver = self.new_version(&var, &mut pushed, SsaDef::Phi { block: block_id, index: i });
            if let Some(b) = self.cfg.block_mut(block_id) {
                b.phi_nodes[i].result = ver;
            }
        }

        // 2. Statements rewrite uses to stack tops, defs to fresh versions.
        let statements = self
            .cfg
            .block(block_id)
            .map(|b| b.statements.clone())
            .unwrap_or_default();
        for stmt in statements {
            match self.ast.kind(stmt).clone() {
                NodeKind::Assign { targets, value } => {
                    self.rename_uses(value);
                    for t in targets {
                        self.rename_defs(t, &mut pushed, block_id, stmt);
                    }
                }
                NodeKind::AugAssign { target, value } => {
                    // x OP= e is a use then a def.
                    self.rename_uses(target);
                    self.rename_uses(value);
                    self.rename_defs(target, &mut pushed, block_id, stmt);
                }
                NodeKind::Param { .. } => self.rename_defs(stmt, &mut pushed, block_id, stmt),
                NodeKind::Name {
                    ctx: NameCtx::Store,
                    ..
                } => self.rename_defs(stmt, &mut pushed, block_id, stmt),
                NodeKind::TupleBind { .. } if self.is_store_tuple(stmt) => {
                    self.rename_defs(stmt, &mut pushed, block_id, stmt)
                }
                _ => self.rename_uses(stmt),
            }
        }

        // 3. Fill this block's slot in each successor Φ.
        for succ in self.cfg.successors(block_id) {
            let phi_count = self.cfg.block(succ).map(|b| b.phi_nodes.len()).unwrap_or(0);
            for i in 0..phi_count {
                let Some(var) = self
                    .cfg
                    .block(succ)
                    .map(|b| b.phi_nodes[i].var_name.clone())
                else {
                    break;
                };
                let version = self
                    .stacks
                    .get(&var)
                    .and_then(|s| s.last().cloned())
                    .unwrap_or_else(|| format!("{var}_undefined"));
                if let Some(b) = self.cfg.block_mut(succ) {
                    b.phi_nodes[i].operands.insert(block_id, version);
                }
            }
        }

        // 4. Recurse into dominator-tree children.
        let children = self
            .out
            .dom_children
            .get(&block_id)
            .cloned()
            .unwrap_or_default();
        for child in children {
            self.rename(child)?;
        }

        // 5. Pop everything this block pushed.
        for (name, count) in pushed {
            if let Some(stack) = self.stacks.get_mut(&name) {
                for _ in 0..count {
                    stack.pop();
                }
            }
        }
        Ok(())
    }

    fn new_version(
        &mut self,
        name: &str,
        pushed: &mut HashMap<String, usize>,
        def: SsaDef,
    ) -> SsaName {
        let counter = self.counters.entry(name.to_string()).or_insert(0);
        *counter += 1;
        let ver = format!("{name}_{counter}");
        self.stacks.entry(name.to_string()).or_default().push(ver.clone());
        *pushed.entry(name.to_string()).or_insert(0) += 1;
        self.out.version_defs.insert(ver.clone(), def);
        ver
    }

    fn rename_uses(&mut self, node: NodeId) {
        if let NodeKind::Name { id, .. } = self.ast.kind(node) {
            let version = self
                .stacks
                .get(id)
                .and_then(|s| s.last().cloned())
                .unwrap_or_else(|| format!("{id}_undefined"));
            self.out.ssa_map.insert(node, version);
            return;
        }
        let mut kids = Vec::new();
        self.ast.for_each_child(node, &mut |c| kids.push(c));
        for c in kids {
            self.rename_uses(c);
        }
    }

    fn rename_defs(
        &mut self,
        node: NodeId,
        pushed: &mut HashMap<String, usize>,
        block: BlockId,
        stmt: NodeId,
    ) {
        match self.ast.kind(node).clone() {
            NodeKind::Name { id, .. } => {
                let ver = self.new_version(&id, pushed, SsaDef::Stmt { block, node: stmt });
                self.out.ssa_map.insert(node, ver);
            }
            NodeKind::Param { name, .. } => {
                let ver = self.new_version(&name, pushed, SsaDef::Stmt { block, node: stmt });
                self.out.ssa_map.insert(node, ver);
            }
            NodeKind::TupleBind { elts } => {
                for e in elts {
                    self.rename_defs(e, pushed, block, stmt);
                }
            }
            _ => {}
        }
    }
}

// -------------------------------------------------------------------------
//  Tests
// -------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse_module;
    use crate::cfg::builder::CfgBuilder;

    fn ssa_for(src: &str) -> (Ast, ControlFlowGraph, SsaResult) {
        let ast = parse_module(src.as_bytes()).unwrap();
        let cancel = CancelToken::new();
        let mut cfg = CfgBuilder::build(&ast, "test", ast.root, &cancel).unwrap();
        let ssa = SsaTransformer::transform(&ast, &mut cfg, &cancel).unwrap();
        (ast, cfg, ssa)
    }

    #[test]
    fn simple_assign_is_versioned() {
        let (_, _, ssa) = ssa_for("def foo(a):\n    x = 1\n    y = x + a\n    return y\n");
        assert!(!ssa.ssa_map.is_empty());
        assert!(ssa.vars.contains("x"));
        assert!(ssa.version_defs.contains_key("x_1"));
        assert!(ssa.version_defs.contains_key("a_1"));
    }

    #[test]
    fn phi_inserted_at_join() {
        let (_, cfg, _) = ssa_for("def foo(cond):\n    if cond:\n        x = 1\n    else:\n        x = 2\n    return x\n");
        let mut found = false;
        for block in cfg.blocks() {
            for phi in &block.phi_nodes {
                if phi.var_name == "x" {
                    found = true;
                    assert!(phi.operands.len() >= 2);
                }
            }
        }
        assert!(found, "expected a phi for x at the join");
    }

    #[test]
    fn loop_variables_get_header_phis() {
        let (_, cfg, _) = ssa_for(
            "def foo(n):\n    x = 0\n    while n > 0:\n        x = x + n\n        n = n - 1\n    return x\n",
        );
        let mut vars = BTreeSet::new();
        for block in cfg.blocks() {
            for phi in &block.phi_nodes {
                vars.insert(phi.var_name.clone());
            }
        }
        assert!(vars.contains("x"));
        assert!(vars.contains("n"));
    }

    #[test]
    fn phi_operand_keys_equal_predecessors() {
        let (_, cfg, _) = ssa_for("def foo(c):\n    if c:\n        x = 1\n    else:\n        x = 2\n    return x\n");
        for block in cfg.blocks() {
            for phi in &block.phi_nodes {
                let keys: Vec<BlockId> = phi.operands.keys().copied().collect();
                assert_eq!(keys, cfg.predecessors(block.id));
            }
        }
    }

    #[test]
    fn each_version_defined_exactly_once() {
        let (_, _, ssa) = ssa_for(
            "def foo(n):\n    x = 0\n    while n > 0:\n        x = x + 1\n        n = n - 1\n    return x\n",
        );
        // version_defs is keyed by version, so any double definition would
        // have clobbered an entry; instead check versions are all distinct
        // per variable counter.
        let mut seen = BTreeSet::new();
        for v in ssa.version_defs.keys() {
            assert!(seen.insert(v.clone()), "version {v} defined twice");
        }
    }

    #[test]
    fn undefined_use_gets_sentinel() {
        let (ast, _, ssa) = ssa_for("y = x\n");
        let uses = ast.collect_names(ast.root, NameCtx::Load);
        let x_use = uses
            .iter()
            .find(|&&n| matches!(ast.kind(n), NodeKind::Name { id, .. } if id == "x"))
            .unwrap();
        assert_eq!(ssa.ssa_map.get(x_use).map(String::as_str), Some("x_undefined"));
    }

    #[test]
    fn augmented_assign_is_use_then_def() {
        let (_, _, ssa) = ssa_for("x = 1\nx += 2\n");
        assert!(ssa.version_defs.contains_key("x_1"));
        assert!(ssa.version_defs.contains_key("x_2"));
    }

    #[test]
    fn dominated_by_follows_idom_chain() {
        let (_, cfg, ssa) = ssa_for("if c:\n    x = 1\nelse:\n    x = 2\nz = x\n");
        let entry = cfg.entry_block.unwrap();
        for id in cfg.block_ids() {
            assert!(ssa.dominated_by(id, entry) || ssa.idoms.get(&id).is_none());
        }
    }
}
