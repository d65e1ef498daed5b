use crate::ast::{Ast, NodeId, NodeKind};
use crate::cfg::{BasicBlock, BlockId, ControlFlowGraph, EdgeLabel};
use crate::errors::ArgusResult;
use crate::pipeline::CancelToken;
use tracing::debug;

/// Builds a per-file CFG by walking the internal AST in source order.
///
/// One block chain per scope; function definitions open a fresh scope whose
/// entry is wired to the defining block with an `Entry` edge so every block
/// stays reachable from the graph entry (and renaming covers every scope).
pub struct CfgBuilder<'a> {
    ast: &'a Ast,
    cfg: ControlFlowGraph,
    counter: BlockId,
    current_scope: String,
    current_block: BlockId,
    cancel: &'a CancelToken,
}

impl<'a> CfgBuilder<'a> {
    pub fn build(
        ast: &'a Ast,
        name: &str,
        root: NodeId,
        cancel: &'a CancelToken,
    ) -> ArgusResult<ControlFlowGraph> {
        let mut b = CfgBuilder {
            ast,
            cfg: ControlFlowGraph::new(name),
            counter: 0,
            current_scope: name.to_string(),
            current_block: 0,
            cancel,
        };

        let entry = b.new_block();
        b.cfg.entry_block = Some(entry);
        b.current_block = entry;

        b.visit(root)?;
        b.cfg.exit_block = Some(b.current_block);

        debug!(
            target: "cfg",
            "CFG `{}` done — blocks: {}, edges: {}",
            b.cfg.name,
            b.cfg.block_count(),
            b.cfg.edge_count()
        );

        if cfg!(debug_assertions) {
            let reachable = b.cfg.reachable_from_entry();
            if reachable != b.cfg.block_count() {
                debug!(
                    target: "cfg",
                    "‼︎ unreachable blocks: {}/{} reachable",
                    reachable,
                    b.cfg.block_count()
                );
            }
        }

        Ok(b.cfg)
    }

    fn new_block(&mut self) -> BlockId {
        self.counter += 1;
        let block = BasicBlock::new(self.counter, self.current_scope.clone());
        self.cfg.add_block(block);
        self.counter
    }

    fn push_stmt(&mut self, stmt: NodeId) {
        if let Some(b) = self.cfg.block_mut(self.current_block) {
            b.add_statement(stmt);
        }
    }

    fn visit(&mut self, node: NodeId) -> ArgusResult<()> {
        self.cancel.check()?;

        match self.ast.kind(node).clone() {
            NodeKind::Module { body } | NodeKind::ClassDef { body, .. } => {
                for stmt in body {
                    self.visit(stmt)?;
                }
            }
            NodeKind::FunctionDef {
                name, params, body, ..
            } => self.visit_function(node, &name, &params, &body)?,
            NodeKind::If { test, body, orelse } => self.visit_if(test, &body, &orelse)?,
            NodeKind::While { test, body } => self.visit_while(test, &body)?,
            NodeKind::For {
                target,
                iter,
                body,
                is_async,
            } => self.visit_for(target, iter, &body, is_async)?,
            NodeKind::With {
                items,
                body,
                is_async,
            } => {
                // Context expressions and bindings evaluate before the body.
                for item in &items {
                    self.push_stmt(item.context);
                    if let Some(binding) = item.binding {
                        self.push_stmt(binding);
                    }
                }
                if is_async {
                    let body_block = self.new_block();
                    self.cfg
                        .add_edge(self.current_block, body_block, Some(EdgeLabel::AsyncEnter));
                    self.current_block = body_block;
                }
                for stmt in &body {
                    self.visit(*stmt)?;
                }
            }
            NodeKind::Assign { .. }
            | NodeKind::AugAssign { .. }
            | NodeKind::Return { .. }
            | NodeKind::ExprStmt { .. }
            | NodeKind::Global { .. }
            | NodeKind::Opaque => self.visit_linear(node),
            // Expression kinds arriving at statement position are appended
            // as-is (loop headers push them explicitly).
            _ => self.push_stmt(node),
        }
        Ok(())
    }

    /// Linear statements append to the current block, except that an `await`
    /// anywhere in the statement suspends: the statement gets its own block
    /// and a `Resume` edge leads to the resumption block.
    fn visit_linear(&mut self, stmt: NodeId) {
        if self.ast.contains_await(stmt) {
            let suspend = self.new_block();
            self.cfg.add_edge(self.current_block, suspend, None);
            self.current_block = suspend;
            self.push_stmt(stmt);

            let resume = self.new_block();
            self.cfg
                .add_edge(suspend, resume, Some(EdgeLabel::Resume));
            self.current_block = resume;
        } else {
            self.push_stmt(stmt);
        }
    }

    fn visit_function(
        &mut self,
        node: NodeId,
        name: &str,
        params: &[NodeId],
        body: &[NodeId],
    ) -> ArgusResult<()> {
        let outer_block = self.current_block;
        let previous_scope = self.current_scope.clone();

        self.current_scope = name.to_string();
        self.cfg.scopes.insert(name.to_string(), node);

        let func_entry = self.new_block();
        // The Entry edge keeps function bodies reachable (and renameable)
        // when the build root is the whole module; when the function itself
        // is the root this is exactly the caller-context edge.
        self.cfg
            .add_edge(outer_block, func_entry, Some(EdgeLabel::Entry));
        self.current_block = func_entry;

        for &param in params {
            self.push_stmt(param);
        }
        for &stmt in body {
            self.visit(stmt)?;
        }

        self.current_scope = previous_scope;

        let post_def = self.new_block();
        self.cfg
            .add_edge(outer_block, post_def, Some(EdgeLabel::Next));
        self.current_block = post_def;
        Ok(())
    }

    fn visit_if(&mut self, test: NodeId, body: &[NodeId], orelse: &[NodeId]) -> ArgusResult<()> {
        self.push_stmt(test);
        let pred = self.current_block;

        let then_block = self.new_block();
        let else_block = (!orelse.is_empty()).then(|| self.new_block());
        let join_block = self.new_block();

        self.cfg.add_edge(pred, then_block, Some(EdgeLabel::True));
        self.current_block = then_block;
        for &stmt in body {
            self.visit(stmt)?;
        }
        self.cfg.add_edge(self.current_block, join_block, None);

        if let Some(else_block) = else_block {
            self.cfg.add_edge(pred, else_block, Some(EdgeLabel::False));
            self.current_block = else_block;
            for &stmt in orelse {
                self.visit(stmt)?;
            }
            self.cfg.add_edge(self.current_block, join_block, None);
        } else {
            self.cfg.add_edge(pred, join_block, Some(EdgeLabel::False));
        }

        self.current_block = join_block;
        Ok(())
    }

    fn visit_while(&mut self, test: NodeId, body: &[NodeId]) -> ArgusResult<()> {
        let header = self.new_block();
        self.cfg.add_edge(self.current_block, header, None);
        if let Some(b) = self.cfg.block_mut(header) {
            b.add_statement(test);
        }

        let body_block = self.new_block();
        let exit_block = self.new_block();

        self.cfg.add_edge(header, body_block, Some(EdgeLabel::True));
        self.cfg.add_edge(header, exit_block, Some(EdgeLabel::False));

        self.current_block = body_block;
        for &stmt in body {
            self.visit(stmt)?;
        }
        self.cfg
            .add_edge(self.current_block, header, Some(EdgeLabel::Loop));

        self.current_block = exit_block;
        Ok(())
    }

    fn visit_for(
        &mut self,
        target: NodeId,
        iter: NodeId,
        body: &[NodeId],
        is_async: bool,
    ) -> ArgusResult<()> {
        let header = self.new_block();
        self.cfg.add_edge(self.current_block, header, None);
        if let Some(b) = self.cfg.block_mut(header) {
            b.add_statement(target);
            b.add_statement(iter);
        }

        let body_block = self.new_block();
        let exit_block = self.new_block();

        let (next, stop) = if is_async {
            (EdgeLabel::AsyncNext, EdgeLabel::AsyncStop)
        } else {
            (EdgeLabel::Next, EdgeLabel::Stop)
        };
        self.cfg.add_edge(header, body_block, Some(next));
        self.cfg.add_edge(header, exit_block, Some(stop));

        self.current_block = body_block;
        for &stmt in body {
            self.visit(stmt)?;
        }
        self.cfg
            .add_edge(self.current_block, header, Some(EdgeLabel::Loop));

        self.current_block = exit_block;
        Ok(())
    }
}

// -------------------------------------------------------------------------
//  Tests (Python snippets run through the real adapter)
// -------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{NameCtx, parse_module};

    fn build(src: &str) -> (Ast, ControlFlowGraph) {
        let ast = parse_module(src.as_bytes()).unwrap();
        let cancel = CancelToken::new();
        let cfg = CfgBuilder::build(&ast, "test", ast.root, &cancel).unwrap();
        (ast, cfg)
    }

    /// Block ids containing a Store of `var`, per scope filter.
    fn block_defining(ast: &Ast, cfg: &ControlFlowGraph, var: &str) -> Option<BlockId> {
        for block in cfg.blocks() {
            for &stmt in &block.statements {
                let stores = ast.collect_names(stmt, NameCtx::Store);
                for s in stores {
                    if matches!(ast.kind(s), NodeKind::Name { id, .. } if id == var) {
                        return Some(block.id);
                    }
                }
            }
        }
        None
    }

    #[test]
    fn linear_flow_single_block() {
        let (_, cfg) = build("x = 1\ny = 2\nz = x + y\n");
        let entry = cfg.block(cfg.entry_block.unwrap()).unwrap();
        assert_eq!(entry.statements.len(), 3);
    }

    #[test]
    fn if_flow_branches_and_joins() {
        let (_, cfg) = build("if x > 0:\n    y = 1\nelse:\n    y = 2\nz = y\n");
        assert!(cfg.block_count() >= 4);
        let entry = cfg.entry_block.unwrap();
        assert_eq!(cfg.out_degree(entry), 2);

        let labels = cfg.labels_out(entry);
        assert!(labels.contains(&Some(EdgeLabel::True)));
        assert!(labels.contains(&Some(EdgeLabel::False)));
    }

    #[test]
    fn if_without_else_falls_to_join() {
        let (_, cfg) = build("if c:\n    y = 1\nz = 2\n");
        let entry = cfg.entry_block.unwrap();
        assert_eq!(cfg.out_degree(entry), 2);
        // exactly one join block with two predecessors
        let joins: Vec<_> = cfg
            .block_ids()
            .into_iter()
            .filter(|&b| cfg.predecessors(b).len() == 2)
            .collect();
        assert_eq!(joins.len(), 1);
    }

    #[test]
    fn while_flow_has_back_edge() {
        let (_, cfg) = build("while x < 10:\n    x = x + 1\nprint(x)\n");
        assert!(cfg.block_count() >= 4);
        assert!(cfg.has_cycle());
        let loops: Vec<_> = cfg
            .edges()
            .into_iter()
            .filter(|(_, _, l)| *l == Some(EdgeLabel::Loop))
            .collect();
        assert_eq!(loops.len(), 1);
    }

    #[test]
    fn for_flow_uses_next_and_stop() {
        let (_, cfg) = build("for i in items:\n    use(i)\ndone()\n");
        let all: Vec<_> = cfg.edges().into_iter().map(|(_, _, l)| l).collect();
        assert!(all.contains(&Some(EdgeLabel::Next)));
        assert!(all.contains(&Some(EdgeLabel::Stop)));
        assert!(cfg.has_cycle());
    }

    #[test]
    fn await_splits_blocks_with_resume_edge() {
        let (ast, cfg) = build("async def my_func():\n    x = 1\n    y = await some_call()\n    z = 2\n");
        let b_x = block_defining(&ast, &cfg, "x").unwrap();
        let b_y = block_defining(&ast, &cfg, "y").unwrap();
        let b_z = block_defining(&ast, &cfg, "z").unwrap();

        assert_ne!(b_x, b_y);
        assert_ne!(b_y, b_z);
        assert!(cfg.has_edge(b_x, b_y));
        assert_eq!(cfg.edge_label(b_y, b_z), Some(Some(EdgeLabel::Resume)));
    }

    #[test]
    fn async_for_edges() {
        let (_, cfg) = build("async def loop_fn():\n    async for i in data:\n        pass\n");
        let all: Vec<_> = cfg.edges().into_iter().map(|(_, _, l)| l).collect();
        assert!(all.contains(&Some(EdgeLabel::AsyncNext)));
        assert!(all.contains(&Some(EdgeLabel::AsyncStop)));
    }

    #[test]
    fn async_with_enters_body() {
        let (_, cfg) = build("async def ctx():\n    async with lock:\n        pass\n");
        let enters: Vec<_> = cfg
            .edges()
            .into_iter()
            .filter(|(_, _, l)| *l == Some(EdgeLabel::AsyncEnter))
            .collect();
        assert_eq!(enters.len(), 1);
    }

    #[test]
    fn function_entry_edge_from_outer_context() {
        let (_, cfg) = build("def root_fn():\n    pass\n");
        let entry = cfg.entry_block.unwrap();
        let func_blocks: Vec<_> = cfg
            .blocks()
            .filter(|b| b.scope == "root_fn")
            .map(|b| b.id)
            .collect();
        assert!(!func_blocks.is_empty());
        let func_entry = *func_blocks.iter().min().unwrap();
        assert_eq!(cfg.edge_label(entry, func_entry), Some(Some(EdgeLabel::Entry)));
    }

    #[test]
    fn function_params_land_in_entry_block() {
        let (ast, cfg) = build("def f(a, b):\n    pass\n");
        let mut entry_blocks: Vec<_> = cfg.blocks().filter(|b| b.scope == "f").collect();
        entry_blocks.sort_by_key(|b| b.id);
        let entry = entry_blocks.first().unwrap();
        let names: Vec<_> = entry
            .statements
            .iter()
            .filter_map(|&s| match ast.kind(s) {
                NodeKind::Param { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn every_block_reachable_from_entry() {
        let (_, cfg) = build(
            "def f():\n    if c:\n        x = 1\n    return x\n\ndef g():\n    while t:\n        f()\n",
        );
        assert_eq!(cfg.reachable_from_entry(), cfg.block_count());
    }

    #[test]
    fn with_appends_context_to_current_block() {
        let (_, cfg) = build("with open(p) as fh:\n    data = fh.read()\n");
        // no new blocks for a plain with
        let entry = cfg.block(cfg.entry_block.unwrap()).unwrap();
        assert!(entry.statements.len() >= 2);
    }
}
