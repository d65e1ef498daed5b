use crate::ast::{Ast, NameCtx, NodeId, NodeKind};
use crate::cfg::ssa::{SsaDef, SsaName, SsaResult};
use crate::cfg::{BlockId, ControlFlowGraph, EdgeLabel};
use crate::errors::ArgusResult;
use crate::pipeline::CancelToken;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Source sensitivity, ordered least to most sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    General,
    UserInput,
    AuthToken,
    Secret,
}

impl Sensitivity {
    /// Heuristic classification from a source's qualified name.
    pub fn infer(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if ["secret", "password", "passwd", "private_key", "credential"]
            .iter()
            .any(|k| lower.contains(k))
        {
            Sensitivity::Secret
        } else if ["token", "auth", "session", "cookie"]
            .iter()
            .any(|k| lower.contains(k))
        {
            Sensitivity::AuthToken
        } else if ["input", "request", "recv", "env", "arg", "stdin"]
            .iter()
            .any(|k| lower.contains(k))
        {
            Sensitivity::UserInput
        } else {
            Sensitivity::General
        }
    }

    pub fn score(self) -> f64 {
        match self {
            Sensitivity::General => 1.0,
            Sensitivity::UserInput => 2.0,
            Sensitivity::AuthToken => 2.5,
            Sensitivity::Secret => 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub sensitivity: Sensitivity,
}

impl SourceSpec {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        let sensitivity = Sensitivity::infer(&name);
        Self { name, sensitivity }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkSpec {
    pub name: String,
    pub cwe_id: Option<String>,
}

impl SinkSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cwe_id: None,
        }
    }

    pub fn with_cwe(name: impl Into<String>, cwe: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cwe_id: Some(cwe.into()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaintConfiguration {
    pub sources: Vec<SourceSpec>,
    pub sinks: Vec<SinkSpec>,
    pub sanitizers: Vec<String>,
}

impl TaintConfiguration {
    pub fn source(&self, name: &str) -> Option<&SourceSpec> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn sink(&self, name: &str) -> Option<&SinkSpec> {
        self.sinks.iter().find(|s| s.name == name)
    }

    pub fn is_source(&self, name: &str) -> bool {
        self.source(name).is_some()
    }

    pub fn is_sink(&self, name: &str) -> bool {
        self.sink(name).is_some()
    }

    pub fn is_sanitizer(&self, name: &str) -> bool {
        self.sanitizers.iter().any(|s| s == name)
    }

    /// Fold another configuration in, deduplicating by name.
    pub fn extend(&mut self, other: TaintConfiguration) {
        for s in other.sources {
            if !self.is_source(&s.name) {
                self.sources.push(s);
            }
        }
        for s in other.sinks {
            if !self.is_sink(&s.name) {
                self.sinks.push(s);
            }
        }
        for s in other.sanitizers {
            if !self.is_sanitizer(&s) {
                self.sanitizers.push(s);
            }
        }
    }
}

/// A reported source→sink flow; `path` runs from the version carrying the
/// source value to the version reaching the sink argument.
#[derive(Debug, Clone, Serialize)]
pub struct TaintFlow {
    pub source_name: String,
    pub sink_name: String,
    pub path: Vec<SsaName>,
    pub implicit: bool,
    pub sensitivity: Sensitivity,
    pub sanitizers_crossed: Vec<String>,
}

/// How a tainted version came to be, for backward slicing.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Trace {
    SourceCall { source: String },
    Derived { inputs: BTreeSet<SsaName> },
    PhiMerge { inputs: BTreeSet<SsaName> },
    ImplicitRoot { control: SsaName },
}

#[derive(Debug, Clone)]
struct TaintEntry {
    source: String,
    implicit: bool,
    crossed: BTreeSet<String>,
    trace: Trace,
}

#[derive(Debug, Default, Clone)]
struct Eval {
    tainted: bool,
    implicit: bool,
    source: Option<String>,
    inputs: BTreeSet<SsaName>,
    crossed: BTreeSet<String>,
}

impl Eval {
    fn absorb(&mut self, other: Eval) {
        self.tainted |= other.tainted;
        self.implicit |= other.implicit;
        if self.source.is_none() {
            self.source = other.source;
        }
        self.inputs.extend(other.inputs);
        self.crossed.extend(other.crossed);
    }
}

pub struct TaintEngine<'a> {
    ast: &'a Ast,
    cfg: &'a ControlFlowGraph,
    ssa: &'a SsaResult,
    config: &'a TaintConfiguration,
    state: BTreeMap<SsaName, TaintEntry>,
    /// block -> versions defined there (statements and Φs)
    defs_by_block: HashMap<BlockId, Vec<SsaName>>,
}

impl<'a> TaintEngine<'a> {
    pub fn analyze(
        ast: &'a Ast,
        cfg: &'a ControlFlowGraph,
        ssa: &'a SsaResult,
        config: &'a TaintConfiguration,
        cancel: &CancelToken,
    ) -> ArgusResult<Vec<TaintFlow>> {
        let mut defs_by_block: HashMap<BlockId, Vec<SsaName>> = HashMap::new();
        for (name, def) in &ssa.version_defs {
            let block = match def {
                SsaDef::Stmt { block, .. } | SsaDef::Phi { block, .. } => *block,
            };
            defs_by_block.entry(block).or_default().push(name.clone());
        }
        for names in defs_by_block.values_mut() {
            names.sort();
        }

        let mut engine = TaintEngine {
            ast,
            cfg,
            ssa,
            config,
            state: BTreeMap::new(),
            defs_by_block,
        };

        engine.fixed_point(cancel)?;
        Ok(engine.collect_flows())
    }

    /// Monotone forward propagation to quiescence.
    fn fixed_point(&mut self, cancel: &CancelToken) -> ArgusResult<()> {
        let block_ids = self.cfg.block_ids();
        loop {
            cancel.check()?;
            let mut changed = false;

            for &block_id in &block_ids {
                changed |= self.propagate_phis(block_id);
                changed |= self.propagate_statements(block_id);
            }
            for &block_id in &block_ids {
                changed |= self.mark_implicit_region(block_id);
            }

            if !changed {
                break;
            }
        }
        debug!(target: "taint", "fixed point reached — {} tainted versions", self.state.len());
        Ok(())
    }

    fn propagate_phis(&mut self, block_id: BlockId) -> bool {
        let Some(block) = self.cfg.block(block_id) else {
            return false;
        };
        let mut changed = false;

        for phi in &block.phi_nodes {
            let tainted_ops: BTreeSet<SsaName> = phi
                .operands
                .values()
                .filter(|v| self.state.contains_key(*v))
                .cloned()
                .collect();
            if tainted_ops.is_empty() {
                continue;
            }

            let implicit = tainted_ops
                .iter()
                .any(|v| self.state.get(v).map(|e| e.implicit).unwrap_or(false));
            let source = tainted_ops
                .iter()
                .find_map(|v| self.state.get(v).map(|e| e.source.clone()))
                .unwrap_or_default();
            let crossed: BTreeSet<String> = tainted_ops
                .iter()
                .filter_map(|v| self.state.get(v))
                .flat_map(|e| e.crossed.iter().cloned())
                .collect();

            changed |= self.taint(
                phi.result.clone(),
                TaintEntry {
                    source,
                    implicit,
                    crossed,
                    trace: Trace::PhiMerge {
                        inputs: tainted_ops,
                    },
                },
            );
        }
        changed
    }

    fn propagate_statements(&mut self, block_id: BlockId) -> bool {
        let Some(block) = self.cfg.block(block_id) else {
            return false;
        };
        let statements = block.statements.clone();
        let mut changed = false;

        for &stmt in &statements {
            match self.ast.kind(stmt).clone() {
                NodeKind::Assign { targets, value } => {
                    let eval = self.eval(value);
                    changed |= self.assign_targets(&targets, eval);
                }
                NodeKind::AugAssign { target, value } => {
                    let mut eval = self.eval(value);
                    // the old version of the target is a use
                    eval.absorb(self.eval(target));
                    changed |= self.assign_targets(&[target], eval);
                }
                // Loop targets: bare store statements fed by the sibling
                // iterator expression in the same header block.
                NodeKind::Name {
                    ctx: NameCtx::Store,
                    ..
                }
                | NodeKind::TupleBind { .. }
                    if !self.ast.collect_names(stmt, NameCtx::Store).is_empty() =>
                {
                    let mut eval = Eval::default();
                    for &other in &statements {
                        if other != stmt {
                            eval.absorb(self.eval(other));
                        }
                    }
                    if eval.tainted {
                        changed |= self.assign_targets(&[stmt], eval);
                    }
                }
                _ => {}
            }
        }
        changed
    }

    fn assign_targets(&mut self, targets: &[NodeId], eval: Eval) -> bool {
        if !eval.tainted {
            return false;
        }
        let mut changed = false;

        let trace = if eval.inputs.is_empty() {
            Trace::SourceCall {
                source: eval.source.clone().unwrap_or_default(),
            }
        } else {
            Trace::Derived {
                inputs: eval.inputs.clone(),
            }
        };

        for &target in targets {
            for name_node in self.ast.collect_names(target, NameCtx::Store) {
                if let Some(version) = self.ssa.ssa_map.get(&name_node) {
                    changed |= self.taint(
                        version.clone(),
                        TaintEntry {
                            source: eval.source.clone().unwrap_or_default(),
                            implicit: eval.implicit,
                            crossed: eval.crossed.clone(),
                            trace: trace.clone(),
                        },
                    );
                }
            }
        }
        changed
    }

    /// Insert or monotonically widen a taint entry.
    fn taint(&mut self, version: SsaName, entry: TaintEntry) -> bool {
        match self.state.get_mut(&version) {
            None => {
                self.state.insert(version, entry);
                true
            }
            Some(existing) => {
                let mut changed = false;
                if entry.implicit && !existing.implicit {
                    existing.implicit = true;
                    changed = true;
                }
                for c in entry.crossed {
                    changed |= existing.crossed.insert(c);
                }
                // Widen data-flow traces as more inputs become tainted.
                if let (
                    Trace::Derived { inputs: new } | Trace::PhiMerge { inputs: new },
                    Trace::Derived { inputs: old } | Trace::PhiMerge { inputs: old },
                ) = (&entry.trace, &mut existing.trace)
                {
                    for i in new {
                        changed |= old.insert(i.clone());
                    }
                }
                changed
            }
        }
    }

    /// Taint of an expression subtree.
    fn eval(&self, node: NodeId) -> Eval {
        match self.ast.kind(node) {
            NodeKind::Name { .. } => {
                let mut eval = Eval::default();
                if let Some(version) = self.ssa.ssa_map.get(&node)
                    && let Some(entry) = self.state.get(version)
                {
                    eval.tainted = true;
                    eval.implicit = entry.implicit;
                    eval.source = Some(entry.source.clone());
                    eval.inputs.insert(version.clone());
                    eval.crossed.extend(entry.crossed.iter().cloned());
                }
                eval
            }
            NodeKind::Call { args, keywords, .. } => {
                let name = self.ast.callee_name(node).unwrap_or_default();

                let mut arg_eval = Eval::default();
                for &a in args {
                    arg_eval.absorb(self.eval(a));
                }
                for (_, v) in keywords {
                    arg_eval.absorb(self.eval(*v));
                }

                if self.config.is_sanitizer(&name) {
                    // The sanitizer launders its arguments; the cut is
                    // remembered so surviving sibling flows can report it.
                    let mut clean = Eval::default();
                    if arg_eval.tainted {
                        clean.crossed.insert(name);
                        clean.crossed.extend(arg_eval.crossed);
                    }
                    return clean;
                }

                if let Some(source) = self.config.source(&name) {
                    let mut eval = Eval {
                        tainted: true,
                        source: Some(source.name.clone()),
                        ..Default::default()
                    };
                    // arguments may add data inputs (rare, e.g. source(x))
                    eval.crossed.extend(arg_eval.crossed);
                    return eval;
                }

                arg_eval
            }
            NodeKind::Constant { .. } | NodeKind::Opaque => Eval::default(),
            _ => {
                let mut eval = Eval::default();
                let mut kids = Vec::new();
                self.ast.for_each_child(node, &mut |c| kids.push(c));
                for c in kids {
                    eval.absorb(self.eval(c));
                }
                eval
            }
        }
    }

    /// Flag every definition inside the dominance region of a branch whose
    /// condition uses a tainted version. Marks persist; nothing is halted.
    fn mark_implicit_region(&mut self, block_id: BlockId) -> bool {
        if self.cfg.out_degree(block_id) < 2 {
            return false;
        }

        // Condition taint: any tainted load in the branch block itself.
        let Some(block) = self.cfg.block(block_id) else {
            return false;
        };
        let mut control: Option<SsaName> = None;
        for &stmt in &block.statements {
            for name_node in self.ast.collect_names(stmt, NameCtx::Load) {
                if let Some(version) = self.ssa.ssa_map.get(&name_node)
                    && self.state.contains_key(version)
                {
                    control = Some(version.clone());
                    break;
                }
            }
            if control.is_some() {
                break;
            }
        }
        let Some(control) = control else {
            return false;
        };

        let is_loop_header = self
            .cfg
            .predecessors(block_id)
            .iter()
            .any(|&p| self.cfg.edge_label(p, block_id) == Some(Some(EdgeLabel::Loop)));

        let mut changed = false;
        for succ in self.cfg.successors(block_id) {
            // Join blocks (two or more predecessors) are past the region;
            // loop exits escape the loop condition's control.
            if self.cfg.predecessors(succ).len() != 1 {
                continue;
            }
            if is_loop_header {
                let label = self.cfg.edge_label(block_id, succ).flatten();
                if matches!(
                    label,
                    Some(EdgeLabel::False) | Some(EdgeLabel::Stop) | Some(EdgeLabel::AsyncStop)
                ) {
                    continue;
                }
            }

            // Dominator subtree of the conditional successor.
            let mut stack = vec![succ];
            while let Some(b) = stack.pop() {
                if let Some(children) = self.ssa.dom_children.get(&b) {
                    stack.extend(children.iter().copied());
                }
                let Some(defined) = self.defs_by_block.get(&b) else {
                    continue;
                };
                for version in defined.clone() {
                    let entry = TaintEntry {
                        source: self
                            .state
                            .get(&control)
                            .map(|e| e.source.clone())
                            .unwrap_or_default(),
                        implicit: true,
                        crossed: BTreeSet::new(),
                        trace: Trace::ImplicitRoot {
                            control: control.clone(),
                        },
                    };
                    changed |= self.taint(version, entry);
                }
            }
        }
        changed
    }

    // ---------------------------------------------------------------------
    //  Sink detection + backward slicing
    // ---------------------------------------------------------------------

    fn collect_flows(&self) -> Vec<TaintFlow> {
        let mut flows = Vec::new();
        let mut seen: BTreeSet<(String, String, Vec<SsaName>)> = BTreeSet::new();

        for block in self.cfg.blocks() {
            for &stmt in &block.statements {
                for call in self.ast.collect_calls(stmt) {
                    let Some(name) = self.ast.callee_name(call) else {
                        continue;
                    };
                    let Some(_sink) = self.config.sink(&name) else {
                        continue;
                    };
                    let NodeKind::Call { args, keywords, .. } = self.ast.kind(call) else {
                        continue;
                    };

                    let mut arg_nodes: Vec<NodeId> = args.clone();
                    arg_nodes.extend(keywords.iter().map(|(_, v)| *v));

                    for arg in arg_nodes {
                        let eval = self.eval(arg);
                        if !eval.tainted {
                            continue;
                        }
                        self.emit_flows_for_arg(&name, &eval, &mut flows, &mut seen);
                    }
                }
            }
        }

        flows
    }

    fn emit_flows_for_arg(
        &self,
        sink_name: &str,
        eval: &Eval,
        flows: &mut Vec<TaintFlow>,
        seen: &mut BTreeSet<(String, String, Vec<SsaName>)>,
    ) {
        // Direct `sink(source())` nesting has no carrier version.
        if eval.inputs.is_empty() {
            if let Some(source) = &eval.source {
                let key = (source.clone(), sink_name.to_string(), Vec::new());
                if seen.insert(key) {
                    flows.push(self.make_flow(source, sink_name, Vec::new(), eval.implicit, &eval.crossed));
                }
            }
            return;
        }

        for carrier in &eval.inputs {
            let path = self.backward_slice(carrier);
            let members_implicit = self
                .state
                .get(carrier)
                .map(|e| e.implicit)
                .unwrap_or(false);

            let mut crossed: BTreeSet<String> = eval.crossed.clone();
            let mut sources: BTreeSet<String> = BTreeSet::new();
            for member in &path {
                if let Some(entry) = self.state.get(member) {
                    crossed.extend(entry.crossed.iter().cloned());
                    if let Trace::SourceCall { source } = &entry.trace {
                        sources.insert(source.clone());
                    }
                }
            }
            if sources.is_empty()
                && let Some(entry) = self.state.get(carrier)
                && !entry.source.is_empty()
            {
                sources.insert(entry.source.clone());
            }

            for source in sources {
                let key = (source.clone(), sink_name.to_string(), path.clone());
                if seen.insert(key) {
                    flows.push(self.make_flow(&source, sink_name, path.clone(), members_implicit, &crossed));
                }
            }
        }
    }

    fn make_flow(
        &self,
        source: &str,
        sink: &str,
        path: Vec<SsaName>,
        implicit: bool,
        crossed: &BTreeSet<String>,
    ) -> TaintFlow {
        let sensitivity = self
            .config
            .source(source)
            .map(|s| s.sensitivity)
            .unwrap_or_else(|| Sensitivity::infer(source));
        TaintFlow {
            source_name: source.to_string(),
            sink_name: sink.to_string(),
            path,
            implicit,
            sensitivity,
            sanitizers_crossed: crossed.iter().cloned().collect(),
        }
    }

    /// Def-chain slice from the sink-argument version back to its sources,
    /// Φ fan-in merged into one evidence path in definition order.
    fn backward_slice(&self, carrier: &SsaName) -> Vec<SsaName> {
        let mut order = Vec::new();
        let mut visited = BTreeSet::new();
        self.slice_visit(carrier, &mut visited, &mut order);
        order
    }

    fn slice_visit(
        &self,
        name: &SsaName,
        visited: &mut BTreeSet<SsaName>,
        order: &mut Vec<SsaName>,
    ) {
        if !visited.insert(name.clone()) {
            return;
        }
        if let Some(entry) = self.state.get(name) {
            match &entry.trace {
                Trace::SourceCall { .. } => {}
                Trace::Derived { inputs } | Trace::PhiMerge { inputs } => {
                    for input in inputs {
                        self.slice_visit(input, visited, order);
                    }
                }
                Trace::ImplicitRoot { control } => {
                    self.slice_visit(control, visited, order);
                }
            }
        }
        order.push(name.clone());
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
    use crate::cfg::ssa::SsaTransformer;

    fn analyze(src: &str, config: &TaintConfiguration) -> Vec<TaintFlow> {
        let ast = parse_module(src.as_bytes()).unwrap();
        let cancel = CancelToken::new();
        let mut cfg = CfgBuilder::build(&ast, "test", ast.root, &cancel).unwrap();
        let ssa = SsaTransformer::transform(&ast, &mut cfg, &cancel).unwrap();
        TaintEngine::analyze(&ast, &cfg, &ssa, config, &cancel).unwrap()
    }

    fn basic_config() -> TaintConfiguration {
        TaintConfiguration {
            sources: vec![SourceSpec::named("source")],
            sinks: vec![SinkSpec::named("sink")],
            sanitizers: vec![],
        }
    }

    #[test]
    fn linear_assignment_chain_is_flagged() {
        let flows = analyze("x = source()\ny = x\nsink(y)\n", &basic_config());
        assert_eq!(flows.len(), 1);
        let flow = &flows[0];
        assert_eq!(flow.source_name, "source");
        assert_eq!(flow.sink_name, "sink");
        assert_eq!(flow.path.last().map(String::as_str), Some("y_1"));
        assert!(!flow.implicit);
    }

    #[test]
    fn sanitizer_cuts_the_flow() {
        let config = TaintConfiguration {
            sources: vec![SourceSpec::named("source")],
            sinks: vec![SinkSpec::named("sink")],
            sanitizers: vec!["html.escape".to_string()],
        };
        let flows = analyze("x = source()\ny = html.escape(x)\nsink(y)\n", &config);
        assert!(flows.is_empty());
    }

    #[test]
    fn implicit_flow_via_branch() {
        let src = "def foo():\n    secret = source()\n    if secret:\n        x = 1\n    else:\n        x = 2\n    sink(x)\n    y = secret\n    sink(y)\n";
        let flows = analyze(src, &basic_config());

        assert!(flows.len() >= 2, "expected at least 2 flows, got {}", flows.len());
        assert!(flows.iter().any(|f| f.implicit));
        assert!(flows.iter().any(|f| !f.implicit));
        for f in &flows {
            assert_eq!(f.source_name, "source");
            assert_eq!(f.sink_name, "sink");
        }
    }

    #[test]
    fn phi_backward_slice_carries_both_branches() {
        let src = "def foo(c):\n    x = source()\n    if c:\n        y = x\n    else:\n        y = x\n    z = y\n    sink(z)\n";
        let flows = analyze(src, &basic_config());

        assert_eq!(flows.len(), 1);
        let path = &flows[0].path;
        assert_eq!(path.first().map(String::as_str), Some("x_1"));
        assert_eq!(path.last().map(String::as_str), Some("z_1"));
        assert!(path.iter().any(|v| v == "y_1"));
        assert!(path.iter().any(|v| v == "y_2"));
        assert!(path.iter().any(|v| v == "y_3"));
    }

    #[test]
    fn taint_survives_a_loop() {
        let src = "x = source()\nwhile x:\n    x = x + 1\nsink(x)\n";
        let flows = analyze(src, &basic_config());
        assert!(!flows.is_empty());
    }

    #[test]
    fn sanitized_sibling_does_not_mask_dirty_flow() {
        let config = TaintConfiguration {
            sources: vec![SourceSpec::named("source")],
            sinks: vec![SinkSpec::named("sink")],
            sanitizers: vec!["html.escape".to_string()],
        };
        let src = "x = source()\ny = source()\nclean = html.escape(y)\nsink(x)\nsink(clean)\n";
        let flows = analyze(src, &config);
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].path.last().map(String::as_str), Some("x_1"));
    }

    #[test]
    fn surviving_flow_records_crossed_sanitizer() {
        let config = TaintConfiguration {
            sources: vec![SourceSpec::named("source")],
            sinks: vec![SinkSpec::named("sink")],
            sanitizers: vec!["html.escape".to_string()],
        };
        // Taint survives through the second operand while the sanitizer
        // launders the first.
        let src = "x = source()\ny = concat(html.escape(x), x)\nsink(y)\n";
        let flows = analyze(src, &config);
        assert_eq!(flows.len(), 1);
        assert!(
            flows[0]
                .sanitizers_crossed
                .iter()
                .any(|s| s == "html.escape")
        );
    }

    #[test]
    fn sink_of_directly_nested_source() {
        let flows = analyze("sink(source())\n", &basic_config());
        assert_eq!(flows.len(), 1);
        assert!(flows[0].path.is_empty());
    }

    #[test]
    fn sensitivity_inference_orders_kinds() {
        assert_eq!(Sensitivity::infer("secret_source"), Sensitivity::Secret);
        assert_eq!(Sensitivity::infer("get_auth_token"), Sensitivity::AuthToken);
        assert_eq!(Sensitivity::infer("user_input"), Sensitivity::UserInput);
        assert_eq!(Sensitivity::infer("mystery"), Sensitivity::General);
        assert!(Sensitivity::Secret > Sensitivity::UserInput);
    }

    #[test]
    fn code_after_loop_is_not_implicit() {
        let src = "t = source()\nwhile t:\n    pass\nx = 1\nsink(x)\n";
        let flows = analyze(src, &basic_config());
        assert!(flows.is_empty(), "loop exits must not inherit the loop condition's taint");
    }
}
