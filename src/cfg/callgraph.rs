use crate::ast::{Ast, NodeId, NodeKind};
use crate::cfg::ControlFlowGraph;
use crate::errors::ArgusResult;
use crate::pipeline::CancelToken;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Default cap on speculative expansion per call site.
pub const MAX_SPECULATIVE_CANDIDATES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallNodeKind {
    Function,
    Method,
    External,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallEdgeType {
    Direct,
    Speculative,
    Synthetic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mechanism {
    Signal,
    Mq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallEdge {
    #[serde(rename = "type")]
    pub edge_type: CallEdgeType,
    pub mechanism: Option<Mechanism>,
    pub truncated: bool,
}

impl CallEdge {
    pub fn direct() -> Self {
        Self {
            edge_type: CallEdgeType::Direct,
            mechanism: None,
            truncated: false,
        }
    }

    pub fn speculative(truncated: bool) -> Self {
        Self {
            edge_type: CallEdgeType::Speculative,
            mechanism: None,
            truncated,
        }
    }

    pub fn synthetic(mechanism: Mechanism) -> Self {
        Self {
            edge_type: CallEdgeType::Synthetic,
            mechanism: Some(mechanism),
            truncated: false,
        }
    }
}

#[derive(Debug, Clone)]
struct CallNode {
    name: String,
    kind: CallNodeKind,
}

/// Directed graph of callable scopes. Accumulates across files within one
/// scan; node and edge insertion is idempotent so concurrent per-file merges
/// compose.
#[derive(Debug)]
pub struct CallGraph {
    graph: DiGraph<CallNode, CallEdge>,
    index: HashMap<String, NodeIndex>,
    /// ClassName -> method names, for speculative dispatch.
    pub class_hierarchy: BTreeMap<String, BTreeSet<String>>,
    speculative_cap: usize,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::with_cap(MAX_SPECULATIVE_CANDIDATES)
    }

    pub fn with_cap(speculative_cap: usize) -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
            class_hierarchy: BTreeMap::new(),
            speculative_cap: speculative_cap.max(1),
        }
    }

    pub fn speculative_cap(&self) -> usize {
        self.speculative_cap
    }

    pub fn register_class(&mut self, class_name: &str, methods: impl IntoIterator<Item = String>) {
        self.class_hierarchy
            .entry(class_name.to_string())
            .or_default()
            .extend(methods);
    }

    pub fn add_node(&mut self, name: &str, kind: CallNodeKind) -> NodeIndex {
        if let Some(&ix) = self.index.get(name) {
            return ix;
        }
        let ix = self.graph.add_node(CallNode {
            name: name.to_string(),
            kind,
        });
        self.index.insert(name.to_string(), ix);
        ix
    }

    /// Insert an edge; idempotent on `(caller, callee, edge type)`.
    pub fn add_edge(&mut self, caller: &str, callee: &str, edge: CallEdge) {
        let c = self.add_node(caller, CallNodeKind::Function);
        let t = self.add_node(callee, CallNodeKind::Function);
        let exists = self
            .graph
            .edges_connecting(c, t)
            .any(|e| e.weight().edge_type == edge.edge_type);
        if !exists {
            self.graph.add_edge(c, t, edge);
        }
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn has_edge(&self, caller: &str, callee: &str) -> bool {
        match (self.index.get(caller), self.index.get(callee)) {
            (Some(&c), Some(&t)) => self.graph.find_edge(c, t).is_some(),
            _ => false,
        }
    }

    pub fn edge(&self, caller: &str, callee: &str) -> Option<&CallEdge> {
        let (&c, &t) = (self.index.get(caller)?, self.index.get(callee)?);
        self.graph.edges_connecting(c, t).map(|e| e.weight()).next()
    }

    pub fn node_kind(&self, name: &str) -> Option<CallNodeKind> {
        self.index.get(name).map(|&ix| self.graph[ix].kind)
    }

    /// `Class.method` candidates matching `method_name`, class-name order.
    pub fn potential_callees(&self, method_name: &str) -> Vec<String> {
        self.class_hierarchy
            .iter()
            .filter(|(_, methods)| methods.contains(method_name))
            .map(|(class, _)| format!("{class}.{method_name}"))
            .collect()
    }

    pub fn successors(&self, name: &str) -> Vec<String> {
        let Some(&ix) = self.index.get(name) else {
            return Vec::new();
        };
        let mut out: Vec<String> = self
            .graph
            .neighbors_directed(ix, Outgoing)
            .map(|n| self.graph[n].name.clone())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn out_edges(&self, name: &str) -> Vec<(String, CallEdge)> {
        let Some(&ix) = self.index.get(name) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(ix, Outgoing)
            .map(|e| (self.graph[e.target()].name.clone(), *e.weight()))
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn nodes(&self) -> Vec<(String, CallNodeKind)> {
        let mut out: Vec<_> = self
            .graph
            .node_indices()
            .map(|ix| (self.graph[ix].name.clone(), self.graph[ix].kind))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn edges(&self) -> Vec<(String, String, CallEdge)> {
        let mut out: Vec<_> = self
            .graph
            .edge_references()
            .map(|e| {
                (
                    self.graph[e.source()].name.clone(),
                    self.graph[e.target()].name.clone(),
                    *e.weight(),
                )
            })
            .collect();
        out.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        out
    }

    /// Strongly connected components, callees-first (reverse topological).
    pub fn sccs(&self) -> Vec<Vec<String>> {
        petgraph::algo::tarjan_scc(&self.graph)
            .into_iter()
            .map(|group| group.into_iter().map(|ix| self.graph[ix].name.clone()).collect())
            .collect()
    }

    /// Fold another graph into this one (cross-file accumulation).
    pub fn merge(&mut self, other: &CallGraph) {
        for (class, methods) in &other.class_hierarchy {
            self.register_class(class, methods.iter().cloned());
        }
        for (name, kind) in other.nodes() {
            self.add_node(&name, kind);
        }
        for (caller, callee, edge) in other.edges() {
            self.add_edge(&caller, &callee, edge);
        }
    }
}

/// Two passes: a definition scan over the AST, then call discovery over CFG
/// block statements.
pub struct CallGraphBuilder<'a> {
    cg: &'a mut CallGraph,
}

impl<'a> CallGraphBuilder<'a> {
    pub fn new(cg: &'a mut CallGraph) -> Self {
        Self { cg }
    }

    /// First pass: register classes/methods and top-level functions.
    pub fn extract_definitions(&mut self, ast: &Ast) {
        self.scan_definitions(ast, ast.root);
    }

    fn scan_definitions(&mut self, ast: &Ast, node: NodeId) {
        match ast.kind(node) {
            NodeKind::ClassDef { name, body } => {
                let methods: Vec<String> = body
                    .iter()
                    .filter_map(|&item| match ast.kind(item) {
                        NodeKind::FunctionDef { name, .. } => Some(name.clone()),
                        _ => None,
                    })
                    .collect();
                self.cg.register_class(name, methods);
                for &item in body {
                    self.scan_definitions(ast, item);
                }
            }
            NodeKind::Module { body } => {
                for &item in body {
                    if let NodeKind::FunctionDef { name, .. } = ast.kind(item) {
                        self.cg.add_node(name, CallNodeKind::Function);
                    }
                    self.scan_definitions(ast, item);
                }
            }
            _ => {
                let mut kids = Vec::new();
                ast.for_each_child(node, &mut |c| kids.push(c));
                for c in kids {
                    self.scan_definitions(ast, c);
                }
            }
        }
    }

    /// Second pass: scan CFG blocks for calls and add edges.
    pub fn build_from_cfg(
        &mut self,
        ast: &Ast,
        cfg: &ControlFlowGraph,
        cancel: &CancelToken,
    ) -> ArgusResult<()> {
        self.cg.add_node(&cfg.name, CallNodeKind::Function);

        for block in cfg.blocks() {
            cancel.check()?;
            let caller = block.scope.clone();
            self.cg.add_node(&caller, CallNodeKind::Function);

            for &stmt in &block.statements {
                for call in ast.collect_calls(stmt) {
                    self.process_call(ast, &caller, call);
                }
            }
        }
        Ok(())
    }

    fn process_call(&mut self, ast: &Ast, caller: &str, call: NodeId) {
        let NodeKind::Call { func, .. } = ast.kind(call) else {
            return;
        };

        match ast.kind(*func) {
            NodeKind::Name { id, .. } => {
                self.cg.add_node(id, CallNodeKind::Function);
                self.cg.add_edge(caller, id, CallEdge::direct());
            }
            NodeKind::Attribute { attr, .. } => {
                let candidates = self.cg.potential_callees(attr);
                if candidates.is_empty() {
                    // Untracked receiver: external method node.
                    let callee = format!("?.{attr}");
                    self.cg.add_node(&callee, CallNodeKind::External);
                    self.cg.add_edge(caller, &callee, CallEdge::direct());
                    return;
                }

                let cap = self.cg.speculative_cap();
                let truncated = candidates.len() > cap;
                if truncated {
                    debug!(
                        target: "callgraph",
                        "speculative expansion for `{attr}` truncated: {} candidates, cap {cap}",
                        candidates.len()
                    );
                }
                for cand in candidates.into_iter().take(cap) {
                    self.cg.add_node(&cand, CallNodeKind::Method);
                    self.cg.add_edge(caller, &cand, CallEdge::speculative(truncated));
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

    fn build_cg(src: &str) -> CallGraph {
        build_cg_named(src, "test_module")
    }

    fn build_cg_named(src: &str, name: &str) -> CallGraph {
        let ast = parse_module(src.as_bytes()).unwrap();
        let cancel = CancelToken::new();
        let mut cg = CallGraph::new();
        let mut builder = CallGraphBuilder::new(&mut cg);
        builder.extract_definitions(&ast);
        let cfg = CfgBuilder::build(&ast, name, ast.root, &cancel).unwrap();
        builder.build_from_cfg(&ast, &cfg, &cancel).unwrap();
        cg
    }

    #[test]
    fn direct_function_call() {
        let cg = build_cg("def foo():\n    pass\n\ndef bar():\n    foo()\n\nbar()\n");

        assert!(cg.has_node("foo"));
        assert!(cg.has_node("bar"));
        assert!(cg.has_node("test_module"));

        assert!(cg.has_edge("bar", "foo"));
        assert!(cg.has_edge("test_module", "bar"));
    }

    #[test]
    fn speculative_method_call() {
        let src = "class Dog:\n    def speak(self):\n        pass\n\nclass Cat:\n    def speak(self):\n        pass\n\ndef make_noise(animal):\n    animal.speak()\n";
        let cg = build_cg(src);

        assert!(cg.class_hierarchy.contains_key("Dog"));
        assert!(cg.class_hierarchy.contains_key("Cat"));
        assert!(cg.class_hierarchy["Dog"].contains("speak"));

        assert!(cg.has_edge("make_noise", "Dog.speak"));
        assert!(cg.has_edge("make_noise", "Cat.speak"));
        assert_eq!(
            cg.edge("make_noise", "Dog.speak").unwrap().edge_type,
            CallEdgeType::Speculative
        );
    }

    #[test]
    fn external_method_call() {
        let cg = build_cg("def process(data):\n    data.unknown_method()\n");

        assert!(cg.has_edge("process", "?.unknown_method"));
        assert_eq!(
            cg.node_kind("?.unknown_method"),
            Some(CallNodeKind::External)
        );
        assert_eq!(
            cg.edge("process", "?.unknown_method").unwrap().edge_type,
            CallEdgeType::Direct
        );
    }

    #[test]
    fn nested_function_scope() {
        let src = "def outer():\n    def inner():\n        target()\n    inner()\n\ndef target():\n    pass\n";
        let cg = build_cg(src);

        assert!(cg.has_edge("inner", "target"));
        assert!(cg.has_edge("outer", "inner"));
    }

    #[test]
    fn speculative_expansion_honors_cap() {
        let mut src = String::new();
        for c in ["A", "B", "C", "D", "E", "F", "G"] {
            src.push_str(&format!("class {c}:\n    def common(self): pass\n"));
        }
        src.push_str("def trigger(obj):\n    obj.common()\n");
        let cg = build_cg(&src);

        assert_eq!(MAX_SPECULATIVE_CANDIDATES, 5);

        let spec_edges: Vec<_> = cg
            .out_edges("trigger")
            .into_iter()
            .filter(|(_, e)| e.edge_type == CallEdgeType::Speculative)
            .collect();

        assert_eq!(spec_edges.len(), MAX_SPECULATIVE_CANDIDATES);
        for (target, edge) in &spec_edges {
            assert!(target.ends_with(".common"));
            assert!(edge.truncated);
        }

        // Deterministic first-K by class name.
        let mut targets: Vec<_> = spec_edges.iter().map(|(t, _)| t.clone()).collect();
        targets.sort();
        assert_eq!(
            targets,
            vec!["A.common", "B.common", "C.common", "D.common", "E.common"]
        );
    }

    #[test]
    fn edge_insertion_is_idempotent() {
        let cg = build_cg("def a():\n    b()\n    b()\n\ndef b():\n    pass\n");
        let edges: Vec<_> = cg
            .out_edges("a")
            .into_iter()
            .filter(|(t, _)| t == "b")
            .collect();
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn merge_accumulates_idempotently() {
        let a = build_cg_named("def f():\n    g()\n", "mod_a");
        let b = build_cg_named("def g():\n    pass\n", "mod_b");
        let mut merged = CallGraph::new();
        merged.merge(&a);
        merged.merge(&b);
        merged.merge(&a); // re-merge must not duplicate
        assert!(merged.has_edge("f", "g"));
        let edges: Vec<_> = merged
            .out_edges("f")
            .into_iter()
            .filter(|(t, _)| t == "g")
            .collect();
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn sccs_come_callees_first() {
        let cg = build_cg("def leaf():\n    pass\n\ndef mid():\n    leaf()\n\ndef top():\n    mid()\n");
        let sccs = cg.sccs();
        let pos = |name: &str| {
            sccs.iter()
                .position(|g| g.iter().any(|n| n == name))
                .unwrap()
        };
        assert!(pos("leaf") < pos("mid"));
        assert!(pos("mid") < pos("top"));
    }
}
