use crate::ast::{Ast, NodeId, NodeKind};
use crate::cfg::callgraph::{CallEdge, CallGraph, Mechanism};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Handlers,
    Triggers,
}

/// Links implicit publish/subscribe flows (message queues, signals) with
/// synthetic call edges.
///
/// Topics match by string literal; signals match by the identifier name of
/// the signal object within the analyzed file. Cross-file resolution is a
/// known incompleteness.
pub struct SyntheticEdgeBuilder<'a> {
    cg: &'a mut CallGraph,
    /// topic/channel -> handler function names
    mq_handlers: BTreeMap<String, BTreeSet<String>>,
    /// signal variable name -> handler function names
    signal_handlers: BTreeMap<String, BTreeSet<String>>,
    current_scope: String,
    mode: Mode,
}

impl<'a> SyntheticEdgeBuilder<'a> {
    pub fn new(cg: &'a mut CallGraph) -> Self {
        Self {
            cg,
            mq_handlers: BTreeMap::new(),
            signal_handlers: BTreeMap::new(),
            current_scope: "global".to_string(),
            mode: Mode::Handlers,
        }
    }

    /// Pass 1 collects subscribers, pass 2 links publishers.
    pub fn process(&mut self, ast: &Ast, module_name: &str) {
        self.current_scope = module_name.to_string();
        self.mode = Mode::Handlers;
        self.visit(ast, ast.root);

        self.current_scope = module_name.to_string();
        self.mode = Mode::Triggers;
        self.visit(ast, ast.root);

        debug!(
            target: "callgraph",
            "synthetic linking done — {} topics, {} signals",
            self.mq_handlers.len(),
            self.signal_handlers.len()
        );
    }

    fn visit(&mut self, ast: &Ast, node: NodeId) {
        if let NodeKind::FunctionDef { name, .. } = ast.kind(node) {
            let prev = std::mem::replace(&mut self.current_scope, name.clone());
            let mut kids = Vec::new();
            ast.for_each_child(node, &mut |c| kids.push(c));
            for c in kids {
                self.visit(ast, c);
            }
            self.current_scope = prev;
            return;
        }

        if matches!(ast.kind(node), NodeKind::Call { .. }) {
            match self.mode {
                Mode::Handlers => self.analyze_handler_registration(ast, node),
                Mode::Triggers => self.analyze_trigger_call(ast, node),
            }
        }

        let mut kids = Vec::new();
        ast.for_each_child(node, &mut |c| kids.push(c));
        for c in kids {
            self.visit(ast, c);
        }
    }

    /// `channel.basic_consume(queue='…', on_message_callback=f)` and
    /// `signal.connect(f)`.
    fn analyze_handler_registration(&mut self, ast: &Ast, call: NodeId) {
        let NodeKind::Call { func, args, keywords } = ast.kind(call) else {
            return;
        };
        let NodeKind::Attribute { value, attr } = ast.kind(*func) else {
            return;
        };

        if attr == "basic_consume" {
            let queue = keyword_value(ast, keywords, "queue");
            let callback = keyword_value(ast, keywords, "on_message_callback");
            if let (Some(queue), Some(callback)) = (queue, callback) {
                self.mq_handlers.entry(queue).or_default().insert(callback);
            }
        }

        if attr == "connect" {
            // The receiver is taken as the signal variable.
            let signal_var = name_of(ast, *value);
            let handler = args.first().and_then(|&a| name_of(ast, a));
            if let (Some(signal_var), Some(handler)) = (signal_var, handler) {
                self.signal_handlers
                    .entry(signal_var)
                    .or_default()
                    .insert(handler);
            }
        }
    }

    /// `channel.basic_publish(..., routing_key='…')` and `signal.send(...)`.
    fn analyze_trigger_call(&mut self, ast: &Ast, call: NodeId) {
        let NodeKind::Call { func, keywords, .. } = ast.kind(call) else {
            return;
        };
        let NodeKind::Attribute { value, attr } = ast.kind(*func) else {
            return;
        };

        if attr == "basic_publish"
            && let Some(topic) = keyword_value(ast, keywords, "routing_key")
            && let Some(handlers) = self.mq_handlers.get(&topic).cloned()
        {
            for handler in handlers {
                self.cg.add_edge(
                    &self.current_scope.clone(),
                    &handler,
                    CallEdge::synthetic(Mechanism::Mq),
                );
            }
        }

        if attr == "send"
            && let Some(signal_var) = name_of(ast, *value)
            && let Some(handlers) = self.signal_handlers.get(&signal_var).cloned()
        {
            for handler in handlers {
                self.cg.add_edge(
                    &self.current_scope.clone(),
                    &handler,
                    CallEdge::synthetic(Mechanism::Signal),
                );
            }
        }
    }
}

/// String literal value or identifier name of a keyword argument.
fn keyword_value(ast: &Ast, keywords: &[(String, NodeId)], key: &str) -> Option<String> {
    let (_, value) = keywords.iter().find(|(k, _)| k == key)?;
    literal_string(ast, *value).or_else(|| name_of(ast, *value))
}

fn literal_string(ast: &Ast, node: NodeId) -> Option<String> {
    match ast.kind(node) {
        NodeKind::Constant { repr } => {
            let trimmed = repr
                .trim_start_matches(['r', 'b', 'f', 'u'])
                .trim_matches(['\'', '"']);
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}

fn name_of(ast: &Ast, node: NodeId) -> Option<String> {
    match ast.kind(node) {
        NodeKind::Name { id, .. } => Some(id.clone()),
        NodeKind::Attribute { attr, .. } => Some(attr.clone()),
        _ => None,
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
    use crate::cfg::callgraph::{CallEdgeType, CallGraphBuilder};
    use crate::pipeline::CancelToken;

    fn build_graph(src: &str) -> CallGraph {
        let ast = parse_module(src.as_bytes()).unwrap();
        let cancel = CancelToken::new();

        let cfg = CfgBuilder::build(&ast, "test_module", ast.root, &cancel).unwrap();

        let mut cg = CallGraph::new();
        let mut cg_builder = CallGraphBuilder::new(&mut cg);
        cg_builder.extract_definitions(&ast);
        cg_builder.build_from_cfg(&ast, &cfg, &cancel).unwrap();

        let mut synth = SyntheticEdgeBuilder::new(&mut cg);
        synth.process(&ast, "test_module");

        cg
    }

    #[test]
    fn signal_connect_and_send_link() {
        let src = "import blinker\n\nmy_signal = blinker.signal('my-event')\n\ndef on_event(sender):\n    pass\n\nmy_signal.connect(on_event)\n\ndef trigger_it():\n    my_signal.send('sender-obj')\n";
        let cg = build_graph(src);

        assert!(cg.has_edge("trigger_it", "on_event"));
        let edge = cg
            .out_edges("trigger_it")
            .into_iter()
            .find(|(t, _)| t == "on_event")
            .map(|(_, e)| e)
            .unwrap();
        assert_eq!(edge.edge_type, CallEdgeType::Synthetic);
        assert_eq!(edge.mechanism, Some(Mechanism::Signal));
    }

    #[test]
    fn mq_consume_and_publish_link() {
        let src = "import pika\n\ndef callback_func(ch, method, properties, body):\n    process_data(body)\n\ndef process_data(d):\n    pass\n\ndef setup_consumer():\n    channel.basic_consume(queue='task_queue', on_message_callback=callback_func)\n\ndef produce_msg():\n    channel.basic_publish(exchange='', routing_key='task_queue', body='Hello')\n";
        let cg = build_graph(src);

        assert!(cg.has_edge("produce_msg", "callback_func"));
        let edge = cg
            .out_edges("produce_msg")
            .into_iter()
            .find(|(t, _)| t == "callback_func")
            .map(|(_, e)| e)
            .unwrap();
        assert_eq!(edge.edge_type, CallEdgeType::Synthetic);
        assert_eq!(edge.mechanism, Some(Mechanism::Mq));
    }

    #[test]
    fn unrelated_topics_do_not_link() {
        let src = "def handler(b):\n    pass\n\ndef setup():\n    ch.basic_consume(queue='queue_a', on_message_callback=handler)\n\ndef producer():\n    ch.basic_publish(routing_key='queue_b', body='x')\n";
        let cg = build_graph(src);
        assert!(!cg.has_edge("producer", "handler"));
    }
}
