use crate::cfg::callgraph::CallGraph;
use crate::cfg::signature::FunctionSignature;
use crate::errors::ArgusResult;
use crate::pipeline::CancelToken;
use std::collections::BTreeMap;
use tracing::debug;

/// Bottom-up effect propagation along the call graph.
///
/// Walks strongly connected components callees-first; singleton components
/// take their callees' effect sets once, cycles iterate to a fixed point
/// within the component. The effect lattice is finite (sets of strings drawn
/// from the signatures), so each component converges in at most |SCC| rounds.
pub struct HierarchicalSummarizer;

impl HierarchicalSummarizer {
    pub fn summarize(
        cg: &CallGraph,
        signatures: impl IntoIterator<Item = FunctionSignature>,
        cancel: &CancelToken,
    ) -> ArgusResult<BTreeMap<String, FunctionSignature>> {
        let mut summaries: BTreeMap<String, FunctionSignature> = signatures
            .into_iter()
            .map(|sig| (sig.name.clone(), sig))
            .collect();

        for scc in cg.sccs() {
            cancel.check()?;

            let mut members: Vec<String> = scc
                .into_iter()
                .filter(|name| summaries.contains_key(name))
                .collect();
            members.sort();
            if members.is_empty() {
                continue;
            }

            loop {
                cancel.check()?;
                let mut changed = false;

                for member in &members {
                    let callees = cg.successors(member);
                    let mut effects = Vec::new();
                    let mut sinks = Vec::new();
                    for callee in &callees {
                        if callee == member {
                            continue;
                        }
                        if let Some(callee_sig) = summaries.get(callee) {
                            effects.extend(callee_sig.side_effects.iter().cloned());
                            sinks.extend(callee_sig.taint_sinks.iter().cloned());
                        }
                    }

                    if let Some(sig) = summaries.get_mut(member) {
                        for effect in effects {
                            changed |= sig.side_effects.insert(effect);
                        }
                        for sink in sinks {
                            if !sig.taint_sinks.contains(&sink) {
                                sig.taint_sinks.push(sink);
                                changed = true;
                            }
                        }
                    }
                }

                if !changed {
                    break;
                }
            }
        }

        debug!(target: "summarizer", "summarized {} functions", summaries.len());
        Ok(summaries)
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
    use crate::cfg::callgraph::CallGraphBuilder;
    use crate::cfg::signature::SignatureExtractor;
    use crate::taint::{SinkSpec, SourceSpec, TaintConfiguration};

    fn summarize(src: &str, taint: Option<&TaintConfiguration>) -> BTreeMap<String, FunctionSignature> {
        let ast = parse_module(src.as_bytes()).unwrap();
        let cancel = CancelToken::new();
        let cfg = CfgBuilder::build(&ast, "test_hierarchy", ast.root, &cancel).unwrap();

        let mut cg = CallGraph::new();
        let mut builder = CallGraphBuilder::new(&mut cg);
        builder.extract_definitions(&ast);
        builder.build_from_cfg(&ast, &cfg, &cancel).unwrap();

        let sigs = SignatureExtractor::new(&ast, &cfg).extract(taint);
        HierarchicalSummarizer::summarize(&cg, sigs, &cancel).unwrap()
    }

    #[test]
    fn effects_bubble_up_the_hierarchy() {
        let src = "def leaf_func():\n    print(\"leaf\")\n\ndef middle_func():\n    leaf_func()\n    open(\"log.txt\")\n\ndef root_func():\n    middle_func()\n";
        let summaries = summarize(src, None);

        assert!(summaries.contains_key("leaf_func"));
        assert!(summaries.contains_key("middle_func"));
        assert!(summaries.contains_key("root_func"));

        assert!(summaries["leaf_func"].side_effects.contains("io:print"));

        let middle = &summaries["middle_func"];
        assert!(middle.side_effects.contains("io:open"));
        assert!(middle.side_effects.contains("io:print"));

        let root = &summaries["root_func"];
        assert!(root.side_effects.contains("io:open"));
        assert!(root.side_effects.contains("io:print"));
    }

    #[test]
    fn recursion_converges_to_union() {
        let src = "def ping():\n    print(\"p\")\n    pong()\n\ndef pong():\n    open(\"f\")\n    ping()\n";
        let summaries = summarize(src, None);

        for name in ["ping", "pong"] {
            let sig = &summaries[name];
            assert!(sig.side_effects.contains("io:print"), "{name} missing io:print");
            assert!(sig.side_effects.contains("io:open"), "{name} missing io:open");
        }
    }

    #[test]
    fn taint_sinks_propagate_to_callers() {
        let config = TaintConfiguration {
            sources: vec![SourceSpec::named("user_input")],
            sinks: vec![SinkSpec::named("execute")],
            sanitizers: vec![],
        };
        let src = "def low():\n    execute(\"cmd\")\n\ndef high():\n    low()\n";
        let summaries = summarize(src, Some(&config));

        assert!(summaries["low"].taint_sinks.contains(&"call:execute".to_string()));
        assert!(summaries["high"].taint_sinks.contains(&"call:execute".to_string()));
    }

    #[test]
    fn complexity_does_not_propagate() {
        let src = "def branchy(c):\n    if c:\n        pass\n\ndef caller():\n    branchy(1)\n";
        let summaries = summarize(src, None);
        assert_eq!(summaries["caller"].complexity, 1);
        assert!(summaries["branchy"].complexity > 1);
    }
}
