use crate::ast::{Ast, NodeKind};
use crate::cfg::{BasicBlock, ControlFlowGraph};
use crate::taint::TaintConfiguration;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Serialize)]
pub struct SignatureInput {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// Per-function interface summary; effect sets are later enriched bottom-up
/// by the summarizer.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionSignature {
    pub name: String,
    pub inputs: Vec<SignatureInput>,
    pub outputs: Vec<String>,
    pub calls: Vec<String>,
    pub complexity: u32,
    pub side_effects: BTreeSet<String>,
    pub taint_sources: Vec<String>,
    pub taint_sinks: Vec<String>,
}

pub struct SignatureExtractor<'a> {
    ast: &'a Ast,
    cfg: &'a ControlFlowGraph,
}

impl<'a> SignatureExtractor<'a> {
    pub fn new(ast: &'a Ast, cfg: &'a ControlFlowGraph) -> Self {
        Self { ast, cfg }
    }

    pub fn extract(&self, taint: Option<&TaintConfiguration>) -> Vec<FunctionSignature> {
        let mut blocks_by_scope: BTreeMap<&str, Vec<&BasicBlock>> = BTreeMap::new();
        for block in self.cfg.blocks() {
            blocks_by_scope.entry(&block.scope).or_default().push(block);
        }

        let mut signatures = Vec::new();
        for (scope, blocks) in blocks_by_scope {
            // The module scope is not a function signature.
            if scope == self.cfg.name {
                continue;
            }
            let Some(&scope_node) = self.cfg.scopes.get(scope) else {
                continue;
            };
            let NodeKind::FunctionDef {
                name,
                params,
                returns,
                ..
            } = self.ast.kind(scope_node)
            else {
                continue;
            };
            signatures.push(self.analyze_function(name, params, returns.as_deref(), &blocks, taint));
        }
        signatures
    }

    fn analyze_function(
        &self,
        name: &str,
        params: &[crate::ast::NodeId],
        returns: Option<&str>,
        blocks: &[&BasicBlock],
        taint: Option<&TaintConfiguration>,
    ) -> FunctionSignature {
        let inputs: Vec<SignatureInput> = params
            .iter()
            .filter_map(|&p| match self.ast.kind(p) {
                NodeKind::Param { name, annotation } => Some(SignatureInput {
                    name: name.clone(),
                    type_name: annotation.clone().unwrap_or_else(|| "Any".to_string()),
                }),
                _ => None,
            })
            .collect();

        let outputs = vec![returns.unwrap_or("Any").to_string()];

        let mut calls: BTreeSet<String> = BTreeSet::new();
        let mut side_effects: BTreeSet<String> = BTreeSet::new();
        let mut taint_sources: BTreeSet<String> = BTreeSet::new();
        let mut taint_sinks: BTreeSet<String> = BTreeSet::new();
        let mut complexity = 0u32;

        for block in blocks {
            if self.cfg.out_degree(block.id) > 1 {
                complexity += 1;
            }

            for &stmt in &block.statements {
                if let NodeKind::Global { names } = self.ast.kind(stmt) {
                    for n in names {
                        side_effects.insert(format!("global:write:{n}"));
                    }
                }

                for call in self.ast.collect_calls(stmt) {
                    let Some(func_name) = self.ast.callee_name(call) else {
                        continue;
                    };

                    if func_name == "print" {
                        side_effects.insert("io:print".to_string());
                    } else if func_name == "open" || func_name == "write" {
                        side_effects.insert(format!("io:{func_name}"));
                    } else if func_name.starts_with("requests.") || func_name.starts_with("urllib.")
                    {
                        side_effects.insert(format!("net:{func_name}"));
                    }

                    if let Some(taint) = taint {
                        if taint.is_source(&func_name) {
                            taint_sources.insert(format!("call:{func_name}"));
                        }
                        if taint.is_sink(&func_name) {
                            taint_sinks.insert(format!("call:{func_name}"));
                        }
                    }

                    calls.insert(func_name);
                }
            }
        }

        FunctionSignature {
            name: name.to_string(),
            inputs,
            outputs,
            calls: calls.into_iter().collect(),
            complexity: complexity + 1, // base path
            side_effects,
            taint_sources: taint_sources.into_iter().collect(),
            taint_sinks: taint_sinks.into_iter().collect(),
        }
    }
}

// -------------------------------------------------------------------------
//  Tests
// -------------------------------------------------------------------------
