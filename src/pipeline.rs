use crate::analysis::ranker::{RankWeights, RankedFlow, RiskRanker};
use crate::ast::{self, Ast, NameCtx};
use crate::cfg::builder::CfgBuilder;
use crate::cfg::callgraph::{CallEdge, CallGraph, CallGraphBuilder, CallNodeKind};
use crate::cfg::signature::{FunctionSignature, SignatureExtractor};
use crate::cfg::ssa::SsaTransformer;
use crate::cfg::synthetic::SyntheticEdgeBuilder;
use crate::cfg::{ControlFlowGraph, EdgeLabel, Finding, Insight};
use crate::errors::{ArgusError, ArgusResult};
use crate::librarian::Librarian;
use crate::oracle::Message;
use crate::scanner::{self, ScannerFinding};
use crate::taint::{TaintConfiguration, TaintEngine, TaintFlow};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Cooperative cancellation, checked at block boundaries and between passes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> ArgusResult<()> {
        if self.is_cancelled() {
            Err(ArgusError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub speculative_cap: usize,
    pub weights: RankWeights,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            speculative_cap: crate::cfg::callgraph::MAX_SPECULATIVE_CANDIDATES,
            weights: RankWeights::default(),
        }
    }
}

pub struct AnalysisContext<'a> {
    pub taint: TaintConfiguration,
    pub options: AnalysisOptions,
    pub librarian: Option<&'a Librarian>,
    pub cancel: CancelToken,
}

// -------------------------------------------------------------------------
//  Per-file result shape (consumed by external reporters)
// -------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct FileStats {
    pub block_count: usize,
    pub edge_count: usize,
    pub var_count: usize,
    pub cg_node_count: usize,
    pub cg_edge_count: usize,
    pub flow_count: usize,
}

#[derive(Debug, Serialize)]
pub struct BlockSummary {
    pub id: u32,
    pub scope: String,
    pub stmt_count: usize,
    pub phis: Vec<String>,
    pub findings: Vec<Finding>,
    pub insights: Vec<Insight>,
}

#[derive(Debug, Serialize)]
pub struct EdgeSummary {
    pub source: u32,
    pub target: u32,
    pub label: Option<EdgeLabel>,
}

#[derive(Debug, Serialize)]
pub struct CallGraphNodeDump {
    pub id: String,
    pub kind: CallNodeKind,
}

#[derive(Debug, Serialize)]
pub struct CallGraphEdgeDump {
    pub source: String,
    pub target: String,
    #[serde(flatten)]
    pub edge: CallEdge,
}

#[derive(Debug, Serialize)]
pub struct CallGraphDump {
    pub nodes: Vec<CallGraphNodeDump>,
    pub edges: Vec<CallGraphEdgeDump>,
}

#[derive(Debug, Serialize)]
pub struct FileReport {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub stats: FileStats,
    pub blocks: Vec<BlockSummary>,
    pub edges: Vec<EdgeSummary>,
    pub call_graph: CallGraphDump,
    pub taint_flows: Vec<TaintFlow>,
    pub rankings: Vec<RankedFlow>,
    pub unmapped: Vec<ScannerFinding>,
    pub signatures: Vec<FunctionSignature>,
}

impl FileReport {
    /// Error placeholder: the scan continues past per-file failures.
    pub fn failed(name: impl Into<String>, error: &ArgusError) -> Self {
        Self {
            name: name.into(),
            error: Some(error.to_string()),
            stats: FileStats {
                block_count: 0,
                edge_count: 0,
                var_count: 0,
                cg_node_count: 0,
                cg_edge_count: 0,
                flow_count: 0,
            },
            blocks: Vec::new(),
            edges: Vec::new(),
            call_graph: CallGraphDump {
                nodes: Vec::new(),
                edges: Vec::new(),
            },
            taint_flows: Vec::new(),
            rankings: Vec::new(),
            unmapped: Vec::new(),
            signatures: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct FileOutcome {
    pub report: FileReport,
    pub call_graph: CallGraph,
}

/// Run the full per-file pass sequence:
/// CFG → scanner mapping → call graph → synthetic edges → SSA →
/// signatures → taint → ranking → cached insights.
pub fn analyze_source(
    module_name: &str,
    file_path: &str,
    source: &[u8],
    findings: Vec<ScannerFinding>,
    ctx: &AnalysisContext<'_>,
) -> ArgusResult<FileOutcome> {
    ctx.cancel.check()?;
    let ast = ast::parse_module(source)?;

    let mut call_graph = CallGraph::with_cap(ctx.options.speculative_cap);
    let mut cg_builder = CallGraphBuilder::new(&mut call_graph);
    cg_builder.extract_definitions(&ast);

    let mut cfg = CfgBuilder::build(&ast, module_name, ast.root, &ctx.cancel)?;

    let unmapped = scanner::map_findings(&ast, &mut cfg, findings, file_path);

    cg_builder.build_from_cfg(&ast, &cfg, &ctx.cancel)?;
    let mut synth = SyntheticEdgeBuilder::new(&mut call_graph);
    synth.process(&ast, module_name);

    ctx.cancel.check()?;
    let ssa = SsaTransformer::transform(&ast, &mut cfg, &ctx.cancel)?;

    let signatures = SignatureExtractor::new(&ast, &cfg).extract(Some(&ctx.taint));

    ctx.cancel.check()?;
    let flows = TaintEngine::analyze(&ast, &cfg, &ssa, &ctx.taint, &ctx.cancel)?;
    let rankings = RiskRanker::new(ctx.options.weights).rank(flows.clone(), &ctx.taint);

    if let Some(librarian) = ctx.librarian {
        attach_cached_insights(&ast, &mut cfg, &ssa, source, file_path, librarian);
    }

    debug!(
        target: "pipeline",
        "{module_name}: {} blocks, {} flows",
        cfg.block_count(),
        flows.len()
    );

    let report = serialize(module_name, &cfg, &ssa.vars, &call_graph, flows, rankings, unmapped, signatures);
    Ok(FileOutcome {
        report,
        call_graph,
    })
}

#[allow(clippy::too_many_arguments)]
fn serialize(
    name: &str,
    cfg: &ControlFlowGraph,
    vars: &std::collections::BTreeSet<String>,
    cg: &CallGraph,
    taint_flows: Vec<TaintFlow>,
    rankings: Vec<RankedFlow>,
    unmapped: Vec<ScannerFinding>,
    signatures: Vec<FunctionSignature>,
) -> FileReport {
    let blocks: Vec<BlockSummary> = cfg
        .blocks()
        .map(|b| BlockSummary {
            id: b.id,
            scope: b.scope.clone(),
            stmt_count: b.statements.len(),
            phis: b.phi_nodes.iter().map(|p| p.to_string()).collect(),
            findings: b.findings.clone(),
            insights: b.insights.clone(),
        })
        .collect();

    let edges: Vec<EdgeSummary> = cfg
        .edges()
        .into_iter()
        .map(|(source, target, label)| EdgeSummary {
            source,
            target,
            label,
        })
        .collect();

    let cg_nodes: Vec<CallGraphNodeDump> = cg
        .nodes()
        .into_iter()
        .map(|(id, kind)| CallGraphNodeDump { id, kind })
        .collect();
    let cg_edges: Vec<CallGraphEdgeDump> = cg
        .edges()
        .into_iter()
        .map(|(source, target, edge)| CallGraphEdgeDump {
            source,
            target,
            edge,
        })
        .collect();

    FileReport {
        name: name.to_string(),
        error: None,
        stats: FileStats {
            block_count: cfg.block_count(),
            edge_count: cfg.edge_count(),
            var_count: vars.len(),
            cg_node_count: cg_nodes.len(),
            cg_edge_count: cg_edges.len(),
            flow_count: taint_flows.len(),
        },
        blocks,
        edges,
        call_graph: CallGraphDump {
            nodes: cg_nodes,
            edges: cg_edges,
        },
        taint_flows,
        rankings,
        unmapped,
        signatures,
    }
}

// -------------------------------------------------------------------------
//  Cached-insight attachment
// -------------------------------------------------------------------------

/// Consult the Librarian for blocks carrying scanner findings. Only cached
/// decisions attach here; invoking the oracle is the caller's business.
fn attach_cached_insights(
    ast: &Ast,
    cfg: &mut ControlFlowGraph,
    ssa: &crate::cfg::ssa::SsaResult,
    source: &[u8],
    file_path: &str,
    librarian: &Librarian,
) {
    let source_lines: Vec<&str> = std::str::from_utf8(source)
        .map(|s| s.lines().collect())
        .unwrap_or_default();

    let block_ids = cfg.block_ids();
    for block_id in block_ids {
        let Some(block) = cfg.block(block_id) else {
            continue;
        };
        if block.findings.is_empty() {
            continue;
        }

        let snippet = block_snippet(ast, block, &source_lines);
        if snippet.is_empty() {
            continue;
        }

        let ssa_context = ssa_context_json(ast, block, ssa);
        let prompt = build_prompt(block, &snippet, file_path, &ssa_context);
        let primary_check = block.findings[0].check_id.clone();
        let snippet_hash = Librarian::snippet_hash(&snippet);

        let cached = librarian
            .query(&prompt)
            .ok()
            .flatten()
            .or_else(|| {
                librarian
                    .query_semantic(&primary_check, &snippet_hash)
                    .ok()
                    .flatten()
            });

        if let Some(decision) = cached
            && let Some(block) = cfg.block_mut(block_id)
        {
            block.insights.push(Insight {
                provider: decision.provider,
                model: decision.model,
                response: decision.response,
                analysis: decision.analysis,
                cached: true,
                snippet,
            });
        }
    }
}

fn block_snippet(ast: &Ast, block: &crate::cfg::BasicBlock, source_lines: &[&str]) -> String {
    let mut min_line = usize::MAX;
    let mut max_line = 0usize;
    for &stmt in &block.statements {
        let span = ast.span(stmt);
        min_line = min_line.min(span.start_line);
        max_line = max_line.max(span.end_line);
    }
    if min_line == usize::MAX || source_lines.is_empty() {
        return String::new();
    }
    let lo = min_line.max(1) - 1;
    let hi = max_line.min(source_lines.len());
    if lo >= hi {
        return String::new();
    }
    source_lines[lo..hi].join("\n")
}

fn ssa_context_json(
    ast: &Ast,
    block: &crate::cfg::BasicBlock,
    ssa: &crate::cfg::ssa::SsaResult,
) -> serde_json::Value {
    let mut defs = std::collections::BTreeSet::new();
    let mut uses = std::collections::BTreeSet::new();

    for &stmt in &block.statements {
        for node in ast.collect_names(stmt, NameCtx::Store) {
            if let Some(version) = ssa.ssa_map.get(&node) {
                defs.insert(version.clone());
            }
        }
        for node in ast.collect_names(stmt, NameCtx::Load) {
            if let Some(version) = ssa.ssa_map.get(&node) {
                uses.insert(version.clone());
            }
        }
    }

    let phis: Vec<String> = block.phi_nodes.iter().map(|p| p.to_string()).collect();
    serde_json::json!({
        "phi_nodes": phis,
        "defs": defs,
        "uses": uses,
    })
}

fn build_prompt(
    block: &crate::cfg::BasicBlock,
    snippet: &str,
    file_path: &str,
    ssa_context: &serde_json::Value,
) -> Vec<Message> {
    let findings = serde_json::to_string_pretty(&block.findings).unwrap_or_default();
    let ssa_summary = serde_json::to_string_pretty(ssa_context).unwrap_or_default();
    let message = format!(
        "You are a security analyst. For each finding, determine whether it is a true positive, \
         false positive, or needs review. Provide a concise rationale and a specific code remediation.\n\
         Respond in JSON with an array under key 'analysis', each item containing:\n\
         - 'check_id': The exact rule ID from the findings.\n\
         - 'verdict': One of ['True Positive', 'False Positive', 'Needs Review'].\n\
         - 'rationale': A brief explanation of why this is a vulnerability or false alarm.\n\
         - 'remediation': A specific code snippet to fix the issue. Do NOT use markdown code blocks in this field.\n\n\
         File: {file_path}\n\
         Block scope: {}\n\
         Block id: {}\n\n\
         SSA context:\n{ssa_summary}\n\n\
         Findings:\n{findings}\n\n\
         Code snippet:\n{snippet}",
        block.scope, block.id
    );
    vec![
        Message::system("You analyze code security findings."),
        Message::user(message),
    ]
}

// -------------------------------------------------------------------------
//  Tests
// -------------------------------------------------------------------------
