use crate::analysis::summarizer::HierarchicalSummarizer;
use crate::cfg::callgraph::CallGraph;
use crate::cfg::signature::FunctionSignature;
use crate::errors::ArgusResult;
use crate::librarian::Librarian;
use crate::pipeline::{
    AnalysisContext, AnalysisOptions, CancelToken, FileReport, analyze_source,
};
use crate::scanner::{self, ScannerFinding};
use crate::taint::{SinkSpec, SourceSpec, TaintConfiguration};
use crate::utils::config::Config;
use crate::utils::project::get_project_info;
use crate::walk::spawn_senders;
use console::style;
use dashmap::DashMap;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

/// Whole-scan result: per-file reports plus the cross-file summaries.
#[derive(Serialize)]
pub struct ScanReport {
    pub project: String,
    pub files: BTreeMap<String, FileReport>,
    pub summaries: BTreeMap<String, FunctionSignature>,
    pub total_flows: usize,
}

/// Entry point called by the CLI.
pub fn handle(
    path: &str,
    findings_path: Option<&str>,
    profiles_dir: Option<&str>,
    format: &str,
    output: Option<&str>,
    database_dir: &Path,
    config: &Config,
) -> ArgusResult<()> {
    let scan_path = Path::new(path).canonicalize()?;
    let project_root = if scan_path.is_file() {
        scan_path.parent().unwrap_or(&scan_path).to_path_buf()
    } else {
        scan_path.clone()
    };
    let (project_name, default_report_path) = get_project_info(&project_root, database_dir)?;

    if !config.output.quiet {
        println!("{} {}...\n", style("Checking").green().bold(), &project_name);
    }

    let registry = super::build_registry(config, profiles_dir);
    let mut taint = registry.taint_configuration();
    taint.extend(TaintConfiguration {
        sources: config
            .analysis
            .extra_sources
            .iter()
            .map(|s| SourceSpec::named(s.as_str()))
            .collect(),
        sinks: config
            .analysis
            .extra_sinks
            .iter()
            .map(|s| SinkSpec::named(s.as_str()))
            .collect(),
        sanitizers: config.analysis.extra_sanitizers.clone(),
    });

    let librarian = Librarian::open(&super::librarian_db_path(config, database_dir))?;

    let findings = match findings_path {
        Some(p) => scanner::parse_report(&std::fs::read_to_string(p)?)?,
        None => Vec::new(),
    };

    let ctx = AnalysisContext {
        taint,
        options: AnalysisOptions {
            speculative_cap: config.analysis.max_speculative_candidates,
            weights: config.analysis.weights,
        },
        librarian: Some(&librarian),
        cancel: CancelToken::new(),
    };

    let report = run_scan(&scan_path, &project_name, findings, &ctx, config)?;

    let wants_json =
        format == "json" || (format.is_empty() && config.output.default_format == "json");
    if wants_json {
        let out_path = output
            .map(PathBuf::from)
            .unwrap_or(default_report_path);
        std::fs::write(&out_path, serde_json::to_vec_pretty(&report)?)?;
        if !config.output.quiet {
            println!(
                "{} report to {}",
                style("Wrote").green().bold(),
                style(out_path.display()).underlined()
            );
        }
    } else {
        print_console(&report, config);
    }

    Ok(())
}

// --------------------------------------------------------------------------------------------
// Scanning helpers
// --------------------------------------------------------------------------------------------

pub fn run_scan(
    scan_path: &Path,
    project_name: &str,
    findings: Vec<ScannerFinding>,
    ctx: &AnalysisContext<'_>,
    config: &Config,
) -> ArgusResult<ScanReport> {
    let reports: DashMap<String, FileReport> = DashMap::new();
    let merged_cg = RwLock::new(CallGraph::with_cap(ctx.options.speculative_cap));
    let signatures: Mutex<Vec<FunctionSignature>> = Mutex::new(Vec::new());

    let analyze_one = |file: &Path| {
        let display_path = file.to_string_lossy().to_string();
        let module_name = file
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("module")
            .to_string();

        let result = std::fs::read(file).map_err(Into::into).and_then(|source| {
            analyze_source(&module_name, &display_path, &source, findings.clone(), ctx)
        });

        match result {
            Ok(outcome) => {
                if let Ok(mut cg) = merged_cg.write() {
                    cg.merge(&outcome.call_graph);
                }
                if let Ok(mut sigs) = signatures.lock() {
                    sigs.extend(outcome.report.signatures.iter().cloned());
                }
                reports.insert(display_path, outcome.report);
            }
            Err(e) => {
                tracing::warn!("analysis of {} failed: {}", display_path, e);
                reports.insert(display_path.clone(), FileReport::failed(module_name, &e));
            }
        }
    };

    if scan_path.is_file() {
        analyze_one(scan_path);
    } else {
        let rx = spawn_senders(scan_path, config);
        rx.into_iter().flatten().par_bridge().for_each(|file| {
            if file.extension().and_then(|e| e.to_str()) == Some("py") {
                analyze_one(&file);
            }
        });
    }

    let summaries = {
        let cg = merged_cg.read()?;
        let sigs = signatures.into_inner()?;
        HierarchicalSummarizer::summarize(&cg, sigs, &ctx.cancel)?
    };

    let files: BTreeMap<String, FileReport> = reports.into_iter().collect();
    let total_flows = files.values().map(|r| r.stats.flow_count).sum();

    Ok(ScanReport {
        project: project_name.to_string(),
        files,
        summaries,
        total_flows,
    })
}

fn print_console(report: &ScanReport, config: &Config) {
    if config.output.quiet {
        return;
    }

    let max_results = config.output.max_results.unwrap_or(u32::MAX) as usize;

    for (path, file) in &report.files {
        if let Some(err) = &file.error {
            println!("{}", style(path).blue().underlined());
            println!("  {} {}\n", style("error:").red().bold(), err);
            continue;
        }
        if file.rankings.is_empty() {
            continue;
        }

        println!("{}", style(path).blue().underlined());
        for ranked in file.rankings.iter().take(max_results) {
            let flow = &ranked.flow;
            let implicit = if flow.implicit { "  [implicit]" } else { "" };
            println!(
                "  {:>6.2}  {} → {}  (path {}){}",
                ranked.risk_score,
                style(&flow.source_name).bold(),
                style(&flow.sink_name).bold(),
                flow.path.len(),
                style(implicit).yellow(),
            );
        }
        println!();
    }

    println!(
        "{} '{}' produced {} taint flows across {} files.",
        style("warning").yellow().bold(),
        style(&report.project).white().bold(),
        style(report.total_flows).bold(),
        report.files.len()
    );
}

// -------------------------------------------------------------------------
//  Tests
// -------------------------------------------------------------------------
