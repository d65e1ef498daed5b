use crate::ast::Ast;
use crate::cfg::{ControlFlowGraph, Finding};
use crate::errors::{ArgusError, ArgusResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Findings delivered by the external pattern scanner (Semgrep-class).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerFinding {
    pub check_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<LineCol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<LineCol>,
    #[serde(default)]
    pub extra: FindingExtra,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LineCol {
    pub line: usize,
    #[serde(default)]
    pub col: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindingExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScannerReport {
    #[serde(default)]
    results: Vec<ScannerFinding>,
}

/// Accepts either `{ "results": [...] }` or a bare finding array.
pub fn parse_report(text: &str) -> ArgusResult<Vec<ScannerFinding>> {
    if let Ok(report) = serde_json::from_str::<ScannerReport>(text) {
        return Ok(report.results);
    }
    serde_json::from_str::<Vec<ScannerFinding>>(text)
        .map_err(|e| ArgusError::Msg(format!("unreadable scanner report: {e}")))
}

/// Attach findings to the first block owning a statement whose line span
/// contains the finding line. Findings that fit nowhere come back in the
/// `unmapped` list; path-mismatched findings are dropped.
pub fn map_findings(
    ast: &Ast,
    cfg: &mut ControlFlowGraph,
    findings: Vec<ScannerFinding>,
    file_path: &str,
) -> Vec<ScannerFinding> {
    let mut unmapped = Vec::new();

    for finding in findings {
        if let Some(path) = &finding.path
            && path != file_path
            && !file_path.ends_with(path.as_str())
        {
            continue;
        }

        let Some(line) = finding.start.map(|s| s.line).filter(|&l| l > 0) else {
            unmapped.push(finding);
            continue;
        };

        let Some(block_id) = find_block_by_line(ast, cfg, line) else {
            unmapped.push(finding);
            continue;
        };

        let mapped = Finding {
            check_id: finding.check_id.clone(),
            message: finding.extra.message.clone(),
            severity: finding.extra.severity.clone(),
            line,
            column: finding.start.map(|s| s.col),
        };
        if let Some(block) = cfg.block_mut(block_id) {
            block.findings.push(mapped);
        }
    }

    if !unmapped.is_empty() {
        debug!(target: "scanner", "{} findings left unmapped", unmapped.len());
    }
    unmapped
}

fn find_block_by_line(ast: &Ast, cfg: &ControlFlowGraph, line: usize) -> Option<u32> {
    for block in cfg.blocks() {
        for &stmt in &block.statements {
            let span = ast.span(stmt);
            if span.start_line <= line && line <= span.end_line {
                return Some(block.id);
            }
        }
    }
    None
}

// -------------------------------------------------------------------------
//  Tests
// -------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse_module;
    use crate::cfg::builder::CfgBuilder;
    use crate::pipeline::CancelToken;

    fn setup(src: &str) -> (Ast, ControlFlowGraph) {
        let ast = parse_module(src.as_bytes()).unwrap();
        let cancel = CancelToken::new();
        let cfg = CfgBuilder::build(&ast, "app.py", ast.root, &cancel).unwrap();
        (ast, cfg)
    }

    fn finding(check_id: &str, line: usize) -> ScannerFinding {
        ScannerFinding {
            check_id: check_id.into(),
            path: Some("app.py".into()),
            start: Some(LineCol { line, col: 1 }),
            end: Some(LineCol { line, col: 20 }),
            extra: FindingExtra {
                message: Some("bad".into()),
                severity: Some("ERROR".into()),
            },
        }
    }

    #[test]
    fn parses_wrapped_and_bare_reports() {
        let wrapped = r#"{"results": [{"check_id": "a", "start": {"line": 1, "col": 1}}]}"#;
        assert_eq!(parse_report(wrapped).unwrap().len(), 1);

        let bare = r#"[{"check_id": "a", "start": {"line": 1, "col": 1}}]"#;
        assert_eq!(parse_report(bare).unwrap().len(), 1);

        assert!(parse_report("garbage").is_err());
    }

    #[test]
    fn finding_lands_in_owning_block() {
        let (ast, mut cfg) = setup("x = 1\ny = 2\n");
        let unmapped = map_findings(&ast, &mut cfg, vec![finding("py.test", 2)], "app.py");
        assert!(unmapped.is_empty());

        let entry = cfg.block(cfg.entry_block.unwrap()).unwrap();
        assert_eq!(entry.findings.len(), 1);
        assert_eq!(entry.findings[0].check_id, "py.test");
        assert_eq!(entry.findings[0].line, 2);
    }

    #[test]
    fn out_of_range_lines_accumulate_unmapped() {
        let (ast, mut cfg) = setup("x = 1\n");
        let unmapped = map_findings(&ast, &mut cfg, vec![finding("py.test", 99)], "app.py");
        assert_eq!(unmapped.len(), 1);
    }

    #[test]
    fn missing_line_is_unmapped() {
        let (ast, mut cfg) = setup("x = 1\n");
        let f = ScannerFinding {
            check_id: "nl".into(),
            path: None,
            start: None,
            end: None,
            extra: FindingExtra::default(),
        };
        let unmapped = map_findings(&ast, &mut cfg, vec![f], "app.py");
        assert_eq!(unmapped.len(), 1);
    }

    #[test]
    fn foreign_path_is_dropped_silently() {
        let (ast, mut cfg) = setup("x = 1\n");
        let mut f = finding("other", 1);
        f.path = Some("elsewhere.py".into());
        let unmapped = map_findings(&ast, &mut cfg, vec![f], "app.py");
        assert!(unmapped.is_empty());
        let entry = cfg.block(cfg.entry_block.unwrap()).unwrap();
        assert!(entry.findings.is_empty());
    }

    #[test]
    fn relative_path_suffix_matches() {
        let (ast, mut cfg) = setup("x = 1\n");
        let mut f = finding("rel", 1);
        f.path = Some("app.py".into());
        let unmapped = map_findings(&ast, &mut cfg, vec![f], "/project/src/app.py");
        assert!(unmapped.is_empty());
        let entry = cfg.block(cfg.entry_block.unwrap()).unwrap();
        assert_eq!(entry.findings.len(), 1);
    }
}
