use crate::errors::{ArgusError, ArgusResult};
use std::path::{Path, PathBuf};

/// Determine `<project-name, path/to/<project>.report.json>`.
pub fn get_project_info(project_path: &Path, data_dir: &Path) -> ArgusResult<(String, PathBuf)> {
    let project_name = project_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ArgusError::Msg("Unable to determine project name".into()))?;

    let report_name = sanitize_project_name(project_name);
    let report_path = data_dir.join(format!("{report_name}.report.json"));

    Ok((project_name.to_owned(), report_path))
}

pub fn sanitize_project_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' | '\t' | '\n' | '\r' => '_',
            c if c.is_alphanumeric() || c == '_' || c == '-' => c,
            _ => '_',
        })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[test]
fn sanitize_collapses_odd_characters() {
    assert_eq!(sanitize_project_name("My Cool App!"), "my_cool_app");
    assert_eq!(sanitize_project_name("repo-name"), "repo-name");
    assert_eq!(sanitize_project_name("a  b"), "a_b");
}

#[test]
fn project_info_names_report_from_directory() {
    let (name, report) = get_project_info(Path::new("/tmp/Sample Proj"), Path::new("/data")).unwrap();
    assert_eq!(name, "Sample Proj");
    assert!(report.ends_with("sample_proj.report.json"));
}
