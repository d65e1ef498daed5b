use crate::analysis::ranker::RankWeights;
use crate::errors::ArgusResult;
use console::style;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use toml;

static DEFAULT_CONFIG_TOML: &str = include_str!("../../default-argus.conf");

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ScannerConfig {
    /// The maximum file size to scan, in megabytes.
    pub max_file_size_mb: Option<u64>,

    /// Directories to exclude from scanning.
    pub excluded_directories: Vec<String>,

    /// Excluded files
    pub excluded_files: Vec<String>,

    /// Whether to respect VCS ignore files (`.gitignore`, ..) or not.
    pub read_vcsignore: bool,

    /// Whether to follow symlinks or not.
    pub follow_symlinks: bool,

    /// Whether to scan hidden files or not.
    pub scan_hidden_files: bool,
}
impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: None,
            excluded_directories: vec![
                "node_modules",
                ".git",
                "target",
                ".venv",
                "venv",
                "__pycache__",
                "build",
                "dist",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            excluded_files: vec![],
            read_vcsignore: true,
            follow_symlinks: false,
            scan_hidden_files: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Cap on speculative-dispatch expansion per call site.
    pub max_speculative_candidates: usize,

    /// Extra taint sources beyond the loaded profiles.
    pub extra_sources: Vec<String>,

    /// Extra taint sinks beyond the loaded profiles.
    pub extra_sinks: Vec<String>,

    /// Extra sanitizers beyond the loaded profiles.
    pub extra_sanitizers: Vec<String>,

    /// Risk-ranking weights.
    pub weights: RankWeights,
}
impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_speculative_candidates: crate::cfg::callgraph::MAX_SPECULATIVE_CANDIDATES,
            extra_sources: vec![],
            extra_sinks: vec![],
            extra_sanitizers: vec![],
            weights: RankWeights::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LibrarianConfig {
    /// Custom path for the decision database. Empty = default location.
    pub db_path: String,

    /// Directory of library-profile JSON files. Empty = none.
    pub profiles_dir: String,

    /// Whether the built-in stdlib profiles are registered.
    pub use_builtin_profiles: bool,
}
impl Default for LibrarianConfig {
    fn default() -> Self {
        Self {
            db_path: String::new(),
            profiles_dir: String::new(),
            use_builtin_profiles: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    /// The default output format.
    pub default_format: String,

    /// Whether to print anything to the console or not.
    pub quiet: bool,

    /// The maximum number of ranked flows to show.
    pub max_results: Option<u32>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_format: "console".into(),
            quiet: false,
            max_results: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PerformanceConfig {
    /// The maximum number of worker threads to use, or `None` to auto-detect.
    pub worker_threads: Option<usize>,

    /// The maximum number of entries to walk in a single batch.
    pub batch_size: usize,

    /// capacity = threads × this
    pub channel_multiplier: usize,

    /// The stack size for Rayon threads, in bytes.
    pub rayon_thread_stack_size: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            batch_size: 100usize,
            channel_multiplier: 4usize,
            rayon_thread_stack_size: 8 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub scanner: ScannerConfig,
    pub analysis: AnalysisConfig,
    pub librarian: LibrarianConfig,
    pub output: OutputConfig,
    pub performance: PerformanceConfig,
}

impl Config {
    pub fn load(config_dir: &Path) -> ArgusResult<Self> {
        let mut config = Config::default();

        let default_config_path = config_dir.join("argus.conf");
        if !default_config_path.exists() {
            create_example_config(config_dir)?;
        }

        let user_config_path = config_dir.join("argus.local");
        if user_config_path.exists() {
            let user_config_content = fs::read_to_string(&user_config_path)?;
            let user_config: Config = toml::from_str(&user_config_content)?;

            config = merge_configs(config, user_config);

            println!(
                "{}: Loaded user config from: {}\n",
                style("note").green().bold(),
                style(user_config_path.display())
                    .underlined()
                    .white()
                    .bold()
            );
        } else {
            println!(
                "{}: Using {} configuration.\n      Create file in '{}' to customize.\n",
                style("note").green().bold(),
                style("default").bold(),
                style(user_config_path.display())
                    .underlined()
                    .white()
                    .bold()
            );
        }

        Ok(config)
    }
}

fn create_example_config(config_dir: &Path) -> ArgusResult<()> {
    let example_path = config_dir.join("argus.conf");
    if !example_path.exists() {
        fs::write(&example_path, DEFAULT_CONFIG_TOML)?;
        tracing::debug!("Example config created at: {}", example_path.display());
    }
    Ok(())
}

/// Merge user config into default config, preserving defaults where the user
/// didn't supply new lists and overriding everything else.
fn merge_configs(mut default: Config, user: Config) -> Config {
    // --- ScannerConfig ---
    default.scanner.max_file_size_mb = user.scanner.max_file_size_mb;
    default.scanner.read_vcsignore = user.scanner.read_vcsignore;
    default.scanner.follow_symlinks = user.scanner.follow_symlinks;
    default.scanner.scan_hidden_files = user.scanner.scan_hidden_files;

    // Merge exclusion lists (default ⊔ user), then sort & dedupe
    default
        .scanner
        .excluded_directories
        .extend(user.scanner.excluded_directories);
    default
        .scanner
        .excluded_files
        .extend(user.scanner.excluded_files);
    default.scanner.excluded_directories.sort_unstable();
    default.scanner.excluded_directories.dedup();
    default.scanner.excluded_files.sort_unstable();
    default.scanner.excluded_files.dedup();

    // --- AnalysisConfig ---
    default.analysis.max_speculative_candidates = user.analysis.max_speculative_candidates;
    default.analysis.weights = user.analysis.weights;
    default.analysis.extra_sources.extend(user.analysis.extra_sources);
    default.analysis.extra_sinks.extend(user.analysis.extra_sinks);
    default
        .analysis
        .extra_sanitizers
        .extend(user.analysis.extra_sanitizers);
    default.analysis.extra_sources.sort_unstable();
    default.analysis.extra_sources.dedup();
    default.analysis.extra_sinks.sort_unstable();
    default.analysis.extra_sinks.dedup();
    default.analysis.extra_sanitizers.sort_unstable();
    default.analysis.extra_sanitizers.dedup();

    // --- LibrarianConfig ---
    default.librarian.db_path = user.librarian.db_path;
    default.librarian.profiles_dir = user.librarian.profiles_dir;
    default.librarian.use_builtin_profiles = user.librarian.use_builtin_profiles;

    // --- OutputConfig ---
    default.output.default_format = user.output.default_format;
    default.output.quiet = user.output.quiet;
    default.output.max_results = user.output.max_results;

    // --- PerformanceConfig ---
    default.performance.worker_threads = user.performance.worker_threads;
    default.performance.batch_size = user.performance.batch_size;
    default.performance.channel_multiplier = user.performance.channel_multiplier;
    default.performance.rayon_thread_stack_size = user.performance.rayon_thread_stack_size;

    default
}

#[test]
fn merge_configs_dedupes_and_keeps_order() {
    let mut default_cfg = Config::default();
    default_cfg.scanner.excluded_directories = vec!["dist".into(), "target".into()];

    let mut user_cfg = Config::default();
    user_cfg.scanner.excluded_directories = vec!["build".into(), "dist".into()];

    let merged = merge_configs(default_cfg, user_cfg);

    assert_eq!(
        merged.scanner.excluded_directories,
        vec!["build", "dist", "target"]
    );
}

#[test]
fn load_creates_example_and_reads_user_overrides() {
    let cfg_dir = tempfile::tempdir().unwrap();
    let cfg_path = cfg_dir.path();

    let user_toml = r#"
        [scanner]
        follow_symlinks = true
        excluded_directories = ["generated"]

        [analysis]
        max_speculative_candidates = 8
        extra_sinks = ["db.execute"]

        [output]
        quiet = true
    "#;
    fs::write(cfg_path.join("argus.local"), user_toml).unwrap();

    let cfg = Config::load(cfg_path).expect("Config::load should succeed");

    assert!(cfg_path.join("argus.conf").is_file());

    assert!(cfg.scanner.follow_symlinks);
    assert!(cfg.output.quiet);
    assert_eq!(cfg.analysis.max_speculative_candidates, 8);
    assert!(
        cfg.scanner
            .excluded_directories
            .contains(&"generated".to_string())
    );
    assert!(cfg.analysis.extra_sinks.contains(&"db.execute".to_string()));

    assert!(!cfg.scanner.scan_hidden_files);
}
