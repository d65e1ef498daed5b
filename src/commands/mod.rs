pub mod cache;
pub mod profiles;
pub mod scan;

use crate::cli::Commands;
use crate::errors::ArgusResult;
use crate::librarian::builtin::builtin_profiles;
use crate::librarian::registry::ProfileRegistry;
use crate::utils::config::Config;
use std::path::{Path, PathBuf};

pub fn handle_command(
    command: Commands,
    database_dir: &Path,
    config: &mut Config,
) -> ArgusResult<()> {
    match command {
        Commands::Scan {
            path,
            findings,
            profiles_dir,
            format,
            output,
        } => scan::handle(
            &path,
            findings.as_deref(),
            profiles_dir.as_deref(),
            &format,
            output.as_deref(),
            database_dir,
            config,
        ),
        Commands::Profiles { action } => profiles::handle(action, config),
        Commands::Cache { action } => cache::handle(action, database_dir, config),
    }
}

/// Registry = builtins (unless disabled) + profile files from the flag or
/// config directory.
pub(crate) fn build_registry(config: &Config, override_dir: Option<&str>) -> ProfileRegistry {
    let mut registry = ProfileRegistry::new();

    if config.librarian.use_builtin_profiles {
        for profile in builtin_profiles() {
            registry.add_profile(profile);
        }
    }

    let dir = override_dir
        .map(str::to_owned)
        .or_else(|| {
            (!config.librarian.profiles_dir.is_empty())
                .then(|| config.librarian.profiles_dir.clone())
        });
    if let Some(dir) = dir {
        let loaded = registry.load_from(Path::new(&dir));
        tracing::debug!("loaded {loaded} profiles from {dir}");
    }

    registry
}

pub(crate) fn librarian_db_path(config: &Config, database_dir: &Path) -> PathBuf {
    if config.librarian.db_path.is_empty() {
        database_dir.join("librarian.sqlite")
    } else {
        PathBuf::from(&config.librarian.db_path)
    }
}
