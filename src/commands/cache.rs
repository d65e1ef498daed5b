use crate::cli::CacheAction;
use crate::errors::ArgusResult;
use crate::librarian::Librarian;
use crate::utils::config::Config;
use bytesize::ByteSize;
use chrono::{DateTime, Local};
use console::style;
use std::fs;
use std::path::Path;

pub fn handle(action: CacheAction, database_dir: &Path, config: &Config) -> ArgusResult<()> {
    let db_path = super::librarian_db_path(config, database_dir);

    match action {
        CacheAction::Stats => {
            println!("{}", style("Librarian cache").blue().bold().underlined());

            if !db_path.exists() {
                println!("  {}", style("∅ No cache database yet").dim());
                return Ok(());
            }

            let librarian = Librarian::open(&db_path)?;
            let count = librarian.decision_count()?;

            let meta = fs::metadata(&db_path)?;
            let size = ByteSize::b(meta.len());
            let mtime: DateTime<Local> = meta.modified()?.into();

            println!(
                "    {:10} {}",
                style("Path"),
                style(db_path.display()).underlined()
            );
            println!("    {:10} {}", style("Decisions"), style(count).bold());
            println!("    {:10} {}", style("Size"), size);
            println!(
                "    {:10} {}",
                style("Modified"),
                mtime.format("%Y-%m-%d %H:%M:%S")
            );
        }

        CacheAction::Clear => {
            if !db_path.exists() {
                println!("{}", style("✖ No cache database to clear").red());
                return Ok(());
            }
            let librarian = Librarian::open(&db_path)?;
            librarian.clear()?;
            println!("{}", style("✔ Decision cache cleared").green().bold());
        }
    }

    Ok(())
}
