use crate::cli::ProfilesAction;
use crate::errors::ArgusResult;
use crate::librarian::models::SecurityLabel;
use crate::utils::config::Config;
use console::style;

pub fn handle(action: ProfilesAction, config: &Config) -> ArgusResult<()> {
    let registry = super::build_registry(config, None);

    match action {
        ProfilesAction::List { verbose } => {
            println!("{}", style("Registered profiles").blue().bold().underlined());
            if registry.is_empty() {
                println!("  {}", style("∅ No profiles loaded").dim());
                return Ok(());
            }

            for library in registry.all() {
                println!(
                    "  {} ({})",
                    style(&library.name).white().bold(),
                    library.ecosystem
                );
                if verbose {
                    for version in &library.versions {
                        println!(
                            "    {:12} {} functions{}",
                            style(&version.version_spec),
                            version.functions.len(),
                            if version.deprecated { "  [deprecated]" } else { "" }
                        );
                    }
                }
            }
        }

        ProfilesAction::Show { name } => {
            let Some(library) = registry.library(&name) else {
                println!(
                    "{} {}",
                    style("✖ No profile for").red(),
                    style(&name).white().bold()
                );
                return Ok(());
            };

            println!(
                "{} ({})",
                style(&library.name).blue().bold().underlined(),
                library.ecosystem
            );
            if let Some(desc) = &library.description {
                println!("  {}", style(desc).dim());
            }
            for version in &library.versions {
                println!("  {}", style(&version.version_spec).white().bold());
                for func in &version.functions {
                    let label = match func.label {
                        SecurityLabel::Source => style("source").cyan(),
                        SecurityLabel::Sink => style("sink").red(),
                        SecurityLabel::Sanitizer => style("sanitizer").green(),
                        SecurityLabel::None => style("none").dim(),
                    };
                    let cwe = func
                        .cwe_id
                        .as_deref()
                        .map(|c| format!("  {c}"))
                        .unwrap_or_default();
                    println!("    {:10} {}{}", label, func.name, style(cwe).dim());
                }
            }
        }
    }

    Ok(())
}
