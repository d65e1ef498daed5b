use crate::librarian::models::{FunctionSpec, LibraryProfile, LibraryVersion, SecurityLabel};
use crate::librarian::version::VersionMatcher;
use crate::taint::{SinkSpec, SourceSpec, TaintConfiguration};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// A resolved project dependency, as delivered by an external resolver.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub name: String,
    pub version: Option<String>,
}

/// Versioned registry of library security profiles.
///
/// Profiles load from JSON files; invalid files are skipped silently.
/// Lookups are version-aware: a version spec of `*` (or empty) admits any
/// concrete version.
#[derive(Debug, Default)]
pub struct ProfileRegistry {
    libraries: BTreeMap<String, LibraryProfile>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json` profile under `dir`. Returns how many loaded.
    pub fn load_from(&mut self, dir: &Path) -> usize {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return 0;
        };

        let mut loaded = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(contents) = std::fs::read_to_string(&path) else {
                continue;
            };
            match serde_json::from_str::<LibraryProfile>(&contents) {
                Ok(profile) => {
                    self.add_profile(profile);
                    loaded += 1;
                }
                Err(e) => {
                    debug!(target: "librarian", "skipping invalid profile {}: {e}", path.display());
                }
            }
        }
        loaded
    }

    pub fn add_profile(&mut self, profile: LibraryProfile) {
        self.libraries.insert(profile.name.to_lowercase(), profile);
    }

    pub fn all(&self) -> impl Iterator<Item = &LibraryProfile> {
        self.libraries.values()
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    pub fn library(&self, name: &str) -> Option<&LibraryProfile> {
        self.libraries.get(&name.to_lowercase())
    }

    /// Version entries whose specifier admits the given concrete version.
    pub fn get_profile(&self, name: &str, version: &str) -> Vec<&LibraryVersion> {
        let Some(library) = self.library(name) else {
            return Vec::new();
        };
        library
            .versions
            .iter()
            .filter(|v| VersionMatcher::matches(version, &v.version_spec))
            .collect()
    }

    /// The entry with the highest parseable version spec; ties and
    /// unparseable specs fall back to declaration order.
    pub fn get_profile_latest(&self, name: &str) -> Option<&LibraryVersion> {
        let library = self.library(name)?;
        if library.versions.is_empty() {
            return None;
        }

        let mut best: Option<(&LibraryVersion, semver::Version)> = None;
        for v in &library.versions {
            if let Some(parsed) = VersionMatcher::parse(&v.version_spec) {
                let replace = match &best {
                    Some((_, cur)) => parsed > *cur,
                    None => true,
                };
                if replace {
                    best = Some((v, parsed));
                }
            }
        }
        best.map(|(v, _)| v).or(library.versions.last())
    }

    /// Match each dependency to a profile: exact version match preferred,
    /// latest entry when no version is pinned.
    pub fn match_dependencies(&self, deps: &[Dependency]) -> BTreeMap<String, &LibraryVersion> {
        let mut matches = BTreeMap::new();
        for dep in deps {
            let hit = match &dep.version {
                Some(version) => self.get_profile(&dep.name, version).into_iter().next(),
                None => self.get_profile_latest(&dep.name),
            };
            if let Some(profile) = hit {
                matches.insert(dep.name.to_lowercase(), profile);
            }
        }
        matches
    }

    pub fn get_functions(&self, name: &str, version: &str) -> Vec<&FunctionSpec> {
        self.get_profile(name, version)
            .into_iter()
            .flat_map(|v| v.functions.iter())
            .collect()
    }

    pub fn get_sinks(&self, name: &str, version: &str) -> Vec<&FunctionSpec> {
        self.get_functions(name, version)
            .into_iter()
            .filter(|f| f.label == SecurityLabel::Sink)
            .collect()
    }

    pub fn get_sources(&self, name: &str, version: &str) -> Vec<&FunctionSpec> {
        self.get_functions(name, version)
            .into_iter()
            .filter(|f| f.label == SecurityLabel::Source)
            .collect()
    }

    pub fn get_sanitizers(&self, name: &str, version: &str) -> Vec<&FunctionSpec> {
        self.get_functions(name, version)
            .into_iter()
            .filter(|f| f.label == SecurityLabel::Sanitizer)
            .collect()
    }

    /// Assemble a taint configuration from the latest entry of every
    /// registered library.
    pub fn taint_configuration(&self) -> TaintConfiguration {
        let mut config = TaintConfiguration::default();
        for library in self.libraries.values() {
            let Some(latest) = self.get_profile_latest(&library.name) else {
                continue;
            };
            for func in &latest.functions {
                match func.label {
                    SecurityLabel::Source => {
                        if !config.is_source(&func.name) {
                            config.sources.push(SourceSpec::named(func.name.clone()));
                        }
                    }
                    SecurityLabel::Sink => {
                        if !config.is_sink(&func.name) {
                            config.sinks.push(SinkSpec {
                                name: func.name.clone(),
                                cwe_id: func.cwe_id.clone(),
                            });
                        }
                    }
                    SecurityLabel::Sanitizer => {
                        if !config.is_sanitizer(&func.name) {
                            config.sanitizers.push(func.name.clone());
                        }
                    }
                    SecurityLabel::None => {}
                }
            }
        }
        config
    }
}

// -------------------------------------------------------------------------
//  Tests
// -------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn requests_profile() -> LibraryProfile {
        serde_json::from_str(
            r#"{
                "name": "requests",
                "ecosystem": "pypi",
                "versions": [
                    {
                        "version_spec": ">=2.0, <3.0",
                        "functions": [
                            {"name": "requests.get", "label": "source", "returns_tainted": true}
                        ]
                    },
                    {
                        "version_spec": "==1.0.0",
                        "functions": [
                            {"name": "requests.get", "label": "none"}
                        ]
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn version_spec_admits_concrete_versions() {
        let mut reg = ProfileRegistry::new();
        reg.add_profile(requests_profile());

        assert_eq!(reg.get_profile("requests", "2.28.0").len(), 1);
        assert_eq!(reg.get_profile("requests", "1.0.0").len(), 1);
        assert!(reg.get_profile("requests", "3.1.0").is_empty());
        // case-insensitive library names
        assert_eq!(reg.get_profile("Requests", "2.28.0").len(), 1);
    }

    #[test]
    fn star_spec_matches_all() {
        let mut reg = ProfileRegistry::new();
        reg.add_profile(
            serde_json::from_str(
                r#"{"name": "os", "ecosystem": "stdlib",
                    "versions": [{"version_spec": "*", "functions": []}]}"#,
            )
            .unwrap(),
        );
        assert_eq!(reg.get_profile("os", "3.12.1").len(), 1);
    }

    #[test]
    fn latest_prefers_highest_parseable() {
        let mut reg = ProfileRegistry::new();
        reg.add_profile(
            serde_json::from_str(
                r#"{"name": "lib", "ecosystem": "pypi", "versions": [
                    {"version_spec": "1.0.0", "functions": []},
                    {"version_spec": "2.5.0", "functions": []},
                    {"version_spec": "2.1.0", "functions": []}
                ]}"#,
            )
            .unwrap(),
        );
        let latest = reg.get_profile_latest("lib").unwrap();
        assert_eq!(latest.version_spec, "2.5.0");
    }

    #[test]
    fn latest_falls_back_to_declaration_order() {
        let mut reg = ProfileRegistry::new();
        reg.add_profile(
            serde_json::from_str(
                r#"{"name": "odd", "ecosystem": "pypi", "versions": [
                    {"version_spec": ">=1.0, <2.0", "functions": []},
                    {"version_spec": "*", "functions": []}
                ]}"#,
            )
            .unwrap(),
        );
        // no spec parses as a plain version -> last declared entry
        let latest = reg.get_profile_latest("odd").unwrap();
        assert_eq!(latest.version_spec, "*");
    }

    #[test]
    fn match_dependencies_prefers_exact_then_latest() {
        let mut reg = ProfileRegistry::new();
        reg.add_profile(requests_profile());

        let deps = vec![
            Dependency {
                name: "requests".into(),
                version: Some("2.28.0".into()),
            },
            Dependency {
                name: "unknown".into(),
                version: None,
            },
        ];
        let matched = reg.match_dependencies(&deps);
        assert_eq!(matched.len(), 1);
        assert!(matched.contains_key("requests"));

        let unpinned = vec![Dependency {
            name: "requests".into(),
            version: None,
        }];
        let matched = reg.match_dependencies(&unpinned);
        assert!(matched.contains_key("requests"));
    }

    #[test]
    fn load_from_skips_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("good.json"),
            r#"{"name": "good", "ecosystem": "pypi", "versions": []}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        std::fs::write(
            dir.path().join("schema_miss.json"),
            r#"{"unexpected": true}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut reg = ProfileRegistry::new();
        let loaded = reg.load_from(dir.path());
        assert_eq!(loaded, 1);
        assert!(reg.library("good").is_some());
    }

    #[test]
    fn label_filters_select_roles() {
        let mut reg = ProfileRegistry::new();
        reg.add_profile(
            serde_json::from_str(
                r#"{"name": "mix", "ecosystem": "pypi", "versions": [
                    {"version_spec": "*", "functions": [
                        {"name": "mix.fetch", "label": "source"},
                        {"name": "mix.run", "label": "sink", "cwe_id": "CWE-78"},
                        {"name": "mix.clean", "label": "sanitizer"},
                        {"name": "mix.helper"}
                    ]}
                ]}"#,
            )
            .unwrap(),
        );

        assert_eq!(reg.get_sources("mix", "1.0.0").len(), 1);
        assert_eq!(reg.get_sinks("mix", "1.0.0").len(), 1);
        assert_eq!(reg.get_sanitizers("mix", "1.0.0").len(), 1);

        let config = reg.taint_configuration();
        assert!(config.is_source("mix.fetch"));
        assert!(config.is_sink("mix.run"));
        assert_eq!(
            config.sink("mix.run").unwrap().cwe_id.as_deref(),
            Some("CWE-78")
        );
        assert!(config.is_sanitizer("mix.clean"));
    }
}
