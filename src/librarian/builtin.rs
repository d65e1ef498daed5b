//! Hand-written profiles for native-code modules that static analysis can
//! never see into; built with a small fluent builder.

use crate::librarian::models::{
    FunctionSpec, LibraryProfile, LibraryVersion, ParameterSpec, SecurityLabel,
};

pub struct ProfileBuilder {
    name: String,
    ecosystem: String,
    description: Option<String>,
    homepage: Option<String>,
    repository: Option<String>,
    versions: Vec<LibraryVersion>,
}

impl ProfileBuilder {
    pub fn new(name: impl Into<String>, ecosystem: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ecosystem: ecosystem.into(),
            description: None,
            homepage: None,
            repository: None,
            versions: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn homepage(mut self, homepage: impl Into<String>) -> Self {
        self.homepage = Some(homepage.into());
        self
    }

    pub fn repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    pub fn version(mut self, version_spec: impl Into<String>) -> Self {
        self.versions.push(LibraryVersion {
            version_spec: version_spec.into(),
            functions: Vec::new(),
            release_date: None,
            deprecated: false,
        });
        self
    }

    fn current(&mut self) -> &mut LibraryVersion {
        if self.versions.is_empty() {
            self.versions.push(LibraryVersion {
                version_spec: "*".into(),
                functions: Vec::new(),
                release_date: None,
                deprecated: false,
            });
        }
        self.versions.last_mut().expect("version present")
    }

    pub fn function(mut self, spec: FunctionSpec) -> Self {
        self.current().functions.push(spec);
        self
    }

    pub fn source(self, name: impl Into<String>, cwe_id: Option<&str>) -> Self {
        self.function(FunctionSpec {
            name: name.into(),
            label: SecurityLabel::Source,
            parameters: Vec::new(),
            returns_tainted: true,
            description: None,
            cwe_id: cwe_id.map(str::to_string),
        })
    }

    pub fn sink(self, name: impl Into<String>, cwe_id: &str, tainted_params: &[i32]) -> Self {
        let parameters = tainted_params
            .iter()
            .map(|&idx| ParameterSpec {
                name: format!("arg{idx}"),
                index: idx,
                tags: vec!["tainted".into()],
                description: None,
            })
            .collect();
        self.function(FunctionSpec {
            name: name.into(),
            label: SecurityLabel::Sink,
            parameters,
            returns_tainted: false,
            description: None,
            cwe_id: Some(cwe_id.to_string()),
        })
    }

    pub fn sanitizer(self, name: impl Into<String>) -> Self {
        self.function(FunctionSpec {
            name: name.into(),
            label: SecurityLabel::Sanitizer,
            parameters: Vec::new(),
            returns_tainted: false,
            description: None,
            cwe_id: None,
        })
    }

    pub fn build(self) -> LibraryProfile {
        LibraryProfile {
            name: self.name,
            ecosystem: self.ecosystem,
            versions: self.versions,
            description: self.description,
            homepage: self.homepage,
            repository: self.repository,
        }
    }
}

pub fn build_os_profile() -> LibraryProfile {
    ProfileBuilder::new("os", "stdlib")
        .description("Operating system interface (native module)")
        .version(">=3.0")
        .sink("os.system", "CWE-78", &[0])
        .sink("os.popen", "CWE-78", &[0])
        .sink("os.execl", "CWE-78", &[0])
        .sink("os.execlp", "CWE-78", &[0])
        .sink("os.remove", "CWE-22", &[0])
        .sink("os.unlink", "CWE-22", &[0])
        .source("os.getenv", Some("CWE-15"))
        .source("os.environ.get", Some("CWE-15"))
        .build()
}

pub fn build_subprocess_profile() -> LibraryProfile {
    ProfileBuilder::new("subprocess", "stdlib")
        .description("Subprocess management (native module)")
        .version(">=3.0")
        .sink("subprocess.call", "CWE-78", &[0])
        .sink("subprocess.check_call", "CWE-78", &[0])
        .sink("subprocess.check_output", "CWE-78", &[0])
        .sink("subprocess.run", "CWE-78", &[0])
        .sink("subprocess.Popen", "CWE-78", &[0])
        .build()
}

pub fn build_pickle_profile() -> LibraryProfile {
    ProfileBuilder::new("pickle", "stdlib")
        .description("Object serialization (native module)")
        .version(">=3.0")
        .sink("pickle.loads", "CWE-502", &[0])
        .sink("pickle.load", "CWE-502", &[0])
        .build()
}

pub fn build_html_profile() -> LibraryProfile {
    ProfileBuilder::new("html", "stdlib")
        .description("HTML escaping helpers")
        .version(">=3.0")
        .sanitizer("html.escape")
        .build()
}

/// Profiles shipped with the analyzer.
pub fn builtin_profiles() -> Vec<LibraryProfile> {
    vec![
        build_os_profile(),
        build_subprocess_profile(),
        build_pickle_profile(),
        build_html_profile(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::librarian::registry::ProfileRegistry;

    #[test]
    fn builder_collects_roles_into_current_version() {
        let profile = ProfileBuilder::new("demo", "pypi")
            .version(">=1.0")
            .source("demo.read", None)
            .sink("demo.exec", "CWE-78", &[0])
            .sanitizer("demo.clean")
            .build();

        let funcs = &profile.versions[0].functions;
        assert_eq!(funcs.len(), 3);
        assert_eq!(funcs[0].label, SecurityLabel::Source);
        assert!(funcs[0].returns_tainted);
        assert_eq!(funcs[1].label, SecurityLabel::Sink);
        assert_eq!(funcs[1].parameters[0].index, 0);
        assert!(funcs[1].parameters[0].tags.contains(&"tainted".to_string()));
        assert_eq!(funcs[2].label, SecurityLabel::Sanitizer);
    }

    #[test]
    fn version_autocreated_when_absent() {
        let profile = ProfileBuilder::new("late", "pypi").source("late.get", None).build();
        assert_eq!(profile.versions[0].version_spec, "*");
    }

    #[test]
    fn builtins_register_and_label() {
        let mut reg = ProfileRegistry::new();
        for p in builtin_profiles() {
            reg.add_profile(p);
        }

        assert_eq!(reg.get_sinks("os", "3.12").len(), 6);
        assert_eq!(reg.get_sources("os", "3.12").len(), 2);
        assert_eq!(reg.get_sinks("subprocess", "3.12").len(), 5);
        assert_eq!(reg.get_sinks("pickle", "3.12").len(), 2);
        assert_eq!(reg.get_sanitizers("html", "3.12").len(), 1);

        let config = reg.taint_configuration();
        assert!(config.is_sink("os.system"));
        assert!(config.is_source("os.getenv"));
        assert!(config.is_sanitizer("html.escape"));
        assert_eq!(
            config.sink("pickle.loads").unwrap().cwe_id.as_deref(),
            Some("CWE-502")
        );
    }
}
