use crate::errors::{ArgusError, ArgusResult};
use serde::{Deserialize, Serialize};

/// One role-tagged message of an oracle prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "True Positive")]
    TruePositive,
    #[serde(rename = "False Positive")]
    FalsePositive,
    #[serde(rename = "Needs Review")]
    NeedsReview,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisEntry {
    pub check_id: String,
    pub verdict: Verdict,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub remediation: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OracleReport {
    #[serde(default)]
    pub analysis: Vec<AnalysisEntry>,
}

/// Strip an optional markdown code fence; oracles love wrapping JSON.
pub fn strip_fences(text: &str) -> &str {
    let mut t = text.trim();
    if let Some(rest) = t.strip_prefix("```json") {
        t = rest;
    } else if let Some(rest) = t.strip_prefix("```") {
        t = rest;
    }
    if let Some(rest) = t.strip_suffix("```") {
        t = rest;
    }
    t.trim()
}

/// Tolerant decode: fence-stripped JSON validated against the report schema.
pub fn decode(text: &str) -> ArgusResult<OracleReport> {
    let clean = strip_fences(text);
    serde_json::from_str(clean)
        .map_err(|e| ArgusError::Oracle(format!("failed to parse oracle output: {e}")))
}

/// Strict variant: no fences, must be a bare JSON object.
pub fn validate_strict(text: &str) -> ArgusResult<OracleReport> {
    let raw = text.trim();
    if raw.starts_with("```") {
        return Err(ArgusError::Oracle(
            "strict JSON required: markdown fences detected".into(),
        ));
    }
    if !(raw.starts_with('{') && raw.ends_with('}')) {
        return Err(ArgusError::Oracle(
            "strict JSON required: must be a JSON object".into(),
        ));
    }
    serde_json::from_str(raw).map_err(|e| ArgusError::Oracle(format!("schema mismatch: {e}")))
}

/// Rejects responses smuggling install/import instructions.
pub struct HallucinationGuard {
    banned_tokens: Vec<String>,
}

impl Default for HallucinationGuard {
    fn default() -> Self {
        Self::new(["import ", "pip install", "apt-get", "brew install"])
    }
}

impl HallucinationGuard {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            banned_tokens: tokens
                .into_iter()
                .map(|t| t.into().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn validate(&self, text: &str) -> ArgusResult<()> {
        let lowered = text.to_ascii_lowercase();
        for token in &self.banned_tokens {
            if lowered.contains(token) {
                return Err(ArgusError::Oracle(format!(
                    "hallucination guard triggered: '{}'",
                    token.trim()
                )));
            }
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------
//  Tests
// -------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"analysis": [{"check_id": "py.exec", "verdict": "True Positive", "rationale": "direct exec", "remediation": "use ast.literal_eval"}]}"#;

    #[test]
    fn decodes_bare_json() {
        let report = decode(BODY).unwrap();
        assert_eq!(report.analysis.len(), 1);
        assert_eq!(report.analysis[0].verdict, Verdict::TruePositive);
    }

    #[test]
    fn decodes_fenced_json() {
        let fenced = format!("```json\n{BODY}\n```");
        let report = decode(&fenced).unwrap();
        assert_eq!(report.analysis[0].check_id, "py.exec");
    }

    #[test]
    fn decodes_plain_fence() {
        let fenced = format!("```\n{BODY}\n```");
        assert_eq!(decode(&fenced).unwrap().analysis.len(), 1);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode("not json"), Err(ArgusError::Oracle(_))));
    }

    #[test]
    fn strict_rejects_fences() {
        let fenced = format!("```json\n{BODY}\n```");
        assert!(validate_strict(&fenced).is_err());
        assert!(validate_strict(BODY).is_ok());
    }

    #[test]
    fn strict_rejects_non_objects() {
        assert!(validate_strict("[1, 2]").is_err());
    }

    #[test]
    fn guard_flags_install_instructions() {
        let guard = HallucinationGuard::default();
        assert!(guard.validate("run pip install evil").is_err());
        assert!(guard.validate("escape the input before use").is_ok());
    }

    #[test]
    fn verdict_round_trips_display_names() {
        let json = serde_json::to_string(&Verdict::NeedsReview).unwrap();
        assert_eq!(json, "\"Needs Review\"");
        let back: Verdict = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Verdict::NeedsReview);
    }
}
