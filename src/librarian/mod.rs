pub mod builtin;
pub mod db;
pub mod models;
pub mod registry;
pub mod version;

use crate::errors::ArgusResult;
use crate::oracle::{AnalysisEntry, Message, decode};
use self::db::{DecisionRecord, LibrarianDb};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// A decision served from the cache instead of the external oracle.
#[derive(Debug, Clone, Serialize)]
pub struct CachedDecision {
    pub provider: String,
    pub model: String,
    pub response: String,
    pub analysis: Vec<AnalysisEntry>,
    pub cached: bool,
}

/// Content-addressed decision store plus the profile registry's durable
/// sibling. One writer per context hash; last write wins.
pub struct Librarian {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl Librarian {
    pub fn open(db_path: &Path) -> ArgusResult<Self> {
        let pool = LibrarianDb::init(db_path)?;
        Ok(Self { pool })
    }

    fn db(&self) -> ArgusResult<LibrarianDb> {
        LibrarianDb::from_pool(&self.pool)
    }

    /// Stable prompt digest: SHA-256 over `role:content\n` per message.
    pub fn compute_hash(messages: &[Message]) -> String {
        let mut hasher = Sha256::new();
        for msg in messages {
            hasher.update(msg.role.as_bytes());
            hasher.update(b":");
            hasher.update(msg.content.as_bytes());
            hasher.update(b"\n");
        }
        hex(&hasher.finalize())
    }

    /// Code-fragment digest, independent of prompt wording.
    pub fn snippet_hash(snippet: &str) -> String {
        blake3::hash(snippet.as_bytes()).to_hex().to_string()
    }

    /// Exact-context lookup.
    pub fn query(&self, messages: &[Message]) -> ArgusResult<Option<CachedDecision>> {
        let context_hash = Self::compute_hash(messages);
        let record = self.db()?.get_decision(&context_hash);
        Ok(record.map(Self::into_cached))
    }

    /// Reuse across prompt phrasing: lookup by `(check_id, snippet_hash)`.
    pub fn query_semantic(
        &self,
        check_id: &str,
        snippet_hash: &str,
    ) -> ArgusResult<Option<CachedDecision>> {
        let record = self.db()?.find_decision(check_id, snippet_hash);
        Ok(record.map(Self::into_cached))
    }

    /// Persist an oracle decision. Indexed columns come from the first
    /// analysis entry.
    pub fn store(
        &self,
        messages: &[Message],
        response_content: &str,
        analysis: &[AnalysisEntry],
        model: &str,
        snippet_hash: Option<&str>,
    ) -> ArgusResult<()> {
        let context_hash = Self::compute_hash(messages);

        let (check_id, verdict, rationale, remediation) = match analysis.first() {
            Some(first) => (
                first.check_id.clone(),
                serde_json::to_value(first.verdict)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
                first.rationale.clone(),
                first.remediation.clone(),
            ),
            None => Default::default(),
        };

        let record = DecisionRecord {
            context_hash,
            check_id,
            verdict,
            rationale,
            remediation,
            timestamp: chrono::Utc::now().to_rfc3339(),
            model: model.to_string(),
            raw_response: response_content.to_string(),
            snippet_hash: snippet_hash.unwrap_or_default().to_string(),
        };

        debug!(target: "librarian", "storing decision {}", &record.context_hash[..12]);
        self.db()?.store_decision(&record)
    }

    pub fn decision_count(&self) -> ArgusResult<i64> {
        self.db()?.decision_count()
    }

    pub fn clear(&self) -> ArgusResult<()> {
        self.db()?.clear()
    }

    fn into_cached(record: DecisionRecord) -> CachedDecision {
        // Re-parse the stored raw response; a record whose body no longer
        // parses still serves verdict metadata with an empty analysis list.
        let analysis = decode(&record.raw_response)
            .map(|r| r.analysis)
            .unwrap_or_default();
        CachedDecision {
            provider: "librarian".to_string(),
            model: record.model,
            response: record.raw_response,
            analysis,
            cached: true,
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// -------------------------------------------------------------------------
//  Tests
// -------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::Verdict;

    fn open() -> (tempfile::TempDir, Librarian) {
        let td = tempfile::tempdir().unwrap();
        let lib = Librarian::open(&td.path().join("librarian.sqlite")).unwrap();
        (td, lib)
    }

    fn prompt(text: &str) -> Vec<Message> {
        vec![
            Message::system("You analyze code security findings."),
            Message::user(text),
        ]
    }

    fn analysis() -> Vec<AnalysisEntry> {
        vec![AnalysisEntry {
            check_id: "py.exec".into(),
            verdict: Verdict::TruePositive,
            rationale: "direct exec of user data".into(),
            remediation: "use a whitelist".into(),
        }]
    }

    #[test]
    fn context_hash_is_stable_and_content_sensitive() {
        let a = Librarian::compute_hash(&prompt("check this"));
        let b = Librarian::compute_hash(&prompt("check this"));
        let c = Librarian::compute_hash(&prompt("check that"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64); // 32-byte digest, hex
    }

    #[test]
    fn store_then_query_round_trips_with_cache_source() {
        let (_td, lib) = open();
        let messages = prompt("is this dangerous?");
        let body = r#"{"analysis": [{"check_id": "py.exec", "verdict": "True Positive", "rationale": "r", "remediation": "m"}]}"#;

        assert!(lib.query(&messages).unwrap().is_none());

        lib.store(&messages, body, &analysis(), "oracle-1", Some("snip"))
            .unwrap();

        let hit = lib.query(&messages).unwrap().unwrap();
        assert!(hit.cached);
        assert_eq!(hit.provider, "librarian");
        assert_eq!(hit.model, "oracle-1");
        assert_eq!(hit.analysis.len(), 1);
        assert_eq!(hit.analysis[0].check_id, "py.exec");
    }

    #[test]
    fn semantic_lookup_survives_prompt_rewording() {
        let (_td, lib) = open();
        let body = r#"{"analysis": [{"check_id": "py.exec", "verdict": "False Positive", "rationale": "r", "remediation": "m"}]}"#;
        let snippet_hash = Librarian::snippet_hash("exec(cmd)");

        lib.store(
            &prompt("original wording"),
            body,
            &[AnalysisEntry {
                check_id: "py.exec".into(),
                verdict: Verdict::FalsePositive,
                rationale: "r".into(),
                remediation: "m".into(),
            }],
            "oracle-1",
            Some(&snippet_hash),
        )
        .unwrap();

        // A new prompt hashes differently but the snippet is the same.
        let h1 = Librarian::compute_hash(&prompt("original wording"));
        let h2 = Librarian::compute_hash(&prompt("new wording"));
        assert_ne!(h1, h2);

        let hit = lib.query_semantic("py.exec", &snippet_hash).unwrap().unwrap();
        assert!(hit.cached);
        assert_eq!(hit.analysis[0].check_id, "py.exec");
    }

    #[test]
    fn fenced_raw_response_still_parses_on_read() {
        let (_td, lib) = open();
        let messages = prompt("fenced");
        let body = "```json\n{\"analysis\": [{\"check_id\": \"k\", \"verdict\": \"Needs Review\"}]}\n```";

        lib.store(&messages, body, &[], "oracle-1", None).unwrap();
        let hit = lib.query(&messages).unwrap().unwrap();
        assert_eq!(hit.analysis.len(), 1);
    }

    #[test]
    fn clear_empties_the_store() {
        let (_td, lib) = open();
        lib.store(&prompt("x"), "{}", &[], "m", None).unwrap();
        assert_eq!(lib.decision_count().unwrap(), 1);
        lib.clear().unwrap();
        assert_eq!(lib.decision_count().unwrap(), 0);
    }
}
