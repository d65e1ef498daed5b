use crate::errors::ArgusResult;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// DB schema (foreign-keys enabled).
const SCHEMA: &str = r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS decisions (
        hash         TEXT PRIMARY KEY,
        check_id     TEXT,
        verdict      TEXT,
        rationale    TEXT,
        remediation  TEXT,
        timestamp    TEXT,
        model        TEXT,
        raw_response TEXT,
        snippet_hash TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_decisions_check_id ON decisions(check_id);
    CREATE INDEX IF NOT EXISTS idx_decisions_snippet_hash ON decisions(snippet_hash);

    CREATE TABLE IF NOT EXISTS vulnerability_types (
        id             TEXT PRIMARY KEY,
        name           TEXT,
        description    TEXT,
        owasp_category TEXT,
        cwe_id         TEXT
    );

    CREATE TABLE IF NOT EXISTS remediation_strategies (
        id                    INTEGER PRIMARY KEY AUTOINCREMENT,
        vulnerability_type_id TEXT
                              REFERENCES vulnerability_types(id),
        strategy_name         TEXT,
        description           TEXT,
        code_template         TEXT
    );
"#;

/// A stored oracle decision; `hash` is the SHA-256 context digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRecord {
    pub context_hash: String,
    pub check_id: String,
    pub verdict: String,
    pub rationale: String,
    pub remediation: String,
    pub timestamp: String,
    pub model: String,
    pub raw_response: String,
    pub snippet_hash: String,
}

#[derive(Debug, Clone)]
pub struct VulnerabilityType {
    pub id: String,
    pub name: String,
    pub description: String,
    pub owasp_category: String,
    pub cwe_id: String,
}

pub struct LibrarianDb {
    conn: PooledConnection<SqliteConnectionManager>,
}

impl LibrarianDb {
    pub fn init(database_path: &Path) -> ArgusResult<Arc<Pool<SqliteConnectionManager>>> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let manager = SqliteConnectionManager::file(database_path).with_flags(flags);
        let pool = Arc::new(Pool::new(manager)?);

        {
            let conn = pool.get()?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.execute_batch(SCHEMA)?;
        }
        Ok(pool)
    }

    pub fn from_pool(pool: &Pool<SqliteConnectionManager>) -> ArgusResult<Self> {
        let conn = pool.get()?;
        Ok(Self { conn })
    }

    // helper so code below can treat PooledConnection like &Connection
    fn c(&self) -> &Connection {
        self.conn.deref()
    }

    /// Upsert a decision in one transaction; readers never see a partial row.
    pub fn store_decision(&mut self, record: &DecisionRecord) -> ArgusResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO decisions
                 (hash, check_id, verdict, rationale, remediation, timestamp, model, raw_response, snippet_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(hash) DO UPDATE
             SET check_id     = excluded.check_id,
                 verdict      = excluded.verdict,
                 rationale    = excluded.rationale,
                 remediation  = excluded.remediation,
                 timestamp    = excluded.timestamp,
                 model        = excluded.model,
                 raw_response = excluded.raw_response,
                 snippet_hash = excluded.snippet_hash",
            params![
                record.context_hash,
                record.check_id,
                record.verdict,
                record.rationale,
                record.remediation,
                record.timestamp,
                record.model,
                record.raw_response,
                record.snippet_hash,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Primary lookup by context hash. Rows failing decode are dropped, not
    /// raised.
    pub fn get_decision(&self, context_hash: &str) -> Option<DecisionRecord> {
        let result = self
            .c()
            .query_row(
                "SELECT hash, check_id, verdict, rationale, remediation,
                        timestamp, model, raw_response, snippet_hash
                 FROM decisions WHERE hash = ?1",
                params![context_hash],
                Self::decode_row,
            )
            .optional();

        match result {
            Ok(row) => row,
            Err(e) => {
                debug!(target: "librarian", "dropping corrupt decision row: {e}");
                None
            }
        }
    }

    /// Secondary lookup by `(check_id, snippet_hash)`: reuse across prompt
    /// wording changes. Most recent record wins.
    pub fn find_decision(&self, check_id: &str, snippet_hash: &str) -> Option<DecisionRecord> {
        let result = self
            .c()
            .query_row(
                "SELECT hash, check_id, verdict, rationale, remediation,
                        timestamp, model, raw_response, snippet_hash
                 FROM decisions
                 WHERE check_id = ?1 AND snippet_hash = ?2
                 ORDER BY timestamp DESC LIMIT 1",
                params![check_id, snippet_hash],
                Self::decode_row,
            )
            .optional();

        match result {
            Ok(row) => row,
            Err(e) => {
                debug!(target: "librarian", "dropping corrupt decision row: {e}");
                None
            }
        }
    }

    fn decode_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DecisionRecord> {
        Ok(DecisionRecord {
            context_hash: row.get(0)?,
            check_id: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            verdict: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            rationale: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            remediation: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            timestamp: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            model: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            raw_response: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
            snippet_hash: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        })
    }

    // -------------------------------------------------------------------------
    // Knowledge tables
    // -------------------------------------------------------------------------

    pub fn add_vulnerability_type(&self, vt: &VulnerabilityType) -> ArgusResult<()> {
        self.c().execute(
            "INSERT OR REPLACE INTO vulnerability_types
                 (id, name, description, owasp_category, cwe_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![vt.id, vt.name, vt.description, vt.owasp_category, vt.cwe_id],
        )?;
        Ok(())
    }

    pub fn get_vulnerability_type(&self, id: &str) -> ArgusResult<Option<VulnerabilityType>> {
        Ok(self
            .c()
            .query_row(
                "SELECT id, name, description, owasp_category, cwe_id
                 FROM vulnerability_types WHERE id = ?1",
                params![id],
                |row| {
                    Ok(VulnerabilityType {
                        id: row.get(0)?,
                        name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        owasp_category: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                        cwe_id: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    })
                },
            )
            .optional()?)
    }

    pub fn add_remediation_strategy(
        &self,
        vulnerability_type_id: &str,
        strategy_name: &str,
        description: &str,
        code_template: &str,
    ) -> ArgusResult<()> {
        self.c().execute(
            "INSERT INTO remediation_strategies
                 (vulnerability_type_id, strategy_name, description, code_template)
             VALUES (?1, ?2, ?3, ?4)",
            params![vulnerability_type_id, strategy_name, description, code_template],
        )?;
        Ok(())
    }

    pub fn remediation_strategies_for(&self, vulnerability_type_id: &str) -> ArgusResult<Vec<String>> {
        let mut stmt = self.c().prepare(
            "SELECT strategy_name FROM remediation_strategies
             WHERE vulnerability_type_id = ?1",
        )?;
        let iter = stmt.query_map(params![vulnerability_type_id], |row| row.get::<_, String>(0))?;
        Ok(iter.filter_map(Result::ok).collect())
    }

    // -------------------------------------------------------------------------
    // Maintenance utilities
    // -------------------------------------------------------------------------

    pub fn decision_count(&self) -> ArgusResult<i64> {
        Ok(self
            .c()
            .query_row("SELECT COUNT(*) FROM decisions", [], |r| r.get(0))?)
    }

    pub fn clear(&self) -> ArgusResult<()> {
        self.c().execute_batch(
            r#"
        PRAGMA foreign_keys = OFF;

        DROP TABLE IF EXISTS remediation_strategies;
        DROP TABLE IF EXISTS vulnerability_types;
        DROP TABLE IF EXISTS decisions;

        PRAGMA foreign_keys = ON;
        VACUUM;
        "#,
        )?;

        self.c().execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn vacuum(&self) -> ArgusResult<()> {
        self.c().execute("VACUUM;", [])?;
        Ok(())
    }
}

// -------------------------------------------------------------------------
//  Tests
// -------------------------------------------------------------------------
