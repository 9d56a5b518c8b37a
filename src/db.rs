//! Decision record store
//!
//! SQLite holds one row per decision plus its variants and arguments in
//! child tables, ordered by position. Analysis results are JSON columns.
//! Completed and failed rows are frozen: `update_analysis` will not touch
//! them, so a late or duplicate writer cannot overwrite a terminal result.

use crate::types::{AnalysisStatus, ArgumentInput, ArgumentType, DecisionRecord, DecisionSubmission};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS decisions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    context TEXT NOT NULL,
    selected_variant TEXT,
    outcome TEXT,
    outcome_recorded_at TEXT,
    analysis_status TEXT NOT NULL DEFAULT 'pending',
    ml_scores TEXT,             -- JSON object: variant -> score
    llm_analysis TEXT,          -- JSON critique or failure detail
    retrieved_context TEXT,     -- JSON array of canonical texts
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS decision_variants (
    decision_id TEXT NOT NULL REFERENCES decisions(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    PRIMARY KEY (decision_id, position)
);

CREATE TABLE IF NOT EXISTS decision_arguments (
    decision_id TEXT NOT NULL REFERENCES decisions(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    variant_name TEXT NOT NULL,
    text TEXT NOT NULL,
    arg_type TEXT NOT NULL,
    PRIMARY KEY (decision_id, position)
);

CREATE INDEX IF NOT EXISTS idx_decisions_user ON decisions(user_id, created_at);
"#;

/// Status transition plus whichever results are known at that point
#[derive(Debug, Clone)]
pub struct AnalysisUpdate {
    pub status: AnalysisStatus,
    pub ml_scores: Option<BTreeMap<String, f64>>,
    pub llm_analysis: Option<serde_json::Value>,
    pub retrieved_context: Option<Vec<String>>,
}

impl AnalysisUpdate {
    pub fn status(status: AnalysisStatus) -> Self {
        Self {
            status,
            ml_scores: None,
            llm_analysis: None,
            retrieved_context: None,
        }
    }
}

#[derive(Clone)]
pub struct DecisionStore {
    conn: Arc<Mutex<Connection>>,
}

impl DecisionStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("decision store connection poisoned"))
    }

    /// Persist a validated submission as a new `pending` decision
    pub fn create(&self, submission: &DecisionSubmission, user_id: Uuid) -> Result<DecisionRecord> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO decisions
                (id, user_id, context, selected_variant, analysis_status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                id.to_string(),
                user_id.to_string(),
                submission.context,
                submission.selected_variant,
                AnalysisStatus::Pending.as_str(),
                created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;

        for (position, name) in submission.variants.iter().enumerate() {
            tx.execute(
                "INSERT INTO decision_variants (decision_id, position, name) VALUES (?1, ?2, ?3)",
                params![id.to_string(), position as i64, name],
            )?;
        }
        for (position, arg) in submission.arguments.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO decision_arguments (decision_id, position, variant_name, text, arg_type)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    id.to_string(),
                    position as i64,
                    arg.variant_name,
                    arg.text,
                    arg.kind.as_str(),
                ],
            )?;
        }
        tx.commit().context("Failed to persist decision")?;

        Ok(DecisionRecord {
            id,
            user_id,
            context: submission.context.clone(),
            variants: submission.variants.clone(),
            arguments: submission.arguments.clone(),
            selected_variant: submission.selected_variant.clone(),
            outcome: None,
            status: AnalysisStatus::Pending,
            ml_scores: None,
            llm_analysis: None,
            retrieved_context: None,
            created_at,
        })
    }

    pub fn get(&self, decision_id: Uuid) -> Result<Option<DecisionRecord>> {
        let conn = self.conn()?;
        load_record(&conn, &decision_id.to_string())
    }

    /// Apply a status transition. Returns false when the decision is
    /// missing or already terminal.
    pub fn update_analysis(&self, decision_id: Uuid, update: AnalysisUpdate) -> Result<bool> {
        let ml_scores = update.ml_scores.as_ref().map(serde_json::to_string).transpose()?;
        let llm_analysis = update.llm_analysis.as_ref().map(serde_json::to_string).transpose()?;
        let retrieved = update
            .retrieved_context
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE decisions
            SET analysis_status = ?2,
                ml_scores = COALESCE(?3, ml_scores),
                llm_analysis = COALESCE(?4, llm_analysis),
                retrieved_context = COALESCE(?5, retrieved_context)
            WHERE id = ?1 AND analysis_status NOT IN ('completed', 'failed')
            "#,
            params![
                decision_id.to_string(),
                update.status.as_str(),
                ml_scores,
                llm_analysis,
                retrieved,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Newest first, optionally restricted to one user
    pub fn history(
        &self,
        user_id: Option<Uuid>,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<DecisionRecord>> {
        let conn = self.conn()?;
        let ids: Vec<String> = {
            let mut stmt = conn.prepare(
                r#"
                SELECT id FROM decisions
                WHERE ?1 IS NULL OR user_id = ?1
                ORDER BY created_at DESC, rowid DESC
                LIMIT ?2 OFFSET ?3
                "#,
            )?;
            let rows = stmt.query_map(
                params![user_id.map(|u| u.to_string()), limit as i64, skip as i64],
                |row| row.get(0),
            )?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = load_record(&conn, &id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Record what actually happened after the decision was made
    pub fn record_outcome(
        &self,
        decision_id: Uuid,
        outcome: &str,
        selected_variant: Option<&str>,
    ) -> Result<Option<DecisionRecord>> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE decisions
            SET outcome = ?2,
                selected_variant = COALESCE(?3, selected_variant),
                outcome_recorded_at = ?4
            WHERE id = ?1
            "#,
            params![
                decision_id.to_string(),
                outcome,
                selected_variant,
                Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        load_record(&conn, &decision_id.to_string())
    }

    /// Remove a decision with its variants and arguments. Deleting a
    /// missing id is not an error.
    pub fn delete(&self, decision_id: Uuid) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let id = decision_id.to_string();
        tx.execute("DELETE FROM decision_arguments WHERE decision_id = ?1", [&id])?;
        tx.execute("DELETE FROM decision_variants WHERE decision_id = ?1", [&id])?;
        let removed = tx.execute("DELETE FROM decisions WHERE id = ?1", [&id])?;
        tx.commit()?;
        Ok(removed > 0)
    }
}

struct DecisionRow {
    user_id: String,
    context: String,
    selected_variant: Option<String>,
    outcome: Option<String>,
    status: String,
    ml_scores: Option<String>,
    llm_analysis: Option<String>,
    retrieved_context: Option<String>,
    created_at: String,
}

fn load_record(conn: &Connection, id: &str) -> Result<Option<DecisionRecord>> {
    let row = conn
        .query_row(
            r#"
            SELECT user_id, context, selected_variant, outcome, analysis_status,
                   ml_scores, llm_analysis, retrieved_context, created_at
            FROM decisions WHERE id = ?1
            "#,
            [id],
            |row| {
                Ok(DecisionRow {
                    user_id: row.get(0)?,
                    context: row.get(1)?,
                    selected_variant: row.get(2)?,
                    outcome: row.get(3)?,
                    status: row.get(4)?,
                    ml_scores: row.get(5)?,
                    llm_analysis: row.get(6)?,
                    retrieved_context: row.get(7)?,
                    created_at: row.get(8)?,
                })
            },
        )
        .optional()?;

    let Some(row) = row else {
        return Ok(None);
    };

    let variants = {
        let mut stmt = conn.prepare(
            "SELECT name FROM decision_variants WHERE decision_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map([id], |row| row.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };

    let arguments = {
        let mut stmt = conn.prepare(
            r#"
            SELECT variant_name, text, arg_type FROM decision_arguments
            WHERE decision_id = ?1 ORDER BY position
            "#,
        )?;
        let rows = stmt.query_map([id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?;

        let mut arguments = Vec::new();
        for row in rows {
            let (variant_name, text, kind) = row?;
            let kind = ArgumentType::from_str(&kind)
                .ok_or_else(|| anyhow!("unknown argument type '{}' on decision {}", kind, id))?;
            arguments.push(ArgumentInput { variant_name, text, kind });
        }
        arguments
    };

    let status = AnalysisStatus::from_str(&row.status)
        .ok_or_else(|| anyhow!("unknown analysis status '{}' on decision {}", row.status, id))?;

    Ok(Some(DecisionRecord {
        id: Uuid::parse_str(id)?,
        user_id: Uuid::parse_str(&row.user_id)?,
        context: row.context,
        variants,
        arguments,
        selected_variant: row.selected_variant,
        outcome: row.outcome,
        status,
        ml_scores: row.ml_scores.as_deref().map(serde_json::from_str).transpose()?,
        llm_analysis: row.llm_analysis.as_deref().map(serde_json::from_str).transpose()?,
        retrieved_context: row
            .retrieved_context
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
        created_at: DateTime::parse_from_rfc3339(&row.created_at)
            .with_context(|| format!("bad created_at on decision {}", id))?
            .with_timezone(&Utc),
    }))
}
