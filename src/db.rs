use crate::dilution::{sum_shares, DilutionImpact, Stakeholder};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A recorded dilution scenario (proposed issuance against a named cap table)
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Scenario {
    /// Stable identity (UUID)
    pub id: String,
    pub cap_table: String,
    pub new_shares: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valuation_pre: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valuation_post: Option<f64>,
    pub impact: DilutionImpact,
    pub created_at: DateTime<Utc>,
}

impl Scenario {
    pub fn new(
        cap_table: &str,
        new_shares: u64,
        valuation_pre: Option<f64>,
        valuation_post: Option<f64>,
        impact: DilutionImpact,
    ) -> Self {
        Scenario {
            id: uuid::Uuid::new_v4().to_string(),
            cap_table: cap_table.to_string(),
            new_shares,
            valuation_pre,
            valuation_post,
            impact,
            created_at: Utc::now(),
        }
    }

    /// Hash of the scenario inputs, used to skip re-recording the same proposal.
    /// Identity = id (UUID), Deduplication = hash
    ///
    /// Covers every holding the impact was computed from, so re-saving a cap
    /// table with different rows makes the same proposal a new scenario.
    pub fn compute_idempotency_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{:?}|{:?}",
            self.cap_table, self.new_shares, self.valuation_pre, self.valuation_post
        ));
        for s in &self.impact.stakeholders {
            hasher.update(format!(
                "|{}:{}:{:?}",
                s.stakeholder.id, s.stakeholder.current_shares, s.stakeholder.current_ownership
            ));
        }
        format!("{:x}", hasher.finalize())
    }
}

fn shares_to_sql(shares: u64) -> Result<i64> {
    i64::try_from(shares)
        .with_context(|| format!("Share count {} is too large to store", shares))
}

fn shares_from_sql(column: usize, shares: i64) -> rusqlite::Result<u64> {
    u64::try_from(shares).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(column, shares))
}

/// Event for audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Per-table rollup for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapTableSummary {
    pub name: String,
    pub stakeholder_count: i64,
    pub total_shares: i64,
    pub scenario_count: i64,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Cap table rows
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS stakeholders (
            cap_table TEXT NOT NULL,
            stakeholder_id TEXT NOT NULL,
            name TEXT NOT NULL,
            shares INTEGER NOT NULL,
            ownership REAL NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (cap_table, stakeholder_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Scenarios (impact stored as JSON)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS scenarios (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            scenario_uuid TEXT UNIQUE NOT NULL,
            idempotency_hash TEXT UNIQUE NOT NULL,
            cap_table TEXT NOT NULL,
            new_shares INTEGER NOT NULL,
            valuation_pre REAL,
            valuation_post REAL,
            impact TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scenarios_cap_table ON scenarios(cap_table)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

/// Replace the named cap table with `stakeholders`. Returns rows written.
pub fn save_cap_table(conn: &Connection, name: &str, stakeholders: &[Stakeholder]) -> Result<usize> {
    let now = Utc::now().to_rfc3339();
    let tx = conn.unchecked_transaction()?;

    tx.execute("DELETE FROM stakeholders WHERE cap_table = ?1", params![name])?;

    for s in stakeholders {
        let shares = shares_to_sql(s.current_shares)
            .with_context(|| format!("Stakeholder {} in {}", s.id, name))?;
        tx.execute(
            "INSERT INTO stakeholders (cap_table, stakeholder_id, name, shares, ownership, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![name, s.id, s.name, shares, s.current_ownership, now],
        )
        .with_context(|| format!("Failed to save stakeholder {} in {}", s.id, name))?;
    }

    let event = Event::new(
        "cap_table_saved",
        "cap_table",
        name,
        serde_json::json!({
            "stakeholders": stakeholders.len(),
            "total_shares": sum_shares(stakeholders.iter().map(|s| s.current_shares)),
        }),
        "scenario_store",
    );
    insert_event(&tx, &event)?;

    tx.commit()?;

    tracing::info!(cap_table = name, rows = stakeholders.len(), "cap table saved");

    Ok(stakeholders.len())
}

/// Load a cap table, largest holders first. Unknown names return an empty table.
pub fn load_cap_table(conn: &Connection, name: &str) -> Result<Vec<Stakeholder>> {
    let mut stmt = conn.prepare(
        "SELECT stakeholder_id, name, shares, ownership
         FROM stakeholders
         WHERE cap_table = ?1
         ORDER BY shares DESC, stakeholder_id ASC",
    )?;

    let stakeholders = stmt
        .query_map(params![name], |row| {
            let shares: i64 = row.get(2)?;
            Ok(Stakeholder {
                id: row.get(0)?,
                name: row.get(1)?,
                current_shares: shares_from_sql(2, shares)?,
                current_ownership: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(stakeholders)
}

pub fn list_cap_tables(conn: &Connection) -> Result<Vec<CapTableSummary>> {
    let mut stmt = conn.prepare(
        "SELECT
            s.cap_table,
            COUNT(*) as stakeholder_count,
            SUM(s.shares) as total_shares,
            (SELECT COUNT(*) FROM scenarios sc WHERE sc.cap_table = s.cap_table) as scenario_count
         FROM stakeholders s
         GROUP BY s.cap_table
         ORDER BY s.cap_table",
    )?;

    let summaries = stmt
        .query_map([], |row| {
            Ok(CapTableSummary {
                name: row.get(0)?,
                stakeholder_count: row.get(1)?,
                total_shares: row.get(2)?,
                scenario_count: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(summaries)
}

/// Record a scenario. Returns `false` if the same inputs were already recorded.
pub fn record_scenario(conn: &Connection, scenario: &Scenario) -> Result<bool> {
    let hash = scenario.compute_idempotency_hash();
    let impact_json = serde_json::to_string(&scenario.impact)?;
    let new_shares = shares_to_sql(scenario.new_shares)?;

    // Scenario row and its audit event land together or not at all
    let tx = conn.unchecked_transaction()?;

    let result = tx.execute(
        "INSERT INTO scenarios (
            scenario_uuid, idempotency_hash, cap_table, new_shares,
            valuation_pre, valuation_post, impact, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            scenario.id,
            hash,
            scenario.cap_table,
            new_shares,
            scenario.valuation_pre,
            scenario.valuation_post,
            impact_json,
            scenario.created_at.to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => {
            let event = Event::new(
                "scenario_recorded",
                "cap_table",
                &scenario.cap_table,
                serde_json::json!({
                    "scenario_id": scenario.id,
                    "new_shares": scenario.new_shares,
                    "total_shares_after": scenario.impact.total_shares_after,
                }),
                "scenario_store",
            );
            insert_event(&tx, &event)?;
            tx.commit()?;

            tracing::info!(
                cap_table = %scenario.cap_table,
                scenario_id = %scenario.id,
                "scenario recorded"
            );
            Ok(true)
        }
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            tracing::debug!(cap_table = %scenario.cap_table, "duplicate scenario skipped");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Id of the stored scenario with the same inputs, if any
pub fn find_recorded_scenario_id(conn: &Connection, scenario: &Scenario) -> Result<Option<String>> {
    let id = conn
        .query_row(
            "SELECT scenario_uuid FROM scenarios WHERE idempotency_hash = ?1",
            params![scenario.compute_idempotency_hash()],
            |row| row.get(0),
        )
        .optional()?;

    Ok(id)
}

/// Scenarios for a cap table, newest first
pub fn get_scenarios(conn: &Connection, cap_table: &str) -> Result<Vec<Scenario>> {
    let mut stmt = conn.prepare(
        "SELECT scenario_uuid, cap_table, new_shares, valuation_pre, valuation_post,
                impact, created_at
         FROM scenarios
         WHERE cap_table = ?1
         ORDER BY id DESC",
    )?;

    let scenarios = stmt
        .query_map(params![cap_table], |row| {
            let new_shares: i64 = row.get(2)?;
            let impact_json: String = row.get(5)?;
            let created_at_str: String = row.get(6)?;

            Ok(Scenario {
                id: row.get(0)?,
                cap_table: row.get(1)?,
                new_shares: shares_from_sql(2, new_shares)?,
                valuation_pre: row.get(3)?,
                valuation_post: row.get(4)?,
                impact: serde_json::from_str(&impact_json)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?,
                created_at: DateTime::parse_from_rfc3339(&created_at_str)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?
                    .with_timezone(&Utc),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(scenarios)
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}
