//! SQLite persistence layer.
//!
//! RULE: Only store.rs talks to the database.
//! The engine calls store methods; subsystems never touch SQL.

use rusqlite::{params, Connection, OptionalExtension};
use crate::{
    error::SimResult,
    event::EventLogEntry,
    types::Tick,
};

pub struct CompanionStore {
    conn: Connection,
}

impl CompanionStore {
    /// Open (or create) the save database at `path`.
    pub fn open(path: &str) -> SimResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode: better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SimResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SimResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Companion ──────────────────────────────────────────────

    pub fn insert_companion(
        &self,
        companion_id: &str,
        seed: u64,
        version: &str,
        created_at: &str,
    ) -> SimResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO companion (companion_id, seed, version, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![companion_id, seed as i64, version, created_at],
        )?;
        Ok(())
    }

    pub fn companion_seed(&self, companion_id: &str) -> SimResult<Option<u64>> {
        let seed = self
            .conn
            .query_row(
                "SELECT seed FROM companion WHERE companion_id = ?1",
                params![companion_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(seed.map(|s| s as u64))
    }

    // ── Event log ──────────────────────────────────────────────

    /// Append a whole tick's events in one transaction.
    pub fn append_events(&mut self, entries: &[EventLogEntry]) -> SimResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO event_log (companion_id, tick, subsystem, event_type, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for entry in entries {
                stmt.execute(params![
                    entry.companion_id,
                    entry.tick as i64,
                    entry.subsystem,
                    entry.event_type,
                    entry.payload,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn events_for_tick(&self, companion_id: &str, tick: Tick) -> SimResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, companion_id, tick, subsystem, event_type, payload
             FROM event_log WHERE companion_id = ?1 AND tick = ?2
             ORDER BY id ASC"
        )?;
        let entries = stmt.query_map(params![companion_id, tick as i64], |row| {
            Ok(EventLogEntry {
                id:           Some(row.get(0)?),
                companion_id: row.get(1)?,
                tick:         row.get::<_, i64>(2)? as u64,
                subsystem:    row.get(3)?,
                event_type:   row.get(4)?,
                payload:      row.get(5)?,
            })
        })?.collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Event counts by type, for summaries.
    pub fn event_counts(&self, companion_id: &str) -> SimResult<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_type, COUNT(*) FROM event_log
             WHERE companion_id = ?1
             GROUP BY event_type ORDER BY event_type ASC"
        )?;
        let rows = stmt
            .query_map(params![companion_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Snapshot ───────────────────────────────────────────────

    pub fn save_snapshot(&self, companion_id: &str, tick: Tick, state_json: &str) -> SimResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO snapshot (companion_id, tick, state_json) VALUES (?1, ?2, ?3)",
            params![companion_id, tick as i64, state_json],
        )?;
        Ok(())
    }

    pub fn latest_snapshot(&self, companion_id: &str) -> SimResult<Option<(Tick, String)>> {
        let result = self
            .conn
            .query_row(
                "SELECT tick, state_json FROM snapshot
                 WHERE companion_id = ?1
                 ORDER BY tick DESC LIMIT 1",
                params![companion_id],
                |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(result)
    }
}
