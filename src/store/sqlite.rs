use crate::analytics::day_key;
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::store::{ErrorUpsert, Store};
use crate::types::{
    Analytics, AnalyticData, AnalyticDeltas, BucketKey, ErrorEvent, EventId,
};
use async_trait::async_trait;
use deadpool_sqlite::{Config, Pool, Runtime};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::HashMap;

const MIGRATION_001: &str = include_str!("../../migrations/001_initial.sql");

/// Apply performance PRAGMAs to a SQLite connection.
pub fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        PRAGMA temp_store = MEMORY;
        ",
    )
}

pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            id      INTEGER PRIMARY KEY,
            name    TEXT NOT NULL,
            applied INTEGER NOT NULL
        );",
    )?;

    let migrations: &[(i64, &str, &str)] = &[(1, "001_initial", MIGRATION_001)];

    for &(id, name, sql) in migrations {
        let applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !applied {
            tracing::info!(migration = name, "applying migration");
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO _migrations (id, name, applied) VALUES (?1, ?2, unixepoch())",
                params![id, name],
            )?;
        }
    }

    Ok(())
}

const ERROR_COLUMNS: &str = "id, ticket, fingerprint, message, stacktrace, path, line, \
     error_type, adapter, badges, snippet, logs, user_interactions, metrics, evolution, \
     host, user_agent, client_ip, count, timestamp, resolved, seen_by, last_seen";

/// Raw row image; JSON columns are parsed in `into_event`.
struct ErrorRow {
    id: i64,
    ticket: String,
    fingerprint: String,
    message: String,
    stacktrace: String,
    path: String,
    line: String,
    error_type: String,
    adapter: String,
    badges: String,
    snippet: String,
    logs: String,
    user_interactions: String,
    metrics: String,
    evolution: String,
    host: String,
    user_agent: String,
    client_ip: String,
    count: i64,
    timestamp: i64,
    resolved: bool,
    seen_by: String,
    last_seen: i64,
}

impl ErrorRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            ticket: row.get(1)?,
            fingerprint: row.get(2)?,
            message: row.get(3)?,
            stacktrace: row.get(4)?,
            path: row.get(5)?,
            line: row.get(6)?,
            error_type: row.get(7)?,
            adapter: row.get(8)?,
            badges: row.get(9)?,
            snippet: row.get(10)?,
            logs: row.get(11)?,
            user_interactions: row.get(12)?,
            metrics: row.get(13)?,
            evolution: row.get(14)?,
            host: row.get(15)?,
            user_agent: row.get(16)?,
            client_ip: row.get(17)?,
            count: row.get(18)?,
            timestamp: row.get(19)?,
            resolved: row.get(20)?,
            seen_by: row.get(21)?,
            last_seen: row.get(22)?,
        })
    }

    fn into_event(self) -> Result<ErrorEvent> {
        Ok(ErrorEvent {
            id: EventId::Assigned(self.id),
            message: self.message,
            stacktrace: self.stacktrace,
            evolution: serde_json::from_str(&self.evolution)?,
            path: self.path,
            line: self.line,
            kind: self.error_type,
            adapter: serde_json::from_str(&self.adapter)?,
            fingerprint: self.fingerprint,
            badges: serde_json::from_str(&self.badges)?,
            snippet: serde_json::from_str(&self.snippet)?,
            logs: serde_json::from_str(&self.logs)?,
            ticket: self.ticket,
            host: self.host,
            user_agent: self.user_agent,
            metrics: serde_json::from_str(&self.metrics)?,
            user_interactions: serde_json::from_str(&self.user_interactions)?,
            anonymize_data: false,
            client_ip: self.client_ip,
            count: self.count,
            timestamp: self.timestamp,
            resolved: self.resolved,
            seen_by: serde_json::from_str(&self.seen_by)?,
            last_seen: self.last_seen,
        })
    }
}

/// Durable store on SQLite via a deadpool connection pool. Contended
/// upserts run inside immediate transactions, which serializes writers
/// and gives the required no-lost-update semantics.
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    /// Open (or create) the database, apply PRAGMAs and run migrations.
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        let cfg = Config::new(config.path.clone());
        let pool = cfg
            .create_pool(Runtime::Tokio1)
            .map_err(|e| Error::Unavailable(e.to_string()))?;

        let conn = pool
            .get()
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))?;
        conn.interact(|conn| {
            apply_pragmas(conn)?;
            run_migrations(conn)
        })
        .await??;

        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<deadpool_sqlite::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_error(&self, event: ErrorEvent) -> Result<ErrorUpsert> {
        let conn = self.conn().await?;
        let upsert = conn
            .interact(move |conn| -> Result<ErrorUpsert> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let existing: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM errors WHERE ticket = ?1 AND fingerprint = ?2",
                        params![event.ticket, event.fingerprint],
                        |row| row.get(0),
                    )
                    .optional()?;

                let result = match existing {
                    None => {
                        tx.execute(
                            "INSERT INTO errors (
                                ticket, fingerprint, message, stacktrace, path, line,
                                error_type, adapter, badges, snippet, logs,
                                user_interactions, metrics, evolution, host, user_agent,
                                client_ip, count, timestamp, resolved, seen_by,
                                last_seen, created_at, updated_at
                            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,
                                      ?15,?16,?17,1,?18,0,'[]',?19,?19,?19)",
                            params![
                                event.ticket,
                                event.fingerprint,
                                event.message,
                                event.stacktrace,
                                event.path,
                                event.line,
                                event.kind,
                                serde_json::to_string(&event.adapter)?,
                                serde_json::to_string(&event.badges)?,
                                serde_json::to_string(&event.snippet)?,
                                serde_json::to_string(&event.logs)?,
                                serde_json::to_string(&event.user_interactions)?,
                                serde_json::to_string(&event.metrics)?,
                                serde_json::to_string(&event.evolution)?,
                                event.host,
                                event.user_agent,
                                event.client_ip,
                                event.timestamp,
                                event.last_seen,
                            ],
                        )?;
                        let id = tx.last_insert_rowid();
                        let mut stored = event;
                        stored.id = EventId::Assigned(id);
                        stored.count = 1;
                        ErrorUpsert {
                            event: stored,
                            created: true,
                        }
                    }
                    Some(id) => {
                        let evolution_json: String = tx.query_row(
                            "SELECT evolution FROM errors WHERE id = ?1",
                            [id],
                            |row| row.get(0),
                        )?;
                        let mut evolution: HashMap<String, i64> =
                            serde_json::from_str(&evolution_json)?;
                        *evolution.entry(day_key(event.last_seen)).or_insert(0) += 1;

                        tx.execute(
                            "UPDATE errors SET
                                count = count + 1,
                                last_seen = ?2,
                                evolution = ?3,
                                logs = ?4,
                                user_interactions = ?5,
                                metrics = ?6,
                                badges = ?7,
                                snippet = ?8,
                                user_agent = ?9,
                                client_ip = ?10,
                                host = ?11,
                                updated_at = ?2
                             WHERE id = ?1",
                            params![
                                id,
                                event.last_seen,
                                serde_json::to_string(&evolution)?,
                                serde_json::to_string(&event.logs)?,
                                serde_json::to_string(&event.user_interactions)?,
                                serde_json::to_string(&event.metrics)?,
                                serde_json::to_string(&event.badges)?,
                                serde_json::to_string(&event.snippet)?,
                                event.user_agent,
                                event.client_ip,
                                event.host,
                            ],
                        )?;

                        let row = tx.query_row(
                            &format!("SELECT {ERROR_COLUMNS} FROM errors WHERE id = ?1"),
                            [id],
                            ErrorRow::from_row,
                        )?;
                        ErrorUpsert {
                            event: row.into_event()?,
                            created: false,
                        }
                    }
                };

                tx.commit()?;
                Ok(result)
            })
            .await??;

        Ok(upsert)
    }

    async fn find_error(&self, ticket: &str, fingerprint: &str) -> Result<Option<ErrorEvent>> {
        let conn = self.conn().await?;
        let ticket = ticket.to_string();
        let fingerprint = fingerprint.to_string();
        let event = conn
            .interact(move |conn| -> Result<Option<ErrorEvent>> {
                let row = conn
                    .query_row(
                        &format!(
                            "SELECT {ERROR_COLUMNS} FROM errors \
                             WHERE ticket = ?1 AND fingerprint = ?2"
                        ),
                        params![ticket, fingerprint],
                        ErrorRow::from_row,
                    )
                    .optional()?;
                row.map(ErrorRow::into_event).transpose()
            })
            .await??;
        Ok(event)
    }

    async fn set_resolved(&self, ticket: &str, fingerprint: &str, resolved: bool) -> Result<()> {
        let conn = self.conn().await?;
        let ticket = ticket.to_string();
        let fingerprint = fingerprint.to_string();
        conn.interact(move |conn| -> Result<()> {
            let now = chrono::Utc::now().timestamp_millis();
            let changed = conn.execute(
                "UPDATE errors SET resolved = ?3, updated_at = ?4 \
                 WHERE ticket = ?1 AND fingerprint = ?2",
                params![ticket, fingerprint, resolved, now],
            )?;
            if changed == 0 {
                return Err(Error::NotFound(format!("error {ticket}/{fingerprint}")));
            }
            Ok(())
        })
        .await??;
        Ok(())
    }

    async fn mark_seen(&self, ticket: &str, fingerprint: &str, user: &str) -> Result<()> {
        let conn = self.conn().await?;
        let ticket = ticket.to_string();
        let fingerprint = fingerprint.to_string();
        let user = user.to_string();
        conn.interact(move |conn| -> Result<()> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let row: Option<(i64, String)> = tx
                .query_row(
                    "SELECT id, seen_by FROM errors WHERE ticket = ?1 AND fingerprint = ?2",
                    params![ticket, fingerprint],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let (id, seen_by_json) = row
                .ok_or_else(|| Error::NotFound(format!("error {ticket}/{fingerprint}")))?;

            let mut seen_by: Vec<String> = serde_json::from_str(&seen_by_json)?;
            if !seen_by.iter().any(|u| u == &user) {
                seen_by.push(user);
                let now = chrono::Utc::now().timestamp_millis();
                tx.execute(
                    "UPDATE errors SET seen_by = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, serde_json::to_string(&seen_by)?, now],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await??;
        Ok(())
    }

    async fn apply_analytics(&self, key: &BucketKey, deltas: &AnalyticDeltas) -> Result<()> {
        let conn = self.conn().await?;
        let key = key.clone();
        let deltas = deltas.clone();
        conn.interact(move |conn| -> Result<()> {
            let now = chrono::Utc::now().timestamp_millis();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existing: Option<(String, String, i64)> = tx
                .query_row(
                    "SELECT aggregated_monthly, data, created_at FROM analytics \
                     WHERE ticket = ?1 AND month = ?2",
                    params![key.ticket, key.month],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            let (mut monthly, mut data, created_at) = match existing {
                Some((monthly_json, data_json, created_at)) => (
                    serde_json::from_str::<AnalyticData>(&monthly_json)?,
                    serde_json::from_str::<HashMap<String, AnalyticData>>(&data_json)?,
                    created_at,
                ),
                None => (AnalyticData::at(key.month, 0), HashMap::new(), now),
            };

            data.entry(key.bucket_key())
                .or_insert_with(|| AnalyticData::at(key.day, key.hour))
                .apply(&deltas);
            monthly.apply(&deltas);

            tx.execute(
                "INSERT INTO analytics (
                    ticket, month, human_readable_month, aggregated_monthly,
                    data, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT (ticket, month) DO UPDATE SET
                    aggregated_monthly = excluded.aggregated_monthly,
                    data = excluded.data,
                    updated_at = excluded.updated_at",
                params![
                    key.ticket,
                    key.month,
                    key.human_month,
                    serde_json::to_string(&monthly)?,
                    serde_json::to_string(&data)?,
                    created_at,
                    now,
                ],
            )?;

            tx.commit()?;
            Ok(())
        })
        .await??;
        Ok(())
    }

    async fn analytics_in_range(
        &self,
        ticket: &str,
        from_month: i64,
        to_month: i64,
    ) -> Result<Vec<Analytics>> {
        let conn = self.conn().await?;
        let ticket = ticket.to_string();
        let docs = conn
            .interact(move |conn| -> Result<Vec<Analytics>> {
                let mut stmt = conn.prepare(
                    "SELECT ticket, month, human_readable_month, aggregated_monthly, \
                            data, created_at, updated_at \
                     FROM analytics \
                     WHERE ticket = ?1 AND month BETWEEN ?2 AND ?3 \
                     ORDER BY month",
                )?;
                let rows = stmt
                    .query_map(params![ticket, from_month, to_month], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, i64>(5)?,
                            row.get::<_, i64>(6)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                rows.into_iter()
                    .map(
                        |(ticket, month, human, monthly_json, data_json, created, updated)| {
                            Ok(Analytics {
                                ticket,
                                month,
                                human_readable_month: human,
                                aggregated_monthly_data: serde_json::from_str(&monthly_json)?,
                                data: serde_json::from_str(&data_json)?,
                                created_at: created,
                                updated_at: updated,
                            })
                        },
                    )
                    .collect()
            })
            .await??;
        Ok(docs)
    }
}
