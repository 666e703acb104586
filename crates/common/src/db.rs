use anyhow::Result;
use rusqlite::Connection;

/// Async database wrapper around `tokio_rusqlite::Connection`.
///
/// Runs all SQLite operations on a dedicated background thread via
/// `tokio_rusqlite`. Clone is cheap (shared sender to the background thread).
#[derive(Clone)]
pub struct AsyncDb {
    conn: tokio_rusqlite::Connection,
}

impl AsyncDb {
    /// Open a database at `path` (or `:memory:`), set PRAGMAs and run migrations
    /// on the background thread.
    pub async fn open(path: &str) -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open(path).await?;

        // Another process (an API instance next to a CLI seed run) may hold the
        // write lock during startup. Retry migrations with backoff instead of
        // failing hard; each attempt uses a short busy_timeout.
        let mut backoff = std::time::Duration::from_secs(1);
        let max_backoff = std::time::Duration::from_secs(30);
        let max_total_wait = std::time::Duration::from_secs(5 * 60);
        let start = std::time::Instant::now();

        loop {
            let res = conn
                .call(|conn| -> std::result::Result<(), rusqlite::Error> {
                    conn.busy_timeout(std::time::Duration::from_secs(1))?;
                    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
                    run_migrations(conn)?;
                    conn.busy_timeout(std::time::Duration::from_secs(30))?;
                    Ok(())
                })
                .await;

            match res {
                Ok(()) => break,
                Err(tokio_rusqlite::Error::Error(err)) => {
                    let is_locked = matches!(
                        err,
                        rusqlite::Error::SqliteFailure(
                            rusqlite::ffi::Error {
                                code: rusqlite::ffi::ErrorCode::DatabaseBusy
                                    | rusqlite::ffi::ErrorCode::DatabaseLocked,
                                ..
                            },
                            _,
                        )
                    );
                    if !is_locked {
                        return Err(
                            anyhow::Error::from(err).context("AsyncDb::open: migration failed")
                        );
                    }

                    if start.elapsed() >= max_total_wait {
                        return Err(anyhow::Error::from(err).context(
                            "AsyncDb::open: migration failed (database stayed locked too long)",
                        ));
                    }

                    tracing::warn!(
                        wait_for = ?backoff,
                        "AsyncDb::open: database is locked; retrying migrations"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(max_backoff);
                }
                Err(other) => return Err(anyhow::anyhow!("AsyncDb::open: {other}")),
            }
        }

        Ok(Self { conn })
    }

    /// Run a closure on the background SQLite thread and return the result.
    pub async fn call<F, R>(&self, function: F) -> Result<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.conn.call(move |conn| function(conn)).await.map_err(
            |e: tokio_rusqlite::Error<anyhow::Error>| match e {
                tokio_rusqlite::Error::ConnectionClosed => {
                    anyhow::anyhow!("database connection closed")
                }
                tokio_rusqlite::Error::Close((_, err)) => {
                    anyhow::anyhow!("database close error: {err}")
                }
                tokio_rusqlite::Error::Error(err) => err,
                other => anyhow::anyhow!("database error: {other}"),
            },
        )
    }

    /// Like [`Self::call`], but records latency and error metrics under `op`.
    ///
    /// Latency is wall-clock, so it includes queueing on the SQLite thread.
    pub async fn call_named<F, R>(&self, op: &'static str, function: F) -> Result<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let start = std::time::Instant::now();
        let res = self.call(function).await;
        let ms = start.elapsed().as_secs_f64() * 1000.0;

        let status = if res.is_ok() { "ok" } else { "err" };
        metrics::histogram!(
            "profiler_db_query_latency_ms",
            "op" => op,
            "status" => status
        )
        .record(ms);
        if res.is_err() {
            metrics::counter!("profiler_db_query_errors_total", "op" => op).increment(1);
        }

        res
    }
}

fn run_migrations(conn: &Connection) -> std::result::Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)?;
    migrate_wallets_position_column(conn)?;
    migrate_persona_contracts_address_column(conn)?;
    conn.execute_batch(INDEXES)?;
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name=?2",
        rusqlite::params![table, column],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

/// Databases created before the persona label was stored lack `position`.
fn migrate_wallets_position_column(conn: &Connection) -> rusqlite::Result<()> {
    if !has_column(conn, "wallets", "position")? {
        conn.execute("ALTER TABLE wallets ADD COLUMN position TEXT", [])?;
    }
    Ok(())
}

/// Older association tables only had (from_group, to_contract).
fn migrate_persona_contracts_address_column(conn: &Connection) -> rusqlite::Result<()> {
    if !has_column(conn, "persona_contracts", "address")? {
        conn.execute(
            "ALTER TABLE persona_contracts ADD COLUMN address TEXT NOT NULL DEFAULT ''",
            [],
        )?;
    }
    Ok(())
}

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS wallets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    address TEXT NOT NULL UNIQUE,             -- EIP-55 checksum form
    balance TEXT NOT NULL DEFAULT '0',        -- wei as decimal string (exceeds i64)
    distinct_contract_count INTEGER NOT NULL DEFAULT 0,
    dex_platform_diversity INTEGER NOT NULL DEFAULT 0,
    avg_token_holding_period REAL NOT NULL DEFAULT 0.0,
    transaction_frequency REAL NOT NULL DEFAULT 0.0,
    dex_volume_usd REAL NOT NULL DEFAULT 0.0,
    nft_collections_diversity INTEGER NOT NULL DEFAULT 0,
    explorer_score REAL,                      -- NULL until scored against a population
    diamond_score REAL,
    whale_score REAL,
    degen_score REAL,
    distinct_contract_count_percentile REAL,
    dex_platform_diversity_percentile REAL,
    avg_token_holding_period_percentile REAL,
    transaction_frequency_percentile REAL,
    dex_volume_usd_percentile REAL,
    nft_collections_diversity_percentile REAL,
    position TEXT,                            -- e.g. Whale_Diamond
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f','now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f','now'))
);

CREATE TABLE IF NOT EXISTS persona_contracts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    address TEXT NOT NULL,                    -- evaluated wallet
    from_group TEXT NOT NULL,                 -- its position label
    to_contract TEXT NOT NULL,                -- lowercase counterparty
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f','now'))
);
";

const INDEXES: &str = r"
CREATE INDEX IF NOT EXISTS idx_persona_contracts_from_group ON persona_contracts(from_group);
CREATE INDEX IF NOT EXISTS idx_persona_contracts_address ON persona_contracts(address);
";
