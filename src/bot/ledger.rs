//! Persistent SQLite point ledger.
//!
//! One row per participant, keyed by GroupMe user id. People who are only
//! ever mentioned by name get a random surrogate id when first referenced.
//! Every operation takes the connection lock for its whole duration and runs
//! in a single transaction, so a failure rolls back whatever it wrote.

use rand::Rng;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::fmt;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Range surrogate ids are drawn from.
pub const SURROGATE_ID_RANGE: RangeInclusive<i64> = 9_999_999..=100_000_000;

/// How a ledger row is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    /// GroupMe user id (or a surrogate id).
    ById(i64),
    /// Exact display name.
    ByName(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::ById(id) => write!(f, "{id}"),
            Key::ByName(name) => write!(f, "{name}"),
        }
    }
}

/// A ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: i64,
    pub name: String,
    pub points: i64,
}

#[derive(Debug)]
pub enum LedgerError {
    /// The database could not be opened at startup.
    Unavailable,
    /// A statement failed; its transaction was rolled back.
    Query(rusqlite::Error),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Unavailable => write!(f, "not connected to database"),
            LedgerError::Query(e) => write!(f, "query failed: {e}"),
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LedgerError::Unavailable => None,
            LedgerError::Query(e) => Some(e),
        }
    }
}

pub struct Ledger {
    conn: Mutex<Option<Connection>>,
}

impl Ledger {
    /// Open (or create) the ledger at `path`.
    ///
    /// A database that cannot be opened leaves the ledger unavailable rather
    /// than aborting: every later call fails with [`LedgerError::Unavailable`].
    pub fn open(path: &Path) -> Self {
        let conn = match Connection::open(path) {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to open database {:?}: {e}", path);
                return Self::unavailable();
            }
        };

        match init_schema(&conn) {
            Ok(()) => {
                info!("Connected to database {:?}", path);
                Self { conn: Mutex::new(Some(conn)) }
            }
            Err(e) => {
                error!("Failed to initialize database schema: {e}");
                Self::unavailable()
            }
        }
    }

    /// Create a new in-memory ledger.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
        init_schema(&conn).expect("Failed to initialize database schema");
        Self { conn: Mutex::new(Some(conn)) }
    }

    /// A ledger with no connection.
    pub fn unavailable() -> Self {
        Self { conn: Mutex::new(None) }
    }

    #[cfg(test)]
    pub fn is_available(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` in a transaction, committing on success.
    fn with_tx<T>(
        &self,
        op: &str,
        f: impl FnOnce(&Transaction<'_>) -> rusqlite::Result<T>,
    ) -> Result<T, LedgerError> {
        let mut guard = self.lock();
        let Some(conn) = guard.as_mut() else {
            warn!("Failed {op}: not connected to database");
            return Err(LedgerError::Unavailable);
        };

        let result = conn.transaction().and_then(|tx| {
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        });

        result.map_err(|e| {
            warn!("Failed {op}: {e}");
            LedgerError::Query(e)
        })
    }

    /// Whether a row with exactly this id exists.
    pub fn exists(&self, id: i64) -> Result<bool, LedgerError> {
        self.with_tx("checking player", |tx| id_taken(tx, id))
    }

    /// Fetch a row without creating it.
    #[cfg(test)]
    pub fn player(&self, key: &Key) -> Result<Option<Player>, LedgerError> {
        self.with_tx("fetching player", |tx| find_player(tx, key))
    }

    /// Current points for `key`, creating the row at zero if it is unknown.
    pub fn get_points(&self, key: &Key) -> Result<i64, LedgerError> {
        self.with_tx("retrieving player points", |tx| points_or_create(tx, key))
    }

    /// Add one point, returning the new total.
    pub fn add_point(&self, key: &Key) -> Result<i64, LedgerError> {
        let points = self.adjust_points(key, 1)?;
        info!("ADD: point to {key}; now has {points} point(s).");
        Ok(points)
    }

    /// Take one point away, returning the new total. There is no floor.
    pub fn sub_point(&self, key: &Key) -> Result<i64, LedgerError> {
        let points = self.adjust_points(key, -1)?;
        info!("SUB: point from {key}; now has {points} point(s).");
        Ok(points)
    }

    /// The single read-modify-write path for point changes. The read and the
    /// update share one transaction.
    fn adjust_points(&self, key: &Key, delta: i64) -> Result<i64, LedgerError> {
        self.with_tx("adjusting points", |tx| {
            let current = points_or_create(tx, key)?;
            match key {
                Key::ById(id) => tx.execute(
                    "UPDATE players SET points = points + ?1 WHERE id = ?2",
                    params![delta, id],
                )?,
                Key::ByName(name) => tx.execute(
                    "UPDATE players SET points = points + ?1 WHERE name = ?2",
                    params![delta, name],
                )?,
            };
            Ok(current + delta)
        })
    }

    /// Insert a new row. Fails if the id is already present.
    pub fn add_player(&self, id: i64, name: &str, points: i64) -> Result<(), LedgerError> {
        self.with_tx("adding player", |tx| insert_player(tx, id, name, points))
    }

    /// Set the display name of the row(s) addressed by `key`. Returns the
    /// number of rows renamed.
    pub fn change_player_name(&self, new_name: &str, key: &Key) -> Result<usize, LedgerError> {
        let changed = self.with_tx("changing name", |tx| match key {
            Key::ById(id) => tx.execute(
                "UPDATE players SET name = ?1 WHERE id = ?2",
                params![new_name, id],
            ),
            Key::ByName(old) => tx.execute(
                "UPDATE players SET name = ?1 WHERE name = ?2",
                params![new_name, old],
            ),
        })?;
        info!("DB: {key} name changed to {new_name} ({changed} row(s))");
        Ok(changed)
    }

    /// Draw an id from [`SURROGATE_ID_RANGE`] that no row uses yet.
    #[allow(dead_code)]
    pub fn new_surrogate_id(&self) -> Result<i64, LedgerError> {
        self.with_tx("generating id", |tx| surrogate_id(tx))
    }

    /// Number of rows in the ledger.
    pub fn player_count(&self) -> Result<usize, LedgerError> {
        self.with_tx("counting players", |tx| {
            tx.query_row("SELECT COUNT(*) FROM players", [], |row| row.get::<_, i64>(0))
        })
        .map(|count| count as usize)
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    let table_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'players')",
        [],
        |row| row.get(0),
    )?;

    if !table_exists {
        warn!("DB: players table not found, creating...");
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS players (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            points INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_players_name ON players(name);
    "#,
    )
}

fn player_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Player> {
    Ok(Player {
        id: row.get(0)?,
        name: row.get(1)?,
        points: row.get(2)?,
    })
}

fn id_taken(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM players WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )
}

fn find_player(conn: &Connection, key: &Key) -> rusqlite::Result<Option<Player>> {
    match key {
        Key::ById(id) => conn
            .query_row(
                "SELECT id, name, points FROM players WHERE id = ?1",
                params![id],
                player_from_row,
            )
            .optional(),
        Key::ByName(name) => conn
            .query_row(
                "SELECT id, name, points FROM players WHERE name = ?1 ORDER BY id LIMIT 1",
                params![name],
                player_from_row,
            )
            .optional(),
    }
}

fn insert_player(conn: &Connection, id: i64, name: &str, points: i64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO players (id, name, points) VALUES (?1, ?2, ?3)",
        params![id, name, points],
    )?;
    info!("DB: Added {name} to table with id# {id} and {points} point(s).");
    Ok(())
}

fn surrogate_id(conn: &Connection) -> rusqlite::Result<i64> {
    let mut rng = rand::rng();
    loop {
        let id = rng.random_range(SURROGATE_ID_RANGE);
        if !id_taken(conn, id)? {
            return Ok(id);
        }
    }
}

/// Points for `key`, inserting a zero row when nothing matches. Names get a
/// surrogate id; an unknown numeric id is stored under that id.
fn points_or_create(conn: &Connection, key: &Key) -> rusqlite::Result<i64> {
    if let Some(player) = find_player(conn, key)? {
        debug!("DB: Fetched points of {key} who has {} point(s).", player.points);
        return Ok(player.points);
    }

    let id = match key {
        Key::ById(id) => *id,
        Key::ByName(_) => surrogate_id(conn)?,
    };
    insert_player(conn, id, &key.to_string(), 0)?;
    Ok(0)
}
