//! The append-only trade ledger.
//!
//! Every executed buy and sell appends one row here. The module exposes no
//! update or delete: history is immutable once written.

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, database_id::DatabaseId, user::UserID};

/// One executed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// The id for the ledger entry.
    pub id: DatabaseId,
    /// The ID of the user who executed the trade.
    pub user_id: UserID,
    /// The ticker symbol that was traded.
    pub symbol: String,
    /// The signed share count: positive for a buy, negative for a sell.
    pub shares: i64,
    /// The price per share at execution.
    pub price: f64,
    /// When the trade executed.
    pub date: OffsetDateTime,
}

/// Create the ledger table.
///
/// # Errors
/// This function will return an error if the SQL query failed.
pub fn create_ledger_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS ledger (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            symbol TEXT NOT NULL,
            shares INTEGER NOT NULL,
            price REAL NOT NULL,
            date TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
        )",
        (),
    )?;

    Ok(())
}

/// Map a row from the ledger table to a [LedgerEntry].
pub fn map_row_to_ledger_entry(row: &Row) -> Result<LedgerEntry, rusqlite::Error> {
    let id = row.get(0)?;
    let raw_user_id = row.get(1)?;
    let symbol = row.get(2)?;
    let shares = row.get(3)?;
    let price = row.get(4)?;
    let date = row.get(5)?;

    Ok(LedgerEntry {
        id,
        user_id: UserID::new(raw_user_id),
        symbol,
        shares,
        price,
        date,
    })
}

/// Append one executed trade to the ledger.
///
/// `shares` is signed: callers record buys as positive counts and sells as
/// negative counts.
///
/// # Errors
/// Returns an [Error::SqlError] if the insert failed.
pub fn append(
    user_id: UserID,
    symbol: &str,
    shares: i64,
    price: f64,
    date: OffsetDateTime,
    connection: &Connection,
) -> Result<LedgerEntry, Error> {
    let entry = connection
        .prepare(
            "INSERT INTO ledger (user_id, symbol, shares, price, date)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id, user_id, symbol, shares, price, date",
        )?
        .query_row(
            (user_id.as_i64(), symbol, shares, price, date),
            map_row_to_ledger_entry,
        )?;

    Ok(entry)
}

/// Get all trades for `user_id` in the order they executed.
///
/// # Errors
/// Returns an [Error::SqlError] if the query failed.
pub fn history(user_id: UserID, connection: &Connection) -> Result<Vec<LedgerEntry>, Error> {
    // Sort by date, and then ID to keep the order stable across reads.
    connection
        .prepare(
            "SELECT id, user_id, symbol, shares, price, date FROM ledger
             WHERE user_id = ?1 ORDER BY date ASC, id ASC",
        )?
        .query_map((user_id.as_i64(),), map_row_to_ledger_entry)?
        .map(|maybe_entry| maybe_entry.map_err(Error::SqlError))
        .collect()
}
