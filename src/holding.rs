//! The holdings service: owns each user's per-symbol share counts.
//!
//! A holding only exists while its share count is positive. Reaching zero
//! deletes the row, so "no row" and "no shares" mean the same thing.

use rusqlite::{Connection, Row};

use crate::{Error, database_id::DatabaseId, quote::Quote, user::UserID};

/// A user's current position in one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    /// The id for the holding.
    pub id: DatabaseId,
    /// The ID of the user who owns the position.
    pub user_id: UserID,
    /// The ticker symbol of the position.
    pub symbol: String,
    /// The display name of the security.
    pub name: String,
    /// How many shares are held. Positive while the holding exists.
    pub shares: i64,
    /// The price per share at the most recent execution against this
    /// position.
    pub price: f64,
}

/// Create the holding table.
///
/// # Errors
/// This function will return an error if the SQL query failed.
pub fn create_holding_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS holding (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            symbol TEXT NOT NULL,
            name TEXT NOT NULL,
            shares INTEGER NOT NULL,
            price REAL NOT NULL,
            UNIQUE(user_id, symbol),
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
        )",
        (),
    )?;

    Ok(())
}

/// Map a row from the holding table to a [Holding].
pub fn map_row_to_holding(row: &Row) -> Result<Holding, rusqlite::Error> {
    let id = row.get(0)?;
    let raw_user_id = row.get(1)?;
    let symbol = row.get(2)?;
    let name = row.get(3)?;
    let shares = row.get(4)?;
    let price = row.get(5)?;

    Ok(Holding {
        id,
        user_id: UserID::new(raw_user_id),
        symbol,
        name,
        shares,
        price,
    })
}

/// Get the number of shares of `symbol` held by `user_id`, zero if the
/// holding does not exist.
///
/// # Errors
/// Returns an [Error::SqlError] if the query failed.
pub fn get_shares(user_id: UserID, symbol: &str, connection: &Connection) -> Result<i64, Error> {
    connection
        .prepare("SELECT COALESCE(SUM(shares), 0) FROM holding WHERE user_id = ?1 AND symbol = ?2")?
        .query_row((user_id.as_i64(), symbol), |row| row.get(0))
        .map_err(|error| error.into())
}

/// Get all holdings for `user_id`, ordered by symbol.
///
/// # Errors
/// Returns an [Error::SqlError] if the query failed.
pub fn get_holdings(user_id: UserID, connection: &Connection) -> Result<Vec<Holding>, Error> {
    connection
        .prepare(
            "SELECT id, user_id, symbol, name, shares, price FROM holding
             WHERE user_id = ?1 ORDER BY symbol ASC",
        )?
        .query_map((user_id.as_i64(),), map_row_to_holding)?
        .map(|maybe_holding| maybe_holding.map_err(Error::SqlError))
        .collect()
}

/// Add `delta` shares of the quoted symbol to the user's position, creating
/// the holding if it does not exist yet.
///
/// This is a single upsert keyed on `(user_id, symbol)`, so callers never
/// need to check for the row first. The holding's display name and last
/// execution price are refreshed from `quote`.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidInput] if `delta` is not positive,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn increase(
    user_id: UserID,
    quote: &Quote,
    delta: i64,
    connection: &Connection,
) -> Result<Holding, Error> {
    if delta <= 0 {
        return Err(Error::InvalidInput(format!(
            "can only add a positive number of shares to a holding, got {delta}"
        )));
    }

    let holding = connection
        .prepare(
            "INSERT INTO holding (user_id, symbol, name, shares, price)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id, symbol) DO UPDATE SET
                shares = shares + excluded.shares,
                name = excluded.name,
                price = excluded.price
             RETURNING id, user_id, symbol, name, shares, price",
        )?
        .query_row(
            (
                user_id.as_i64(),
                &quote.symbol,
                &quote.name,
                delta,
                quote.price,
            ),
            map_row_to_holding,
        )?;

    Ok(holding)
}

/// Remove `delta` shares of `symbol` from the user's position.
///
/// Returns the remaining holding, or `None` when the position reached zero
/// and the row was deleted.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidInput] if `delta` is not positive,
/// - [Error::InsufficientShares] if `delta` exceeds the held share count
///   (zero when the holding does not exist),
/// - or [Error::SqlError] if there is some other SQL error.
pub fn decrease(
    user_id: UserID,
    symbol: &str,
    delta: i64,
    connection: &Connection,
) -> Result<Option<Holding>, Error> {
    if delta <= 0 {
        return Err(Error::InvalidInput(format!(
            "can only remove a positive number of shares from a holding, got {delta}"
        )));
    }

    let updated = connection
        .prepare(
            "UPDATE holding SET shares = shares - ?1
             WHERE user_id = ?2 AND symbol = ?3 AND shares >= ?1
             RETURNING id, user_id, symbol, name, shares, price",
        )?
        .query_row((delta, user_id.as_i64(), symbol), map_row_to_holding);

    let holding = match updated {
        Ok(holding) => holding,
        // Zero rows means the holding is missing or too small.
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            let held = get_shares(user_id, symbol, connection)?;

            return Err(Error::InsufficientShares {
                requested: delta,
                held,
            });
        }
        Err(error) => return Err(error.into()),
    };

    // A holding with zero shares must not exist.
    if holding.shares == 0 {
        connection.execute("DELETE FROM holding WHERE id = ?1", (holding.id,))?;

        return Ok(None);
    }

    Ok(Some(holding))
}

#[cfg(test)]
mod create_table_tests {
    use rusqlite::Connection;

    use super::create_holding_table;

    #[test]
    fn sql_is_valid() {
        let connection =
            Connection::open_in_memory().expect("Could not initialise in-memory SQLite database");

        assert_eq!(Ok(()), create_holding_table(&connection));
    }
}
