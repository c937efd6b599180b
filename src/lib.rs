//! Papertrade is the domain core of a stock-trading portfolio simulator:
//! buying and selling shares at quoted prices, cash management, portfolio
//! valuation, and an append-only trade history, backed by a SQLite database.
//!
//! The HTTP layer, session handling, password hashing, and the concrete
//! quote API client live in the application embedding this library. Every
//! operation takes an explicit, already-authenticated [UserID] — the core
//! never reads ambient session state.

#![warn(missing_docs)]

pub mod account;
pub mod currency;
mod database_id;
pub mod db;
pub mod holding;
pub mod ledger;
pub mod quote;
pub mod trading;
pub mod user;

pub use database_id::DatabaseId;
pub use db::initialize as initialize_db;
pub use quote::{Quote, QuoteConfig, QuoteProvider, StaticQuoteProvider};
pub use user::{PasswordHash, User, UserID, create_user, get_user_by_id};

/// The errors that may occur in the trading core.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The caller supplied a malformed amount or share count.
    ///
    /// The contained string describes the problem in terms suitable for
    /// showing to the user.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The quote provider does not know the requested symbol.
    #[error("no quote found for symbol \"{0}\"")]
    UnknownSymbol(String),

    /// The user's cash balance cannot cover the requested purchase.
    #[error("insufficient funds: the purchase costs {required} but only {available} is available")]
    InsufficientFunds {
        /// The total cost of the attempted purchase.
        required: f64,
        /// The cash balance at the time of the attempt.
        available: f64,
    },

    /// The user holds fewer shares than they tried to sell.
    #[error("insufficient shares: tried to sell {requested} but only {held} are held")]
    InsufficientShares {
        /// The number of shares the user tried to sell.
        requested: i64,
        /// The number of shares actually held, zero if the holding does not
        /// exist.
        held: i64,
    },

    /// The quote provider failed or did not answer within the configured
    /// deadline. No writes are performed when this occurs.
    #[error("quote lookup failed: {0}")]
    QuoteUnavailable(String),

    /// The username is already registered.
    #[error("the username is already taken")]
    DuplicateUsername,

    /// The quote table file could not be parsed.
    #[error("could not parse the quote table: {0}")]
    InvalidQuoteTable(String),

    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows, e.g.
    /// when a user ID does not refer to a registered user.
    #[error("the requested resource could not be found")]
    NotFound,

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLock,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl Error {
    /// Whether the caller may retry the failed operation as-is.
    ///
    /// Storage-level failures are transient and safe to retry because a
    /// failed workflow leaves no partial writes behind. Every other error
    /// requires the user to correct their request first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::SqlError(_) | Error::DatabaseLock)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Code 2067 occurs when a UNIQUE constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.ends_with("user.username") =>
            {
                Error::DuplicateUsername
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}
