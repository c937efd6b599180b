//! Code for creating the user table and managing user rows.
//!
//! Users are created at registration and never deleted. The cash balance
//! column belongs to the [account service](crate::account); this module only
//! sets its starting value.

use std::fmt::Display;

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

use crate::Error;

/// The cash balance given to newly registered users.
pub const DEFAULT_STARTING_CASH: f64 = 10_000.0;

/// A newtype wrapper for integer user IDs.
///
/// This helps disambiguate user IDs from other types of IDs, leading to better compile time
/// errors, and more flexible generics that can have distinct implementations for multiple ID types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct UserID(i64);

impl UserID {
    /// Create a new user ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the user ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// An opaque, externally computed password hash.
///
/// Hashing and verification happen in the authentication layer that fronts
/// this crate; the core only stores the hash text and hands it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Wrap an already computed hash string without inspecting it.
    pub fn new_unchecked(hash: &str) -> Self {
        Self(hash.to_owned())
    }
}

impl AsRef<str> for PasswordHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A user of the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// The user's ID in the application database.
    pub id: UserID,
    /// The unique name the user registered with.
    pub username: String,
    /// The user's password hash.
    pub password_hash: PasswordHash,
    /// The user's cash balance in dollars.
    pub cash: f64,
}

/// Create the user table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_user_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL,
                cash REAL NOT NULL DEFAULT 10000
                )",
        (),
    )?;

    Ok(())
}

/// Map a row from the user table to a [User].
pub fn map_row_to_user(row: &Row) -> Result<User, rusqlite::Error> {
    let raw_id = row.get(0)?;
    let username = row.get(1)?;
    let raw_password_hash: String = row.get(2)?;
    let cash = row.get(3)?;

    Ok(User {
        id: UserID::new(raw_id),
        username,
        password_hash: PasswordHash::new_unchecked(&raw_password_hash),
        cash,
    })
}

/// Create and insert a new user into the database with the default starting
/// cash balance.
///
/// # Errors
///
/// This function will return:
/// - [Error::DuplicateUsername] if `username` is already registered,
/// - or [Error::SqlError] if some other SQL related error occurred.
pub fn create_user(
    username: &str,
    password_hash: PasswordHash,
    connection: &Connection,
) -> Result<User, Error> {
    let user = connection
        .prepare(
            "INSERT INTO user (username, password) VALUES (?1, ?2)
             RETURNING id, username, password, cash",
        )?
        .query_row((username, password_hash.as_ref()), map_row_to_user)?;

    Ok(user)
}

/// Get the user from the database with an ID equal to `user_id`.
///
/// # Errors
///
/// This function will return an error if:
/// - `user_id` does not belong to a registered user.
/// - there was an error trying to access the store.
pub fn get_user_by_id(user_id: UserID, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare("SELECT id, username, password, cash FROM user WHERE id = :id")?
        .query_row(&[(":id", &user_id.as_i64())], map_row_to_user)
        .map_err(|error| error.into())
}

/// Get the user from the database with the given username.
///
/// This supports the login flow of the authentication layer that fronts this
/// crate.
///
/// # Errors
///
/// This function will return an error if:
/// - `username` does not belong to a registered user.
/// - there was an error trying to access the store.
pub fn get_user_by_username(username: &str, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare("SELECT id, username, password, cash FROM user WHERE username = :username")?
        .query_row(&[(":username", &username)], map_row_to_user)
        .map_err(|error| error.into())
}

/// Get the number of users in the database.
///
/// # Errors
///
/// Returns a [Error::SqlError] if an SQL related error occurred.
pub fn count_users(connection: &Connection) -> Result<usize, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM user;", [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|count| count as usize)
        .map_err(|error| error.into())
}

#[cfg(test)]
mod user_tests {
    use rusqlite::Connection;

    use crate::{
        Error, PasswordHash,
        user::{
            DEFAULT_STARTING_CASH, UserID, count_users, create_user, create_user_table,
            get_user_by_id, get_user_by_username,
        },
    };

    fn get_db_connection() -> Connection {
        let conn =
            Connection::open_in_memory().expect("Could not create in-memory SQLite database");
        create_user_table(&conn).expect("Could not create user table");

        conn
    }

    #[test]
    fn insert_user_succeeds() {
        let connection = get_db_connection();
        let password_hash = PasswordHash::new_unchecked("hunter2");

        let inserted_user = create_user("alice", password_hash.clone(), &connection).unwrap();

        assert!(inserted_user.id.as_i64() > 0);
        assert_eq!(inserted_user.username, "alice");
        assert_eq!(inserted_user.password_hash, password_hash);
        assert_eq!(inserted_user.cash, DEFAULT_STARTING_CASH);
    }

    #[test]
    fn insert_user_fails_with_duplicate_username() {
        let connection = get_db_connection();

        create_user("alice", PasswordHash::new_unchecked("hunter2"), &connection).unwrap();
        let result = create_user("alice", PasswordHash::new_unchecked("hunter3"), &connection);

        assert_eq!(result, Err(Error::DuplicateUsername));
    }

    #[test]
    fn get_user_fails_with_non_existent_id() {
        let connection = get_db_connection();

        let id = UserID::new(42);

        assert_eq!(get_user_by_id(id, &connection), Err(Error::NotFound));
    }

    #[test]
    fn get_user_succeeds_with_existing_id() {
        let connection = get_db_connection();
        let test_user =
            create_user("alice", PasswordHash::new_unchecked("hunter2"), &connection).unwrap();

        let retrieved_user = get_user_by_id(test_user.id, &connection).unwrap();

        assert_eq!(retrieved_user, test_user);
    }

    #[test]
    fn get_user_by_username_finds_registered_user() {
        let connection = get_db_connection();
        let test_user =
            create_user("alice", PasswordHash::new_unchecked("hunter2"), &connection).unwrap();

        let retrieved_user = get_user_by_username("alice", &connection).unwrap();
        assert_eq!(retrieved_user, test_user);

        assert_eq!(
            get_user_by_username("bob", &connection),
            Err(Error::NotFound)
        );
    }

    #[test]
    fn returns_correct_count() {
        let connection = get_db_connection();

        let count = count_users(&connection).expect("Could not get user count");
        assert_eq!(0, count, "Want zero users before insertion, got {count}");

        create_user("alice", PasswordHash::new_unchecked("hunter2"), &connection).unwrap();

        let count = count_users(&connection).expect("Could not get user count");
        assert_eq!(1, count, "Want one user after insertion, got {count}");
    }
}
