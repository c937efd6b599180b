//! The account service: owns every mutation of a user's cash balance.
//!
//! Balance changes are single guarded SQL statements, so an affordability
//! check and the matching debit can never be separated by another writer.

use rusqlite::Connection;

use crate::{Error, user::UserID};

/// Get the cash balance for the user `user_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `user_id` does not refer to a registered user,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn get_balance(user_id: UserID, connection: &Connection) -> Result<f64, Error> {
    connection
        .prepare("SELECT cash FROM user WHERE id = :id")?
        .query_row(&[(":id", &user_id.as_i64())], |row| row.get(0))
        .map_err(|error| error.into())
}

/// Remove `amount` from the user's cash balance and return the new balance.
///
/// The affordability check and the decrement are one guarded SQL statement:
/// no interleaved operation can observe a stale balance between the check
/// and the write.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidInput] if `amount` is negative or not a finite number,
/// - [Error::InsufficientFunds] if `amount` exceeds the current balance,
/// - [Error::NotFound] if `user_id` does not refer to a registered user,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn debit(user_id: UserID, amount: f64, connection: &Connection) -> Result<f64, Error> {
    validate_amount(amount)?;

    let updated = connection
        .prepare("UPDATE user SET cash = cash - ?1 WHERE id = ?2 AND cash >= ?1 RETURNING cash")?
        .query_row((amount, user_id.as_i64()), |row| row.get(0));

    match updated {
        Ok(balance) => Ok(balance),
        // Zero rows means either the user does not exist or the balance was
        // too low. Read the balance to tell the two apart.
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            let available = get_balance(user_id, connection)?;

            Err(Error::InsufficientFunds {
                required: amount,
                available,
            })
        }
        Err(error) => Err(error.into()),
    }
}

/// Add `amount` to the user's cash balance and return the new balance.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidInput] if `amount` is negative or not a finite number,
/// - [Error::NotFound] if `user_id` does not refer to a registered user,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn credit(user_id: UserID, amount: f64, connection: &Connection) -> Result<f64, Error> {
    validate_amount(amount)?;

    connection
        .prepare("UPDATE user SET cash = cash + ?1 WHERE id = ?2 RETURNING cash")?
        .query_row((amount, user_id.as_i64()), |row| row.get(0))
        .map_err(|error| error.into())
}

fn validate_amount(amount: f64) -> Result<(), Error> {
    if !amount.is_finite() {
        return Err(Error::InvalidInput(format!(
            "{amount} is not a valid dollar amount"
        )));
    }

    if amount < 0.0 {
        return Err(Error::InvalidInput(
            "a dollar amount cannot be negative".to_owned(),
        ));
    }

    Ok(())
}


#[cfg(test)]
mod debit_tests {
    use rusqlite::Connection;

    use crate::{
        Error, PasswordHash,
        user::{UserID, User, create_user, create_user_table},
    };

    use super::{debit, get_balance};

    fn get_test_user() -> (Connection, User) {
        let conn = Connection::open_in_memory().unwrap();
        create_user_table(&conn).unwrap();
        let user = create_user("alice", PasswordHash::new_unchecked("hunter2"), &conn).unwrap();

        (conn, user)
    }

    #[test]
    fn decrements_balance() {
        let (conn, user) = get_test_user();

        let new_balance = debit(user.id, 1_500.0, &conn).unwrap();

        assert_eq!(new_balance, user.cash - 1_500.0);
        assert_eq!(get_balance(user.id, &conn).unwrap(), new_balance);
    }

    #[test]
    fn allows_spending_the_entire_balance() {
        let (conn, user) = get_test_user();

        let new_balance = debit(user.id, user.cash, &conn).unwrap();

        assert_eq!(new_balance, 0.0);
    }

    #[test]
    fn fails_when_amount_exceeds_balance() {
        let (conn, user) = get_test_user();

        let result = debit(user.id, user.cash + 0.01, &conn);

        assert_eq!(
            result,
            Err(Error::InsufficientFunds {
                required: user.cash + 0.01,
                available: user.cash,
            })
        );
        // The failed debit must not change the balance.
        assert_eq!(get_balance(user.id, &conn).unwrap(), user.cash);
    }

    #[test]
    fn fails_for_unregistered_user() {
        let (conn, _user) = get_test_user();

        let result = debit(UserID::new(42), 1.0, &conn);

        assert_eq!(result, Err(Error::NotFound));
    }

    #[test]
    fn rejects_negative_and_non_finite_amounts() {
        let (conn, user) = get_test_user();

        for amount in [-1.0, f64::NAN, f64::INFINITY] {
            let result = debit(user.id, amount, &conn);

            assert!(
                matches!(result, Err(Error::InvalidInput(_))),
                "want InvalidInput for amount {amount}, got {result:?}"
            );
        }
    }
}

#[cfg(test)]
mod credit_tests {
    use rusqlite::Connection;

    use crate::{
        Error, PasswordHash,
        user::{UserID, create_user, create_user_table},
    };

    use super::{credit, get_balance};

    #[test]
    fn increments_balance() {
        let conn = Connection::open_in_memory().unwrap();
        create_user_table(&conn).unwrap();
        let user = create_user("alice", PasswordHash::new_unchecked("hunter2"), &conn).unwrap();

        let new_balance = credit(user.id, 250.5, &conn).unwrap();

        assert_eq!(new_balance, user.cash + 250.5);
        assert_eq!(get_balance(user.id, &conn).unwrap(), new_balance);
    }

    #[test]
    fn rejects_negative_amount() {
        let conn = Connection::open_in_memory().unwrap();
        create_user_table(&conn).unwrap();
        let user = create_user("alice", PasswordHash::new_unchecked("hunter2"), &conn).unwrap();

        let result = credit(user.id, -0.01, &conn);

        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn fails_for_unregistered_user() {
        let conn = Connection::open_in_memory().unwrap();
        create_user_table(&conn).unwrap();

        let result = credit(UserID::new(42), 1.0, &conn);

        assert_eq!(result, Err(Error::NotFound));
    }
}
