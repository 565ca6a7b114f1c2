//! Owner accounts and the users that belong to them.

use rusqlite::{Connection, Row};
use serde::Serialize;

use crate::{Error, database_id::DatabaseId};

/// Database identifier for an owner account.
pub type AccountId = DatabaseId;

/// Database identifier for a user.
pub type UserId = DatabaseId;

/// An owner account, e.g. a household, that groups money accounts, budgets and users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    /// The id for the account.
    pub id: AccountId,
    /// The display name of the account.
    pub name: String,
}

/// A person that can register transactions on an account and receives its reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// The id for the user.
    pub id: UserId,
    /// The account the user belongs to.
    pub account_id: AccountId,
    /// The user's display name.
    pub name: String,
    /// The address that report emails are sent to.
    pub email: String,
}

pub fn create_account_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS account (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        (),
    )?;

    Ok(())
}

pub fn create_user_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS user (
            id INTEGER PRIMARY KEY,
            account_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            FOREIGN KEY(account_id) REFERENCES account(id) ON UPDATE CASCADE ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_user_account ON user(account_id);",
    )?;

    Ok(())
}

/// Create an owner account.
///
/// # Errors
/// This function will return a:
/// - [Error::DuplicateAccountName] if an account with `name` already exists,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_account(name: &str, connection: &Connection) -> Result<Account, Error> {
    connection
        .prepare("INSERT INTO account (name) VALUES (?1) RETURNING id, name")?
        .query_row((name,), map_row_to_account)
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
                },
                _,
            ) => Error::DuplicateAccountName(name.to_owned()),
            error => error.into(),
        })
}

/// Retrieve an account by its `id`.
///
/// # Errors
/// Returns [Error::NotFound] if `id` does not refer to an account.
pub fn get_account(id: AccountId, connection: &Connection) -> Result<Account, Error> {
    connection
        .prepare("SELECT id, name FROM account WHERE id = :id")?
        .query_one(&[(":id", &id)], map_row_to_account)
        .map_err(Error::from)
}

/// Retrieve every account ordered by ID.
pub fn get_all_accounts(connection: &Connection) -> Result<Vec<Account>, Error> {
    connection
        .prepare("SELECT id, name FROM account ORDER BY id ASC")?
        .query_map([], map_row_to_account)?
        .map(|maybe_account| maybe_account.map_err(Error::from))
        .collect()
}

/// Add a user to the account `account_id`.
///
/// # Errors
/// Returns [Error::NotFound] if `account_id` does not refer to an account.
pub fn create_user(
    account_id: AccountId,
    name: &str,
    email: &str,
    connection: &Connection,
) -> Result<User, Error> {
    connection
        .prepare(
            "INSERT INTO user (account_id, name, email)
             SELECT id, ?2, ?3 FROM account WHERE id = ?1
             RETURNING id, account_id, name, email",
        )?
        .query_row((account_id, name, email), map_row_to_user)
        .map_err(Error::from)
}

/// Retrieve a user by its `id`.
///
/// # Errors
/// Returns [Error::NotFound] if `id` does not refer to a user.
pub fn get_user(id: UserId, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare("SELECT id, account_id, name, email FROM user WHERE id = :id")?
        .query_one(&[(":id", &id)], map_row_to_user)
        .map_err(Error::from)
}

/// Retrieve the users that belong to the account `account_id`.
pub fn get_account_users(account_id: AccountId, connection: &Connection) -> Result<Vec<User>, Error> {
    connection
        .prepare(
            "SELECT id, account_id, name, email FROM user WHERE account_id = :account_id ORDER BY id ASC",
        )?
        .query_map(&[(":account_id", &account_id)], map_row_to_user)?
        .map(|maybe_user| maybe_user.map_err(Error::from))
        .collect()
}

/// Get the total balance across all money accounts of an owner account.
///
/// The balance is derived from the transactions that have not been purged.
pub fn get_account_balance(account_id: AccountId, connection: &Connection) -> Result<i64, Error> {
    connection
        .query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM \"transaction\" WHERE account_id = ?1",
            [account_id],
            |row| row.get(0),
        )
        .map_err(Error::from)
}

pub fn map_row_to_account(row: &Row) -> Result<Account, rusqlite::Error> {
    let id = row.get(0)?;
    let name = row.get(1)?;

    Ok(Account { id, name })
}

fn map_row_to_user(row: &Row) -> Result<User, rusqlite::Error> {
    Ok(User {
        id: row.get(0)?,
        account_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
    })
}


#[cfg(test)]
mod account_tests {
    use crate::{Error, test_utils::get_test_connection};

    use super::{
        create_account, create_user, get_account, get_account_users, get_all_accounts, get_user,
    };

    #[test]
    fn create_account_succeeds() {
        let connection = get_test_connection();

        let account = create_account("Household", &connection).expect("Could not create account");

        assert!(account.id > 0);
        assert_eq!(account.name, "Household");
        assert_eq!(get_account(account.id, &connection), Ok(account));
    }

    #[test]
    fn create_account_fails_on_duplicate_name() {
        let connection = get_test_connection();
        create_account("Household", &connection).expect("Could not create account");

        let result = create_account("Household", &connection);

        assert_eq!(result, Err(Error::DuplicateAccountName("Household".to_owned())));
    }

    #[test]
    fn get_account_with_invalid_id_returns_not_found() {
        let connection = get_test_connection();

        assert_eq!(get_account(42, &connection), Err(Error::NotFound));
    }

    #[test]
    fn get_all_accounts_orders_by_id() {
        let connection = get_test_connection();
        let first = create_account("B", &connection).unwrap();
        let second = create_account("A", &connection).unwrap();

        let accounts = get_all_accounts(&connection).expect("Could not get accounts");

        assert_eq!(accounts, vec![first, second]);
    }

    #[test]
    fn create_user_for_missing_account_returns_not_found() {
        let connection = get_test_connection();

        let result = create_user(42, "Jane", "jane@example.com", &connection);

        assert_eq!(result, Err(Error::NotFound));
    }

    #[test]
    fn get_account_users_only_returns_members() {
        let connection = get_test_connection();
        let account = create_account("Household", &connection).unwrap();
        let other_account = create_account("Other", &connection).unwrap();
        let jane = create_user(account.id, "Jane", "jane@example.com", &connection).unwrap();
        let john = create_user(account.id, "John", "john@example.com", &connection).unwrap();
        create_user(other_account.id, "Eve", "eve@example.com", &connection).unwrap();

        let users = get_account_users(account.id, &connection).expect("Could not get users");

        assert_eq!(users, vec![jane.clone(), john]);
        assert_eq!(get_user(jane.id, &connection), Ok(jane));
    }
}
