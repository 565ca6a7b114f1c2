//! Money accounts: the partitions of an owner account that hold money, e.g. "Cash" or "Bank".
//!
//! A money account does not store its balance. The balance is the sum of the
//! amounts of the transactions scoped to it and is computed on demand.

use rusqlite::{Connection, Row};
use serde::Serialize;

use crate::{Error, account::AccountId, database_id::DatabaseId};

/// Database identifier for a money account.
pub type MoneyAccountId = DatabaseId;

/// A ledger partition within an owner account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoneyAccount {
    /// The id for the money account.
    pub id: MoneyAccountId,
    /// The owner account.
    pub account_id: AccountId,
    /// The display name, e.g. "Cash".
    pub name: String,
}

/// The derived balance of a money account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoneyAccountBalance {
    /// The id for the money account.
    pub id: MoneyAccountId,
    /// The display name of the money account.
    pub name: String,
    /// The sum of the transaction amounts in minor units.
    pub balance: i64,
}

pub fn create_money_account_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS money_account (
            id INTEGER PRIMARY KEY,
            account_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            UNIQUE(account_id, name),
            FOREIGN KEY(account_id) REFERENCES account(id) ON UPDATE CASCADE ON DELETE CASCADE
        )",
        (),
    )?;

    Ok(())
}

/// Create a money account under the owner account `account_id`.
///
/// # Errors
/// Returns [Error::NotFound] if `account_id` does not refer to an account.
pub fn create_money_account(
    account_id: AccountId,
    name: &str,
    connection: &Connection,
) -> Result<MoneyAccount, Error> {
    connection
        .prepare(
            "INSERT INTO money_account (account_id, name)
             SELECT id, ?2 FROM account WHERE id = ?1
             RETURNING id, account_id, name",
        )?
        .query_row((account_id, name), map_row_to_money_account)
        .map_err(Error::from)
}

/// Retrieve a money account by its `id`.
///
/// # Errors
/// Returns [Error::NotFound] if `id` does not refer to a money account.
pub fn get_money_account(id: MoneyAccountId, connection: &Connection) -> Result<MoneyAccount, Error> {
    connection
        .prepare("SELECT id, account_id, name FROM money_account WHERE id = :id")?
        .query_one(&[(":id", &id)], map_row_to_money_account)
        .map_err(Error::from)
}

/// The balance of the money account `id`, i.e. the sum of its transaction amounts.
///
/// A money account without transactions has a balance of zero.
pub fn get_money_account_balance(id: MoneyAccountId, connection: &Connection) -> Result<i64, Error> {
    connection
        .query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM \"transaction\" WHERE money_account_id = ?1",
            [id],
            |row| row.get(0),
        )
        .map_err(Error::from)
}

/// The balances of every money account of the owner account `account_id`, ordered by name.
pub fn get_money_account_balances(
    account_id: AccountId,
    connection: &Connection,
) -> Result<Vec<MoneyAccountBalance>, Error> {
    connection
        .prepare(
            "SELECT money_account.id, money_account.name, COALESCE(SUM(\"transaction\".amount), 0)
             FROM money_account
             LEFT JOIN \"transaction\" ON \"transaction\".money_account_id = money_account.id
             WHERE money_account.account_id = ?1
             GROUP BY money_account.id
             ORDER BY money_account.name ASC, money_account.id ASC",
        )?
        .query_map([account_id], |row| {
            Ok(MoneyAccountBalance {
                id: row.get(0)?,
                name: row.get(1)?,
                balance: row.get(2)?,
            })
        })?
        .map(|maybe_balance| maybe_balance.map_err(Error::from))
        .collect()
}

fn map_row_to_money_account(row: &Row) -> Result<MoneyAccount, rusqlite::Error> {
    Ok(MoneyAccount {
        id: row.get(0)?,
        account_id: row.get(1)?,
        name: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use crate::{
        Error,
        account::create_account,
        test_utils::{create_fixture, get_test_connection, insert_transaction},
        transaction::TransactionKind,
    };

    use super::{
        MoneyAccountBalance, create_money_account, get_money_account, get_money_account_balance,
        get_money_account_balances,
    };

    #[test]
    fn create_money_account_succeeds() {
        let connection = get_test_connection();
        let account = create_account("Household", &connection).unwrap();

        let money_account = create_money_account(account.id, "Cash", &connection)
            .expect("Could not create money account");

        assert_eq!(money_account.account_id, account.id);
        assert_eq!(get_money_account(money_account.id, &connection), Ok(money_account));
    }

    #[test]
    fn create_money_account_for_missing_account_returns_not_found() {
        let connection = get_test_connection();

        assert_eq!(create_money_account(42, "Cash", &connection), Err(Error::NotFound));
    }

    #[test]
    fn balance_of_empty_money_account_is_zero() {
        let connection = get_test_connection();
        let fixture = create_fixture(&connection);

        assert_eq!(get_money_account_balance(fixture.cash.id, &connection), Ok(0));
    }

    #[test]
    fn balance_is_sum_of_transactions() {
        let connection = get_test_connection();
        let fixture = create_fixture(&connection);
        let date = date!(2026 - 01 - 10);
        insert_transaction(&fixture.cash, TransactionKind::Incoming, 15_000, date, &connection);
        insert_transaction(&fixture.cash, TransactionKind::Expense, -10_000, date, &connection);
        insert_transaction(&fixture.bank, TransactionKind::Expense, -2_500, date, &connection);

        assert_eq!(get_money_account_balance(fixture.cash.id, &connection), Ok(5_000));
        assert_eq!(get_money_account_balance(fixture.bank.id, &connection), Ok(-2_500));
    }

    #[test]
    fn balances_include_money_accounts_without_transactions() {
        let connection = get_test_connection();
        let fixture = create_fixture(&connection);
        insert_transaction(
            &fixture.cash,
            TransactionKind::Incoming,
            1_234,
            date!(2026 - 01 - 10),
            &connection,
        );

        let balances = get_money_account_balances(fixture.account.id, &connection)
            .expect("Could not get balances");

        assert_eq!(
            balances,
            vec![
                MoneyAccountBalance {
                    id: fixture.bank.id,
                    name: "Bank".to_owned(),
                    balance: 0,
                },
                MoneyAccountBalance {
                    id: fixture.cash.id,
                    name: "Cash".to_owned(),
                    balance: 1_234,
                },
            ]
        );
    }
}
