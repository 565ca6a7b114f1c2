#![allow(missing_docs)]

use rusqlite::Connection;
use time::Date;

use crate::{
    AppState, ArchiveConfig, JobQueue,
    account::{Account, User, create_account, create_user},
    budget::{Budget, create_budget},
    db::initialize,
    money_account::{MoneyAccount, create_money_account},
    transaction::{Transaction, TransactionKind, create_transaction},
};

/// An account with one user, a "Cash" and a "Bank" money account, and one budget.
#[derive(Debug, Clone)]
pub(crate) struct Fixture {
    pub account: Account,
    pub user: User,
    pub cash: MoneyAccount,
    pub bank: MoneyAccount,
    pub budget: Budget,
}

#[track_caller]
pub(crate) fn get_test_connection() -> Connection {
    let connection =
        Connection::open_in_memory().expect("Could not open in-memory SQLite database");
    initialize(&connection).expect("Could not initialize database");
    connection
}

/// An [AppState] backed by an initialized in-memory database.
#[track_caller]
pub(crate) fn get_test_state() -> AppState {
    let connection =
        Connection::open_in_memory().expect("Could not open in-memory SQLite database");
    AppState::new(connection, ArchiveConfig::default(), JobQueue::new())
        .expect("Could not create app state")
}

#[track_caller]
pub(crate) fn create_fixture(connection: &Connection) -> Fixture {
    create_fixture_with_name("Household", connection)
}

#[track_caller]
pub(crate) fn create_fixture_with_name(account_name: &str, connection: &Connection) -> Fixture {
    let account = create_account(account_name, connection).expect("Could not create account");
    let user = create_user(account.id, "Jane", "jane@example.com", connection)
        .expect("Could not create user");
    let cash =
        create_money_account(account.id, "Cash", connection).expect("Could not create cash");
    let bank =
        create_money_account(account.id, "Bank", connection).expect("Could not create bank");
    let budget =
        create_budget(account.id, "Groceries", connection).expect("Could not create budget");

    Fixture {
        account,
        user,
        cash,
        bank,
        budget,
    }
}

#[track_caller]
pub(crate) fn insert_transaction(
    money_account: &MoneyAccount,
    kind: TransactionKind,
    amount: i64,
    date: Date,
    connection: &Connection,
) -> Transaction {
    create_transaction(
        Transaction::build(kind, amount, date, money_account.id).description("Test"),
        connection,
    )
    .expect("Could not create test transaction")
}
