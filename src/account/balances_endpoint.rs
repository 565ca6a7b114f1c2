use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Path, State},
};
use rusqlite::Connection;
use serde::Serialize;

use crate::{
    AppState, Error,
    account::core::{AccountId, get_account, get_account_balance},
    money_account::{MoneyAccountBalance, get_money_account_balances},
};

/// The state needed to get the balances of an account.
#[derive(Debug, Clone)]
pub struct BalancesState {
    /// The database connection for reading balances.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for BalancesState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The balances of an account's money accounts.
#[derive(Debug, Serialize)]
pub struct AccountBalances {
    /// The owner account.
    pub account_id: AccountId,
    /// One entry per money account, ordered by name.
    pub balances: Vec<MoneyAccountBalance>,
    /// The sum of the money account balances.
    pub total: i64,
}

/// A route handler for the balances of an account's money accounts.
///
/// Responds with 404 if the account does not exist.
pub async fn get_balances_endpoint(
    State(state): State<BalancesState>,
    Path(account_id): Path<AccountId>,
) -> Result<Json<AccountBalances>, Error> {
    let connection = state.db_connection.lock().map_err(|error| {
        tracing::error!("could not acquire database lock: {error}");
        Error::DatabaseLockError
    })?;

    let account = get_account(account_id, &connection)?;

    Ok(Json(AccountBalances {
        account_id: account.id,
        balances: get_money_account_balances(account.id, &connection)?,
        total: get_account_balance(account.id, &connection)?,
    }))
}
