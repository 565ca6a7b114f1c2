//! Owner accounts, their users, and the endpoint that reports their balances.

mod balances_endpoint;
mod core;

pub use balances_endpoint::get_balances_endpoint;
pub use core::{
    Account, AccountId, User, UserId, create_account, create_account_table, create_user,
    create_user_table, get_account, get_account_balance, get_account_users, get_all_accounts,
    get_user,
};
