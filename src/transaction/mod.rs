//! Transactions of the ledger.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model, its `TransactionKind` and the `TransactionBuilder` for creating
//!   transactions
//! - Database functions for storing and fetching transactions
//! - Set-based queries for tagging, exporting and purging the transactions archived by a report

mod core;
mod query;

pub use core::{
    TRANSACTION_COLUMNS, Transaction, TransactionBuilder, TransactionKind, create_transaction,
    create_transaction_table, get_transaction, map_transaction_row,
};
pub use query::{
    ExportCursor, ExportRow, MoneyAccountTotal, count_report_transactions,
    delete_report_transactions, get_export_page, get_report_totals_by_money_account,
    sum_report_transactions, tag_transactions_before,
};

#[cfg(test)]
pub use core::count_transactions;
