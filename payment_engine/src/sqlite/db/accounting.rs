use chrono::{DateTime, Utc};
use log::debug;
use pg_common::Amount;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{AccountingEntry, AccountingEntryType, NewAccountingEntry, OrderUuid},
    traits::PaymentGatewayError,
};

#[derive(Debug, Clone, FromRow)]
struct AccountingEntryRow {
    id: i64,
    order_id: i64,
    order_uuid: String,
    entry_type: String,
    amount: Amount,
    currency: String,
    created_at: DateTime<Utc>,
}

impl From<AccountingEntryRow> for AccountingEntry {
    fn from(row: AccountingEntryRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            order_uuid: OrderUuid::from(row.order_uuid),
            entry_type: AccountingEntryType::from(row.entry_type),
            amount: row.amount,
            currency: row.currency,
            created_at: row.created_at,
        }
    }
}

/// Inserts a ledger entry. A second entry of the same type for the same order violates the unique constraint and
/// comes back as [`PaymentGatewayError::DuplicateAccountingEntry`].
pub async fn insert_entry(
    entry: NewAccountingEntry,
    conn: &mut SqliteConnection,
) -> Result<AccountingEntry, PaymentGatewayError> {
    let row: AccountingEntryRow = sqlx::query_as(
        r#"
            INSERT INTO accounting_entries (order_id, order_uuid, entry_type, amount, currency, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(entry.order_id)
    .bind(entry.order_uuid.as_str())
    .bind(entry.entry_type.to_string())
    .bind(entry.amount)
    .bind(&entry.currency)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    let entry = AccountingEntry::from(row);
    debug!("🗃️ {} entry #{} of {} {} recorded for order {}", entry.entry_type, entry.id, entry.amount, entry.currency, entry.order_uuid);
    Ok(entry)
}

pub async fn fetch_entries_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<AccountingEntry>, PaymentGatewayError> {
    let rows: Vec<AccountingEntryRow> =
        sqlx::query_as("SELECT * FROM accounting_entries WHERE order_id = $1 ORDER BY id")
            .bind(order_id)
            .fetch_all(conn)
            .await?;
    Ok(rows.into_iter().map(AccountingEntry::from).collect())
}
