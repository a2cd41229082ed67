use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::Order,
    traits::{PaymentGatewayError, StoredNotification},
};

#[derive(Debug, Clone, FromRow)]
struct BacklogRow {
    original_order_id: i64,
    order_data: String,
}

/// Loads the whole backlog, oldest first.
pub async fn load_backlog(conn: &mut SqliteConnection) -> Result<Vec<StoredNotification>, PaymentGatewayError> {
    let rows: Vec<BacklogRow> =
        sqlx::query_as("SELECT original_order_id, order_data FROM notification_backlog ORDER BY id")
            .fetch_all(conn)
            .await?;
    rows.into_iter()
        .map(|row| {
            let order = serde_json::from_str::<Order>(&row.order_data)?;
            Ok(StoredNotification { original_order_id: row.original_order_id, order })
        })
        .collect()
}

/// Appends entries to the backlog. Not atomic on its own; wrap it in a transaction to save a batch at once.
pub async fn append_to_backlog(
    notifications: &[StoredNotification],
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    for n in notifications {
        let data = serde_json::to_string(&n.order)?;
        sqlx::query("INSERT INTO notification_backlog (original_order_id, order_data) VALUES ($1, $2)")
            .bind(n.original_order_id)
            .bind(data)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub async fn clear_backlog(conn: &mut SqliteConnection) -> Result<u64, PaymentGatewayError> {
    let result = sqlx::query("DELETE FROM notification_backlog").execute(conn).await?;
    Ok(result.rows_affected())
}
