use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderStatus, OrderUuid},
    traits::{PaymentGatewayError, StatusChange},
};

/// The raw `orders` row. The aggregate itself is the `data` document; the columns beside it take precedence over
/// whatever the document says, since they are what the guarded updates operate on.
#[derive(Debug, Clone, FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub uuid: String,
    pub project_id: String,
    pub project_order_id: Option<String>,
    pub status: String,
    pub superseded_by: Option<String>,
    pub data: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = PaymentGatewayError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let mut order = serde_json::from_str::<Order>(&row.data)?;
        order.id = row.id;
        order.uuid = OrderUuid::from(row.uuid);
        order.project_order_id = row.project_order_id;
        order.status = OrderStatus::from(row.status);
        order.superseded_by = row.superseded_by.map(OrderUuid::from);
        order.created_at = row.created_at;
        order.updated_at = row.updated_at;
        Ok(order)
    }
}

fn to_order(row: Option<OrderRow>) -> Result<Option<Order>, PaymentGatewayError> {
    row.map(Order::try_from).transpose()
}

/// Inserts a new order using the given connection. This is not atomic. You can embed this call inside a transaction
/// if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
///
/// A clash on the live `(project_id, project_order_id)` index comes back as [`PaymentGatewayError::DuplicateOrder`].
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, PaymentGatewayError> {
    let now = Utc::now();
    // The document is written with a placeholder id; the column is authoritative
    let draft = order.into_order(0, now);
    let data = serde_json::to_string(&draft)?;
    // Step the statement to completion so the write is settled before the connection is used again
    let mut rows: Vec<OrderRow> = sqlx::query_as(
        r#"
            INSERT INTO orders (uuid, project_id, project_order_id, status, data, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(draft.uuid.as_str())
    .bind(&draft.project.id)
    .bind(&draft.project_order_id)
    .bind(draft.status.to_string())
    .bind(data)
    .bind(now)
    .bind(now)
    .fetch_all(conn)
    .await?;
    let row = rows.pop().ok_or_else(|| PaymentGatewayError::DatabaseError("insert returned no row".into()))?;
    let order = Order::try_from(row)?;
    debug!("🗃️ Order {} inserted with id {}", order.uuid, order.id);
    Ok(order)
}

pub async fn fetch_order_by_uuid(
    uuid: &OrderUuid,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, PaymentGatewayError> {
    let row = sqlx::query_as("SELECT * FROM orders WHERE uuid = $1").bind(uuid.as_str()).fetch_optional(conn).await?;
    to_order(row)
}

pub async fn fetch_order_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, PaymentGatewayError> {
    let row = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    to_order(row)
}

pub async fn project_order_exists(
    project_id: &str,
    project_order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, PaymentGatewayError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM orders WHERE project_id = $1 AND project_order_id = $2 AND superseded_by IS NULL",
    )
    .bind(project_id)
    .bind(project_order_id)
    .fetch_one(conn)
    .await?;
    Ok(count > 0)
}

/// Applies the change only if the order is still in `change.expected_status`.
///
/// Returns [`PaymentGatewayError::StatusChanged`] if another writer moved the order first, and
/// [`PaymentGatewayError::OrderIdNotFound`] if there is no such order. The caller is responsible for wrapping this in
/// a transaction if it has to be atomic with other writes.
pub async fn apply_status_change(
    change: &StatusChange,
    conn: &mut SqliteConnection,
) -> Result<Order, PaymentGatewayError> {
    // Take the write lock before reading. A deferred transaction that reads first cannot be upgraded while another
    // writer is active, and SQLite reports that as a busy error instead of waiting.
    sqlx::query("UPDATE orders SET updated_at = updated_at WHERE id = $1")
        .bind(change.order_id)
        .execute(&mut *conn)
        .await?;
    let mut order = fetch_order_by_id(change.order_id, &mut *conn)
        .await?
        .ok_or(PaymentGatewayError::OrderIdNotFound(change.order_id))?;
    if order.status != change.expected_status {
        return Err(PaymentGatewayError::StatusChanged {
            order_id: order.id,
            expected: change.expected_status,
            actual: order.status,
        });
    }
    let now = Utc::now();
    change.apply_to(&mut order, now);
    let data = serde_json::to_string(&order)?;
    let result = sqlx::query("UPDATE orders SET status = $1, data = $2, updated_at = $3 WHERE id = $4 AND status = $5")
        .bind(change.new_status.to_string())
        .bind(data)
        .bind(now)
        .bind(change.order_id)
        .bind(change.expected_status.to_string())
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        // Lost the race between the read and the write
        let actual = fetch_order_by_id(change.order_id, conn)
            .await?
            .map(|o| o.status)
            .ok_or(PaymentGatewayError::OrderIdNotFound(change.order_id))?;
        return Err(PaymentGatewayError::StatusChanged {
            order_id: change.order_id,
            expected: change.expected_status,
            actual,
        });
    }
    trace!("🗃️ Order {} moved from {} to {}", order.uuid, change.expected_status, change.new_status);
    Ok(order)
}

/// Marks `old` as superseded by `replacement`. Fails with [`PaymentGatewayError::AlreadySuperseded`] if another
/// re-creation got there first.
pub async fn mark_superseded(
    old: &Order,
    replacement: &OrderUuid,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    let result = sqlx::query(
        "UPDATE orders SET superseded_by = $1, updated_at = $2 WHERE id = $3 AND superseded_by IS NULL AND status = $4",
    )
    .bind(replacement.as_str())
    .bind(Utc::now())
    .bind(old.id)
    .bind(old.status.to_string())
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(PaymentGatewayError::AlreadySuperseded(old.uuid.clone()));
    }
    Ok(())
}
