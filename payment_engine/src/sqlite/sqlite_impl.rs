//! `SqliteDatabase` is a concrete implementation of a payment engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements the storage traits defined in the [`crate::traits`]
//! module: [`OrderManagement`] for the order aggregate and [`NotificationStore`] for the notification backlog.
use std::fmt::Debug;

use async_trait::async_trait;
use log::*;
use sqlx::SqlitePool;

use super::db::{accounting, db_url, new_pool, notifications, orders};
use crate::{
    db_types::{AccountingEntry, NewAccountingEntry, NewOrder, Order, OrderUuid},
    traits::{NotificationStore, OrderManagement, PaymentGatewayError, StatusChange, StoredNotification},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl OrderManagement for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch_order_by_uuid(&self, uuid: &OrderUuid) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_uuid(uuid, &mut conn).await
    }

    async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_id(id, &mut conn).await
    }

    async fn project_order_exists(
        &self,
        project_id: &str,
        project_order_id: &str,
    ) -> Result<bool, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::project_order_exists(project_id, project_order_id, &mut conn).await
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError> {
        // Committed before returning, so other connections see the order straight away
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn apply_status_change(&self, change: StatusChange) -> Result<Order, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::apply_status_change(&change, &mut tx).await?;
        if let Some(entry_type) = change.accounting_entry {
            let entry = NewAccountingEntry::for_order(&order, entry_type);
            accounting::insert_entry(entry, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🗃️ Order {} is now {}", order.uuid, order.status);
        Ok(order)
    }

    async fn recreate_order(&self, old: &Order, replacement: NewOrder) -> Result<Order, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        orders::mark_superseded(old, &replacement.uuid, &mut tx).await?;
        let order = orders::insert_order(replacement, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {} superseded by {}", old.uuid, order.uuid);
        Ok(order)
    }

    async fn fetch_accounting_entries(&self, order_id: i64) -> Result<Vec<AccountingEntry>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        accounting::fetch_entries_for_order(order_id, &mut conn).await
    }
}

#[async_trait]
impl NotificationStore for SqliteDatabase {
    async fn load_notifications(&self) -> Result<Vec<StoredNotification>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        notifications::load_backlog(&mut conn).await
    }

    async fn save_notifications(&self, notifications: &[StoredNotification]) -> Result<(), PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        notifications::append_to_backlog(notifications, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ {} notifications written to the backlog", notifications.len());
        Ok(())
    }

    async fn clear_notifications(&self) -> Result<u64, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        notifications::clear_backlog(&mut conn).await
    }

    async fn replace_notifications(&self, notifications: &[StoredNotification]) -> Result<(), PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let removed = notifications::clear_backlog(&mut tx).await?;
        notifications::append_to_backlog(notifications, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Notification backlog replaced. {removed} removed, {} written", notifications.len());
        Ok(())
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
