//! PostgreSQL queue store
//!
//! Concurrency control is optimistic: `commit_match` claims each item with
//! a conditional `UPDATE ... WHERE status = 'pending'` inside one
//! transaction and rolls back with `Conflict` when a claim misses. Two
//! concurrent commits can therefore never both win the same item, and
//! contention stays on the two rows involved.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use common::{Clock, IdGenerator, SystemClock, UuidGenerator};

use crate::domain::{
    ItemFilter, ItemKind, ItemStatus, MatchFilter, MatchRecord, MatchStatus, QueueItem, QueueStats,
};
use crate::error::{QueueError, QueueResult};
use crate::store::traits::QueueStore;

/// PostgreSQL-backed queue store
pub struct PostgresQueueStore {
    pool: Arc<PgPool>,
    clock: Arc<dyn Clock>,
    id_gen: Arc<dyn IdGenerator>,
}

impl PostgresQueueStore {
    /// Create a store with wall-clock time and random ids
    pub fn new(pool: PgPool) -> Self {
        Self::with_collaborators(pool, Arc::new(SystemClock), Arc::new(UuidGenerator))
    }

    /// Create a store with injected clock and id generator
    pub fn with_collaborators(
        pool: PgPool,
        clock: Arc<dyn Clock>,
        id_gen: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            pool: Arc::new(pool),
            clock,
            id_gen,
        }
    }

    /// Create the queue tables when they do not exist yet
    pub async fn init_schema(&self) -> QueueResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queue_items (
                id UUID PRIMARY KEY,
                type TEXT NOT NULL CHECK (type IN ('withdrawal', 'deposit')),
                customer_id TEXT NOT NULL,
                amount NUMERIC NOT NULL CHECK (amount > 0),
                payment_type TEXT NOT NULL,
                payment_details TEXT NOT NULL,
                priority INT NOT NULL DEFAULT 1,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                matched_with UUID,
                notes TEXT
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queue_matches (
                id UUID PRIMARY KEY,
                withdrawal_id UUID NOT NULL REFERENCES queue_items(id),
                deposit_id UUID NOT NULL REFERENCES queue_items(id),
                amount NUMERIC NOT NULL,
                match_score INT NOT NULL,
                processing_time INT NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ,
                notes TEXT
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_queue_items_pending
             ON queue_items (type, payment_type, created_at) WHERE status = 'pending'",
        )
        .execute(&*self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    fn row_to_item(&self, row: &PgRow) -> QueueResult<QueueItem> {
        let kind_str: String = row.get("type");
        let status_str: String = row.get("status");
        let priority: i32 = row.get("priority");

        Ok(QueueItem {
            id: row.get("id"),
            kind: ItemKind::parse(&kind_str)
                .ok_or_else(|| QueueError::Storage(format!("bad item type '{}'", kind_str)))?,
            customer_id: row.get("customer_id"),
            amount: row.get("amount"),
            payment_method: row.get("payment_type"),
            payment_details: row.get("payment_details"),
            priority: priority as u32,
            status: ItemStatus::parse(&status_str)
                .ok_or_else(|| QueueError::Storage(format!("bad item status '{}'", status_str)))?,
            created_at: row.get("created_at"),
            matched_with: row.get("matched_with"),
            notes: row.get("notes"),
        })
    }

    fn row_to_match(&self, row: &PgRow) -> QueueResult<MatchRecord> {
        let status_str: String = row.get("status");
        let match_score: i32 = row.get("match_score");
        let processing_time: i32 = row.get("processing_time");

        Ok(MatchRecord {
            id: row.get("id"),
            withdrawal_id: row.get("withdrawal_id"),
            deposit_id: row.get("deposit_id"),
            amount: row.get("amount"),
            match_score: match_score as i64,
            processing_time_ms: processing_time as i64,
            status: MatchStatus::parse(&status_str)
                .ok_or_else(|| QueueError::Storage(format!("bad match status '{}'", status_str)))?,
            created_at: row.get("created_at"),
            completed_at: row.get("completed_at"),
            notes: row.get("notes"),
        })
    }
}

fn storage_err(e: sqlx::Error) -> QueueError {
    QueueError::Storage(e.to_string())
}

#[async_trait]
impl QueueStore for PostgresQueueStore {
    async fn insert(&self, item: QueueItem) -> QueueResult<QueueItem> {
        let result = sqlx::query(
            r#"
            INSERT INTO queue_items (
                id, type, customer_id, amount, payment_type, payment_details,
                priority, status, created_at, matched_with, notes
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(item.id)
        .bind(item.kind.as_str())
        .bind(&item.customer_id)
        .bind(item.amount)
        .bind(&item.payment_method)
        .bind(&item.payment_details)
        .bind(item.priority as i32)
        .bind(item.status.as_str())
        .bind(item.created_at)
        .bind(item.matched_with)
        .bind(&item.notes)
        .execute(&*self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(QueueError::DuplicateId(item.id));
        }

        debug!(item_id = %item.id, kind = %item.kind, "Item inserted");
        Ok(item)
    }

    async fn get(&self, item_id: Uuid) -> QueueResult<Option<QueueItem>> {
        let row = sqlx::query("SELECT * FROM queue_items WHERE id = $1")
            .bind(item_id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(storage_err)?;

        row.map(|r| self.row_to_item(&r)).transpose()
    }

    async fn find_pending_opposite(
        &self,
        kind: ItemKind,
        payment_method: &str,
    ) -> QueueResult<Vec<QueueItem>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM queue_items
            WHERE status = 'pending' AND type = $1 AND payment_type = $2
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(kind.as_str())
        .bind(payment_method)
        .fetch_all(&*self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter().map(|r| self.row_to_item(r)).collect()
    }

    async fn cancel_item(&self, item_id: Uuid) -> QueueResult<QueueItem> {
        let row = sqlx::query(
            "UPDATE queue_items SET status = 'cancelled'
             WHERE id = $1 AND status = 'pending'
             RETURNING *",
        )
        .bind(item_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(storage_err)?;

        match row {
            Some(r) => self.row_to_item(&r),
            None => match self.get(item_id).await? {
                Some(item) => Err(QueueError::InvalidState(format!(
                    "cannot cancel item {} in status {}",
                    item_id, item.status
                ))),
                None => Err(QueueError::NotFound(item_id)),
            },
        }
    }

    async fn commit_match(
        &self,
        withdrawal_id: Uuid,
        deposit_id: Uuid,
        amount: Decimal,
        score: i64,
    ) -> QueueResult<MatchRecord> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        // Claim each row only while still pending; a miss means someone
        // else got there first and the whole commit unwinds.
        let claimed_w = sqlx::query(
            "UPDATE queue_items SET status = 'matched', matched_with = $2
             WHERE id = $1 AND status = 'pending' AND type = 'withdrawal'",
        )
        .bind(withdrawal_id)
        .bind(deposit_id)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        if claimed_w.rows_affected() != 1 {
            tx.rollback().await.map_err(storage_err)?;
            return Err(QueueError::Conflict(format!(
                "withdrawal {} no longer pending",
                withdrawal_id
            )));
        }

        let claimed_d = sqlx::query(
            "UPDATE queue_items SET status = 'matched', matched_with = $2
             WHERE id = $1 AND status = 'pending' AND type = 'deposit'",
        )
        .bind(deposit_id)
        .bind(withdrawal_id)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        if claimed_d.rows_affected() != 1 {
            tx.rollback().await.map_err(storage_err)?;
            return Err(QueueError::Conflict(format!(
                "deposit {} no longer pending",
                deposit_id
            )));
        }

        let record = MatchRecord {
            id: self.id_gen.next_id(),
            withdrawal_id,
            deposit_id,
            amount,
            match_score: score,
            processing_time_ms: 0,
            status: MatchStatus::Pending,
            created_at: self.clock.now(),
            completed_at: None,
            notes: None,
        };

        sqlx::query(
            r#"
            INSERT INTO queue_matches (
                id, withdrawal_id, deposit_id, amount, match_score,
                processing_time, status, created_at, completed_at, notes
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.id)
        .bind(record.withdrawal_id)
        .bind(record.deposit_id)
        .bind(record.amount)
        .bind(record.match_score as i32)
        .bind(record.processing_time_ms as i32)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.completed_at)
        .bind(&record.notes)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;

        debug!(
            match_id = %record.id,
            withdrawal_id = %withdrawal_id,
            deposit_id = %deposit_id,
            score,
            "Match committed"
        );
        Ok(record)
    }

    async fn get_match(&self, match_id: Uuid) -> QueueResult<Option<MatchRecord>> {
        let row = sqlx::query("SELECT * FROM queue_matches WHERE id = $1")
            .bind(match_id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(storage_err)?;

        row.map(|r| self.row_to_match(&r)).transpose()
    }

    async fn match_for_item(&self, item_id: Uuid) -> QueueResult<Option<MatchRecord>> {
        let row = sqlx::query(
            "SELECT * FROM queue_matches
             WHERE withdrawal_id = $1 OR deposit_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(item_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(storage_err)?;

        row.map(|r| self.row_to_match(&r)).transpose()
    }

    async fn complete_match(&self, match_id: Uuid) -> QueueResult<MatchRecord> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        let now = self.clock.now();

        let row = sqlx::query(
            "UPDATE queue_matches
             SET status = 'completed', completed_at = $2,
                 processing_time = (EXTRACT(EPOCH FROM ($2 - created_at)) * 1000)::INT
             WHERE id = $1 AND status = 'pending'
             RETURNING *",
        )
        .bind(match_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage_err)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(storage_err)?;
            return match self.get_match(match_id).await? {
                Some(m) => Err(QueueError::InvalidState(format!(
                    "cannot complete match {} in status {}",
                    match_id, m.status
                ))),
                None => Err(QueueError::NotFound(match_id)),
            };
        };
        let record = self.row_to_match(&row)?;

        sqlx::query("UPDATE queue_items SET status = 'settled' WHERE id = ANY($1)")
            .bind(vec![record.withdrawal_id, record.deposit_id])
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;
        debug!(match_id = %match_id, "Match completed");
        Ok(record)
    }

    async fn fail_match(&self, match_id: Uuid, reason: &str) -> QueueResult<MatchRecord> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let row = sqlx::query(
            "UPDATE queue_matches SET status = 'failed', notes = $2
             WHERE id = $1 AND status = 'pending'
             RETURNING *",
        )
        .bind(match_id)
        .bind(reason)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage_err)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(storage_err)?;
            return match self.get_match(match_id).await? {
                Some(m) => Err(QueueError::InvalidState(format!(
                    "cannot fail match {} in status {}",
                    match_id, m.status
                ))),
                None => Err(QueueError::NotFound(match_id)),
            };
        };
        let record = self.row_to_match(&row)?;

        sqlx::query(
            "UPDATE queue_items SET status = 'pending', matched_with = NULL
             WHERE id = ANY($1)",
        )
        .bind(vec![record.withdrawal_id, record.deposit_id])
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;
        debug!(match_id = %match_id, reason, "Match failed, items requeued");
        Ok(record)
    }

    async fn list_items(&self, filter: &ItemFilter) -> QueueResult<Vec<QueueItem>> {
        // Filters are optional; NULL comparisons collapse to pass-through.
        let rows = sqlx::query(
            r#"
            SELECT * FROM queue_items
            WHERE ($1::TEXT IS NULL OR type = $1)
              AND ($2::TEXT IS NULL OR status = $2)
              AND ($3::TEXT IS NULL OR customer_id = $3)
              AND ($4::TEXT IS NULL OR payment_type = $4)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.customer_id.as_deref())
        .bind(filter.payment_method.as_deref())
        .fetch_all(&*self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter().map(|r| self.row_to_item(r)).collect()
    }

    async fn list_matches(&self, filter: &MatchFilter) -> QueueResult<Vec<MatchRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM queue_matches
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&*self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter().map(|r| self.row_to_match(r)).collect()
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM queue_items) AS total_items,
                (SELECT COUNT(*) FROM queue_items
                 WHERE type = 'withdrawal' AND status = 'pending') AS pending_withdrawals,
                (SELECT COUNT(*) FROM queue_items
                 WHERE type = 'deposit' AND status = 'pending') AS pending_deposits,
                (SELECT COUNT(*) FROM queue_matches
                 WHERE status <> 'failed') AS matched_pairs
            "#,
        )
        .fetch_one(&*self.pool)
        .await
        .map_err(storage_err)?;

        let total_items: i64 = row.get("total_items");
        let pending_withdrawals: i64 = row.get("pending_withdrawals");
        let pending_deposits: i64 = row.get("pending_deposits");
        let matched_pairs: i64 = row.get("matched_pairs");

        Ok(QueueStats {
            total_items: total_items as u64,
            pending_withdrawals: pending_withdrawals as u64,
            pending_deposits: pending_deposits as u64,
            matched_pairs: matched_pairs as u64,
        })
    }
}
