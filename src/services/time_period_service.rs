use crate::entities::{claim_entity as claims, time_period_entity as periods};
use crate::error::{AppError, AppResult};
use crate::models::{PeriodDraft, current_period, past_periods, validate_period};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbBackend, EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};

#[derive(Clone)]
pub struct TimePeriodService {
    pool: DatabaseConnection,
}

impl TimePeriodService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    /// Validate against every existing period and persist.
    pub async fn create(&self, draft: PeriodDraft) -> AppResult<periods::Model> {
        let txn = self.pool.begin().await?;
        lock_periods(&txn).await?;

        let existing = periods::Entity::find().all(&txn).await?;
        validate_period(&draft, &existing)?;

        let period = periods::ActiveModel {
            name: Set(draft.name),
            period_start: Set(draft.period_start),
            period_end: Set(draft.period_end),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        log::info!(
            "Created time period {} '{}' starting {}",
            period.id,
            period.name,
            period.period_start
        );
        Ok(period)
    }

    /// Re-validate against every other period. Periods that claims point at are frozen.
    pub async fn update(&self, id: i32, draft: PeriodDraft) -> AppResult<periods::Model> {
        let txn = self.pool.begin().await?;
        lock_periods(&txn).await?;

        let period = periods::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("time period {id}")))?;

        let referenced = claims::Entity::find()
            .filter(claims::Column::PeriodId.eq(id))
            .count(&txn)
            .await?;
        if referenced > 0 {
            return Err(AppError::PeriodInUse(id));
        }

        let others = periods::Entity::find()
            .filter(periods::Column::Id.ne(id))
            .all(&txn)
            .await?;
        validate_period(&draft, &others)?;

        let mut am = period.into_active_model();
        am.name = Set(draft.name);
        am.period_start = Set(draft.period_start);
        am.period_end = Set(draft.period_end);
        let updated = am.update(&txn).await?;

        txn.commit().await?;
        Ok(updated)
    }

    pub async fn find(&self, id: i32) -> AppResult<periods::Model> {
        periods::Entity::find_by_id(id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("time period {id}")))
    }

    /// All periods, oldest first
    pub async fn list(&self) -> AppResult<Vec<periods::Model>> {
        let list = periods::Entity::find()
            .order_by_asc(periods::Column::PeriodStart)
            .all(&self.pool)
            .await?;
        Ok(list)
    }

    pub async fn current(&self) -> AppResult<Option<periods::Model>> {
        let list = self.list().await?;
        Ok(current_period(&list).cloned())
    }

    pub async fn past(&self, now: DateTime<Utc>) -> AppResult<Vec<periods::Model>> {
        let list = self.list().await?;
        Ok(past_periods(&list, now).into_iter().cloned().collect())
    }
}

/// Serialize period writers so two overlapping periods cannot both pass validation.
/// Readers are not blocked. SQLite already admits a single writer at a time.
async fn lock_periods(txn: &DatabaseTransaction) -> AppResult<()> {
    if txn.get_database_backend() == DbBackend::Postgres {
        txn.execute_unprepared("LOCK TABLE time_periods IN SHARE ROW EXCLUSIVE MODE")
            .await?;
    }
    Ok(())
}
