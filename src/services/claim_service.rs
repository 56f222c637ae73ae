use crate::entities::claim_entity as claims;
use crate::error::{AppError, AppResult};
use crate::models::{
    ClaimAnswers, ClaimPolicy, ClaimState, ClaimView, PaginatedResponse, PaginationParams,
    unclaimed_at_for,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use std::collections::BTreeMap;

#[derive(Clone)]
pub struct ClaimService {
    pool: DatabaseConnection,
    policy: ClaimPolicy,
}

impl ClaimService {
    pub fn new(pool: DatabaseConnection, policy: ClaimPolicy) -> Self {
        Self { pool, policy }
    }

    /// Insert a claim; the confirmation deadline follows the policy.
    pub async fn create_tx<C: ConnectionTrait>(
        &self,
        db: &C,
        prize_id: i32,
        participant_id: i32,
        period_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<claims::Model> {
        let claim = claims::ActiveModel {
            prize_id: Set(prize_id),
            participant_id: Set(participant_id),
            period_id: Set(period_id),
            confirmed: Set(false),
            confirmed_at: Set(None),
            unclaimed_at: Set(unclaimed_at_for(
                self.policy.requires_confirmation,
                self.policy.grace_period,
                now,
            )?),
            answers: Set(ClaimAnswers::default().to_json()?),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;
        Ok(claim)
    }

    /// Confirm a claim, merging in the non-empty answers.
    ///
    /// A confirmed claim may be confirmed again, which moves `confirmed_at`.
    /// A lapsed reservation cannot be revived: its unit may already belong to someone else.
    pub async fn confirm(
        &self,
        id: i32,
        now: DateTime<Utc>,
        answers: Option<&BTreeMap<String, String>>,
    ) -> AppResult<claims::Model> {
        let txn = self.pool.begin().await?;

        let claim = claims::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("claim {id}")))?;

        if ClaimState::of(&claim, now) == ClaimState::Expired {
            return Err(AppError::ClaimExpired(id));
        }

        let mut merged = ClaimAnswers::from_json(&claim.answers)?;
        if let Some(supplied) = answers {
            merged.merge(supplied);
        }

        let mut am = claim.into_active_model();
        am.confirmed = Set(true);
        am.confirmed_at = Set(Some(now));
        am.answers = Set(merged.to_json()?);
        am.updated_at = Set(now);
        let updated = am.update(&txn).await?;

        txn.commit().await?;
        log::info!(
            "Claim {} confirmed by participant {} for prize {} in period {}",
            updated.id,
            updated.participant_id,
            updated.prize_id,
            updated.period_id
        );
        Ok(updated)
    }

    pub async fn find(&self, id: i32) -> AppResult<claims::Model> {
        claims::Entity::find_by_id(id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("claim {id}")))
    }

    pub async fn view(&self, id: i32, now: DateTime<Utc>) -> AppResult<ClaimView> {
        let claim = self.find(id).await?;
        ClaimView::new(claim, now)
    }

    /// Claim history of a participant, newest first.
    pub async fn list_for_participant(
        &self,
        participant_id: i32,
        params: &PaginationParams,
        now: DateTime<Utc>,
    ) -> AppResult<PaginatedResponse<ClaimView>> {
        let base_query =
            claims::Entity::find().filter(claims::Column::ParticipantId.eq(participant_id));

        let total = base_query.clone().count(&self.pool).await?;

        let models = base_query
            .order_by(claims::Column::CreatedAt, Order::Desc)
            .order_by(claims::Column::Id, Order::Desc)
            .limit(params.get_per_page())
            .offset(params.get_offset())
            .all(&self.pool)
            .await?;

        let items = models
            .into_iter()
            .map(|m| ClaimView::new(m, now))
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse::new(items, params, total))
    }

    /// Claims still holding a unit of the prize in the period at `now`.
    pub async fn count_counted<C: ConnectionTrait>(
        db: &C,
        prize_id: i32,
        period_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let n = claims::Entity::find()
            .filter(claims::Column::PrizeId.eq(prize_id))
            .filter(claims::Column::PeriodId.eq(period_id))
            .filter(
                Condition::any()
                    .add(claims::Column::Confirmed.eq(true))
                    .add(claims::Column::UnclaimedAt.is_null())
                    .add(claims::Column::UnclaimedAt.gt(now)),
            )
            .count(db)
            .await?;
        Ok(n)
    }

    /// Reservations of the prize in the period still waiting for confirmation at `now`.
    pub async fn count_pending<C: ConnectionTrait>(
        db: &C,
        prize_id: i32,
        period_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let n = claims::Entity::find()
            .filter(claims::Column::PrizeId.eq(prize_id))
            .filter(claims::Column::PeriodId.eq(period_id))
            .filter(claims::Column::Confirmed.eq(false))
            .filter(claims::Column::UnclaimedAt.gt(now))
            .count(db)
            .await?;
        Ok(n)
    }

    /// Every claim record the participant holds for the prize in the period, lapsed ones included.
    pub async fn count_for_participant<C: ConnectionTrait>(
        db: &C,
        prize_id: i32,
        period_id: i32,
        participant_id: i32,
    ) -> AppResult<u64> {
        let n = claims::Entity::find()
            .filter(claims::Column::PrizeId.eq(prize_id))
            .filter(claims::Column::PeriodId.eq(period_id))
            .filter(claims::Column::ParticipantId.eq(participant_id))
            .count(db)
            .await?;
        Ok(n)
    }
}
