use crate::entities::prizes::UNLIMITED_UNITS;
use crate::entities::{
    claim_entity as claims, participant_entity as participants,
    prize_availability_entity as availability, prize_entity as prizes,
    time_period_entity as periods,
};
use crate::error::{AppError, AppResult};
use crate::models::{
    ClaimContext, ClaimPolicy, NewPrize, PreClaimCheck, PrizeAvailabilityView, UnitsLeft,
};
use crate::services::{ClaimService, ParticipantService};
use crate::utils::{Chooser, RandomChooser};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};
use sea_orm::sea_query::{Expr, JoinType};
use std::sync::{Arc, Mutex};

/// Prize allocation engine: per-period unit accounting, claim admission and random draws.
#[derive(Clone)]
pub struct PrizeService {
    pool: DatabaseConnection,
    policy: ClaimPolicy,
    participants: ParticipantService,
    claims: ClaimService,
    chooser: Arc<Mutex<Box<dyn Chooser>>>,
    checks: Vec<PreClaimCheck>,
}

impl PrizeService {
    pub fn new(pool: DatabaseConnection, policy: ClaimPolicy, participants: ParticipantService) -> Self {
        let claims = ClaimService::new(pool.clone(), policy.clone());
        let checks = policy.pre_claim_checks();
        let chooser: Box<dyn Chooser> = Box::new(RandomChooser::from_entropy());
        Self {
            pool,
            policy,
            participants,
            claims,
            chooser: Arc::new(Mutex::new(chooser)),
            checks,
        }
    }

    pub fn with_chooser(mut self, chooser: impl Chooser + 'static) -> Self {
        let chooser: Box<dyn Chooser> = Box::new(chooser);
        self.chooser = Arc::new(Mutex::new(chooser));
        self
    }

    /// Append a check after the ones the policy brings.
    pub fn with_check(mut self, check: PreClaimCheck) -> Self {
        self.checks.push(check);
        self
    }

    pub fn policy(&self) -> &ClaimPolicy {
        &self.policy
    }

    pub fn claims(&self) -> &ClaimService {
        &self.claims
    }

    pub async fn create_prize(&self, new_prize: NewPrize, now: DateTime<Utc>) -> AppResult<prizes::Model> {
        new_prize.validate()?;
        let prize = prizes::ActiveModel {
            description: Set(new_prize.description),
            total_units: Set(new_prize.total_units),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;
        Ok(prize)
    }

    pub async fn find_prize(&self, id: i32) -> AppResult<prizes::Model> {
        prizes::Entity::find_by_id(id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("prize {id}")))
    }

    /// Offer a prize in a period. Offering it twice returns the existing row.
    pub async fn make_available(&self, prize_id: i32, period_id: i32) -> AppResult<availability::Model> {
        let txn = self.pool.begin().await?;

        if let Some(existing) = find_availability(&txn, prize_id, period_id).await? {
            return Ok(existing);
        }
        prizes::Entity::find_by_id(prize_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("prize {prize_id}")))?;
        periods::Entity::find_by_id(period_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("time period {period_id}")))?;

        let row = availability::ActiveModel {
            prize_id: Set(prize_id),
            period_id: Set(period_id),
            all_claimed: Set(false),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        Ok(row)
    }

    pub async fn units_left(&self, prize_id: i32, period_id: i32, now: DateTime<Utc>) -> AppResult<UnitsLeft> {
        let prize = self.find_prize(prize_id).await?;
        if prize.is_unlimited() {
            return Ok(UnitsLeft::Unlimited);
        }
        let counted = ClaimService::count_counted(&self.pool, prize_id, period_id, now).await?;
        Ok(UnitsLeft::compute(&prize, counted))
    }

    /// Persisted exhaustion flag of the prize in the period.
    pub async fn all_claimed(&self, prize_id: i32, period_id: i32) -> AppResult<bool> {
        let row = find_availability(&self.pool, prize_id, period_id)
            .await?
            .ok_or(AppError::NotAvailableInPeriod { prize_id, period_id })?;
        Ok(row.all_claimed)
    }

    /// Every prize offered in the period with its units left at `now`.
    pub async fn availability(&self, period_id: i32, now: DateTime<Utc>) -> AppResult<Vec<PrizeAvailabilityView>> {
        let rows = availability::Entity::find()
            .filter(availability::Column::PeriodId.eq(period_id))
            .find_also_related(prizes::Entity)
            .order_by_asc(availability::Column::PrizeId)
            .all(&self.pool)
            .await?;

        let mut views = Vec::with_capacity(rows.len());
        for (row, prize) in rows {
            let prize = prize.ok_or_else(|| {
                AppError::InternalError(format!("availability row {} has no prize", row.id))
            })?;
            let counted = if prize.is_unlimited() {
                0
            } else {
                ClaimService::count_counted(&self.pool, prize.id, period_id, now).await?
            };
            views.push(PrizeAvailabilityView {
                prize_id: prize.id,
                units_left: UnitsLeft::compute(&prize, counted),
                description: prize.description,
                total_units: prize.total_units,
                all_claimed: row.all_claimed,
            });
        }
        Ok(views)
    }

    /// Claim one unit of a prize in a period for a participant.
    ///
    /// Runs in one transaction holding the availability row:
    /// 1. a prize already flagged all claimed is refused
    /// 2. with no units left the prize is refused, and flagged once no
    ///    reservation is left that could still lapse
    /// 3. otherwise the pre-claim checks run, a chance is spent and the claim is created
    pub async fn claim(
        &self,
        prize_id: i32,
        period_id: i32,
        participant_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<claims::Model> {
        let txn = self.pool.begin().await?;

        let row = availability::Entity::find()
            .filter(availability::Column::PrizeId.eq(prize_id))
            .filter(availability::Column::PeriodId.eq(period_id))
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or(AppError::NotAvailableInPeriod { prize_id, period_id })?;

        if row.all_claimed {
            return Err(AppError::AllClaimed);
        }

        let prize = prizes::Entity::find_by_id(prize_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("prize {prize_id}")))?;

        let units = if prize.is_unlimited() {
            UnitsLeft::Unlimited
        } else {
            let counted = ClaimService::count_counted(&txn, prize_id, period_id, now).await?;
            UnitsLeft::compute(&prize, counted)
        };

        if units.is_exhausted() {
            let pending = ClaimService::count_pending(&txn, prize_id, period_id, now).await?;
            if pending == 0 {
                availability::Entity::update_many()
                    .col_expr(availability::Column::AllClaimed, Expr::value(true))
                    .filter(availability::Column::Id.eq(row.id))
                    .exec(&txn)
                    .await?;
                txn.commit().await?;
                log::info!("Prize {prize_id} is all claimed in period {period_id}");
            }
            return Err(AppError::AllClaimed);
        }

        let period = periods::Entity::find_by_id(period_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("time period {period_id}")))?;
        let participant = participants::Entity::find_by_id(participant_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("participant {participant_id}")))?;
        let prior_claims =
            ClaimService::count_for_participant(&txn, prize_id, period_id, participant_id).await?;

        let ctx = ClaimContext {
            prize: &prize,
            period: &period,
            participant: &participant,
            now,
            policy: &self.policy,
            prior_claims,
        };
        for check in &self.checks {
            if let Err(e) = check.run(&ctx) {
                log::debug!(
                    "Claim of prize {prize_id} by participant {participant_id} refused by {}: {e}",
                    check.name
                );
                return Err(e);
            }
        }

        if self.policy.consumes_chance {
            self.participants.use_chance_tx(&txn, &participant, now).await?;
        }

        let claim = self
            .claims
            .create_tx(&txn, prize_id, participant_id, period_id, now)
            .await?;

        txn.commit().await?;
        log::info!(
            "Claim {} created: prize {} for participant {} in period {}",
            claim.id,
            prize_id,
            participant_id,
            period_id
        );
        Ok(claim)
    }

    /// Uniform pick among the prizes offered in the period and not flagged all claimed.
    pub async fn get_random(&self, period_id: i32) -> AppResult<prizes::Model> {
        let candidates = self.eligible_prizes(period_id, false).await?;
        self.pick(candidates).ok_or(AppError::AllClaimed)
    }

    /// Like `get_random`, restricted to unlimited prizes.
    pub async fn get_random_unlimited(&self, period_id: i32) -> AppResult<prizes::Model> {
        let candidates = self.eligible_prizes(period_id, true).await?;
        self.pick(candidates).ok_or_else(|| {
            log::error!("Period {period_id} offers no unlimited prize to fall back on");
            AppError::AllClaimed
        })
    }

    /// Draw and claim a random prize, retrying refused picks up to
    /// `random_max_tries` times before falling back to an unlimited prize.
    pub async fn get_and_claim_random(
        &self,
        period_id: i32,
        participant_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<(prizes::Model, claims::Model)> {
        for attempt in 1..=self.policy.random_max_tries {
            let prize = match self.get_random(period_id).await {
                Ok(prize) => prize,
                Err(AppError::AllClaimed) => {
                    log::debug!("Nothing left to draw in period {period_id}, falling back");
                    break;
                }
                Err(e) => return Err(e),
            };

            match self.claim(prize.id, period_id, participant_id, now).await {
                Ok(claim) => return Ok((prize, claim)),
                Err(e) if e.is_retryable_pick() => {
                    log::debug!(
                        "Random pick {attempt} (prize {}) for participant {participant_id} refused: {e}",
                        prize.id
                    );
                }
                Err(e) => return Err(e),
            }
        }

        let prize = self.get_random_unlimited(period_id).await?;
        let claim = self.claim(prize.id, period_id, participant_id, now).await?;
        Ok((prize, claim))
    }

    async fn eligible_prizes(&self, period_id: i32, unlimited_only: bool) -> AppResult<Vec<prizes::Model>> {
        let mut query = prizes::Entity::find()
            .join(JoinType::InnerJoin, prizes::Relation::PrizeAvailability.def())
            .filter(availability::Column::PeriodId.eq(period_id))
            .filter(availability::Column::AllClaimed.eq(false));
        if unlimited_only {
            query = query.filter(prizes::Column::TotalUnits.eq(UNLIMITED_UNITS));
        }
        let list = query
            .order_by_asc(prizes::Column::Id)
            .all(&self.pool)
            .await?;
        Ok(list)
    }

    fn pick(&self, mut candidates: Vec<prizes::Model>) -> Option<prizes::Model> {
        let index = match self.chooser.lock() {
            Ok(mut chooser) => chooser.choose_index(candidates.len()),
            Err(poisoned) => poisoned.into_inner().choose_index(candidates.len()),
        }?;
        (index < candidates.len()).then(|| candidates.swap_remove(index))
    }
}

async fn find_availability<C: ConnectionTrait>(
    db: &C,
    prize_id: i32,
    period_id: i32,
) -> AppResult<Option<availability::Model>> {
    let row = availability::Entity::find()
        .filter(availability::Column::PrizeId.eq(prize_id))
        .filter(availability::Column::PeriodId.eq(period_id))
        .one(db)
        .await?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChanceRule, PeriodDraft};
    use crate::services::TimePeriodService;
    use crate::models::PaginationParams;
    use crate::test_support::{FileDb, ScriptedChooser, at, setup_db, setup_file_db};
    use chrono::Duration;

    struct Engine {
        periods: TimePeriodService,
        participants: ParticipantService,
        prizes: PrizeService,
        period: periods::Model,
    }

    async fn engine(policy: ClaimPolicy, initial_chances: i32) -> Engine {
        let pool = setup_db().await;
        let periods = TimePeriodService::new(pool.clone());
        let participants = ParticipantService::new(pool.clone(), ChanceRule::Limited, initial_chances);
        let prizes = PrizeService::new(pool, policy, participants.clone()).with_chooser(RandomChooser::seeded(7));
        let period = periods
            .create(PeriodDraft::new("July", at(2013, 7, 1, 0, 0, 0), None))
            .await
            .unwrap();
        Engine {
            periods,
            participants,
            prizes,
            period,
        }
    }

    fn no_confirmation() -> ClaimPolicy {
        ClaimPolicy {
            requires_confirmation: false,
            ..ClaimPolicy::default()
        }
    }

    fn t0() -> DateTime<Utc> {
        at(2013, 7, 1, 12, 0, 0)
    }

    impl Engine {
        async fn offer(&self, new_prize: NewPrize) -> prizes::Model {
            let prize = self.prizes.create_prize(new_prize, t0()).await.unwrap();
            self.prizes.make_available(prize.id, self.period.id).await.unwrap();
            prize
        }

        async fn participant(&self, user_id: i64) -> participants::Model {
            self.participants.get_or_create(user_id, t0()).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_limited_prize_runs_out_and_is_flagged() {
        let e = engine(no_confirmation(), 1).await;
        let mug = e.offer(NewPrize::limited("Mug", 3)).await;

        for user in 1..=3 {
            let p = e.participant(user).await;
            e.prizes.claim(mug.id, e.period.id, p.id, t0()).await.unwrap();
        }
        assert_eq!(
            e.prizes.units_left(mug.id, e.period.id, t0()).await.unwrap(),
            UnitsLeft::Limited(0)
        );
        assert!(!e.prizes.all_claimed(mug.id, e.period.id).await.unwrap());

        let late = e.participant(4).await;
        assert!(matches!(
            e.prizes.claim(mug.id, e.period.id, late.id, t0()).await,
            Err(AppError::AllClaimed)
        ));
        assert!(e.prizes.all_claimed(mug.id, e.period.id).await.unwrap());
        // refused claims keep the participant's chance
        assert_eq!(e.participants.find(late.id).await.unwrap().chances, 1);
    }

    #[tokio::test]
    async fn test_confirmed_claims_exhaust_prize() {
        let e = engine(ClaimPolicy::default(), 1).await;
        let mug = e.offer(NewPrize::limited("Mug", 2)).await;

        for user in 1..=2 {
            let p = e.participant(user).await;
            let claim = e.prizes.claim(mug.id, e.period.id, p.id, t0()).await.unwrap();
            e.prizes.claims().confirm(claim.id, t0(), None).await.unwrap();
        }

        let late = e.participant(3).await;
        assert!(matches!(
            e.prizes.claim(mug.id, e.period.id, late.id, t0()).await,
            Err(AppError::AllClaimed)
        ));
        assert!(e.prizes.all_claimed(mug.id, e.period.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_unlimited_prize_never_runs_out() {
        let e = engine(ClaimPolicy::default(), 1).await;
        let sticker = e.offer(NewPrize::unlimited("Sticker")).await;

        for user in 1..=10 {
            let p = e.participant(user).await;
            e.prizes.claim(sticker.id, e.period.id, p.id, t0()).await.unwrap();
        }
        assert_eq!(
            e.prizes.units_left(sticker.id, e.period.id, t0()).await.unwrap(),
            UnitsLeft::Unlimited
        );
        assert!(!e.prizes.all_claimed(sticker.id, e.period.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_unlimited_prize_can_be_reclaimed() {
        let e = engine(no_confirmation(), 3).await;
        let sticker = e.offer(NewPrize::unlimited("Sticker")).await;
        let p = e.participant(1).await;

        e.prizes.claim(sticker.id, e.period.id, p.id, t0()).await.unwrap();
        e.prizes.claim(sticker.id, e.period.id, p.id, t0()).await.unwrap();
        assert_eq!(e.participants.find(p.id).await.unwrap().chances, 1);
    }

    #[tokio::test]
    async fn test_flag_waits_for_pending_reservation() {
        let e = engine(ClaimPolicy::default(), 1).await;
        let mug = e.offer(NewPrize::limited("Mug", 1)).await;
        let first = e.participant(1).await;
        let second = e.participant(2).await;
        let third = e.participant(3).await;

        e.prizes.claim(mug.id, e.period.id, first.id, t0()).await.unwrap();

        // the reservation may still lapse, so the prize is refused but not flagged
        let during_grace = t0() + Duration::minutes(1);
        assert!(matches!(
            e.prizes.claim(mug.id, e.period.id, second.id, during_grace).await,
            Err(AppError::AllClaimed)
        ));
        assert!(!e.prizes.all_claimed(mug.id, e.period.id).await.unwrap());

        // lapsed: the unit is back in the pool
        let after_grace = t0() + Duration::minutes(6);
        assert_eq!(
            e.prizes.units_left(mug.id, e.period.id, after_grace).await.unwrap(),
            UnitsLeft::Limited(1)
        );
        let claim = e.prizes.claim(mug.id, e.period.id, second.id, after_grace).await.unwrap();
        e.prizes.claims().confirm(claim.id, after_grace, None).await.unwrap();

        assert!(matches!(
            e.prizes.claim(mug.id, e.period.id, third.id, after_grace).await,
            Err(AppError::AllClaimed)
        ));
        assert!(e.prizes.all_claimed(mug.id, e.period.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_single_chance() {
        let e = engine(ClaimPolicy::default(), 1).await;
        let mug = e.offer(NewPrize::limited("Mug", 3)).await;
        let cap = e.offer(NewPrize::limited("Cap", 3)).await;
        let p = e.participant(1).await;

        e.prizes.claim(mug.id, e.period.id, p.id, t0()).await.unwrap();
        assert!(matches!(
            e.prizes.claim(cap.id, e.period.id, p.id, t0()).await,
            Err(AppError::NoChancesRemaining)
        ));
        assert_eq!(
            e.prizes.units_left(cap.id, e.period.id, t0()).await.unwrap(),
            UnitsLeft::Limited(3)
        );
    }

    #[tokio::test]
    async fn test_claims_without_spending_chances() {
        let policy = ClaimPolicy {
            consumes_chance: false,
            ..no_confirmation()
        };
        let e = engine(policy, 0).await;
        let mug = e.offer(NewPrize::limited("Mug", 3)).await;
        let p = e.participant(1).await;

        e.prizes.claim(mug.id, e.period.id, p.id, t0()).await.unwrap();
        assert_eq!(e.participants.find(p.id).await.unwrap().chances, 0);
    }

    #[tokio::test]
    async fn test_unique_claim_is_per_period() {
        let e = engine(no_confirmation(), 3).await;
        let june = e
            .periods
            .create(PeriodDraft::new(
                "June",
                at(2013, 6, 1, 0, 0, 0),
                Some(at(2013, 6, 30, 23, 59, 59)),
            ))
            .await
            .unwrap();
        let mug = e.offer(NewPrize::limited("Mug", 3)).await;
        e.prizes.make_available(mug.id, june.id).await.unwrap();
        let p = e.participant(1).await;

        e.prizes.claim(mug.id, june.id, p.id, t0()).await.unwrap();
        assert!(matches!(
            e.prizes.claim(mug.id, june.id, p.id, t0()).await,
            Err(AppError::AlreadyClaimed)
        ));
        e.prizes.claim(mug.id, e.period.id, p.id, t0()).await.unwrap();

        // the refused claim did not cost a chance
        assert_eq!(e.participants.find(p.id).await.unwrap().chances, 1);
    }

    #[tokio::test]
    async fn test_lapsed_reservation_still_blocks_reclaim() {
        let e = engine(ClaimPolicy::default(), 2).await;
        let mug = e.offer(NewPrize::limited("Mug", 3)).await;
        let p = e.participant(1).await;

        e.prizes.claim(mug.id, e.period.id, p.id, t0()).await.unwrap();
        assert!(matches!(
            e.prizes.claim(mug.id, e.period.id, p.id, t0() + Duration::hours(1)).await,
            Err(AppError::AlreadyClaimed)
        ));
    }

    #[tokio::test]
    async fn test_prize_not_offered_in_period() {
        let e = engine(ClaimPolicy::default(), 1).await;
        let hidden = e.prizes.create_prize(NewPrize::limited("Hidden", 1), t0()).await.unwrap();
        let p = e.participant(1).await;

        assert!(matches!(
            e.prizes.claim(hidden.id, e.period.id, p.id, t0()).await,
            Err(AppError::NotAvailableInPeriod { .. })
        ));
    }

    #[tokio::test]
    async fn test_make_available_is_idempotent() {
        let e = engine(ClaimPolicy::default(), 1).await;
        let mug = e.offer(NewPrize::limited("Mug", 1)).await;
        let again = e.prizes.make_available(mug.id, e.period.id).await.unwrap();
        assert_eq!(again.prize_id, mug.id);
        assert_eq!(e.prizes.availability(e.period.id, t0()).await.unwrap().len(), 1);

        assert!(matches!(
            e.prizes.make_available(mug.id, 404).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_appended_check_runs_before_chance_is_spent() {
        let e = engine(ClaimPolicy::default(), 1).await;
        let prizes = e.prizes.clone().with_check(PreClaimCheck::has_particulars());
        let mug = e.offer(NewPrize::limited("Mug", 1)).await;
        let p = e.participant(1).await;

        assert!(matches!(
            prizes.claim(mug.id, e.period.id, p.id, t0()).await,
            Err(AppError::ValidationError(_))
        ));
        assert_eq!(e.participants.find(p.id).await.unwrap().chances, 1);
    }

    #[tokio::test]
    async fn test_random_draw_always_resolves() {
        for seed in 0..5 {
            let e = engine(no_confirmation(), 1).await;
            let prizes = e.prizes.clone().with_chooser(RandomChooser::seeded(seed));
            let x = e.offer(NewPrize::limited("X", 1)).await;
            e.offer(NewPrize::unlimited("Y")).await;

            let mut won_x = 0;
            for user in 1..=2 {
                let p = e.participant(user).await;
                let (prize, claim) = prizes.get_and_claim_random(e.period.id, p.id, t0()).await.unwrap();
                assert_eq!(claim.prize_id, prize.id);
                if prize.id == x.id {
                    won_x += 1;
                }
            }
            assert!(won_x <= 1);
        }
    }

    #[tokio::test]
    async fn test_random_falls_back_to_unlimited() {
        let e = engine(ClaimPolicy::default(), 1).await;
        let x = e.offer(NewPrize::limited("X", 1)).await;
        let y = e.offer(NewPrize::unlimited("Y")).await;
        let first = e.participant(1).await;
        let second = e.participant(2).await;

        // X is held by a pending reservation, so it stays drawable but refuses claims
        e.prizes.claim(x.id, e.period.id, first.id, t0()).await.unwrap();

        let prizes = e.prizes.clone().with_chooser(ScriptedChooser::new([0; 6]));
        let (prize, _) = prizes.get_and_claim_random(e.period.id, second.id, t0()).await.unwrap();
        assert_eq!(prize.id, y.id);
    }

    #[tokio::test]
    async fn test_random_retries_after_already_claimed() {
        let e = engine(no_confirmation(), 2).await;
        let x = e.offer(NewPrize::limited("X", 3)).await;
        let z = e.offer(NewPrize::limited("Z", 3)).await;
        let p = e.participant(1).await;
        e.prizes.claim(x.id, e.period.id, p.id, t0()).await.unwrap();

        let prizes = e.prizes.clone().with_chooser(ScriptedChooser::new([0, 1]));
        let (prize, _) = prizes.get_and_claim_random(e.period.id, p.id, t0()).await.unwrap();
        assert_eq!(prize.id, z.id);
    }

    #[tokio::test]
    async fn test_random_without_unlimited_fallback_fails() {
        let e = engine(ClaimPolicy::default(), 1).await;
        let x = e.offer(NewPrize::limited("X", 1)).await;
        let first = e.participant(1).await;
        let second = e.participant(2).await;
        e.prizes.claim(x.id, e.period.id, first.id, t0()).await.unwrap();

        assert!(matches!(
            e.prizes.get_and_claim_random(e.period.id, second.id, t0()).await,
            Err(AppError::AllClaimed)
        ));
    }

    #[tokio::test]
    async fn test_random_propagates_no_chances() {
        let e = engine(ClaimPolicy::default(), 0).await;
        e.offer(NewPrize::unlimited("Y")).await;
        let p = e.participant(1).await;

        assert!(matches!(
            e.prizes.get_and_claim_random(e.period.id, p.id, t0()).await,
            Err(AppError::NoChancesRemaining)
        ));
    }

    #[tokio::test]
    async fn test_flagged_prizes_are_not_drawn() {
        let e = engine(no_confirmation(), 2).await;
        let x = e.offer(NewPrize::limited("X", 1)).await;
        let y = e.offer(NewPrize::unlimited("Y")).await;
        let first = e.participant(1).await;
        let second = e.participant(2).await;
        e.prizes.claim(x.id, e.period.id, first.id, t0()).await.unwrap();
        assert!(e.prizes.claim(x.id, e.period.id, second.id, t0()).await.is_err());
        assert!(e.prizes.all_claimed(x.id, e.period.id).await.unwrap());

        for _ in 0..10 {
            assert_eq!(e.prizes.get_random(e.period.id).await.unwrap().id, y.id);
        }
        assert_eq!(e.prizes.get_random_unlimited(e.period.id).await.unwrap().id, y.id);
    }

    #[tokio::test]
    async fn test_availability_snapshot() {
        let e = engine(ClaimPolicy::default(), 1).await;
        let mug = e.offer(NewPrize::limited("Mug", 2)).await;
        e.offer(NewPrize::unlimited("Sticker")).await;
        let p = e.participant(1).await;
        e.prizes.claim(mug.id, e.period.id, p.id, t0()).await.unwrap();

        let views = e.prizes.availability(e.period.id, t0()).await.unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].units_left, UnitsLeft::Limited(1));
        assert_eq!(views[1].units_left, UnitsLeft::Unlimited);
        assert!(views.iter().all(|v| !v.all_claimed));
    }

    const RACERS: usize = 8;

    struct Race {
        db: FileDb,
        participants: ParticipantService,
        prizes: PrizeService,
        period: periods::Model,
    }

    async fn race(initial_chances: i32) -> Race {
        let db = setup_file_db(RACERS as u32).await;
        let participants = ParticipantService::new(db.pool.clone(), ChanceRule::Limited, initial_chances);
        let prizes = PrizeService::new(db.pool.clone(), no_confirmation(), participants.clone());
        let period = TimePeriodService::new(db.pool.clone())
            .create(PeriodDraft::new("July", at(2013, 7, 1, 0, 0, 0), None))
            .await
            .unwrap();
        Race {
            db,
            participants,
            prizes,
            period,
        }
    }

    impl Race {
        async fn offer(&self, new_prize: NewPrize) -> prizes::Model {
            let prize = self.prizes.create_prize(new_prize, t0()).await.unwrap();
            self.prizes.make_available(prize.id, self.period.id).await.unwrap();
            prize
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_for_last_unit() {
        let r = race(1).await;
        let mug = r.offer(NewPrize::limited("Mug", 1)).await;
        let mut racers = Vec::new();
        for user in 1..=RACERS as i64 {
            racers.push(r.participants.get_or_create(user, t0()).await.unwrap().id);
        }

        let handles: Vec<_> = racers
            .into_iter()
            .map(|participant_id| {
                let prizes = r.prizes.clone();
                let (prize_id, period_id) = (mug.id, r.period.id);
                tokio::spawn(async move { prizes.claim(prize_id, period_id, participant_id, t0()).await })
            })
            .collect();

        let mut won = 0u64;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => won += 1,
                Err(e) => assert!(
                    matches!(e, AppError::AllClaimed) || e.is_transient(),
                    "unexpected error {}",
                    e.code()
                ),
            }
        }
        assert!(won <= 1);
        assert_eq!(
            ClaimService::count_counted(&r.db.pool, mug.id, r.period.id, t0()).await.unwrap(),
            won
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_spend_last_chance_once() {
        let r = race(1).await;
        let mut offered = Vec::new();
        for n in 0..RACERS {
            offered.push(r.offer(NewPrize::limited(format!("Prize {n}"), 3)).await.id);
        }
        let p = r.participants.get_or_create(1, t0()).await.unwrap();

        let handles: Vec<_> = offered
            .into_iter()
            .map(|prize_id| {
                let prizes = r.prizes.clone();
                let (period_id, participant_id) = (r.period.id, p.id);
                tokio::spawn(async move { prizes.claim(prize_id, period_id, participant_id, t0()).await })
            })
            .collect();

        let mut won = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => won += 1,
                Err(e) => assert!(
                    matches!(e, AppError::NoChancesRemaining) || e.is_transient(),
                    "unexpected error {}",
                    e.code()
                ),
            }
        }
        assert_eq!(won, 1);
        assert_eq!(r.participants.find(p.id).await.unwrap().chances, 0);
        let history = r
            .prizes
            .claims()
            .list_for_participant(p.id, &PaginationParams::default(), t0())
            .await
            .unwrap();
        assert_eq!(history.pagination.total, 1);
    }
}
