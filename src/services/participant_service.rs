use crate::entities::participant_entity as participants;
use crate::error::{AppError, AppResult};
use crate::models::{ChanceLedger, ChanceRule, ParticipantChancesView, Particulars};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};

#[derive(Clone)]
pub struct ParticipantService {
    pool: DatabaseConnection,
    rule: ChanceRule,
    initial_chances: i32,
}

impl ParticipantService {
    pub fn new(pool: DatabaseConnection, rule: ChanceRule, initial_chances: i32) -> Self {
        Self {
            pool,
            rule,
            initial_chances,
        }
    }

    pub fn rule(&self) -> ChanceRule {
        self.rule
    }

    /// Participant for an external user, registered with the initial chances on first sight.
    pub async fn get_or_create(&self, user_id: i64, now: DateTime<Utc>) -> AppResult<participants::Model> {
        if let Some(m) = self.find_by_user(user_id).await? {
            return Ok(m);
        }

        let inserted = participants::ActiveModel {
            user_id: Set(user_id),
            full_name: Set(String::new()),
            phone: Set(String::new()),
            email: Set(String::new()),
            chances: Set(self.initial_chances),
            last_chance_used_at: Set(None),
            extra_chances_received: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.pool)
        .await;

        match inserted {
            Ok(m) => {
                log::info!("Registered participant {} for user {}", m.id, user_id);
                Ok(m)
            }
            // lost a registration race on the unique user_id index
            Err(e) => match self.find_by_user(user_id).await? {
                Some(m) => Ok(m),
                None => Err(e.into()),
            },
        }
    }

    pub async fn find(&self, id: i32) -> AppResult<participants::Model> {
        participants::Entity::find_by_id(id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("participant {id}")))
    }

    pub async fn find_by_user(&self, user_id: i64) -> AppResult<Option<participants::Model>> {
        let m = participants::Entity::find()
            .filter(participants::Column::UserId.eq(user_id))
            .one(&self.pool)
            .await?;
        Ok(m)
    }

    pub async fn chances_view(&self, id: i32, now: DateTime<Utc>) -> AppResult<ParticipantChancesView> {
        let model = self.find(id).await?;
        ParticipantChancesView::new(&model, self.rule, now)
    }

    pub async fn has_chances(&self, id: i32, now: DateTime<Utc>) -> AppResult<bool> {
        let model = self.find(id).await?;
        Ok(ChanceLedger::from_model(&model)?.has_chances(self.rule, now))
    }

    /// Spend one chance outside of a claim.
    pub async fn use_chance(&self, id: i32, now: DateTime<Utc>) -> AppResult<participants::Model> {
        let txn = self.pool.begin().await?;
        let model = participants::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("participant {id}")))?;
        let updated = self.use_chance_tx(&txn, &model, now).await?;
        txn.commit().await?;
        Ok(updated)
    }

    /// Spend one chance of `participant` as read on `db`.
    ///
    /// The write only lands when the row still holds the observed counter and
    /// timestamp; otherwise `ConcurrentModification` is returned and nothing changes.
    pub async fn use_chance_tx<C: ConnectionTrait>(
        &self,
        db: &C,
        participant: &participants::Model,
        now: DateTime<Utc>,
    ) -> AppResult<participants::Model> {
        let mut ledger = ChanceLedger::from_model(participant)?;
        ledger.use_chance(self.rule, now)?;
        let chances = ledger.chances_i32()?;

        let mut update = participants::Entity::update_many()
            .col_expr(participants::Column::Chances, Expr::value(chances))
            .col_expr(
                participants::Column::LastChanceUsedAt,
                Expr::value(ledger.last_chance_used_at),
            )
            .col_expr(participants::Column::UpdatedAt, Expr::value(now))
            .filter(participants::Column::Id.eq(participant.id))
            .filter(participants::Column::Chances.eq(participant.chances));
        update = match participant.last_chance_used_at {
            Some(ts) => update.filter(participants::Column::LastChanceUsedAt.eq(ts)),
            None => update.filter(participants::Column::LastChanceUsedAt.is_null()),
        };

        let result = update.exec(db).await?;
        if result.rows_affected != 1 {
            return Err(AppError::ConcurrentModification(format!(
                "participant {} changed while spending a chance",
                participant.id
            )));
        }

        Ok(participants::Model {
            chances,
            last_chance_used_at: ledger.last_chance_used_at,
            updated_at: now,
            ..participant.clone()
        })
    }

    /// Grant one more chance.
    pub async fn receive_extra_chance(&self, id: i32, now: DateTime<Utc>) -> AppResult<participants::Model> {
        let result = participants::Entity::update_many()
            .col_expr(
                participants::Column::Chances,
                Expr::col(participants::Column::Chances).add(1),
            )
            .col_expr(
                participants::Column::ExtraChancesReceived,
                Expr::col(participants::Column::ExtraChancesReceived).add(1),
            )
            .col_expr(participants::Column::UpdatedAt, Expr::value(now))
            .filter(participants::Column::Id.eq(id))
            .exec(&self.pool)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("participant {id}")));
        }
        self.find(id).await
    }

    /// Store the non-empty particulars that differ from what is on file.
    pub async fn set_particulars(
        &self,
        id: i32,
        particulars: &Particulars,
        now: DateTime<Utc>,
    ) -> AppResult<participants::Model> {
        let model = self.find(id).await?;
        match particulars.changes_for(&model, now) {
            Some(am) => Ok(am.update(&self.pool).await?),
            None => Ok(model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at, setup_db};

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let service = ParticipantService::new(setup_db().await, ChanceRule::Limited, 2);
        let now = at(2013, 7, 1, 9, 0, 0);

        let first = service.get_or_create(42, now).await.unwrap();
        let again = service.get_or_create(42, now).await.unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(first.chances, 2);
        assert_eq!(first.last_chance_used_at, None);
    }

    #[tokio::test]
    async fn test_use_chance_until_exhausted() {
        let service = ParticipantService::new(setup_db().await, ChanceRule::Limited, 1);
        let now = at(2013, 7, 1, 9, 0, 0);
        let p = service.get_or_create(1, now).await.unwrap();

        let spent = service.use_chance(p.id, now).await.unwrap();
        assert_eq!(spent.chances, 0);
        assert_eq!(spent.last_chance_used_at, Some(now));

        assert!(matches!(
            service.use_chance(p.id, now).await,
            Err(AppError::NoChancesRemaining)
        ));
        assert_eq!(service.find(p.id).await.unwrap().chances, 0);
    }

    #[tokio::test]
    async fn test_stale_read_is_concurrent_modification() {
        let service = ParticipantService::new(setup_db().await, ChanceRule::Limited, 2);
        let now = at(2013, 7, 1, 9, 0, 0);
        let stale = service.get_or_create(1, now).await.unwrap();

        service.use_chance_tx(&service.pool, &stale, now).await.unwrap();
        assert!(matches!(
            service.use_chance_tx(&service.pool, &stale, now).await,
            Err(AppError::ConcurrentModification(_))
        ));
        assert_eq!(service.find(stale.id).await.unwrap().chances, 1);
    }

    #[tokio::test]
    async fn test_daily_bonus_persists() {
        let service = ParticipantService::new(setup_db().await, ChanceRule::ExtraChanceDaily, 1);
        let day_one = at(2013, 7, 1, 9, 0, 0);
        let day_two = at(2013, 7, 2, 9, 0, 0);
        let p = service.get_or_create(1, day_one).await.unwrap();

        service.use_chance(p.id, day_one).await.unwrap();
        assert!(!service.has_chances(p.id, day_one).await.unwrap());
        assert!(service.has_chances(p.id, day_two).await.unwrap());

        let after_bonus = service.use_chance(p.id, day_two).await.unwrap();
        assert_eq!(after_bonus.chances, 0);
        assert_eq!(after_bonus.last_chance_used_at, Some(day_two));
        assert!(!service.has_chances(p.id, day_two).await.unwrap());
    }

    #[tokio::test]
    async fn test_receive_extra_chance() {
        let service = ParticipantService::new(setup_db().await, ChanceRule::Limited, 0);
        let now = at(2013, 7, 1, 9, 0, 0);
        let p = service.get_or_create(1, now).await.unwrap();
        assert!(!service.has_chances(p.id, now).await.unwrap());

        let granted = service.receive_extra_chance(p.id, now).await.unwrap();
        assert_eq!(granted.chances, 1);
        assert_eq!(granted.extra_chances_received, 1);

        let view = service.chances_view(p.id, now).await.unwrap();
        assert!(view.has_chances);

        assert!(matches!(
            service.receive_extra_chance(404, now).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_set_particulars() {
        let service = ParticipantService::new(setup_db().await, ChanceRule::Limited, 1);
        let now = at(2013, 7, 1, 9, 0, 0);
        let p = service.get_or_create(1, now).await.unwrap();

        let later = at(2013, 7, 1, 10, 0, 0);
        let updated = service
            .set_particulars(
                p.id,
                &Particulars {
                    full_name: Some("Ada".into()),
                    phone: Some("555-0100".into()),
                    email: Some("ada@example.com".into()),
                },
                later,
            )
            .await
            .unwrap();
        assert!(updated.has_personal_particulars());
        assert_eq!(updated.updated_at, later);

        // nothing to change keeps updated_at
        let same = service
            .set_particulars(updated.id, &Particulars::default(), at(2013, 7, 2, 0, 0, 0))
            .await
            .unwrap();
        assert_eq!(same.updated_at, later);
    }
}
