use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Claim entity: one participant holding one unit of a prize in one period.
/// - unclaimed_at: confirmation deadline, NULL when no confirmation is required
/// - answers: JSON object of free-form answers collected on confirmation
/// Rows are never deleted; expiry is computed when reading.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "claims")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub prize_id: i32,
    pub participant_id: i32,
    pub period_id: i32,
    pub confirmed: bool,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub unclaimed_at: Option<DateTime<Utc>>,
    #[sea_orm(column_type = "Text")]
    pub answers: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::prizes::Entity",
        from = "Column::PrizeId",
        to = "super::prizes::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Prize,
    #[sea_orm(
        belongs_to = "super::participants::Entity",
        from = "Column::ParticipantId",
        to = "super::participants::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Participant,
    #[sea_orm(
        belongs_to = "super::time_periods::Entity",
        from = "Column::PeriodId",
        to = "super::time_periods::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    TimePeriod,
}

impl Related<super::prizes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Prize.def()
    }
}

impl Related<super::participants::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Participant.def()
    }
}

impl Related<super::time_periods::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TimePeriod.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
