use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A contest round. Claims are counted per period.
/// - period_start / period_end are both inclusive
/// - period_end NULL marks the open ended (current) period
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "time_periods")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
    pub period_start: DateTime<Utc>,
    pub period_end: Option<DateTime<Utc>>,
}

impl Model {
    pub fn is_open_ended(&self) -> bool {
        self.period_end.is_none()
    }

    /// Closed interval test; an open ended period reaches forever.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.period_start && self.period_end.is_none_or(|end| instant <= end)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::prize_availability::Entity")]
    PrizeAvailability,
}

impl Related<super::prize_availability::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PrizeAvailability.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
