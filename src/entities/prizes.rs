use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// `total_units` sentinel for prizes that never run out
pub const UNLIMITED_UNITS: i32 = -1;

/// Prize entity
/// - total_units: units claimable per time period, -1 = unlimited
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "prizes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub description: String,
    pub total_units: i32,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn is_unlimited(&self) -> bool {
        self.total_units == UNLIMITED_UNITS
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::prize_availability::Entity")]
    PrizeAvailability,
    #[sea_orm(has_many = "super::claims::Entity")]
    Claims,
}

impl Related<super::prize_availability::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PrizeAvailability.def()
    }
}

impl Related<super::claims::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Claims.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
