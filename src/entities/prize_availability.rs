use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Prize <-> time period join table.
/// all_claimed is a monotone cache: once set the engine stops counting claims
/// for the pair and random draws skip the prize.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "prize_availability")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub prize_id: i32,
    pub period_id: i32,
    pub all_claimed: bool,
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

impl Related<super::time_periods::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TimePeriod.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
