use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Participant entity
/// - chances: attempts currently left (never negative)
/// - last_chance_used_at: drives the daily bonus rule
/// - extra_chances_received: informational, counts explicit grants only
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "participants")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// External user identity
    #[sea_orm(unique)]
    pub user_id: i64,
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub chances: i32,
    pub last_chance_used_at: Option<DateTime<Utc>>,
    pub extra_chances_received: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Has the participant entered all the personal particulars required?
    pub fn has_personal_particulars(&self) -> bool {
        !self.full_name.is_empty() && !self.phone.is_empty() && !self.email.is_empty()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::claims::Entity")]
    Claims,
}

impl Related<super::claims::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Claims.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
