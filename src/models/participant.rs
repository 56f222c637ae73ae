use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue::Set, IntoActiveModel};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::entities::participant_entity as participants;
use crate::error::{AppError, AppResult};
use crate::utils::start_of_day;

/// How a participant's chances are replenished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChanceRule {
    /// Chances only come back through explicit grants.
    #[default]
    Limited,
    /// Additionally one bonus chance per calendar day once the participant has
    /// played on an earlier day.
    ExtraChanceDaily,
}

impl fmt::Display for ChanceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChanceRule::Limited => write!(f, "limited"),
            ChanceRule::ExtraChanceDaily => write!(f, "extra_chance_daily"),
        }
    }
}

impl FromStr for ChanceRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "limited" => Ok(ChanceRule::Limited),
            "extra_chance_daily" => Ok(ChanceRule::ExtraChanceDaily),
            other => Err(format!("unknown chance rule: {other}")),
        }
    }
}

/// Chance bookkeeping of one participant, detached from the row it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChanceLedger {
    pub chances: u32,
    pub last_chance_used_at: Option<DateTime<Utc>>,
    pub extra_chances_received: u32,
}

impl ChanceLedger {
    pub fn from_model(model: &participants::Model) -> AppResult<Self> {
        let chances = u32::try_from(model.chances).map_err(|_| {
            AppError::CorruptChanceState(format!(
                "participant {} has negative chances ({})",
                model.id, model.chances
            ))
        })?;
        let extra_chances_received = u32::try_from(model.extra_chances_received).map_err(|_| {
            AppError::CorruptChanceState(format!(
                "participant {} has negative extra_chances_received ({})",
                model.id, model.extra_chances_received
            ))
        })?;

        Ok(Self {
            chances,
            last_chance_used_at: model.last_chance_used_at,
            extra_chances_received,
        })
    }

    /// Daily bonus: the last chance was used before today started. A participant
    /// who never used a chance has nothing to be topped up.
    ///
    /// The comparison is strictly "before midnight": treating a use on or after
    /// midnight as bonus-eligible would hand out a fresh chance after every use.
    pub fn bonus_available(&self, rule: ChanceRule, now: DateTime<Utc>) -> bool {
        match rule {
            ChanceRule::Limited => false,
            ChanceRule::ExtraChanceDaily => self
                .last_chance_used_at
                .is_some_and(|used| used < start_of_day(now)),
        }
    }

    pub fn has_chances(&self, rule: ChanceRule, now: DateTime<Utc>) -> bool {
        self.chances > 0 || self.bonus_available(rule, now)
    }

    pub fn use_chance(&mut self, rule: ChanceRule, now: DateTime<Utc>) -> AppResult<()> {
        let bonus = self.bonus_available(rule, now);

        if !self.has_chances(rule, now) {
            return Err(AppError::NoChancesRemaining);
        } else if self.chances > 0 {
            self.chances -= 1;
        } else if !bonus {
            let msg = format!(
                "has_chances is true but chances is {} and no bonus is available",
                self.chances
            );
            log::error!("{msg}");
            return Err(AppError::CorruptChanceState(msg));
        }

        match rule {
            ChanceRule::Limited => self.last_chance_used_at = Some(now),
            // Only stamp when the counter is spent, so the base chance used today
            // does not unlock today's bonus.
            ChanceRule::ExtraChanceDaily => {
                if self.chances == 0 && (self.last_chance_used_at.is_none() || bonus) {
                    self.last_chance_used_at = Some(now);
                }
            }
        }

        Ok(())
    }

    pub fn receive_extra_chance(&mut self) {
        self.chances += 1;
        self.extra_chances_received += 1;
    }

    pub fn chances_i32(&self) -> AppResult<i32> {
        i32::try_from(self.chances)
            .map_err(|_| AppError::InternalError("chance counter overflow".into()))
    }
}

/// Personal particulars submitted by a participant; empty values are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Particulars {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl Particulars {
    /// Active model carrying only the fields that change, or None when nothing does.
    pub fn changes_for(
        &self,
        model: &participants::Model,
        now: DateTime<Utc>,
    ) -> Option<participants::ActiveModel> {
        fn changed<'a>(new: &'a Option<String>, current: &str) -> Option<&'a String> {
            new.as_ref().filter(|v| !v.is_empty() && v.as_str() != current)
        }

        let full_name = changed(&self.full_name, &model.full_name);
        let phone = changed(&self.phone, &model.phone);
        let email = changed(&self.email, &model.email);

        if full_name.is_none() && phone.is_none() && email.is_none() {
            return None;
        }

        let mut am = model.clone().into_active_model();
        if let Some(v) = full_name {
            am.full_name = Set(v.clone());
        }
        if let Some(v) = phone {
            am.phone = Set(v.clone());
        }
        if let Some(v) = email {
            am.email = Set(v.clone());
        }
        am.updated_at = Set(now);
        Some(am)
    }
}

/// Chance summary of a participant
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantChancesView {
    pub participant_id: i32,
    pub user_id: i64,
    /// Chances left on the counter
    pub chances: i32,
    /// Whether a claim would currently be admitted chance-wise
    pub has_chances: bool,
    /// Whether today's bonus chance is still up for grabs
    pub bonus_available: bool,
    pub last_chance_used_at: Option<DateTime<Utc>>,
    pub extra_chances_received: i32,
}

impl ParticipantChancesView {
    pub fn new(model: &participants::Model, rule: ChanceRule, now: DateTime<Utc>) -> AppResult<Self> {
        let ledger = ChanceLedger::from_model(model)?;
        Ok(Self {
            participant_id: model.id,
            user_id: model.user_id,
            chances: model.chances,
            has_chances: ledger.has_chances(rule, now),
            bonus_available: ledger.bonus_available(rule, now),
            last_chance_used_at: model.last_chance_used_at,
            extra_chances_received: model.extra_chances_received,
        })
    }
}
