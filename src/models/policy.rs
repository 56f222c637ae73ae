use chrono::{DateTime, Duration, Utc};
use std::fmt;

use crate::entities::{
    participant_entity as participants, prize_entity as prizes, time_period_entity as periods,
};
use crate::error::{AppError, AppResult};

/// Behaviours the allocation engine applies to every claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimPolicy {
    /// Claims hold their unit only for `grace_period` unless confirmed
    pub requires_confirmation: bool,
    /// A participant may hold one claim per prize and period
    pub unique_per_participant: bool,
    /// Lifts `unique_per_participant` for unlimited prizes
    pub can_reclaim_unlimited: bool,
    /// Every claim spends one participant chance
    pub consumes_chance: bool,
    pub grace_period: Duration,
    pub random_max_tries: u32,
}

impl Default for ClaimPolicy {
    fn default() -> Self {
        Self {
            requires_confirmation: true,
            unique_per_participant: true,
            can_reclaim_unlimited: true,
            consumes_chance: true,
            grace_period: Duration::minutes(5),
            random_max_tries: 6,
        }
    }
}

impl ClaimPolicy {
    /// Pre-claim checks implied by this policy, in evaluation order.
    pub fn pre_claim_checks(&self) -> Vec<PreClaimCheck> {
        let mut checks = Vec::new();
        if self.unique_per_participant {
            checks.push(PreClaimCheck::unique_claim());
        }
        checks
    }
}

/// Everything a pre-claim check may look at.
#[derive(Debug)]
pub struct ClaimContext<'a> {
    pub prize: &'a prizes::Model,
    pub period: &'a periods::Model,
    pub participant: &'a participants::Model,
    pub now: DateTime<Utc>,
    pub policy: &'a ClaimPolicy,
    /// Claims this participant already holds for the prize in the period,
    /// lapsed reservations included
    pub prior_claims: u64,
}

/// A named admission rule evaluated after the unit count and before a chance is spent.
#[derive(Clone, Copy)]
pub struct PreClaimCheck {
    pub name: &'static str,
    check: fn(&ClaimContext<'_>) -> AppResult<()>,
}

impl fmt::Debug for PreClaimCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreClaimCheck").field("name", &self.name).finish()
    }
}

impl PreClaimCheck {
    pub const fn new(name: &'static str, check: fn(&ClaimContext<'_>) -> AppResult<()>) -> Self {
        Self { name, check }
    }

    pub fn run(&self, ctx: &ClaimContext<'_>) -> AppResult<()> {
        (self.check)(ctx)
    }

    /// Rejects a second claim of the same prize in the same period.
    pub const fn unique_claim() -> Self {
        Self::new("unique_claim", unique_claim)
    }

    /// Rejects claims outside the period's own interval. Not part of any default
    /// policy; append it when periods must be running to accept claims.
    pub const fn period_running() -> Self {
        Self::new("period_running", period_running)
    }

    /// Rejects participants who have not entered their personal particulars.
    pub const fn has_particulars() -> Self {
        Self::new("has_particulars", has_particulars)
    }
}

fn unique_claim(ctx: &ClaimContext<'_>) -> AppResult<()> {
    if ctx.prior_claims == 0 {
        return Ok(());
    }
    if ctx.prize.is_unlimited() && ctx.policy.can_reclaim_unlimited {
        return Ok(());
    }
    Err(AppError::AlreadyClaimed)
}

fn period_running(ctx: &ClaimContext<'_>) -> AppResult<()> {
    if ctx.period.contains(ctx.now) {
        Ok(())
    } else {
        Err(AppError::ValidationError(format!(
            "Period '{}' is not running",
            ctx.period.name
        )))
    }
}

fn has_particulars(ctx: &ClaimContext<'_>) -> AppResult<()> {
    if ctx.participant.has_personal_particulars() {
        Ok(())
    } else {
        Err(AppError::ValidationError(
            "Personal particulars are incomplete".into(),
        ))
    }
}
