use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entities::claim_entity as claims;
use crate::error::{AppError, AppResult};

/// Where a claim stands at a given instant. Expiry is never stored; it is
/// derived from `unclaimed_at` and the instant asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimState {
    /// Holding a unit, waiting for confirmation
    Reserved,
    Confirmed,
    /// Not confirmed in time; the unit went back to the pool
    Expired,
    /// Created without a confirmation requirement
    Permanent,
}

impl ClaimState {
    pub fn of(claim: &claims::Model, now: DateTime<Utc>) -> Self {
        if claim.confirmed {
            return ClaimState::Confirmed;
        }
        match claim.unclaimed_at {
            None => ClaimState::Permanent,
            Some(deadline) if now >= deadline => ClaimState::Expired,
            Some(_) => ClaimState::Reserved,
        }
    }

    /// Does the claim still hold its unit?
    pub fn counts_toward_units(self) -> bool {
        self != ClaimState::Expired
    }
}

/// Confirmation deadline for a claim created at `now`, None when no confirmation is required.
pub fn unclaimed_at_for(
    requires_confirmation: bool,
    grace_period: Duration,
    now: DateTime<Utc>,
) -> AppResult<Option<DateTime<Utc>>> {
    if !requires_confirmation {
        return Ok(None);
    }
    now.checked_add_signed(grace_period).map(Some).ok_or_else(|| {
        AppError::ValidationError(format!("grace period {grace_period} overflows from {now}"))
    })
}

/// Free-form answers collected when a claim is confirmed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimAnswers(BTreeMap<String, String>);

impl ClaimAnswers {
    pub fn from_json(raw: &str) -> AppResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// Only non-empty supplied values overwrite what is already there.
    pub fn merge(&mut self, supplied: &BTreeMap<String, String>) {
        for (key, value) in supplied {
            if !value.is_empty() {
                self.0.insert(key.clone(), value.clone());
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

/// Claim as shown to callers, with its state resolved at a given instant
#[derive(Debug, Clone, Serialize)]
pub struct ClaimView {
    pub id: i32,
    pub prize_id: i32,
    pub participant_id: i32,
    pub period_id: i32,
    pub state: ClaimState,
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Confirmation deadline (None = no confirmation required)
    pub unclaimed_at: Option<DateTime<Utc>>,
    pub answers: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl ClaimView {
    pub fn new(claim: claims::Model, now: DateTime<Utc>) -> AppResult<Self> {
        let state = ClaimState::of(&claim, now);
        let answers = ClaimAnswers::from_json(&claim.answers)?.into_inner();
        Ok(Self {
            id: claim.id,
            prize_id: claim.prize_id,
            participant_id: claim.participant_id,
            period_id: claim.period_id,
            state,
            confirmed_at: claim.confirmed_at,
            unclaimed_at: claim.unclaimed_at,
            answers,
            created_at: claim.created_at,
        })
    }
}
