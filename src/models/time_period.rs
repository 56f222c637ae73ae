use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::time_period_entity as periods;
use crate::error::{AppError, AppResult};

/// A period as submitted for creation or update, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PeriodDraft {
    pub name: String,
    pub period_start: DateTime<Utc>,
    /// None = open ended (current) period
    pub period_end: Option<DateTime<Utc>>,
}

impl PeriodDraft {
    pub fn new(
        name: impl Into<String>,
        period_start: DateTime<Utc>,
        period_end: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            name: name.into(),
            period_start,
            period_end,
        }
    }

    fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.period_start && self.period_end.is_none_or(|end| instant <= end)
    }
}

/// Validate a candidate period against every *other* persisted period.
///
/// Rules, first violation wins:
/// 1. `period_end` must be strictly after `period_start`
/// 2. neither boundary of the candidate may fall inside another period
/// 3. the candidate may not encompass a boundary of another period
///
/// Open ended periods cover everything from their start onwards, so at most one
/// of them can ever pass validation.
pub fn validate_period(candidate: &PeriodDraft, others: &[periods::Model]) -> AppResult<()> {
    if candidate.name.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Period name must not be empty".into(),
        ));
    }

    if let Some(end) = candidate.period_end
        && end <= candidate.period_start
    {
        return Err(AppError::InvalidRange);
    }

    let boundaries = [
        ("start", Some(candidate.period_start)),
        ("end", candidate.period_end),
    ];
    for (boundary, instant) in boundaries {
        let Some(instant) = instant else { continue };
        if let Some(existing) = others.iter().find(|p| p.contains(instant)) {
            return Err(AppError::OverlapsExistingPeriod {
                boundary,
                existing: existing.name.clone(),
            });
        }
    }

    if let Some(existing) = others.iter().find(|p| {
        candidate.contains(p.period_start) || p.period_end.is_some_and(|end| candidate.contains(end))
    }) {
        return Err(AppError::EncompassesExistingPeriod {
            existing: existing.name.clone(),
        });
    }

    if others.iter().any(|p| p.name == candidate.name) {
        return Err(AppError::DuplicatePeriodName(candidate.name.clone()));
    }

    Ok(())
}

/// The open ended period, if any.
pub fn current_period(periods: &[periods::Model]) -> Option<&periods::Model> {
    periods
        .iter()
        .filter(|p| p.is_open_ended())
        .max_by_key(|p| p.period_start)
}

/// Periods that started before the current one (or before `now` when there is
/// no current period), most recent first.
pub fn past_periods(periods: &[periods::Model], now: DateTime<Utc>) -> Vec<&periods::Model> {
    let cutoff = current_period(periods).map_or(now, |current| current.period_start);

    let mut past: Vec<&periods::Model> = periods
        .iter()
        .filter(|p| p.period_start < cutoff)
        .collect();
    past.sort_by(|a, b| b.period_start.cmp(&a.period_start));
    past
}
