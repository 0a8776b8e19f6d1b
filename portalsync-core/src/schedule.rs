//! Sync scheduling: decide whether an item or task is due.
//!
//! Each frequency maps to a look-back interval. An entry is due when its last
//! sync is on or before `today` minus that interval (boundary inclusive).
//! `never` has no interval; instead it compares against a fixed horizon that
//! sits after the first-run sentinel, so a never-synced entry still runs once
//! and a synced one never runs again.

use chrono::{Days, Months, NaiveDate};

use crate::types::{Frequency, SyncState};

/// Cut-off for `Frequency::Never`: due only when `last` is on or before it.
pub fn never_horizon() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Latest `last` date that still counts as due for `frequency` on `today`.
///
/// Returns `None` when the subtraction leaves chrono's supported range, in
/// which case every `last` date is treated as due.
pub fn due_threshold(frequency: Frequency, today: NaiveDate) -> Option<NaiveDate> {
    match frequency {
        Frequency::Never => Some(never_horizon()),
        Frequency::Daily => today.checked_sub_days(Days::new(1)),
        Frequency::Weekly => today.checked_sub_days(Days::new(7)),
        Frequency::Monthly => today.checked_sub_months(Months::new(1)),
        Frequency::Yearly => today.checked_sub_months(Months::new(12)),
    }
}

/// `true` when an entry last synced on `last` should run again on `today`.
pub fn is_due(frequency: Frequency, last: NaiveDate, today: NaiveDate) -> bool {
    match due_threshold(frequency, today) {
        Some(threshold) => last <= threshold,
        None => true,
    }
}

/// [`is_due`] for an optional sync block. A missing block, or one without a
/// readable frequency, is always due.
pub fn is_state_due(state: Option<&SyncState>, today: NaiveDate) -> bool {
    match state {
        None => true,
        Some(state) if state.raw_frequency.is_some() => true,
        Some(state) => is_due(state.frequency, state.last, today),
    }
}
