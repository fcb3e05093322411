//! Harvest timestamp bookkeeping.

use chrono::{DateTime, Utc};

use crate::model::HarvestMetadata;

/// Computes the harvest metadata after a harvest at `now`.
///
/// `first_harvested` is carried over unchanged. `last_changed` only moves
/// when `changed` is set, and never moves backwards.
pub fn advance(old: Option<&HarvestMetadata>, now: DateTime<Utc>, changed: bool) -> HarvestMetadata {
    match old {
        None => HarvestMetadata::first(now),
        Some(old) => HarvestMetadata {
            first_harvested: old.first_harvested,
            last_harvested: now,
            last_changed: if changed {
                now.max(old.last_changed)
            } else {
                old.last_changed
            },
        },
    }
}
