use ulid::Ulid;

use crate::grid::{GridPoint, SLOT_COUNT, SlotRange};
use crate::model::{Booking, Ms};

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

/// Outcome of a conflict scan. Invalid input never reaches this type —
/// it fails earlier as `EngineError::InvalidInterval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictCheck {
    NoConflict,
    Conflict { booking_id: Ulid, slots: SlotRange },
}

/// Parse and validate a proposed `[start, end)` pair of `HH:MM` strings.
/// Rejects off-grid times, non-positive ranges, and ranges over 8 hours.
pub fn parse_slot_range(start: &str, end: &str) -> Result<SlotRange, EngineError> {
    let s = GridPoint::parse(start)
        .ok_or(EngineError::InvalidInterval("start time is not on the booking grid"))?;
    let e = GridPoint::parse(end)
        .ok_or(EngineError::InvalidInterval("end time is not on the booking grid"))?;
    SlotRange::new(s, e).map_err(EngineError::InvalidInterval)
}

/// Decide whether `proposed` overlaps any booking in `existing` (one
/// date + room's bookings). Pure — no store handle, no clock.
///
/// Builds an occupancy tally over the 21 half-hour slots, marks each
/// existing booking's `[start, end)`, then scans the proposed range: the
/// first occupied slot names the first booking covering it as the
/// rejection reason. Tallying instead of pairwise comparison keeps the
/// half-open adjacency rule a plain index check, no matter how many
/// bookings share a slot.
pub fn scan_conflict(existing: &[Booking], proposed: SlotRange) -> ConflictCheck {
    let mut occupied = [0u32; SLOT_COUNT];
    for booking in existing {
        for slot in booking.slots.slot_indices() {
            occupied[slot] += 1;
        }
    }

    for slot in proposed.slot_indices() {
        if occupied[slot] >= 1
            && let Some(booking) = existing.iter().find(|b| b.slots.covers_slot(slot))
        {
            return ConflictCheck::Conflict {
                booking_id: booking.id,
                slots: booking.slots,
            };
        }
    }

    ConflictCheck::NoConflict
}
