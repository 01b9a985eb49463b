//! The booking time grid: 08:00 to 18:30 in 30-minute steps.
//!
//! Every booking boundary must sit exactly on one of the 22 grid points;
//! the 21 gaps between consecutive points are the bookable slots. This
//! module is the single source of truth for both validation and the
//! option lists shown to clients — there is no second copy to drift.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opening time, minutes since midnight (08:00).
pub const OPEN_MINUTES: u16 = 8 * 60;

/// Closing grid point, minutes since midnight (18:30).
pub const CLOSE_MINUTES: u16 = 18 * 60 + 30;

/// Width of one slot in minutes.
pub const SLOT_MINUTES: u16 = 30;

/// Number of grid points (08:00 ..= 18:30).
pub const GRID_POINTS: usize = 22;

/// Number of bookable 30-minute slots between consecutive grid points.
pub const SLOT_COUNT: usize = GRID_POINTS - 1;

/// Longest allowed booking: 16 slots = 8 hours.
pub const MAX_BOOKING_SLOTS: u8 = 16;

/// One of the 22 fixed clock times, stored as its grid index (0 = 08:00,
/// 21 = 18:30). Constructed only through [`GridPoint::from_index`] or
/// [`GridPoint::parse`], so a held value is always on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPoint(u8);

impl GridPoint {
    pub fn from_index(index: u8) -> Option<Self> {
        if (index as usize) < GRID_POINTS {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Map an `HH:MM` 24-hour string to its grid index. Off-grid times
    /// (wrong format, outside 08:00–18:30, not a half-hour boundary)
    /// return `None` — O(1), no table scan.
    pub fn parse(time: &str) -> Option<Self> {
        let (h, m) = time.split_once(':')?;
        if h.len() != 2 || m.len() != 2 {
            return None;
        }
        let hours: u16 = h.parse().ok()?;
        let mins: u16 = m.parse().ok()?;
        if hours > 23 || mins > 59 {
            return None;
        }
        let total = hours * 60 + mins;
        if total < OPEN_MINUTES || total > CLOSE_MINUTES {
            return None;
        }
        let offset = total - OPEN_MINUTES;
        if offset % SLOT_MINUTES != 0 {
            return None;
        }
        Some(Self((offset / SLOT_MINUTES) as u8))
    }

    pub fn index(self) -> u8 {
        self.0
    }

    pub fn minutes(self) -> u16 {
        OPEN_MINUTES + self.0 as u16 * SLOT_MINUTES
    }

    /// 12-hour label for option lists, e.g. "8:30 AM", "1:00 PM".
    pub fn label(self) -> String {
        let mins = self.minutes();
        let hour24 = mins / 60;
        let minute = mins % 60;
        let (hour12, suffix) = match hour24 {
            0 => (12, "AM"),
            1..=11 => (hour24, "AM"),
            12 => (12, "PM"),
            _ => (hour24 - 12, "PM"),
        };
        format!("{hour12}:{minute:02} {suffix}")
    }
}

impl fmt::Display for GridPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mins = self.minutes();
        write!(f, "{:02}:{:02}", mins / 60, mins % 60)
    }
}

/// Half-open booking interval `[start, end)` in grid indices.
/// Invariants (enforced at construction): `start < end`,
/// `end - start <= MAX_BOOKING_SLOTS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRange {
    start: GridPoint,
    end: GridPoint,
}

impl SlotRange {
    pub fn new(start: GridPoint, end: GridPoint) -> Result<Self, &'static str> {
        if end.0 <= start.0 {
            return Err("end time must be after start time");
        }
        if end.0 - start.0 > MAX_BOOKING_SLOTS {
            return Err("booking duration exceeds 8-hour maximum");
        }
        Ok(Self { start, end })
    }

    pub fn start(self) -> GridPoint {
        self.start
    }

    pub fn end(self) -> GridPoint {
        self.end
    }

    pub fn slot_count(self) -> u8 {
        self.end.0 - self.start.0
    }

    /// Slot indices this range occupies, for tally loops.
    pub fn slot_indices(self) -> std::ops::Range<usize> {
        self.start.0 as usize..self.end.0 as usize
    }

    pub fn covers_slot(self, slot: usize) -> bool {
        self.start.0 as usize <= slot && slot < self.end.0 as usize
    }

    pub fn overlaps(self, other: SlotRange) -> bool {
        self.start.0 < other.end.0 && other.start.0 < self.end.0
    }
}

/// Renders as the `"<start>-<end>"` display string clients call a time slot.
impl fmt::Display for SlotRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Valid start times (08:00 .. 18:00) with display labels.
pub fn start_options() -> Vec<(String, String)> {
    (0..SLOT_COUNT as u8)
        .map(|i| {
            let p = GridPoint(i);
            (p.to_string(), p.label())
        })
        .collect()
}

/// Valid end times (08:30 ..= 18:30) with display labels.
pub fn end_options() -> Vec<(String, String)> {
    (1..GRID_POINTS as u8)
        .map(|i| {
            let p = GridPoint(i);
            (p.to_string(), p.label())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_grid_aligned() {
        assert_eq!(GridPoint::parse("08:00").unwrap().index(), 0);
        assert_eq!(GridPoint::parse("08:30").unwrap().index(), 1);
        assert_eq!(GridPoint::parse("13:00").unwrap().index(), 10);
        assert_eq!(GridPoint::parse("18:30").unwrap().index(), 21);
    }

    #[test]
    fn parse_off_grid_rejected() {
        assert!(GridPoint::parse("09:15").is_none());
        assert!(GridPoint::parse("07:30").is_none());
        assert!(GridPoint::parse("19:00").is_none());
        assert!(GridPoint::parse("9:00").is_none()); // must be zero-padded
        assert!(GridPoint::parse("nope").is_none());
        assert!(GridPoint::parse("25:00").is_none());
    }

    #[test]
    fn display_round_trips() {
        for i in 0..GRID_POINTS as u8 {
            let p = GridPoint::from_index(i).unwrap();
            assert_eq!(GridPoint::parse(&p.to_string()), Some(p));
        }
    }

    #[test]
    fn labels_match_clock() {
        assert_eq!(GridPoint::parse("08:00").unwrap().label(), "8:00 AM");
        assert_eq!(GridPoint::parse("12:00").unwrap().label(), "12:00 PM");
        assert_eq!(GridPoint::parse("12:30").unwrap().label(), "12:30 PM");
        assert_eq!(GridPoint::parse("13:30").unwrap().label(), "1:30 PM");
        assert_eq!(GridPoint::parse("18:30").unwrap().label(), "6:30 PM");
    }

    #[test]
    fn range_invariants() {
        let s = GridPoint::parse("09:00").unwrap();
        let e = GridPoint::parse("10:00").unwrap();
        let r = SlotRange::new(s, e).unwrap();
        assert_eq!(r.slot_count(), 2);
        assert_eq!(r.to_string(), "09:00-10:00");

        // zero-length
        assert!(SlotRange::new(s, s).is_err());
        // inverted
        assert!(SlotRange::new(e, s).is_err());
        // 08:00-18:30 = 21 slots = 10.5h, over the 8h max
        let open = GridPoint::parse("08:00").unwrap();
        let close = GridPoint::parse("18:30").unwrap();
        assert!(SlotRange::new(open, close).is_err());
        // 08:00-16:00 = exactly 16 slots, allowed
        let four = GridPoint::parse("16:00").unwrap();
        assert!(SlotRange::new(open, four).is_ok());
    }

    #[test]
    fn range_overlap_half_open() {
        let r = |a: &str, b: &str| {
            SlotRange::new(GridPoint::parse(a).unwrap(), GridPoint::parse(b).unwrap()).unwrap()
        };
        assert!(r("09:00", "10:00").overlaps(r("09:30", "11:00")));
        assert!(!r("09:00", "10:00").overlaps(r("10:00", "11:00"))); // touching
        assert!(r("09:00", "10:00").overlaps(r("09:00", "10:00"))); // identical
    }

    #[test]
    fn option_lists_cover_grid() {
        let starts = start_options();
        let ends = end_options();
        assert_eq!(starts.len(), SLOT_COUNT);
        assert_eq!(ends.len(), SLOT_COUNT);
        assert_eq!(starts[0].0, "08:00");
        assert_eq!(starts.last().unwrap().0, "18:00");
        assert_eq!(ends[0].0, "08:30");
        assert_eq!(ends.last().unwrap().0, "18:30");
    }
}
