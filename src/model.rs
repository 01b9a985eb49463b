use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::grid::SlotRange;

/// Unix milliseconds — used only for provenance timestamps.
pub type Ms = i64;

/// Civil calendar date, no timezone. Parsed from `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl Date {
    fn days_in_month(year: u16, month: u8) -> u8 {
        match month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            2 => {
                let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
                if leap { 29 } else { 28 }
            }
            _ => 0,
        }
    }
}

impl FromStr for Date {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
            return Err("date must be YYYY-MM-DD");
        }
        let year: u16 = s[0..4].parse().map_err(|_| "bad year")?;
        let month: u8 = s[5..7].parse().map_err(|_| "bad month")?;
        let day: u8 = s[8..10].parse().map_err(|_| "bad day")?;
        if !(1..=12).contains(&month) {
            return Err("month out of range");
        }
        if day == 0 || day > Self::days_in_month(year, month) {
            return Err("day out of range");
        }
        Ok(Self { year, month, day })
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl Serialize for Date {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Date {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A persisted booking. The conflict engine only looks at `date` and
/// `slots`; everything else is display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub room_id: Ulid,
    pub date: Date,
    pub slots: SlotRange,
    pub description: String,
    pub setup_required: bool,
    pub setup_details: Option<String>,
    pub created_by: Option<String>,
    pub created_at: Ms,
}

/// Per-room state: metadata plus all bookings, sorted by
/// `(date, slots.start)` so one date's bookings form a contiguous run.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub name: String,
    pub capacity: Option<u32>,
    pub equipment: Option<String>,
    pub bookings: Vec<Booking>,
    /// Tombstone set by room deletion. Writers that were already queued
    /// on this room's lock must re-check it after acquiring the guard.
    pub deleted: bool,
}

impl RoomState {
    pub fn new(id: Ulid, name: String, capacity: Option<u32>, equipment: Option<String>) -> Self {
        Self {
            id,
            name,
            capacity,
            equipment,
            bookings: Vec::new(),
            deleted: false,
        }
    }

    /// Insert a booking maintaining the `(date, start)` sort order.
    pub fn insert_booking(&mut self, booking: Booking) {
        let key = (booking.date, booking.slots.start());
        let pos = self
            .bookings
            .binary_search_by_key(&key, |b| (b.date, b.slots.start()))
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    /// Snapshot of all bookings on one date — the store read that the
    /// conflict scan runs against. Both edges of the contiguous run are
    /// found by binary search instead of filtering the whole list.
    pub fn bookings_on(&self, date: Date) -> &[Booking] {
        let lo = self.bookings.partition_point(|b| b.date < date);
        let hi = self.bookings.partition_point(|b| b.date <= date);
        &self.bookings[lo..hi]
    }
}

/// WAL record format. Replayed in order at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        id: Ulid,
        name: String,
        capacity: Option<u32>,
        equipment: Option<String>,
    },
    RoomUpdated {
        id: Ulid,
        name: String,
        capacity: Option<u32>,
        equipment: Option<String>,
    },
    RoomDeleted {
        id: Ulid,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingDeleted {
        id: Ulid,
        room_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: Ulid,
    pub name: String,
    pub capacity: Option<u32>,
    pub equipment: Option<String>,
    pub booking_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingInfo {
    pub id: Ulid,
    pub room_id: Ulid,
    pub room_name: String,
    pub date: Date,
    pub slots: SlotRange,
    pub description: String,
    pub setup_required: bool,
    pub setup_details: Option<String>,
    pub created_by: Option<String>,
    pub created_at: Ms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarStats {
    pub total_rooms: usize,
    pub total_bookings: usize,
    pub bookings_today: usize,
}
