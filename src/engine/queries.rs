use ulid::Ulid;

use crate::grid::SlotRange;
use crate::model::*;

use super::conflict::{ConflictCheck, scan_conflict};
use super::{Engine, SharedRoomState};

fn booking_info(booking: &Booking, room_name: &str) -> BookingInfo {
    BookingInfo {
        id: booking.id,
        room_id: booking.room_id,
        room_name: room_name.to_owned(),
        date: booking.date,
        slots: booking.slots,
        description: booking.description.clone(),
        setup_required: booking.setup_required,
        setup_details: booking.setup_details.clone(),
        created_by: booking.created_by.clone(),
        created_at: booking.created_at,
    }
}

impl Engine {
    /// Collect Arc handles before the first await: a DashMap shard ref
    /// held across an await point can deadlock against writers.
    fn snapshot_rooms(&self) -> Vec<SharedRoomState> {
        self.rooms.iter().map(|e| e.value().clone()).collect()
    }

    /// Read-only conflict probe. An unknown room has no bookings, so it
    /// reports no conflict; the authoritative check happens again under
    /// the write lock in `create_booking`.
    pub async fn check_conflict(
        &self,
        room_id: Ulid,
        date: Date,
        slots: SlotRange,
    ) -> ConflictCheck {
        let Some(rs) = self.get_room(&room_id) else {
            return ConflictCheck::NoConflict;
        };
        let guard = rs.read().await;
        scan_conflict(guard.bookings_on(date), slots)
    }

    /// All bookings on one date across every room, sorted by room name
    /// then start time.
    pub async fn bookings_for_date(&self, date: Date) -> Vec<BookingInfo> {
        let mut out = Vec::new();
        for rs in self.snapshot_rooms() {
            let guard = rs.read().await;
            for booking in guard.bookings_on(date) {
                out.push(booking_info(booking, &guard.name));
            }
        }
        out.sort_by(|a, b| {
            (a.room_name.as_str(), a.slots.start()).cmp(&(b.room_name.as_str(), b.slots.start()))
        });
        out
    }

    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let mut out = Vec::new();
        for rs in self.snapshot_rooms() {
            let guard = rs.read().await;
            out.push(RoomInfo {
                id: guard.id,
                name: guard.name.clone(),
                capacity: guard.capacity,
                equipment: guard.equipment.clone(),
                booking_count: guard.bookings.len(),
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Admin booking listing, optionally filtered by date and/or room.
    /// Newest dates first, earlier start times first within a date.
    pub async fn list_bookings(
        &self,
        filter_date: Option<Date>,
        filter_room: Option<Ulid>,
    ) -> Vec<BookingInfo> {
        let mut out = Vec::new();
        for rs in self.snapshot_rooms() {
            let guard = rs.read().await;
            if let Some(room_id) = filter_room
                && guard.id != room_id
            {
                continue;
            }
            match filter_date {
                Some(date) => {
                    for booking in guard.bookings_on(date) {
                        out.push(booking_info(booking, &guard.name));
                    }
                }
                None => {
                    for booking in &guard.bookings {
                        out.push(booking_info(booking, &guard.name));
                    }
                }
            }
        }
        out.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| a.slots.start().cmp(&b.slots.start()))
        });
        out
    }

    pub async fn stats(&self, today: Date) -> CalendarStats {
        let mut total_bookings = 0;
        let mut bookings_today = 0;
        let rooms = self.snapshot_rooms();
        let total_rooms = rooms.len();
        for rs in rooms {
            let guard = rs.read().await;
            total_bookings += guard.bookings.len();
            bookings_today += guard.bookings_on(today).len();
        }
        CalendarStats {
            total_rooms,
            total_bookings,
            bookings_today,
        }
    }
}
