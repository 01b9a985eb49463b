use std::sync::Arc;

use tokio::sync::{RwLock, oneshot};
use ulid::Ulid;

use crate::grid::SlotRange;
use crate::limits::*;
use crate::model::*;

use super::conflict::{ConflictCheck, now_ms, scan_conflict};
use super::{Engine, EngineError, WalCommand};

/// Caller-supplied booking fields; id and created_at are assigned here.
#[derive(Debug, Clone, Default)]
pub struct BookingRequest {
    pub description: String,
    pub setup_required: bool,
    pub setup_details: Option<String>,
    pub created_by: Option<String>,
}

impl Engine {
    pub async fn create_room(
        &self,
        id: Ulid,
        name: String,
        capacity: Option<u32>,
        equipment: Option<String>,
    ) -> Result<(), EngineError> {
        if self.rooms.len() >= MAX_ROOMS_PER_SITE {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        if name.is_empty() || name.len() > MAX_ROOM_NAME_LEN {
            return Err(EngineError::LimitExceeded("room name empty or too long"));
        }
        if self.rooms.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::RoomCreated {
            id,
            name: name.clone(),
            capacity,
            equipment: equipment.clone(),
        };
        self.wal_append(&event).await?;
        let rs = RoomState::new(id, name, capacity, equipment);
        self.rooms.insert(id, Arc::new(RwLock::new(rs)));
        self.notify.send(id, &event);
        Ok(())
    }

    pub async fn update_room(
        &self,
        id: Ulid,
        name: String,
        capacity: Option<u32>,
        equipment: Option<String>,
    ) -> Result<(), EngineError> {
        if name.is_empty() || name.len() > MAX_ROOM_NAME_LEN {
            return Err(EngineError::LimitExceeded("room name empty or too long"));
        }
        let rs = self.get_room(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;
        if guard.deleted {
            return Err(EngineError::NotFound(id));
        }

        let event = Event::RoomUpdated {
            id,
            name,
            capacity,
            equipment,
        };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    /// Delete a room and, with it, every booking it holds.
    pub async fn delete_room(&self, id: Ulid) -> Result<(), EngineError> {
        let rs = self.get_room(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;
        if guard.deleted {
            return Err(EngineError::NotFound(id));
        }

        let event = Event::RoomDeleted { id };
        self.wal_append(&event).await?;
        guard.deleted = true;
        for booking in &guard.bookings {
            self.booking_to_room.remove(&booking.id);
        }
        self.rooms.remove(&id);
        self.notify.send(id, &event);
        self.notify.remove(&id);
        Ok(())
    }

    /// Conflict check and insert under one held write lock: two racing
    /// creates for the same room serialize here, so exactly one can win
    /// a contested slot.
    pub async fn create_booking(
        &self,
        id: Ulid,
        room_id: Ulid,
        date: Date,
        slots: SlotRange,
        request: BookingRequest,
    ) -> Result<Booking, EngineError> {
        if request.description.len() > MAX_TEXT_LEN {
            return Err(EngineError::LimitExceeded("description too long"));
        }
        if let Some(ref details) = request.setup_details
            && details.len() > MAX_TEXT_LEN
        {
            return Err(EngineError::LimitExceeded("setup details too long"));
        }
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let mut guard = rs.write().await;
        if guard.deleted {
            return Err(EngineError::NotFound(room_id));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }

        if let ConflictCheck::Conflict { booking_id, slots } =
            scan_conflict(guard.bookings_on(date), slots)
        {
            return Err(EngineError::Conflict { booking_id, slots });
        }

        let booking = Booking {
            id,
            room_id,
            date,
            slots,
            description: request.description,
            setup_required: request.setup_required,
            setup_details: request.setup_details,
            created_by: request.created_by,
            created_at: now_ms(),
        };
        let event = Event::BookingCreated {
            booking: booking.clone(),
        };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        Ok(booking)
    }

    pub async fn delete_booking(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (room_id, mut guard) = self.resolve_booking_write(&id).await?;
        let event = Event::BookingDeleted { id, room_id };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        Ok(room_id)
    }

    /// Compact the WAL down to the events that recreate the current state.
    /// Waits for any in-flight writer on a room; `create_booking` holds a
    /// room's write lock across its WAL append, so contention here is
    /// routine, not an error.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();
        let shared: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        for rs in shared {
            let guard = rs.read().await;
            events.push(Event::RoomCreated {
                id: guard.id,
                name: guard.name.clone(),
                capacity: guard.capacity,
                equipment: guard.equipment.clone(),
            });
            for booking in &guard.bookings {
                events.push(Event::BookingCreated {
                    booking: booking.clone(),
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
