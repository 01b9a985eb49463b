//! Newline-delimited JSON protocol. One request object per line, one
//! response envelope per line: `{"success":true,"data":...}` on success,
//! `{"success":false,"error":"..."}` on failure.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::auth::{Role, Session, SessionGate};
use crate::engine::{BookingRequest, ConflictCheck, Engine, EngineError, parse_slot_range};
use crate::grid::{end_options, start_options};
use crate::limits::MAX_REQUEST_LINE_LEN;
use crate::model::Date;
use crate::observability;
use crate::site::SiteManager;

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum Request {
    Auth {
        password: String,
        site: Option<String>,
        user: Option<String>,
    },
    Logout {
        token: String,
    },
    GetBookings {
        token: String,
        date: Date,
    },
    CheckConflicts {
        token: String,
        date: Date,
        room_id: String,
        start_time: String,
        end_time: String,
    },
    CreateBooking {
        token: String,
        date: Date,
        room_id: String,
        start_time: String,
        end_time: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        setup_required: bool,
        #[serde(default)]
        setup_details: Option<String>,
    },
    TimeOptions {
        token: String,
    },
    Subscribe {
        token: String,
        room_id: String,
    },
    CreateRoom {
        token: String,
        name: String,
        #[serde(default)]
        capacity: Option<u32>,
        #[serde(default)]
        equipment: Option<String>,
    },
    UpdateRoom {
        token: String,
        room_id: String,
        name: String,
        #[serde(default)]
        capacity: Option<u32>,
        #[serde(default)]
        equipment: Option<String>,
    },
    DeleteRoom {
        token: String,
        room_id: String,
    },
    ListRooms {
        token: String,
    },
    ListBookings {
        token: String,
        #[serde(default)]
        date: Option<Date>,
        #[serde(default)]
        room_id: Option<String>,
    },
    DeleteBooking {
        token: String,
        booking_id: String,
    },
    Stats {
        token: String,
        today: Date,
    },
}

fn ok(data: Value) -> Value {
    json!({"success": true, "data": data})
}

fn err(message: impl AsRef<str>) -> Value {
    json!({"success": false, "error": message.as_ref()})
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::Member => "member",
        Role::Admin => "admin",
    }
}

fn parse_ulid(s: &str, what: &str) -> Result<Ulid, Value> {
    Ulid::from_string(s).map_err(|_| err(format!("invalid {what}")))
}

fn booking_json(info: &crate::model::BookingInfo) -> Value {
    json!({
        "id": info.id.to_string(),
        "room_id": info.room_id.to_string(),
        "room_name": info.room_name,
        "date": info.date.to_string(),
        "start_time": info.slots.start().to_string(),
        "end_time": info.slots.end().to_string(),
        "time_slot": info.slots.to_string(),
        "description": info.description,
        "setup_required": info.setup_required,
        "setup_details": info.setup_details,
        "created_by": info.created_by,
        "created_at": info.created_at,
    })
}

/// Resolve a session token to its session and site engine.
fn session_engine(
    token: &str,
    gate: &SessionGate,
    sites: &SiteManager,
) -> Result<(Session, Arc<Engine>), Value> {
    let token = parse_ulid(token, "session token")?;
    let session = gate
        .resolve(&token)
        .ok_or_else(|| err("not authenticated"))?;
    let engine = sites
        .get_or_create(&session.site)
        .map_err(|e| err(e.to_string()))?;
    Ok((session, engine))
}

fn require_admin(session: &Session) -> Result<(), Value> {
    if session.role == Role::Admin {
        Ok(())
    } else {
        Err(err("admin access required"))
    }
}

/// Serve one client connection until it closes or errors out.
pub async fn process_connection<S>(
    stream: S,
    sites: Arc<SiteManager>,
    gate: Arc<SessionGate>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_REQUEST_LINE_LEN));

    while let Some(line) = framed.next().await {
        let line = line.map_err(io::Error::other)?;
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                send(&mut framed, &err(format!("malformed request: {e}"))).await?;
                continue;
            }
        };
        let op = observability::op_label(&request);
        let start = Instant::now();

        let response = match request {
            // Subscribe turns the connection into an event stream
            Request::Subscribe { token, room_id } => {
                match subscribe_receiver(&token, &room_id, &gate, &sites) {
                    Ok((rx, room_id)) => {
                        metrics::counter!(observability::REQUESTS_TOTAL, "op" => op, "status" => "ok")
                            .increment(1);
                        send(&mut framed, &ok(json!({"subscribed": room_id.to_string()}))).await?;
                        return stream_events(&mut framed, rx).await;
                    }
                    Err(response) => response,
                }
            }
            request => dispatch(request, &gate, &sites).await,
        };
        let status = if response["success"] == Value::Bool(true) {
            "ok"
        } else {
            "error"
        };
        metrics::counter!(observability::REQUESTS_TOTAL, "op" => op, "status" => status)
            .increment(1);
        metrics::histogram!(observability::REQUEST_DURATION_SECONDS, "op" => op)
            .record(start.elapsed().as_secs_f64());
        send(&mut framed, &response).await?;
    }

    Ok(())
}

async fn send<S>(framed: &mut Framed<S, LinesCodec>, response: &Value) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    framed
        .send(response.to_string())
        .await
        .map_err(io::Error::other)
}

fn subscribe_receiver(
    token: &str,
    room_id: &str,
    gate: &SessionGate,
    sites: &SiteManager,
) -> Result<(broadcast::Receiver<crate::model::Event>, Ulid), Value> {
    let (_, engine) = session_engine(token, gate, sites)?;
    let room_id = parse_ulid(room_id, "room id")?;
    if engine.get_room(&room_id).is_none() {
        return Err(err("room not found"));
    }
    Ok((engine.notify.subscribe(room_id), room_id))
}

/// Forward room events to the client until either side disconnects.
async fn stream_events<S>(
    framed: &mut Framed<S, LinesCodec>,
    mut rx: broadcast::Receiver<crate::model::Event>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    let line = serde_json::to_value(&event).map_err(io::Error::other)?;
                    send(framed, &json!({"event": line})).await?;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("subscriber lagged, {n} events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
            line = framed.next() => match line {
                // Input while streaming is ignored; EOF ends the stream
                Some(Ok(_)) => debug!("ignoring request on subscribed connection"),
                Some(Err(e)) => return Err(io::Error::other(e)),
                None => return Ok(()),
            },
        }
    }
}

fn engine_error_response(e: EngineError) -> Value {
    err(e.to_string())
}

async fn dispatch(request: Request, gate: &SessionGate, sites: &SiteManager) -> Value {
    match request {
        Request::Auth {
            password,
            site,
            user,
        } => {
            let site = site.unwrap_or_else(|| "default".into());
            match gate.login(&password, &site, user) {
                Ok((token, role)) => {
                    // Fail the login if the site's engine can't come up
                    if let Err(e) = sites.get_or_create(&site) {
                        gate.logout(&token);
                        return err(e.to_string());
                    }
                    ok(json!({"token": token.to_string(), "role": role_label(role)}))
                }
                Err(reason) => {
                    metrics::counter!(observability::AUTH_FAILURES_TOTAL).increment(1);
                    err(reason)
                }
            }
        }

        Request::Logout { token } => {
            let Ok(token) = Ulid::from_string(&token) else {
                return err("invalid session token");
            };
            if gate.logout(&token) {
                ok(json!({"message": "logged out"}))
            } else {
                err("not authenticated")
            }
        }

        Request::GetBookings { token, date } => {
            let (_, engine) = match session_engine(&token, gate, sites) {
                Ok(v) => v,
                Err(response) => return response,
            };
            let bookings: Vec<Value> = engine
                .bookings_for_date(date)
                .await
                .iter()
                .map(booking_json)
                .collect();
            ok(Value::Array(bookings))
        }

        Request::CheckConflicts {
            token,
            date,
            room_id,
            start_time,
            end_time,
        } => {
            let (_, engine) = match session_engine(&token, gate, sites) {
                Ok(v) => v,
                Err(response) => return response,
            };
            let room_id = match parse_ulid(&room_id, "room id") {
                Ok(id) => id,
                Err(response) => return response,
            };
            // Invalid intervals are an error, never "no conflict"
            let slots = match parse_slot_range(&start_time, &end_time) {
                Ok(s) => s,
                Err(e) => return engine_error_response(e),
            };
            match engine.check_conflict(room_id, date, slots).await {
                ConflictCheck::NoConflict => {
                    ok(json!({"hasConflict": false, "conflictDetails": null}))
                }
                ConflictCheck::Conflict { slots, .. } => ok(json!({
                    "hasConflict": true,
                    "conflictDetails": format!("Room already booked from {slots}"),
                })),
            }
        }

        Request::CreateBooking {
            token,
            date,
            room_id,
            start_time,
            end_time,
            description,
            setup_required,
            setup_details,
        } => {
            let (session, engine) = match session_engine(&token, gate, sites) {
                Ok(v) => v,
                Err(response) => return response,
            };
            let room_id = match parse_ulid(&room_id, "room id") {
                Ok(id) => id,
                Err(response) => return response,
            };
            let slots = match parse_slot_range(&start_time, &end_time) {
                Ok(s) => s,
                Err(e) => return engine_error_response(e),
            };
            let booking_request = BookingRequest {
                description,
                setup_required,
                setup_details,
                created_by: session.user,
            };
            match engine
                .create_booking(Ulid::new(), room_id, date, slots, booking_request)
                .await
            {
                Ok(booking) => ok(json!({
                    "id": booking.id.to_string(),
                    "message": "Booking created successfully",
                })),
                Err(e) => engine_error_response(e),
            }
        }

        Request::TimeOptions { token } => {
            if let Err(response) = session_engine(&token, gate, sites) {
                return response;
            }
            let opts = |pairs: Vec<(String, String)>| -> Vec<Value> {
                pairs
                    .into_iter()
                    .map(|(value, label)| json!({"value": value, "label": label}))
                    .collect()
            };
            ok(json!({
                "start_times": opts(start_options()),
                "end_times": opts(end_options()),
            }))
        }

        // Handled in process_connection; kept for exhaustiveness
        Request::Subscribe { .. } => err("subscribe requires a dedicated connection"),

        Request::CreateRoom {
            token,
            name,
            capacity,
            equipment,
        } => {
            let (session, engine) = match session_engine(&token, gate, sites) {
                Ok(v) => v,
                Err(response) => return response,
            };
            if let Err(response) = require_admin(&session) {
                return response;
            }
            let id = Ulid::new();
            match engine.create_room(id, name, capacity, equipment).await {
                Ok(()) => ok(json!({"id": id.to_string()})),
                Err(e) => engine_error_response(e),
            }
        }

        Request::UpdateRoom {
            token,
            room_id,
            name,
            capacity,
            equipment,
        } => {
            let (session, engine) = match session_engine(&token, gate, sites) {
                Ok(v) => v,
                Err(response) => return response,
            };
            if let Err(response) = require_admin(&session) {
                return response;
            }
            let room_id = match parse_ulid(&room_id, "room id") {
                Ok(id) => id,
                Err(response) => return response,
            };
            match engine.update_room(room_id, name, capacity, equipment).await {
                Ok(()) => ok(json!({"message": "Room updated"})),
                Err(e) => engine_error_response(e),
            }
        }

        Request::DeleteRoom { token, room_id } => {
            let (session, engine) = match session_engine(&token, gate, sites) {
                Ok(v) => v,
                Err(response) => return response,
            };
            if let Err(response) = require_admin(&session) {
                return response;
            }
            let room_id = match parse_ulid(&room_id, "room id") {
                Ok(id) => id,
                Err(response) => return response,
            };
            match engine.delete_room(room_id).await {
                Ok(()) => ok(json!({"message": "Room and its bookings deleted"})),
                Err(e) => engine_error_response(e),
            }
        }

        Request::ListRooms { token } => {
            let (_, engine) = match session_engine(&token, gate, sites) {
                Ok(v) => v,
                Err(response) => return response,
            };
            let rooms: Vec<Value> = engine
                .list_rooms()
                .await
                .iter()
                .map(|r| {
                    json!({
                        "id": r.id.to_string(),
                        "name": r.name,
                        "capacity": r.capacity,
                        "equipment": r.equipment,
                        "booking_count": r.booking_count,
                    })
                })
                .collect();
            ok(Value::Array(rooms))
        }

        Request::ListBookings {
            token,
            date,
            room_id,
        } => {
            let (session, engine) = match session_engine(&token, gate, sites) {
                Ok(v) => v,
                Err(response) => return response,
            };
            if let Err(response) = require_admin(&session) {
                return response;
            }
            let room_filter = match room_id {
                Some(s) => match parse_ulid(&s, "room id") {
                    Ok(id) => Some(id),
                    Err(response) => return response,
                },
                None => None,
            };
            let bookings: Vec<Value> = engine
                .list_bookings(date, room_filter)
                .await
                .iter()
                .map(booking_json)
                .collect();
            ok(Value::Array(bookings))
        }

        Request::DeleteBooking { token, booking_id } => {
            let (session, engine) = match session_engine(&token, gate, sites) {
                Ok(v) => v,
                Err(response) => return response,
            };
            if let Err(response) = require_admin(&session) {
                return response;
            }
            let booking_id = match parse_ulid(&booking_id, "booking id") {
                Ok(id) => id,
                Err(response) => return response,
            };
            match engine.delete_booking(booking_id).await {
                Ok(_) => ok(json!({"message": "Booking deleted"})),
                Err(e) => engine_error_response(e),
            }
        }

        Request::Stats { token, today } => {
            let (session, engine) = match session_engine(&token, gate, sites) {
                Ok(v) => v,
                Err(response) => return response,
            };
            if let Err(response) = require_admin(&session) {
                return response;
            }
            let stats = engine.stats(today).await;
            ok(json!({
                "total_rooms": stats.total_rooms,
                "total_bookings": stats.total_bookings,
                "bookings_today": stats.bookings_today,
            }))
        }
    }
}
