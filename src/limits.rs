//! Hard limits. Everything a client can grow unboundedly gets a cap.

/// Maximum number of sites (calendars) a single server will load.
pub const MAX_SITES: usize = 1024;

/// Maximum length of a site name before sanitization.
pub const MAX_SITE_NAME_LEN: usize = 256;

/// Maximum number of rooms per site.
pub const MAX_ROOMS_PER_SITE: usize = 4096;

/// Maximum number of bookings held by a single room.
pub const MAX_BOOKINGS_PER_ROOM: usize = 100_000;

/// Maximum length of a room name.
pub const MAX_ROOM_NAME_LEN: usize = 256;

/// Maximum length of a booking description or setup-details field.
pub const MAX_TEXT_LEN: usize = 4096;

/// Maximum number of live session tokens.
pub const MAX_SESSIONS: usize = 65_536;

/// Maximum accepted request line length in bytes.
pub const MAX_REQUEST_LINE_LEN: usize = 64 * 1024;
