use std::time::{Duration, Instant};

use dashmap::DashMap;
use ulid::Ulid;

use crate::limits::MAX_SESSIONS;

/// Idle cap on a session token's lifetime. Without it, abandoned tokens
/// accumulate until the session table hits `MAX_SESSIONS` and locks out
/// all further logins.
const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Member,
    Admin,
}

/// What a session token resolves to: which site's calendar the
/// connection is bound to and what it may do there.
#[derive(Debug, Clone)]
pub struct Session {
    pub site: String,
    pub role: Role,
    pub user: Option<String>,
}

struct SessionEntry {
    session: Session,
    expires_at: Instant,
}

/// Password check plus session token issue/resolve/revoke. Tokens are
/// ULIDs handed back at login and carried on every later request, so
/// authentication never leans on connection-level state.
pub struct SessionGate {
    password: String,
    admin_password: Option<String>,
    sessions: DashMap<Ulid, SessionEntry>,
    ttl: Duration,
}

impl SessionGate {
    pub fn new(password: String, admin_password: Option<String>) -> Self {
        Self::with_ttl(password, admin_password, SESSION_TTL)
    }

    pub fn with_ttl(password: String, admin_password: Option<String>, ttl: Duration) -> Self {
        Self {
            password,
            admin_password,
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Validate a password and mint a session token. The admin password,
    /// when configured, grants `Role::Admin`; the shared password grants
    /// `Role::Member`.
    pub fn login(
        &self,
        password: &str,
        site: &str,
        user: Option<String>,
    ) -> Result<(Ulid, Role), &'static str> {
        let role = if self.admin_password.as_deref() == Some(password) {
            Role::Admin
        } else if password == self.password {
            Role::Member
        } else {
            return Err("invalid password");
        };
        if self.sessions.len() >= MAX_SESSIONS {
            self.sweep_expired();
            if self.sessions.len() >= MAX_SESSIONS {
                return Err("too many active sessions");
            }
        }

        let token = Ulid::new();
        self.sessions.insert(
            token,
            SessionEntry {
                session: Session {
                    site: site.to_owned(),
                    role,
                    user,
                },
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok((token, role))
    }

    pub fn resolve(&self, token: &Ulid) -> Option<Session> {
        let entry = self.sessions.get(token)?;
        if entry.expires_at <= Instant::now() {
            drop(entry);
            self.sessions.remove(token);
            return None;
        }
        Some(entry.session.clone())
    }

    pub fn logout(&self, token: &Ulid) -> bool {
        self.sessions.remove(token).is_some()
    }

    fn sweep_expired(&self) {
        let now = Instant::now();
        self.sessions.retain(|_, entry| entry.expires_at > now);
    }
}
