//! Session seam between the stress workers and the database client

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// Backend identity of one database session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionIdentity {
    /// Backend process id
    pub pid: i32,
    pub backend_start: Option<DateTime<Utc>>,
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.backend_start {
            Some(start) => write!(f, "pid={} started={}", self.pid, start.to_rfc3339()),
            None => write!(f, "pid={}", self.pid),
        }
    }
}

/// Opens fresh sessions for stress workers
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn open(&self) -> Result<Box<dyn ProbeSession>>;
}

/// An open session a worker can probe and close
#[async_trait]
pub trait ProbeSession: Send {
    /// Identity of the backend serving this session; `None` when the
    /// server returned no row
    async fn identity(&mut self) -> Result<Option<SessionIdentity>>;

    async fn close(self: Box<Self>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_identity_display() {
        let bare = SessionIdentity {
            pid: 4242,
            backend_start: None,
        };
        assert_eq!(bare.to_string(), "pid=4242");

        let started = SessionIdentity {
            pid: 7,
            backend_start: Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
        };
        assert_eq!(started.to_string(), "pid=7 started=2024-01-02T03:04:05+00:00");
    }
}
