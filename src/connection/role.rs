//! Which halves of the harness a process runs.

use std::str::FromStr;

use crate::error::Error;

/// Run role.
///
/// A single process can host both the echo server and the clients, or the
/// two halves can be split across hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    /// Echo server and clients in one process.
    #[default]
    Both,
    /// Echo server only, until interrupted.
    Server,
    /// Clients only, against an external echo server.
    Client,
}

impl Role {
    /// Check if this role hosts the echo server.
    #[inline]
    #[must_use]
    pub const fn runs_server(&self) -> bool {
        matches!(self, Role::Both | Role::Server)
    }

    /// Check if this role drives client connections.
    #[inline]
    #[must_use]
    pub const fn runs_clients(&self) -> bool {
        matches!(self, Role::Both | Role::Client)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Both => "both",
            Role::Server => "server",
            Role::Client => "client",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "both" => Ok(Role::Both),
            "server" => Ok(Role::Server),
            "client" => Ok(Role::Client),
            other => Err(Error::InvalidConfig(format!("unknown role '{other}'"))),
        }
    }
}
