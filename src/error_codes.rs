//! Login-check failure codes returned by the lobby server.
//!
//! The server answers `GET /check-login` with a plain HTTP status. Besides the
//! usual 4xx codes it uses two custom ones (488, 489). [`LoginError`] gives
//! every outcome a name and a message suitable for the login screen.

use std::fmt;

/// Reasons the server can refuse a `(name, lobby)` login check.
///
/// Use [`description()`](LoginError::description) for the text shown to the
/// player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginError {
    /// The request was missing the name or lobby parameter (400).
    BadRequest,
    /// No lobby exists with the given code (404).
    LobbyNotFound,
    /// Another player in the lobby already uses this name (403).
    DuplicateName,
    /// The lobby has already started a game (488).
    GameInProgress,
    /// The lobby has no free seats (489).
    LobbyFull,
    /// Any other non-success status.
    Unexpected(u16),
}

impl LoginError {
    /// Map a check-login HTTP status to a login outcome.
    ///
    /// Returns `None` for success statuses (2xx).
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            400 => Some(Self::BadRequest),
            403 => Some(Self::DuplicateName),
            404 => Some(Self::LobbyNotFound),
            488 => Some(Self::GameInProgress),
            489 => Some(Self::LobbyFull),
            other => Some(Self::Unexpected(other)),
        }
    }

    /// The HTTP status this outcome corresponds to.
    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::DuplicateName => 403,
            Self::LobbyNotFound => 404,
            Self::GameInProgress => 488,
            Self::LobbyFull => 489,
            Self::Unexpected(status) => *status,
        }
    }

    /// Returns a human-readable description of this outcome.
    pub fn description(&self) -> &'static str {
        match self {
            Self::BadRequest => "The login request was missing a name or lobby code.",
            Self::LobbyNotFound => "The lobby could not be found.",
            Self::DuplicateName => "There is already a user with that name in the lobby.",
            Self::GameInProgress => "The lobby is currently in a game.",
            Self::LobbyFull => "The lobby is currently full.",
            Self::Unexpected(_) => {
                "There was an error connecting to the server. Please try again."
            }
        }
    }
}

impl fmt::Display for LoginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn success_statuses_are_not_errors() {
        assert_eq!(LoginError::from_status(200), None);
        assert_eq!(LoginError::from_status(204), None);
    }

    #[test]
    fn custom_statuses_map_to_named_outcomes() {
        assert_eq!(
            LoginError::from_status(488),
            Some(LoginError::GameInProgress)
        );
        assert_eq!(LoginError::from_status(489), Some(LoginError::LobbyFull));
        assert_eq!(
            LoginError::from_status(403),
            Some(LoginError::DuplicateName)
        );
        assert_eq!(
            LoginError::from_status(404),
            Some(LoginError::LobbyNotFound)
        );
    }

    #[test]
    fn status_survives_the_mapping() {
        for status in [400, 403, 404, 488, 489, 500, 502] {
            let err = LoginError::from_status(status).unwrap();
            assert_eq!(err.status(), status);
            assert!(!err.description().is_empty());
        }
    }

    #[test]
    fn display_uses_description() {
        assert_eq!(
            LoginError::LobbyFull.to_string(),
            "The lobby is currently full."
        );
    }
}
