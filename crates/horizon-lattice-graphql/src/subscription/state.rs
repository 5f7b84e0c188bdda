//! Connection state of a subscription client.

use crate::error::NetworkError;

/// Current state of a subscription connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Dialing and sending `connection_init`.
    #[default]
    Connecting,
    /// `connection_ack` received; the dispatch loop is being started.
    Acknowledged,
    /// Dispatch loop running; subscriptions may be started.
    Running,
    /// `close()` sent `connection_terminate` and is waiting for the loop.
    Terminating,
    /// Connection is gone. Terminal.
    Closed,
}

impl ConnectionState {
    /// Whether new subscriptions can be started.
    pub fn is_running(self) -> bool {
        self == Self::Running
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Acknowledged => write!(f, "Acknowledged"),
            Self::Running => write!(f, "Running"),
            Self::Terminating => write!(f, "Terminating"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// State plus the fatal error (if any) reported by the dispatch loop.
#[derive(Debug, Default)]
pub(crate) struct ConnectionStatus {
    state: ConnectionState,
    error: Option<NetworkError>,
}

impl ConnectionStatus {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn error(&self) -> Option<&NetworkError> {
        self.error.as_ref()
    }

    /// Move to `next`. Nothing leaves `Closed`; returns whether the state changed.
    pub fn advance(&mut self, next: ConnectionState) -> bool {
        if self.state == ConnectionState::Closed || self.state == next {
            return false;
        }
        self.state = next;
        true
    }

    /// Record a fatal transport failure and close.
    pub fn fail(&mut self, error: NetworkError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self.state = ConnectionState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_connecting() {
        let status = ConnectionStatus::default();
        assert_eq!(status.state(), ConnectionState::Connecting);
        assert!(status.error().is_none());
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut status = ConnectionStatus::default();
        assert!(status.advance(ConnectionState::Acknowledged));
        assert!(status.advance(ConnectionState::Running));
        assert!(status.advance(ConnectionState::Closed));
        assert!(!status.advance(ConnectionState::Running));
        assert_eq!(status.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_fail_keeps_first_error() {
        let mut status = ConnectionStatus::default();
        status.advance(ConnectionState::Running);
        status.fail(NetworkError::Transport("reset".into()));
        status.fail(NetworkError::Transport("later".into()));

        assert_eq!(status.state(), ConnectionState::Closed);
        assert!(matches!(status.error(), Some(NetworkError::Transport(m)) if m == "reset"));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Running.to_string(), "Running");
        assert_eq!(ConnectionState::Terminating.to_string(), "Terminating");
        assert!(ConnectionState::Running.is_running());
        assert!(!ConnectionState::Closed.is_running());
    }
}
