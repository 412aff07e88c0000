/// Lifecycle of a token session
///
/// `Opened -> Authenticated` via login, back to `Opened` via logout, and any
/// state to `Closed`. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Opened,
    Authenticated,
    Closed,
}

impl SessionState {
    pub fn is_open(self) -> bool {
        !matches!(self, SessionState::Closed)
    }

    pub fn is_authenticated(self) -> bool {
        matches!(self, SessionState::Authenticated)
    }
}
