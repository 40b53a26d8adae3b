use tokio::sync::broadcast::{self, Sender};

/// Session lifecycle notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { username: String },
    LoggedOut,
    /// credential renewal failed; the user has to authenticate again
    Ended { reason: String },
}

const BUFFER_SIZE: usize = 50;
pub fn run() -> Sender<SessionEvent> {
    let (event_sender, _) = broadcast::channel(BUFFER_SIZE);
    event_sender
}
