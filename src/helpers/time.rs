use tokio::time::Instant;

pub fn get_instant() -> Instant {
    Instant::now()
}
