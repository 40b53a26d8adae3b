/// Session module
///
/// The authenticated request pipeline: attach the credential, classify the
/// outcome, refresh once for everyone, replay once, tear down when renewal
/// is impossible.
pub mod attacher;
pub mod classifier;
pub mod client;
pub mod coordinator;
pub mod dispatcher;
pub mod pending;
pub mod teardown;

pub use client::SessionClient;
pub use coordinator::RefreshCoordinator;
pub use teardown::SessionExpiredNotifier;
