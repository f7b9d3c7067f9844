use warden_core::CheckStatus;

/// A probe against a single service on a single team's host.
///
/// One instance is built per (team, service) pair, so an implementation is
/// free to keep connection state between calls. The scheduler never trusts
/// a checker: any panic is caught at the call site and reported as
/// [`CheckStatus::Error`].
pub trait Checker: Send {
    /// Liveness probe: is the service up and basically responsive?
    fn check(&mut self) -> CheckStatus;

    /// Plant a flag on the service so it can be retrieved later.
    fn put(&mut self, flag_data: &str, seed: &str) -> CheckStatus;

    /// Retrieve a previously planted flag and verify it round-trips.
    fn get(&mut self, flag_data: &str, seed: &str) -> CheckStatus;
}
