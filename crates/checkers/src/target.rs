use warden_core::{ServiceId, TeamId};

/// Identifies which (team, service) a checker instance is probing, and
/// where to reach it.
#[derive(Debug, Clone)]
pub struct CheckerTarget {
    pub team: TeamId,
    pub service: ServiceId,
    pub host: String,
    pub port: u16,
}

impl CheckerTarget {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
