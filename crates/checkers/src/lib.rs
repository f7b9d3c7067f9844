//! The checker plugin interface: a small `{check, put, get}` contract,
//! a registry resolving implementations by name, and one demonstration
//! checker.

pub mod checker;
pub mod demo_tcp;
pub mod registry;
pub mod target;

pub use checker::Checker;
pub use demo_tcp::DemoTcpChecker;
pub use registry::{call_guarded, CheckerRegistry};
pub use target::CheckerTarget;

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{ServiceId, TeamId};

    #[test]
    fn registry_resolves_demo_checker() {
        let registry = CheckerRegistry::new();
        let target = CheckerTarget {
            team: TeamId::new(0),
            service: ServiceId::new(0),
            host: "127.0.0.1".to_string(),
            port: 9,
        };

        assert!(registry.build("demo-tcp", &target).is_some());
        assert!(registry.build("nonexistent", &target).is_none());
    }

    #[test]
    fn call_guarded_converts_panic_to_error() {
        let status = call_guarded(|| panic!("boom"));
        assert_eq!(status, warden_core::CheckStatus::Error);
    }
}
