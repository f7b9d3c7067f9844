use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use warden_core::CheckStatus;

use crate::checker::Checker;
use crate::demo_tcp::DemoTcpChecker;
use crate::target::CheckerTarget;

type Factory = fn(&CheckerTarget) -> Box<dyn Checker>;

/// Maps a checker name (as named in configuration) to a constructor.
///
/// Populated with the built-in demo checker at construction; callers
/// embedding the engine as a library can register their own factories
/// with [`CheckerRegistry::register`] before startup finishes resolving
/// services.
pub struct CheckerRegistry {
    factories: HashMap<&'static str, Factory>,
}

impl CheckerRegistry {
    pub fn new() -> Self {
        let mut factories: HashMap<&'static str, Factory> = HashMap::new();
        factories.insert("demo-tcp", |target| {
            Box::new(DemoTcpChecker::new(target.clone()))
        });
        Self { factories }
    }

    pub fn register(&mut self, name: &'static str, factory: Factory) {
        self.factories.insert(name, factory);
    }

    /// Instantiate the named checker for a (team, service) target.
    pub fn build(&self, name: &str, target: &CheckerTarget) -> Option<Box<dyn Checker>> {
        self.factories.get(name).map(|factory| factory(target))
    }
}

impl Default for CheckerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a checker call, converting a panic into [`CheckStatus::Error`]
/// instead of letting it take down the round scheduler's worker thread.
pub fn call_guarded(f: impl FnOnce() -> CheckStatus) -> CheckStatus {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(status) => status,
        Err(_) => {
            tracing::warn!("checker panicked; recording as error");
            CheckStatus::Error
        }
    }
}
