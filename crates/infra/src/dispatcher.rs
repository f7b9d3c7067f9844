//! The Event Dispatcher: one long-running worker that periodically drains
//! the event queue and turns each event into a point update.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use warden_events::{EventBus, GameEvent};

use crate::gateway::PersistenceGateway;
use crate::scoring;

pub struct DispatcherHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl DispatcherHandle {
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

pub fn start<G, B>(gateway: Arc<G>, bus: Arc<B>, dispatch_frequency: Duration) -> DispatcherHandle
where
    G: PersistenceGateway + 'static,
    B: EventBus<GameEvent> + 'static,
{
    let Some(subscription) = bus.subscribe() else {
        panic!("event bus already has a subscriber; the dispatcher must be the only consumer");
    };

    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = stop.clone();

    let join = thread::Builder::new()
        .name("event-dispatcher".to_string())
        .spawn(move || dispatch_loop(gateway, subscription, stop_clone, dispatch_frequency))
        .expect("failed to spawn event dispatcher thread");

    DispatcherHandle {
        stop,
        join: Some(join),
    }
}

fn dispatch_loop<G>(
    gateway: Arc<G>,
    subscription: warden_events::Subscription<GameEvent>,
    stop: Arc<AtomicBool>,
    dispatch_frequency: Duration,
) where
    G: PersistenceGateway + 'static,
{
    while !stop.load(Ordering::SeqCst) {
        thread::sleep(dispatch_frequency);

        let mut batch = Vec::new();
        while let Ok(event) = subscription.try_recv() {
            batch.push(event);
        }
        if batch.is_empty() {
            continue;
        }
        debug!(count = batch.len(), "dispatching batch");

        let mut handles = Vec::with_capacity(batch.len());
        for event in batch {
            let gateway = gateway.clone();
            handles.push(thread::spawn(move || apply_event(&gateway, event)));
        }
        for handle in handles {
            let _ = handle.join();
        }
    }
}

/// The single point where an event becomes a set of point updates — shared
/// in spirit with `scoring::recompute_team_state`, which replays the same
/// mapping rules from history instead of from the live queue.
pub fn apply_event<G: PersistenceGateway>(gateway: &G, event: GameEvent) {
    match event {
        GameEvent::Check {
            team,
            service,
            status,
            timestamp,
        } => {
            let Some(delta) = scoring::points_delta_for_check(service, status) else {
                debug!(%status, "check status contributes no points, ignoring");
                return;
            };
            if let Err(e) = gateway.update_points(team, service, delta.kind, delta.increment, timestamp) {
                warn!(error = %e, "failed to apply check event");
            }
        }
        GameEvent::Attack {
            attacker,
            service,
            victim,
            timestamp,
        } => {
            let [atk_delta, def_delta] = scoring::points_deltas_for_attack(service);

            if let Err(e) =
                gateway.update_points(attacker, service, atk_delta.kind, atk_delta.increment, timestamp)
            {
                warn!(error = %e, "failed to apply attack event (attacker side)");
            }
            if let Err(e) = gateway.update_points(victim, service, def_delta.kind, def_delta.increment, timestamp)
            {
                warn!(error = %e, "failed to apply attack event (victim side)");
            }
        }
    }
}
