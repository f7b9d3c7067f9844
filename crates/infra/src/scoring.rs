//! The one scoring function, shared between the live Event Dispatcher and
//! `resume_points` replay so the two paths can never drift apart (the
//! score replay law depends on this).

use warden_core::{CheckStatus, PointsKind, ServiceId};

use crate::model::TeamState;

/// `(target, kind, increment)` triples a check or attack event resolves to.
/// A check contributes to one team's `sla_pts`; an attack contributes to
/// both the attacker's `atk_pts` and the victim's `def_pts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointsDelta {
    pub service_id: ServiceId,
    pub kind: PointsKind,
    pub increment: i64,
}

/// Maps a check outcome to its `sla_pts` delta. `None` means the status
/// contributes nothing (ERROR, or anything not in the known set).
pub fn points_delta_for_check(service_id: ServiceId, status: CheckStatus) -> Option<PointsDelta> {
    let increment = status.sla_delta();
    if increment == 0 {
        return None;
    }
    Some(PointsDelta {
        service_id,
        kind: PointsKind::Sla,
        increment,
    })
}

/// An accepted attack always yields exactly two deltas: +1 `atk_pts` for
/// the attacker, -1 `def_pts` for the victim.
pub fn points_deltas_for_attack(service_id: ServiceId) -> [PointsDelta; 2] {
    [
        PointsDelta {
            service_id,
            kind: PointsKind::Atk,
            increment: 1,
        },
        PointsDelta {
            service_id,
            kind: PointsKind::Def,
            increment: -1,
        },
    ]
}

/// Recompute a team's point records and `last_pts_update` purely from its
/// append-only history: stolen flags, lost flags, and checks. Used both at
/// startup (`resume_points`) and by tests asserting the replay law.
///
/// `service_of_flag` resolves a flag's owning service (stolen/lost records
/// only carry `flag_data`; the service lives on the `Flag` row). A flag
/// that can no longer be resolved (e.g. purged) is skipped and logged by
/// the caller — it contributes nothing rather than panicking.
pub fn recompute_team_state(state: &mut TeamState, service_of_flag: impl Fn(&str) -> Option<ServiceId>) {
    for record in &mut state.points {
        record.atk_pts = 0;
        record.def_pts = 0;
        record.sla_pts = 0;
    }
    state.last_pts_update = chrono::DateTime::<chrono::Utc>::UNIX_EPOCH;

    let stolen = state.stolen_flags.clone();
    let lost = state.lost_flags.clone();
    let checks = state.checks.clone();

    for record in &stolen {
        state.last_pts_update = state.last_pts_update.max(record.timestamp);
        if let Some(service_id) = service_of_flag(&record.flag_data) {
            if let Some(pr) = state.points.iter_mut().find(|p| p.service_id == service_id) {
                pr.apply(warden_core::PointsKind::Atk, 1);
            }
        }
    }
    for record in &lost {
        state.last_pts_update = state.last_pts_update.max(record.timestamp);
        if let Some(service_id) = service_of_flag(&record.flag_data) {
            if let Some(pr) = state.points.iter_mut().find(|p| p.service_id == service_id) {
                pr.apply(warden_core::PointsKind::Def, -1);
            }
        }
    }
    for check in &checks {
        state.last_pts_update = state.last_pts_update.max(check.timestamp);
        if let Some(delta) = points_delta_for_check(check.service_id, check.status) {
            if let Some(pr) = state.points.iter_mut().find(|p| p.service_id == delta.service_id) {
                pr.apply(delta.kind, delta.increment);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_check_is_plus_one_sla() {
        let delta = points_delta_for_check(ServiceId::new(0), CheckStatus::Ok).unwrap();
        assert_eq!(delta.increment, 1);
        assert_eq!(delta.kind, PointsKind::Sla);
    }

    #[test]
    fn down_check_is_minus_one_sla() {
        let delta = points_delta_for_check(ServiceId::new(0), CheckStatus::Down).unwrap();
        assert_eq!(delta.increment, -1);
    }

    #[test]
    fn error_check_contributes_nothing() {
        assert!(points_delta_for_check(ServiceId::new(0), CheckStatus::Error).is_none());
    }

    #[test]
    fn attack_yields_symmetric_deltas() {
        let [atk, def] = points_deltas_for_attack(ServiceId::new(1));
        assert_eq!(atk.kind, PointsKind::Atk);
        assert_eq!(atk.increment, 1);
        assert_eq!(def.kind, PointsKind::Def);
        assert_eq!(def.increment, -1);
    }
}
