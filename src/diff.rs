//! Snapshot comparison.
//!
//! [`diff`] compares the previously rendered [`Snapshot`] with a newly
//! received one and reports what happened in between as an ordered list of
//! [`SemanticEvent`]s. It is a pure function; the order of its output is fixed
//! and is the order in which the events are presented:
//!
//! 1. [`CountersSynced`](SemanticEvent::CountersSynced) when leaving setup
//! 2. [`TrackerAdvanced`](SemanticEvent::TrackerAdvanced)
//! 3. [`PolicyEnacted`](SemanticEvent::PolicyEnacted)
//! 4. [`BoardUpdated`](SemanticEvent::BoardUpdated)
//! 5. [`PhaseChanged`](SemanticEvent::PhaseChanged), then
//!    [`VictoryReached`](SemanticEvent::VictoryReached) for a final phase
//! 6. [`DecksUpdated`](SemanticEvent::DecksUpdated), always last
//!
//! Steps 2–4 only run when the new phase is reveal-bearing (see
//! [`Phase::is_reveal_bearing`]).

use tracing::trace;

use crate::error::Result;
use crate::protocol::{Phase, PolicyType, Snapshot, VictoryKind, TRACKER_MAX};

/// Something that happened between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticEvent {
    /// The previous snapshot was the pre-game state: copy the counters over
    /// without animating anything.
    CountersSynced {
        liberal: u8,
        fascist: u8,
        tracker: u8,
        draw: u32,
        discard: u32,
    },
    /// The election tracker moved to `position`.
    ///
    /// When the tracker hit its maximum and wrapped, the snapshot shows 0 but
    /// `position` is 3 and `wrapped_to_three` is set.
    TrackerAdvanced {
        position: u8,
        wrapped_to_three: bool,
        /// The previous snapshot was mid-vote, so the vote failed.
        after_vote: bool,
    },
    PolicyEnacted(PolicyType),
    /// Board counters differ from the previous snapshot.
    BoardUpdated { liberal: u8, fascist: u8, tracker: u8 },
    PhaseChanged {
        from: Phase,
        to: Phase,
        /// The new snapshot's `lastState`, which tells a post-legislative
        /// phase which power preceded it.
        last_phase: Phase,
    },
    VictoryReached(VictoryKind),
    /// Draw and discard pile sizes. Emitted on every diff.
    DecksUpdated { draw: u32, discard: u32 },
}

impl SemanticEvent {
    /// Events that are presented as something happening, as opposed to a
    /// display sync.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TrackerAdvanced { .. }
                | Self::PolicyEnacted(_)
                | Self::PhaseChanged { .. }
                | Self::VictoryReached(_)
        )
    }
}

/// Compare two snapshots.
///
/// # Errors
///
/// Returns an error if `next` fails [`Snapshot::validate`]; `prev` is assumed
/// to have been validated when it was received.
pub fn diff(prev: &Snapshot, next: &Snapshot) -> Result<Vec<SemanticEvent>> {
    next.validate()?;

    let mut events = Vec::new();

    if prev.phase == Phase::Setup {
        events.push(SemanticEvent::CountersSynced {
            liberal: next.liberal_policies,
            fascist: next.fascist_policies,
            tracker: next.election_tracker,
            draw: next.draw_size,
            discard: next.discard_size,
        });
    }

    if next.phase.is_reveal_bearing() {
        if let Some(event) = tracker_movement(prev, next) {
            events.push(event);
        }
        if let Some(policy) = enacted_policy(prev, next) {
            events.push(SemanticEvent::PolicyEnacted(policy));
        }
        if board_changed(prev, next) {
            events.push(SemanticEvent::BoardUpdated {
                liberal: next.liberal_policies,
                fascist: next.fascist_policies,
                tracker: next.election_tracker,
            });
        }
    }

    if prev.phase != next.phase {
        events.push(SemanticEvent::PhaseChanged {
            from: prev.phase,
            to: next.phase,
            last_phase: next.last_phase,
        });
        if let Some(kind) = next.phase.victory() {
            events.push(SemanticEvent::VictoryReached(kind));
        }
    }

    events.push(SemanticEvent::DecksUpdated {
        draw: next.draw_size,
        discard: next.discard_size,
    });

    trace!(from = ?prev.phase, to = ?next.phase, count = events.len(), "snapshot diffed");
    Ok(events)
}

/// Plain resets to zero (a government was elected) are not reported; a reset
/// caused by the tracker wrapping is, as a move to 3.
fn tracker_movement(prev: &Snapshot, next: &Snapshot) -> Option<SemanticEvent> {
    if next.election_tracker == prev.election_tracker {
        return None;
    }
    let wrapped = next.election_tracker == 0 && next.election_tracker_advanced;
    if next.election_tracker == 0 && !wrapped {
        return None;
    }
    Some(SemanticEvent::TrackerAdvanced {
        position: if wrapped {
            TRACKER_MAX
        } else {
            next.election_tracker
        },
        wrapped_to_three: wrapped,
        after_vote: prev.phase == Phase::ChancellorVoting,
    })
}

/// At most one policy is enacted per update. Liberal is checked first.
fn enacted_policy(prev: &Snapshot, next: &Snapshot) -> Option<PolicyType> {
    if next.liberal_policies > prev.liberal_policies {
        Some(PolicyType::Liberal)
    } else if next.fascist_policies > prev.fascist_policies {
        Some(PolicyType::Fascist)
    } else {
        None
    }
}

fn board_changed(prev: &Snapshot, next: &Snapshot) -> bool {
    prev.liberal_policies != next.liberal_policies
        || prev.fascist_policies != next.fascist_policies
        || prev.election_tracker != next.election_tracker
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::protocol::PlayerState;

    fn in_phase(phase: Phase) -> Snapshot {
        let mut snapshot = Snapshot {
            phase,
            player_order: vec!["ann".into(), "bob".into(), "cat".into()],
            president: Some("ann".into()),
            ..Snapshot::default()
        };
        for name in ["ann", "bob", "cat"] {
            snapshot
                .players
                .insert(name.into(), PlayerState::default());
        }
        snapshot
    }

    fn transient(events: &[SemanticEvent]) -> Vec<SemanticEvent> {
        events.iter().filter(|e| e.is_transient()).cloned().collect()
    }

    #[test]
    fn deck_only_change_yields_one_trailing_update() {
        let prev = in_phase(Phase::PostLegislative);
        let next = Snapshot {
            draw_size: 12,
            discard_size: 3,
            ..prev.clone()
        };
        let events = diff(&prev, &next).unwrap();
        assert_eq!(
            events,
            vec![SemanticEvent::DecksUpdated {
                draw: 12,
                discard: 3
            }]
        );
    }

    #[test]
    fn plain_reset_to_zero_is_not_reported() {
        let prev = Snapshot {
            election_tracker: 2,
            ..in_phase(Phase::LegislativeChancellor)
        };
        let next = Snapshot {
            election_tracker: 0,
            liberal_policies: 1,
            ..in_phase(Phase::PostLegislative)
        };
        let events = diff(&prev, &next).unwrap();
        assert!(!events
            .iter()
            .any(|e| matches!(e, SemanticEvent::TrackerAdvanced { .. })));
        assert!(events.contains(&SemanticEvent::PolicyEnacted(PolicyType::Liberal)));
    }

    #[test]
    fn wrap_and_forced_policy_report_tracker_first() {
        let prev = Snapshot {
            election_tracker: 2,
            fascist_policies: 1,
            ..in_phase(Phase::ChancellorVoting)
        };
        let next = Snapshot {
            election_tracker: 0,
            election_tracker_advanced: true,
            fascist_policies: 2,
            last_phase: Phase::ChancellorVoting,
            ..in_phase(Phase::PresidentialPowerInvestigate)
        };
        let events = diff(&prev, &next).unwrap();
        assert_eq!(
            &events[..2],
            &[
                SemanticEvent::TrackerAdvanced {
                    position: 3,
                    wrapped_to_three: true,
                    after_vote: true,
                },
                SemanticEvent::PolicyEnacted(PolicyType::Fascist),
            ]
        );
        assert!(matches!(
            events.last(),
            Some(SemanticEvent::DecksUpdated { .. })
        ));
    }

    #[test]
    fn tracker_and_policy_ignored_outside_reveal_phases() {
        let prev = in_phase(Phase::ChancellorVoting);
        let next = Snapshot {
            election_tracker: 1,
            ..in_phase(Phase::ChancellorNomination)
        };
        let events = diff(&prev, &next).unwrap();
        assert_eq!(
            transient(&events),
            vec![SemanticEvent::PhaseChanged {
                from: Phase::ChancellorVoting,
                to: Phase::ChancellorNomination,
                last_phase: Phase::Setup,
            }]
        );
    }

    #[test]
    fn diff_is_deterministic() {
        let prev = Snapshot {
            election_tracker: 1,
            ..in_phase(Phase::LegislativeChancellor)
        };
        let next = Snapshot {
            election_tracker: 0,
            fascist_policies: 6,
            ..in_phase(Phase::FascistVictoryPolicy)
        };
        assert_eq!(diff(&prev, &next).unwrap(), diff(&prev, &next).unwrap());
    }

    #[test]
    fn leaving_setup_syncs_counters() {
        let prev = Snapshot::default();
        let next = Snapshot {
            liberal_policies: 2,
            fascist_policies: 3,
            election_tracker: 1,
            draw_size: 9,
            discard_size: 2,
            ..in_phase(Phase::ChancellorNomination)
        };
        let events = diff(&prev, &next).unwrap();
        assert_eq!(
            events[0],
            SemanticEvent::CountersSynced {
                liberal: 2,
                fascist: 3,
                tracker: 1,
                draw: 9,
                discard: 2,
            }
        );
        assert!(matches!(events[1], SemanticEvent::PhaseChanged { .. }));
    }

    #[test]
    fn victory_follows_phase_change() {
        let prev = in_phase(Phase::PresidentialPowerExecution);
        let next = in_phase(Phase::LiberalVictoryExecution);
        let events = diff(&prev, &next).unwrap();
        assert_eq!(
            transient(&events),
            vec![
                SemanticEvent::PhaseChanged {
                    from: Phase::PresidentialPowerExecution,
                    to: Phase::LiberalVictoryExecution,
                    last_phase: Phase::Setup,
                },
                SemanticEvent::VictoryReached(VictoryKind::LiberalExecution),
            ]
        );
    }

    #[test]
    fn malformed_next_is_rejected() {
        let prev = in_phase(Phase::ChancellorNomination);
        let next = in_phase(Phase::LegislativePresident);
        assert!(matches!(
            diff(&prev, &next),
            Err(ClientError::MissingField {
                field: "presidentChoices",
                ..
            })
        ));
    }
}
