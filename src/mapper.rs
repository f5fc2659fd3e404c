//! Turns diff events into presentation tasks for one viewer.
//!
//! The same snapshot transition looks different depending on who is watching:
//! the president gets a nomination prompt where everyone else gets a status
//! line. [`PhaseEventMapper::map`] makes that choice.
//!
//! Only prompts that send a command to the server are barrier tasks, and a
//! phase change yields at most one of them, so at most one task ever waits
//! for an acknowledgement.

use tracing::debug;

use crate::diff::SemanticEvent;
use crate::error::{ClientError, Result};
use crate::presentation::{ExecutivePower, Presentation, PresentationTask, PresentationTimings};
use crate::protocol::{Phase, Role, Snapshot};

/// Fascist policy count after which electing Hitler chancellor wins the game.
const HITLER_ELECTION_THRESHOLD: u8 = 3;

/// Fascist policy count at which the chancellor may ask for a veto.
const VETO_THRESHOLD: u8 = 5;

/// Above this many living players the last president is term-limited too.
const TERM_LIMIT_PLAYER_COUNT: usize = 5;

/// Maps diff events to presentation tasks.
#[derive(Debug, Clone, Default)]
pub struct PhaseEventMapper {
    timings: PresentationTimings,
}

impl PhaseEventMapper {
    pub fn new(timings: PresentationTimings) -> Self {
        Self { timings }
    }

    pub fn timings(&self) -> &PresentationTimings {
        &self.timings
    }

    /// Produce the tasks for `events`, which were diffed into `snapshot`, as
    /// seen by the player named `viewer`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnknownPlayer`] if a phase change needs the
    /// viewer's record and there is none, and [`ClientError::MissingField`]
    /// if the snapshot lacks data a task needs.
    pub fn map(
        &self,
        events: &[SemanticEvent],
        snapshot: &Snapshot,
        viewer: &str,
    ) -> Result<Vec<PresentationTask>> {
        let mut tasks = Vec::new();
        for event in events {
            match event {
                SemanticEvent::CountersSynced {
                    liberal,
                    fascist,
                    tracker,
                    draw,
                    discard,
                } => tasks.push(PresentationTask::immediate(Presentation::BoardSync {
                    liberal: *liberal,
                    fascist: *fascist,
                    tracker: *tracker,
                    draw: *draw,
                    discard: *discard,
                })),
                SemanticEvent::TrackerAdvanced {
                    position,
                    wrapped_to_three,
                    after_vote,
                } => {
                    if *after_vote {
                        tasks.push(self.vote_tally(snapshot));
                    }
                    tasks.push(PresentationTask::dismissable(
                        Presentation::ElectionTracker {
                            position: *position,
                            wrapped: *wrapped_to_three,
                        },
                    ));
                }
                SemanticEvent::PolicyEnacted(policy) => {
                    tasks.push(PresentationTask::dismissable(Presentation::PolicyEnacted {
                        policy: *policy,
                    }));
                }
                SemanticEvent::BoardUpdated {
                    liberal,
                    fascist,
                    tracker,
                } => tasks.push(PresentationTask::timed(
                    Presentation::BoardUpdate {
                        liberal: *liberal,
                        fascist: *fascist,
                        tracker: *tracker,
                    },
                    self.timings.board_update,
                )),
                SemanticEvent::PhaseChanged { to, last_phase, .. } => {
                    self.phase_tasks(*to, *last_phase, snapshot, viewer, &mut tasks)?;
                }
                SemanticEvent::VictoryReached(kind) => {
                    let (fascists, liberals) = split_by_party(snapshot);
                    let viewer_won = snapshot
                        .players
                        .get(viewer)
                        .and_then(|p| p.role)
                        .map(|role| role.party() == kind.winning_party());
                    tasks.push(PresentationTask::dismissable(Presentation::Victory {
                        kind: *kind,
                        fascists,
                        liberals,
                        viewer_won,
                    }));
                }
                SemanticEvent::DecksUpdated { draw, discard } => {
                    tasks.push(PresentationTask::immediate(Presentation::DeckUpdate {
                        draw: *draw,
                        discard: *discard,
                    }));
                }
            }
        }
        debug!(viewer, phase = ?snapshot.phase, count = tasks.len(), "events mapped");
        Ok(tasks)
    }

    fn phase_tasks(
        &self,
        to: Phase,
        last_phase: Phase,
        snapshot: &Snapshot,
        viewer: &str,
        tasks: &mut Vec<PresentationTask>,
    ) -> Result<()> {
        let me = snapshot.player(viewer)?;
        let is_president = snapshot.is_president(viewer);
        let is_chancellor = snapshot.is_chancellor(viewer);

        match to {
            Phase::Setup | Phase::LiberalVictoryPolicy | Phase::FascistVictoryPolicy => {}

            Phase::ChancellorNomination => {
                if snapshot.election_tracker == 0
                    && snapshot.liberal_policies == 0
                    && snapshot.fascist_policies == 0
                {
                    let role = me.role.ok_or(ClientError::MissingField {
                        phase: to,
                        field: "id",
                    })?;
                    tasks.push(PresentationTask::dismissable(Presentation::RoleReveal {
                        role,
                        teammates: visible_roles(snapshot, viewer),
                    }));
                }
                tasks.push(self.event_bar("CHANCELLOR NOMINATION"));
                tasks.push(status("Waiting for president to nominate a chancellor."));
                if is_president {
                    tasks.push(PresentationTask::barrier(Presentation::NominationPrompt {
                        eligible: nomination_candidates(snapshot, viewer),
                        fascist_warning: snapshot.fascist_policies >= HITLER_ELECTION_THRESHOLD,
                    }));
                }
            }

            Phase::ChancellorVoting => {
                tasks.push(PresentationTask::immediate(Presentation::Status { text: None }));
                tasks.push(self.event_bar("VOTING"));
                tasks.push(status("Waiting for all players to vote."));
                if me.alive && !snapshot.has_voted(viewer) {
                    tasks.push(PresentationTask::barrier(Presentation::VotePrompt {
                        president: required(snapshot, &snapshot.president, "president")?,
                        chancellor: required(snapshot, &snapshot.chancellor, "chancellor")?,
                    }));
                }
            }

            Phase::LegislativePresident => {
                tasks.push(self.vote_tally(snapshot));
                tasks.push(self.event_bar("LEGISLATIVE SESSION"));
                tasks.push(status(
                    "Waiting for the president to choose a policy to discard.",
                ));
                if is_president {
                    tasks.push(PresentationTask::barrier(Presentation::DiscardPrompt {
                        policies: snapshot.president_choices()?.to_vec(),
                    }));
                }
            }

            Phase::LegislativeChancellor => {
                tasks.push(status(
                    "Waiting for the chancellor to choose a policy to enact.",
                ));
                if is_chancellor {
                    tasks.push(PresentationTask::barrier(Presentation::EnactPrompt {
                        policies: snapshot.chancellor_choices()?.to_vec(),
                        veto_enabled: snapshot.fascist_policies == VETO_THRESHOLD
                            && !snapshot.veto_occurred,
                    }));
                }
            }

            Phase::LegislativePresidentVeto => {
                tasks.push(status(
                    "Chancellor has motioned to veto the agenda. Waiting for the president to decide.",
                ));
                if is_president {
                    tasks.push(PresentationTask::barrier(Presentation::VetoPrompt {
                        chancellor: required(snapshot, &snapshot.chancellor, "chancellor")?,
                    }));
                }
            }

            Phase::PresidentialPowerPeek => {
                tasks.push(self.event_bar("PRESIDENTIAL POWER"));
                if is_president {
                    tasks.push(PresentationTask::barrier(Presentation::PeekPrompt {
                        policies: snapshot.peek()?.to_vec(),
                    }));
                } else {
                    tasks.push(status("Peek: President is previewing the next 3 policies."));
                }
            }

            Phase::PresidentialPowerElection => {
                self.power_tasks(
                    ExecutivePower::SpecialElection,
                    "Special Election: President is choosing the next president.",
                    snapshot,
                    viewer,
                    tasks,
                );
            }

            Phase::PresidentialPowerExecution => {
                self.power_tasks(
                    ExecutivePower::Execution,
                    "Execution: President is choosing a player to execute.",
                    snapshot,
                    viewer,
                    tasks,
                );
            }

            Phase::PresidentialPowerInvestigate => {
                self.power_tasks(
                    ExecutivePower::Investigate,
                    "Investigation: President is choosing a player to investigate.",
                    snapshot,
                    viewer,
                    tasks,
                );
            }

            Phase::PostLegislative => {
                match last_phase {
                    Phase::PresidentialPowerElection if !is_president => {
                        tasks.push(PresentationTask::dismissable(
                            Presentation::SpecialElectionResult {
                                president: required(snapshot, &snapshot.president, "president")?,
                                target: snapshot.target()?.to_string(),
                            },
                        ));
                    }
                    Phase::PresidentialPowerExecution => {
                        tasks.push(execution_result(snapshot, viewer)?);
                    }
                    // The president learns the result from a dedicated packet.
                    Phase::PresidentialPowerInvestigate if !is_president => {
                        tasks.push(PresentationTask::dismissable(
                            Presentation::InvestigationNotice {
                                president: required(snapshot, &snapshot.president, "president")?,
                                target: snapshot.target()?.to_string(),
                            },
                        ));
                    }
                    _ => {}
                }
                tasks.push(status("Waiting for the president to end their term."));
            }

            Phase::LiberalVictoryExecution => {
                tasks.push(execution_result(snapshot, viewer)?);
            }

            Phase::FascistVictoryElection => {
                tasks.push(self.vote_tally(snapshot));
            }
        }
        Ok(())
    }

    fn power_tasks(
        &self,
        power: ExecutivePower,
        waiting: &str,
        snapshot: &Snapshot,
        viewer: &str,
        tasks: &mut Vec<PresentationTask>,
    ) {
        tasks.push(self.event_bar("PRESIDENTIAL POWER"));
        if snapshot.is_president(viewer) {
            tasks.push(PresentationTask::barrier(Presentation::PlayerSelectPrompt {
                power,
                eligible: power_targets(power, snapshot, viewer),
            }));
        } else {
            tasks.push(status(waiting));
        }
    }

    fn event_bar(&self, text: &str) -> PresentationTask {
        PresentationTask::timed(
            Presentation::EventBar {
                text: text.to_string(),
            },
            self.timings.event_bar,
        )
    }

    fn vote_tally(&self, snapshot: &Snapshot) -> PresentationTask {
        let votes: Vec<(String, bool)> = snapshot
            .player_order
            .iter()
            .filter_map(|name| snapshot.user_votes.get(name).map(|v| (name.clone(), *v)))
            .collect();
        let yes = votes.iter().filter(|(_, v)| *v).count();
        let no = votes.len() - yes;
        PresentationTask::timed(
            Presentation::VoteTally {
                votes,
                yes,
                no,
                passed: yes > no,
            },
            self.timings.vote_tally,
        )
    }
}

fn status(text: &str) -> PresentationTask {
    PresentationTask::immediate(Presentation::Status {
        text: Some(text.to_string()),
    })
}

fn required(snapshot: &Snapshot, value: &Option<String>, field: &'static str) -> Result<String> {
    value.clone().ok_or(ClientError::MissingField {
        phase: snapshot.phase,
        field,
    })
}

fn execution_result(snapshot: &Snapshot, viewer: &str) -> Result<PresentationTask> {
    let target = snapshot.target()?;
    Ok(PresentationTask::dismissable(Presentation::ExecutionResult {
        target: target.to_string(),
        viewer_executed: target == viewer,
    }))
}

/// Other players whose roles this snapshot reveals to the viewer.
fn visible_roles(snapshot: &Snapshot, viewer: &str) -> Vec<(String, Role)> {
    snapshot
        .player_order
        .iter()
        .filter(|name| name.as_str() != viewer)
        .filter_map(|name| {
            let role = snapshot.players.get(name)?.role?;
            Some((name.clone(), role))
        })
        .collect()
}

/// Fascist team (including Hitler) and everyone else, in seating order.
fn split_by_party(snapshot: &Snapshot) -> (Vec<String>, Vec<String>) {
    snapshot.player_order.iter().cloned().partition(|name| {
        matches!(
            snapshot.players.get(name).and_then(|p| p.role),
            Some(Role::Fascist | Role::Hitler)
        )
    })
}

/// Players the president may nominate: alive, not themselves, and not
/// term-limited. The last chancellor is always term-limited; the last
/// president only while more than five players are alive.
pub fn nomination_candidates(snapshot: &Snapshot, president: &str) -> Vec<String> {
    let limit_last_president = snapshot.alive_count() > TERM_LIMIT_PLAYER_COUNT;
    snapshot
        .player_order
        .iter()
        .filter(|name| {
            name.as_str() != president
                && snapshot.is_alive(name)
                && snapshot.last_chancellor.as_deref() != Some(name.as_str())
                && !(limit_last_president
                    && snapshot.last_president.as_deref() == Some(name.as_str()))
        })
        .cloned()
        .collect()
}

/// Players the president may target with `power`.
pub fn power_targets(power: ExecutivePower, snapshot: &Snapshot, president: &str) -> Vec<String> {
    snapshot
        .player_order
        .iter()
        .filter(|name| {
            let Some(player) = snapshot.players.get(name.as_str()) else {
                return false;
            };
            let fresh = match power {
                ExecutivePower::Investigate => !player.investigated,
                ExecutivePower::Execution | ExecutivePower::SpecialElection => true,
            };
            name.as_str() != president && player.alive && fresh
        })
        .cloned()
        .collect()
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
    use crate::diff::diff;
    use crate::presentation::Completion;
    use crate::protocol::{PlayerState, PolicyType, VictoryKind};

    const SEATS: [&str; 6] = ["ann", "bob", "cat", "dan", "eve", "fay"];

    fn table(phase: Phase) -> Snapshot {
        let mut snapshot = Snapshot {
            phase,
            player_order: SEATS.iter().map(|s| s.to_string()).collect(),
            president: Some("ann".into()),
            chancellor: Some("bob".into()),
            ..Snapshot::default()
        };
        for name in SEATS {
            snapshot.players.insert(
                name.into(),
                PlayerState {
                    role: Some(Role::Liberal),
                    ..PlayerState::default()
                },
            );
        }
        snapshot
    }

    fn presentations(tasks: &[PresentationTask]) -> Vec<&Presentation> {
        tasks.iter().map(|t| &t.presentation).collect()
    }

    fn barriers(tasks: &[PresentationTask]) -> usize {
        tasks
            .iter()
            .filter(|t| t.completion == Completion::UntilAck)
            .count()
    }

    fn map_transition(prev: &Snapshot, next: &Snapshot, viewer: &str) -> Vec<PresentationTask> {
        let events = diff(prev, next).unwrap();
        PhaseEventMapper::default().map(&events, next, viewer).unwrap()
    }

    #[test]
    fn fresh_game_reveals_role_then_prompts_president() {
        let mut next = table(Phase::ChancellorNomination);
        next.players.get_mut("ann").unwrap().role = Some(Role::Fascist);
        next.players.get_mut("cat").unwrap().role = Some(Role::Hitler);
        let prev = Snapshot::default();

        let tasks = map_transition(&prev, &next, "ann");
        let shown = presentations(&tasks);
        assert!(matches!(shown[0], Presentation::BoardSync { .. }));
        match shown[1] {
            Presentation::RoleReveal { role, teammates } => {
                assert_eq!(*role, Role::Fascist);
                assert!(teammates.contains(&("cat".to_string(), Role::Hitler)));
            }
            other => panic!("expected role reveal, got {other:?}"),
        }
        assert!(matches!(
            shown[2],
            Presentation::EventBar { text } if text == "CHANCELLOR NOMINATION"
        ));
        assert!(matches!(
            shown[4],
            Presentation::NominationPrompt { fascist_warning: false, .. }
        ));
        assert_eq!(barriers(&tasks), 1);
        assert!(matches!(shown.last(), Some(Presentation::DeckUpdate { .. })));
    }

    #[test]
    fn non_president_gets_no_nomination_prompt() {
        let prev = table(Phase::PostLegislative);
        let next = Snapshot {
            liberal_policies: 1,
            ..table(Phase::ChancellorNomination)
        };
        let tasks = map_transition(&prev, &next, "bob");
        assert_eq!(barriers(&tasks), 0);
        assert!(!presentations(&tasks)
            .iter()
            .any(|p| matches!(p, Presentation::RoleReveal { .. })));
    }

    #[test]
    fn nomination_respects_term_limits() {
        let mut snapshot = table(Phase::ChancellorNomination);
        snapshot.last_chancellor = Some("cat".into());
        snapshot.last_president = Some("dan".into());
        snapshot.players.get_mut("fay").unwrap().alive = false;

        // Five alive: only the last chancellor is term-limited.
        assert_eq!(
            nomination_candidates(&snapshot, "ann"),
            vec!["bob", "dan", "eve"]
        );

        snapshot.players.get_mut("fay").unwrap().alive = true;
        assert_eq!(
            nomination_candidates(&snapshot, "ann"),
            vec!["bob", "eve", "fay"]
        );
    }

    #[test]
    fn voting_prompt_only_for_living_non_voters() {
        let prev = table(Phase::ChancellorNomination);
        let mut next = table(Phase::ChancellorVoting);
        next.user_votes.insert("bob".into(), true);
        next.players.get_mut("cat").unwrap().alive = false;

        assert_eq!(barriers(&map_transition(&prev, &next, "ann")), 1);
        assert_eq!(barriers(&map_transition(&prev, &next, "bob")), 0);
        assert_eq!(barriers(&map_transition(&prev, &next, "cat")), 0);
    }

    #[test]
    fn legislative_session_shows_tally_and_discard_prompt() {
        let prev = table(Phase::ChancellorVoting);
        let mut next = table(Phase::LegislativePresident);
        next.president_choices = Some(vec![
            PolicyType::Fascist,
            PolicyType::Liberal,
            PolicyType::Fascist,
        ]);
        for (name, vote) in [("ann", true), ("bob", true), ("cat", false)] {
            next.user_votes.insert(name.into(), vote);
        }

        let tasks = map_transition(&prev, &next, "ann");
        match &tasks[0].presentation {
            Presentation::VoteTally {
                yes, no, passed, ..
            } => {
                assert_eq!((*yes, *no, *passed), (2, 1, true));
            }
            other => panic!("expected tally, got {other:?}"),
        }
        assert!(tasks.iter().any(|t| matches!(
            &t.presentation,
            Presentation::DiscardPrompt { policies } if policies.len() == 3
        )));
    }

    #[test]
    fn missing_chancellor_choices_is_an_error() {
        let mut snapshot = table(Phase::LegislativeChancellor);
        snapshot.chancellor_choices = None;
        let events = vec![SemanticEvent::PhaseChanged {
            from: Phase::LegislativePresident,
            to: Phase::LegislativeChancellor,
            last_phase: Phase::LegislativePresident,
        }];
        let err = PhaseEventMapper::default()
            .map(&events, &snapshot, "bob")
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::MissingField {
                field: "chancellorChoices",
                ..
            }
        ));
    }

    #[test]
    fn veto_enabled_at_five_fascist_policies() {
        let prev = table(Phase::LegislativePresident);
        let mut next = Snapshot {
            fascist_policies: 5,
            ..table(Phase::LegislativeChancellor)
        };
        next.chancellor_choices = Some(vec![PolicyType::Fascist, PolicyType::Liberal]);
        let tasks = map_transition(&prev, &next, "bob");
        assert!(tasks.iter().any(|t| matches!(
            t.presentation,
            Presentation::EnactPrompt {
                veto_enabled: true,
                ..
            }
        )));
    }

    #[test]
    fn investigation_targets_skip_investigated() {
        let mut snapshot = table(Phase::PresidentialPowerInvestigate);
        snapshot.players.get_mut("bob").unwrap().investigated = true;
        snapshot.players.get_mut("eve").unwrap().alive = false;
        assert_eq!(
            power_targets(ExecutivePower::Investigate, &snapshot, "ann"),
            vec!["cat", "dan", "fay"]
        );
        assert_eq!(
            power_targets(ExecutivePower::Execution, &snapshot, "ann"),
            vec!["bob", "cat", "dan", "fay"]
        );
    }

    #[test]
    fn reveal_sequence_orders_tracker_policy_board() {
        let prev = Snapshot {
            election_tracker: 2,
            ..table(Phase::ChancellorVoting)
        };
        let next = Snapshot {
            election_tracker: 0,
            election_tracker_advanced: true,
            fascist_policies: 1,
            last_phase: Phase::ChancellorVoting,
            ..table(Phase::PostLegislative)
        };
        let tasks = map_transition(&prev, &next, "dan");
        let shown = presentations(&tasks);
        assert!(matches!(shown[0], Presentation::VoteTally { passed: false, .. }));
        assert_eq!(
            *shown[1],
            Presentation::ElectionTracker {
                position: 3,
                wrapped: true
            }
        );
        assert_eq!(
            *shown[2],
            Presentation::PolicyEnacted {
                policy: PolicyType::Fascist
            }
        );
        assert!(matches!(shown[3], Presentation::BoardUpdate { fascist: 1, .. }));
    }

    #[test]
    fn post_legislative_results_depend_on_last_phase() {
        let prev = table(Phase::PresidentialPowerExecution);
        let mut next = table(Phase::PostLegislative);
        next.last_phase = Phase::PresidentialPowerExecution;
        next.target_user = Some("eve".into());
        next.players.get_mut("eve").unwrap().alive = false;

        let tasks = map_transition(&prev, &next, "eve");
        assert!(tasks.iter().any(|t| t.presentation
            == Presentation::ExecutionResult {
                target: "eve".into(),
                viewer_executed: true,
            }));

        let prev = table(Phase::PresidentialPowerInvestigate);
        let mut next = table(Phase::PostLegislative);
        next.last_phase = Phase::PresidentialPowerInvestigate;
        next.target_user = Some("cat".into());
        let president_view = map_transition(&prev, &next, "ann");
        assert!(!president_view.iter().any(|t| matches!(
            t.presentation,
            Presentation::InvestigationNotice { .. }
        )));
        let other_view = map_transition(&prev, &next, "dan");
        assert!(other_view.iter().any(|t| matches!(
            t.presentation,
            Presentation::InvestigationNotice { .. }
        )));
    }

    #[test]
    fn election_result_requires_target() {
        let prev = table(Phase::PresidentialPowerElection);
        let mut next = table(Phase::PostLegislative);
        next.last_phase = Phase::PresidentialPowerElection;
        let events = diff(&prev, &next).unwrap();
        let err = PhaseEventMapper::default()
            .map(&events, &next, "bob")
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::MissingField {
                field: "targetUser",
                ..
            }
        ));
    }

    #[test]
    fn victory_ends_with_victory_screen() {
        let prev = table(Phase::ChancellorVoting);
        let mut next = table(Phase::FascistVictoryElection);
        next.players.get_mut("bob").unwrap().role = Some(Role::Hitler);
        next.players.get_mut("cat").unwrap().role = Some(Role::Fascist);

        let tasks = map_transition(&prev, &next, "cat");
        let shown = presentations(&tasks);
        assert!(matches!(shown[0], Presentation::VoteTally { .. }));
        match shown[1] {
            Presentation::Victory {
                kind,
                fascists,
                viewer_won,
                ..
            } => {
                assert_eq!(*kind, VictoryKind::FascistElection);
                assert_eq!(fascists, &vec!["bob".to_string(), "cat".to_string()]);
                assert_eq!(*viewer_won, Some(true));
            }
            other => panic!("expected victory, got {other:?}"),
        }
        assert!(shown[1].is_terminal());
    }

    #[test]
    fn unknown_viewer_is_an_error() {
        let prev = table(Phase::ChancellorNomination);
        let next = table(Phase::ChancellorVoting);
        let events = diff(&prev, &next).unwrap();
        assert!(matches!(
            PhaseEventMapper::default().map(&events, &next, "zed"),
            Err(ClientError::UnknownPlayer(_))
        ));
    }
}
