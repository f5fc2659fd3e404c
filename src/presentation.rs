//! What the renderer is asked to show, and when each item is done.
//!
//! A [`PresentationTask`] pairs a [`Presentation`] (what to show) with a
//! [`Completion`] contract (what ends it). Tasks are produced by the phase
//! mapper and run one at a time by the presentation queue.

use std::fmt;
use std::time::Duration;

use crate::protocol::{Party, PolicyType, Role, VictoryKind};

/// Default duration of a phase banner, including its fade-out.
pub const DEFAULT_EVENT_BAR: Duration = Duration::from_millis(2500);

/// Default duration of the vote tally sequence.
pub const DEFAULT_VOTE_TALLY: Duration = Duration::from_millis(6500);

/// Default duration of a board counter update.
pub const DEFAULT_BOARD_UPDATE: Duration = Duration::from_millis(500);

/// Default fade-out after a dismissable alert is closed.
pub const DEFAULT_ALERT_FADE: Duration = Duration::from_millis(1000);

/// Identifier of a task, unique within one presentation queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// What ends a running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Done as soon as it is shown (display syncs, status text).
    Immediate,
    /// Done after a fixed delay.
    After(Duration),
    /// Done when the player closes it.
    UntilDismissed,
    /// Barrier mode: done on the next server acknowledgement. The player may
    /// also close it, which withdraws the acknowledgement wait.
    UntilAck,
}

impl Completion {
    pub fn is_barrier(self) -> bool {
        matches!(self, Self::UntilAck)
    }

    /// Whether the player can close a task with this completion.
    pub fn is_dismissable(self) -> bool {
        matches!(self, Self::UntilDismissed | Self::UntilAck)
    }
}

/// Executive powers that ask the president to pick a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutivePower {
    Investigate,
    Execution,
    SpecialElection,
}

/// A single thing for the renderer to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presentation {
    /// Replace all board counters without animation.
    BoardSync {
        liberal: u8,
        fascist: u8,
        tracker: u8,
        draw: u32,
        discard: u32,
    },
    /// The viewer's secret role, plus any teammates the viewer may see.
    RoleReveal {
        role: Role,
        teammates: Vec<(String, Role)>,
    },
    /// A banner announcing a new phase.
    EventBar { text: String },
    /// Set (or clear, with `None`) the status line.
    Status { text: Option<String> },
    /// Flip every player's vote card and show the result.
    VoteTally {
        votes: Vec<(String, bool)>,
        yes: usize,
        no: usize,
        passed: bool,
    },
    /// The election tracker moved. `position` is 3 when it wrapped.
    ElectionTracker { position: u8, wrapped: bool },
    /// A policy was enacted.
    PolicyEnacted { policy: PolicyType },
    /// Animate the board to new counter values.
    BoardUpdate { liberal: u8, fascist: u8, tracker: u8 },
    /// New draw/discard pile sizes.
    DeckUpdate { draw: u32, discard: u32 },
    /// The viewer is president and must nominate a chancellor.
    NominationPrompt {
        eligible: Vec<String>,
        /// Set once three fascist policies are enacted: electing Hitler now
        /// ends the game.
        fascist_warning: bool,
    },
    /// The viewer must vote on the proposed government.
    VotePrompt { president: String, chancellor: String },
    /// The viewer is president and must discard one of these policies.
    DiscardPrompt { policies: Vec<PolicyType> },
    /// The viewer is chancellor and must enact one of these policies.
    EnactPrompt {
        policies: Vec<PolicyType>,
        veto_enabled: bool,
    },
    /// The viewer is president and must accept or refuse a veto.
    VetoPrompt { chancellor: String },
    /// The viewer is president and sees the top three policies.
    PeekPrompt { policies: Vec<PolicyType> },
    /// The viewer is president and must pick a player for a power.
    PlayerSelectPrompt {
        power: ExecutivePower,
        eligible: Vec<String>,
    },
    /// Someone was chosen as the next president.
    SpecialElectionResult { president: String, target: String },
    /// Someone was executed.
    ExecutionResult { target: String, viewer_executed: bool },
    /// The president investigated someone; the result is private.
    InvestigationNotice { president: String, target: String },
    /// The viewer's own investigation came back.
    InvestigationResult { target: String, party: Party },
    /// The viewer still has the default portrait.
    IconSelection,
    /// The game is over.
    Victory {
        kind: VictoryKind,
        fascists: Vec<String>,
        liberals: Vec<String>,
        /// `None` if the viewer's own role is not known.
        viewer_won: Option<bool>,
    },
}

impl Presentation {
    /// Victory screens end the session's game; nothing is shown after them
    /// until the player returns to the lobby.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Victory { .. })
    }
}

/// A presentation plus the contract that ends it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationTask {
    pub presentation: Presentation,
    pub completion: Completion,
}

impl PresentationTask {
    pub fn new(presentation: Presentation, completion: Completion) -> Self {
        Self {
            presentation,
            completion,
        }
    }

    pub fn immediate(presentation: Presentation) -> Self {
        Self::new(presentation, Completion::Immediate)
    }

    pub fn timed(presentation: Presentation, duration: Duration) -> Self {
        Self::new(presentation, Completion::After(duration))
    }

    pub fn dismissable(presentation: Presentation) -> Self {
        Self::new(presentation, Completion::UntilDismissed)
    }

    pub fn barrier(presentation: Presentation) -> Self {
        Self::new(presentation, Completion::UntilAck)
    }
}

/// Durations of the timed presentations.
///
/// # Example
///
/// ```
/// use secret_hitler_client::presentation::PresentationTimings;
/// use std::time::Duration;
///
/// let fast = PresentationTimings::default().with_vote_tally(Duration::from_secs(1));
/// assert_eq!(fast.vote_tally, Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentationTimings {
    /// Phase banner. Defaults to **2.5 seconds**.
    pub event_bar: Duration,
    /// Vote tally. Defaults to **6.5 seconds**.
    pub vote_tally: Duration,
    /// Board counter update. Defaults to **500 ms**.
    pub board_update: Duration,
    /// Fade after a dismissable alert is closed. Defaults to **1 second**.
    pub alert_fade: Duration,
}

impl Default for PresentationTimings {
    fn default() -> Self {
        Self {
            event_bar: DEFAULT_EVENT_BAR,
            vote_tally: DEFAULT_VOTE_TALLY,
            board_update: DEFAULT_BOARD_UPDATE,
            alert_fade: DEFAULT_ALERT_FADE,
        }
    }
}

impl PresentationTimings {
    #[must_use]
    pub fn with_event_bar(mut self, duration: Duration) -> Self {
        self.event_bar = duration;
        self
    }

    #[must_use]
    pub fn with_vote_tally(mut self, duration: Duration) -> Self {
        self.vote_tally = duration;
        self
    }

    #[must_use]
    pub fn with_board_update(mut self, duration: Duration) -> Self {
        self.board_update = duration;
        self
    }

    #[must_use]
    pub fn with_alert_fade(mut self, duration: Duration) -> Self {
        self.alert_fade = duration;
        self
    }

    /// Zero every duration. Handy for tests and headless clients.
    pub fn instant() -> Self {
        Self {
            event_bar: Duration::ZERO,
            vote_tally: Duration::ZERO,
            board_update: Duration::ZERO,
            alert_fade: Duration::ZERO,
        }
    }
}
