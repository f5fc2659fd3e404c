//! Strictly serial presentation scheduler.
//!
//! [`PresentationQueue`] runs at most one [`PresentationTask`] at a time, in
//! enqueue order. It never sleeps or spawns: callers pass the current time in
//! and get back the [`Transition`]s that happened, then call
//! [`poll_deadline`](PresentationQueue::poll_deadline) once
//! [`deadline`](PresentationQueue::deadline) has passed.
//!
//! Barrier tasks ([`Completion::UntilAck`]) register with an internal
//! [`AckRendezvous`] when they start and finish on the next
//! [`acknowledge`](PresentationQueue::acknowledge).
//!
//! ```
//! use secret_hitler_client::presentation::{Presentation, PresentationTask};
//! use secret_hitler_client::queue::{PresentationQueue, Transition};
//! use tokio::time::Instant;
//!
//! let mut queue = PresentationQueue::new();
//! let now = Instant::now();
//! let (id, transitions) = queue.enqueue(
//!     PresentationTask::barrier(Presentation::VetoPrompt { chancellor: "bob".into() }),
//!     now,
//! );
//! assert!(matches!(transitions[0], Transition::Started { .. }));
//! assert!(queue.is_awaiting_ack());
//!
//! let transitions = queue.acknowledge(now);
//! assert_eq!(transitions, vec![Transition::Finished { id }, Transition::Idle]);
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::presentation::{Completion, Presentation, PresentationTask, TaskId};
use crate::rendezvous::AckRendezvous;

/// Observable state of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Running(TaskId),
}

/// A change the caller should render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Show this task's content.
    Started {
        id: TaskId,
        presentation: Presentation,
    },
    /// Hide this task's content.
    Finished { id: TaskId },
    /// Nothing is running and nothing is queued.
    Idle,
}

#[derive(Debug)]
struct ActiveTask {
    id: TaskId,
    presentation: Presentation,
    completion: Completion,
    deadline: Option<Instant>,
}

/// FIFO scheduler with a single active task.
#[derive(Debug, Default)]
pub struct PresentationQueue {
    pending: VecDeque<(TaskId, PresentationTask)>,
    active: Option<ActiveTask>,
    rendezvous: AckRendezvous<TaskId>,
    next_id: u64,
}

impl PresentationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task to the back of the queue, starting it at once if idle.
    pub fn enqueue(&mut self, task: PresentationTask, now: Instant) -> (TaskId, Vec<Transition>) {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        trace!(%id, completion = ?task.completion, "task enqueued");

        self.pending.push_back((id, task));
        let mut out = Vec::new();
        if self.active.is_none() {
            self.start_next(now, &mut out);
        }
        (id, out)
    }

    /// Finish the active task and start the next one.
    ///
    /// Does nothing while idle.
    pub fn advance(&mut self, now: Instant) -> Vec<Transition> {
        let mut out = Vec::new();
        if let Some(active) = self.active.take() {
            if active.completion.is_barrier() {
                self.rendezvous.withdraw(&active.id);
            }
            debug!(id = %active.id, "task finished");
            out.push(Transition::Finished { id: active.id });
            self.start_next(now, &mut out);
        }
        out
    }

    /// Deliver a server acknowledgement.
    ///
    /// Releases the oldest barrier waiter; if that is the active task, the
    /// queue advances.
    pub fn acknowledge(&mut self, now: Instant) -> Vec<Transition> {
        match self.rendezvous.fire_ack() {
            Some(id) if self.current_id() == Some(id) => self.advance(now),
            Some(id) => {
                warn!(%id, "ack released a task that is no longer active");
                Vec::new()
            }
            None => {
                trace!("ack with no barrier waiting");
                Vec::new()
            }
        }
    }

    /// The player closed task `id`.
    ///
    /// The task finishes after `fade`; with a zero fade it finishes now.
    /// Stale ids and tasks that cannot be dismissed are ignored.
    pub fn dismiss(&mut self, id: TaskId, fade: Duration, now: Instant) -> Vec<Transition> {
        let Some(active) = self.active.as_mut().filter(|a| a.id == id) else {
            debug!(%id, "dismiss for a task that is not active");
            return Vec::new();
        };
        if !active.completion.is_dismissable() {
            debug!(%id, "task cannot be dismissed");
            return Vec::new();
        }
        if active.completion.is_barrier() {
            self.rendezvous.withdraw(&id);
        }
        if fade.is_zero() {
            return self.advance(now);
        }
        active.completion = Completion::After(fade);
        active.deadline = Some(now + fade);
        Vec::new()
    }

    /// Advance past the active task if its deadline has passed.
    pub fn poll_deadline(&mut self, now: Instant) -> Vec<Transition> {
        match self.deadline() {
            Some(deadline) if deadline <= now => self.advance(now),
            _ => Vec::new(),
        }
    }

    /// When the active task ends on its own, if it has a timer.
    pub fn deadline(&self) -> Option<Instant> {
        self.active.as_ref().and_then(|a| a.deadline)
    }

    /// Drop every queued task and every acknowledgement wait, and go idle.
    ///
    /// Returns the id of the task that was being shown; the caller must hide it.
    pub fn clear(&mut self) -> Option<TaskId> {
        let dropped = self.pending.len();
        self.pending.clear();
        self.rendezvous.discard_all();
        let hidden = self.active.take().map(|a| a.id);
        if hidden.is_some() || dropped > 0 {
            debug!(dropped, hidden = ?hidden, "presentation queue cleared");
        }
        hidden
    }

    pub fn state(&self) -> QueueState {
        match self.current_id() {
            Some(id) => QueueState::Running(id),
            None => QueueState::Idle,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// The running task and its content.
    pub fn current(&self) -> Option<(TaskId, &Presentation)> {
        self.active.as_ref().map(|a| (a.id, &a.presentation))
    }

    /// Number of tasks waiting behind the active one.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Whether a barrier task is waiting for an acknowledgement.
    pub fn is_awaiting_ack(&self) -> bool {
        !self.rendezvous.is_empty()
    }

    fn current_id(&self) -> Option<TaskId> {
        self.active.as_ref().map(|a| a.id)
    }

    /// Start queued tasks until one stays active or the queue runs dry.
    fn start_next(&mut self, now: Instant, out: &mut Vec<Transition>) {
        while self.active.is_none() {
            let Some((id, task)) = self.pending.pop_front() else {
                out.push(Transition::Idle);
                return;
            };
            debug!(%id, completion = ?task.completion, "task started");
            out.push(Transition::Started {
                id,
                presentation: task.presentation.clone(),
            });

            let deadline = match task.completion {
                Completion::Immediate => {
                    out.push(Transition::Finished { id });
                    continue;
                }
                Completion::After(duration) if duration.is_zero() => {
                    out.push(Transition::Finished { id });
                    continue;
                }
                Completion::After(duration) => Some(now + duration),
                Completion::UntilDismissed => None,
                Completion::UntilAck => {
                    self.rendezvous.on_next_ack(id);
                    None
                }
            };
            self.active = Some(ActiveTask {
                id,
                presentation: task.presentation,
                completion: task.completion,
                deadline,
            });
        }
    }
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

    fn status(text: &str) -> Presentation {
        Presentation::Status {
            text: Some(text.into()),
        }
    }

    fn started_ids(transitions: &[Transition]) -> Vec<TaskId> {
        transitions
            .iter()
            .filter_map(|t| match t {
                Transition::Started { id, .. } => Some(*id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn tasks_run_one_at_a_time_in_order() {
        let now = Instant::now();
        let mut queue = PresentationQueue::new();
        let mut ids = Vec::new();
        let mut started = Vec::new();

        for n in 0..5 {
            let (id, out) = queue.enqueue(
                PresentationTask::dismissable(status(&n.to_string())),
                now,
            );
            ids.push(id);
            started.extend(started_ids(&out));
        }
        // Only the first starts while the rest wait.
        assert_eq!(started, vec![ids[0]]);
        assert_eq!(queue.pending(), 4);

        for expected in ids.iter().skip(1) {
            let out = queue.advance(now);
            assert_eq!(started_ids(&out), vec![*expected]);
            assert_eq!(queue.state(), QueueState::Running(*expected));
        }

        let out = queue.advance(now);
        assert_eq!(
            out,
            vec![Transition::Finished { id: ids[4] }, Transition::Idle]
        );
        assert!(queue.is_idle());
    }

    #[test]
    fn immediate_tasks_chain_within_one_call() {
        let now = Instant::now();
        let mut queue = PresentationQueue::new();
        let (first, out) = queue.enqueue(PresentationTask::immediate(status("a")), now);
        assert_eq!(
            out,
            vec![
                Transition::Started {
                    id: first,
                    presentation: status("a"),
                },
                Transition::Finished { id: first },
                Transition::Idle,
            ]
        );
        assert!(queue.is_idle());
    }

    #[test]
    fn timed_tasks_finish_at_their_deadline() {
        let now = Instant::now();
        let mut queue = PresentationQueue::new();
        let (id, _) = queue.enqueue(
            PresentationTask::timed(status("tally"), Duration::from_millis(500)),
            now,
        );
        assert_eq!(queue.deadline(), Some(now + Duration::from_millis(500)));

        assert!(queue
            .poll_deadline(now + Duration::from_millis(499))
            .is_empty());
        let out = queue.poll_deadline(now + Duration::from_millis(500));
        assert_eq!(out, vec![Transition::Finished { id }, Transition::Idle]);
    }

    #[test]
    fn barrier_waits_for_ack() {
        let now = Instant::now();
        let mut queue = PresentationQueue::new();
        let (prompt, _) = queue.enqueue(PresentationTask::barrier(status("vote")), now);
        let (after, _) = queue.enqueue(PresentationTask::dismissable(status("next")), now);

        assert!(queue.is_awaiting_ack());
        assert!(queue.poll_deadline(now + Duration::from_secs(60)).is_empty());

        let out = queue.acknowledge(now);
        assert_eq!(out[0], Transition::Finished { id: prompt });
        assert_eq!(started_ids(&out), vec![after]);
        assert!(!queue.is_awaiting_ack());
    }

    #[test]
    fn ack_before_barrier_starts_is_not_banked() {
        let now = Instant::now();
        let mut queue = PresentationQueue::new();
        queue.enqueue(PresentationTask::dismissable(status("alert")), now);
        let (prompt, _) = queue.enqueue(PresentationTask::barrier(status("vote")), now);

        // Nobody is waiting yet.
        assert!(queue.acknowledge(now).is_empty());
        queue.advance(now);
        assert_eq!(queue.state(), QueueState::Running(prompt));
        assert!(queue.is_awaiting_ack());
    }

    #[test]
    fn clear_leaves_no_waiter_behind() {
        let now = Instant::now();
        let mut queue = PresentationQueue::new();
        let (prompt, _) = queue.enqueue(PresentationTask::barrier(status("vote")), now);
        queue.enqueue(PresentationTask::dismissable(status("later")), now);

        assert_eq!(queue.clear(), Some(prompt));
        assert!(queue.is_idle());
        assert_eq!(queue.pending(), 0);
        assert!(queue.acknowledge(now).is_empty());
        assert!(!queue.is_awaiting_ack());
    }

    #[test]
    fn dismiss_fades_then_advances() {
        let now = Instant::now();
        let fade = Duration::from_secs(1);
        let mut queue = PresentationQueue::new();
        let (alert, _) = queue.enqueue(PresentationTask::dismissable(status("alert")), now);

        assert!(queue.dismiss(alert, fade, now).is_empty());
        assert_eq!(queue.deadline(), Some(now + fade));
        let out = queue.poll_deadline(now + fade);
        assert_eq!(out, vec![Transition::Finished { id: alert }, Transition::Idle]);
    }

    #[test]
    fn dismissing_a_barrier_withdraws_its_wait() {
        let now = Instant::now();
        let mut queue = PresentationQueue::new();
        let (prompt, _) = queue.enqueue(PresentationTask::barrier(status("peek")), now);
        let (next, _) = queue.enqueue(PresentationTask::barrier(status("other")), now);

        let out = queue.dismiss(prompt, Duration::ZERO, now);
        assert_eq!(out[0], Transition::Finished { id: prompt });
        assert_eq!(queue.state(), QueueState::Running(next));
        // The next ack belongs to the new barrier only.
        let out = queue.acknowledge(now);
        assert_eq!(out[0], Transition::Finished { id: next });
    }

    #[test]
    fn stale_and_timed_dismissals_are_ignored() {
        let now = Instant::now();
        let mut queue = PresentationQueue::new();
        let (timed, _) = queue.enqueue(
            PresentationTask::timed(status("bar"), Duration::from_secs(2)),
            now,
        );
        assert!(queue.dismiss(timed, Duration::ZERO, now).is_empty());
        assert!(queue.dismiss(TaskId(99), Duration::ZERO, now).is_empty());
        assert_eq!(queue.state(), QueueState::Running(timed));
    }

    #[test]
    fn enqueue_during_a_task_appends() {
        let now = Instant::now();
        let mut queue = PresentationQueue::new();
        let (first, _) = queue.enqueue(PresentationTask::dismissable(status("1")), now);
        let (second, _) = queue.enqueue(PresentationTask::dismissable(status("2")), now);
        queue.advance(now);
        let (third, out) = queue.enqueue(PresentationTask::dismissable(status("3")), now);
        assert!(out.is_empty());
        assert_eq!(queue.state(), QueueState::Running(second));
        assert!(first < second && second < third);
    }
}
