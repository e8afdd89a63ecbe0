use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use tokio::{
    task::AbortHandle,
    time::{Instant, interval_at},
};
use tracing::debug;

use crate::state::race::{GroupId, RaceId};

/// Delay between two countdown steps.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Identity of one armed countdown, handed to every tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownTicket {
    /// Group owning the countdown.
    pub group: GroupId,
    /// Race being counted down.
    pub race_id: RaceId,
    /// Unique arm counter, so a re-armed group never honours stale ticks.
    pub generation: u64,
}

/// What a tick callback observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownProgress {
    /// Keep ticking.
    Continue,
    /// The countdown reached zero.
    Finished,
    /// The countdown no longer applies to the race.
    Stale,
}

/// Result of arming a countdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmOutcome {
    /// Identity of the new countdown.
    pub ticket: CountdownTicket,
    /// Another race of the group whose countdown was aborted to make room.
    pub displaced: Option<RaceId>,
}

struct ArmedCountdown {
    generation: u64,
    race_id: RaceId,
    handle: AbortHandle,
}

/// Owner of the per-group countdown timers. At most one countdown per group
/// is armed; arming replaces and aborts the previous one.
#[derive(Default)]
pub struct CountdownScheduler {
    armed: Arc<DashMap<GroupId, ArmedCountdown>>,
    generations: AtomicU64,
}

impl CountdownScheduler {
    /// Scheduler with nothing armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a countdown for `race_id` and call `on_tick` once per [`TICK_PERIOD`]
    /// until it reports [`CountdownProgress::Finished`] or
    /// [`CountdownProgress::Stale`], or the countdown gets cancelled.
    ///
    /// The previous countdown of the group is aborted. When it belonged to
    /// another race, that race is reported in [`ArmOutcome::displaced`] and
    /// the caller is responsible for moving it out of `Armed`.
    pub fn arm<F, Fut>(&self, group: GroupId, race_id: RaceId, mut on_tick: F) -> ArmOutcome
    where
        F: FnMut(CountdownTicket) -> Fut + Send + 'static,
        Fut: Future<Output = CountdownProgress> + Send + 'static,
    {
        let ticket = CountdownTicket {
            group: group.clone(),
            race_id,
            generation: self.generations.fetch_add(1, Ordering::Relaxed) + 1,
        };

        let armed = self.armed.clone();
        let task_ticket = ticket.clone();
        let task = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
            loop {
                ticks.tick().await;
                match on_tick(task_ticket.clone()).await {
                    CountdownProgress::Continue => continue,
                    progress => {
                        debug!(
                            group = %task_ticket.group,
                            race_id = %task_ticket.race_id,
                            ?progress,
                            "countdown stopped"
                        );
                        break;
                    }
                }
            }
            armed.remove_if(&task_ticket.group, |_, current| {
                current.generation == task_ticket.generation
            });
        });

        let previous = self.armed.insert(
            group,
            ArmedCountdown {
                generation: ticket.generation,
                race_id,
                handle: task.abort_handle(),
            },
        );
        let displaced = previous.and_then(|previous| {
            previous.handle.abort();
            debug!(
                group = %ticket.group,
                race_id = %previous.race_id,
                "replaced armed countdown"
            );
            (previous.race_id != race_id).then_some(previous.race_id)
        });

        ArmOutcome { ticket, displaced }
    }

    /// Whether `ticket` still identifies the armed countdown of its group.
    pub fn is_current(&self, ticket: &CountdownTicket) -> bool {
        self.armed
            .get(&ticket.group)
            .is_some_and(|armed| armed.generation == ticket.generation)
    }

    /// Race currently counted down for `group`.
    #[cfg(test)]
    pub fn armed_race(&self, group: &GroupId) -> Option<RaceId> {
        self.armed.get(group).map(|armed| armed.race_id)
    }

    /// Cancel the countdown of `group` if it belongs to `race_id`.
    pub fn cancel_race(&self, group: &GroupId, race_id: RaceId) -> bool {
        match self
            .armed
            .remove_if(group, |_, armed| armed.race_id == race_id)
        {
            Some((_, armed)) => {
                armed.handle.abort();
                debug!(group = %group, race_id = %race_id, "countdown cancelled");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use tokio::time::sleep;

    use super::*;

    fn counting(
        counter: Arc<AtomicU32>,
        finish_after: u32,
    ) -> impl FnMut(CountdownTicket) -> std::future::Ready<CountdownProgress> + Send + 'static {
        move |_ticket| {
            let seen = counter.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(if seen >= finish_after {
                CountdownProgress::Finished
            } else {
                CountdownProgress::Continue
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_second_until_finished() {
        let scheduler = CountdownScheduler::new();
        let group = GroupId::from("junior");
        let race_id = RaceId::new_v4();
        let counter = Arc::new(AtomicU32::new(0));

        let ticket = scheduler
            .arm(group.clone(), race_id, counting(counter.clone(), 3))
            .ticket;
        assert!(scheduler.is_current(&ticket));

        sleep(Duration::from_millis(1_500)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(!scheduler.is_current(&ticket));
        assert_eq!(scheduler.armed_race(&group), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_future_ticks() {
        let scheduler = CountdownScheduler::new();
        let group = GroupId::from("junior");
        let race_id = RaceId::new_v4();
        let counter = Arc::new(AtomicU32::new(0));

        scheduler.arm(group.clone(), race_id, counting(counter.clone(), 100));
        sleep(Duration::from_millis(2_500)).await;

        assert!(!scheduler.cancel_race(&group, RaceId::new_v4()));
        assert!(scheduler.cancel_race(&group, race_id));
        sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn arming_again_replaces_previous_countdown() {
        let scheduler = CountdownScheduler::new();
        let group = GroupId::from("senior");
        let first_counter = Arc::new(AtomicU32::new(0));
        let second_counter = Arc::new(AtomicU32::new(0));

        let first_race = RaceId::new_v4();
        let first = scheduler.arm(group.clone(), first_race, counting(first_counter.clone(), 100));
        assert_eq!(first.displaced, None);
        sleep(Duration::from_millis(1_500)).await;
        let second_race = RaceId::new_v4();
        let second = scheduler.arm(
            group.clone(),
            second_race,
            counting(second_counter.clone(), 100),
        );
        assert_eq!(second.displaced, Some(first_race));
        sleep(Duration::from_millis(3_200)).await;

        assert!(!scheduler.is_current(&first.ticket));
        assert!(scheduler.is_current(&second.ticket));
        assert_eq!(scheduler.armed_race(&group), Some(second_race));
        assert_eq!(first_counter.load(Ordering::SeqCst), 1);
        assert_eq!(second_counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_the_same_race_displaces_nothing() {
        let scheduler = CountdownScheduler::new();
        let group = GroupId::from("minis");
        let race_id = RaceId::new_v4();
        let first_counter = Arc::new(AtomicU32::new(0));
        let second_counter = Arc::new(AtomicU32::new(0));

        let first = scheduler.arm(group.clone(), race_id, counting(first_counter.clone(), 100));
        sleep(Duration::from_millis(1_500)).await;
        let second = scheduler.arm(group.clone(), race_id, counting(second_counter.clone(), 100));
        assert_eq!(second.displaced, None);

        sleep(Duration::from_millis(2_200)).await;
        assert!(!scheduler.is_current(&first.ticket));
        assert_eq!(first_counter.load(Ordering::SeqCst), 1);
        assert_eq!(second_counter.load(Ordering::SeqCst), 2);
    }
}
