//! Serialized mutation pipeline: every race change is applied as
//! `load -> apply -> persist -> side effects -> publish` inside the group's
//! serializer, so observers only ever see fully written states.

use tracing::{debug, info, warn};

use crate::{
    dao::models::RaceEntity,
    error::ServiceError,
    services::broadcast,
    state::{
        SharedState,
        countdown::{CountdownProgress, CountdownTicket},
        race::{GroupId, Race, RaceId, RaceStatus, epoch_millis},
        state_machine::{self, Ignored, RaceCommand, RaceEffect},
    },
};

/// Result of a race command that went through the pipeline.
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    /// The race changed, was persisted and broadcast.
    Applied {
        /// Race after the command.
        race: Race,
        /// What changed.
        effect: RaceEffect,
    },
    /// The command did not apply; nothing was written or broadcast.
    Ignored {
        /// Unchanged race.
        race: Race,
        /// Why the command was ignored.
        reason: Ignored,
    },
}

impl CommandOutcome {
    /// Whether the command changed the race.
    pub fn is_applied(&self) -> bool {
        matches!(self, CommandOutcome::Applied { .. })
    }
}

/// Apply `command` to the active race of `group`, serialized behind every
/// command already submitted for that group.
pub async fn run_race_command(
    state: &SharedState,
    group: &GroupId,
    command: RaceCommand,
) -> Result<CommandOutcome, ServiceError> {
    let task_state = state.clone();
    let task_group = group.clone();
    state
        .serializer()
        .submit(group, move || async move {
            let race_id = task_state.registry().active(&task_group).ok_or_else(|| {
                ServiceError::NotFound(format!("group `{task_group}` has no active race"))
            })?;
            let race = load_race(&task_state, race_id).await?;
            commit(&task_state, race, command).await
        })
        .await
}

/// One countdown step for the race identified by `ticket`.
///
/// The step is a serialized command of its own; it stops without touching
/// the race once the countdown was replaced or the race left `Armed`.
pub async fn run_countdown_tick(state: &SharedState, ticket: CountdownTicket) -> CountdownProgress {
    let task_state = state.clone();
    let group = ticket.group.clone();
    let race_id = ticket.race_id;
    let result = state
        .serializer()
        .submit(&group, move || async move {
            if !task_state.countdowns().is_current(&ticket) {
                return Ok(CountdownProgress::Stale);
            }
            let race = load_race(&task_state, ticket.race_id).await?;
            if !matches!(race.status, RaceStatus::Armed { .. }) {
                return Ok(CountdownProgress::Stale);
            }
            match commit(&task_state, race, RaceCommand::CountdownTick).await? {
                CommandOutcome::Applied {
                    effect: RaceEffect::CountdownFinished { .. },
                    ..
                } => Ok(CountdownProgress::Finished),
                CommandOutcome::Applied { .. } => Ok(CountdownProgress::Continue),
                CommandOutcome::Ignored { .. } => Ok(CountdownProgress::Stale),
            }
        })
        .await;

    match result {
        Ok(progress) => progress,
        Err(ServiceError::Unavailable(err)) => {
            warn!(group = %group, race_id = %race_id, error = %err, "countdown tick not persisted; retrying next tick");
            CountdownProgress::Continue
        }
        Err(err) => {
            warn!(group = %group, race_id = %race_id, error = %err, "countdown tick failed; stopping countdown");
            CountdownProgress::Stale
        }
    }
}

/// Read one race from the store.
pub(crate) async fn load_race(state: &SharedState, race_id: RaceId) -> Result<Race, ServiceError> {
    state
        .store()
        .get(race_id)
        .await?
        .map(Race::from)
        .ok_or_else(|| ServiceError::NotFound(format!("race `{race_id}` not found")))
}

/// Write `race` through to the store.
pub(crate) async fn persist(state: &SharedState, race: &Race) -> Result<(), ServiceError> {
    state
        .store()
        .put(RaceEntity::from(race))
        .await
        .map_err(|err| {
            warn!(group = %race.group, race_id = %race.id, error = %err, "failed to persist race");
            ServiceError::from(err)
        })
}

async fn commit(
    state: &SharedState,
    mut race: Race,
    command: RaceCommand,
) -> Result<CommandOutcome, ServiceError> {
    match state_machine::apply(&mut race, &command, epoch_millis()) {
        Err(reason) => {
            debug!(
                group = %race.group,
                race_id = %race.id,
                command = command.name(),
                reason = %reason,
                "command ignored"
            );
            Ok(CommandOutcome::Ignored { race, reason })
        }
        Ok(effect) => {
            race.touch();
            persist(state, &race).await?;
            if let Some(displaced) = apply_side_effects(state, &race, &effect) {
                halt_displaced_countdown(state, displaced).await;
            }
            broadcast::publish_effect(state, &race, &effect);
            broadcast::publish_snapshot(state).await;
            Ok(CommandOutcome::Applied { race, effect })
        }
    }
}

/// Countdown and registry bookkeeping for `effect`. Returns the race whose
/// countdown was displaced by a newly armed one, if any.
fn apply_side_effects(state: &SharedState, race: &Race, effect: &RaceEffect) -> Option<RaceId> {
    match effect {
        RaceEffect::Armed { remaining_secs } => {
            let tick_state = state.clone();
            let armed = state
                .countdowns()
                .arm(race.group.clone(), race.id, move |ticket| {
                    let state = tick_state.clone();
                    async move { run_countdown_tick(&state, ticket).await }
                });
            info!(group = %race.group, race_id = %race.id, remaining_secs, "countdown armed");
            return armed.displaced;
        }
        RaceEffect::Paused {
            countdown_cancelled: true,
            ..
        } => {
            state.countdowns().cancel_race(&race.group, race.id);
        }
        RaceEffect::Ended { .. } => {
            state.countdowns().cancel_race(&race.group, race.id);
            state.registry().clear_if(&race.group, race.id);
            info!(group = %race.group, race_id = %race.id, "race ended");
        }
        RaceEffect::Started { .. } => {
            // Starting straight from `Armed` drops the countdown.
            state.countdowns().cancel_race(&race.group, race.id);
            info!(group = %race.group, race_id = %race.id, "race started");
        }
        RaceEffect::CountdownFinished { .. } => {
            info!(group = %race.group, race_id = %race.id, "race started");
        }
        _ => {}
    }
    None
}

/// Pause a race whose countdown was aborted by another race of the same group,
/// so it does not stay `Armed` with nothing ticking it.
async fn halt_displaced_countdown(state: &SharedState, race_id: RaceId) {
    let mut race = match load_race(state, race_id).await {
        Ok(race) => race,
        Err(err) => {
            warn!(race_id = %race_id, error = %err, "failed to load race with displaced countdown");
            return;
        }
    };
    if !matches!(race.status, RaceStatus::Armed { .. }) {
        return;
    }
    if state_machine::apply(&mut race, &RaceCommand::Pause, epoch_millis()).is_err() {
        return;
    }
    race.touch();
    if persist(state, &race).await.is_ok() {
        info!(group = %race.group, race_id = %race.id, "countdown displaced by another race; race paused");
    }
}
