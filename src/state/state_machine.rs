//! Pure race transitions. Every function here operates on an owned [`Race`]
//! and an explicit clock reading; persistence, countdown timers, and
//! broadcasting are layered on top by [`crate::state::transitions`].

use thiserror::Error;

use crate::state::race::{Race, RaceStatus, TimeValue, round_millis};

/// Commands that mutate the active race of a group.
#[derive(Debug, Clone, PartialEq)]
pub enum RaceCommand {
    /// Start a fresh race (optionally through a countdown), restart a running
    /// countdown, or resume a paused race.
    Start {
        /// Countdown length in seconds; `None` starts immediately.
        countdown_secs: Option<u32>,
    },
    /// Stop the clock, or abort a countdown in progress.
    Pause,
    /// Terminate the race permanently.
    End,
    /// Append a lap for a student. Without a time the elapsed race time is used.
    RegisterLap {
        /// Student name.
        student: String,
        /// Lap time in seconds.
        time: Option<f64>,
    },
    /// Mark a student as injured.
    Injure {
        /// Student name.
        student: String,
    },
    /// Overwrite the most recent lap of a student.
    EditLastLap {
        /// Student name.
        student: String,
        /// Replacement value.
        value: TimeValue,
    },
    /// Drop the most recent lap of a student.
    RemoveLastLap {
        /// Student name.
        student: String,
    },
    /// Move laps recorded under one name to another.
    Reassign {
        /// Name the laps are currently recorded under.
        old_student: String,
        /// Name receiving the laps.
        new_student: String,
        /// When set, only this value is given to `new_student`.
        new_time: Option<TimeValue>,
    },
    /// One countdown step, emitted by the countdown scheduler.
    CountdownTick,
}

impl RaceCommand {
    /// Stable command name used in logs and responses.
    pub fn name(&self) -> &'static str {
        match self {
            RaceCommand::Start { .. } => "start-race",
            RaceCommand::Pause => "pause-race",
            RaceCommand::End => "end-race",
            RaceCommand::RegisterLap { .. } => "register-lap",
            RaceCommand::Injure { .. } => "injure-student",
            RaceCommand::EditLastLap { .. } => "edit-time",
            RaceCommand::RemoveLastLap { .. } => "remove-lap",
            RaceCommand::Reassign { .. } => "reassign-student",
            RaceCommand::CountdownTick => "countdown-tick",
        }
    }
}

/// What an applied command changed.
#[derive(Debug, Clone, PartialEq)]
pub enum RaceEffect {
    /// Countdown armed.
    Armed {
        /// Countdown length.
        remaining_secs: u32,
    },
    /// Clock started from zero.
    Started {
        /// Start instant.
        started_at_ms: u64,
    },
    /// Clock resumed after a pause.
    Resumed {
        /// Start instant shifted by the paused offset.
        started_at_ms: u64,
    },
    /// Clock stopped.
    Paused {
        /// Elapsed race time.
        elapsed_ms: u64,
        /// Whether a countdown was aborted instead of a running clock.
        countdown_cancelled: bool,
    },
    /// Race terminated.
    Ended {
        /// Whether a countdown was aborted.
        countdown_cancelled: bool,
    },
    /// A lap (or injury) was appended.
    LapRegistered {
        /// Student name.
        student: String,
        /// Appended value.
        value: TimeValue,
    },
    /// The last lap was overwritten.
    LapEdited {
        /// Student name.
        student: String,
        /// New value.
        value: TimeValue,
    },
    /// The last lap was dropped.
    LapRemoved {
        /// Student name.
        student: String,
        /// Dropped value.
        value: TimeValue,
    },
    /// Laps moved between students.
    Reassigned {
        /// Previous owner (now removed).
        old_student: String,
        /// New owner.
        new_student: String,
        /// Single value given instead of the whole sequence, if any.
        new_time: Option<TimeValue>,
    },
    /// Countdown decremented.
    CountdownTicked {
        /// Seconds left.
        remaining_secs: u32,
    },
    /// Countdown reached zero and the clock started.
    CountdownFinished {
        /// Start instant.
        started_at_ms: u64,
    },
}

/// Reasons a command leaves the race untouched. None of these are failures:
/// the caller simply sees no state change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Ignored {
    /// The command does not apply to the current status.
    #[error("{command} cannot be applied while the race is {from}")]
    InvalidTransition {
        /// Status label at the time of the command.
        from: &'static str,
        /// Command name.
        command: &'static str,
    },
    /// The student already completed every lap.
    #[error("`{student}` already completed {laps} laps")]
    LapLimitReached {
        /// Student name.
        student: String,
        /// Lap target of the race.
        laps: u32,
    },
    /// The student is injured; nothing more is recorded for them.
    #[error("`{student}` is injured")]
    StudentInjured {
        /// Student name.
        student: String,
    },
    /// The student has no lap to edit, remove, or reassign.
    #[error("`{student}` has no recorded laps")]
    NoLaps {
        /// Student name.
        student: String,
    },
}

/// Apply `command` to `race` at clock reading `now_ms` (UNIX epoch milliseconds).
///
/// On `Err` the race is guaranteed to be unchanged.
pub fn apply(race: &mut Race, command: &RaceCommand, now_ms: u64) -> Result<RaceEffect, Ignored> {
    let from = race.status.label();
    let invalid = || Ignored::InvalidTransition {
        from,
        command: command.name(),
    };

    match command {
        RaceCommand::Start { countdown_secs } => match race.status {
            RaceStatus::Paused { elapsed_ms } => {
                let started_at_ms = now_ms.saturating_sub(elapsed_ms);
                race.status = RaceStatus::Running { started_at_ms };
                Ok(RaceEffect::Resumed { started_at_ms })
            }
            RaceStatus::Created | RaceStatus::Armed { .. } => match countdown_secs {
                Some(remaining_secs) if *remaining_secs > 0 => {
                    race.status = RaceStatus::Armed {
                        remaining_secs: *remaining_secs,
                    };
                    Ok(RaceEffect::Armed {
                        remaining_secs: *remaining_secs,
                    })
                }
                _ => {
                    race.status = RaceStatus::Running {
                        started_at_ms: now_ms,
                    };
                    Ok(RaceEffect::Started {
                        started_at_ms: now_ms,
                    })
                }
            },
            _ => Err(invalid()),
        },
        RaceCommand::Pause => match race.status {
            RaceStatus::Running { .. } => {
                let elapsed_ms = race.elapsed_ms(now_ms);
                race.status = RaceStatus::Paused { elapsed_ms };
                Ok(RaceEffect::Paused {
                    elapsed_ms,
                    countdown_cancelled: false,
                })
            }
            RaceStatus::Armed { .. } => {
                race.status = RaceStatus::Paused { elapsed_ms: 0 };
                Ok(RaceEffect::Paused {
                    elapsed_ms: 0,
                    countdown_cancelled: true,
                })
            }
            _ => Err(invalid()),
        },
        RaceCommand::End => match race.status {
            RaceStatus::Ended => Err(invalid()),
            previous => {
                race.status = RaceStatus::Ended;
                Ok(RaceEffect::Ended {
                    countdown_cancelled: matches!(previous, RaceStatus::Armed { .. }),
                })
            }
        },
        RaceCommand::RegisterLap { student, time } => {
            if !matches!(race.status, RaceStatus::Running { .. }) {
                return Err(invalid());
            }
            if race.is_injured(student) {
                return Err(Ignored::StudentInjured {
                    student: student.clone(),
                });
            }
            if race.laps_of(student).len() >= race.laps_required as usize {
                return Err(Ignored::LapLimitReached {
                    student: student.clone(),
                    laps: race.laps_required,
                });
            }
            let seconds = time.unwrap_or_else(|| {
                round_millis(race.elapsed_ms(now_ms) as f64 / 1000.0)
            });
            let value = TimeValue::Seconds(seconds);
            race.push_lap(student, value);
            Ok(RaceEffect::LapRegistered {
                student: student.clone(),
                value,
            })
        }
        RaceCommand::Injure { student } => {
            if !matches!(race.status, RaceStatus::Running { .. }) {
                return Err(invalid());
            }
            if race.is_injured(student) {
                return Err(Ignored::StudentInjured {
                    student: student.clone(),
                });
            }
            race.push_lap(student, TimeValue::Injured);
            Ok(RaceEffect::LapRegistered {
                student: student.clone(),
                value: TimeValue::Injured,
            })
        }
        RaceCommand::EditLastLap { student, value } => {
            if race.replace_last_lap(student, *value) {
                Ok(RaceEffect::LapEdited {
                    student: student.clone(),
                    value: *value,
                })
            } else {
                Err(Ignored::NoLaps {
                    student: student.clone(),
                })
            }
        }
        RaceCommand::RemoveLastLap { student } => {
            if !matches!(race.status, RaceStatus::Running { .. }) {
                return Err(invalid());
            }
            match race.pop_last_lap(student) {
                Some(value) => Ok(RaceEffect::LapRemoved {
                    student: student.clone(),
                    value,
                }),
                None => Err(Ignored::NoLaps {
                    student: student.clone(),
                }),
            }
        }
        RaceCommand::Reassign {
            old_student,
            new_student,
            new_time,
        } => {
            let Some(previous) = race.take_laps(old_student) else {
                return Err(Ignored::NoLaps {
                    student: old_student.clone(),
                });
            };
            match new_time {
                Some(value) => race.extend_laps(new_student, [*value]),
                None => race.extend_laps(new_student, previous),
            }
            Ok(RaceEffect::Reassigned {
                old_student: old_student.clone(),
                new_student: new_student.clone(),
                new_time: *new_time,
            })
        }
        RaceCommand::CountdownTick => match race.status {
            RaceStatus::Armed { remaining_secs } if remaining_secs > 1 => {
                race.status = RaceStatus::Armed {
                    remaining_secs: remaining_secs - 1,
                };
                Ok(RaceEffect::CountdownTicked {
                    remaining_secs: remaining_secs - 1,
                })
            }
            RaceStatus::Armed { .. } => {
                race.status = RaceStatus::Running {
                    started_at_ms: now_ms,
                };
                Ok(RaceEffect::CountdownFinished {
                    started_at_ms: now_ms,
                })
            }
            _ => Err(invalid()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::race::GroupId;

    const T0: u64 = 1_700_000_000_000;

    fn race(laps: u32) -> Race {
        Race::new(GroupId::from("junior"), "100m".into(), laps)
    }

    fn running(laps: u32) -> Race {
        let mut race = race(laps);
        apply(
            &mut race,
            &RaceCommand::Start {
                countdown_secs: None,
            },
            T0,
        )
        .unwrap();
        race
    }

    fn lap(student: &str, time: f64) -> RaceCommand {
        RaceCommand::RegisterLap {
            student: student.into(),
            time: Some(time),
        }
    }

    #[test]
    fn scenario_extra_lap_is_ignored() {
        let mut race = running(3);
        for time in [12.5, 11.9, 12.1] {
            apply(&mut race, &lap("Alice", time), T0).unwrap();
        }

        let before = race.clone();
        let err = apply(&mut race, &lap("Alice", 9.0), T0).unwrap_err();
        assert_eq!(
            err,
            Ignored::LapLimitReached {
                student: "Alice".into(),
                laps: 3
            }
        );
        assert_eq!(race, before);
        assert_eq!(race.final_times()["Alice"], TimeValue::Seconds(36.5));
    }

    #[test]
    fn scenario_injury_blocks_further_laps() {
        let mut race = running(3);
        apply(
            &mut race,
            &RaceCommand::Injure {
                student: "Bob".into(),
            },
            T0,
        )
        .unwrap();

        assert_eq!(race.laps_of("Bob"), &[TimeValue::Injured]);
        assert_eq!(race.final_times()["Bob"], TimeValue::Injured);
        assert!(matches!(
            apply(&mut race, &lap("Bob", 5.0), T0),
            Err(Ignored::StudentInjured { .. })
        ));
        assert_eq!(race.laps_of("Bob").len(), 1);
    }

    #[test]
    fn injury_bypasses_lap_limit() {
        let mut race = running(1);
        apply(&mut race, &lap("Bob", 40.0), T0).unwrap();
        apply(
            &mut race,
            &RaceCommand::Injure {
                student: "Bob".into(),
            },
            T0,
        )
        .unwrap();
        assert_eq!(race.laps_of("Bob").len(), 2);
        assert_eq!(race.final_times()["Bob"], TimeValue::Injured);
    }

    #[test]
    fn scenario_reassign_moves_whole_sequence() {
        let mut race = running(3);
        apply(&mut race, &lap("Carol", 10.0), T0).unwrap();
        apply(&mut race, &lap("Carol", 11.0), T0).unwrap();

        apply(
            &mut race,
            &RaceCommand::Reassign {
                old_student: "Carol".into(),
                new_student: "Dana".into(),
                new_time: None,
            },
            T0,
        )
        .unwrap();

        assert!(!race.recorded_times().contains_key("Carol"));
        assert!(!race.final_times().contains_key("Carol"));
        assert_eq!(
            race.laps_of("Dana"),
            &[TimeValue::Seconds(10.0), TimeValue::Seconds(11.0)]
        );
        assert_eq!(race.final_times()["Dana"], TimeValue::Seconds(21.0));
    }

    #[test]
    fn reassign_to_the_same_student_replaces_their_laps() {
        let mut race = running(3);
        apply(&mut race, &lap("Carol", 10.0), T0).unwrap();
        apply(&mut race, &lap("Carol", 11.0), T0).unwrap();

        apply(
            &mut race,
            &RaceCommand::Reassign {
                old_student: "Carol".into(),
                new_student: "Carol".into(),
                new_time: Some(TimeValue::Seconds(30.5)),
            },
            T0,
        )
        .unwrap();

        assert_eq!(race.laps_of("Carol"), &[TimeValue::Seconds(30.5)]);
        assert_eq!(race.final_times()["Carol"], TimeValue::Seconds(30.5));
    }

    #[test]
    fn reassign_with_new_time_appends_single_value() {
        let mut race = running(3);
        apply(&mut race, &lap("Carol", 10.0), T0).unwrap();
        apply(&mut race, &lap("Dana", 9.0), T0).unwrap();
        apply(&mut race, &RaceCommand::End, T0).unwrap();

        apply(
            &mut race,
            &RaceCommand::Reassign {
                old_student: "Carol".into(),
                new_student: "Dana".into(),
                new_time: Some(TimeValue::Seconds(12.0)),
            },
            T0,
        )
        .unwrap();

        assert_eq!(
            race.laps_of("Dana"),
            &[TimeValue::Seconds(9.0), TimeValue::Seconds(12.0)]
        );
        assert_eq!(race.final_times()["Dana"], TimeValue::Seconds(21.0));
    }

    #[test]
    fn reassign_unknown_student_is_ignored() {
        let mut race = running(3);
        assert!(matches!(
            apply(
                &mut race,
                &RaceCommand::Reassign {
                    old_student: "Nobody".into(),
                    new_student: "Dana".into(),
                    new_time: None,
                },
                T0,
            ),
            Err(Ignored::NoLaps { .. })
        ));
        assert!(race.recorded_times().is_empty());
    }

    #[test]
    fn pause_then_resume_preserves_elapsed_time() {
        let mut race = running(3);
        let effect = apply(&mut race, &RaceCommand::Pause, T0 + 42_000).unwrap();
        assert_eq!(
            effect,
            RaceEffect::Paused {
                elapsed_ms: 42_000,
                countdown_cancelled: false
            }
        );

        let resume_at = T0 + 100_000;
        let effect = apply(
            &mut race,
            &RaceCommand::Start {
                countdown_secs: Some(120),
            },
            resume_at,
        )
        .unwrap();
        let RaceEffect::Resumed { started_at_ms } = effect else {
            panic!("expected resume, got {effect:?}");
        };
        assert_eq!(resume_at - started_at_ms, 42_000);
        assert_eq!(race.elapsed_ms(resume_at), 42_000);
    }

    #[test]
    fn register_lap_without_time_uses_elapsed_clock() {
        let mut race = running(2);
        apply(
            &mut race,
            &RaceCommand::RegisterLap {
                student: "Eve".into(),
                time: None,
            },
            T0 + 61_234,
        )
        .unwrap();
        assert_eq!(race.laps_of("Eve"), &[TimeValue::Seconds(61.234)]);
    }

    #[test]
    fn laps_require_running_clock() {
        let mut race = race(3);
        assert!(matches!(
            apply(&mut race, &lap("Alice", 1.0), T0),
            Err(Ignored::InvalidTransition {
                from: "created",
                command: "register-lap"
            })
        ));

        let mut race = running(3);
        apply(&mut race, &lap("Alice", 1.0), T0).unwrap();
        apply(&mut race, &RaceCommand::Pause, T0 + 1).unwrap();
        assert!(
            apply(
                &mut race,
                &RaceCommand::RemoveLastLap {
                    student: "Alice".into()
                },
                T0 + 2
            )
            .is_err()
        );
        assert_eq!(race.laps_of("Alice").len(), 1);
    }

    #[test]
    fn edit_last_lap_works_after_end() {
        let mut race = running(3);
        apply(&mut race, &lap("Alice", 10.0), T0).unwrap();
        apply(&mut race, &lap("Alice", 11.0), T0).unwrap();
        apply(&mut race, &RaceCommand::End, T0).unwrap();

        apply(
            &mut race,
            &RaceCommand::EditLastLap {
                student: "Alice".into(),
                value: TimeValue::Seconds(10.5),
            },
            T0,
        )
        .unwrap();
        assert_eq!(race.final_times()["Alice"], TimeValue::Seconds(20.5));

        assert!(matches!(
            apply(
                &mut race,
                &RaceCommand::EditLastLap {
                    student: "Ghost".into(),
                    value: TimeValue::Seconds(1.0),
                },
                T0,
            ),
            Err(Ignored::NoLaps { .. })
        ));
    }

    #[test]
    fn end_is_terminal() {
        let mut race = running(3);
        apply(&mut race, &RaceCommand::End, T0).unwrap();
        let ended = race.clone();

        for command in [
            RaceCommand::Start {
                countdown_secs: None,
            },
            RaceCommand::Pause,
            RaceCommand::End,
            lap("Alice", 3.0),
            RaceCommand::Injure {
                student: "Alice".into(),
            },
            RaceCommand::RemoveLastLap {
                student: "Alice".into(),
            },
            RaceCommand::CountdownTick,
        ] {
            assert!(apply(&mut race, &command, T0).is_err(), "{command:?}");
        }
        assert_eq!(race, ended);
    }

    #[test]
    fn countdown_ticks_down_then_starts() {
        let mut race = race(3);
        assert_eq!(
            apply(
                &mut race,
                &RaceCommand::Start {
                    countdown_secs: Some(3)
                },
                T0
            ),
            Ok(RaceEffect::Armed { remaining_secs: 3 })
        );
        assert_eq!(
            apply(&mut race, &RaceCommand::CountdownTick, T0 + 1_000),
            Ok(RaceEffect::CountdownTicked { remaining_secs: 2 })
        );
        assert_eq!(
            apply(&mut race, &RaceCommand::CountdownTick, T0 + 2_000),
            Ok(RaceEffect::CountdownTicked { remaining_secs: 1 })
        );
        assert_eq!(
            apply(&mut race, &RaceCommand::CountdownTick, T0 + 3_000),
            Ok(RaceEffect::CountdownFinished {
                started_at_ms: T0 + 3_000
            })
        );
        assert_eq!(
            race.status,
            RaceStatus::Running {
                started_at_ms: T0 + 3_000
            }
        );
    }

    #[test]
    fn pausing_a_countdown_cancels_it() {
        let mut race = race(3);
        apply(
            &mut race,
            &RaceCommand::Start {
                countdown_secs: Some(120),
            },
            T0,
        )
        .unwrap();
        for _ in 0..5 {
            apply(&mut race, &RaceCommand::CountdownTick, T0).unwrap();
        }
        assert_eq!(race.status, RaceStatus::Armed { remaining_secs: 115 });

        let effect = apply(&mut race, &RaceCommand::Pause, T0 + 5_000).unwrap();
        assert_eq!(
            effect,
            RaceEffect::Paused {
                elapsed_ms: 0,
                countdown_cancelled: true
            }
        );
        assert!(apply(&mut race, &RaceCommand::CountdownTick, T0 + 6_000).is_err());
        assert_eq!(race.status, RaceStatus::Paused { elapsed_ms: 0 });
    }

    #[test]
    fn start_does_not_restart_a_running_clock() {
        let mut race = running(3);
        let before = race.status;
        assert!(
            apply(
                &mut race,
                &RaceCommand::Start {
                    countdown_secs: None
                },
                T0 + 9_000
            )
            .is_err()
        );
        assert_eq!(race.status, before);
    }

    #[test]
    fn start_while_armed_rearms_the_countdown() {
        let mut race = race(3);
        apply(
            &mut race,
            &RaceCommand::Start {
                countdown_secs: Some(10),
            },
            T0,
        )
        .unwrap();
        apply(&mut race, &RaceCommand::CountdownTick, T0 + 1_000).unwrap();
        assert_eq!(race.status, RaceStatus::Armed { remaining_secs: 9 });

        assert_eq!(
            apply(
                &mut race,
                &RaceCommand::Start {
                    countdown_secs: Some(10)
                },
                T0 + 2_000
            ),
            Ok(RaceEffect::Armed { remaining_secs: 10 })
        );
        assert_eq!(race.status, RaceStatus::Armed { remaining_secs: 10 });

        assert_eq!(
            apply(
                &mut race,
                &RaceCommand::Start {
                    countdown_secs: None
                },
                T0 + 3_000
            ),
            Ok(RaceEffect::Started {
                started_at_ms: T0 + 3_000
            })
        );
    }
}
