#![allow(dead_code)]

use hifitime::TimeUnits;
use kestrel::*;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// A small model with one cell of each builtin kind.
///
/// - `/count`: a [Counter], incremented by `Increment`.
/// - `/mode`: a string [Register], written by `SetMode` and read by `ReadMode`.
/// - `/level`: an [Accumulator], drained by `Drain`.
pub static MODEL: Lazy<MissionModel> = Lazy::new(counter_model);

pub fn counter_model() -> MissionModel {
    let mut builder = MissionModel::builder();
    let count_topic = builder.topic::<i64>("/count");
    let mode_topic = builder.topic::<String>("/mode");
    let level_topic = builder.topic::<f64>("/level");

    let count = builder.allocate("/count", Counter, 0, &count_topic);
    let mode = builder.allocate("/mode", Register::<String>::default(), "idle".to_string(), &mode_topic);
    let level = builder.allocate(
        "/level",
        Accumulator,
        RealDynamics::constant(10.0),
        &level_topic,
    );

    builder
        .resource("/count", Resource::discrete(move |cells| *cells.get(count)))
        .resource("/mode", Resource::discrete(move |cells| cells.get(mode).clone()))
        .resource("/level", Resource::real(move |cells| *cells.get(level)));

    let topic = mode_topic.clone();
    builder.daemon(move || {
        let topic = topic.clone();
        TaskFactory::new(move |_| {
            Ok(TaskStatus::awaiting(
                move |cells| *cells.get(count) >= 10,
                move |s| {
                    s.emit("full".to_string(), &topic);
                    Ok(TaskStatus::done())
                },
            ))
        })
    });

    let topic = count_topic.clone();
    builder.activity_type("Increment", DurationType::Fixed(Duration::ZERO), move |p| {
        let amount = p.int_or("amount", 1)?;
        let topic = topic.clone();
        Ok(TaskFactory::new(move |s| {
            s.emit(amount, &topic);
            Ok(TaskStatus::done())
        }))
    });

    let topic = mode_topic.clone();
    builder.activity_type("SetMode", DurationType::Fixed(Duration::ZERO), move |p| {
        let new_mode = p.string("mode")?;
        let topic = topic.clone();
        Ok(TaskFactory::new(move |s| {
            s.emit(new_mode, &topic);
            Ok(TaskStatus::done())
        }))
    });

    builder.activity_type("ReadMode", DurationType::Fixed(Duration::ZERO), move |_| {
        Ok(TaskFactory::new(move |s| {
            Ok(TaskStatus::completed(s.get(mode)))
        }))
    });

    let topic = level_topic.clone();
    builder.activity_type("Drain", DurationType::Fixed(Duration::ZERO), move |p| {
        let amount = p.real_or("amount", 1.0)?;
        let topic = topic.clone();
        Ok(TaskFactory::new(move |s| {
            s.emit(-amount, &topic);
            Ok(TaskStatus::done())
        }))
    });

    builder.activity_type(
        "Wait",
        DurationType::Controllable {
            parameter: "duration".to_string(),
        },
        |p| {
            let duration = p.duration("duration")?;
            Ok(wait(duration))
        },
    );

    builder.activity_type("Parent", DurationType::Uncontrollable, |_| {
        Ok(TaskFactory::new(|_| {
            Ok(TaskStatus::calling(wait_activity(1.seconds()), |_, _| {
                Ok(TaskStatus::calling(wait_activity(1.seconds()), |_, _| {
                    Ok(TaskStatus::done())
                }))
            }))
        }))
    });

    let topic = count_topic.clone();
    builder.activity_type("Spawner", DurationType::Fixed(Duration::ZERO), move |_| {
        let topic = topic.clone();
        Ok(TaskFactory::new(move |s| {
            let topic = topic.clone();
            s.spawn(TaskFactory::activity(
                SerializedActivity::new("Increment"),
                move |s| {
                    s.emit(1, &topic);
                    Ok(TaskStatus::done())
                },
            ));
            Ok(TaskStatus::done())
        }))
    });

    let topic = mode_topic.clone();
    builder.activity_type("WaitForCount", DurationType::Uncontrollable, move |p| {
        let target = p.int_or("target", 1)?;
        let topic = topic.clone();
        Ok(TaskFactory::new(move |_| {
            Ok(TaskStatus::awaiting(
                move |cells| *cells.get(count) >= target,
                move |s| {
                    s.emit("reached".to_string(), &topic);
                    Ok(TaskStatus::done())
                },
            ))
        }))
    });

    builder.activity_type("Fail", DurationType::Uncontrollable, |_| {
        Ok(TaskFactory::new(|_| bail!("the activity broke")))
    });

    builder.activity_type("Rewind", DurationType::Uncontrollable, |_| {
        Ok(TaskFactory::new(|_| {
            Ok(TaskStatus::delayed((-1).seconds(), |_| Ok(TaskStatus::done())))
        }))
    });

    builder.build()
}

fn wait(duration: Duration) -> TaskFactory {
    TaskFactory::new(move |_| Ok(TaskStatus::delayed(duration, |_| Ok(TaskStatus::done()))))
}

fn wait_activity(duration: Duration) -> TaskFactory {
    wait(duration).with_span(SerializedActivity::new("Wait").with_argument("duration", duration))
}

pub fn plan_start() -> Time {
    Time::from_gregorian_utc_at_midnight(2030, 1, 1)
}

pub fn activity(type_name: &str) -> SerializedActivity {
    SerializedActivity::new(type_name)
}

pub fn at(offset: Duration, activity: SerializedActivity) -> ActivityDirective {
    ActivityDirective::new(offset, activity)
}

pub fn schedule(directives: impl IntoIterator<Item = ActivityDirective>) -> Schedule {
    directives
        .into_iter()
        .enumerate()
        .map(|(i, d)| (ActivityDirectiveId(i as u64 + 1), d))
        .collect::<BTreeMap<_, _>>()
}

/// Simulates `schedule` over a plan that starts with the simulation and lasts `duration`.
pub fn run(schedule: &Schedule, duration: Duration) -> Result<SimulationResults, SimulationError> {
    simulate(&MODEL, schedule, plan_start(), duration, plan_start(), duration)
}
