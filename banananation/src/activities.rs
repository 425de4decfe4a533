//! The banananation activity types.
//!
//! | type                        | duration                         | effect                                   |
//! |-----------------------------|----------------------------------|------------------------------------------|
//! | `PeelBanana`                | instant                          | `/fruit` and `/peel` down by one          |
//! | `BiteBanana`                | instant                          | `/fruit` down by `biteSize`; big bites set `/flag` to `B` |
//! | `GrowBanana`                | controllable (`growingDuration`) | `/plant` up by `quantity` at the end      |
//! | `ChangeProducer`            | instant                          | sets `/producer`                          |
//! | `DurationParameterActivity` | uncontrollable                   | waits for `duration`                     |
//! | `OverrunActivity`           | controllable (`duration`)        | waits one second longer than it says     |
//! | `ParentActivity`            | uncontrollable                   | calls `ChildActivity` twice              |
//! | `ChildActivity`             | one second                       | nothing                                  |

use crate::Mission;
use kestrel::{
    Duration, DurationType, MissionModelBuilder, SerializedActivity, SerializedValue,
    TaskFactory, TaskStatus,
};
use hifitime::TimeUnits;
use std::collections::BTreeMap;

pub const PEEL_BANANA: &str = "PeelBanana";
pub const BITE_BANANA: &str = "BiteBanana";
pub const GROW_BANANA: &str = "GrowBanana";
pub const CHANGE_PRODUCER: &str = "ChangeProducer";
pub const DURATION_PARAMETER: &str = "DurationParameterActivity";
pub const OVERRUN: &str = "OverrunActivity";
pub const PARENT: &str = "ParentActivity";
pub const CHILD: &str = "ChildActivity";

/// How long `ChildActivity` runs for.
pub fn child_duration() -> Duration {
    1.seconds()
}

pub(crate) fn register(builder: &mut MissionModelBuilder, mission: &Mission) {
    let m = mission.clone();
    builder.activity_type(PEEL_BANANA, DurationType::Fixed(Duration::ZERO), move |p| {
        let direction = p.string_or("peelDirection", "fromStem")?;
        let m = m.clone();
        Ok(TaskFactory::new(move |s| {
            tracing::trace!(%direction, "peeling");
            s.emit(-1.0, &m.fruit_topic);
            s.emit(-1.0, &m.peel_topic);
            Ok(TaskStatus::done())
        }))
    });

    let m = mission.clone();
    builder.activity_type(BITE_BANANA, DurationType::Fixed(Duration::ZERO), move |p| {
        let bite_size = p.real_or("biteSize", 1.0)?;
        let m = m.clone();
        Ok(TaskFactory::new(move |s| {
            s.emit(-bite_size, &m.fruit_topic);
            if bite_size > 1.0 {
                s.emit("B".to_string(), &m.flag_topic);
            }
            Ok(TaskStatus::completed(BTreeMap::from([(
                "biteSizeWasBig".to_string(),
                SerializedValue::from(bite_size > 1.0),
            )])))
        }))
    });

    let m = mission.clone();
    builder.activity_type(
        GROW_BANANA,
        DurationType::Controllable {
            parameter: "growingDuration".to_string(),
        },
        move |p| {
            let quantity = p.int_or("quantity", 1)?;
            let growing = p.duration_or("growingDuration", 1.seconds())?;
            let m = m.clone();
            Ok(TaskFactory::new(move |_| {
                Ok(TaskStatus::delayed(growing, move |s| {
                    s.emit(quantity, &m.plant_topic);
                    Ok(TaskStatus::done())
                }))
            }))
        },
    );

    let m = mission.clone();
    builder.activity_type(CHANGE_PRODUCER, DurationType::Fixed(Duration::ZERO), move |p| {
        let producer = p.string_or("producer", "Dole")?;
        let m = m.clone();
        Ok(TaskFactory::new(move |s| {
            s.emit(producer, &m.producer_topic);
            Ok(TaskStatus::done())
        }))
    });

    builder.activity_type(DURATION_PARAMETER, DurationType::Uncontrollable, |p| {
        let duration = p.duration("duration")?;
        Ok(TaskFactory::new(move |_| {
            Ok(TaskStatus::delayed(duration, move |_| {
                Ok(TaskStatus::completed(BTreeMap::from([(
                    "duration".to_string(),
                    SerializedValue::from(duration),
                )])))
            }))
        }))
    });

    builder.activity_type(
        OVERRUN,
        DurationType::Controllable {
            parameter: "duration".to_string(),
        },
        |p| {
            let duration = p.duration("duration")?;
            Ok(wait(duration + 1.seconds()))
        },
    );

    builder.activity_type(PARENT, DurationType::Uncontrollable, |_| {
        Ok(TaskFactory::new(|_| {
            Ok(TaskStatus::calling(child(), |_, _| {
                Ok(TaskStatus::calling(child(), |_, _| Ok(TaskStatus::done())))
            }))
        }))
    });

    builder.activity_type(CHILD, DurationType::Fixed(child_duration()), |_| {
        Ok(wait(child_duration()))
    });
}

fn wait(duration: Duration) -> TaskFactory {
    TaskFactory::new(move |_| Ok(TaskStatus::delayed(duration, |_| Ok(TaskStatus::done()))))
}

fn child() -> TaskFactory {
    wait(child_duration()).with_span(SerializedActivity::new(CHILD))
}
