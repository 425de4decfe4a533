//! # Banananation
//!
//! The reference mission model. It doesn't model anything real; it exists to exercise every
//! corner of the engine and the scheduler with resources simple enough to check by hand.
//!
//! The mission keeps a bunch of bananas. `/fruit` and `/peel` count how much banana is left,
//! `/plant` counts the banana plants, `/flag` is a free-form status string, and `/producer`
//! is who grew them. A daemon watches `/peel` and raises the flag to `empty` once it runs out.
//!
//! See the [activities] module for the activity types.

pub mod activities;

use kestrel::{
    Accumulator, CellId, Counter, MissionModel, RealDynamics, Register, Resource,
    TaskFactory, TaskStatus, Topic,
};
use serde::{Deserialize, Serialize};

pub const FRUIT: &str = "/fruit";
pub const PEEL: &str = "/peel";
pub const PLANT: &str = "/plant";
pub const FLAG: &str = "/flag";
pub const PRODUCER: &str = "/producer";

/// Initial conditions of the mission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Configuration {
    pub initial_fruit: f64,
    pub initial_peel: f64,
    pub initial_plant_count: i64,
    pub initial_flag: String,
    pub initial_producer: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            initial_fruit: 4.0,
            initial_peel: 4.0,
            initial_plant_count: 200,
            initial_flag: "A".to_string(),
            initial_producer: "Chiquita".to_string(),
        }
    }
}

/// Handles to every topic and cell of the mission, shared by the activities.
#[derive(Clone, Debug)]
pub struct Mission {
    pub fruit_topic: Topic<f64>,
    pub peel_topic: Topic<f64>,
    pub plant_topic: Topic<i64>,
    pub flag_topic: Topic<String>,
    pub producer_topic: Topic<String>,
    pub fruit: CellId<RealDynamics>,
    pub peel: CellId<RealDynamics>,
    pub plant: CellId<i64>,
    pub flag: CellId<String>,
    pub producer: CellId<String>,
}

pub fn model() -> MissionModel {
    model_with(&Configuration::default())
}

pub fn model_with(config: &Configuration) -> MissionModel {
    let mut builder = MissionModel::builder();
    let fruit_topic = builder.topic::<f64>(FRUIT);
    let peel_topic = builder.topic::<f64>(PEEL);
    let plant_topic = builder.topic::<i64>(PLANT);
    let flag_topic = builder.topic::<String>(FLAG);
    let producer_topic = builder.topic::<String>(PRODUCER);

    let mission = Mission {
        fruit: builder.allocate(
            FRUIT,
            Accumulator,
            RealDynamics::constant(config.initial_fruit),
            &fruit_topic,
        ),
        peel: builder.allocate(
            PEEL,
            Accumulator,
            RealDynamics::constant(config.initial_peel),
            &peel_topic,
        ),
        plant: builder.allocate(PLANT, Counter, config.initial_plant_count, &plant_topic),
        flag: builder.allocate(
            FLAG,
            Register::<String>::default(),
            config.initial_flag.clone(),
            &flag_topic,
        ),
        producer: builder.allocate(
            PRODUCER,
            Register::<String>::default(),
            config.initial_producer.clone(),
            &producer_topic,
        ),
        fruit_topic,
        peel_topic,
        plant_topic,
        flag_topic,
        producer_topic,
    };

    let Mission {
        fruit,
        peel,
        plant,
        flag,
        producer,
        ..
    } = mission.clone();
    builder
        .resource(FRUIT, Resource::real(move |cells| *cells.get(fruit)))
        .resource(PEEL, Resource::real(move |cells| *cells.get(peel)))
        .resource(PLANT, Resource::discrete(move |cells| *cells.get(plant)))
        .resource(FLAG, Resource::discrete(move |cells| cells.get(flag).clone()))
        .resource(
            PRODUCER,
            Resource::discrete(move |cells| cells.get(producer).clone()),
        );

    let daemon_mission = mission.clone();
    builder.daemon(move || out_of_peel(&daemon_mission));

    activities::register(&mut builder, &mission);
    builder.build()
}

/// Raises the flag once the last of the peel is gone.
fn out_of_peel(mission: &Mission) -> TaskFactory {
    let peel = mission.peel;
    let flag_topic = mission.flag_topic.clone();
    TaskFactory::new(move |_| {
        Ok(TaskStatus::awaiting(
            move |cells| cells.get(peel).initial <= 0.0,
            move |s| {
                tracing::debug!(time = %s.now(), "out of peel");
                s.emit("empty".to_string(), &flag_topic);
                Ok(TaskStatus::done())
            },
        ))
    })
}
