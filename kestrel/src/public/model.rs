use crate::internal::cells::{InitialCells, LiveCells};
use crate::public::cell::{CellId, CellType, EventValue, Topic};
use crate::public::directive::{ActivityDirectiveId, SerializedActivity};
use crate::public::error::InstantiationError;
use crate::public::results::{RealDynamics, TopicRecord};
use crate::public::task::{TaskFactory, TaskStatus};
use crate::public::value::SerializedValue;
use hifitime::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A named view of the cells that gets recorded as a profile.
#[derive(Clone)]
pub enum Resource {
    Real(Arc<dyn Fn(&LiveCells) -> RealDynamics + Send + Sync>),
    Discrete(Arc<dyn Fn(&LiveCells) -> SerializedValue + Send + Sync>),
}

impl Resource {
    pub fn real(get: impl Fn(&LiveCells) -> RealDynamics + Send + Sync + 'static) -> Self {
        Resource::Real(Arc::new(get))
    }

    pub fn discrete<V: Into<SerializedValue>>(
        get: impl Fn(&LiveCells) -> V + Send + Sync + 'static,
    ) -> Self {
        Resource::Discrete(Arc::new(move |cells| get(cells).into()))
    }
}

/// How the duration of an activity type relates to its arguments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DurationType {
    /// The activity runs for exactly as long as the named duration argument.
    Controllable { parameter: String },
    /// Only simulation can tell.
    Uncontrollable,
    Fixed(Duration),
}

/// Typed access to the arguments of a serialized activity.
pub struct Parameters<'a> {
    activity: &'a SerializedActivity,
}

impl<'a> Parameters<'a> {
    pub fn new(activity: &'a SerializedActivity) -> Self {
        Self { activity }
    }

    pub fn activity(&self) -> &'a SerializedActivity {
        self.activity
    }

    fn missing(&self, argument: &str) -> InstantiationError {
        InstantiationError::MissingArgument {
            type_name: self.activity.type_name.clone(),
            argument: argument.to_string(),
        }
    }

    fn invalid(&self, argument: &str, expected: &str) -> InstantiationError {
        InstantiationError::InvalidArgument {
            type_name: self.activity.type_name.clone(),
            argument: argument.to_string(),
            reason: format!("expected {expected}"),
        }
    }

    fn lookup<T>(
        &self,
        argument: &str,
        expected: &str,
        convert: impl Fn(&SerializedValue) -> Option<T>,
    ) -> Result<Option<T>, InstantiationError> {
        match self.activity.arguments.get(argument) {
            None => Ok(None),
            Some(value) => convert(value)
                .map(Some)
                .ok_or_else(|| self.invalid(argument, expected)),
        }
    }

    pub fn real(&self, argument: &str) -> Result<f64, InstantiationError> {
        self.lookup(argument, "a number", SerializedValue::as_real)?
            .ok_or_else(|| self.missing(argument))
    }

    pub fn real_or(&self, argument: &str, default: f64) -> Result<f64, InstantiationError> {
        Ok(self
            .lookup(argument, "a number", SerializedValue::as_real)?
            .unwrap_or(default))
    }

    pub fn int_or(&self, argument: &str, default: i64) -> Result<i64, InstantiationError> {
        Ok(self
            .lookup(argument, "an integer", SerializedValue::as_int)?
            .unwrap_or(default))
    }

    pub fn string(&self, argument: &str) -> Result<String, InstantiationError> {
        self.lookup(argument, "a string", |v| v.as_str().map(str::to_string))?
            .ok_or_else(|| self.missing(argument))
    }

    pub fn string_or(&self, argument: &str, default: &str) -> Result<String, InstantiationError> {
        Ok(self
            .lookup(argument, "a string", |v| v.as_str().map(str::to_string))?
            .unwrap_or_else(|| default.to_string()))
    }

    pub fn duration(&self, argument: &str) -> Result<Duration, InstantiationError> {
        self.lookup(argument, "a duration", SerializedValue::as_duration)?
            .ok_or_else(|| self.missing(argument))
    }

    pub fn duration_or(
        &self,
        argument: &str,
        default: Duration,
    ) -> Result<Duration, InstantiationError> {
        Ok(self
            .lookup(argument, "a duration", SerializedValue::as_duration)?
            .unwrap_or(default))
    }
}

type Constructor =
    Arc<dyn Fn(&Parameters<'_>) -> Result<TaskFactory, InstantiationError> + Send + Sync>;

struct ActivityType {
    duration_type: DurationType,
    constructor: Constructor,
}

struct ModelInner {
    cells: InitialCells,
    resources: Vec<(String, Resource)>,
    daemons: Vec<Arc<dyn Fn() -> TaskFactory + Send + Sync>>,
    activity_types: BTreeMap<String, ActivityType>,
    activity_topic: Topic<ActivityDirectiveId>,
    topics: Vec<TopicRecord>,
}

/// Everything the engine needs to know about a mission: its cells, resources,
/// daemons, and activity types.
///
/// Cheap to clone. Every simulation run starts from a fresh copy of the initial cells.
#[derive(Clone)]
pub struct MissionModel(Arc<ModelInner>);

impl MissionModel {
    pub fn builder() -> MissionModelBuilder {
        MissionModelBuilder::new()
    }

    pub fn initial_cells(&self) -> LiveCells {
        LiveCells::new(&self.0.cells)
    }

    pub fn resources(&self) -> &[(String, Resource)] {
        &self.0.resources
    }

    /// A task that starts every daemon, each as its own task.
    pub fn daemon(&self) -> TaskFactory {
        let model = self.0.clone();
        TaskFactory::new(move |scheduler| {
            for daemon in &model.daemons {
                scheduler.spawn(daemon());
            }
            Ok(TaskStatus::done())
        })
    }

    /// Instantiates an activity. The resulting tasks report as a span of `activity`.
    pub fn task_factory(
        &self,
        activity: &SerializedActivity,
    ) -> Result<TaskFactory, InstantiationError> {
        let activity_type = self.0.activity_types.get(&activity.type_name).ok_or_else(|| {
            InstantiationError::UnknownType {
                type_name: activity.type_name.clone(),
            }
        })?;
        let factory = (activity_type.constructor)(&Parameters::new(activity))?;
        Ok(factory.with_span(activity.clone()))
    }

    pub fn directive_type(&self, type_name: &str) -> Option<&DurationType> {
        self.0
            .activity_types
            .get(type_name)
            .map(|t| &t.duration_type)
    }

    pub fn activity_type_names(&self) -> impl Iterator<Item = &str> {
        self.0.activity_types.keys().map(String::as_str)
    }

    pub fn activity_topic(&self) -> &Topic<ActivityDirectiveId> {
        &self.0.activity_topic
    }

    pub fn topics(&self) -> &[TopicRecord] {
        &self.0.topics
    }
}

pub struct MissionModelBuilder {
    cells: InitialCells,
    resources: Vec<(String, Resource)>,
    daemons: Vec<Arc<dyn Fn() -> TaskFactory + Send + Sync>>,
    activity_types: BTreeMap<String, ActivityType>,
    activity_topic: Topic<ActivityDirectiveId>,
    topics: Vec<TopicRecord>,
}

impl Default for MissionModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MissionModelBuilder {
    pub fn new() -> Self {
        let activity_topic = Topic::new("ActivityDirective.Start");
        Self {
            cells: InitialCells::new(),
            resources: vec![],
            daemons: vec![],
            activity_types: BTreeMap::new(),
            topics: vec![TopicRecord {
                id: activity_topic.id(),
                name: activity_topic.name().to_string(),
            }],
            activity_topic,
        }
    }

    pub fn topic<E: EventValue>(&mut self, name: &str) -> Topic<E> {
        let topic = Topic::new(name);
        self.topics.push(TopicRecord {
            id: topic.id(),
            name: name.to_string(),
        });
        topic
    }

    pub fn allocate<C: CellType>(
        &mut self,
        name: &str,
        cell_type: C,
        state: C::State,
        topic: &Topic<C::Event>,
    ) -> CellId<C::State> {
        self.cells.allocate(name, cell_type, state, topic)
    }

    pub fn resource(&mut self, name: &str, resource: Resource) -> &mut Self {
        self.resources.push((name.to_string(), resource));
        self
    }

    pub fn daemon(&mut self, daemon: impl Fn() -> TaskFactory + Send + Sync + 'static) -> &mut Self {
        self.daemons.push(Arc::new(daemon));
        self
    }

    pub fn activity_type(
        &mut self,
        name: &str,
        duration_type: DurationType,
        constructor: impl Fn(&Parameters<'_>) -> Result<TaskFactory, InstantiationError>
        + Send
        + Sync
        + 'static,
    ) -> &mut Self {
        self.activity_types.insert(
            name.to_string(),
            ActivityType {
                duration_type,
                constructor: Arc::new(constructor),
            },
        );
        self
    }

    pub fn build(self) -> MissionModel {
        MissionModel(Arc::new(ModelInner {
            cells: self.cells,
            resources: self.resources,
            daemons: self.daemons,
            activity_types: self.activity_types,
            activity_topic: self.activity_topic,
            topics: self.topics,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hifitime::TimeUnits;

    #[test]
    fn parameters_distinguish_missing_from_invalid() {
        let activity = SerializedActivity::new("Thing")
            .with_argument("size", 2)
            .with_argument("name", "x")
            .with_argument("length", 3.seconds());
        let parameters = Parameters::new(&activity);

        assert_eq!(Ok(2.0), parameters.real("size"));
        assert_eq!(Ok(5), parameters.int_or("count", 5));
        assert_eq!(Ok(3.seconds()), parameters.duration("length"));
        assert!(matches!(
            parameters.real("weight"),
            Err(InstantiationError::MissingArgument { .. })
        ));
        assert!(matches!(
            parameters.real("name"),
            Err(InstantiationError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn unknown_activity_types_fail_to_instantiate() {
        let model = MissionModel::builder().build();
        assert!(matches!(
            model.task_factory(&SerializedActivity::new("Nope")),
            Err(InstantiationError::UnknownType { .. })
        ));
    }

    #[test]
    fn factories_carry_their_activity() -> anyhow::Result<()> {
        let mut builder = MissionModel::builder();
        builder.activity_type("Wait", DurationType::Fixed(1.seconds()), |_| {
            Ok(TaskFactory::new(|_| Ok(TaskStatus::done())))
        });
        let model = builder.build();

        let activity = SerializedActivity::new("Wait");
        let factory = model.task_factory(&activity)?;
        assert_eq!(Some(&activity), factory.span());
        assert_eq!(
            Some(&DurationType::Fixed(1.seconds())),
            model.directive_type("Wait")
        );
        Ok(())
    }
}
