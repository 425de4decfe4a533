use crate::activity::{ActivityType, SchedulingActivityDirective};
use crate::constraints::WindowsExpression;
use crate::global::GlobalConstraint;
use crate::goals::Goal;
use crate::time::PlanningHorizon;
use kestrel::MissionModel;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Everything one scheduling run starts from.
#[derive(Clone)]
pub struct Problem {
    model: MissionModel,
    horizon: PlanningHorizon,
    activity_types: BTreeMap<String, ActivityType>,
    goals: Vec<Goal>,
    initial_plan: Vec<SchedulingActivityDirective>,
    global_constraints: Vec<Arc<dyn GlobalConstraint>>,
}

impl Problem {
    pub fn new(model: MissionModel, horizon: PlanningHorizon) -> Self {
        let activity_types = model
            .activity_type_names()
            .filter_map(|name| {
                let duration_type = model.directive_type(name)?.clone();
                Some((
                    name.to_string(),
                    ActivityType {
                        name: name.to_string(),
                        duration_type,
                        state_constraint: None,
                    },
                ))
            })
            .collect();
        Self {
            model,
            horizon,
            activity_types,
            goals: vec![],
            initial_plan: vec![],
            global_constraints: vec![],
        }
    }

    pub fn model(&self) -> &MissionModel {
        &self.model
    }

    pub fn horizon(&self) -> &PlanningHorizon {
        &self.horizon
    }

    pub fn activity_type(&self, name: &str) -> Option<&ActivityType> {
        self.activity_types.get(name)
    }

    /// Restricts where activities of a type may be placed. Returns false for unknown types.
    pub fn set_state_constraint(&mut self, type_name: &str, constraint: WindowsExpression) -> bool {
        match self.activity_types.get_mut(type_name) {
            Some(activity_type) => {
                activity_type.state_constraint = Some(constraint);
                true
            }
            None => false,
        }
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn set_goals(&mut self, goals: Vec<Goal>) {
        self.goals = goals;
    }

    pub fn add_goal(&mut self, goal: Goal) {
        self.goals.push(goal);
    }

    pub fn initial_plan(&self) -> &[SchedulingActivityDirective] {
        &self.initial_plan
    }

    pub fn set_initial_plan(
        &mut self,
        activities: impl IntoIterator<Item = SchedulingActivityDirective>,
    ) {
        self.initial_plan = activities.into_iter().collect();
    }

    pub fn global_constraints(&self) -> &[Arc<dyn GlobalConstraint>] {
        &self.global_constraints
    }

    pub fn add_global_constraint(&mut self, constraint: impl GlobalConstraint + 'static) {
        self.global_constraints.push(Arc::new(constraint));
    }
}
