use crate::activity::SchedulingActivityDirective;
use crate::goals::GoalId;
use hifitime::Duration;
use kestrel::ActivityDirectiveId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How well one goal was satisfied, and which activities it claims.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalEvaluation {
    /// Zero when satisfied, negative otherwise.
    pub score: f64,
    /// Activity ids, mapped to whether the goal created them.
    activities: BTreeMap<ActivityDirectiveId, bool>,
    pub nb_conflicts_detected: Option<usize>,
}

impl GoalEvaluation {
    pub fn associate(&mut self, id: ActivityDirectiveId, created: bool) {
        self.activities.insert(id, created);
    }

    pub fn remove_association(&mut self, id: ActivityDirectiveId) {
        self.activities.remove(&id);
    }

    pub fn clear_associations(&mut self) {
        self.activities.clear();
    }

    pub fn is_associated(&self, id: ActivityDirectiveId) -> bool {
        self.activities.contains_key(&id)
    }

    /// Every activity the goal claims, with whether it created it.
    pub fn activities(&self) -> impl Iterator<Item = (ActivityDirectiveId, bool)> + '_ {
        self.activities.iter().map(|(id, created)| (*id, *created))
    }

    pub fn associated(&self) -> impl Iterator<Item = ActivityDirectiveId> + '_ {
        self.activities.keys().copied()
    }

    pub fn inserted(&self) -> impl Iterator<Item = ActivityDirectiveId> + '_ {
        self.activities
            .iter()
            .filter(|(_, created)| **created)
            .map(|(id, _)| *id)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    goals: BTreeMap<GoalId, GoalEvaluation>,
}

impl Evaluation {
    pub fn for_goal(&mut self, goal: GoalId) -> &mut GoalEvaluation {
        self.goals.entry(goal).or_default()
    }

    pub fn get(&self, goal: GoalId) -> Option<&GoalEvaluation> {
        self.goals.get(&goal)
    }

    pub fn is_associated(&self, goal: GoalId, id: ActivityDirectiveId) -> bool {
        self.get(goal).is_some_and(|e| e.is_associated(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (GoalId, &GoalEvaluation)> {
        self.goals.iter().map(|(id, evaluation)| (*id, evaluation))
    }

    /// Drops an activity from every goal that claims it.
    pub fn forget(&mut self, id: ActivityDirectiveId) {
        for evaluation in self.goals.values_mut() {
            evaluation.remove_association(id);
        }
    }
}

/// The activities of a plan, indexed by id and by start time, with their evaluation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Plan {
    by_id: BTreeMap<ActivityDirectiveId, SchedulingActivityDirective>,
    by_time: BTreeSet<(Duration, ActivityDirectiveId)>,
    pub evaluation: Evaluation,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, activity: SchedulingActivityDirective) {
        self.remove(activity.id);
        self.by_time.insert((activity.start_offset, activity.id));
        self.by_id.insert(activity.id, activity);
    }

    pub fn add_all(&mut self, activities: impl IntoIterator<Item = SchedulingActivityDirective>) {
        for activity in activities {
            self.add(activity);
        }
    }

    pub fn remove(&mut self, id: ActivityDirectiveId) -> Option<SchedulingActivityDirective> {
        let activity = self.by_id.remove(&id)?;
        self.by_time.remove(&(activity.start_offset, id));
        Some(activity)
    }

    /// Swaps `old` for `new`. Returns false if `old` isn't in the plan.
    pub fn replace(&mut self, old: ActivityDirectiveId, new: SchedulingActivityDirective) -> bool {
        if self.remove(old).is_none() {
            return false;
        }
        self.add(new);
        true
    }

    pub fn get(&self, id: ActivityDirectiveId) -> Option<&SchedulingActivityDirective> {
        self.by_id.get(&id)
    }

    pub fn contains(&self, id: ActivityDirectiveId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// In order of start time, ties by id.
    pub fn activities(&self) -> impl Iterator<Item = &SchedulingActivityDirective> {
        self.by_time.iter().filter_map(|(_, id)| self.by_id.get(id))
    }

    pub fn activities_of_type<'a>(
        &'a self,
        type_name: &'a str,
    ) -> impl Iterator<Item = &'a SchedulingActivityDirective> {
        self.activities().filter(move |a| a.type_name == type_name)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hifitime::TimeUnits;
    use kestrel::Arguments;

    #[test]
    fn activities_come_out_in_time_order() {
        let mut plan = Plan::new();
        let late = SchedulingActivityDirective::new("PeelBanana", 5.seconds(), Arguments::new());
        let early = SchedulingActivityDirective::new("PeelBanana", 1.seconds(), Arguments::new());
        plan.add_all([late.clone(), early.clone()]);

        assert_eq!(
            vec![early.id, late.id],
            plan.activities().map(|a| a.id).collect::<Vec<_>>()
        );

        let moved = late.placed_at(0.seconds());
        assert!(plan.replace(late.id, moved.clone()));
        assert_eq!(Some(&moved), plan.activities().next());
        assert_eq!(2, plan.len());
    }

    #[test]
    fn goal_evaluations_track_what_they_created() {
        let mut evaluation = Evaluation::default();
        let goal = GoalId(7);
        evaluation.for_goal(goal).associate(ActivityDirectiveId(1), true);
        evaluation.for_goal(goal).associate(ActivityDirectiveId(2), false);

        let claimed = evaluation.for_goal(goal);
        assert_eq!(vec![ActivityDirectiveId(1)], claimed.inserted().collect::<Vec<_>>());
        assert_eq!(2, claimed.associated().count());

        evaluation.forget(ActivityDirectiveId(1));
        assert!(!evaluation.is_associated(goal, ActivityDirectiveId(1)));
        assert!(evaluation.is_associated(goal, ActivityDirectiveId(2)));
    }
}
