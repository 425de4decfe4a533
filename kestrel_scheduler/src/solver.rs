//! The greedy priority solver.
//!
//! Goals are taken one at a time, highest priority first, and each is satisfied as well
//! as it can be before the next one is looked at. There is no backtracking across
//! goals: once a goal is done, its insertions stay unless a composite goal above it
//! rolls them back.
//!
//! For a simple goal the loop is:
//!
//! 1. simulate the plan as it stands and ask the goal for its conflicts,
//! 2. for each conflict, find where a new activity could go (the conflict's temporal
//!    context, narrowed by the goal's resource constraints, the activity type's state
//!    constraint and the global constraints), make one, simulate it, and keep it only
//!    if it ran for exactly as long as expected,
//! 3. or, for conflicts that an existing activity already satisfies, associate that
//!    activity with the goal,
//! 4. and go again until a pass makes no progress.

use crate::activity::SchedulingActivityDirective;
use crate::config::SchedulerConfig;
use crate::conflicts::Conflict;
use crate::constraints::{EvaluationEnvironment, WindowsExpression};
use crate::error::{SimulationException, SolverError};
use crate::facade::SimulationFacade;
use crate::goals::{Goal, GoalKind, Optimizer};
use crate::plan::{Evaluation, Plan};
use crate::problem::Problem;
use crate::time::Interval;
use crate::windows::Windows;
use kestrel::ActivityDirectiveId;
use std::collections::BTreeSet;
use std::slice;
use tracing::{debug, info, warn};

pub struct PrioritySolver {
    problem: Problem,
    config: SchedulerConfig,
    solved: bool,
}

impl PrioritySolver {
    pub fn new(problem: Problem) -> Self {
        Self::with_config(problem, SchedulerConfig::default())
    }

    pub fn with_config(problem: Problem, config: SchedulerConfig) -> Self {
        Self {
            problem,
            config,
            solved: false,
        }
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    /// Schedules the problem. There is only one solution; later calls return `None`.
    ///
    /// Also `None` if the initial plan can't be simulated.
    pub fn next_solution(&mut self) -> Result<Option<Plan>, SolverError> {
        if self.solved {
            return Ok(None);
        }
        self.solved = true;

        let mut state = SolverState::new(&self.problem, &self.config);
        if let Err(error) = initialize_plan(&mut state) {
            warn!(%error, "could not initialize the plan");
            return Ok(None);
        }
        solve(&mut state)?;
        Ok(Some(state.plan))
    }
}

struct SolverState<'a> {
    problem: &'a Problem,
    config: &'a SchedulerConfig,
    plan: Plan,
    facade: SimulationFacade,
    /// Activities spawned in simulation, with the plan activity that spawned them.
    generated: Vec<(SchedulingActivityDirective, ActivityDirectiveId)>,
    check_sim_before_inserting: bool,
    check_sim_before_evaluating: bool,
    generated_counter: u64,
}

impl<'a> SolverState<'a> {
    fn new(problem: &'a Problem, config: &'a SchedulerConfig) -> Self {
        Self {
            problem,
            config,
            plan: Plan::new(),
            facade: SimulationFacade::new(problem.model().clone(), *problem.horizon()),
            generated: vec![],
            check_sim_before_inserting: config.check_simulation_before_inserting,
            check_sim_before_evaluating: true,
            generated_counter: 0,
        }
    }

    fn score(&mut self, goal: &Goal) -> f64 {
        self.plan.evaluation.for_goal(goal.id).score
    }

    fn set_score(&mut self, goal: &Goal, score: f64) {
        self.plan.evaluation.for_goal(goal.id).score = score;
    }
}

fn initialize_plan(state: &mut SolverState) -> Result<(), SolverError> {
    let horizon = *state.problem.horizon();
    let check_sim = state.check_sim_before_inserting;
    state.check_sim_before_inserting = false;

    let mut initial: Vec<_> = state
        .problem
        .initial_plan()
        .iter()
        .filter(|a| horizon.interval().contains(a.start_offset))
        .cloned()
        .collect();
    initial.sort_by_key(|a| (a.start_offset, a.id));
    for activity in initial {
        if !check_and_insert_acts(state, slice::from_ref(&activity))? {
            warn!(id = %activity.id, "initial activity does not fit in the horizon");
        }
    }

    state.check_sim_before_inserting = check_sim;
    state.plan.evaluation = Evaluation::default();

    let roots: Vec<_> = state
        .plan
        .activities()
        .filter(|a| a.top_parent.is_none())
        .cloned()
        .collect();
    state.facade.simulate_activities(&roots)?;
    let children = state.facade.get_all_child_activities(horizon.end_offset())?;
    process_new_generated_activities(state, children);
    pull_activity_durations_if_necessary(state)?;
    debug!(activities = state.plan.len(), "initialized plan");
    Ok(())
}

fn solve(state: &mut SolverState) -> Result<(), SolverError> {
    let problem = state.problem;
    let mut goals: Vec<&Goal> = problem.goals().iter().collect();
    goals.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
    for goal in goals {
        satisfy_goal(state, goal)?;
        let score = state.score(goal);
        info!(goal = %goal.name, id = %goal.id, score, "goal processed");
    }
    Ok(())
}

fn satisfy_goal(state: &mut SolverState, goal: &Goal) -> Result<(), SolverError> {
    let check_sim = state.check_sim_before_inserting;
    state.check_sim_before_inserting = check_sim && goal.simulate_after;
    let outcome = match &goal.kind {
        GoalKind::And(subgoals) => satisfy_composite_goal(state, goal, subgoals),
        GoalKind::Or {
            subgoals,
            optimizer: Some(optimizer),
        } => satisfy_option_goal_with_optimizer(state, goal, subgoals, *optimizer),
        GoalKind::Or {
            subgoals,
            optimizer: None,
        } => satisfy_option_goal(state, goal, subgoals),
        GoalKind::Recurrence(_)
        | GoalKind::Coexistence(_)
        | GoalKind::Cardinality(_)
        | GoalKind::Procedural(_)
        | GoalKind::Conditional { .. } => satisfy_goal_general(state, goal),
    };
    state.check_sim_before_evaluating = goal.simulate_after;
    state.check_sim_before_inserting = check_sim;
    outcome
}

/// Copies a subgoal's claims onto its parent.
fn aggregate(state: &mut SolverState, parent: &Goal, subgoal: &Goal) {
    let claims: Vec<_> = state
        .plan
        .evaluation
        .for_goal(subgoal.id)
        .activities()
        .collect();
    let evaluation = state.plan.evaluation.for_goal(parent.id);
    for (id, created) in claims {
        evaluation.associate(id, created);
    }
}

fn satisfy_composite_goal(
    state: &mut SolverState,
    goal: &Goal,
    subgoals: &[Goal],
) -> Result<(), SolverError> {
    let mut satisfied = 0;
    for subgoal in subgoals {
        satisfy_goal(state, subgoal)?;
        if state.score(subgoal) == 0.0 {
            satisfied += 1;
        }
    }

    if satisfied == subgoals.len() {
        for subgoal in subgoals {
            aggregate(state, goal, subgoal);
        }
        state.set_score(goal, 0.0);
    } else {
        if goal.should_rollback_if_unsatisfied {
            for subgoal in subgoals {
                rollback(state, subgoal)?;
            }
        }
        state.set_score(goal, -1.0);
    }
    Ok(())
}

fn satisfy_option_goal(
    state: &mut SolverState,
    goal: &Goal,
    subgoals: &[Goal],
) -> Result<(), SolverError> {
    let mut tried = vec![];
    let mut chosen = None;
    for subgoal in subgoals {
        satisfy_goal(state, subgoal)?;
        if state.score(subgoal) == 0.0 {
            chosen = Some(subgoal);
            break;
        }
        tried.push(subgoal);
    }

    match chosen {
        Some(subgoal) => {
            for other in tried {
                rollback(state, other)?;
            }
            aggregate(state, goal, subgoal);
            state.set_score(goal, 0.0);
        }
        None if goal.should_rollback_if_unsatisfied => {
            for subgoal in subgoals {
                rollback(state, subgoal)?;
            }
            state.set_score(goal, -1.0);
        }
        None => {
            for subgoal in subgoals {
                aggregate(state, goal, subgoal);
            }
            state.set_score(goal, -1.0);
        }
    }
    Ok(())
}

fn satisfy_option_goal_with_optimizer(
    state: &mut SolverState,
    goal: &Goal,
    subgoals: &[Goal],
    optimizer: Optimizer,
) -> Result<(), SolverError> {
    let mut best: Option<(Vec<SchedulingActivityDirective>, Vec<SchedulingActivityDirective>)> =
        None;
    for subgoal in subgoals {
        satisfy_goal(state, subgoal)?;
        if state.score(subgoal) == 0.0 || !subgoal.should_rollback_if_unsatisfied {
            let claims: Vec<_> = state
                .plan
                .evaluation
                .for_goal(subgoal.id)
                .activities()
                .collect();
            let (mut associated, mut inserted) = (vec![], vec![]);
            for (id, created) in claims {
                if let Some(activity) = state.plan.get(id) {
                    if created {
                        inserted.push(activity.clone());
                    } else {
                        associated.push(activity.clone());
                    }
                }
            }
            let candidate: Vec<_> = associated.iter().chain(&inserted).cloned().collect();
            let better = match &best {
                None => !candidate.is_empty(),
                Some((a, i)) => {
                    let current: Vec<_> = a.iter().chain(i).cloned().collect();
                    optimizer.is_better(&candidate, &current)
                }
            };
            if better {
                best = Some((associated, inserted));
            }
        }
        rollback(state, subgoal)?;
    }

    let Some((associated, inserted)) = best else {
        state.set_score(goal, -1.0);
        return Ok(());
    };
    for activity in &associated {
        state
            .plan
            .evaluation
            .for_goal(goal.id)
            .associate(activity.id, false);
    }
    if !check_and_insert_acts(state, &inserted)? {
        return Err(SolverError::IllegalState {
            goal: goal.id,
            message: "the chosen subgoal's activities could not be inserted again".to_string(),
        });
    }
    for activity in &inserted {
        state
            .plan
            .evaluation
            .for_goal(goal.id)
            .associate(activity.id, true);
    }
    state.set_score(goal, 0.0);
    Ok(())
}

fn satisfy_goal_general(state: &mut SolverState, goal: &Goal) -> Result<(), SolverError> {
    let mut conflicts = get_conflicts(state, goal)?;
    state.plan.evaluation.for_goal(goal.id).nb_conflicts_detected = Some(conflicts.len());
    debug!(goal = %goal.name, conflicts = conflicts.len(), "conflicts detected");

    let mut made_progress = true;
    let mut iterations = 0;
    while !conflicts.is_empty()
        && made_progress
        && iterations < state.config.max_iterations_per_goal
    {
        made_progress = false;
        iterations += 1;
        for conflict in &conflicts {
            match conflict {
                Conflict::MissingActivityInstance { .. }
                | Conflict::MissingActivityTemplate { .. } => {
                    if state.config.analysis_only {
                        continue;
                    }
                    let activities = get_best_new_activities(state, goal, conflict)?;
                    if !activities.is_empty() && check_and_insert_acts(state, &activities)? {
                        made_progress = true;
                        let evaluation = state.plan.evaluation.for_goal(goal.id);
                        for activity in &activities {
                            evaluation.associate(activity.id, true);
                        }
                    }
                }
                Conflict::MissingAssociation {
                    candidates, env, ..
                } => {
                    let constraints: Vec<_> =
                        goal.effective_resource_constraints().into_iter().collect();
                    for candidate in candidates {
                        let window = Windows::of(candidate.interval(), true);
                        let narrowed = narrow_by_resource_constraints(
                            state,
                            window.clone(),
                            &constraints,
                            env,
                        )?;
                        if narrowed.includes(&window) {
                            state
                                .plan
                                .evaluation
                                .for_goal(goal.id)
                                .associate(candidate.id, false);
                            made_progress = true;
                            break;
                        }
                    }
                }
            }
        }
        if made_progress {
            conflicts = get_conflicts(state, goal)?;
        }
    }

    if !conflicts.is_empty() && goal.should_rollback_if_unsatisfied {
        rollback(state, goal)?;
    }
    state.set_score(goal, 0.0 - conflicts.len() as f64);
    Ok(())
}

/// Undoes everything a goal inserted, and forgets what it associated.
fn rollback(state: &mut SolverState, goal: &Goal) -> Result<(), SolverError> {
    let evaluation = state.plan.evaluation.for_goal(goal.id);
    let inserted: Vec<_> = evaluation.inserted().collect();
    evaluation.clear_associations();
    evaluation.score = 0.0 - evaluation.nb_conflicts_detected.unwrap_or(0) as f64;

    let removed: Vec<_> = inserted
        .into_iter()
        .filter_map(|id| state.plan.remove(id))
        .collect();
    let removed_ids: BTreeSet<_> = removed.iter().map(|a| a.id).collect();
    let orphans: Vec<_> = state
        .plan
        .activities()
        .filter(|a| a.top_parent.is_some_and(|p| removed_ids.contains(&p)))
        .map(|a| a.id)
        .collect();
    for id in removed_ids.iter().chain(&orphans) {
        state.plan.remove(*id);
        state.plan.evaluation.forget(*id);
    }
    state
        .generated
        .retain(|(_, parent)| !removed_ids.contains(parent));

    if !removed.is_empty() {
        debug!(goal = %goal.name, removed = removed.len(), "rolled back");
    }
    state.facade.remove_activities_from_simulation(&removed)?;
    Ok(())
}

/// Inserts the activities into the plan if they fit in the horizon and, when checking,
/// simulate for exactly their expected duration. Otherwise nothing changes.
fn check_and_insert_acts(
    state: &mut SolverState,
    activities: &[SchedulingActivityDirective],
) -> Result<bool, SolverError> {
    let horizon_end = state.problem.horizon().end_offset();
    let mut all_good = true;
    for activity in activities {
        if activity.end_offset().is_some_and(|end| end > horizon_end) {
            warn!(id = %activity.id, type_name = %activity.type_name, "activity would end after the horizon");
            all_good = false;
            break;
        }
    }

    if all_good && state.check_sim_before_inserting {
        for activity in activities {
            match state.facade.simulate_activity(activity) {
                Ok(()) => {}
                Err(error @ SimulationException::UnknownActivity { .. }) => return Err(error.into()),
                Err(error) => {
                    warn!(id = %activity.id, %error, "activity failed in simulation");
                    all_good = false;
                    break;
                }
            }
            let simulated = state.facade.get_activity_duration(activity);
            if simulated.is_none() || simulated != activity.duration {
                warn!(
                    id = %activity.id,
                    type_name = %activity.type_name,
                    expected = ?activity.duration,
                    ?simulated,
                    "activity did not run for its expected duration"
                );
                all_good = false;
                break;
            }
        }
    }

    if all_good {
        state.plan.add_all(activities.iter().cloned());
        let end = state.facade.current_simulation_end_time();
        let children = state.facade.get_all_child_activities(end)?;
        process_new_generated_activities(state, children);
        pull_activity_durations_if_necessary(state)?;
    } else {
        state.facade.remove_activities_from_simulation(activities)?;
    }
    Ok(all_good)
}

fn same_child(a: &SchedulingActivityDirective, b: &SchedulingActivityDirective) -> bool {
    a.type_name == b.type_name && a.start_offset == b.start_offset && a.arguments == b.arguments
}

/// Adds spawned activities to the plan, unless they are already there. Children seen
/// before while still running get their durations filled in.
fn process_new_generated_activities(
    state: &mut SolverState,
    children: Vec<(SchedulingActivityDirective, ActivityDirectiveId)>,
) {
    for (child, parent) in children {
        let existing = state
            .plan
            .activities()
            .find(|a| a.top_parent == Some(parent) && same_child(a, &child))
            .cloned();
        match existing {
            Some(existing) => {
                if existing.duration.is_none() && child.duration.is_some() {
                    let updated = SchedulingActivityDirective {
                        duration: child.duration,
                        ..existing.clone()
                    };
                    for (known, _) in state.generated.iter_mut() {
                        if known.id == existing.id {
                            *known = updated.clone();
                        }
                    }
                    state.plan.replace(existing.id, updated);
                }
            }
            None => {
                state.plan.add(child.clone());
                state.generated.push((child, parent));
            }
        }
    }
}

/// Fills in durations that simulation has since found out.
fn pull_activity_durations_if_necessary(state: &mut SolverState) -> Result<(), SolverError> {
    let pending: Vec<_> = state
        .plan
        .activities()
        .filter(|a| a.duration.is_none() && a.top_parent.is_none())
        .cloned()
        .collect();
    for activity in pending {
        if let Some(duration) = state.facade.get_activity_duration(&activity) {
            let updated = activity.clone().with_duration(duration);
            state.plan.replace(activity.id, updated.clone());
            state
                .facade
                .replace_activity_from_simulation(&activity, &updated)?;
        }
    }
    Ok(())
}

/// Simulates plan activities that were inserted without being simulated.
fn synchronize(state: &mut SolverState) -> Result<(), SolverError> {
    let missing: Vec<_> = state
        .plan
        .activities()
        .filter(|a| a.top_parent.is_none() && !state.facade.is_simulated(a.id))
        .cloned()
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    state.facade.simulate_activities(&missing)?;
    let end = state.facade.current_simulation_end_time();
    let children = state.facade.get_all_child_activities(end)?;
    process_new_generated_activities(state, children);
    pull_activity_durations_if_necessary(state)
}

fn get_conflicts(state: &mut SolverState, goal: &Goal) -> Result<Vec<Conflict>, SolverError> {
    let results = match state.facade.latest_constraint_simulation_results() {
        Some(results) if !state.check_sim_before_evaluating => results,
        _ => {
            synchronize(state)?;
            let end = state.problem.horizon().end_offset();
            state.facade.compute_simulation_results_until(end)?
        }
    };
    Ok(goal.conflicts(&state.plan, &results, state.problem.horizon())?)
}

/// Narrows `windows` to where every constraint holds, evaluating each only over the
/// span that is still true.
fn narrow_by_resource_constraints(
    state: &mut SolverState,
    mut windows: Windows,
    constraints: &[&WindowsExpression],
    env: &EvaluationEnvironment,
) -> Result<Windows, SolverError> {
    if constraints.is_empty() {
        return Ok(windows);
    }
    let end = state.problem.horizon().end_offset();
    let results = state.facade.compute_simulation_results_until(end)?;
    for constraint in constraints {
        let (Some(min), Some(max)) = (windows.min_true_time_point(), windows.max_true_time_point())
        else {
            break;
        };
        let holds = constraint.evaluate(&results, Interval::between(min, max), env)?;
        windows = windows.and(&holds);
    }
    Ok(windows)
}

fn get_best_new_activities(
    state: &mut SolverState,
    goal: &Goal,
    conflict: &Conflict,
) -> Result<Vec<SchedulingActivityDirective>, SolverError> {
    let problem = state.problem;
    let mut constraints: Vec<&WindowsExpression> =
        goal.effective_resource_constraints().into_iter().collect();
    if let Some(state_constraint) = conflict
        .activity_type()
        .and_then(|t| problem.activity_type(t))
        .and_then(|t| t.state_constraint.as_ref())
    {
        constraints.push(state_constraint);
    }

    let mut windows = narrow_by_resource_constraints(
        state,
        conflict.temporal_context().clone(),
        &constraints,
        conflict.env(),
    )?;
    if !windows.is_all_false() && !problem.global_constraints().is_empty() {
        let end = problem.horizon().end_offset();
        let results = state.facade.compute_simulation_results_until(end)?;
        for constraint in problem.global_constraints() {
            windows = constraint.find_windows(&state.plan, &windows, conflict, &results, conflict.env());
        }
    }
    if windows.is_all_false() {
        debug!(goal = %goal.name, "no window left for a new activity");
        return Ok(vec![]);
    }

    match conflict {
        Conflict::MissingActivityInstance { instance, .. } => {
            let start = Windows::of(Interval::at(instance.start_offset), true);
            Ok(if windows.includes(&start) {
                vec![instance.clone()]
            } else {
                vec![]
            })
        }
        Conflict::MissingActivityTemplate { template, .. } => {
            state.generated_counter += 1;
            let name = format!("{}_{}", goal.name, state.generated_counter);
            match template.create_activity(&windows, &mut state.facade, state.config.placement) {
                Ok(Some(activity)) => {
                    debug!(%name, id = %activity.id, start = %activity.start_offset, "created activity");
                    Ok(vec![activity])
                }
                Ok(None) => Ok(vec![]),
                Err(error) => {
                    warn!(%name, %error, "could not create activity");
                    Ok(vec![])
                }
            }
        }
        Conflict::MissingAssociation { .. } => Ok(vec![]),
    }
}
