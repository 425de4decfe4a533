use crate::public::directive::{ActivityDirective, ActivityDirectiveId, StartAnchor};
use crate::public::error::AnchorError;
use hifitime::Duration;
use std::collections::{BTreeMap, BTreeSet};

/// Directives grouped by what has to happen before their start time is known.
///
/// The `None` key holds directives whose offsets are relative to the start of the
/// simulation. `Some(a)` holds directives that start a known delay after `a` ends.
/// Each list is sorted by offset, then id.
pub type AnchorForest = BTreeMap<Option<ActivityDirectiveId>, Vec<(ActivityDirectiveId, Duration)>>;

/// Collapses anchor chains into an [AnchorForest].
///
/// Start anchors are resolved all the way down, so a directive anchored to the start
/// of another ends up next to it, with the offsets summed. End anchors can't be resolved
/// before simulating, so they become edges of the forest.
pub struct StartOffsetReducer<'a> {
    plan_duration: Duration,
    schedule: &'a BTreeMap<ActivityDirectiveId, ActivityDirective>,
}

enum Visit {
    InProgress,
    Done(Option<ActivityDirectiveId>, Duration),
}

impl<'a> StartOffsetReducer<'a> {
    pub fn new(
        plan_duration: Duration,
        schedule: &'a BTreeMap<ActivityDirectiveId, ActivityDirective>,
    ) -> Self {
        Self {
            plan_duration,
            schedule,
        }
    }

    pub fn compute(&self) -> Result<AnchorForest, AnchorError> {
        let mut visits = BTreeMap::new();
        let mut forest = AnchorForest::new();
        for &id in self.schedule.keys() {
            let (key, offset) = self.resolve(id, &mut visits)?;
            forest.entry(key).or_default().push((id, offset));
        }
        for list in forest.values_mut() {
            list.sort_by_key(|&(id, offset)| (offset, id));
        }
        self.check_reachable(&forest)?;
        Ok(forest)
    }

    fn resolve(
        &self,
        id: ActivityDirectiveId,
        visits: &mut BTreeMap<ActivityDirectiveId, Visit>,
    ) -> Result<(Option<ActivityDirectiveId>, Duration), AnchorError> {
        match visits.get(&id) {
            Some(Visit::Done(key, offset)) => return Ok((*key, *offset)),
            Some(Visit::InProgress) => return Err(AnchorError::Cycle { directive: id }),
            None => {}
        }
        visits.insert(id, Visit::InProgress);

        let directive = &self.schedule[&id];
        let offset = directive.start_offset;
        let resolved = match directive.anchor {
            StartAnchor::PlanStart => (None, offset),
            StartAnchor::PlanEnd => (None, self.plan_duration + offset),
            StartAnchor::DirectiveStart(anchor) => {
                self.check_known(id, anchor)?;
                let (key, anchor_offset) = self.resolve(anchor, visits)?;
                let resolved = anchor_offset + offset;
                if key.is_some() && resolved < Duration::ZERO {
                    return Err(AnchorError::NegativeEndOffset {
                        directive: id,
                        offset: resolved,
                    });
                }
                (key, resolved)
            }
            StartAnchor::DirectiveEnd(anchor) => {
                self.check_known(id, anchor)?;
                if offset < Duration::ZERO {
                    return Err(AnchorError::NegativeEndOffset {
                        directive: id,
                        offset,
                    });
                }
                (Some(anchor), offset)
            }
        };

        visits.insert(id, Visit::Done(resolved.0, resolved.1));
        Ok(resolved)
    }

    fn check_known(
        &self,
        directive: ActivityDirectiveId,
        anchor: ActivityDirectiveId,
    ) -> Result<(), AnchorError> {
        if self.schedule.contains_key(&anchor) {
            Ok(())
        } else {
            Err(AnchorError::UnknownAnchor { directive, anchor })
        }
    }

    /// End anchors can still form cycles through start anchors; those never get scheduled.
    fn check_reachable(&self, forest: &AnchorForest) -> Result<(), AnchorError> {
        let mut reached = BTreeSet::new();
        let mut frontier: Vec<Option<ActivityDirectiveId>> = vec![None];
        while let Some(key) = frontier.pop() {
            for &(id, _) in forest.get(&key).into_iter().flatten() {
                if reached.insert(id) {
                    frontier.push(Some(id));
                }
            }
        }
        match self.schedule.keys().find(|id| !reached.contains(id)) {
            Some(&directive) => Err(AnchorError::Cycle { directive }),
            None => Ok(()),
        }
    }
}

/// Shifts the independently-timed directives, e.g. when the simulation starts later
/// than the plan.
pub fn adjust_start_offsets(forest: &mut AnchorForest, shift: Duration) {
    if let Some(roots) = forest.get_mut(&None) {
        for (_, offset) in roots.iter_mut() {
            *offset -= shift;
        }
    }
}

/// Drops directives that would start before the simulation, along with everything anchored
/// to their ends.
pub fn filter_out_negative_start_offsets(forest: &mut AnchorForest) {
    let mut dropped: Vec<ActivityDirectiveId> = vec![];
    if let Some(roots) = forest.get_mut(&None) {
        roots.retain(|&(id, offset)| {
            let keep = offset >= Duration::ZERO;
            if !keep {
                dropped.push(id);
            }
            keep
        });
    }
    while let Some(id) = dropped.pop() {
        if let Some(dependents) = forest.remove(&Some(id)) {
            dropped.extend(dependents.into_iter().map(|(dependent, _)| dependent));
        }
    }
}
