use crate::conflicts::Conflict;
use crate::constraints::EvaluationEnvironment;
use crate::plan::Plan;
use crate::time::Interval;
use crate::windows::Windows;
use kestrel::SimulationResults;

/// A rule that holds across every goal. It narrows where a new activity may start.
pub trait GlobalConstraint: Send + Sync {
    fn find_windows(
        &self,
        plan: &Plan,
        windows: &Windows,
        conflict: &Conflict,
        results: &SimulationResults,
        env: &EvaluationEnvironment,
    ) -> Windows;
}

/// Activities of the two types never start while one of the other type is running.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivityMutex {
    pub first: String,
    pub second: String,
}

impl ActivityMutex {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }

    fn other(&self, type_name: &str) -> Option<&str> {
        if type_name == self.first {
            Some(&self.second)
        } else if type_name == self.second {
            Some(&self.first)
        } else {
            None
        }
    }
}

impl GlobalConstraint for ActivityMutex {
    fn find_windows(
        &self,
        plan: &Plan,
        windows: &Windows,
        conflict: &Conflict,
        _results: &SimulationResults,
        _env: &EvaluationEnvironment,
    ) -> Windows {
        let Some(other) = conflict.activity_type().and_then(|t| self.other(t)) else {
            return windows.clone();
        };
        let busy = Windows::from_true_intervals(
            Interval::FOREVER,
            plan.activities_of_type(other).map(|a| a.interval()),
        );
        windows.and(&busy.not())
    }
}
