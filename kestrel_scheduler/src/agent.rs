//! Serving scheduling requests.
//!
//! A [SchedulerAgent] turns a [ScheduleRequest] into results pushed through a
//! [ResultsWriter]. [LocalSchedulerAgent] does the work on the calling thread;
//! [ThreadedSchedulerAgent] wraps any agent in a worker thread with a request queue,
//! and survives errors and panics in the agent it wraps.

use crate::activity::SchedulingActivityDirective;
use crate::config::SchedulerConfig;
use crate::error::AgentError;
use crate::goals::GoalId;
use crate::plan::Plan;
use crate::problem::Problem;
use crate::solver::PrioritySolver;
use anyhow::bail;
use crossbeam::channel::{Receiver, Sender, unbounded};
use kestrel::ActivityDirectiveId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

pub struct ScheduleRequest {
    pub problem: Problem,
    pub config: SchedulerConfig,
}

impl ScheduleRequest {
    pub fn new(problem: Problem) -> Self {
        Self {
            problem,
            config: SchedulerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GoalResult {
    pub score: f64,
    pub inserted: Vec<ActivityDirectiveId>,
    pub associated: Vec<ActivityDirectiveId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduleResults {
    pub goals: BTreeMap<GoalId, GoalResult>,
    pub plan: Vec<SchedulingActivityDirective>,
}

impl ScheduleResults {
    pub fn from_plan(plan: &Plan) -> Self {
        let goals = plan
            .evaluation
            .iter()
            .map(|(id, evaluation)| {
                (
                    id,
                    GoalResult {
                        score: evaluation.score,
                        inserted: evaluation.inserted().collect(),
                        associated: evaluation.associated().collect(),
                    },
                )
            })
            .collect();
        Self {
            goals,
            plan: plan.activities().cloned().collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingFailure {
    pub kind: String,
    pub message: String,
    pub trace: String,
}

/// Where an agent reports how a request went. Only the first report counts.
pub trait ResultsWriter: Send {
    fn succeed_with(&mut self, results: ScheduleResults);
    fn fail_with(&mut self, kind: &str, message: &str, trace: String);
}

pub trait SchedulerAgent: Send {
    fn schedule(
        &self,
        request: ScheduleRequest,
        writer: &mut dyn ResultsWriter,
    ) -> anyhow::Result<()>;
}

/// Hands the outcome to whoever holds the matching receiver.
pub struct OneshotWriter {
    sender: Option<oneshot::Sender<Result<ScheduleResults, SchedulingFailure>>>,
}

impl OneshotWriter {
    pub fn new() -> (
        Self,
        oneshot::Receiver<Result<ScheduleResults, SchedulingFailure>>,
    ) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    fn send(&mut self, outcome: Result<ScheduleResults, SchedulingFailure>) {
        if let Some(sender) = self.sender.take() {
            if sender.send(outcome).is_err() {
                debug!("nobody is waiting for the scheduling outcome");
            }
        }
    }
}

impl ResultsWriter for OneshotWriter {
    fn succeed_with(&mut self, results: ScheduleResults) {
        self.send(Ok(results));
    }

    fn fail_with(&mut self, kind: &str, message: &str, trace: String) {
        self.send(Err(SchedulingFailure {
            kind: kind.to_string(),
            message: message.to_string(),
            trace,
        }));
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct LocalSchedulerAgent;

impl SchedulerAgent for LocalSchedulerAgent {
    fn schedule(
        &self,
        request: ScheduleRequest,
        writer: &mut dyn ResultsWriter,
    ) -> anyhow::Result<()> {
        let mut solver = PrioritySolver::with_config(request.problem, request.config);
        let Some(plan) = solver.next_solution()? else {
            bail!("the initial plan could not be simulated");
        };
        writer.succeed_with(ScheduleResults::from_plan(&plan));
        Ok(())
    }
}

enum Message {
    Schedule {
        request: ScheduleRequest,
        writer: Box<dyn ResultsWriter>,
    },
    Terminate,
}

pub struct ThreadedSchedulerAgent {
    requests: Sender<Message>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadedSchedulerAgent {
    pub fn spawn(
        name: impl Into<String>,
        agent: impl SchedulerAgent + 'static,
    ) -> Result<Self, AgentError> {
        let (requests, queue) = unbounded();
        let worker = thread::Builder::new()
            .name(name.into())
            .spawn(move || serve(agent, queue))
            .map_err(|source| AgentError::Spawn { source })?;
        Ok(Self {
            requests,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn schedule(
        &self,
        request: ScheduleRequest,
        writer: impl ResultsWriter + 'static,
    ) -> Result<(), AgentError> {
        self.requests
            .send(Message::Schedule {
                request,
                writer: Box::new(writer),
            })
            .map_err(|_| AgentError::Terminated)
    }

    /// Stops the worker once it has served everything queued before this call.
    pub fn terminate(&self) -> Result<(), AgentError> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };
        // A closed queue means the worker is already gone.
        let _ = self.requests.send(Message::Terminate);
        worker.join().map_err(|_| AgentError::WorkerPanicked)
    }
}

impl Drop for ThreadedSchedulerAgent {
    fn drop(&mut self) {
        if let Err(error) = self.terminate() {
            error!(%error, "scheduler worker did not shut down cleanly");
        }
    }
}

fn serve(agent: impl SchedulerAgent, queue: Receiver<Message>) {
    while let Ok(message) = queue.recv() {
        let (request, mut writer) = match message {
            Message::Schedule { request, writer } => (request, writer),
            Message::Terminate => break,
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            agent.schedule(request, writer.as_mut())
        }));
        let trace = match outcome {
            Ok(Ok(())) => continue,
            Ok(Err(error)) => format!("{error:?}"),
            Err(payload) => panic_message(payload.as_ref()),
        };
        error!(%trace, "scheduling failed");
        writer.fail_with(
            "UNEXPECTED_SCHEDULER_EXCEPTION",
            "Something went wrong while scheduling",
            trace,
        );
    }
    debug!("scheduler worker stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panicked with a non-string payload".to_string()
    }
}
