//! Executor: runs an ordered list of steps one tick at a time, detecting
//! normal completion vs. fatal step failure.

use crate::error::TaskError;
use crate::task::env::TaskEnv;
use crate::task::step::{Step, StepOutcome};
use crate::task::update::{StateCode, UpdateEmitter};

/// Terminal or precondition results of a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickError {
    /// Start was never called, or a finished/failed run was ticked again.
    NotStarted,
    /// The step cursor reached the end of the list. Returned exactly once.
    Finished,
    /// A previous step already failed the task.
    Fatal(String),
}

/// Drives a built step list against one task environment. Created per task
/// request and discarded after the run; a finished or failed Executor is not
/// resumable.
pub struct Executor {
    steps: Vec<Box<dyn Step>>,
    env: TaskEnv,
    cursor: usize,
    running: bool,
    last_error: Option<TaskError>,
    updates: Option<UpdateEmitter>,
}

impl Executor {
    pub fn new(steps: Vec<Box<dyn Step>>, env: TaskEnv) -> Self {
        Self {
            steps,
            env,
            cursor: 0,
            running: false,
            last_error: None,
            updates: None,
        }
    }

    /// Announced step ids, in execution order.
    pub fn step_ids(&self) -> Vec<StateCode> {
        self.steps.iter().map(|s| s.id()).collect()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The terminal error recorded by a fatal step, if any.
    pub fn last_error(&self) -> Option<TaskError> {
        self.last_error.clone()
    }

    /// Transition NotStarted -> Running and reset the step cursor. Calling
    /// start on an already running Executor is a no-op.
    pub fn start(&mut self, updates: UpdateEmitter) {
        if self.running {
            return;
        }
        self.running = true;
        self.cursor = 0;
        self.updates = Some(updates);
    }

    /// Execute the next step. Emits the step announcement before the step's
    /// own updates; a fatal outcome publishes the terminal `error` update,
    /// records it, and halts the run.
    pub async fn tick(&mut self) -> Result<(), TickError> {
        if let Some(err) = &self.last_error {
            return Err(TickError::Fatal(err.to_string()));
        }
        if !self.running {
            return Err(TickError::NotStarted);
        }
        if self.cursor >= self.steps.len() {
            self.running = false;
            return Err(TickError::Finished);
        }
        let updates = self
            .updates
            .clone()
            .expect("executor running without an update sink");
        let step = &self.steps[self.cursor];
        updates.emit(step.id(), "").await;
        match step.run(&mut self.env, &updates).await {
            StepOutcome::Continue => {
                self.cursor += 1;
                Ok(())
            }
            StepOutcome::Fatal(message) => {
                updates.emit(StateCode::Error, message.clone()).await;
                self.running = false;
                self.last_error = Some(TaskError::Step(message));
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct FixedStep {
        id: StateCode,
        outcome: fn() -> StepOutcome,
    }

    #[async_trait]
    impl Step for FixedStep {
        fn id(&self) -> StateCode {
            self.id
        }

        async fn run(&self, _env: &mut TaskEnv, _updates: &UpdateEmitter) -> StepOutcome {
            (self.outcome)()
        }
    }

    fn ok_step(id: StateCode) -> Box<dyn Step> {
        Box::new(FixedStep {
            id,
            outcome: || StepOutcome::Continue,
        })
    }

    fn fatal_step(id: StateCode) -> Box<dyn Step> {
        Box::new(FixedStep {
            id,
            outcome: || StepOutcome::Fatal("boom".to_string()),
        })
    }

    fn harness(steps: Vec<Box<dyn Step>>) -> (Executor, mpsc::Receiver<crate::task::TaskStatus>) {
        let (tx, rx) = mpsc::channel(64);
        let mut exec = Executor::new(steps, TaskEnv::default());
        exec.start(UpdateEmitter::new(tx));
        (exec, rx)
    }

    #[tokio::test]
    async fn tick_before_start_is_not_started() {
        let mut exec = Executor::new(vec![ok_step(StateCode::List)], TaskEnv::default());
        assert_eq!(exec.tick().await, Err(TickError::NotStarted));
        assert!(!exec.is_running());
    }

    #[tokio::test]
    async fn announcements_match_step_order_then_finished() {
        let ids = [StateCode::LockAdd, StateCode::FetchIp, StateCode::Dns];
        let (mut exec, mut rx) = harness(ids.iter().map(|id| ok_step(*id)).collect());

        for _ in 0..ids.len() {
            exec.tick().await.unwrap();
        }
        assert_eq!(exec.tick().await, Err(TickError::Finished));
        assert!(!exec.is_running());

        drop(exec);
        let mut seen = Vec::new();
        while let Some(status) = rx.recv().await {
            seen.push(status.state_code);
        }
        assert_eq!(seen, ids);
    }

    #[tokio::test]
    async fn finished_is_returned_exactly_once() {
        let (mut exec, _rx) = harness(vec![ok_step(StateCode::List)]);
        exec.tick().await.unwrap();
        assert_eq!(exec.tick().await, Err(TickError::Finished));
        assert_eq!(exec.tick().await, Err(TickError::NotStarted));
    }

    #[tokio::test]
    async fn fatal_step_halts_the_run() {
        let (mut exec, mut rx) = harness(vec![
            ok_step(StateCode::LockAdd),
            fatal_step(StateCode::Dns),
            ok_step(StateCode::Routes),
        ]);

        exec.tick().await.unwrap();
        exec.tick().await.unwrap(); // fatal step; outcome recorded, not raised
        assert!(!exec.is_running());
        assert!(matches!(exec.last_error(), Some(TaskError::Step(_))));
        match exec.tick().await {
            Err(TickError::Fatal(msg)) => assert!(msg.contains("boom")),
            other => panic!("expected Fatal, got {:?}", other),
        }

        drop(exec);
        let mut seen = Vec::new();
        while let Some(status) = rx.recv().await {
            seen.push(status.state_code);
        }
        // Third step never announced; error is the last message.
        assert_eq!(
            seen,
            vec![StateCode::LockAdd, StateCode::Dns, StateCode::Error]
        );
    }

    #[tokio::test]
    async fn start_while_running_is_a_noop() {
        let (mut exec, _rx) = harness(vec![ok_step(StateCode::List), ok_step(StateCode::Dns)]);
        exec.tick().await.unwrap();

        let (tx2, _rx2) = mpsc::channel(1);
        exec.start(UpdateEmitter::new(tx2)); // must not reset the cursor
        exec.tick().await.unwrap();
        assert_eq!(exec.tick().await, Err(TickError::Finished));
    }
}
