//! Assembles the step sequence for each task operation.

use crate::error::TaskError;
use crate::server::core::{ServerCore, StepKind};
use crate::task::env::TaskEnv;
use crate::task::executor::Executor;
use crate::task::step::Step;
use std::sync::Arc;

/// Builds an Executor for one operation. Construction validates the request
/// and decides the step layout; store and adapter effects happen at run time.
pub struct TaskBuilder {
    steps: Vec<Box<dyn Step>>,
    env: TaskEnv,
}

impl TaskBuilder {
    pub fn list(core: Arc<ServerCore>) -> Self {
        Self {
            steps: vec![core.step(StepKind::List)],
            env: TaskEnv::default(),
        }
    }

    /// Apply a playbook from its YAML text. If a playbook with the same name
    /// is already installed, teardown steps for the old definition run first,
    /// bracketed by context swaps so they see the old hosts and addresses.
    pub fn apply(core: Arc<ServerCore>, yaml: &str) -> Result<Self, TaskError> {
        let playbook = crate::playbook::Playbook::parse(yaml)?;
        let old = core
            .store()
            .get(&playbook.name)?
            .filter(|existing| existing.installed);

        let mut steps = vec![core.step(StepKind::LockAdd)];
        if old.is_some() {
            steps.push(core.step(StepKind::Swap));
            steps.push(core.step(StepKind::UndoDns));
            steps.push(core.step(StepKind::UndoRoutes));
            steps.push(core.step(StepKind::Swap));
        }
        steps.push(core.step(StepKind::FetchIps));
        steps.push(core.step(StepKind::ApplyDns));
        steps.push(core.step(StepKind::Persist));
        steps.push(core.step(StepKind::ApplyRoutes));
        steps.push(core.step(StepKind::FinalizeApply));

        let mut env = TaskEnv::with_playbook(playbook);
        env.old_playbook = old;
        Ok(Self { steps, env })
    }

    /// Undo an installed playbook by name. The playbook itself is loaded and
    /// locked by the first step.
    pub fn undo(core: Arc<ServerCore>, name: &str) -> Result<Self, TaskError> {
        if name.is_empty() {
            return Err(TaskError::Parse("undo requires a playbook name".to_string()));
        }
        let steps = vec![
            core.step(StepKind::PrepUndo {
                name: name.to_string(),
            }),
            core.step(StepKind::UndoDns),
            core.step(StepKind::UndoRoutes),
            core.step(StepKind::FinalizeUndo),
        ];
        Ok(Self {
            steps,
            env: TaskEnv::default(),
        })
    }

    pub fn build(self) -> Executor {
        Executor::new(self.steps, self.env)
    }
}
