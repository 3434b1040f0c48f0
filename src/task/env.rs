//! Typed task environment: the blackboard passed between steps of one run.

use crate::playbook::Playbook;
use std::collections::HashMap;

/// Per-run mutable state owned by exactly one Executor. `old_playbook` is
/// populated only while an in-place update is swapping configurations.
#[derive(Debug, Default)]
pub struct TaskEnv {
    pub playbook: Option<Playbook>,
    pub old_playbook: Option<Playbook>,
    pub dns_records: Option<HashMap<String, String>>,
}

impl TaskEnv {
    pub fn with_playbook(playbook: Playbook) -> Self {
        Self {
            playbook: Some(playbook),
            ..Default::default()
        }
    }

    /// Exchange the active and old playbooks. Used by the swap protocol so
    /// teardown steps run under the previously installed configuration.
    pub fn swap_playbooks(&mut self) {
        std::mem::swap(&mut self.playbook, &mut self.old_playbook);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playbook::Playbook;

    fn named(name: &str) -> Playbook {
        Playbook::parse(&format!(
            "name: {name}\nadapters:\n  dns: \"null\"\n  routes: \"null\"\ninterface: wg0"
        ))
        .unwrap()
    }

    #[test]
    fn swap_exchanges_both_slots() {
        let mut env = TaskEnv::with_playbook(named("new"));
        env.old_playbook = Some(named("old"));
        env.swap_playbooks();
        assert_eq!(env.playbook.as_ref().unwrap().name, "old");
        assert_eq!(env.old_playbook.as_ref().unwrap().name, "new");
    }
}
