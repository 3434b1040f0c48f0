//! Background bookkeeping for installed playbooks: tracks how stale each one
//! is against its declared refresh interval.

use crate::playbook::Playbook;
use crate::server::core::ServerCore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Tracks refresh intervals and ages for installed playbooks. An interval of
/// zero or less means the playbook opted out of auto-update tracking.
pub struct AutoUpdater {
    cron_table: Mutex<HashMap<String, i64>>,
    age_table: Mutex<HashMap<String, i64>>,
}

impl AutoUpdater {
    pub fn new() -> Self {
        Self {
            cron_table: Mutex::new(HashMap::new()),
            age_table: Mutex::new(HashMap::new()),
        }
    }

    /// Rebuild both tables from the store snapshot. Only installed playbooks
    /// that are not mid-operation are tracked; everything else is dropped.
    pub fn reconcile(&self, books: &HashMap<String, Playbook>) {
        let mut cron = self.cron_table.lock();
        let mut ages = self.age_table.lock();
        cron.clear();
        ages.clear();
        let now = chrono::Utc::now().timestamp();
        for (name, book) in books {
            if !book.installed || book.busy {
                continue;
            }
            cron.insert(name.clone(), book.auto_update_interval);
            ages.insert(name.clone(), now - book.install_time);
        }
        debug!("auto-update table refreshed, {} tracked", cron.len());
    }

    /// Currently tracked playbook names.
    pub fn entries(&self) -> Vec<String> {
        self.cron_table.lock().keys().cloned().collect()
    }

    /// Recompute ages and return the playbooks whose age exceeds their
    /// interval.
    pub fn tick(&self, books: &HashMap<String, Playbook>) -> Vec<String> {
        self.reconcile(books);
        let cron = self.cron_table.lock();
        let ages = self.age_table.lock();
        let mut overdue = Vec::new();
        for (name, interval) in cron.iter() {
            if *interval <= 0 {
                continue;
            }
            let age_hours = ages.get(name).copied().unwrap_or(0) / 3600;
            if age_hours > *interval {
                info!(
                    "playbook {} is due for a refresh ({}h old, interval {}h)",
                    name, age_hours, interval
                );
                overdue.push(name.clone());
            }
        }
        overdue
    }
}

impl Default for AutoUpdater {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic reconciliation loop, spawned at server startup.
pub async fn run_loop(core: Arc<ServerCore>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    // First tick fires immediately; the table was already primed at startup.
    interval.tick().await;
    loop {
        interval.tick().await;
        core.autoupdate_tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(name: &str, installed: bool, busy: bool, interval: i64, age_secs: i64) -> Playbook {
        let mut book = Playbook::default();
        book.name = name.to_string();
        book.installed = installed;
        book.busy = busy;
        book.auto_update_interval = interval;
        book.install_time = chrono::Utc::now().timestamp() - age_secs;
        book
    }

    #[test]
    fn reconcile_tracks_only_installed_idle_playbooks() {
        let updater = AutoUpdater::new();
        let mut books = HashMap::new();
        books.insert("a".to_string(), book("a", true, false, 24, 0));
        books.insert("b".to_string(), book("b", false, false, 24, 0));
        books.insert("c".to_string(), book("c", true, true, 24, 0));
        updater.reconcile(&books);
        assert_eq!(updater.entries(), vec!["a".to_string()]);

        books.remove("a");
        updater.reconcile(&books);
        assert!(updater.entries().is_empty());
    }

    #[test]
    fn tick_flags_overdue_playbooks() {
        let updater = AutoUpdater::new();
        let mut books = HashMap::new();
        books.insert("stale".to_string(), book("stale", true, false, 1, 2 * 3600));
        books.insert("fresh".to_string(), book("fresh", true, false, 24, 3600));
        books.insert("untracked".to_string(), book("untracked", true, false, 0, 9 * 3600));
        let overdue = updater.tick(&books);
        assert_eq!(overdue, vec!["stale".to_string()]);
    }
}
