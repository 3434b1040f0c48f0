//! ServerCore: owns the store, adapter registry and resolver, and implements
//! every orchestration step the TaskBuilder can schedule.

use crate::adapters::{AdapterRegistry, DnsRecord, Route};
use crate::resolve::{arpa_name, Resolver};
use crate::server::autoupdater::AutoUpdater;
use crate::store::{LockOutcome, PlaybookStore};
use crate::task::step::{Step, StepOutcome};
use crate::task::update::{StateCode, UpdateEmitter};
use crate::task::TaskEnv;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tracing::warn;

/// Ownership tag prefix written into route comments.
const ROUTE_TAG: &str = "AutoVPN2";

fn route_comment(playbook: &str, host: &str) -> String {
    format!("[{}] Playbook: {} Host: {}", ROUTE_TAG, playbook, host)
}

/// Which orchestration step a scheduled `ServerStep` performs. The announced
/// state code intentionally reuses `dns`/`routes` for the persist and
/// finalize steps trailing those phases.
#[derive(Debug, Clone)]
pub(crate) enum StepKind {
    List,
    LockAdd,
    Swap,
    FetchIps,
    ApplyDns,
    Persist,
    ApplyRoutes,
    FinalizeApply,
    PrepUndo { name: String },
    UndoDns,
    UndoRoutes,
    FinalizeUndo,
}

impl StepKind {
    fn id(&self) -> StateCode {
        match self {
            StepKind::List => StateCode::List,
            StepKind::LockAdd => StateCode::LockAdd,
            StepKind::Swap => StateCode::Swap,
            StepKind::FetchIps => StateCode::FetchIp,
            StepKind::ApplyDns => StateCode::Dns,
            StepKind::Persist => StateCode::Dns,
            StepKind::ApplyRoutes => StateCode::Routes,
            StepKind::FinalizeApply => StateCode::Routes,
            StepKind::PrepUndo { .. } => StateCode::PrepCtx,
            StepKind::UndoDns => StateCode::UndoDns,
            StepKind::UndoRoutes => StateCode::UndoRoutes,
            StepKind::FinalizeUndo => StateCode::Finalize,
        }
    }
}

pub(crate) struct ServerStep {
    core: Arc<ServerCore>,
    kind: StepKind,
}

#[async_trait]
impl Step for ServerStep {
    fn id(&self) -> StateCode {
        self.kind.id()
    }

    async fn run(&self, env: &mut TaskEnv, updates: &UpdateEmitter) -> StepOutcome {
        match &self.kind {
            StepKind::List => self.core.step_list(updates).await,
            StepKind::LockAdd => self.core.step_lock_add(env).await,
            StepKind::Swap => self.core.step_swap(env).await,
            StepKind::FetchIps => self.core.step_fetch_ips(env, updates).await,
            StepKind::ApplyDns => self.core.step_apply_dns(env, updates).await,
            StepKind::Persist => self.core.step_persist(env).await,
            StepKind::ApplyRoutes => self.core.step_apply_routes(env, updates).await,
            StepKind::FinalizeApply => self.core.step_finalize_apply(env).await,
            StepKind::PrepUndo { name } => self.core.step_prep_undo(name, env).await,
            StepKind::UndoDns => self.core.step_undo_dns(env, updates).await,
            StepKind::UndoRoutes => self.core.step_undo_routes(env, updates).await,
            StepKind::FinalizeUndo => self.core.step_finalize_undo(env).await,
        }
    }
}

/// Shared server state behind every task run.
pub struct ServerCore {
    store: Arc<dyn PlaybookStore>,
    adapters: AdapterRegistry,
    resolver: Box<dyn Resolver>,
    updater: AutoUpdater,
}

impl ServerCore {
    pub fn new(
        store: Arc<dyn PlaybookStore>,
        adapters: AdapterRegistry,
        resolver: Box<dyn Resolver>,
    ) -> Self {
        Self {
            store,
            adapters,
            resolver,
            updater: AutoUpdater::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn PlaybookStore> {
        &self.store
    }

    pub fn updater(&self) -> &AutoUpdater {
        &self.updater
    }

    pub(crate) fn step(self: &Arc<Self>, kind: StepKind) -> Box<dyn Step> {
        Box::new(ServerStep {
            core: self.clone(),
            kind,
        })
    }

    /// Reconcile the auto-update tables with the store: entries exist exactly
    /// for playbooks that are installed and not busy.
    pub fn update_updater_table(&self) {
        match self.store.get_all() {
            Ok(books) => self.updater.reconcile(&books),
            Err(err) => warn!("failed refreshing auto-update table: {}", err),
        }
    }

    /// One background reconciliation pass: recompute ages and log overdue
    /// playbooks.
    pub fn autoupdate_tick(&self) {
        match self.store.get_all() {
            Ok(books) => {
                self.updater.tick(&books);
            }
            Err(err) => warn!("auto-update tick skipped: {}", err),
        }
    }

    async fn step_list(&self, updates: &UpdateEmitter) -> StepOutcome {
        let books = match self.store.get_all() {
            Ok(books) => books,
            Err(err) => return StepOutcome::Fatal(format!("Failed listing playbooks: {}", err)),
        };
        let mut names: Vec<String> = books.keys().cloned().collect();
        names.sort();
        updates
            .emit(
                StateCode::List,
                format!("Playbooks ({}): {}", names.len(), names.join(", ")),
            )
            .await;
        StepOutcome::Continue
    }

    /// Lock the freshly parsed playbook and persist it. A fresh playbook that
    /// is already locked is a logic-invariant violation, not a retryable
    /// condition.
    async fn step_lock_add(&self, env: &mut TaskEnv) -> StepOutcome {
        let Some(playbook) = env.playbook.as_mut() else {
            return StepOutcome::Fatal("No active playbook in task context".to_string());
        };
        if !playbook.lock("Apply") {
            return StepOutcome::Fatal(format!(
                "Unexpected lock on fresh playbook! (reason: {})",
                playbook.lock_reason()
            ));
        }
        if let Err(err) = self.store.put(playbook) {
            return StepOutcome::Fatal(format!("Failed adding playbook to db: {}", err));
        }
        StepOutcome::Continue
    }

    /// Exchange the active and old playbooks so teardown steps run under the
    /// old configuration. On the way in, the old side is locked `Reapply` so
    /// the auto-updater leaves it alone; post-swap the slot holds the new
    /// playbook (already locked `Apply`) and is left untouched.
    async fn step_swap(&self, env: &mut TaskEnv) -> StepOutcome {
        let Some(old) = env.old_playbook.as_mut() else {
            return StepOutcome::Fatal("Swap scheduled without an old playbook".to_string());
        };
        if old.lock_reason() != "Reapply" && old.lock_reason() != "Apply" && old.lock("Reapply") {
            if let Err(err) = self.store.put(old) {
                return StepOutcome::Fatal(format!("Failed locking old playbook in db: {}", err));
            }
        }
        env.swap_playbooks();
        StepOutcome::Continue
    }

    /// Resolve every playbook host, pass raw IPv4 literals through under a
    /// generated reverse-DNS name, merge static overrides last, and cache the
    /// result on the playbook for undo fallback.
    async fn step_fetch_ips(&self, env: &mut TaskEnv, updates: &UpdateEmitter) -> StepOutcome {
        let Some(playbook) = env.playbook.as_mut() else {
            return StepOutcome::Fatal("No active playbook in task context".to_string());
        };
        let mut records: HashMap<String, String> = HashMap::new();
        for host in &playbook.hosts {
            if let Ok(addr) = host.parse::<Ipv4Addr>() {
                let arpa = arpa_name(addr);
                updates
                    .summary(format!("Processed IP {} -> {}", host, arpa))
                    .await;
                records.insert(arpa, host.clone());
                continue;
            }
            match self.resolver.resolve_a(host).await {
                Ok(Some(addr)) => {
                    updates
                        .emit(
                            StateCode::FetchIp,
                            format!("Resolved {}\tIN\tA\t{}", host, addr),
                        )
                        .await;
                    records.insert(host.clone(), addr);
                }
                Ok(None) => {
                    updates
                        .summary(format!("Failed getting INET Address of {}!", host))
                        .await;
                }
                Err(err) => {
                    return StepOutcome::Fatal(format!(
                        "Failed to resolve domain {}! {}",
                        host, err
                    ));
                }
            }
        }
        for (host, addr) in &playbook.custom {
            records.insert(host.clone(), addr.clone());
        }
        playbook.playbook_addrs = records.clone();
        env.dns_records = Some(records);
        StepOutcome::Continue
    }

    /// Recreate conflicting records, then add one A record per resolved host.
    /// Per-record failures accumulate into the summary; only authentication,
    /// construction and commit failures abort the task.
    async fn step_apply_dns(&self, env: &mut TaskEnv, updates: &UpdateEmitter) -> StepOutcome {
        let (Some(playbook), Some(records)) = (env.playbook.as_ref(), env.dns_records.as_ref())
        else {
            return StepOutcome::Fatal("No playbook or records in task context".to_string());
        };
        updates.summary("DNS Summary:").await;
        let mut adapter = match self.adapters.dns(&playbook.adapters.dns) {
            Ok(adapter) => adapter,
            Err(err) => {
                return StepOutcome::Fatal(format!(
                    "Failed to create dns adapter {}: {}",
                    playbook.adapters.dns, err
                ));
            }
        };
        if let Err(err) = adapter.authenticate(&playbook.adapter_config.dns).await {
            return StepOutcome::Fatal(format!(
                "Failed to authenticate on {}: {}",
                playbook.adapters.dns, err
            ));
        }
        updates.summary("Authenticated!").await;

        let existing = match adapter.get_records("A").await {
            Ok(existing) => existing,
            Err(_) => {
                updates
                    .summary("Failed getting conflicts! Applying blindly")
                    .await;
                Vec::new()
            }
        };
        for record in existing
            .iter()
            .filter(|r| playbook.hosts.contains(&r.domain))
        {
            updates
                .summary(format!("Found conflicting record: {}", record.domain))
                .await;
            if let Err(err) = adapter.del_record(record).await {
                updates
                    .summary(format!(
                        "Failed to delete conflict {}: {}",
                        record.domain, err
                    ))
                    .await;
            }
        }

        let mut failed: Vec<String> = Vec::new();
        for (host, addr) in records {
            // Raw-IP passthrough entries get routes, never DNS records.
            if host.contains("in-addr") {
                continue;
            }
            let ip: IpAddr = match addr.parse() {
                Ok(ip) => ip,
                Err(err) => {
                    updates
                        .summary(format!("Skipping {}: bad address {}: {}", host, addr, err))
                        .await;
                    failed.push(host.clone());
                    continue;
                }
            };
            match adapter.add_record(DnsRecord::a(host.clone(), ip)).await {
                Ok(()) => {
                    updates
                        .summary(format!("Added {}\tIN\tA\t{}", host, addr))
                        .await;
                }
                Err(err) => {
                    updates
                        .summary(format!("Failed to add {}\tIN\tA\t{}: {}", host, addr, err))
                        .await;
                    failed.push(host.clone());
                }
            }
        }
        if let Err(err) = adapter.commit_records().await {
            return StepOutcome::Fatal(format!("Failed committing DNS changes: {}", err));
        }
        if !failed.is_empty() {
            updates
                .summary(format!(
                    "Following DNS records failed to add: {}. Manual intervention is likely needed",
                    failed.join(", ")
                ))
                .await;
        }
        StepOutcome::Continue
    }

    async fn step_persist(&self, env: &mut TaskEnv) -> StepOutcome {
        let Some(playbook) = env.playbook.as_ref() else {
            return StepOutcome::Fatal("No active playbook in task context".to_string());
        };
        if let Err(err) = self.store.put(playbook) {
            return StepOutcome::Fatal(format!("Failed updating playbook in db: {}", err));
        }
        self.update_updater_table();
        StepOutcome::Continue
    }

    /// Replace conflicting routes, then add one tagged route per resolved
    /// address through the playbook's interface.
    async fn step_apply_routes(&self, env: &mut TaskEnv, updates: &UpdateEmitter) -> StepOutcome {
        let (Some(playbook), Some(records)) = (env.playbook.as_ref(), env.dns_records.as_ref())
        else {
            return StepOutcome::Fatal("No playbook or records in task context".to_string());
        };
        updates.summary("Routes Summary:").await;
        let mut adapter = match self.adapters.routes(&playbook.adapters.routes) {
            Ok(adapter) => adapter,
            Err(err) => {
                return StepOutcome::Fatal(format!(
                    "Failed to create route adapter {}: {}",
                    playbook.adapters.routes, err
                ));
            }
        };
        if let Err(err) = adapter.authenticate(&playbook.adapter_config.routes).await {
            return StepOutcome::Fatal(format!(
                "Failed to authenticate on {}: {}",
                playbook.adapters.routes, err
            ));
        }
        updates.summary("Authenticated!").await;

        let current = match adapter.get_routes().await {
            Ok(current) => current,
            Err(err) => {
                return StepOutcome::Fatal(format!(
                    "Failed to get routes from {}: {}",
                    playbook.adapters.routes, err
                ));
            }
        };
        let conflicts: Vec<&Route> = current
            .iter()
            .filter(|route| {
                let ip = route
                    .destination
                    .split('/')
                    .next()
                    .unwrap_or(&route.destination);
                route.interface == playbook.interface && records.values().any(|addr| addr == ip)
            })
            .collect();
        if !conflicts.is_empty() {
            updates
                .summary("There are conflicts! The conflicting routes will be recreated!")
                .await;
            for route in conflicts {
                if let Err(err) = adapter.del_route(route).await {
                    return StepOutcome::Fatal(format!(
                        "Failed to delete a route {}: {}",
                        route.destination, err
                    ));
                }
            }
        }

        let mut failed: Vec<String> = Vec::new();
        for (host, addr) in records {
            let route = Route {
                destination: addr.clone(),
                gateway: "0.0.0.0".to_string(),
                interface: playbook.interface.clone(),
                comment: route_comment(&playbook.name, host),
            };
            match adapter.add_route(route).await {
                Ok(()) => {
                    updates
                        .emit(
                            StateCode::Routes,
                            format!("Routed {}\t->\t{}", addr, playbook.interface),
                        )
                        .await;
                }
                Err(err) => {
                    updates
                        .summary(format!("Failed to add a route {}: {}", addr, err))
                        .await;
                    failed.push(addr.clone());
                }
            }
        }
        updates.notify("Saving changes").await;
        if let Err(err) = adapter.save_config().await {
            updates
                .summary(format!("Failed saving device config: {}", err))
                .await;
        }
        if !failed.is_empty() {
            updates
                .summary(format!(
                    "Following routes failed to add: {}. Manual intervention is likely needed",
                    failed.join(", ")
                ))
                .await;
        }
        StepOutcome::Continue
    }

    /// Mark installed, stamp install time, unlock and persist.
    async fn step_finalize_apply(&self, env: &mut TaskEnv) -> StepOutcome {
        let Some(playbook) = env.playbook.as_mut() else {
            return StepOutcome::Fatal("No active playbook in task context".to_string());
        };
        playbook.installed = true;
        playbook.install_time = chrono::Utc::now().timestamp();
        playbook.unlock();
        if let Err(err) = self.store.put(playbook) {
            return StepOutcome::Fatal(format!(
                "Failed finalizing and updating playbook in db: {}",
                err
            ));
        }
        self.update_updater_table();
        StepOutcome::Continue
    }

    /// Look the undo target up and take its lock atomically through the
    /// store. A row that never finished installing is purged here, before any
    /// adapter is contacted.
    async fn step_prep_undo(&self, name: &str, env: &mut TaskEnv) -> StepOutcome {
        let existing = match self.store.get(name) {
            Ok(existing) => existing,
            Err(err) => return StepOutcome::Fatal(format!("Failed reading playbook db: {}", err)),
        };
        let Some(existing) = existing else {
            return StepOutcome::Fatal(format!("No such playbook {} installed!", name));
        };
        if !existing.installed {
            if let Err(err) = self.store.delete(name) {
                return StepOutcome::Fatal(format!("Failed removing playbook from db: {}", err));
            }
            self.update_updater_table();
            return StepOutcome::Fatal(
                "Such playbook exists, but didn't finish installing! Removing!".to_string(),
            );
        }
        match self.store.try_lock(name, "Undo") {
            Ok(LockOutcome::Acquired(playbook)) => {
                self.update_updater_table();
                env.playbook = Some(playbook);
                StepOutcome::Continue
            }
            Ok(LockOutcome::Busy(reason)) => StepOutcome::Fatal(format!(
                "Playbook is being processed at the moment (reason: {})!",
                reason
            )),
            Ok(LockOutcome::NotFound) => {
                StepOutcome::Fatal(format!("No such playbook {} installed!", name))
            }
            Err(err) => StepOutcome::Fatal(format!("Failed locking playbook in db: {}", err)),
        }
    }

    /// Delete the A records matching the playbook's hosts.
    async fn step_undo_dns(&self, env: &mut TaskEnv, updates: &UpdateEmitter) -> StepOutcome {
        let Some(playbook) = env.playbook.as_ref() else {
            return StepOutcome::Fatal("No active playbook in task context".to_string());
        };
        let mut adapter = match self.adapters.dns(&playbook.adapters.dns) {
            Ok(adapter) => adapter,
            Err(err) => {
                return StepOutcome::Fatal(format!(
                    "Failed to create dns adapter {}: {}",
                    playbook.adapters.dns, err
                ));
            }
        };
        if let Err(err) = adapter.authenticate(&playbook.adapter_config.dns).await {
            return StepOutcome::Fatal(format!(
                "Failed to authenticate on {}. Check credentials! {}",
                playbook.adapters.dns, err
            ));
        }
        updates.summary("Authenticated!").await;

        let existing = match adapter.get_records("A").await {
            Ok(existing) => existing,
            Err(err) => {
                updates
                    .summary(format!("Failed getting records: {}! Nothing to undo", err))
                    .await;
                Vec::new()
            }
        };
        let mut failed: Vec<String> = Vec::new();
        for record in existing
            .iter()
            .filter(|r| playbook.hosts.contains(&r.domain))
        {
            match adapter.del_record(record).await {
                Ok(()) => {
                    updates.summary(format!("Deleted {}", record.domain)).await;
                }
                Err(err) => {
                    updates
                        .summary(format!("Failed to delete {}: {}", record.domain, err))
                        .await;
                    failed.push(record.domain.clone());
                }
            }
        }
        if let Err(err) = adapter.commit_records().await {
            updates
                .summary(format!("Failed committing DNS changes: {}", err))
                .await;
        }
        if !failed.is_empty() {
            updates
                .summary(format!(
                    "Following DNS records failed to delete: {}. Manual intervention is likely needed",
                    failed.join(", ")
                ))
                .await;
        }
        StepOutcome::Continue
    }

    /// Remove the playbook's routes. Live routes are identified by their
    /// ownership tag; if the device's table is unavailable or empty, fall
    /// back to the persisted address cache.
    async fn step_undo_routes(&self, env: &mut TaskEnv, updates: &UpdateEmitter) -> StepOutcome {
        let Some(playbook) = env.playbook.as_ref() else {
            return StepOutcome::Fatal("No active playbook in task context".to_string());
        };
        updates
            .emit(
                StateCode::UndoRoutes,
                format!(
                    "Authenticating with {} route adapter...",
                    playbook.adapters.routes
                ),
            )
            .await;
        let mut adapter = match self.adapters.routes(&playbook.adapters.routes) {
            Ok(adapter) => adapter,
            Err(err) => {
                return StepOutcome::Fatal(format!(
                    "Failed to create route adapter {}: {}",
                    playbook.adapters.routes, err
                ));
            }
        };
        if let Err(err) = adapter.authenticate(&playbook.adapter_config.routes).await {
            return StepOutcome::Fatal(format!(
                "Failed to authenticate on {}: {}",
                playbook.adapters.routes, err
            ));
        }
        updates.summary("Authenticated!").await;

        updates
            .emit(
                StateCode::UndoRoutes,
                "Trying to get addresses from route addresses",
            )
            .await;
        let addrs: Vec<String> = match adapter.get_routes().await {
            Ok(current) if !current.is_empty() => {
                updates
                    .summary("Retrieved needed addresses from router adapter!")
                    .await;
                current
                    .iter()
                    .filter(|route| {
                        route.comment.contains(ROUTE_TAG) && route.comment.contains(&playbook.name)
                    })
                    .map(|route| route.destination.clone())
                    .collect()
            }
            _ => {
                updates.summary("Falling back to address cold storage!").await;
                playbook.playbook_addrs.values().cloned().collect()
            }
        };
        let mut failed: Vec<String> = Vec::new();
        for addr in &addrs {
            let route = Route {
                destination: addr.clone(),
                gateway: "0.0.0.0".to_string(),
                interface: playbook.interface.clone(),
                comment: String::new(),
            };
            match adapter.del_route(&route).await {
                Ok(()) => {
                    updates.summary(format!("Unrouted {}", addr)).await;
                }
                Err(_) => {
                    updates.summary(format!("Failed to unroute: {}", addr)).await;
                    failed.push(addr.clone());
                }
            }
        }
        if let Err(err) = adapter.save_config().await {
            updates
                .summary(format!("Failed saving device config: {}", err))
                .await;
        }
        if !failed.is_empty() {
            updates
                .summary(format!(
                    "Following routes failed to delete: {}. Manual intervention is likely needed",
                    failed.join(", ")
                ))
                .await;
        }
        StepOutcome::Continue
    }

    /// Drop the playbook's store row; the undo is complete.
    async fn step_finalize_undo(&self, env: &mut TaskEnv) -> StepOutcome {
        let Some(playbook) = env.playbook.as_ref() else {
            return StepOutcome::Fatal("No active playbook in task context".to_string());
        };
        if let Err(err) = self.store.delete(&playbook.name) {
            return StepOutcome::Fatal(format!("Failed removing playbook from db: {}", err));
        }
        self.update_updater_table();
        StepOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_comment_carries_playbook_and_host() {
        let comment = route_comment("home", "a.example.com");
        assert_eq!(comment, "[AutoVPN2] Playbook: home Host: a.example.com");
        assert!(comment.contains(ROUTE_TAG));
    }
}
