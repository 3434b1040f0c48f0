//! End-to-end task flows against a real sled store, mock network adapters and
//! a static resolver.

use async_trait::async_trait;
use autovpn::adapters::{AdapterRegistry, DnsAdapter, DnsRecord, Route, RouteAdapter};
use autovpn::error::AdapterError;
use autovpn::playbook::Playbook;
use autovpn::resolve::StaticResolver;
use autovpn::server::{ServerCore, TaskOperation, TaskRequest};
use autovpn::store::{PlaybookStore, SledPlaybookStore};
use autovpn::task::{StateCode, TaskStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    DnsAdd(String, String),
    DnsDel(String),
    RouteAdd { dest: String, comment: String },
    RouteDel(String),
}

/// Shared backend state the mock adapters read and mutate, so tests can
/// assert the exact order of operations across both adapters.
#[derive(Default)]
struct MockState {
    events: Vec<Event>,
    dns_table: Vec<DnsRecord>,
    route_table: Vec<Route>,
    fail_get_routes: bool,
}

struct MockDns(Arc<Mutex<MockState>>);

#[async_trait]
impl DnsAdapter for MockDns {
    async fn authenticate(&mut self, _config: &HashMap<String, String>) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn get_records(&self, rtype: &str) -> Result<Vec<DnsRecord>, AdapterError> {
        Ok(self
            .0
            .lock()
            .dns_table
            .iter()
            .filter(|r| r.rtype == rtype)
            .cloned()
            .collect())
    }

    async fn add_record(&self, record: DnsRecord) -> Result<(), AdapterError> {
        let mut state = self.0.lock();
        state
            .events
            .push(Event::DnsAdd(record.domain.clone(), record.addr.to_string()));
        state.dns_table.push(record);
        Ok(())
    }

    async fn del_record(&self, record: &DnsRecord) -> Result<(), AdapterError> {
        let mut state = self.0.lock();
        state.events.push(Event::DnsDel(record.domain.clone()));
        state.dns_table.retain(|r| r.domain != record.domain);
        Ok(())
    }

    async fn commit_records(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}

struct MockRoutes(Arc<Mutex<MockState>>);

#[async_trait]
impl RouteAdapter for MockRoutes {
    async fn authenticate(&mut self, _config: &HashMap<String, String>) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn get_routes(&self) -> Result<Vec<Route>, AdapterError> {
        let state = self.0.lock();
        if state.fail_get_routes {
            return Err(AdapterError::Operation("device unreachable".to_string()));
        }
        Ok(state.route_table.clone())
    }

    async fn add_route(&self, route: Route) -> Result<(), AdapterError> {
        let mut state = self.0.lock();
        state.events.push(Event::RouteAdd {
            dest: route.destination.clone(),
            comment: route.comment.clone(),
        });
        state.route_table.push(route);
        Ok(())
    }

    async fn del_route(&self, route: &Route) -> Result<(), AdapterError> {
        let mut state = self.0.lock();
        state.events.push(Event::RouteDel(route.destination.clone()));
        state
            .route_table
            .retain(|r| r.destination != route.destination);
        Ok(())
    }

    async fn save_config(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}

fn harness() -> (Arc<ServerCore>, Arc<Mutex<MockState>>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = SledPlaybookStore::open(dir.path().join("books.db")).unwrap();

    let state = Arc::new(Mutex::new(MockState::default()));
    let mut registry = AdapterRegistry::with_builtins();
    let dns_state = state.clone();
    registry.register_dns("mock", move || Box::new(MockDns(dns_state.clone())));
    let route_state = state.clone();
    registry.register_routes("mock", move || Box::new(MockRoutes(route_state.clone())));

    let mut table = HashMap::new();
    table.insert("a.example.com".to_string(), "1.2.3.4".to_string());
    table.insert("c.example.com".to_string(), "5.6.7.8".to_string());

    let core = Arc::new(ServerCore::new(
        Arc::new(store),
        registry,
        Box::new(StaticResolver::new(table)),
    ));
    (core, state, dir)
}

async fn run(core: &Arc<ServerCore>, operation: TaskOperation, argv: &[&str]) -> Vec<TaskStatus> {
    let mut rx = core.execute_task(TaskRequest {
        operation,
        argv: argv.iter().map(|s| s.to_string()).collect(),
    });
    let mut statuses = Vec::new();
    while let Some(status) = rx.recv().await {
        statuses.push(status);
    }
    statuses
}

fn failed(statuses: &[TaskStatus]) -> bool {
    statuses
        .last()
        .map(|s| s.state_code == StateCode::Error)
        .unwrap_or(true)
}

const HOME: &str = r#"
name: home
adapters:
  dns: mock
  routes: mock
interface: wg0
hosts:
  - a.example.com
custom:
  b.local: 10.0.0.5
auto_update_interval: 24
"#;

#[tokio::test]
async fn apply_installs_dns_and_routes() {
    let (core, state, _dir) = harness();
    let statuses = run(&core, TaskOperation::Apply, &[HOME]).await;
    assert!(!failed(&statuses), "apply failed: {:?}", statuses.last());

    let events = state.lock().events.clone();
    let dns_adds: Vec<&Event> = events
        .iter()
        .filter(|e| matches!(e, Event::DnsAdd(..)))
        .collect();
    assert_eq!(dns_adds.len(), 2);
    assert!(events.contains(&Event::DnsAdd(
        "a.example.com".to_string(),
        "1.2.3.4".to_string()
    )));
    assert!(events.contains(&Event::DnsAdd(
        "b.local".to_string(),
        "10.0.0.5".to_string()
    )));

    let route_adds: Vec<&Event> = events
        .iter()
        .filter(|e| matches!(e, Event::RouteAdd { .. }))
        .collect();
    assert_eq!(route_adds.len(), 2);
    for event in route_adds {
        if let Event::RouteAdd { comment, .. } = event {
            assert!(comment.contains("Playbook: home"), "comment: {comment}");
        }
    }

    let row = core.store().get("home").unwrap().unwrap();
    assert!(row.installed);
    assert!(!row.busy);
    assert!(row.install_time > 0);
    assert_eq!(row.playbook_addrs.len(), 2);
    assert_eq!(row.playbook_addrs.get("a.example.com").unwrap(), "1.2.3.4");

    // Installed and idle, so the auto-updater tracks it.
    assert_eq!(core.updater().entries(), vec!["home".to_string()]);
}

#[tokio::test]
async fn undo_falls_back_to_cached_addresses() {
    let (core, state, _dir) = harness();
    let statuses = run(&core, TaskOperation::Apply, &[HOME]).await;
    assert!(!failed(&statuses));

    {
        let mut state = state.lock();
        state.events.clear();
        state.fail_get_routes = true;
    }

    let statuses = run(&core, TaskOperation::Undo, &["home"]).await;
    assert!(!failed(&statuses), "undo failed: {:?}", statuses.last());

    let events = state.lock().events.clone();
    let route_dels: Vec<&Event> = events
        .iter()
        .filter(|e| matches!(e, Event::RouteDel(_)))
        .collect();
    // One deletion per cached address when the device table is unavailable.
    assert_eq!(route_dels.len(), 2);
    assert!(events.contains(&Event::RouteDel("1.2.3.4".to_string())));
    assert!(events.contains(&Event::RouteDel("10.0.0.5".to_string())));
    assert!(events.contains(&Event::DnsDel("a.example.com".to_string())));

    assert!(core.store().get("home").unwrap().is_none());
    assert!(core.updater().entries().is_empty());
}

#[tokio::test]
async fn reapply_tears_down_old_definition_first() {
    let (core, state, _dir) = harness();
    let statuses = run(&core, TaskOperation::Apply, &[HOME]).await;
    assert!(!failed(&statuses));
    state.lock().events.clear();

    let updated = HOME.replace("a.example.com", "c.example.com");
    let statuses = run(&core, TaskOperation::Apply, &[updated.as_str()]).await;
    assert!(!failed(&statuses), "reapply failed: {:?}", statuses.last());

    let events = state.lock().events.clone();
    let last_del = events
        .iter()
        .rposition(|e| matches!(e, Event::DnsDel(_) | Event::RouteDel(_)))
        .expect("teardown happened");
    let first_add = events
        .iter()
        .position(|e| matches!(e, Event::DnsAdd(..) | Event::RouteAdd { .. }))
        .expect("reinstall happened");
    assert!(
        last_del < first_add,
        "teardown must precede reinstall: {:?}",
        events
    );
    assert!(events.contains(&Event::DnsDel("a.example.com".to_string())));
    assert!(events.contains(&Event::DnsAdd(
        "c.example.com".to_string(),
        "5.6.7.8".to_string()
    )));

    let row = core.store().get("home").unwrap().unwrap();
    assert!(row.installed);
    assert!(!row.busy);
    assert_eq!(row.hosts, vec!["c.example.com"]);
    assert_eq!(core.store().get_all().unwrap().len(), 1);
}

#[tokio::test]
async fn undo_purges_half_installed_playbook() {
    let (core, state, _dir) = harness();
    let mut partial = Playbook::parse(HOME).unwrap();
    partial.installed = false;
    core.store().put(&partial).unwrap();

    let statuses = run(&core, TaskOperation::Undo, &["home"]).await;
    assert!(failed(&statuses));
    assert!(statuses
        .last()
        .unwrap()
        .state_text
        .contains("didn't finish installing"));

    assert!(core.store().get("home").unwrap().is_none());
    assert!(state.lock().events.is_empty());
}

#[tokio::test]
async fn unknown_adapter_kind_fails_and_leaves_row_locked() {
    let (core, state, _dir) = harness();
    let bogus = HOME.replace("dns: mock", "dns: bogus");
    let statuses = run(&core, TaskOperation::Apply, &[bogus.as_str()]).await;
    assert!(failed(&statuses));
    assert!(statuses.last().unwrap().state_text.contains("bogus"));

    // The failure struck after lock_add, so the row stays locked for the
    // operator to inspect.
    let row = core.store().get("home").unwrap().unwrap();
    assert!(!row.installed);
    assert!(row.busy);
    assert_eq!(row.busy_reason, "Apply");
    assert!(state
        .lock()
        .events
        .iter()
        .all(|e| !matches!(e, Event::DnsAdd(..))));
}

#[tokio::test]
async fn busy_playbook_blocks_undo() {
    let (core, _state, _dir) = harness();
    let mut row = Playbook::parse(HOME).unwrap();
    row.installed = true;
    assert!(row.lock("Apply"));
    core.store().put(&row).unwrap();

    let statuses = run(&core, TaskOperation::Undo, &["home"]).await;
    assert!(failed(&statuses));
    assert!(statuses
        .last()
        .unwrap()
        .state_text
        .contains("(reason: Apply)"));
    assert!(core.store().get("home").unwrap().is_some());
}

#[tokio::test]
async fn list_reports_playbook_names() {
    let (core, _state, _dir) = harness();
    let statuses = run(&core, TaskOperation::Apply, &[HOME]).await;
    assert!(!failed(&statuses));

    let statuses = run(&core, TaskOperation::List, &[]).await;
    assert!(!failed(&statuses));
    let listing = statuses
        .iter()
        .find(|s| s.state_code == StateCode::List && !s.state_text.is_empty())
        .expect("list output");
    assert!(listing.state_text.contains("home"));
}

#[tokio::test]
async fn malformed_playbook_yields_single_error() {
    let (core, _state, _dir) = harness();
    let statuses = run(&core, TaskOperation::Apply, &[": not yaml ["]).await;
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].state_code, StateCode::Error);
}

#[tokio::test]
async fn raw_ip_hosts_are_routed_but_not_dns_registered() {
    let (core, state, _dir) = harness();
    let raw = r#"
name: rawip
adapters:
  dns: mock
  routes: mock
interface: wg0
hosts:
  - 10.1.2.3
"#;
    let statuses = run(&core, TaskOperation::Apply, &[raw]).await;
    assert!(!failed(&statuses), "apply failed: {:?}", statuses.last());

    let events = state.lock().events.clone();
    assert!(events.iter().all(|e| !matches!(e, Event::DnsAdd(..))));
    assert!(events.contains(&Event::RouteAdd {
        dest: "10.1.2.3".to_string(),
        comment: "[AutoVPN2] Playbook: rawip Host: 3.2.1.10.in-addr.arpa".to_string(),
    }));
}
