//! Seeded session simulator
//!
//! Drives one [`SessionManager`] with a random sequence of opens, focuses,
//! closes, double closes, cleanup registrations, clock advances and live
//! count changes. After every step it checks:
//! - At most one tab per resource
//! - Class limits (at open time) and the global heavy limit
//! - `lastAccessed` never moves backwards for an open tab
//! - Evictions pick the least recently accessed tab of their scope
//! - Each cleanup registration fires at most once, and an evicted
//!   resource's cleanup runs before the evicting tab is inserted

use chrono::{DateTime, Utc};
use desk_core::{
    CapacityPolicy, ManualClock, ResourceClass, ResourceId, SessionConfig, TracingNotifier,
};
use desk_session::{
    capacity_for, CloseOptions, CloseOutcome, LiveCounts, MemoryTabStore, OpenOutcome,
    OpenRequest, SessionError, SessionManager, Tab,
};
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Simulator configuration
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Number of operations to run
    /// Operations generated
    pub operations: u64,
    /// Global heavy-tab limit
    pub heavy_limit: usize,
    /// Size of the resource pool operations draw from; the last one is
    /// never available
    pub resources: u8,
    /// Stop at the first violation
    pub stop_on_first_violation: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            operations: 1000,
            heavy_limit: 3,
            resources: 12,
            stop_on_first_violation: true,
        }
    }
}

/// One simulated user or system action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedOperation {
    /// Open a resource as a tab
    Open {
        /// Resource to open
        resource: String,
        /// Its class
        class: ResourceClass,
        /// Whether it holds a heavy resource
        heavy: bool,
    },
    /// Focus an open (or unknown) resource
    Focus(String),
    /// Close once
    Close(String),
    /// Close twice in a row
    DoubleClose(String),
    /// Register a cleanup callback
    RegisterCleanup(String),
    /// Advance the tab clock
    Advance(u64),
    /// Change the live project count that bounds project tabs
    SetLiveProjects(usize),
}

/// An invariant broken during simulation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Two tabs for one resource
    DuplicateTab {
        /// Step index
        step: u64,
        /// Duplicated resource
        resource: String,
    },
    /// A class holds more tabs than its limit right after an open
    ClassCapacityExceeded {
        /// Step index
        step: u64,
        /// Class over its limit
        class: ResourceClass,
        /// Tabs of the class
        count: usize,
        /// Limit at the time
        limit: usize,
    },
    /// More heavy tabs than the global limit
    HeavyCapacityExceeded {
        /// Step index
        step: u64,
        /// Heavy tabs open
        count: usize,
    },
    /// An open tab's access time went backwards
    AccessWentBackwards {
        /// Step index
        step: u64,
        /// Affected resource
        resource: String,
    },
    /// An evicted tab was not the least recently accessed of its scope
    NotLeastRecentlyUsed {
        /// Step index
        step: u64,
        /// Evicted resource
        resource: String,
    },
    /// A cleanup fired more often than it was registered
    CleanupRepeated {
        /// Step index
        step: u64,
        /// Affected resource
        resource: String,
        /// Invocations seen
        invocations: usize,
        /// Registrations made
        registrations: usize,
    },
    /// An evicted resource's cleanup ran after the new tab existed
    CleanupAfterInsert {
        /// Step index
        step: u64,
        /// Evicted resource
        resource: String,
    },
    /// A sequential request was refused as busy
    UnexpectedBusy {
        /// Step index
        step: u64,
        /// Refused operation
        operation: SimulatedOperation,
    },
}

/// Counters for a simulation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatorStats {
    pub operations: u64,
    /// Fresh tabs opened
    pub opens: u64,
    /// Opens that focused an already open tab
    pub reuses: u64,
    /// Tabs evicted to make room
    pub evictions: u64,
    /// Explicit closes that removed a tab
    pub closes: u64,
    /// Cleanup callbacks that fired
    pub cleanups_invoked: u64,
    /// Opens refused as unavailable
    pub unavailable: u64,
}

/// Final report from the simulator
#[derive(Debug, Clone)]
pub struct SimulatorReport {
    /// Configuration the run used
    pub config: SimulatorConfig,
    /// Counters
    pub stats: SimulatorStats,
    /// Every broken invariant, in step order
    pub violations: Vec<Violation>,
    /// Tabs still open when the run ended
    pub open_tabs: usize,
}

impl SimulatorReport {
    /// Whether no invariant was broken
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Generate text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Desk Session Simulator Report ===\n\n");
        report.push_str(&format!("Seed: {}\n", self.config.seed));
        report.push_str(&format!("Heavy Limit: {}\n", self.config.heavy_limit));
        report.push_str(&format!("Operations: {}\n", self.stats.operations));
        report.push_str(&format!("Opens: {}\n", self.stats.opens));
        report.push_str(&format!("Reuses: {}\n", self.stats.reuses));
        report.push_str(&format!("Evictions: {}\n", self.stats.evictions));
        report.push_str(&format!("Closes: {}\n", self.stats.closes));
        report.push_str(&format!("Cleanups Invoked: {}\n", self.stats.cleanups_invoked));
        report.push_str(&format!("Unavailable Refusals: {}\n", self.stats.unavailable));
        report.push_str(&format!("Open Tabs At End: {}\n", self.open_tabs));
        report.push_str(&format!("Violations: {}\n", self.violations.len()));

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, v) in self.violations.iter().enumerate() {
                report.push_str(&format!("{}. {:?}\n", i + 1, v));
            }
        }

        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));
        report
    }
}

/// Cleanup bookkeeping shared with the registered callbacks
#[derive(Default)]
struct CleanupLedger {
    registrations: HashMap<String, usize>,
    invocations: HashMap<String, usize>,
    /// Resource being opened while evictions run
    opening: Option<ResourceId>,
    /// Evicted resources whose cleanup saw the new tab already present
    late: Vec<String>,
}

fn resource_class(index: u8) -> ResourceClass {
    match index % 3 {
        0 => ResourceClass::Project,
        1 => ResourceClass::Document,
        _ => ResourceClass::Generic,
    }
}

fn generate_operation(rng: &mut StdRng, resources: u8) -> SimulatedOperation {
    let index = rng.random_range(0..resources.max(1));
    let resource = format!("r{index}");
    match rng.random_range(0..100u32) {
        0..=34 => SimulatedOperation::Open {
            resource,
            class: resource_class(index),
            // Heaviness follows the resource, as a scene view would
            heavy: index % 2 == 0,
        },
        35..=49 => SimulatedOperation::Focus(resource),
        50..=64 => SimulatedOperation::Close(resource),
        65..=69 => SimulatedOperation::DoubleClose(resource),
        70..=84 => SimulatedOperation::RegisterCleanup(resource),
        85..=96 => SimulatedOperation::Advance(rng.random_range(0..250)),
        _ => SimulatedOperation::SetLiveProjects(rng.random_range(0..=3)),
    }
}

fn register_cleanup(
    session: &Arc<SessionManager>,
    ledger: &Arc<Mutex<CleanupLedger>>,
    resource: &str,
) {
    let id = ResourceId::new(resource);
    {
        let mut guard = ledger.lock();
        // A replaced registration is dropped uninvoked, so only count fresh ones
        if !session.cleanup_registry().contains(&id) {
            *guard.registrations.entry(resource.to_string()).or_insert(0) += 1;
        }
    }
    let weak: Weak<SessionManager> = Arc::downgrade(session);
    let ledger = Arc::clone(ledger);
    let key = resource.to_string();
    session.register_cleanup(id, move || {
        let opening = ledger.lock().opening.clone();
        let inserted_early = match (opening, weak.upgrade()) {
            (Some(opening), Some(session)) if opening.as_str() != key => session.contains(&opening),
            _ => false,
        };
        let mut guard = ledger.lock();
        *guard.invocations.entry(key.clone()).or_insert(0) += 1;
        if inserted_early {
            guard.late.push(key.clone());
        }
    });
}

/// Evicted tabs must be the oldest of their class or of the heavy set
fn lru_respected(before: &[Tab], evicted: &[Tab]) -> Option<String> {
    let mut remaining: Vec<Tab> = before.to_vec();
    for victim in evicted {
        let oldest_of = |keep: &dyn Fn(&Tab) -> bool| {
            remaining
                .iter()
                .filter(|t| keep(t))
                .map(|t| t.last_accessed)
                .min()
        };
        let class_oldest = oldest_of(&|t: &Tab| t.resource_class == victim.resource_class);
        let heavy_oldest = oldest_of(&|t: &Tab| t.heavy);
        let is_oldest = class_oldest == Some(victim.last_accessed)
            || (victim.heavy && heavy_oldest == Some(victim.last_accessed));
        if !is_oldest {
            return Some(victim.resource_id.to_string());
        }
        remaining.retain(|t| t.resource_id != victim.resource_id);
    }
    None
}

/// Run the session simulator
pub async fn run_simulator(config: SimulatorConfig) -> SimulatorReport {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let clock = ManualClock::at_epoch();
    let counts = Arc::new(LiveCounts::new());
    counts.set(ResourceClass::Project, 2);
    // The last resource of the pool is archived
    counts.mark_unavailable(ResourceId::new(format!(
        "r{}",
        config.resources.saturating_sub(1)
    )));

    let session_config = SessionConfig::new()
        .with_heavy_limit(config.heavy_limit)
        .with_policy(ResourceClass::Document, CapacityPolicy::Fixed { limit: 4 });
    let session = Arc::new(
        SessionManager::new(session_config.clone(), Arc::new(MemoryTabStore::new()))
            .with_clock(Arc::new(clock.clone()))
            .with_inputs(counts.clone())
            .with_notifier(Arc::new(TracingNotifier)),
    );
    let ledger = Arc::new(Mutex::new(CleanupLedger::default()));

    let mut stats = SimulatorStats::default();
    let mut violations = Vec::new();
    let mut last_seen: HashMap<ResourceId, DateTime<Utc>> = HashMap::new();

    for step in 0..config.operations {
        let operation = generate_operation(&mut rng, config.resources);
        tracing::trace!(step, ?operation, "simulating");
        stats.operations += 1;
        let before_violations = violations.len();

        match &operation {
            SimulatedOperation::Open {
                resource,
                class,
                heavy,
            } => {
                let before = session.tabs();
                ledger.lock().opening = Some(ResourceId::new(resource.as_str()));
                let request = OpenRequest::new(*class, resource.as_str(), resource.as_str())
                    .with_heavy(*heavy);
                let outcome = session.open(request).await;
                ledger.lock().opening = None;

                match &outcome {
                    OpenOutcome::Opened(report) => {
                        stats.opens += 1;
                        stats.evictions += report.evicted.len() as u64;
                        for tab in &report.evicted {
                            last_seen.remove(&tab.resource_id);
                        }
                        if let Some(resource) = lru_respected(&before, &report.evicted) {
                            violations.push(Violation::NotLeastRecentlyUsed { step, resource });
                        }
                        let limit = capacity_for(session_config.policy(*class), counts.as_ref());
                        if let Some(limit) = limit {
                            let count = session.count_class(*class);
                            if count > limit.max(1) {
                                violations.push(Violation::ClassCapacityExceeded {
                                    step,
                                    class: *class,
                                    count,
                                    limit,
                                });
                            }
                        }
                    }
                    OpenOutcome::Reused(_) => stats.reuses += 1,
                    OpenOutcome::Rejected(SessionError::Unavailable(_)) => {
                        stats.unavailable += 1;
                    }
                    OpenOutcome::Rejected(_) => violations.push(Violation::UnexpectedBusy {
                        step,
                        operation: operation.clone(),
                    }),
                }
            }
            SimulatedOperation::Focus(resource) => {
                let _ = session.focus(&ResourceId::new(resource.as_str()));
            }
            SimulatedOperation::Close(resource) | SimulatedOperation::DoubleClose(resource) => {
                let times = if matches!(operation, SimulatedOperation::DoubleClose(_)) {
                    2
                } else {
                    1
                };
                for _ in 0..times {
                    if close(&session, resource, &mut stats, &mut last_seen)
                        .await
                        .is_none()
                    {
                        violations.push(Violation::UnexpectedBusy {
                            step,
                            operation: operation.clone(),
                        });
                    }
                }
            }
            SimulatedOperation::RegisterCleanup(resource) => {
                register_cleanup(&session, &ledger, resource);
            }
            SimulatedOperation::Advance(ms) => clock.advance(Duration::from_millis(*ms)),
            SimulatedOperation::SetLiveProjects(n) => counts.set(ResourceClass::Project, *n),
        }

        check_invariants(
            &session,
            &config,
            &ledger,
            &mut last_seen,
            &mut violations,
            step,
        );

        if config.stop_on_first_violation && violations.len() > before_violations {
            tracing::warn!(step, "violation detected, stopping");
            break;
        }
    }

    stats.cleanups_invoked = ledger
        .lock()
        .invocations
        .values()
        .map(|n| *n as u64)
        .sum();

    SimulatorReport {
        config,
        stats,
        violations,
        open_tabs: session.len(),
    }
}

/// Silently close `resource`; `None` if the manager rejected the request
async fn close(
    session: &SessionManager,
    resource: &str,
    stats: &mut SimulatorStats,
    last_seen: &mut HashMap<ResourceId, DateTime<Utc>>,
) -> Option<()> {
    let id = ResourceId::new(resource);
    match session.close(&id, CloseOptions::silent()).await {
        CloseOutcome::Closed(_) => {
            stats.closes += 1;
            last_seen.remove(&id);
        }
        CloseOutcome::NotOpen { .. } => {}
        CloseOutcome::Rejected(_) => return None,
    }
    Some(())
}

fn check_invariants(
    session: &SessionManager,
    config: &SimulatorConfig,
    ledger: &Mutex<CleanupLedger>,
    last_seen: &mut HashMap<ResourceId, DateTime<Utc>>,
    violations: &mut Vec<Violation>,
    step: u64,
) {
    let tabs = session.tabs();

    let mut seen: HashMap<&ResourceId, usize> = HashMap::new();
    for tab in &tabs {
        *seen.entry(&tab.resource_id).or_insert(0) += 1;
    }
    for (resource, n) in seen {
        if n > 1 {
            violations.push(Violation::DuplicateTab {
                step,
                resource: resource.to_string(),
            });
        }
    }

    let heavy = session.heavy_count();
    if heavy > config.heavy_limit {
        violations.push(Violation::HeavyCapacityExceeded { step, count: heavy });
    }

    for tab in &tabs {
        if let Some(previous) = last_seen.insert(tab.resource_id.clone(), tab.last_accessed) {
            if tab.last_accessed < previous {
                violations.push(Violation::AccessWentBackwards {
                    step,
                    resource: tab.resource_id.to_string(),
                });
            }
        }
    }

    let mut guard = ledger.lock();
    for (resource, invocations) in &guard.invocations {
        let registrations = guard.registrations.get(resource).copied().unwrap_or(0);
        if *invocations > registrations {
            violations.push(Violation::CleanupRepeated {
                step,
                resource: resource.clone(),
                invocations: *invocations,
                registrations,
            });
        }
    }
    for resource in guard.late.drain(..) {
        violations.push(Violation::CleanupAfterInsert { step, resource });
    }
}
