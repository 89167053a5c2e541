//! Reference scenarios replayed on the paused tokio clock
//!
//! - `a`: two edits inside the debounce delay commit once, with the last value
//! - `b`: the fourth heavy tab evicts the least recently accessed one
//! - `c`: a failing autosave leaves open tabs untouched
//! - `d`: a derived project limit contracts and evicts on the next open

use desk_autosave::{commit_fn, AutosaveCoordinator, SyncStatus};
use desk_core::{
    AutosaveConfig, CapacityPolicy, ManualClock, ResourceClass, ResourceId, SessionConfig,
    TracingNotifier,
};
use desk_session::{LiveCounts, MemoryTabStore, OpenRequest, SessionManager};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Reference scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Debounce coalescing
    A,
    /// Heavy-tab LRU eviction
    B,
    /// Autosave failure isolation
    C,
    /// Derived capacity contraction
    D,
}

impl Scenario {
    /// All scenarios in order
    pub const ALL: [Scenario; 4] = [Self::A, Self::B, Self::C, Self::D];

    /// Parse a scenario name (`a`..`d`, case-insensitive)
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "a" => Some(Self::A),
            "b" => Some(Self::B),
            "c" => Some(Self::C),
            "d" => Some(Self::D),
            _ => None,
        }
    }

    /// One-line description
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::A => "edits at t=0 and t=1000 commit once at t=4000",
            Self::B => "heavy limit 3: opening r4 evicts r1",
            Self::C => "autosave failure leaves tab r1 untouched",
            Self::D => "project limit min(live, 2) with one live project evicts p1",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::A => "a",
            Self::B => "b",
            Self::C => "c",
            Self::D => "d",
        })
    }
}

/// Outcome of one scenario
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    /// Scenario that ran
    pub scenario: Scenario,
    /// Whether every expectation held
    pub passed: bool,
    /// Timeline of what happened
    pub lines: Vec<String>,
}

impl ScenarioReport {
    /// Generate text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = format!(
            "=== Scenario {}: {} ===\n",
            self.scenario,
            self.scenario.describe()
        );
        for line in &self.lines {
            report.push_str("  ");
            report.push_str(line);
            report.push('\n');
        }
        report.push_str(&format!(
            "=== Result: {} ===\n",
            if self.passed { "PASS" } else { "FAIL" }
        ));
        report
    }
}

/// Replay a scenario on a fresh paused runtime
///
/// # Errors
/// Returns an error if the runtime cannot be built.
pub fn run_scenario(scenario: Scenario) -> anyhow::Result<ScenarioReport> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()?;
    let (passed, lines) = runtime.block_on(async {
        match scenario {
            Scenario::A => debounce_coalescing().await,
            Scenario::B => heavy_lru_eviction().await,
            Scenario::C => autosave_failure_isolation().await,
            Scenario::D => derived_capacity().await,
        }
    });
    tracing::info!(%scenario, passed, "scenario replayed");
    Ok(ScenarioReport {
        scenario,
        passed,
        lines,
    })
}

fn session(config: SessionConfig, clock: &ManualClock) -> SessionManager {
    SessionManager::new(config, Arc::new(MemoryTabStore::new()))
        .with_clock(Arc::new(clock.clone()))
        .with_notifier(Arc::new(TracingNotifier))
}

fn ids(session: &SessionManager) -> Vec<String> {
    session
        .tabs()
        .into_iter()
        .map(|t| t.resource_id.to_string())
        .collect()
}

async fn debounce_coalescing() -> (bool, Vec<String>) {
    let start = Instant::now();
    let commits: Arc<Mutex<Vec<(Duration, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&commits);
    let target = commit_fn(move |value: String| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().push((start.elapsed(), value.clone()));
            Ok(value)
        }
    });
    let editor = AutosaveCoordinator::open(
        "draft",
        AutosaveConfig::default(),
        Arc::new(target),
        Arc::new(TracingNotifier),
        String::new(),
    );

    let mut lines = vec!["t=0ms edit(\"a\")".to_string()];
    editor.edit("a".to_string());
    sleep(Duration::from_millis(1000)).await;
    lines.push("t=1000ms edit(\"ab\")".to_string());
    editor.edit("ab".to_string());
    sleep(Duration::from_millis(3001)).await;

    let commits = commits.lock().clone();
    for (at, value) in &commits {
        lines.push(format!("t={}ms commit({value:?})", at.as_millis()));
    }
    lines.push(format!("status: {}", editor.status()));

    let passed = matches!(
        commits.as_slice(),
        [(at, value)] if value == "ab" && (4000..4002).contains(&at.as_millis())
    );
    (passed, lines)
}

async fn heavy_lru_eviction() -> (bool, Vec<String>) {
    let clock = ManualClock::at_epoch();
    let session = session(
        SessionConfig::new().without_policies().with_heavy_limit(3),
        &clock,
    );
    let released = Arc::new(AtomicUsize::new(0));
    let mut lines = Vec::new();

    for id in ["r1", "r2", "r3"] {
        session
            .open(OpenRequest::new(ResourceClass::Generic, id, id).heavy())
            .await;
        let counter = Arc::clone(&released);
        session.register_cleanup(ResourceId::new(id), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        lines.push(format!("t={}ms open({id})", clock_ms(&clock)));
        clock.advance(Duration::from_millis(100));
    }
    let outcome = session
        .open(OpenRequest::new(ResourceClass::Generic, "r4", "r4").heavy())
        .await;
    let evicted: Vec<String> = outcome
        .evicted()
        .iter()
        .map(|t| t.resource_id.to_string())
        .collect();
    lines.push(format!("t={}ms open(r4) evicted {evicted:?}", clock_ms(&clock)));
    lines.push(format!("open: {:?}", ids(&session)));

    let passed = evicted == ["r1"]
        && ids(&session) == ["r2", "r3", "r4"]
        && released.load(Ordering::SeqCst) == 1;
    (passed, lines)
}

async fn autosave_failure_isolation() -> (bool, Vec<String>) {
    let clock = ManualClock::at_epoch();
    let session = session(SessionConfig::new().without_policies(), &clock);
    session
        .open(OpenRequest::new(ResourceClass::Project, "r1", "r1"))
        .await;
    let before = session.tabs();

    let target = commit_fn(|_: String| async {
        Err::<String, _>(anyhow::anyhow!("backend rejected the update"))
    });
    let editor = AutosaveCoordinator::open(
        "feature",
        AutosaveConfig::default(),
        Arc::new(target),
        Arc::new(TracingNotifier),
        "v0".to_string(),
    );
    editor.edit("v1".to_string());
    sleep(Duration::from_millis(3001)).await;

    let status = editor.status();
    let unchanged = session.tabs() == before;
    let lines = vec![
        "open(r1)".to_string(),
        "edit(\"v1\") on an unrelated draft; commit fails".to_string(),
        format!("draft status: {status}"),
        format!("tabs unchanged: {unchanged}"),
    ];
    (status == SyncStatus::Failed && unchanged, lines)
}

async fn derived_capacity() -> (bool, Vec<String>) {
    let clock = ManualClock::at_epoch();
    let counts = Arc::new(LiveCounts::new());
    counts.set(ResourceClass::Project, 1);
    let session = session(
        SessionConfig::new().with_policy(
            ResourceClass::Project,
            CapacityPolicy::Derived {
                related: ResourceClass::Project,
                max: 2,
            },
        ),
        &clock,
    )
    .with_inputs(counts);

    session
        .open(OpenRequest::new(ResourceClass::Project, "p1", "p1"))
        .await;
    clock.advance(Duration::from_millis(100));
    let outcome = session
        .open(OpenRequest::new(ResourceClass::Project, "p2", "p2"))
        .await;
    let evicted: Vec<String> = outcome
        .evicted()
        .iter()
        .map(|t| t.resource_id.to_string())
        .collect();

    let lines = vec![
        "live projects: 1 (limit min(1, 2) = 1)".to_string(),
        "open(p1)".to_string(),
        format!("open(p2) evicted {evicted:?}"),
        format!("open: {:?}", ids(&session)),
    ];
    (evicted == ["p1"] && ids(&session) == ["p2"], lines)
}

fn clock_ms(clock: &ManualClock) -> i64 {
    use desk_core::Clock;
    clock.now().timestamp_millis()
}
