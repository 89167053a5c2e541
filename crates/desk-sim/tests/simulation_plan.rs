//! End-to-end replay of the reference scenarios and seeded simulations.

use desk_sim::{run_scenario, run_simulator, Scenario, SimulatorConfig};
use pretty_assertions::assert_eq;

fn simulate(config: SimulatorConfig) -> desk_sim::SimulatorReport {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(run_simulator(config))
}

/// Tenet: every reference scenario replays to a pass on the paused clock.
#[test]
fn reference_scenarios_pass() {
    for scenario in Scenario::ALL {
        let report = run_scenario(scenario).unwrap();
        assert!(report.passed, "{}", report.generate_text());
    }
}

/// Tenet: two edits inside the debounce delay commit exactly once, about
/// 3000ms after the second edit.
#[test]
fn debounce_scenario_commits_once() {
    let report = run_scenario(Scenario::A).unwrap();

    let commits: Vec<_> = report
        .lines
        .iter()
        .filter(|line| line.contains("commit("))
        .collect();
    assert_eq!(commits.len(), 1);
    assert!(commits[0].starts_with("t=400"));
    assert!(commits[0].ends_with("commit(\"ab\")"));
}

/// Tenet: the session invariants hold across seeds and heavy limits.
#[test]
fn seeded_simulations_hold_invariants() {
    for seed in [1, 7, 42, 1234, 9001] {
        for heavy_limit in [1, 2, 3] {
            let report = simulate(SimulatorConfig {
                seed,
                operations: 400,
                heavy_limit,
                stop_on_first_violation: false,
                ..SimulatorConfig::default()
            });
            assert!(report.passed(), "{}", report.generate_text());
        }
    }
}

/// Tenet: the same seed produces the same run.
#[test]
fn simulation_is_reproducible() {
    let config = SimulatorConfig {
        seed: 77,
        operations: 300,
        ..SimulatorConfig::default()
    };

    let first = simulate(config.clone());
    let second = simulate(config);

    assert_eq!(first.stats, second.stats);
    assert_eq!(first.open_tabs, second.open_tabs);
}
