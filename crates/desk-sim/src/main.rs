use clap::{value_parser, Arg, ArgAction, Command};
use desk_sim::{run_scenario, run_simulator, Scenario, SimulatorConfig};

fn main() -> anyhow::Result<()> {
    desk_core::logging::init("warn");

    let cli = Command::new("desk-sim")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Desk session simulator and scenario runner")
        .subcommand_required(true)
        .subcommand(
            Command::new("simulate")
                .about("Run a seeded random session and check the tab invariants")
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("operations")
                        .long("operations")
                        .default_value("1000")
                        .value_parser(value_parser!(u64))
                        .help("Number of operations to simulate"),
                )
                .arg(
                    Arg::new("heavy-limit")
                        .long("heavy-limit")
                        .default_value("3")
                        .value_parser(value_parser!(usize))
                        .help("Maximum number of heavy tabs open at once"),
                )
                .arg(
                    Arg::new("keep-going")
                        .long("keep-going")
                        .action(ArgAction::SetTrue)
                        .help("Keep running after the first violation"),
                ),
        )
        .subcommand(
            Command::new("scenario")
                .about("Replay a reference scenario on the paused clock")
                .arg(
                    Arg::new("name")
                        .required(true)
                        .value_parser(["a", "b", "c", "d", "all"])
                        .help("Scenario to replay"),
                ),
        );

    let matches = cli.get_matches();

    let passed = match matches.subcommand() {
        Some(("simulate", args)) => {
            let config = SimulatorConfig {
                seed: args.get_one::<u64>("seed").copied().unwrap_or(42),
                operations: args.get_one::<u64>("operations").copied().unwrap_or(1000),
                heavy_limit: args.get_one::<usize>("heavy-limit").copied().unwrap_or(3),
                stop_on_first_violation: !args.get_flag("keep-going"),
                ..SimulatorConfig::default()
            };

            println!("Running desk session simulator...");
            println!("Seed: {}", config.seed);
            println!("Operations: {}", config.operations);
            println!("Heavy limit: {}", config.heavy_limit);
            println!();

            let runtime = tokio::runtime::Builder::new_current_thread().build()?;
            let report = runtime.block_on(run_simulator(config));
            println!("{}", report.generate_text());
            report.passed()
        }
        Some(("scenario", args)) => {
            let name = args.get_one::<String>("name").map_or("all", String::as_str);
            let selected: Vec<Scenario> = match Scenario::from_name(name) {
                Some(scenario) => vec![scenario],
                None => Scenario::ALL.to_vec(),
            };

            let mut passed = true;
            for scenario in selected {
                let report = run_scenario(scenario)?;
                println!("{}", report.generate_text());
                passed &= report.passed;
            }
            passed
        }
        _ => true,
    };

    std::process::exit(if passed { 0 } else { 1 });
}
