use approx::assert_relative_eq;
use figment::providers::{Format, Toml};
use figment::Figment;
use ndarray::Axis;

use material_flow_engine::config::{Config, SystemKind};
use material_flow_engine::flow::{flow_name, MassBalanceTolerance, MfaSystem};
use material_flow_engine::EngineError;
use material_flow_engine::pipeline::{self, ModelRun};
use material_flow_engine::scenario;
use material_flow_engine::snapshot::SystemSnapshot;

const DEFAULT: &str = include_str!("../config/default.toml");
const SMALL: &str = r#"
[scenario]
regions = ["EU", "CN"]
goods = ["Construction", "Automotive", "Packaging"]
first_historic_year = 2000
historic_years = 5
future_years = 10
"#;
const HISTORIC: usize = 5;

fn config(system: &str) -> Config {
    config_with(system, "")
}

fn config_with(system: &str, overrides: &str) -> Config {
    Config::from_figment(
        Figment::new()
            .merge(Toml::string(DEFAULT))
            .merge(Toml::string(SMALL))
            .merge(Toml::string(&format!("[model]\nsystem = \"{system}\"")))
            .merge(Toml::string(overrides)),
    )
    .unwrap()
}

/// Newly allocated system with the same definition and parameters as `run`
fn fresh(run: &ModelRun) -> MfaSystem {
    MfaSystem::new(run.system.definition().clone(), run.system.parameters().clone()).unwrap()
}

fn run(config: &Config) -> ModelRun {
    let inputs = match config.model.system {
        SystemKind::Plastics => scenario::plastics(&config.scenario).unwrap(),
        SystemKind::Steel => scenario::steel(&config.scenario, config.model.steel_options()).unwrap(),
    };
    pipeline::run(config, inputs.dimensions, inputs.parameters).unwrap()
}

#[test]
fn test_plastics_per_capita_projection_grows_from_the_last_historic_year() {
    let run = run(&config("plastics"));
    assert_eq!(run.projected_stock.values().shape(), &[15, 2, 3]);

    let population = run.system.parameter("population").unwrap();
    let per_capita = run.projected_stock.div(population).unwrap();
    assert_eq!(per_capita.dims().letters(), vec!['t', 'r', 'g']);
    for lane in per_capita.values().lanes(Axis(0)) {
        for t in HISTORIC..lane.len() {
            assert!(
                lane[t] >= lane[t - 1] * (1.0 - 1e-9),
                "per-capita stock falls at period {t}: {} -> {}",
                lane[t - 1],
                lane[t]
            );
        }
    }
}

#[test]
fn test_plastics_projection_continues_history() {
    let run = run(&config("plastics"));
    let historic = run.historic.stock.level.values();
    let projected = run.projected_stock.values();
    let last = HISTORIC - 1;
    for (&h, &p) in historic
        .index_axis(Axis(0), last)
        .iter()
        .zip(projected.index_axis(Axis(0), last).iter())
    {
        assert_relative_eq!(p, h, max_relative = 1e-12);
    }
}

#[test]
fn test_plastics_first_future_flows_are_non_negative() {
    let run = run(&config("plastics"));
    let stock = &run.future.stock;
    for (side, values) in [("inflow", stock.inflow.values()), ("outflow", stock.outflow.values())] {
        for &value in values.index_axis(Axis(0), HISTORIC).iter() {
            assert!(value >= 0.0, "negative {side} {value}");
        }
    }
}

#[test]
fn test_plastics_mass_balance_holds_per_process() {
    let config = config("plastics");
    let run = run(&config);
    let balances = run.system.mass_balance().unwrap();
    assert_eq!(balances.len(), 18);
    for balance in &balances {
        assert!(
            balance.imbalance <= config.mass_balance.relative_tolerance * balance.throughput.max(1.0),
            "{balance:?}"
        );
    }
    let stock = run.system.stock("in_use").unwrap();
    stock.check_recurrence(1e-6).unwrap();
}

#[test]
fn test_steel_with_trade_respects_scrap_cap() {
    let config = config("steel");
    let run = run(&config);
    assert!(run.trade.is_some());
    assert!(run.scrap_trade.is_some());

    run.system
        .check_mass_balance(MassBalanceTolerance::Absolute(config.mass_balance.absolute_tolerance))
        .unwrap();
    let production = run.system.flow(&flow_name("production", "final_steel")).unwrap();
    let scrap = run.system.flow(&flow_name("usable_scrap", "production")).unwrap();
    let share = config.model.max_scrap_share_production;
    for (&used, &total) in scrap.values().iter().zip(production.values().iter()) {
        assert!(used <= share * total.max(0.0) + 1e-9, "{used} exceeds {share} x {total}");
        assert!(used >= -1e-12);
    }
    let trade = run.trade.as_ref().unwrap();
    assert_eq!(trade.imports().values().shape(), &[15, 2]);
}

#[test]
fn test_snapshot_of_a_run_restores() {
    let config = config("steel");
    let run = run(&config);
    let bytes = SystemSnapshot::capture(&run.system, &config).unwrap().to_bytes().unwrap();
    let restored = SystemSnapshot::from_bytes(&bytes)
        .unwrap()
        .restore(fresh(&run), &config)
        .unwrap();
    let name = flow_name("final_steel", "using");
    assert_eq!(restored.flow(&name).unwrap(), run.system.flow(&name).unwrap());
}

#[test]
fn test_snapshot_from_another_curve_strategy_is_stale() {
    let logistic = config("steel");
    let exponential = config_with("steel", "[model]\ncurve_strategy = \"Exponential_GDP_regression\"");
    let first = run(&logistic);
    let second = run(&exponential);

    let snapshot = SystemSnapshot::capture(&first.system, &logistic).unwrap();
    assert!(matches!(
        snapshot.restore(fresh(&second), &exponential),
        Err(EngineError::StaleSnapshot { .. })
    ));
}

#[test]
fn test_rejecting_negative_flows_names_them() {
    // EU imports far above its demand and its export share force negative EU production
    let config = config_with("steel", "[model]\nreject_negative_flows = true");
    let mut inputs = scenario::steel(&config.scenario, config.model.steel_options()).unwrap();
    let imports = inputs.parameters.get_mut("steel_imports").unwrap();
    imports.values_mut().index_axis_mut(Axis(1), 0).mapv_inplace(|v| v * 1e4);

    match pipeline::run(&config, inputs.dimensions, inputs.parameters) {
        Err(EngineError::NegativeFlows { flows }) => {
            assert!(flows.iter().any(|(name, _)| name == &flow_name("production", "final_steel")));
        }
        other => panic!("expected negative flows, got {:?}", other.map(|_| ())),
    }
}
