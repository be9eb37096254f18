use anyhow::{Context, Result};
use material_flow_engine::{config, pipeline, scenario, snapshot, telemetry};
use config::{Config, SystemKind};
use telemetry::init_tracing;
use tracing::{info, warn};

fn main() -> Result<()> {
    init_tracing();

    let cfg = Config::load()?;
    info!(system = ?cfg.model.system, strategy = %cfg.model.curve_strategy, "starting Material Flow Engine");

    let inputs = match cfg.model.system {
        SystemKind::Plastics => scenario::plastics(&cfg.scenario),
        SystemKind::Steel => scenario::steel(&cfg.scenario, cfg.model.steel_options()),
    }
    .context("building synthetic scenario")?;

    let run = pipeline::run(&cfg, inputs.dimensions, inputs.parameters).context("model run failed")?;

    for balance in run.system.mass_balance()? {
        info!(process = %balance.process, imbalance = balance.imbalance, throughput = balance.throughput, "process balance");
    }
    if !run.negative_inflows().is_empty() {
        warn!(count = run.negative_inflows().len(), "negative inflows kept in the projection");
    }

    let bytes = snapshot::SystemSnapshot::capture(&run.system, &cfg)?.to_bytes()?;
    info!(snapshot_bytes = bytes.len(), "run finished");
    Ok(())
}
