//! Lost-update demo.
//!
//! This binary:
//! 1. Fires batches of unguarded deposits through a `PhasedExecutor` and
//!    reports how many were lost
//! 2. Repeats one batch with the deposits guarded
//! 3. Replays a single lost update deterministically with a `StageScheduler`
//!
//! Environment:
//! - `LOCKSTEP_THREADS` - workers per pulse (default 2)
//! - `LOCKSTEP_BATCH` - deposits per round (default 16)
//! - `LOCKSTEP_ROUNDS` - unguarded rounds (default 3)

mod ledger;
mod race;
mod script;
mod settings;

use lockstep_phased::PhasedExecutor;
use lockstep_stage::StageScheduler;
use tracing::{info, warn};

use crate::settings::Settings;

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lockstep_demo=info".parse()?),
        )
        .init();

    let settings = Settings::from_env();
    info!(?settings, "starting lockstep demo");

    let executor = PhasedExecutor::with_config(settings.executor.clone())?;

    let mut total_lost = 0;
    for round in 0..settings.rounds {
        let report = race::run_round(&executor, settings.batch, false)?;
        total_lost += report.lost_updates();
        info!(
            round,
            pulses = report.pulses,
            expected = report.expected,
            observed = report.observed,
            lost = report.lost_updates(),
            "unguarded round"
        );
    }
    if total_lost == 0 {
        warn!("no updates lost; try more threads or a larger batch");
    }

    let guarded = race::run_round(&executor, settings.batch, true)?;
    info!(
        expected = guarded.expected,
        observed = guarded.observed,
        lost = guarded.lost_updates(),
        "guarded round"
    );

    let mut scheduler = StageScheduler::new();
    let interleaved = script::lost_update(&mut scheduler, true)?;
    let serial = script::lost_update(&mut scheduler, false)?;
    info!(
        opening = script::OPENING,
        interleaved, serial, "scripted deposits of 10 and 20"
    );

    Ok(())
}
