// lofront_replay/src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use lofront_core::frontend::Frontend;
use lofront_core::synchronizer::MeasurementSynchronizer;
use lofront_replay::cli::Cli;
use lofront_replay::config::load_frontend_config;
use lofront_replay::replay::replay;
use lofront_replay::session::Session;
use log::info;
use std::io::Write;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} - {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let cli = Cli::parse();
    let mut config = load_frontend_config(cli.config.as_deref())?;
    if cli.ground_truth_as_pose && !config.integration.use_pose_stamped_integration {
        info!("Ground truth fed as external pose; enabling pose integration");
        config.integration.use_pose_stamped_integration = true;
    }

    let session = Session::load(&cli.session)?;
    info!(
        "Session {}: {} scans, {} imu, {} odometry, {} poses, {} ground truth",
        cli.session.display(),
        session.scans.len(),
        session.imu.len(),
        session.odometry.len(),
        session.poses.len(),
        session.ground_truth.len()
    );

    let tf = session.tf();
    let mut frontend = Frontend::new(config, Some(&tf)).context("frontend failed to start")?;
    let mut sync = MeasurementSynchronizer::new();
    session.fill(&mut sync);

    let summary = replay(
        &mut frontend,
        &mut sync,
        &session.external_poses(),
        cli.ground_truth_as_pose,
    );
    sync.clear_messages();

    let t = summary.final_estimate.translation.vector;
    info!(
        "Replayed {}/{} scans: {} keyframes, {} map refreshes, {} rejected, {} seeded",
        summary.cycles,
        summary.scans,
        summary.keyframes,
        summary.map_refreshes,
        summary.rejected,
        summary.seeded
    );
    info!(
        "Final estimate: ({:.3}, {:.3}, {:.3}), yaw {:.3} rad",
        t.x,
        t.y,
        t.z,
        summary.final_estimate.rotation.euler_angles().2
    );
    if let Some(error) = summary.max_position_error {
        info!("Max position error against ground truth: {:.4} m", error);
    }
    Ok(())
}
