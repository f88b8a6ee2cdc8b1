//! Main swerve drivetrain executable entry point.
//!
//! # Architecture
//!
//! The executable runs the drivetrain against the simulated hardware:
//!
//!     - Initialise the session, logger and parameters
//!     - Build the simulated world, hardware and drivetrain
//!     - Main loop:
//!         - Control loop tick (script commands, drive, odometry, safe mode)
//!         - Archive the tick
//!         - Advance the simulation by one period
//!         - Sleep until the next period
//!
//! A drive script path may be given as the only argument. Without one the
//! robot stays disabled until stopped.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use swerve_lib::{
    driver::{self, script::DriveScript, teleop, ControlLoop, RobotMode, TickOutput},
    drivetrain::{self, Drivetrain},
    hal::sim::{all_module_hardware, heading_sensor, SimWorld},
};
use util::{
    archive::Archiver,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the executable itself.
#[derive(Debug, Deserialize)]
struct ExecParams {
    /// Minimum log level, one of `info`, `debug` or `trace`.
    log_level: String,

    /// Write a per-tick CSV archive into the session directory.
    archive: bool,

    /// Time constant of the simulated steering response.
    ///
    /// Units: seconds
    sim_steer_time_const_s: f64,

    /// Number of consecutive overrunning cycles before the executable stops.
    max_consec_overruns: u64,

    /// Parameters for the control loop.
    driver: driver::Params,
}

/// One archived tick.
#[derive(Serialize)]
struct TickRecord {
    time_s: f64,
    mode: RobotMode,
    safe: bool,
    x_m: f64,
    y_m: f64,
    heading_rad: f64,
    true_x_m: f64,
    true_y_m: f64,
    true_heading_rad: f64,
    vx_ms: Option<f64>,
    vy_ms: Option<f64>,
    omega_rads: Option<f64>,
    desaturation_factor: f64,
    num_faults: usize,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    let exec_params: ExecParams =
        util::params::load("swerve_exec.toml").wrap_err("Could not load exec params")?;
    exec_params
        .driver
        .validate()
        .wrap_err("Invalid control loop params")?;

    let session =
        Session::new("swerve_exec", "sessions").wrap_err("Failed to create the session")?;

    let level = LevelFilter::from_str(&exec_params.log_level)
        .wrap_err_with(|| format!("Invalid log level \"{}\"", exec_params.log_level))?;

    // The simulation traces every device access, keep it out of the log
    logger_init(level, &["swerve_lib::hal::sim"], &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Swerve Drivetrain Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let dt_params: drivetrain::Params =
        util::params::load("drivetrain.toml").wrap_err("Could not load drivetrain params")?;
    let teleop_params: teleop::Params =
        util::params::load("teleop.toml").wrap_err("Could not load teleop params")?;
    teleop_params
        .validate()
        .wrap_err("Invalid teleop params")?;

    info!("Parameters loaded");

    // ---- LOAD SCRIPT ----

    let args: Vec<String> = env::args().collect();

    debug!("CLI arguments: {:?}", args);

    let script = match args.len() {
        1 => {
            info!("No script provided, the robot will stay disabled\n");
            None
        }
        2 => {
            info!("Loading script from \"{}\"", &args[1]);

            let s = DriveScript::load(&args[1]).wrap_err("Failed to load script")?;

            info!(
                "Loaded script lasts {:.02} s and contains {} commands\n",
                s.duration_s(),
                s.num_remaining()
            );
            Some(s)
        }
        n => {
            return Err(eyre!(
                "Expected either zero or one argument, found {}",
                n - 1
            ))
        }
    };

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let world = SimWorld::new(
        dt_params.offsets(),
        dt_params.module,
        exec_params.sim_steer_time_const_s,
    )
    .wrap_err("Failed to build the simulation")?
    .into_shared();

    let drivetrain = Drivetrain::new(
        dt_params,
        all_module_hardware(&world),
        heading_sensor(&world),
    )
    .wrap_err("Failed to initialise the drivetrain")?;
    info!("Drivetrain init complete");

    let period_s = exec_params.driver.cycle_period_s;
    let mut control_loop = ControlLoop::new(
        exec_params.driver,
        drivetrain,
        teleop::Teleop::new(teleop_params),
        script,
    );

    let mut archiver = if exec_params.archive {
        Some(Archiver::from_path(&session, "drive.csv").wrap_err("Failed to create the archive")?)
    } else {
        None
    };

    info!("Module initialisation complete\n");

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let mut num_consec_overruns = 0u64;

    loop {
        let cycle_start_instant = Instant::now();
        let time_s = control_loop.num_cycles() as f64 * period_s;

        let out = control_loop.tick(time_s);

        if let Some(ref mut a) = archiver {
            let true_pose = world.borrow().true_pose();
            if let Err(e) = a.serialise(record(time_s, &out, true_pose)) {
                warn!("Could not archive the tick: {}", e);
            }
        }

        world.borrow_mut().step(period_s);

        if control_loop.script_done() && args.len() == 2 {
            info!("Script complete, stopping");
            break;
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        match Duration::from_secs_f64(period_s).checked_sub(cycle_dur) {
            Some(d) => {
                num_consec_overruns = 0;
                thread::sleep(d)
            }
            None => {
                num_consec_overruns += 1;
                warn!(
                    "Cycle overran by {:.06} s ({} consecutive)",
                    cycle_dur.as_secs_f64() - period_s,
                    num_consec_overruns
                );

                if num_consec_overruns > exec_params.max_consec_overruns {
                    return Err(eyre!(
                        "Exceeded the limit of {} consecutive overruns",
                        exec_params.max_consec_overruns
                    ));
                }
            }
        }
    }

    info!(
        "Final pose estimate {}, true pose {}",
        control_loop.drivetrain().pose(),
        world.borrow().true_pose()
    );

    info!("End of execution");

    Ok(())
}

fn record(time_s: f64, out: &TickOutput, true_pose: swerve_lib::geom::Pose2d) -> TickRecord {
    TickRecord {
        time_s,
        mode: out.mode,
        safe: out.safe,
        x_m: out.pose.position_m.x,
        y_m: out.pose.position_m.y,
        heading_rad: out.pose.heading.rad(),
        true_x_m: true_pose.position_m.x,
        true_y_m: true_pose.position_m.y,
        true_heading_rad: true_pose.heading.rad(),
        vx_ms: out.measured.map(|m| m.vx_ms),
        vy_ms: out.measured.map(|m| m.vy_ms),
        omega_rads: out.measured.map(|m| m.omega_rads),
        desaturation_factor: out.report.desaturation_factor,
        num_faults: out.report.faults.len(),
    }
}
