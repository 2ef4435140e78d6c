//! Main arm-side executable entry point.
//!
//! # Architecture
//!
//! Each run executes a single command against the arm (or the simulated arm with `--sim`):
//!
//!     - Initialise the session and logging
//!     - Load parameters
//!     - Connect to the arm
//!     - Execute the command:
//!         - Position readout
//!         - Reference calibration
//!         - Pick of a slot followed by pose transitions
//!         - Single joint jog
//!         - Teach mode
//!         - Relay switching
//!
//! Parameters are loaded from `$WORKCELL_SW_ROOT/params`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{info, warn};
use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};
use structopt::StructOpt;

// Internal
use arm_lib::{
    arm_client::{ArmClient, ArmTransport},
    arm_ctrl::{self, ArmCtrl},
    calib,
    motion::MoveOpts,
    params::ArmExecParams,
    pick_seq::{self, PickSeq},
    relay_client::{RelayClient, RelayOutput},
    sim_arm::SimArm,
};
use comms_if::eqpt::arm::Joint;
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
    time::seconds_to_duration,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Clothespin workcell arm executable
#[derive(Debug, StructOpt)]
#[structopt(name = "arm_exec")]
struct Opts {
    /// Run against the simulated arm instead of the real one
    #[structopt(long)]
    sim: bool,

    #[structopt(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, StructOpt)]
enum Cmd {
    /// Print the arm's position
    #[structopt(name = "position")]
    Position,

    /// Calibrate the base reference against its hard stop
    #[structopt(name = "calibrate")]
    Calibrate,

    /// Calibrate, pick a slot, then move the part through the given poses
    #[structopt(name = "pick")]
    Pick {
        /// Index of the slot to pick
        #[structopt(long)]
        index: usize,

        /// Poses to move the part to after picking, in order (inspect, burn, flip, finished, waste)
        #[structopt(long)]
        to: Vec<PoseTarget>,
    },

    /// Move a single joint
    #[structopt(name = "jog")]
    Jog {
        /// Joint to move (base, shoulder, elbow, tool)
        #[structopt(long)]
        joint: Joint,

        /// Target angle in degrees, gripper openness for the tool
        #[structopt(long, allow_hyphen_values = true)]
        angle: f64,
    },

    /// Release the torque lock and print the position until Enter is pressed
    #[structopt(name = "teach")]
    Teach,

    /// Switch or read a relay output
    #[structopt(name = "relay")]
    Relay {
        /// Relay channel, defaults to the air assist
        #[structopt(long)]
        channel: Option<u8>,

        #[structopt(long, conflicts_with = "off")]
        on: bool,

        #[structopt(long)]
        off: bool,
    },
}

/// Pose transitions which can follow a pick.
#[derive(Debug, Clone, Copy)]
enum PoseTarget {
    Inspect,
    Burn,
    Flip,
    Finished,
    Waste,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl FromStr for PoseTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inspect" => Ok(PoseTarget::Inspect),
            "burn" => Ok(PoseTarget::Burn),
            "flip" => Ok(PoseTarget::Flip),
            "finished" => Ok(PoseTarget::Finished),
            "waste" => Ok(PoseTarget::Waste),
            _ => Err(format!(
                "Unknown pose \"{}\", expected one of inspect, burn, flip, finished, waste",
                s
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opts = Opts::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("arm_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Clothespin Workcell Arm Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let exec_params: ArmExecParams =
        util::params::load("arm_exec.toml").wrap_err("Could not load exec params")?;
    let ctrl_params: arm_ctrl::Params =
        util::params::load("arm_ctrl.toml").wrap_err("Could not load ArmCtrl params")?;
    let calib_params: calib::Params =
        util::params::load("calib.toml").wrap_err("Could not load calibration params")?;
    let pick_params: pick_seq::Params =
        util::params::load("pick_seq.toml").wrap_err("Could not load PickSeq params")?;

    info!("Parameters loaded");

    // ---- EXECUTE ----

    let result = match opts.cmd {
        Cmd::Relay { channel, on, off } => relay(&exec_params, channel, on, off),
        cmd if opts.sim => {
            info!("Using the simulated arm");
            run(
                SimArm::new(),
                cmd,
                ctrl_params,
                calib_params,
                pick_params,
            )
        }
        cmd => ArmClient::new(
            &exec_params.arm_endpoint,
            seconds_to_duration(exec_params.request_timeout_s),
        )
        .wrap_err("Failed to initialise the ArmClient")
        .and_then(|client| {
            info!("ArmClient initialised for {}", client.url());
            run(client, cmd, ctrl_params, calib_params, pick_params)
        }),
    };

    session.exit();

    result
}

/// Execute an arm command.
fn run<T: ArmTransport>(
    transport: T,
    cmd: Cmd,
    ctrl_params: arm_ctrl::Params,
    calib_params: calib::Params,
    pick_params: pick_seq::Params,
) -> Result<(), Report> {
    let mut arm = ArmCtrl::new(transport, ctrl_params);

    match cmd {
        Cmd::Position => {
            let reading = arm.position().wrap_err("Could not read the arm's position")?;
            println!("{}", reading);
        }
        Cmd::Calibrate => {
            arm.init_position().wrap_err("Failed to initialise the arm")?;
            calib::calibrate(&mut arm, &calib_params).wrap_err("Calibration failed")?;
        }
        Cmd::Pick { index, to } => {
            arm.init_position().wrap_err("Failed to initialise the arm")?;

            let mut seq = PickSeq::new(arm, pick_params, calib_params)
                .wrap_err("Invalid slot table")?;

            seq.calibrate_reference_position()
                .wrap_err("Calibration failed")?;

            match seq.pick(index) {
                Ok(()) => (),
                Err(e) if e.is_skip() => {
                    warn!("{}", e);
                    return Ok(());
                }
                Err(e) => return Err(e).wrap_err(format!("Could not pick slot {}", index)),
            }

            for target in to {
                match target {
                    PoseTarget::Inspect => {
                        seq.move_to_optical_inspection()?;
                        seq.lift_from_optical_inspection()?;
                    }
                    PoseTarget::Burn => seq.move_to_burn_position()?,
                    PoseTarget::Flip => seq.flip_upside_down()?,
                    PoseTarget::Finished => seq.move_to_finished_position()?,
                    PoseTarget::Waste => seq.move_to_waste_position()?,
                }
            }
        }
        Cmd::Jog { joint, angle } => {
            let opts = MoveOpts {
                timeout_s: 10.0,
                ..Default::default()
            };
            let reading = arm
                .move_single_joint(joint, angle, opts)
                .wrap_err(format!("Could not move the {} joint", joint))?;
            info!("Arm at {}", reading);
        }
        Cmd::Teach => {
            let stop = Arc::new(AtomicBool::new(false));

            let stop_setter = stop.clone();
            thread::spawn(move || {
                let mut line = String::new();
                if let Err(e) = std::io::stdin().read_line(&mut line) {
                    warn!("Could not read from stdin: {}", e);
                }
                stop_setter.store(true, Ordering::Relaxed);
            });

            info!("Press Enter to exit teach mode");
            arm.teach_mode(&stop).wrap_err("Teach mode failed")?;
        }
        Cmd::Relay { .. } => return Err(eyre!("Relay commands do not use the arm")),
    }

    Ok(())
}

/// Switch or read a relay output.
fn relay(params: &ArmExecParams, channel: Option<u8>, on: bool, off: bool) -> Result<(), Report> {
    let channel = channel.unwrap_or(params.air_assist_channel);

    let mut client = RelayClient::new(
        &params.relay_endpoint,
        seconds_to_duration(params.request_timeout_s),
    )
    .wrap_err("Failed to initialise the RelayClient")?;

    if on || off {
        client
            .set_output(channel, on)
            .wrap_err(format!("Could not switch relay channel {}", channel))?;
        info!("Relay channel {} switched {}", channel, if on { "on" } else { "off" });
    } else {
        let state = client
            .output(channel)
            .wrap_err(format!("Could not read relay channel {}", channel))?;
        println!("Relay channel {} is {}", channel, if state { "on" } else { "off" });
    }

    Ok(())
}
