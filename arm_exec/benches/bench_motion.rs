//! # Confirmed Motion Benchmark

use criterion::{criterion_group, criterion_main, Criterion};
use std::time::Duration;

use arm_lib::{
    arm_client::ArmTransport,
    arm_ctrl::{self, ArmCtrl},
    calib::{self, CalibRef},
    motion::{MotionCmd, MotionEngine, MoveOpts},
    pick_seq::{self, PickSeq},
    sim_arm::SimArm,
};
use comms_if::eqpt::arm::Joint;

fn motion_benchmark(c: &mut Criterion) {
    // ---- Confirmation overhead of a single motion ----

    let engine = MotionEngine::new(Duration::ZERO);
    let cmd = MotionCmd::AllJoints {
        base_deg: 45.0,
        shoulder_deg: -20.0,
        elbow_deg: 100.0,
        tool_deg: 10.0,
        opts: MoveOpts::default(),
    };

    c.bench_function("MotionEngine::execute", |b| {
        b.iter(|| {
            let mut sim = SimArm::new().settle_polls(5);
            engine.execute(&mut sim, &cmd).unwrap()
        })
    });

    // ---- Full pick choreography ----

    let mut pick_params: pick_seq::Params =
        util::params::parse(include_str!("../../params/pick_seq.toml")).unwrap();
    pick_params.settle_s = 0.0;
    let calib_params: calib::Params = util::params::parse(include_str!("../../params/calib.toml")).unwrap();
    let ctrl_params = arm_ctrl::Params {
        poll_interval_s: 0.0,
        ..Default::default()
    };

    c.bench_function("PickSeq::pick", |b| {
        b.iter(|| {
            let sim = SimArm::new();
            let reading = sim.reading();
            let arm = ArmCtrl::new(sim, ctrl_params.clone());
            let mut seq = PickSeq::new(arm, pick_params.clone(), calib_params.clone()).unwrap();
            seq.install_reference(CalibRef {
                base_angle_deg: -170.0,
                reading,
            });
            seq.pick(0).unwrap();
            seq.arm().device_state().gripper_open_deg
        })
    });

    let mut sim = SimArm::new();
    c.bench_function("SimArm::query_position", |b| {
        b.iter(|| {
            let r = sim.query_position().unwrap();
            sim.clear_requests();
            r.joint_deg.get(Joint::Base)
        })
    });
}

criterion_group!(benches, motion_benchmark);
criterion_main!(benches);
