//! # Kinematics Benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use nalgebra::Vector2;
use swerve_lib::{
    geom::Rotation,
    kinematics::{desaturate_wheel_speeds, ChassisSpeeds, SwerveKinematics},
};

fn kinematics_benchmark(c: &mut Criterion) {
    let kin = SwerveKinematics::new([
        Vector2::new(0.2921, 0.2921),
        Vector2::new(0.2921, -0.2921),
        Vector2::new(-0.2921, 0.2921),
        Vector2::new(-0.2921, -0.2921),
    ])
    .unwrap();

    let speeds = ChassisSpeeds::new(2.5, -1.0, 3.0);
    let states = kin.to_module_states(speeds);

    c.bench_function("to_module_states", |b| {
        b.iter(|| kin.to_module_states(black_box(speeds)))
    });

    c.bench_function("to_chassis_speeds", |b| {
        b.iter(|| kin.to_chassis_speeds(black_box(&states)))
    });

    c.bench_function("discretize_and_desaturate", |b| {
        b.iter(|| {
            let d = ChassisSpeeds::discretize(black_box(speeds), 0.02).unwrap();
            let mut s = kin.to_module_states(d);
            desaturate_wheel_speeds(&mut s, 4.8).unwrap()
        })
    });

    c.bench_function("field_relative", |b| {
        b.iter(|| ChassisSpeeds::from_field_relative(black_box(speeds), Rotation::from_deg(37.0)))
    });
}

criterion_group!(benches, kinematics_benchmark);
criterion_main!(benches);
