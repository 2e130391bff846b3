//! Criterion benchmarks for parsing, annotation and corner shaping

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gcodeforge_core::{
    accelerate_out_of, annotate_file, decelerate_into, junction_speed, AccelerationProfile,
    GcodeFile, LineId, MoveType,
};

/// Concentric square perimeters, the worst case for corner shaping
fn perimeters(loops: usize) -> String {
    let mut text = String::from("G90\nM83\n;TYPE:Outer wall\nG1 X0 Y0 F3000\n");
    for i in 0..loops {
        let size = 10.0 + i as f64;
        for (x, y) in [(size, 0.0), (size, size), (0.0, size), (0.0, 0.0)] {
            text.push_str(&format!("G1 X{:.3} Y{:.3} E0.50000\n", x, y));
        }
    }
    text
}

fn bench_parse(c: &mut Criterion) {
    let text = perimeters(500);
    c.bench_function("parse_2000_moves", |b| {
        b.iter(|| GcodeFile::parse(black_box(&text)))
    });
}

fn bench_annotate(c: &mut Criterion) {
    let text = perimeters(500);
    c.bench_function("annotate_2000_moves", |b| {
        b.iter_batched(
            || GcodeFile::parse(&text),
            |mut file| annotate_file(&mut file),
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_profile_solve(c: &mut Criterion) {
    c.bench_function("profile_solve_uncached", |b| {
        let profile = AccelerationProfile::s_curve(0.2, 3000.0, 0.01, 10.0).unwrap();
        b.iter(|| profile.solve(black_box(43.0)).unwrap())
    });
}

fn bench_shape_corners(c: &mut Criterion) {
    let text = perimeters(50);
    c.bench_function("shape_200_corners", |b| {
        b.iter_batched(
            || {
                let mut file = GcodeFile::parse(&text);
                annotate_file(&mut file);
                file
            },
            |mut file| {
                let mut profile = AccelerationProfile::s_curve(0.2, 3000.0, 0.01, 10.0).unwrap();
                let corners: Vec<LineId> = file
                    .lines()
                    .filter(|id| {
                        let a = &file.line(*id).annotation;
                        a.move_type == Some(MoveType::MovingExtrude) && a.cos_theta.is_some()
                    })
                    .collect();
                for corner in corners {
                    if !file.contains_line(corner) {
                        continue;
                    }
                    let annotation = &file.line(corner).annotation;
                    let (Some(cos), Some(desired)) =
                        (annotation.cos_theta, annotation.desired_feed_mms)
                    else {
                        continue;
                    };
                    let speed = junction_speed(3000.0, 0.0138, cos, desired);
                    let Ok(samples) = profile.calc(speed, desired) else {
                        continue;
                    };
                    decelerate_into(&mut file, corner, &samples, 0.001);
                    accelerate_out_of(&mut file, corner, &samples, 0.001);
                }
                file
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_parse,
    bench_annotate,
    bench_profile_solve,
    bench_shape_corners
);
criterion_main!(benches);
