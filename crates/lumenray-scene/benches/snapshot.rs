use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec3;
use lumenray_scene::{build_snapshot, RtMaterial, Scene, SphereCollider, Transform};

fn populated_scene(count: usize) -> Scene {
    let mut scene = Scene::new();
    for i in 0..count {
        let x = (i % 32) as f32;
        let z = (i / 32) as f32;
        let material = (i % 3 == 0).then(RtMaterial::default);
        scene.spawn_sphere(
            format!("sphere_{i}"),
            Transform::from_position(Vec3::new(x, 0.5, z)),
            Some(SphereCollider::default()),
            material,
        );
    }
    scene
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_snapshot");
    for count in [16, 256, 4096] {
        let scene = populated_scene(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &scene, |b, scene| {
            b.iter(|| build_snapshot(black_box(scene)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_snapshot);
criterion_main!(benches);
