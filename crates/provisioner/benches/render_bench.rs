//! 로드 밸런서 설정 생성 및 요청 지문 벤치마크

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use testbed_core::types::ProjectName;
use testbed_provisioner::services::{
    CacheParams, LoadBalancerParams, cache_descriptor, load_balancer_descriptor,
};
use testbed_provisioner::{render_nginx_config, spec_fingerprint};

fn upstreams(project: &ProjectName, count: usize) -> Vec<String> {
    (1..=count).map(|k| project.replica_alias(k)).collect()
}

fn bench_render(c: &mut Criterion) {
    let project = ProjectName::new("bench").unwrap();
    let mut group = c.benchmark_group("render_nginx_config");
    for count in [1usize, 4, 16] {
        let servers = upstreams(&project, count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &servers, |b, servers| {
            b.iter(|| render_nginx_config(black_box(servers)));
        });
    }
    group.finish();
}

fn bench_fingerprint(c: &mut Criterion) {
    let project = ProjectName::new("bench").unwrap();
    let cache = cache_descriptor(&project, &CacheParams::default());
    let lb = load_balancer_descriptor(
        &project,
        &LoadBalancerParams {
            upstreams: upstreams(&project, 4),
            ..LoadBalancerParams::default()
        },
    )
    .unwrap();

    c.bench_function("spec_fingerprint_cache", |b| {
        b.iter(|| spec_fingerprint(black_box(&cache)));
    });
    c.bench_function("spec_fingerprint_load_balancer", |b| {
        b.iter(|| spec_fingerprint(black_box(&lb)));
    });
}

criterion_group!(benches, bench_render, bench_fingerprint);
criterion_main!(benches);
