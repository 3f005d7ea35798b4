use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{seq::SliceRandom, thread_rng, Rng};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use travel_route_planner::cache::{create_cache_key, ResponseCache, FLIGHTS_NAMESPACE};
use travel_route_planner::geo::{Coordinates, TravelMode};
use travel_route_planner::models::Objective;
use travel_route_planner::optimizer::nearest_neighbor_order;
use travel_route_planner::CacheConfig;

// Mixed read/write load on the response cache from several threads
pub fn cache_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_cache");

    for key_space in [100usize, 1_000, 10_000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(key_space),
            key_space,
            |b, &key_space| {
                let routes = ["CDG", "LHR", "FCO", "MAD", "JFK", "AMS"];
                let dates = (1..29)
                    .map(|d| format!("2025-06-{:02}", d))
                    .collect::<Vec<_>>();

                b.iter(|| {
                    let cache = Arc::new(ResponseCache::new(CacheConfig::default()));
                    let ttl = Duration::from_secs(300);

                    let mut handles = vec![];
                    for _ in 0..4 {
                        let cache = Arc::clone(&cache);
                        let dates = dates.clone();

                        let handle = thread::spawn(move || {
                            let mut rng = thread_rng();
                            for _ in 0..250 {
                                let origin = routes.choose(&mut rng).unwrap();
                                let destination = routes.choose(&mut rng).unwrap();
                                let date = dates.choose(&mut rng).unwrap();
                                let pax = (rng.gen_range(0..key_space) % 9 + 1).to_string();
                                let key = create_cache_key(
                                    FLIGHTS_NAMESPACE,
                                    &[*origin, *destination, date.as_str(), pax.as_str()],
                                );

                                if rng.gen_bool(0.3) {
                                    cache.insert(&key, &vec![rng.gen::<f64>(); 8], ttl);
                                } else {
                                    let _ = cache.get::<Vec<f64>>(&key);
                                }
                            }
                        });
                        handles.push(handle);
                    }

                    for handle in handles {
                        handle.join().unwrap();
                    }

                    black_box(cache.stats())
                });
            },
        );
    }

    group.finish();
}

pub fn get_or_compute_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let cache = ResponseCache::default();
    let ttl = Duration::from_secs(300);

    c.bench_function("get_or_compute_hit", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let value: Result<u64, String> = cache
                    .get_or_compute("routes:bench", ttl, || async { Ok(42u64) })
                    .await;
                black_box(value)
            })
        });
    });
}

pub fn optimizer_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("nearest_neighbor");
    let mut rng = thread_rng();
    let start = Coordinates::new(48.85, 2.35).unwrap();

    for stops in [10usize, 50, 200].iter() {
        let points = (0..*stops)
            .map(|_| {
                Coordinates::new(rng.gen_range(35.0..60.0), rng.gen_range(-10.0..25.0)).unwrap()
            })
            .collect::<Vec<_>>();

        group.bench_with_input(BenchmarkId::from_parameter(stops), &points, |b, points| {
            b.iter(|| {
                black_box(
                    nearest_neighbor_order(&start, points, TravelMode::Driving, Objective::Distance)
                        .unwrap(),
                )
            });
        });
    }

    group.finish();
}

criterion_group!(benches, cache_benchmark, get_or_compute_benchmark, optimizer_benchmark);
criterion_main!(benches);
