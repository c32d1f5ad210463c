use std::sync::Arc;
use std::time::Duration;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use nonzero_ext::nonzero;
use tollgate::{Bucket, FastClock, Limit, ManualClock, QuantaClock, Registry, StdClock, Timestamp};

fn bench_draw(c: &mut Criterion) {
    let clock = quanta::Clock::new();
    let limit = Limit::per_second(nonzero!(10_000u32));
    let _quanta_thread = quanta::Upkeep::new_with_clock(Duration::from_micros(10), clock.clone())
        .start()
        .unwrap();
    let fast_bucket = Bucket::with_clock(limit, FastClock::new(clock));
    let quanta_bucket = Bucket::with_clock(limit, QuantaClock::default());
    let std_bucket = Bucket::with_clock(limit, StdClock::default());
    let mut group = c.benchmark_group("bucket");
    group
        .throughput(Throughput::Elements(1))
        .sample_size(100)
        .bench_function("draw-manual-clock", |b| {
            let clock = ManualClock::new(Timestamp::from_secs(10));
            let bucket = Bucket::with_clock(limit, &clock);
            b.iter(|| {
                let _x = std::hint::black_box(bucket.draw(1));
            });
        })
        .bench_function("draw-at-explicit-time", |b| {
            let bucket = Bucket::new(limit);
            let mut now = Timestamp::from_secs(10);
            b.iter(|| {
                now = now + Duration::from_micros(100);
                let _x = std::hint::black_box(bucket.draw_at(now, 1));
            });
        })
        .bench_function("draw-std-clock", |b| {
            b.iter(|| std::hint::black_box(std_bucket.draw(1)));
        })
        .bench_function("draw-quanta-clock", |b| {
            b.iter(|| std::hint::black_box(quanta_bucket.draw(1)));
        })
        .bench_function("draw-fast-clock", |b| {
            b.iter(|| std::hint::black_box(fast_bucket.draw(1)));
        })
        .bench_function("infer-tokens", |b| {
            let at = Timestamp::from_secs(3600);
            b.iter(|| std::hint::black_box(std_bucket.infer_tokens_at(at)));
        });
    group.finish();
}

fn bench_registry(c: &mut Criterion) {
    let limit = Limit::per_second_and_burst(nonzero!(100u32), nonzero!(1_000u32));
    let ids: Vec<String> = (0..1024).map(|i| format!("10.0.{}.{}", i / 256, i % 256)).collect();
    let mut group = c.benchmark_group("registry");
    group
        .throughput(Throughput::Elements(1))
        .bench_function("draw-existing", |b| {
            let registry = Registry::new(limit);
            registry.get("10.0.0.1");
            b.iter(|| std::hint::black_box(registry.draw("10.0.0.1", 1)));
        })
        .bench_function("draw-spread", |b| {
            let registry = Registry::new(limit);
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % ids.len();
                std::hint::black_box(registry.draw(&ids[i], 1))
            });
        })
        .bench_function("purge-1024", |b| {
            let registry = Registry::new(limit);
            b.iter(|| {
                for id in &ids {
                    registry.get(id);
                }
                std::hint::black_box(registry.purge())
            });
        });
    group.finish();
}

const THREADS: u32 = 24;

fn multi_threaded(c: &mut Criterion) {
    let clock = quanta::Clock::new();
    let _quanta_thread = quanta::Upkeep::new_with_clock(Duration::from_micros(100), clock.clone())
        .start()
        .unwrap();
    let clock = FastClock::new(clock);
    let limit = Limit::per_second(nonzero!(10_000u32));
    let mut group = c.benchmark_group("multi_threaded");
    group
        .throughput(Throughput::Elements(1))
        .bench_function("one-bucket", |b| {
            let bucket = Arc::new(Bucket::with_clock(limit, clock.clone()));
            b.iter_custom(|iters| {
                let mut children = vec![];
                let start = std::time::Instant::now();
                for _i in 0..THREADS {
                    let bucket = Arc::clone(&bucket);
                    children.push(std::thread::spawn(move || {
                        for _i in 0..iters {
                            let _x = std::hint::black_box(bucket.force_draw(1));
                        }
                    }));
                }
                for child in children {
                    child.join().unwrap()
                }
                start.elapsed()
            })
        })
        .bench_function("registry-per-thread-identity", |b| {
            let registry = Arc::new(Registry::with_clock(limit, clock.clone()));
            b.iter_custom(|iters| {
                let mut children = vec![];
                let start = std::time::Instant::now();
                for i in 0..THREADS {
                    let registry = Arc::clone(&registry);
                    children.push(std::thread::spawn(move || {
                        let id = format!("client-{i}");
                        for _i in 0..iters {
                            std::hint::black_box(registry.draw(&id, 1));
                        }
                    }));
                }
                for child in children {
                    child.join().unwrap()
                }
                start.elapsed()
            })
        });
    group.finish();
}

criterion_group!(benches, bench_draw, bench_registry, multi_threaded);
criterion_main!(benches);
