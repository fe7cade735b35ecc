use criterion::*;
use stack_arena::Arena;

const SIZES: [usize; 3] = [127, 1752, 45213];

fn bench_grow_finish(c: &mut Criterion) {
    let mut group = c.benchmark_group("grow-finish/stack_arena::Arena");

    for size in SIZES {
        group.bench_function(format!("copy 4 bytes x {size}"), |b| {
            let arena = Arena::new();
            b.iter(|| {
                for _ in 0..size {
                    black_box(arena.copy(&0u32.to_ne_bytes()));
                }
                arena.free(None);
            })
        });
    }

    for size in SIZES {
        group.bench_function(format!("copy 4 bytes then grow 4 more x {size}"), |b| {
            let arena = Arena::new();
            b.iter(|| {
                for _ in 0..size {
                    arena.grow(&0u32.to_ne_bytes());
                    arena.grow(&0u32.to_ne_bytes());
                    black_box(arena.finish());
                }
                arena.free(None);
            })
        });
    }

    group.finish();
}

fn bench_warm_up(c: &mut Criterion) {
    let mut group = c.benchmark_group("warm-up/stack_arena::Arena");

    for size in SIZES {
        let arena = Arena::new();
        group.bench_function(format!("copy 4 bytes x {size}"), |b| {
            b.iter(|| {
                for _ in 0..size {
                    black_box(arena.copy(&0u32.to_ne_bytes()));
                }
            })
        });
        arena.free(None);
    }

    group.finish();
}

fn bench_bumpalo_baseline(c: &mut Criterion) {
    let mut group = c.benchmark_group("grow-finish/bumpalo::Bump");

    for size in SIZES {
        group.bench_function(format!("alloc 4 bytes x {size}"), |b| {
            let mut bump = bumpalo::Bump::new();
            b.iter(|| {
                for _ in 0..size {
                    black_box(bump.alloc(0u32));
                }
                bump.reset();
            })
        });
    }

    group.finish();
}

pub fn criterion_benchmark(c: &mut Criterion) {
    bench_grow_finish(c);
    bench_warm_up(c);
    bench_bumpalo_baseline(c);
}

criterion_group!(benches, criterion_benchmark);

fn main() {
    benches();
    Criterion::default().configure_from_args().final_summary();
}
