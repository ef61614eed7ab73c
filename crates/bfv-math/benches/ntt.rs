use bfv_math::ntt::NttTables;
use bfv_math::zq::SmallModulus;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::thread_rng;

pub fn ntt_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("ntt");
    group.sample_size(50);

    let p = 4611686018326724609;
    let q = SmallModulus::new(p).unwrap();
    let mut rng = thread_rng();

    for log_n in [10u32, 12].iter() {
        let tables = NttTables::generate(*log_n, &q).unwrap();
        let n = 1usize << log_n;
        let mut a = (0..n).map(|_| q.random(&mut rng)).collect::<Vec<_>>();

        group.bench_function(BenchmarkId::new("forward", n), |bench| {
            bench.iter(|| tables.forward(&mut a));
        });

        group.bench_function(BenchmarkId::new("forward_lazy", n), |bench| {
            bench.iter(|| {
                tables.forward_lazy(&mut a);
                a.iter_mut().for_each(|x| *x %= p);
            });
        });

        group.bench_function(BenchmarkId::new("backward", n), |bench| {
            bench.iter(|| tables.backward(&mut a));
        });
    }

    group.finish();
}

criterion_group!(ntt, ntt_benchmark);
criterion_main!(ntt);
