use bfv_math::poly;
use bfv_math::zq::SmallModulus;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::thread_rng;

pub fn zq_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("zq");
    group.sample_size(50);

    let p = 4611686018326724609;
    let q = SmallModulus::new(p).unwrap();
    let mut rng = thread_rng();

    for vector_size in [1024usize, 4096].iter() {
        let mut a = (0..*vector_size).map(|_| q.random(&mut rng)).collect::<Vec<_>>();
        let b = (0..*vector_size).map(|_| q.random(&mut rng)).collect::<Vec<_>>();
        let scalar = b[0];

        group.bench_function(BenchmarkId::new("add_poly", vector_size), |bench| {
            bench.iter(|| poly::add_poly_poly_coeffmod(&mut a, &b, &q));
        });

        group.bench_function(BenchmarkId::new("sub_poly", vector_size), |bench| {
            bench.iter(|| poly::sub_poly_poly_coeffmod(&mut a, &b, &q));
        });

        group.bench_function(BenchmarkId::new("neg_poly", vector_size), |bench| {
            bench.iter(|| poly::neg_poly_coeffmod(&mut a, &q));
        });

        group.bench_function(BenchmarkId::new("dyadic_product", vector_size), |bench| {
            bench.iter(|| poly::dyadic_product_coeffmod(&mut a, &b, &q));
        });

        group.bench_function(BenchmarkId::new("scalar_mul", vector_size), |bench| {
            bench.iter(|| poly::multiply_poly_scalar_coeffmod(&mut a, scalar, &q));
        });
    }

    group.finish();
}

criterion_group!(zq, zq_benchmark);
criterion_main!(zq);
