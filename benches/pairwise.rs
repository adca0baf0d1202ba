use criterion::{black_box, criterion_group, criterion_main, Criterion};

use comutation::stats::pairwise::TailMethod;
use comutation::utils::GenePairs;
use comutation::{GeneSymbol, MutationMatrix, PairwiseTest, RateModel, SampleId};

/// A deterministic matrix with varying gene frequencies and sample burdens
fn synthetic_matrix(n_genes: usize, n_samples: usize) -> MutationMatrix {
    let genes = (0..n_genes)
        .map(|i| GeneSymbol::try_from(format!("GENE{i}").as_str()).unwrap())
        .collect();
    let samples = (0..n_samples)
        .map(|j| SampleId::new(if j % 3 == 0 { "A" } else { "B" }, &j.to_string()))
        .collect();
    let mut data = Vec::with_capacity(n_genes * n_samples);
    for i in 0..n_genes {
        let frequency = 5 + (i * 13) % 30;
        for j in 0..n_samples {
            let burden = if j % 17 == 0 { 3 } else { 1 };
            let hash = (i * 7919 + j * 104_729 + i * j * 31) % 100;
            data.push(u8::from(hash < frequency * burden));
        }
    }
    MutationMatrix::new(genes, samples, data).unwrap()
}

fn sequential(matrix: &MutationMatrix, model: &RateModel) -> usize {
    let test = PairwiseTest::new(matrix, model).unwrap();
    GenePairs::new(matrix.n_genes())
        .filter(|(a, b)| test.test_pair(*a, *b).unwrap().pvalue() < 0.05)
        .count()
}

fn parallel(matrix: &MutationMatrix, model: &RateModel, method: TailMethod) -> usize {
    PairwiseTest::new(matrix, model)
        .unwrap()
        .method(method)
        .run()
        .unwrap()
        .iter()
        .filter(|res| res.qvalue() < 0.05)
        .count()
}

fn pairwise_benchmark(c: &mut Criterion) {
    let matrix = synthetic_matrix(100, 500);
    let model = RateModel::estimate(&matrix).unwrap();

    c.bench_function("background 100x500", |b| {
        b.iter(|| RateModel::estimate(black_box(&matrix)).unwrap())
    });

    c.bench_function("pairs-sequential 100x500", |b| {
        b.iter(|| sequential(black_box(&matrix), black_box(&model)))
    });

    c.bench_function("pairs-parallel 100x500", |b| {
        b.iter(|| parallel(black_box(&matrix), black_box(&model), TailMethod::Exact))
    });

    c.bench_function("pairs-normal 100x500", |b| {
        b.iter(|| parallel(black_box(&matrix), black_box(&model), TailMethod::Normal))
    });
}

criterion_group!(pairwise, pairwise_benchmark);
criterion_main!(pairwise);
