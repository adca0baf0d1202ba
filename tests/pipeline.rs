use std::fs;
use std::path::Path;

use comutation::parser::{load_dir, load_dir_lenient, load_gene_list};
use comutation::results::{write_csv, write_results};
use comutation::stats::background::FitOptions;
use comutation::stats::pairwise::Tendency;
use comutation::{
    aggregate, Analysis, ComutError, Direction, MatrixBuilder, MissingPolicy, PairwiseTest,
    RateModel, Stage,
};

/// KRAS and NRAS are always mutated together, PIK3CA and TP53 never
fn cohort_table(repeats: usize, extra: &[&str]) -> String {
    named_cohort_table("S", repeats, extra)
}

/// Same as `cohort_table`, with samples named `<prefix>0`, `<prefix>1`, ...
fn named_cohort_table(prefix: &str, repeats: usize, extra: &[&str]) -> String {
    let samples: Vec<String> = (0..6 * repeats).map(|i| format!("{prefix}{i}")).collect();
    let mut content = format!("gene\t{}\n", samples.join("\t"));
    let rows = [
        ("KRAS", [1, 1, 1, 0, 0, 0]),
        ("NRAS", [1, 1, 1, 0, 0, 0]),
        ("PIK3CA", [1, 0, 1, 0, 1, 0]),
        ("TP53", [0, 1, 0, 1, 0, 1]),
    ];
    for (gene, pattern) in rows {
        let values: Vec<String> = pattern
            .repeat(repeats)
            .iter()
            .map(ToString::to_string)
            .collect();
        content.push_str(&format!("{gene}\t{}\n", values.join("\t")));
    }
    for row in extra {
        content.push_str(row);
        content.push('\n');
    }
    content
}

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

#[test]
fn pooled_cohorts() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "LUAD_calls.txt", &cohort_table(4, &[]));
    write(dir.path(), "LUSC_calls.txt", &cohort_table(4, &[]));
    write(dir.path(), "notes.md", "not a cohort");

    let tables = load_dir(dir.path()).unwrap();
    assert_eq!(tables.len(), 2);
    assert_eq!(tables[0].cohort(), "LUAD");

    let matrix = MatrixBuilder::new().build(&tables).unwrap();
    assert_eq!(matrix.n_genes(), 4);
    assert_eq!(matrix.n_samples(), 48);
    assert_eq!(matrix.cohorts(), vec!["LUAD", "LUSC"]);

    let model = RateModel::estimate(&matrix).unwrap();
    let tests = PairwiseTest::new(&matrix, &model).unwrap().run().unwrap();
    let results = aggregate(&matrix, &tests, 0.05).unwrap();
    assert_eq!(results.len(), 6);

    let co: Vec<_> = results.co_occurring().collect();
    assert_eq!(co.len(), 1);
    assert_eq!(co[0].gene1().as_str(), "KRAS");
    assert_eq!(co[0].gene2().as_str(), "NRAS");
    assert!(co[0].q_value() < 0.05);

    let mutex = results
        .mutually_exclusive()
        .find(|r| r.gene1().as_str() == "PIK3CA" && r.gene2().as_str() == "TP53")
        .unwrap();
    assert_eq!(mutex.observed_overlap(), 0);
    assert!(mutex.q_value() < 0.05);

    // the most significant pair comes first
    assert_eq!(results.all()[0].direction(), Direction::MutuallyExclusive);

    let out = dir.path().join("pooled_all.csv");
    write_csv(fs::File::create(&out).unwrap(), results.all()).unwrap();
    let written = fs::read_to_string(out).unwrap();
    assert_eq!(written.lines().count(), 7);
}

#[test]
fn small_cohort_shows_tendency_only() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "BRCA.txt", &cohort_table(1, &[]));

    let tables = load_dir(dir.path()).unwrap();
    let matrix = MatrixBuilder::new().build(&tables).unwrap();
    assert_eq!(matrix.n_samples(), 6);

    let model = RateModel::estimate(&matrix).unwrap();
    let tests = PairwiseTest::new(&matrix, &model).unwrap().run().unwrap();

    // genes are sorted: KRAS, NRAS, PIK3CA, TP53
    let ras = tests.iter().find(|t| t.genes() == (0, 1)).unwrap();
    assert_eq!(ras.tendency(), Tendency::CoOccurrence);
    let pik_tp53 = tests.iter().find(|t| t.genes() == (2, 3)).unwrap();
    assert_eq!(pik_tp53.tendency(), Tendency::MutualExclusivity);

    // six samples are not enough for significance
    let results = aggregate(&matrix, &tests, 0.05).unwrap();
    assert_eq!(results.significant().count(), 0);
}

#[test]
fn driver_genes_restrict_the_pairs() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "LUAD_calls.txt", &cohort_table(4, &[]));
    let drivers = dir.path().join("drivers.tsv");
    fs::write(&drivers, "# cancer genes\nSYMBOL\ttier\npik3ca\t1\nTP53\t1\nEGFR\t1\n").unwrap();

    let tables = load_dir(dir.path()).unwrap();
    let genes = load_gene_list(&drivers).unwrap();
    assert_eq!(genes.len(), 3);

    let all = MatrixBuilder::new().build(&tables).unwrap();
    let matrix = MatrixBuilder::new().drivers(genes).build(&tables).unwrap();
    assert_eq!(matrix.n_genes(), 2);
    for gene in matrix.genes() {
        assert!(all.genes().contains(gene));
    }

    let model = RateModel::estimate(&matrix).unwrap();
    let tests = PairwiseTest::new(&matrix, &model).unwrap().run().unwrap();
    assert_eq!(tests.len(), 1);
    assert_eq!(tests[0].overlap(), 0);
}

#[test]
fn uninformative_genes_are_removed() {
    let dir = tempfile::tempdir().unwrap();
    let never = format!("BRAF{}", "\t0".repeat(12));
    let always = format!("TTN{}", "\t1".repeat(12));
    write(
        dir.path(),
        "COAD_calls.txt",
        &cohort_table(2, &[never.as_str(), always.as_str()]),
    );

    let tables = load_dir(dir.path()).unwrap();
    assert_eq!(tables[0].genes().len(), 6);
    let matrix = MatrixBuilder::new().build(&tables).unwrap();
    assert_eq!(matrix.n_genes(), 4);
    assert!(matrix.is_informative());
}

#[test]
fn genes_missing_in_a_cohort() {
    let dir = tempfile::tempdir().unwrap();
    let egfr = format!("EGFR{}", "\t1\t0".repeat(6));
    write(dir.path(), "LUAD_calls.txt", &cohort_table(2, &[egfr.as_str()]));
    write(dir.path(), "LUSC_calls.txt", &cohort_table(2, &[]));
    let tables = load_dir(dir.path()).unwrap();

    let dropped = MatrixBuilder::new().build(&tables).unwrap();
    assert_eq!(dropped.n_genes(), 4);
    assert_eq!(dropped.n_samples(), 24);

    let zero = MatrixBuilder::new()
        .missing_policy(MissingPolicy::Zero)
        .build(&tables)
        .unwrap();
    assert_eq!(zero.n_genes(), 5);
    assert_eq!(zero.n_samples(), 24);

    let samples = MatrixBuilder::new()
        .missing_policy(MissingPolicy::DropSamples)
        .build(&tables)
        .unwrap();
    assert_eq!(samples.n_genes(), 5);
    assert_eq!(samples.n_samples(), 12);
}

#[test]
fn stratified_background() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "LUAD_calls.txt", &cohort_table(4, &[]));
    write(dir.path(), "LUSC_calls.txt", &cohort_table(2, &[]));
    let tables = load_dir(dir.path()).unwrap();
    let matrix = MatrixBuilder::new().build(&tables).unwrap();

    let model = RateModel::estimate_stratified(&matrix, &FitOptions::default()).unwrap();
    assert_eq!(model.dim(), (4, 36));
    let tests = PairwiseTest::new(&matrix, &model).unwrap().run().unwrap();
    let pik_tp53 = tests.iter().find(|t| t.genes() == (2, 3)).unwrap();
    assert_eq!(pik_tp53.tendency(), Tendency::MutualExclusivity);
    assert!(pik_tp53.qvalue() < 0.05);
}

#[test]
fn invalid_cohort_file() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "LUAD_calls.txt", &cohort_table(1, &[]));
    write(dir.path(), "LUSC_calls.txt", "gene\tS1\tS2\nTP53\t1\tmutated\n");

    match load_dir(dir.path()) {
        Err(ComutError::Schema { file, reason }) => {
            assert!(file.ends_with("LUSC_calls.txt"));
            assert!(reason.contains("line 2"));
        }
        other => panic!("expected a schema error, got {other:?}"),
    }
}

#[test]
fn missing_input_directory() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");
    assert!(matches!(load_dir(missing), Err(ComutError::Io { .. })));
}

#[test]
fn no_cohort_files() {
    let dir = tempfile::tempdir().unwrap();
    let tables = load_dir(dir.path()).unwrap();
    assert!(tables.is_empty());
    assert!(matches!(
        MatrixBuilder::new().build(&tables),
        Err(ComutError::EmptyMatrix)
    ));
}

#[test]
fn invalid_files_are_skipped_on_request() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "LUAD_calls.txt", &cohort_table(2, &[]));
    write(dir.path(), "LUSC_calls.txt", "gene\tS1\tS2\nTP53\t1\tmutated\n");
    write(dir.path(), "MESO_calls.txt", &cohort_table(1, &[]));

    assert!(matches!(load_dir(dir.path()), Err(ComutError::Schema { .. })));

    let (tables, skipped) = load_dir_lenient(dir.path()).unwrap();
    let cohorts: Vec<&str> = tables.iter().map(|t| t.cohort()).collect();
    assert_eq!(cohorts, vec!["LUAD", "MESO"]);
    assert_eq!(skipped.len(), 1);
    assert!(skipped[0].0.ends_with("LUSC_calls.txt"));
    assert!(matches!(skipped[0].1, ComutError::Schema { .. }));

    let runs = Analysis::new().run_per_cohort(&tables, false).unwrap();
    assert_eq!(runs.results().len(), 2);
}

#[test]
fn lenient_loading_of_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");
    assert!(matches!(load_dir_lenient(missing), Err(ComutError::Io { .. })));
}

#[test]
fn per_cohort_result_files() {
    let input = tempfile::tempdir().unwrap();
    write(input.path(), "LUAD_a.txt", &named_cohort_table("A", 4, &[]));
    write(input.path(), "LUAD_b.txt", &named_cohort_table("B", 4, &[]));
    write(input.path(), "LUSC_calls.txt", &cohort_table(2, &[]));
    let tables = load_dir(input.path()).unwrap();
    assert_eq!(tables.len(), 3);

    let output = tempfile::tempdir().unwrap();
    let runs = Analysis::new().run_per_cohort(&tables, false).unwrap();
    for (cohort, results) in runs.results() {
        write_results(output.path(), cohort, results).unwrap();
    }

    let mut names: Vec<String> = fs::read_dir(output.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "LUAD_all.csv",
            "LUAD_co.csv",
            "LUAD_mutexc.csv",
            "LUSC_all.csv",
            "LUSC_co.csv",
            "LUSC_mutexc.csv",
        ]
    );

    // both LUAD files are analyzed together: 48 samples
    let co = fs::read_to_string(output.path().join("LUAD_co.csv")).unwrap();
    assert_eq!(co.lines().count(), 2);
    assert!(co.lines().nth(1).unwrap().starts_with("KRAS,NRAS,"));
    let co = fs::read_to_string(output.path().join("LUSC_co.csv")).unwrap();
    assert_eq!(co.lines().count(), 1);
}

#[test]
fn failing_cohort_is_named_or_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "COAD_calls.txt", "gene\tS1\tS2\tS3\nTTN\t1\t1\t1\n");
    write(dir.path(), "LUAD_calls.txt", &cohort_table(2, &[]));
    let tables = load_dir(dir.path()).unwrap();

    let failure = Analysis::new().run_per_cohort(&tables, false).unwrap_err();
    assert_eq!(failure.stage(), Stage::Building);
    assert_eq!(failure.subject(), Some("COAD"));
    assert!(failure.to_string().contains("failed for COAD"));

    let runs = Analysis::new().run_per_cohort(&tables, true).unwrap();
    assert!(runs.get("LUAD").is_some());
    assert!(runs.get("COAD").is_none());
    assert_eq!(runs.skipped().len(), 1);
    assert_eq!(runs.skipped()[0].subject(), Some("COAD"));
}
