//! Benchmarks for pattern matching, tree walking and full ingestion
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use repo_ingest_engine::config::Config;
use repo_ingest_engine::{find_files, IngestOptions, Ingestor, PatternSet};
use std::fs;
use tempfile::TempDir;

/// Create a test repository with varying sizes
fn create_test_repo(num_files: usize, lines_per_file: usize) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let base = temp_dir.path();

    fs::create_dir_all(base.join("app/services")).unwrap();
    fs::create_dir_all(base.join("web/src")).unwrap();
    fs::create_dir_all(base.join("web/node_modules/react")).unwrap();
    fs::create_dir_all(base.join("deploy")).unwrap();

    for i in 0..num_files / 3 {
        let mut content = format!("\"\"\"Module {} for Python code\"\"\"\nimport os\n\n", i);
        for j in 0..lines_per_file / 10 {
            content.push_str(&format!(
                r#"
def function_{i}_{j}(x: int, y: int) -> int:
    # Calculate result
    result = x + y
    if result > 100:
        return helper_{i}(result)
    return result

"#
            ));
        }
        content.push_str(&format!("def helper_{}(v):\n    return v * 2\n", i));
        fs::write(base.join(format!("app/services/module_{}.py", i)), content).unwrap();
    }

    for i in 0..num_files / 3 {
        let mut content = String::from("import React from 'react';\n\n");
        for j in 0..lines_per_file / 10 {
            content.push_str(&format!(
                "export function Widget{i}x{j}(props) {{\n  // render\n  return <div>{{props.value}}</div>;\n}}\n\n"
            ));
        }
        fs::write(base.join(format!("web/src/Widget{}.jsx", i)), content).unwrap();
        fs::write(
            base.join(format!("web/node_modules/react/dep_{}.js", i)),
            "module.exports = {};\n",
        )
        .unwrap();
    }

    for i in 0..num_files / 3 {
        fs::write(
            base.join(format!("deploy/service_{}.yaml", i)),
            format!(
                "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: svc-{i}\nspec:\n  template:\n    spec:\n      containers:\n      - name: app\n        image: registry/app:{i}\n"
            ),
        )
        .unwrap();
    }

    fs::write(base.join("README.md"), "# Benchmark Repo\n").unwrap();
    fs::write(base.join("requirements.txt"), "flask==3.0\n").unwrap();

    temp_dir
}

/// Benchmark the pattern matcher on the default exclude set
fn bench_pattern_matching(c: &mut Criterion) {
    let config = Config::default();
    let excludes = PatternSet::new(config.common_exclude_patterns());
    let paths = [
        "src/main.py",
        "web/app/node_modules/react/index.js",
        "services/api/.venv/lib/site.py",
        "deep/nested/path/to/some/module/file.cs",
        "build/output.log",
    ];

    let mut group = c.benchmark_group("pattern_matching");
    group.throughput(Throughput::Elements(paths.len() as u64));
    group.bench_function("default_excludes", |b| {
        b.iter(|| {
            let hits = paths.iter().filter(|p| excludes.matches(black_box(p))).count();
            black_box(hits)
        })
    });
    group.finish();
}

/// Benchmark the walker with pruning
fn bench_file_discovery(c: &mut Criterion) {
    let sizes = [(30, "small"), (150, "medium"), (600, "large")];
    let config = Config::default();
    let include = PatternSet::new(["*.py", "*.jsx", "*.js", "*.yaml", "README.md"]);
    let exclude = PatternSet::new(config.common_exclude_patterns());

    let mut group = c.benchmark_group("file_discovery");
    for (num_files, name) in sizes.iter() {
        let temp = create_test_repo(*num_files, 50);
        let path = temp.path().to_path_buf();

        group.throughput(Throughput::Elements(*num_files as u64));
        group.bench_with_input(BenchmarkId::new("find_files", name), &path, |b, path| {
            b.iter(|| black_box(find_files(path, &include, &exclude, config.max_file_size, None).len()))
        });
    }
    group.finish();
}

/// Benchmark full and estimate-only ingestion
fn bench_ingestion(c: &mut Criterion) {
    let temp = create_test_repo(90, 100);
    let path = temp.path().to_path_buf();
    let ingestor = Ingestor::new(Config::default());

    let mut group = c.benchmark_group("ingestion");
    group.sample_size(20);
    group.bench_function("full", |b| {
        b.iter(|| black_box(ingestor.ingest(&path, &IngestOptions::new()).map(|r| r.file_count())))
    });
    group.bench_function("estimate_only", |b| {
        let options = IngestOptions::new().with_estimate_only(true);
        b.iter(|| black_box(ingestor.ingest(&path, &options).map(|r| r.total_tokens())))
    });
    group.bench_function("filtered_python", |b| {
        let options = IngestOptions::new().with_languages(["python"]);
        b.iter(|| black_box(ingestor.ingest(&path, &options).map(|r| r.file_count())))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_pattern_matching,
    bench_file_discovery,
    bench_ingestion,
);

criterion_main!(benches);
