use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use sqlgen::convert::ParseEnv;
use sqlgen::dialect::for_kind;
use sqlgen::meta::{Catalog, ColumnMeta, DbType, TableMeta};
use sqlgen::{Converter, DialectKind, DialectOptions, Expr, QueryEngine, SqlGen, compile_query};

const QUERY: &str = "users.Where(u => u.Age > 18 && u.Name.StartsWith(\"A\")).OrderBy(u => u.Name).Skip(10).Take(20)";

fn catalog() -> Catalog {
    Catalog::new().with_table(
        TableMeta::new("User")
            .with_column(ColumnMeta::new("Id", DbType::Int64).primary_key())
            .with_column(ColumnMeta::new("Name", DbType::Text(Some(100))))
            .with_column(ColumnMeta::new("Age", DbType::Int32)),
    )
}

fn generator() -> SqlGen {
    SqlGen::new(
        for_kind(DialectKind::Postgres, DialectOptions::default()),
        Arc::new(catalog()),
    )
}

fn wide_condition(n: i64) -> Expr {
    Expr::set(
        sqlgen::advanced::SetKind::And,
        (0..n).map(|i| Expr::prop("Age").gt(i) | Expr::prop("Name").contains(format!("x{i}"))),
    )
}

fn bench_compile_query_text(c: &mut Criterion) {
    let env = ParseEnv::new().with_source("users", "User");
    let generator = generator();

    c.bench_function("compile_query_text", |b| {
        b.iter(|| compile_query(black_box(QUERY), black_box(&env), &generator).unwrap())
    });
}

fn bench_compile_pipeline(c: &mut Criterion) {
    let env = ParseEnv::new().with_source("users", "User");
    let host = sqlgen::advanced::parse_query(QUERY, &env).unwrap();
    let segment = Converter::global().convert_query(&host).unwrap();
    let generator = generator();

    c.bench_function("compile_converted_pipeline", |b| {
        b.iter(|| generator.compile(black_box(&segment)).unwrap())
    });
}

fn bench_wide_condition(c: &mut Criterion) {
    let generator = generator();
    let condition = wide_condition(200);

    c.bench_function("compile_wide_condition", |b| {
        b.iter(|| generator.compile_expr("User", black_box(&condition)).unwrap())
    });
    c.bench_function("hash_wide_condition", |b| {
        b.iter(|| black_box(&condition).stable_hash())
    });
    c.bench_function("wire_wide_condition", |b| {
        b.iter(|| Expr::from_wire(&black_box(&condition).to_wire().unwrap()).unwrap())
    });
}

fn bench_engine_refresh(c: &mut Criterion) {
    let mut engine = QueryEngine::for_dialect("sqlite", DialectOptions::default())
        .unwrap()
        .with_catalog(catalog());
    engine.add_source("users", "User");
    engine.set_capture("min", 18).unwrap();
    for i in 0..20 {
        engine
            .prepare(
                format!("q{i}"),
                format!("users.Where(u => u.Age >= @min + {i}).OrderBy(u => u.Name).Take(10)"),
            )
            .unwrap();
    }

    c.bench_function("engine_refresh_20", |b| {
        b.iter(|| engine.refresh().unwrap())
    });
}

criterion_group!(
    benches,
    bench_compile_query_text,
    bench_compile_pipeline,
    bench_wide_condition,
    bench_engine_refresh
);
criterion_main!(benches);
