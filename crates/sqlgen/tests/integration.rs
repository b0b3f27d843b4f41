//! Black-box integration tests for sqlgen
//!
//! These tests exercise the full parse → convert → compile pipeline.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use sqlgen::convert::ParseEnv;
use sqlgen::dialect::for_kind;
use sqlgen::meta::{Catalog, ColumnMeta, DbType, TableMeta};
use sqlgen::pipeline::{OrderItem, SelectItem};
use sqlgen::{
    CompileError, DialectKind, DialectOptions, Expr, QueryEngine, Scalar, Segment, SqlGen,
    SqlGenError, compile_query,
};

// `RUST_LOG=sqlgen=trace cargo test` shows conversion and compile logs
fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn catalog() -> Catalog {
    Catalog::new().with_table(
        TableMeta::new("User")
            .with_column(ColumnMeta::new("Id", DbType::Int64).primary_key().identity())
            .with_column(ColumnMeta::new("Name", DbType::Text(Some(100))))
            .with_column(ColumnMeta::new("Age", DbType::Int32))
            .with_column(ColumnMeta::new("DeptId", DbType::Int64)),
    )
}

fn generator(kind: DialectKind) -> SqlGen {
    SqlGen::new(for_kind(kind, DialectOptions::default()), Arc::new(catalog()))
}

fn env() -> ParseEnv {
    ParseEnv::new().with_source("users", "User")
}

fn hash_of(expr: &Expr) -> u64 {
    let mut hasher = DefaultHasher::new();
    expr.hash(&mut hasher);
    hasher.finish()
}

// ============ Scenarios ============

#[test]
fn filter_has_one_where_and_one_param() {
    init_logging();
    let seg = Segment::table("User")
        .where_(Expr::prop("Age").gt(18))
        .unwrap();
    let q = generator(DialectKind::Generic).compile(&seg).unwrap();
    assert_eq!(q.sql.matches("WHERE").count(), 1);
    assert_eq!(q.params.len(), 1);
    assert_eq!(q.values().next(), Some(&Scalar::Int(18)));
}

#[test]
fn paging_chain_shape() {
    init_logging();
    let seg = Segment::table("User")
        .where_(Expr::prop("Age").gt(18))
        .and_then(|s| s.order_by(Expr::prop("Name"), true))
        .and_then(|s| s.skip(10))
        .and_then(|s| s.take(20))
        .unwrap();
    let Segment::Section { source, skip, take } = &seg else {
        panic!("expected Section, got {}", seg.kind());
    };
    assert_eq!((*skip, *take), (10, Some(20)));
    let Segment::OrderBy { source, orders } = source.as_ref() else {
        panic!("expected OrderBy");
    };
    assert_eq!(orders, &vec![OrderItem::asc(Expr::prop("Name"))]);
    assert!(matches!(
        source.as_ref(),
        Segment::Where { condition, .. } if *condition == Expr::prop("Age").gt(18)
    ));

    // the fluent text builds the same pipeline
    let q = compile_query(
        "users.Where(u => u.Age > 18).OrderBy(u => u.Name).Skip(10).Take(20)",
        &env(),
        &generator(DialectKind::Generic),
    )
    .unwrap();
    assert_eq!(q, generator(DialectKind::Generic).compile(&seg).unwrap());
}

#[test]
fn group_by_with_count() {
    init_logging();
    let q = compile_query(
        "users.GroupBy(u => u.DeptId).Select(g => new { DeptId = g.Key, Total = g.Count() })",
        &env(),
        &generator(DialectKind::Generic),
    )
    .unwrap();
    assert_eq!(
        q.sql,
        "SELECT [DeptId], COUNT(*) AS [Total] FROM [User] GROUP BY [DeptId]"
    );
    assert!(q.params.is_empty());
}

#[test]
fn reversed_and_hashes_equal() {
    init_logging();
    let a = Expr::prop("Name").starts_with("A");
    let b = Expr::prop("Name").starts_with("B");
    let forward = a.clone() & b.clone();
    let reversed = b & a;
    assert_eq!(forward, reversed);
    assert_eq!(hash_of(&forward), hash_of(&reversed));
    assert_eq!(forward.stable_hash(), reversed.stable_hash());
}

// ============ Properties from the compiler ============

#[test]
fn null_comparisons() {
    init_logging();
    let g = generator(DialectKind::Generic);
    let q = g
        .compile_expr("User", &Expr::prop("Name").equal(Expr::null()))
        .unwrap();
    assert_eq!(q.sql, "[Name] IS NULL");
    let q = g
        .compile_expr("User", &Expr::prop("Name").not_equal(Expr::null()))
        .unwrap();
    assert_eq!(q.sql, "[Name] IS NOT NULL");
}

#[test]
fn starts_with_escapes_into_one_param() {
    init_logging();
    let q = generator(DialectKind::Generic)
        .compile_expr("User", &Expr::prop("Name").starts_with("A%B"))
        .unwrap();
    assert!(!q.sql.contains("A%B"), "{}", q.sql);
    assert_eq!(q.params, vec![("0".to_string(), Scalar::from("A/%B%"))]);
}

#[test]
fn sequential_where_is_one_segment() {
    init_logging();
    let seg = Segment::table("User")
        .where_(Expr::prop("Age").gt(18))
        .and_then(|s| s.where_(Expr::prop("Name").equal("ann")))
        .unwrap();
    let Segment::Where { source, condition } = seg else {
        panic!("expected Where");
    };
    assert_eq!(*source, Segment::table("User"));
    assert_eq!(
        condition,
        Expr::prop("Age").gt(18).and(Expr::prop("Name").equal("ann"))
    );
}

// ============ Dialects ============

const PAGED: &str = "users.Where(u => u.Age > 18).OrderBy(u => u.Name).Skip(10).Take(20)";

#[test]
fn paged_query_per_dialect() {
    init_logging();
    let cases = [
        (
            DialectKind::Generic,
            "SELECT [Id], [Name], [Age], [DeptId] FROM [User] WHERE [Age] > @0 \
             ORDER BY [Name] ASC OFFSET 10 ROWS FETCH NEXT 20 ROWS ONLY",
        ),
        (
            DialectKind::SqlServer,
            "SELECT [Id], [Name], [Age], [DeptId] FROM [User] WHERE [Age] > @0 \
             ORDER BY [Name] ASC OFFSET 10 ROWS FETCH NEXT 20 ROWS ONLY",
        ),
        (
            DialectKind::MySql,
            "SELECT `Id`, `Name`, `Age`, `DeptId` FROM `User` WHERE `Age` > @0 \
             ORDER BY `Name` ASC LIMIT 10, 20",
        ),
        (
            DialectKind::Oracle,
            r#"SELECT "ID", "NAME", "AGE", "DEPTID" FROM "USER" WHERE "AGE" > :0 ORDER BY "NAME" ASC OFFSET 10 ROWS FETCH NEXT 20 ROWS ONLY"#,
        ),
        (
            DialectKind::Postgres,
            r#"SELECT "id", "name", "age", "deptid" FROM "user" WHERE "age" > $1 ORDER BY "name" ASC LIMIT 20 OFFSET 10"#,
        ),
        (
            DialectKind::Sqlite,
            r#"SELECT "Id", "Name", "Age", "DeptId" FROM "User" WHERE "Age" > @0 ORDER BY "Name" ASC LIMIT 20 OFFSET 10"#,
        ),
    ];
    for (kind, expected) in cases {
        let q = compile_query(PAGED, &env(), &generator(kind)).unwrap();
        assert_eq!(q.sql, expected, "{kind}");
        assert_eq!(q.params.len(), 1, "{kind}");
    }
}

#[test]
fn sql_server_uses_top_without_skip() {
    init_logging();
    let q = compile_query(
        "users.OrderBy(u => u.Age).Take(3)",
        &env(),
        &generator(DialectKind::SqlServer),
    )
    .unwrap();
    assert_eq!(
        q.sql,
        "SELECT TOP (3) [Id], [Name], [Age], [DeptId] FROM [User] ORDER BY [Age] ASC"
    );
}

#[test]
fn projection_and_literals() {
    init_logging();
    let seg = Segment::table("User")
        .where_(Expr::prop("Name").equal(Expr::literal("x")))
        .and_then(|s| {
            s.select(vec![
                SelectItem::new(Expr::prop("Name")),
                SelectItem::named("Next", Expr::prop("Age") + 1),
            ])
        })
        .unwrap();
    let q = generator(DialectKind::MySql).compile(&seg).unwrap();
    assert_eq!(
        q.sql,
        "SELECT `Name`, (`Age` + @0) AS `Next` FROM `User` WHERE `Name` = 'x'"
    );
}

// ============ Engine ============

#[test]
fn engine_end_to_end() {
    init_logging();
    let mut engine = QueryEngine::for_dialect("pg", DialectOptions::default())
        .unwrap()
        .with_catalog(catalog());
    engine.add_source("users", "User");
    engine.set_capture("min", 18).unwrap();

    engine
        .prepare("adults", "users.Where(u => u.Age >= @min).OrderBy(u => u.Name)")
        .unwrap();
    let q = engine.get("adults").unwrap();
    assert!(q.sql.ends_with(r#"WHERE "age" >= $1 ORDER BY "name" ASC"#), "{}", q.sql);

    let err = engine
        .prepare("broken", "users.Where(u => u.Height > 1)")
        .unwrap_err();
    assert!(matches!(
        err,
        SqlGenError::Compile(CompileError::UnknownProperty { ref property, .. }) if property == "Height"
    ));
    assert_eq!(engine.prepared_names(), vec!["adults".to_string()]);
}

#[test]
fn writes_through_the_generator() {
    init_logging();
    let g = generator(DialectKind::SqlServer);
    let q = g
        .insert("User", &[("Name", "ann".into()), ("Age", 30.into())])
        .unwrap();
    assert_eq!(
        q.sql,
        "INSERT INTO [User] ([Name], [Age]) OUTPUT INSERTED.[Id] VALUES (@0, @1)"
    );
    assert_eq!(q.param("1"), Some(&Scalar::Int(30)));
}

#[test]
fn sql_server_bool_literals_are_bits() {
    init_logging();
    let catalog = Catalog::new().with_table(
        TableMeta::new("Flag")
            .with_column(ColumnMeta::new("Id", DbType::Int64).primary_key())
            .with_column(ColumnMeta::new("Active", DbType::Bool)),
    );
    let g = SqlGen::new(
        for_kind(DialectKind::SqlServer, DialectOptions::default()),
        Arc::new(catalog),
    );
    let q = g
        .compile_expr("Flag", &Expr::prop("Active").equal(Expr::literal(true)))
        .unwrap();
    assert_eq!(q.sql, "[Active] = 1");
    assert!(q.params.is_empty());
}
