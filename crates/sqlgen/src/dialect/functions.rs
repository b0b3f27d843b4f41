//! Per-dialect SQL function registry
//!
//! Handlers are keyed by `(dialect, NAME)` with names compared upper-cased.
//! Lookup walks the dialect chain (most specific first), then falls back to
//! the dialect's rename table, then to a plain `NAME(args)` call.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use super::{COMMON_FUNCTION_NAMES, DialectKind, SqlDialect};

/// Render a function call from its already compiled arguments.
pub type FunctionHandler = Arc<dyn Fn(&[String], &dyn SqlDialect) -> String + Send + Sync>;

pub struct FunctionRegistry {
    handlers: DashMap<(DialectKind, String), FunctionHandler>,
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl FunctionRegistry {
    /// An empty registry (no built-in handlers).
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let registry = Self::new();
        register_builtins(&registry);
        registry
    }

    /// The process-wide registry, built on first use.
    pub fn global() -> Arc<FunctionRegistry> {
        static GLOBAL: OnceLock<Arc<FunctionRegistry>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(FunctionRegistry::with_builtins()))
            .clone()
    }

    /// Register (or replace) a handler. Registering on
    /// [`DialectKind::Generic`] applies to every dialect without its own.
    pub fn register<F>(&self, kind: DialectKind, name: &str, handler: F)
    where
        F: Fn(&[String], &dyn SqlDialect) -> String + Send + Sync + 'static,
    {
        log::trace!("function handler {name} registered for {kind}");
        self.handlers
            .insert((kind, name.to_uppercase()), Arc::new(handler));
    }

    pub fn unregister(&self, kind: DialectKind, name: &str) -> bool {
        self.handlers.remove(&(kind, name.to_uppercase())).is_some()
    }

    /// Handler for `name` on `kind` or the nearest base.
    pub fn lookup(&self, kind: DialectKind, name: &str) -> Option<FunctionHandler> {
        let key = name.to_uppercase();
        kind.chain().find_map(|k| {
            self.handlers
                .get(&(k, key.clone()))
                .map(|entry| entry.value().clone())
        })
    }

    pub fn render(&self, dialect: &dyn SqlDialect, name: &str, args: &[String]) -> String {
        if let Some(handler) = self.lookup(dialect.kind(), name) {
            return handler(args, dialect);
        }
        let renamed = dialect
            .function_names()
            .iter()
            .chain(COMMON_FUNCTION_NAMES)
            .find(|(from, _)| from.eq_ignore_ascii_case(name))
            .map(|(_, to)| to.to_string())
            .unwrap_or_else(|| name.to_uppercase());
        format!("{}({})", renamed, args.join(", "))
    }
}

fn arg(args: &[String], i: usize) -> &str {
    args.get(i).map_or("NULL", String::as_str)
}

const DATE_UNITS: [(&str, &str); 6] = [
    ("Years", "YEAR"),
    ("Months", "MONTH"),
    ("Days", "DAY"),
    ("Hours", "HOUR"),
    ("Minutes", "MINUTE"),
    ("Seconds", "SECOND"),
];

const DATE_PARTS: [(&str, &str); 6] = [
    ("Year", "%Y"),
    ("Month", "%m"),
    ("Day", "%d"),
    ("Hour", "%H"),
    ("Minute", "%M"),
    ("Second", "%S"),
];

fn register_builtins(r: &FunctionRegistry) {
    use DialectKind::*;

    r.register(Generic, "COUNT", |args, _| {
        if args.is_empty() {
            "COUNT(*)".to_string()
        } else {
            format!("COUNT({})", args.join(", "))
        }
    });
    r.register(Generic, "IsNullOrEmpty", |args, _| {
        let a = arg(args, 0);
        format!("({a} IS NULL OR {a} = '')")
    });
    r.register(Generic, "Trim", |args, _| format!("TRIM({})", arg(args, 0)));
    r.register(SqlServer, "Trim", |args, _| {
        format!("LTRIM(RTRIM({}))", arg(args, 0))
    });

    // Current time
    r.register(Generic, "Now", |_, _| "CURRENT_TIMESTAMP".to_string());
    r.register(Generic, "UtcNow", |_, _| "CURRENT_TIMESTAMP".to_string());
    r.register(Generic, "Today", |_, _| "CURRENT_DATE".to_string());
    r.register(SqlServer, "Now", |_, _| "GETDATE()".to_string());
    r.register(SqlServer, "UtcNow", |_, _| "GETUTCDATE()".to_string());
    r.register(SqlServer, "Today", |_, _| "CAST(GETDATE() AS DATE)".to_string());
    r.register(MySql, "Now", |_, _| "NOW()".to_string());
    r.register(MySql, "UtcNow", |_, _| "UTC_TIMESTAMP()".to_string());
    r.register(MySql, "Today", |_, _| "CURDATE()".to_string());
    r.register(Oracle, "Now", |_, _| "SYSTIMESTAMP".to_string());
    r.register(Oracle, "UtcNow", |_, _| "SYS_EXTRACT_UTC(SYSTIMESTAMP)".to_string());
    r.register(Oracle, "Today", |_, _| "TRUNC(SYSDATE)".to_string());
    r.register(Postgres, "Now", |_, _| "NOW()".to_string());
    r.register(Postgres, "UtcNow", |_, _| "(NOW() AT TIME ZONE 'UTC')".to_string());
    r.register(Sqlite, "Now", |_, _| "DATETIME('now', 'localtime')".to_string());
    r.register(Sqlite, "UtcNow", |_, _| "DATETIME('now')".to_string());
    r.register(Sqlite, "Today", |_, _| "DATE('now', 'localtime')".to_string());

    // Zero-based IndexOf(s, sub)
    r.register(Generic, "IndexOf", |args, _| {
        format!("(POSITION({} IN {}) - 1)", arg(args, 1), arg(args, 0))
    });
    r.register(SqlServer, "IndexOf", |args, _| {
        format!("(CHARINDEX({}, {}) - 1)", arg(args, 1), arg(args, 0))
    });
    r.register(MySql, "IndexOf", |args, _| {
        format!("(LOCATE({}, {}) - 1)", arg(args, 1), arg(args, 0))
    });
    for kind in [Oracle, Sqlite] {
        r.register(kind, "IndexOf", |args, _| {
            format!("(INSTR({}, {}) - 1)", arg(args, 0), arg(args, 1))
        });
    }

    // Zero-based Substring(s, start[, length])
    r.register(Generic, "Substring", |args, _| match args.get(2) {
        Some(len) => format!("SUBSTRING({}, ({}) + 1, {len})", arg(args, 0), arg(args, 1)),
        None => format!("SUBSTRING({}, ({}) + 1)", arg(args, 0), arg(args, 1)),
    });
    r.register(SqlServer, "Substring", |args, _| {
        let s = arg(args, 0);
        let len = args.get(2).cloned().unwrap_or_else(|| format!("LEN({s})"));
        format!("SUBSTRING({s}, ({}) + 1, {len})", arg(args, 1))
    });
    r.register(Postgres, "Substring", |args, _| match args.get(2) {
        Some(len) => format!("SUBSTRING({} FROM ({}) + 1 FOR {len})", arg(args, 0), arg(args, 1)),
        None => format!("SUBSTRING({} FROM ({}) + 1)", arg(args, 0), arg(args, 1)),
    });
    for kind in [Oracle, Sqlite] {
        r.register(kind, "Substring", |args, _| match args.get(2) {
            Some(len) => format!("SUBSTR({}, ({}) + 1, {len})", arg(args, 0), arg(args, 1)),
            None => format!("SUBSTR({}, ({}) + 1)", arg(args, 0), arg(args, 1)),
        });
    }

    // AddDays(date, n) and friends
    for (suffix, unit) in DATE_UNITS {
        let name = format!("Add{suffix}");
        r.register(Generic, &name, move |args, _| {
            format!("({} + ({}) * INTERVAL '1' {unit})", arg(args, 0), arg(args, 1))
        });
        r.register(SqlServer, &name, move |args, _| {
            format!("DATEADD({unit}, {}, {})", arg(args, 1), arg(args, 0))
        });
        r.register(MySql, &name, move |args, _| {
            format!("DATE_ADD({}, INTERVAL {} {unit})", arg(args, 0), arg(args, 1))
        });
        let lower = unit.to_lowercase();
        r.register(Postgres, &name, move |args, _| {
            format!("({} + ({}) * INTERVAL '1 {lower}')", arg(args, 0), arg(args, 1))
        });
        let modifier = format!("{}s", unit.to_lowercase());
        r.register(Sqlite, &name, move |args, _| {
            format!("DATETIME({}, ({}) || ' {modifier}')", arg(args, 0), arg(args, 1))
        });
        r.register(Oracle, &name, move |args, _| {
            let (d, n) = (arg(args, 0), arg(args, 1));
            match unit {
                "YEAR" => format!("ADD_MONTHS({d}, ({n}) * 12)"),
                "MONTH" => format!("ADD_MONTHS({d}, {n})"),
                "DAY" => format!("({d} + ({n}))"),
                _ => format!("({d} + NUMTODSINTERVAL({n}, '{unit}'))"),
            }
        });
    }

    // Year(date) and friends
    for (part, strftime) in DATE_PARTS {
        let upper = part.to_uppercase();
        let extract = upper.clone();
        r.register(Generic, part, move |args, _| {
            format!("EXTRACT({extract} FROM {})", arg(args, 0))
        });
        r.register(SqlServer, part, move |args, _| {
            format!("DATEPART({upper}, {})", arg(args, 0))
        });
        r.register(Sqlite, part, move |args, _| {
            format!("CAST(STRFTIME('{strftime}', {}) AS INTEGER)", arg(args, 0))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MySql, Oracle, Postgres, Sqlite, SqlServer};

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn count_without_args_is_star() {
        let r = FunctionRegistry::with_builtins();
        assert_eq!(r.render(&Postgres::default(), "COUNT", &[]), "COUNT(*)");
        assert_eq!(r.render(&Postgres::default(), "count", &s(&["x"])), "COUNT(x)");
    }

    #[test]
    fn lookup_walks_to_generic() {
        let r = FunctionRegistry::with_builtins();
        assert_eq!(
            r.render(&Postgres::default(), "IndexOf", &s(&["a", "b"])),
            "(POSITION(b IN a) - 1)"
        );
        assert_eq!(
            r.render(&SqlServer::default(), "IndexOf", &s(&["a", "b"])),
            "(CHARINDEX(b, a) - 1)"
        );
    }

    #[test]
    fn rename_tables_and_fallback() {
        let r = FunctionRegistry::with_builtins();
        assert_eq!(r.render(&SqlServer::default(), "Length", &s(&["x"])), "LEN(x)");
        assert_eq!(r.render(&MySql::default(), "Length", &s(&["x"])), "CHAR_LENGTH(x)");
        assert_eq!(r.render(&Sqlite::default(), "ToUpper", &s(&["x"])), "UPPER(x)");
        assert_eq!(r.render(&Oracle::default(), "Ceiling", &s(&["x"])), "CEIL(x)");
        assert_eq!(r.render(&MySql::default(), "Average", &s(&["x"])), "AVG(x)");
        assert_eq!(r.render(&MySql::default(), "abs", &s(&["x"])), "ABS(x)");
    }

    #[test]
    fn date_arithmetic_per_dialect() {
        let r = FunctionRegistry::with_builtins();
        let a = s(&["d", "3"]);
        assert_eq!(r.render(&SqlServer::default(), "AddDays", &a), "DATEADD(DAY, 3, d)");
        assert_eq!(r.render(&MySql::default(), "AddDays", &a), "DATE_ADD(d, INTERVAL 3 DAY)");
        assert_eq!(r.render(&Sqlite::default(), "AddDays", &a), "DATETIME(d, (3) || ' days')");
        assert_eq!(r.render(&Oracle::default(), "AddYears", &a), "ADD_MONTHS(d, (3) * 12)");
        assert_eq!(
            r.render(&Postgres::default(), "AddHours", &a),
            "(d + (3) * INTERVAL '1 hour')"
        );
    }

    #[test]
    fn registration_and_removal() {
        let r = FunctionRegistry::new();
        r.register(DialectKind::Generic, "Soundex", |args, _| format!("SOUNDEX({})", args[0]));
        r.register(DialectKind::Postgres, "Soundex", |args, _| {
            format!("soundex({})", args[0])
        });
        assert_eq!(r.render(&MySql::default(), "soundex", &s(&["x"])), "SOUNDEX(x)");
        assert_eq!(r.render(&Postgres::default(), "SOUNDEX", &s(&["x"])), "soundex(x)");
        assert!(r.unregister(DialectKind::Postgres, "Soundex"));
        assert_eq!(r.render(&Postgres::default(), "Soundex", &s(&["x"])), "SOUNDEX(x)");
    }
}
