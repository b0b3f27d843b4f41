//! Named SQL snippets for [`Expr::Generic`](crate::ast::Expr::Generic) nodes

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::dialect::SqlDialect;

/// Render SQL from the compiled argument.
pub type GenericHandler = Arc<dyn Fn(&str, &dyn SqlDialect) -> String + Send + Sync>;

#[derive(Default)]
pub struct GenericSqlRegistry {
    handlers: DashMap<String, GenericHandler>,
}

impl std::fmt::Debug for GenericSqlRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericSqlRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl GenericSqlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> Arc<GenericSqlRegistry> {
        static GLOBAL: OnceLock<Arc<GenericSqlRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(GenericSqlRegistry::new())).clone()
    }

    pub fn register<F>(&self, key: &str, handler: F)
    where
        F: Fn(&str, &dyn SqlDialect) -> String + Send + Sync + 'static,
    {
        log::debug!("generic sql handler {key} registered");
        self.handlers.insert(key.to_string(), Arc::new(handler));
    }

    pub fn unregister(&self, key: &str) -> bool {
        self.handlers.remove(key).is_some()
    }

    pub fn lookup(&self, key: &str) -> Option<GenericHandler> {
        self.handlers.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{DialectOptions, Generic};

    #[test]
    fn register_lookup_remove() {
        let registry = GenericSqlRegistry::new();
        registry.register("soundex", |arg, _| format!("SOUNDEX({arg})"));
        let dialect = Generic::new(DialectOptions::default());
        let handler = registry.lookup("soundex").unwrap();
        assert_eq!(handler("[Name]", &dialect), "SOUNDEX([Name])");
        assert!(registry.unregister("soundex"));
        assert!(registry.lookup("soundex").is_none());
        assert!(registry.is_empty());
    }
}
