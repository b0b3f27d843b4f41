//! Lazily converted host lambda.
//!
//! The wrapper holds the host tree and converts it on first use. The result
//! (success or failure) is cached and shared by clones; concurrent first use
//! converts exactly once.

use std::fmt;
use std::sync::{Arc, OnceLock};

use super::Expr;
use crate::convert::{ConvertError, Converter, HostLambda};

#[derive(Clone)]
pub struct LambdaExpr {
    host: Arc<HostLambda>,
    converter: Converter,
    cache: Arc<OnceLock<Result<Expr, ConvertError>>>,
}

impl LambdaExpr {
    /// Wrap a host lambda using the process-wide converter.
    pub fn new(host: HostLambda) -> Self {
        Self::with_converter(host, Converter::global())
    }

    pub fn with_converter(host: HostLambda, converter: Converter) -> Self {
        Self {
            host: Arc::new(host),
            converter,
            cache: Arc::new(OnceLock::new()),
        }
    }

    pub fn host(&self) -> &HostLambda {
        &self.host
    }

    /// Converted node, converting on first call.
    pub fn converted(&self) -> Result<&Expr, ConvertError> {
        self.cache
            .get_or_init(|| self.converter.convert(&self.host))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Converted node, or `None` if conversion fails.
    pub fn node(&self) -> Option<&Expr> {
        self.converted().ok()
    }

    /// Whether conversion already ran.
    pub fn is_converted(&self) -> bool {
        self.cache.get().is_some()
    }
}

impl fmt::Debug for LambdaExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LambdaExpr")
            .field("host", &self.host)
            .field("converted", &self.cache.get())
            .finish()
    }
}

impl Expr {
    pub fn lambda(host: HostLambda) -> Self {
        Expr::Lambda(LambdaExpr::new(host))
    }
}
