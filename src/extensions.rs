//! Session-scoped extensions injected by the host.
//!
//! Each seam is a trait object so hosts can plug in their own sheet functions,
//! importers and connectors without the engine knowing their types.

use crate::error::Result;
use crate::table::Table;
use crate::types::Value;
use std::fmt;
use std::sync::Arc;

/// A sheet function registered by the host, applied row by row.
pub trait UserFunction: Send + Sync {
    /// Name used in formulas (matched case-insensitively).
    fn name(&self) -> &str;

    fn call(&self, args: &[Value]) -> Result<Value>;
}

/// An importer registered by the host.
pub trait UserImporter: Send + Sync {
    fn name(&self) -> &str;

    /// Produce `(table name, table)` pairs from the importer's parameters.
    fn import(&self, params: &serde_json::Map<String, serde_json::Value>) -> Result<Vec<(String, Table)>>;
}

/// Runs queries for database imports.
pub trait QueryRunner: Send + Sync {
    fn run_query(&self, connection: &serde_json::Value, query: &str) -> Result<Table>;

    /// Code lines (and imports) that run the same query into `table_name`.
    fn code(&self, connection: &serde_json::Value, query: &str, table_name: &str) -> (Vec<String>, Vec<String>);
}

/// Looks up tables the host already holds in variables.
pub trait VariableResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Table>;
}

/// Everything the host injected for one session.
#[derive(Clone, Default)]
pub struct Extensions {
    pub user_functions: Vec<Arc<dyn UserFunction>>,
    pub user_importers: Vec<Arc<dyn UserImporter>>,
    pub query_runner: Option<Arc<dyn QueryRunner>>,
    pub variable_resolver: Option<Arc<dyn VariableResolver>>,
}

impl Extensions {
    pub fn importer(&self, name: &str) -> Option<&Arc<dyn UserImporter>> {
        self.user_importers.iter().find(|i| i.name() == name)
    }

    pub fn with_function(mut self, function: impl UserFunction + 'static) -> Self {
        self.user_functions.push(Arc::new(function));
        self
    }

    pub fn with_importer(mut self, importer: impl UserImporter + 'static) -> Self {
        self.user_importers.push(Arc::new(importer));
        self
    }

    pub fn with_query_runner(mut self, runner: impl QueryRunner + 'static) -> Self {
        self.query_runner = Some(Arc::new(runner));
        self
    }

    pub fn with_variable_resolver(mut self, resolver: impl VariableResolver + 'static) -> Self {
        self.variable_resolver = Some(Arc::new(resolver));
        self
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field(
                "user_functions",
                &self.user_functions.iter().map(|u| u.name()).collect::<Vec<_>>(),
            )
            .field(
                "user_importers",
                &self.user_importers.iter().map(|u| u.name()).collect::<Vec<_>>(),
            )
            .field("query_runner", &self.query_runner.is_some())
            .field("variable_resolver", &self.variable_resolver.is_some())
            .finish()
    }
}
