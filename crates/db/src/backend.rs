use crate::{
    attr::{Key, Row},
    error::Result,
};
use core::future::Future;

/// Table status as reported by the store. An absent table is represented by `None` instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableStatus {
    Creating,
    Active,
    /// The table is serving requests while its settings change.
    Updating,
    Deleting,
    /// Any other state from which the table cannot serve requests on its own.
    Unusable,
}

/// Composite primary key of a table: a text partition key and a numeric range key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeySchema {
    pub partition: &'static str,
    pub range: &'static str,
}

/// Network API of the wide-column store. Every method is a single round trip.
///
/// Missing tables are reported through return values where the operation has a benign
/// "already gone" interpretation, and through [`Error::NotFound`](crate::error::Error::NotFound)
/// everywhere else.
pub trait Backend: Send + Sync {
    /// Returns `None` if the table does not exist.
    fn describe_table(&self, table: &str) -> impl Future<Output = Result<Option<TableStatus>>> + Send;

    /// Creates an on-demand table. Returns `false` if a table of the same name already exists.
    fn create_table(&self, table: &str, schema: KeySchema) -> impl Future<Output = Result<bool>> + Send;

    /// Begins deleting the table. Returns `false` if the table does not exist or is already being
    /// deleted.
    fn delete_table(&self, table: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Returns the attribute that drives row expiry, if expiry is enabled.
    fn describe_ttl(&self, table: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    fn enable_ttl(&self, table: &str, attribute: &str) -> impl Future<Output = Result<()>> + Send;

    /// Writes all rows in a single batch request.
    fn batch_put(&self, table: &str, rows: Vec<Row>) -> impl Future<Output = Result<()>> + Send;

    /// Fetches every row of a partition.
    fn query(&self, table: &str, partition: &str) -> impl Future<Output = Result<Vec<Row>>> + Send;

    /// Atomically adds `delta` to a numeric attribute of an existing row. Fails with
    /// [`Error::NotFound`](crate::error::Error::NotFound) when the row or the attribute is missing.
    /// Stores that cannot tell a missing attribute from a non-numeric one may report the latter as
    /// `NotFound` too.
    fn increment(&self, table: &str, key: Key<'_>, attribute: &str, delta: i64) -> impl Future<Output = Result<()>> + Send;
}
