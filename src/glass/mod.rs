//! Looking-glass core: query tracking, dialect command construction,
//! execution orchestration, and the output streaming relay.

pub mod command;
pub mod executor;
pub mod query;
pub mod registry;
pub mod relay;

pub use command::{SourcePolicy, template_for};
pub use executor::{ExecutorConfig, QueryExecutor};
pub use query::{Query, QueryKind, QueryOptions, QueryRequest, QueryResponse, QueryStatus};
pub use registry::{MemoryRegistry, QueryStore};
pub use relay::{END_MARKER, RelayConfig, subscribe};
