//! # agent-mcp
//!
//! Connections to Model Context Protocol tool servers, pooled and shared
//! across agents, and the aggregation of each agent's bound servers into a
//! single tool set.
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────┐   ┌─────────────────┐
//! │ToolAggregator│──▶│ ConnectionManager │──▶│ TransportFactory│──▶ tool server
//! │ (ToolSource) │   │  pool + reaper    │   │  http | sse     │
//! └──────────────┘   └─────────┬─────────┘   └─────────────────┘
//!                              ├──▶ ToolServerRegistry (descriptors, bindings)
//!                              └──▶ CredentialService (encrypted URL / headers)
//! ```

pub mod aggregator;
pub mod connection;
pub mod credentials;
pub mod descriptor;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use aggregator::{Aggregation, ToolAggregator};
pub use connection::{Connection, ConnectionStatus, McpTool};
pub use credentials::{AesGcmCredentials, CredentialService};
pub use descriptor::{AgentToolBinding, BoundServer, ToolServerDescriptor, TransportKind};
pub use error::{CredentialError, McpError, Result, ServerFailure};
pub use manager::{ConnectionManager, ConnectionTest, PoolConfig};
pub use registry::{MemoryRegistry, ToolServerRegistry};
pub use transport::{McpTransportFactory, MockTransportFactory, TransportFactory};
