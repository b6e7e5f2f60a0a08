//! front-client - trading and market-data session clients for an exchange
//! front gateway
//!
//! Two symmetric clients over one session core:
//! - `TraderClient`: order routing, order/position/account queries
//! - `MarketDataClient`: quote subscription and push delivery
//!
//! Each instance owns one TCP connection, one flow-log directory and one
//! dedicated session loop; inbound frames resolve correlated requests or
//! fan out to registered event handlers on that loop.

pub mod client;
pub mod configure;
pub mod connection;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod flow;
pub mod logger;
pub mod mocks;
pub mod models;
pub mod record;
pub mod session;
pub mod wire;

// Re-exports
pub use client::{MarketDataClient, RequestHandle, TraderClient, API_VERSION};
pub use dispatcher::{Dispatcher, DispatcherSnapshot, RequestOutcome};
pub use endpoint::FrontAddr;
pub use error::{ClientError, ClientResult};
pub use events::{Event, EventKind};
pub use flow::{Direction, FlowLogStore, FlowRecord, FlowReplay};
pub use models::{
    AccountSnapshot, AuthInfo, Credentials, OrderInput, OrderStatus, OrderType, OrderUpdate,
    Position, QuoteTick, Side,
};
pub use session::{SessionConfig, SessionSnapshot, SessionState};
pub use wire::{RequestBody, ResponseBody, ResumeMode};
