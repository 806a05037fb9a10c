//! Coinbase Brokerage Adapter
//!
//! HTTP implementation of the exchange gateway against the Advanced
//! Trade brokerage REST API (INTX perpetuals endpoints included).
//!
//! Sub-modules:
//! - `auth`: CDP JWT (ES256) or legacy HMAC-SHA256 request signing
//! - `client`: HTTP client with rate limiting and read retries
//! - `gateway`: `ExchangeGateway` implementation plus the key permission preflight
//! - `types`: Wire request/response types

pub mod auth;
pub mod client;
pub mod gateway;
pub mod types;

pub use auth::CoinbaseAuth;
pub use client::{CoinbaseClient, CoinbaseClientConfig};
pub use gateway::CoinbaseGateway;
pub use types::KeyPermissions;
