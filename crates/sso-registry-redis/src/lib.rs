//! # sso-registry-redis
//!
//! Redis ticket registry backend using the `fred` crate.
//!
//! Redis is the canonical native-TTL key-value backend: tickets are
//! stored with their worst-case expiration horizon so Redis evicts them
//! without a sweep, and single-use redemption maps onto the atomic
//! `GETDEL`. A lock repository over `SET NX PX` backs cluster-wide
//! maintenance.
//!
//! ## Features
//!
//! - Automatic reconnection with exponential backoff
//! - TLS support
//! - Key prefixing for shared Redis deployments
//! - Optional at-rest encryption through a ticket cipher

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod lock;
pub mod registry;

pub use config::RedisConfig;
pub use lock::RedisLockRepository;
pub use registry::RedisTicketRegistry;
