//! # sso-core
//!
//! Shared building blocks for the SSO ticket registry: the error taxonomy
//! every registry operation reports, and the configuration model for ticket
//! policies and background maintenance.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod config;
pub mod error;

pub use config::{
    ProxyTicketConfig, ReaperConfig, ServiceTicketConfig, TicketConfig, TicketGrantingConfig,
};
pub use error::{Error, Result};
