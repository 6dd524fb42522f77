//! # sso-ticket
//!
//! The ticket data model for the SSO server: the ticket kinds (TGT, ST,
//! PGT, PT) and their shared fields, the expiration policies that decide
//! validity from a ticket's timestamps and use count, secure ticket id
//! generation, and the catalog/factory that mints new tickets.
//!
//! Storage is out of scope here; see `sso-registry` for the registry
//! contract and its backend adapters.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod authentication;
pub mod catalog;
pub mod expiration;
pub mod id;
pub mod ticket;

pub use authentication::Authentication;
pub use catalog::{CatalogEntry, TicketCatalog, TicketFactory};
pub use expiration::ExpirationPolicy;
pub use ticket::{Ticket, TicketKind};
