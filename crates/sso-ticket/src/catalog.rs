//! Ticket catalog and factory.
//!
//! The catalog maps each ticket kind to its id-generation scheme; the
//! factory mints tickets with the default expiration policy for their
//! kind, derived from [`TicketConfig`].

use std::collections::HashMap;

use sso_core::{Error, Result, TicketConfig};

use crate::authentication::Authentication;
use crate::expiration::ExpirationPolicy;
use crate::id::{
    new_ticket_id, GRANTING_TICKET_ID_LENGTH, SERVICE_TICKET_ID_LENGTH,
};
use crate::ticket::{Ticket, TicketKind};

/// Id-generation scheme for one ticket kind.
#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    /// Id prefix.
    pub prefix: &'static str,
    /// Random segment length.
    pub id_length: usize,
}

/// Maps each ticket kind to its id-generation scheme.
#[derive(Debug, Clone)]
pub struct TicketCatalog {
    entries: HashMap<TicketKind, CatalogEntry>,
}

impl Default for TicketCatalog {
    fn default() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            TicketKind::TicketGranting,
            CatalogEntry {
                prefix: TicketKind::TicketGranting.prefix(),
                id_length: GRANTING_TICKET_ID_LENGTH,
            },
        );
        entries.insert(
            TicketKind::ProxyGranting,
            CatalogEntry {
                prefix: TicketKind::ProxyGranting.prefix(),
                id_length: GRANTING_TICKET_ID_LENGTH,
            },
        );
        entries.insert(
            TicketKind::Service,
            CatalogEntry {
                prefix: TicketKind::Service.prefix(),
                id_length: SERVICE_TICKET_ID_LENGTH,
            },
        );
        entries.insert(
            TicketKind::Proxy,
            CatalogEntry {
                prefix: TicketKind::Proxy.prefix(),
                id_length: SERVICE_TICKET_ID_LENGTH,
            },
        );
        Self { entries }
    }
}

impl TicketCatalog {
    /// Creates the default catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for a ticket kind.
    ///
    /// Every kind has an entry in the default catalog.
    #[must_use]
    pub fn entry(&self, kind: TicketKind) -> CatalogEntry {
        self.entries[&kind]
    }

    /// Generates a fresh id for a ticket of the given kind.
    #[must_use]
    pub fn new_id(&self, kind: TicketKind) -> String {
        let entry = self.entry(kind);
        new_ticket_id(entry.prefix, entry.id_length)
    }
}

/// Mints tickets with their kind's default expiration policy.
#[derive(Debug, Clone)]
pub struct TicketFactory {
    config: TicketConfig,
    catalog: TicketCatalog,
}

impl TicketFactory {
    /// Creates a factory from the given configuration.
    #[must_use]
    pub fn new(config: TicketConfig) -> Self {
        Self {
            config,
            catalog: TicketCatalog::default(),
        }
    }

    /// Returns the catalog used for id generation.
    #[must_use]
    pub const fn catalog(&self) -> &TicketCatalog {
        &self.catalog
    }

    /// Mints a ticket-granting ticket for a freshly authenticated session.
    ///
    /// The remember-me decision is taken from the authentication itself:
    /// the delegating policy applies the long fixed lifetime when the
    /// flag is set and the idle/hard-timeout default otherwise.
    #[must_use]
    pub fn new_ticket_granting_ticket(&self, authentication: Authentication) -> Ticket {
        Ticket::new(
            self.catalog.new_id(TicketKind::TicketGranting),
            TicketKind::TicketGranting,
            self.granting_policy(),
        )
        .with_authentication(authentication)
    }

    /// Mints a single-use service ticket under the given granting ticket.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidTicket` if the parent is not a grantor kind.
    pub fn grant_service_ticket(&self, parent: &Ticket, service: &str) -> Result<Ticket> {
        if !parent.kind.grants_tickets() {
            return Err(Error::InvalidTicket);
        }
        Ok(Ticket::new(
            self.catalog.new_id(TicketKind::Service),
            TicketKind::Service,
            self.grant_policy(self.config.st.time_to_live_secs, self.config.st.max_uses),
        )
        .with_parent(&parent.id)
        .with_service(service))
    }

    /// Mints a proxy-granting ticket from a validated service ticket.
    ///
    /// The new ticket's parent is the granting ticket of the service
    /// ticket, so cascade deletion of the session covers the proxy chain.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidTicket` if `service_ticket` is not a single-use
    /// kind (only validated service/proxy tickets may open a proxy
    /// channel).
    pub fn grant_proxy_granting_ticket(
        &self,
        service_ticket: &Ticket,
        authentication: Authentication,
    ) -> Result<Ticket> {
        if !service_ticket.kind.is_single_use() {
            return Err(Error::InvalidTicket);
        }
        let mut ticket = Ticket::new(
            self.catalog.new_id(TicketKind::ProxyGranting),
            TicketKind::ProxyGranting,
            self.granting_policy(),
        )
        .with_authentication(authentication);
        ticket.parent_id = service_ticket.parent_id.clone();
        Ok(ticket)
    }

    /// Mints a single-use proxy ticket under the given proxy-granting
    /// ticket.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidTicket` if the parent is not a proxy-granting
    /// ticket.
    pub fn grant_proxy_ticket(&self, parent: &Ticket, service: &str) -> Result<Ticket> {
        if parent.kind != TicketKind::ProxyGranting {
            return Err(Error::InvalidTicket);
        }
        Ok(Ticket::new(
            self.catalog.new_id(TicketKind::Proxy),
            TicketKind::Proxy,
            self.grant_policy(self.config.pt.time_to_live_secs, self.config.pt.max_uses),
        )
        .with_parent(&parent.id)
        .with_service(service))
    }

    fn granting_policy(&self) -> ExpirationPolicy {
        ExpirationPolicy::RememberMeDelegating {
            remember_me_ttl_secs: self.config.tgt.remember_me_lifetime_secs,
            default: Box::new(ExpirationPolicy::IdleWithHardTimeout {
                idle_timeout_secs: self.config.tgt.idle_timeout_secs,
                max_lifetime_secs: self.config.tgt.max_lifetime_secs,
            }),
        }
    }

    fn grant_policy(&self, ttl_secs: i64, max_uses: u64) -> ExpirationPolicy {
        ExpirationPolicy::AnyOf {
            policies: vec![
                ExpirationPolicy::TimeToLive { ttl_secs },
                ExpirationPolicy::UsesRemaining { max_uses },
            ],
        }
    }
}
