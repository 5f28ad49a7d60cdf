//! DNS-SD (RFC 6763) on top of the querier and responder: services are
//! expressed as a PTR/SRV/TXT (+ address) record ensemble under
//! `_type._proto.local`, advertised by [`ServiceAdvertiser`] and
//! discovered by [`ServiceBrowser`].


pub(crate) mod advertise;
pub(crate) mod browse;

pub use advertise::{AdvertiserEvent, ServiceAdvertiser, ServiceConfig};
pub use browse::{Service, ServiceBrowser};

use std::fmt;

use crate::error::{Error, Result};
use crate::message::Name;

/// The domain every mDNS name lives under.
pub(crate) const LOCAL_DOMAIN: &str = "local";

/// The pseudo-label separating subtype labels from the service type
/// (RFC 6763 §7.1).
pub(crate) const SUBTYPE_LABEL: &str = "_sub";

/// Transport protocol half of a DNS-SD service type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ServiceProtocol {
    Tcp,
    Udp,
}

impl ServiceProtocol {
    fn label(&self) -> &'static str {
        match self {
            ServiceProtocol::Tcp => "_tcp",
            ServiceProtocol::Udp => "_udp",
        }
    }
}

impl fmt::Display for ServiceProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceProtocol::Tcp => write!(f, "tcp"),
            ServiceProtocol::Udp => write!(f, "udp"),
        }
    }
}

// Service-type labels carry a leading underscore on the wire; users
// write "http", "printer", … and get "_http", "_printer".
fn underscored(label: &str) -> String {
    if label.starts_with('_') {
        label.to_owned()
    } else {
        format!("_{label}")
    }
}

/// A DNS-SD service type: `_<name>._<proto>.local`, with optional
/// subtypes published (or browsed) as `_<sub>._sub._<name>._<proto>.local`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceType {
    pub name: String,
    pub protocol: ServiceProtocol,
    pub subtypes: Vec<String>,
}

impl ServiceType {
    pub fn new(name: &str, protocol: ServiceProtocol) -> Self {
        Self {
            name: name.to_owned(),
            protocol,
            subtypes: Vec::new(),
        }
    }

    pub fn with_subtypes<I, S>(mut self, subtypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subtypes = subtypes.into_iter().map(Into::into).collect();
        self
    }

    /// `_type._proto.local`
    pub fn service_name(&self) -> Result<Name> {
        Name::from_labels([
            underscored(&self.name),
            self.protocol.label().to_owned(),
            LOCAL_DOMAIN.to_owned(),
        ])
    }

    /// `_sub._sub._type._proto.local`
    pub fn subtype_name(&self, subtype: &str) -> Result<Name> {
        Name::from_labels([
            underscored(subtype),
            SUBTYPE_LABEL.to_owned(),
            underscored(&self.name),
            self.protocol.label().to_owned(),
            LOCAL_DOMAIN.to_owned(),
        ])
    }

    /// `<instance>._type._proto.local`. The instance label is raw bytes:
    /// spaces, dots and any other character pass through unescaped.
    pub fn instance_name(&self, instance: &str) -> Result<Name> {
        if instance.is_empty() {
            return Err(Error::ErrInvalidServiceName);
        }
        self.service_name()?.prepend(instance.as_bytes().to_vec())
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            underscored(&self.name),
            self.protocol.label(),
            LOCAL_DOMAIN
        )
    }
}
