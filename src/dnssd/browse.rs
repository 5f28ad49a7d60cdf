//! Service browsing: a PTR querier per service type, plus a resolver
//! per discovered instance that assembles SRV + TXT + address into a
//! [`Service`] value and tracks its liveness.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::message::{DnsType, Message, Name, Question, RData, SrvResource, TxtAttribute};
use crate::query::{CacheEventKind, Query};
use crate::transport::{Family, InterfaceInfo, TaggedBytesMut};
use sansio::Protocol;

use super::{ServiceProtocol, ServiceType};

/// A resolved service instance as seen on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    /// The instance label, e.g. `"Living Room Printer"`.
    pub name: String,
    /// The service type name without underscore, e.g. `"http"`.
    pub service_type: String,
    pub protocol: ServiceProtocol,
    /// Subtypes through which this instance was discovered.
    pub subtypes: Vec<String>,
    /// The SRV target hostname.
    pub host: String,
    pub port: u16,
    pub txt: Vec<TxtAttribute>,
    /// `false` once the instance's address record expired or was
    /// flushed away.
    pub is_active: bool,
}

// Tracks one discovered instance: PTR target, the records still being
// resolved, and the sub-queries fetching them.
struct ServiceResolver {
    instance: Name,
    subtypes: Vec<String>,
    srv: Option<SrvResource>,
    txt: Option<Vec<TxtAttribute>>,
    addr: Option<IpAddr>,
    // Fetches SRV/TXT that the PTR response's additionals didn't carry.
    record_query: Option<Query>,
    // Tracks the address record at the SRV target; replaced whenever
    // the target changes.
    hostname_query: Option<Query>,
    active: bool,
}

impl ServiceResolver {
    fn new(instance: Name, subtypes: Vec<String>) -> Self {
        Self {
            instance,
            subtypes,
            srv: None,
            txt: None,
            addr: None,
            record_query: None,
            hostname_query: None,
            active: false,
        }
    }

    fn address_type(family: Family) -> DnsType {
        match family {
            Family::Ipv4 => DnsType::A,
            Family::Ipv6 => DnsType::Aaaa,
        }
    }

    fn spawn_hostname_query(&mut self, interface: &InterfaceInfo, now: Instant) {
        if let Some(old) = &mut self.hostname_query {
            let _ = old.close();
        }
        let Some(srv) = &self.srv else {
            return;
        };
        self.hostname_query = Some(Query::new(
            vec![Question::new(
                srv.target.clone(),
                Self::address_type(interface.family),
            )],
            interface.clone(),
            now,
        ));
    }

    fn service(&self, ty: &ServiceType, is_active: bool) -> Option<Service> {
        let srv = self.srv.as_ref()?;
        Some(Service {
            name: String::from_utf8_lossy(self.instance.first_label()?).into_owned(),
            service_type: ty.name.clone(),
            protocol: ty.protocol,
            subtypes: self.subtypes.clone(),
            host: srv.target.to_string(),
            port: srv.port,
            txt: self.txt.clone().unwrap_or_default(),
            is_active,
        })
    }

    fn process(
        &mut self,
        ty: &ServiceType,
        interface: &InterfaceInfo,
        events: &mut VecDeque<Service>,
        now: Instant,
    ) {
        let mut target_changed = false;
        if let Some(query) = &mut self.record_query {
            while let Some(event) = query.poll_event() {
                if event.kind != CacheEventKind::Added {
                    continue;
                }
                match event.record.rdata {
                    RData::Srv(srv) => {
                        if self.srv.as_ref().map(|s| &s.target) != Some(&srv.target) {
                            target_changed = true;
                        }
                        self.srv = Some(srv);
                    }
                    RData::Txt(txt) => self.txt = Some(txt.attributes),
                    _ => {}
                }
            }
        }
        if target_changed {
            self.addr = None;
            self.spawn_hostname_query(interface, now);
        }

        if let Some(query) = &mut self.hostname_query {
            let mut lost_addr = false;
            while let Some(event) = query.poll_event() {
                let ip = match &event.record.rdata {
                    RData::A(a) => IpAddr::V4(a.a),
                    RData::Aaaa(aaaa) => IpAddr::V6(aaaa.aaaa),
                    _ => continue,
                };
                match event.kind {
                    CacheEventKind::Added => {
                        self.addr = Some(ip);
                        lost_addr = false;
                    }
                    CacheEventKind::Expired | CacheEventKind::Flushed => {
                        if self.addr == Some(ip) {
                            lost_addr = true;
                        }
                    }
                }
            }
            if lost_addr {
                self.addr = None;
            }
        }

        if !self.active && self.srv.is_some() && self.txt.is_some() && self.addr.is_some() {
            self.active = true;
            if let Some(service) = self.service(ty, true) {
                events.push_back(service);
            }
        } else if self.active && self.addr.is_none() {
            self.active = false;
            if let Some(service) = self.service(ty, false) {
                events.push_back(service);
            }
        }
    }

    fn close(&mut self) {
        if let Some(query) = &mut self.record_query {
            let _ = query.close();
        }
        if let Some(query) = &mut self.hostname_query {
            let _ = query.close();
        }
    }
}

/// Discovers instances of one service type (and optional subtypes) and
/// emits a [`Service`] event whenever an instance becomes resolvable or
/// stops being so.
pub struct ServiceBrowser {
    ty: ServiceType,
    interface: InterfaceInfo,
    // The PTR names being browsed, with the subtype each represents.
    browse_names: Vec<(Name, Option<String>)>,
    query: Query,
    resolvers: Vec<ServiceResolver>,
    events: VecDeque<Service>,
    closed: bool,
}

impl ServiceBrowser {
    pub fn new(ty: ServiceType, interface: InterfaceInfo, now: Instant) -> Result<Self> {
        let mut browse_names = vec![(ty.service_name()?, None)];
        for subtype in &ty.subtypes {
            browse_names.push((ty.subtype_name(subtype)?, Some(subtype.clone())));
        }
        let questions = browse_names
            .iter()
            .map(|(name, _)| Question::new(name.clone(), DnsType::Ptr))
            .collect();
        let query = Query::new(questions, interface.clone(), now);
        Ok(Self {
            ty,
            interface,
            browse_names,
            query,
            resolvers: Vec::new(),
            events: VecDeque::new(),
            closed: false,
        })
    }

    /// The services currently resolved and active.
    pub fn services(&self) -> Vec<Service> {
        self.resolvers
            .iter()
            .filter(|r| r.active)
            .filter_map(|r| r.service(&self.ty, true))
            .collect()
    }

    fn on_ptr_added(&mut self, ptr_name: &Name, target: &Name, now: Instant) {
        let subtype = self
            .browse_names
            .iter()
            .find(|(name, _)| name == ptr_name)
            .and_then(|(_, subtype)| subtype.clone());

        if let Some(resolver) = self.resolvers.iter_mut().find(|r| r.instance == *target) {
            if let Some(subtype) = subtype {
                if !resolver.subtypes.contains(&subtype) {
                    resolver.subtypes.push(subtype);
                }
            }
            return;
        }

        log::debug!("discovered service instance {target}");
        let mut resolver =
            ServiceResolver::new(target.clone(), subtype.into_iter().collect());

        // First try the additionals the PTR response carried; anything
        // missing is fetched with a sub-query.
        for additional in self.query.additionals() {
            if additional.header.name != resolver.instance {
                continue;
            }
            match &additional.rdata {
                RData::Srv(srv) => resolver.srv = Some(srv.clone()),
                RData::Txt(txt) => resolver.txt = Some(txt.attributes.clone()),
                _ => {}
            }
        }
        if let Some(srv) = &resolver.srv {
            for additional in self.query.additionals() {
                if additional.header.name != srv.target {
                    continue;
                }
                match &additional.rdata {
                    RData::A(a) => resolver.addr = Some(IpAddr::V4(a.a)),
                    RData::Aaaa(aaaa) => resolver.addr = Some(IpAddr::V6(aaaa.aaaa)),
                    _ => {}
                }
            }
        }

        let mut questions = Vec::new();
        if resolver.srv.is_none() {
            questions.push(Question::new(resolver.instance.clone(), DnsType::Srv));
        }
        if resolver.txt.is_none() {
            questions.push(Question::new(resolver.instance.clone(), DnsType::Txt));
        }
        if !questions.is_empty() {
            resolver.record_query = Some(Query::new(questions, self.interface.clone(), now));
        }
        // The hostname query also provides expiry tracking for a seeded
        // address, so it always runs once the target is known.
        resolver.spawn_hostname_query(&self.interface, now);

        resolver.process(&self.ty, &self.interface, &mut self.events, now);
        self.resolvers.push(resolver);
    }

    fn process(&mut self, now: Instant) {
        // Collect first: resolver bookkeeping borrows self mutably.
        let mut added: Vec<(Name, Name)> = Vec::new();
        let mut expired: Vec<Name> = Vec::new();
        while let Some(event) = self.query.poll_event() {
            if let RData::Ptr(ptr) = &event.record.rdata {
                match event.kind {
                    CacheEventKind::Added => {
                        added.push((event.record.header.name.clone(), ptr.ptr.clone()));
                    }
                    CacheEventKind::Expired => expired.push(ptr.ptr.clone()),
                    CacheEventKind::Flushed => {}
                }
            }
        }
        for (ptr_name, target) in added {
            self.on_ptr_added(&ptr_name, &target, now);
        }
        for target in expired {
            if let Some(pos) = self.resolvers.iter().position(|r| r.instance == target) {
                log::debug!("service instance {target} went away");
                let mut resolver = self.resolvers.remove(pos);
                // Flush any pending deactivation before closing, so a
                // goodbye still surfaces as an is_active = false event.
                resolver.process(&self.ty, &self.interface, &mut self.events, now);
                if resolver.active {
                    resolver.active = false;
                    if let Some(service) = resolver.service(&self.ty, false) {
                        self.events.push_back(service);
                    }
                }
                resolver.close();
            }
        }

        for resolver in &mut self.resolvers {
            resolver.process(&self.ty, &self.interface, &mut self.events, now);
        }
    }
}

impl sansio::Protocol<TaggedBytesMut, (), ()> for ServiceBrowser {
    type Rout = ();
    type Wout = TaggedBytesMut;
    type Eout = Service;
    type Error = Error;

    fn handle_read(&mut self, msg: TaggedBytesMut) -> Result<()> {
        if self.closed {
            return Err(Error::ErrConnectionClosed);
        }
        if self.interface.is_own_address(msg.transport.peer_addr.ip()) {
            return Ok(());
        }

        // Decode once, fan the message out to every interested querier.
        let mut decoded = Message::default();
        if let Err(err) = decoded.unpack(&msg.message) {
            log::warn!(
                "dropping malformed mDNS datagram from {}: {err}",
                msg.transport.peer_addr
            );
            return Ok(());
        }
        self.query.handle_message(&decoded, msg.now);
        for resolver in &mut self.resolvers {
            if let Some(query) = &mut resolver.record_query {
                query.handle_message(&decoded, msg.now);
            }
            if let Some(query) = &mut resolver.hostname_query {
                query.handle_message(&decoded, msg.now);
            }
        }
        self.process(msg.now);
        Ok(())
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        None
    }

    fn handle_write(&mut self, _msg: ()) -> Result<()> {
        Ok(())
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        if let Some(write) = self.query.poll_write() {
            return Some(write);
        }
        for resolver in &mut self.resolvers {
            if let Some(query) = &mut resolver.record_query {
                if let Some(write) = query.poll_write() {
                    return Some(write);
                }
            }
            if let Some(query) = &mut resolver.hostname_query {
                if let Some(write) = query.poll_write() {
                    return Some(write);
                }
            }
        }
        None
    }

    fn handle_event(&mut self, _evt: ()) -> Result<()> {
        Ok(())
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.events.pop_front()
    }

    fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        if self.closed {
            return Err(Error::ErrConnectionClosed);
        }
        self.query.handle_timeout(now)?;
        for resolver in &mut self.resolvers {
            if let Some(query) = &mut resolver.record_query {
                query.handle_timeout(now)?;
            }
            if let Some(query) = &mut resolver.hostname_query {
                query.handle_timeout(now)?;
            }
        }
        self.process(now);
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        let mut deadline = self.query.poll_timeout();
        for resolver in &mut self.resolvers {
            for query in [&mut resolver.record_query, &mut resolver.hostname_query]
                .into_iter()
                .flatten()
            {
                deadline = match (deadline, query.poll_timeout()) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
            }
        }
        deadline
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.query.close()?;
        for resolver in &mut self.resolvers {
            resolver.close();
        }
        self.resolvers.clear();
        self.events.clear();
        Ok(())
    }
}
