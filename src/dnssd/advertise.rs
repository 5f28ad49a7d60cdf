//! Service advertisement: composes the DNS-SD record ensemble for one
//! service instance and drives a [`Responder`] for it, renaming on
//! conflict the way RFC 6763 prescribes.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::Instant;

use crate::config::*;
use crate::error::{Error, Result};
use crate::message::{
    AResource, AaaaResource, Name, PtrResource, RData, Resource, SrvResource, TxtAttribute,
    TxtResource,
};
use crate::responder::{ProposedRecord, Responder, ResponderEvent};
use crate::timer::TimerQueue;
use crate::transport::{InterfaceInfo, TaggedBytesMut};
use sansio::Protocol;

use super::{ServiceType, LOCAL_DOMAIN};

/// Description of the service instance to advertise.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Human-readable instance label, e.g. `"Living Room Printer"`.
    pub instance: String,
    pub service_type: ServiceType,
    pub port: u16,
    pub txt: Vec<TxtAttribute>,
    /// Hostname the SRV record targets. Defaults to the instance name
    /// itself, which is where the address record is published too.
    pub host: Option<String>,
    /// Address to publish. Defaults to the interface's first address.
    pub address: Option<IpAddr>,
}

impl ServiceConfig {
    pub fn new(instance: &str, service_type: ServiceType, port: u16) -> Self {
        Self {
            instance: instance.to_owned(),
            service_type,
            port,
            txt: Vec::new(),
            host: None,
            address: None,
        }
    }

    pub fn with_txt(mut self, txt: Vec<TxtAttribute>) -> Self {
        self.txt = txt;
        self
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = Some(host.to_owned());
        self
    }

    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.address = Some(address);
        self
    }
}

/// Events emitted by the advertiser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvertiserEvent {
    /// Probing succeeded; the service is live under this discovery name.
    Registered(Name),
    /// The instance was renamed after a `NameTaken` conflict. A
    /// `Registered` event follows once the new name survives probing.
    Renamed(Name),
}

#[derive(Debug, Copy, Clone)]
enum AdvertiserTimer {
    // Reprobe with the same name after a lost tie-break.
    Retry,
}

/// Advertises one service instance until closed, renaming to
/// `"name (2)"`, `"name (3)"`, … whenever probing finds the name taken.
/// More than 15 rename failures inside a sliding ten-second window end
/// the advertisement with [`Error::ErrRenameExhausted`].
pub struct ServiceAdvertiser {
    config: ServiceConfig,
    interface: InterfaceInfo,
    responder: Option<Responder>,
    // 1 = the configured name; N >= 2 names the "instance (N)" variant.
    name_seq: u32,
    rename_times: VecDeque<Instant>,
    timers: TimerQueue<AdvertiserTimer>,
    events: VecDeque<AdvertiserEvent>,
    failed: Option<Error>,
    closed: bool,
}

impl ServiceAdvertiser {
    pub fn new(config: ServiceConfig, interface: InterfaceInfo, now: Instant) -> Result<Self> {
        let mut advertiser = Self {
            config,
            interface,
            responder: None,
            name_seq: 1,
            rename_times: VecDeque::new(),
            timers: TimerQueue::default(),
            events: VecDeque::new(),
            failed: None,
            closed: false,
        };
        advertiser.responder = Some(advertiser.spawn_responder(now)?);
        Ok(advertiser)
    }

    /// The instance label currently in use (with any rename suffix).
    pub fn instance_label(&self) -> String {
        if self.name_seq <= 1 {
            self.config.instance.clone()
        } else {
            format!("{} ({})", self.config.instance, self.name_seq)
        }
    }

    /// The full discovery name currently in use.
    pub fn instance_name(&self) -> Result<Name> {
        self.config.service_type.instance_name(&self.instance_label())
    }

    fn host_name(&self, instance: &Name) -> Result<Name> {
        match &self.config.host {
            Some(host) => {
                let name = Name::new(host)?;
                if name.labels().len() == 1 {
                    Name::from_labels([host.as_bytes().to_vec(), LOCAL_DOMAIN.as_bytes().to_vec()])
                } else {
                    Ok(name)
                }
            }
            None => Ok(instance.clone()),
        }
    }

    // The RFC 6763 ensemble: PTR (+ per-subtype PTRs) pointing at the
    // instance, SRV and TXT at the instance, and the address record at
    // the SRV target. Answer attachments mirror the resolution order a
    // browser wants: the PTR carries everything, the SRV its address.
    fn build_records(&self) -> Result<Vec<ProposedRecord>> {
        let ty = &self.config.service_type;
        let type_name = ty.service_name()?;
        let instance = ty.instance_name(&self.instance_label())?;
        let host = self.host_name(&instance)?;

        let address = self
            .config
            .address
            .or_else(|| self.interface.addrs.first().copied())
            .ok_or(Error::ErrNoLocalAddress)?;
        let addr_record = match address {
            IpAddr::V4(a) => Resource::new(
                host.clone(),
                RData::A(AResource { a }),
                RESPONSE_TTL_HOST,
                true,
            ),
            IpAddr::V6(aaaa) => Resource::new(
                host.clone(),
                RData::Aaaa(AaaaResource { aaaa }),
                RESPONSE_TTL_HOST,
                true,
            ),
        };

        let srv_record = Resource::new(
            instance.clone(),
            RData::Srv(SrvResource {
                priority: 0,
                weight: 0,
                port: self.config.port,
                target: host,
            }),
            RESPONSE_TTL_HOST,
            true,
        );

        let txt_record = Resource::new(
            instance.clone(),
            RData::Txt(TxtResource {
                attributes: self.config.txt.clone(),
            }),
            RESPONSE_TTL_OTHER,
            true,
        );

        let ensemble = vec![
            srv_record.clone(),
            txt_record.clone(),
            addr_record.clone(),
        ];

        let mut records = vec![
            ProposedRecord {
                record: srv_record,
                additionals: vec![addr_record.clone()],
            },
            ProposedRecord {
                record: txt_record,
                additionals: Vec::new(),
            },
            ProposedRecord {
                record: addr_record,
                additionals: Vec::new(),
            },
            ProposedRecord {
                record: Resource::new(
                    type_name,
                    RData::Ptr(PtrResource {
                        ptr: instance.clone(),
                    }),
                    RESPONSE_TTL_HOST,
                    false,
                ),
                additionals: ensemble.clone(),
            },
        ];
        for subtype in &ty.subtypes {
            records.push(ProposedRecord {
                record: Resource::new(
                    ty.subtype_name(subtype)?,
                    RData::Ptr(PtrResource {
                        ptr: instance.clone(),
                    }),
                    RESPONSE_TTL_HOST,
                    false,
                ),
                additionals: ensemble.clone(),
            });
        }
        Ok(records)
    }

    fn spawn_responder(&self, now: Instant) -> Result<Responder> {
        Responder::new(self.build_records()?, self.interface.clone(), now)
    }

    fn fail(&mut self, err: Error) -> Error {
        self.failed = Some(err.clone());
        self.responder = None;
        self.timers.clear();
        err
    }

    // Conflict recovery (RFC 6763 §9 / RFC 6762 §9): NameTaken renames
    // and reprobes immediately, a lost tie-break reprobes the same name
    // after one second, anything else is final.
    fn handle_responder_failure(&mut self, err: Error, now: Instant) -> Result<()> {
        match err {
            Error::ErrNameTaken => {
                self.rename_times.push_back(now);
                while let Some(&front) = self.rename_times.front() {
                    if now.duration_since(front) > RENAME_WINDOW {
                        self.rename_times.pop_front();
                    } else {
                        break;
                    }
                }
                if self.rename_times.len() > MAX_RENAMES_PER_WINDOW {
                    return Err(self.fail(Error::ErrRenameExhausted));
                }

                self.name_seq += 1;
                let name = match self.instance_name() {
                    Ok(name) => name,
                    Err(err) => return Err(self.fail(err)),
                };
                log::info!("service name taken, renaming to {name}");
                self.events.push_back(AdvertiserEvent::Renamed(name));
                match self.spawn_responder(now) {
                    Ok(responder) => self.responder = Some(responder),
                    Err(err) => return Err(self.fail(err)),
                }
                Ok(())
            }
            Error::ErrSimultaneousProbe => {
                log::debug!("lost probe tie-break, retrying in {SIMULTANEOUS_PROBE_BACKOFF:?}");
                self.responder = None;
                self.timers
                    .schedule(now + SIMULTANEOUS_PROBE_BACKOFF, AdvertiserTimer::Retry);
                Ok(())
            }
            err => Err(self.fail(err)),
        }
    }
}

impl sansio::Protocol<TaggedBytesMut, (), ()> for ServiceAdvertiser {
    type Rout = ();
    type Wout = TaggedBytesMut;
    type Eout = AdvertiserEvent;
    type Error = Error;

    fn handle_read(&mut self, msg: TaggedBytesMut) -> Result<()> {
        if self.closed {
            return Err(Error::ErrAborted);
        }
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        let now = msg.now;
        if let Some(responder) = &mut self.responder {
            if let Err(err) = responder.handle_read(msg) {
                return self.handle_responder_failure(err, now);
            }
        }
        Ok(())
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        None
    }

    fn handle_write(&mut self, _msg: ()) -> Result<()> {
        Ok(())
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        self.responder.as_mut()?.poll_write()
    }

    fn handle_event(&mut self, _evt: ()) -> Result<()> {
        Ok(())
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        if let Some(event) = self.events.pop_front() {
            return Some(event);
        }
        let responder = self.responder.as_mut()?;
        match responder.poll_event()? {
            ResponderEvent::Established => {
                let name = self.instance_name().ok()?;
                Some(AdvertiserEvent::Registered(name))
            }
        }
    }

    fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        if self.closed {
            return Err(Error::ErrAborted);
        }
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        for (_, kind) in self.timers.pop_due(now) {
            match kind {
                AdvertiserTimer::Retry => match self.spawn_responder(now) {
                    Ok(responder) => self.responder = Some(responder),
                    Err(err) => return Err(self.fail(err)),
                },
            }
        }
        if let Some(responder) = &mut self.responder {
            if let Err(err) = responder.handle_timeout(now) {
                return self.handle_responder_failure(err, now);
            }
        }
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        let own = self.timers.next_deadline();
        let inner = self.responder.as_mut().and_then(|r| r.poll_timeout());
        match (own, inner) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Stop advertising: the underlying responder says goodbye; drain
    /// `poll_write()` to transmit it.
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.timers.clear();
        self.events.clear();
        if let Some(responder) = &mut self.responder {
            responder.close()?;
        }
        Ok(())
    }
}
