//! The responder: claims records on the network and answers for them.
//!
//! A [`Responder`] walks the RFC 6762 lifecycle: it probes to verify
//! nobody else claims its unique names, breaks ties with simultaneous
//! probers, announces the claimed records, then answers queries —
//! aggregating shared-record responses, rate-limiting repeats,
//! synthesising NSEC for types it provably lacks and defending its
//! records against premature goodbyes. `close()` says goodbye.
//!
//! Probe failures surface as terminal errors from `handle_read`:
//! [`Error::ErrNameTaken`] when the name is already claimed,
//! [`Error::ErrSimultaneousProbe`] when a concurrent prober wins the
//! tie-break, and [`Error::ErrConflict`] when another host announces
//! conflicting data after probing succeeded. The DNS-SD advertiser
//! catches the first two and retries under a new name or after a
//! back-off.

#[cfg(test)]
mod responder_test;

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Instant;

use bytes::BytesMut;

use crate::config::*;
use crate::error::{Error, Result};
use crate::message::{
    compare_records, DnsType, Header, Message, Name, NsecResource, Question, RData, Resource,
};
use crate::timer::{TimerId, TimerQueue};
use crate::transport::{
    Family, InterfaceInfo, TaggedBytesMut, TransportContext, TransportProtocol,
};

/// A record this responder publishes, with the records to attach to the
/// additional section whenever it is sent as an answer.
#[derive(Debug, Clone)]
pub struct ProposedRecord {
    pub record: Resource,
    pub additionals: Vec<Resource>,
}

impl From<Resource> for ProposedRecord {
    fn from(record: Resource) -> Self {
        Self {
            record,
            additionals: Vec::new(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
    Probing,
    Announcing,
    Responding,
    Stopped,
}

#[derive(Debug, Copy, Clone)]
enum ResponderTimer {
    Probe,
    Announce,
    Aggregate,
}

/// Events emitted by the responder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderEvent {
    /// Probing finished without conflict; the records are now being
    /// announced and the responder answers for them.
    Established,
}

/// RFC 6762 probe/announce/respond state machine for a record set.
pub struct Responder {
    records: Vec<ProposedRecord>,
    phase: Phase,
    probes_sent: u32,
    timers: TimerQueue<ResponderTimer>,
    aggregate_timer: Option<TimerId>,
    queued_answers: Vec<Resource>,
    // Records sent within the last second, kept to enforce the
    // one-per-second per-record rate limit.
    recently_sent: Vec<(Resource, Instant)>,
    write_outs: VecDeque<TaggedBytesMut>,
    events: VecDeque<ResponderEvent>,
    interface: InterfaceInfo,
    failed: Option<Error>,
    closed: bool,
}

impl Responder {
    /// Create a responder for `records` and schedule the first probe
    /// 0–250 ms from `now`.
    pub fn new(
        records: Vec<ProposedRecord>,
        interface: InterfaceInfo,
        now: Instant,
    ) -> Result<Self> {
        if records.is_empty() {
            return Err(Error::ErrNoProposedRecords);
        }
        let mut timers = TimerQueue::default();
        timers.schedule(
            now + rand_delay(std::time::Duration::ZERO, PROBE_WAIT_MAX),
            ResponderTimer::Probe,
        );
        Ok(Self {
            records,
            phase: Phase::Probing,
            probes_sent: 0,
            timers,
            aggregate_timer: None,
            queued_answers: Vec::new(),
            recently_sent: Vec::new(),
            write_outs: VecDeque::new(),
            events: VecDeque::new(),
            interface,
            failed: None,
            closed: false,
        })
    }

    /// The records this responder publishes.
    pub fn records(&self) -> impl Iterator<Item = &Resource> {
        self.records.iter().map(|pr| &pr.record)
    }

    fn fail(&mut self, err: Error) -> Error {
        self.phase = Phase::Stopped;
        self.timers.clear();
        self.aggregate_timer = None;
        self.queued_answers.clear();
        self.failed = Some(err.clone());
        err
    }

    // Outbound answers carry fixed TTLs: 120 s for records tied to host
    // presence (A, AAAA, SRV, PTR), 75 min for the rest.
    fn normalized(record: &Resource) -> Resource {
        let mut out = record.clone();
        out.header.ttl = match record.rdata.real_type() {
            DnsType::A | DnsType::Aaaa | DnsType::Srv | DnsType::Ptr => RESPONSE_TTL_HOST,
            _ => RESPONSE_TTL_OTHER,
        };
        out
    }

    fn prune_recently_sent(&mut self, now: Instant) {
        self.recently_sent
            .retain(|(_, at)| now.duration_since(*at) < RATE_LIMIT_WINDOW);
    }

    fn was_recently_sent(&self, record: &Resource) -> bool {
        self.recently_sent
            .iter()
            .any(|(sent, _)| sent.same_identity(record))
    }

    fn mark_sent(&mut self, records: &[Resource], now: Instant) {
        for record in records {
            self.recently_sent.push((record.clone(), now));
        }
    }

    fn outbound_context(&self) -> TransportContext {
        let local_addr = match self.interface.family {
            Family::Ipv4 => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            Family::Ipv6 => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        TransportContext {
            local_addr,
            peer_addr: self.interface.mdns_dest_addr(),
            transport_protocol: TransportProtocol::UDP,
        }
    }

    fn queue_message(&mut self, msg: &Message, now: Instant) {
        let raw = match msg.pack() {
            Ok(raw) => raw,
            Err(err) => {
                log::error!("failed to pack mDNS message: {err}");
                return;
            }
        };
        self.write_outs.push_back(TaggedBytesMut {
            now,
            transport: self.outbound_context(),
            message: BytesMut::from(&raw[..]),
        });
    }

    fn queue_response(&mut self, answers: Vec<Resource>, additionals: Vec<Resource>, now: Instant) {
        if answers.is_empty() {
            return;
        }
        let msg = Message {
            header: Header {
                response: true,
                authoritative: true,
                ..Default::default()
            },
            answers: answers.clone(),
            additionals: additionals.clone(),
            ..Default::default()
        };
        self.queue_message(&msg, now);
        self.mark_sent(&answers, now);
        self.mark_sent(&additionals, now);
    }

    // A probe: every unique name among the proposed records asked with
    // QTYPE ANY, and the proposed records themselves in the authority
    // section (RFC 6762 §8.1).
    fn send_probe(&mut self, now: Instant) {
        let mut names: Vec<Name> = Vec::new();
        for pr in &self.records {
            if !names.contains(&pr.record.header.name) {
                names.push(pr.record.header.name.clone());
            }
        }
        let msg = Message {
            questions: names
                .into_iter()
                .map(|name| Question::new(name, DnsType::Any))
                .collect(),
            authorities: self
                .records
                .iter()
                .map(|pr| Self::normalized(&pr.record))
                .collect(),
            ..Default::default()
        };
        self.queue_message(&msg, now);
    }

    fn send_announcement(&mut self, now: Instant) {
        let mut answers: Vec<Resource> = Vec::new();
        let mut additionals: Vec<Resource> = Vec::new();
        for pr in &self.records {
            let mut record = Self::normalized(&pr.record);
            // Everything but PTR is claimed uniquely.
            record.header.cache_flush = record.rdata.real_type() != DnsType::Ptr;
            answers.push(record);
            for extra in &pr.additionals {
                let extra = Self::normalized(extra);
                if !additionals.iter().any(|r| r.same_identity(&extra)) {
                    additionals.push(extra);
                }
            }
        }
        // Drop additionals that already appear as answers.
        additionals.retain(|r| !answers.iter().any(|a| a.same_identity(r)));
        self.queue_response(answers, additionals, now);
    }

    fn send_goodbye(&mut self, now: Instant) {
        let answers: Vec<Resource> = self
            .records
            .iter()
            .map(|pr| {
                let mut record = pr.record.clone();
                record.header.ttl = 0;
                record
            })
            .collect();
        let msg = Message {
            header: Header {
                response: true,
                authoritative: true,
                ..Default::default()
            },
            answers,
            ..Default::default()
        };
        self.queue_message(&msg, now);
    }

    // Process one already-decoded message; shared with the composites
    // that decode a datagram once and fan it out.
    pub(crate) fn handle_message(&mut self, msg: &Message, now: Instant) -> Result<()> {
        self.prune_recently_sent(now);
        match self.phase {
            Phase::Probing => self.handle_message_probing(msg),
            Phase::Announcing | Phase::Responding => {
                if msg.header.response {
                    self.handle_peer_response(msg, now)
                } else {
                    self.handle_peer_query(msg, now);
                    Ok(())
                }
            }
            Phase::Stopped => Ok(()),
        }
    }

    fn handle_message_probing(&mut self, msg: &Message) -> Result<()> {
        if msg.header.response {
            // Any unique answer for a name we are probing means the name
            // is taken.
            for answer in &msg.answers {
                if !answer.header.cache_flush {
                    continue;
                }
                if self
                    .records
                    .iter()
                    .any(|pr| pr.record.header.name == answer.header.name)
                {
                    return Err(self.fail(Error::ErrNameTaken));
                }
            }
            return Ok(());
        }

        // A query with a non-empty authority section is another prober;
        // overlapping unique records trigger the tie-break.
        if msg.authorities.is_empty() {
            return Ok(());
        }
        let mut ours: Vec<Resource> = Vec::new();
        for pr in &self.records {
            // Only unique-vs-unique matches enter the tie-break; shared
            // records (PTR) coexist at the same name and type.
            let conflicting = msg.authorities.iter().any(|auth| {
                auth.header.name == pr.record.header.name
                    && auth.rdata.real_type() == pr.record.rdata.real_type()
                    && pr.record.header.cache_flush
                    && auth.header.cache_flush
            });
            if conflicting {
                ours.push(pr.record.clone());
            }
        }
        if ours.is_empty() {
            return Ok(());
        }
        let mut theirs: Vec<Resource> = msg
            .authorities
            .iter()
            .filter(|auth| {
                auth.header.cache_flush
                    && ours.iter().any(|our| {
                        our.header.name == auth.header.name
                            && our.rdata.real_type() == auth.rdata.real_type()
                            && our.header.cache_flush
                    })
            })
            .cloned()
            .collect();

        ours.sort_by(compare_records);
        theirs.sort_by(compare_records);

        for (our, their) in ours.iter().zip(theirs.iter()) {
            match compare_records(our, their) {
                Ordering::Less => return Err(self.fail(Error::ErrSimultaneousProbe)),
                Ordering::Greater => return Ok(()), // we win; keep probing
                Ordering::Equal => {}
            }
        }
        match ours.len().cmp(&theirs.len()) {
            // A strict prefix loses to the longer multiset.
            Ordering::Less => Err(self.fail(Error::ErrSimultaneousProbe)),
            // Identical sets are not a conflict.
            _ => Ok(()),
        }
    }

    fn handle_peer_response(&mut self, msg: &Message, now: Instant) -> Result<()> {
        let mut reannounce: Vec<Resource> = Vec::new();
        let mut conflict = false;
        for answer in &msg.answers {
            for pr in &self.records {
                if pr.record.header.name != answer.header.name
                    || pr.record.rdata.real_type() != answer.rdata.real_type()
                {
                    continue;
                }
                if pr.record.rdata == answer.rdata {
                    if answer.header.ttl == 0 {
                        // Someone said goodbye on our behalf; set the
                        // record straight.
                        let record = Self::normalized(&pr.record);
                        if !reannounce.iter().any(|r| r.same_identity(&record)) {
                            reannounce.push(record);
                        }
                    }
                } else if pr.record.header.cache_flush && answer.header.cache_flush {
                    conflict = true;
                }
            }
        }
        if conflict {
            return Err(self.fail(Error::ErrConflict));
        }
        reannounce.retain(|r| !self.was_recently_sent(r));
        self.queue_response(reannounce, Vec::new(), now);
        Ok(())
    }

    // Whether this responder can assert the nonexistence of `typ` at a
    // name it owns. An interface can never refute address records of
    // the family it does not speak for.
    fn can_refute(&self, typ: DnsType) -> bool {
        match typ {
            DnsType::Aaaa => self.interface.family != Family::Ipv4,
            DnsType::A => self.interface.family != Family::Ipv6,
            _ => true,
        }
    }

    fn synthesize_nsec(&self, name: &Name) -> Resource {
        let mut types: Vec<u16> = self
            .records
            .iter()
            .filter(|pr| pr.record.header.name == *name)
            .map(|pr| pr.record.rdata.real_type().value())
            .collect();
        types.sort_unstable();
        types.dedup();
        Resource::new(
            name.clone(),
            RData::Nsec(NsecResource {
                next_domain: name.clone(),
                types,
            }),
            RESPONSE_TTL_OTHER,
            true,
        )
    }

    fn handle_peer_query(&mut self, msg: &Message, now: Instant) {
        let mut answers: Vec<Resource> = Vec::new();
        let mut additionals: Vec<Resource> = Vec::new();
        let mut all_answerable = true;

        for question in &msg.questions {
            let mut found = false;
            for pr in &self.records {
                if !question.matches(&pr.record.header.name, pr.record.rdata.real_type()) {
                    continue;
                }
                found = true;
                let record = Self::normalized(&pr.record);

                // Known-answer suppression: the querier already holds a
                // fresh copy (RFC 6762 §7.1).
                let suppressed = msg.answers.iter().any(|known| {
                    known.same_identity(&record) && known.header.ttl >= record.header.ttl / 2
                });
                if suppressed || self.was_recently_sent(&record) {
                    continue;
                }
                if answers.iter().any(|r| r.same_identity(&record)) {
                    continue;
                }
                answers.push(record);
                for extra in &pr.additionals {
                    let extra = Self::normalized(extra);
                    if !additionals.iter().any(|r| r.same_identity(&extra)) {
                        additionals.push(extra);
                    }
                }
            }

            if !found {
                let owns_name = self
                    .records
                    .iter()
                    .any(|pr| pr.record.header.name == question.name);
                if owns_name && self.can_refute(question.typ) {
                    let nsec = self.synthesize_nsec(&question.name);
                    if !self.was_recently_sent(&nsec)
                        && !answers.iter().any(|r| r.same_identity(&nsec))
                    {
                        answers.push(nsec);
                    }
                } else {
                    all_answerable = false;
                }
            }
        }

        if answers.is_empty() {
            return;
        }
        additionals.retain(|r| !answers.iter().any(|a| a.same_identity(r)));

        // A probe for one of our records gets defended immediately, as
        // does a query we can fully answer with unique records. Shared
        // answers wait 20–120 ms and go out aggregated.
        let probe_defense = !msg.authorities.is_empty();
        let all_unique = answers.iter().all(|r| r.header.cache_flush);
        if probe_defense || (all_answerable && all_unique) {
            self.queue_response(answers, additionals, now);
        } else {
            for record in answers {
                if !self.queued_answers.iter().any(|r| r.same_identity(&record)) {
                    self.queued_answers.push(record);
                }
            }
            if self.aggregate_timer.is_none() {
                let delay = rand_delay(AGGREGATE_DELAY_MIN, AGGREGATE_DELAY_MAX);
                self.aggregate_timer =
                    Some(self.timers.schedule(now + delay, ResponderTimer::Aggregate));
            }
        }
    }

    fn flush_queued_answers(&mut self, now: Instant) {
        self.aggregate_timer = None;
        let mut answers = std::mem::take(&mut self.queued_answers);
        answers.retain(|r| !self.was_recently_sent(r));
        if answers.is_empty() {
            return;
        }
        let mut additionals: Vec<Resource> = Vec::new();
        for pr in &self.records {
            if answers.iter().any(|r| r.same_identity(&Self::normalized(&pr.record))) {
                for extra in &pr.additionals {
                    let extra = Self::normalized(extra);
                    if !additionals.iter().any(|r| r.same_identity(&extra)) {
                        additionals.push(extra);
                    }
                }
            }
        }
        additionals.retain(|r| !answers.iter().any(|a| a.same_identity(r)));
        self.queue_response(answers, additionals, now);
    }
}

impl sansio::Protocol<TaggedBytesMut, (), ()> for Responder {
    type Rout = ();
    type Wout = TaggedBytesMut;
    type Eout = ResponderEvent;
    type Error = Error;

    fn handle_read(&mut self, msg: TaggedBytesMut) -> Result<()> {
        if self.closed {
            return Err(Error::ErrAborted);
        }
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        if self.interface.is_own_address(msg.transport.peer_addr.ip()) {
            return Ok(());
        }

        let mut decoded = Message::default();
        if let Err(err) = decoded.unpack(&msg.message) {
            log::warn!(
                "dropping malformed mDNS datagram from {}: {err}",
                msg.transport.peer_addr
            );
            return Ok(());
        }
        self.handle_message(&decoded, msg.now)
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        None
    }

    fn handle_write(&mut self, _msg: ()) -> Result<()> {
        Ok(())
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        self.write_outs.pop_front()
    }

    fn handle_event(&mut self, _evt: ()) -> Result<()> {
        Ok(())
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.events.pop_front()
    }

    fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        if self.closed {
            return Err(Error::ErrAborted);
        }
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        self.prune_recently_sent(now);
        for (_, kind) in self.timers.pop_due(now) {
            match kind {
                ResponderTimer::Probe => {
                    if self.probes_sent < PROBE_COUNT {
                        self.send_probe(now);
                        self.probes_sent += 1;
                        self.timers.schedule(now + PROBE_INTERVAL, ResponderTimer::Probe);
                    } else {
                        // Three unanswered probes: the records are ours.
                        self.phase = Phase::Announcing;
                        self.send_announcement(now);
                        self.events.push_back(ResponderEvent::Established);
                        self.timers
                            .schedule(now + ANNOUNCE_INTERVAL, ResponderTimer::Announce);
                    }
                }
                ResponderTimer::Announce => {
                    self.send_announcement(now);
                    self.phase = Phase::Responding;
                }
                ResponderTimer::Aggregate => self.flush_queued_answers(now),
            }
        }
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Abort: cancel all timers, drop queued answers and say goodbye.
    /// The goodbye datagram stays in the write queue for the caller to
    /// transmit; nothing follows it.
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.timers.clear();
        self.aggregate_timer = None;
        self.queued_answers.clear();
        self.events.clear();
        if self.failed.is_none() {
            let now = Instant::now();
            self.send_goodbye(now);
        }
        self.phase = Phase::Stopped;
        Ok(())
    }
}
