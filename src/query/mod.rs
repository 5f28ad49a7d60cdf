//! The continuous querier.
//!
//! A [`Query`] multicasts its questions on an exponential-backoff
//! schedule, caches the answers it hears, re-queries records as they
//! near expiry and surfaces cache changes as [`CacheEvent`]s. It also
//! plays nicely with the rest of the network segment: questions it just
//! heard another host ask are skipped for one round, and every outbound
//! query carries the still-fresh cached answers so responders can stay
//! silent (RFC 6762 §7).
//!
//! A `Query` runs until [`close()`](sansio::Protocol::close) cancels its
//! timers and ends the event stream.


use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};

use bytes::BytesMut;

use crate::config::*;
use crate::error::{Error, Result};
use crate::message::{DnsType, Message, Question, Resource};
use crate::timer::{TimerId, TimerQueue};
use crate::transport::{
    Family, InterfaceInfo, TaggedBytesMut, TransportContext, TransportProtocol,
};

/// What happened to a cached record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CacheEventKind {
    /// The record entered the cache.
    Added,
    /// The record was displaced by a unique record with new RDATA.
    Flushed,
    /// The record's TTL ran out (or its goodbye grace period did).
    Expired,
}

/// A change to the querier's answer cache.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    pub kind: CacheEventKind,
    pub record: Resource,
}

#[derive(Debug)]
struct TrackedQuestion {
    question: Question,
    // Set when another host asks the same question; skips exactly one
    // scheduled send (RFC 6762 §7.3).
    suppressed: bool,
}

#[derive(Debug)]
struct CacheEntry {
    id: u64,
    record: Resource,
    added_at: Instant,
    original_ttl: u32,
    timer_ids: Vec<TimerId>,
}

impl CacheEntry {
    fn remaining_ttl(&self, now: Instant) -> u32 {
        let elapsed = now.saturating_duration_since(self.added_at).as_secs();
        (self.original_ttl as u64).saturating_sub(elapsed) as u32
    }

    // Known-answer lists only carry records with at least half their
    // original lifetime left (RFC 6762 §7.1).
    fn fresh_enough_for_known_answer(&self, now: Instant) -> bool {
        self.original_ttl > 0 && self.remaining_ttl(now) >= self.original_ttl.div_ceil(2)
    }
}

#[derive(Debug, Copy, Clone)]
enum QueryTimer {
    // The next scheduled transmission of the question list.
    Send,
    // Refresh attempt for one cached record nearing expiry.
    Requery(u64),
    // Final expiry of one cached record.
    Expire(u64),
}

/// A continuous mDNS query: a question list, an answer cache and the
/// timers that keep both alive.
pub struct Query {
    questions: Vec<TrackedQuestion>,
    cache: Vec<CacheEntry>,
    // Records seen in the additional section of matching responses;
    // consumed by the DNS-SD browser to resolve instances without extra
    // round trips.
    additionals: Vec<Resource>,
    timers: TimerQueue<QueryTimer>,
    write_outs: VecDeque<TaggedBytesMut>,
    events: VecDeque<CacheEvent>,
    interface: InterfaceInfo,
    next_interval: Duration,
    next_entry_id: u64,
    closed: bool,
}

impl Query {
    /// Create a querier for `questions` and schedule its first
    /// transmission 20–120 ms from `now`.
    pub fn new(questions: Vec<Question>, interface: InterfaceInfo, now: Instant) -> Self {
        let mut timers = TimerQueue::default();
        timers.schedule(
            now + rand_delay(QUERY_FIRST_DELAY_MIN, QUERY_FIRST_DELAY_MAX),
            QueryTimer::Send,
        );
        Self {
            questions: questions
                .into_iter()
                .map(|question| TrackedQuestion {
                    question,
                    suppressed: false,
                })
                .collect(),
            cache: Vec::new(),
            additionals: Vec::new(),
            timers,
            write_outs: VecDeque::new(),
            events: VecDeque::new(),
            interface,
            next_interval: QUERY_SECOND_INTERVAL,
            next_entry_id: 1,
            closed: false,
        }
    }

    /// The records currently cached.
    pub fn answers(&self) -> Vec<Resource> {
        self.cache.iter().map(|e| e.record.clone()).collect()
    }

    /// Records collected from the additional sections of matching
    /// responses.
    pub fn additionals(&self) -> &[Resource] {
        &self.additionals
    }

    /// End the query: cancel every timer and close the event stream.
    /// No further cache events are emitted. Equivalent to
    /// [`close()`](sansio::Protocol::close).
    pub fn end(&mut self) {
        let _ = <Self as sansio::Protocol<TaggedBytesMut, (), ()>>::close(self);
    }

    // Process one already-decoded message. Composites that decode a
    // datagram once and fan it out call this directly.
    pub(crate) fn handle_message(&mut self, msg: &Message, now: Instant) {
        if !msg.header.response {
            // A peer asking (some of) our questions with no known
            // answers covers our next scheduled send.
            if msg.answers.is_empty() {
                for q in &msg.questions {
                    for tq in &mut self.questions {
                        if tq.question.name == q.name && tq.question.typ == q.typ {
                            tq.suppressed = true;
                        }
                    }
                }
            }
            return;
        }

        let mut first_match = true;
        for answer in &msg.answers {
            let matches = self
                .questions
                .iter()
                .any(|tq| tq.question.matches(&answer.header.name, answer.rdata.real_type()));
            if !matches {
                continue;
            }
            if first_match {
                first_match = false;
                for additional in &msg.additionals {
                    self.additionals.retain(|r| !r.same_tuple(additional));
                    self.additionals.push(additional.clone());
                }
            }
            self.cache_insert(answer.clone(), now);
        }
    }

    fn cache_insert(&mut self, record: Resource, now: Instant) {
        if record.header.ttl == 0 {
            // Goodbye: linger for one second, then expire (RFC 6762
            // §10.1). Replaces any cached copy outright.
            if let Some(pos) = self.cache.iter().position(|e| e.record.same_identity(&record)) {
                let old = self.cache.remove(pos);
                self.timers.cancel_all(&old.timer_ids);
            }
            let id = self.next_entry_id;
            self.next_entry_id += 1;
            let timer = self.timers.schedule(now + GOODBYE_EXPIRY, QueryTimer::Expire(id));
            self.cache.push(CacheEntry {
                id,
                record: record.clone(),
                added_at: now,
                original_ttl: 0,
                timer_ids: vec![timer],
            });
            self.events.push_back(CacheEvent {
                kind: CacheEventKind::Added,
                record,
            });
            return;
        }

        if record.header.cache_flush {
            // Unique record: displace every cached record with the same
            // (name, type, class) and different RDATA.
            let mut kept = false;
            let mut flushed: Vec<Resource> = Vec::new();
            let mut i = 0;
            while i < self.cache.len() {
                if self.cache[i].record.same_tuple(&record) {
                    if self.cache[i].record.rdata == record.rdata {
                        self.refresh_entry(i, record.header.ttl, now);
                        kept = true;
                        i += 1;
                    } else {
                        let old = self.cache.remove(i);
                        self.timers.cancel_all(&old.timer_ids);
                        flushed.push(old.record);
                    }
                } else {
                    i += 1;
                }
            }
            for old in flushed {
                self.events.push_back(CacheEvent {
                    kind: CacheEventKind::Flushed,
                    record: old,
                });
            }
            if !kept {
                self.insert_entry(record, now);
            }
        } else {
            // Shared record: an identical copy refreshes, a new one is
            // added alongside whatever is cached.
            if let Some(pos) = self.cache.iter().position(|e| e.record.same_identity(&record)) {
                self.refresh_entry(pos, record.header.ttl, now);
            } else {
                self.insert_entry(record, now);
            }
        }
    }

    fn insert_entry(&mut self, record: Resource, now: Instant) {
        let id = self.next_entry_id;
        self.next_entry_id += 1;
        let timer_ids = self.schedule_lifetime_timers(id, record.header.ttl, now);
        self.cache.push(CacheEntry {
            id,
            record: record.clone(),
            added_at: now,
            original_ttl: record.header.ttl,
            timer_ids,
        });
        self.events.push_back(CacheEvent {
            kind: CacheEventKind::Added,
            record,
        });
    }

    fn refresh_entry(&mut self, pos: usize, ttl: u32, now: Instant) {
        let id = self.cache[pos].id;
        let old_timers = std::mem::take(&mut self.cache[pos].timer_ids);
        self.timers.cancel_all(&old_timers);
        self.cache[pos].added_at = now;
        self.cache[pos].original_ttl = ttl;
        self.cache[pos].record.header.ttl = ttl;
        let timer_ids = self.schedule_lifetime_timers(id, ttl, now);
        self.cache[pos].timer_ids = timer_ids;
    }

    // Re-queries at 80/85/90/95 % of the TTL (jittered up to +2 points)
    // and expiry at 100 %, so every re-query fires strictly before the
    // expiry timer.
    fn schedule_lifetime_timers(&mut self, id: u64, ttl: u32, now: Instant) -> Vec<TimerId> {
        let lifetime = Duration::from_secs(ttl as u64);
        let mut timer_ids = Vec::with_capacity(REQUERY_FRACTIONS.len() + 1);
        for fraction in REQUERY_FRACTIONS {
            let jittered = fraction + rand::random::<f64>() * REQUERY_JITTER;
            timer_ids.push(
                self.timers
                    .schedule(now + lifetime.mul_f64(jittered), QueryTimer::Requery(id)),
            );
        }
        timer_ids.push(self.timers.schedule(now + lifetime, QueryTimer::Expire(id)));
        timer_ids
    }

    fn send_scheduled_query(&mut self, now: Instant) {
        let mut questions: Vec<Question> = Vec::new();
        for tq in &mut self.questions {
            // Wire suppression skips exactly one round.
            if tq.suppressed {
                tq.suppressed = false;
                continue;
            }
            // A non-PTR question with a cached answer is satisfied; PTR
            // is a shared record set, so it keeps being asked.
            if tq.question.typ != DnsType::Ptr {
                let answered = self
                    .cache
                    .iter()
                    .any(|e| tq.question.matches(&e.record.header.name, e.record.rdata.real_type()));
                if answered {
                    continue;
                }
            }
            questions.push(tq.question.clone());
        }

        if !questions.is_empty() {
            self.send_query(&questions, true, now);
        }

        self.timers.schedule(now + self.next_interval, QueryTimer::Send);
        self.next_interval = (self.next_interval * 2).min(QUERY_MAX_INTERVAL);
    }

    fn send_query(&mut self, questions: &[Question], known_answers: bool, now: Instant) {
        let mut answers: Vec<Resource> = Vec::new();
        if known_answers {
            for entry in &self.cache {
                if !entry.fresh_enough_for_known_answer(now) {
                    continue;
                }
                let matched = questions.iter().any(|q| {
                    q.matches(&entry.record.header.name, entry.record.rdata.real_type())
                });
                if matched {
                    let mut record = entry.record.clone();
                    record.header.ttl = entry.remaining_ttl(now);
                    answers.push(record);
                }
            }
        }

        let msg = Message {
            questions: questions.to_vec(),
            answers,
            ..Default::default()
        };
        let raw = match msg.pack() {
            Ok(raw) => raw,
            Err(err) => {
                log::error!("failed to pack mDNS query: {err}");
                return;
            }
        };

        log::trace!("queuing mDNS query with {} question(s)", questions.len());
        self.write_outs.push_back(TaggedBytesMut {
            now,
            transport: self.outbound_context(),
            message: BytesMut::from(&raw[..]),
        });
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

    fn expire_entry(&mut self, id: u64, now: Instant) {
        let Some(pos) = self.cache.iter().position(|e| e.id == id) else {
            return;
        };
        let entry = self.cache.remove(pos);
        self.timers.cancel_all(&entry.timer_ids);

        // One final re-query to catch a record that was slow to refresh.
        let question = Question::new(entry.record.header.name.clone(), entry.record.rdata.real_type());
        self.send_query(&[question], false, now);

        self.events.push_back(CacheEvent {
            kind: CacheEventKind::Expired,
            record: entry.record,
        });
    }

    fn requery_entry(&mut self, id: u64, now: Instant) {
        let Some(entry) = self.cache.iter().find(|e| e.id == id) else {
            return;
        };
        let question = Question::new(entry.record.header.name.clone(), entry.record.rdata.real_type());
        self.send_query(&[question], true, now);
    }
}

impl sansio::Protocol<TaggedBytesMut, (), ()> for Query {
    type Rout = ();
    type Wout = TaggedBytesMut;
    type Eout = CacheEvent;
    type Error = Error;

    fn handle_read(&mut self, msg: TaggedBytesMut) -> Result<()> {
        if self.closed {
            return Err(Error::ErrConnectionClosed);
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
        self.handle_message(&decoded, msg.now);
        Ok(())
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
            return Err(Error::ErrConnectionClosed);
        }
        for (_, kind) in self.timers.pop_due(now) {
            match kind {
                QueryTimer::Send => self.send_scheduled_query(now),
                QueryTimer::Requery(id) => self.requery_entry(id, now),
                QueryTimer::Expire(id) => self.expire_entry(id, now),
            }
        }
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// End the query: cancel every timer and close the event stream.
    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.timers.clear();
        self.cache.clear();
        self.additionals.clear();
        self.write_outs.clear();
        self.events.clear();
        Ok(())
    }
}
