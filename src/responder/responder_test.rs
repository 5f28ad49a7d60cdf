use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use sansio::Protocol;

use super::*;
use crate::message::{AResource, PtrResource, TxtResource};

const PEER: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 77)), 5353);

fn iface() -> InterfaceInfo {
    InterfaceInfo::ipv4(Ipv4Addr::new(192, 168, 1, 10))
}

fn tagged(msg: &Message, peer: SocketAddr, now: Instant) -> TaggedBytesMut {
    TaggedBytesMut {
        now,
        transport: TransportContext {
            local_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5353),
            peer_addr: peer,
            transport_protocol: TransportProtocol::UDP,
        },
        message: BytesMut::from(&msg.pack().unwrap()[..]),
    }
}

fn a_record(name: &str, octets: [u8; 4]) -> Resource {
    Resource::new(
        Name::new(name).unwrap(),
        RData::A(AResource {
            a: Ipv4Addr::from(octets),
        }),
        120,
        true,
    )
}

fn txt_record(name: &str) -> Resource {
    Resource::new(
        Name::new(name).unwrap(),
        RData::Txt(TxtResource { attributes: vec![] }),
        4500,
        true,
    )
}

fn ptr_record(name: &str, target: &str) -> Resource {
    Resource::new(
        Name::new(name).unwrap(),
        RData::Ptr(PtrResource {
            ptr: Name::new(target).unwrap(),
        }),
        4500,
        false,
    )
}

fn drain_writes(r: &mut Responder) -> Vec<Message> {
    let mut out = Vec::new();
    while let Some(w) = r.poll_write() {
        let mut m = Message::default();
        m.unpack(&w.message).unwrap();
        out.push(m);
    }
    out
}

// Walk a fresh responder through probing and both announcements;
// returns the instant right after the second announcement.
fn announce(r: &mut Responder, start: Instant) -> Instant {
    for ms in [250u64, 500, 750, 1000, 2000] {
        r.handle_timeout(start + Duration::from_millis(ms)).unwrap();
    }
    drain_writes(r);
    assert_eq!(r.poll_event(), Some(ResponderEvent::Established));
    assert!(r.poll_timeout().is_none());
    start + Duration::from_millis(2000)
}

#[test]
fn test_probe_then_announce_sequence() {
    let start = Instant::now();
    let record = a_record("unique.local", [10, 0, 0, 1]);
    let mut r = Responder::new(vec![record.clone().into()], iface(), start).unwrap();

    // Nothing before the random 0-250 ms wait could have elapsed.
    assert!(r.poll_write().is_none());

    let mut messages = Vec::new();
    for ms in [250u64, 500, 750, 1000, 2000] {
        r.handle_timeout(start + Duration::from_millis(ms)).unwrap();
        messages.extend(drain_writes(&mut r));
    }

    // Three probes, then two announcements.
    assert_eq!(messages.len(), 5);
    for probe in &messages[..3] {
        assert!(!probe.header.response);
        assert_eq!(probe.questions.len(), 1);
        assert_eq!(probe.questions[0].typ, DnsType::Any);
        assert_eq!(probe.questions[0].name, record.header.name);
        assert_eq!(probe.authorities.len(), 1);
        assert!(probe.authorities[0].same_identity(&record));
        assert!(probe.answers.is_empty());
    }
    for announcement in &messages[3..] {
        assert!(announcement.header.response);
        assert!(announcement.header.authoritative);
        assert!(announcement.authorities.is_empty());
        assert_eq!(announcement.answers.len(), 1);
        assert!(announcement.answers[0].header.cache_flush);
        assert!(announcement.answers[0].same_identity(&record));
    }

    assert_eq!(r.poll_event(), Some(ResponderEvent::Established));
    assert!(r.poll_event().is_none());
}

#[test]
fn test_probe_sees_unique_answer_name_taken() {
    let start = Instant::now();
    let mut r =
        Responder::new(vec![a_record("clash.local", [10, 0, 0, 1]).into()], iface(), start)
            .unwrap();
    r.handle_timeout(start + Duration::from_millis(250)).unwrap();
    drain_writes(&mut r);

    // Another host answers authoritatively with different data.
    let taken = Message {
        header: Header {
            response: true,
            authoritative: true,
            ..Default::default()
        },
        answers: vec![a_record("clash.local", [10, 0, 0, 2])],
        ..Default::default()
    };
    let result = r.handle_read(tagged(&taken, PEER, start + Duration::from_millis(260)));
    assert_eq!(result, Err(Error::ErrNameTaken));

    // The failure latches.
    assert_eq!(
        r.handle_timeout(start + Duration::from_millis(500)),
        Err(Error::ErrNameTaken)
    );
}

fn probe_message(records: Vec<Resource>) -> Message {
    let name = records[0].header.name.clone();
    Message {
        questions: vec![Question::new(name, DnsType::Any)],
        authorities: records,
        ..Default::default()
    }
}

#[test]
fn test_simultaneous_probe_tie_break() {
    let start = Instant::now();

    // The lexicographically smaller RDATA loses.
    let mut loser =
        Responder::new(vec![a_record("tie.local", [1, 1, 1, 1]).into()], iface(), start).unwrap();
    loser.handle_timeout(start + Duration::from_millis(250)).unwrap();
    let result = loser.handle_read(tagged(
        &probe_message(vec![a_record("tie.local", [2, 2, 2, 2])]),
        PEER,
        start + Duration::from_millis(300),
    ));
    assert_eq!(result, Err(Error::ErrSimultaneousProbe));

    // The larger side keeps probing and reaches announcement.
    let mut winner =
        Responder::new(vec![a_record("tie.local", [2, 2, 2, 2]).into()], iface(), start).unwrap();
    winner
        .handle_read(tagged(
            &probe_message(vec![a_record("tie.local", [1, 1, 1, 1])]),
            PEER,
            start + Duration::from_millis(100),
        ))
        .unwrap();
    announce(&mut winner, start);
}

#[test]
fn test_shared_records_do_not_tie_break() {
    let start = Instant::now();
    // Two hosts probing the same service-type PTR with different
    // instance targets is not a conflict: the record set is shared.
    let ours = ptr_record("_http._tcp.local", "mine._http._tcp.local");
    let mut r = Responder::new(vec![ours.into()], iface(), start).unwrap();

    r.handle_read(tagged(
        &probe_message(vec![ptr_record("_http._tcp.local", "theirs._http._tcp.local")]),
        PEER,
        start + Duration::from_millis(100),
    ))
    .unwrap();
    announce(&mut r, start);
}

#[test]
fn test_identical_simultaneous_probe_is_not_a_conflict() {
    let start = Instant::now();
    let record = a_record("same.local", [7, 7, 7, 7]);
    let mut r = Responder::new(vec![record.clone().into()], iface(), start).unwrap();

    r.handle_read(tagged(
        &probe_message(vec![record]),
        PEER,
        start + Duration::from_millis(100),
    ))
    .unwrap();
    announce(&mut r, start);
}

#[test]
fn test_all_unique_answers_sent_immediately() {
    let start = Instant::now();
    let record = a_record("host.local", [10, 0, 0, 1]);
    let mut r = Responder::new(vec![record.clone().into()], iface(), start).unwrap();
    let announced = announce(&mut r, start);

    // Outside the rate-limit window of the announcement.
    let t = announced + Duration::from_secs(2);
    let query = Message {
        questions: vec![Question::new(record.header.name.clone(), DnsType::Any)],
        ..Default::default()
    };
    r.handle_read(tagged(&query, PEER, t)).unwrap();

    let writes = drain_writes(&mut r);
    assert_eq!(writes.len(), 1);
    assert!(writes[0].header.response);
    assert_eq!(writes[0].answers.len(), 1);
    assert!(writes[0].answers[0].same_identity(&record));
    assert_eq!(writes[0].answers[0].header.ttl, 120);
}

#[test]
fn test_shared_answers_are_aggregated() {
    let start = Instant::now();
    let ptr = ptr_record("_http._tcp.local", "web._http._tcp.local");
    let mut r = Responder::new(vec![ptr.clone().into()], iface(), start).unwrap();
    let announced = announce(&mut r, start);

    let t = announced + Duration::from_secs(2);
    let query = Message {
        questions: vec![Question::new(ptr.header.name.clone(), DnsType::Ptr)],
        ..Default::default()
    };
    r.handle_read(tagged(&query, PEER, t)).unwrap();

    // Not immediate...
    assert!(r.poll_write().is_none());
    let deadline = r.poll_timeout().expect("aggregate timer scheduled");
    assert!(deadline >= t + Duration::from_millis(20));
    assert!(deadline <= t + Duration::from_millis(120));

    // ...but out once the aggregate timer fires.
    r.handle_timeout(t + Duration::from_millis(120)).unwrap();
    let writes = drain_writes(&mut r);
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].answers.len(), 1);
    assert!(writes[0].answers[0].same_identity(&ptr));
}

#[test]
fn test_aggregation_merges_answers_into_one_response() {
    let start = Instant::now();
    let http = ptr_record("_http._tcp.local", "web._http._tcp.local");
    let ipp = ptr_record("_ipp._tcp.local", "print._ipp._tcp.local");
    let mut r =
        Responder::new(vec![http.clone().into(), ipp.clone().into()], iface(), start).unwrap();
    let announced = announce(&mut r, start);

    // Two separate queriers ask within the aggregation window.
    let t = announced + Duration::from_secs(2);
    let q1 = Message {
        questions: vec![Question::new(http.header.name.clone(), DnsType::Ptr)],
        ..Default::default()
    };
    let q2 = Message {
        questions: vec![Question::new(ipp.header.name.clone(), DnsType::Ptr)],
        ..Default::default()
    };
    r.handle_read(tagged(&q1, PEER, t)).unwrap();
    r.handle_read(tagged(&q2, PEER, t + Duration::from_millis(5)))
        .unwrap();
    assert!(r.poll_write().is_none());

    r.handle_timeout(t + Duration::from_millis(120)).unwrap();
    let writes = drain_writes(&mut r);
    assert_eq!(writes.len(), 1, "both answers share one response");
    assert_eq!(writes[0].answers.len(), 2);
}

#[test]
fn test_probe_defense_is_immediate_even_for_shared_records() {
    let start = Instant::now();
    let ptr = ptr_record("_http._tcp.local", "web._http._tcp.local");
    let mut r = Responder::new(vec![ptr.clone().into()], iface(), start).unwrap();
    let announced = announce(&mut r, start);

    let t = announced + Duration::from_secs(2);
    // A probe (non-empty authority) touching our record.
    let probe = Message {
        questions: vec![Question::new(ptr.header.name.clone(), DnsType::Any)],
        authorities: vec![ptr_record("_http._tcp.local", "other._http._tcp.local")],
        ..Default::default()
    };
    r.handle_read(tagged(&probe, PEER, t)).unwrap();

    let writes = drain_writes(&mut r);
    assert_eq!(writes.len(), 1);
    assert!(writes[0].answers[0].same_identity(&ptr));
}

#[test]
fn test_known_answer_suppression() {
    let start = Instant::now();
    let record = a_record("host.local", [10, 0, 0, 1]);
    let mut r = Responder::new(vec![record.clone().into()], iface(), start).unwrap();
    let announced = announce(&mut r, start);

    // Querier already has the record with ample TTL: stay silent.
    let t = announced + Duration::from_secs(2);
    let mut known = record.clone();
    known.header.ttl = 120;
    let query = Message {
        questions: vec![Question::new(record.header.name.clone(), DnsType::A)],
        answers: vec![known],
        ..Default::default()
    };
    r.handle_read(tagged(&query, PEER, t)).unwrap();
    assert!(r.poll_write().is_none());

    // A stale known answer (below half our TTL) no longer suppresses.
    let mut stale = record.clone();
    stale.header.ttl = 30;
    let query = Message {
        questions: vec![Question::new(record.header.name.clone(), DnsType::A)],
        answers: vec![stale],
        ..Default::default()
    };
    r.handle_read(tagged(&query, PEER, t + Duration::from_secs(2)))
        .unwrap();
    assert_eq!(drain_writes(&mut r).len(), 1);
}

#[test]
fn test_nsec_for_missing_type_on_owned_name() {
    let start = Instant::now();
    let a = a_record("host.local", [10, 0, 0, 1]);
    let txt = txt_record("host.local");
    let mut r =
        Responder::new(vec![a.clone().into(), txt.into()], iface(), start).unwrap();
    let announced = announce(&mut r, start);

    // SRV is a type we authoritatively lack on that name.
    let t = announced + Duration::from_secs(2);
    let query = Message {
        questions: vec![Question::new(a.header.name.clone(), DnsType::Srv)],
        ..Default::default()
    };
    r.handle_read(tagged(&query, PEER, t)).unwrap();

    let writes = drain_writes(&mut r);
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].answers.len(), 1);
    match &writes[0].answers[0].rdata {
        RData::Nsec(nsec) => {
            assert_eq!(nsec.next_domain, a.header.name);
            assert_eq!(
                nsec.types,
                vec![DnsType::A.value(), DnsType::Txt.value()]
            );
        }
        other => panic!("expected NSEC, got {other}"),
    }
    assert_eq!(writes[0].answers[0].header.ttl, 4500);
}

#[test]
fn test_no_nsec_for_unrefutable_address_family() {
    let start = Instant::now();
    let a = a_record("host.local", [10, 0, 0, 1]);
    let mut r = Responder::new(vec![a.clone().into()], iface(), start).unwrap();
    let announced = announce(&mut r, start);

    // An IPv4-only responder cannot refute AAAA.
    let t = announced + Duration::from_secs(2);
    let query = Message {
        questions: vec![Question::new(a.header.name.clone(), DnsType::Aaaa)],
        ..Default::default()
    };
    r.handle_read(tagged(&query, PEER, t)).unwrap();
    assert!(r.poll_write().is_none());
    assert!(r.poll_timeout().is_none());
}

#[test]
fn test_rate_limit_suppresses_repeat_within_a_second() {
    let start = Instant::now();
    let record = a_record("host.local", [10, 0, 0, 1]);
    let mut r = Responder::new(vec![record.clone().into()], iface(), start).unwrap();
    let announced = announce(&mut r, start);

    let t = announced + Duration::from_secs(2);
    let query = Message {
        questions: vec![Question::new(record.header.name.clone(), DnsType::A)],
        ..Default::default()
    };
    r.handle_read(tagged(&query, PEER, t)).unwrap();
    assert_eq!(drain_writes(&mut r).len(), 1);

    // The same question 500 ms later is ignored...
    r.handle_read(tagged(&query, PEER, t + Duration::from_millis(500)))
        .unwrap();
    assert!(r.poll_write().is_none());

    // ...and answered again once a full second has passed.
    r.handle_read(tagged(&query, PEER, t + Duration::from_millis(1100)))
        .unwrap();
    assert_eq!(drain_writes(&mut r).len(), 1);
}

#[test]
fn test_premature_goodbye_triggers_reannounce() {
    let start = Instant::now();
    let record = a_record("host.local", [10, 0, 0, 1]);
    let mut r = Responder::new(vec![record.clone().into()], iface(), start).unwrap();
    let announced = announce(&mut r, start);

    let t = announced + Duration::from_secs(3);
    let mut goodbye = record.clone();
    goodbye.header.ttl = 0;
    let spoofed = Message {
        header: Header {
            response: true,
            ..Default::default()
        },
        answers: vec![goodbye],
        ..Default::default()
    };
    r.handle_read(tagged(&spoofed, PEER, t)).unwrap();

    let writes = drain_writes(&mut r);
    assert_eq!(writes.len(), 1);
    assert!(writes[0].answers[0].same_identity(&record));
    assert_eq!(writes[0].answers[0].header.ttl, 120);
}

#[test]
fn test_conflicting_response_after_announce() {
    let start = Instant::now();
    let record = a_record("host.local", [10, 0, 0, 1]);
    let mut r = Responder::new(vec![record.into()], iface(), start).unwrap();
    let announced = announce(&mut r, start);

    let conflict = Message {
        header: Header {
            response: true,
            authoritative: true,
            ..Default::default()
        },
        answers: vec![a_record("host.local", [10, 0, 0, 99])],
        ..Default::default()
    };
    let result = r.handle_read(tagged(&conflict, PEER, announced + Duration::from_secs(2)));
    assert_eq!(result, Err(Error::ErrConflict));
}

#[test]
fn test_goodbye_on_close() {
    let start = Instant::now();
    let a = a_record("host.local", [10, 0, 0, 1]);
    let txt = txt_record("host.local");
    let mut r = Responder::new(vec![a.clone().into(), txt.clone().into()], iface(), start).unwrap();
    announce(&mut r, start);

    r.close().unwrap();

    let writes = drain_writes(&mut r);
    assert_eq!(writes.len(), 1);
    assert!(writes[0].header.response);
    assert_eq!(writes[0].answers.len(), 2);
    for answer in &writes[0].answers {
        assert_eq!(answer.header.ttl, 0);
    }

    // No further datagrams follow; the abort is terminal.
    assert!(r.poll_timeout().is_none());
    assert!(r.poll_write().is_none());
    assert_eq!(
        r.handle_timeout(start + Duration::from_secs(10)),
        Err(Error::ErrAborted)
    );
}

#[test]
fn test_empty_record_set_rejected() {
    let start = Instant::now();
    assert!(matches!(
        Responder::new(vec![], iface(), start),
        Err(Error::ErrNoProposedRecords)
    ));
}
