use std::net::{Ipv4Addr, Ipv6Addr};

use super::*;

fn a_record(name: &str, octets: [u8; 4], ttl: u32, cache_flush: bool) -> Resource {
    Resource::new(
        Name::new(name).unwrap(),
        RData::A(AResource {
            a: Ipv4Addr::from(octets),
        }),
        ttl,
        cache_flush,
    )
}

fn sample_message() -> Message {
    let instance = Name::from_labels(["Living Room. Printer", "_http", "_tcp", "local"]).unwrap();
    let service = Name::new("_http._tcp.local").unwrap();

    Message {
        header: Header {
            id: 0,
            response: true,
            authoritative: true,
            ..Default::default()
        },
        questions: vec![],
        answers: vec![
            Resource::new(
                service.clone(),
                RData::Ptr(PtrResource {
                    ptr: instance.clone(),
                }),
                4500,
                false,
            ),
            Resource::new(
                instance.clone(),
                RData::Srv(SrvResource {
                    priority: 0,
                    weight: 0,
                    port: 8080,
                    target: instance.clone(),
                }),
                120,
                true,
            ),
            Resource::new(
                instance.clone(),
                RData::Txt(TxtResource {
                    attributes: vec![
                        TxtAttribute {
                            key: "path".to_owned(),
                            value: TxtValue::Bytes(b"/printer".to_vec()),
                        },
                        TxtAttribute {
                            key: "flag".to_owned(),
                            value: TxtValue::Present,
                        },
                        TxtAttribute {
                            key: "empty".to_owned(),
                            value: TxtValue::Empty,
                        },
                    ],
                }),
                4500,
                true,
            ),
        ],
        authorities: vec![],
        additionals: vec![
            a_record("Living Room\\. Printer._http._tcp.local", [192, 168, 1, 9], 120, true),
            Resource::new(
                instance.clone(),
                RData::Nsec(NsecResource {
                    next_domain: instance,
                    types: vec![
                        DnsType::A.value(),
                        DnsType::Txt.value(),
                        DnsType::Srv.value(),
                    ],
                }),
                4500,
                true,
            ),
        ],
    }
}

#[test]
fn test_round_trip() {
    let msg = sample_message();
    let packed = msg.pack().unwrap();

    let mut decoded = Message::default();
    decoded.unpack(&packed).unwrap();

    assert_eq!(decoded.header, msg.header);
    assert_eq!(decoded.questions, msg.questions);
    assert_eq!(decoded.answers, msg.answers);
    assert_eq!(decoded.authorities, msg.authorities);
    assert_eq!(decoded.additionals, msg.additionals);

    // Idempotence: decode(encode(decode(m))) == decode(m).
    let repacked = decoded.pack().unwrap();
    let mut decoded2 = Message::default();
    decoded2.unpack(&repacked).unwrap();
    assert_eq!(decoded2, decoded);
}

#[test]
fn test_section_counts_match_header() {
    let msg = sample_message();
    let packed = msg.pack().unwrap();

    // QDCOUNT/ANCOUNT/NSCOUNT/ARCOUNT live at bytes 4..12.
    assert_eq!(u16::from_be_bytes([packed[4], packed[5]]), 0);
    assert_eq!(u16::from_be_bytes([packed[6], packed[7]]), 3);
    assert_eq!(u16::from_be_bytes([packed[8], packed[9]]), 0);
    assert_eq!(u16::from_be_bytes([packed[10], packed[11]]), 2);
}

#[test]
fn test_compression_emits_pointer() {
    // Two answers sharing a name: the second name must collapse to a
    // single two-byte pointer.
    let name = Name::new("compress-me.local").unwrap();
    let msg = Message {
        header: Header {
            response: true,
            ..Default::default()
        },
        answers: vec![
            Resource::new(
                name.clone(),
                RData::A(AResource {
                    a: Ipv4Addr::new(1, 2, 3, 4),
                }),
                120,
                true,
            ),
            Resource::new(
                name.clone(),
                RData::Txt(TxtResource { attributes: vec![] }),
                4500,
                true,
            ),
        ],
        ..Default::default()
    };
    let packed = msg.pack().unwrap();

    // First name starts right after the 12-byte header.
    let second_name_off = 12 + (1 + 11) + (1 + 5) + 1 + 2 + 2 + 4 + 2 + 4;
    assert_eq!(packed[second_name_off] & 0xc0, 0xc0);
    assert_eq!(
        u16::from_be_bytes([packed[second_name_off], packed[second_name_off + 1]]) & 0x3fff,
        12
    );

    let mut decoded = Message::default();
    decoded.unpack(&packed).unwrap();
    assert_eq!(decoded.answers[1].header.name, name);
}

#[test]
fn test_compression_shares_suffixes_across_names() {
    // A subtype PTR name shares its "_http._tcp.local" tail with the
    // service name; the tail must be emitted literally only once.
    let service = Name::new("_http._tcp.local").unwrap();
    let subtype = Name::new("_printer._sub._http._tcp.local").unwrap();
    let instance = Name::new("Web._http._tcp.local").unwrap();

    let msg = Message {
        header: Header {
            response: true,
            ..Default::default()
        },
        answers: vec![
            Resource::new(
                service,
                RData::Ptr(PtrResource {
                    ptr: instance.clone(),
                }),
                4500,
                false,
            ),
            Resource::new(
                subtype.clone(),
                RData::Ptr(PtrResource { ptr: instance }),
                4500,
                false,
            ),
        ],
        ..Default::default()
    };
    let packed = msg.pack().unwrap();

    let count = packed
        .windows(6)
        .filter(|w| *w == [5, b'_', b'h', b't', b't', b'p'])
        .count();
    assert_eq!(count, 1, "the shared tail is packed once");

    let mut decoded = Message::default();
    decoded.unpack(&packed).unwrap();
    assert_eq!(decoded.answers[1].header.name, subtype);
}

#[test]
fn test_unpack_hand_crafted_query() {
    // A query for banana.local A, built byte by byte.
    #[rustfmt::skip]
    let raw = [
        0x00, 0x00, // id
        0x00, 0x00, // flags: standard query
        0x00, 0x01, // QDCOUNT
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // AN/NS/AR
        0x06, b'b', b'a', b'n', b'a', b'n', b'a',
        0x05, b'l', b'o', b'c', b'a', b'l',
        0x00,
        0x00, 0x01, // QTYPE A
        0x80, 0x01, // QCLASS IN, unicast-response set
    ];

    let mut msg = Message::default();
    msg.unpack(&raw).unwrap();

    assert!(!msg.header.response);
    assert_eq!(msg.questions.len(), 1);
    let q = &msg.questions[0];
    assert_eq!(q.name, Name::new("banana.local").unwrap());
    assert_eq!(q.typ, DnsType::A);
    assert_eq!(q.class, CLASS_INET);
    assert!(q.unicast_response);
}

#[test]
fn test_unpack_pointer_chain() {
    // The answer's name is one label plus a pointer whose target itself
    // ends in a pointer; decoders tolerate chains even though the
    // encoder never produces them.
    #[rustfmt::skip]
    let raw = [
        0x00, 0x00,
        0x84, 0x00, // response, authoritative
        0x00, 0x02, // QDCOUNT
        0x00, 0x01, // ANCOUNT
        0x00, 0x00, 0x00, 0x00,
        // offset 12: question 1, "host.local" A IN
        0x04, b'h', b'o', b's', b't',
        0x05, b'l', b'o', b'c', b'a', b'l',
        0x00,
        0x00, 0x01, 0x00, 0x01,
        // offset 28: question 2, "sub" + pointer to 12, A IN
        0x03, b's', b'u', b'b', 0xc0, 0x0c,
        0x00, 0x01, 0x00, 0x01,
        // offset 38: answer, name = pointer to 28 (a chain via 12)
        0xc0, 0x1c,
        0x00, 0x01, // A
        0x80, 0x01, // IN, cache-flush
        0x00, 0x00, 0x00, 0x78, // ttl 120
        0x00, 0x04,
        0x0a, 0x00, 0x00, 0x01,
    ];
    let mut msg = Message::default();
    msg.unpack(&raw).unwrap_or_else(|e| panic!("unpack: {e}"));

    assert_eq!(msg.questions.len(), 2);
    assert_eq!(msg.questions[1].name, Name::new("sub.host.local").unwrap());

    assert_eq!(msg.answers.len(), 1);
    let rec = &msg.answers[0];
    assert_eq!(rec.header.name, Name::new("sub.host.local").unwrap());
    assert!(rec.header.cache_flush);
    assert_eq!(rec.header.ttl, 120);
    match &rec.rdata {
        RData::A(a) => assert_eq!(a.a, Ipv4Addr::new(10, 0, 0, 1)),
        other => panic!("expected A, got {other}"),
    }
}

#[test]
fn test_unpack_rejects_forward_pointer() {
    #[rustfmt::skip]
    let raw = [
        0x00, 0x00,
        0x00, 0x00,
        0x00, 0x01,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0xc0, 0x20, // points past itself
        0x00, 0x01,
        0x00, 0x01,
    ];
    let mut msg = Message::default();
    assert_eq!(msg.unpack(&raw), Err(crate::error::Error::ErrInvalidPtr));
}

#[test]
fn test_unpack_truncated_inputs() {
    let packed = sample_message().pack().unwrap();

    // Chopping the message anywhere must error, never panic.
    for len in 0..packed.len() {
        let mut msg = Message::default();
        assert!(msg.unpack(&packed[..len]).is_err(), "len {len} decoded");
    }
}

#[test]
fn test_label_too_long() {
    assert_eq!(
        Name::from_labels([vec![b'x'; 64]]),
        Err(crate::error::Error::ErrSegTooLong)
    );
    assert!(Name::from_labels([vec![b'x'; 63]]).is_ok());
}

#[test]
fn test_name_case_insensitive() {
    let a = Name::new("Chess._TCP.Local").unwrap();
    let b = Name::new("chess._tcp.local").unwrap();
    assert_eq!(a, b);
    assert!(a.ends_with(&Name::new("_tcp.local").unwrap()));
}

#[test]
fn test_name_escaped_dots() {
    let name = Name::new("web\\.server.local").unwrap();
    assert_eq!(name.labels().len(), 2);
    assert_eq!(name.labels()[0], b"web.server".to_vec());
    assert_eq!(name.to_string(), "web\\.server.local.");
}

#[test]
fn test_txt_tri_state_round_trip() {
    let txt = TxtResource {
        attributes: vec![
            TxtAttribute {
                key: "k".to_owned(),
                value: TxtValue::Bytes(b"v".to_vec()),
            },
            TxtAttribute {
                key: "marker".to_owned(),
                value: TxtValue::Present,
            },
            TxtAttribute {
                key: "nil".to_owned(),
                value: TxtValue::Empty,
            },
        ],
    };
    let packed = txt.pack(Vec::new()).unwrap();
    assert_eq!(
        packed,
        [
            3, b'k', b'=', b'v',
            6, b'm', b'a', b'r', b'k', b'e', b'r',
            4, b'n', b'i', b'l', b'=',
        ]
    );

    let mut decoded = TxtResource::default();
    decoded.unpack(&packed, 0, packed.len()).unwrap();
    assert_eq!(decoded, txt);
    assert_eq!(decoded.get("K"), Some(&TxtValue::Bytes(b"v".to_vec())));
    assert_eq!(decoded.get("absent"), None);
}

#[test]
fn test_txt_empty_is_single_zero_byte() {
    let txt = TxtResource { attributes: vec![] };
    let packed = txt.pack(Vec::new()).unwrap();
    assert_eq!(packed, [0]);

    let mut decoded = TxtResource::default();
    decoded.unpack(&packed, 0, 1).unwrap();
    assert!(decoded.attributes.is_empty());
}

#[test]
fn test_nsec_bitmap() {
    let nsec = NsecResource {
        next_domain: Name::new("host.local").unwrap(),
        types: vec![DnsType::Srv.value(), DnsType::A.value(), DnsType::Txt.value()],
    };
    let packed = nsec.pack(Vec::new(), &mut None, 0).unwrap();

    // name, window 0, bitmap of ceil((33+1)/8) = 5 bytes.
    let bitmap_start = packed.len() - 5;
    assert_eq!(packed[bitmap_start - 2], 0);
    assert_eq!(packed[bitmap_start - 1], 5);
    // Bit b of byte i (MSB = bit 0) carries type 8*i + (7-b): type 1
    // (A) is byte 0 bit 6, type 16 (TXT) byte 2 bit 7, type 33 (SRV)
    // byte 4 bit 6.
    assert_eq!(packed[bitmap_start], 0x02);
    assert_eq!(packed[bitmap_start + 2], 0x01);
    assert_eq!(packed[bitmap_start + 4], 0x02);

    let mut decoded = NsecResource::default();
    let off = decoded.unpack(&packed, 0, packed.len()).unwrap();
    assert!(off.is_some());
    assert_eq!(decoded.types, vec![1, 16, 33]);
    assert_eq!(decoded.next_domain, nsec.next_domain);
}

#[test]
fn test_nsec_nonzero_window_stays_opaque() {
    // name "x.local", window 1.
    #[rustfmt::skip]
    let rdata = [
        0x01, b'x', 0x05, b'l', b'o', b'c', b'a', b'l', 0x00,
        0x01, // window 1
        0x01, // bitmap length 1
        0x80,
    ];
    let (decoded, _) = RData::unpack_rdata(DnsType::Nsec, &rdata, 0, rdata.len()).unwrap();
    match decoded {
        RData::Opaque(op) => {
            assert_eq!(op.typ, DnsType::Nsec);
            assert_eq!(op.data, rdata);
        }
        other => panic!("expected opaque, got {other}"),
    }
}

#[test]
fn test_unknown_type_passes_through() {
    // A CNAME (type 5) record must survive decode/encode untouched.
    let inner = Name::new("alias.local").unwrap();
    let target = inner.pack(Vec::new(), &mut None, 0).unwrap();

    let rec = Resource::new(
        Name::new("odd.local").unwrap(),
        RData::Opaque(OpaqueResource {
            typ: DnsType::Unknown(5),
            data: target.clone(),
        }),
        60,
        false,
    );
    let msg = Message {
        header: Header {
            response: true,
            ..Default::default()
        },
        answers: vec![rec.clone()],
        ..Default::default()
    };
    let packed = msg.pack().unwrap();

    let mut decoded = Message::default();
    decoded.unpack(&packed).unwrap();
    assert_eq!(decoded.answers[0], rec);
    assert_eq!(decoded.answers[0].rdata.real_type().value(), 5);
}

#[test]
fn test_aaaa_display_elides_zeros() {
    let rec = AaaaResource {
        aaaa: Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0x42),
    };
    assert_eq!(rec.to_string(), "AAAA{fe80::42}");
}

#[test]
fn test_header_flag_bits() {
    let header = Header {
        id: 0xabcd,
        response: true,
        op_code: 2,
        authoritative: true,
        truncated: false,
        recursion_desired: true,
        recursion_available: false,
        zero: false,
        authentic_data: true,
        checking_disabled: false,
        rcode: RCode::Refused,
    };
    let (id, bits) = header.pack();
    assert_eq!(id, 0xabcd);
    // QR | opcode 2 | AA | RD | AD | rcode 5
    assert_eq!(bits, 0x8000 | 2 << 11 | 1 << 10 | 1 << 8 | 1 << 5 | 5);

    let mut decoded = Header::default();
    decoded.set_from_bits(id, bits);
    assert_eq!(decoded, header);
}

#[test]
fn test_record_ordering_is_canonical() {
    let small = a_record("tie.local", [1, 1, 1, 1], 120, true);
    let large = a_record("tie.local", [1, 1, 1, 2], 120, true);
    assert_eq!(
        compare_records(&small, &large),
        std::cmp::Ordering::Less
    );
    assert_eq!(
        compare_records(&small, &small),
        std::cmp::Ordering::Equal
    );

    // Type is compared before RDATA.
    let txt = Resource::new(
        Name::new("tie.local").unwrap(),
        RData::Txt(TxtResource { attributes: vec![] }),
        4500,
        true,
    );
    assert_eq!(compare_records(&small, &txt), std::cmp::Ordering::Less);
}
