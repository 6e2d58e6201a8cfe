use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use burstrx::config::SyntheticConfig;
use burstrx::{
    BatchLayout, BatchRegion, BurstReceiver, Firewall, Ipv4Header, Packet, PacketInspector,
    PollOutcome, ReceivePoller, ScriptedReceiver, SyntheticReceiver, WordSize,
};

#[derive(Default)]
struct Recorder(Vec<Packet>);

impl PacketInspector for Recorder {
    fn inspect(&mut self, packet: &Packet) {
        self.0.push(packet.clone());
    }
}

fn layout(max_burst: usize, word_size: WordSize) -> BatchLayout {
    BatchLayout {
        max_burst,
        header_gap: 0,
        word_size,
    }
}

/// Header whose fields all derive from `n`, so neighbours never collide.
fn numbered_header(n: u32) -> Ipv4Header {
    Ipv4Header {
        version_ihl: 0x45,
        dscp_ecn: (n % 64) as u8,
        total_length: 40 + n as u16,
        packet_id: n as u16,
        fragment_offset: 0x4000 | (n as u16 & 0x1FFF),
        time_to_live: (n % 255) as u8 + 1,
        next_proto_id: if n % 2 == 0 { 6 } else { 17 },
        hdr_checksum: 0xFFFF - n as u16,
        src_addr: 0x0A00_0000 | n,
        dst_addr: 0xC0A8_0000 | n,
    }
}

#[test]
fn test_batches_of_any_size_decode_exactly() {
    for word_size in [WordSize::Four, WordSize::Eight] {
        for n in [0usize, 1, 7, 512] {
            let headers: Vec<Ipv4Header> = (0..n as u32).map(numbered_header).collect();
            let mut rx = ScriptedReceiver::new();
            let addrs = rx.push_headers(&headers);

            let mut poller =
                ReceivePoller::new(rx, Recorder::default(), layout(512, word_size)).unwrap();
            poller.poll_once().unwrap();

            let packets = &poller.inspector().0;
            assert_eq!(packets.len(), n, "word size {:?}, batch {}", word_size, n);
            for (i, p) in packets.iter().enumerate() {
                assert_eq!(p.header, headers[i]);
                assert_eq!(p.descriptor.header_addr, addrs[i]);
            }
            assert_eq!(poller.total_packets(), n as u64);
        }
    }
}

#[test]
fn test_total_is_sum_of_batch_counts() {
    let sizes = [3usize, 0, 5, 1, 0, 8];
    let mut rx = ScriptedReceiver::new();
    for (k, size) in sizes.iter().enumerate() {
        let headers: Vec<Ipv4Header> = (0..*size as u32)
            .map(|i| numbered_header(k as u32 * 100 + i))
            .collect();
        rx.push_headers(&headers);
    }

    let mut poller =
        ReceivePoller::new(rx, Recorder::default(), layout(16, WordSize::Eight)).unwrap();
    let mut running_total = 0;
    let mut previous = 0;
    for size in sizes {
        let outcome = poller.poll_once().unwrap();
        if size == 0 {
            assert_eq!(outcome, PollOutcome::Idle);
        }
        running_total += size as u64;
        assert_eq!(poller.total_packets(), running_total);
        assert!(poller.total_packets() >= previous);
        previous = poller.total_packets();
    }
    assert_eq!(poller.inspector().0.len(), 17);
    assert_eq!(poller.stats().snapshot().total_packets, 17);
    assert_eq!(poller.stats().snapshot().idle_polls, 2);
}

#[test]
fn test_descriptor_stride_follows_word_size() {
    for (word_size, stride) in [(WordSize::Four, 8usize), (WordSize::Eight, 16)] {
        let mut rx = ScriptedReceiver::new();
        let addrs = rx.push_headers(&[numbered_header(1), numbered_header(2), numbered_header(3)]);

        let mut region = BatchRegion::allocate(layout(4, word_size)).unwrap();
        rx.receive_burst(&mut region).unwrap();

        let bytes = region.as_bytes();
        let w = word_size.bytes();
        for (i, addr) in addrs.iter().enumerate() {
            let at = 2 + i * stride + w;
            let mut word = [0u8; 8];
            word[..w].copy_from_slice(&bytes[at..at + w]);
            let read = if w == 4 {
                u64::from(u32::from_ne_bytes(word[..4].try_into().unwrap()))
            } else {
                u64::from_ne_bytes(word)
            };
            assert_eq!(read, *addr);
        }
    }
}

#[test]
fn test_run_stops_when_flag_cleared() {
    let mut rx = ScriptedReceiver::new();
    rx.push_headers(&[numbered_header(1), numbered_header(2)]);
    rx.push_headers(&[numbered_header(3)]);

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    let mut seen = 0;
    let inspector = move |_: &Packet| {
        seen += 1;
        if seen == 3 {
            flag.store(false, Ordering::Relaxed);
        }
    };

    let mut poller = ReceivePoller::new(rx, inspector, layout(4, WordSize::Eight)).unwrap();
    poller.run(&running).unwrap();
    assert_eq!(poller.total_packets(), 3);
    assert_eq!(poller.receiver().calls(), 2);
}

#[test]
fn test_synthetic_traffic_through_firewall() {
    let rx = SyntheticReceiver::new(SyntheticConfig {
        max_batch: 64,
        seed: Some(42),
        idle_every: 4,
        interval_ms: 0,
    });
    let firewall = Firewall::new(vec!["0.0.0.1/32".parse().unwrap()]);
    let fw_stats = firewall.stats();

    let mut poller = ReceivePoller::new(rx, firewall, layout(64, WordSize::Eight)).unwrap();
    for _ in 0..40 {
        poller.poll_once().unwrap();
    }

    let snap = poller.stats().snapshot();
    assert_eq!(snap.idle_polls, 10);
    assert_eq!(snap.invalid_packets, 0);
    assert_eq!(snap.malformed_batches, 0);
    let inspected =
        fw_stats.forwarded.load(Ordering::Relaxed) + fw_stats.dropped.load(Ordering::Relaxed);
    assert_eq!(inspected, poller.total_packets());
    assert!(poller.total_packets() >= 30);
}
