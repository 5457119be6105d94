//! From-scratch ICMP echo prober.
//!
//! Sends four echo requests over a raw IPv4 ICMP socket, one per second,
//! and correlates replies by (identifier, sequence). Destination Unreachable
//! and Time Exceeded answers are decoded down to the embedded original echo
//! request so a stray error for someone else's probe is never misattributed.
//!
//! Requires a privileged (raw-socket capable) process.

use crate::{Error, Result};
use socket2::{Domain, Protocol, Socket, Type};
use spectra_metrics::PingResult;
use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Echo requests sent per probe run.
const PROBE_COUNT: u16 = 4;

/// Receive window per sequence.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Pause between sequences.
const PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Fixed 12-byte payload carried by every request.
const PAYLOAD: &[u8] = b"SPECTRA-PING";

// ICMP message types
const ECHO_REPLY: u8 = 0;
const DEST_UNREACHABLE: u8 = 3;
const ECHO_REQUEST: u8 = 8;
const TIME_EXCEEDED: u8 = 11;

/// Standard 16-bit ones-complement checksum over the full message with the
/// checksum field treated as zero during computation. Verifying a marshaled
/// message yields 0.
pub fn calculate_checksum(data: &[u8]) -> u16 {
    let mut sum = 0u32;

    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u32::from(u16::from_be_bytes([chunk[0], chunk[1]]));
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(u16::from_be_bytes([*last, 0]));
    }

    // Fold the carries back in
    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}

/// One echo request ready to marshal.
#[derive(Debug, Clone, Copy)]
pub struct EchoRequest {
    pub ident: u16,
    pub seq: u16,
}

impl EchoRequest {
    /// Serialize header + payload with the checksum filled in.
    pub fn marshal(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(8 + PAYLOAD.len());
        packet.push(ECHO_REQUEST);
        packet.push(0); // code
        packet.extend_from_slice(&[0, 0]); // checksum placeholder
        packet.extend_from_slice(&self.ident.to_be_bytes());
        packet.extend_from_slice(&self.seq.to_be_bytes());
        packet.extend_from_slice(PAYLOAD);

        let checksum = calculate_checksum(&packet);
        packet[2..4].copy_from_slice(&checksum.to_be_bytes());
        packet
    }
}

/// How a received message relates to an outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Matching echo reply.
    EchoReply,
    /// Destination unreachable carrying our embedded request; ICMP code kept.
    Unreachable(u8),
    /// TTL exceeded carrying our embedded request; ICMP code kept.
    TtlExceeded(u8),
}

/// Strip the IPv4 header off a raw receive buffer. IHL is the low nibble of
/// byte 0, in 32-bit words.
fn strip_ipv4_header(buf: &[u8]) -> Option<&[u8]> {
    if buf.len() < 20 {
        return None;
    }
    let ihl = usize::from(buf[0] & 0x0F) * 4;
    if ihl < 20 || buf.len() < ihl {
        return None;
    }
    Some(&buf[ihl..])
}

/// Decide whether an ICMP message (header already at offset 0) answers the
/// request identified by (ident, seq).
pub fn match_reply(icmp: &[u8], ident: u16, seq: u16) -> Option<ReplyKind> {
    if icmp.len() < 8 {
        return None;
    }

    let kind = icmp[0];
    let code = icmp[1];

    match kind {
        ECHO_REPLY => {
            let got_ident = u16::from_be_bytes([icmp[4], icmp[5]]);
            let got_seq = u16::from_be_bytes([icmp[6], icmp[7]]);
            (got_ident == ident && got_seq == seq).then_some(ReplyKind::EchoReply)
        }
        DEST_UNREACHABLE | TIME_EXCEEDED => {
            // After the 4-byte unused/next-hop-MTU field sits the original
            // IPv4 header, then the first 8 bytes of our request.
            let embedded = strip_ipv4_header(&icmp[8..])?;
            if embedded.len() < 8 || embedded[0] != ECHO_REQUEST {
                return None;
            }
            let got_ident = u16::from_be_bytes([embedded[4], embedded[5]]);
            let got_seq = u16::from_be_bytes([embedded[6], embedded[7]]);
            if got_ident != ident || got_seq != seq {
                return None;
            }
            Some(if kind == DEST_UNREACHABLE {
                ReplyKind::Unreachable(code)
            } else {
                ReplyKind::TtlExceeded(code)
            })
        }
        _ => None,
    }
}

/// Resolve a hostname or literal to an IPv4 address.
fn resolve_ipv4(target: &str) -> Result<SocketAddr> {
    if let Ok(ip) = target.parse::<IpAddr>() {
        if let IpAddr::V4(v4) = ip {
            return Ok(SocketAddr::new(IpAddr::V4(v4), 0));
        }
        return Err(Error::Malformed(format!("{} is not an IPv4 address", target)));
    }

    (target, 0)
        .to_socket_addrs()
        .map_err(|e| Error::Platform(format!("resolving {}: {}", target, e)))?
        .find(|addr| addr.is_ipv4())
        .ok_or_else(|| Error::NotFound(format!("no IPv4 address for {}", target)))
}

/// Run the full four-probe exchange against `target`.
///
/// Returns one result per sequence, in order. Cancellation between blocking
/// steps aborts the run with [`Error::Cancelled`].
pub fn ping(target: &str, cancel: &CancellationToken) -> Result<Vec<PingResult>> {
    let addr = resolve_ipv4(target)?;

    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
        .map_err(|e| Error::Permission(format!("opening raw ICMP socket: {}", e)))?;

    // Low 16 bits of the PID, matched against every reply
    let ident = std::process::id() as u16;

    let mut results = Vec::with_capacity(PROBE_COUNT as usize);

    for seq in 0..PROBE_COUNT {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        results.push(probe_once(&socket, addr, ident, seq, cancel)?);

        // No pause after the last sequence
        if seq + 1 < PROBE_COUNT {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            std::thread::sleep(PROBE_INTERVAL);
        }
    }

    Ok(results)
}

/// Send one echo request and wait for its answer.
fn probe_once(
    socket: &Socket,
    addr: SocketAddr,
    ident: u16,
    seq: u16,
    cancel: &CancellationToken,
) -> Result<PingResult> {
    let packet = EchoRequest { ident, seq }.marshal();
    let sent_at = Instant::now();

    if let Err(e) = socket.send_to(&packet, &addr.into()) {
        return Ok(PingResult {
            seq,
            success: false,
            rtt: Duration::ZERO,
            response: format!("write failed: {}", e),
            peer: String::new(),
            code: None,
        });
    }

    let deadline = sent_at + PROBE_TIMEOUT;
    let mut buf = [MaybeUninit::<u8>::uninit(); 1500];

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(PingResult::timeout(seq));
        }
        socket.set_read_timeout(Some(remaining))?;

        let (len, peer) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Ok(PingResult::timeout(seq));
            }
            Err(e) => {
                log::debug!("icmp read error: {}", e);
                return Ok(PingResult::timeout(seq));
            }
        };

        let datagram = unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, len) };
        let Some(icmp) = strip_ipv4_header(datagram) else { continue };

        let peer = peer
            .as_socket()
            .map(|s| s.ip().to_string())
            .unwrap_or_default();

        match match_reply(icmp, ident, seq) {
            Some(ReplyKind::EchoReply) => {
                return Ok(PingResult {
                    seq,
                    success: true,
                    rtt: sent_at.elapsed(),
                    response: "reply".to_string(),
                    peer,
                    code: None,
                });
            }
            Some(ReplyKind::Unreachable(code)) => {
                return Ok(PingResult {
                    seq,
                    success: false,
                    rtt: sent_at.elapsed(),
                    response: "dest unreachable".to_string(),
                    peer,
                    code: Some(code),
                });
            }
            Some(ReplyKind::TtlExceeded(code)) => {
                return Ok(PingResult {
                    seq,
                    success: false,
                    rtt: sent_at.elapsed(),
                    response: "ttl exceeded".to_string(),
                    peer,
                    code: Some(code),
                });
            }
            // Someone else's traffic; keep reading until our deadline
            None => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a synthetic echo reply as it would arrive: IPv4 header + ICMP.
    fn reply_datagram(ihl_words: u8, kind: u8, ident: u16, seq: u16) -> Vec<u8> {
        let header_len = usize::from(ihl_words) * 4;
        let mut datagram = vec![0u8; header_len];
        datagram[0] = 0x40 | ihl_words; // version 4 + IHL

        let mut icmp = vec![kind, 0, 0, 0];
        icmp.extend_from_slice(&ident.to_be_bytes());
        icmp.extend_from_slice(&seq.to_be_bytes());
        icmp.extend_from_slice(PAYLOAD);
        let checksum = calculate_checksum(&icmp);
        icmp[2..4].copy_from_slice(&checksum.to_be_bytes());

        datagram.extend_from_slice(&icmp);
        datagram
    }

    /// Build a Destination Unreachable / Time Exceeded message embedding the
    /// original request.
    fn error_datagram(kind: u8, code: u8, embedded_kind: u8, ident: u16, seq: u16) -> Vec<u8> {
        let mut datagram = vec![0u8; 20];
        datagram[0] = 0x45;

        let mut icmp = vec![kind, code, 0, 0, 0, 0, 0, 0]; // header + unused

        // Embedded original IPv4 header (no options)
        let mut inner_ip = vec![0u8; 20];
        inner_ip[0] = 0x45;
        icmp.extend_from_slice(&inner_ip);

        let mut request = vec![embedded_kind, 0, 0, 0];
        request.extend_from_slice(&ident.to_be_bytes());
        request.extend_from_slice(&seq.to_be_bytes());
        icmp.extend_from_slice(&request);

        datagram.extend_from_slice(&icmp);
        datagram
    }

    #[test]
    fn marshal_layout_and_checksum() {
        let packet = EchoRequest { ident: 0x1234, seq: 0x0001 }.marshal();

        assert_eq!(packet[0], 0x08);
        assert_eq!(packet[1], 0x00);
        assert_eq!(&packet[4..6], &[0x12, 0x34]);
        assert_eq!(&packet[6..8], &[0x00, 0x01]);
        assert_eq!(&packet[8..], PAYLOAD);
        assert_eq!(packet.len(), 8 + 12);

        // Verification over the full message yields zero
        assert_eq!(calculate_checksum(&packet), 0);
    }

    #[test]
    fn checksum_of_any_marshaled_message_verifies_to_zero() {
        for ident in [0u16, 1, 0xBEEF, u16::MAX] {
            for seq in 0..4 {
                let packet = EchoRequest { ident, seq }.marshal();
                assert_eq!(calculate_checksum(&packet), 0);
            }
        }
    }

    #[test]
    fn checksum_odd_length() {
        // Odd-length payloads are padded with a zero byte
        assert_eq!(calculate_checksum(&[0xFF]), !0xFF00);
    }

    #[test]
    fn matches_echo_reply_with_same_identity() {
        let datagram = reply_datagram(5, ECHO_REPLY, 77, 2);
        let icmp = strip_ipv4_header(&datagram).unwrap();
        assert_eq!(match_reply(icmp, 77, 2), Some(ReplyKind::EchoReply));
    }

    #[test]
    fn ignores_wrong_identity_or_sequence() {
        let datagram = reply_datagram(5, ECHO_REPLY, 77, 2);
        let icmp = strip_ipv4_header(&datagram).unwrap();
        assert_eq!(match_reply(icmp, 78, 2), None);
        assert_eq!(match_reply(icmp, 77, 3), None);
    }

    #[test]
    fn handles_ip_options_in_outer_header() {
        // IHL of 6 words = 24-byte header
        let datagram = reply_datagram(6, ECHO_REPLY, 5, 0);
        let icmp = strip_ipv4_header(&datagram).unwrap();
        assert_eq!(match_reply(icmp, 5, 0), Some(ReplyKind::EchoReply));
    }

    #[test]
    fn decodes_unreachable_with_embedded_request() {
        let datagram = error_datagram(DEST_UNREACHABLE, 1, ECHO_REQUEST, 42, 3);
        let icmp = strip_ipv4_header(&datagram).unwrap();
        assert_eq!(match_reply(icmp, 42, 3), Some(ReplyKind::Unreachable(1)));
    }

    #[test]
    fn decodes_ttl_exceeded_with_embedded_request() {
        let datagram = error_datagram(TIME_EXCEEDED, 0, ECHO_REQUEST, 42, 1);
        let icmp = strip_ipv4_header(&datagram).unwrap();
        assert_eq!(match_reply(icmp, 42, 1), Some(ReplyKind::TtlExceeded(0)));
    }

    #[test]
    fn rejects_errors_embedding_foreign_traffic() {
        // Embedded message is not an echo request
        let datagram = error_datagram(DEST_UNREACHABLE, 1, ECHO_REPLY, 42, 3);
        let icmp = strip_ipv4_header(&datagram).unwrap();
        assert_eq!(match_reply(icmp, 42, 3), None);

        // Echo request, but someone else's identifier
        let datagram = error_datagram(DEST_UNREACHABLE, 1, ECHO_REQUEST, 999, 3);
        let icmp = strip_ipv4_header(&datagram).unwrap();
        assert_eq!(match_reply(icmp, 42, 3), None);
    }

    #[test]
    fn rejects_truncated_messages() {
        assert_eq!(match_reply(&[0, 0, 0], 1, 1), None);
        assert!(strip_ipv4_header(&[0x45, 0, 0]).is_none());
    }

    #[test]
    fn cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        match ping("127.0.0.1", &cancel) {
            Err(Error::Cancelled) | Err(Error::Permission(_)) => {}
            other => panic!("expected cancellation, got {:?}", other.map(|r| r.len())),
        }
    }

    /// Requires CAP_NET_RAW (or root); run with `--ignored` on a privileged
    /// host.
    #[test]
    #[ignore]
    fn live_loopback_probe() {
        let results = ping("127.0.0.1", &CancellationToken::new()).unwrap();
        assert_eq!(results.len(), 4);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.seq as usize, i);
            assert!(result.success, "seq {} got {}", i, result.response);
            assert_eq!(result.peer, "127.0.0.1");
        }
    }
}
