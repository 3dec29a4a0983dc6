// src/sniff.rs
use crossbeam_channel::Sender;
use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use pcap::{Capture, Offline};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::parser::{Classifier, HttpEvent};

const PCAP_MAGIC: u32 = 0xa1b2_c3d4;
const PCAP_MAGIC_SWAPPED: u32 = 0xd4c3_b2a1;
const PCAP_NSEC_MAGIC: u32 = 0xa1b2_3c4d;
const PCAP_NSEC_MAGIC_SWAPPED: u32 = 0x4d3c_b2a1;
const PCAPNG_MAGIC: u32 = 0x0a0d_0d0a;

// libpcap DLT_* values
const LINKTYPE_NULL: i32 = 0;
const LINKTYPE_ETHERNET: i32 = 1;
const LINKTYPE_RAW_BSD: i32 = 12;
const LINKTYPE_RAW_OPENBSD: i32 = 14;
const LINKTYPE_RAW: i32 = 101;
const LINKTYPE_LINUX_SLL: i32 = 113;

/// One TCP packet carrying application payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TcpSegment {
    pub src: SocketAddr,
    pub dst: SocketAddr,
    pub timestamp: DateTime<Utc>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    Pcap,
    PcapNg,
}

impl CaptureFormat {
    /// Identifies the container from its leading magic number.
    pub fn sniff(path: &Path) -> Result<Self> {
        let open_err = |source| Error::Open {
            path: path.to_path_buf(),
            source,
        };
        let mut magic = [0u8; 4];
        File::open(path)
            .and_then(|mut f| f.read_exact(&mut magic))
            .map_err(open_err)?;
        Self::from_magic(u32::from_le_bytes(magic))
    }

    pub fn from_magic(magic: u32) -> Result<Self> {
        match magic {
            PCAP_MAGIC | PCAP_MAGIC_SWAPPED | PCAP_NSEC_MAGIC | PCAP_NSEC_MAGIC_SWAPPED => {
                Ok(CaptureFormat::Pcap)
            }
            PCAPNG_MAGIC => Ok(CaptureFormat::PcapNg),
            _ => Err(Error::UnknownFormat { magic }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkLayer {
    Ethernet,
    LinuxSll,
    RawIp,
    Loopback,
}

impl LinkLayer {
    fn from_linktype(linktype: i32) -> Option<Self> {
        match linktype {
            LINKTYPE_ETHERNET => Some(LinkLayer::Ethernet),
            LINKTYPE_LINUX_SLL => Some(LinkLayer::LinuxSll),
            LINKTYPE_RAW | LINKTYPE_RAW_BSD | LINKTYPE_RAW_OPENBSD => Some(LinkLayer::RawIp),
            LINKTYPE_NULL => Some(LinkLayer::Loopback),
            _ => None,
        }
    }

    fn slice<'a>(self, data: &'a [u8]) -> Option<SlicedPacket<'a>> {
        match self {
            LinkLayer::Ethernet => SlicedPacket::from_ethernet(data).ok(),
            LinkLayer::LinuxSll => SlicedPacket::from_linux_sll(data).ok(),
            LinkLayer::RawIp => SlicedPacket::from_ip(data).ok(),
            // 4-byte address family header precedes the IP packet
            LinkLayer::Loopback => SlicedPacket::from_ip(data.get(4..)?).ok(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DecodeStats {
    pub packets: u64,
    pub tcp_segments: u64,
    pub skipped: u64,
    /// Record-level read failures; the first one ends the trace.
    pub read_errors: u64,
}

/// Lazy, capture-ordered reader of TCP segments from a trace file.
pub struct TraceReader {
    cap: Capture<Offline>,
    link: LinkLayer,
    stats: DecodeStats,
}

pub fn open_trace(path: &Path) -> Result<TraceReader> {
    let format = CaptureFormat::sniff(path)?;
    let cap = Capture::from_file(path)?;
    let linktype = cap.get_datalink();
    let link = LinkLayer::from_linktype(linktype.0).ok_or(Error::UnsupportedLinkType(linktype.0))?;

    info!(path = %path.display(), ?format, ?link, "opened capture");
    Ok(TraceReader {
        cap,
        link,
        stats: DecodeStats::default(),
    })
}

impl TraceReader {
    pub fn stats(&self) -> DecodeStats {
        self.stats
    }
}

/// Yields TCP segments with a payload until end of file.
///
/// Once the header has been read, a damaged or cut-off record (for example
/// a capture whose writer was killed) ends the trace instead of failing it.
impl Iterator for TraceReader {
    type Item = TcpSegment;

    fn next(&mut self) -> Option<TcpSegment> {
        if self.stats.read_errors > 0 {
            return None;
        }
        loop {
            let packet = match self.cap.next_packet() {
                Ok(packet) => packet,
                Err(pcap::Error::NoMorePackets) => return None,
                Err(e) => {
                    self.stats.read_errors += 1;
                    warn!(error = %e, packets = self.stats.packets, "capture ends early");
                    return None;
                }
            };
            self.stats.packets += 1;

            let ts = packet.header.ts;
            let timestamp = packet_timestamp(ts.tv_sec as i64, ts.tv_usec as i64);
            match timestamp.and_then(|t| analyze_packet(self.link, packet.data, t)) {
                Some(segment) => {
                    self.stats.tcp_segments += 1;
                    return Some(segment);
                }
                None => self.stats.skipped += 1,
            }
        }
    }
}

fn packet_timestamp(secs: i64, micros: i64) -> Option<DateTime<Utc>> {
    let nanos = u32::try_from(micros.checked_mul(1000)?).ok()?;
    DateTime::from_timestamp(secs, nanos)
}

fn analyze_packet(link: LinkLayer, data: &[u8], timestamp: DateTime<Utc>) -> Option<TcpSegment> {
    let sliced = link.slice(data)?;
    let (src_ip, dst_ip) = handle_ip(sliced.net.as_ref()?);

    let tcp = match sliced.transport.as_ref()? {
        TransportSlice::Tcp(tcp) => tcp,
        _ => return None,
    };
    let payload = tcp.payload();
    if payload.is_empty() {
        return None;
    }

    Some(TcpSegment {
        src: SocketAddr::new(src_ip, tcp.source_port()),
        dst: SocketAddr::new(dst_ip, tcp.destination_port()),
        timestamp,
        payload: payload.to_vec(),
    })
}

fn handle_ip(net: &NetSlice) -> (IpAddr, IpAddr) {
    match net {
        NetSlice::Ipv4(ipv4) => {
            let header = ipv4.header();
            (header.source_addr().into(), header.destination_addr().into())
        }
        NetSlice::Ipv6(ipv6) => {
            let header = ipv6.header();
            (header.source_addr().into(), header.destination_addr().into())
        }
    }
}

/// Decodes and classifies `path` on its own thread, sending events to
/// `sender` in capture order. Stops early once `running` is cleared.
pub fn spawn_decoder(
    path: PathBuf,
    classifier: Box<dyn Classifier>,
    sender: Sender<HttpEvent>,
    running: Arc<AtomicBool>,
) -> JoinHandle<Result<DecodeStats>> {
    thread::spawn(move || -> Result<DecodeStats> {
        let mut reader = open_trace(&path)?;
        while running.load(Ordering::SeqCst) {
            let Some(segment) = reader.next() else {
                break;
            };
            let Some(event) = classifier.classify(&segment) else {
                trace!(src = %segment.src, dst = %segment.dst, "non-HTTP payload");
                continue;
            };
            if sender.send(event).is_err() {
                debug!("event receiver closed, stopping decoder");
                break;
            }
        }
        let stats = reader.stats();
        info!(
            packets = stats.packets,
            tcp_segments = stats.tcp_segments,
            skipped = stats.skipped,
            read_errors = stats.read_errors,
            "capture decoded"
        );
        Ok(stats)
    })
}
