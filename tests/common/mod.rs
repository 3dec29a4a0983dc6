//! Builders for small synthetic capture files.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use etherparse::PacketBuilder;

pub const CLIENT_IP: [u8; 4] = [10, 0, 0, 1];
pub const SERVER_IP: [u8; 4] = [93, 184, 216, 34];
pub const BASE_SECS: u32 = 1_700_000_000;

/// One captured frame: timestamp in milliseconds after `BASE_SECS`.
pub struct Frame {
    pub at_ms: u64,
    pub data: Vec<u8>,
}

pub fn tcp(at_ms: u64, src: ([u8; 4], u16), dst: ([u8; 4], u16), payload: &str) -> Frame {
    let builder = PacketBuilder::ethernet2([2, 0, 0, 0, 0, 1], [2, 0, 0, 0, 0, 2])
        .ipv4(src.0, dst.0, 64)
        .tcp(src.1, dst.1, 1000, 65535);
    let mut data = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut data, payload.as_bytes()).unwrap();
    Frame { at_ms, data }
}

pub fn get(at_ms: u64, client_port: u16, path: &str, host: &str) -> Frame {
    tcp(
        at_ms,
        (CLIENT_IP, client_port),
        (SERVER_IP, 80),
        &format!("GET {path} HTTP/1.1\r\nHost: {host}\r\nAccept: */*\r\n\r\n"),
    )
}

pub fn respond(at_ms: u64, client_port: u16, status: &str) -> Frame {
    tcp(
        at_ms,
        (SERVER_IP, 80),
        (CLIENT_IP, client_port),
        &format!("HTTP/1.1 {status}\r\nContent-Length: 0\r\n\r\n"),
    )
}

fn split_ts(at_ms: u64) -> (u32, u32) {
    let secs = BASE_SECS + (at_ms / 1000) as u32;
    let micros = ((at_ms % 1000) * 1000) as u32;
    (secs, micros)
}

/// Classic little-endian pcap, microsecond resolution, Ethernet link type.
pub fn pcap_bytes(frames: &[Frame]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&65535u32.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());

    for frame in frames {
        let (secs, micros) = split_ts(frame.at_ms);
        let len = frame.data.len() as u32;
        out.extend_from_slice(&secs.to_le_bytes());
        out.extend_from_slice(&micros.to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&frame.data);
    }
    out
}

/// Minimal pcapng: one section, one Ethernet interface, enhanced packet blocks.
pub fn pcapng_bytes(frames: &[Frame]) -> Vec<u8> {
    let mut out = Vec::new();

    // Section header block
    out.extend_from_slice(&0x0a0d_0d0au32.to_le_bytes());
    out.extend_from_slice(&28u32.to_le_bytes());
    out.extend_from_slice(&0x1a2b_3c4du32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(-1i64).to_le_bytes());
    out.extend_from_slice(&28u32.to_le_bytes());

    // Interface description block
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&20u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&65535u32.to_le_bytes());
    out.extend_from_slice(&20u32.to_le_bytes());

    for frame in frames {
        let (secs, micros) = split_ts(frame.at_ms);
        let ts = secs as u64 * 1_000_000 + micros as u64;
        let padded = (frame.data.len() + 3) / 4 * 4;
        let block_len = (32 + padded) as u32;

        out.extend_from_slice(&6u32.to_le_bytes());
        out.extend_from_slice(&block_len.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&((ts >> 32) as u32).to_le_bytes());
        out.extend_from_slice(&(ts as u32).to_le_bytes());
        out.extend_from_slice(&(frame.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(frame.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&frame.data);
        out.resize(out.len() + padded - frame.data.len(), 0);
        out.extend_from_slice(&block_len.to_le_bytes());
    }
    out
}

pub fn write_capture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}
