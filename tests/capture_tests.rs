mod common;

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use httplat::parser::ClassifierKind;
use httplat::{analyze_capture, Config, Error, Report};
use tempfile::TempDir;

use common::*;

fn analyze(path: &Path, config: &Config) -> (Report, String) {
    let mut live = Vec::new();
    let report = analyze_capture(path, config, &mut live, Arc::new(AtomicBool::new(true)))
        .expect("analysis should succeed");
    (report, String::from_utf8(live).unwrap())
}

#[test]
fn single_request_response_pair() {
    let dir = TempDir::new().unwrap();
    let path = write_capture(
        dir.path(),
        "single.pcap",
        &pcap_bytes(&[get(0, 51000, "/a", "x.com"), respond(100, 51000, "200 OK")]),
    );

    let (report, live) = analyze(&path, &Config::default());

    assert_eq!(report.stats.connections, 1);
    assert_eq!(report.stats.decode.packets, 2);
    assert_eq!(report.buckets.len(), 1);
    let bucket = &report.buckets[0];
    assert_eq!(bucket.url(), "http://x.com/a");
    assert_eq!(bucket.count(), 1);
    assert_eq!(bucket.mean_latency(), Duration::from_millis(100));
    assert_eq!(bucket.interval_start().timestamp(), 1_699_999_980);

    assert_eq!(
        live,
        "1 [2023-11-14T22:13:20Z] 10.0.0.1:51000 -> 93.184.216.34:80 | 100ms | http://x.com/a\n"
    );
}

#[test]
fn two_connections_in_one_interval_average() {
    let dir = TempDir::new().unwrap();
    let path = write_capture(
        dir.path(),
        "two.pcap",
        &pcap_bytes(&[
            get(0, 51000, "/a", "x.com"),
            respond(100, 51000, "200 OK"),
            get(1_000, 51001, "/a", "x.com"),
            respond(1_300, 51001, "200 OK"),
        ]),
    );

    let (report, live) = analyze(&path, &Config::default());

    assert_eq!(report.buckets.len(), 1);
    assert_eq!(report.buckets[0].count(), 2);
    assert_eq!(report.buckets[0].mean_latency(), Duration::from_millis(200));
    assert_eq!(live.lines().count(), 2);
}

#[test]
fn unmatched_response_produces_notice_and_empty_report() {
    let dir = TempDir::new().unwrap();
    let path = write_capture(
        dir.path(),
        "miss.pcap",
        &pcap_bytes(&[respond(0, 51000, "200 OK")]),
    );

    let (report, live) = analyze(&path, &Config::default());

    assert_eq!(report.stats.connections, 0);
    assert_eq!(report.stats.misses, 1);
    assert!(report.buckets.is_empty());
    assert_eq!(live, "Request not found for source 93.184.216.34:80\n");
    assert_eq!(report.render_table().lines().count(), 4);
}

#[test]
fn non_success_response_yields_nothing() {
    let dir = TempDir::new().unwrap();
    let frames = [get(0, 51000, "/a", "x.com"), respond(50, 51000, "404 Not Found")];
    let path = write_capture(dir.path(), "fail.pcap", &pcap_bytes(&frames));

    // String-prefix classification never turns the 404 into an event.
    let (report, live) = analyze(&path, &Config::default());
    assert_eq!(report.stats.connections, 0);
    assert_eq!(report.stats.still_pending, 1);
    assert!(live.is_empty());

    // The strict parser does, and the pending request is consumed.
    let config = Config {
        classifier: ClassifierKind::Httparse,
        ..Config::default()
    };
    let (report, live) = analyze(&path, &config);
    assert_eq!(report.stats.connections, 0);
    assert_eq!(report.stats.rejected, 1);
    assert_eq!(report.stats.still_pending, 0);
    assert!(live.is_empty());
}

#[test]
fn non_http_traffic_is_ignored() {
    let dir = TempDir::new().unwrap();
    let frames = [
        tcp(0, (CLIENT_IP, 40000), (SERVER_IP, 443), "\u{16}\u{3}\u{1} handshake"),
        tcp(5, (CLIENT_IP, 40001), (SERVER_IP, 80), ""),
        get(10, 51000, "/ok", "x.com"),
        respond(20, 51000, "200 OK"),
    ];
    let path = write_capture(dir.path(), "mixed.pcap", &pcap_bytes(&frames));

    let (report, _) = analyze(&path, &Config::default());
    assert_eq!(report.stats.decode.packets, 4);
    assert_eq!(report.stats.decode.tcp_segments, 3);
    assert_eq!(report.stats.events, 2);
    assert_eq!(report.stats.connections, 1);
}

#[test]
fn pcapng_container_is_supported() {
    let dir = TempDir::new().unwrap();
    let path = write_capture(
        dir.path(),
        "single.pcapng",
        &pcapng_bytes(&[get(0, 51000, "/ng", "x.com"), respond(250, 51000, "200 OK")]),
    );

    let (report, _) = analyze(&path, &Config::default());
    assert_eq!(report.buckets.len(), 1);
    assert_eq!(report.buckets[0].url(), "http://x.com/ng");
    assert_eq!(report.buckets[0].mean_latency(), Duration::from_millis(250));
}

#[test]
fn buckets_follow_creation_order_across_intervals() {
    let dir = TempDir::new().unwrap();
    let frames = [
        get(0, 51000, "/z", "x.com"),
        respond(10, 51000, "200 OK"),
        get(20, 51001, "/a", "x.com"),
        respond(30, 51001, "200 OK"),
        get(61_000, 51002, "/a", "x.com"),
        respond(61_010, 51002, "200 OK"),
    ];
    let path = write_capture(dir.path(), "order.pcap", &pcap_bytes(&frames));

    let config = Config {
        interval: Duration::from_secs(30),
        ..Config::default()
    };
    let (report, _) = analyze(&path, &config);
    let urls: Vec<&str> = report.buckets.iter().map(|b| b.url()).collect();
    assert_eq!(urls, ["http://x.com/z", "http://x.com/a", "http://x.com/a"]);
    assert!(report.buckets[2].interval_start() > report.buckets[1].interval_start());
}

#[test]
fn capture_cut_mid_record_still_reports() {
    let dir = TempDir::new().unwrap();
    let mut bytes = pcap_bytes(&[
        get(0, 51000, "/a", "x.com"),
        respond(100, 51000, "200 OK"),
        get(2_000, 51001, "/b", "x.com"),
    ]);
    bytes.truncate(bytes.len() - 10);
    let path = write_capture(dir.path(), "cut.pcap", &bytes);

    let (report, live) = analyze(&path, &Config::default());
    assert_eq!(report.stats.decode.packets, 2);
    assert_eq!(report.stats.decode.read_errors, 1);
    assert_eq!(report.stats.connections, 1);
    assert_eq!(report.buckets.len(), 1);
    assert_eq!(report.buckets[0].url(), "http://x.com/a");
    assert_eq!(report.buckets[0].mean_latency(), Duration::from_millis(100));
    assert_eq!(live.lines().count(), 1);
}

#[test]
fn unknown_container_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = write_capture(dir.path(), "bogus.pcap", b"not a capture file at all");

    let err = analyze_capture(
        &path,
        &Config::default(),
        Vec::new(),
        Arc::new(AtomicBool::new(true)),
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnknownFormat { .. }));
}

#[test]
fn missing_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    let err = analyze_capture(
        &dir.path().join("absent.pcap"),
        &Config::default(),
        Vec::new(),
        Arc::new(AtomicBool::new(true)),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Open { .. }));
}

#[test]
fn cleared_running_flag_still_reports() {
    let dir = TempDir::new().unwrap();
    let path = write_capture(
        dir.path(),
        "stopped.pcap",
        &pcap_bytes(&[get(0, 51000, "/a", "x.com"), respond(100, 51000, "200 OK")]),
    );

    let report = analyze_capture(
        &path,
        &Config::default(),
        Vec::new(),
        Arc::new(AtomicBool::new(false)),
    )
    .unwrap();
    assert_eq!(report.stats.events, 0);
    assert!(report.buckets.is_empty());
}
