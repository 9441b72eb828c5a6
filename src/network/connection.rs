//! Simulated TCP connection with slow start
//!
//! Models the cost of one HTTP exchange on a connection:
//! - DNS + TCP handshake + TLS, unless the connection is already warm
//! - one round trip plus server think time until the first byte
//! - a download whose congestion window doubles every round trip until it
//!   saturates the bandwidth currently allotted to the connection
//!
//! The constants follow the calibration of the Lantern model in Chromium's
//! tooling and are kept verbatim.

use serde::{Deserialize, Serialize};

/// Bytes per TCP segment
pub const TCP_SEGMENT_SIZE: f64 = 1460.0;
/// Segments in flight on a fresh connection
pub const INITIAL_CONGESTION_WINDOW: f64 = 10.0;

/// Breakdown of the connection phases paid by one request, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConnectionTiming {
    pub dns_resolution_time: Option<f64>,
    pub connection_time: Option<f64>,
    pub ssl_time: Option<f64>,
    pub time_to_first_byte: f64,
}

/// Inputs for one download step
#[derive(Debug, Clone, Copy)]
pub struct DownloadOptions {
    /// Time the request has already spent on this connection
    pub time_already_elapsed: f64,
    /// Stop downloading once this much time has passed
    pub maximum_time_to_elapse: f64,
    /// DNS lookup cost if the handshake must be paid
    pub dns_resolution_time: f64,
    /// Whether the request skips the handshake
    pub warm: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            time_already_elapsed: 0.0,
            maximum_time_to_elapse: f64::INFINITY,
            dns_resolution_time: 0.0,
            warm: false,
        }
    }
}

/// Outcome of one download step
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadResults {
    pub round_trips: u32,
    pub time_elapsed: f64,
    pub bytes_downloaded: f64,
    pub congestion_window: f64,
    pub connection_timing: ConnectionTiming,
}

/// A single simulated TCP connection
#[derive(Debug, Clone, PartialEq)]
pub struct TcpConnection {
    rtt: f64,
    /// Bits per second currently allotted to this connection
    throughput: f64,
    server_latency: f64,
    ssl: bool,
    h2: bool,
    warmed: bool,
    congestion_window: f64,
}

impl TcpConnection {
    /// Create a cold connection
    pub fn new(rtt: f64, throughput: f64, server_latency: f64, ssl: bool, h2: bool) -> Self {
        Self {
            rtt,
            throughput,
            server_latency,
            ssl,
            h2,
            warmed: false,
            congestion_window: INITIAL_CONGESTION_WINDOW,
        }
    }

    pub fn is_h2(&self) -> bool {
        self.h2
    }

    pub fn is_warm(&self) -> bool {
        self.warmed
    }

    pub fn congestion_window(&self) -> f64 {
        self.congestion_window
    }

    pub fn set_warmed(&mut self, warmed: bool) {
        self.warmed = warmed;
    }

    pub fn set_congestion_window(&mut self, congestion_window: f64) {
        self.congestion_window = congestion_window;
    }

    pub fn set_throughput(&mut self, throughput: f64) {
        self.throughput = throughput;
    }

    /// Drop all warmth, as if the socket were closed and reopened
    pub fn reset(&mut self) {
        self.warmed = false;
        self.congestion_window = INITIAL_CONGESTION_WINDOW;
    }

    /// Largest window (in segments) the allotted bandwidth can carry per round trip
    pub fn maximum_congestion_window(&self) -> f64 {
        let bytes_per_second = self.throughput / 8.0;
        let bytes_per_round_trip = bytes_per_second * (self.rtt / 1000.0);
        (bytes_per_round_trip / TCP_SEGMENT_SIZE).floor()
    }

    /// Simulate downloading `bytes_to_download` more bytes
    ///
    /// Progress is reported in whole round trips; the time reported may
    /// overshoot `maximum_time_to_elapse` by up to one round trip, which the
    /// caller carries forward.
    pub fn simulate_download_until(&self, bytes_to_download: f64, options: DownloadOptions) -> DownloadResults {
        let two_way_latency = self.rtt;
        let one_way_latency = two_way_latency / 2.0;
        let maximum_congestion_window = self.maximum_congestion_window();

        let mut handshake_and_request = one_way_latency;
        if !options.warm {
            handshake_and_request = options.dns_resolution_time
                // SYN, SYN-ACK, ACK + request
                + 3.0 * one_way_latency
                // TLS with false start
                + if self.ssl { two_way_latency } else { 0.0 };
        }

        let mut round_trips = (handshake_and_request / two_way_latency).ceil() as u32;
        let time_to_first_byte = handshake_and_request + self.server_latency + one_way_latency;
        let time_elapsed_for_ttfb = (time_to_first_byte - options.time_already_elapsed).max(0.0);
        let maximum_download_time = options.maximum_time_to_elapse - time_elapsed_for_ttfb;

        let mut congestion_window = self.congestion_window.min(maximum_congestion_window);
        let mut total_bytes_downloaded = 0.0;
        if time_elapsed_for_ttfb > 0.0 {
            // The first window arrives together with the first byte.
            total_bytes_downloaded = congestion_window * TCP_SEGMENT_SIZE;
        } else {
            round_trips = 0;
        }

        let mut download_time_elapsed = 0.0;
        let mut bytes_remaining = bytes_to_download - total_bytes_downloaded;
        while bytes_remaining > 0.0 && download_time_elapsed <= maximum_download_time {
            round_trips += 1;
            download_time_elapsed += two_way_latency;
            congestion_window = (congestion_window * 2.0).min(maximum_congestion_window).max(1.0);

            let window_bytes = congestion_window * TCP_SEGMENT_SIZE;
            total_bytes_downloaded += window_bytes;
            bytes_remaining -= window_bytes;
        }

        let connection_timing = if options.warm {
            ConnectionTiming {
                time_to_first_byte,
                ..Default::default()
            }
        } else {
            ConnectionTiming {
                dns_resolution_time: Some(options.dns_resolution_time),
                connection_time: Some(handshake_and_request - options.dns_resolution_time),
                ssl_time: self.ssl.then_some(two_way_latency),
                time_to_first_byte,
            }
        };

        DownloadResults {
            round_trips,
            time_elapsed: time_elapsed_for_ttfb + download_time_elapsed,
            bytes_downloaded: total_bytes_downloaded.min(bytes_to_download).max(0.0),
            congestion_window,
            connection_timing,
        }
    }
}
