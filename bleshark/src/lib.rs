//! # bleshark: BLE sniffer to Wireshark bridge
//!
//! Host process around `bleshark-core`: loads configuration, creates the
//! capture pipe, waits for Wireshark to attach, and streams every packet
//! the sniffer feed produces as live pcap records.
//!
//! ## Feed
//!
//! The sniffer driver is an external collaborator. Until it is linked
//! in, packets arrive as text lines on stdin (see [`feed`]).

pub mod config;
pub mod feed;
pub mod service;
