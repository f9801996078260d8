//! Error types for tapcore.
//!
//! This module provides structured error types for all tapcore operations:
//!
//! - [`enum@Error`] - Main error enum that wraps all error types
//! - [`PcapError`] - Errors from PCAP capture reading
//! - [`IpError`] - Errors from IP datagram parsing
//!
//! All errors implement `std::error::Error` and can be converted to `anyhow::Error`.

use thiserror::Error;

/// Main error type for tapcore operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error reading or parsing a PCAP capture
    #[error("PCAP error: {0}")]
    Pcap(#[from] PcapError),

    /// Error parsing an IP datagram
    #[error("IP parse error: {0}")]
    Ip(#[from] IpError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to PCAP capture reading.
#[derive(Error, Debug)]
pub enum PcapError {
    /// File not found
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// Invalid PCAP format
    #[error("Invalid PCAP format: {reason}")]
    InvalidFormat { reason: String },

    /// Unsupported link type
    #[error("Unsupported link type: {link_type}")]
    UnsupportedLinkType { link_type: u32 },
}

/// Errors from parsing an IP datagram out of raw bytes.
///
/// The variants map onto the legacy integer contract used by the session
/// layer: `Truncated` is `-1`, `InvalidVersion` is `-2`, and
/// `LengthMismatch` is the positive count of missing bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IpError {
    /// Captured bytes end before the IP header does
    #[error("truncated IP header")]
    Truncated,

    /// Version nibble is neither 4 nor 6, or does not match the carrier's claim
    #[error("invalid IP version {version}")]
    InvalidVersion { version: u8 },

    /// Declared total length exceeds the captured bytes
    #[error("declared IP length exceeds captured bytes by {excess}")]
    LengthMismatch { excess: usize },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
