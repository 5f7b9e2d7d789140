//! Keeping the daemon healthy and visible: error history, the poller
//! watchdog, and the discovery heartbeat.

pub mod errors;
pub mod heartbeat;
pub mod monitor;

pub use errors::{ErrorCache, ErrorHandler, ErrorReportItem};
pub use heartbeat::{decode_packet, encode_packet, Heartbeat, PacketData};
pub use monitor::{HealthMonitor, MONITOR_INTERVAL};
