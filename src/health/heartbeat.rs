//! UDP discovery heartbeat.
//!
//! Once a second a packet describing this device is broadcast so clients on the
//! LAN can find it without configuration. Wire format:
//!
//! ```text
//! 0x58 0x79 | version (1) | payload length (i32 LE) | UTF-8 JSON payload
//! ```

use crate::device::{self, DeviceInfo, NetworkInterface, ServiceState, ServiceStatus};
use crate::error::{Result, ServiceError};
use crate::health::ErrorHandler;
use crate::stats::ServiceStats;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

pub const PACKET_MAGIC: [u8; 2] = [0x58, 0x79];
pub const PACKET_VERSION: u8 = 1;
const HEADER_LEN: usize = PACKET_MAGIC.len() + 1 + 4;
const INTERVAL: Duration = Duration::from_secs(1);

/// Payload of one heartbeat packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketData {
    pub serial: String,
    pub name: String,
    pub version: String,
    pub http_port: u16,
    pub running_secs: u64,
    pub service_state: ServiceState,
    pub interfaces: Vec<NetworkInterface>,
}

/// Frame `data` as a heartbeat datagram.
pub fn encode_packet(data: &PacketData) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(data)?;
    let length = i32::try_from(payload.len())
        .map_err(|_| ServiceError::network_error("Heartbeat payload too large"))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&PACKET_MAGIC);
    bytes.push(PACKET_VERSION);
    bytes.extend_from_slice(&length.to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Parse a heartbeat datagram.
pub fn decode_packet(bytes: &[u8]) -> Result<PacketData> {
    if bytes.len() < HEADER_LEN {
        return Err(ServiceError::network_error("Heartbeat packet truncated"));
    }
    if bytes[..2] != PACKET_MAGIC {
        return Err(ServiceError::network_error("Not a heartbeat packet"));
    }
    if bytes[2] != PACKET_VERSION {
        return Err(ServiceError::network_error(format!(
            "Unsupported heartbeat version {}",
            bytes[2]
        )));
    }

    let mut length = [0u8; 4];
    length.copy_from_slice(&bytes[3..HEADER_LEN]);
    let length = usize::try_from(i32::from_le_bytes(length))
        .map_err(|_| ServiceError::network_error("Negative heartbeat payload length"))?;

    let payload = &bytes[HEADER_LEN..];
    if payload.len() != length {
        return Err(ServiceError::network_error(format!(
            "Heartbeat payload length {} does not match header {}",
            payload.len(),
            length
        )));
    }
    Ok(serde_json::from_slice(payload)?)
}

/// Periodic broadcaster of [`PacketData`].
pub struct Heartbeat {
    device: Arc<DeviceInfo>,
    status: Arc<ServiceStatus>,
    stats: Arc<ServiceStats>,
    errors: ErrorHandler,
    interface_names: Vec<String>,
    http_port: u16,
    target: SocketAddr,
}

impl Heartbeat {
    /// Heartbeat broadcasting to the default port.
    pub fn new(
        device: Arc<DeviceInfo>,
        status: Arc<ServiceStatus>,
        stats: Arc<ServiceStats>,
        errors: ErrorHandler,
    ) -> Self {
        Self {
            device,
            status,
            stats,
            errors,
            interface_names: Vec::new(),
            http_port: crate::DEFAULT_WEB_PORT,
            target: SocketAddr::from((Ipv4Addr::BROADCAST, crate::DEFAULT_HEARTBEAT_PORT)),
        }
    }

    /// Set the interfaces searched for the primary one.
    pub fn with_interface_names(mut self, names: Vec<String>) -> Self {
        self.interface_names = names;
        self
    }

    /// Set the HTTP port advertised to clients.
    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    /// Destination of the packets, `255.255.255.255:<port>` unless overridden.
    pub fn with_target(mut self, target: SocketAddr) -> Self {
        self.target = target;
        self
    }

    /// Build the packet for the current moment, refreshing the device's
    /// primary interface on the way.
    ///
    /// Interface discovery reads sysfs and opens a socket, so it runs on the
    /// blocking pool.
    pub async fn collect_data(&self) -> PacketData {
        let started = Instant::now();

        let names = self.interface_names.clone();
        let interfaces =
            match tokio::task::spawn_blocking(move || device::discover_interfaces(&names)).await {
                Ok(interfaces) => interfaces,
                Err(e) => {
                    self.errors.report(&ServiceError::system_error(format!(
                        "Interface discovery failed: {}",
                        e
                    )));
                    Vec::new()
                }
            };
        if let Some(primary) = interfaces.first() {
            if self.device.primary_interface().as_ref() != Some(primary) {
                debug!("Primary interface is now {}", primary.name);
                self.device.set_primary_interface(Some(primary.clone()));
            }
        }

        let data = PacketData {
            serial: self.device.serial().to_string(),
            name: self.device.name(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            http_port: self.http_port,
            running_secs: self.device.running_time().as_secs(),
            service_state: self.status.state(),
            interfaces,
        };
        self.stats
            .log_operation("Heartbeat.CollectData", started.elapsed());
        data
    }

    async fn send_data(&self, socket: &UdpSocket, data: &PacketData) -> Result<()> {
        let started = Instant::now();
        let bytes = encode_packet(data)?;
        let sent = socket.send_to(&bytes, self.target).await;
        self.stats.log_operation("Heartbeat.SendData", started.elapsed());
        sent.map_err(|e| ServiceError::network_error(format!("Heartbeat send failed: {}", e)))?;
        Ok(())
    }

    /// Start broadcasting on the tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let socket = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await {
                Ok(socket) => socket,
                Err(e) => {
                    self.errors.report(&ServiceError::network_error(format!(
                        "Heartbeat socket bind failed: {}",
                        e
                    )));
                    return;
                }
            };
            if let Err(e) = socket.set_broadcast(true) {
                self.errors.report(&ServiceError::network_error(format!(
                    "Heartbeat broadcast not permitted: {}",
                    e
                )));
            }

            info!("Heartbeat broadcasting to {}", self.target);
            let mut ticker = tokio::time::interval(INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let data = self.collect_data().await;
                if let Err(e) = self.send_data(&socket, &data).await {
                    self.errors.report(&e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PacketData {
        PacketData {
            serial: "00000000abcdef".to_string(),
            name: "gate".to_string(),
            version: "0.1.0".to_string(),
            http_port: 5001,
            running_secs: 42,
            service_state: ServiceState::Up,
            interfaces: vec![NetworkInterface {
                name: "eth0".to_string(),
                physical: "B8:27:EB:00:00:01".to_string(),
                internet: "192.168.1.20".to_string(),
            }],
        }
    }

    #[test]
    fn test_packet_header() {
        let bytes = encode_packet(&sample()).unwrap();
        assert_eq!(&bytes[..3], &[88, 121, 1]);
        let length = i32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]) as usize;
        assert_eq!(length, bytes.len() - HEADER_LEN);

        let json: serde_json::Value = serde_json::from_slice(&bytes[HEADER_LEN..]).unwrap();
        assert_eq!(json["httpPort"], 5001);
        assert_eq!(json["runningSecs"], 42);
        assert_eq!(json["serviceState"], "Up");
        assert_eq!(json["interfaces"][0]["physical"], "B8:27:EB:00:00:01");
    }

    #[test]
    fn test_decode_rejects_bad_packets() {
        let bytes = encode_packet(&sample()).unwrap();
        assert_eq!(decode_packet(&bytes).unwrap(), sample());

        assert!(decode_packet(&bytes[..4]).is_err());
        assert!(decode_packet(&bytes[..bytes.len() - 1]).is_err());

        let mut wrong_magic = bytes.clone();
        wrong_magic[0] = b'Z';
        assert!(decode_packet(&wrong_magic).is_err());

        let mut wrong_version = bytes;
        wrong_version[2] = 2;
        assert!(decode_packet(&wrong_version).is_err());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_collect_data_sets_primary_interface() {
        let path =
            std::env::temp_dir().join(format!("pi_gpiod_collect_{}.json", std::process::id()));
        let device = Arc::new(DeviceInfo::with_serial("abc124", &path));
        let stats = Arc::new(ServiceStats::new());
        let heartbeat = Heartbeat::new(
            Arc::clone(&device),
            Arc::new(ServiceStatus::new()),
            Arc::clone(&stats),
            ErrorHandler::default(),
        )
        .with_interface_names(vec!["no-such-if0".to_string(), "LO".to_string()]);

        let data = heartbeat.collect_data().await;
        assert_eq!(data.serial, "abc124");
        assert_eq!(data.running_secs, device.running_time().as_secs());
        if std::path::Path::new("/sys/class/net/lo/address").exists() {
            assert_eq!(data.interfaces.len(), 1);
            assert_eq!(data.interfaces[0].name, "lo");
            assert_eq!(device.primary_interface().map(|i| i.name).as_deref(), Some("lo"));
        } else {
            assert!(data.interfaces.is_empty());
        }
        assert_eq!(stats.summary().operations[0].name, "Heartbeat.CollectData");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_heartbeat_sends_packets() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = receiver.local_addr().unwrap();

        let path = std::env::temp_dir().join(format!("pi_gpiod_heartbeat_{}.json", std::process::id()));
        let device = Arc::new(DeviceInfo::with_serial("abc123", &path));
        let stats = Arc::new(ServiceStats::new());
        let heartbeat = Heartbeat::new(
            device,
            Arc::new(ServiceStatus::new()),
            Arc::clone(&stats),
            ErrorHandler::default(),
        )
        .with_http_port(8080)
        .with_target(target);
        let task = heartbeat.spawn();

        let mut buf = [0u8; 2048];
        let (len, _) = tokio::time::timeout(Duration::from_secs(5), receiver.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        task.abort();

        let packet = decode_packet(&buf[..len]).unwrap();
        assert_eq!(packet.serial, "abc123");
        assert_eq!(packet.name, "ABC123");
        assert_eq!(packet.http_port, 8080);
        assert_eq!(packet.service_state, ServiceState::Down);

        let ops = stats.summary().operations;
        assert!(ops.iter().any(|op| op.name == "Heartbeat.CollectData"));
        let _ = std::fs::remove_file(&path);
    }
}
