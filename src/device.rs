//! Device identity and service status.
//!
//! The serial comes from `/proc/cpuinfo`, the user-facing device name is
//! persisted in a small JSON file so it survives restarts, and the primary
//! network interface is filled in by the heartbeat once it has been found.

use crate::error::{Result, ServiceError};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::UdpSocket;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{debug, warn};

/// Serial reported when `/proc/cpuinfo` has none (non-Pi hosts).
pub const UNKNOWN_SERIAL: &str = "000000000000";

/// How long a memory reading is reused before sysinfo is asked again.
const MEMORY_SAMPLE_TTL: Duration = Duration::from_secs(1);

/// A network interface as advertised to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub name: String,
    /// MAC address
    pub physical: String,
    /// IPv4 address, empty when unknown
    pub internet: String,
}

/// Device section of every JSON response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    pub serial: String,
    pub name: String,
    pub interface_name: String,
    pub mac_address: String,
    pub ip_address: String,
    pub os: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceStorage {
    #[serde(default)]
    device_name: Option<String>,
}

/// Identity and runtime facts about this device.
#[derive(Debug)]
pub struct DeviceInfo {
    serial: String,
    storage_path: PathBuf,
    name: RwLock<String>,
    primary_interface: RwLock<Option<NetworkInterface>>,
    started: Instant,
    memory: Mutex<MemorySampler>,
}

/// Resident memory of this process, refreshed at most once per TTL.
#[derive(Debug)]
struct MemorySampler {
    system: System,
    pid: Option<Pid>,
    last: Option<(Instant, u64)>,
}

impl MemorySampler {
    fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
            last: None,
        }
    }

    fn sample(&mut self, now: Instant) -> u64 {
        if let Some((at, mb)) = self.last {
            if now.saturating_duration_since(at) < MEMORY_SAMPLE_TTL {
                return mb;
            }
        }
        let Some(pid) = self.pid else { return 0 };

        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            ProcessRefreshKind::new().with_memory(),
        );
        let mb = self
            .system
            .process(pid)
            .map(|process| process.memory() / (1024 * 1024))
            .unwrap_or(0);
        self.last = Some((now, mb));
        mb
    }
}

impl DeviceInfo {
    /// Read the serial from the host and load the persisted device name.
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        let serial = fs::read_to_string("/proc/cpuinfo")
            .ok()
            .and_then(|cpuinfo| parse_serial(&cpuinfo))
            .unwrap_or_else(|| UNKNOWN_SERIAL.to_string());
        Self::with_serial(serial, storage_path)
    }

    /// Build device info for a known serial, loading or creating the stored name.
    pub fn with_serial(serial: impl Into<String>, storage_path: impl Into<PathBuf>) -> Self {
        let serial = serial.into();
        let storage_path = storage_path.into();

        let name = match load_device_name(&storage_path) {
            Some(name) => name,
            None => {
                let name = serial.to_uppercase();
                if let Err(e) = save_device_name(&storage_path, &name) {
                    warn!("Could not persist default device name: {}", e);
                }
                name
            }
        };

        Self {
            serial,
            storage_path,
            name: RwLock::new(name),
            primary_interface: RwLock::new(None),
            started: Instant::now(),
            memory: Mutex::new(MemorySampler::new()),
        }
    }

    /// CPU serial number.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Current user-facing device name.
    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    /// Rename the device and persist the new name.
    pub fn set_name(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::invalid_argument("Device name cannot be empty"));
        }
        save_device_name(&self.storage_path, name)?;
        *self.name.write() = name.to_string();
        debug!("Device renamed to {}", name);
        Ok(())
    }

    /// Interface the heartbeat last found, if any.
    pub fn primary_interface(&self) -> Option<NetworkInterface> {
        self.primary_interface.read().clone()
    }

    /// Replace the advertised primary interface.
    pub fn set_primary_interface(&self, interface: Option<NetworkInterface>) {
        *self.primary_interface.write() = interface;
    }

    /// Time since this process started.
    pub fn running_time(&self) -> Duration {
        self.started.elapsed()
    }

    /// Resident memory of this process in megabytes, 0 when unavailable.
    ///
    /// Only this process is refreshed, and a reading is reused for one second.
    pub fn memory_usage_mb(&self) -> u64 {
        self.memory.lock().sample(Instant::now())
    }

    /// Device section for JSON responses.
    pub fn summary(&self) -> DeviceSummary {
        let interface = self.primary_interface();
        let (interface_name, mac_address, ip_address) = match interface {
            Some(i) => (i.name, i.physical, i.internet),
            None => Default::default(),
        };
        DeviceSummary {
            serial: self.serial.clone(),
            name: self.name(),
            interface_name,
            mac_address,
            ip_address,
            os: os().to_string(),
        }
    }
}

/// Host operating system family.
pub fn os() -> &'static str {
    if cfg!(target_os = "linux") {
        "Linux"
    } else if cfg!(target_os = "windows") {
        "Windows"
    } else if cfg!(target_os = "macos") {
        "OSX"
    } else {
        "Unknown"
    }
}

/// `d.hh:mm:ss`, with the day part only once a day has passed.
pub fn format_running_time(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (hours, rem) = (rem / 3600, rem % 3600);
    let (minutes, seconds) = (rem / 60, rem % 60);
    if days > 0 {
        format!("{}.{:02}:{:02}:{:02}", days, hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// Extract the `Serial` line of `/proc/cpuinfo`.
pub fn parse_serial(cpuinfo: &str) -> Option<String> {
    cpuinfo
        .lines()
        .filter(|line| line.starts_with("Serial"))
        .find_map(|line| line.split_once(':'))
        .map(|(_, serial)| serial.trim().to_string())
        .filter(|serial| !serial.is_empty())
}

/// Interfaces from `names` present on this host, in the order given.
///
/// The IPv4 address is the one the kernel would route outbound traffic from,
/// so it is attached to the first interface only.
pub fn discover_interfaces(names: &[String]) -> Vec<NetworkInterface> {
    let mut found: Vec<NetworkInterface> = names
        .iter()
        .filter_map(|name| {
            let name = name.to_lowercase();
            let mac = fs::read_to_string(format!("/sys/class/net/{}/address", name)).ok()?;
            Some(NetworkInterface {
                name,
                physical: mac.trim().to_uppercase(),
                internet: String::new(),
            })
        })
        .collect();

    if let (Some(first), Some(ip)) = (found.first_mut(), outbound_ipv4()) {
        first.internet = ip;
    }
    found
}

fn outbound_ipv4() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let addr = socket.local_addr().ok()?;
    if addr.ip().is_unspecified() {
        None
    } else {
        Some(addr.ip().to_string())
    }
}

fn load_device_name(path: &Path) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    let storage: DeviceStorage = serde_json::from_str(&text).ok()?;
    storage
        .device_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

fn save_device_name(path: &Path, name: &str) -> Result<()> {
    let storage = DeviceStorage {
        device_name: Some(name.to_string()),
    };
    fs::write(path, serde_json::to_string_pretty(&storage)?)?;
    Ok(())
}

/// Lifecycle state reported by the heartbeat and status endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceState {
    Down,
    Up,
}

/// Shared service state: `Down` until the HTTP listener is bound.
#[derive(Debug)]
pub struct ServiceStatus {
    state: RwLock<ServiceState>,
}

impl ServiceStatus {
    /// A status that starts out `Down`.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ServiceState::Down),
        }
    }

    /// Current service state.
    pub fn state(&self) -> ServiceState {
        *self.state.read()
    }

    /// Set the service state.
    pub fn set(&self, state: ServiceState) {
        *self.state.write() = state;
    }
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self::new()
    }
}
