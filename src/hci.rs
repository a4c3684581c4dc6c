//! The contract between this driver and the bus layer.
//!
//! Framing of HCI packets, the SPI transport, patch upload and the socket calls themselves live
//! below this interface. The driver only ever talks to the chip through [Hci].
use core::net::{Ipv4Addr, SocketAddrV4};

use bitfield_struct::bitfield;
use embassy_time::Duration;
use macro_bits::serializable_enum;

use crate::events::EventMask;

/// A handle to a socket on the chip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SocketId(pub u8);

/// An error code reported by the chip or the bus layer.
///
/// The codes are passed through as they are, apart from [TransportError::PEER_CLOSED].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransportError(pub i32);
impl TransportError {
    /// Returned by a receive on a socket, which the remote side has closed.
    pub const PEER_CLOSED: Self = Self(-57);
    /// Generic failure, which the bus layer may use if there is no code from the chip.
    pub const FAILED: Self = Self(-1);

    pub const fn code(&self) -> i32 {
        self.0
    }
    pub const fn is_peer_closed(&self) -> bool {
        self.0 == Self::PEER_CLOSED.0
    }
}

pub type HciResult<T> = Result<T, TransportError>;

serializable_enum! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    /// The security used by an access point.
    pub enum SecurityMode: u8 {
        #[default]
        Unsecured => 0,
        Wep => 1,
        Wpa => 2,
        Wpa2 => 3
    }
}

#[bitfield(u8)]
#[derive(PartialEq, Eq)]
/// The policy the chip follows for connecting on its own.
pub struct ConnectionPolicy {
    /// Connect to any open access point in range.
    pub open_ap: bool,
    /// Reconnect to the last access point on start.
    pub fast_connect: bool,
    /// Connect using the stored profiles.
    pub use_profiles: bool,
    #[bits(5)]
    __: u8,
}
impl ConnectionPolicy {
    /// Don't connect to anything without being told to.
    pub const MANUAL: Self = Self::new();
    /// Connect automatically using the stored profiles only.
    pub const AUTO_CONNECT: Self = Self::new().with_use_profiles(true);
}

/// Parameters for an access point scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanParams {
    /// How long to scan for. Zero stops a running scan.
    pub duration_ms: u32,
    pub min_dwell_time_ms: u32,
    pub max_dwell_time_ms: u32,
    pub probe_requests: u32,
    /// Bitmap of the channels to scan.
    pub channel_mask: u32,
    pub rssi_threshold: i32,
    pub snr_threshold: u32,
    pub default_tx_power: u32,
    pub channel_intervals_ms: [u32; 16],
}
impl ScanParams {
    pub const fn new(duration_ms: u32) -> Self {
        Self {
            duration_ms,
            min_dwell_time_ms: 20,
            max_dwell_time_ms: 100,
            probe_requests: 5,
            channel_mask: 0x7ff,
            rssi_threshold: -120,
            snr_threshold: 0,
            default_tx_power: 300,
            channel_intervals_ms: [2000; 16],
        }
    }
}

/// The NVMEM file, that holds the AES key used for decrypting provisioning data.
pub const NVMEM_AES128_KEY_FILE_ID: u8 = 12;
/// Passed to [Command::DeleteProfile] to delete every stored profile.
pub const ALL_PROFILES: u8 = 255;

/// A command issued to the chip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    /// Power up the chip and run the start sequence.
    Start { patch_request: u8 },
    /// Power down the chip.
    Stop,
    SetConnectionPolicy(ConnectionPolicy),
    DeleteProfile(u8),
    SetEventMask(EventMask),
    Connect {
        security: SecurityMode,
        ssid: &'a [u8],
        key: &'a [u8],
    },
    Disconnect,
    SetScanParams(ScanParams),
    /// Query the link status.
    ///
    /// The reply value is the raw status code.
    StatusGet,
    NvmemCreateEntry { file_id: u8, length: u16 },
    AesWriteKey(&'a [u8; 16]),
    SmartConfigSetPrefix(&'a [u8; 3]),
    SmartConfigStart { encrypted: bool },
    /// Decrypt the received provisioning data and store it as a profile.
    SmartConfigProcess,
    MdnsAdvertise { enabled: bool, name: &'a [u8] },
}
impl Command<'_> {
    /// A short name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Stop => "stop",
            Self::SetConnectionPolicy(_) => "set_connection_policy",
            Self::DeleteProfile(_) => "delete_profile",
            Self::SetEventMask(_) => "set_event_mask",
            Self::Connect { .. } => "connect",
            Self::Disconnect => "disconnect",
            Self::SetScanParams(_) => "set_scan_params",
            Self::StatusGet => "status_get",
            Self::NvmemCreateEntry { .. } => "nvmem_create_entry",
            Self::AesWriteKey(_) => "aes_write_key",
            Self::SmartConfigSetPrefix(_) => "smart_config_set_prefix",
            Self::SmartConfigStart { .. } => "smart_config_start",
            Self::SmartConfigProcess => "smart_config_process",
            Self::MdnsAdvertise { .. } => "mdns_advertise",
        }
    }
}

/// The network configuration of the chip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IpConfig {
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dhcp_server: Ipv4Addr,
    pub dns_server: Ipv4Addr,
}

serializable_enum! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub enum SocketType: u8 {
        Stream => 1,
        Datagram => 2,
        Raw => 3
    }
}
serializable_enum! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub enum Protocol: u8 {
        Tcp => 6,
        Udp => 17,
        Raw => 255
    }
}

/// Access to the chip.
///
/// Implementations own the bus, so all methods take a shared reference. The socket calls follow
/// BSD semantics, with all sockets being IPv4.
pub trait Hci {
    /// Issue a command and wait for its completion.
    ///
    /// A non-zero status from the chip is reported as an error. The returned value is the payload
    /// of the reply for queries and zero otherwise.
    fn command(&self, command: Command<'_>) -> HciResult<u32>;
    /// Read the current network configuration.
    fn ip_config(&self) -> HciResult<IpConfig>;

    fn socket(&self, socket_type: SocketType, protocol: Protocol) -> HciResult<SocketId>;
    fn connect(&self, socket: SocketId, address: SocketAddrV4) -> HciResult<()>;
    /// Returns the amount of bytes sent.
    fn send(&self, socket: SocketId, buffer: &[u8], flags: u32) -> HciResult<usize>;
    /// Returns the amount of bytes received.
    fn recv(&self, socket: SocketId, buffer: &mut [u8], flags: u32) -> HciResult<usize>;
    /// Check if the socket is readable, waiting at most `timeout`.
    fn select_readable(&self, socket: SocketId, timeout: Duration) -> HciResult<bool>;
    fn close(&self, socket: SocketId) -> HciResult<()>;
}
