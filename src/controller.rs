use core::net::{Ipv4Addr, SocketAddrV4};

use embassy_time::Duration;
use embedded_hal::delay::DelayNs;

use crate::{
    client::Client,
    config::Config,
    events::{EventMask, PingReport},
    hci::{
        Command, ConnectionPolicy, Hci, IpConfig, Protocol, ScanParams, SecurityMode, SocketId,
        SocketType, TransportError, ALL_PROFILES, NVMEM_AES128_KEY_FILE_ID,
    },
    state::SessionState,
};

/// Maximum length of an SSID.
pub const MAX_SSID_LENGTH: usize = 32;
/// Maximum length of a key. The chip doesn't accept anything longer.
pub const MAX_KEY_LENGTH: usize = 16;

/// Interval at which the session flags are polled.
pub const POLL_INTERVAL_MS: u32 = 10;
/// How long to wait for the provisioning data to arrive.
pub const PROVISIONING_TIMEOUT_MS: u32 = 60_000;
/// How long to wait for the link after provisioning.
pub const CONNECT_TIMEOUT_MS: u32 = 20_000;
/// Time the chip needs between stopping and starting during provisioning.
pub const POWER_CYCLE_SETTLE_MS: u32 = 1_000;
/// Time the chip needs between stopping and starting during a reboot.
pub const REBOOT_SETTLE_MS: u32 = 5_000;
/// Time between changing the connection policy and connecting.
pub const CONNECTION_POLICY_SETTLE_MS: u32 = 500;
/// Duration of the scan before a connection attempt.
pub const SCAN_DURATION_MS: u32 = 4_000;
/// How long to let the scan run, before stopping it.
pub const SCAN_SETTLE_MS: u32 = 4_500;
/// Time to wait for the DHCP lease after provisioning.
pub const DHCP_SETTLE_MS: u32 = 1_000;

/// Prefix of the provisioning frames.
pub const PROVISIONING_PREFIX: &[u8; 3] = b"TTT";
/// The name advertised over mDNS after provisioning.
pub const DEVICE_NAME: &str = "CC3000";
/// Key used for decrypting the provisioning data.
pub const PROVISIONING_AES_KEY: &[u8; 16] = b"0123456789012345";

/// Which caller supplied argument was out of bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArgumentError {
    /// The security mode wasn't in `0..=3`.
    SecurityMode,
    SsidLength,
    KeyLength,
    /// A chunked write was asked to use chunks of zero bytes.
    ChunkSize,
}

/// The condition a bounded wait was waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitCondition {
    ProvisioningData,
    LinkUp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Cc3000Error {
    /// [Cc3000::begin] hasn't completed yet.
    NotInitialized,
    /// The interrupt pin can't raise an interrupt.
    UnsupportedIrqPin(u8),
    InvalidArgument(ArgumentError),
    TransportFailure(TransportError),
    Timeout(WaitCondition),
    /// The socket was already closed.
    SocketClosed,
}
impl From<TransportError> for Cc3000Error {
    fn from(err: TransportError) -> Self {
        Self::TransportFailure(err)
    }
}

pub type Cc3000Result<T> = Result<T, Cc3000Error>;

/// Where in the bring-up the driver is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DevicePhase {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
}

/// The link status reported by the chip.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Scanning,
    Connecting,
    Connected,
}
impl ConnectionStatus {
    /// Unknown codes are treated as disconnected.
    pub const fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Scanning,
            2 => Self::Connecting,
            3 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

/// Driver for the chip.
///
/// The [SessionState] is shared with the interrupt dispatcher, which feeds events into it through
/// [SessionState::apply]. All waits in here poll that state with a fixed interval and give up
/// after a fixed time.
pub struct Cc3000<'a, T, D> {
    transport: &'a T,
    state: &'a SessionState,
    delay: D,
    config: Config,
    phase: DevicePhase,
}
impl<'a, T: Hci, D: DelayNs> Cc3000<'a, T, D> {
    pub const fn new(transport: &'a T, state: &'a SessionState, delay: D, config: Config) -> Self {
        Self {
            transport,
            state,
            delay,
            config,
            phase: DevicePhase::Uninitialized,
        }
    }
    pub const fn phase(&self) -> DevicePhase {
        self.phase
    }
    pub const fn state(&self) -> &'a SessionState {
        self.state
    }
    fn command(&self, command: Command<'_>) -> Cc3000Result<u32> {
        trace!("Issuing {}.", command.name());
        self.transport.command(command).map_err(|err| {
            warn!("Command {} failed: {}", command.name(), err.code());
            err.into()
        })
    }
    fn ensure_ready(&self) -> Cc3000Result<()> {
        if self.phase == DevicePhase::Ready {
            Ok(())
        } else {
            Err(Cc3000Error::NotInitialized)
        }
    }
    /// Poll `condition` until it's met or `timeout_ms` have passed.
    fn wait_until(
        &mut self,
        timeout_ms: u32,
        mut condition: impl FnMut(&SessionState) -> bool,
    ) -> bool {
        let mut remaining = timeout_ms;
        while !condition(self.state) {
            if remaining == 0 {
                return false;
            }
            self.delay.delay_ms(POLL_INTERVAL_MS);
            remaining = remaining.saturating_sub(POLL_INTERVAL_MS);
        }
        true
    }
    fn power_cycle(&mut self, settle_ms: u32) -> Cc3000Result<()> {
        self.command(Command::Stop)?;
        self.delay.delay_ms(settle_ms);
        self.command(Command::Start {
            patch_request: self.config.patch_request,
        })?;
        Ok(())
    }

    /// Bring up the chip.
    ///
    /// This resolves the interrupt of the configured pin, starts the chip, clears the connection
    /// policy and the stored profiles and sets the event mask. If anything fails, the driver
    /// stays uninitialized and this may be called again.
    pub fn begin(&mut self) -> Cc3000Result<()> {
        let Some(interrupt) = self.config.resolve_interrupt() else {
            error!("Pin {} isn't an interrupt pin.", self.config.irq_pin);
            return Err(Cc3000Error::UnsupportedIrqPin(self.config.irq_pin));
        };
        debug!(
            "Bringing up with pin {} on interrupt {}.",
            self.config.irq_pin, interrupt
        );
        self.phase = DevicePhase::Initializing;
        match self.bring_up() {
            Ok(()) => {
                self.phase = DevicePhase::Ready;
                debug!("Bring-up complete.");
                Ok(())
            }
            Err(err) => {
                self.phase = DevicePhase::Uninitialized;
                Err(err)
            }
        }
    }
    fn bring_up(&mut self) -> Cc3000Result<()> {
        self.command(Command::Start {
            patch_request: self.config.patch_request,
        })?;
        self.command(Command::SetConnectionPolicy(ConnectionPolicy::MANUAL))?;
        self.command(Command::DeleteProfile(ALL_PROFILES))?;
        self.command(Command::SetEventMask(EventMask::QUIET))?;
        Ok(())
    }
    /// Stop the chip, wait five seconds and start it again.
    pub fn reboot(&mut self) -> Cc3000Result<()> {
        self.ensure_ready()?;
        self.power_cycle(REBOOT_SETTLE_MS)
    }
    /// Power down the chip.
    pub fn stop(&mut self) -> Cc3000Result<()> {
        self.ensure_ready()?;
        self.command(Command::Stop)?;
        Ok(())
    }
    /// Disconnect from the access point.
    ///
    /// The link goes down asynchronously.
    pub fn disconnect(&mut self) -> Cc3000Result<()> {
        self.ensure_ready()?;
        self.command(Command::Disconnect)?;
        Ok(())
    }
    /// Delete all profiles stored on the chip.
    pub fn delete_stored_profiles(&mut self) -> Cc3000Result<()> {
        self.ensure_ready()?;
        self.command(Command::SetConnectionPolicy(ConnectionPolicy::MANUAL))?;
        self.command(Command::DeleteProfile(ALL_PROFILES))?;
        Ok(())
    }
    /// Start scanning for access points for `duration_ms`.
    pub fn start_scan(&mut self, duration_ms: u32) -> Cc3000Result<()> {
        self.ensure_ready()?;
        self.command(Command::SetScanParams(ScanParams::new(duration_ms)))?;
        Ok(())
    }
    /// Abort a running scan.
    pub fn stop_scan(&mut self) -> Cc3000Result<()> {
        self.start_scan(0)
    }
    /// Query the link status from the chip.
    pub fn status(&mut self) -> Cc3000Result<ConnectionStatus> {
        self.ensure_ready()?;
        Ok(ConnectionStatus::from_code(self.command(Command::StatusGet)?))
    }
    /// The network configuration, if connected and holding a lease.
    pub fn ip_config(&self) -> Cc3000Result<Option<IpConfig>> {
        self.ensure_ready()?;
        if !self.state.is_connected() || !self.state.is_dhcp_bound() {
            return Ok(None);
        }
        Ok(Some(self.transport.ip_config()?))
    }

    fn validate_ssid(ssid: &str) -> Cc3000Result<()> {
        if ssid.len() > MAX_SSID_LENGTH {
            return Err(Cc3000Error::InvalidArgument(ArgumentError::SsidLength));
        }
        Ok(())
    }
    fn validate_secure(ssid: &str, key: &str, security: i32) -> Cc3000Result<SecurityMode> {
        if !(0..=3).contains(&security) {
            return Err(Cc3000Error::InvalidArgument(ArgumentError::SecurityMode));
        }
        Self::validate_ssid(ssid)?;
        if key.len() > MAX_KEY_LENGTH {
            return Err(Cc3000Error::InvalidArgument(ArgumentError::KeyLength));
        }
        Ok(SecurityMode::from_bits(security as u8))
    }
    fn issue_connect(&mut self, security: SecurityMode, ssid: &str, key: &str) -> Cc3000Result<()> {
        self.command(Command::SetConnectionPolicy(ConnectionPolicy::MANUAL))?;
        self.delay.delay_ms(CONNECTION_POLICY_SETTLE_MS);
        self.command(Command::Connect {
            security,
            ssid: ssid.as_bytes(),
            key: key.as_bytes(),
        })?;
        Ok(())
    }
    /// Connect to an open access point.
    ///
    /// This only issues the command, the link comes up asynchronously.
    pub fn connect_open(&mut self, ssid: &str) -> Cc3000Result<()> {
        self.ensure_ready()?;
        Self::validate_ssid(ssid)?;
        self.issue_connect(SecurityMode::Unsecured, ssid, "")
    }
    /// Connect to a secured access point.
    ///
    /// `security` is the raw security mode, which must be in `0..=3`. Arguments are validated
    /// before anything is sent to the chip.
    pub fn connect_secure(&mut self, ssid: &str, key: &str, security: i32) -> Cc3000Result<()> {
        self.ensure_ready()?;
        let security = Self::validate_secure(ssid, key, security)?;
        self.issue_connect(security, ssid, key)
    }
    /// Connect and keep trying until the link is up.
    ///
    /// Every attempt scans first, since the chip won't connect reliably otherwise, then connects
    /// and waits up to `timeout` for the link. There is no limit on the amount of attempts.
    pub fn connect_with_retry(
        &mut self,
        ssid: &str,
        key: &str,
        security: i32,
        timeout: Duration,
    ) -> Cc3000Result<()> {
        self.ensure_ready()?;
        let open = security == 0 || key.is_empty();
        let security = if open {
            Self::validate_ssid(ssid)?;
            SecurityMode::Unsecured
        } else {
            Self::validate_secure(ssid, key, security)?
        };
        let timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if let Err(err) = self.start_scan(SCAN_DURATION_MS) {
                warn!("Scan before connecting failed: {:?}", err);
            }
            self.delay.delay_ms(SCAN_SETTLE_MS);
            if let Err(err) = self.stop_scan() {
                warn!("Stopping the scan failed: {:?}", err);
            }

            info!("Connecting to {}, attempt {}.", ssid, attempt);
            let key = if open { "" } else { key };
            if let Err(err) = self.issue_connect(security, ssid, key) {
                warn!("Connect attempt {} failed: {:?}", attempt, err);
                continue;
            }
            if self.wait_until(timeout_ms, SessionState::is_connected) {
                info!("Connected after {} attempts.", attempt);
                return Ok(());
            }
            warn!("Timed out waiting for the link.");
        }
    }

    /// Run the provisioning handshake.
    ///
    /// The chip is reset and listens for provisioning frames for up to a minute. With
    /// `enable_encryption`, the received data is decrypted with [PROVISIONING_AES_KEY]. Afterwards
    /// the chip connects on its own and, if it gets a lease, advertises [DEVICE_NAME].
    ///
    /// Any failure aborts the handshake and leaves the chip in an unknown state.
    pub fn start_provisioning(&mut self, enable_encryption: bool) -> Cc3000Result<()> {
        self.ensure_ready()?;
        let baseline = self.state.snapshot();
        debug!("Starting provisioning from {:?}.", baseline);

        self.command(Command::SetConnectionPolicy(ConnectionPolicy::MANUAL))?;
        self.command(Command::DeleteProfile(ALL_PROFILES))?;
        while self.state.is_connected() {
            self.command(Command::Disconnect)?;
            self.delay.delay_ms(POLL_INTERVAL_MS);
        }

        self.power_cycle(POWER_CYCLE_SETTLE_MS)?;
        self.command(Command::NvmemCreateEntry {
            file_id: NVMEM_AES128_KEY_FILE_ID,
            length: PROVISIONING_AES_KEY.len() as u16,
        })?;
        self.command(Command::AesWriteKey(PROVISIONING_AES_KEY))?;
        self.command(Command::SmartConfigSetPrefix(PROVISIONING_PREFIX))?;
        self.command(Command::SmartConfigStart { encrypted: false })?;

        info!("Waiting for provisioning data.");
        if !self.wait_until(PROVISIONING_TIMEOUT_MS, |state| {
            state.provisioning_completions() != baseline.provisioning_completions
        }) {
            warn!("Timed out waiting for provisioning data.");
            return Err(Cc3000Error::Timeout(WaitCondition::ProvisioningData));
        }
        info!("Got provisioning data.");
        if enable_encryption {
            self.command(Command::SmartConfigProcess)?;
        }

        self.command(Command::SetConnectionPolicy(
            ConnectionPolicy::AUTO_CONNECT,
        ))?;
        self.power_cycle(POWER_CYCLE_SETTLE_MS)?;
        self.command(Command::SetEventMask(EventMask::QUIET))?;

        if !self.wait_until(CONNECT_TIMEOUT_MS, SessionState::is_connected) {
            warn!("Timed out waiting to connect.");
            return Err(Cc3000Error::Timeout(WaitCondition::LinkUp));
        }
        self.delay.delay_ms(DHCP_SETTLE_MS);
        if self.state.is_dhcp_bound() {
            if let Err(err) = self.command(Command::MdnsAdvertise {
                enabled: true,
                name: DEVICE_NAME.as_bytes(),
            }) {
                warn!("Advertising the device name failed: {:?}", err);
            }
        }
        info!("Provisioning complete.");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }
    pub fn is_dhcp_bound(&self) -> bool {
        self.state.is_dhcp_bound()
    }
    pub fn is_provisioning_done(&self) -> bool {
        self.state.is_provisioning_done()
    }
    pub fn can_shut_down(&self) -> bool {
        self.state.can_shut_down()
    }
    pub fn ping_report(&self) -> PingReport {
        self.state.ping_report()
    }

    fn open_client(
        &self,
        socket_type: SocketType,
        protocol: Protocol,
        address: SocketAddrV4,
    ) -> Client<'a, T> {
        let socket = match self.open_socket(socket_type, protocol, address) {
            Ok(socket) => socket,
            Err(err) => {
                warn!("Opening socket to port {} failed: {:?}", address.port(), err);
                return Client::unopened(self.transport, self.state);
            }
        };
        Client::new(self.transport, self.state, socket)
    }
    fn open_socket(
        &self,
        socket_type: SocketType,
        protocol: Protocol,
        address: SocketAddrV4,
    ) -> Cc3000Result<SocketId> {
        let socket = self.transport.socket(socket_type, protocol)?;
        if let Err(err) = self.transport.connect(socket, address) {
            if let Err(close_err) = self.transport.close(socket) {
                warn!("Closing socket {} failed: {}", socket.0, close_err.code());
            }
            return Err(err.into());
        }
        trace!("Socket {} connected.", socket.0);
        Ok(socket)
    }
    /// Open a TCP connection.
    ///
    /// On failure the returned client is not open.
    pub fn open_tcp_client(&self, ip: Ipv4Addr, port: u16) -> Client<'a, T> {
        self.open_client(
            SocketType::Stream,
            Protocol::Tcp,
            SocketAddrV4::new(ip, port),
        )
    }
    /// Open a UDP "connection" to a fixed peer.
    ///
    /// On failure the returned client is not open.
    pub fn open_udp_client(&self, ip: Ipv4Addr, port: u16) -> Client<'a, T> {
        self.open_client(
            SocketType::Datagram,
            Protocol::Udp,
            SocketAddrV4::new(ip, port),
        )
    }
}
