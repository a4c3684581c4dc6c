use core::cell::Cell;

use embassy_sync::blocking_mutex;
use portable_atomic::{AtomicU32, Ordering};

use crate::{
    events::PingReport,
    hci::SocketId,
    sync::{SocketSet, StatusFlag},
    DefaultRawMutex,
};

/// The state shared between the interrupt path and the rest of the driver.
///
/// There is exactly one of these per chip. All fields are only written by
/// [SessionState::apply], everything else polls them. Since every field is
/// independent, no locking is needed for the flags. The ping report is copied as a whole under a
/// critical section.
pub struct SessionState {
    pub(crate) connected: StatusFlag,
    pub(crate) dhcp_bound: StatusFlag,
    pub(crate) dhcp_configured: StatusFlag,
    pub(crate) provisioning_done: StatusFlag,
    pub(crate) provisioning_completions: AtomicU32,
    pub(crate) safe_to_power_down: StatusFlag,
    pub(crate) ping_report: blocking_mutex::Mutex<DefaultRawMutex, Cell<PingReport>>,
    pub(crate) ping_report_count: AtomicU32,
    pub(crate) closed_sockets: SocketSet,
}
impl SessionState {
    /// The maximum amount of sockets tracked for remote closes.
    pub const MAX_SOCKETS: usize = SocketSet::CAPACITY;

    pub const fn new() -> Self {
        Self {
            connected: StatusFlag::new(),
            dhcp_bound: StatusFlag::new(),
            dhcp_configured: StatusFlag::new(),
            provisioning_done: StatusFlag::new(),
            provisioning_completions: AtomicU32::new(0),
            safe_to_power_down: StatusFlag::new(),
            ping_report: blocking_mutex::Mutex::new(Cell::new(PingReport {
                packets_sent: 0,
                packets_received: 0,
                min_round_time: 0,
                max_round_time: 0,
                avg_round_time: 0,
            })),
            ping_report_count: AtomicU32::new(0),
            closed_sockets: SocketSet::new(),
        }
    }
    /// Check if the chip is associated with an access point.
    pub fn is_connected(&self) -> bool {
        self.connected.is_set()
    }
    /// Check if the chip holds a DHCP lease.
    pub fn is_dhcp_bound(&self) -> bool {
        self.dhcp_bound.is_set()
    }
    pub fn is_dhcp_configured(&self) -> bool {
        self.dhcp_configured.is_set()
    }
    /// Check if a provisioning handshake has ever completed.
    pub fn is_provisioning_done(&self) -> bool {
        self.provisioning_done.is_set()
    }
    /// The amount of completed provisioning handshakes.
    pub fn provisioning_completions(&self) -> u32 {
        self.provisioning_completions.load(Ordering::Acquire)
    }
    /// Check if the chip has finished its housekeeping and may be powered off.
    pub fn can_shut_down(&self) -> bool {
        self.safe_to_power_down.is_set()
    }
    /// The last ping report received.
    pub fn ping_report(&self) -> PingReport {
        self.ping_report.lock(Cell::get)
    }
    /// The amount of ping reports received.
    pub fn ping_report_count(&self) -> u32 {
        self.ping_report_count.load(Ordering::Acquire)
    }
    /// Check if the remote side has closed the socket.
    pub fn is_socket_closed(&self, socket: SocketId) -> bool {
        self.closed_sockets.contains(socket)
    }
    /// Forget about a remote close, once the socket has been torn down.
    pub(crate) fn clear_socket_closed(&self, socket: SocketId) {
        self.closed_sockets.remove(socket);
    }
    /// Take a copy of every field.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            connected: self.is_connected(),
            dhcp_bound: self.is_dhcp_bound(),
            dhcp_configured: self.is_dhcp_configured(),
            provisioning_done: self.is_provisioning_done(),
            provisioning_completions: self.provisioning_completions(),
            safe_to_power_down: self.can_shut_down(),
            ping_report: self.ping_report(),
            ping_report_count: self.ping_report_count(),
            closed_sockets: self.closed_sockets.bits(),
        }
    }
}
impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// A copy of the [SessionState] at one point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionSnapshot {
    pub connected: bool,
    pub dhcp_bound: bool,
    pub dhcp_configured: bool,
    pub provisioning_done: bool,
    pub provisioning_completions: u32,
    pub safe_to_power_down: bool,
    pub ping_report: PingReport,
    pub ping_report_count: u32,
    /// Bitmap of the sockets closed by the remote side.
    pub closed_sockets: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_out_cleared() {
        let state = SessionState::new();
        assert_eq!(state.snapshot(), SessionSnapshot::default());
        assert!(!state.is_connected());
        assert!(!state.is_socket_closed(SocketId(0)));
    }

    #[test]
    fn usable_as_static() {
        static STATE: SessionState = SessionState::new();
        STATE.apply(crate::events::EventKind::LinkUp.into_bits(), &[]);
        assert!(STATE.is_connected());
    }
}
