//! Unsolicited events raised by the chip and how they change the [SessionState].
use bitfield_struct::bitfield;
use macro_bits::serializable_enum;

use crate::{hci::SocketId, state::SessionState};

serializable_enum! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    /// The tag of an unsolicited event.
    pub enum EventKind: u16 {
        LinkUp => 0x8001,
        LinkDown => 0x8002,
        InitComplete => 0x8004,
        TxComplete => 0x8008,
        DhcpLeaseAcquired => 0x8010,
        PingReport => 0x8040,
        ProvisioningComplete => 0x8080,
        Keepalive => 0x8200,
        RemoteClose => 0x8800,
        PowerDownPermitted => 0x0099
    }
}

#[bitfield(u16)]
#[derive(PartialEq, Eq)]
/// A set of events, as passed to the event mask command.
///
/// Every flag corresponds to the low bits of the matching [EventKind] tag.
pub struct EventMask {
    pub link_up: bool,
    pub link_down: bool,
    pub init_complete: bool,
    pub tx_complete: bool,
    pub dhcp_lease_acquired: bool,
    #[bits(1)]
    __: u8,
    pub ping_report: bool,
    pub provisioning_complete: bool,
    #[bits(1)]
    __: u8,
    pub keepalive: bool,
    #[bits(1)]
    __: u8,
    pub remote_close: bool,
    #[bits(4)]
    __: u8,
}
impl EventMask {
    /// The mask applied at bring-up and after provisioning: init and keepalive only.
    pub const QUIET: Self = Self::new().with_init_complete(true).with_keepalive(true);
}

/// Length of the ping report as sent by the chip.
pub const PING_REPORT_LENGTH: usize = 20;

/// Statistics of the last ping run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PingReport {
    pub packets_sent: u32,
    pub packets_received: u32,
    pub min_round_time: u32,
    pub max_round_time: u32,
    pub avg_round_time: u32,
}
impl PingReport {
    pub fn from_le_bytes(bytes: [u8; PING_REPORT_LENGTH]) -> Self {
        let word = |index: usize| {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&bytes[index * 4..index * 4 + 4]);
            u32::from_le_bytes(raw)
        };
        Self {
            packets_sent: word(0),
            packets_received: word(1),
            min_round_time: word(2),
            max_round_time: word(3),
            avg_round_time: word(4),
        }
    }
    pub fn to_le_bytes(&self) -> [u8; PING_REPORT_LENGTH] {
        let mut bytes = [0u8; PING_REPORT_LENGTH];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip([
            self.packets_sent,
            self.packets_received,
            self.min_round_time,
            self.max_round_time,
            self.avg_round_time,
        ]) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }
    /// Overwrite the start of the report with `payload`.
    ///
    /// Bytes beyond the payload keep their previous value, anything past the report length is
    /// dropped.
    pub fn overwritten_with(&self, payload: &[u8]) -> Self {
        let mut bytes = self.to_le_bytes();
        let length = payload.len().min(PING_REPORT_LENGTH);
        bytes[..length].copy_from_slice(&payload[..length]);
        Self::from_le_bytes(bytes)
    }
}

/// An unsolicited event, that changes the session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AsyncEvent<'a> {
    ProvisioningComplete,
    LinkUp,
    LinkDown,
    DhcpLeaseAcquired,
    PowerDownPermitted,
    /// The raw report, which is copied over the stored one.
    PingReport(&'a [u8]),
    RemoteClose(SocketId),
}
impl<'a> AsyncEvent<'a> {
    /// Decode an event from its tag and payload.
    ///
    /// Returns [None] for events, that don't affect the session state.
    pub fn decode(tag: u16, payload: &'a [u8]) -> Option<Self> {
        Some(match EventKind::from_bits(tag) {
            EventKind::ProvisioningComplete => Self::ProvisioningComplete,
            EventKind::LinkUp => Self::LinkUp,
            EventKind::LinkDown => Self::LinkDown,
            EventKind::DhcpLeaseAcquired => Self::DhcpLeaseAcquired,
            EventKind::PowerDownPermitted => Self::PowerDownPermitted,
            EventKind::PingReport => Self::PingReport(payload),
            EventKind::RemoteClose => Self::RemoteClose(SocketId(*payload.first()?)),
            _ => return None,
        })
    }
}

impl SessionState {
    /// Apply an unsolicited event to the session state.
    ///
    /// This is the entry point for the interrupt dispatcher and must be called exactly once per
    /// event, in arrival order. It never blocks and never fails; unknown tags are ignored.
    pub fn apply(&self, tag: u16, payload: &[u8]) {
        match AsyncEvent::decode(tag, payload) {
            Some(event) => self.apply_event(event),
            None => trace!("Ignoring event {:#x}.", tag),
        }
    }
    /// Apply an already decoded event.
    pub fn apply_event(&self, event: AsyncEvent<'_>) {
        match event {
            AsyncEvent::ProvisioningComplete => {
                self.provisioning_done.set();
                self.provisioning_completions
                    .fetch_add(1, portable_atomic::Ordering::AcqRel);
            }
            AsyncEvent::LinkUp => self.connected.set(),
            AsyncEvent::LinkDown => {
                self.connected.clear();
                self.dhcp_bound.clear();
                self.dhcp_configured.clear();
            }
            AsyncEvent::DhcpLeaseAcquired => self.dhcp_bound.set(),
            AsyncEvent::PowerDownPermitted => self.safe_to_power_down.set(),
            AsyncEvent::PingReport(payload) => {
                self.ping_report.lock(|report| {
                    report.set(report.get().overwritten_with(payload));
                });
                self.ping_report_count
                    .fetch_add(1, portable_atomic::Ordering::AcqRel);
            }
            AsyncEvent::RemoteClose(socket) => {
                if !self.closed_sockets.insert(socket) {
                    trace!("Remote close for out of range socket {}.", socket.0);
                }
            }
        }
    }
}
