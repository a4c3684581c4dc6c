//! A scripted chip and a simulated clock for the unit tests.
use core::net::{Ipv4Addr, SocketAddrV4};
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    vec::Vec,
};

use embassy_time::Duration;
use embedded_hal::delay::DelayNs;

use crate::{
    events::{EventKind, EventMask},
    hci::{
        Command, ConnectionPolicy, Hci, HciResult, IpConfig, Protocol, SecurityMode, SocketId,
        SocketType, TransportError,
    },
    state::SessionState,
};

pub(crate) enum Received {
    Data(Vec<u8>),
    Error(TransportError),
}

/// Records everything issued to it and raises events through the [SessionState] like the real
/// chip would.
pub(crate) struct MockChip<'s> {
    state: &'s SessionState,
    commands: RefCell<Vec<&'static str>>,
    connects: RefCell<Vec<(SecurityMode, Vec<u8>, Vec<u8>)>>,
    event_masks: RefCell<Vec<EventMask>>,
    policies: RefCell<Vec<ConnectionPolicy>>,
    mdns_names: RefCell<Vec<Vec<u8>>>,
    failing_command: Cell<Option<&'static str>>,
    status: Cell<u32>,
    connects_before_link: Cell<Option<usize>>,
    link_on_auto_start: Cell<bool>,
    dhcp_with_link: Cell<bool>,
    provisioning_on_start: Cell<bool>,
    next_socket: Cell<u8>,
    socket_failure: Cell<Option<TransportError>>,
    connect_failure: Cell<Option<TransportError>>,
    opened: RefCell<Vec<(SocketType, Protocol)>>,
    socket_connects: RefCell<Vec<(SocketId, SocketAddrV4)>>,
    sent: RefCell<Vec<Vec<u8>>>,
    send_failure: Cell<Option<TransportError>>,
    recv_queue: RefCell<VecDeque<Received>>,
    recv_lengths: RefCell<Vec<usize>>,
    readable: Cell<bool>,
    select_timeouts: RefCell<Vec<Duration>>,
    closed: RefCell<Vec<SocketId>>,
    close_failure: Cell<Option<TransportError>>,
}
impl<'s> MockChip<'s> {
    pub fn new(state: &'s SessionState) -> Self {
        Self {
            state,
            commands: RefCell::new(Vec::new()),
            connects: RefCell::new(Vec::new()),
            event_masks: RefCell::new(Vec::new()),
            policies: RefCell::new(Vec::new()),
            mdns_names: RefCell::new(Vec::new()),
            failing_command: Cell::new(None),
            status: Cell::new(0),
            connects_before_link: Cell::new(None),
            link_on_auto_start: Cell::new(false),
            dhcp_with_link: Cell::new(false),
            provisioning_on_start: Cell::new(false),
            next_socket: Cell::new(1),
            socket_failure: Cell::new(None),
            connect_failure: Cell::new(None),
            opened: RefCell::new(Vec::new()),
            socket_connects: RefCell::new(Vec::new()),
            sent: RefCell::new(Vec::new()),
            send_failure: Cell::new(None),
            recv_queue: RefCell::new(VecDeque::new()),
            recv_lengths: RefCell::new(Vec::new()),
            readable: Cell::new(false),
            select_timeouts: RefCell::new(Vec::new()),
            closed: RefCell::new(Vec::new()),
            close_failure: Cell::new(None),
        }
    }
    fn raise(&self, kind: EventKind) {
        self.state.apply(kind.into_bits(), &[]);
    }
    fn raise_link(&self) {
        self.raise(EventKind::LinkUp);
        if self.dhcp_with_link.get() {
            self.raise(EventKind::DhcpLeaseAcquired);
        }
    }

    // Scripting.
    pub fn fail_command(&self, name: &'static str) {
        self.failing_command.set(Some(name));
    }
    pub fn set_status(&self, status: u32) {
        self.status.set(status);
    }
    /// Raise a link up on the connect after `failed` unanswered ones.
    pub fn link_after_connects(&self, failed: usize) {
        self.connects_before_link.set(Some(failed));
    }
    pub fn link_on_auto_start(&self) {
        self.link_on_auto_start.set(true);
    }
    pub fn dhcp_with_link(&self) {
        self.dhcp_with_link.set(true);
    }
    pub fn provisioning_on_start(&self) {
        self.provisioning_on_start.set(true);
    }
    pub fn fail_socket(&self, error: TransportError) {
        self.socket_failure.set(Some(error));
    }
    pub fn fail_socket_connect(&self, error: TransportError) {
        self.connect_failure.set(Some(error));
    }
    pub fn fail_sends(&self, error: TransportError) {
        self.send_failure.set(Some(error));
    }
    /// Closes are still recorded, but report `error`.
    pub fn fail_closes(&self, error: TransportError) {
        self.close_failure.set(Some(error));
    }
    pub fn queue_recv(&self, received: Received) {
        self.recv_queue.borrow_mut().push_back(received);
    }
    pub fn set_readable(&self, readable: bool) {
        self.readable.set(readable);
    }

    // Inspection.
    pub fn commands(&self) -> Vec<&'static str> {
        self.commands.borrow().clone()
    }
    pub fn command_count(&self) -> usize {
        self.commands.borrow().len()
    }
    pub fn connects(&self) -> Vec<(SecurityMode, Vec<u8>, Vec<u8>)> {
        self.connects.borrow().clone()
    }
    pub fn event_masks(&self) -> Vec<EventMask> {
        self.event_masks.borrow().clone()
    }
    pub fn policies(&self) -> Vec<ConnectionPolicy> {
        self.policies.borrow().clone()
    }
    pub fn mdns_names(&self) -> Vec<Vec<u8>> {
        self.mdns_names.borrow().clone()
    }
    pub fn opened(&self) -> Vec<(SocketType, Protocol)> {
        self.opened.borrow().clone()
    }
    pub fn socket_connects(&self) -> Vec<(SocketId, SocketAddrV4)> {
        self.socket_connects.borrow().clone()
    }
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.borrow().clone()
    }
    pub fn clear_sent(&self) {
        self.sent.borrow_mut().clear();
    }
    pub fn recv_calls(&self) -> usize {
        self.recv_lengths.borrow().len()
    }
    pub fn recv_lengths(&self) -> Vec<usize> {
        self.recv_lengths.borrow().clone()
    }
    pub fn select_calls(&self) -> usize {
        self.select_timeouts.borrow().len()
    }
    pub fn select_timeouts(&self) -> Vec<Duration> {
        self.select_timeouts.borrow().clone()
    }
    pub fn closed(&self) -> Vec<SocketId> {
        self.closed.borrow().clone()
    }
}
impl Hci for MockChip<'_> {
    fn command(&self, command: Command<'_>) -> HciResult<u32> {
        self.commands.borrow_mut().push(command.name());
        if self.failing_command.get() == Some(command.name()) {
            return Err(TransportError::FAILED);
        }
        match command {
            Command::Start { .. } => {
                let auto_connect = self
                    .policies
                    .borrow()
                    .last()
                    .is_some_and(|policy| *policy == ConnectionPolicy::AUTO_CONNECT);
                if auto_connect && self.link_on_auto_start.get() {
                    self.raise_link();
                }
            }
            Command::SetConnectionPolicy(policy) => self.policies.borrow_mut().push(policy),
            Command::SetEventMask(mask) => self.event_masks.borrow_mut().push(mask),
            Command::Connect {
                security,
                ssid,
                key,
            } => {
                self.connects
                    .borrow_mut()
                    .push((security, ssid.to_vec(), key.to_vec()));
                match self.connects_before_link.get() {
                    Some(0) => self.raise_link(),
                    Some(remaining) => self.connects_before_link.set(Some(remaining - 1)),
                    None => {}
                }
            }
            Command::Disconnect => self.raise(EventKind::LinkDown),
            Command::StatusGet => return Ok(self.status.get()),
            Command::SmartConfigStart { .. } if self.provisioning_on_start.get() => {
                self.raise(EventKind::ProvisioningComplete)
            }
            Command::MdnsAdvertise { name, .. } => self.mdns_names.borrow_mut().push(name.to_vec()),
            _ => {}
        }
        Ok(0)
    }
    fn ip_config(&self) -> HciResult<IpConfig> {
        Ok(IpConfig {
            address: Ipv4Addr::new(192, 168, 1, 23),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 1, 1),
            dhcp_server: Ipv4Addr::new(192, 168, 1, 1),
            dns_server: Ipv4Addr::new(192, 168, 1, 1),
        })
    }
    fn socket(&self, socket_type: SocketType, protocol: Protocol) -> HciResult<SocketId> {
        if let Some(err) = self.socket_failure.get() {
            return Err(err);
        }
        self.opened.borrow_mut().push((socket_type, protocol));
        let socket = SocketId(self.next_socket.get());
        self.next_socket.set(socket.0 + 1);
        Ok(socket)
    }
    fn connect(&self, socket: SocketId, address: SocketAddrV4) -> HciResult<()> {
        self.socket_connects.borrow_mut().push((socket, address));
        match self.connect_failure.get() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
    fn send(&self, _socket: SocketId, buffer: &[u8], _flags: u32) -> HciResult<usize> {
        if let Some(err) = self.send_failure.get() {
            return Err(err);
        }
        self.sent.borrow_mut().push(buffer.to_vec());
        Ok(buffer.len())
    }
    fn recv(&self, _socket: SocketId, buffer: &mut [u8], _flags: u32) -> HciResult<usize> {
        self.recv_lengths.borrow_mut().push(buffer.len());
        match self.recv_queue.borrow_mut().pop_front() {
            Some(Received::Data(data)) => {
                let length = data.len().min(buffer.len());
                buffer[..length].copy_from_slice(&data[..length]);
                Ok(length)
            }
            Some(Received::Error(err)) => Err(err),
            None => Err(TransportError::FAILED),
        }
    }
    fn select_readable(&self, _socket: SocketId, timeout: Duration) -> HciResult<bool> {
        self.select_timeouts.borrow_mut().push(timeout);
        Ok(self.readable.get())
    }
    fn close(&self, socket: SocketId) -> HciResult<()> {
        self.closed.borrow_mut().push(socket);
        match self.close_failure.get() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// A clock, that only advances when delayed on.
///
/// Scheduled events are raised once the simulated time reaches them, just like an interrupt
/// arriving during a busy wait.
pub(crate) struct SimDelay<'s> {
    state: &'s SessionState,
    elapsed_ns: u64,
    scheduled: Vec<(u64, EventKind)>,
}
impl<'s> SimDelay<'s> {
    pub fn new(state: &'s SessionState) -> Self {
        Self {
            state,
            elapsed_ns: 0,
            scheduled: Vec::new(),
        }
    }
    pub fn schedule(&mut self, at_ms: u64, kind: EventKind) {
        self.scheduled.push((at_ms, kind));
    }
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns / 1_000_000
    }
}
impl DelayNs for SimDelay<'_> {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += u64::from(ns);
        let now = self.elapsed_ms();
        let state = self.state;
        self.scheduled.retain(|(at_ms, kind)| {
            if *at_ms <= now {
                state.apply(kind.into_bits(), &[]);
                false
            } else {
                true
            }
        });
    }
}
