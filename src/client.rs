use core::fmt;

use embassy_time::Duration;

use crate::{
    hci::{Hci, SocketId},
    state::SessionState,
    ArgumentError, Cc3000Error, Cc3000Result,
};

/// Default size of the receive buffer.
pub const DEFAULT_RX_BUFFER_SIZE: usize = 64;
/// How long [Client::available] waits for the socket to become readable.
pub const READINESS_PROBE_TIMEOUT: Duration = Duration::from_millis(5);

/// A byte stream on top of one socket of the chip.
///
/// Once the socket is closed, either by [Client::close] or because the remote side went away,
/// the client stays dead and every operation on it fails or returns nothing.
pub struct Client<'a, T, const RX_BUFFER_SIZE: usize = DEFAULT_RX_BUFFER_SIZE> {
    transport: &'a T,
    state: &'a SessionState,
    socket: Option<SocketId>,
    rx_buffer: [u8; RX_BUFFER_SIZE],
    rx_fill: usize,
    rx_cursor: usize,
}
impl<'a, T: Hci, const RX_BUFFER_SIZE: usize> Client<'a, T, RX_BUFFER_SIZE> {
    /// Wrap an open socket.
    pub const fn new(transport: &'a T, state: &'a SessionState, socket: SocketId) -> Self {
        Self {
            transport,
            state,
            socket: Some(socket),
            rx_buffer: [0u8; RX_BUFFER_SIZE],
            rx_fill: 0,
            rx_cursor: 0,
        }
    }
    /// Create a client, that was never opened.
    pub const fn unopened(transport: &'a T, state: &'a SessionState) -> Self {
        Self {
            transport,
            state,
            socket: None,
            rx_buffer: [0u8; RX_BUFFER_SIZE],
            rx_fill: 0,
            rx_cursor: 0,
        }
    }
    /// The socket, if it is still open.
    pub const fn socket(&self) -> Option<SocketId> {
        self.socket
    }
    pub const fn is_open(&self) -> bool {
        self.socket.is_some()
    }
    fn open_socket(&self) -> Cc3000Result<SocketId> {
        self.socket.ok_or(Cc3000Error::SocketClosed)
    }
    /// Amount of received bytes, that haven't been read yet.
    const fn buffered(&self) -> usize {
        self.rx_fill - self.rx_cursor
    }
    /// Check if the connection is still alive.
    ///
    /// A remote close is only noticed here, once all data has been drained. In that case the
    /// socket is closed and the client becomes dead.
    pub fn connected(&mut self) -> bool {
        let Some(socket) = self.socket else {
            return false;
        };
        if self.available() == 0 && self.state.is_socket_closed(socket) {
            debug!("Socket {} closed by remote, tearing down.", socket.0);
            self.tear_down();
            self.state.clear_socket_closed(socket);
            return false;
        }
        true
    }
    /// Close the socket after the connection died.
    ///
    /// The socket is unusable either way, so a failing close is only logged.
    fn tear_down(&mut self) {
        if let Err(err) = self.close() {
            warn!("Closing a dead socket failed: {:?}", err);
        }
    }
    /// Send `buffer` as is.
    ///
    /// Returns the amount of bytes sent, which may be less than the buffer length.
    pub fn write(&mut self, buffer: &[u8]) -> Cc3000Result<usize> {
        let socket = self.open_socket()?;
        Ok(self.transport.send(socket, buffer, 0)?)
    }
    /// Send a single byte.
    ///
    /// Returns one on success and zero otherwise, errors aren't reported.
    pub fn write_byte(&mut self, byte: u8) -> usize {
        self.write(&[byte]).unwrap_or(0)
    }
    /// Send everything `source` yields, in chunks of `CHUNK_SIZE`.
    ///
    /// The bytes are staged in a buffer, which is sent whenever it's full. Whatever remains at the
    /// end is sent in a final, possibly empty, send. Returns the total amount of bytes sent.
    ///
    /// A `CHUNK_SIZE` of zero is rejected before anything is sent.
    pub fn write_chunked<const CHUNK_SIZE: usize>(
        &mut self,
        source: impl IntoIterator<Item = u8>,
    ) -> Cc3000Result<usize> {
        if CHUNK_SIZE == 0 {
            return Err(Cc3000Error::InvalidArgument(ArgumentError::ChunkSize));
        }
        let socket = self.open_socket()?;
        let mut staging = [0u8; CHUNK_SIZE];
        let mut staged = 0;
        let mut sent = 0;
        for byte in source {
            staging[staged] = byte;
            staged += 1;
            if staged == CHUNK_SIZE {
                sent += self.transport.send(socket, &staging, 0)?;
                staged = 0;
            }
        }
        sent += self.transport.send(socket, &staging[..staged], 0)?;
        Ok(sent)
    }
    /// Send `line` followed by a line break.
    pub fn write_line(&mut self, line: &[u8]) -> Cc3000Result<usize> {
        Ok(self.write(line)? + self.write(b"\n\r")?)
    }
    /// Receive directly into `buffer`, bypassing the internal buffer.
    pub fn read(&mut self, buffer: &mut [u8]) -> Cc3000Result<usize> {
        let socket = self.open_socket()?;
        Ok(self.transport.recv(socket, buffer, 0)?)
    }
    /// Read a single byte through the internal buffer.
    ///
    /// A drained buffer is refilled with a single receive. If the remote side closed the socket,
    /// which includes a receive returning nothing, it is closed here as well and zero is returned.
    pub fn read_byte(&mut self) -> Cc3000Result<u8> {
        if self.buffered() == 0 {
            let socket = self.open_socket()?;
            self.rx_cursor = 0;
            self.rx_fill = 0;
            match self.transport.recv(socket, &mut self.rx_buffer, 0) {
                Ok(0) => {
                    trace!("Receive on socket {} returned nothing.", socket.0);
                    self.tear_down();
                    return Ok(0);
                }
                Ok(received) => self.rx_fill = received.min(RX_BUFFER_SIZE),
                Err(err) if err.is_peer_closed() => {
                    trace!("Receive on socket {} hit a remote close.", socket.0);
                    self.tear_down();
                    return Ok(0);
                }
                Err(err) => {
                    warn!("Receive on socket {} failed: {}", socket.0, err.code());
                    self.tear_down();
                    return Err(err.into());
                }
            }
        }
        let byte = self.rx_buffer[self.rx_cursor];
        self.rx_cursor += 1;
        Ok(byte)
    }
    /// Check if there's anything to read.
    ///
    /// If there is buffered data, this is the amount of it. Otherwise the socket is probed for
    /// readability and one is returned, if it is readable.
    pub fn available(&mut self) -> usize {
        let Some(socket) = self.socket else {
            return 0;
        };
        if self.buffered() > 0 {
            return self.buffered();
        }
        match self
            .transport
            .select_readable(socket, READINESS_PROBE_TIMEOUT)
        {
            Ok(true) => 1,
            _ => 0,
        }
    }
    /// Close the socket.
    ///
    /// Closing an already closed client does nothing.
    pub fn close(&mut self) -> Cc3000Result<()> {
        let Some(socket) = self.socket.take() else {
            return Ok(());
        };
        self.rx_fill = 0;
        self.rx_cursor = 0;
        trace!("Closing socket {}.", socket.0);
        Ok(self.transport.close(socket)?)
    }
}
impl<T: Hci, const RX_BUFFER_SIZE: usize> fmt::Write for Client<'_, T, RX_BUFFER_SIZE> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut remaining = s.as_bytes();
        while !remaining.is_empty() {
            match self.write(remaining) {
                Ok(0) | Err(_) => return Err(fmt::Error),
                Ok(sent) => remaining = &remaining[sent.min(remaining.len())..],
            }
        }
        Ok(())
    }
}
