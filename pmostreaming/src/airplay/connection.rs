use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::airplay::command::AirplayCommand;
use crate::airplay::response::CommandResponse;
use crate::errors::StreamingError;

pub const DEFAULT_AIRPLAY_PORT: u16 = 7000;
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

struct ControlSocket {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl ControlSocket {
    fn round_trip(&mut self, command: &AirplayCommand) -> io::Result<CommandResponse> {
        write_request(&mut self.writer, command)?;
        read_response(&mut self.reader)
    }

    fn shutdown(&self) {
        let _ = self.writer.shutdown(Shutdown::Both);
    }
}

/// Persistent control socket of one AirPlay receiver.
///
/// Opened on first use, reused while healthy, dropped on any IO error and
/// reopened by the next command. Exchanges hold the socket lock, so commands
/// to the same receiver never interleave.
pub struct AirplayConnection {
    host: String,
    port: u16,
    timeout: Duration,
    socket: Mutex<Option<ControlSocket>>,
}

impl AirplayConnection {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            socket: Mutex::new(None),
        }
    }

    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn is_open(&self) -> bool {
        self.socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn connect(&self) -> io::Result<ControlSocket> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port).to_socket_addrs()?.collect();

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.timeout))?;
                    stream.set_write_timeout(Some(self.timeout))?;
                    let reader = BufReader::new(stream.try_clone()?);
                    debug!(address = %addr, "AirPlay control socket opened");
                    return Ok(ControlSocket {
                        reader,
                        writer: stream,
                    });
                }
                Err(err) => last_err = Some(err),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("No address resolved for {}", self.address()),
            )
        }))
    }

    /// Sends `command` and waits for the reply.
    pub fn exchange(&self, command: &AirplayCommand) -> Result<CommandResponse, StreamingError> {
        let mut guard = self.socket.lock().unwrap_or_else(PoisonError::into_inner);

        let socket = match guard.take() {
            Some(socket) => socket,
            None => self.connect().map_err(|err| {
                warn!(address = %self.address(), error = %err, "Cannot reach AirPlay receiver");
                StreamingError::transport(err)
            })?,
        };
        let socket = guard.insert(socket);

        trace!(address = %self.address(), command = command.name(), "AirPlay request");
        match socket.round_trip(command) {
            Ok(response) => Ok(response),
            Err(err) => {
                socket.shutdown();
                *guard = None;
                debug!(address = %self.address(), error = %err, "AirPlay socket dropped");
                Err(StreamingError::transport(err))
            }
        }
    }

    pub fn close(&self) {
        let socket = self
            .socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(socket) = socket {
            socket.shutdown();
            debug!(address = %self.address(), "AirPlay control socket closed");
        }
    }
}

impl Drop for AirplayConnection {
    fn drop(&mut self) {
        self.close();
    }
}

pub fn write_request<W: Write>(writer: &mut W, command: &AirplayCommand) -> io::Result<()> {
    writer.write_all(command.to_request().as_bytes())?;
    writer.flush()
}

/// Reads one reply: header lines up to a blank line, then the body.
///
/// A body shorter than its announced length is accepted when the stream ends.
pub fn read_response<R: BufRead>(reader: &mut R) -> io::Result<CommandResponse> {
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            break;
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        lines.push(line.to_string());
    }

    if lines.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "Connection closed by AirPlay receiver",
        ));
    }

    let mut response = CommandResponse::decode_http_response(&lines);
    let length = response.content_length();
    if length > 0 {
        let mut body = Vec::with_capacity(length.min(64 * 1024));
        reader.by_ref().take(length as u64).read_to_end(&mut body)?;
        if response.has_parameters_body() {
            response.decode_content_parameters(&String::from_utf8_lossy(&body));
        }
    }

    Ok(response)
}
