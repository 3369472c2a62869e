//! Connection Handler
//!
//! Handles individual client connections.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::Engine;
use crate::error::{CinderError, Result};
use crate::protocol::{read_command, write_response, Command, Response};

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Reference to the storage engine
    engine: Arc<Engine>,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O on two handles of the same stream
    pub fn new(stream: TcpStream, engine: Arc<Engine>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
            engine,
            peer_addr,
        })
    }

    /// Configure connection timeouts (0 = none)
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.reader
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.writer
                .get_ref()
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }

        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads commands in a loop and sends responses. A malformed command is
    /// answered with an error response; the connection stays usable because
    /// the whole message was consumed before decoding.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            let response = match read_command(&mut self.reader) {
                Ok(command) => {
                    tracing::trace!("Received command from {}: {:?}", self.peer_addr, command);
                    self.execute_command(command)
                }
                Err(CinderError::Protocol(reason)) => {
                    tracing::debug!("Rejected command from {}: {}", self.peer_addr, reason);
                    Response::error(&reason)
                }
                Err(CinderError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!("Client {} disconnected ({:?})", self.peer_addr, e.kind());
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    return Err(e);
                }
            };

            if let Err(e) = write_response(&mut self.writer, &response) {
                if let CinderError::Io(ref io_err) = e {
                    if is_disconnect(io_err.kind()) {
                        tracing::debug!(
                            "Client {} disconnected before response could be sent: {}",
                            self.peer_addr,
                            e
                        );
                        return Ok(());
                    }
                }
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                return Err(e);
            }
        }
    }

    /// Execute a command and build its response
    fn execute_command(&self, command: Command) -> Response {
        let is_get = matches!(command, Command::Get { .. });

        match self.engine.execute(command) {
            Ok(Some(value)) => Response::ok(Some(value)),
            Ok(None) if is_get => Response::not_found(),
            Ok(None) => Response::ok(None),
            Err(e) => Response::error(&e.to_string()),
        }
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
    )
}
