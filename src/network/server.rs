//! TCP Server
//!
//! Accepts connections and hands each one to its own thread.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{CinderError, Result};
use crate::network::Connection;
use crate::protocol::{write_response, Response};

/// How long the acceptor sleeps when no connection is pending
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// TCP server for CinderKV
pub struct Server {
    config: Config,
    engine: Arc<Engine>,
    listener: TcpListener,

    /// Set by `shutdown`; checked by the accept loop
    shutdown: Arc<AtomicBool>,

    /// Connections currently being served
    active: Arc<AtomicUsize>,
}

impl Server {
    /// Bind the listen address from `config`
    pub fn bind(config: Config, engine: Arc<Engine>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).map_err(|e| {
            CinderError::Network(format!("Failed to bind {}: {}", config.listen_addr, e))
        })?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            config,
            engine,
            listener,
            shutdown: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle other threads can use to stop `run`
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Start the server (blocking)
    ///
    /// Returns once `shutdown` is signalled. Connections already being
    /// served finish on their own threads.
    pub fn run(&self) -> Result<()> {
        tracing::info!("Listening on {}", self.local_addr()?);

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => self.dispatch(stream, peer),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                }
            }
        }

        tracing::info!("Server stopped accepting connections");
        Ok(())
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!("Failed to configure connection from {}: {}", peer, e);
            return;
        }

        if self.active.fetch_add(1, Ordering::SeqCst) >= self.config.max_connections {
            self.active.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!("Rejecting {}: connection limit reached", peer);
            let mut stream = stream;
            let _ = write_response(&mut stream, &Response::error("connection limit reached"));
            return;
        }

        let engine = Arc::clone(&self.engine);
        let active = Arc::clone(&self.active);
        let (read_ms, write_ms) = (self.config.read_timeout_ms, self.config.write_timeout_ms);

        let spawned = thread::Builder::new()
            .name(format!("cinderkv-conn-{}", peer))
            .spawn(move || {
                let result = Connection::new(stream, engine).and_then(|mut conn| {
                    conn.set_timeouts(read_ms, write_ms)?;
                    conn.handle()
                });
                if let Err(e) = result {
                    tracing::debug!("Connection {} ended with error: {}", peer, e);
                }
                active.fetch_sub(1, Ordering::SeqCst);
            });

        if let Err(e) = spawned {
            self.active.fetch_sub(1, Ordering::SeqCst);
            tracing::error!("Failed to spawn connection thread: {}", e);
        }
    }
}
