//! Network Module
//!
//! Optional TCP adapter in front of the engine.
//!
//! ## Architecture
//! - Single acceptor thread polling a non-blocking listener
//! - One thread per connection, capped by `max_connections`
//! - Commands routed through `Engine::execute`

mod server;
mod connection;

pub use server::Server;
pub use connection::Connection;
