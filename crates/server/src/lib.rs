//! BlinkDB network adapter: a RESP-2 (Redis line protocol) front end over
//! the storage engine.

pub mod net;
pub mod resp;

pub use net::Server;
