//! Remote surfaces: REST endpoints and the live hub connection.

pub mod backend;
pub mod hub_protocol;
pub mod push_channel;
pub mod rest;
pub mod wire;
