//! Client of the detector server.
pub mod client;
