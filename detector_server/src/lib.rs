//! Camera based detection of Indian currency notes with spoken feedback.

pub mod detector;
pub mod endpoints;
pub mod feedback;
pub mod meter;
pub mod nn;
pub mod sensors;
pub mod session;
pub mod speech;
