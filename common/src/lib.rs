//! Common code shared between `detector_server` and `detector_ctl`.
pub mod labels;
pub mod protocol;
