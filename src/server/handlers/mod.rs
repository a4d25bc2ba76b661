//! HTTP handlers for the server.

pub mod labels;
pub mod print;
pub mod printers;
