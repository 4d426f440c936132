//! Transport to the JBOD server.
//!
//! Submodules:
//! - `frame`: request/response frame layout
//! - `io`: exact-length transfers over a byte stream
//! - `client`: the `Transport` seam and the TCP client implementing it
pub mod client;
pub mod frame;
pub mod io;
