//! Request/response exchange with the JBOD server.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use tracing::{debug, info, warn};

use super::frame::{self, HEADER_LEN, Header};
use super::io::{read_full, write_full};
use crate::error::{JbodError, Result};
use crate::geometry::{BLOCK_SIZE, Block};
use crate::opcode::{Command, Opcode};

/// Something that can carry out one JBOD operation.
///
/// `block` is the payload for write-block and receives the block for
/// read-block; other operations ignore it.
pub trait Transport {
    fn perform_operation(&mut self, op: Opcode, block: Option<&mut Block>) -> Result<()>;
}

/// Send one request frame.
pub fn send_request<W: Write + ?Sized>(
    writer: &mut W,
    op: Opcode,
    payload: Option<&Block>,
) -> Result<()> {
    let frame = frame::encode_request(op, payload)?;
    write_full(writer, &frame)
}

/// Receive one frame. The header is read first; a block payload, if
/// the header announces one, lands in `block`.
pub fn recv_frame<R: Read + ?Sized>(reader: &mut R, block: Option<&mut Block>) -> Result<Header> {
    let mut raw = [0u8; HEADER_LEN];
    read_full(reader, &mut raw)?;
    let header = Header::decode(&raw)?;
    if header.has_payload() {
        match block {
            Some(block) => read_full(reader, block)?,
            None => {
                // Drain it so the stream stays aligned on frame boundaries.
                let mut scratch = [0u8; BLOCK_SIZE];
                read_full(reader, &mut scratch)?;
                return Err(JbodError::MalformedFrame(format!(
                    "unexpected payload in response to {:?}",
                    header.opcode
                )));
            }
        }
    }
    Ok(header)
}

/// Send `op`, wait for its response and check the return code.
pub fn exchange<S: Read + Write + ?Sized>(
    stream: &mut S,
    op: Opcode,
    block: Option<&mut Block>,
) -> Result<()> {
    let header = match block {
        Some(block) => {
            send_request(stream, op, Some(&*block))?;
            recv_frame(stream, Some(block))?
        }
        None => {
            send_request(stream, op, None)?;
            recv_frame(stream, None)?
        }
    };
    if header.return_code != 0 {
        warn!(?op, code = header.return_code, "server rejected operation");
        return Err(JbodError::Rejected {
            command: op.command(),
            code: header.return_code,
        });
    }
    if op.command() == Some(Command::ReadBlock) && !header.has_payload() {
        return Err(JbodError::MalformedFrame(format!(
            "response to {op:?} carries no block"
        )));
    }
    debug!(?op, "operation completed");
    Ok(())
}

/// TCP client holding the single connection to a JBOD server.
#[derive(Debug, Default)]
pub struct JbodClient {
    stream: Option<TcpStream>,
}

impl JbodClient {
    pub fn new() -> Self {
        Self { stream: None }
    }

    /// Resolve `host:port` and connect to the first address that accepts.
    /// An existing connection is closed first.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        self.disconnect();
        let target = format!("{host}:{port}");
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|source| JbodError::ConnectFailed {
                target: target.clone(),
                source,
            })?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    info!(%addr, "connected to JBOD server");
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => {
                    debug!(%addr, error = %e, "connect attempt failed");
                    last_err = Some(e);
                }
            }
        }
        Err(JbodError::ConnectFailed {
            target,
            source: last_err.unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved")
            }),
        })
    }

    /// Close the connection. Does nothing when already disconnected.
    pub fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.shutdown(std::net::Shutdown::Both) {
                debug!(error = %e, "shutdown failed");
            }
            info!("disconnected from JBOD server");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

impl Transport for JbodClient {
    fn perform_operation(&mut self, op: Opcode, block: Option<&mut Block>) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(JbodError::NotConnected)?;
        exchange(stream, op, block)
    }
}

impl Drop for JbodClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
