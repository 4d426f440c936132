use std::io::Write;
use std::net::{SocketAddr, TcpListener};
use std::thread::{self, JoinHandle};

use libjbod::geometry::BLOCK_SIZE;
use libjbod::memory::RC_OK;
use libjbod::net::client::recv_frame;
use libjbod::net::frame::encode_response;
use libjbod::{Command, InMemoryJbod, JbodError};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Loopback JBOD server answering one client from an `InMemoryJbod`.
/// Joining the handle after the client disconnects returns the array.
pub fn spawn_server() -> (SocketAddr, JoinHandle<InMemoryJbod>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let mut jbod = InMemoryJbod::new();
        let (mut stream, _) = listener.accept().unwrap();
        loop {
            let mut block = [0u8; BLOCK_SIZE];
            let header = match recv_frame(&mut stream, Some(&mut block)) {
                Ok(header) => header,
                Err(JbodError::ConnectionClosed) => break,
                Err(e) => panic!("server failed to read request: {e}"),
            };
            let rc = jbod.execute(header.opcode, Some(&mut block));
            let payload = (header.opcode.command() == Some(Command::ReadBlock) && rc == RC_OK)
                .then_some(&block);
            let resp = encode_response(header.opcode, rc, payload);
            if stream.write_all(&resp).is_err() {
                break;
            }
        }
        jbod
    });
    (addr, handle)
}
