mod error;
mod serial;
mod tcp_client;
mod tcp_server;
mod transport;

pub use error::TransportError;
pub use serial::SerialTransport;
pub use tcp_client::TcpClientTransport;
pub use tcp_server::TcpServerTransport;
pub use transport::Transport;

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use secs_timing::Duration;

    use super::*;

    #[test]
    fn tcp_client_connects_and_round_trips() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(&buf).unwrap();
        });

        let mut client = TcpClientTransport::new(addr.to_string(), Duration::from_millis(10));
        while client.ensure_connected().is_err() {
            thread::sleep(Duration::from_millis(5));
        }
        client.write_all(b"hello").unwrap();
        let mut buf = [0u8; 5];
        let mut read = 0;
        while read < buf.len() {
            client.set_read_timeout(Duration::from_secs(1)).unwrap();
            read += client.read(&mut buf[read..]).unwrap();
        }
        assert_eq!(&buf, b"hello");
        server.join().unwrap();
    }
}
