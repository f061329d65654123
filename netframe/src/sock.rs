/// ----- SOCK MODULE -----
/// Socket setup helpers shared by the dispatcher and its clients.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};

use socket2::{Domain, Protocol, Socket, Type};

const LISTEN_BACKLOG: i32 = 10;

/// TCP listener on all interfaces with address reuse, so a restarted
/// dispatcher can rebind immediately.
pub fn listen(port: u16) -> io::Result<TcpListener> {
    let sock = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    sock.set_reuse_address(true)?;
    let local_addr = SocketAddr::from(([0, 0, 0, 0], port));
    sock.bind(&local_addr.into())?;
    sock.listen(LISTEN_BACKLOG)?;
    Ok(sock.into())
}

/// Connect to the dispatcher on the loopback interface, preferring IPv4
/// and falling back to IPv6.
pub fn connect_local(port: u16) -> io::Result<TcpStream> {
    let v4 = SocketAddr::from(([127, 0, 0, 1], port));
    TcpStream::connect(v4).or_else(|v4_error| {
        log::debug!("IPv4 loopback connect failed ({}), trying IPv6", v4_error);
        let v6 = SocketAddr::from(([0u16, 0, 0, 0, 0, 0, 0, 1], port));
        TcpStream::connect(v6).map_err(|_| v4_error)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::thread;

    #[test]
    fn listener_accepts_a_local_connection() {
        // Port 0 lets the OS pick a free port.
        let listener = listen(0).unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).unwrap();
            buf
        });

        let mut client = connect_local(port).unwrap();
        client.write_all(b"ping").unwrap();
        assert_eq!(&server.join().unwrap(), b"ping");
    }

    #[test]
    fn connecting_to_a_dead_port_fails() {
        let listener = listen(0).unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(connect_local(port).is_err());
    }
}
