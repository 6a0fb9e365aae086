//! Helpers shared by unit tests

use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, TcpStream};

/// A listener whose accept queue is full, so further connects hang.
/// The returned streams keep the queue occupied and must outlive the test.
pub(crate) async fn saturated_listener() -> (TcpListener, Vec<TcpStream>, u16) {
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let listener = socket.listen(1).unwrap();
    let addr = listener.local_addr().unwrap();

    let mut held = Vec::new();
    for _ in 0..64 {
        match tokio::time::timeout(Duration::from_millis(200), TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => held.push(stream),
            Ok(Err(e)) => panic!("connect to backlogged listener failed: {}", e),
            Err(_) => return (listener, held, addr.port()),
        }
    }
    panic!("accept queue never filled");
}
