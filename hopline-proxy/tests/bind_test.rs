use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;

use hopline_net::Dialer;
use hopline_proxy::Server;

async fn spawn_proxy(server: Server) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { server.serve(listener).await });
    addr
}

async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn exchange_via(addr: SocketAddr, payload: &[u8]) {
    for _ in 0..100 {
        let attempt = async {
            let mut stream = TcpStream::connect(addr).await.ok()?;
            stream.write_all(payload).await.ok()?;
            let mut buf = vec![0u8; payload.len()];
            stream.read_exact(&mut buf).await.ok()?;
            Some(buf)
        };
        if let Some(buf) = attempt.await {
            assert_eq!(buf, payload);
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("no successful exchange with {addr}");
}

#[tokio::test]
async fn bind_round_trip() {
    let proxy = spawn_proxy(Server::new()).await;
    let port = free_port().await;
    let bind_addr = SocketAddr::from(([127, 0, 0, 1], port));

    let dialer = Dialer::new(&format!("socks4://{proxy}")).unwrap();
    let listener = dialer
        .listen("tcp", &format!("127.0.0.1:{port}"))
        .await
        .unwrap();

    let acceptor = tokio::spawn(async move {
        let (mut conn, peer) = listener.accept().await.unwrap();
        assert_eq!(*conn.bound_addr().ip(), Ipv4Addr::LOCALHOST);
        assert_eq!(conn.bound_addr().port(), port);
        assert!(matches!(peer, SocketAddr::V4(addr) if *addr.ip() == Ipv4Addr::LOCALHOST));
        let mut buf = [0u8; 4];
        conn.read_exact(&mut buf).await.unwrap();
        conn.write_all(&buf).await.unwrap();
    });

    exchange_via(bind_addr, b"ping").await;
    acceptor.await.unwrap();
}

#[tokio::test]
async fn bind_with_empty_host_uses_unspecified_address() {
    let proxy = spawn_proxy(Server::new()).await;
    let port = free_port().await;
    let bind_addr = SocketAddr::from(([127, 0, 0, 1], port));

    let dialer = Dialer::new(&format!("socks4://{proxy}")).unwrap();
    let listener = dialer.listen("tcp", &format!(":{port}")).await.unwrap();

    let acceptor = tokio::spawn(async move {
        let (mut conn, _) = listener.accept().await.unwrap();
        assert_eq!(*conn.bound_addr().ip(), Ipv4Addr::UNSPECIFIED);
        assert_eq!(conn.bound_addr().port(), port);
        let mut buf = [0u8; 4];
        conn.read_exact(&mut buf).await.unwrap();
        conn.write_all(&buf).await.unwrap();
    });

    exchange_via(bind_addr, b"ping").await;
    acceptor.await.unwrap();
}

#[tokio::test]
async fn bind_serves_serial_and_parallel_peers() {
    let proxy = spawn_proxy(Server::new()).await;
    let port = free_port().await;
    let bind_addr = SocketAddr::from(([127, 0, 0, 1], port));

    let dialer = Dialer::new(&format!("socks4://{proxy}")).unwrap();
    let listener = dialer
        .listen("tcp", &format!("127.0.0.1:{port}"))
        .await
        .unwrap();

    let acceptor = tokio::spawn(async move {
        for _ in 0..8 {
            let (mut conn, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match conn.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if conn.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    for i in 0..3 {
        exchange_via(bind_addr, format!("serial {i}").as_bytes()).await;
    }

    let mut peers = Vec::new();
    for i in 0..5 {
        peers.push(tokio::spawn(async move {
            exchange_via(bind_addr, format!("parallel {i}").as_bytes()).await;
        }));
    }
    for peer in peers {
        peer.await.unwrap();
    }

    drop(acceptor);
}
