use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use log::{debug, error};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio_util::sync::CancellationToken;

use hopline_net::{
    is_closed_conn_error, read_addr_and_user, system_dial, write_reply, Address, BoxedStream,
    Command, Host, ProxyDial, ReplyCode, Request, SocksError, SOCKS4_VERSION,
};

use crate::auth::Authentication;
use crate::error::ProxyError;
use crate::relay::{relay, BytesPool};

#[derive(Clone, Default)]
pub struct Server {
    pub authentication: Option<Arc<dyn Authentication>>,
    pub proxy_dial: Option<Arc<dyn ProxyDial>>,
    pub bytes_pool: Option<Arc<dyn BytesPool>>,
    pub shutdown: CancellationToken,
}

impl Server {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn listen_and_serve(&self, network: &str, addr: &str) -> Result<(), ProxyError> {
        if !matches!(network, "tcp" | "tcp4" | "tcp6") {
            return Err(SocksError::UnsupportedNetwork(network.to_string()).into());
        }
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> Result<(), ProxyError> {
        loop {
            let accepted = select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                accepted = listener.accept() => accepted,
            };
            let (stream, _) = accepted?;
            let server = self.clone();
            tokio::spawn(async move { server.serve_conn(stream).await });
        }
    }

    pub async fn serve_conn(&self, stream: TcpStream) {
        let peer = match stream.peer_addr() {
            Ok(addr) => addr.to_string(),
            Err(_) => "unknown".to_string(),
        };
        debug!("client {peer} connected");
        if let Err(err) = self.handle_conn(stream).await {
            if !is_peer_closed(&err) {
                error!("client {peer}: {err}");
            }
        }
        debug!("client {peer} disconnected");
    }

    async fn handle_conn(&self, mut client: TcpStream) -> Result<(), ProxyError> {
        let version = client.read_u8().await?;
        if version != SOCKS4_VERSION {
            return Err(SocksError::UnsupportedVersion(version).into());
        }
        let command = Command::from_byte(client.read_u8().await?);
        let (destination, username) = match read_addr_and_user(&mut client).await {
            Ok(parts) => parts,
            Err(err) => {
                write_reply(&mut client, ReplyCode::Rejected, None).await?;
                return Err(err.into());
            }
        };
        let request = Request {
            command,
            destination,
            username,
        };
        if let Some(auth) = &self.authentication {
            if !auth.allow(request.command, &request.username) {
                write_reply(&mut client, ReplyCode::InvalidUser, None).await?;
                return Err(ProxyError::Runtime(
                    "user authentication failed".to_string(),
                ));
            }
        }
        match request.command {
            Command::Connect => self.handle_connect(client, &request).await,
            Command::Bind => self.handle_bind(client, &request).await,
            Command::Other(value) => {
                write_reply(&mut client, ReplyCode::Rejected, None).await?;
                Err(ProxyError::Runtime(format!("unsupported command: {value}")))
            }
        }
    }

    async fn handle_connect(
        &self,
        mut client: TcpStream,
        request: &Request,
    ) -> Result<(), ProxyError> {
        let destination = request.destination.to_string();
        let target = match self.dial_target(&destination).await {
            Ok(target) => target,
            Err(err) => {
                write_reply(&mut client, ReplyCode::Rejected, None).await?;
                return Err(ProxyError::Runtime(format!(
                    "connect to {destination} failed: {err}"
                )));
            }
        };
        let bound = match target.local_addr()? {
            SocketAddr::V4(addr) => addr,
            SocketAddr::V6(addr) => {
                return Err(ProxyError::Runtime(format!(
                    "connect to {destination} failed: local address {addr} is not ipv4"
                )));
            }
        };
        write_reply(&mut client, ReplyCode::Granted, Some(bound)).await?;
        debug!("tunnel open to {destination}");
        self.run_relay(client, target).await
    }

    async fn handle_bind(
        &self,
        mut client: TcpStream,
        request: &Request,
    ) -> Result<(), ProxyError> {
        let destination = request.destination.to_string();
        let listener = match bind_listener(&request.destination).await {
            Ok(listener) => listener,
            Err(err) => {
                write_reply(&mut client, ReplyCode::Rejected, None).await?;
                return Err(ProxyError::Runtime(format!(
                    "bind for {destination} failed: {err}"
                )));
            }
        };
        let bound = match listener.local_addr()? {
            SocketAddr::V4(addr) => addr,
            SocketAddr::V6(addr) => {
                return Err(ProxyError::Runtime(format!(
                    "bind for {destination} failed: local address {addr} is not ipv4"
                )));
            }
        };
        write_reply(&mut client, ReplyCode::Granted, Some(bound)).await?;

        let accepted = select! {
            _ = self.shutdown.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted,
        };
        drop(listener);
        let (target, peer_addr) = match accepted {
            Ok(accepted) => accepted,
            Err(err) => {
                write_reply(&mut client, ReplyCode::Rejected, None).await?;
                return Err(ProxyError::Runtime(format!(
                    "accept for {destination} failed: {err}"
                )));
            }
        };
        let peer = match peer_addr {
            SocketAddr::V4(addr) => addr,
            SocketAddr::V6(addr) => {
                return Err(ProxyError::Runtime(format!(
                    "accept for {destination} failed: peer address {addr} is not ipv4"
                )));
            }
        };
        write_reply(&mut client, ReplyCode::Granted, Some(peer)).await?;
        debug!("bind tunnel open from {peer}");
        self.run_relay(client, target).await
    }

    async fn dial_target(&self, address: &str) -> io::Result<BoxedStream> {
        match &self.proxy_dial {
            Some(dial) => dial.dial("tcp", address).await,
            None => system_dial("tcp", address).await,
        }
    }

    async fn run_relay<A, B>(&self, a: A, b: B) -> Result<(), ProxyError>
    where
        A: AsyncRead + AsyncWrite + Unpin,
        B: AsyncRead + AsyncWrite + Unpin,
    {
        select! {
            _ = self.shutdown.cancelled() => Ok(()),
            result = relay(a, b, self.bytes_pool.as_deref()) => {
                result.map_err(ProxyError::from)
            }
        }
    }
}

async fn bind_listener(destination: &Address) -> io::Result<TcpListener> {
    match &destination.host {
        Host::Ipv4(ip) => TcpListener::bind((*ip, destination.port)).await,
        Host::Domain(domain) if domain.is_empty() => {
            TcpListener::bind((Ipv4Addr::UNSPECIFIED, destination.port)).await
        }
        Host::Domain(domain) => TcpListener::bind((domain.as_str(), destination.port)).await,
    }
}

fn is_peer_closed(err: &ProxyError) -> bool {
    match err {
        ProxyError::Io(err) => is_closed_conn_error(err),
        ProxyError::Socks(SocksError::Io(err)) => is_closed_conn_error(err),
        _ => false,
    }
}
