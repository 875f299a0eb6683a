use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{lookup_host, TcpStream};
use url::Url;

use super::addr::{Address, Host};
use super::types::{Command, ReplyCode, SocksError};
use super::wire::{encode_request, read_reply};

pub trait ProxyStream: AsyncRead + AsyncWrite + Send + Unpin {
    fn local_addr(&self) -> io::Result<SocketAddr>;
    fn peer_addr(&self) -> io::Result<SocketAddr>;
}

impl ProxyStream for TcpStream {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::local_addr(self)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }
}

pub type BoxedStream = Box<dyn ProxyStream>;

pub trait ProxyDial: Send + Sync {
    fn dial<'a>(&'a self, network: &'a str, address: &'a str)
        -> BoxFuture<'a, io::Result<BoxedStream>>;
}

pub trait Resolver: Send + Sync {
    fn lookup_ipv4<'a>(&'a self, host: &'a str) -> BoxFuture<'a, io::Result<Vec<Ipv4Addr>>>;
}

pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn lookup_ipv4<'a>(&'a self, host: &'a str) -> BoxFuture<'a, io::Result<Vec<Ipv4Addr>>> {
        Box::pin(async move {
            let addrs = lookup_host((host, 0)).await?;
            Ok(addrs
                .filter_map(|addr| match addr.ip() {
                    IpAddr::V4(ip) => Some(ip),
                    IpAddr::V6(_) => None,
                })
                .collect())
        })
    }
}

pub async fn system_dial(network: &str, address: &str) -> io::Result<BoxedStream> {
    let mut last_err = None;
    for addr in lookup_host(address).await? {
        let family_ok = match network {
            "tcp4" => addr.is_ipv4(),
            "tcp6" => addr.is_ipv6(),
            _ => true,
        };
        if !family_ok {
            continue;
        }
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(Box::new(stream)),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no suitable address for {address}"),
        )
    }))
}

fn check_network(network: &str) -> Result<(), SocksError> {
    match network {
        "tcp" | "tcp4" | "tcp6" => Ok(()),
        other => Err(SocksError::UnsupportedNetwork(other.to_string())),
    }
}

#[derive(Clone)]
pub struct Dialer {
    pub proxy_network: String,
    pub proxy_address: String,
    pub username: String,
    pub is_resolve: bool,
    pub timeout: Option<Duration>,
    pub proxy_dial: Option<Arc<dyn ProxyDial>>,
    pub resolver: Option<Arc<dyn Resolver>>,
}

impl std::fmt::Debug for Dialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialer")
            .field("proxy_network", &self.proxy_network)
            .field("proxy_address", &self.proxy_address)
            .field("username", &self.username)
            .field("is_resolve", &self.is_resolve)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Dialer {
    pub fn new(addr: &str) -> Result<Self, SocksError> {
        let url =
            Url::parse(addr).map_err(|_| SocksError::InvalidProxyUrl(addr.to_string()))?;
        let is_resolve = match url.scheme() {
            "socks4" => true,
            "socks4a" => false,
            scheme => return Err(SocksError::UnsupportedProtocol(scheme.to_string())),
        };
        let host = url
            .host_str()
            .ok_or_else(|| SocksError::InvalidProxyUrl(addr.to_string()))?;
        let port = url.port().unwrap_or(1080);
        Ok(Self {
            proxy_network: "tcp".to_string(),
            proxy_address: format!("{host}:{port}"),
            username: url.username().to_string(),
            is_resolve,
            timeout: None,
            proxy_dial: None,
            resolver: None,
        })
    }

    pub async fn dial(&self, network: &str, address: &str) -> Result<ProxyConn, SocksError> {
        check_network(network)?;
        let target = self.resolve_target(address).await?;
        let mut stream = self.dial_proxy().await?;
        match self.exchange(&mut stream, Command::Connect, &target).await {
            Ok(bound) => {
                debug!("connect to {target} granted via {}", self.proxy_address);
                Ok(ProxyConn::new(stream, bound, None))
            }
            Err(err) => {
                drop(stream);
                Err(err)
            }
        }
    }

    pub async fn listen(&self, network: &str, address: &str) -> Result<BindListener, SocksError> {
        check_network(network)?;
        let destination = self.resolve_target(address).await?;
        Ok(BindListener {
            dialer: self.clone(),
            destination,
        })
    }

    async fn resolve_target(&self, address: &str) -> Result<Address, SocksError> {
        let mut target = Address::parse(address)?;
        if self.is_resolve {
            if let Host::Domain(domain) = &target.host {
                if domain.is_empty() {
                    target.host = Host::Ipv4(Ipv4Addr::UNSPECIFIED);
                } else {
                    let addrs = match &self.resolver {
                        Some(resolver) => resolver.lookup_ipv4(domain).await?,
                        None => SystemResolver.lookup_ipv4(domain).await?,
                    };
                    let ip = addrs
                        .first()
                        .copied()
                        .ok_or_else(|| SocksError::NoIpv4Addresses(domain.clone()))?;
                    target.host = Host::Ipv4(ip);
                }
            }
        }
        Ok(target)
    }

    async fn dial_proxy(&self) -> Result<BoxedStream, SocksError> {
        let stream = match &self.proxy_dial {
            Some(dial) => {
                dial.dial(&self.proxy_network, &self.proxy_address)
                    .await?
            }
            None => system_dial(&self.proxy_network, &self.proxy_address).await?,
        };
        Ok(stream)
    }

    async fn exchange(
        &self,
        stream: &mut BoxedStream,
        command: Command,
        target: &Address,
    ) -> Result<SocketAddrV4, SocksError> {
        let run = async {
            stream
                .write_all(&encode_request(command, target, &self.username))
                .await?;
            let (code, bound) = read_reply(stream).await?;
            if code != ReplyCode::Granted {
                return Err(SocksError::RequestFailed(code));
            }
            Ok(bound)
        };
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, run).await.map_err(|_| {
                SocksError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "proxy handshake timed out",
                ))
            })?,
            None => run.await,
        }
    }
}

pub struct ProxyConn {
    stream: BoxedStream,
    bound_addr: SocketAddrV4,
    remote_addr: Option<SocketAddr>,
}

impl std::fmt::Debug for ProxyConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConn")
            .field("bound_addr", &self.bound_addr)
            .field("remote_addr", &self.remote_addr)
            .finish()
    }
}

impl ProxyConn {
    fn new(stream: BoxedStream, bound_addr: SocketAddrV4, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            stream,
            bound_addr,
            remote_addr,
        }
    }

    pub fn bound_addr(&self) -> SocketAddrV4 {
        self.bound_addr
    }

    pub fn into_inner(self) -> BoxedStream {
        self.stream
    }
}

impl AsyncRead for ProxyConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for ProxyConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

impl ProxyStream for ProxyConn {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self.remote_addr {
            Some(addr) => Ok(addr),
            None => self.stream.peer_addr(),
        }
    }
}

pub struct BindListener {
    dialer: Dialer,
    destination: Address,
}

impl BindListener {
    pub async fn accept(&self) -> Result<(ProxyConn, SocketAddr), SocksError> {
        let mut stream = self.dialer.dial_proxy().await?;
        let bound = self
            .dialer
            .exchange(&mut stream, Command::Bind, &self.destination)
            .await?;
        let (code, peer) = read_reply(&mut stream).await?;
        if code != ReplyCode::Granted {
            return Err(SocksError::RequestFailed(code));
        }
        debug!("bind at {bound} accepted peer {peer}");
        Ok((
            ProxyConn::new(stream, bound, Some(SocketAddr::V4(peer))),
            SocketAddr::V4(peer),
        ))
    }

    pub fn destination(&self) -> &Address {
        &self.destination
    }

    pub fn close(&self) {}
}
