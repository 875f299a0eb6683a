use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

use crate::auth::UserAuth;
use crate::config::{ListenConfig, ProxyConfig};
use crate::error::ProxyError;
use crate::server::Server;

pub struct SimpleServer {
    server: Server,
    config: ProxyConfig,
    local_addr: Option<SocketAddr>,
    task: Option<JoinHandle<Result<(), ProxyError>>>,
}

impl std::fmt::Debug for SimpleServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleServer")
            .field("config", &self.config)
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

impl SimpleServer {
    pub fn new(addr: &str) -> Result<Self, ProxyError> {
        let url = Url::parse(addr)
            .map_err(|err| ProxyError::Config(format!("invalid proxy url '{addr}': {err}")))?;
        match url.scheme() {
            "socks4" | "socks4a" => {}
            scheme => {
                return Err(ProxyError::Config(format!(
                    "unsupported protocol '{scheme}'"
                )));
            }
        }
        let host = url
            .host_str()
            .ok_or_else(|| ProxyError::Config(format!("invalid proxy url '{addr}': no host")))?;
        let port = url.port().unwrap_or(1080);
        let username = match url.username() {
            "" => None,
            name => Some(name.to_string()),
        };
        Ok(Self::from_config(ProxyConfig {
            listen: ListenConfig {
                host: host.to_string(),
                port,
            },
            username,
        }))
    }

    pub fn from_config(config: ProxyConfig) -> Self {
        let mut server = Server::new();
        if let Some(username) = &config.username {
            server.authentication = Some(Arc::new(UserAuth::new(username.clone())));
        }
        Self {
            server,
            config,
            local_addr: None,
            task: None,
        }
    }

    pub fn server_mut(&mut self) -> &mut Server {
        &mut self.server
    }

    pub async fn run(&mut self) -> Result<(), ProxyError> {
        let listener = self.bind().await?;
        self.server.serve(listener).await
    }

    pub async fn start(&mut self) -> Result<(), ProxyError> {
        let listener = self.bind().await?;
        let server = self.server.clone();
        self.task = Some(tokio::spawn(async move { server.serve(listener).await }));
        Ok(())
    }

    async fn bind(&mut self) -> Result<TcpListener, ProxyError> {
        let listener = TcpListener::bind(self.config.listen.addr()).await?;
        self.local_addr = Some(listener.local_addr()?);
        Ok(listener)
    }

    pub fn close(&self) {
        self.server.shutdown.cancel();
    }

    pub async fn wait(&mut self) -> Result<(), ProxyError> {
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|err| ProxyError::Runtime(err.to_string()))?,
            None => Ok(()),
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn proxy_url(&self) -> String {
        let addr = match self.local_addr {
            Some(addr) => addr.to_string(),
            None => self.config.listen.addr(),
        };
        match &self.config.username {
            Some(username) => format!("socks4://{username}@{addr}"),
            None => format!("socks4://{addr}"),
        }
    }
}
