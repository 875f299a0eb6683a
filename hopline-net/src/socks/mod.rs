mod addr;
mod client;
mod io;
mod types;
mod wire;

pub use addr::{Address, Host};
pub use client::{
    system_dial, BindListener, BoxedStream, Dialer, ProxyConn, ProxyDial, ProxyStream, Resolver,
    SystemResolver,
};
pub use io::is_closed_conn_error;
pub use types::{Command, ReplyCode, SocksError, MAX_FIELD_LEN, SOCKS4_VERSION};
pub use wire::{
    encode_reply, encode_request, parse_reply, read_addr_and_user, read_reply, read_request,
    write_reply, Request,
};
