mod socks;

pub use socks::{
    encode_reply, encode_request, is_closed_conn_error, parse_reply, read_addr_and_user,
    read_reply, read_request, system_dial, write_reply, Address, BindListener, BoxedStream,
    Command, Dialer, Host, ProxyConn, ProxyDial, ProxyStream, ReplyCode, Request, Resolver,
    SocksError, SystemResolver, MAX_FIELD_LEN, SOCKS4_VERSION,
};
