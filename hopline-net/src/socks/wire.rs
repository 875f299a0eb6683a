use std::net::{Ipv4Addr, SocketAddrV4};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::addr::{Address, Host};
use super::io::read_nul_terminated;
use super::types::{Command, ReplyCode, SocksError, MAX_FIELD_LEN, SOCKS4_VERSION};

const SOCKS4A_MARKER: [u8; 4] = [0, 0, 0, 1];

fn is_socks4a_marker(ip: [u8; 4]) -> bool {
    ip[..3] == [0, 0, 0] && ip[3] != 0
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    pub destination: Address,
    pub username: String,
}

pub fn encode_request(command: Command, destination: &Address, username: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + username.len());
    buf.push(SOCKS4_VERSION);
    buf.push(command.as_byte());
    buf.extend_from_slice(&destination.port.to_be_bytes());
    match &destination.host {
        Host::Ipv4(ip) => {
            buf.extend_from_slice(&ip.octets());
            buf.extend_from_slice(username.as_bytes());
            buf.push(0x00);
        }
        Host::Domain(domain) => {
            buf.extend_from_slice(&SOCKS4A_MARKER);
            buf.extend_from_slice(username.as_bytes());
            buf.push(0x00);
            buf.extend_from_slice(domain.as_bytes());
            buf.push(0x00);
        }
    }
    buf
}

pub async fn read_request<R>(reader: &mut R) -> Result<Request, SocksError>
where
    R: AsyncRead + Unpin,
{
    let command = Command::from_byte(reader.read_u8().await?);
    let (destination, username) = read_addr_and_user(reader).await?;
    Ok(Request {
        command,
        destination,
        username,
    })
}

pub async fn read_addr_and_user<R>(reader: &mut R) -> Result<(Address, String), SocksError>
where
    R: AsyncRead + Unpin,
{
    let port = reader.read_u16().await?;
    let mut ip = [0u8; 4];
    reader.read_exact(&mut ip).await?;
    let username = read_nul_terminated(reader, MAX_FIELD_LEN).await?;
    let username = String::from_utf8(username)
        .map_err(|_| SocksError::InvalidRequest("username is not valid utf-8"))?;
    let host = if is_socks4a_marker(ip) {
        let domain = read_nul_terminated(reader, MAX_FIELD_LEN).await?;
        let domain = String::from_utf8(domain)
            .map_err(|_| SocksError::InvalidRequest("domain is not valid utf-8"))?;
        Host::Domain(domain)
    } else {
        Host::Ipv4(Ipv4Addr::from(ip))
    };
    Ok((Address { host, port }, username))
}

pub fn encode_reply(code: ReplyCode, bound: Option<SocketAddrV4>) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf[1] = code.as_byte();
    if let Some(addr) = bound {
        buf[2..4].copy_from_slice(&addr.port().to_be_bytes());
        buf[4..8].copy_from_slice(&addr.ip().octets());
    }
    buf
}

pub fn parse_reply(bytes: &[u8; 8]) -> Result<(ReplyCode, SocketAddrV4), SocksError> {
    if bytes[0] != 0x00 {
        return Err(SocksError::InvalidReply("first byte is not zero"));
    }
    let code = ReplyCode::from_byte(bytes[1]);
    let port = u16::from_be_bytes([bytes[2], bytes[3]]);
    let ip = Ipv4Addr::new(bytes[4], bytes[5], bytes[6], bytes[7]);
    Ok((code, SocketAddrV4::new(ip, port)))
}

pub async fn write_reply<W>(
    writer: &mut W,
    code: ReplyCode,
    bound: Option<SocketAddrV4>,
) -> Result<(), SocksError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_reply(code, bound)).await?;
    Ok(())
}

pub async fn read_reply<R>(reader: &mut R) -> Result<(ReplyCode, SocketAddrV4), SocksError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf).await?;
    parse_reply(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn encodes_ipv4_connect() {
        let destination = Address::parse("127.0.0.1:80").unwrap();
        let bytes = encode_request(Command::Connect, &destination, "");
        assert_eq!(
            bytes,
            vec![0x04, 0x01, 0x00, 0x50, 0x7f, 0x00, 0x00, 0x01, 0x00]
        );
        assert_eq!(bytes.len(), 8 + 1);
    }

    #[test]
    fn encodes_ipv4_connect_with_username() {
        let destination = Address::parse("127.0.0.1:80").unwrap();
        let bytes = encode_request(Command::Connect, &destination, "u");
        assert_eq!(
            bytes,
            vec![0x04, 0x01, 0x00, 0x50, 0x7f, 0x00, 0x00, 0x01, b'u', 0x00]
        );
    }

    #[test]
    fn encodes_domain_connect_as_socks4a() {
        let destination = Address::parse("example.com:80").unwrap();
        let bytes = encode_request(Command::Connect, &destination, "");
        assert_eq!(
            bytes,
            vec![
                0x04, 0x01, 0x00, 0x50, 0x00, 0x00, 0x00, 0x01, 0x00, b'e', b'x', b'a', b'm',
                b'p', b'l', b'e', b'.', b'c', b'o', b'm', 0x00,
            ]
        );
        assert_eq!(bytes.len(), 8 + 1 + "example.com".len() + 1);
        assert_eq!(&bytes[4..7], &[0, 0, 0]);
        assert_ne!(bytes[7], 0);
    }

    #[tokio::test]
    async fn request_roundtrip_ipv4() {
        let destination = Address::parse("10.1.2.3:8443").unwrap();
        let bytes = encode_request(Command::Bind, &destination, "operator");
        let request = read_request(&mut &bytes[1..]).await.unwrap();
        assert_eq!(request.command, Command::Bind);
        assert_eq!(request.destination, destination);
        assert_eq!(request.username, "operator");
    }

    #[tokio::test]
    async fn request_roundtrip_domain() {
        let destination = Address::parse("example.com:80").unwrap();
        let bytes = encode_request(Command::Connect, &destination, "u");
        let request = read_request(&mut &bytes[1..]).await.unwrap();
        assert_eq!(request.command, Command::Connect);
        assert_eq!(request.destination, destination);
        assert_eq!(request.username, "u");
    }

    #[tokio::test]
    async fn unknown_command_byte_is_carried_through() {
        let destination = Address::parse("127.0.0.1:80").unwrap();
        let bytes = encode_request(Command::Other(0x03), &destination, "");
        let request = read_request(&mut &bytes[1..]).await.unwrap();
        assert_eq!(request.command, Command::Other(0x03));
    }

    #[tokio::test]
    async fn rejects_oversized_username() {
        let mut bytes = vec![0x01, 0x00, 0x50, 0x7f, 0x00, 0x00, 0x01];
        bytes.extend_from_slice(&vec![b'a'; 300]);
        bytes.push(0x00);
        assert_matches!(
            read_request(&mut &bytes[..]).await,
            Err(SocksError::InvalidRequest(_))
        );
    }

    #[tokio::test]
    async fn short_request_is_an_io_error() {
        let bytes = [0x01u8, 0x00];
        assert_matches!(
            read_request(&mut &bytes[..]).await,
            Err(SocksError::Io(_))
        );
    }

    #[test]
    fn reply_is_eight_bytes_with_zeroed_address() {
        let bytes = encode_reply(ReplyCode::Rejected, None);
        assert_eq!(bytes, [0x00, 0x5b, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn reply_roundtrip() {
        let bound = SocketAddrV4::new(Ipv4Addr::new(192, 168, 0, 9), 4321);
        let bytes = encode_reply(ReplyCode::Granted, Some(bound));
        let (code, addr) = parse_reply(&bytes).unwrap();
        assert_eq!(code, ReplyCode::Granted);
        assert_eq!(addr, bound);
    }

    #[test]
    fn reply_rejects_nonzero_version_byte() {
        let bytes = [0x04, 0x5a, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert_matches!(parse_reply(&bytes), Err(SocksError::InvalidReply(_)));
    }
}
