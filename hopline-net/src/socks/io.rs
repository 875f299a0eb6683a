use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use super::types::SocksError;

pub(crate) async fn read_nul_terminated<R>(
    reader: &mut R,
    limit: usize,
) -> Result<Vec<u8>, SocksError>
where
    R: AsyncRead + Unpin,
{
    let mut out = Vec::new();
    loop {
        let byte = reader.read_u8().await?;
        if byte == 0 {
            return Ok(out);
        }
        if out.len() == limit {
            return Err(SocksError::InvalidRequest("field exceeds 256 bytes"));
        }
        out.push(byte);
    }
}

pub fn is_closed_conn_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}
