use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub trait BytesPool: Send + Sync {
    fn get(&self) -> Vec<u8>;
    fn put(&self, buf: Vec<u8>);
}

const BUFFER_SIZE: usize = 32 * 1024;

fn take_buffer(pool: Option<&dyn BytesPool>) -> Vec<u8> {
    let mut buf = pool.map(|pool| pool.get()).unwrap_or_default();
    if buf.len() < BUFFER_SIZE {
        buf.resize(BUFFER_SIZE, 0);
    }
    buf
}

pub async fn relay<A, B>(a: A, b: B, pool: Option<&dyn BytesPool>) -> io::Result<()>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);
    let ((buf_a, a_to_b), (buf_b, b_to_a)) = tokio::join!(
        copy_half(a_read, b_write, take_buffer(pool)),
        copy_half(b_read, a_write, take_buffer(pool)),
    );
    if let Some(pool) = pool {
        pool.put(buf_a);
        pool.put(buf_b);
    }
    a_to_b.and(b_to_a)
}

async fn copy_half<R, W>(mut src: R, mut dst: W, mut buf: Vec<u8>) -> (Vec<u8>, io::Result<()>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = copy_until_eof(&mut src, &mut dst, &mut buf).await;
    (buf, result)
}

async fn copy_until_eof<R, W>(src: &mut R, dst: &mut W, buf: &mut [u8]) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let n = src.read(buf).await?;
        if n == 0 {
            return dst.shutdown().await;
        }
        dst.write_all(&buf[..n]).await?;
    }
}
