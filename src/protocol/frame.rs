//! Length-prefixed message frames.
//!
//! Every request and response on a Kafka connection is an INT32 size followed by that many bytes.

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Bytes read per step, a peer claiming a huge frame has to actually send it before we allocate it.
const READ_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReadFrameError {
    #[error("Cannot read data: {0}")]
    IO(#[from] std::io::Error),

    #[error("Negative message size: {size}")]
    NegativeMessageSize { size: i32 },

    #[error("Message too large, limit is {limit} bytes but got {actual} bytes")]
    MessageTooLarge { limit: usize, actual: usize },
}

#[async_trait]
pub trait AsyncMessageRead {
    async fn read_message(&mut self, max_message_size: usize) -> Result<Vec<u8>, ReadFrameError>;
}

#[async_trait]
impl<R> AsyncMessageRead for R
where
    R: AsyncRead + Send + Unpin,
{
    async fn read_message(&mut self, max_message_size: usize) -> Result<Vec<u8>, ReadFrameError> {
        let mut len_buf = [0u8; 4];
        self.read_exact(&mut len_buf).await?;
        let len = i32::from_be_bytes(len_buf);
        let len =
            usize::try_from(len).map_err(|_| ReadFrameError::NegativeMessageSize { size: len })?;

        if len > max_message_size {
            return Err(ReadFrameError::MessageTooLarge {
                limit: max_message_size,
                actual: len,
            });
        }

        let mut buf = Vec::with_capacity(len.min(READ_CHUNK_SIZE));
        let mut chunk = vec![0u8; len.min(READ_CHUNK_SIZE)];
        while buf.len() < len {
            let n = (len - buf.len()).min(chunk.len());
            self.read_exact(&mut chunk[..n]).await?;
            buf.extend_from_slice(&chunk[..n]);
        }

        Ok(buf)
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WriteFrameError {
    #[error("Cannot write data: {0}")]
    IO(#[from] std::io::Error),

    #[error("Message too large: {size}")]
    TooLarge { size: usize },
}

#[async_trait]
pub trait AsyncMessageWrite {
    async fn write_message(&mut self, msg: &[u8]) -> Result<(), WriteFrameError>;
}

#[async_trait]
impl<W> AsyncMessageWrite for W
where
    W: AsyncWrite + Send + Unpin,
{
    async fn write_message(&mut self, msg: &[u8]) -> Result<(), WriteFrameError> {
        let len =
            i32::try_from(msg.len()).map_err(|_| WriteFrameError::TooLarge { size: msg.len() })?;

        self.write_all(&len.to_be_bytes()).await?;
        self.write_all(msg).await?;
        self.flush().await?;

        Ok(())
    }
}
