use crate::error::OutputError;
use log::{trace, warn};
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Owns the primary output stream for one response. `send` consumes the
/// writer, so a response goes out once and can't be amended afterwards.
pub struct ResponseWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> ResponseWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Writes the framed response and flushes. The flush is attempted on
    /// every path, including after a failed write.
    pub async fn send(mut self, framed: &[u8]) -> Result<usize, OutputError> {
        let written = self.write_counted(framed).await;
        let flushed = self.inner.flush().await;
        match (written, flushed) {
            (Ok(n), Ok(())) => {
                trace!("wrote and flushed {} bytes", n);
                Ok(n)
            }
            (Ok(n), Err(e)) => Err(classify(n, e)),
            (Err((n, e)), flushed) => {
                if let Err(fe) = flushed {
                    warn!("error flushing output stream: {}", fe);
                }
                Err(classify(n, e))
            }
        }
    }

    // Returns how many bytes made it out alongside any error
    async fn write_counted(&mut self, buf: &[u8]) -> Result<usize, (usize, io::Error)> {
        let mut written = 0;
        while written < buf.len() {
            match self.inner.write(&buf[written..]).await {
                Ok(0) => {
                    return Err((
                        written,
                        io::Error::new(io::ErrorKind::WriteZero, "output stream closed"),
                    ))
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err((written, e)),
            }
        }
        Ok(written)
    }
}

fn classify(written: usize, source: io::Error) -> OutputError {
    if written == 0 {
        OutputError::NothingWritten(source)
    } else {
        OutputError::Truncated { written, source }
    }
}
