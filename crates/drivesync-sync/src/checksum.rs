//! Streaming MD5 checksums
//!
//! Downloads are hashed while the bytes flow through, so a staged file is
//! verified without reading it a second time. Upload bodies are already in
//! memory and go through [`hash_bytes`].

use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use md5::{Digest, Md5};
use tokio::io::{AsyncRead, ReadBuf};

use drivesync_core::domain::ContentHash;

use crate::{Result, SyncError};

/// Reader wrapper that feeds everything it reads into an MD5 digest
pub struct ChecksumReader<R> {
    inner: R,
    hasher: Md5,
}

impl<R: AsyncRead + Unpin> ChecksumReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Md5::new(),
        }
    }

    /// Checksum of everything read so far
    pub fn finalize(self) -> ContentHash {
        ContentHash::from_digest(&self.hasher.finalize())
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ChecksumReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            this.hasher.update(&buf.filled()[before..]);
        }
        poll
    }
}

/// MD5 of an in-memory buffer
pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    ContentHash::from_digest(&Md5::digest(bytes))
}

/// MD5 of a local file, streamed
pub async fn hash_file(path: &Path) -> Result<ContentHash> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(SyncError::local_io(path))?;
    let mut reader = ChecksumReader::new(file);
    tokio::io::copy(&mut reader, &mut tokio::io::sink())
        .await
        .map_err(SyncError::local_io(path))?;
    Ok(reader.finalize())
}
