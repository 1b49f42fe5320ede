use core::fmt;
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::{cmp, mem};

use futures::Stream;
use hyper::body::HttpBody;
use tokio::io::{AsyncRead, ReadBuf};

pub use hyper::body::Bytes;

/// An HTTP request type that wraps hyper's Request with our custom Body type.
pub type Request = hyper::Request<Body>;

/// An HTTP response.
///
/// ```
/// # use quay::{Response, Body};
/// let response = Response::new(Body::new("Hello world!"));
/// ```
///
/// Or with a [`ResponseBuilder`]:
///
/// ```
/// # use quay::{ResponseBuilder, Body};
/// let response = ResponseBuilder::new()
///     .status(404)
///     .header("X-Custom-Foo", "Bar")
///     .body(Body::empty())
///     .unwrap();
/// ```
pub type Response = hyper::Response<Body>;

/// A builder for constructing HTTP responses with a fluent API.
pub type ResponseBuilder = hyper::http::response::Builder;

/// An empty-bodied response with only a status.
pub(crate) fn status_response(status: hyper::StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

/// A streaming HTTP body used for both requests and responses.
///
/// Response bodies for files are backed by a [`FileStream`], which hyper
/// polls only when the connection can take more bytes.
pub struct Body(pub(crate) hyper::Body);

impl Body {
    /// Create a body from a string or bytes.
    ///
    /// ```rust
    /// # use quay::Body;
    /// let string = Body::new("Hello world!");
    /// let bytes = Body::new(vec![0, 1, 0, 1, 0]);
    /// ```
    pub fn new(data: impl Into<Bytes>) -> Body {
        Body(hyper::Body::from(data.into()))
    }

    /// Create an empty body.
    pub fn empty() -> Body {
        Body(hyper::Body::empty())
    }

    /// Create a body that streams a window of a file.
    pub fn file(stream: FileStream) -> Body {
        Body(hyper::Body::wrap_stream(stream))
    }

    /// Unwraps the underlying hyper body.
    pub fn into_inner(self) -> hyper::Body {
        self.0
    }
}

impl<T> From<T> for Body
where
    Bytes: From<T>,
{
    fn from(data: T) -> Body {
        Body::new(data)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl HttpBody for Body {
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_data(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Self::Data, Self::Error>>> {
        Pin::new(&mut self.0).poll_data(cx)
    }

    fn poll_trailers(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<hyper::HeaderMap>, Self::Error>> {
        Pin::new(&mut self.0).poll_trailers(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.0.is_end_stream()
    }

    fn size_hint(&self) -> hyper::body::SizeHint {
        HttpBody::size_hint(&self.0)
    }
}

/// Largest chunk read from disk per poll.
const CAP: usize = 64 * 1024;

/// A finite, single-pass stream of byte chunks from one window of a file.
///
/// Reading happens only when the stream is polled, so a slow client stalls
/// the disk reads instead of buffering the file in memory. The file handle
/// is released as soon as the window is exhausted, a read fails (the error
/// is yielded once, then the stream ends), or the stream is dropped because
/// the connection went away.
pub struct FileStream {
    file: Option<tokio::fs::File>,
    remaining: u64,
    buf: Vec<u8>,
    path: PathBuf,
}

impl FileStream {
    /// Opens `path` and positions it at `start`, yielding `len` bytes.
    ///
    /// Opening and seeking are blocking calls; reads are not.
    pub fn open(path: &Path, start: u64, len: u64) -> io::Result<Self> {
        let mut file = std::fs::File::open(path)?;
        if start > 0 {
            file.seek(SeekFrom::Start(start))?;
        }

        Ok(Self {
            file: Some(tokio::fs::File::from_std(file)),
            remaining: len,
            buf: Vec::new(),
            path: path.to_path_buf(),
        })
    }

    /// Bytes not yet yielded.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    fn release(&mut self) {
        self.file.take();
    }
}

impl Stream for FileStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        if this.remaining == 0 {
            this.release();
            return Poll::Ready(None);
        }
        let Some(file) = this.file.as_mut() else {
            return Poll::Ready(None);
        };

        let want = cmp::min(this.remaining, CAP as u64) as usize;
        if this.buf.len() < want {
            this.buf.resize(CAP, 0);
        }

        let mut read_buf = ReadBuf::new(&mut this.buf[..want]);
        let polled = Pin::new(file).poll_read(cx, &mut read_buf);
        let filled = match polled {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Err(err)) => {
                log::error!("reading {} failed: {}", this.path.display(), err);
                this.release();
                return Poll::Ready(Some(Err(err)));
            }
            Poll::Ready(Ok(())) => read_buf.filled().len(),
        };

        if filled == 0 {
            this.release();
            let err = io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} ended {} bytes early", this.path.display(), this.remaining),
            );
            log::error!("{err}");
            return Poll::Ready(Some(Err(err)));
        }

        this.remaining -= filled as u64;
        let rest = this.buf.split_off(filled);
        let chunk = mem::replace(&mut this.buf, rest);
        Poll::Ready(Some(Ok(Bytes::from(chunk))))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.file.is_none() {
            return (0, Some(0));
        }
        let chunks = (self.remaining as usize + CAP - 1) / CAP;
        (chunks, Some(chunks))
    }
}

impl Drop for FileStream {
    fn drop(&mut self) {
        if self.file.is_some() && self.remaining > 0 {
            log::debug!(
                "stream for {} dropped with {} bytes unsent",
                self.path.display(),
                self.remaining
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    /// Tests the creation of a `Body` from a string and verifies its content.
    #[tokio::test]
    async fn test_body_creation() {
        let body = Body::new("Hello World!");
        let bytes = hyper::body::to_bytes(body).await.unwrap();
        assert_eq!(&bytes[..], b"Hello World!");
    }

    /// Tests the creation of an empty `Body` and ensures it has no content.
    #[tokio::test]
    async fn test_empty_body() {
        let body = Body::empty();
        assert!(body.is_end_stream());
        assert!(hyper::body::to_bytes(body).await.unwrap().is_empty());
    }

    /// Tests the `ResponseBuilder` by creating a response and verifying its status and headers.
    #[test]
    fn test_response_builder() {
        let response = ResponseBuilder::new()
            .status(200)
            .header("Content-Type", "text/plain")
            .body(Body::new("OK"))
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.headers().get("Content-Type").unwrap(), "text/plain");
    }

    #[tokio::test]
    async fn test_file_stream_whole_file() {
        let file = temp_file(b"0123456789");
        let stream = FileStream::open(file.path(), 0, 10).unwrap();

        let bytes = hyper::body::to_bytes(Body::file(stream)).await.unwrap();
        assert_eq!(&bytes[..], b"0123456789");
    }

    #[tokio::test]
    async fn test_file_stream_window() {
        let file = temp_file(b"0123456789");
        let stream = FileStream::open(file.path(), 3, 4).unwrap();

        let bytes = hyper::body::to_bytes(Body::file(stream)).await.unwrap();
        assert_eq!(&bytes[..], b"3456");
    }

    /// Large files arrive in bounded chunks rather than one buffer.
    #[tokio::test]
    async fn test_file_stream_chunks_are_bounded() {
        let contents = vec![7u8; CAP * 2 + 10];
        let file = temp_file(&contents);
        let mut stream = FileStream::open(file.path(), 0, contents.len() as u64).unwrap();

        let mut total = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            assert!(chunk.len() <= CAP);
            total += chunk.len();
        }
        assert_eq!(total, contents.len());
        assert_eq!(stream.remaining(), 0);
        assert!(stream.file.is_none());
    }

    /// A window past the end of a truncated file ends in an error, once.
    #[tokio::test]
    async fn test_file_stream_reports_short_file() {
        let file = temp_file(b"abc");
        let mut stream = FileStream::open(file.path(), 0, 10).unwrap();

        assert_eq!(&stream.next().await.unwrap().unwrap()[..], b"abc");
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(stream.next().await.is_none());
        assert!(stream.file.is_none());
    }

    /// Dropping a stream mid-window stops reading and closes the file.
    #[tokio::test]
    async fn test_file_stream_dropped_mid_window() {
        let contents = vec![1u8; CAP * 3];
        let file = temp_file(&contents);
        let mut stream = FileStream::open(file.path(), 0, contents.len() as u64).unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.len(), CAP);
        assert_eq!(stream.remaining(), (CAP * 2) as u64);
        assert!(stream.file.is_some());
        drop(stream);

        let path = file.path().to_path_buf();
        std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        file.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(FileStream::open(&dir.path().join("missing"), 0, 1).is_err());
    }
}
