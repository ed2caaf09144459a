//! Download progress reporting.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

/// Callback invoked with the fraction of the download completed so far.
///
/// Fractions are non-decreasing and end with exactly `1.0` at end of stream.
/// When the content length is unknown the sentinel
/// [`UNKNOWN_LENGTH`](crate::progress::UNKNOWN_LENGTH) is reported for every
/// chunk before the final `1.0`.
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Sentinel reported while downloading a body of unknown length.
pub const UNKNOWN_LENGTH: f64 = -1.0;

/// Stream adapter that counts the bytes flowing through it and reports the
/// completed fraction to an optional callback.
pub struct ProgressStream<S> {
    inner: S,
    callback: Option<ProgressCallback>,
    content_length: Option<u64>,
    downloaded: u64,
    finished: bool,
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, content_length: Option<u64>, callback: Option<ProgressCallback>) -> Self {
        Self { inner, callback, content_length, downloaded: 0, finished: false }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.downloaded += chunk.len() as u64;
                if let Some(callback) = &this.callback {
                    match this.content_length {
                        Some(total) if total > 0 => {
                            callback(this.downloaded as f64 / total as f64);
                        }
                        _ => callback(UNKNOWN_LENGTH),
                    }
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => Poll::Ready(Some(Err(err))),
            Poll::Ready(None) => {
                // The terminal 1.0 fires exactly once, at end of stream.
                if !this.finished {
                    this.finished = true;
                    if let Some(callback) = &this.callback {
                        callback(1.0);
                    }
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
