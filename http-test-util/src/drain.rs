use bytes::Buf;
use hyper::body::Body;
use pin_project_lite::pin_project;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

pin_project! {
    /// Reads a body until its last frame, resolving to the number of payload bytes.
    pub struct DrainBodyFuture<B: Body> {
        #[pin]
        body: B,
        total_len: usize,
    }
}

impl<B> DrainBodyFuture<B>
where
    B: Body,
{
    #[inline]
    #[must_use]
    pub fn new(body: B) -> Self {
        Self { body, total_len: 0 }
    }
}

impl<B> Future for DrainBodyFuture<B>
where
    B: Body,
    B::Error: Display,
{
    type Output = Result<usize, anyhow::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slf = self.project();
        loop {
            let Some(next_res) = ready!(slf.body.as_mut().poll_frame(cx)) else {
                return Poll::Ready(Ok(*slf.total_len));
            };
            let frame = match next_res {
                Ok(frame) => frame,
                Err(e) => {
                    return Poll::Ready(Err(anyhow::anyhow!("Failed to poll next frame: {e}")));
                }
            };
            // Trailers carry no payload.
            if let Ok(data) = frame.into_data() {
                *slf.total_len += data.remaining();
            }
            if slf.body.is_end_stream() {
                return Poll::Ready(Ok(*slf.total_len));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{byte_body, empty_body};

    #[tokio::test]
    async fn counts_whole_body() {
        let len = DrainBodyFuture::new(byte_body(vec![7u8; 4096])).await.unwrap();
        assert_eq!(len, 4096);
    }

    #[tokio::test]
    async fn empty_body_drains_immediately() {
        let len = DrainBodyFuture::new(empty_body()).await.unwrap();
        assert_eq!(len, 0);
    }
}
