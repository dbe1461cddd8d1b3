use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use proxy_core::conn::Transport;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

/// An in-memory [`Transport`] backed by one half of a [`tokio::io::duplex`]
/// pair, so `server`'s reactor can be driven against a client/server pair
/// of these without binding a real socket.
///
/// `try_read`/`try_write` poll the underlying `AsyncRead`/`AsyncWrite`
/// with a no-op waker rather than `.await`ing: the point of the double is
/// to behave exactly like `TcpStream::try_read`/`try_write` (return
/// `WouldBlock` instead of suspending), and `DuplexStream` only exposes
/// the `poll_*` surface directly.
pub struct DuplexTransport {
    stream: DuplexStream,
}

impl DuplexTransport {
    fn poll_cx() -> Context<'static> {
        Context::from_waker(noop_waker())
    }
}

fn noop_waker() -> &'static Waker {
    // `Waker::noop` was stabilised in Rust 1.85; this crate's MSRV is
    // newer, so no `futures`-crate dependency is needed just for a
    // throwaway waker.
    Waker::noop()
}

impl Transport for DuplexTransport {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut read_buf = ReadBuf::new(buf);
        let mut cx = Self::poll_cx();
        match Pin::new(&mut self.stream).poll_read(&mut cx, &mut read_buf) {
            Poll::Ready(Ok(())) => Ok(read_buf.filled().len()),
            Poll::Ready(Err(e)) => Err(e),
            Poll::Pending => Err(io::Error::from(io::ErrorKind::WouldBlock)),
        }
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut cx = Self::poll_cx();
        match Pin::new(&mut self.stream).poll_write(&mut cx, buf) {
            Poll::Ready(result) => result,
            Poll::Pending => Err(io::Error::from(io::ErrorKind::WouldBlock)),
        }
    }
}

/// Builds a connected pair of [`DuplexTransport`]s, each side's writes
/// showing up as the other's reads, buffered up to `capacity` bytes
/// before `try_write` reports `WouldBlock`.
#[must_use]
pub fn duplex_transport_pair(capacity: usize) -> (DuplexTransport, DuplexTransport) {
    let (a, b) = tokio::io::duplex(capacity);
    (DuplexTransport { stream: a }, DuplexTransport { stream: b })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let (mut a, mut b) = duplex_transport_pair(1024);
        assert_eq!(a.try_write(b"get foo\r\n").unwrap(), 9);
        let mut buf = [0u8; 64];
        let n = b.try_read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"get foo\r\n");
    }

    #[test]
    fn read_would_block_with_nothing_written() {
        let (_a, mut b) = duplex_transport_pair(1024);
        let mut buf = [0u8; 16];
        let err = b.try_read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn dropping_one_side_reports_eof_on_the_other() {
        let (a, mut b) = duplex_transport_pair(1024);
        drop(a);
        let mut buf = [0u8; 16];
        assert_eq!(b.try_read(&mut buf).unwrap(), 0);
    }
}
