use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use proxy_core::conn::Transport;

/// A [`Transport`] that replays a fixed script of reads and records
/// every write, for tests that pin down exactly what a backend sends
/// back without round-tripping through a real or in-memory socket.
///
/// Each [`Transport::try_read`] call pops the next scripted chunk;
/// once the script is exhausted, further reads report `WouldBlock`
/// (not EOF), matching an idle persistent connection rather than a
/// closed one. Push `Ok(Vec::new())` explicitly to script an EOF.
pub struct ScriptedTransport {
    reads: VecDeque<io::Result<Vec<u8>>>,
    written: Rc<RefCell<Vec<u8>>>,
}

impl Transport for ScriptedTransport {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reads.pop_front() {
            Some(Ok(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Some(Err(e)) => Err(e),
            None => Err(io::Error::from(io::ErrorKind::WouldBlock)),
        }
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }
}

/// Builds a [`ScriptedTransport`] that yields `reads` in order, plus a
/// shared handle to every byte it has been asked to write.
#[must_use]
pub fn scripted_transport(reads: Vec<io::Result<Vec<u8>>>) -> (ScriptedTransport, Rc<RefCell<Vec<u8>>>) {
    let written = Rc::new(RefCell::new(Vec::new()));
    let transport = ScriptedTransport { reads: VecDeque::from(reads), written: written.clone() };
    (transport, written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_scripted_reads_in_order() {
        let (mut transport, _) = scripted_transport(vec![Ok(b"STORED\r\n".to_vec()), Ok(b"END\r\n".to_vec())]);
        let mut buf = [0u8; 32];
        let n = transport.try_read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"STORED\r\n");
        let n = transport.try_read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"END\r\n");
    }

    #[test]
    fn exhausted_script_reports_would_block() {
        let (mut transport, _) = scripted_transport(vec![]);
        let mut buf = [0u8; 32];
        let err = transport.try_read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn records_every_write() {
        let (mut transport, written) = scripted_transport(vec![]);
        transport.try_write(b"get foo\r\n").unwrap();
        transport.try_write(b"get bar\r\n").unwrap();
        assert_eq!(*written.borrow(), b"get foo\r\nget bar\r\n");
    }
}
