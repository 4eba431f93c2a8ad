//! The `Session` contract (C4): the only surface a running module uses to
//! talk to the remote client, plus the file-transfer helper types it trades
//! in. The broker that implements `Session` over a transport lives in
//! [`broker`].

pub mod broker;

use async_trait::async_trait;

/// Errors a [`Session`] call can return. The only failure mode a module ever
/// needs to react to is the broker having already shut down.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session broker is no longer accepting calls")]
    BrokerClosed,
}

/// The capability set a module uses to talk to the remote client (C4).
///
/// `print`/`printf`/`println` are best-effort: a module never needs to
/// react to a failed notification, so they swallow broker-closed errors.
#[async_trait]
pub trait Session: Send + Sync {
    /// Sends a best-effort text notification to the client.
    async fn print(&self, text: &str);

    /// Formats `args` (build with [`format_args!`]) and sends it via
    /// [`Session::print`], the idiomatic stand-in for a variadic `Printf`.
    async fn printf<'a>(&'a self, args: std::fmt::Arguments<'a>) {
        self.print(&args.to_string()).await;
    }

    /// Formats `text` with a trailing newline and sends it via [`Session::print`].
    async fn println(&self, text: &str) {
        self.print(&format!("{text}\n")).await;
    }

    /// Returns this session's console: an stdin reader and stdout/stderr
    /// writers, all multiplexed onto the same duplex stream as everything
    /// else. Calling this more than once from the same module yields
    /// handles onto the same underlying queues.
    fn console(&self) -> (ConsoleReader, ConsoleWriter, ConsoleWriter);

    /// Asks the client to upload a file named `name`, returning a reader
    /// that yields its bytes and then EOFs. A module MUST NOT have more
    /// than one `RequestFile` outstanding at a time; see the Session Broker
    /// design for what happens if that invariant is violated.
    async fn request_file(&self, name: &str) -> Result<FileReader, SessionError>;

    /// Streams a file to the client with advertised total size `size`,
    /// reading its bytes from `source`. Returns once the transfer has been
    /// handed off to the broker, not once it has actually been delivered.
    async fn send_file(&self, name: &str, size: u64, source: Box<dyn FileSource + Send>) -> Result<(), SessionError>;
}

/// A source of file bytes a module hands to [`Session::send_file`].
///
/// `read_chunk` returns an empty `Vec` to signal EOF. Modules back this with
/// whatever they have on hand (an open file, an in-memory buffer); no
/// particular I/O backend is assumed.
#[async_trait]
pub trait FileSource: Send {
    async fn read_chunk(&mut self, max_len: usize) -> std::io::Result<Vec<u8>>;
}

/// A `FileSource` over an in-memory buffer, handy for modules and tests
/// alike.
pub struct InMemoryFileSource {
    data: Vec<u8>,
    pos: usize,
}

impl InMemoryFileSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

#[async_trait]
impl FileSource for InMemoryFileSource {
    async fn read_chunk(&mut self, max_len: usize) -> std::io::Result<Vec<u8>> {
        let end = std::cmp::min(self.data.len(), self.pos + max_len);
        let chunk = self.data[self.pos..end].to_vec();
        self.pos = end;
        Ok(chunk)
    }
}

/// A reader over a file uploaded by the client in response to `RequestFile`.
///
/// The whole file arrives as a single wire message, so reads after the
/// first simply walk an in-memory buffer; callers still see ordinary
/// short-read semantics (`read` may return fewer bytes than asked for, `0`
/// means EOF).
pub struct FileReader {
    rx: Option<tokio::sync::oneshot::Receiver<Vec<u8>>>,
    buf: Vec<u8>,
    pos: usize,
}

impl FileReader {
    pub(crate) fn new(rx: tokio::sync::oneshot::Receiver<Vec<u8>>) -> Self {
        Self { rx: Some(rx), buf: Vec::new(), pos: 0 }
    }

    async fn fill(&mut self) {
        if let Some(rx) = self.rx.take() {
            self.buf = rx.await.unwrap_or_default();
            self.pos = 0;
        }
    }

    /// Reads up to `out.len()` bytes, returning the number of bytes read.
    /// `0` means EOF.
    pub async fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        self.fill().await;
        let remaining = self.buf.len() - self.pos;
        if remaining == 0 {
            return Ok(0);
        }
        let n = std::cmp::min(out.len(), remaining);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    /// Reads the whole file into memory.
    pub async fn read_to_end(&mut self) -> std::io::Result<Vec<u8>> {
        self.fill().await;
        let rest = self.buf[self.pos..].to_vec();
        self.pos = self.buf.len();
        Ok(rest)
    }
}

/// The stdin half of a module's console, multiplexed onto the duplex stream.
pub struct ConsoleReader {
    rx: std::sync::Arc<tokio::sync::Mutex<tokio::sync::mpsc::Receiver<Vec<u8>>>>,
    buf: Vec<u8>,
    pos: usize,
}

impl ConsoleReader {
    pub(crate) fn new(rx: std::sync::Arc<tokio::sync::Mutex<tokio::sync::mpsc::Receiver<Vec<u8>>>>) -> Self {
        Self { rx, buf: Vec::new(), pos: 0 }
    }

    /// Reads up to `out.len()` bytes of stdin, returning `0` on EOF (the
    /// client closed its send side or the session terminated).
    pub async fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        if self.pos >= self.buf.len() {
            let mut rx = self.rx.lock().await;
            match rx.recv().await {
                Some(chunk) => {
                    self.buf = chunk;
                    self.pos = 0;
                }
                None => return Ok(0),
            }
        }
        let n = std::cmp::min(out.len(), self.buf.len() - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Which of a module's two console output streams a [`ConsoleWriter`] feeds.
pub(crate) enum ConsoleStream {
    Stdout,
    Stderr,
}

/// The stdout/stderr half of a module's console. Both halves share the
/// broker's single outbound event queue so writes interleave with
/// `print`/`send_file`/`request_file` in the order the module issued them.
pub struct ConsoleWriter {
    tx: tokio::sync::mpsc::Sender<broker::OutboundEvent>,
    stream: ConsoleStream,
}

impl ConsoleWriter {
    pub(crate) fn new(tx: tokio::sync::mpsc::Sender<broker::OutboundEvent>, stream: ConsoleStream) -> Self {
        Self { tx, stream }
    }

    pub async fn write(&self, data: &[u8]) -> Result<(), SessionError> {
        let event = match self.stream {
            ConsoleStream::Stdout => broker::OutboundEvent::Stdout(data.to_vec()),
            ConsoleStream::Stderr => broker::OutboundEvent::Stderr(data.to_vec()),
        };
        self.tx.send(event).await.map_err(|_| SessionError::BrokerClosed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// A `Session` that records every `print`-family call, for exercising
    /// the default `printf`/`println` bodies without a real broker.
    #[derive(Default)]
    struct RecordingSession {
        printed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Session for RecordingSession {
        async fn print(&self, text: &str) {
            self.printed.lock().unwrap().push(text.to_string());
        }
        fn console(&self) -> (ConsoleReader, ConsoleWriter, ConsoleWriter) {
            unimplemented!("not exercised by these tests")
        }
        async fn request_file(&self, _name: &str) -> Result<FileReader, SessionError> {
            unimplemented!("not exercised by these tests")
        }
        async fn send_file(&self, _name: &str, _size: u64, _source: Box<dyn FileSource + Send>) -> Result<(), SessionError> {
            unimplemented!("not exercised by these tests")
        }
    }

    #[tokio::test]
    async fn printf_formats_through_print() {
        let session = RecordingSession::default();
        session.printf(format_args!("pin {} is {}", 7, "high")).await;
        assert_eq!(session.printed.lock().unwrap().as_slice(), &["pin 7 is high".to_string()]);
    }

    #[tokio::test]
    async fn println_appends_a_newline() {
        let session = RecordingSession::default();
        session.println("done").await;
        assert_eq!(session.printed.lock().unwrap().as_slice(), &["done\n".to_string()]);
    }
}
