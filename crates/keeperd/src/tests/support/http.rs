//! Minimal HTTP/1.1 server for archive download tests.
//!
//! The server answers every request with the same canned reply until it is
//! dropped, counting the requests it has seen.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use url::Url;

#[derive(Debug, Clone)]
enum Reply {
    Ok(Vec<u8>),
    Truncated { body: Vec<u8>, advertised: usize },
    Unsized(Vec<u8>),
    Status(u16),
}

impl Reply {
    fn head(&self) -> String {
        match self {
            Self::Ok(body) => format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/gzip\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            ),
            Self::Truncated { advertised, .. } => format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {advertised}\r\nConnection: close\r\n\r\n"
            ),
            Self::Unsized(_) => "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_owned(),
            Self::Status(code) => format!(
                "HTTP/1.1 {code} Canned\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            ),
        }
    }

    fn body(&self) -> &[u8] {
        match self {
            Self::Ok(body) | Self::Truncated { body, .. } | Self::Unsized(body) => body,
            Self::Status(_) => &[],
        }
    }
}

/// Loopback HTTP server serving one canned reply.
pub(crate) struct FakeHttpServer {
    port: u16,
    requests: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FakeHttpServer {
    /// Serves `body` with status 200 and an exact `Content-Length`.
    pub(crate) fn serve_ok(body: Vec<u8>) -> Self {
        Self::spawn(Reply::Ok(body))
    }

    /// Advertises `advertised` bytes but hangs up after sending `body`.
    pub(crate) fn serve_truncated(body: Vec<u8>, advertised: usize) -> Self {
        Self::spawn(Reply::Truncated { body, advertised })
    }

    /// Serves `body` without a `Content-Length`, ending it by closing.
    pub(crate) fn serve_unsized(body: Vec<u8>) -> Self {
        Self::spawn(Reply::Unsized(body))
    }

    /// Answers every request with `code` and an empty body.
    pub(crate) fn serve_status(code: u16) -> Self {
        Self::spawn(Reply::Status(code))
    }

    /// URL on a loopback port with nothing listening.
    pub(crate) fn unused_url() -> Url {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind probe listener");
        let port = listener.local_addr().expect("probe address").port();
        drop(listener);
        Url::parse(&format!("http://127.0.0.1:{port}/archive.tar.gz")).expect("valid url")
    }

    fn spawn(reply: Reply) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind fake http server");
        listener
            .set_nonblocking(true)
            .expect("fake http server nonblocking");
        let port = listener.local_addr().expect("local addr").port();
        let requests = Arc::new(AtomicUsize::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = {
            let requests = Arc::clone(&requests);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || serve(&listener, &reply, &requests, &shutdown))
        };
        Self {
            port,
            requests,
            shutdown,
            handle: Some(handle),
        }
    }

    /// URL for `path` on this server.
    pub(crate) fn url(&self, path: &str) -> Url {
        Url::parse(&format!("http://127.0.0.1:{}{path}", self.port)).expect("valid url")
    }

    /// Number of requests answered so far.
    pub(crate) fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for FakeHttpServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn serve(listener: &TcpListener, reply: &Reply, requests: &AtomicUsize, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                requests.fetch_add(1, Ordering::SeqCst);
                // Clients may hang up early once they have seen the headers.
                let _ = answer(stream, reply);
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(_) => return,
        }
    }
}

fn answer(stream: TcpStream, reply: &Reply) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }
    let mut writer = stream;
    writer.write_all(reply.head().as_bytes())?;
    writer.write_all(reply.body())?;
    writer.flush()
}
