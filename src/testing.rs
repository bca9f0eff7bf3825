//! Loopback HTTP stub standing in for the background-removal backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::EnvFilter;

pub(crate) struct StubBackend {
    /// Base address, e.g. `http://127.0.0.1:PORT`.
    pub base: String,
    pub hits: Arc<AtomicUsize>,
    pub last_request: Arc<Mutex<Vec<u8>>>,
}

impl StubBackend {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn last_request_text(&self) -> String {
        String::from_utf8_lossy(&self.last_request.lock().unwrap()).into_owned()
    }
}

/// Route library logs to the test harness's captured output.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// Answer every request with the same status line, content type and body.
pub(crate) async fn spawn_stub(
    status: u16,
    reason: &'static str,
    content_type: &'static str,
    body: Vec<u8>,
) -> StubBackend {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let last_request = Arc::new(Mutex::new(Vec::new()));

    let (h, lr) = (Arc::clone(&hits), Arc::clone(&last_request));
    tokio::spawn(async move {
        while let Ok((sock, _)) = listener.accept().await {
            let (h, lr, body) = (Arc::clone(&h), Arc::clone(&lr), body.clone());
            tokio::spawn(async move {
                let mut sock = sock;
                let request = read_request(&mut sock).await;
                h.fetch_add(1, Ordering::SeqCst);
                *lr.lock().unwrap() = request;
                respond(&mut sock, status, reason, content_type, &body).await;
            });
        }
    });

    StubBackend {
        base: format!("http://{addr}"),
        hits,
        last_request,
    }
}

/// An address nothing listens on.
pub(crate) async fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/sever")
}

async fn read_request(sock: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = match sock.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        if request_complete(&buf) {
            break;
        }
    }
    buf
}

async fn respond(sock: &mut TcpStream, status: u16, reason: &str, content_type: &str, body: &[u8]) {
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = sock.write_all(head.as_bytes()).await;
    let _ = sock.write_all(body).await;
    let _ = sock.shutdown().await;
}

/// Whether `buf` holds a whole request, judged by `Content-Length` or the
/// chunked terminator.
///
/// A request with neither counts as complete once its headers arrive, so
/// any body sent that way is cut short. reqwest always delimits the
/// multipart and GET requests this stub serves.
fn request_complete(buf: &[u8]) -> bool {
    let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok());

    match content_length {
        Some(len) => buf.len() >= end + 4 + len,
        None if head.contains("transfer-encoding: chunked") => buf.ends_with(b"0\r\n\r\n"),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_completion_rules() {
        assert!(!request_complete(b"POST /sever HTTP/1.1\r\nHost: x\r\n"));
        assert!(!request_complete(b"POST /sever HTTP/1.1\r\nContent-Length: 4\r\n\r\nab"));
        assert!(request_complete(b"POST /sever HTTP/1.1\r\nContent-Length: 4\r\n\r\nabcd"));
        assert!(!request_complete(
            b"POST /sever HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nab\r\n"
        ));
        assert!(request_complete(
            b"POST /sever HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nab\r\n0\r\n\r\n"
        ));
        // Undelimited: complete at the end of the headers.
        assert!(request_complete(b"POST /sever HTTP/1.1\r\n\r\nab"));
    }
}
