//! Minimal HTTP/1.1 file server on a local port
//!
//! Answers each GET from a fixed route table and closes the connection.
//! A truncated route advertises a longer `Content-Length` than it sends,
//! which the client sees as a dropped transfer.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub enum Route {
    Full(Vec<u8>),
    Truncated { body: Vec<u8>, claimed: usize },
}

pub struct FileServer {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl FileServer {
    /// Serve `routes` (keyed by request path, e.g. `/a/b.onnx`); others 404
    pub async fn start(routes: HashMap<String, Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(routes);

        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, Arc::clone(&routes)));
            }
        });

        Self { addr, task }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for FileServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut socket: TcpStream, routes: Arc<HashMap<String, Route>>) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }

    let head = String::from_utf8_lossy(&request);
    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();

    let (status, body, length): (&str, &[u8], usize) = match routes.get(&path) {
        Some(Route::Full(body)) => ("200 OK", body.as_slice(), body.len()),
        Some(Route::Truncated { body, claimed }) => ("200 OK", body.as_slice(), *claimed),
        None => ("404 Not Found", &[], 0),
    };

    let header = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
        status, length
    );
    let _ = socket.write_all(header.as_bytes()).await;
    let _ = socket.write_all(body).await;
    let _ = socket.shutdown().await;
}
