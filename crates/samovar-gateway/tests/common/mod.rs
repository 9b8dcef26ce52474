//! Shared scaffolding for the end-to-end tests: a server on an ephemeral
//! loopback port plus a minimal line-level test client.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use samovar_gateway::registry::Registry;
use samovar_gateway::{Context, serve};
use samovar_proto::{ClientFrame, ServerFrame};
use samovar_store::Store;
use samovar_store::blobs::BlobStore;

pub const RECV_DEADLINE: Duration = Duration::from_secs(10);

pub async fn spawn_server(tag: &str) -> (SocketAddr, Context, PathBuf) {
    let dir = std::env::temp_dir().join(format!("samovar_e2e_{tag}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);

    let store = Arc::new(Store::load(&dir).expect("store load"));
    let blobs = Arc::new(BlobStore::new(&dir).await.expect("blob store"));
    let ctx = Context {
        store,
        blobs,
        registry: Registry::new(),
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(serve(listener, ctx.clone()));
    (addr, ctx, dir)
}

pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    /// Connect, register if asked, and log in, consuming the OK replies.
    pub async fn login(addr: SocketAddr, username: &str, password: &str, register: bool) -> Self {
        let mut client = Self::connect(addr).await;
        if register {
            client
                .send(&ClientFrame::Register {
                    username: username.into(),
                    password: password.into(),
                })
                .await;
            assert_eq!(client.recv().await, Some(ServerFrame::Ok));
        }
        client
            .send(&ClientFrame::Login {
                username: username.into(),
                password: password.into(),
            })
            .await;
        assert_eq!(client.recv().await, Some(ServerFrame::Ok));
        client
    }

    pub async fn send(&mut self, frame: &ClientFrame) {
        let mut line = frame.encode();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.expect("send");
    }

    pub async fn send_bytes(&mut self, data: &[u8]) {
        self.writer.write_all(data).await.expect("send bytes");
    }

    /// Next decoded frame, or None on EOF. Panics after RECV_DEADLINE.
    pub async fn recv(&mut self) -> Option<ServerFrame> {
        let mut line = String::new();
        let n = timeout(RECV_DEADLINE, self.reader.read_line(&mut line))
            .await
            .expect("recv timed out")
            .expect("recv io");
        if n == 0 {
            return None;
        }
        let frame = line.trim_end_matches(['\r', '\n']);
        Some(ServerFrame::decode(frame).expect("decodable frame"))
    }

    /// Skip frames until one matches; panics on EOF or deadline.
    pub async fn recv_until(&mut self, pred: impl Fn(&ServerFrame) -> bool) -> ServerFrame {
        loop {
            match self.recv().await {
                Some(frame) if pred(&frame) => return frame,
                Some(_) => continue,
                None => panic!("connection closed while waiting for frame"),
            }
        }
    }

    pub async fn shutdown(mut self) {
        let _ = self.writer.shutdown().await;
    }
}
