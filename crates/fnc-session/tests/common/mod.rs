//! In-process fake controller speaking the duplex line protocol.
//!
//! Accepts any number of connections on 127.0.0.1. Realtime bytes (`?`,
//! `!`, `~`, Ctrl-X) are recognized when they arrive outside a line; `?`
//! is answered with the current status telegram. Complete lines are
//! passed to a responder which returns the reply lines, or `None` to
//! drop the connection.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fnc_session::{Session, SessionConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

pub const IDLE_TELEGRAM: &str =
    "<Idle|MPos:10.000,20.000,-5.000|FS:0,0|WPos:1.000,2.000,3.000|Ov:100,100,100>";

/// What the fake saw on the wire, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Line(String),
    Realtime(u8),
}

pub type Responder = Arc<dyn Fn(&str) -> Option<Vec<String>> + Send + Sync>;

/// Replies `ok` to every line.
pub fn always_ok() -> Responder {
    Arc::new(|_: &str| Some(vec!["ok".to_string()]))
}

struct Shared {
    received: Mutex<Vec<Received>>,
    status: Mutex<String>,
    status_delay: Mutex<Duration>,
    responder: Responder,
    connections: AtomicUsize,
    status_drops: AtomicUsize,
}

pub struct FakeController {
    addr: SocketAddr,
    shared: Arc<Shared>,
    cancel_token: CancellationToken,
}

impl FakeController {
    pub async fn spawn(responder: Responder) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake");
        let addr = listener.local_addr().expect("local addr");
        let shared = Arc::new(Shared {
            received: Mutex::new(Vec::new()),
            status: Mutex::new(IDLE_TELEGRAM.to_string()),
            status_delay: Mutex::new(Duration::ZERO),
            responder,
            connections: AtomicUsize::new(0),
            status_drops: AtomicUsize::new(0),
        });
        let cancel_token = CancellationToken::new();

        let accept_shared = Arc::clone(&shared);
        let accept_token = cancel_token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_token.cancelled() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { break };
                        accept_shared.connections.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(serve(stream, Arc::clone(&accept_shared)));
                    }
                }
            }
        });

        Self {
            addr,
            shared,
            cancel_token,
        }
    }

    pub fn addr(&self) -> String {
        self.addr.to_string()
    }

    /// A disconnected session pointed at this fake.
    pub fn session(&self) -> Session {
        Session::new(SessionConfig::new(self.addr(), Duration::from_secs(2)))
    }

    pub fn received(&self) -> Vec<Received> {
        self.shared.received.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.received()
            .into_iter()
            .filter_map(|r| match r {
                Received::Line(line) => Some(line),
                Received::Realtime(_) => None,
            })
            .collect()
    }

    pub fn status_queries(&self) -> usize {
        self.received()
            .iter()
            .filter(|r| **r == Received::Realtime(b'?'))
            .count()
    }

    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    pub fn set_status(&self, telegram: &str) {
        *self.shared.status.lock().unwrap() = telegram.to_string();
    }

    /// Hold each status reply back for `delay` before sending it.
    pub fn set_status_delay(&self, delay: Duration) {
        *self.shared.status_delay.lock().unwrap() = delay;
    }

    /// Waits until at least `count` status queries have arrived.
    pub async fn wait_for_status_queries(&self, count: usize) {
        let start = tokio::time::Instant::now();
        while self.status_queries() < count {
            assert!(
                start.elapsed() < Duration::from_secs(2),
                "expected {count} status queries, saw {}",
                self.status_queries()
            );
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    /// Close the connection instead of answering the next `count` status queries.
    pub fn drop_status_queries(&self, count: usize) {
        self.shared.status_drops.store(count, Ordering::SeqCst);
    }
}

impl Drop for FakeController {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

fn is_realtime(byte: u8) -> bool {
    matches!(byte, b'?' | b'!' | b'~' | 0x18)
}

async fn serve(stream: TcpStream, shared: Arc<Shared>) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    while let Ok(byte) = reader.read_u8().await {
        if line.is_empty() && is_realtime(byte) {
            shared.received.lock().unwrap().push(Received::Realtime(byte));
            if byte != b'?' {
                continue;
            }
            let drop_now = shared
                .status_drops
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if drop_now {
                return;
            }
            let delay = *shared.status_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let telegram = shared.status.lock().unwrap().clone();
            if writer
                .write_all(format!("{telegram}\r\n").as_bytes())
                .await
                .is_err()
            {
                return;
            }
            continue;
        }

        match byte {
            b'\r' => {}
            b'\n' => {
                let text = String::from_utf8_lossy(&line).to_string();
                line.clear();
                shared
                    .received
                    .lock()
                    .unwrap()
                    .push(Received::Line(text.clone()));

                let Some(replies) = (shared.responder)(&text) else {
                    return;
                };
                for reply in replies {
                    if writer
                        .write_all(format!("{reply}\r\n").as_bytes())
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
            other => line.push(other),
        }
    }
}
