//! Scripted in-process rcon server for the client tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use source_rcon::packet::{Packet, PacketType};
use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinHandle,
    time::sleep,
};

/// Decides what to send back for each packet the server receives. `None`
/// closes the connection.
pub type Handler = dyn Fn(&Packet) -> Option<Vec<Packet>> + Send + Sync;

pub struct Server {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Packet>>>,
    handle: JoinHandle<()>,
}

impl Server {
    pub async fn start<F>(handler: F) -> Server
    where
        F: Fn(&Packet) -> Option<Vec<Packet>> + Send + Sync + 'static,
    {
        Server::start_with_delay(Duration::ZERO, handler).await
    }

    /// Like `start`, but replies to exec packets are held back for `delay`.
    pub async fn start_with_delay<F>(delay: Duration, handler: F) -> Server
    where
        F: Fn(&Packet) -> Option<Vec<Packet>> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler: Arc<Handler> = Arc::new(handler);
        let connections = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let connections = connections.clone();
            let received = received.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(Server::process(
                        stream,
                        handler.clone(),
                        received.clone(),
                        delay,
                    ));
                }
            })
        };

        Server {
            addr,
            connections,
            received,
            handle,
        }
    }

    async fn process(
        mut stream: TcpStream,
        handler: Arc<Handler>,
        received: Arc<Mutex<Vec<Packet>>>,
        delay: Duration,
    ) {
        while let Ok(packet) = Packet::read_from(&mut stream).await {
            received.lock().unwrap().push(packet.clone());
            let Some(replies) = (*handler)(&packet) else {
                return;
            };
            if packet.is(PacketType::Exec) && !delay.is_zero() {
                sleep(delay).await;
            }
            for reply in replies {
                if reply.write_to(&mut stream).await.is_err() {
                    return;
                }
            }
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Packet> {
        self.received.lock().unwrap().clone()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Replies the way srcds does: an empty response value and an auth response
/// carrying the request id, or -1 for a wrong password.
pub fn auth_reply(packet: &Packet, password: &str) -> Vec<Packet> {
    let id = if packet.body() == password {
        packet.request_id()
    } else {
        -1
    };
    vec![
        Packet::new(packet.request_id(), PacketType::Response, ""),
        Packet::new(id, PacketType::AuthResponse, ""),
    ]
}

/// A well-behaved server: `status` reports a hostname, `echo <text>`
/// answers with `<text>`, anything else gets an empty response.
pub fn source_server(
    password: &'static str,
) -> impl Fn(&Packet) -> Option<Vec<Packet>> + Send + Sync + 'static {
    move |packet| {
        if packet.is(PacketType::Auth) {
            return Some(auth_reply(packet, password));
        }
        let body = packet.body();
        let output = match body.as_str() {
            "status" => "hostname: foo",
            command => command.strip_prefix("echo ").unwrap_or(""),
        };
        Some(vec![Packet::new(
            packet.request_id(),
            PacketType::Response,
            output,
        )])
    }
}
