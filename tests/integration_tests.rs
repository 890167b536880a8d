//! Integration tests for the flappy duel server
//!
//! These tests bind a real server on a loopback port and drive it with UDP
//! clients speaking the text protocol.

use flappy_server::config::{GameConfig, ServerConfig};
use flappy_server::network::Server;
use shared::{ClientMessage, ServerMessage, Snapshot};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

struct TestServer {
    addr: SocketAddr,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn start() -> Self {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..ServerConfig::default()
        };
        let server = Server::bind(config, GameConfig::default())
            .await
            .expect("Failed to bind test server");
        let addr = server.local_addr().unwrap();
        let token = server.shutdown_token();
        let handle = tokio::spawn(async move {
            server.run().await.expect("Server run failed");
        });
        TestServer {
            addr,
            token,
            handle,
        }
    }

    async fn stop(self) {
        self.token.cancel();
        timeout(REPLY_TIMEOUT, self.handle)
            .await
            .expect("Server did not stop")
            .unwrap();
    }
}

struct TestClient {
    socket: UdpSocket,
    server: SocketAddr,
}

impl TestClient {
    async fn new(server: SocketAddr) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind client socket");
        TestClient { socket, server }
    }

    async fn send(&self, text: &str) {
        self.socket.send_to(text.as_bytes(), self.server).await.unwrap();
    }

    async fn try_recv(&self, wait: Duration) -> Option<String> {
        let mut buf = [0u8; 2048];
        match timeout(wait, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => Some(String::from_utf8_lossy(&buf[..len]).into_owned()),
            _ => None,
        }
    }

    async fn recv(&self) -> String {
        self.try_recv(REPLY_TIMEOUT).await.expect("No reply from server")
    }

    /// Next message that is not a state snapshot.
    async fn recv_control(&self) -> String {
        loop {
            let text = self.recv().await;
            if !text.starts_with("STATE;") {
                return text;
            }
        }
    }

    async fn recv_state(&self) -> Snapshot {
        loop {
            let text = self.recv().await;
            if let Ok(ServerMessage::State(snapshot)) = ServerMessage::decode(&text) {
                return snapshot;
            }
        }
    }

    async fn connect(&self) -> String {
        self.send("Conectar").await;
        assert_eq!(self.recv().await, "Conectado");
        self.recv().await
    }
}

/// Registers two clients and drains their lobby broadcasts.
async fn lobby_pair(server: &TestServer) -> (TestClient, TestClient) {
    let a = TestClient::new(server.addr).await;
    let b = TestClient::new(server.addr).await;

    assert_eq!(a.connect().await, "Registrado con ID 1");
    assert_eq!(a.recv().await, "LOBBY;READY_P1=0;READY_P2=0");
    assert_eq!(b.connect().await, "Registrado con ID 2");
    assert_eq!(b.recv().await, "LOBBY;READY_P1=0;READY_P2=0");
    assert_eq!(a.recv().await, "LOBBY;READY_P1=0;READY_P2=0");
    (a, b)
}

async fn start_match(a: &TestClient, b: &TestClient) {
    a.send("READY=1").await;
    assert_eq!(a.recv().await, "LOBBY;READY_P1=1;READY_P2=0");
    assert_eq!(b.recv().await, "LOBBY;READY_P1=1;READY_P2=0");

    b.send("READY=1").await;
    for client in [a, b] {
        assert_eq!(client.recv().await, "LOBBY;READY_P1=1;READY_P2=1");
        assert_eq!(client.recv().await, "PARTIDA_INICIADA");
    }
}

/// PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    #[tokio::test]
    async fn discovery_reply() {
        let server = TestServer::start().await;
        let client = TestClient::new(server.addr).await;

        client.send("Hello_There").await;
        assert_eq!(client.recv().await, "General_Kenobi");

        server.stop().await;
    }

    #[tokio::test]
    async fn registration_and_lobby_broadcast() {
        let server = TestServer::start().await;
        let (_a, _b) = lobby_pair(&server).await;
        server.stop().await;
    }

    #[tokio::test]
    async fn third_client_rejected() {
        let server = TestServer::start().await;
        let (a, _b) = lobby_pair(&server).await;

        let c = TestClient::new(server.addr).await;
        c.send("Conectar").await;
        assert_eq!(c.recv().await, "SERVER_ERROR;code=FULL;detail=server_full");

        // Existing players hear nothing about the rejected attempt
        assert_eq!(a.try_recv(Duration::from_millis(100)).await, None);

        server.stop().await;
    }

    #[tokio::test]
    async fn unregistered_client_rejected() {
        let server = TestServer::start().await;
        let client = TestClient::new(server.addr).await;

        client.send(&ClientMessage::Ping.encode()).await;
        assert_eq!(client.recv().await, "No_registrado");

        server.stop().await;
    }

    #[tokio::test]
    async fn ping_pong_and_unknown_commands() {
        let server = TestServer::start().await;
        let client = TestClient::new(server.addr).await;
        assert_eq!(client.connect().await, "Registrado con ID 1");
        assert_eq!(client.recv().await, "LOBBY;READY_P1=0;READY_P2=0");

        client.send("DO_A_BARREL_ROLL").await;
        assert_eq!(client.try_recv(Duration::from_millis(100)).await, None);

        client.send("PING\n").await;
        assert_eq!(client.recv().await, "PONG");

        server.stop().await;
    }
}

/// MATCH LIFECYCLE TESTS
mod match_tests {
    use super::*;

    #[tokio::test]
    async fn match_start_streams_state() {
        let server = TestServer::start().await;
        let (a, b) = lobby_pair(&server).await;
        start_match(&a, &b).await;

        let first = a.recv_state().await;
        let second = a.recv_state().await;
        assert_eq!(first.tick, 0);
        assert_eq!(second.tick, 1);
        assert!(first.players.iter().all(|p| p.alive && p.score == 0));
        assert_eq!(first.obstacles.len(), 2);

        assert_eq!(b.recv_state().await.tick, 0);

        server.stop().await;
    }

    #[tokio::test]
    async fn jump_input_lifts_flyer() {
        let server = TestServer::start().await;
        let (a, b) = lobby_pair(&server).await;
        start_match(&a, &b).await;

        // Let gravity pull both flyers down first
        for _ in 0..5 {
            a.recv_state().await;
        }
        a.send(&ClientMessage::Input { jump: true, seq: Some(1) }.encode())
            .await;

        let mut lifted = false;
        for _ in 0..30 {
            let snapshot = a.recv_state().await;
            if snapshot.players[0].vy > 0.0 {
                assert!(snapshot.players[1].vy < 0.0);
                lifted = true;
                break;
            }
        }
        assert!(lifted, "P1 never moved upwards after jumping");

        server.stop().await;
    }

    #[tokio::test]
    async fn disconnect_aborts_match() {
        let server = TestServer::start().await;
        let (a, b) = lobby_pair(&server).await;
        start_match(&a, &b).await;
        b.recv_state().await;

        a.send("DISCONNECT").await;

        assert_eq!(
            b.recv_control().await,
            "SERVER_ERROR;code=ABORT;detail=player_left_1"
        );
        assert_eq!(b.recv().await, "PARTIDA_ABORTADA");
        assert_eq!(b.recv().await, "LOBBY;READY_P1=0;READY_P2=0");

        // No more snapshots once the match is over
        assert_eq!(b.try_recv(Duration::from_millis(100)).await, None);

        server.stop().await;
    }

    #[tokio::test]
    async fn shutdown_aborts_match() {
        let server = TestServer::start().await;
        let (a, b) = lobby_pair(&server).await;
        start_match(&a, &b).await;
        a.recv_state().await;

        server.stop().await;

        assert_eq!(
            a.recv_control().await,
            "SERVER_ERROR;code=ABORT;detail=server_shutdown"
        );
        assert_eq!(a.recv().await, "PARTIDA_ABORTADA");
        assert_eq!(b.recv_control().await, "SERVER_ERROR;code=ABORT;detail=server_shutdown");
    }
}
