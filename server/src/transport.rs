use async_trait::async_trait;
use log::{debug, warn};
use shared::{PlayerId, ServerMessage};
use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

// Port for outbound datagrams; the server only ever sends, never waits for acks.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_to(&self, payload: &[u8], addr: SocketAddr) -> io::Result<usize>;
}

#[async_trait]
impl Transport for UdpSocket {
    async fn send_to(&self, payload: &[u8], addr: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, payload, addr).await
    }
}

/// Sends one message. Failures are logged and swallowed.
pub async fn send(transport: &dyn Transport, message: &ServerMessage, addr: SocketAddr) {
    let text = message.encode();
    if let Err(e) = transport.send_to(text.as_bytes(), addr).await {
        warn!(target: "send", "Failed to send to {}: {}", addr, e);
        return;
    }
    if !matches!(message, ServerMessage::State(_)) {
        debug!(target: "send", "{} <- {}", addr, text);
    }
}

/// Sends `message` to every endpoint in `targets`; one failing peer does not
/// stop delivery to the rest.
pub async fn broadcast(
    transport: &dyn Transport,
    message: &ServerMessage,
    targets: &[(PlayerId, SocketAddr)],
) {
    if targets.is_empty() {
        return;
    }
    let text = message.encode();
    for (id, addr) in targets {
        if let Err(e) = transport.send_to(text.as_bytes(), *addr).await {
            warn!(target: "send", "Broadcast to P{} at {} failed: {}", id, addr, e);
        }
    }
    if !matches!(message, ServerMessage::State(_)) {
        debug!(target: "send", "broadcast -> {} peers: {}", targets.len(), text);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// In-memory transport that records every datagram it is asked to send.
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        sent: Mutex<Vec<(SocketAddr, String)>>,
        unreachable: Mutex<HashSet<SocketAddr>>,
    }

    impl RecordingTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn make_unreachable(&self, addr: SocketAddr) {
            self.unreachable.lock().expect("unreachable mutex poisoned").insert(addr);
        }

        /// Everything sent to `addr`, oldest first.
        pub(crate) fn sent_to(&self, addr: SocketAddr) -> Vec<String> {
            let guard = self.sent.lock().expect("sent mutex poisoned");
            guard
                .iter()
                .filter(|(to, _)| *to == addr)
                .map(|(_, text)| text.clone())
                .collect()
        }

        /// Like `sent_to`, without the per-tick snapshots.
        pub(crate) fn control_sent_to(&self, addr: SocketAddr) -> Vec<String> {
            self.sent_to(addr)
                .into_iter()
                .filter(|text| !text.starts_with("STATE;"))
                .collect()
        }

        pub(crate) fn clear(&self) {
            self.sent.lock().expect("sent mutex poisoned").clear();
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_to(&self, payload: &[u8], addr: SocketAddr) -> io::Result<usize> {
            if self
                .unreachable
                .lock()
                .expect("unreachable mutex poisoned")
                .contains(&addr)
            {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "unreachable"));
            }
            let text = String::from_utf8_lossy(payload).into_owned();
            self.sent.lock().expect("sent mutex poisoned").push((addr, text));
            Ok(payload.len())
        }
    }
}
