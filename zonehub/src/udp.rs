//! UDP DNS listener: a single task owns the socket; one task per
//! datagram decodes and resolves it; completed responses are funnelled
//! back through one `mpsc` channel to the owning task for sending,
//! since `recv_from`/`send_to` share the one underlying socket. Decode
//! failures produce no reply and are logged at `debug`.

use std::net::SocketAddr;
use std::time::Instant;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use zonehub_core::{resolve, CacheHandle};
use zonehub_proto::wire::Message;

use crate::metrics::{DNS_QUESTION_PROCESSING_TIME_SECONDS, DNS_REQUESTS_TOTAL, DNS_RESPONSES_TOTAL};

const MAX_DATAGRAM_SIZE: usize = 512;

pub async fn listen_udp_task(cache: CacheHandle, socket: UdpSocket) {
    let (tx, mut rx) = mpsc::channel::<(Message, SocketAddr)>(32);
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            Ok((size, peer)) = socket.recv_from(&mut buf) => {
                DNS_REQUESTS_TOTAL.inc();
                let bytes = buf[..size].to_vec();
                let cache = cache.clone();
                let reply = tx.clone();
                tokio::spawn(async move {
                    handle_datagram(cache, &bytes, peer, reply).await;
                });
            }

            Some((response, peer)) = rx.recv() => {
                send_response(&socket, &response, peer).await;
            }
        }
    }
}

async fn handle_datagram(
    cache: CacheHandle,
    bytes: &[u8],
    peer: SocketAddr,
    reply: mpsc::Sender<(Message, SocketAddr)>,
) {
    let request = match Message::from_octets(bytes) {
        Ok(request) if !request.header.is_response => request,
        Ok(_) => {
            tracing::debug!(?peer, "dropping a message flagged as a response");
            return;
        }
        Err(error) => {
            tracing::debug!(?peer, ?error, "could not decode DNS message");
            return;
        }
    };

    let start = Instant::now();
    let response = resolve(&cache, &request).await;
    DNS_QUESTION_PROCESSING_TIME_SECONDS
        .with_label_values(&[&response.header.rcode.code().to_string()])
        .observe(start.elapsed().as_secs_f64());

    if reply.send((response, peer)).await.is_err() {
        tracing::debug!(?peer, "UDP reply channel closed");
    }
}

async fn send_response(socket: &UdpSocket, response: &Message, peer: SocketAddr) {
    match response.to_octets() {
        Ok(bytes) => {
            DNS_RESPONSES_TOTAL
                .with_label_values(&[
                    &response.header.rcode.code().to_string(),
                    &(bytes.len() > MAX_DATAGRAM_SIZE).to_string(),
                ])
                .inc();
            if let Err(error) = socket.send_to(&bytes, peer).await {
                tracing::debug!(?peer, ?error, "UDP send error");
            }
        }
        Err(error) => {
            tracing::warn!(?peer, ?error, "could not serialise response");
        }
    }
}
