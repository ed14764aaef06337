//! UDP listener, worker pool and per-request handling.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::packet::{Packet, ResponseCode};
use crate::resolver;
use crate::upstream::MAX_DATAGRAM_LEN;
use crate::SharedState;

/// Wall-clock budget for one client request across all referral hops.
const REQUEST_DEADLINE: Duration = Duration::from_secs(20);

/// Binds the listener and dispatches each datagram to a worker. At most
/// `workers` requests are handled concurrently; the listener itself only
/// enqueues and keeps receiving. Returns after SIGINT once every
/// outstanding request has drained.
pub async fn run_udp_server(port: u16, workers: usize, state: SharedState) -> Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let socket = Arc::new(
        UdpSocket::bind(addr)
            .await
            .with_context(|| format!("failed to bind UDP listener on {addr}"))?,
    );
    info!("Started DNS server on port {port} with {workers} workers");

    let permits = Arc::new(Semaphore::new(workers));
    let mut buf = [0u8; MAX_DATAGRAM_LEN];
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, client) = match received {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("Listener receive error: {e}");
                        continue;
                    }
                };
                let payload = buf[..len].to_vec();
                let socket = socket.clone();
                let state = state.clone();
                let permits = permits.clone();
                tokio::spawn(async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return;
                    };
                    handle_request(socket, payload, client, state).await;
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested, draining in-flight queries");
                break;
            }
        }
    }

    // queued workers acquire in FIFO order, so this resolves only after
    // every outstanding request has finished
    let _ = permits.acquire_many(workers as u32).await;
    info!("Goodbye! Shutting down the server");
    Ok(())
}

/// Handles a single datagram: decode, resolve, reply.
async fn handle_request(
    socket: Arc<UdpSocket>,
    payload: Vec<u8>,
    client: SocketAddr,
    state: SharedState,
) {
    state.metrics.inc_inbound();
    let started = Instant::now();

    let query = match Packet::parse(&payload) {
        Ok(packet) => packet,
        Err(e) => {
            // undecodable datagrams are dropped without a reply
            error!("Dropping undecodable query from {client}: {e}");
            state.metrics.inc_erred();
            return;
        }
    };

    if let Some(question) = query.questions.first() {
        info!(
            "Received query for {} TYPE {}",
            question.name, question.qtype
        );
    }
    if query.header.opcode != 0 {
        debug!("Opcode {} is not supported, resolving anyway", query.header.opcode);
    }

    let mut response = match timeout(
        REQUEST_DEADLINE,
        resolver::resolve(&state.transport, &state.roots, &query),
    )
    .await
    {
        Ok(response) => response,
        Err(_) => {
            warn!("Request deadline exceeded for {client}");
            resolver::servfail_response(&query)
        }
    };
    response.header.recursion_available = true;

    let reply = match response.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Could not serialize response for {client}: {e}");
            state.metrics.inc_erred();
            return;
        }
    };
    if let Err(e) = socket.send_to(&reply, client).await {
        warn!("Failed to send reply to {client}: {e}");
    }

    state.metrics.inc_served();
    state.metrics.observe_duration(started.elapsed().as_secs_f64());

    match query.questions.first() {
        Some(question) if response.header.rcode != ResponseCode::NoError => {
            state.metrics.inc_erred();
            error!(
                "Query for {} TYPE {} errored out",
                question.name, question.qtype
            );
        }
        Some(question) => {
            info!(
                "Query for {} TYPE {} successfully processed",
                question.name, question.qtype
            );
        }
        None if response.header.rcode != ResponseCode::NoError => {
            state.metrics.inc_erred();
        }
        None => {}
    }
}
