use std::collections::VecDeque;
use std::future::Future;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use base64::prelude::*;
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use rustc_hash::FxHashMap;
use sr_dns::{HostnameSet, Message};
use sr_routes::{IpVersion, RouteClient, RouteEvent};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::learner::{RouteLearner, RouteUpdate};

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    pub upstream_addr: SocketAddr,
    pub gateway_v4: Ipv4Addr,
    pub gateway_v6: Option<Ipv6Addr>,
    pub timeout: Duration,
    pub buffer_size: usize,
}

impl ProxyConfig {
    pub const DEFAULT_BUFFER_SIZE: usize = 1024;
}

/// A query in flight to the upstream resolver. Owns its upstream socket
/// until the exchange completes or expires, at which point the socket moves
/// back to the free pool.
struct PendingQuery {
    socket: Arc<UdpSocket>,
    client: SocketAddr,
    issued_at: Instant,
}

/// Outcome of one upstream exchange, tagged with its pool slot.
enum Exchange {
    Reply { slot: u64, data: Vec<u8> },
    Failed { slot: u64, error: std::io::Error },
    Expired { slot: u64 },
}

type ExchangeFuture = Pin<Box<dyn Future<Output = Exchange> + Send>>;

/// Wait for the upstream reply on a dedicated socket, bounded by the query
/// timeout.
async fn run_exchange(
    slot: u64,
    socket: Arc<UdpSocket>,
    buffer_size: usize,
    timeout: Duration,
) -> Exchange {
    let mut buf = vec![0u8; buffer_size];
    match tokio::time::timeout(timeout, socket.recv(&mut buf)).await {
        Ok(Ok(len)) => {
            buf.truncate(len);
            Exchange::Reply { slot, data: buf }
        }
        Ok(Err(error)) => Exchange::Failed { slot, error },
        Err(_) => Exchange::Expired { slot },
    }
}

/// The proxy core: a single task owning every pool, queue and subnet set.
///
/// Client datagrams are forwarded byte-for-byte on ephemeral upstream
/// sockets and the responses byte-for-byte back; responses whose query
/// matched the allowlist additionally feed the route learner.
pub struct DnsProxy {
    config: ProxyConfig,
    hostnames: HostnameSet,
    routes: RouteClient,
    events: mpsc::UnboundedReceiver<RouteEvent>,
    listen: UdpSocket,
    learner: RouteLearner,
    exchanges: FuturesUnordered<ExchangeFuture>,
    free_pool: Vec<Arc<UdpSocket>>,
    routed_pool: FxHashMap<u64, PendingQuery>,
    regular_pool: FxHashMap<u64, PendingQuery>,
    queries_queue: VecDeque<(Vec<u8>, SocketAddr)>,
    next_slot: u64,
    expired_queries: u64,
}

impl DnsProxy {
    pub async fn new(
        config: ProxyConfig,
        hostnames: HostnameSet,
        routes: RouteClient,
        events: mpsc::UnboundedReceiver<RouteEvent>,
    ) -> Result<Self> {
        let listen = UdpSocket::bind(config.listen_addr).await?;
        let learner = RouteLearner::new(config.gateway_v4, config.gateway_v6);
        Ok(Self {
            config,
            hostnames,
            routes,
            events,
            listen,
            learner,
            exchanges: FuturesUnordered::new(),
            free_pool: Vec::new(),
            routed_pool: FxHashMap::default(),
            regular_pool: FxHashMap::default(),
            queries_queue: VecDeque::new(),
            next_slot: 0,
            expired_queries: 0,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        info!("getting routed subnets");
        for event in self.routes.dump_routes(IpVersion::V4).await? {
            self.learner.apply_event(&event);
        }
        if self.config.gateway_v6.is_some() {
            for event in self.routes.dump_routes(IpVersion::V6).await? {
                self.learner.apply_event(&event);
            }
        }
        info!(
            "proxy is listening at {} ({} v4 / {} v6 subnets installed)",
            self.config.listen_addr,
            self.learner.subnets_v4().len(),
            self.learner.subnets_v6().len(),
        );

        let mut buf = vec![0u8; self.config.buffer_size];
        loop {
            tokio::select! {
                received = self.listen.recv_from(&mut buf) => match received {
                    Ok((len, client)) => self.queries_queue.push_back((buf[..len].to_vec(), client)),
                    Err(error) => warn!("listen socket receive failed: {error}"),
                },
                Some(exchange) = self.exchanges.next() => {
                    if let Err(error) = self.finish_exchange(exchange).await {
                        error!("response handling failed: {error:#}");
                    }
                }
                event = self.events.recv() => match event {
                    Some(event) => self.learner.apply_event(&event),
                    None => anyhow::bail!("route event stream closed"),
                },
            }

            if self.expired_queries > 0 {
                warn!("{} queries expired", self.expired_queries);
                self.expired_queries = 0;
            }

            if let Err(error) = self.process_queued_queries().await {
                error!("query admission failed: {error:#}");
            }

            // Sockets that came back this iteration are closed rather than
            // kept warm, so fd usage stays bounded by the in-flight count.
            self.free_pool.clear();
        }
    }

    async fn finish_exchange(&mut self, exchange: Exchange) -> Result<()> {
        match exchange {
            Exchange::Reply { slot, data } => {
                if let Some(pending) = self.routed_pool.remove(&slot) {
                    debug!("[{slot}] answered in {:?}", pending.issued_at.elapsed());
                    self.free_pool.push(pending.socket);
                    self.handle_routed_response(data, pending.client).await
                } else if let Some(pending) = self.regular_pool.remove(&slot) {
                    debug!("[{slot}] answered in {:?}", pending.issued_at.elapsed());
                    self.free_pool.push(pending.socket);
                    self.listen.send_to(&data, pending.client).await?;
                    Ok(())
                } else {
                    anyhow::bail!("readiness on a socket that is in no pool (slot {slot})")
                }
            }
            Exchange::Failed { slot, error } => {
                self.release(slot)?;
                warn!("upstream receive failed: {error}");
                Ok(())
            }
            Exchange::Expired { slot } => {
                self.release(slot)?;
                self.expired_queries += 1;
                Ok(())
            }
        }
    }

    /// Move an in-flight socket back to the free pool.
    fn release(&mut self, slot: u64) -> Result<()> {
        let pending = self
            .routed_pool
            .remove(&slot)
            .or_else(|| self.regular_pool.remove(&slot))
            .ok_or_else(|| anyhow::anyhow!("readiness on a socket that is in no pool (slot {slot})"))?;
        self.free_pool.push(pending.socket);
        Ok(())
    }

    /// Forward a routed response to its client and reconcile routes against
    /// the addresses it carries.
    async fn handle_routed_response(&mut self, data: Vec<u8>, client: SocketAddr) -> Result<()> {
        let message = match Message::parse(&data) {
            Ok(message) => message,
            Err(error) => {
                warn!(
                    "dropping unparseable upstream response: {error} (payload {})",
                    BASE64_STANDARD.encode(&data),
                );
                return Ok(());
            }
        };

        for answer in &message.answers {
            info!("{} -> {}", answer.name, answer.rr_data_text());
        }

        let updates = self.learner.learn(&message);
        self.listen.send_to(&data, client).await?;
        self.apply_updates(updates).await;
        Ok(())
    }

    /// Issue the plan's add/delete commands. Failures are logged and left to
    /// self-heal: the subnet state only moves on kernel events, so a lost
    /// command is retried as soon as the same address is answered again.
    async fn apply_updates(&mut self, updates: Vec<RouteUpdate>) {
        for RouteUpdate { destination, prefix_len, gateway, install } in updates {
            let action = if install { "add" } else { "delete" };
            let result = if install {
                self.routes.add_route(destination, prefix_len, gateway).await
            } else {
                self.routes.del_route(destination, prefix_len, gateway).await
            };
            match result {
                Ok(()) => info!("route {action} {destination}/{prefix_len} via {gateway}"),
                Err(error) => {
                    warn!("route {action} {destination}/{prefix_len} via {gateway} failed: {error}")
                }
            }
        }
    }

    /// Admit queued queries up to the file-descriptor budget.
    async fn process_queued_queries(&mut self) -> Result<()> {
        if self.queries_queue.is_empty() {
            return Ok(());
        }

        let admit = self.queries_queue.len().min(fd_budget());
        for _ in 0..admit {
            let Some((data, client)) = self.queries_queue.pop_front() else {
                break;
            };
            self.route_request(data, client).await?;
        }

        let remaining = self.queries_queue.len();
        if remaining > 0 {
            warn!("{remaining} queries waiting for file descriptors");
        }
        Ok(())
    }

    /// Send one client datagram upstream and file it in the matching pool.
    async fn route_request(&mut self, data: Vec<u8>, client: SocketAddr) -> Result<()> {
        let query = match Message::parse(&data) {
            Ok(query) => query,
            Err(error) => {
                warn!(
                    "dropping unparseable query from {client}: {error} (payload {})",
                    BASE64_STANDARD.encode(&data),
                );
                return Ok(());
            }
        };

        let socket = self.acquire_socket().await?;
        socket.send(&data).await?;

        let routed = query.questions.iter().any(|question| self.hostnames.matches(&question.name));
        let slot = self.next_slot;
        self.next_slot += 1;

        let pending = PendingQuery { socket: Arc::clone(&socket), client, issued_at: Instant::now() };
        if routed {
            for question in &query.questions {
                info!("[{}] -> {}", query.header.id, question.name);
            }
            self.routed_pool.insert(slot, pending);
        } else {
            self.regular_pool.insert(slot, pending);
        }

        self.exchanges.push(Box::pin(run_exchange(
            slot,
            socket,
            self.config.buffer_size,
            self.config.timeout,
        )));
        Ok(())
    }

    /// Reuse a pooled upstream socket or open a fresh one.
    async fn acquire_socket(&mut self) -> Result<Arc<UdpSocket>> {
        if let Some(socket) = self.free_pool.pop() {
            return Ok(socket);
        }
        let bind_addr: SocketAddr = if self.config.upstream_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(self.config.upstream_addr).await?;
        Ok(Arc::new(socket))
    }
}

/// Ephemeral socket budget: the soft fd limit minus what the process has
/// open right now.
fn fd_budget() -> usize {
    let soft = rlimit::getrlimit(rlimit::Resource::NOFILE)
        .map(|(soft, _hard)| soft)
        .unwrap_or(1024);
    let open = std::fs::read_dir("/proc/self/fd")
        .map(|entries| entries.count())
        .unwrap_or(0);
    (soft as usize).saturating_sub(open)
}
