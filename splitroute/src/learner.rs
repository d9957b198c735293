use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use sr_dns::{Message, RData, RecordType};
use sr_net::{reduce_subnets, AddressBits, Ipv4Network, Ipv6Network, Network};
use sr_routes::{RouteEvent, RouteEventKind};
use tracing::{info, warn};

use crate::cover::{CoverCache, COVER_CACHE_CAPACITY};

/// One entry of a reconciliation plan: install or withdraw a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteUpdate {
    pub destination: IpAddr,
    pub prefix_len: u8,
    pub gateway: IpAddr,
    pub install: bool,
}

/// Tracks the subnets currently forwarded through the policy gateway and
/// turns DNS answers into route-update plans.
///
/// The subnet sets move only on kernel route events, never on issued
/// commands, so the authoritative state is always what the kernel reports.
/// A command that is lost self-heals on the next answer carrying the same
/// address.
pub struct RouteLearner {
    gateway_v4: Ipv4Addr,
    gateway_v6: Option<Ipv6Addr>,
    subnets_v4: BTreeSet<Ipv4Network>,
    subnets_v6: BTreeSet<Ipv6Network>,
    cover_v4: CoverCache<u32>,
    cover_v6: CoverCache<u128>,
}

impl RouteLearner {
    pub fn new(gateway_v4: Ipv4Addr, gateway_v6: Option<Ipv6Addr>) -> Self {
        Self {
            gateway_v4,
            gateway_v6,
            subnets_v4: BTreeSet::new(),
            subnets_v6: BTreeSet::new(),
            cover_v4: CoverCache::new(COVER_CACHE_CAPACITY),
            cover_v6: CoverCache::new(COVER_CACHE_CAPACITY),
        }
    }

    pub fn subnets_v4(&self) -> &BTreeSet<Ipv4Network> {
        &self.subnets_v4
    }

    pub fn subnets_v6(&self) -> &BTreeSet<Ipv6Network> {
        &self.subnets_v6
    }

    /// Extract addresses from the answers of a routed response and compute
    /// the route updates needed to cover them.
    ///
    /// A answers always feed the IPv4 plan; AAAA answers only count when an
    /// IPv6 gateway is configured. Addresses already covered by an installed
    /// subnet are skipped via the cover caches.
    pub fn learn(&mut self, message: &Message) -> Vec<RouteUpdate> {
        let mut candidates_v4: BTreeSet<Ipv4Network> = BTreeSet::new();
        let mut candidates_v6: BTreeSet<Ipv6Network> = BTreeSet::new();

        for answer in &message.answers {
            match (answer.rr_type, &answer.rr_data) {
                (RecordType::A, RData::Raw(data)) if data.len() == 4 => {
                    let address = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                    if !covered(&mut self.cover_v4, &self.subnets_v4, address) {
                        candidates_v4.insert(Ipv4Network::host(address));
                    }
                }
                (RecordType::AAAA, RData::Raw(data))
                    if data.len() == 16 && self.gateway_v6.is_some() =>
                {
                    let mut octets = [0u8; 16];
                    octets.copy_from_slice(data);
                    let address = u128::from_be_bytes(octets);
                    if !covered(&mut self.cover_v6, &self.subnets_v6, address) {
                        candidates_v6.insert(Ipv6Network::host(address));
                    }
                }
                _ => {}
            }
        }

        let mut updates = Vec::new();
        if !candidates_v4.is_empty() {
            updates.extend(family_updates(
                plan(&self.subnets_v4, candidates_v4),
                IpAddr::V4(self.gateway_v4),
            ));
        }
        if let Some(gateway_v6) = self.gateway_v6 {
            if !candidates_v6.is_empty() {
                updates.extend(family_updates(
                    plan(&self.subnets_v6, candidates_v6),
                    IpAddr::V6(gateway_v6),
                ));
            }
        }
        updates
    }

    /// Apply a kernel route event. Routes via other gateways are ignored.
    pub fn apply_event(&mut self, event: &RouteEvent) {
        match (event.destination, event.gateway) {
            (IpAddr::V4(destination), Some(IpAddr::V4(gateway))) if gateway == self.gateway_v4 => {
                let network =
                    Ipv4Network::from_prefix(u32::from(destination), u32::from(event.prefix_len));
                match event.kind {
                    RouteEventKind::NewRoute => {
                        if self.subnets_v4.insert(network) {
                            info!("network added {network}");
                        }
                    }
                    RouteEventKind::DelRoute => {
                        if self.subnets_v4.remove(&network) {
                            info!("network deleted {network}");
                            self.cover_v4.clear();
                        } else {
                            warn!("network does not exist {network}");
                        }
                    }
                }
            }
            (IpAddr::V6(destination), Some(IpAddr::V6(gateway)))
                if Some(gateway) == self.gateway_v6 =>
            {
                let network =
                    Ipv6Network::from_prefix(u128::from(destination), u32::from(event.prefix_len));
                match event.kind {
                    RouteEventKind::NewRoute => {
                        if self.subnets_v6.insert(network) {
                            info!("network added {network}");
                        }
                    }
                    RouteEventKind::DelRoute => {
                        if self.subnets_v6.remove(&network) {
                            info!("network deleted {network}");
                            self.cover_v6.clear();
                        } else {
                            warn!("network does not exist {network}");
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

fn covered<B: AddressBits>(
    cache: &mut CoverCache<B>,
    subnets: &BTreeSet<Network<B>>,
    address: B,
) -> bool {
    if let Some(covered) = cache.lookup(address) {
        return covered;
    }
    let covered = subnets.iter().any(|network| network.contains(address));
    cache.insert(address, covered);
    covered
}

/// `new = reduce(current ∪ candidates)`; the plan is the symmetric
/// difference, tagged with membership in the new set.
fn plan<B: AddressBits>(
    current: &BTreeSet<Network<B>>,
    candidates: BTreeSet<Network<B>>,
) -> Vec<(Network<B>, bool)> {
    let reduced: BTreeSet<Network<B>> =
        reduce_subnets(current.iter().copied().chain(candidates)).into_iter().collect();
    current
        .symmetric_difference(&reduced)
        .map(|network| (*network, reduced.contains(network)))
        .collect()
}

fn family_updates<B: AddressBits>(
    plan: Vec<(Network<B>, bool)>,
    gateway: IpAddr,
) -> impl Iterator<Item = RouteUpdate>
where
    B::Addr: Into<IpAddr>,
{
    plan.into_iter().map(move |(network, install)| RouteUpdate {
        destination: B::Addr::from(network.address).into(),
        prefix_len: network.prefix_len() as u8,
        gateway,
        install,
    })
}
