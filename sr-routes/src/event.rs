use std::net::IpAddr;

use netlink_packet_core::{NetlinkMessage, NetlinkPayload};
use netlink_packet_route::route::{RouteAddress, RouteAttribute, RouteHeader, RouteMessage};
use netlink_packet_route::RouteNetlinkMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteEventKind {
    NewRoute,
    DelRoute,
}

/// A route add/remove notification (or one entry of a dump reply), reduced
/// to the attributes the proxy cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEvent {
    pub kind: RouteEventKind,
    pub destination: IpAddr,
    pub prefix_len: u8,
    pub gateway: Option<IpAddr>,
}

impl RouteEvent {
    /// Decode a route message. Returns `None` for routes outside the main
    /// table and for messages without a destination (default routes).
    pub fn from_message(message: &RouteMessage, kind: RouteEventKind) -> Option<Self> {
        if message.header.table != RouteHeader::RT_TABLE_MAIN {
            return None;
        }

        let mut destination = None;
        let mut gateway = None;
        for attribute in &message.attributes {
            match attribute {
                RouteAttribute::Destination(address) => destination = route_address_to_ip(address),
                RouteAttribute::Gateway(address) => gateway = route_address_to_ip(address),
                _ => {}
            }
        }

        Some(Self {
            kind,
            destination: destination?,
            prefix_len: message.header.destination_prefix_length,
            gateway,
        })
    }

    /// Decode a notification from the multicast channel. Non-route payloads
    /// yield `None`.
    pub fn from_netlink(message: &NetlinkMessage<RouteNetlinkMessage>) -> Option<Self> {
        match &message.payload {
            NetlinkPayload::InnerMessage(RouteNetlinkMessage::NewRoute(route)) => {
                Self::from_message(route, RouteEventKind::NewRoute)
            }
            NetlinkPayload::InnerMessage(RouteNetlinkMessage::DelRoute(route)) => {
                Self::from_message(route, RouteEventKind::DelRoute)
            }
            _ => None,
        }
    }
}

fn route_address_to_ip(address: &RouteAddress) -> Option<IpAddr> {
    match address {
        RouteAddress::Inet(addr) => Some(IpAddr::V4(*addr)),
        RouteAddress::Inet6(addr) => Some(IpAddr::V6(*addr)),
        _ => None,
    }
}
