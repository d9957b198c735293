use std::net::IpAddr;

use futures_util::{StreamExt, TryStreamExt};
use netlink_packet_route::route::{
    RouteAddress, RouteAttribute, RouteHeader, RouteMessage, RouteProtocol, RouteScope, RouteType,
};
use netlink_packet_route::AddressFamily;
use netlink_sys::AsyncSocket;
use rtnetlink::constants::{RTMGRP_IPV4_ROUTE, RTMGRP_IPV6_ROUTE};
use rtnetlink::{Handle, IpVersion};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::event::{RouteEvent, RouteEventKind};

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("netlink connection failed: {0}")]
    Connect(#[from] std::io::Error),
    #[error("netlink request failed: {0}")]
    Request(#[from] rtnetlink::Error),
    #[error("destination {destination} and gateway {gateway} are different address families")]
    FamilyMismatch { destination: IpAddr, gateway: IpAddr },
}

/// Command half of the route-management channel. Cheap to clone; all
/// requests go through the shared connection task.
#[derive(Clone)]
pub struct RouteClient {
    handle: Handle,
}

/// Open the netlink route socket, subscribe to IPv4/IPv6 route change
/// notifications, and spawn the connection driver.
///
/// Returns the command client and the receiver of asynchronous
/// [`RouteEvent`]s. The receiver closes if the connection task dies.
pub fn connect() -> Result<(RouteClient, mpsc::UnboundedReceiver<RouteEvent>), RouteError> {
    let (mut connection, handle, mut messages) = rtnetlink::new_connection()?;

    let groups = RTMGRP_IPV4_ROUTE | RTMGRP_IPV6_ROUTE;
    let addr = netlink_sys::SocketAddr::new(0, groups);
    connection.socket_mut().socket_mut().bind(&addr)?;

    tokio::spawn(connection);

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some((message, _addr)) = messages.next().await {
            if let Some(event) = RouteEvent::from_netlink(&message) {
                if event_tx.send(event).is_err() {
                    break;
                }
            }
        }
        debug!("netlink notification stream ended");
    });

    Ok((RouteClient { handle }, event_rx))
}

impl RouteClient {
    /// Install a unicast route to `destination/prefix_len` via `gateway` in
    /// the main table (protocol static), replacing any existing entry.
    pub async fn add_route(
        &self,
        destination: IpAddr,
        prefix_len: u8,
        gateway: IpAddr,
    ) -> Result<(), RouteError> {
        match (destination, gateway) {
            (IpAddr::V4(destination), IpAddr::V4(gateway)) => {
                let mut request = self
                    .handle
                    .route()
                    .add()
                    .v4()
                    .destination_prefix(destination, prefix_len)
                    .gateway(gateway)
                    .replace();
                request.message_mut().header.protocol = RouteProtocol::Static;
                request.execute().await?;
            }
            (IpAddr::V6(destination), IpAddr::V6(gateway)) => {
                let mut request = self
                    .handle
                    .route()
                    .add()
                    .v6()
                    .destination_prefix(destination, prefix_len)
                    .gateway(gateway)
                    .replace();
                request.message_mut().header.protocol = RouteProtocol::Static;
                request.execute().await?;
            }
            _ => return Err(RouteError::FamilyMismatch { destination, gateway }),
        }
        Ok(())
    }

    /// Remove the route to `destination/prefix_len` via `gateway` from the
    /// main table.
    pub async fn del_route(
        &self,
        destination: IpAddr,
        prefix_len: u8,
        gateway: IpAddr,
    ) -> Result<(), RouteError> {
        if destination.is_ipv4() != gateway.is_ipv4() {
            return Err(RouteError::FamilyMismatch { destination, gateway });
        }
        let message = route_message(destination, prefix_len, gateway);
        self.handle.route().del(message).execute().await?;
        Ok(())
    }

    /// Dump the current routes of one family as `NewRoute`-shaped events.
    pub async fn dump_routes(&self, ip_version: IpVersion) -> Result<Vec<RouteEvent>, RouteError> {
        let mut stream = self.handle.route().get(ip_version).execute();
        let mut events = Vec::new();
        while let Some(message) = stream.try_next().await? {
            if let Some(event) = RouteEvent::from_message(&message, RouteEventKind::NewRoute) {
                events.push(event);
            }
        }
        Ok(events)
    }
}

/// Route message carrying the schema every command uses: main table, static
/// protocol, universe scope, unicast type, destination + gateway attributes.
fn route_message(destination: IpAddr, prefix_len: u8, gateway: IpAddr) -> RouteMessage {
    let mut message = RouteMessage::default();
    message.header.table = RouteHeader::RT_TABLE_MAIN;
    message.header.protocol = RouteProtocol::Static;
    message.header.scope = RouteScope::Universe;
    message.header.kind = RouteType::Unicast;
    message.header.destination_prefix_length = prefix_len;

    match destination {
        IpAddr::V4(addr) => {
            message.header.address_family = AddressFamily::Inet;
            message
                .attributes
                .push(RouteAttribute::Destination(RouteAddress::Inet(addr)));
        }
        IpAddr::V6(addr) => {
            message.header.address_family = AddressFamily::Inet6;
            message
                .attributes
                .push(RouteAttribute::Destination(RouteAddress::Inet6(addr)));
        }
    }
    match gateway {
        IpAddr::V4(addr) => message
            .attributes
            .push(RouteAttribute::Gateway(RouteAddress::Inet(addr))),
        IpAddr::V6(addr) => message
            .attributes
            .push(RouteAttribute::Gateway(RouteAddress::Inet6(addr))),
    }

    message
}
