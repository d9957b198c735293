//! Kernel route management over rtnetlink: add/delete/dump commands for
//! gateway routes in the main table, and the asynchronous route-change
//! event stream.

pub mod client;
pub mod event;

pub use client::{connect, RouteClient, RouteError};
pub use event::{RouteEvent, RouteEventKind};
pub use rtnetlink::IpVersion;
