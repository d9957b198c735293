//! Address arithmetic shared by the proxy and the route client: integer
//! representations of IPv4/IPv6 addresses, network/prefix parsing, and the
//! subnet reducer.

pub mod network;
pub mod reduce;

pub use network::{
    mask_to_prefix_len, prefix_len_to_mask, AddressBits, BadNetwork, Ipv4Network, Ipv6Network,
    Network,
};
pub use reduce::reduce_subnets;
