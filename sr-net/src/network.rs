use std::fmt;
use std::hash::Hash;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::ops::{BitAnd, BitXor, Shl, Shr};
use std::str::FromStr;

use thiserror::Error;

/// Text that is neither `"A"` nor `"A/N"` for the requested address family.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0:?} is not a network address")]
pub struct BadNetwork(pub String);

mod sealed {
    pub trait Sealed {}
    impl Sealed for u32 {}
    impl Sealed for u128 {}
}

/// Integer backing store of one address family.
///
/// The two families differ only in width, the all-ones constant, the reducer
/// floor and the textual address form; everything else in this crate is
/// written once over this trait.
pub trait AddressBits:
    sealed::Sealed
    + Copy
    + Ord
    + Eq
    + Hash
    + fmt::Debug
    + BitAnd<Output = Self>
    + BitXor<Output = Self>
    + Shl<u32, Output = Self>
    + Shr<u32, Output = Self>
    + From<Self::Addr>
{
    /// Std address type used for text formatting and parsing.
    type Addr: fmt::Display + FromStr + Copy + From<Self>;

    const WIDTH: u32;
    const ZERO: Self;
    const ALL_ONES: Self;
    /// Widest mask the reducer may produce for this family.
    const MIN_MASK: Self;

    fn leading_zeros(self) -> u32;
}

impl AddressBits for u32 {
    type Addr = Ipv4Addr;

    const WIDTH: u32 = 32;
    const ZERO: Self = 0;
    const ALL_ONES: Self = u32::MAX;
    const MIN_MASK: Self = 0xFF00_0000;

    fn leading_zeros(self) -> u32 {
        u32::leading_zeros(self)
    }
}

impl AddressBits for u128 {
    type Addr = Ipv6Addr;

    const WIDTH: u32 = 128;
    const ZERO: Self = 0;
    const ALL_ONES: Self = u128::MAX;
    const MIN_MASK: Self = u128::MAX ^ (u128::MAX >> 32);

    fn leading_zeros(self) -> u32 {
        u128::leading_zeros(self)
    }
}

/// `mask == ALL_ONES ^ (ALL_ONES >> prefix_len)`, saturating at full width.
pub fn prefix_len_to_mask<B: AddressBits>(prefix_len: u32) -> B {
    if prefix_len == 0 {
        B::ZERO
    } else if prefix_len >= B::WIDTH {
        B::ALL_ONES
    } else {
        B::ALL_ONES ^ (B::ALL_ONES >> prefix_len)
    }
}

/// Inverse of [`prefix_len_to_mask`] for contiguous masks.
pub fn mask_to_prefix_len<B: AddressBits>(mask: B) -> u32 {
    (B::ALL_ONES ^ mask).leading_zeros()
}

/// A subnet as an (address, mask) integer pair.
///
/// The address is always masked, so `address & mask == address` holds by
/// construction. Ordering is by (address, mask), which is what the reducer
/// sweep relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Network<B: AddressBits> {
    pub address: B,
    pub mask: B,
}

pub type Ipv4Network = Network<u32>;
pub type Ipv6Network = Network<u128>;

impl<B: AddressBits> Network<B> {
    pub fn new(address: B, mask: B) -> Self {
        Self { address: address & mask, mask }
    }

    /// Host network: the address with a full-width mask.
    pub fn host(address: B) -> Self {
        Self { address, mask: B::ALL_ONES }
    }

    pub fn from_prefix(address: B, prefix_len: u32) -> Self {
        Self::new(address, prefix_len_to_mask(prefix_len))
    }

    pub fn prefix_len(&self) -> u32 {
        mask_to_prefix_len(self.mask)
    }

    pub fn contains(&self, address: B) -> bool {
        address & self.mask == self.address
    }
}

impl<B: AddressBits> fmt::Display for Network<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", B::Addr::from(self.address), self.prefix_len())
    }
}

impl<B: AddressBits> FromStr for Network<B> {
    type Err = BadNetwork;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let bad = || BadNetwork(text.to_string());

        match text.split_once('/') {
            None => {
                let addr: B::Addr = text.parse().map_err(|_| bad())?;
                Ok(Self::host(addr.into()))
            }
            Some((addr, prefix)) => {
                let addr: B::Addr = addr.parse().map_err(|_| bad())?;
                let prefix_len: u32 = prefix.parse().map_err(|_| bad())?;
                if prefix_len > B::WIDTH {
                    return Err(bad());
                }
                Ok(Self::from_prefix(addr.into(), prefix_len))
            }
        }
    }
}
