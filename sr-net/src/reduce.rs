use crate::network::{AddressBits, Network};

/// Collapse a set of networks into a minimal covering set.
///
/// Networks are sorted by (address, mask) and swept left to right. The
/// current accumulator is widened one octet of mask at a time while the next
/// address still falls inside the widened prefix; widening stops at the
/// family floor [`AddressBits::MIN_MASK`], at which point the accumulator is
/// emitted and the sweep restarts.
pub fn reduce_subnets<B, I>(networks: I) -> Vec<Network<B>>
where
    B: AddressBits,
    I: IntoIterator<Item = Network<B>>,
{
    let mut sorted: Vec<Network<B>> = networks.into_iter().collect();
    sorted.sort_unstable();

    let mut reduced = Vec::new();
    let mut idx = 0;

    while idx < sorted.len() {
        let mut accepted = sorted[idx];
        let mut candidate = Network::new(accepted.address, accepted.mask);
        idx += 1;

        'merge: while idx < sorted.len() {
            let address = sorted[idx].address;

            loop {
                if candidate.mask == B::MIN_MASK {
                    break 'merge;
                }
                if candidate.contains(address) {
                    accepted = candidate;
                    break;
                }
                candidate.mask = candidate.mask & (candidate.mask << 8);
                candidate.address = candidate.address & candidate.mask;
            }

            candidate = accepted;
            idx += 1;
        }

        reduced.push(accepted);
    }

    reduced
}
