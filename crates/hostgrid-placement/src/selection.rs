//! Final pick among the best-weighted hosts.

use rand::Rng;

use crate::weights::WeighedHost;

/// Pick one host from the top `subset_size` of `weighed` (best first).
///
/// A subset of one always returns the best host. Larger subsets pick
/// uniformly at random, which keeps concurrent schedulers from racing for
/// the same host. Returns `None` only when there are no candidates.
pub fn choose_host<R>(mut weighed: Vec<WeighedHost>, subset_size: usize, rng: &mut R) -> Option<WeighedHost>
where
    R: Rng + ?Sized,
{
    let size = subset_size.max(1).min(weighed.len());
    if size == 0 {
        return None;
    }
    weighed.truncate(size);
    let index = if size == 1 { 0 } else { rng.gen_range(0..size) };
    Some(weighed.swap_remove(index))
}
