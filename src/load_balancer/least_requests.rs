//! Load-aware strategies based on in-flight request counts.

use std::sync::Arc;

use rand::{Rng, RngCore};

use crate::runtime::EndpointInfo;

/// Select the endpoint with the fewest concurrent requests.
/// On a tie the first one is selected (stability).
pub fn least_requests(candidates: &[Arc<EndpointInfo>]) -> Option<&Arc<EndpointInfo>> {
    candidates.iter().min_by_key(|e| e.concurrent_requests())
}

/// Pick two distinct endpoints at random and keep the less loaded one.
pub fn power_of_two_choices<'a>(
    rng: &mut dyn RngCore,
    candidates: &'a [Arc<EndpointInfo>],
) -> Option<&'a Arc<EndpointInfo>> {
    match candidates.len() {
        0 => None,
        1 => candidates.first(),
        len => {
            let first = rng.gen_range(0..len);
            // Offset in 1..len guarantees a different second index.
            let second = (first + rng.gen_range(1..len)) % len;
            let (a, b) = (&candidates[first], &candidates[second]);
            if b.concurrent_requests() < a.concurrent_requests() {
                Some(b)
            } else {
                Some(a)
            }
        }
    }
}
