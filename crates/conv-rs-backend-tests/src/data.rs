//! Deterministic reference data generation.

use std::sync::Arc;

use conv_rs::reference::{conv2d_nchw_dilated, relu};
use conv_rs::{ConvResult, ConvWorkload, Tensor};
use rand::{rngs::StdRng, SeedableRng};

use crate::cache::{CacheKey, ReferenceCache, ReferenceData};

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Draws uniform `[0, 1)` input and weight tensors seeded from the key fingerprint and computes
/// the expected outputs with the reference engine.
pub fn generate_reference(key: &CacheKey) -> ConvResult<ReferenceData> {
    let workload = key.workload;
    workload.validate()?;

    let mut rng = seeded_rng(key.fingerprint()?);
    let input = Tensor::uniform(key.input_shape.clone(), &mut rng);
    let weight = Tensor::uniform(key.weight_shape.clone(), &mut rng);
    let expected = conv2d_nchw_dilated(
        &input,
        &weight,
        workload.stride,
        workload.padding,
        workload.dilation,
    )?;
    let expected_relu = relu(&expected);
    Ok(ReferenceData {
        input,
        weight,
        expected,
        expected_relu,
    })
}

/// Returns cached reference data for `(test_id, workload)`, generating and storing it on a miss.
pub fn reference_data(
    test_id: &str,
    workload: ConvWorkload,
    cache: Option<&dyn ReferenceCache>,
) -> ConvResult<Arc<ReferenceData>> {
    let key = CacheKey::new(test_id, workload);
    let Some(cache) = cache else {
        return generate_reference(&key).map(Arc::new);
    };

    if let Some(hit) = cache.get(&key)? {
        tracing::debug!(%workload, test_id, "reference cache hit");
        return Ok(hit);
    }
    tracing::debug!(%workload, test_id, "reference cache miss");
    let data = Arc::new(generate_reference(&key)?);
    cache.put(&key, Arc::clone(&data))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[test]
    fn generation_is_reproducible_without_cache() {
        let workload = ConvWorkload::new(1, 2, 6, 3, 3, 1, 1);
        let a = reference_data("repro", workload, None).unwrap();
        let b = reference_data("repro", workload, None).unwrap();
        assert_eq!(a, b);
        assert!(a.input.data().iter().all(|v| (0.0..1.0).contains(v)));
        assert_eq!(a.expected_relu, relu(&a.expected));
    }

    #[test]
    fn cache_hit_returns_the_stored_instance() {
        let cache = MemoryCache::default();
        let workload = ConvWorkload::new(1, 2, 5, 2, 3, 2, 0);
        let first = reference_data("hit", workload, Some(&cache)).unwrap();
        let second = reference_data("hit", workload, Some(&cache)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalid_workload_is_rejected_before_generation() {
        let workload = ConvWorkload::new(1, 2, 2, 2, 5, 1, 0);
        let err = reference_data("bad", workload, None).unwrap_err();
        assert!(matches!(err, conv_rs::ConvError::InvalidParameter(_)));
    }
}
