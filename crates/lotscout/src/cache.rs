//! Read-through TTL cache for imagery references.
//!
//! Keys are coordinates rounded to four decimal places (~11 m), so nearby
//! requests for the same parcel share a cache entry. Entries expire after
//! the configured TTL (default 30 days); within it, repeated fetches never
//! hit the upstream provider again.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use moka::sync::Cache;

use crate::adapters::{AdapterError, ImageryProvider};
use crate::model::{ImageKind, ImageRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ImageCacheKey {
    lat_e4: i64,
    lon_e4: i64,
    kind: ImageKind,
}

impl ImageCacheKey {
    fn new(lat: f64, lon: f64, kind: ImageKind) -> Self {
        Self {
            lat_e4: (lat * 10_000.0).round() as i64,
            lon_e4: (lon * 10_000.0).round() as i64,
            kind,
        }
    }
}

/// Imagery provider wrapper with a TTL cache in front.
pub struct CachedImagery {
    inner: Arc<dyn ImageryProvider>,
    cache: Cache<ImageCacheKey, ImageRef>,
}

impl CachedImagery {
    pub fn new(inner: Arc<dyn ImageryProvider>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(ttl)
            .build();
        Self { inner, cache }
    }

    /// Number of live entries, for tests and diagnostics.
    pub fn entry_count(&self) -> u64 {
        // `moka` updates its entry count lazily; flush pending maintenance so
        // the reported count reflects completed inserts.
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

impl ImageryProvider for CachedImagery {
    fn fetch_image(&self, lat: f64, lon: f64, kind: ImageKind) -> Result<ImageRef, AdapterError> {
        let key = ImageCacheKey::new(lat, lon, kind);

        if let Some(mut hit) = self.cache.get(&key) {
            debug!("Imagery cache hit for {:?}", key);
            if !hit.provider.ends_with(" (cached)") {
                hit.provider.push_str(" (cached)");
            }
            return Ok(hit);
        }

        let fetched = self.inner.fetch_image(lat, lon, kind)?;
        self.cache.insert(key, fetched.clone());
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingProvider {
        calls: AtomicU32,
    }

    impl ImageryProvider for CountingProvider {
        fn fetch_image(
            &self,
            lat: f64,
            lon: f64,
            kind: ImageKind,
        ) -> Result<ImageRef, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ImageRef {
                url: format!("https://img.example/{}/{},{}", kind.as_str(), lat, lon),
                provider: "img.example".to_string(),
            })
        }
    }

    fn cached_with_counter(ttl: Duration) -> (Arc<CountingProvider>, CachedImagery) {
        let counter = Arc::new(CountingProvider {
            calls: AtomicU32::new(0),
        });
        let cached = CachedImagery::new(counter.clone(), ttl);
        (counter, cached)
    }

    #[test]
    fn test_repeated_fetch_hits_cache() {
        let (counter, cached) = cached_with_counter(Duration::from_secs(3600));

        let first = cached.fetch_image(34.85, -82.4, ImageKind::Satellite).unwrap();
        let second = cached.fetch_image(34.85, -82.4, ImageKind::Satellite).unwrap();

        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.provider, "img.example");
        assert_eq!(second.provider, "img.example (cached)");
        assert_eq!(first.url, second.url);
    }

    #[test]
    fn test_nearby_coordinates_share_entry() {
        let (counter, cached) = cached_with_counter(Duration::from_secs(3600));

        // Within the 1e-4 degree rounding radius.
        cached.fetch_image(34.85001, -82.40002, ImageKind::Satellite).unwrap();
        cached.fetch_image(34.85003, -82.39998, ImageKind::Satellite).unwrap();

        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_distinct_kinds_are_distinct_entries() {
        let (counter, cached) = cached_with_counter(Duration::from_secs(3600));

        cached.fetch_image(34.85, -82.4, ImageKind::Satellite).unwrap();
        cached.fetch_image(34.85, -82.4, ImageKind::Street).unwrap();

        assert_eq!(counter.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_distant_coordinates_miss() {
        let (counter, cached) = cached_with_counter(Duration::from_secs(3600));

        cached.fetch_image(34.85, -82.4, ImageKind::Satellite).unwrap();
        cached.fetch_image(34.95, -82.4, ImageKind::Satellite).unwrap();

        assert_eq!(counter.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_expired_entry_refetches() {
        let (counter, cached) = cached_with_counter(Duration::from_millis(20));

        cached.fetch_image(34.85, -82.4, ImageKind::Satellite).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        cached.fetch_image(34.85, -82.4, ImageKind::Satellite).unwrap();

        assert_eq!(counter.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_provider_error_is_not_cached() {
        struct FlakyProvider {
            calls: AtomicU32,
        }
        impl ImageryProvider for FlakyProvider {
            fn fetch_image(
                &self,
                _lat: f64,
                _lon: f64,
                _kind: ImageKind,
            ) -> Result<ImageRef, AdapterError> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(AdapterError::Transient("down".into()))
                } else {
                    Ok(ImageRef {
                        url: "https://img.example/x".to_string(),
                        provider: "img.example".to_string(),
                    })
                }
            }
        }

        let flaky = Arc::new(FlakyProvider {
            calls: AtomicU32::new(0),
        });
        let cached = CachedImagery::new(flaky.clone(), Duration::from_secs(3600));

        assert!(cached.fetch_image(34.85, -82.4, ImageKind::Satellite).is_err());
        assert!(cached.fetch_image(34.85, -82.4, ImageKind::Satellite).is_ok());
        assert_eq!(cached.entry_count(), 1);
    }
}
