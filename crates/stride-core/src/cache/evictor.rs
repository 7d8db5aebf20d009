//! Least-recently-used eviction with hysteresis.
//!
//! When the cache grows past its quota, entries are removed oldest access
//! first until the total falls to 80% of the quota, so the next insert does
//! not immediately trigger another pass.

/// Default blob cache quota: 50 MiB
pub const DEFAULT_CACHE_QUOTA_BYTES: u64 = 50 * 1024 * 1024;

/// Target fill after eviction, as a fraction of the quota (numerator / 10)
const TARGET_FILL_TENTHS: u64 = 8;

/// Size and access time of a cache entry, without its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntryMeta {
    pub url: String,
    pub size: u64,
    /// Last access (Unix ms)
    pub timestamp: i64,
}

/// Outcome of an eviction pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionPlan {
    /// Keys to delete, oldest access first
    pub evict: Vec<String>,
    pub freed_bytes: u64,
    /// Total size once the plan is applied
    pub resulting_size: u64,
}

impl EvictionPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.evict.is_empty()
    }
}

/// Pure LRU policy over blob-cache entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEvictor {
    quota: u64,
}

impl CacheEvictor {
    #[must_use]
    pub const fn new(quota: u64) -> Self {
        Self { quota }
    }

    #[must_use]
    pub const fn quota(&self) -> u64 {
        self.quota
    }

    /// Size the cache is trimmed down to once it overflows
    #[must_use]
    pub const fn target(&self) -> u64 {
        self.quota / 10 * TARGET_FILL_TENTHS + self.quota % 10 * TARGET_FILL_TENTHS / 10
    }

    /// Whether `total` bytes exceed the quota
    #[must_use]
    pub const fn exceeds_quota(&self, total: u64) -> bool {
        total > self.quota
    }

    /// Plan evictions for a cache of `total` bytes made up of `entries`.
    ///
    /// `total` may include bytes not listed in `entries` (an incoming blob that
    /// must not be evicted); those bytes count toward the size but are never
    /// chosen. Returns an empty plan when `total` is within quota.
    #[must_use]
    pub fn plan(&self, entries: &[CacheEntryMeta], total: u64) -> EvictionPlan {
        if !self.exceeds_quota(total) {
            return EvictionPlan {
                resulting_size: total,
                ..EvictionPlan::default()
            };
        }

        let mut ordered: Vec<&CacheEntryMeta> = entries.iter().collect();
        ordered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.url.cmp(&b.url)));

        let target = self.target();
        let mut remaining = total;
        let mut plan = EvictionPlan::default();
        for entry in ordered {
            if remaining <= target {
                break;
            }
            remaining = remaining.saturating_sub(entry.size);
            plan.freed_bytes += entry.size;
            plan.evict.push(entry.url.clone());
        }
        plan.resulting_size = remaining;
        plan
    }
}

impl Default for CacheEvictor {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_QUOTA_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn meta(url: &str, size: u64, timestamp: i64) -> CacheEntryMeta {
        CacheEntryMeta {
            url: url.to_string(),
            size,
            timestamp,
        }
    }

    #[test]
    fn target_is_eighty_percent() {
        assert_eq!(CacheEvictor::new(100).target(), 80);
        assert_eq!(CacheEvictor::new(1000).target(), 800);
        assert_eq!(CacheEvictor::new(15).target(), 12);
    }

    #[test]
    fn within_quota_evicts_nothing() {
        let evictor = CacheEvictor::new(100);
        let plan = evictor.plan(&[meta("a", 60, 1)], 100);
        assert!(plan.is_empty());
        assert_eq!(plan.resulting_size, 100);
    }

    #[test]
    fn overflow_evicts_oldest_access_first() {
        let evictor = CacheEvictor::new(100);
        let entries = [meta("a", 60, 1), meta("b", 50, 2)];
        let plan = evictor.plan(&entries, 110);
        assert_eq!(plan.evict, vec!["a".to_string()]);
        assert_eq!(plan.freed_bytes, 60);
        assert_eq!(plan.resulting_size, 50);
    }

    #[test]
    fn evicts_until_below_target_not_just_quota() {
        let evictor = CacheEvictor::new(100);
        let entries = [
            meta("c", 30, 3),
            meta("a", 30, 1),
            meta("b", 30, 2),
            meta("d", 15, 4),
        ];
        // 105 > 100; removing "a" leaves 75 <= 80
        let plan = evictor.plan(&entries, 105);
        assert_eq!(plan.evict, vec!["a".to_string()]);

        // 120 > 100; removing "a" leaves 90, "b" leaves 60
        let plan = evictor.plan(&entries, 120);
        assert_eq!(plan.evict, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(plan.resulting_size, 60);
    }

    #[test]
    fn unlisted_bytes_are_never_evicted() {
        let evictor = CacheEvictor::new(100);
        // Incoming 150-byte blob with only 10 bytes evictable
        let plan = evictor.plan(&[meta("a", 10, 1)], 160);
        assert_eq!(plan.evict, vec!["a".to_string()]);
        assert_eq!(plan.resulting_size, 150);
        assert!(evictor.exceeds_quota(plan.resulting_size));
    }
}
