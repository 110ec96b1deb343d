//! Expiry sweep, full clear and statistics

use chrono::Utc;
use futures::TryStreamExt;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

use crate::cache::AssetCache;
use crate::error::Result;
use crate::types::{CacheStats, MaintenanceReport};

impl AssetCache {
    /// Store size plus hit/miss counters since startup
    pub async fn stats(&self) -> Result<CacheStats> {
        let store = self.inner.store.stats().await?;
        let counters = &self.inner.counters;
        Ok(CacheStats {
            count: store.count,
            total_bytes: store.total_bytes,
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
        })
    }

    /// Delete every stored entry older than the TTL and revoke the live
    /// handles for those keys.
    ///
    /// Each candidate is re-read before it is deleted, so an entry that was
    /// refetched while the scan ran survives along with its handle.
    pub async fn clean_expired(&self) -> Result<MaintenanceReport> {
        let now = Utc::now();
        let mut report = MaintenanceReport::default();
        let mut expired = Vec::new();

        {
            let mut entries = self.inner.store.entries();
            while let Some(entry) = entries.try_next().await? {
                report.scanned += 1;
                if self.inner.config.is_expired(entry.stored_at, now) {
                    expired.push(entry.key);
                }
            }
        }

        let config = &self.inner.config;
        for key in &expired {
            let still_expired = match self.inner.store.get(key).await {
                Some(entry) => config.is_expired(entry.stored_at, now),
                None => false,
            };
            if still_expired {
                self.inner.store.delete(key).await?;
                report.removed += 1;
            } else {
                debug!(kind = %self.kind(), key = %key, "Asset replaced during sweep, keeping it");
            }

            let revoked = self
                .inner
                .index()
                .invalidate_expired(key, |stored_at| config.is_expired(stored_at, now));
            if revoked {
                report.revoked_handles += 1;
            }
        }

        info!(
            kind = %self.kind(),
            scanned = report.scanned,
            removed = report.removed,
            revoked = report.revoked_handles,
            "Cleaned expired assets"
        );
        Ok(report)
    }

    /// Delete every stored entry and revoke every handle this cache owns.
    ///
    /// The index is cleared even if the store cannot be, so no stale handle
    /// survives; the store error is still returned. Loads that were in
    /// flight when the clear ran finish with a fallback and leave nothing
    /// behind in the index or the store.
    pub async fn clear_all(&self) -> Result<usize> {
        let cleared = self.inner.store.clear().await;
        let revoked = {
            let mut index = self.inner.index();
            self.inner.epoch.fetch_add(1, Ordering::AcqRel);
            index.invalidate_all()
        };

        match &cleared {
            Ok(()) => info!(kind = %self.kind(), revoked, "Cleared asset cache"),
            Err(e) => warn!(kind = %self.kind(), revoked, error = %e, "Failed to clear asset store"),
        }
        cleared?;
        Ok(revoked)
    }

    /// Run [`clean_expired`](Self::clean_expired) the first time this is
    /// called for this cache; later calls do nothing. Failures are logged.
    pub async fn sweep_on_start(&self) {
        if self.inner.swept_on_start.swap(true, Ordering::AcqRel) {
            debug!(kind = %self.kind(), "Startup sweep already ran");
            return;
        }

        if let Err(e) = self.clean_expired().await {
            warn!(kind = %self.kind(), error = %e, "Startup sweep failed");
        }
    }
}
