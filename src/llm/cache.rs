// ============================================
// MENULENS - Analysis Result Cache
// Content-addressed, TTL-bound cache in front of the providers
// ============================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::store::CacheStore;
use crate::analysis::{AnalysisRequest, AnalysisResponse, ContentPart, DietaryType, MenuInput};
use crate::error::{AnalysisError, AnalysisResult};

/// Namespace prefix for every cache key in the store.
pub const CACHE_KEY_PREFIX: &str = "analysis_cache_";

/// Seven days.
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// One cached analysis. Never mutated; re-caching writes a new entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub response: AnalysisResponse,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, response: AnalysisResponse, ttl: Duration) -> Self {
        let created_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(7));
        Self {
            key: key.into(),
            response,
            created_at,
            expires_at: created_at
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Cached response re-addressed to the current caller.
    pub fn to_response(&self, request_id: &str, elapsed: Duration) -> AnalysisResponse {
        let mut response = self.response.clone();
        response.request_id = request_id.to_string();
        response.processing_time_ms = elapsed.as_millis() as u64;
        response.from_cache = true;
        response
    }
}

#[derive(Serialize)]
struct SemanticItem<'a> {
    name: &'a str,
    description: Option<&'a str>,
    ingredients: &'a [String],
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum SemanticPart<'a> {
    Text { text: &'a str },
    Image { mime_type: &'a str, sha256: String },
}

#[derive(Serialize)]
struct SemanticKey<'a> {
    dietary_type: DietaryType,
    custom_restrictions: Option<&'a str>,
    items: Vec<SemanticItem<'a>>,
    parts: Vec<SemanticPart<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a str>,
}

/// Content-derived key: SHA-256 over the semantic fields only.
/// The request id and any timestamps never take part.
pub fn cache_key(request: &AnalysisRequest) -> String {
    let prefs = &request.dietary_preferences;
    let mut semantic = SemanticKey {
        dietary_type: prefs.dietary_type,
        custom_restrictions: prefs
            .custom_restrictions
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty()),
        items: Vec::new(),
        parts: Vec::new(),
        context: None,
    };

    match &request.input {
        MenuInput::Items(items) => {
            semantic.items = items
                .iter()
                .map(|item| SemanticItem {
                    name: item.name.trim(),
                    description: item.description.as_deref().map(str::trim),
                    ingredients: &item.ingredients,
                })
                .collect();
        }
        MenuInput::Parts(parts) => {
            semantic.parts = parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => SemanticPart::Text { text: text.trim() },
                    ContentPart::Image { mime_type, data } => SemanticPart::Image {
                        mime_type,
                        sha256: hex::encode(Sha256::digest(data)),
                    },
                })
                .collect();
            // Part-based keys also cover the context
            semantic.context = request
                .context
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty());
        }
    }

    // Serializing borrowed strings and enums cannot fail
    let canonical = serde_json::to_vec(&semantic).unwrap_or_default();
    format!("{}{}", CACHE_KEY_PREFIX, hex::encode(Sha256::digest(&canonical)))
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

enum Lookup {
    Valid(CacheEntry),
    Missing,
    /// An expired or unreadable entry was found and deleted.
    Dropped,
}

/// TTL cache over a [`CacheStore`]. Each key's check-then-act sequence runs
/// under its own async lock.
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            key_locks: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks.entry(key.to_string()).or_default().clone()
    }

    async fn release(&self, key: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        let mut locks = self.key_locks.lock().await;
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }

    /// Read one entry; expired or unreadable entries are deleted. Caller holds the key lock.
    async fn read_valid(&self, key: &str) -> AnalysisResult<Lookup> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(Lookup::Missing);
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Dropping unreadable cache entry {}: {}", key, e);
                self.store.delete(key).await?;
                return Ok(Lookup::Dropped);
            }
        };

        if entry.is_expired() {
            tracing::debug!("Cache entry {} expired at {}", key, entry.expires_at);
            self.store.delete(key).await?;
            return Ok(Lookup::Dropped);
        }

        Ok(Lookup::Valid(entry))
    }

    /// Look up a still-valid entry and return it addressed to `request_id`.
    /// Storage failures are logged and count as a miss.
    pub async fn get(
        &self,
        key: &str,
        request_id: &str,
        started: Instant,
    ) -> Option<AnalysisResponse> {
        let lock = self.lock_for(key).await;
        let result = {
            let _guard = lock.lock().await;
            self.read_valid(key).await
        };
        self.release(key, lock).await;

        match result {
            Ok(Lookup::Valid(entry)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Cache hit for {}", key);
                Some(entry.to_response(request_id, started.elapsed()))
            }
            Ok(Lookup::Missing | Lookup::Dropped) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Cache lookup failed, treating as miss: {}", e);
                None
            }
        }
    }

    /// Store a successful response under `key` with a fresh TTL.
    pub async fn put(&self, key: &str, response: &AnalysisResponse) -> AnalysisResult<()> {
        if !response.success {
            return Err(AnalysisError::Storage(
                "refusing to cache a failed analysis".to_string(),
            ));
        }

        let mut stored = response.clone();
        stored.from_cache = false;
        let entry = CacheEntry::new(key, stored, self.ttl);
        let raw = serde_json::to_string(&entry)
            .map_err(|e| AnalysisError::Storage(format!("cannot serialize entry: {}", e)))?;

        let lock = self.lock_for(key).await;
        let result = {
            let _guard = lock.lock().await;
            self.store.put(key, raw).await
        };
        self.release(key, lock).await;
        result
    }

    /// Write an entry as-is. Used to seed or import entries.
    pub async fn put_entry(&self, entry: &CacheEntry) -> AnalysisResult<()> {
        let raw = serde_json::to_string(entry)
            .map_err(|e| AnalysisError::Storage(format!("cannot serialize entry: {}", e)))?;

        let lock = self.lock_for(&entry.key).await;
        let result = {
            let _guard = lock.lock().await;
            self.store.put(&entry.key, raw).await
        };
        self.release(&entry.key, lock).await;
        result
    }

    /// Delete every namespaced entry.
    pub async fn clear(&self) -> AnalysisResult<usize> {
        let removed = self.store.delete_prefix(CACHE_KEY_PREFIX).await?;
        tracing::info!("Cleared {} cached analyses", removed);
        Ok(removed)
    }

    /// Remove every expired entry now instead of waiting for lookups.
    pub async fn purge_expired(&self) -> AnalysisResult<usize> {
        let mut purged = 0;
        for key in self.store.keys_with_prefix(CACHE_KEY_PREFIX).await? {
            let lock = self.lock_for(&key).await;
            let lookup = {
                let _guard = lock.lock().await;
                self.read_valid(&key).await
            };
            self.release(&key, lock).await;
            if let Lookup::Dropped = lookup? {
                purged += 1;
            }
        }
        Ok(purged)
    }

    pub async fn stats(&self) -> AnalysisResult<CacheStats> {
        let keys = self.store.keys_with_prefix(CACHE_KEY_PREFIX).await?;
        let now = Utc::now();
        let mut expired = 0;

        for key in &keys {
            if let Some(raw) = self.store.get(key).await? {
                let stale = serde_json::from_str::<CacheEntry>(&raw)
                    .map(|entry| entry.is_expired_at(now))
                    .unwrap_or(true);
                if stale {
                    expired += 1;
                }
            }
        }

        Ok(CacheStats {
            total_entries: keys.len(),
            expired_entries: expired,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{
        DietaryPreferences, FoodAnalysisResult, MenuItem, Suitability,
    };
    use crate::llm::store::MemoryCacheStore;
    use async_trait::async_trait;

    /// Memory store whose deletes always fail.
    struct ReadOnlyStore(MemoryCacheStore);

    #[async_trait]
    impl CacheStore for ReadOnlyStore {
        async fn get(&self, key: &str) -> AnalysisResult<Option<String>> {
            self.0.get(key).await
        }
        async fn put(&self, key: &str, value: String) -> AnalysisResult<()> {
            self.0.put(key, value).await
        }
        async fn delete(&self, _key: &str) -> AnalysisResult<()> {
            Err(AnalysisError::Storage("read-only".to_string()))
        }
        async fn keys_with_prefix(&self, prefix: &str) -> AnalysisResult<Vec<String>> {
            self.0.keys_with_prefix(prefix).await
        }
        async fn delete_prefix(&self, _prefix: &str) -> AnalysisResult<usize> {
            Err(AnalysisError::Storage("read-only".to_string()))
        }
    }

    fn stale(key: &str) -> CacheEntry {
        let mut entry = CacheEntry::new(key, response("old"), DEFAULT_TTL);
        entry.expires_at = Utc::now() - chrono::Duration::days(1);
        entry
    }

    fn request(id: &str) -> AnalysisRequest {
        AnalysisRequest::for_items(
            DietaryPreferences::new(DietaryType::Vegan).with_restrictions("no soy"),
            vec![MenuItem::new("1", "Garden Salad")
                .with_description("Mixed greens")
                .with_ingredients(["lettuce", "tomato"])],
        )
        .with_request_id(id)
    }

    fn response(request_id: &str) -> AnalysisResponse {
        AnalysisResponse {
            success: true,
            results: vec![FoodAnalysisResult {
                item_id: "1".to_string(),
                item_name: "Garden Salad".to_string(),
                suitability: Suitability::Safe,
                explanation: "Only vegetables".to_string(),
                questions: None,
                confidence: 0.9,
                concerns: None,
            }],
            confidence: 0.9,
            message: None,
            request_id: request_id.to_string(),
            processing_time_ms: 840,
            provider: Some("gemini".to_string()),
            from_cache: false,
        }
    }

    #[test]
    fn test_key_ignores_request_id() {
        assert_eq!(cache_key(&request("a")), cache_key(&request("b")));
        assert!(cache_key(&request("a")).starts_with(CACHE_KEY_PREFIX));
    }

    #[test]
    fn test_key_ignores_item_ids_and_price() {
        let mut other = request("x");
        if let MenuInput::Items(items) = &mut other.input {
            items[0].id = "something-else".to_string();
            items[0].price = Some("$9".to_string());
        }
        assert_eq!(cache_key(&request("x")), cache_key(&other));
    }

    #[test]
    fn test_key_tracks_semantic_fields() {
        let base = cache_key(&request("x"));

        let mut diet = request("x");
        diet.dietary_preferences.dietary_type = DietaryType::Vegetarian;
        assert_ne!(base, cache_key(&diet));

        let mut ingredients = request("x");
        if let MenuInput::Items(items) = &mut ingredients.input {
            items[0].ingredients.push("feta".to_string());
        }
        assert_ne!(base, cache_key(&ingredients));
    }

    #[test]
    fn test_multimodal_key_covers_images_and_context() {
        let parts = |bytes: Vec<u8>| {
            AnalysisRequest::multimodal(
                DietaryPreferences::new(DietaryType::Vegan),
                vec![ContentPart::text("dinner menu"), ContentPart::image("image/png", bytes)],
            )
        };

        let base = cache_key(&parts(vec![1, 2, 3]));
        assert_eq!(base, cache_key(&parts(vec![1, 2, 3]).with_request_id("other")));
        assert_ne!(base, cache_key(&parts(vec![1, 2, 4])));
        assert_ne!(base, cache_key(&parts(vec![1, 2, 3]).with_context("Thai restaurant")));
    }

    #[tokio::test]
    async fn test_hit_substitutes_request_id() {
        let cache = ResultCache::new(Arc::new(MemoryCacheStore::new()), DEFAULT_TTL);
        let key = cache_key(&request("first"));
        cache.put(&key, &response("first")).await.unwrap();

        let hit = cache.get(&key, "second", Instant::now()).await.unwrap();
        assert_eq!(hit.request_id, "second");
        assert_eq!(hit.results, response("first").results);
        assert!(hit.from_cache);
        assert!(hit.processing_time_ms < 840);
    }

    #[tokio::test]
    async fn test_expired_entry_is_removed() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = ResultCache::new(store.clone(), DEFAULT_TTL);
        let key = cache_key(&request("r"));

        let mut entry = CacheEntry::new(key.clone(), response("r"), DEFAULT_TTL);
        entry.expires_at = Utc::now() - chrono::Duration::minutes(1);
        cache.put_entry(&entry).await.unwrap();
        assert_eq!(store.len(), 1);

        assert!(cache.get(&key, "r2", Instant::now()).await.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_failed_responses_are_not_cached() {
        let cache = ResultCache::new(Arc::new(MemoryCacheStore::new()), DEFAULT_TTL);
        let failed = AnalysisResponse::failure("r", "boom", Duration::ZERO);
        assert!(cache.put("analysis_cache_x", &failed).await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let store = Arc::new(MemoryCacheStore::new());
        store.put("analysis_cache_bad", "{not json".to_string()).await.unwrap();
        let cache = ResultCache::new(store.clone(), DEFAULT_TTL);

        assert!(cache.get("analysis_cache_bad", "r", Instant::now()).await.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_purge_and_stats() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = ResultCache::new(store.clone(), DEFAULT_TTL);

        cache.put("analysis_cache_live", &response("a")).await.unwrap();
        let mut stale = CacheEntry::new("analysis_cache_stale", response("b"), DEFAULT_TTL);
        stale.expires_at = Utc::now() - chrono::Duration::days(1);
        cache.put_entry(&stale).await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.expired_entries, 1);

        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        assert_eq!(cache.clear().await.unwrap(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_purge_counts_only_dropped_entries() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = ResultCache::new(store.clone(), DEFAULT_TTL);

        cache.put("analysis_cache_live", &response("a")).await.unwrap();
        cache.put_entry(&stale("analysis_cache_old")).await.unwrap();
        store.put("analysis_cache_bad", "{not json".to_string()).await.unwrap();

        assert_eq!(cache.purge_expired().await.unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert!(cache.key_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_purge_failure_releases_key_lock() {
        let cache = ResultCache::new(
            Arc::new(ReadOnlyStore(MemoryCacheStore::new())),
            DEFAULT_TTL,
        );
        cache.put_entry(&stale("analysis_cache_old")).await.unwrap();

        assert!(cache.purge_expired().await.is_err());
        assert!(cache.key_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_put_entry_waits_for_key_lock() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = Arc::new(ResultCache::new(store.clone(), DEFAULT_TTL));
        let entry = CacheEntry::new("analysis_cache_k", response("a"), DEFAULT_TTL);

        let lock = cache.lock_for(&entry.key).await;
        let guard = lock.lock().await;

        let writer = {
            let cache = cache.clone();
            let entry = entry.clone();
            tokio::spawn(async move { cache.put_entry(&entry).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.is_empty());

        drop(guard);
        writer.await.unwrap().unwrap();
        cache.release(&entry.key, lock).await;
        assert_eq!(store.len(), 1);
        assert!(cache.key_locks.lock().await.is_empty());
    }
}
