use dashmap::DashMap;
use std::{
    hash::Hash,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tracing::debug;

/// Entrada de caché con TTL
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: u64,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            created_at: current_timestamp(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        current_timestamp() > self.created_at + ttl.as_secs()
    }
}

/// Caché acotada con expiración por TTL.
///
/// Se usa para los resultados de extracción de Bilibili: las URL de stream
/// resueltas siguen siendo válidas mientras dura la entrada, así que repetir
/// `/play` sobre el mismo video no vuelve a invocar yt-dlp.
#[derive(Debug)]
pub struct TtlCache<K: Clone + Eq + Hash, V> {
    data: Arc<DashMap<K, CacheEntry<V>>>,
    capacity: usize,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            capacity,
            ttl,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        if self.data.len() >= self.capacity {
            self.evict_oldest();
        }
        self.data.insert(key, CacheEntry::new(value));
    }

    pub fn get(&self, key: &K) -> Option<V> {
        if let Some(entry) = self.data.get(key) {
            if entry.is_expired(self.ttl) {
                drop(entry);
                self.data.remove(key);
                None
            } else {
                Some(entry.value.clone())
            }
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Limpia entradas expiradas y retorna el número de elementos removidos
    pub fn cleanup_expired(&self) -> usize {
        let keys_to_remove: Vec<K> = self
            .data
            .iter()
            .filter_map(|entry| {
                if entry.value().is_expired(self.ttl) {
                    Some(entry.key().clone())
                } else {
                    None
                }
            })
            .collect();

        let mut removed = 0;
        for key in keys_to_remove {
            if self.data.remove(&key).is_some() {
                removed += 1;
            }
        }

        if removed > 0 {
            debug!("Limpiadas {} entradas expiradas del cache", removed);
        }

        removed
    }

    /// Descarta la entrada más vieja cuando la capacidad se agota.
    fn evict_oldest(&self) {
        let oldest = self
            .data
            .iter()
            .min_by_key(|entry| entry.value().created_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            self.data.remove(&key);
        }
    }
}

impl<K, V> Clone for TtlCache<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            capacity: self.capacity,
            ttl: self.ttl,
        }
    }
}

/// Obtiene timestamp actual en segundos
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn inserta_y_recupera() {
        let cache: TtlCache<String, u32> = TtlCache::new(4, Duration::from_secs(60));
        cache.insert("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"b".to_string()), None);
    }

    #[test]
    fn entrada_expirada_se_descarta() {
        let cache: TtlCache<String, u32> = TtlCache::new(4, Duration::from_secs(0));
        cache.insert("a".to_string(), 1);
        std::thread::sleep(Duration::from_millis(1100));
        assert_eq!(cache.get(&"a".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn capacidad_acotada_desaloja_la_mas_vieja() {
        let cache: TtlCache<u32, u32> = TtlCache::new(2, Duration::from_secs(60));
        cache.insert(1, 1);
        cache.insert(2, 2);
        cache.insert(3, 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&3), Some(3));
    }
}
