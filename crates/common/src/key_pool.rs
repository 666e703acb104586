use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Etherscan,
    Alchemy,
    Bitquery,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Etherscan => "etherscan",
            Self::Alchemy => "alchemy",
            Self::Bitquery => "bitquery",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyPoolError {
    #[error("no API keys configured for {0}")]
    NoKeys(&'static str),
}

/// Per-provider credential ring. Every `next` call rotates left by one and
/// hands out the new head, so with keys `[a, b, c]` the sequence is `b, c, a, b, …`.
#[derive(Debug, Default)]
pub struct KeyPool {
    rings: Mutex<HashMap<Provider, VecDeque<String>>>,
}

impl KeyPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys(mut self, provider: Provider, keys: Vec<String>) -> Self {
        let keys: VecDeque<String> = keys.into_iter().filter(|k| !k.is_empty()).collect();
        self.rings
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(provider, keys);
        self
    }

    pub fn from_config(providers: &crate::config::Providers) -> Self {
        Self::new()
            .with_keys(Provider::Etherscan, providers.etherscan_api_keys.clone())
            .with_keys(Provider::Alchemy, providers.alchemy_api_keys.clone())
            .with_keys(Provider::Bitquery, providers.bitquery_api_keys.clone())
    }

    pub fn next(&self, provider: Provider) -> Result<String, KeyPoolError> {
        let mut rings = self
            .rings
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let ring = rings
            .get_mut(&provider)
            .filter(|r| !r.is_empty())
            .ok_or(KeyPoolError::NoKeys(provider.as_str()))?;
        ring.rotate_left(1);
        let key = ring.front().cloned().ok_or(KeyPoolError::NoKeys(provider.as_str()));
        drop(rings);
        key
    }

    /// Logs how many keys each provider has, without the keys themselves.
    pub fn log_key_counts(&self) {
        tracing::info!(
            etherscan = self.key_count(Provider::Etherscan),
            alchemy = self.key_count(Provider::Alchemy),
            bitquery = self.key_count(Provider::Bitquery),
            "provider keys configured"
        );
    }

    pub fn key_count(&self, provider: Provider) -> usize {
        self.rings
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&provider)
            .map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn keys(v: &[&str]) -> Vec<String> {
        v.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_rotates_left_before_returning_head() {
        let pool = KeyPool::new().with_keys(Provider::Bitquery, keys(&["a", "b", "c"]));
        let seen: Vec<String> = (0..4).map(|_| pool.next(Provider::Bitquery).unwrap()).collect();
        assert_eq!(seen, vec!["b", "c", "a", "b"]);
    }

    #[test]
    fn test_single_key_always_returned() {
        let pool = KeyPool::new().with_keys(Provider::Alchemy, keys(&["only"]));
        assert_eq!(pool.next(Provider::Alchemy).unwrap(), "only");
        assert_eq!(pool.next(Provider::Alchemy).unwrap(), "only");
    }

    #[test]
    fn test_missing_provider_is_configuration_error() {
        let pool = KeyPool::new().with_keys(Provider::Etherscan, keys(&[""]));
        assert_eq!(
            pool.next(Provider::Etherscan),
            Err(KeyPoolError::NoKeys("etherscan"))
        );
        assert_eq!(
            pool.next(Provider::Alchemy),
            Err(KeyPoolError::NoKeys("alchemy"))
        );
    }

    #[test]
    fn test_providers_rotate_independently() {
        let pool = KeyPool::new()
            .with_keys(Provider::Etherscan, keys(&["e1", "e2"]))
            .with_keys(Provider::Bitquery, keys(&["b1", "b2"]));
        assert_eq!(pool.next(Provider::Etherscan).unwrap(), "e2");
        assert_eq!(pool.next(Provider::Bitquery).unwrap(), "b2");
        assert_eq!(pool.next(Provider::Etherscan).unwrap(), "e1");
        assert_eq!(pool.key_count(Provider::Bitquery), 2);
    }

    #[test]
    fn test_concurrent_callers_share_one_rotation() {
        let pool = Arc::new(KeyPool::new().with_keys(Provider::Bitquery, keys(&["a", "b"])));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || pool.next(Provider::Bitquery).unwrap())
            })
            .collect();
        let mut a = 0;
        for h in handles {
            if h.join().unwrap() == "a" {
                a += 1;
            }
        }
        assert_eq!(a, 4);
    }
}
