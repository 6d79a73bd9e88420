// crates/trident-storage/src/lib.rs
pub mod mongo;
pub mod native;
pub mod neo4j;
pub mod redis_cache;

use trident_core::config::Config;
use trident_core::traits::StoreManager;
use trident_core::types::StoreKind;

pub use mongo::MongoManager;
pub use neo4j::Neo4jManager;
pub use redis_cache::RedisManager;

pub fn manager_for(kind: StoreKind, config: &Config) -> Box<dyn StoreManager> {
    match kind {
        StoreKind::Document => Box::new(MongoManager::new(config)),
        StoreKind::Graph => Box::new(Neo4jManager::new(config)),
        StoreKind::KeyValue => Box::new(RedisManager::new(config)),
    }
}

/// One manager per store, in the order the stores are given.
pub fn managers_for(kinds: &[StoreKind], config: &Config) -> Vec<Box<dyn StoreManager>> {
    kinds.iter().map(|kind| manager_for(*kind, config)).collect()
}
