//! A key-value pair, as owned by a table.

use super::table::key::Key;

//  A record, immutable once published.
pub struct Record<K, V> {
    pub key: K,
    pub value: V,
}

impl<K, V> Key for Record<K, V> {
    type Key = K;

    fn key(&self) -> &K { &self.key }
}
