//! KeyValueStore port - レジストリ永続化用の同期 KV

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Returns `false` when the host refused the write (quota, privacy mode, ...).
    fn set(&self, key: &str, value: &str) -> bool;

    fn remove(&self, key: &str);
}
