//! InFlight - キーごとに高々 1 つの解決を保証する
//!
//! 同じキーへの同時呼び出しは同じ `Shared` future を受け取る。
//! future が決着した時点でエントリは取り除かれ、次の呼び出しは新しく解決する。

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

type Pending<V> = Shared<BoxFuture<'static, V>>;

pub struct InFlight<K, V: Clone> {
    pending: Arc<Mutex<HashMap<K, (u64, Pending<V>)>>>,
    next_id: Mutex<u64>,
}

impl<K, V> Default for InFlight<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> InFlight<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: Mutex::new(0),
        }
    }

    /// Join the pending resolution for `key`, or start one with `make`.
    ///
    /// `make` is only called when nothing is pending.
    pub fn run<F>(&self, key: K, make: F) -> Pending<V>
    where
        F: FnOnce() -> BoxFuture<'static, V>,
    {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((_, fut)) = pending.get(&key) {
            return fut.clone();
        }

        let id = {
            let mut next = self.next_id.lock().unwrap_or_else(|e| e.into_inner());
            *next += 1;
            *next
        };
        let map = Arc::clone(&self.pending);
        let owned_key = key.clone();
        let work = make();
        let fut = async move {
            let value = work.await;
            let mut pending = map.lock().unwrap_or_else(|e| e.into_inner());
            if pending.get(&owned_key).is_some_and(|(entry, _)| *entry == id) {
                pending.remove(&owned_key);
            }
            value
        }
        .boxed()
        .shared();

        pending.insert(key, (id, fut.clone()));
        fut
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
