//! Request coalescing: one in-flight call per key, shared by every caller that
//! arrives while it runs.

use std::{collections::HashMap, future::Future, hash::Hash, sync::Arc};

use tokio::sync::OnceCell;

pub struct Coalescer<K, V> {
    flights: std::sync::Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for Coalescer<K, V> {
    fn default() -> Self {
        Self {
            flights: std::sync::Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> Coalescer<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key` unless a run is already in flight, in which case
    /// wait for it and return its result. The flag is true for callers that
    /// joined someone else's run.
    ///
    /// If the running caller is dropped mid-flight, one of the waiters takes
    /// over with its own `work`.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> (V, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let cell = {
            let mut flights = self.lock();
            flights
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let mut ran = false;
        let value = cell
            .get_or_init(|| {
                ran = true;
                work()
            })
            .await
            .clone();

        // First finisher retires the flight; later callers start a new one.
        {
            let mut flights = self.lock();
            if flights
                .get(&key)
                .map(|c| Arc::ptr_eq(c, &cell))
                .unwrap_or(false)
            {
                flights.remove(&key);
            }
        }

        (value, !ran)
    }

    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, Arc<OnceCell<V>>>> {
        // The map holds no invariant a panicking holder could break.
        self.flights
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
