use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

// Waiters are served in arrival order (tokio's mutex is fair).
#[derive(Default)]
pub struct CustomerQueue {
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

pub struct QueueTicket<'a> {
    queue: &'a CustomerQueue,
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl CustomerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> QueueTicket<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(slots.entry(key.to_string()).or_default())
        };
        let guard = slot.lock_owned().await;
        QueueTicket {
            queue: self,
            key: key.to_string(),
            _guard: guard,
        }
    }

    pub fn active_keys(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl Drop for QueueTicket<'_> {
    fn drop(&mut self) {
        let mut slots = self.queue.slots.lock().unwrap_or_else(|e| e.into_inner());
        // the map and this ticket hold the only references: nobody is waiting
        let idle = slots
            .get(&self.key)
            .is_some_and(|slot| Arc::strong_count(slot) <= 2);
        if idle {
            slots.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_same_key_runs_in_order() {
        let queue = Arc::new(CustomerQueue::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = queue.acquire("whatsapp:1").await;
        let mut handles = Vec::new();
        for i in 0..3 {
            let queue = Arc::clone(&queue);
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                let _ticket = queue.acquire("whatsapp:1").await;
                log.lock().unwrap().push(i);
            }));
            // let each task enqueue before the next one starts
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(log.lock().unwrap().is_empty());
        drop(first);

        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(queue.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let queue = CustomerQueue::new();
        let _a = queue.acquire("whatsapp:1").await;
        let b = tokio::time::timeout(Duration::from_millis(100), queue.acquire("instagram:2")).await;
        assert!(b.is_ok());
    }
}
