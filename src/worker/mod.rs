use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Bounded pool for the blocking edges of a query workflow (LLM inference,
/// SQL execution, figure rendering).
///
/// Dispatch waits for one of the fixed worker slots, then spawns the task on
/// the runtime. A saturated pool queues callers instead of piling up
/// concurrent upstream calls. Once spawned, a task runs to completion even if
/// the caller goes away, so the cache still sees its outcome.
#[derive(Clone)]
pub struct TaskPool {
    permits: Arc<Semaphore>,
}

impl TaskPool {
    pub fn new(workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub async fn dispatch<F, T>(&self, task: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .expect("task pool semaphore is never closed");
        tokio::spawn(async move {
            let _permit = permit;
            task.await
        })
    }
}
