use std::future::Future;

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::{error::ServiceError, state::race::GroupId};

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Per-group FIFO executor: at most one task per group runs at any time,
/// while tasks of different groups make progress independently.
///
/// Each group gets a worker draining an unbounded queue. A task runs in its
/// own spawned future so an error or a panic only reaches its submitter and
/// the worker moves on to the next task.
#[derive(Default)]
pub struct GroupSerializer {
    queues: DashMap<GroupId, mpsc::UnboundedSender<Job>>,
}

impl GroupSerializer {
    /// Create a serializer without any worker; workers start on first use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `task` behind every task already submitted for `group` and
    /// wait for its result.
    ///
    /// The task is started once it reaches the head of the queue and keeps
    /// running to completion even if the caller stops waiting.
    pub async fn submit<F, Fut, T>(&self, group: &GroupId, task: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ServiceError>> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job_group = group.clone();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                let outcome = match tokio::spawn(task()).await {
                    Ok(result) => result,
                    Err(err) => {
                        error!(group = %job_group, error = %err, "serialized task aborted");
                        Err(ServiceError::TaskFailed(format!(
                            "task for group `{job_group}` aborted"
                        )))
                    }
                };
                let _ = reply_tx.send(outcome);
            })
        });

        self.sender(group)
            .send(job)
            .map_err(|_| ServiceError::TaskFailed(format!("queue for group `{group}` is closed")))?;

        reply_rx.await.map_err(|_| {
            ServiceError::TaskFailed(format!("queue for group `{group}` dropped the task"))
        })?
    }

    fn sender(&self, group: &GroupId) -> mpsc::UnboundedSender<Job> {
        self.queues
            .entry(group.clone())
            .or_insert_with(|| spawn_worker(group.clone()))
            .clone()
    }
}

fn spawn_worker(group: GroupId) -> mpsc::UnboundedSender<Job> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
    debug!(group = %group, "starting group worker");
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            job().await;
        }
        debug!(group = %group, "group worker stopped");
    });
    tx
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use futures::future::join_all;
    use tokio::time::{sleep, timeout};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn tasks_of_one_group_run_in_submission_order() {
        let serializer = GroupSerializer::new();
        let group = GroupId::from("junior");
        let log = Arc::new(Mutex::new(Vec::new()));

        // Earlier tasks sleep longer; overlapping execution would reorder the log.
        let submissions = (0..5u64).map(|index| {
            let log = log.clone();
            serializer.submit(&group, move || async move {
                log.lock().unwrap().push(format!("start {index}"));
                sleep(Duration::from_millis(50 - index * 10)).await;
                log.lock().unwrap().push(format!("end {index}"));
                Ok(index)
            })
        });
        let results = join_all(submissions).await;

        let results: Vec<u64> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(results, vec![0, 1, 2, 3, 4]);

        let expected: Vec<String> = (0..5)
            .flat_map(|index| [format!("start {index}"), format!("end {index}")])
            .collect();
        assert_eq!(*log.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn failing_task_only_rejects_its_caller() {
        let serializer = GroupSerializer::new();
        let group = GroupId::from("junior");

        let failed: Result<(), _> = serializer
            .submit(&group, || async {
                Err(ServiceError::NotFound("no active race".into()))
            })
            .await;
        assert!(matches!(failed, Err(ServiceError::NotFound(_))));

        let next = serializer.submit(&group, || async { Ok(7) }).await;
        assert_eq!(next.unwrap(), 7);
    }

    #[tokio::test]
    async fn panicking_task_does_not_stall_the_queue() {
        let serializer = GroupSerializer::new();
        let group = GroupId::from("senior");

        let crashed: Result<(), _> = serializer
            .submit(&group, || async {
                if true {
                    panic!("boom");
                }
                Ok(())
            })
            .await;
        assert!(matches!(crashed, Err(ServiceError::TaskFailed(_))));

        let next = serializer.submit(&group, || async { Ok("still alive") }).await;
        assert_eq!(next.unwrap(), "still alive");
    }

    #[tokio::test]
    async fn groups_progress_independently() {
        let serializer = Arc::new(GroupSerializer::new());
        let (release_tx, release_rx) = oneshot::channel::<()>();

        // The junior task blocks until a senior task releases it.
        let blocked = {
            let serializer = serializer.clone();
            tokio::spawn(async move {
                serializer
                    .submit(&GroupId::from("junior"), || async move {
                        release_rx
                            .await
                            .map_err(|_| ServiceError::TaskFailed("released".into()))
                    })
                    .await
            })
        };

        serializer
            .submit(&GroupId::from("senior"), move || async move {
                let _ = release_tx.send(());
                Ok(())
            })
            .await
            .unwrap();

        let outcome = timeout(Duration::from_secs(1), blocked)
            .await
            .expect("junior task should be released")
            .unwrap();
        assert!(outcome.is_ok());
    }
}
