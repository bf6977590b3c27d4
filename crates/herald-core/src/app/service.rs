//! SchedulingService - イベントバスとマネージャの接続
//!
//! `task:created` -> `SchedulingManager::register`, and every task the
//! manager reports ready -> `task:ready`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::app::manager::SchedulingManager;
use crate::domain::{Event, SchedulerError, TASK_CREATED, TaskId};
use crate::ports::EventBus;

pub struct SchedulingService {
    manager: Arc<SchedulingManager>,
    bus: Arc<dyn EventBus>,
}

impl SchedulingService {
    pub fn new(manager: Arc<SchedulingManager>, bus: Arc<dyn EventBus>) -> Self {
        Self { manager, bus }
    }

    pub fn manager(&self) -> &Arc<SchedulingManager> {
        &self.manager
    }

    /// Run until `cancel` fires. Returns once both loops have exited.
    ///
    /// Only the initial subscription can fail; errors inside the loops are
    /// logged and the loops keep going.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), SchedulerError> {
        let (created, ready) = self.subscribe(&cancel).await?;
        self.serve(created, ready, cancel).await;
        Ok(())
    }

    /// Subscribe to `task:created`, then run the loops on a spawned task.
    ///
    /// Every `task:created` published after this returns is seen by the
    /// service. The handle completes once `cancel` fires and both loops exit.
    pub async fn start(
        self: Arc<Self>,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>, SchedulerError> {
        let (created, ready) = self.subscribe(&cancel).await?;
        Ok(tokio::spawn(async move {
            self.serve(created, ready, cancel).await;
        }))
    }

    async fn subscribe(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(mpsc::Receiver<Event>, mpsc::Receiver<TaskId>), SchedulerError> {
        let created = self.bus.subscribe(&[TASK_CREATED]).await?;
        let ready = self.manager.ready(cancel.child_token());
        info!("scheduling service started");
        Ok((created, ready))
    }

    async fn serve(
        &self,
        mut created: mpsc::Receiver<Event>,
        mut ready: mpsc::Receiver<TaskId>,
        cancel: CancellationToken,
    ) {
        let registration = async {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = created.recv() => event,
                };
                let Some(event) = event else {
                    warn!("task:created subscription closed");
                    break;
                };
                self.on_task_created(event).await;
            }
        };

        let publishing = async {
            while let Some(task) = ready.recv().await {
                match self.bus.publish(Event::task_ready(&task)).await {
                    Ok(()) => debug!(task_id = %task, "published task:ready"),
                    Err(err) => error!(task_id = %task, error = %err, "failed to publish task:ready"),
                }
            }
        };

        tokio::join!(registration, publishing);
        info!("scheduling service stopped");
    }

    async fn on_task_created(&self, event: Event) {
        let task = match event.task_id() {
            Ok(task) => task,
            Err(err) => {
                warn!(error = %err, "task:created payload is not a task id, skipping");
                return;
            }
        };

        if let Err(err) = self.manager.register(&task).await {
            error!(task_id = %task, error = %err, kind = ?err.kind(), "failed to register task");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HeraldConfig, ReadyGroupsConfig, ResourceResolverConfig};
    use crate::domain::{DependencySpec, ResourceId, ResourceStatus, TASK_READY, TaskId, TaskRecord};
    use crate::impls::{
        InMemoryBindingStore, InMemoryDependencyStore, InMemoryEventBus, InMemoryResourceStore,
        InMemoryTaskStore, InMemoryTaskToGroup, RESOURCE_RESOLVER, ResourceResolver,
    };
    use crate::ports::{ResolverRegistry, SystemClock, TaskToGroup};
    use std::time::Duration;

    struct World {
        bus: Arc<InMemoryEventBus>,
        resources: Arc<InMemoryResourceStore>,
        tasks: Arc<InMemoryTaskStore>,
        index: Arc<InMemoryTaskToGroup>,
        service: Arc<SchedulingService>,
    }

    fn world() -> World {
        let bus = Arc::new(InMemoryEventBus::new());
        let resources = Arc::new(InMemoryResourceStore::new());
        let tasks = Arc::new(InMemoryTaskStore::new());
        let index = Arc::new(InMemoryTaskToGroup::new());

        let config = HeraldConfig {
            ready_groups: ReadyGroupsConfig {
                poll_interval_ms: 10,
                batch_size: 16,
            },
            resource_resolver: ResourceResolverConfig {
                poll_interval_ms: 10,
                ..Default::default()
            },
            ..Default::default()
        };

        let mut resolvers = ResolverRegistry::new();
        resolvers
            .register(
                RESOURCE_RESOLVER,
                Arc::new(ResourceResolver::new(
                    resources.clone(),
                    Arc::new(InMemoryBindingStore::new()),
                    Arc::new(SystemClock),
                    config.resource_resolver.clone(),
                )),
            )
            .unwrap();

        let manager = Arc::new(SchedulingManager::new(
            Arc::new(InMemoryDependencyStore::new()),
            Arc::new(resolvers),
            index.clone(),
            tasks.clone(),
            config,
        ));
        let service = Arc::new(SchedulingService::new(manager, bus.clone()));

        World {
            bus,
            resources,
            tasks,
            index,
            service,
        }
    }

    async fn next_ready(rx: &mut tokio::sync::mpsc::Receiver<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for task:ready")
            .expect("bus closed")
    }

    #[tokio::test]
    async fn resource_becoming_ready_publishes_task_ready() {
        let w = world();
        let task = TaskId::new("t1");
        let res = ResourceId::new("res-42");
        w.tasks
            .insert(TaskRecord::new(task.clone(), vec![DependencySpec::resource("res-42")]))
            .await;
        w.resources.set_status(&res, ResourceStatus::Allocated).await;

        let mut ready_events = w.bus.subscribe(&[TASK_READY]).await.unwrap();
        let cancel = CancellationToken::new();
        let running = Arc::clone(&w.service).start(cancel.clone()).await.unwrap();
        w.bus.publish(Event::task_created(&task)).await.unwrap();

        // registered, but the resource is still only allocated
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(w.index.group_by_task(&task).await.is_ok());
        assert!(ready_events.try_recv().is_err());

        w.resources.set_status(&res, ResourceStatus::Ready).await;
        let event = next_ready(&mut ready_events).await;
        assert_eq!(event.topic, TASK_READY);
        assert_eq!(event.data, b"t1");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn tasks_created_right_after_start_are_not_lost() {
        let w = world();
        let mut ready_events = w.bus.subscribe(&[TASK_READY]).await.unwrap();
        let cancel = CancellationToken::new();
        let running = Arc::clone(&w.service).start(cancel.clone()).await.unwrap();

        let tasks: Vec<TaskId> = (0..3).map(|i| TaskId::new(format!("task-{i}"))).collect();
        for task in &tasks {
            w.tasks.insert(TaskRecord::new(task.clone(), vec![])).await;
            w.bus.publish(Event::task_created(task)).await.unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..tasks.len() {
            seen.push(next_ready(&mut ready_events).await.task_id().unwrap());
        }
        seen.sort();
        assert_eq!(seen, tasks);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn bad_payloads_and_failed_registrations_do_not_stop_the_service() {
        let w = world();
        let good = TaskId::new("good");
        w.tasks.insert(TaskRecord::new(good.clone(), vec![])).await;

        let mut ready_events = w.bus.subscribe(&[TASK_READY]).await.unwrap();
        let cancel = CancellationToken::new();
        let running = {
            let service = Arc::clone(&w.service);
            let cancel = cancel.clone();
            tokio::spawn(async move { service.run(cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        w.bus
            .publish(Event::new(TASK_CREATED, vec![0xff, 0xfe]))
            .await
            .unwrap();
        w.bus
            .publish(Event::task_created(&TaskId::new("missing")))
            .await
            .unwrap();
        w.bus.publish(Event::task_created(&good)).await.unwrap();

        let event = next_ready(&mut ready_events).await;
        assert_eq!(event.task_id().unwrap(), good);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
