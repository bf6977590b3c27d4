//! SchedulingManager - 登録と準備完了の収集
//!
//! # 登録 (register)
//! task -> dependencies -> resolver bind -> group -> index -> initialize.
//! Every reversible step runs through a `Saga`; a failure undoes what was
//! done and returns the original error. Writing the group back onto the task
//! record is observability only and may fail without failing registration.
//!
//! # 収集 (ready)
//! One worker per resolver drains its stream into `DependencyStore::resolve`,
//! one worker drains `ready_groups` and maps each group back to its task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::app::ready_poller::ready_groups;
use crate::app::retry::RetryPolicy;
use crate::app::saga::{Compensation, Saga};
use crate::config::HeraldConfig;
use crate::domain::{Dependency, DependencyId, GroupId, SchedulerError, TaskId};
use crate::ports::{DependencyStore, Resolver, ResolverRegistry, TaskStore, TaskToGroup};

pub struct SchedulingManager {
    store: Arc<dyn DependencyStore>,
    resolvers: Arc<ResolverRegistry>,
    index: Arc<dyn TaskToGroup>,
    tasks: Arc<dyn TaskStore>,
    config: HeraldConfig,
}

impl SchedulingManager {
    pub fn new(
        store: Arc<dyn DependencyStore>,
        resolvers: Arc<ResolverRegistry>,
        index: Arc<dyn TaskToGroup>,
        tasks: Arc<dyn TaskStore>,
        config: HeraldConfig,
    ) -> Self {
        Self {
            store,
            resolvers,
            index,
            tasks,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn DependencyStore> {
        &self.store
    }

    pub fn resolvers(&self) -> &ResolverRegistry {
        &self.resolvers
    }

    fn resolver(&self, name: &str) -> Result<Arc<dyn Resolver>, SchedulerError> {
        self.resolvers
            .get(name)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownResolver(name.to_string()))
    }

    /// Register a freshly created task. Returns the task's group.
    pub async fn register(&self, task: &TaskId) -> Result<GroupId, SchedulerError> {
        let record = self.tasks.load(task).await?;
        let specs = record.dependencies.specs;
        let mut saga = Saga::new(format!("register {task}"));

        let dependencies = saga
            .step(
                "allocate dependencies",
                async {
                    self.store
                        .new_dependencies(specs.len())
                        .await
                        .map_err(SchedulerError::from)
                },
                |deps: &Vec<Dependency>| -> Compensation {
                    let store = Arc::clone(&self.store);
                    let ids: Vec<DependencyId> = deps.iter().map(|d| d.id.clone()).collect();
                    Box::pin(async move {
                        store
                            .discard_dependencies(&ids)
                            .await
                            .map_err(SchedulerError::from)
                    })
                },
            )
            .await?;
        let ids: Vec<DependencyId> = dependencies.into_iter().map(|d| d.id).collect();

        for (dependency, spec) in ids.iter().zip(&specs) {
            saga.step(
                "bind",
                async {
                    let resolver = self.resolver(&spec.name)?;
                    resolver
                        .bind(dependency, &spec.data)
                        .await
                        .map_err(|err| SchedulerError::resolver(&spec.name, err))?;
                    Ok::<_, SchedulerError>(resolver)
                },
                |resolver: &Arc<dyn Resolver>| -> Compensation {
                    let resolver = Arc::clone(resolver);
                    let dependency = dependency.clone();
                    let name = spec.name.clone();
                    Box::pin(async move {
                        resolver
                            .unbind(&dependency)
                            .await
                            .map_err(|err| SchedulerError::resolver(name, err))
                    })
                },
            )
            .await?;
        }

        let group = saga
            .step(
                "create group",
                async { self.store.new_group().await.map_err(SchedulerError::from) },
                |group: &GroupId| -> Compensation {
                    let store = Arc::clone(&self.store);
                    let group = group.clone();
                    Box::pin(async move { store.discard_group(&group).await.map_err(SchedulerError::from) })
                },
            )
            .await?;

        saga.step(
            "save task index",
            async { self.index.save(task, &group).await.map_err(SchedulerError::from) },
            |_: &()| -> Compensation {
                let index = Arc::clone(&self.index);
                let task = task.clone();
                Box::pin(async move { index.delete(&task).await.map_err(SchedulerError::from) })
            },
        )
        .await?;

        saga.finish("initialize group", async {
            self.store
                .initialize_group(&group, &ids)
                .await
                .map_err(SchedulerError::from)
        })
        .await?;

        if let Err(err) = self.tasks.update_dependencies(task, &group, &ids).await {
            warn!(task_id = %task, group_id = %group, error = %err, "failed to record dependencies on task");
        }

        info!(task_id = %task, group_id = %group, dependencies = ids.len(), "task registered");
        Ok(group)
    }

    /// Start collecting ready tasks. The stream closes once `cancel` fires
    /// and the workers have wound down.
    pub fn ready(&self, cancel: CancellationToken) -> mpsc::Receiver<TaskId> {
        let (tx, rx) = mpsc::channel(self.config.manager.channel_capacity.max(1));

        for (name, resolver) in self.resolvers.iter() {
            match resolver.ready(cancel.child_token()) {
                Ok(stream) => {
                    tokio::spawn(drain_resolver(
                        name.to_string(),
                        stream,
                        Arc::clone(&self.store),
                        self.config.manager.resolve_batch.max(1),
                        self.config.manager.retry_policy(),
                        cancel.child_token(),
                    ));
                }
                Err(err) => {
                    let err = SchedulerError::resolver(name, err);
                    error!(resolver = name, error = %err, kind = ?err.kind(), "failed to start resolver");
                }
            }
        }

        let groups = ready_groups(
            Arc::clone(&self.store),
            self.config.ready_groups.clone(),
            cancel.child_token(),
        );
        tokio::spawn(collect_ready_tasks(groups, Arc::clone(&self.index), tx));

        rx
    }
}

async fn drain_resolver(
    name: String,
    mut stream: mpsc::Receiver<DependencyId>,
    store: Arc<dyn DependencyStore>,
    max_batch: usize,
    retry: RetryPolicy,
    cancel: CancellationToken,
) {
    debug!(resolver = %name, "draining resolver");

    while let Some(first) = stream.recv().await {
        let mut batch = vec![Dependency::ok(first)];
        while batch.len() < max_batch {
            match stream.try_recv() {
                Ok(id) => batch.push(Dependency::ok(id)),
                Err(_) => break,
            }
        }

        let mut attempts = 0;
        loop {
            match store.resolve(&batch).await {
                Ok(()) => {
                    debug!(resolver = %name, count = batch.len(), "dependencies resolved");
                    break;
                }
                Err(err) => {
                    attempts += 1;
                    let delay = retry.next_delay(attempts);
                    warn!(
                        resolver = %name,
                        count = batch.len(),
                        attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %err,
                        "failed to resolve dependencies"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            warn!(resolver = %name, lost = batch.len(), "cancelled with unresolved dependencies");
                            return;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    debug!(resolver = %name, "resolver stream closed");
}

async fn collect_ready_tasks(
    mut groups: mpsc::Receiver<GroupId>,
    index: Arc<dyn TaskToGroup>,
    tx: mpsc::Sender<TaskId>,
) {
    while let Some(group) = groups.recv().await {
        let task = match index.task_by_group(&group).await {
            Ok(task) => task,
            Err(err) => {
                let err = SchedulerError::from(err);
                // The claim is spent; the group cannot be delivered again.
                error!(group_id = %group, error = %err, kind = ?err.kind(), "ready group has no task");
                continue;
            }
        };

        debug!(group_id = %group, task_id = %task, "task ready");
        if tx.send(task).await.is_err() {
            warn!(group_id = %group, "ready task consumer is gone");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReadyGroupsConfig, ResourceResolverConfig};
    use crate::domain::{
        DependencySpec, ErrorKind, GroupStatus, ResolverError, ResourceId, ResourceStatus, StoreError,
        TaskRecord,
    };
    use crate::impls::{
        InMemoryBindingStore, InMemoryDependencyStore, InMemoryResourceStore,
        InMemoryTaskStore, InMemoryTaskToGroup, RESOURCE_RESOLVER, ResourceResolver,
    };
    use crate::ports::SystemClock;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Resolver that records binds and fails on a chosen resource id.
    #[derive(Default)]
    struct RecordingResolver {
        fail_on: Option<String>,
        bound: Mutex<Vec<DependencyId>>,
        unbound: Mutex<Vec<DependencyId>>,
    }

    #[async_trait]
    impl Resolver for RecordingResolver {
        async fn bind(
            &self,
            dependency: &DependencyId,
            data: &serde_json::Value,
        ) -> Result<(), ResolverError> {
            if self.fail_on.is_some() && self.fail_on.as_deref() == data.as_str() {
                return Err(ResolverError::Storage("bind refused".into()));
            }
            self.bound.lock().unwrap().push(dependency.clone());
            Ok(())
        }

        async fn unbind(&self, dependency: &DependencyId) -> Result<(), ResolverError> {
            self.unbound.lock().unwrap().push(dependency.clone());
            Ok(())
        }

        fn ready(
            &self,
            _cancel: CancellationToken,
        ) -> Result<mpsc::Receiver<DependencyId>, ResolverError> {
            Err(ResolverError::Storage("not started in tests".into()))
        }
    }

    struct Harness {
        store: Arc<InMemoryDependencyStore>,
        index: Arc<InMemoryTaskToGroup>,
        tasks: Arc<InMemoryTaskStore>,
        manager: SchedulingManager,
    }

    fn harness(resolvers: ResolverRegistry) -> Harness {
        let store = Arc::new(InMemoryDependencyStore::new());
        let index = Arc::new(InMemoryTaskToGroup::new());
        let tasks = Arc::new(InMemoryTaskStore::new());
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
        let manager = SchedulingManager::new(
            store.clone(),
            Arc::new(resolvers),
            index.clone(),
            tasks.clone(),
            config,
        );
        Harness {
            store,
            index,
            tasks,
            manager,
        }
    }

    #[tokio::test]
    async fn registration_without_dependencies_is_immediately_ready() {
        let h = harness(ResolverRegistry::new());
        let task = TaskId::new("t0");
        h.tasks.insert(TaskRecord::new(task.clone(), vec![])).await;

        let group = h.manager.register(&task).await.unwrap();

        assert_eq!(h.index.task_by_group(&group).await.unwrap(), task);
        assert_eq!(h.store.claim_ready_groups(10).await.unwrap(), vec![group]);
    }

    #[tokio::test]
    async fn registration_records_the_group_on_the_task() {
        let resolver = Arc::new(RecordingResolver::default());
        let mut resolvers = ResolverRegistry::new();
        resolvers.register("rec", resolver.clone()).unwrap();
        let h = harness(resolvers);

        let task = TaskId::new("t1");
        h.tasks
            .insert(TaskRecord::new(
                task.clone(),
                vec![DependencySpec::new("rec", json!("a")), DependencySpec::new("rec", json!("b"))],
            ))
            .await;

        let group = h.manager.register(&task).await.unwrap();

        let record = h.tasks.get(&task).await.unwrap();
        assert_eq!(record.dependencies.group_id, Some(group.clone()));
        assert_eq!(record.dependencies.instances.len(), 2);
        assert_eq!(*resolver.bound.lock().unwrap(), record.dependencies.instances);

        let loaded = h.store.load_groups(&[group]).await.unwrap();
        assert_eq!(loaded[0].status, GroupStatus::Waiting);
        assert_eq!(loaded[0].pending, 2);
    }

    #[tokio::test]
    async fn failed_bind_rolls_back_registration() {
        let resolver = Arc::new(RecordingResolver {
            fail_on: Some("b".into()),
            ..Default::default()
        });
        let mut resolvers = ResolverRegistry::new();
        resolvers.register("rec", resolver.clone()).unwrap();
        let h = harness(resolvers);

        let task = TaskId::new("t1");
        h.tasks
            .insert(TaskRecord::new(
                task.clone(),
                vec![
                    DependencySpec::new("rec", json!("a")),
                    DependencySpec::new("rec", json!("b")),
                    DependencySpec::new("rec", json!("c")),
                ],
            ))
            .await;

        let err = h.manager.register(&task).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Resolver { .. }));
        assert_eq!(err.kind(), ErrorKind::Transient);

        let bound = resolver.bound.lock().unwrap().clone();
        assert_eq!(bound.len(), 1);
        assert_eq!(*resolver.unbound.lock().unwrap(), bound);

        // allocated dependencies were discarded
        assert!(h.store.load_dependencies(&bound).await.unwrap().is_empty());
        assert!(h.index.is_empty().await);
        assert!(h.tasks.get(&task).await.unwrap().dependencies.group_id.is_none());
    }

    #[tokio::test]
    async fn unknown_resolver_is_a_configuration_error() {
        let h = harness(ResolverRegistry::new());
        let task = TaskId::new("t1");
        h.tasks
            .insert(TaskRecord::new(task.clone(), vec![DependencySpec::new("bogus", json!(1))]))
            .await;

        let err = h.manager.register(&task).await.unwrap_err();
        assert!(matches!(&err, SchedulerError::UnknownResolver(name) if name == "bogus"));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(h.index.is_empty().await);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let h = harness(ResolverRegistry::new());
        let err = h.manager.register(&TaskId::new("ghost")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn ready_follows_the_resource_to_the_task() {
        let resources = Arc::new(InMemoryResourceStore::new());
        let resolver = ResourceResolver::new(
            resources.clone(),
            Arc::new(InMemoryBindingStore::new()),
            Arc::new(SystemClock),
            ResourceResolverConfig {
                poll_interval_ms: 10,
                ..Default::default()
            },
        );
        let mut resolvers = ResolverRegistry::new();
        resolvers.register(RESOURCE_RESOLVER, Arc::new(resolver)).unwrap();
        let h = harness(resolvers);

        let task = TaskId::new("t1");
        h.tasks
            .insert(TaskRecord::new(task.clone(), vec![DependencySpec::resource("res-42")]))
            .await;
        h.manager.register(&task).await.unwrap();

        let cancel = CancellationToken::new();
        let mut ready = h.manager.ready(cancel.clone());

        resources
            .set_status(&ResourceId::new("res-42"), ResourceStatus::Ready)
            .await;
        let got = tokio::time::timeout(Duration::from_secs(2), ready.recv())
            .await
            .unwrap();
        assert_eq!(got, Some(task));

        cancel.cancel();
        let closed = tokio::time::timeout(Duration::from_secs(2), ready.recv())
            .await
            .unwrap();
        assert_eq!(closed, None);
    }

    #[tokio::test]
    async fn ready_group_without_task_is_dropped() {
        let h = harness(ResolverRegistry::new());
        let orphan = h.store.new_group().await.unwrap();
        h.store.initialize_group(&orphan, &[]).await.unwrap();

        let task = TaskId::new("t1");
        h.tasks.insert(TaskRecord::new(task.clone(), vec![])).await;
        h.manager.register(&task).await.unwrap();

        let cancel = CancellationToken::new();
        let mut ready = h.manager.ready(cancel.clone());
        let got = tokio::time::timeout(Duration::from_secs(2), ready.recv())
            .await
            .unwrap();
        assert_eq!(got, Some(task));

        let orphan_state = h.store.load_groups(&[orphan]).await.unwrap();
        assert_eq!(orphan_state[0].status, GroupStatus::Claimed);
        cancel.cancel();
    }

    /// Store whose `resolve` fails a fixed number of times.
    struct FlakyStore {
        inner: InMemoryDependencyStore,
        failures: Mutex<u32>,
    }

    #[async_trait]
    impl DependencyStore for FlakyStore {
        async fn new_dependencies(&self, n: usize) -> Result<Vec<Dependency>, StoreError> {
            self.inner.new_dependencies(n).await
        }
        async fn new_group(&self) -> Result<GroupId, StoreError> {
            self.inner.new_group().await
        }
        async fn initialize_group(
            &self,
            group: &GroupId,
            dependencies: &[DependencyId],
        ) -> Result<(), StoreError> {
            self.inner.initialize_group(group, dependencies).await
        }
        async fn resolve(&self, values: &[Dependency]) -> Result<(), StoreError> {
            {
                let mut failures = self.failures.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(StoreError::Backend("flaky".into()));
                }
            }
            self.inner.resolve(values).await
        }
        async fn claim_ready_groups(&self, limit: usize) -> Result<Vec<GroupId>, StoreError> {
            self.inner.claim_ready_groups(limit).await
        }
        async fn load_dependencies(
            &self,
            ids: &[DependencyId],
        ) -> Result<Vec<Dependency>, StoreError> {
            self.inner.load_dependencies(ids).await
        }
        async fn load_groups(&self, ids: &[GroupId]) -> Result<Vec<crate::domain::Group>, StoreError> {
            self.inner.load_groups(ids).await
        }
        async fn discard_dependencies(&self, ids: &[DependencyId]) -> Result<(), StoreError> {
            self.inner.discard_dependencies(ids).await
        }
        async fn discard_group(&self, group: &GroupId) -> Result<(), StoreError> {
            self.inner.discard_group(group).await
        }
    }

    #[tokio::test]
    async fn failed_resolve_is_retried() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryDependencyStore::new(),
            failures: Mutex::new(2),
        });
        let deps = store.new_dependencies(1).await.unwrap();
        let group = store.new_group().await.unwrap();
        store.initialize_group(&group, &[deps[0].id.clone()]).await.unwrap();

        let (tx, rx) = mpsc::channel(4);
        tx.send(deps[0].id.clone()).await.unwrap();
        drop(tx);

        let retry = RetryPolicy {
            base_delay: Duration::from_millis(1),
            multiplier: 1.0,
            max_delay: Duration::from_millis(1),
        };
        drain_resolver(
            "flaky".into(),
            rx,
            store.clone(),
            8,
            retry,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(store.claim_ready_groups(1).await.unwrap(), vec![group]);
    }
}
