//! SchedulerBuilder - スケジューラの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - 必須コンポーネント（store, index, tasks, bus）が揃っているかチェック
//! - expect_resolvers() で期待される resolver 名を登録
//! - build() 時に「期待集合 ⊆ 登録済み集合」をチェック

use std::sync::Arc;

use crate::app::manager::SchedulingManager;
use crate::app::service::SchedulingService;
use crate::config::HeraldConfig;
use crate::ports::{
    DependencyStore, EventBus, RegistryError, Resolver, ResolverRegistry, TaskStore, TaskToGroup,
};

/// SchedulerBuilder は SchedulingService を構築
///
/// # 使用例
/// ```ignore
/// let service = SchedulerBuilder::new(config)
///     .store(store)
///     .task_index(index)
///     .task_store(tasks)
///     .event_bus(bus)
///     .resolver(RESOURCE_RESOLVER, resolver)?
///     .expect_resolvers(&[RESOURCE_RESOLVER])
///     .build()?;
/// ```
pub struct SchedulerBuilder {
    config: HeraldConfig,
    store: Option<Arc<dyn DependencyStore>>,
    index: Option<Arc<dyn TaskToGroup>>,
    tasks: Option<Arc<dyn TaskStore>>,
    bus: Option<Arc<dyn EventBus>>,
    resolvers: ResolverRegistry,
    expected_resolvers: Option<Vec<String>>,
}

/// BuildError は構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing component: {0}")]
    MissingComponent(&'static str),

    #[error("Missing resolvers: {0:?}. These resolvers were expected but not registered.")]
    MissingResolvers(Vec<String>),
}

impl SchedulerBuilder {
    pub fn new(config: HeraldConfig) -> Self {
        Self {
            config,
            store: None,
            index: None,
            tasks: None,
            bus: None,
            resolvers: ResolverRegistry::new(),
            expected_resolvers: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn DependencyStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn task_index(mut self, index: Arc<dyn TaskToGroup>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn task_store(mut self, tasks: Arc<dyn TaskStore>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Resolver を登録（同名の二重登録はエラー）
    pub fn resolver(
        mut self,
        name: impl Into<String>,
        resolver: Arc<dyn Resolver>,
    ) -> Result<Self, RegistryError> {
        self.resolvers.register(name, resolver)?;
        Ok(self)
    }

    /// 期待される resolver 名のリストを設定
    pub fn expect_resolvers(mut self, names: &[&str]) -> Self {
        self.expected_resolvers = Some(names.iter().map(|name| name.to_string()).collect());
        self
    }

    pub fn build_manager(self) -> Result<(SchedulingManager, Option<Arc<dyn EventBus>>), BuildError> {
        if let Some(expected) = &self.expected_resolvers {
            let registered = self.resolvers.names();
            let missing: Vec<String> = expected
                .iter()
                .filter(|name| !registered.contains(name))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingResolvers(missing));
            }
        }

        let store = self.store.ok_or(BuildError::MissingComponent("dependency store"))?;
        let index = self.index.ok_or(BuildError::MissingComponent("task index"))?;
        let tasks = self.tasks.ok_or(BuildError::MissingComponent("task store"))?;

        let manager = SchedulingManager::new(
            store,
            Arc::new(self.resolvers),
            index,
            tasks,
            self.config,
        );
        Ok((manager, self.bus))
    }

    /// 検証してから SchedulingService を生成
    pub fn build(self) -> Result<SchedulingService, BuildError> {
        let (manager, bus) = self.build_manager()?;
        let bus = bus.ok_or(BuildError::MissingComponent("event bus"))?;
        Ok(SchedulingService::new(Arc::new(manager), bus))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{
        InMemoryBindingStore, InMemoryDependencyStore, InMemoryEventBus, InMemoryResourceStore,
        InMemoryTaskStore, InMemoryTaskToGroup, RESOURCE_RESOLVER, ResourceResolver,
    };
    use crate::ports::SystemClock;

    fn resource_resolver() -> Arc<dyn Resolver> {
        Arc::new(ResourceResolver::new(
            Arc::new(InMemoryResourceStore::new()),
            Arc::new(InMemoryBindingStore::new()),
            Arc::new(SystemClock),
            Default::default(),
        ))
    }

    fn complete() -> SchedulerBuilder {
        SchedulerBuilder::new(HeraldConfig::default())
            .store(Arc::new(InMemoryDependencyStore::new()))
            .task_index(Arc::new(InMemoryTaskToGroup::new()))
            .task_store(Arc::new(InMemoryTaskStore::new()))
            .event_bus(Arc::new(InMemoryEventBus::new()))
    }

    #[test]
    fn test_build_success() {
        let service = complete()
            .resolver(RESOURCE_RESOLVER, resource_resolver())
            .unwrap()
            .expect_resolvers(&[RESOURCE_RESOLVER])
            .build();
        assert!(service.is_ok());
        assert_eq!(
            service.unwrap().manager().resolvers().names(),
            vec![RESOURCE_RESOLVER.to_string()]
        );
    }

    #[test]
    fn test_build_missing_resolvers() {
        let service = complete()
            .resolver(RESOURCE_RESOLVER, resource_resolver())
            .unwrap()
            .expect_resolvers(&[RESOURCE_RESOLVER, "timer"])
            .build();
        assert!(matches!(
            service,
            Err(BuildError::MissingResolvers(missing)) if missing == vec!["timer".to_string()]
        ));
    }

    #[test]
    fn test_build_missing_component() {
        let service = SchedulerBuilder::new(HeraldConfig::default())
            .store(Arc::new(InMemoryDependencyStore::new()))
            .build();
        assert!(matches!(
            service,
            Err(BuildError::MissingComponent("task index"))
        ));
    }

    #[test]
    fn test_duplicate_resolver_is_rejected() {
        let result = complete()
            .resolver(RESOURCE_RESOLVER, resource_resolver())
            .unwrap()
            .resolver(RESOURCE_RESOLVER, resource_resolver());
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(_))));
    }

    #[test]
    fn test_manager_without_bus() {
        let (manager, bus) = SchedulerBuilder::new(HeraldConfig::default())
            .store(Arc::new(InMemoryDependencyStore::new()))
            .task_index(Arc::new(InMemoryTaskToGroup::new()))
            .task_store(Arc::new(InMemoryTaskStore::new()))
            .build_manager()
            .unwrap();
        assert!(bus.is_none());
        assert!(manager.resolvers().is_empty());
    }
}
