//! Resource resolver - リソースが Ready になったら依存を満たす
//!
//! `bind` records which resource a dependency waits for. The `ready` loop
//! polls pending bindings on a fixed interval, checks the resources in one
//! batch and emits the dependencies whose resource is `Ready`. Emitted
//! bindings are marked resolved afterwards, so a crash in between only
//! produces duplicates, never a lost dependency.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ResourceResolverConfig;
use crate::domain::{DependencyId, ResolverError, ResourceId};
use crate::ports::{BindingStore, Clock, ResourceStore, Resolver};

/// Registry name of the resource resolver.
pub const RESOURCE_RESOLVER: &str = "resource";

#[derive(Clone)]
pub struct ResourceResolver {
    resources: Arc<dyn ResourceStore>,
    bindings: Arc<dyn BindingStore>,
    clock: Arc<dyn Clock>,
    config: ResourceResolverConfig,
}

impl ResourceResolver {
    pub fn new(
        resources: Arc<dyn ResourceStore>,
        bindings: Arc<dyn BindingStore>,
        clock: Arc<dyn Clock>,
        config: ResourceResolverConfig,
    ) -> Self {
        Self {
            resources,
            bindings,
            clock,
            config,
        }
    }

    /// One poll: dependencies whose resource is ready right now.
    async fn scan(&self) -> Result<Vec<DependencyId>, ResolverError> {
        let now = self.clock.now();
        let cutoff = self
            .config
            .staleness_window()
            .and_then(|window| chrono::Duration::from_std(window).ok())
            .map(|window| now - window);

        let bindings = self.bindings.poll(self.config.poll_limit, cutoff).await?;
        if bindings.is_empty() {
            return Ok(Vec::new());
        }

        let mut by_resource: HashMap<ResourceId, Vec<DependencyId>> = HashMap::new();
        let mut resource_ids = Vec::new();
        for binding in bindings {
            let waiting = by_resource.entry(binding.resource_id.clone()).or_default();
            if waiting.is_empty() {
                resource_ids.push(binding.resource_id);
            }
            waiting.push(binding.dependency_id);
        }

        let resources = self.resources.load(&resource_ids).await?;
        let mut ready = Vec::new();
        for resource in resources {
            if !resource.is_ready() {
                continue;
            }
            if let Some(dependencies) = by_resource.remove(&resource.id) {
                ready.extend(dependencies);
            }
        }

        debug!(
            resources = resource_ids.len(),
            ready = ready.len(),
            "resource poll"
        );
        Ok(ready)
    }

    async fn run(self, tx: mpsc::Sender<DependencyId>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_ms = self.config.poll_interval_ms,
            "collecting resolved resource dependencies"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let ready = match self.scan().await {
                Ok(ready) => ready,
                Err(err) => {
                    error!(error = %err, "failed to poll resource bindings");
                    continue;
                }
            };

            let mut emitted = Vec::with_capacity(ready.len());
            for id in ready {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = tx.send(id.clone()) => {
                        if sent.is_err() {
                            // consumer is gone
                            return;
                        }
                        emitted.push(id);
                    }
                }
            }

            if !emitted.is_empty() {
                if let Err(err) = self.bindings.resolve(&emitted, self.clock.now()).await {
                    warn!(error = %err, count = emitted.len(), "failed to mark bindings resolved");
                }
            }
        }

        debug!("resource resolver stopped");
    }
}

#[async_trait]
impl Resolver for ResourceResolver {
    async fn bind(&self, dependency: &DependencyId, data: &Value) -> Result<(), ResolverError> {
        let resource = data
            .as_str()
            .ok_or_else(|| ResolverError::InvalidData(format!("expected a resource id string, got {data}")))?;

        self.bindings
            .save(dependency, &ResourceId::new(resource), self.clock.now())
            .await?;
        debug!(dependency_id = %dependency, resource_id = resource, "bound to resource");
        Ok(())
    }

    async fn unbind(&self, dependency: &DependencyId) -> Result<(), ResolverError> {
        self.bindings.remove(dependency).await
    }

    fn ready(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<DependencyId>, ResolverError> {
        let (tx, rx) = mpsc::channel(self.config.poll_limit.max(1));
        tokio::spawn(self.clone().run(tx, cancel));
        Ok(rx)
    }
}
