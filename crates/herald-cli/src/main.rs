//! herald demo: runs the whole scheduling pipeline in one process.
//!
//! Tasks are created that wait for resources; a fake allocator makes the
//! resources ready one by one and the scheduler announces each task on
//! `task:ready`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use herald_core::app::SchedulerBuilder;
use herald_core::config::HeraldConfig;
use herald_core::domain::{
    DependencySpec, Event, ResourceId, ResourceStatus, TASK_READY, TaskId, TaskRecord,
};
use herald_core::impls::{
    InMemoryBindingStore, InMemoryDependencyStore, InMemoryEventBus, InMemoryResourceStore,
    InMemoryTaskStore, InMemoryTaskToGroup, RESOURCE_RESOLVER, ResourceResolver,
    SqliteDependencyStore,
};
use herald_core::ports::{DependencyStore, EventBus, SystemClock};

#[derive(Debug, Parser)]
#[command(name = "herald", about = "Dependency-driven task scheduling demo")]
struct Args {
    /// JSON config file; missing keys keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of demo tasks. Task 0 has no dependencies.
    #[arg(long, default_value_t = 3)]
    tasks: usize,

    /// SQLite URL for the dependency store, e.g. `sqlite://herald.db?mode=rwc`.
    /// In-memory store when omitted.
    #[arg(long)]
    sqlite: Option<String>,

    /// Override every poll interval (ms) so the demo finishes quickly.
    #[arg(long)]
    poll_ms: Option<u64>,

    /// Delay between resource state changes (ms).
    #[arg(long, default_value_t = 300)]
    step_ms: u64,
}

fn load_config(args: &Args) -> Result<HeraldConfig> {
    let mut config = match &args.config {
        Some(path) => HeraldConfig::from_path(path)?,
        None => HeraldConfig::default(),
    };
    if let Some(ms) = args.poll_ms {
        config.ready_groups.poll_interval_ms = ms;
        config.resource_resolver.poll_interval_ms = ms;
    }
    Ok(config)
}

async fn dependency_store(args: &Args) -> Result<Arc<dyn DependencyStore>> {
    Ok(match &args.sqlite {
        Some(url) => {
            info!(url = %url, "using sqlite dependency store");
            Arc::new(
                SqliteDependencyStore::connect(url)
                    .await
                    .with_context(|| format!("opening {url}"))?,
            )
        }
        None => Arc::new(InMemoryDependencyStore::new()),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    if args.tasks == 0 {
        bail!("--tasks must be at least 1");
    }

    // (A) 外部コラボレータ（インメモリ）
    let bus = Arc::new(InMemoryEventBus::new());
    let resources = Arc::new(InMemoryResourceStore::new());
    let tasks = Arc::new(InMemoryTaskStore::new());

    // (B) スケジューラを構築（fail-fast）
    let resolver = Arc::new(ResourceResolver::new(
        resources.clone(),
        Arc::new(InMemoryBindingStore::new()),
        Arc::new(SystemClock),
        config.resource_resolver.clone(),
    ));
    let service = Arc::new(
        SchedulerBuilder::new(config)
            .store(dependency_store(&args).await?)
            .task_index(Arc::new(InMemoryTaskToGroup::new()))
            .task_store(tasks.clone())
            .event_bus(bus.clone())
            .resolver(RESOURCE_RESOLVER, resolver)?
            .expect_resolvers(&[RESOURCE_RESOLVER])
            .build()?,
    );

    // サービスが task:created を購読し終えてからタスクを投入する
    let cancel = CancellationToken::new();
    let mut ready = bus.subscribe(&[TASK_READY]).await?;
    let running = service.start(cancel.clone()).await?;

    // (C) タスク投入: task-i は res-i を待つ（task-0 は依存なし）
    let mut resource_ids = Vec::new();
    for i in 0..args.tasks {
        let task = TaskId::new(format!("task-{i}"));
        let specs = if i == 0 {
            Vec::new()
        } else {
            let resource = format!("res-{i}");
            resource_ids.push(ResourceId::new(resource.clone()));
            vec![DependencySpec::resource(resource)]
        };
        tasks.insert(TaskRecord::new(task.clone(), specs)).await;
        bus.publish(Event::task_created(&task)).await?;
        info!(task_id = %task, "task created");
    }

    // (D) リソースを順に Allocated -> Ready にする
    let allocator = {
        let resources = resources.clone();
        let step = Duration::from_millis(args.step_ms);
        tokio::spawn(async move {
            for id in resource_ids {
                resources.set_status(&id, ResourceStatus::Allocated).await;
                sleep(step).await;
                resources.set_status(&id, ResourceStatus::Ready).await;
                info!(resource_id = %id, "resource ready");
            }
        })
    };

    // (E) 全タスクの task:ready を待つ（Ctrl-C で中断）
    let mut seen = 0;
    while seen < args.tasks {
        tokio::select! {
            event = ready.recv() => {
                let Some(event) = event else { break };
                let task = event.task_id().context("task:ready payload")?;
                seen += 1;
                println!("ready: {task} ({seen}/{})", args.tasks);
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted");
                break;
            }
        }
    }

    cancel.cancel();
    allocator.abort();
    running.await.context("scheduling service panicked")?;
    info!(ready = seen, "done");
    Ok(())
}
