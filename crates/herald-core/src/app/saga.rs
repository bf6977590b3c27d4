//! Saga - 補償付きステップの連鎖
//!
//! Each successful step records a compensating action. When a later step
//! fails, the recorded compensations run newest first and the step's own
//! error is returned. Compensation failures are logged, never returned.

use std::future::Future;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::domain::SchedulerError;

/// Deferred undo action of a completed step.
pub type Compensation = BoxFuture<'static, Result<(), SchedulerError>>;

pub struct Saga {
    label: String,
    compensations: Vec<(&'static str, Compensation)>,
}

impl Saga {
    /// `label` identifies the saga in logs, e.g. the task being registered.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            compensations: Vec::new(),
        }
    }

    /// Run `action`; on success remember `compensate(&value)` for rollback,
    /// on failure roll back everything done so far.
    ///
    /// The compensation future is created eagerly but only polled on rollback.
    pub async fn step<T, A, C>(
        &mut self,
        name: &'static str,
        action: A,
        compensate: C,
    ) -> Result<T, SchedulerError>
    where
        A: Future<Output = Result<T, SchedulerError>>,
        C: FnOnce(&T) -> Compensation,
    {
        match action.await {
            Ok(value) => {
                self.compensations.push((name, compensate(&value)));
                Ok(value)
            }
            Err(err) => {
                warn!(saga = %self.label, step = name, error = %err, "step failed, rolling back");
                self.rollback().await;
                Err(err)
            }
        }
    }

    /// Run a final step that needs no compensation.
    pub async fn finish<T, A>(mut self, name: &'static str, action: A) -> Result<T, SchedulerError>
    where
        A: Future<Output = Result<T, SchedulerError>>,
    {
        match action.await {
            Ok(value) => {
                self.compensations.clear();
                Ok(value)
            }
            Err(err) => {
                warn!(saga = %self.label, step = name, error = %err, "step failed, rolling back");
                self.rollback().await;
                Err(err)
            }
        }
    }

    pub async fn rollback(&mut self) {
        while let Some((name, compensation)) = self.compensations.pop() {
            match compensation.await {
                Ok(()) => debug!(saga = %self.label, step = name, "compensated"),
                Err(err) => {
                    warn!(saga = %self.label, step = name, error = %err, "compensation failed")
                }
            }
        }
    }
}
