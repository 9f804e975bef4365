use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use layerport_core::{BackendId, Error, Result, Workload};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::RuntimeConfig;
use crate::plan::{ExecutionPlan, LayerState};

/// Runs the workloads of an [`ExecutionPlan`].
///
/// Any workload error aborts the whole run: nothing new is started, work
/// already in flight is allowed to finish, and the first error is returned.
#[derive(Clone, Debug)]
pub struct Executor {
    max_concurrency: usize,
}

impl Executor {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    /// Runs every workload on the calling thread in dependency order.
    pub fn execute(&self, plan: &mut ExecutionPlan) -> Result<()> {
        for step in 0..plan.steps.len() {
            let (backend, workload) = job(plan, step)?;
            debug!(layer = %plan.steps[step].name, %backend, "executing");
            run_workload(&backend, &workload)?;
            plan.steps[step].state = LayerState::Executed(backend);
        }
        info!(workloads = plan.steps.len(), "execution finished");
        Ok(())
    }

    /// Runs independent workloads in parallel on tokio's blocking pool, each
    /// starting only once all of its producers have completed.
    pub async fn execute_concurrent(&self, plan: &mut ExecutionPlan) -> Result<()> {
        let count = plan.steps.len();
        let mut pending: Vec<usize> = plan.steps.iter().map(|s| s.producers.len()).collect();
        let mut consumers = vec![Vec::new(); count];
        for (step, s) in plan.steps.iter().enumerate() {
            for &producer in &s.producers {
                consumers[producer].push(step);
            }
        }

        let mut ready: VecDeque<usize> = (0..count).filter(|&s| pending[s] == 0).collect();
        let mut running = JoinSet::new();
        let mut failure: Option<Error> = None;
        let mut completed = 0;

        loop {
            while failure.is_none() && running.len() < self.max_concurrency {
                let Some(step) = ready.pop_front() else {
                    break;
                };
                let (backend, workload) = match job(plan, step) {
                    Ok(job) => job,
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                };
                debug!(layer = %plan.steps[step].name, %backend, "scheduling");
                running.spawn_blocking(move || {
                    let result = run_workload(&backend, &workload);
                    (step, backend, result)
                });
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            match joined {
                Ok((step, backend, Ok(()))) => {
                    completed += 1;
                    plan.steps[step].state = LayerState::Executed(backend);
                    for &consumer in &consumers[step] {
                        pending[consumer] -= 1;
                        if pending[consumer] == 0 {
                            ready.push_back(consumer);
                        }
                    }
                }
                Ok((step, backend, Err(err))) => {
                    warn!(
                        layer = %plan.steps[step].name,
                        %backend,
                        error = %err,
                        "workload failed, aborting plan"
                    );
                    failure.get_or_insert(err);
                }
                Err(join_error) => {
                    warn!(error = %join_error, "workload task did not complete, aborting plan");
                    failure.get_or_insert(Error::backend_fatal(
                        BackendId::from_static("runtime"),
                        anyhow!("workload task failed: {join_error}"),
                    ));
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }
        info!(workloads = completed, "concurrent execution finished");
        Ok(())
    }
}

type SharedWorkload = Arc<Mutex<Box<dyn Workload>>>;

fn job(plan: &ExecutionPlan, step: usize) -> Result<(BackendId, SharedWorkload)> {
    let s = &plan.steps[step];
    match (&s.state, &s.workload) {
        (
            LayerState::WorkloadBound(backend) | LayerState::Executed(backend),
            Some(workload),
        ) => Ok((backend.clone(), workload.clone())),
        (state, _) => Err(Error::InvalidLayer(format!(
            "{} is not ready to execute ({state:?})",
            s.name
        ))),
    }
}

fn run_workload(backend: &BackendId, workload: &SharedWorkload) -> Result<()> {
    let workload = workload
        .lock()
        .map_err(|_| Error::backend_fatal(backend.clone(), anyhow!("workload lock poisoned")))?;
    workload.execute()
}
