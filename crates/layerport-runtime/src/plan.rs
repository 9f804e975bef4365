use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use layerport_core::{
    BackendId, Capability, DispatchRegistry, Error, Graph, LayerBindingId, LayerId, LayerParams,
    Result, TensorHandle, TensorHandles, Workload,
};
use tracing::{debug, info};

use crate::config::RuntimeConfig;
use crate::placement::{layer_infos, place};

/// Lifecycle of a compute layer inside a plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LayerState {
    Unplaced,
    Validated(BackendId),
    WorkloadBound(BackendId),
    Executed(BackendId),
}

impl LayerState {
    pub fn backend(&self) -> Option<&BackendId> {
        match self {
            LayerState::Unplaced => None,
            LayerState::Validated(b) | LayerState::WorkloadBound(b) | LayerState::Executed(b) => {
                Some(b)
            }
        }
    }
}

/// A compute layer with its bound workload.
pub(crate) struct Step {
    pub(crate) layer: LayerId,
    pub(crate) name: String,
    pub(crate) state: LayerState,
    pub(crate) workload: Option<Arc<Mutex<Box<dyn Workload>>>>,
    /// Indices of the steps producing this step's inputs.
    pub(crate) producers: Vec<usize>,
}

/// A validated, placed graph with one tensor handle per output slot and one
/// workload per compute layer, ready to be run any number of times.
pub struct ExecutionPlan {
    graph: Graph,
    registry: DispatchRegistry,
    handles: TensorHandles,
    pub(crate) steps: Vec<Step>,
    index: HashMap<LayerId, usize>,
    inputs: HashMap<LayerBindingId, TensorHandle>,
    outputs: HashMap<LayerBindingId, TensorHandle>,
}

impl ExecutionPlan {
    /// Validates `graph`, places every compute layer, allocates tensors and
    /// creates the workloads.
    pub fn new(mut graph: Graph, registry: DispatchRegistry, config: &RuntimeConfig) -> Result<Self> {
        graph.infer_tensor_infos()?;
        if !graph.is_fully_resolved() {
            return Err(Error::shape_validation(
                "<graph>",
                "execution needs every tensor shape to be fully specified",
            ));
        }
        let order = graph.topological_order()?;

        let mut steps = Vec::new();
        let mut index = HashMap::new();
        for &id in &order {
            let layer = graph.layer(id)?;
            if layer.kind().is_boundary() {
                continue;
            }
            let producers = layer
                .input_slots()
                .iter()
                .filter_map(|slot| slot.connection())
                .filter_map(|source| index.get(&source.layer).copied())
                .collect();
            index.insert(id, steps.len());
            steps.push(Step {
                layer: id,
                name: layer.name().to_owned(),
                state: LayerState::Unplaced,
                workload: None,
                producers,
            });
        }

        place(&mut graph, &registry, &config.backend_preferences)?;
        for step in &mut steps {
            if let Some(backend) = graph.layer(step.layer)?.backend() {
                step.state = LayerState::Validated(backend.clone());
            }
        }

        let mut handles = TensorHandles::new();
        for (id, layer) in graph.layers() {
            for slot in (0..layer.output_slots().len()).map(|i| id.output(i)) {
                let Some(info) = graph.tensor_info(slot)? else {
                    continue;
                };
                let handle = TensorHandle::allocate(info.clone())
                    .map_err(|e| Error::shape_validation(layer.name(), e.to_string()))?;
                handles.insert(slot, handle);
            }
        }

        let (inputs, outputs) = bind_boundaries(&graph, &handles)?;

        let mut plan = Self {
            graph,
            registry,
            handles,
            steps,
            index,
            inputs,
            outputs,
        };
        for step in 0..plan.steps.len() {
            plan.bind_workload(step)?;
        }
        info!(
            layers = plan.graph.len(),
            workloads = plan.steps.len(),
            inputs = plan.inputs.len(),
            outputs = plan.outputs.len(),
            "execution plan ready"
        );
        Ok(plan)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// State of a compute layer; `None` for boundary layers.
    pub fn state(&self, id: LayerId) -> Option<&LayerState> {
        self.index.get(&id).map(|&step| &self.steps[step].state)
    }

    /// Handle a graph input is read from. Write the input data into it before
    /// executing.
    pub fn input(&self, binding_id: LayerBindingId) -> Result<&TensorHandle> {
        self.inputs
            .get(&binding_id)
            .ok_or_else(|| Error::InvalidLayer(format!("no input bound to id {binding_id}")))
    }

    pub fn output(&self, binding_id: LayerBindingId) -> Result<&TensorHandle> {
        self.outputs
            .get(&binding_id)
            .ok_or_else(|| Error::InvalidLayer(format!("no output bound to id {binding_id}")))
    }

    /// Moves a layer to another backend and rebuilds its workload.
    pub fn rebind(&mut self, id: LayerId, backend: BackendId) -> Result<()> {
        let step = *self
            .index
            .get(&id)
            .ok_or_else(|| Error::InvalidLayer(format!("{id} has no workload to rebind")))?;

        let layer = self.graph.layer(id)?;
        let name = layer.name().to_owned();
        let params = layer.params().clone();
        let (inputs, outputs) = layer_infos(&self.graph, id)?;
        let capability = self.registry.check(&backend, &inputs, &outputs, &params);
        if let Capability::Unsupported(reason) = capability {
            return Err(Error::BackendCapability {
                layer: name,
                reason: format!("{backend}: {reason}"),
            });
        }

        self.graph.set_backend(id, Some(backend.clone()))?;
        self.steps[step].state = LayerState::Validated(backend);
        self.steps[step].workload = None;
        self.bind_workload(step)
    }

    fn bind_workload(&mut self, step: usize) -> Result<()> {
        let id = self.steps[step].layer;
        let LayerState::Validated(backend) = self.steps[step].state.clone() else {
            return Err(Error::InvalidLayer(format!(
                "{} must be placed before its workload is created",
                self.steps[step].name
            )));
        };
        let factory = self.registry.factory(&backend);
        let workload = self.graph.create_workload(id, &factory, &self.handles)?;
        debug!(layer = %self.steps[step].name, %backend, "workload bound");
        self.steps[step].workload = Some(Arc::new(Mutex::new(workload)));
        self.steps[step].state = LayerState::WorkloadBound(backend);
        Ok(())
    }
}

type Bindings = HashMap<LayerBindingId, TensorHandle>;

fn bind_boundaries(graph: &Graph, handles: &TensorHandles) -> Result<(Bindings, Bindings)> {
    let mut inputs = HashMap::new();
    let mut outputs = HashMap::new();
    for (id, layer) in graph.layers() {
        let (bindings, slot) = match layer.params() {
            LayerParams::Input(binding) => (&mut inputs, (binding.binding_id, Some(id.output(0)))),
            LayerParams::Output(binding) => (
                &mut outputs,
                (binding.binding_id, layer.input_slots()[0].connection()),
            ),
            _ => continue,
        };
        let (binding_id, Some(slot)) = slot else {
            return Err(Error::Connection {
                layer: layer.name().to_owned(),
                expected: 1,
                connected: 0,
            });
        };
        let handle = handles
            .get(slot)
            .cloned()
            .ok_or_else(|| Error::InvalidLayer(format!("no tensor handle bound to {slot}")))?;
        if bindings.insert(binding_id, handle).is_some() {
            return Err(Error::InvalidLayer(format!(
                "binding id {binding_id} is used by more than one {:?} layer",
                layer.kind()
            )));
        }
    }
    Ok((inputs, outputs))
}
