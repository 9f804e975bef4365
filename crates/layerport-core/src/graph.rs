use std::collections::VecDeque;

use tracing::debug;

use crate::backend::{BackendId, QueueDescriptor, TensorHandles, Workload, WorkloadFactory, WorkloadInfo};
use crate::config::{GraphConfig, ShapeInferenceMethod};
use crate::error::{Error, Result};
use crate::layer::{
    InputSlot, InputSlotRef, Layer, LayerId, LayerKind, LayerParams, OutputSlot, OutputSlotRef,
};
use crate::tensor::{TensorHandle, TensorInfo, TensorShape};

/// Owns every layer and is the only place connections are changed.
///
/// Layers live in an index arena; erased layers leave a hole so existing
/// [`LayerId`]s never point at a different layer.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    layers: Vec<Option<Layer>>,
    config: GraphConfig,
}

impl Graph {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            layers: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn set_shape_inference_method(&mut self, method: ShapeInferenceMethod) {
        self.config.shape_inference = method;
    }

    pub fn add_layer(&mut self, name: impl Into<String>, params: LayerParams) -> LayerId {
        let id = LayerId(self.layers.len());
        self.layers.push(Some(Layer::new(name, params)));
        id
    }

    pub fn len(&self) -> usize {
        self.layers.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: LayerId) -> bool {
        matches!(self.layers.get(id.0), Some(Some(_)))
    }

    pub fn layer(&self, id: LayerId) -> Result<&Layer> {
        self.layers
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::InvalidLayer(format!("no layer {id}")))
    }

    fn layer_mut(&mut self, id: LayerId) -> Result<&mut Layer> {
        self.layers
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::InvalidLayer(format!("no layer {id}")))
    }

    /// Layers in insertion order.
    pub fn layers(&self) -> impl Iterator<Item = (LayerId, &Layer)> {
        self.layers
            .iter()
            .enumerate()
            .filter_map(|(i, layer)| layer.as_ref().map(|layer| (LayerId(i), layer)))
    }

    pub fn find_layer(&self, name: &str) -> Option<LayerId> {
        self.layers()
            .find(|(_, layer)| layer.name == name)
            .map(|(id, _)| id)
    }

    fn output_slot(&self, slot: OutputSlotRef) -> Result<&OutputSlot> {
        self.layer(slot.layer)?
            .outputs
            .get(slot.index)
            .ok_or_else(|| Error::InvalidLayer(format!("no output slot {slot}")))
    }

    fn output_slot_mut(&mut self, slot: OutputSlotRef) -> Result<&mut OutputSlot> {
        self.layer_mut(slot.layer)?
            .outputs
            .get_mut(slot.index)
            .ok_or_else(|| Error::InvalidLayer(format!("no output slot {slot}")))
    }

    fn input_slot_mut(&mut self, slot: InputSlotRef) -> Result<&mut InputSlot> {
        self.layer_mut(slot.layer)?
            .inputs
            .get_mut(slot.index)
            .ok_or_else(|| Error::InvalidLayer(format!("no input slot {slot}")))
    }

    pub fn tensor_info(&self, slot: OutputSlotRef) -> Result<Option<&TensorInfo>> {
        Ok(self.output_slot(slot)?.info.as_ref())
    }

    pub fn set_tensor_info(&mut self, slot: OutputSlotRef, info: TensorInfo) -> Result<()> {
        self.output_slot_mut(slot)?.info = Some(info);
        Ok(())
    }

    pub fn connect(&mut self, from: OutputSlotRef, to: InputSlotRef) -> Result<()> {
        self.output_slot(from)?;
        let input = self.input_slot_mut(to)?;
        if let Some(existing) = input.connection {
            return Err(Error::InvalidLayer(format!(
                "input slot {to} is already connected to {existing}"
            )));
        }
        input.connection = Some(from);
        self.output_slot_mut(from)?.connections.push(to);
        Ok(())
    }

    /// Detaches an input slot, returning the producer it was connected to.
    pub fn disconnect(&mut self, to: InputSlotRef) -> Result<Option<OutputSlotRef>> {
        let previous = self.input_slot_mut(to)?.connection.take();
        if let Some(from) = previous {
            self.output_slot_mut(from)?
                .connections
                .retain(|consumer| *consumer != to);
        }
        Ok(previous)
    }

    /// Points an input slot at a different producer.
    ///
    /// No cycle check is made; the caller must not create one.
    pub fn reconnect_input(
        &mut self,
        to: InputSlotRef,
        from: OutputSlotRef,
    ) -> Result<Option<OutputSlotRef>> {
        self.output_slot(from)?;
        let previous = self.disconnect(to)?;
        self.connect(from, to)?;
        Ok(previous)
    }

    /// Moves every consumer of `from` over to `to`.
    pub fn move_all_connections(&mut self, from: OutputSlotRef, to: OutputSlotRef) -> Result<()> {
        self.output_slot(to)?;
        let consumers = std::mem::take(&mut self.output_slot_mut(from)?.connections);
        for consumer in consumers {
            self.input_slot_mut(consumer)?.connection = None;
            self.connect(to, consumer)?;
        }
        Ok(())
    }

    /// Copies kind, name, parameters and backend assignment of `id` into
    /// `target`. The copy has no connections and no tensor infos.
    pub fn clone_layer_into(&self, id: LayerId, target: &mut Graph) -> Result<LayerId> {
        let layer = self.layer(id)?;
        let new_id = target.add_layer(layer.name.clone(), layer.params.clone());
        target.layer_mut(new_id)?.backend = layer.backend.clone();
        Ok(new_id)
    }

    /// [`Graph::clone_layer_into`] with this graph as the target.
    pub fn clone_layer(&mut self, id: LayerId) -> Result<LayerId> {
        let layer = self.layer(id)?.clone();
        let new_id = self.add_layer(layer.name, layer.params);
        self.layer_mut(new_id)?.backend = layer.backend;
        Ok(new_id)
    }

    /// Swaps the operation of a layer while keeping its id, its connections
    /// and its output tensor infos. The backend assignment is cleared.
    pub fn replace_layer(
        &mut self,
        id: LayerId,
        name: impl Into<String>,
        params: LayerParams,
    ) -> Result<()> {
        let layer = self.layer_mut(id)?;
        let (old, new) = (layer.kind(), params.kind());
        if old.num_inputs() != new.num_inputs() || old.num_outputs() != new.num_outputs() {
            return Err(Error::InvalidLayer(format!(
                "cannot replace {} ({old:?}) with {new:?}: slot arity differs",
                layer.name
            )));
        }
        layer.name = name.into();
        layer.params = params;
        layer.backend = None;
        Ok(())
    }

    pub fn erase_layer(&mut self, id: LayerId) -> Result<()> {
        let layer = self.layer(id)?;
        let inputs: Vec<InputSlotRef> = (0..layer.inputs.len()).map(|i| id.input(i)).collect();
        let consumers: Vec<InputSlotRef> = layer
            .outputs
            .iter()
            .flat_map(|slot| slot.connections.iter().copied())
            .collect();
        for slot in inputs.into_iter().chain(consumers) {
            self.disconnect(slot)?;
        }
        self.layers[id.0] = None;
        Ok(())
    }

    pub fn set_backend(&mut self, id: LayerId, backend: Option<BackendId>) -> Result<()> {
        self.layer_mut(id)?.backend = backend;
        Ok(())
    }

    /// Producers before consumers; ties keep insertion order.
    pub fn topological_order(&self) -> Result<Vec<LayerId>> {
        let mut pending = vec![0usize; self.layers.len()];
        for (id, layer) in self.layers() {
            pending[id.0] = layer.num_connected_inputs();
        }

        let mut ready: VecDeque<LayerId> = self
            .layers()
            .filter(|(id, _)| pending[id.0] == 0)
            .map(|(id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(self.len());

        while let Some(id) = ready.pop_front() {
            order.push(id);
            for slot in &self.layer(id)?.outputs {
                for consumer in &slot.connections {
                    let count = &mut pending[consumer.layer.0];
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(consumer.layer);
                    }
                }
            }
        }

        if order.len() != self.len() {
            let stuck = self
                .layers()
                .find(|(id, _)| pending[id.0] > 0)
                .map(|(_, layer)| layer.name.clone())
                .unwrap_or_default();
            return Err(Error::Cycle(stuck));
        }
        Ok(order)
    }

    /// Validates every layer in dependency order.
    pub fn infer_tensor_infos(&mut self) -> Result<()> {
        for id in self.topological_order()? {
            self.validate_tensor_shapes_from_inputs(id)?;
        }
        Ok(())
    }

    /// Checks connections, infers output shapes from the connected producers
    /// and reconciles them with the declared outputs.
    pub fn validate_tensor_shapes_from_inputs(&mut self, id: LayerId) -> Result<()> {
        let method = self.config.shape_inference;
        let layer = self.layer(id)?;
        let name = layer.name.clone();
        let kind = layer.kind();

        let expected = kind.num_inputs();
        let connected = layer.num_connected_inputs();
        if connected != expected {
            return Err(Error::Connection {
                layer: name,
                expected,
                connected,
            });
        }

        if kind == LayerKind::Input {
            return match layer.outputs[0].info.as_ref() {
                Some(info) if info.shape.are_all_dimensions_specified() => Ok(()),
                Some(info) => Err(Error::shape_validation(
                    name,
                    format!("input shape {} must be fully specified", info.shape),
                )),
                None => Err(Error::shape_validation(name, "input has no tensor info set")),
            };
        }

        let mut input_infos = Vec::with_capacity(expected);
        for source in layer.inputs.iter().filter_map(InputSlot::connection) {
            let info = self.output_slot(source)?.info.clone().ok_or_else(|| {
                Error::shape_validation(&name, format!("producer {source} has no tensor info set"))
            })?;
            input_infos.push(info);
        }

        let input_shapes: Vec<TensorShape> = input_infos.iter().map(|i| i.shape.clone()).collect();
        let inferred = layer.infer_output_shapes(&input_shapes)?;

        for (index, inferred_shape) in inferred.into_iter().enumerate() {
            let declared = self.layer(id)?.outputs[index].info.clone();
            let info = match (declared, method) {
                (Some(info), _) => {
                    let shape = reconcile(&name, index, &info.shape, &inferred_shape, method)?;
                    info.with_shape(shape)
                }
                (None, ShapeInferenceMethod::ValidateOnly) => {
                    return Err(Error::shape_validation(
                        name,
                        format!("output {index} has no declared tensor info"),
                    ));
                }
                (None, ShapeInferenceMethod::InferAndValidate) => {
                    let template = input_infos.first().ok_or_else(|| {
                        Error::shape_validation(
                            &name,
                            format!("cannot infer the data type of output {index}"),
                        )
                    })?;
                    template.with_shape(inferred_shape)
                }
            };
            debug!(layer = %name, output = index, shape = %info.shape, "validated output shape");
            self.output_slot_mut(id.output(index))?.info = Some(info);
        }
        Ok(())
    }

    /// True once every output slot carries a fully specified shape.
    pub fn is_fully_resolved(&self) -> bool {
        self.layers().all(|(_, layer)| {
            layer.outputs.iter().all(|slot| {
                slot.info
                    .as_ref()
                    .is_some_and(|info| info.shape.are_all_dimensions_specified())
            })
        })
    }

    /// Forwards a descriptor built from the layer's bound handles and
    /// parameters to `factory`.
    pub fn create_workload(
        &self,
        id: LayerId,
        factory: &dyn WorkloadFactory,
        handles: &TensorHandles,
    ) -> Result<Box<dyn Workload>> {
        let layer = self.layer(id)?;
        if layer.kind().is_boundary() {
            return Err(Error::InvalidLayer(format!(
                "{} is a graph boundary and has no workload",
                layer.name
            )));
        }
        let expected = layer.kind().num_inputs();
        let connected = layer.num_connected_inputs();
        if connected != expected {
            return Err(Error::Connection {
                layer: layer.name.clone(),
                expected,
                connected,
            });
        }

        let mut descriptor = QueueDescriptor {
            layer_name: layer.name.clone(),
            params: layer.params.clone(),
            inputs: Vec::with_capacity(expected),
            outputs: Vec::with_capacity(layer.outputs.len()),
        };
        let mut info = WorkloadInfo::default();

        let sources = layer.inputs.iter().filter_map(InputSlot::connection);
        let outputs = (0..layer.outputs.len()).map(|i| id.output(i));
        for source in sources {
            descriptor.inputs.push(bound_handle(handles, source)?);
            info.input_infos.push(self.resolved_info(&layer.name, source)?);
        }
        for slot in outputs {
            descriptor.outputs.push(bound_handle(handles, slot)?);
            info.output_infos.push(self.resolved_info(&layer.name, slot)?);
        }

        debug!(layer = %layer.name, backend = %factory.backend_id(), "creating workload");
        factory.create_workload(descriptor, &info)
    }

    fn resolved_info(&self, layer: &str, slot: OutputSlotRef) -> Result<TensorInfo> {
        self.output_slot(slot)?
            .info
            .clone()
            .ok_or_else(|| Error::shape_validation(layer, format!("{slot} has no tensor info set")))
    }
}

fn bound_handle(handles: &TensorHandles, slot: OutputSlotRef) -> Result<TensorHandle> {
    handles
        .get(slot)
        .cloned()
        .ok_or_else(|| Error::InvalidLayer(format!("no tensor handle bound to {slot}")))
}

fn reconcile(
    layer: &str,
    index: usize,
    declared: &TensorShape,
    inferred: &TensorShape,
    method: ShapeInferenceMethod,
) -> Result<TensorShape> {
    match method {
        ShapeInferenceMethod::ValidateOnly => {
            if !declared.are_all_dimensions_specified() {
                return Err(Error::shape_validation(
                    layer,
                    format!(
                        "output {index}: declared shape {declared} must be fully specified \
                         under ValidateOnly"
                    ),
                ));
            }
            if declared != inferred {
                return Err(Error::shape_validation(
                    layer,
                    format!(
                        "output {index}: declared shape {declared} does not match inferred \
                         shape {inferred}"
                    ),
                ));
            }
            Ok(declared.clone())
        }
        ShapeInferenceMethod::InferAndValidate => {
            let (Some(declared_rank), Some(inferred_rank)) = (declared.rank(), inferred.rank())
            else {
                return Ok(if declared.is_rank_specified() {
                    declared.clone()
                } else {
                    inferred.clone()
                });
            };
            if declared_rank != inferred_rank {
                return Err(Error::shape_validation(
                    layer,
                    format!(
                        "output {index}: declared rank {declared_rank} does not match inferred \
                         rank {inferred_rank}"
                    ),
                ));
            }
            let mut merged = Vec::with_capacity(declared_rank);
            for (axis, (d, i)) in declared.dims().iter().zip(inferred.dims()).enumerate() {
                merged.push(match (*d, *i) {
                    (Some(a), Some(b)) if a != b => {
                        return Err(Error::shape_validation(
                            layer,
                            format!(
                                "output {index}: dimension {axis} declared as {a} but inferred \
                                 as {b}"
                            ),
                        ));
                    }
                    (Some(a), _) => Some(a),
                    (None, i) => i,
                });
            }
            Ok(TensorShape::from_dims(merged))
        }
    }
}
