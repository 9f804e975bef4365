use std::fmt;

use crate::backend::BackendId;
use crate::descriptors::{
    ActivationDescriptor, BindingDescriptor, ElementwiseBinaryDescriptor,
    ElementwiseUnaryDescriptor, ReshapeDescriptor, ResizeDescriptor, SoftmaxDescriptor,
};
use crate::error::{Error, Result};
use crate::layers;
use crate::tensor::{TensorInfo, TensorShape};

/// Operation tag. The set is closed; every tag has a fixed slot arity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayerKind {
    Input,
    Output,
    Activation,
    ElementwiseUnary,
    ElementwiseBinary,
    Resize,
    Reshape,
    Softmax,
}

impl LayerKind {
    pub const ALL: [LayerKind; 8] = [
        LayerKind::Input,
        LayerKind::Output,
        LayerKind::Activation,
        LayerKind::ElementwiseUnary,
        LayerKind::ElementwiseBinary,
        LayerKind::Resize,
        LayerKind::Reshape,
        LayerKind::Softmax,
    ];

    pub fn num_inputs(self) -> usize {
        match self {
            LayerKind::Input => 0,
            LayerKind::ElementwiseBinary => 2,
            _ => 1,
        }
    }

    pub fn num_outputs(self) -> usize {
        match self {
            LayerKind::Output => 0,
            _ => 1,
        }
    }

    /// Graph boundary layers carry bound tensors in and out and never get a
    /// workload of their own.
    pub fn is_boundary(self) -> bool {
        matches!(self, LayerKind::Input | LayerKind::Output)
    }
}

/// Parameter record of a layer, tagged by kind.
#[derive(Clone, Debug, PartialEq)]
pub enum LayerParams {
    Input(BindingDescriptor),
    Output(BindingDescriptor),
    Activation(ActivationDescriptor),
    ElementwiseUnary(ElementwiseUnaryDescriptor),
    ElementwiseBinary(ElementwiseBinaryDescriptor),
    Resize(ResizeDescriptor),
    Reshape(ReshapeDescriptor),
    Softmax(SoftmaxDescriptor),
}

impl LayerParams {
    pub fn kind(&self) -> LayerKind {
        match self {
            LayerParams::Input(_) => LayerKind::Input,
            LayerParams::Output(_) => LayerKind::Output,
            LayerParams::Activation(_) => LayerKind::Activation,
            LayerParams::ElementwiseUnary(_) => LayerKind::ElementwiseUnary,
            LayerParams::ElementwiseBinary(_) => LayerKind::ElementwiseBinary,
            LayerParams::Resize(_) => LayerKind::Resize,
            LayerParams::Reshape(_) => LayerKind::Reshape,
            LayerParams::Softmax(_) => LayerKind::Softmax,
        }
    }
}

/// Index of a layer in its graph's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub(crate) usize);

impl LayerId {
    pub fn index(self) -> usize {
        self.0
    }

    pub fn output(self, index: usize) -> OutputSlotRef {
        OutputSlotRef { layer: self, index }
    }

    pub fn input(self, index: usize) -> InputSlotRef {
        InputSlotRef { layer: self, index }
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputSlotRef {
    pub layer: LayerId,
    pub index: usize,
}

impl fmt::Display for OutputSlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:out{}", self.layer, self.index)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputSlotRef {
    pub layer: LayerId,
    pub index: usize,
}

impl fmt::Display for InputSlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:in{}", self.layer, self.index)
    }
}

/// Producing end of a connection. Owns the descriptor of the data it emits.
#[derive(Clone, Debug, Default)]
pub struct OutputSlot {
    pub(crate) info: Option<TensorInfo>,
    pub(crate) connections: Vec<InputSlotRef>,
}

impl OutputSlot {
    pub fn tensor_info(&self) -> Option<&TensorInfo> {
        self.info.as_ref()
    }

    pub fn connections(&self) -> &[InputSlotRef] {
        &self.connections
    }
}

/// Consuming end of a connection; refers to at most one producer.
#[derive(Clone, Debug, Default)]
pub struct InputSlot {
    pub(crate) connection: Option<OutputSlotRef>,
}

impl InputSlot {
    pub fn connection(&self) -> Option<OutputSlotRef> {
        self.connection
    }
}

/// A node of the graph.
#[derive(Clone, Debug)]
pub struct Layer {
    pub(crate) name: String,
    pub(crate) params: LayerParams,
    pub(crate) inputs: Vec<InputSlot>,
    pub(crate) outputs: Vec<OutputSlot>,
    pub(crate) backend: Option<BackendId>,
}

impl Layer {
    pub(crate) fn new(name: impl Into<String>, params: LayerParams) -> Self {
        let kind = params.kind();
        Self {
            name: name.into(),
            params,
            inputs: vec![InputSlot::default(); kind.num_inputs()],
            outputs: vec![OutputSlot::default(); kind.num_outputs()],
            backend: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> LayerKind {
        self.params.kind()
    }

    pub fn params(&self) -> &LayerParams {
        &self.params
    }

    pub fn backend(&self) -> Option<&BackendId> {
        self.backend.as_ref()
    }

    pub fn input_slots(&self) -> &[InputSlot] {
        &self.inputs
    }

    pub fn output_slots(&self) -> &[OutputSlot] {
        &self.outputs
    }

    pub fn num_connected_inputs(&self) -> usize {
        self.inputs
            .iter()
            .filter(|slot| slot.connection.is_some())
            .count()
    }

    /// Output shapes implied by `input_shapes` and the parameter record.
    ///
    /// Pure: reads neither graph nor slot state, so repeated calls with the
    /// same shapes give the same answer.
    pub fn infer_output_shapes(&self, input_shapes: &[TensorShape]) -> Result<Vec<TensorShape>> {
        let expected = self.kind().num_inputs();
        if input_shapes.len() != expected {
            return Err(Error::Connection {
                layer: self.name.clone(),
                expected,
                connected: input_shapes.len(),
            });
        }
        layers::infer_output_shapes(&self.name, &self.params, input_shapes)
    }
}
