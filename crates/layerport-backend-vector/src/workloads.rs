use anyhow::{anyhow, bail, Result};
use layerport_backend_ref::math;
use layerport_core::{
    ActivationDescriptor, BinaryOperation, Error, LayerParams, QueueDescriptor, TensorHandle,
    UnaryOperation, Workload, WorkloadInfo,
};
use rayon::prelude::*;
use tracing::debug;

use crate::VECTOR_BACKEND_ID;

pub fn create(descriptor: QueueDescriptor, _info: &WorkloadInfo) -> Result<Box<dyn Workload>> {
    debug!(layer = %descriptor.layer_name, kind = ?descriptor.params.kind(), "creating vector workload");
    let workload: Box<dyn Workload> = match descriptor.params {
        LayerParams::Activation(_) | LayerParams::ElementwiseUnary(_) => {
            Box::new(VectorMapWorkload::new(descriptor)?)
        }
        LayerParams::ElementwiseBinary(_) => Box::new(VectorBinaryWorkload::new(descriptor)?),
        LayerParams::Softmax(_) => Box::new(VectorSoftmaxWorkload::new(descriptor)?),
        _ => bail!("{} has no vector kernel", descriptor.layer_name),
    };
    Ok(workload)
}

#[derive(Clone, Copy)]
enum MapOp {
    Activation(ActivationDescriptor),
    Unary(UnaryOperation),
}

impl MapOp {
    fn apply(&self, x: f32) -> f32 {
        match self {
            MapOp::Activation(desc) => math::activation(desc, x),
            MapOp::Unary(op) => math::unary(*op, x),
        }
    }
}

/// One-to-one elementwise map: activations and unary operations.
pub struct VectorMapWorkload {
    name: String,
    op: MapOp,
    input: TensorHandle,
    output: TensorHandle,
}

impl VectorMapWorkload {
    pub fn new(descriptor: QueueDescriptor) -> Result<Self> {
        descriptor.validate_inputs_outputs("VectorMapWorkload", 1, 1)?;
        let op = match descriptor.params {
            LayerParams::Activation(desc) => MapOp::Activation(desc),
            LayerParams::ElementwiseUnary(desc) => MapOp::Unary(desc.operation),
            _ => bail!("VectorMapWorkload needs activation or unary parameters"),
        };
        let [input] = unpack(descriptor.inputs)?;
        let [output] = unpack(descriptor.outputs)?;
        Ok(Self {
            name: descriptor.layer_name,
            op,
            input,
            output,
        })
    }

    fn run(&self) -> Result<()> {
        let mut data = self.input.read_f32()?;
        let op = self.op;
        data.par_iter_mut().for_each(|x| *x = op.apply(*x));
        self.output.write_f32(&data)
    }
}

impl Workload for VectorMapWorkload {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> layerport_core::Result<()> {
        self.run().map_err(fatal)
    }
}

pub struct VectorBinaryWorkload {
    name: String,
    operation: BinaryOperation,
    lhs: TensorHandle,
    rhs: TensorHandle,
    output: TensorHandle,
}

impl VectorBinaryWorkload {
    pub fn new(descriptor: QueueDescriptor) -> Result<Self> {
        descriptor.validate_inputs_outputs("VectorBinaryWorkload", 2, 1)?;
        let LayerParams::ElementwiseBinary(desc) = descriptor.params else {
            bail!("VectorBinaryWorkload needs elementwise binary parameters");
        };
        let [lhs, rhs] = unpack(descriptor.inputs)?;
        let [output] = unpack(descriptor.outputs)?;
        if lhs.info().shape != rhs.info().shape {
            bail!(
                "VectorBinaryWorkload cannot broadcast {} against {}",
                lhs.info().shape,
                rhs.info().shape
            );
        }
        Ok(Self {
            name: descriptor.layer_name,
            operation: desc.operation,
            lhs,
            rhs,
            output,
        })
    }

    fn run(&self) -> Result<()> {
        let mut data = self.lhs.read_f32()?;
        let rhs = self.rhs.read_f32()?;
        let op = self.operation;
        data.par_iter_mut()
            .zip(rhs.par_iter())
            .for_each(|(a, &b)| *a = math::binary(op, *a, b));
        self.output.write_f32(&data)
    }
}

impl Workload for VectorBinaryWorkload {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> layerport_core::Result<()> {
        self.run().map_err(fatal)
    }
}

/// Softmax along the innermost axis, one rayon task per row.
pub struct VectorSoftmaxWorkload {
    name: String,
    beta: f32,
    row_len: usize,
    input: TensorHandle,
    output: TensorHandle,
}

impl VectorSoftmaxWorkload {
    pub fn new(descriptor: QueueDescriptor) -> Result<Self> {
        descriptor.validate_inputs_outputs("VectorSoftmaxWorkload", 1, 1)?;
        let LayerParams::Softmax(desc) = descriptor.params else {
            bail!("VectorSoftmaxWorkload needs softmax parameters");
        };
        let [input] = unpack(descriptor.inputs)?;
        let [output] = unpack(descriptor.outputs)?;
        let row_len = match input.info().shape.dims().last() {
            Some(Some(len)) if *len > 0 => *len,
            _ => bail!("softmax needs a non-empty innermost axis, got {}", input.info().shape),
        };
        Ok(Self {
            name: descriptor.layer_name,
            beta: desc.beta,
            row_len,
            input,
            output,
        })
    }

    fn run(&self) -> Result<()> {
        let mut data = self.input.read_f32()?;
        let (len, beta) = (self.row_len, self.beta);
        data.par_chunks_mut(len)
            .for_each(|row| math::softmax_lane(row, 0, len, 1, beta));
        self.output.write_f32(&data)
    }
}

impl Workload for VectorSoftmaxWorkload {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> layerport_core::Result<()> {
        self.run().map_err(fatal)
    }
}

fn unpack<const N: usize>(handles: Vec<TensorHandle>) -> Result<[TensorHandle; N]> {
    handles
        .try_into()
        .map_err(|h: Vec<TensorHandle>| anyhow!("expected {N} handle(s), got {}", h.len()))
}

fn fatal(source: anyhow::Error) -> Error {
    Error::backend_fatal(VECTOR_BACKEND_ID, source)
}
