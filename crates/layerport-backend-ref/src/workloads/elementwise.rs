use anyhow::{bail, ensure, Context, Result};
use layerport_core::{
    ActivationDescriptor, BinaryOperation, DataType, LayerParams, QueueDescriptor, TensorHandle,
    UnaryOperation, Workload,
};

use super::{concrete_shape, fatal, unpack};
use crate::decoder::{decode, decode_int, encode, encode_int};
use crate::math;

fn is_integer(handle: &TensorHandle) -> bool {
    handle.info().data_type == DataType::Signed32
}

pub struct RefActivationWorkload {
    name: String,
    desc: ActivationDescriptor,
    integer: bool,
    input: TensorHandle,
    output: TensorHandle,
}

impl RefActivationWorkload {
    pub fn new(descriptor: QueueDescriptor) -> Result<Self> {
        descriptor.validate_inputs_outputs("RefActivationWorkload", 1, 1)?;
        let LayerParams::Activation(desc) = descriptor.params else {
            bail!("RefActivationWorkload needs activation parameters");
        };
        let [input] = unpack(descriptor.inputs)?;
        let [output] = unpack(descriptor.outputs)?;
        let integer = is_integer(&input);
        ensure!(
            !integer || math::has_integer_form(desc.function),
            "{:?} is not defined on i32 tensors",
            desc.function
        );
        Ok(Self {
            name: descriptor.layer_name,
            desc,
            integer,
            input,
            output,
        })
    }

    fn run(&self) -> Result<()> {
        if self.integer {
            let values = decode_int(&self.input)?
                .into_iter()
                .map(|x| math::activation_int(&self.desc, x))
                .collect::<Option<Vec<_>>>()
                .with_context(|| format!("{:?} has no integer form", self.desc.function))?;
            return encode_int(&self.output, &values);
        }
        let values: Vec<f32> = decode(&self.input)?
            .into_iter()
            .map(|x| math::activation(&self.desc, x))
            .collect();
        encode(&self.output, &values)
    }
}

impl Workload for RefActivationWorkload {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> layerport_core::Result<()> {
        self.run().map_err(fatal)
    }
}

pub struct RefUnaryWorkload {
    name: String,
    operation: UnaryOperation,
    integer: bool,
    input: TensorHandle,
    output: TensorHandle,
}

impl RefUnaryWorkload {
    pub fn new(descriptor: QueueDescriptor) -> Result<Self> {
        descriptor.validate_inputs_outputs("RefUnaryWorkload", 1, 1)?;
        let LayerParams::ElementwiseUnary(desc) = descriptor.params else {
            bail!("RefUnaryWorkload needs elementwise unary parameters");
        };
        let [input] = unpack(descriptor.inputs)?;
        let [output] = unpack(descriptor.outputs)?;
        let integer = is_integer(&input);
        ensure!(
            !integer || math::unary_has_integer_form(desc.operation),
            "{:?} is not defined on i32 tensors",
            desc.operation
        );
        Ok(Self {
            name: descriptor.layer_name,
            operation: desc.operation,
            integer,
            input,
            output,
        })
    }

    fn run(&self) -> Result<()> {
        if self.integer {
            let values = decode_int(&self.input)?
                .into_iter()
                .map(|x| math::unary_int(self.operation, x))
                .collect::<Option<Vec<_>>>()
                .with_context(|| format!("{:?} has no integer form", self.operation))?;
            return encode_int(&self.output, &values);
        }
        let values: Vec<f32> = decode(&self.input)?
            .into_iter()
            .map(|x| math::unary(self.operation, x))
            .collect();
        encode(&self.output, &values)
    }
}

impl Workload for RefUnaryWorkload {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> layerport_core::Result<()> {
        self.run().map_err(fatal)
    }
}

/// Binary elementwise operation with numpy-style broadcasting.
pub struct RefBinaryWorkload {
    name: String,
    operation: BinaryOperation,
    lhs: TensorHandle,
    rhs: TensorHandle,
    output: TensorHandle,
    // Source element for every output element.
    lhs_offsets: Vec<usize>,
    rhs_offsets: Vec<usize>,
}

impl RefBinaryWorkload {
    pub fn new(descriptor: QueueDescriptor) -> Result<Self> {
        descriptor.validate_inputs_outputs("RefBinaryWorkload", 2, 1)?;
        let LayerParams::ElementwiseBinary(desc) = descriptor.params else {
            bail!("RefBinaryWorkload needs elementwise binary parameters");
        };
        let [lhs, rhs] = unpack(descriptor.inputs)?;
        let [output] = unpack(descriptor.outputs)?;

        let out_shape = concrete_shape(&output)?;
        let (lhs_shape, rhs_shape) = (concrete_shape(&lhs)?, concrete_shape(&rhs)?);
        if broadcast_shape(&lhs_shape, &rhs_shape).as_deref() != Some(out_shape.as_slice()) {
            bail!("{lhs_shape:?} and {rhs_shape:?} do not broadcast to {out_shape:?}");
        }

        Ok(Self {
            name: descriptor.layer_name,
            operation: desc.operation,
            lhs_offsets: source_offsets(&out_shape, &broadcast_strides(&lhs_shape, &out_shape)),
            rhs_offsets: source_offsets(&out_shape, &broadcast_strides(&rhs_shape, &out_shape)),
            lhs,
            rhs,
            output,
        })
    }

    fn run(&self) -> Result<()> {
        if is_integer(&self.lhs) {
            let (lhs, rhs) = (decode_int(&self.lhs)?, decode_int(&self.rhs)?);
            let values: Vec<i64> = self
                .lhs_offsets
                .iter()
                .zip(&self.rhs_offsets)
                .map(|(&l, &r)| math::binary_int(self.operation, lhs[l], rhs[r]))
                .collect();
            return encode_int(&self.output, &values);
        }
        let (lhs, rhs) = (decode(&self.lhs)?, decode(&self.rhs)?);
        let values: Vec<f32> = self
            .lhs_offsets
            .iter()
            .zip(&self.rhs_offsets)
            .map(|(&l, &r)| math::binary(self.operation, lhs[l], rhs[r]))
            .collect();
        encode(&self.output, &values)
    }
}

impl Workload for RefBinaryWorkload {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> layerport_core::Result<()> {
        self.run().map_err(fatal)
    }
}

/// Broadcast of two concrete shapes aligned from the trailing dimension.
pub(crate) fn broadcast_shape(lhs: &[usize], rhs: &[usize]) -> Option<Vec<usize>> {
    let rank = lhs.len().max(rhs.len());
    let dim = |shape: &[usize], i: usize| {
        if i < shape.len() {
            shape[shape.len() - 1 - i]
        } else {
            1
        }
    };
    let mut out: Vec<usize> = (0..rank)
        .map(|i| match (dim(lhs, i), dim(rhs, i)) {
            (a, b) if a == b => Some(a),
            (1, b) => Some(b),
            (a, 1) => Some(a),
            _ => None,
        })
        .collect::<Option<_>>()?;
    out.reverse();
    Some(out)
}

// Row-major strides of `shape` laid against `out`, zero on broadcast axes.
fn broadcast_strides(shape: &[usize], out: &[usize]) -> Vec<usize> {
    let lead = out.len() - shape.len();
    let mut strides = vec![0; out.len()];
    let mut stride = 1;
    for (i, &size) in shape.iter().enumerate().rev() {
        if size != 1 {
            strides[lead + i] = stride;
        }
        stride *= size;
    }
    strides
}

fn source_offsets(out: &[usize], strides: &[usize]) -> Vec<usize> {
    let count: usize = out.iter().product();
    let mut offsets = Vec::with_capacity(count);
    let mut coord = vec![0usize; out.len()];
    for _ in 0..count {
        offsets.push(coord.iter().zip(strides).map(|(c, s)| c * s).sum());
        for axis in (0..out.len()).rev() {
            coord[axis] += 1;
            if coord[axis] < out[axis] {
                break;
            }
            coord[axis] = 0;
        }
    }
    offsets
}
