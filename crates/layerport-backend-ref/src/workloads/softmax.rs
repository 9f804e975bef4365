use anyhow::{bail, Context, Result};
use layerport_core::{resolve_axis, LayerParams, QueueDescriptor, TensorHandle, Workload};

use super::{concrete_shape, fatal, unpack};
use crate::decoder::{decode, encode};
use crate::math;

pub struct RefSoftmaxWorkload {
    name: String,
    beta: f32,
    input: TensorHandle,
    output: TensorHandle,
    // Elements before, along and after the softmax axis.
    outer: usize,
    axis_len: usize,
    inner: usize,
}

impl RefSoftmaxWorkload {
    pub fn new(descriptor: QueueDescriptor) -> Result<Self> {
        descriptor.validate_inputs_outputs("RefSoftmaxWorkload", 1, 1)?;
        let LayerParams::Softmax(desc) = descriptor.params else {
            bail!("RefSoftmaxWorkload needs softmax parameters");
        };
        let [input] = unpack(descriptor.inputs)?;
        let [output] = unpack(descriptor.outputs)?;
        let shape = concrete_shape(&input)?;
        let axis = resolve_axis(desc.axis, shape.len())
            .with_context(|| format!("axis {} out of range for {shape:?}", desc.axis))?;
        Ok(Self {
            name: descriptor.layer_name,
            beta: desc.beta,
            input,
            output,
            outer: shape[..axis].iter().product(),
            axis_len: shape[axis],
            inner: shape[axis + 1..].iter().product(),
        })
    }

    fn run(&self) -> Result<()> {
        let mut values = decode(&self.input)?;
        for o in 0..self.outer {
            for i in 0..self.inner {
                let start = o * self.axis_len * self.inner + i;
                math::softmax_lane(&mut values, start, self.axis_len, self.inner, self.beta);
            }
        }
        encode(&self.output, &values)
    }
}

impl Workload for RefSoftmaxWorkload {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> layerport_core::Result<()> {
        self.run().map_err(fatal)
    }
}
