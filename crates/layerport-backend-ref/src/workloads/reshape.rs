use anyhow::{bail, ensure, Result};
use layerport_core::{LayerParams, QueueDescriptor, TensorHandle, Workload};

use super::{fatal, unpack};

/// Row-major data is unchanged by a reshape, so this is a plain copy.
pub struct RefReshapeWorkload {
    name: String,
    input: TensorHandle,
    output: TensorHandle,
}

impl RefReshapeWorkload {
    pub fn new(descriptor: QueueDescriptor) -> Result<Self> {
        descriptor.validate_inputs_outputs("RefReshapeWorkload", 1, 1)?;
        let LayerParams::Reshape(_) = descriptor.params else {
            bail!("RefReshapeWorkload needs reshape parameters");
        };
        let [input] = unpack(descriptor.inputs)?;
        let [output] = unpack(descriptor.outputs)?;
        ensure!(
            input.info().is_type_space_match(output.info()) && input.byte_len() == output.byte_len(),
            "reshape from {} to {} changes the data size",
            input.info().shape,
            output.info().shape
        );
        Ok(Self {
            name: descriptor.layer_name,
            input,
            output,
        })
    }
}

impl Workload for RefReshapeWorkload {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> layerport_core::Result<()> {
        self.output.write(self.input.read()).map_err(fatal)
    }
}
