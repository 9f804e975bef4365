//! Shape transfer functions, one per layer kind.

mod elementwise;
mod reshape;
mod resize;
mod softmax;

pub use softmax::resolve_axis;

use crate::error::Result;
use crate::layer::LayerParams;
use crate::tensor::TensorShape;

/// Callers guarantee `inputs.len()` matches the kind's arity.
pub(crate) fn infer_output_shapes(
    layer: &str,
    params: &LayerParams,
    inputs: &[TensorShape],
) -> Result<Vec<TensorShape>> {
    let shape = match params {
        // Nothing upstream constrains an input; the builder declares it.
        LayerParams::Input(_) => TensorShape::unknown_rank(),
        LayerParams::Output(_) => return Ok(Vec::new()),
        LayerParams::Activation(_) | LayerParams::ElementwiseUnary(_) => inputs[0].clone(),
        LayerParams::ElementwiseBinary(_) => elementwise::broadcast(layer, &inputs[0], &inputs[1])?,
        LayerParams::Resize(desc) => resize::infer(layer, desc, &inputs[0])?,
        LayerParams::Reshape(desc) => reshape::infer(layer, desc, &inputs[0])?,
        LayerParams::Softmax(desc) => softmax::infer(layer, desc, &inputs[0])?,
    };
    Ok(vec![shape])
}
