use layerport_core::{resolve_axis, Capability, DataType, LayerParams, ResizeMethod, TensorInfo};

use crate::decoder::is_decodable;
use crate::math;
use crate::workloads::broadcast_shape;

/// Capability check for every kind the reference backend registers.
///
/// Anything accepted here is guaranteed to construct and execute.
pub fn is_layer_supported(
    inputs: &[TensorInfo],
    outputs: &[TensorInfo],
    params: &LayerParams,
) -> Capability {
    check_common(inputs, outputs, params).and_then(|| match params {
        LayerParams::Input(_) | LayerParams::Output(_) => {
            Capability::unsupported("graph boundaries have no workload")
        }
        LayerParams::Activation(desc) => {
            check_same_shape(inputs, outputs).and_then(|| {
                check_float_like(inputs, math::has_integer_form(desc.function), "activation")
            })
        }
        LayerParams::ElementwiseUnary(desc) => check_same_shape(inputs, outputs).and_then(|| {
            let integer_safe = math::unary_has_integer_form(desc.operation);
            check_float_like(inputs, integer_safe, "unary operation")
        }),
        LayerParams::ElementwiseBinary(_) => {
            let (lhs, rhs, out) = (dims(&inputs[0]), dims(&inputs[1]), dims(&outputs[0]));
            match broadcast_shape(&lhs, &rhs) {
                Some(shape) if shape == out => Capability::Supported,
                Some(shape) => Capability::unsupported(format!(
                    "output shape {out:?} does not match broadcast shape {shape:?}"
                )),
                None => Capability::unsupported(format!(
                    "shapes {lhs:?} and {rhs:?} do not broadcast"
                )),
            }
        }
        LayerParams::Resize(desc) => {
            let (input, output) = (dims(&inputs[0]), dims(&outputs[0]));
            if input.len() != 4 || output.len() != 4 {
                return Capability::unsupported("resize needs 4-D input and output");
            }
            if desc.align_corners && desc.half_pixel_centers {
                return Capability::unsupported(
                    "align_corners and half_pixel_centers are mutually exclusive",
                );
            }
            let layout = desc.data_layout;
            let (n, c) = (layout.batch_index(), layout.channels_index());
            let (h, w) = (layout.height_index(), layout.width_index());
            if input[n] != output[n] || input[c] != output[c] {
                return Capability::unsupported("resize cannot change batch or channels");
            }
            if [input[h], input[w], output[h], output[w]].contains(&0) {
                return Capability::unsupported("resize needs non-empty spatial dimensions");
            }
            let nearest = desc.method == ResizeMethod::NearestNeighbor;
            check_float_like(inputs, nearest, "bilinear resize")
        }
        LayerParams::Reshape(_) => {
            if !inputs[0].is_type_space_match(&outputs[0]) {
                Capability::unsupported("reshape cannot change element type or quantization")
            } else if inputs[0].shape.num_elements() != outputs[0].shape.num_elements() {
                Capability::unsupported("reshape must preserve the element count")
            } else {
                Capability::Supported
            }
        }
        LayerParams::Softmax(desc) => check_same_shape(inputs, outputs).and_then(|| {
            let rank = dims(&inputs[0]).len();
            if resolve_axis(desc.axis, rank).is_none() {
                Capability::unsupported(format!("axis {} out of range for rank {rank}", desc.axis))
            } else {
                check_float_like(inputs, false, "softmax")
            }
        }),
    })
}

fn check_common(inputs: &[TensorInfo], outputs: &[TensorInfo], params: &LayerParams) -> Capability {
    let kind = params.kind();
    if inputs.len() != kind.num_inputs() || outputs.len() != kind.num_outputs() {
        return Capability::unsupported(format!(
            "{kind:?} takes {} input(s) and {} output(s), got {} and {}",
            kind.num_inputs(),
            kind.num_outputs(),
            inputs.len(),
            outputs.len()
        ));
    }
    let mut infos = inputs.iter().chain(outputs);
    if let Some(info) = infos.clone().find(|i| !i.shape.are_all_dimensions_specified()) {
        return Capability::unsupported(format!("shape {} is not fully specified", info.shape));
    }
    if let Some(info) = infos.clone().find(|i| !is_decodable(i)) {
        return Capability::unsupported(format!("data type {} is not supported", info.data_type));
    }
    let data_type = inputs.first().map(|i| i.data_type);
    if infos.any(|i| Some(i.data_type) != data_type) {
        return Capability::unsupported("inputs and outputs must share one data type");
    }
    Capability::Supported
}

fn check_same_shape(inputs: &[TensorInfo], outputs: &[TensorInfo]) -> Capability {
    if inputs[0].shape == outputs[0].shape {
        Capability::Supported
    } else {
        Capability::unsupported(format!(
            "output shape {} differs from input shape {}",
            outputs[0].shape, inputs[0].shape
        ))
    }
}

fn check_float_like(inputs: &[TensorInfo], integer_safe: bool, what: &str) -> Capability {
    if inputs[0].data_type == DataType::Signed32 && !integer_safe {
        Capability::unsupported(format!("this {what} is not defined on i32 tensors"))
    } else {
        Capability::Supported
    }
}

fn dims(info: &TensorInfo) -> Vec<usize> {
    info.shape.concrete().unwrap_or_default()
}
