use layerport_core::{resolve_axis, Capability, DataType, LayerParams, TensorInfo};

pub fn is_layer_supported(
    inputs: &[TensorInfo],
    outputs: &[TensorInfo],
    params: &LayerParams,
) -> Capability {
    let kind = params.kind();
    if inputs.len() != kind.num_inputs() || outputs.len() != kind.num_outputs() {
        return Capability::unsupported(format!("unexpected slot count for {kind:?}"));
    }
    let Some(first) = inputs.first() else {
        return Capability::unsupported(format!("{kind:?} has no vector kernel"));
    };
    let infos = || inputs.iter().chain(outputs);

    if let Some(info) = infos().find(|i| i.data_type != DataType::Float32) {
        return Capability::unsupported(format!("{} tensors are not vectorised", info.data_type));
    }
    if !first.shape.are_all_dimensions_specified() {
        return Capability::unsupported(format!("shape {} is not fully specified", first.shape));
    }
    if infos().any(|i| i.shape != first.shape) {
        return Capability::unsupported(
            "all tensors must have the same shape, broadcasting is not supported",
        );
    }

    match params {
        LayerParams::Activation(_)
        | LayerParams::ElementwiseUnary(_)
        | LayerParams::ElementwiseBinary(_) => Capability::Supported,
        LayerParams::Softmax(desc) => {
            let dims = first.shape.dims();
            let rank = dims.len();
            match resolve_axis(desc.axis, rank) {
                Some(axis) if axis + 1 == rank && dims[axis] != Some(0) => Capability::Supported,
                _ => Capability::unsupported(format!(
                    "softmax is only vectorised along the innermost axis, got {}",
                    desc.axis
                )),
            }
        }
        _ => Capability::unsupported(format!("{kind:?} has no vector kernel")),
    }
}
