use crate::descriptors::ReshapeDescriptor;
use crate::error::{Error, Result};
use crate::tensor::TensorShape;

pub(crate) fn infer(layer: &str, desc: &ReshapeDescriptor, input: &TensorShape) -> Result<TensorShape> {
    if let (Some(src), Some(dst)) = (input.num_elements(), desc.target_shape.num_elements()) {
        if src != dst {
            return Err(Error::shape_validation(
                layer,
                format!(
                    "cannot reshape {input} ({src} elements) into {} ({dst} elements)",
                    desc.target_shape
                ),
            ));
        }
    }
    Ok(desc.target_shape.clone())
}
