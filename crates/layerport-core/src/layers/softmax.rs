use crate::descriptors::SoftmaxDescriptor;
use crate::error::{Error, Result};
use crate::tensor::TensorShape;

pub(crate) fn infer(layer: &str, desc: &SoftmaxDescriptor, input: &TensorShape) -> Result<TensorShape> {
    if let Some(rank) = input.rank() {
        resolve_axis(desc.axis, rank).ok_or_else(|| {
            Error::configuration(
                layer,
                format!("softmax axis {} is out of range for {input}", desc.axis),
            )
        })?;
    }
    Ok(input.clone())
}

/// Maps a possibly negative axis onto `0..rank`.
pub fn resolve_axis(axis: i32, rank: usize) -> Option<usize> {
    let rank = i64::try_from(rank).ok()?;
    let axis = i64::from(axis);
    let resolved = if axis < 0 { axis + rank } else { axis };
    (0..rank).contains(&resolved).then_some(resolved as usize)
}
