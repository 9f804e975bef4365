use crate::descriptors::{ResizeDescriptor, SizeMode};
use crate::error::{Error, Result};
use crate::tensor::{Dim, TensorShape};

pub(crate) fn infer(layer: &str, desc: &ResizeDescriptor, input: &TensorShape) -> Result<TensorShape> {
    if desc.align_corners && desc.half_pixel_centers {
        return Err(Error::configuration(
            layer,
            "align_corners cannot be true when half_pixel_centers is true",
        ));
    }
    for (axis, value) in [("height", desc.target_height), ("width", desc.target_width)] {
        if !value.is_finite() || value < 0.0 {
            return Err(Error::configuration(
                layer,
                format!("target {axis} must be a finite, non-negative number, got {value}"),
            ));
        }
    }
    if input.rank() != Some(4) {
        return Err(Error::shape_validation(
            layer,
            format!("resize expects a 4-D input, got {input}"),
        ));
    }

    let layout = desc.data_layout;
    let dim = |index: usize| input.dims()[index];

    let (out_height, out_width) = match desc.size_mode {
        SizeMode::Size => (
            Some(desc.target_height as usize),
            Some(desc.target_width as usize),
        ),
        SizeMode::Scale => (
            scaled(dim(layout.height_index()), desc.target_height),
            scaled(dim(layout.width_index()), desc.target_width),
        ),
    };

    let mut out = [None; 4];
    out[layout.batch_index()] = dim(layout.batch_index());
    out[layout.channels_index()] = dim(layout.channels_index());
    out[layout.height_index()] = out_height;
    out[layout.width_index()] = out_width;
    Ok(TensorShape::from_dims(out))
}

// Truncates toward zero. An unknown input size stays unknown.
fn scaled(size: Dim, factor: f32) -> Dim {
    size.map(|s| (s as f32 * factor) as usize)
}
