use anyhow::{bail, ensure, Result};
use layerport_core::{
    DataLayout, DataType, LayerParams, QueueDescriptor, ResizeDescriptor, ResizeMethod,
    TensorHandle, Workload,
};

use super::{concrete_shape, fatal, unpack};
use crate::decoder::{decode, decode_int, encode, encode_int};

pub struct RefResizeWorkload {
    name: String,
    desc: ResizeDescriptor,
    input: TensorHandle,
    output: TensorHandle,
    // Logical [batch, channels, height, width] of input and output.
    in_dims: [usize; 4],
    out_dims: [usize; 4],
    // Input offset of every output element; empty unless nearest neighbour.
    gather: Vec<usize>,
}

impl RefResizeWorkload {
    pub fn new(descriptor: QueueDescriptor) -> Result<Self> {
        descriptor.validate_inputs_outputs("RefResizeWorkload", 1, 1)?;
        let LayerParams::Resize(desc) = descriptor.params else {
            bail!("RefResizeWorkload needs resize parameters");
        };
        ensure!(
            !(desc.align_corners && desc.half_pixel_centers),
            "align_corners and half_pixel_centers are mutually exclusive"
        );
        let [input] = unpack(descriptor.inputs)?;
        let [output] = unpack(descriptor.outputs)?;
        let in_dims = logical_dims(desc.data_layout, &concrete_shape(&input)?)?;
        let out_dims = logical_dims(desc.data_layout, &concrete_shape(&output)?)?;
        ensure!(
            in_dims[0] == out_dims[0] && in_dims[1] == out_dims[1],
            "resize cannot change batch or channels"
        );
        let integer = input.info().data_type == DataType::Signed32;
        ensure!(
            !(integer && desc.method == ResizeMethod::Bilinear),
            "bilinear interpolation is not defined on i32 tensors"
        );
        let mut workload = Self {
            name: descriptor.layer_name,
            desc,
            input,
            output,
            in_dims,
            out_dims,
            gather: Vec::new(),
        };
        if desc.method == ResizeMethod::NearestNeighbor {
            workload.gather = workload.nearest_sources();
        }
        Ok(workload)
    }

    fn run(&self) -> Result<()> {
        match self.desc.method {
            ResizeMethod::NearestNeighbor if self.input.info().data_type == DataType::Signed32 => {
                let src = decode_int(&self.input)?;
                let dst: Vec<i64> = self.gather.iter().map(|&i| src[i]).collect();
                encode_int(&self.output, &dst)
            }
            ResizeMethod::NearestNeighbor => {
                let src = decode(&self.input)?;
                let dst: Vec<f32> = self.gather.iter().map(|&i| src[i]).collect();
                encode(&self.output, &dst)
            }
            ResizeMethod::Bilinear => self.run_bilinear(),
        }
    }

    fn nearest_sources(&self) -> Vec<usize> {
        let [batch, channels, in_h, in_w] = self.in_dims;
        let [_, _, out_h, out_w] = self.out_dims;
        let layout = self.desc.data_layout;
        let scale_y = scale(in_h, out_h, self.desc.align_corners);
        let scale_x = scale(in_w, out_w, self.desc.align_corners);

        let mut sources = vec![0; batch * channels * out_h * out_w];
        for n in 0..batch {
            for y in 0..out_h {
                let src_y = self.nearest(y, scale_y, in_h);
                for x in 0..out_w {
                    let src_x = self.nearest(x, scale_x, in_w);
                    for c in 0..channels {
                        sources[layout.offset(self.out_dims, n, c, y, x)] =
                            layout.offset(self.in_dims, n, c, src_y, src_x);
                    }
                }
            }
        }
        sources
    }

    fn run_bilinear(&self) -> Result<()> {
        let src = decode(&self.input)?;
        let [batch, channels, in_h, in_w] = self.in_dims;
        let [_, _, out_h, out_w] = self.out_dims;
        let layout = self.desc.data_layout;
        let scale_y = scale(in_h, out_h, self.desc.align_corners);
        let scale_x = scale(in_w, out_w, self.desc.align_corners);

        let mut dst = vec![0.0; batch * channels * out_h * out_w];
        for n in 0..batch {
            for y in 0..out_h {
                for x in 0..out_w {
                    for c in 0..channels {
                        let at = |yy: usize, xx: usize| src[layout.offset(self.in_dims, n, c, yy, xx)];
                        let (y0, y1, dy) = self.bilinear(y, scale_y, in_h);
                        let (x0, x1, dx) = self.bilinear(x, scale_x, in_w);
                        let top = at(y0, x0) + (at(y0, x1) - at(y0, x0)) * dx;
                        let bottom = at(y1, x0) + (at(y1, x1) - at(y1, x0)) * dx;
                        dst[layout.offset(self.out_dims, n, c, y, x)] = top + (bottom - top) * dy;
                    }
                }
            }
        }
        encode(&self.output, &dst)
    }

    fn source_coordinate(&self, out: usize, scale: f32) -> f32 {
        if self.desc.half_pixel_centers {
            (out as f32 + 0.5) * scale - 0.5
        } else {
            out as f32 * scale
        }
    }

    fn nearest(&self, out: usize, scale: f32, size: usize) -> usize {
        let index = if self.desc.align_corners {
            (out as f32 * scale).round()
        } else if self.desc.half_pixel_centers {
            ((out as f32 + 0.5) * scale).floor()
        } else {
            (out as f32 * scale).floor()
        };
        (index.max(0.0) as usize).min(size - 1)
    }

    fn bilinear(&self, out: usize, scale: f32, size: usize) -> (usize, usize, f32) {
        let coord = self.source_coordinate(out, scale).max(0.0);
        let lower = (coord.floor() as usize).min(size - 1);
        let upper = (lower + 1).min(size - 1);
        (lower, upper, coord - lower as f32)
    }
}

impl Workload for RefResizeWorkload {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> layerport_core::Result<()> {
        self.run().map_err(fatal)
    }
}

fn logical_dims(layout: DataLayout, shape: &[usize]) -> Result<[usize; 4]> {
    ensure!(shape.len() == 4, "resize needs a 4-D tensor, got {shape:?}");
    ensure!(
        shape[layout.height_index()] > 0 && shape[layout.width_index()] > 0,
        "resize needs non-empty spatial dimensions, got {shape:?}"
    );
    Ok([
        shape[layout.batch_index()],
        shape[layout.channels_index()],
        shape[layout.height_index()],
        shape[layout.width_index()],
    ])
}

fn scale(input: usize, output: usize, align_corners: bool) -> f32 {
    if align_corners && output > 1 {
        (input - 1) as f32 / (output - 1) as f32
    } else {
        input as f32 / output as f32
    }
}
