/// Axis order of 4-D image tensors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DataLayout {
    /// Channels first: `[batch, channels, height, width]`.
    Nchw,
    /// Channels last: `[batch, height, width, channels]`.
    #[default]
    Nhwc,
}

impl DataLayout {
    pub fn batch_index(self) -> usize {
        0
    }

    pub fn channels_index(self) -> usize {
        match self {
            DataLayout::Nchw => 1,
            DataLayout::Nhwc => 3,
        }
    }

    pub fn height_index(self) -> usize {
        match self {
            DataLayout::Nchw => 2,
            DataLayout::Nhwc => 1,
        }
    }

    pub fn width_index(self) -> usize {
        match self {
            DataLayout::Nchw => 3,
            DataLayout::Nhwc => 2,
        }
    }

    /// Flat offset of element `(n, c, y, x)` in a contiguous tensor whose
    /// logical sizes are `[batch, channels, height, width]`.
    pub fn offset(self, [_, c, h, w]: [usize; 4], n: usize, ci: usize, y: usize, x: usize) -> usize {
        match self {
            DataLayout::Nchw => ((n * c + ci) * h + y) * w + x,
            DataLayout::Nhwc => ((n * h + y) * w + x) * c + ci,
        }
    }
}
