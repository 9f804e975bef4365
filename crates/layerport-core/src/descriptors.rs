//! Parameter records, one per layer kind. These are plain data fixed at layer
//! construction; consistency is only checked when shapes are inferred.

use crate::layout::DataLayout;
use crate::tensor::TensorShape;

/// Identifies a graph input or output when binding tensors for execution.
pub type LayerBindingId = i32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingDescriptor {
    pub binding_id: LayerBindingId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActivationFunction {
    ReLu,
    /// `min(a, max(b, x))`
    BoundedReLu,
    /// `x > 0 ? x : a * x`
    LeakyReLu,
    Sigmoid,
    /// `a * tanh(b * x)`
    TanH,
    /// `a * x + b`
    Linear,
    Abs,
    Sqrt,
    Square,
    /// `x >= 0 ? x : a * (exp(x) - 1)`
    Elu,
    HardSwish,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActivationDescriptor {
    pub function: ActivationFunction,
    pub a: f32,
    pub b: f32,
}

impl ActivationDescriptor {
    pub fn new(function: ActivationFunction) -> Self {
        Self {
            function,
            a: 0.0,
            b: 0.0,
        }
    }

    pub fn with_params(function: ActivationFunction, a: f32, b: f32) -> Self {
        Self { function, a, b }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOperation {
    Abs,
    Exp,
    Log,
    Neg,
    Rsqrt,
    Sqrt,
    Sin,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElementwiseUnaryDescriptor {
    pub operation: UnaryOperation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOperation {
    Add,
    Sub,
    Mul,
    Div,
    Maximum,
    Minimum,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElementwiseBinaryDescriptor {
    pub operation: BinaryOperation,
}

/// How `target_height` / `target_width` of a [`ResizeDescriptor`] are read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SizeMode {
    /// Absolute output height and width.
    #[default]
    Size,
    /// Multipliers applied to the input height and width.
    Scale,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResizeMethod {
    #[default]
    Bilinear,
    NearestNeighbor,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResizeDescriptor {
    pub size_mode: SizeMode,
    pub target_height: f32,
    pub target_width: f32,
    pub data_layout: DataLayout,
    pub align_corners: bool,
    pub half_pixel_centers: bool,
    pub method: ResizeMethod,
}

impl ResizeDescriptor {
    pub fn to_size(height: usize, width: usize) -> Self {
        Self {
            size_mode: SizeMode::Size,
            target_height: height as f32,
            target_width: width as f32,
            ..Self::default()
        }
    }

    pub fn by_scale(height: f32, width: f32) -> Self {
        Self {
            size_mode: SizeMode::Scale,
            target_height: height,
            target_width: width,
            ..Self::default()
        }
    }

    pub fn with_layout(mut self, data_layout: DataLayout) -> Self {
        self.data_layout = data_layout;
        self
    }

    pub fn with_method(mut self, method: ResizeMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_align_corners(mut self, align_corners: bool) -> Self {
        self.align_corners = align_corners;
        self
    }

    pub fn with_half_pixel_centers(mut self, half_pixel_centers: bool) -> Self {
        self.half_pixel_centers = half_pixel_centers;
        self
    }
}

impl Default for ResizeDescriptor {
    fn default() -> Self {
        Self {
            size_mode: SizeMode::Size,
            target_height: 0.0,
            target_width: 0.0,
            data_layout: DataLayout::Nhwc,
            align_corners: false,
            half_pixel_centers: false,
            method: ResizeMethod::Bilinear,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReshapeDescriptor {
    pub target_shape: TensorShape,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SoftmaxDescriptor {
    pub beta: f32,
    /// Negative values count from the last dimension.
    pub axis: i32,
}

impl Default for SoftmaxDescriptor {
    fn default() -> Self {
        Self {
            beta: 1.0,
            axis: -1,
        }
    }
}
