/// How declared output shapes are reconciled with inferred ones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ShapeInferenceMethod {
    /// Declared outputs must be fully specified and equal the inferred shape.
    #[default]
    ValidateOnly,
    /// Declared dimensions that are specified must agree; everything else is
    /// filled in from the inferred shape.
    InferAndValidate,
}

#[derive(Clone, Debug, Default)]
pub struct GraphConfig {
    pub shape_inference: ShapeInferenceMethod,
}

impl GraphConfig {
    pub fn with_shape_inference(mut self, method: ShapeInferenceMethod) -> Self {
        self.shape_inference = method;
        self
    }
}
