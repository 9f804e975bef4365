//! Scalar element functions shared by every CPU kernel.

use layerport_core::{ActivationDescriptor, ActivationFunction, BinaryOperation, UnaryOperation};

pub fn activation(desc: &ActivationDescriptor, x: f32) -> f32 {
    let (a, b) = (desc.a, desc.b);
    match desc.function {
        ActivationFunction::ReLu => x.max(0.0),
        ActivationFunction::BoundedReLu => x.max(b).min(a),
        ActivationFunction::LeakyReLu => {
            if x > 0.0 {
                x
            } else {
                a * x
            }
        }
        ActivationFunction::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        ActivationFunction::TanH => a * (b * x).tanh(),
        ActivationFunction::Linear => a * x + b,
        ActivationFunction::Abs => x.abs(),
        ActivationFunction::Sqrt => x.sqrt(),
        ActivationFunction::Square => x * x,
        ActivationFunction::Elu => {
            if x >= 0.0 {
                x
            } else {
                a * (x.exp() - 1.0)
            }
        }
        ActivationFunction::HardSwish => x * (x + 3.0).clamp(0.0, 6.0) / 6.0,
    }
}

pub fn unary(op: UnaryOperation, x: f32) -> f32 {
    match op {
        UnaryOperation::Abs => x.abs(),
        UnaryOperation::Exp => x.exp(),
        UnaryOperation::Log => x.ln(),
        UnaryOperation::Neg => -x,
        UnaryOperation::Rsqrt => 1.0 / x.sqrt(),
        UnaryOperation::Sqrt => x.sqrt(),
        UnaryOperation::Sin => x.sin(),
    }
}

pub fn binary(op: BinaryOperation, a: f32, b: f32) -> f32 {
    match op {
        BinaryOperation::Add => a + b,
        BinaryOperation::Sub => a - b,
        BinaryOperation::Mul => a * b,
        BinaryOperation::Div => a / b,
        BinaryOperation::Maximum => a.max(b),
        BinaryOperation::Minimum => a.min(b),
    }
}

/// Whether [`activation_int`] is defined for `function`.
pub fn has_integer_form(function: ActivationFunction) -> bool {
    matches!(
        function,
        ActivationFunction::ReLu
            | ActivationFunction::BoundedReLu
            | ActivationFunction::Abs
            | ActivationFunction::Square
    )
}

/// Exact integer counterpart of [`activation`]. Bounds are narrowed to the
/// integers inside `[b, a]`.
pub fn activation_int(desc: &ActivationDescriptor, x: i64) -> Option<i64> {
    let value = match desc.function {
        ActivationFunction::ReLu => x.max(0),
        ActivationFunction::BoundedReLu => x.max(desc.b.ceil() as i64).min(desc.a.floor() as i64),
        ActivationFunction::Abs => x.abs(),
        ActivationFunction::Square => x.saturating_mul(x),
        _ => return None,
    };
    Some(value)
}

pub fn unary_has_integer_form(op: UnaryOperation) -> bool {
    matches!(op, UnaryOperation::Abs | UnaryOperation::Neg)
}

pub fn unary_int(op: UnaryOperation, x: i64) -> Option<i64> {
    match op {
        UnaryOperation::Abs => Some(x.abs()),
        UnaryOperation::Neg => Some(-x),
        _ => None,
    }
}

/// Integer arithmetic on widened operands. Division truncates toward zero;
/// dividing by zero saturates toward the sign of the dividend.
pub fn binary_int(op: BinaryOperation, a: i64, b: i64) -> i64 {
    match op {
        BinaryOperation::Add => a.saturating_add(b),
        BinaryOperation::Sub => a.saturating_sub(b),
        BinaryOperation::Mul => a.saturating_mul(b),
        BinaryOperation::Div if b == 0 => a.signum().saturating_mul(i64::MAX),
        BinaryOperation::Div => a.saturating_div(b),
        BinaryOperation::Maximum => a.max(b),
        BinaryOperation::Minimum => a.min(b),
    }
}

/// In-place softmax of one strided lane: `values[start + i * stride]` for
/// `i in 0..len`.
pub fn softmax_lane(values: &mut [f32], start: usize, len: usize, stride: usize, beta: f32) {
    let index = |i: usize| start + i * stride;
    let max = (0..len)
        .map(|i| values[index(i)])
        .fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for i in 0..len {
        let e = ((values[index(i)] - max) * beta).exp();
        values[index(i)] = e;
        sum += e;
    }
    for i in 0..len {
        values[index(i)] /= sum;
    }
}
