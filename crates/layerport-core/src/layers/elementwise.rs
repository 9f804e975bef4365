use crate::error::{Error, Result};
use crate::tensor::{Dim, TensorShape};

/// Numpy-style broadcast of two shapes, aligned from the trailing dimension.
///
/// A missing leading dimension counts as 1. An unspecified dimension opposite
/// a concrete size greater than 1 resolves to that size; anything else
/// unspecified stays unspecified.
pub(crate) fn broadcast(layer: &str, lhs: &TensorShape, rhs: &TensorShape) -> Result<TensorShape> {
    let (Some(l_rank), Some(r_rank)) = (lhs.rank(), rhs.rank()) else {
        return Ok(TensorShape::unknown_rank());
    };
    let rank = l_rank.max(r_rank);
    let l = lhs.dims();
    let r = rhs.dims();

    let mut out: Vec<Dim> = Vec::with_capacity(rank);
    for i in 0..rank {
        let ld = if i < l_rank { l[l_rank - 1 - i] } else { Some(1) };
        let rd = if i < r_rank { r[r_rank - 1 - i] } else { Some(1) };
        let dim = match (ld, rd) {
            (Some(a), Some(b)) if a == b => Some(a),
            (Some(1), Some(b)) => Some(b),
            (Some(a), Some(1)) => Some(a),
            (Some(a), Some(b)) => {
                return Err(Error::shape_validation(
                    layer,
                    format!(
                        "shapes {lhs} and {rhs} are not broadcast-compatible \
                         (dim {i} from the right: {a} vs {b})"
                    ),
                ));
            }
            (None, Some(n)) | (Some(n), None) if n > 1 => Some(n),
            _ => None,
        };
        out.push(dim);
    }
    out.reverse();
    Ok(TensorShape::from_dims(out))
}
