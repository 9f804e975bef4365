use std::fmt;
use std::sync::{Arc, RwLock};

use anyhow::{ensure, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use smallvec::SmallVec;

/// A single dimension: `Some(size)` when concrete, `None` when not yet known.
pub type Dim = Option<usize>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Float32,
    Float16,
    Signed32,
    QAsymmU8,
    QAsymmS8,
    Boolean,
}

impl DataType {
    pub fn size_in_bytes(self) -> usize {
        match self {
            DataType::Float32 | DataType::Signed32 => 4,
            DataType::Float16 => 2,
            DataType::QAsymmU8 | DataType::QAsymmS8 | DataType::Boolean => 1,
        }
    }

    pub fn is_quantized(self) -> bool {
        matches!(self, DataType::QAsymmU8 | DataType::QAsymmS8)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Float32 => "f32",
            DataType::Float16 => "f16",
            DataType::Signed32 => "i32",
            DataType::QAsymmU8 => "qasymm_u8",
            DataType::QAsymmS8 => "qasymm_s8",
            DataType::Boolean => "bool",
        };
        f.write_str(s)
    }
}

/// Affine quantization: `real = scale * (quantized - offset)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuantizationInfo {
    pub scale: f32,
    pub offset: i32,
}

/// Ordered tensor dimensions, each independently concrete or unspecified.
///
/// A shape whose rank is itself unknown is also representable; it only ever
/// appears on a declared output before shape inference has run.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TensorShape {
    dims: Option<SmallVec<[Dim; 6]>>,
}

impl TensorShape {
    /// Fully specified shape.
    pub fn new(dims: &[usize]) -> Self {
        Self {
            dims: Some(dims.iter().map(|&d| Some(d)).collect()),
        }
    }

    pub fn from_dims<I: IntoIterator<Item = Dim>>(dims: I) -> Self {
        Self {
            dims: Some(dims.into_iter().collect()),
        }
    }

    /// Builds a shape from sizes plus a parallel specification mask. A size
    /// whose flag is `false` is dropped regardless of its value. `None` when
    /// the two slices differ in length.
    pub fn with_specificity(sizes: &[usize], specified: &[bool]) -> Option<Self> {
        if sizes.len() != specified.len() {
            return None;
        }
        Some(Self::from_dims(
            sizes
                .iter()
                .zip(specified)
                .map(|(&size, &known)| known.then_some(size)),
        ))
    }

    /// Shape with the given rank and every dimension unspecified.
    pub fn unspecified(rank: usize) -> Self {
        Self::from_dims(std::iter::repeat(None).take(rank))
    }

    pub fn unknown_rank() -> Self {
        Self { dims: None }
    }

    pub fn is_rank_specified(&self) -> bool {
        self.dims.is_some()
    }

    pub fn rank(&self) -> Option<usize> {
        self.dims.as_ref().map(|d| d.len())
    }

    /// Dimensions, empty when the rank is unknown.
    pub fn dims(&self) -> &[Dim] {
        self.dims.as_deref().unwrap_or(&[])
    }

    pub fn dim(&self, index: usize) -> Option<Dim> {
        self.dims().get(index).copied()
    }

    pub fn is_dimension_specified(&self, index: usize) -> bool {
        matches!(self.dim(index), Some(Some(_)))
    }

    pub fn are_all_dimensions_specified(&self) -> bool {
        self.dims
            .as_ref()
            .is_some_and(|dims| dims.iter().all(Option::is_some))
    }

    /// Concrete sizes, or `None` if anything is unspecified.
    pub fn concrete(&self) -> Option<Vec<usize>> {
        self.dims.as_ref()?.iter().copied().collect()
    }

    pub fn num_elements(&self) -> Option<usize> {
        self.concrete().map(|d| d.iter().product())
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(dims) = &self.dims else {
            return f.write_str("[*]");
        };
        write!(f, "[")?;
        for (i, d) in dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match d {
                Some(size) => write!(f, "{size}")?,
                None => write!(f, "?")?,
            }
        }
        write!(f, "]")
    }
}

impl From<&[usize]> for TensorShape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims)
    }
}

impl<const N: usize> From<[usize; N]> for TensorShape {
    fn from(dims: [usize; N]) -> Self {
        Self::new(&dims)
    }
}

/// Shape, element type and quantization of the data flowing out of a slot.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorInfo {
    pub shape: TensorShape,
    pub data_type: DataType,
    pub quantization: Option<QuantizationInfo>,
}

impl TensorInfo {
    pub fn new(shape: impl Into<TensorShape>, data_type: DataType) -> Self {
        Self {
            shape: shape.into(),
            data_type,
            quantization: None,
        }
    }

    pub fn quantized(
        shape: impl Into<TensorShape>,
        data_type: DataType,
        scale: f32,
        offset: i32,
    ) -> Self {
        Self {
            shape: shape.into(),
            data_type,
            quantization: Some(QuantizationInfo { scale, offset }),
        }
    }

    pub fn with_shape(&self, shape: TensorShape) -> Self {
        Self {
            shape,
            ..self.clone()
        }
    }

    pub fn num_bytes(&self) -> Option<usize> {
        self.shape
            .num_elements()
            .map(|n| n * self.data_type.size_in_bytes())
    }

    /// Same element type and quantization, shapes ignored.
    pub fn is_type_space_match(&self, other: &TensorInfo) -> bool {
        self.data_type == other.data_type && self.quantization == other.quantization
    }
}

/// Host buffer bound into workloads.
///
/// Clones share the same storage: the producing workload writes it and every
/// consumer reads the published contents.
#[derive(Clone, Debug)]
pub struct TensorHandle {
    info: TensorInfo,
    data: Arc<RwLock<Bytes>>,
}

impl TensorHandle {
    /// Allocates a zeroed buffer. The shape must be fully specified.
    pub fn allocate(info: TensorInfo) -> Result<Self> {
        let Some(byte_len) = info.num_bytes() else {
            anyhow::bail!("cannot allocate a tensor with shape {}", info.shape);
        };
        Ok(Self {
            info,
            data: Arc::new(RwLock::new(Bytes::from(vec![0u8; byte_len]))),
        })
    }

    pub fn info(&self) -> &TensorInfo {
        &self.info
    }

    pub fn byte_len(&self) -> usize {
        self.read().len()
    }

    /// Snapshot of the current contents.
    pub fn read(&self) -> Bytes {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn write(&self, bytes: Bytes) -> Result<()> {
        let expected = self.byte_len();
        ensure!(
            bytes.len() == expected,
            "tensor byte size mismatch: got {}, expected {}",
            bytes.len(),
            expected
        );
        *self
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = bytes;
        Ok(())
    }

    pub fn read_f32(&self) -> Result<Vec<f32>> {
        ensure!(
            self.info.data_type == DataType::Float32,
            "expected an f32 tensor, found {}",
            self.info.data_type
        );
        let mut bytes = self.read();
        let mut out = Vec::with_capacity(bytes.len() / 4);
        while bytes.remaining() >= 4 {
            out.push(bytes.get_f32_le());
        }
        Ok(out)
    }

    pub fn write_f32(&self, values: &[f32]) -> Result<()> {
        ensure!(
            self.info.data_type == DataType::Float32,
            "expected an f32 tensor, found {}",
            self.info.data_type
        );
        let mut buf = BytesMut::with_capacity(values.len() * 4);
        for v in values {
            buf.put_f32_le(*v);
        }
        self.write(buf.freeze())
    }

    pub fn shares_storage_with(&self, other: &TensorHandle) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}
