mod elementwise;
mod reshape;
mod resize;
mod softmax;

pub use elementwise::{RefActivationWorkload, RefBinaryWorkload, RefUnaryWorkload};
pub use reshape::RefReshapeWorkload;
pub use resize::RefResizeWorkload;
pub use softmax::RefSoftmaxWorkload;

pub(crate) use elementwise::broadcast_shape;

use anyhow::{anyhow, bail, Context, Result};
use layerport_core::{Error, LayerParams, QueueDescriptor, TensorHandle, Workload, WorkloadInfo};
use tracing::debug;

use crate::REF_BACKEND_ID;

/// Constructor registered for every non-boundary kind.
pub fn create(descriptor: QueueDescriptor, _info: &WorkloadInfo) -> Result<Box<dyn Workload>> {
    debug!(layer = %descriptor.layer_name, kind = ?descriptor.params.kind(), "creating reference workload");
    let workload: Box<dyn Workload> = match descriptor.params {
        LayerParams::Activation(_) => Box::new(RefActivationWorkload::new(descriptor)?),
        LayerParams::ElementwiseUnary(_) => Box::new(RefUnaryWorkload::new(descriptor)?),
        LayerParams::ElementwiseBinary(_) => Box::new(RefBinaryWorkload::new(descriptor)?),
        LayerParams::Resize(_) => Box::new(RefResizeWorkload::new(descriptor)?),
        LayerParams::Reshape(_) => Box::new(RefReshapeWorkload::new(descriptor)?),
        LayerParams::Softmax(_) => Box::new(RefSoftmaxWorkload::new(descriptor)?),
        LayerParams::Input(_) | LayerParams::Output(_) => {
            bail!("{} is a graph boundary", descriptor.layer_name)
        }
    };
    Ok(workload)
}

fn unpack<const N: usize>(handles: Vec<TensorHandle>) -> Result<[TensorHandle; N]> {
    handles
        .try_into()
        .map_err(|h: Vec<TensorHandle>| anyhow!("expected {N} handle(s), got {}", h.len()))
}

fn concrete_shape(handle: &TensorHandle) -> Result<Vec<usize>> {
    handle
        .info()
        .shape
        .concrete()
        .with_context(|| format!("tensor shape {} is not fully specified", handle.info().shape))
}

fn fatal(source: anyhow::Error) -> Error {
    Error::backend_fatal(REF_BACKEND_ID, source)
}
