use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use anyhow::ensure;

use crate::error::Result;
use crate::layer::{LayerParams, OutputSlotRef};
use crate::registry::DispatchRegistry;
use crate::tensor::{TensorHandle, TensorInfo};

/// Names a backend in the dispatch registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendId(Cow<'static, str>);

impl BackendId {
    /// Id of the reference CPU backend, the default placement target.
    pub const REFERENCE: BackendId = BackendId::from_static("ref");

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceKind {
    Cpu,
    Gpu,
}

#[derive(Clone, Copy, Debug)]
pub struct BackendCapabilities {
    pub device: DeviceKind,
    pub supports_quantized: bool,
    pub supports_broadcast: bool,
    pub data_parallel: bool,
}

/// Answer of a capability check. Rejection is data for the placement policy,
/// never an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Capability {
    Supported,
    Unsupported(String),
}

impl Capability {
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Capability::Unsupported(reason.into())
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, Capability::Supported)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Capability::Supported => None,
            Capability::Unsupported(reason) => Some(reason),
        }
    }

    /// Runs `next` only if `self` is supported.
    pub fn and_then(self, next: impl FnOnce() -> Capability) -> Capability {
        match self {
            Capability::Supported => next(),
            rejected => rejected,
        }
    }
}

/// Tensors and parameters a workload is bound to.
#[derive(Clone, Debug)]
pub struct QueueDescriptor {
    pub layer_name: String,
    pub params: LayerParams,
    pub inputs: Vec<TensorHandle>,
    pub outputs: Vec<TensorHandle>,
}

impl QueueDescriptor {
    pub fn validate_inputs_outputs(
        &self,
        workload: &str,
        num_inputs: usize,
        num_outputs: usize,
    ) -> anyhow::Result<()> {
        ensure!(
            self.inputs.len() == num_inputs,
            "{workload}: expected {num_inputs} input handle(s), got {}",
            self.inputs.len()
        );
        ensure!(
            self.outputs.len() == num_outputs,
            "{workload}: expected {num_outputs} output handle(s), got {}",
            self.outputs.len()
        );
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct WorkloadInfo {
    pub input_infos: Vec<TensorInfo>,
    pub output_infos: Vec<TensorInfo>,
}

/// Executable unit bound to concrete tensor handles.
///
/// `execute` may be called any number of times and reads whatever its input
/// handles hold at the time. It is not reentrant; callers serialise calls on
/// one instance.
pub trait Workload: Send {
    fn name(&self) -> &str;

    fn execute(&self) -> Result<()>;
}

/// Per-backend view of the dispatch protocol that layers forward to.
pub trait WorkloadFactory {
    fn backend_id(&self) -> &BackendId;

    fn is_layer_supported(
        &self,
        inputs: &[TensorInfo],
        outputs: &[TensorInfo],
        params: &LayerParams,
    ) -> Capability;

    fn create_workload(
        &self,
        descriptor: QueueDescriptor,
        info: &WorkloadInfo,
    ) -> Result<Box<dyn Workload>>;
}

/// A pluggable backend. All it has to do is describe itself and register its
/// capability checks and constructors.
pub trait Backend: Send + Sync + 'static {
    fn id(&self) -> BackendId;

    fn capabilities(&self) -> BackendCapabilities;

    fn register(&self, registry: &mut DispatchRegistry);
}

/// Handles bound to output slots for one execution plan. A consumer reads the
/// handle of the output slot it is connected to.
#[derive(Clone, Debug, Default)]
pub struct TensorHandles {
    handles: HashMap<OutputSlotRef, TensorHandle>,
}

impl TensorHandles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, slot: OutputSlotRef, handle: TensorHandle) -> Option<TensorHandle> {
        self.handles.insert(slot, handle)
    }

    pub fn get(&self, slot: OutputSlotRef) -> Option<&TensorHandle> {
        self.handles.get(&slot)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
