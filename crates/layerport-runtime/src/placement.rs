use std::collections::BTreeMap;

use layerport_core::{
    BackendId, Capability, DispatchRegistry, Error, Graph, LayerId, OutputSlotRef, Result,
    TensorInfo,
};
use tracing::{debug, info, warn};

/// Assigns a backend to every compute layer of a validated graph.
///
/// A backend already assigned to a layer is kept if it still accepts the
/// layer. Otherwise `preferences` are tried in order and the first backend
/// whose capability check passes wins. Returns the number of layers placed on
/// each backend.
pub fn place(
    graph: &mut Graph,
    registry: &DispatchRegistry,
    preferences: &[BackendId],
) -> Result<BTreeMap<BackendId, usize>> {
    let mut placed = BTreeMap::new();

    for id in graph.topological_order()? {
        let layer = graph.layer(id)?;
        if layer.kind().is_boundary() {
            continue;
        }
        let name = layer.name().to_owned();
        let params = layer.params().clone();
        let pinned = layer.backend().cloned();
        let (inputs, outputs) = layer_infos(graph, id)?;

        let candidates = pinned.iter().chain(preferences);
        let mut rejections = Vec::new();
        let mut chosen = None;
        for backend in candidates {
            match registry.check(backend, &inputs, &outputs, &params) {
                Capability::Supported => {
                    chosen = Some(backend.clone());
                    break;
                }
                Capability::Unsupported(reason) => {
                    warn!(layer = %name, %backend, %reason, "backend rejected layer");
                    rejections.push(format!("{backend}: {reason}"));
                }
            }
        }

        let Some(backend) = chosen else {
            let reason = if rejections.is_empty() {
                "no backends configured".to_owned()
            } else {
                rejections.join("; ")
            };
            return Err(Error::BackendCapability { layer: name, reason });
        };
        debug!(layer = %name, %backend, "placed layer");
        *placed.entry(backend.clone()).or_insert(0) += 1;
        graph.set_backend(id, Some(backend))?;
    }

    info!(?placed, "placement complete");
    Ok(placed)
}

/// Tensor infos on the input and output side of a layer.
pub(crate) fn layer_infos(graph: &Graph, id: LayerId) -> Result<(Vec<TensorInfo>, Vec<TensorInfo>)> {
    let layer = graph.layer(id)?;
    let resolved = |slot: OutputSlotRef| -> Result<TensorInfo> {
        graph.tensor_info(slot)?.cloned().ok_or_else(|| {
            Error::shape_validation(layer.name(), format!("{slot} has no tensor info set"))
        })
    };

    let mut inputs = Vec::with_capacity(layer.input_slots().len());
    for slot in layer.input_slots() {
        let source = slot.connection().ok_or_else(|| Error::Connection {
            layer: layer.name().to_owned(),
            expected: layer.kind().num_inputs(),
            connected: layer.num_connected_inputs(),
        })?;
        inputs.push(resolved(source)?);
    }
    let outputs = (0..layer.output_slots().len())
        .map(|index| resolved(id.output(index)))
        .collect::<Result<Vec<_>>>()?;
    Ok((inputs, outputs))
}
