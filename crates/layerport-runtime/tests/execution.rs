use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use layerport_backend_ref::{RefBackend, REF_BACKEND_ID};
use layerport_backend_vector::{VectorBackend, VECTOR_BACKEND_ID};
use layerport_core::{
    ActivationDescriptor, ActivationFunction, Backend, BackendCapabilities, BackendId,
    BinaryOperation, BindingDescriptor, Capability, DataType, DeviceKind, DispatchEntry,
    DispatchRegistry, ElementwiseBinaryDescriptor, Error, Graph, GraphConfig, LayerId, LayerKind,
    LayerParams, ResizeDescriptor, ShapeInferenceMethod, SoftmaxDescriptor, TensorInfo, Workload,
};
use layerport_runtime::{place, ExecutionPlan, Executor, LayerState, RuntimeConfig};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Layers {
    relu: LayerId,
    sigmoid: LayerId,
    add: LayerId,
    resize: LayerId,
    softmax: LayerId,
}

/// ```text
/// in0 -> relu ----\
///    \-> sigmoid --> add -> resize -> softmax -> out0
///                     \-> out1
/// ```
fn build_graph() -> Result<(Graph, Layers)> {
    let mut graph = Graph::new(
        GraphConfig::default().with_shape_inference(ShapeInferenceMethod::InferAndValidate),
    );
    let input = graph.add_layer("in0", LayerParams::Input(BindingDescriptor { binding_id: 0 }));
    let relu = graph.add_layer(
        "relu",
        LayerParams::Activation(ActivationDescriptor::new(ActivationFunction::ReLu)),
    );
    let sigmoid = graph.add_layer(
        "sigmoid",
        LayerParams::Activation(ActivationDescriptor::new(ActivationFunction::Sigmoid)),
    );
    let add = graph.add_layer(
        "add",
        LayerParams::ElementwiseBinary(ElementwiseBinaryDescriptor {
            operation: BinaryOperation::Add,
        }),
    );
    let resize = graph.add_layer("resize", LayerParams::Resize(ResizeDescriptor::to_size(8, 8)));
    let softmax = graph.add_layer("softmax", LayerParams::Softmax(SoftmaxDescriptor::default()));
    let out0 = graph.add_layer("out0", LayerParams::Output(BindingDescriptor { binding_id: 0 }));
    let out1 = graph.add_layer("out1", LayerParams::Output(BindingDescriptor { binding_id: 1 }));

    graph.connect(input.output(0), relu.input(0))?;
    graph.connect(input.output(0), sigmoid.input(0))?;
    graph.connect(relu.output(0), add.input(0))?;
    graph.connect(sigmoid.output(0), add.input(1))?;
    graph.connect(add.output(0), resize.input(0))?;
    graph.connect(resize.output(0), softmax.input(0))?;
    graph.connect(softmax.output(0), out0.input(0))?;
    graph.connect(add.output(0), out1.input(0))?;
    graph.set_tensor_info(input.output(0), TensorInfo::new([1, 4, 4, 2], DataType::Float32))?;

    Ok((
        graph,
        Layers {
            relu,
            sigmoid,
            add,
            resize,
            softmax,
        },
    ))
}

fn registry() -> DispatchRegistry {
    let mut registry = DispatchRegistry::new();
    registry.register_backend(&RefBackend::new());
    registry.register_backend(&VectorBackend::new());
    registry
}

fn vector_first() -> RuntimeConfig {
    RuntimeConfig::default().with_backend_preferences([VECTOR_BACKEND_ID, REF_BACKEND_ID])
}

fn input_data() -> Vec<f32> {
    (0..32).map(|i| (i as f32 - 16.0) / 4.0).collect()
}

#[test]
fn placement_falls_back_to_the_reference_backend() -> Result<()> {
    init_tracing();
    let (graph, layers) = build_graph()?;
    let plan = ExecutionPlan::new(graph, registry(), &vector_first())?;

    let vector = LayerState::WorkloadBound(VECTOR_BACKEND_ID);
    for id in [layers.relu, layers.sigmoid, layers.add, layers.softmax] {
        assert_eq!(plan.state(id), Some(&vector));
    }
    assert_eq!(
        plan.state(layers.resize),
        Some(&LayerState::WorkloadBound(REF_BACKEND_ID))
    );
    assert_eq!(plan.graph().layer(layers.resize)?.backend(), Some(&REF_BACKEND_ID));

    let input = plan.graph().find_layer("in0").context("input exists")?;
    assert_eq!(plan.state(input), None);
    Ok(())
}

#[test]
fn default_config_places_everything_on_the_reference_backend() -> Result<()> {
    let config = RuntimeConfig::default();
    assert_eq!(config.backend_preferences, vec![REF_BACKEND_ID]);
    ensure!(config.max_concurrency >= 1);

    let (graph, layers) = build_graph()?;
    let plan = ExecutionPlan::new(graph, registry(), &config)?;
    for id in [layers.relu, layers.sigmoid, layers.add, layers.resize, layers.softmax] {
        assert_eq!(plan.state(id), Some(&LayerState::WorkloadBound(REF_BACKEND_ID)));
    }
    Ok(())
}

#[test]
fn placement_without_any_capable_backend_fails() -> Result<()> {
    let (mut graph, _) = build_graph()?;
    graph.infer_tensor_infos()?;
    let err = place(&mut graph, &registry(), &[VECTOR_BACKEND_ID])
        .expect_err("resize has no vector kernel");
    assert!(matches!(err, Error::BackendCapability { ref layer, .. } if layer == "resize"), "{err}");
    Ok(())
}

#[test]
fn pinned_backends_are_kept() -> Result<()> {
    let (mut graph, layers) = build_graph()?;
    graph.set_backend(layers.relu, Some(REF_BACKEND_ID))?;
    let plan = ExecutionPlan::new(graph, registry(), &vector_first())?;
    assert_eq!(
        plan.state(layers.relu),
        Some(&LayerState::WorkloadBound(REF_BACKEND_ID))
    );
    Ok(())
}

#[test]
fn sequential_execution_computes_every_output() -> Result<()> {
    init_tracing();
    let (graph, layers) = build_graph()?;
    let config = vector_first();
    let mut plan = ExecutionPlan::new(graph, registry(), &config)?;
    let data = input_data();
    plan.input(0)?.write_f32(&data)?;

    Executor::new(&config).execute(&mut plan)?;

    let sum = plan.output(1)?.read_f32()?;
    for (x, y) in data.iter().zip(&sum) {
        let expected = x.max(0.0) + 1.0 / (1.0 + (-x).exp());
        ensure!((expected - y).abs() < 1e-5, "{x}: {y} != {expected}");
    }

    let softmax = plan.output(0)?.read_f32()?;
    ensure!(softmax.len() == 8 * 8 * 2);
    for row in softmax.chunks(2) {
        ensure!((row[0] + row[1] - 1.0).abs() < 1e-5);
    }

    for id in [layers.relu, layers.add, layers.resize, layers.softmax] {
        ensure!(matches!(plan.state(id), Some(LayerState::Executed(_))));
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_execution_matches_sequential() -> Result<()> {
    init_tracing();
    let data = input_data();

    let (graph, _) = build_graph()?;
    let config = vector_first();
    let mut sequential = ExecutionPlan::new(graph.clone(), registry(), &config)?;
    sequential.input(0)?.write_f32(&data)?;
    Executor::new(&config).execute(&mut sequential)?;

    for max_concurrency in [1, 4] {
        let config = vector_first().with_max_concurrency(max_concurrency);
        let mut concurrent = ExecutionPlan::new(graph.clone(), registry(), &config)?;
        concurrent.input(0)?.write_f32(&data)?;
        Executor::new(&config).execute_concurrent(&mut concurrent).await?;

        for binding in [0, 1] {
            assert_eq!(
                concurrent.output(binding)?.read_f32()?,
                sequential.output(binding)?.read_f32()?,
                "output {binding} with concurrency {max_concurrency}"
            );
        }
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn plans_can_be_rerun_with_new_inputs() -> Result<()> {
    let (graph, _) = build_graph()?;
    let config = vector_first();
    let mut plan = ExecutionPlan::new(graph, registry(), &config)?;
    let executor = Executor::new(&config);

    plan.input(0)?.write_f32(&vec![0.0; 32])?;
    executor.execute_concurrent(&mut plan).await?;
    let first = plan.output(1)?.read_f32()?;
    ensure!(first.iter().all(|v| (v - 0.5).abs() < 1e-6));

    plan.input(0)?.write_f32(&vec![2.0; 32])?;
    executor.execute_concurrent(&mut plan).await?;
    let second = plan.output(1)?.read_f32()?;
    ensure!(second.iter().all(|v| (v - (2.0 + 1.0 / (1.0 + (-2.0f32).exp()))).abs() < 1e-5));
    Ok(())
}

#[test]
fn rebinding_rebuilds_the_workload() -> Result<()> {
    let (graph, layers) = build_graph()?;
    let config = vector_first();
    let mut plan = ExecutionPlan::new(graph, registry(), &config)?;
    let data = input_data();
    plan.input(0)?.write_f32(&data)?;
    Executor::new(&config).execute(&mut plan)?;
    let before = plan.output(0)?.read_f32()?;

    plan.rebind(layers.add, REF_BACKEND_ID)?;
    assert_eq!(
        plan.state(layers.add),
        Some(&LayerState::WorkloadBound(REF_BACKEND_ID))
    );
    Executor::new(&config).execute(&mut plan)?;
    let after = plan.output(0)?.read_f32()?;
    for (a, b) in before.iter().zip(&after) {
        ensure!((a - b).abs() < 1e-6);
    }

    let err = plan
        .rebind(layers.resize, VECTOR_BACKEND_ID)
        .expect_err("vector has no resize");
    assert!(matches!(err, Error::BackendCapability { .. }), "{err}");
    assert_eq!(
        plan.state(layers.resize),
        Some(&LayerState::Executed(REF_BACKEND_ID))
    );
    Ok(())
}

#[test]
fn unknown_bindings_are_rejected() -> Result<()> {
    let (graph, _) = build_graph()?;
    let plan = ExecutionPlan::new(graph, registry(), &RuntimeConfig::default())?;
    ensure!(matches!(plan.input(3), Err(Error::InvalidLayer(_))));
    ensure!(matches!(plan.output(2), Err(Error::InvalidLayer(_))));
    Ok(())
}

#[test]
fn strict_graphs_need_declared_outputs() -> Result<()> {
    let (mut graph, _) = build_graph()?;
    graph.set_shape_inference_method(ShapeInferenceMethod::ValidateOnly);
    let err = ExecutionPlan::new(graph, registry(), &RuntimeConfig::default())
        .err()
        .context("undeclared outputs must fail in strict mode")?;
    assert!(matches!(err, Error::ShapeValidation { .. }), "{err}");
    Ok(())
}

const FAULTY: BackendId = BackendId::from_static("faulty");

struct FailingWorkload {
    name: String,
}

impl Workload for FailingWorkload {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> layerport_core::Result<()> {
        Err(Error::backend_fatal(FAULTY, anyhow::anyhow!("device lost")))
    }
}

/// Accepts every activation and fails every execution.
struct FaultyBackend {
    created: Arc<AtomicUsize>,
}

impl Backend for FaultyBackend {
    fn id(&self) -> BackendId {
        FAULTY
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            device: DeviceKind::Gpu,
            supports_quantized: false,
            supports_broadcast: false,
            data_parallel: false,
        }
    }

    fn register(&self, registry: &mut DispatchRegistry) {
        let created = self.created.clone();
        registry.insert(
            LayerKind::Activation,
            FAULTY,
            DispatchEntry::new(
                |_, _, _| Capability::Supported,
                move |descriptor, _| {
                    created.fetch_add(1, Ordering::SeqCst);
                    Ok(Box::new(FailingWorkload {
                        name: descriptor.layer_name,
                    }) as Box<dyn Workload>)
                },
            ),
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn a_failing_workload_aborts_the_whole_plan() -> Result<()> {
    init_tracing();
    let (mut graph, layers) = build_graph()?;
    graph.set_backend(layers.sigmoid, Some(FAULTY))?;

    let created = Arc::new(AtomicUsize::new(0));
    let mut registry = registry();
    registry.register_backend(&FaultyBackend {
        created: created.clone(),
    });
    let config = vector_first();
    let mut plan = ExecutionPlan::new(graph, registry, &config)?;
    assert_eq!(created.load(Ordering::SeqCst), 1);
    plan.input(0)?.write_f32(&input_data())?;

    let executor = Executor::new(&config);
    let err = executor
        .execute_concurrent(&mut plan)
        .await
        .err()
        .context("sigmoid must fail")?;
    ensure!(err.is_fatal(), "{err}");

    // Nothing downstream of the failure ran.
    for id in [layers.add, layers.resize, layers.softmax] {
        ensure!(
            matches!(plan.state(id), Some(LayerState::WorkloadBound(_))),
            "{id} should not have run"
        );
    }

    let err = executor.execute(&mut plan).err().context("sequential run fails too")?;
    ensure!(err.is_fatal(), "{err}");
    Ok(())
}
