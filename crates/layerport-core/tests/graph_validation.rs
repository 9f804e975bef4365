use anyhow::{ensure, Result};
use layerport_core::{
    resolve_axis, ActivationDescriptor, ActivationFunction, BinaryOperation, BindingDescriptor,
    DataType, ElementwiseBinaryDescriptor, Error, Graph, GraphConfig, LayerId, LayerParams,
    ReshapeDescriptor, ResizeDescriptor, ShapeInferenceMethod, SoftmaxDescriptor, TensorInfo,
    TensorShape,
};

fn graph(method: ShapeInferenceMethod) -> Graph {
    Graph::new(GraphConfig::default().with_shape_inference(method))
}

fn input(graph: &mut Graph, name: &str, binding_id: i32, shape: &[usize]) -> Result<LayerId> {
    let id = graph.add_layer(name, LayerParams::Input(BindingDescriptor { binding_id }));
    graph.set_tensor_info(id.output(0), TensorInfo::new(shape, DataType::Float32))?;
    Ok(id)
}

fn resize_after_input(graph: &mut Graph) -> Result<LayerId> {
    let src = input(graph, "in", 0, &[1, 20, 10, 3])?;
    let resize = graph.add_layer("resize", LayerParams::Resize(ResizeDescriptor::by_scale(1.5, 2.0)));
    graph.connect(src.output(0), resize.input(0))?;
    Ok(resize)
}

#[test]
fn strict_mode_accepts_matching_declaration() -> Result<()> {
    let mut graph = graph(ShapeInferenceMethod::ValidateOnly);
    let resize = resize_after_input(&mut graph)?;
    graph.set_tensor_info(resize.output(0), TensorInfo::new([1, 30, 20, 3], DataType::Float32))?;
    graph.infer_tensor_infos()?;
    ensure!(graph.is_fully_resolved(), "graph should be resolved");
    Ok(())
}

#[test]
fn strict_mode_rejects_conflicting_declaration() -> Result<()> {
    let mut graph = graph(ShapeInferenceMethod::ValidateOnly);
    let resize = resize_after_input(&mut graph)?;
    graph.set_tensor_info(resize.output(0), TensorInfo::new([1, 31, 20, 3], DataType::Float32))?;

    let err = graph.infer_tensor_infos().expect_err("mismatch must fail");
    assert!(matches!(err, Error::ShapeValidation { .. }), "{err}");
    Ok(())
}

#[test]
fn strict_mode_rejects_partially_specified_declaration() -> Result<()> {
    let mut graph = graph(ShapeInferenceMethod::ValidateOnly);
    let resize = resize_after_input(&mut graph)?;
    let declared = TensorShape::from_dims([Some(1), None, Some(20), Some(3)]);
    graph.set_tensor_info(resize.output(0), TensorInfo::new(declared, DataType::Float32))?;

    let err = graph.infer_tensor_infos().expect_err("unspecified dims are illegal here");
    assert!(matches!(err, Error::ShapeValidation { .. }), "{err}");
    Ok(())
}

#[test]
fn permissive_mode_fills_in_unspecified_dims() -> Result<()> {
    let mut graph = graph(ShapeInferenceMethod::InferAndValidate);
    let resize = resize_after_input(&mut graph)?;
    let declared = TensorShape::from_dims([Some(1), None, None, Some(3)]);
    graph.set_tensor_info(resize.output(0), TensorInfo::new(declared, DataType::Float32))?;

    graph.infer_tensor_infos()?;
    let info = graph.tensor_info(resize.output(0))?.expect("info is set");
    assert_eq!(info.shape, TensorShape::new(&[1, 30, 20, 3]));
    Ok(())
}

#[test]
fn permissive_mode_still_rejects_conflicting_concrete_dims() -> Result<()> {
    let mut graph = graph(ShapeInferenceMethod::InferAndValidate);
    let resize = resize_after_input(&mut graph)?;
    let declared = TensorShape::from_dims([Some(1), Some(29), None, Some(3)]);
    graph.set_tensor_info(resize.output(0), TensorInfo::new(declared, DataType::Float32))?;

    let err = graph.infer_tensor_infos().expect_err("29 != 30");
    assert!(matches!(err, Error::ShapeValidation { .. }), "{err}");
    Ok(())
}

#[test]
fn permissive_mode_derives_undeclared_outputs() -> Result<()> {
    let mut graph = graph(ShapeInferenceMethod::InferAndValidate);
    let src = input(&mut graph, "in", 0, &[2, 8])?;
    let relu = graph.add_layer(
        "relu",
        LayerParams::Activation(ActivationDescriptor::new(ActivationFunction::ReLu)),
    );
    let softmax = graph.add_layer("softmax", LayerParams::Softmax(SoftmaxDescriptor::default()));
    graph.connect(src.output(0), relu.input(0))?;
    graph.connect(relu.output(0), softmax.input(0))?;

    graph.infer_tensor_infos()?;
    let info = graph.tensor_info(softmax.output(0))?.expect("info is set");
    assert_eq!(info.shape, TensorShape::new(&[2, 8]));
    assert_eq!(info.data_type, DataType::Float32);
    Ok(())
}

#[test]
fn strict_mode_requires_declared_outputs() -> Result<()> {
    let mut graph = graph(ShapeInferenceMethod::ValidateOnly);
    resize_after_input(&mut graph)?;
    let err = graph.infer_tensor_infos().expect_err("no declared output");
    assert!(matches!(err, Error::ShapeValidation { .. }), "{err}");
    Ok(())
}

#[test]
fn missing_connection_is_a_connection_error() -> Result<()> {
    let mut graph = graph(ShapeInferenceMethod::InferAndValidate);
    let src = input(&mut graph, "in", 0, &[4])?;
    let add = graph.add_layer(
        "add",
        LayerParams::ElementwiseBinary(ElementwiseBinaryDescriptor {
            operation: BinaryOperation::Add,
        }),
    );
    graph.connect(src.output(0), add.input(0))?;

    let err = graph
        .validate_tensor_shapes_from_inputs(add)
        .expect_err("one input is dangling");
    match err {
        Error::Connection {
            expected,
            connected,
            ..
        } => {
            assert_eq!(expected, 2);
            assert_eq!(connected, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[test]
fn input_layers_need_a_fully_specified_shape() -> Result<()> {
    let mut graph = graph(ShapeInferenceMethod::InferAndValidate);
    let src = graph.add_layer("in", LayerParams::Input(BindingDescriptor { binding_id: 0 }));
    graph.set_tensor_info(
        src.output(0),
        TensorInfo::new(TensorShape::from_dims([Some(1), None]), DataType::Float32),
    )?;
    let err = graph.infer_tensor_infos().expect_err("input shape is partial");
    assert!(matches!(err, Error::ShapeValidation { .. }), "{err}");
    Ok(())
}

#[test]
fn binary_layers_broadcast_through_the_graph() -> Result<()> {
    let mut graph = graph(ShapeInferenceMethod::InferAndValidate);
    let a = input(&mut graph, "a", 0, &[2, 3, 1])?;
    let b = input(&mut graph, "b", 1, &[3, 4])?;
    let mul = graph.add_layer(
        "mul",
        LayerParams::ElementwiseBinary(ElementwiseBinaryDescriptor {
            operation: BinaryOperation::Mul,
        }),
    );
    graph.connect(a.output(0), mul.input(0))?;
    graph.connect(b.output(0), mul.input(1))?;

    graph.infer_tensor_infos()?;
    let info = graph.tensor_info(mul.output(0))?.expect("info is set");
    assert_eq!(info.shape, TensorShape::new(&[2, 3, 4]));
    Ok(())
}

#[test]
fn reshape_checks_element_count() -> Result<()> {
    let mut graph = graph(ShapeInferenceMethod::InferAndValidate);
    let src = input(&mut graph, "in", 0, &[2, 6])?;
    let reshape = graph.add_layer(
        "reshape",
        LayerParams::Reshape(ReshapeDescriptor {
            target_shape: TensorShape::new(&[5, 2]),
        }),
    );
    graph.connect(src.output(0), reshape.input(0))?;

    let err = graph.infer_tensor_infos().expect_err("12 != 10");
    assert!(matches!(err, Error::ShapeValidation { .. }), "{err}");

    graph.replace_layer(
        reshape,
        "reshape",
        LayerParams::Reshape(ReshapeDescriptor {
            target_shape: TensorShape::new(&[3, 4]),
        }),
    )?;
    graph.infer_tensor_infos()?;
    Ok(())
}

#[test]
fn softmax_axis_out_of_range_is_a_configuration_error() -> Result<()> {
    let mut graph = graph(ShapeInferenceMethod::InferAndValidate);
    let src = input(&mut graph, "in", 0, &[2, 6])?;
    let softmax = graph.add_layer(
        "softmax",
        LayerParams::Softmax(SoftmaxDescriptor { beta: 1.0, axis: 2 }),
    );
    graph.connect(src.output(0), softmax.input(0))?;

    let err = graph.infer_tensor_infos().expect_err("axis 2 on rank 2");
    assert!(matches!(err, Error::Configuration { .. }), "{err}");
    Ok(())
}

#[test]
fn softmax_axes_resolve_like_backends_see_them() {
    assert_eq!(resolve_axis(-1, 2), Some(1));
    assert_eq!(resolve_axis(-2, 2), Some(0));
    assert_eq!(resolve_axis(2, 2), None);
    assert_eq!(resolve_axis(-3, 2), None);
}

#[test]
fn every_kind_infers_the_same_shapes_twice() -> Result<()> {
    let mut graph = Graph::default();
    let cases = [
        (
            LayerParams::Activation(ActivationDescriptor::new(ActivationFunction::Sigmoid)),
            vec![TensorShape::from_dims([Some(3), None])],
        ),
        (
            LayerParams::ElementwiseBinary(ElementwiseBinaryDescriptor {
                operation: BinaryOperation::Sub,
            }),
            vec![TensorShape::new(&[4, 1]), TensorShape::from_dims([None, Some(5)])],
        ),
        (
            LayerParams::Resize(ResizeDescriptor::by_scale(3.0, 0.5)),
            vec![TensorShape::new(&[1, 7, 9, 2])],
        ),
        (
            LayerParams::Softmax(SoftmaxDescriptor::default()),
            vec![TensorShape::new(&[2, 2])],
        ),
    ];
    for (params, inputs) in cases {
        let id = graph.add_layer("layer", params);
        let layer = graph.layer(id)?;
        let first = layer.infer_output_shapes(&inputs)?;
        let second = layer.infer_output_shapes(&inputs)?;
        assert_eq!(first, second);
    }
    Ok(())
}
