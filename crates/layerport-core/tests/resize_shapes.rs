use anyhow::Result;
use layerport_core::{
    DataLayout, Error, Graph, LayerParams, ResizeDescriptor, SizeMode, TensorShape,
};

fn resize_layer(desc: ResizeDescriptor) -> Result<layerport_core::Layer> {
    let mut graph = Graph::default();
    let id = graph.add_layer("resize", LayerParams::Resize(desc));
    Ok(graph.layer(id)?.clone())
}

#[test]
fn size_mode_uses_targets_and_keeps_batch_and_channels() -> Result<()> {
    let layer = resize_layer(ResizeDescriptor::to_size(7, 9))?;
    for input in [[1, 20, 10, 3], [4, 1, 1, 16], [2, 300, 2, 1]] {
        let out = layer.infer_output_shapes(&[TensorShape::new(&input)])?;
        assert_eq!(out, vec![TensorShape::new(&[input[0], 7, 9, input[3]])]);
    }

    let layer = resize_layer(ResizeDescriptor::to_size(7, 9).with_layout(DataLayout::Nchw))?;
    let out = layer.infer_output_shapes(&[TensorShape::new(&[2, 5, 30, 40])])?;
    assert_eq!(out, vec![TensorShape::new(&[2, 5, 7, 9])]);
    Ok(())
}

#[test]
fn size_mode_is_specified_even_for_unresolved_input() -> Result<()> {
    let layer = resize_layer(ResizeDescriptor::to_size(4, 4))?;
    let input = TensorShape::from_dims([Some(1), None, None, Some(3)]);
    let out = layer.infer_output_shapes(&[input])?;
    assert_eq!(out, vec![TensorShape::new(&[1, 4, 4, 3])]);
    Ok(())
}

#[test]
fn scale_mode_concrete_input() -> Result<()> {
    let layer = resize_layer(ResizeDescriptor::by_scale(1.5, 2.0))?;
    let out = layer.infer_output_shapes(&[TensorShape::new(&[1, 20, 10, 3])])?;
    assert_eq!(out, vec![TensorShape::new(&[1, 30, 20, 3])]);
    Ok(())
}

#[test]
fn scale_mode_unresolved_input_stays_unspecified() -> Result<()> {
    let layer = resize_layer(ResizeDescriptor::by_scale(1.5, 2.0))?;

    let unknown_height = TensorShape::from_dims([Some(1), None, Some(10), Some(3)]);
    let out = layer.infer_output_shapes(&[unknown_height])?;
    assert_eq!(out[0].dims(), &[Some(1), None, Some(20), Some(3)]);
    assert_eq!(out[0].rank(), Some(4));

    let unknown_width = TensorShape::from_dims([Some(1), Some(20), None, Some(3)]);
    let out = layer.infer_output_shapes(&[unknown_width])?;
    assert_eq!(out[0].dims(), &[Some(1), Some(30), None, Some(3)]);

    let layer = resize_layer(ResizeDescriptor::by_scale(2.0, 2.0).with_layout(DataLayout::Nchw))?;
    let out = layer.infer_output_shapes(&[TensorShape::from_dims([Some(1), Some(3), None, None])])?;
    assert_eq!(out[0].dims(), &[Some(1), Some(3), None, None]);
    Ok(())
}

#[test]
fn conflicting_alignment_flags_fail_for_every_mode_and_shape() -> Result<()> {
    let inputs = [
        TensorShape::new(&[1, 20, 10, 3]),
        TensorShape::from_dims([Some(1), None, None, Some(3)]),
        TensorShape::new(&[2, 3]),
    ];
    for mode in [SizeMode::Size, SizeMode::Scale] {
        for layout in [DataLayout::Nhwc, DataLayout::Nchw] {
            let desc = ResizeDescriptor {
                size_mode: mode,
                target_height: 2.0,
                target_width: 2.0,
                data_layout: layout,
                align_corners: true,
                half_pixel_centers: true,
                ..ResizeDescriptor::default()
            };
            let layer = resize_layer(desc)?;
            for input in &inputs {
                let err = layer
                    .infer_output_shapes(std::slice::from_ref(input))
                    .expect_err("conflicting flags must be rejected");
                assert!(matches!(err, Error::Configuration { .. }), "{err}");
            }
        }
    }
    Ok(())
}

#[test]
fn conflicting_flags_do_not_block_graph_construction() -> Result<()> {
    let mut graph = Graph::default();
    let desc = ResizeDescriptor::to_size(2, 2)
        .with_align_corners(true)
        .with_half_pixel_centers(true);
    let input = graph.add_layer("in", LayerParams::Input(layerport_core::BindingDescriptor { binding_id: 0 }));
    let resize = graph.add_layer("resize", LayerParams::Resize(desc));
    graph.connect(input.output(0), resize.input(0))?;
    graph.set_tensor_info(
        input.output(0),
        layerport_core::TensorInfo::new([1, 4, 4, 1], layerport_core::DataType::Float32),
    )?;

    let err = graph.infer_tensor_infos().expect_err("validation must fail");
    assert!(matches!(err, Error::Configuration { .. }), "{err}");
    Ok(())
}

#[test]
fn inference_is_repeatable() -> Result<()> {
    let layer = resize_layer(ResizeDescriptor::by_scale(0.75, 1.25))?;
    let inputs = [TensorShape::from_dims([Some(3), Some(17), None, Some(8)])];
    let first = layer.infer_output_shapes(&inputs)?;
    for _ in 0..8 {
        assert_eq!(layer.infer_output_shapes(&inputs)?, first);
    }
    Ok(())
}
