use tfl2onnx_core::{convert, ConvertOptions};
use tfl2onnx_onnx::pb::{GraphProto, ModelProto, NodeProto};
use tfl2onnx_tflite::ops::{Conv2D, DepthwiseConv2D};
use tfl2onnx_tflite::ser::ModelWriter;
use tfl2onnx_tflite::{tvec, FusedActivation, Op, OperatorRecord, Padding, SourceModel};
use tfl2onnx_tflite::{DatumType, TensorCatalog};

fn setup_test_logger() {
    let _ = env_logger::Builder::from_env("TFL2ONNX_LOG").is_test(true).try_init();
}

fn graph(model: &ModelProto) -> &GraphProto {
    model.graph.as_ref().unwrap()
}

fn op_types(model: &ModelProto) -> Vec<&str> {
    graph(model).node.iter().map(|n| n.op_type.as_str()).collect()
}

fn node<'m>(model: &'m ModelProto, name: &str) -> &'m NodeProto {
    graph(model).node.iter().find(|n| n.name == name).unwrap()
}

fn value_shape(model: &ModelProto, name: &str) -> Vec<i64> {
    let g = graph(model);
    g.value_info
        .iter()
        .chain(g.input.iter())
        .chain(g.output.iter())
        .find(|vi| vi.name == name)
        .unwrap()
        .shape()
        .unwrap()
}

fn conv(fused: FusedActivation, padding: Padding) -> Vec<u8> {
    let mut w = ModelWriter::default();
    let x = w.activation("x", &[1, 5, 5, 2]);
    let k = w.f32_constant("k", &[3, 3, 3, 2], &[0.1; 54]);
    let b = w.f32_constant("b", &[3], &[1.0, 2.0, 3.0]);
    let out = if padding == Padding::Valid { [1, 3, 3, 3] } else { [1, 5, 5, 3] };
    let y = w.activation("y", &out);
    w.operator(Op::Conv2D(Conv2D::new(padding, 1, 1, 1, 1, fused)), &[x, k, b], &[y]);
    w.inputs(&[x]);
    w.outputs(&[y]);
    w.finish()
}

#[test]
fn single_valid_conv() {
    setup_test_logger();
    let source = SourceModel::for_bytes(conv(FusedActivation::None, Padding::Valid)).unwrap();
    let model = convert(&source, &ConvertOptions::default()).unwrap();
    assert_eq!(op_types(&model), vec!["Transpose", "Conv", "Transpose"]);
    assert_eq!(model.ir_version, 4);
    assert_eq!(model.opset_import[0].version, 9);
    assert!(model.metadata_props.iter().any(|p| p.key == "Generated Time"));

    let conv = node(&model, "y");
    assert_eq!(conv.input, vec!["transpose_node_input_x", "y_weight", "y_bias"]);
    assert_eq!(conv.get_attr_ints("pads").unwrap(), &[0, 0, 0, 0]);
    assert_eq!(value_shape(&model, "transpose_node_input_x"), vec![1, 2, 5, 5]);
    assert_eq!(value_shape(&model, "y"), vec![1, 3, 3, 3]);
    assert_eq!(value_shape(&model, "x"), vec![1, 5, 5, 2]);
    assert_eq!(value_shape(&model, "out_y"), vec![1, 3, 3, 3]);

    let g = graph(&model);
    assert_eq!(g.output.len(), 1);
    let initializers = g.initializer.iter().map(|i| i.name.as_str()).collect::<Vec<_>>();
    assert_eq!(initializers, vec!["y_weight", "y_bias"]);
    // initializers are listed as graph inputs too
    let inputs = g.input.iter().map(|i| i.name.as_str()).collect::<Vec<_>>();
    assert_eq!(inputs, vec!["x", "y_weight", "y_bias"]);
    assert_eq!(value_shape(&model, "y_weight"), vec![3, 2, 3, 3]);
}

#[test]
fn defused_relu6() {
    setup_test_logger();
    let source = SourceModel::for_bytes(conv(FusedActivation::Relu6, Padding::Same)).unwrap();
    let options = ConvertOptions { defuse: true, ..ConvertOptions::default() };
    let model = convert(&source, &options).unwrap();
    assert_eq!(op_types(&model), vec!["Transpose", "Conv", "Clip", "Transpose"]);
    let clip = node(&model, "y_Fused");
    assert_eq!(clip.input, vec!["y"]);
    assert_eq!(clip.get_attr_float("max").unwrap(), 6.0);
    assert_eq!(value_shape(&model, "y"), value_shape(&model, "y_Fused"));
    assert_eq!(node(&model, "y").get_attr_ints("pads").unwrap(), &[1, 1, 1, 1]);
    let exposed = node(&model, "transpose_node_output_y_Fused");
    assert_eq!(exposed.input, vec!["y_Fused"]);
    assert_eq!(exposed.output, vec!["out_y_Fused"]);
}

#[test]
fn embedded_relu6() {
    setup_test_logger();
    let source = SourceModel::for_bytes(conv(FusedActivation::Relu6, Padding::Same)).unwrap();
    let model = convert(&source, &ConvertOptions::default()).unwrap();
    assert_eq!(op_types(&model), vec!["Transpose", "Conv", "Clip", "Transpose"]);
    assert_eq!(node(&model, "y_activation").input, vec!["y"]);
    assert_eq!(node(&model, "transpose_node_output_y").output, vec!["out_y"]);
}

#[test]
fn release_mode() {
    setup_test_logger();
    let source = SourceModel::for_bytes(conv(FusedActivation::None, Padding::Valid)).unwrap();
    let options = ConvertOptions { boundary_transpose: false, ..ConvertOptions::default() };
    let model = convert(&source, &options).unwrap();
    assert_eq!(op_types(&model), vec!["Conv"]);
    let conv = node(&model, "y");
    assert_eq!(conv.input[0], "x");
    assert_eq!(conv.output, vec!["out_y"]);
    assert_eq!(value_shape(&model, "x"), vec![1, 5, 5, 2]);
    assert_eq!(value_shape(&model, "out_y"), vec![1, 3, 3, 3]);
}

#[test]
fn unknown_operator() {
    let mut w = ModelWriter::default();
    let x = w.activation("x", &[1, 4]);
    let y = w.activation("y", &[1, 4]);
    w.raw_operator(77, &[x], &[y]);
    w.inputs(&[x]);
    w.outputs(&[y]);
    let err = SourceModel::for_bytes(w.finish()).unwrap_err();
    assert!(format!("{err:?}").contains("Unsupported operator code 77"));
}

#[test]
fn dangling_reference() {
    let mut catalog = TensorCatalog::default();
    let x = catalog.add_activation("x", &[1, 4], DatumType::F32);
    let ghost = catalog.add_activation("ghost", &[1, 4], DatumType::F32);
    let y = catalog.add_activation("y", &[1, 4], DatumType::F32);
    let source = SourceModel {
        catalog,
        operators: vec![OperatorRecord::new(
            Op::Add { fused: FusedActivation::None },
            tvec!(x as i32, ghost as i32),
            tvec!(y as i32),
        )],
        inputs: tvec!(x),
        outputs: tvec!(y),
        description: None,
    };
    let err = convert(&source, &ConvertOptions::default()).unwrap_err();
    assert!(format!("{err:?}").contains("ghost"));
}

fn classifier() -> Vec<u8> {
    let mut w = ModelWriter::default();
    let x = w.activation("image", &[1, 8, 8, 3]);
    let k1 = w.f32_constant("k1", &[8, 3, 3, 3], &[0.01; 216]);
    let b1 = w.f32_constant("b1", &[8], &[0.0; 8]);
    let c1 = w.activation("conv1", &[1, 4, 4, 8]);
    let conv1 = Conv2D::new(Padding::Same, 2, 2, 1, 1, FusedActivation::Relu6);
    w.operator(Op::Conv2D(conv1), &[x, k1, b1], &[c1]);

    let k2 = w.f32_constant("k2", &[1, 3, 3, 8], &[0.1; 72]);
    let b2 = w.f32_constant("b2", &[8], &[0.0; 8]);
    let d1 = w.activation("dw1", &[1, 4, 4, 8]);
    let dw = DepthwiseConv2D::new(Padding::Same, 1, 1, 1, 1, 1, FusedActivation::Relu6);
    w.operator(Op::DepthwiseConv2D(dw), &[c1, k2, b2], &[d1]);

    let axes = w.i32_constant("axes", &[2], &[1, 2]);
    let m = w.activation("mean", &[1, 8]);
    w.operator(Op::Mean { keep_dims: false }, &[d1, axes], &[m]);

    let fw = w.f32_constant("fc_w", &[10, 8], &[0.2; 80]);
    let fb = w.f32_constant("fc_b", &[10], &[0.0; 10]);
    let logits = w.activation("logits", &[1, 10]);
    let fc = Op::FullyConnected { fused: FusedActivation::None, keep_num_dims: false };
    w.operator(fc, &[m, fw, fb], &[logits]);

    let probs = w.activation("probs", &[1, 10]);
    w.operator(Op::Softmax { beta: 1.0 }, &[logits], &[probs]);
    w.inputs(&[x]);
    w.outputs(&[probs]);
    w.finish()
}

#[test]
fn classifier_with_defusion() {
    setup_test_logger();
    let source = SourceModel::for_bytes(classifier()).unwrap();
    let options = ConvertOptions { defuse: true, ..ConvertOptions::default() };
    let model = convert(&source, &options).unwrap();
    assert_eq!(
        op_types(&model),
        vec![
            "Transpose",
            "Conv",
            "Clip",
            "Conv",
            "Clip",
            "GlobalAveragePool",
            "Squeeze",
            "Gemm",
            "Softmax"
        ]
    );
    assert_eq!(node(&model, "dw1").input[0], "conv1_Fused");
    assert_eq!(node(&model, "dw1").get_attr_int("group").unwrap(), 8);
    assert_eq!(node(&model, "mean_pool").input, vec!["dw1_Fused"]);
    assert_eq!(node(&model, "logits").input, vec!["mean", "logits_weight", "logits_bias"]);
    // rank 2 output is exposed by renaming its producer
    assert_eq!(node(&model, "probs").output, vec!["out_probs"]);
    assert_eq!(value_shape(&model, "out_probs"), vec![1, 10]);
    assert_eq!(value_shape(&model, "conv1_Fused"), vec![1, 8, 4, 4]);
}

#[test]
fn saved_model_reloads() {
    let source = SourceModel::for_bytes(classifier()).unwrap();
    let model = convert(&source, &ConvertOptions::default()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("classifier.onnx");
    tfl2onnx_onnx::save(&model, &path).unwrap();
    let reloaded = tfl2onnx_onnx::for_path(&path).unwrap();
    assert_eq!(reloaded, model);
    tfl2onnx_onnx::check_model(&reloaded).unwrap();
}

#[test]
fn consumed_graph_output() {
    let mut w = ModelWriter::default();
    let x = w.activation("x", &[2, 6]);
    let a = w.activation("a", &[2, 6]);
    let b = w.activation("b", &[2, 6]);
    w.operator(Op::Relu, &[x], &[a]);
    w.operator(Op::Logistic, &[a], &[b]);
    w.inputs(&[x]);
    w.outputs(&[a, b]);
    let source = SourceModel::for_bytes(w.finish()).unwrap();
    let model = convert(&source, &ConvertOptions::default()).unwrap();
    assert_eq!(op_types(&model), vec!["Relu", "Sigmoid", "Identity"]);
    assert_eq!(node(&model, "identity_node_output_a").output, vec!["out_a"]);
    assert_eq!(node(&model, "b").input, vec!["a"]);
    let outputs = graph(&model).output.iter().map(|o| o.name.as_str()).collect::<Vec<_>>();
    assert_eq!(outputs, vec!["out_a", "out_b"]);
}
