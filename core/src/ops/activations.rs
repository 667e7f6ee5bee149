use super::LowerOp;
use crate::internal::*;

pub fn relu(op: &mut LowerOp) -> Result<()> {
    let x = op.wire(0)?;
    op.push_final(NodeProto::named("Relu", op.prefix).with_input(x))?;
    Ok(())
}

pub fn relu6(op: &mut LowerOp) -> Result<()> {
    let x = op.wire(0)?;
    op.push_final(clip(op.prefix, 0.0, 6.0).with_input(x))?;
    Ok(())
}

pub fn logistic(op: &mut LowerOp) -> Result<()> {
    let x = op.wire(0)?;
    op.push_final(NodeProto::named("Sigmoid", op.prefix).with_input(x))?;
    Ok(())
}

pub fn prelu(op: &mut LowerOp) -> Result<()> {
    let x = op.wire(0)?;
    let rank = op.input_tensor(0)?.rank();
    let slope = op.constant(1)?;
    let data = op
        .catalog()
        .f32_data(slope.index)
        .with_context(|| format!("Reading slope of {}", op.prefix))?;
    let name = op.name("slope");
    let slope = match (slope.rank(), rank) {
        (3, _) => {
            let perm = [2, 0, 1];
            let data = layout::permute(data, &slope.shape, &perm)?;
            op.f32_constant(name, &layout::permute_shape(&slope.shape, &perm), data)?
        }
        (4, _) => {
            let data = layout::permute(data, &slope.shape, &NHWC_TO_NCHW)?;
            op.f32_constant(name, &layout::permute_shape(&slope.shape, &NHWC_TO_NCHW), data)?
        }
        (1, 4) => op.f32_constant(name, &[slope.shape[0], 1, 1], data)?,
        _ => op.f32_constant(name, &slope.shape, data)?,
    };
    op.push_final(NodeProto::named("PRelu", op.prefix).with_inputs([x, slope]))?;
    Ok(())
}

fn clip(name: &str, min: f32, max: f32) -> NodeProto {
    NodeProto::named("Clip", name).with_float("min", min).with_float("max", max)
}

/// Standalone node of an activation split out of `origin`.
pub fn defused(op: &mut LowerOp, origin: NodeId, activation: FusedActivation) -> Result<()> {
    let x = op.ctx.wire(&op.ctx.graph.node(origin).name)?;
    let node = match activation {
        FusedActivation::Relu => NodeProto::named("Relu", op.prefix),
        FusedActivation::Relu6 => clip(op.prefix, 0.0, 6.0),
        other => bail!("No standalone lowering for activation {other:?} of {}", op.prefix),
    };
    op.push_final(node.with_input(x))?;
    Ok(())
}

/// Activation still embedded in the operator, applied to its last emitted
/// value.
pub fn inline_fused(op: &mut LowerOp, activation: FusedActivation) -> Result<()> {
    let name = op.name("activation");
    let node = match activation {
        FusedActivation::None => return Ok(()),
        FusedActivation::Relu => NodeProto::named("Relu", name),
        FusedActivation::Relu6 => clip(&name, 0.0, 6.0),
        FusedActivation::ReluN1To1 => clip(&name, -1.0, 1.0),
        FusedActivation::Tanh => NodeProto::named("Tanh", name),
        FusedActivation::SignBit | FusedActivation::Unknown(_) => {
            warn!("Dropping unsupported fused activation {activation:?} of {}", op.prefix);
            return Ok(());
        }
    };
    let (x, shape) = op
        .last_output()
        .and_then(|(x, vi)| Some((x.to_string(), vi.shape()?)))
        .with_context(|| format!("No value to apply {activation:?} to in {}", op.prefix))?;
    let shape = shape.iter().map(|&d| d as usize).collect_vec();
    op.push(node.with_input(x), &shape)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::super::test::*;
    use super::*;
    use tfl2onnx_tflite::ops::Conv2D;

    #[test]
    fn relu6_is_clip() {
        let lowered = single(&unary(Op::Relu6, &[1, 4, 4, 2], &[1, 4, 4, 2], &[]));
        assert_eq!(op_types(&lowered), vec!["Clip"]);
        let clip = &lowered.nodes[0];
        assert_eq!(clip.name, "y");
        assert_eq!(clip.input, vec!["x"]);
        assert_eq!(clip.get_attr_float("min").unwrap(), 0.0);
        assert_eq!(clip.get_attr_float("max").unwrap(), 6.0);
        assert_eq!(shape_of(&lowered, "y"), vec![1, 2, 4, 4]);
    }

    #[test]
    fn logistic_keeps_rank_2_shape() {
        let lowered = single(&unary(Op::Logistic, &[3, 5], &[3, 5], &[]));
        assert_eq!(op_types(&lowered), vec!["Sigmoid"]);
        assert_eq!(shape_of(&lowered, "y"), vec![3, 5]);
    }

    #[test]
    fn prelu_slope_goes_channel_first() {
        // slope (H=1, W=2, C=3)
        let slope = (0..6).map(|i| i as f32).collect_vec();
        let model = unary(Op::PRelu, &[1, 1, 2, 3], &[1, 1, 2, 3], &[(&[1, 2, 3], slope)]);
        let lowered = single(&model);
        assert_eq!(op_types(&lowered), vec!["PRelu"]);
        assert_eq!(lowered.nodes[0].input, vec!["x", "y_slope"]);
        let slope = constant(&lowered, "y_slope");
        assert_eq!(slope.shape(), vec![3, 1, 2]);
        assert_eq!(slope.as_f32().unwrap(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn prelu_vector_slope() {
        let model = unary(Op::PRelu, &[1, 2, 2, 3], &[1, 2, 2, 3], &[(&[3], vec![0.1, 0.2, 0.3])]);
        let lowered = single(&model);
        assert_eq!(constant(&lowered, "y_slope").shape(), vec![3, 1, 1]);
    }

    #[test]
    fn inline_activation() {
        let conv = Conv2D::new(Padding::Valid, 1, 1, 1, 1, FusedActivation::Relu6);
        let model = unary(
            Op::Conv2D(conv),
            &[1, 3, 3, 1],
            &[1, 3, 3, 1],
            &[(&[1, 1, 1, 1], vec![2.0]), (&[1], vec![0.0])],
        );
        let lowered = single(&model);
        assert_eq!(op_types(&lowered), vec!["Conv", "Clip"]);
        assert_eq!(lowered.nodes[1].name, "y_activation");
        assert_eq!(lowered.nodes[1].input, vec!["y"]);
        assert_eq!(shape_of(&lowered, "y_activation"), vec![1, 1, 3, 3]);
    }

    #[test]
    fn sign_bit_is_dropped() {
        let conv = Conv2D::new(Padding::Valid, 1, 1, 1, 1, FusedActivation::SignBit);
        let model = unary(Op::Conv2D(conv), &[1, 3, 3, 1], &[1, 3, 3, 1], &[(&[1, 1, 1, 1], vec![2.0])]);
        let lowered = single(&model);
        assert_eq!(op_types(&lowered), vec!["Conv"]);
    }
}
