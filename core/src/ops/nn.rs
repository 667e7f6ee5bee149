use super::LowerOp;
use crate::internal::*;

pub fn softmax(op: &mut LowerOp, beta: f32) -> Result<()> {
    let mut x = op.wire(0)?;
    let shape = op.input_tensor(0)?.shape.clone();
    if beta != 1.0 {
        let beta = op.f32_constant(op.name("beta"), &[], vec![beta])?;
        let mul = NodeProto::named("Mul", op.name("scaled")).with_inputs([x, beta]);
        x = op.push(mul, &layout::declared_shape(&shape))?;
    }
    if shape.len() == 4 && shape[1] * shape[2] > 1 {
        // Softmax flattens every axis after `axis`, so run it on the
        // channel-last value to normalize over channels only.
        let to_nhwc = NodeProto::named("Transpose", op.name("to_nhwc"))
            .with_input(x)
            .with_ints("perm", layout::as_i64(&NCHW_TO_NHWC));
        x = op.push(to_nhwc, &shape)?;
        let softmax =
            NodeProto::named("Softmax", op.name("softmax")).with_input(x).with_int("axis", 3);
        x = op.push(softmax, &shape)?;
        let to_nchw = NodeProto::named("Transpose", op.prefix)
            .with_input(x)
            .with_ints("perm", layout::as_i64(&NHWC_TO_NCHW));
        op.push_final(to_nchw)?;
    } else {
        let axis = if shape.len() == 4 { 1 } else { shape.len().max(1) - 1 };
        op.push_final(NodeProto::named("Softmax", op.prefix).with_input(x).with_int("axis", axis as i64))?;
    }
    Ok(())
}

pub fn fully_connected(op: &mut LowerOp) -> Result<()> {
    let mut x = op.wire(0)?;
    let input = op.input_tensor(0)?;
    let weight = op.constant(1)?;
    ensure!(weight.rank() == 2, "Weights of {} must be rank 2, got {:?}", op.prefix, weight.shape);
    let (units, features) = (weight.shape[0], weight.shape[1]);

    if input.rank() == 4 {
        let to_nhwc = NodeProto::named("Transpose", op.name("to_nhwc"))
            .with_input(x)
            .with_ints("perm", layout::as_i64(&NCHW_TO_NHWC));
        x = op.push(to_nhwc, &input.shape)?;
    }
    let batch = input.volume() / features.max(1);
    if input.rank() != 2 {
        let flat_shape = op.i64_constant(op.name("flat_shape"), &[2], vec![-1, features as i64])?;
        let flatten = NodeProto::named("Reshape", op.name("flatten")).with_inputs([x, flat_shape]);
        x = op.push(flatten, &[batch, features])?;
    }

    let data = op.catalog().f32_data(weight.index).with_context(|| format!("Reading weights of {}", op.prefix))?;
    let weight = op.f32_constant(op.name("weight"), &[units, features], data)?;
    let bias_data = match op.input(2)? {
        Operand::Constant(t) => op.catalog().f32_data(t)?,
        Operand::Absent => vec![0.0; units],
        other => bail!("Bias of {} must be constant, got {other:?}", op.prefix),
    };
    let bias = op.f32_constant(op.name("bias"), &[units], bias_data)?;

    let output = op.output_tensor()?;
    let gemm_name = if output.rank() == 2 { op.prefix.to_string() } else { op.name("gemm") };
    let gemm = NodeProto::named("Gemm", gemm_name).with_inputs([x, weight, bias]).with_int("transB", 1);
    x = op.push(gemm, &[batch, units])?;

    match output.rank() {
        2 => (),
        4 => {
            let shape = op.i64_constant(op.name("shape"), &[4], layout::as_i64(&output.shape))?;
            let reshape = NodeProto::named("Reshape", op.name("reshape")).with_inputs([x, shape]);
            x = op.push(reshape, &output.shape)?;
            let to_nchw = NodeProto::named("Transpose", op.prefix)
                .with_input(x)
                .with_ints("perm", layout::as_i64(&NHWC_TO_NCHW));
            op.push_final(to_nchw)?;
        }
        rank => {
            let shape = op.i64_constant(op.name("shape"), &[rank], layout::as_i64(&output.shape))?;
            op.push_final(NodeProto::named("Reshape", op.prefix).with_inputs([x, shape]))?;
        }
    }
    Ok(())
}

pub fn l2_normalization(op: &mut LowerOp) -> Result<()> {
    let x = op.wire(0)?;
    let rank = op.input_tensor(0)?.rank();
    let axis = if rank == 4 { 1 } else { rank.max(1) - 1 };
    op.push_final(
        NodeProto::named("LpNormalization", op.prefix)
            .with_input(x)
            .with_int("axis", axis as i64)
            .with_int("p", 2),
    )?;
    Ok(())
}

pub fn mean(op: &mut LowerOp, keep_dims: bool) -> Result<()> {
    let x = op.wire(0)?;
    let input = op.input_tensor(0)?;
    let axes = op.constant(1)?;
    let axes: Vec<usize> = op
        .catalog()
        .int_data(axes.index)?
        .into_iter()
        .map(|ax| layout::normalize_axis(ax, input.rank()))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .sorted()
        .dedup()
        .collect();
    let output = op.output_tensor()?;

    if input.rank() == 4 && axes == [1, 2] {
        if keep_dims {
            op.push_final(NodeProto::named("GlobalAveragePool", op.prefix).with_input(x))?;
        } else {
            let pooled = layout::declared_shape(&[input.shape[0], 1, 1, input.shape[3]]);
            let pool = NodeProto::named("GlobalAveragePool", op.name("pool")).with_input(x);
            let x = op.push(pool, &pooled)?;
            op.push_final(NodeProto::named("Squeeze", op.prefix).with_input(x).with_ints("axes", [2, 3]))?;
        }
    } else if input.rank() == 4 {
        let remapped = layout::axes_remap(&axes)?;
        let reduced = input
            .shape
            .iter()
            .enumerate()
            .map(|(ax, &d)| if axes.contains(&ax) { 1 } else { d })
            .collect_vec();
        let name = if keep_dims { op.prefix.to_string() } else { op.name("reduce") };
        let reduce = NodeProto::named("ReduceMean", name)
            .with_input(x)
            .with_ints("axes", layout::as_i64(&remapped))
            .with_int("keepdims", 1);
        if keep_dims {
            op.push_final(reduce)?;
        } else {
            // drop the reduced axes in channel-last order
            let x = op.push(reduce, &layout::declared_shape(&reduced))?;
            let to_nhwc = NodeProto::named("Transpose", op.name("to_nhwc"))
                .with_input(x)
                .with_ints("perm", layout::as_i64(&NCHW_TO_NHWC));
            let x = op.push(to_nhwc, &reduced)?;
            let shape =
                op.i64_constant(op.name("shape"), &[output.rank()], layout::as_i64(&output.shape))?;
            op.push_final(NodeProto::named("Reshape", op.prefix).with_inputs([x, shape]))?;
        }
    } else {
        op.push_final(
            NodeProto::named("ReduceMean", op.prefix)
                .with_input(x)
                .with_ints("axes", layout::as_i64(&axes))
                .with_int("keepdims", keep_dims as i64),
        )?;
    }
    Ok(())
}
