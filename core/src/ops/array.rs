use super::LowerOp;
use crate::internal::*;

/// Inputs of a variadic node: wires as is, constants emitted as initializers
/// in the layout of the node.
pub fn operands(op: &mut LowerOp, rank: usize) -> Result<Vec<String>> {
    let mut names = vec![];
    for slot in 0..op.record.inputs.len() {
        match op.input(slot)? {
            Operand::Wire(wire) => names.push(wire),
            Operand::Constant(t) => {
                let tensor = op.catalog().tensor(t)?;
                names.push(op.layout_constant(tensor, op.name(&format!("input{slot}")), rank)?);
            }
            Operand::Absent => (),
        }
    }
    Ok(names)
}

pub fn concat(op: &mut LowerOp, axis: i32) -> Result<()> {
    let rank = op.output_tensor()?.rank();
    let inputs = operands(op, rank)?;
    ensure!(!inputs.is_empty(), "{} concatenates nothing", op.prefix);
    let mut axis = layout::normalize_axis(axis as i64, rank)?;
    if rank == 4 {
        axis = layout::axis_remap(axis)?;
    }
    op.push_final(NodeProto::named("Concat", op.prefix).with_inputs(inputs).with_int("axis", axis as i64))?;
    Ok(())
}

pub fn reshape(op: &mut LowerOp) -> Result<()> {
    let mut x = op.wire(0)?;
    let input = op.input_tensor(0)?;
    let output = op.output_tensor()?;
    ensure!(
        input.volume() == output.volume(),
        "{} reshapes {:?} into {:?}",
        op.prefix,
        input.shape,
        output.shape
    );
    if input.rank() == 4 {
        let to_nhwc = NodeProto::named("Transpose", op.name("to_nhwc"))
            .with_input(x)
            .with_ints("perm", layout::as_i64(&NCHW_TO_NHWC));
        x = op.push(to_nhwc, &input.shape)?;
    }
    let shape = op.i64_constant(op.name("shape"), &[output.rank()], layout::as_i64(&output.shape))?;
    if output.rank() == 4 {
        let reshape = NodeProto::named("Reshape", op.name("reshape")).with_inputs([x, shape]);
        x = op.push(reshape, &output.shape)?;
        let to_nchw = NodeProto::named("Transpose", op.prefix)
            .with_input(x)
            .with_ints("perm", layout::as_i64(&NHWC_TO_NCHW));
        op.push_final(to_nchw)?;
    } else {
        op.push_final(NodeProto::named("Reshape", op.prefix).with_inputs([x, shape]))?;
    }
    Ok(())
}

pub fn pad(op: &mut LowerOp) -> Result<()> {
    let x = op.wire(0)?;
    let rank = op.input_tensor(0)?.rank();
    let paddings = op.constant(1)?;
    ensure!(
        paddings.shape[..] == [rank, 2],
        "Paddings of {} must be [{rank}, 2], got {:?}",
        op.prefix,
        paddings.shape
    );
    let paddings = op.catalog().int_data(paddings.index)?;
    let axes = if rank == 4 { NHWC_TO_NCHW.to_vec() } else { (0..rank).collect() };
    let pads = axes
        .iter()
        .map(|&ax| paddings[2 * ax])
        .chain(axes.iter().map(|&ax| paddings[2 * ax + 1]))
        .collect_vec();
    op.push_final(
        NodeProto::named("Pad", op.prefix)
            .with_input(x)
            .with_string("mode", "constant")
            .with_float("value", 0.0)
            .with_ints("pads", pads),
    )?;
    Ok(())
}

pub fn squeeze(op: &mut LowerOp, squeeze_dims: &[i32]) -> Result<()> {
    let mut x = op.wire(0)?;
    let input = op.input_tensor(0)?;
    let rank = input.rank();
    let axes: Vec<usize> = if squeeze_dims.is_empty() {
        (0..rank).filter(|&ax| input.shape[ax] == 1).collect()
    } else {
        squeeze_dims
            .iter()
            .map(|&ax| layout::normalize_axis(ax as i64, rank))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .sorted()
            .dedup()
            .collect()
    };
    for &ax in &axes {
        ensure!(input.shape[ax] == 1, "{} squeezes axis {ax} of {:?}", op.prefix, input.shape);
    }
    let mut onnx_axes = axes.clone();
    if rank == 4 {
        let kept = (0..4).filter(|ax| !axes.contains(ax)).collect_vec();
        let kept_channel_first = kept
            .iter()
            .copied()
            .sorted_by_key(|&ax| NHWC_TO_NCHW.iter().position(|&p| p == ax))
            .collect_vec();
        if kept == kept_channel_first {
            onnx_axes = layout::axes_remap(&axes)?.into_iter().sorted().collect();
        } else {
            let to_nhwc = NodeProto::named("Transpose", op.name("to_nhwc"))
                .with_input(x)
                .with_ints("perm", layout::as_i64(&NCHW_TO_NHWC));
            x = op.push(to_nhwc, &input.shape)?;
        }
    }
    op.push_final(
        NodeProto::named("Squeeze", op.prefix)
            .with_input(x)
            .with_ints("axes", layout::as_i64(&onnx_axes)),
    )?;
    Ok(())
}
