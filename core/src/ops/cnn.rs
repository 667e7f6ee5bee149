use tfl2onnx_tflite::ops::{Conv2D, DepthwiseConv2D, Pool2D, TransposeConv};

use super::LowerOp;
use crate::internal::*;
use crate::padding::effective_kernel;

fn pads(
    op: &LowerOp,
    shape: &[usize],
    kernel: [usize; 2],
    strides: [usize; 2],
    padding: Padding,
) -> Result<Vec<i64>> {
    let pads = compute_padding(shape, kernel, strides, padding)
        .with_context(|| format!("Unsupported padding mode {padding:?} on {}", op.prefix))?;
    Ok(layout::as_i64(&pads))
}

fn rank_4_input<'a>(op: &LowerOp<'a>, slot: usize) -> Result<&'a TensorDescriptor> {
    let input = op.input_tensor(slot)?;
    ensure!(input.rank() == 4, "{} expects a rank 4 input, got {:?}", op.prefix, input.shape);
    Ok(input)
}

/// Constant filter of slot `slot`, permuted with `perm`.
fn filter(op: &mut LowerOp, slot: usize, perm: &[usize]) -> Result<(String, TVec<usize>)> {
    let weight = op.constant(slot)?;
    ensure!(weight.rank() == 4, "Filter of {} must be rank 4, got {:?}", op.prefix, weight.shape);
    let data = op
        .catalog()
        .f32_data(weight.index)
        .with_context(|| format!("Reading filter of {}", op.prefix))?;
    let data = layout::permute(data, &weight.shape, perm)?;
    let name = op.f32_constant(op.name("weight"), &layout::permute_shape(&weight.shape, perm), data)?;
    Ok((name, weight.shape.clone()))
}

fn bias(op: &mut LowerOp, slot: usize) -> Result<Option<String>> {
    match op.input(slot)? {
        Operand::Absent => Ok(None),
        Operand::Constant(t) => {
            let tensor = op.catalog().tensor(t)?;
            let data = op.catalog().f32_data(t).with_context(|| format!("Reading bias of {}", op.prefix))?;
            Ok(Some(op.f32_constant(op.name("bias"), &tensor.shape, data)?))
        }
        Operand::Wire(w) => bail!("Bias of {} must be constant, got {w}", op.prefix),
    }
}

pub fn conv(op: &mut LowerOp, conv: &Conv2D) -> Result<()> {
    let x = op.wire(0)?;
    let input = rank_4_input(op, 0)?;
    let (weight, ohwi) = filter(op, 1, &NHWC_TO_NCHW)?;
    ensure!(
        ohwi[3] == input.shape[3],
        "{} filter {:?} does not match {} input channels",
        op.prefix,
        ohwi,
        input.shape[3]
    );
    let kernel = [ohwi[1], ohwi[2]];
    let effective =
        [effective_kernel(kernel[0], conv.dilation_h), effective_kernel(kernel[1], conv.dilation_w)];
    let pads = pads(op, &input.shape, effective, [conv.stride_h, conv.stride_w], conv.padding)?;
    let inputs = [Some(x), Some(weight), bias(op, 2)?].into_iter().flatten().collect_vec();
    op.push_final(
        NodeProto::named("Conv", op.prefix)
            .with_inputs(inputs)
            .with_ints("kernel_shape", layout::as_i64(&kernel))
            .with_ints("strides", [conv.stride_h as i64, conv.stride_w as i64])
            .with_ints("dilations", [conv.dilation_h as i64, conv.dilation_w as i64])
            .with_ints("pads", pads)
            .with_int("group", 1),
    )?;
    Ok(())
}

pub fn depthwise_conv(op: &mut LowerOp, conv: &DepthwiseConv2D) -> Result<()> {
    let x = op.wire(0)?;
    let input = rank_4_input(op, 0)?;
    let (weight, one_hwo) = filter(op, 1, &[3, 0, 1, 2])?;
    let channels = input.shape[3];
    ensure!(
        one_hwo[0] == 1 && one_hwo[3] == channels * conv.depth_multiplier,
        "{} filter {:?} does not match {channels} channels with depth multiplier {}",
        op.prefix,
        one_hwo,
        conv.depth_multiplier
    );
    let kernel = [one_hwo[1], one_hwo[2]];
    let effective =
        [effective_kernel(kernel[0], conv.dilation_h), effective_kernel(kernel[1], conv.dilation_w)];
    let pads = pads(op, &input.shape, effective, [conv.stride_h, conv.stride_w], conv.padding)?;
    let inputs = [Some(x), Some(weight), bias(op, 2)?].into_iter().flatten().collect_vec();
    op.push_final(
        NodeProto::named("Conv", op.prefix)
            .with_inputs(inputs)
            .with_ints("kernel_shape", layout::as_i64(&kernel))
            .with_ints("strides", [conv.stride_h as i64, conv.stride_w as i64])
            .with_ints("dilations", [conv.dilation_h as i64, conv.dilation_w as i64])
            .with_ints("pads", pads)
            .with_int("group", channels as i64),
    )?;
    Ok(())
}

/// Inputs are the output shape, the filter, the data and an optional bias.
pub fn transpose_conv(op: &mut LowerOp, conv: &TransposeConv) -> Result<()> {
    let x = op.wire(2)?;
    let input = rank_4_input(op, 2)?;
    let output = op.output_tensor()?;
    ensure!(output.rank() == 4, "{} must produce a rank 4 output", op.prefix);
    let (weight, ohwi) = filter(op, 1, &[3, 0, 1, 2])?;
    ensure!(
        ohwi[3] == input.shape[3] && ohwi[0] == output.shape[3],
        "{} filter {:?} does not map {:?} to {:?}",
        op.prefix,
        ohwi,
        input.shape,
        output.shape
    );
    ensure!(
        matches!(conv.padding, Padding::Same | Padding::Valid),
        "Unsupported padding mode {:?} on {}",
        conv.padding,
        op.prefix
    );
    let kernel = [ohwi[1], ohwi[2]];
    let strides = [conv.stride_h, conv.stride_w];
    let mut begin = [0i64; 2];
    let mut end = [0i64; 2];
    let mut output_padding = [0i64; 2];
    for d in 0..2 {
        let full = (strides[d] * input.shape[d + 1].saturating_sub(1) + kernel[d]) as i64;
        let total = full - output.shape[d + 1] as i64;
        if total >= 0 {
            begin[d] = total / 2;
            end[d] = total - total / 2;
        } else {
            output_padding[d] = -total;
        }
    }
    let inputs = [Some(x), Some(weight), bias(op, 3)?].into_iter().flatten().collect_vec();
    op.push_final(
        NodeProto::named("ConvTranspose", op.prefix)
            .with_inputs(inputs)
            .with_ints("kernel_shape", layout::as_i64(&kernel))
            .with_ints("strides", layout::as_i64(&strides))
            .with_ints("pads", [begin[0], begin[1], end[0], end[1]])
            .with_ints("output_padding", output_padding)
            .with_int("group", 1),
    )?;
    Ok(())
}

fn pool(op: &mut LowerOp, pool: &Pool2D, op_type: &str) -> Result<NodeProto> {
    let x = op.wire(0)?;
    let input = rank_4_input(op, 0)?;
    let kernel = [pool.filter_h, pool.filter_w];
    let strides = [pool.stride_h, pool.stride_w];
    let pads = pads(op, &input.shape, kernel, strides, pool.padding)?;
    Ok(NodeProto::named(op_type, op.prefix)
        .with_input(x)
        .with_ints("kernel_shape", layout::as_i64(&kernel))
        .with_ints("strides", layout::as_i64(&strides))
        .with_ints("pads", pads))
}

pub fn max_pool(op: &mut LowerOp, max: &Pool2D) -> Result<()> {
    let node = pool(op, max, "MaxPool")?;
    op.push_final(node)?;
    Ok(())
}

pub fn average_pool(op: &mut LowerOp, avg: &Pool2D) -> Result<()> {
    let node = pool(op, avg, "AveragePool")?.with_int("count_include_pad", 0);
    op.push_final(node)?;
    Ok(())
}
