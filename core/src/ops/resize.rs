use super::LowerOp;
use crate::internal::*;

pub fn upsample(
    op: &mut LowerOp,
    mode: &str,
    align_corners: bool,
    half_pixel_centers: bool,
) -> Result<()> {
    let x = op.wire(0)?;
    let input = op.input_tensor(0)?;
    let output = op.output_tensor()?;
    ensure!(
        input.rank() == 4 && output.rank() == 4,
        "{} resizes {:?} to {:?}, only rank 4 images are supported",
        op.prefix,
        input.shape,
        output.shape
    );
    ensure!(
        input.shape[1] > 0 && input.shape[2] > 0,
        "{} resizes an empty image {:?}",
        op.prefix,
        input.shape
    );
    if align_corners || half_pixel_centers {
        warn!(
            "{}: align_corners={align_corners} half_pixel_centers={half_pixel_centers} are ignored by Upsample",
            op.prefix
        );
    }
    let scales = vec![
        1.0,
        1.0,
        output.shape[1] as f32 / input.shape[1] as f32,
        output.shape[2] as f32 / input.shape[2] as f32,
    ];
    let scales = op.f32_constant(op.name("scales"), &[4], scales)?;
    op.push_final(
        NodeProto::named("Upsample", op.prefix).with_inputs([x, scales]).with_string("mode", mode),
    )?;
    Ok(())
}
