use crate::internal::*;

/// Explicit `[top, left, bottom, right]` padding of a 2D window sliding over
/// the spatial axes (1 and 2) of a channel-last feature map.
///
/// `None` for padding modes other than SAME and VALID.
pub fn compute_padding(
    shape: &[usize],
    kernel: [usize; 2],
    strides: [usize; 2],
    padding: Padding,
) -> Option<[usize; 4]> {
    match padding {
        Padding::Valid => Some([0; 4]),
        Padding::Same => {
            let (top, bottom) = same(*shape.get(1)?, kernel[0], strides[0]);
            let (left, right) = same(*shape.get(2)?, kernel[1], strides[1]);
            Some([top, left, bottom, right])
        }
        Padding::Other(_) => None,
    }
}

fn same(input: usize, kernel: usize, stride: usize) -> (usize, usize) {
    let stride = stride.max(1);
    let need = if input % stride == 0 {
        kernel.saturating_sub(stride)
    } else {
        kernel.saturating_sub(input % stride)
    };
    (need / 2, need - need / 2)
}

/// Kernel extent once dilation holes are accounted for.
pub fn effective_kernel(kernel: usize, dilation: usize) -> usize {
    (kernel.max(1) - 1) * dilation.max(1) + 1
}
