use ndarray::{ArrayD, IxDyn};

use crate::internal::*;

pub const NHWC_TO_NCHW: [usize; 4] = [0, 3, 1, 2];
pub const NCHW_TO_NHWC: [usize; 4] = [0, 2, 3, 1];

pub fn to_channel_first_shape(shape: &[usize]) -> Result<TVec<usize>> {
    ensure!(shape.len() == 4, "Expected a rank 4 shape, got {shape:?}");
    Ok(NHWC_TO_NCHW.iter().map(|&ax| shape[ax]).collect())
}

/// Shape annotation of a lowered value: rank 4 goes channel-first, other
/// ranks keep their layout.
pub fn declared_shape(shape: &[usize]) -> TVec<usize> {
    if shape.len() == 4 {
        NHWC_TO_NCHW.iter().map(|&ax| shape[ax]).collect()
    } else {
        shape.into()
    }
}

pub fn axis_remap(axis: usize) -> Result<usize> {
    Ok(match axis {
        0 => 0,
        3 => 1,
        1 => 2,
        2 => 3,
        _ => bail!("Axis {axis} can not be remapped to channel-first layout"),
    })
}

pub fn axes_remap(axes: &[usize]) -> Result<TVec<usize>> {
    axes.iter().map(|&ax| axis_remap(ax)).collect()
}

pub fn normalize_axis(axis: i64, rank: usize) -> Result<usize> {
    let normalized = if axis < 0 { axis + rank as i64 } else { axis };
    ensure!(
        normalized >= 0 && (normalized as usize) < rank.max(1),
        "Axis {axis} out of range for rank {rank}"
    );
    Ok(normalized as usize)
}

pub fn permute_shape(shape: &[usize], perm: &[usize]) -> TVec<usize> {
    perm.iter().map(|&ax| shape[ax]).collect()
}

/// Reorder the row-major `data` of `shape` so that output axis `i` is input
/// axis `perm[i]`.
pub fn permute<T: Clone>(data: Vec<T>, shape: &[usize], perm: &[usize]) -> Result<Vec<T>> {
    ensure!(perm.len() == shape.len(), "Permutation {perm:?} does not fit shape {shape:?}");
    let array = ArrayD::from_shape_vec(IxDyn(shape), data)
        .with_context(|| format!("Data does not match shape {shape:?}"))?;
    Ok(array.permuted_axes(IxDyn(perm)).iter().cloned().collect())
}

pub fn as_i64(values: &[usize]) -> Vec<i64> {
    values.iter().map(|&v| v as i64).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn channel_first() {
        assert_eq!(&*to_channel_first_shape(&[1, 7, 5, 3]).unwrap(), &[1, 3, 7, 5]);
        assert!(to_channel_first_shape(&[1, 3]).is_err());
        assert_eq!(&*declared_shape(&[2, 10]), &[2, 10]);
        assert_eq!(&*declared_shape(&[1, 4, 4, 8]), &[1, 8, 4, 4]);
    }

    #[test]
    fn axes() {
        assert_eq!(&*axes_remap(&[0, 1, 2, 3]).unwrap(), &[0, 2, 3, 1]);
        assert!(axis_remap(4).is_err());
        assert_eq!(normalize_axis(-1, 4).unwrap(), 3);
        assert_eq!(normalize_axis(2, 4).unwrap(), 2);
        assert!(normalize_axis(-5, 4).is_err());
        assert!(normalize_axis(4, 4).is_err());
    }

    #[test]
    fn permutations_invert() {
        let to_nhwc = NHWC_TO_NCHW.iter().map(|&ax| NCHW_TO_NHWC[ax]).collect_vec();
        assert_eq!(to_nhwc, vec![0, 1, 2, 3]);
    }

    #[test]
    fn permute_ohwi_to_oihw() {
        // O=2 H=1 W=2 I=3
        let data = (0..12).collect_vec();
        let out = permute(data, &[2, 1, 2, 3], &NHWC_TO_NCHW).unwrap();
        assert_eq!(out, vec![0, 3, 1, 4, 2, 5, 6, 9, 7, 10, 8, 11]);
        assert_eq!(&*permute_shape(&[2, 1, 2, 3], &NHWC_TO_NCHW), &[2, 3, 1, 2]);
    }

    #[test]
    fn permute_checks_volume() {
        assert!(permute(vec![1, 2, 3], &[2, 2], &[1, 0]).is_err());
    }
}
