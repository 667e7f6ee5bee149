//! Accessors for the subset of the TFLite flatbuffer schema the converter reads.
//!
//! Enum-typed fields are exposed as their raw integer codes, the typed views
//! live in `ops` and `tensors`.
#![allow(clippy::missing_safety_doc)]

use flatbuffers::{ForwardsUOffset, InvalidFlatbuffer, Table, Verifiable, Verifier, Vector, VOffsetT};

pub const FILE_IDENTIFIER: &str = "TFL3";

pub mod builtin_operator {
    pub const ADD: i32 = 0;
    pub const AVERAGE_POOL_2D: i32 = 1;
    pub const CONCATENATION: i32 = 2;
    pub const CONV_2D: i32 = 3;
    pub const DEPTHWISE_CONV_2D: i32 = 4;
    pub const FULLY_CONNECTED: i32 = 9;
    pub const L2_NORMALIZATION: i32 = 11;
    pub const LOGISTIC: i32 = 14;
    pub const MAX_POOL_2D: i32 = 17;
    pub const MUL: i32 = 18;
    pub const RELU: i32 = 19;
    pub const RELU6: i32 = 21;
    pub const RESHAPE: i32 = 22;
    pub const RESIZE_BILINEAR: i32 = 23;
    pub const SOFTMAX: i32 = 25;
    pub const PAD: i32 = 34;
    pub const MEAN: i32 = 40;
    pub const SQUEEZE: i32 = 43;
    pub const PRELU: i32 = 54;
    pub const TRANSPOSE_CONV: i32 = 67;
    pub const RESIZE_NEAREST_NEIGHBOR: i32 = 97;
    pub const CUSTOM: i32 = 32;
}

pub mod builtin_options {
    pub const NONE: u8 = 0;
    pub const CONV_2D_OPTIONS: u8 = 1;
    pub const DEPTHWISE_CONV_2D_OPTIONS: u8 = 2;
    pub const POOL_2D_OPTIONS: u8 = 5;
    pub const FULLY_CONNECTED_OPTIONS: u8 = 8;
    pub const SOFTMAX_OPTIONS: u8 = 9;
    pub const CONCATENATION_OPTIONS: u8 = 10;
    pub const ADD_OPTIONS: u8 = 11;
    pub const L2_NORM_OPTIONS: u8 = 12;
    pub const RESIZE_BILINEAR_OPTIONS: u8 = 15;
    pub const RESHAPE_OPTIONS: u8 = 17;
    pub const MUL_OPTIONS: u8 = 21;
    pub const PAD_OPTIONS: u8 = 22;
    pub const REDUCER_OPTIONS: u8 = 27;
    pub const SQUEEZE_OPTIONS: u8 = 30;
    pub const TRANSPOSE_CONV_OPTIONS: u8 = 49;
    pub const RESIZE_NEAREST_NEIGHBOR_OPTIONS: u8 = 74;
}

flat_table!(Model);

impl<'a> Model<'a> {
    pub const VT_VERSION: VOffsetT = 4;
    pub const VT_OPERATOR_CODES: VOffsetT = 6;
    pub const VT_SUBGRAPHS: VOffsetT = 8;
    pub const VT_DESCRIPTION: VOffsetT = 10;
    pub const VT_BUFFERS: VOffsetT = 12;

    pub fn version(&self) -> u32 {
        unsafe { self._tab.get::<u32>(Model::VT_VERSION, Some(0)) }.unwrap_or(0)
    }

    pub fn operator_codes(&self) -> Option<Vector<'a, ForwardsUOffset<OperatorCode<'a>>>> {
        unsafe {
            self._tab.get::<ForwardsUOffset<Vector<'a, ForwardsUOffset<OperatorCode>>>>(
                Model::VT_OPERATOR_CODES,
                None,
            )
        }
    }

    pub fn subgraphs(&self) -> Option<Vector<'a, ForwardsUOffset<SubGraph<'a>>>> {
        unsafe {
            self._tab.get::<ForwardsUOffset<Vector<'a, ForwardsUOffset<SubGraph>>>>(
                Model::VT_SUBGRAPHS,
                None,
            )
        }
    }

    pub fn description(&self) -> Option<&'a str> {
        unsafe { self._tab.get::<ForwardsUOffset<&str>>(Model::VT_DESCRIPTION, None) }
    }

    pub fn buffers(&self) -> Option<Vector<'a, ForwardsUOffset<Buffer<'a>>>> {
        unsafe {
            self._tab.get::<ForwardsUOffset<Vector<'a, ForwardsUOffset<Buffer>>>>(
                Model::VT_BUFFERS,
                None,
            )
        }
    }
}

impl Verifiable for Model<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<u32>("version", Self::VT_VERSION, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<OperatorCode>>>>(
                "operator_codes",
                Self::VT_OPERATOR_CODES,
                false,
            )?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<SubGraph>>>>(
                "subgraphs",
                Self::VT_SUBGRAPHS,
                false,
            )?
            .visit_field::<ForwardsUOffset<&str>>("description", Self::VT_DESCRIPTION, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<Buffer>>>>(
                "buffers",
                Self::VT_BUFFERS,
                false,
            )?
            .finish();
        Ok(())
    }
}

flat_table!(OperatorCode);

impl<'a> OperatorCode<'a> {
    pub const VT_DEPRECATED_BUILTIN_CODE: VOffsetT = 4;
    pub const VT_CUSTOM_CODE: VOffsetT = 6;
    pub const VT_VERSION: VOffsetT = 8;
    pub const VT_BUILTIN_CODE: VOffsetT = 10;

    pub fn deprecated_builtin_code(&self) -> i8 {
        unsafe { self._tab.get::<i8>(Self::VT_DEPRECATED_BUILTIN_CODE, Some(0)) }.unwrap_or(0)
    }

    pub fn custom_code(&self) -> Option<&'a str> {
        unsafe { self._tab.get::<ForwardsUOffset<&str>>(Self::VT_CUSTOM_CODE, None) }
    }

    pub fn version(&self) -> i32 {
        unsafe { self._tab.get::<i32>(Self::VT_VERSION, Some(1)) }.unwrap_or(1)
    }

    pub fn builtin_code(&self) -> i32 {
        unsafe { self._tab.get::<i32>(Self::VT_BUILTIN_CODE, Some(0)) }.unwrap_or(0)
    }

    /// Older writers only fill the deprecated i8 field, newer ones fill both
    /// with the placeholder 127 in the deprecated slot for codes above it.
    pub fn effective_code(&self) -> i32 {
        (self.deprecated_builtin_code() as i32).max(self.builtin_code())
    }
}

impl Verifiable for OperatorCode<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<i8>("deprecated_builtin_code", Self::VT_DEPRECATED_BUILTIN_CODE, false)?
            .visit_field::<ForwardsUOffset<&str>>("custom_code", Self::VT_CUSTOM_CODE, false)?
            .visit_field::<i32>("version", Self::VT_VERSION, false)?
            .visit_field::<i32>("builtin_code", Self::VT_BUILTIN_CODE, false)?
            .finish();
        Ok(())
    }
}

flat_table!(SubGraph);

impl<'a> SubGraph<'a> {
    pub const VT_TENSORS: VOffsetT = 4;
    pub const VT_INPUTS: VOffsetT = 6;
    pub const VT_OUTPUTS: VOffsetT = 8;
    pub const VT_OPERATORS: VOffsetT = 10;
    pub const VT_NAME: VOffsetT = 12;

    pub fn tensors(&self) -> Option<Vector<'a, ForwardsUOffset<Tensor<'a>>>> {
        unsafe {
            self._tab
                .get::<ForwardsUOffset<Vector<'a, ForwardsUOffset<Tensor>>>>(Self::VT_TENSORS, None)
        }
    }

    pub fn inputs(&self) -> Option<Vector<'a, i32>> {
        unsafe { self._tab.get::<ForwardsUOffset<Vector<'a, i32>>>(Self::VT_INPUTS, None) }
    }

    pub fn outputs(&self) -> Option<Vector<'a, i32>> {
        unsafe { self._tab.get::<ForwardsUOffset<Vector<'a, i32>>>(Self::VT_OUTPUTS, None) }
    }

    pub fn operators(&self) -> Option<Vector<'a, ForwardsUOffset<Operator<'a>>>> {
        unsafe {
            self._tab.get::<ForwardsUOffset<Vector<'a, ForwardsUOffset<Operator>>>>(
                Self::VT_OPERATORS,
                None,
            )
        }
    }

    pub fn name(&self) -> Option<&'a str> {
        unsafe { self._tab.get::<ForwardsUOffset<&str>>(Self::VT_NAME, None) }
    }
}

impl Verifiable for SubGraph<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<Tensor>>>>(
                "tensors",
                Self::VT_TENSORS,
                false,
            )?
            .visit_field::<ForwardsUOffset<Vector<'_, i32>>>("inputs", Self::VT_INPUTS, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, i32>>>("outputs", Self::VT_OUTPUTS, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<Operator>>>>(
                "operators",
                Self::VT_OPERATORS,
                false,
            )?
            .visit_field::<ForwardsUOffset<&str>>("name", Self::VT_NAME, false)?
            .finish();
        Ok(())
    }
}

flat_table!(Tensor);

impl<'a> Tensor<'a> {
    pub const VT_SHAPE: VOffsetT = 4;
    pub const VT_TYPE_: VOffsetT = 6;
    pub const VT_BUFFER: VOffsetT = 8;
    pub const VT_NAME: VOffsetT = 10;

    pub fn shape(&self) -> Option<Vector<'a, i32>> {
        unsafe { self._tab.get::<ForwardsUOffset<Vector<'a, i32>>>(Self::VT_SHAPE, None) }
    }

    pub fn type_(&self) -> i8 {
        unsafe { self._tab.get::<i8>(Self::VT_TYPE_, Some(0)) }.unwrap_or(0)
    }

    pub fn buffer(&self) -> u32 {
        unsafe { self._tab.get::<u32>(Self::VT_BUFFER, Some(0)) }.unwrap_or(0)
    }

    pub fn name(&self) -> Option<&'a str> {
        unsafe { self._tab.get::<ForwardsUOffset<&str>>(Self::VT_NAME, None) }
    }
}

impl Verifiable for Tensor<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<ForwardsUOffset<Vector<'_, i32>>>("shape", Self::VT_SHAPE, false)?
            .visit_field::<i8>("type_", Self::VT_TYPE_, false)?
            .visit_field::<u32>("buffer", Self::VT_BUFFER, false)?
            .visit_field::<ForwardsUOffset<&str>>("name", Self::VT_NAME, false)?
            .finish();
        Ok(())
    }
}

flat_table!(Buffer);

impl<'a> Buffer<'a> {
    pub const VT_DATA: VOffsetT = 4;
    pub const VT_OFFSET: VOffsetT = 6;
    pub const VT_SIZE: VOffsetT = 8;

    pub fn data(&self) -> Option<Vector<'a, u8>> {
        unsafe { self._tab.get::<ForwardsUOffset<Vector<'a, u8>>>(Self::VT_DATA, None) }
    }

    pub fn offset(&self) -> u64 {
        unsafe { self._tab.get::<u64>(Self::VT_OFFSET, Some(0)) }.unwrap_or(0)
    }

    pub fn size(&self) -> u64 {
        unsafe { self._tab.get::<u64>(Self::VT_SIZE, Some(0)) }.unwrap_or(0)
    }
}

impl Verifiable for Buffer<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<ForwardsUOffset<Vector<'_, u8>>>("data", Self::VT_DATA, false)?
            .visit_field::<u64>("offset", Self::VT_OFFSET, false)?
            .visit_field::<u64>("size", Self::VT_SIZE, false)?
            .finish();
        Ok(())
    }
}

flat_table!(Operator);

macro_rules! builtin_options_as {
    ($($fn:ident => $table:ident = $code:path),* $(,)?) => {
        impl<'a> Operator<'a> {
            $(
                pub fn $fn(&self) -> Option<$table<'a>> {
                    if self.builtin_options_type() == $code {
                        self.builtin_options().map(|t| unsafe { $table::init_from_table(t) })
                    } else {
                        None
                    }
                }
            )*
        }

        fn verify_builtin_options(
            key: u8,
            v: &mut Verifier,
            pos: usize,
        ) -> Result<(), InvalidFlatbuffer> {
            match key {
                $($code => v.verify_union_variant::<ForwardsUOffset<$table>>(stringify!($table), pos),)*
                _ => Ok(()),
            }
        }
    };
}

impl<'a> Operator<'a> {
    pub const VT_OPCODE_INDEX: VOffsetT = 4;
    pub const VT_INPUTS: VOffsetT = 6;
    pub const VT_OUTPUTS: VOffsetT = 8;
    pub const VT_BUILTIN_OPTIONS_TYPE: VOffsetT = 10;
    pub const VT_BUILTIN_OPTIONS: VOffsetT = 12;

    pub fn opcode_index(&self) -> u32 {
        unsafe { self._tab.get::<u32>(Self::VT_OPCODE_INDEX, Some(0)) }.unwrap_or(0)
    }

    pub fn inputs(&self) -> Option<Vector<'a, i32>> {
        unsafe { self._tab.get::<ForwardsUOffset<Vector<'a, i32>>>(Self::VT_INPUTS, None) }
    }

    pub fn outputs(&self) -> Option<Vector<'a, i32>> {
        unsafe { self._tab.get::<ForwardsUOffset<Vector<'a, i32>>>(Self::VT_OUTPUTS, None) }
    }

    pub fn builtin_options_type(&self) -> u8 {
        unsafe { self._tab.get::<u8>(Self::VT_BUILTIN_OPTIONS_TYPE, Some(0)) }.unwrap_or(0)
    }

    pub fn builtin_options(&self) -> Option<Table<'a>> {
        unsafe { self._tab.get::<ForwardsUOffset<Table<'a>>>(Self::VT_BUILTIN_OPTIONS, None) }
    }
}

builtin_options_as! {
    builtin_options_as_conv_2d_options => Conv2DOptions = builtin_options::CONV_2D_OPTIONS,
    builtin_options_as_depthwise_conv_2d_options => DepthwiseConv2DOptions = builtin_options::DEPTHWISE_CONV_2D_OPTIONS,
    builtin_options_as_pool_2d_options => Pool2DOptions = builtin_options::POOL_2D_OPTIONS,
    builtin_options_as_fully_connected_options => FullyConnectedOptions = builtin_options::FULLY_CONNECTED_OPTIONS,
    builtin_options_as_softmax_options => SoftmaxOptions = builtin_options::SOFTMAX_OPTIONS,
    builtin_options_as_concatenation_options => ConcatenationOptions = builtin_options::CONCATENATION_OPTIONS,
    builtin_options_as_add_options => AddOptions = builtin_options::ADD_OPTIONS,
    builtin_options_as_l2_norm_options => L2NormOptions = builtin_options::L2_NORM_OPTIONS,
    builtin_options_as_resize_bilinear_options => ResizeBilinearOptions = builtin_options::RESIZE_BILINEAR_OPTIONS,
    builtin_options_as_reshape_options => ReshapeOptions = builtin_options::RESHAPE_OPTIONS,
    builtin_options_as_mul_options => MulOptions = builtin_options::MUL_OPTIONS,
    builtin_options_as_reducer_options => ReducerOptions = builtin_options::REDUCER_OPTIONS,
    builtin_options_as_squeeze_options => SqueezeOptions = builtin_options::SQUEEZE_OPTIONS,
    builtin_options_as_transpose_conv_options => TransposeConvOptions = builtin_options::TRANSPOSE_CONV_OPTIONS,
    builtin_options_as_resize_nearest_neighbor_options => ResizeNearestNeighborOptions = builtin_options::RESIZE_NEAREST_NEIGHBOR_OPTIONS,
}

impl Verifiable for Operator<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<u32>("opcode_index", Self::VT_OPCODE_INDEX, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, i32>>>("inputs", Self::VT_INPUTS, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, i32>>>("outputs", Self::VT_OUTPUTS, false)?
            .visit_union::<u8, _>(
                "builtin_options_type",
                Self::VT_BUILTIN_OPTIONS_TYPE,
                "builtin_options",
                Self::VT_BUILTIN_OPTIONS,
                false,
                verify_builtin_options,
            )?
            .finish();
        Ok(())
    }
}

options_table!(Conv2DOptions {
    padding: i8 = 0 => 4,
    stride_w: i32 = 0 => 6,
    stride_h: i32 = 0 => 8,
    fused_activation_function: i8 = 0 => 10,
    dilation_w_factor: i32 = 1 => 12,
    dilation_h_factor: i32 = 1 => 14,
});

options_table!(DepthwiseConv2DOptions {
    padding: i8 = 0 => 4,
    stride_w: i32 = 0 => 6,
    stride_h: i32 = 0 => 8,
    depth_multiplier: i32 = 0 => 10,
    fused_activation_function: i8 = 0 => 12,
    dilation_w_factor: i32 = 1 => 14,
    dilation_h_factor: i32 = 1 => 16,
});

options_table!(Pool2DOptions {
    padding: i8 = 0 => 4,
    stride_w: i32 = 0 => 6,
    stride_h: i32 = 0 => 8,
    filter_width: i32 = 0 => 10,
    filter_height: i32 = 0 => 12,
    fused_activation_function: i8 = 0 => 14,
});

options_table!(FullyConnectedOptions {
    fused_activation_function: i8 = 0 => 4,
    weights_format: i8 = 0 => 6,
    keep_num_dims: bool = false => 8,
});

options_table!(SoftmaxOptions {
    beta: f32 = 0.0 => 4,
});

options_table!(ConcatenationOptions {
    axis: i32 = 0 => 4,
    fused_activation_function: i8 = 0 => 6,
});

options_table!(AddOptions {
    fused_activation_function: i8 = 0 => 4,
});

options_table!(MulOptions {
    fused_activation_function: i8 = 0 => 4,
});

options_table!(L2NormOptions {
    fused_activation_function: i8 = 0 => 4,
});

options_table!(ResizeBilinearOptions {
    align_corners: bool = false => 8,
    half_pixel_centers: bool = false => 10,
});

options_table!(ResizeNearestNeighborOptions {
    align_corners: bool = false => 4,
    half_pixel_centers: bool = false => 6,
});

options_table!(ReducerOptions {
    keep_dims: bool = false => 4,
});

options_table!(TransposeConvOptions {
    padding: i8 = 0 => 4,
    stride_w: i32 = 0 => 6,
    stride_h: i32 = 0 => 8,
    fused_activation_function: i8 = 0 => 10,
});

flat_table!(ReshapeOptions);

impl<'a> ReshapeOptions<'a> {
    pub const VT_NEW_SHAPE: VOffsetT = 4;

    pub fn new_shape(&self) -> Option<Vector<'a, i32>> {
        unsafe { self._tab.get::<ForwardsUOffset<Vector<'a, i32>>>(Self::VT_NEW_SHAPE, None) }
    }
}

impl Verifiable for ReshapeOptions<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<ForwardsUOffset<Vector<'_, i32>>>("new_shape", Self::VT_NEW_SHAPE, false)?
            .finish();
        Ok(())
    }
}

flat_table!(SqueezeOptions);

impl<'a> SqueezeOptions<'a> {
    pub const VT_SQUEEZE_DIMS: VOffsetT = 4;

    pub fn squeeze_dims(&self) -> Option<Vector<'a, i32>> {
        unsafe { self._tab.get::<ForwardsUOffset<Vector<'a, i32>>>(Self::VT_SQUEEZE_DIMS, None) }
    }
}

impl Verifiable for SqueezeOptions<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<ForwardsUOffset<Vector<'_, i32>>>(
                "squeeze_dims",
                Self::VT_SQUEEZE_DIMS,
                false,
            )?
            .finish();
        Ok(())
    }
}

pub fn root_as_model(buf: &[u8]) -> Result<Model, InvalidFlatbuffer> {
    flatbuffers::root::<Model>(buf)
}

/// # Safety
/// `buf` must have been checked by `root_as_model` beforehand.
pub unsafe fn root_as_model_unchecked(buf: &[u8]) -> Model {
    flatbuffers::root_unchecked::<Model>(buf)
}
