//! Padding arithmetic that keeps spatial sizes reversible between the
//! downsampling and upsampling paths.

/// Padding and output padding of a transposed convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsamplePadding {
    pub padding: usize,
    pub output_padding: usize,
}

/// Symmetric padding for a strided window so that a size divisible by `stride`
/// shrinks to exactly `size / stride`.
///
/// With stride 1 and an odd kernel this is the usual "same" padding.
pub fn downsample_padding(stride: usize, kernel: usize, dilation: usize) -> usize {
    let effective_kernel = dilation * kernel.saturating_sub(1) + 1;
    effective_kernel.saturating_sub(stride).div_ceil(2)
}

/// Padding pair for a transposed convolution that multiplies the size by exactly
/// `stride`, i.e. `2 * padding - output_padding == kernel - stride`.
pub fn upsample_padding(stride: usize, kernel: usize) -> UpsamplePadding {
    if kernel < stride {
        return UpsamplePadding {
            padding: 0,
            output_padding: stride - kernel,
        };
    }

    let diff = kernel - stride;
    UpsamplePadding {
        padding: diff.div_ceil(2),
        output_padding: diff % 2,
    }
}

/// Output size of a max-pool (or any strided window without dilation).
pub fn pool_output_size(size: usize, kernel: usize, stride: usize, padding: usize) -> usize {
    (size + 2 * padding).saturating_sub(kernel) / stride + 1
}

/// Output size of a transposed convolution. An empty input stays empty.
pub fn conv_transpose_output_size(
    size: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    output_padding: usize,
) -> usize {
    if size == 0 {
        return 0;
    }
    ((size - 1) * stride + kernel + output_padding).saturating_sub(2 * padding)
}
