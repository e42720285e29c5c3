use thiserror::Error;

/// Errors raised while building or running a U-Net.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UnetError {
    #[error("convolution kernel size must be odd to keep the image size, got {0}")]
    EvenConvKernel(usize),

    #[error("pooling stride must be greater than one or the pooling kernel odd, got stride {stride} and kernel {kernel}")]
    PoolShrinksImage { stride: usize, kernel: usize },

    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),

    #[error("`{0}` overflows usize")]
    Overflow(&'static str),

    #[error("dropout probability must lie in [0, 1], got {0}")]
    InvalidDropout(f64),

    #[error("upsampling kernel {kernel} with stride {stride} needs output padding {output_padding}, which must be smaller than the stride")]
    IrreversibleUpsample {
        kernel: usize,
        stride: usize,
        output_padding: usize,
    },

    #[error("input size {height}x{width} is not divisible by {multiple} (pool_stride ^ repeat_blocks)")]
    IndivisibleInput {
        height: usize,
        width: usize,
        multiple: usize,
    },

    #[error("expected {expected} input channels, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
}

pub type UnetResult<T> = Result<T, UnetError>;
