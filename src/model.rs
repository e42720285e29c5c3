use burn::prelude::*;

use crate::{
    decoder::{Decoder, DecoderConfig, UnetDecoder, UnetDecoderConfig},
    encoder::{Encoder, EncoderConfig, UnetEncoder, UnetEncoderConfig},
    error::{UnetError, UnetResult},
    padding::upsample_padding,
    segmentation_head::{SegmentationHead, SegmentationHeadConfig},
};

/// Checks that a `[batch, channels, height, width]` input fits the network.
fn check_input(
    dims: [usize; 4],
    in_channels: usize,
    input_multiple: usize,
) -> UnetResult<()> {
    let [_, channels, height, width] = dims;
    if channels != in_channels {
        return Err(UnetError::ChannelMismatch {
            expected: in_channels,
            actual: channels,
        });
    }
    if height % input_multiple != 0 || width % input_multiple != 0 {
        return Err(UnetError::IndivisibleInput {
            height,
            width,
            multiple: input_multiple,
        });
    }
    Ok(())
}

fn saturating_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// `n * 2 ^ level`, saturating at `usize::MAX`.
fn doubled(n: usize, level: usize) -> usize {
    n.saturating_mul(2usize.saturating_pow(saturating_u32(level)))
}

/// U-Net with a single output map.
#[derive(Module, Debug)]
pub struct Unet<B: Backend> {
    pub encoder: UnetEncoder<B>,
    pub decoder: UnetDecoder<B>,
    pub head: SegmentationHead<B>,
    in_channels: usize,
    input_multiple: usize,
}

impl<B: Backend> Unet<B> {
    /// `[batch, in_channels, H, W] -> [batch, out_channels, H, W]`.
    ///
    /// `H` and `W` must be divisible by [`UnetConfig::input_multiple`], otherwise the
    /// skip concatenation panics. Use [`Unet::try_forward`] to check beforehand.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let features = self.encoder.forward(x);
        let x = self.decoder.forward(features);
        self.head.forward(x)
    }

    pub fn try_forward(&self, x: Tensor<B, 4>) -> UnetResult<Tensor<B, 4>> {
        check_input(x.dims(), self.in_channels, self.input_multiple)?;
        Ok(self.forward(x))
    }
}

/// U-Net whose trunk feeds several independent output heads.
#[derive(Module, Debug)]
pub struct UnetMultitask<B: Backend> {
    pub encoder: UnetEncoder<B>,
    pub decoder: UnetDecoder<B>,
    pub heads: Vec<SegmentationHead<B>>,
    in_channels: usize,
    input_multiple: usize,
}

impl<B: Backend> UnetMultitask<B> {
    /// One `[batch, out_channels, H, W]` map per head, in head order.
    pub fn forward(&self, x: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        let features = self.encoder.forward(x);
        let x = self.decoder.forward(features);
        self.heads
            .iter()
            .map(|head| head.forward(x.clone()))
            .collect()
    }

    pub fn try_forward(&self, x: Tensor<B, 4>) -> UnetResult<Vec<Tensor<B, 4>>> {
        check_input(x.dims(), self.in_channels, self.input_multiple)?;
        Ok(self.forward(x))
    }

    pub fn nr_outputs(&self) -> usize {
        self.heads.len()
    }
}

/// A layer group of the network, in forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Input,
    Down(usize),
    Pool(usize),
    Floor,
    Upsample(usize),
    Up(usize),
    Classification,
    Output,
}

/// Channel and resolution bookkeeping for one [`Stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePlan {
    pub stage: Stage,
    pub in_channels: usize,
    pub out_channels: usize,
    /// Factor by which the stage output is smaller than the network input.
    pub downscale: usize,
}

#[derive(Config, Debug)]
pub struct UnetConfig {
    #[config(default = 3)]
    pub conv_kernel: usize,
    #[config(default = 3)]
    pub pool_kernel: usize,
    #[config(default = 2)]
    pub pool_stride: usize,
    #[config(default = 2)]
    pub repeat_blocks: usize,
    #[config(default = 8)]
    pub n_filters: usize,
    #[config(default = true)]
    pub batch_norm: bool,
    #[config(default = 0.1)]
    pub dropout: f64,
    #[config(default = 3)]
    pub in_channels: usize,
    #[config(default = 2)]
    pub out_channels: usize,
    /// Upsampling kernel size as a multiple of `pool_stride`.
    #[config(default = 3)]
    pub kernel_scale: usize,
}

impl UnetConfig {
    pub fn validate(&self) -> UnetResult<()> {
        for (name, value) in [
            ("conv_kernel", self.conv_kernel),
            ("pool_kernel", self.pool_kernel),
            ("pool_stride", self.pool_stride),
            ("n_filters", self.n_filters),
            ("in_channels", self.in_channels),
            ("out_channels", self.out_channels),
            ("kernel_scale", self.kernel_scale),
        ] {
            if value == 0 {
                return Err(UnetError::Zero(name));
            }
        }

        if self.conv_kernel % 2 == 0 {
            return Err(UnetError::EvenConvKernel(self.conv_kernel));
        }
        if self.pool_stride == 1 && self.pool_kernel % 2 == 0 {
            return Err(UnetError::PoolShrinksImage {
                stride: self.pool_stride,
                kernel: self.pool_kernel,
            });
        }
        if !(0.0..=1.0).contains(&self.dropout) {
            return Err(UnetError::InvalidDropout(self.dropout));
        }

        let kernel = self
            .kernel_scale
            .checked_mul(self.pool_stride)
            .ok_or(UnetError::Overflow("kernel_scale * pool_stride"))?;
        let pad = upsample_padding(self.pool_stride, kernel);
        if pad.output_padding >= self.pool_stride {
            return Err(UnetError::IrreversibleUpsample {
                kernel,
                stride: self.pool_stride,
                output_padding: pad.output_padding,
            });
        }

        self.checked_input_multiple()?;
        self.repeat_blocks
            .checked_add(1)
            .and_then(|depth| u32::try_from(depth).ok())
            .and_then(|depth| 2usize.checked_pow(depth))
            .and_then(|factor| self.n_filters.checked_mul(factor))
            .ok_or(UnetError::Overflow("n_filters * 2 ^ (repeat_blocks + 1)"))?;

        Ok(())
    }

    fn checked_input_multiple(&self) -> UnetResult<usize> {
        u32::try_from(self.repeat_blocks)
            .ok()
            .and_then(|depth| self.pool_stride.checked_pow(depth))
            .ok_or(UnetError::Overflow("pool_stride ^ repeat_blocks"))
    }

    /// Saturates instead of overflowing; [`UnetConfig::validate`] rejects such configs.
    pub fn upsample_kernel(&self) -> usize {
        self.kernel_scale.saturating_mul(self.pool_stride)
    }

    /// Height and width of inputs must be multiples of this value.
    pub fn input_multiple(&self) -> usize {
        self.pool_stride.saturating_pow(saturating_u32(self.repeat_blocks))
    }

    pub fn check_input_size(&self, [height, width]: [usize; 2]) -> UnetResult<()> {
        check_input(
            [1, self.in_channels, height, width],
            self.in_channels,
            self.checked_input_multiple()?,
        )
    }

    /// Every stage of the network with its channels and resolution.
    pub fn topology(&self) -> Vec<StagePlan> {
        let n = self.n_filters;
        let r = self.repeat_blocks;
        let s = self.pool_stride;
        let mut plan = Vec::new();

        plan.push(StagePlan {
            stage: Stage::Input,
            in_channels: self.in_channels,
            out_channels: n,
            downscale: 1,
        });
        for level in 0..r {
            let channels = doubled(n, level);
            let downscale = s.saturating_pow(saturating_u32(level));
            plan.push(StagePlan {
                stage: Stage::Down(level),
                in_channels: channels,
                out_channels: doubled(n, level + 1),
                downscale,
            });
            plan.push(StagePlan {
                stage: Stage::Pool(level),
                in_channels: doubled(n, level + 1),
                out_channels: doubled(n, level + 1),
                downscale: downscale.saturating_mul(s),
            });
        }
        plan.push(StagePlan {
            stage: Stage::Floor,
            in_channels: doubled(n, r),
            out_channels: doubled(n, r.saturating_add(1)),
            downscale: self.input_multiple(),
        });
        for level in (0..r).rev() {
            let downscale = s.saturating_pow(saturating_u32(level));
            plan.push(StagePlan {
                stage: Stage::Upsample(level),
                in_channels: doubled(n, level + 2),
                out_channels: doubled(n, level + 1),
                downscale,
            });
            plan.push(StagePlan {
                stage: Stage::Up(level),
                in_channels: doubled(n, level + 2),
                out_channels: doubled(n, level + 1),
                downscale,
            });
        }
        plan.push(StagePlan {
            stage: Stage::Classification,
            in_channels: doubled(n, 1),
            out_channels: n,
            downscale: 1,
        });
        plan.push(StagePlan {
            stage: Stage::Output,
            in_channels: n,
            out_channels: self.out_channels,
            downscale: 1,
        });

        plan
    }

    fn encoder_config(&self) -> UnetEncoderConfig {
        UnetEncoderConfig::new(
            self.in_channels,
            self.n_filters,
            self.repeat_blocks,
            self.conv_kernel,
            self.pool_kernel,
            self.pool_stride,
        )
        .with_use_batchnorm(self.batch_norm)
        .with_dropout(self.dropout)
    }

    fn decoder_config(&self) -> UnetDecoderConfig {
        UnetDecoderConfig::new(vec![], self.n_filters, self.conv_kernel, self.pool_stride)
            .with_kernel_scale(self.kernel_scale)
            .with_use_batchnorm(self.batch_norm)
            .with_dropout(self.dropout)
    }

    fn init_trunk<B: Backend>(
        &self,
        device: &B::Device,
    ) -> UnetResult<(UnetEncoder<B>, UnetDecoder<B>)> {
        self.validate()?;

        tracing::warn!(
            "input height and width must be divisible by {} (pool_stride ^ repeat_blocks)",
            self.input_multiple()
        );
        tracing::debug!(
            stages = ?self.topology(),
            upsample_kernel = self.upsample_kernel(),
            "building U-Net"
        );

        let encoder_config = self.encoder_config();
        let decoder_config = DecoderConfig::<B>::with_encoder_channels(
            &self.decoder_config(),
            EncoderConfig::<B>::out_channels(&encoder_config),
        );

        Ok((encoder_config.init(device), decoder_config.init(device)))
    }

    fn head_config(&self) -> SegmentationHeadConfig {
        SegmentationHeadConfig::new(self.n_filters, self.out_channels)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> UnetResult<Unet<B>> {
        let (encoder, decoder) = self.init_trunk(device)?;

        Ok(Unet {
            encoder,
            decoder,
            head: self.head_config().init(device),
            in_channels: self.in_channels,
            input_multiple: self.input_multiple(),
        })
    }

    /// Builds a network with `nr_outputs` parallel heads on a shared trunk.
    pub fn init_multitask<B: Backend>(
        &self,
        nr_outputs: usize,
        device: &B::Device,
    ) -> UnetResult<UnetMultitask<B>> {
        if nr_outputs == 0 {
            return Err(UnetError::Zero("nr_outputs"));
        }
        let (encoder, decoder) = self.init_trunk(device)?;
        let heads = (0..nr_outputs)
            .map(|_| self.head_config().init(device))
            .collect();

        Ok(UnetMultitask {
            encoder,
            decoder,
            heads,
            in_channels: self.in_channels,
            input_multiple: self.input_multiple(),
        })
    }
}
