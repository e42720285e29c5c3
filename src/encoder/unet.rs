use burn::{
    nn::{
        pool::{MaxPool2d, MaxPool2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
};

use crate::{
    block::{ConvBlock, ConvBlockConfig},
    encoder::{Encoder, EncoderConfig, Features},
    padding::downsample_padding,
};

/// Contracting path of the U-Net.
#[derive(Module, Debug)]
pub struct UnetEncoder<B: Backend> {
    input_block: ConvBlock<B>,
    down_convs: Vec<ConvBlock<B>>,
    down_pools: Vec<MaxPool2d>,
    floor_block: ConvBlock<B>,
}

impl<B: Backend> Encoder for UnetEncoder<B> {
    type Backend = B;
    fn forward(&self, x: Tensor<B, 4>) -> Features<B> {
        let mut skips = Vec::with_capacity(self.down_convs.len());

        let mut x = self.input_block.forward(x);
        for (block, pool) in self.down_convs.iter().zip(&self.down_pools) {
            x = block.forward(x);
            skips.push(x.clone());
            x = pool.forward(x);
        }

        Features {
            skips,
            bottleneck: self.floor_block.forward(x),
        }
    }
}

#[derive(Config, Debug)]
pub struct UnetEncoderConfig {
    in_channels: usize,
    n_filters: usize,
    repeat_blocks: usize,
    conv_kernel: usize,
    pool_kernel: usize,
    pool_stride: usize,
    #[config(default = true)]
    use_batchnorm: bool,
    #[config(default = 0.0)]
    dropout: f64,
}

impl UnetEncoderConfig {
    /// Input channels of down conv `level`; the floor block sits at `repeat_blocks`.
    fn level_channels(&self, level: usize) -> usize {
        self.n_filters << level
    }

    fn block(&self, in_channels: usize, out_channels: usize) -> ConvBlockConfig {
        ConvBlockConfig::new(in_channels, out_channels, self.conv_kernel)
            .with_use_batchnorm(self.use_batchnorm)
            .with_dropout(self.dropout)
    }
}

impl<B: Backend> EncoderConfig<B> for UnetEncoderConfig {
    type Encoder = UnetEncoder<B>;

    fn init(&self, device: &B::Device) -> UnetEncoder<B> {
        let input_block = self.block(self.in_channels, self.n_filters).init(device);

        let down_convs = (0..self.repeat_blocks)
            .map(|level| {
                let channels = self.level_channels(level);
                self.block(channels, channels * 2).init(device)
            })
            .collect();

        let padding = downsample_padding(self.pool_stride, self.pool_kernel, 1);
        let down_pools = (0..self.repeat_blocks)
            .map(|_| {
                MaxPool2dConfig::new([self.pool_kernel, self.pool_kernel])
                    .with_strides([self.pool_stride, self.pool_stride])
                    .with_padding(PaddingConfig2d::Explicit(padding, padding))
                    .init()
            })
            .collect();

        let floor_channels = self.level_channels(self.repeat_blocks);
        let floor_block = self.block(floor_channels, floor_channels * 2).init(device);

        UnetEncoder {
            input_block,
            down_convs,
            down_pools,
            floor_block,
        }
    }

    fn out_channels(&self) -> Vec<usize> {
        (0..=self.repeat_blocks)
            .map(|level| self.level_channels(level) * 2)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use burn::backend::ndarray::{NdArray, NdArrayDevice};

    #[test]
    fn feature_pyramid() {
        let device = NdArrayDevice::Cpu;
        let config = UnetEncoderConfig::new(3, 4, 2, 3, 3, 2);
        assert_eq!(EncoderConfig::<NdArray>::out_channels(&config), vec![8, 16, 32]);

        let encoder: UnetEncoder<NdArray> = config.init(&device);
        let features = encoder.forward(Tensor::ones([1, 3, 16, 12], &device));
        let dims: Vec<_> = features.skips.iter().map(|f| f.dims()).collect();
        assert_eq!(dims, vec![[1, 8, 16, 12], [1, 16, 8, 6]]);
        assert_eq!(features.bottleneck.dims(), [1, 32, 4, 3]);
    }

    #[test]
    fn no_levels_only_floor() {
        let device = NdArrayDevice::Cpu;
        let encoder: UnetEncoder<NdArray> =
            UnetEncoderConfig::new(1, 2, 0, 3, 2, 2).init(&device);
        let features = encoder.forward(Tensor::ones([1, 1, 5, 5], &device));
        assert!(features.skips.is_empty());
        assert_eq!(features.bottleneck.dims(), [1, 4, 5, 5]);
    }
}
