use burn::{
    nn::conv::{ConvTranspose2d, ConvTranspose2dConfig},
    prelude::*,
};

use crate::{
    block::{ConvBlock, ConvBlockConfig, DropoutPlacement},
    decoder::{Decoder, DecoderConfig},
    encoder::Features,
    padding::upsample_padding,
};

/// Upsamples by the pooling stride, joins the skip feature and mixes channels.
#[derive(Module, Debug)]
pub struct UpBlock<B: Backend> {
    up_sample: ConvTranspose2d<B>,
    up_conv: ConvBlock<B>,
}

impl<B: Backend> UpBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.up_sample.forward(x);
        let x = Tensor::cat(vec![skip, x], 1);
        self.up_conv.forward(x)
    }
}

/// Expanding path of the U-Net, ending in the classification block.
#[derive(Module, Debug)]
pub struct UnetDecoder<B: Backend> {
    /// Ordered from the highest resolution level to the deepest one.
    up_blocks: Vec<UpBlock<B>>,
    classification_block: ConvBlock<B>,
}

impl<B: Backend> Decoder for UnetDecoder<B> {
    type Backend = B;
    fn forward(&self, features: Features<B>) -> Tensor<B, 4> {
        let Features { skips, bottleneck } = features;

        let mut x = bottleneck;
        for (block, skip) in self.up_blocks.iter().rev().zip(skips.into_iter().rev()) {
            x = block.forward(x, skip);
        }

        self.classification_block.forward(x)
    }
}

#[derive(Config, Debug)]
pub struct UnetDecoderConfig {
    /// Encoder feature channels, skips first and the bottleneck last.
    encoder_channels: Vec<usize>,
    n_filters: usize,
    conv_kernel: usize,
    pool_stride: usize,
    #[config(default = 3)]
    kernel_scale: usize,
    #[config(default = true)]
    use_batchnorm: bool,
    #[config(default = 0.0)]
    dropout: f64,
}

impl UnetDecoderConfig {
    pub fn upsample_kernel(&self) -> usize {
        self.kernel_scale * self.pool_stride
    }

    fn block(&self, in_channels: usize, out_channels: usize) -> ConvBlockConfig {
        ConvBlockConfig::new(in_channels, out_channels, self.conv_kernel)
            .with_use_batchnorm(self.use_batchnorm)
            .with_dropout(self.dropout)
    }
}

impl<B: Backend> DecoderConfig<B> for UnetDecoderConfig {
    type Decoder = UnetDecoder<B>;

    fn out_channels(&self) -> usize {
        self.n_filters
    }

    fn with_encoder_channels(&self, encoder_channels: Vec<usize>) -> Self {
        let mut s = self.clone();
        s.encoder_channels = encoder_channels;
        s
    }

    fn init(&self, device: &B::Device) -> UnetDecoder<B> {
        let kernel = self.upsample_kernel();
        let stride = self.pool_stride;
        let pad = upsample_padding(stride, kernel);

        let channels = &self.encoder_channels;
        let up_blocks = channels
            .iter()
            .zip(channels.iter().skip(1))
            .map(|(&skip_ch, &in_ch)| UpBlock {
                up_sample: ConvTranspose2dConfig::new([in_ch, skip_ch], [kernel, kernel])
                    .with_stride([stride, stride])
                    .with_padding([pad.padding, pad.padding])
                    .with_padding_out([pad.output_padding, pad.output_padding])
                    .with_bias(false)
                    .init(device),
                up_conv: self.block(skip_ch * 2, skip_ch).init(device),
            })
            .collect();

        let top_channels = self.encoder_channels.first().copied().unwrap_or(self.n_filters);
        let classification_block = self
            .block(top_channels, self.n_filters)
            .with_placement(DropoutPlacement::Between)
            .init(device);

        UnetDecoder {
            up_blocks,
            classification_block,
        }
    }
}
