use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};

use crate::padding::downsample_padding;

/// Stride-one convolution that keeps the spatial size, followed by an
/// optional batch norm and a ReLU.
///
/// The convolution has no bias when batch norm follows it, so the parameter
/// count is `out_channels` lower per layer than a layout that keeps the bias.
#[derive(Module, Debug)]
pub struct Conv2dReLU<B: Backend> {
    pub(crate) conv: Conv2d<B>,
    batchnorm: Option<BatchNorm<B, 2>>,
    relu: Relu,
}

impl<B: Backend> Conv2dReLU<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.conv.forward(x);

        if let Some(ref batchnorm) = self.batchnorm {
            x = batchnorm.forward(x);
        }

        self.relu.forward(x)
    }
}

#[derive(Config, Debug)]
pub struct Conv2dReLUConfig {
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    #[config(default = true)]
    use_batchnorm: bool,
}

impl Conv2dReLUConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Conv2dReLU<B> {
        let padding = downsample_padding(1, self.kernel_size, 1);
        Conv2dReLU {
            conv: Conv2dConfig::new(
                [self.in_channels, self.out_channels],
                [self.kernel_size, self.kernel_size],
            )
            .with_stride([1, 1])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_bias(!self.use_batchnorm)
            .init(device),
            batchnorm: if self.use_batchnorm {
                Some(BatchNormConfig::new(self.out_channels).init(device))
            } else {
                None
            },
            relu: Relu::new(),
        }
    }
}

#[cfg(test)]
impl<B: Backend> Conv2dReLU<B> {
    /// Replaces the convolution weight and zeroes the bias.
    pub(crate) fn with_kernel(mut self, weight: Tensor<B, 4>) -> Self {
        self.conv.weight = burn::module::Param::from_tensor(weight);
        self.conv.bias = self
            .conv
            .bias
            .map(|bias| burn::module::Param::from_tensor(bias.val().zeros_like()));
        self
    }
}
