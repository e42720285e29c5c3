use burn::{
    nn::{Dropout, DropoutConfig},
    prelude::*,
};

use super::conv2drelu::{Conv2dReLU, Conv2dReLUConfig};

/// Where the dropout layer sits inside a [`ConvBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DropoutPlacement {
    /// conv, conv, dropout
    After,
    /// conv, dropout, conv
    Between,
}

/// Two [`Conv2dReLU`] stages with a dropout layer.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub(crate) conv1: Conv2dReLU<B>,
    pub(crate) conv2: Conv2dReLU<B>,
    dropout: Dropout,
    dropout_between: bool,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv1.forward(x);
        if self.dropout_between {
            let x = self.dropout.forward(x);
            self.conv2.forward(x)
        } else {
            let x = self.conv2.forward(x);
            self.dropout.forward(x)
        }
    }
}

#[derive(Config, Debug)]
pub struct ConvBlockConfig {
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    #[config(default = true)]
    use_batchnorm: bool,
    #[config(default = 0.0)]
    dropout: f64,
    #[config(default = "DropoutPlacement::After")]
    placement: DropoutPlacement,
}

impl ConvBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvBlock<B> {
        ConvBlock {
            conv1: Conv2dReLUConfig::new(self.in_channels, self.out_channels, self.kernel_size)
                .with_use_batchnorm(self.use_batchnorm)
                .init(device),
            conv2: Conv2dReLUConfig::new(self.out_channels, self.out_channels, self.kernel_size)
                .with_use_batchnorm(self.use_batchnorm)
                .init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            dropout_between: self.placement == DropoutPlacement::Between,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use burn::backend::{
        ndarray::{NdArray, NdArrayDevice},
        Autodiff,
    };
    use burn::tensor::ElementConversion;

    #[test]
    fn keeps_spatial_size() {
        let device = NdArrayDevice::Cpu;
        for kernel_size in [1, 3, 5] {
            let block: ConvBlock<NdArray> = ConvBlockConfig::new(3, 6, kernel_size)
                .with_dropout(0.1)
                .init(&device);
            let x = Tensor::<NdArray, 4>::ones([2, 3, 7, 5], &device);
            assert_eq!(block.forward(x).dims(), [2, 6, 7, 5]);
        }
    }

    #[test]
    fn dropout_between_without_batchnorm() {
        let device = NdArrayDevice::Cpu;
        let block: ConvBlock<NdArray> = ConvBlockConfig::new(4, 2, 3)
            .with_use_batchnorm(false)
            .with_placement(DropoutPlacement::Between)
            .init(&device);
        let x = Tensor::<NdArray, 4>::zeros([1, 4, 4, 4], &device);
        let y = block.forward(x);
        assert_eq!(y.dims(), [1, 2, 4, 4]);
        // relu output is never negative
        let min: f32 = y.min().into_scalar();
        assert!(min >= 0.0);
    }

    #[test]
    fn batchnorm_replaces_conv_bias() {
        let device = NdArrayDevice::Cpu;
        let with_bn: ConvBlock<NdArray> = ConvBlockConfig::new(1, 2, 3).init(&device);
        let without_bn: ConvBlock<NdArray> = ConvBlockConfig::new(1, 2, 3)
            .with_use_batchnorm(false)
            .init(&device);
        // conv weights: 1*2*9 + 2*2*9 = 54
        assert_eq!(without_bn.num_params(), 54 + 2 + 2);
        // gamma, beta, running mean and running variance per batch norm
        assert_eq!(with_bn.num_params(), 54 + 8 + 8);
    }

    fn count_zeros<B: Backend>(x: Tensor<B, 4>) -> i64 {
        x.equal_elem(0.0).int().sum().into_scalar().elem::<i64>()
    }

    /// Training-mode block with all-ones kernels, so every activation before
    /// dropout is strictly positive.
    fn positive_block<B: Backend>(
        placement: DropoutPlacement,
        device: &B::Device,
    ) -> ConvBlock<B> {
        let block: ConvBlock<B> = ConvBlockConfig::new(4, 4, 3)
            .with_use_batchnorm(false)
            .with_dropout(0.5)
            .with_placement(placement)
            .init(device);
        let ones = |shape: [usize; 4]| Tensor::<B, 4>::ones(shape, device);
        ConvBlock {
            conv1: block.conv1.with_kernel(ones([4, 4, 3, 3])),
            conv2: block.conv2.with_kernel(ones([4, 4, 3, 3])),
            ..block
        }
    }

    #[test]
    fn dropout_placement() {
        type B = Autodiff<NdArray>;
        let device = NdArrayDevice::Cpu;
        B::seed(7);
        let x = Tensor::<B, 4>::ones([1, 4, 8, 8], &device);

        // dropout on the output leaves exact zeros behind
        let after = positive_block::<B>(DropoutPlacement::After, &device).forward(x.clone());
        let zeros = count_zeros(after);
        assert!(zeros > 0 && zeros < 4 * 8 * 8, "zeros = {zeros}");

        // the second convolution sums over surviving inputs, which stay positive
        let between = positive_block::<B>(DropoutPlacement::Between, &device).forward(x);
        assert_eq!(count_zeros(between), 0);
    }
}
