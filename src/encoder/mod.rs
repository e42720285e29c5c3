mod unet;

pub use unet::*;

use burn::{
    module::Module,
    tensor::{backend::Backend, Tensor},
};

/// Encoder outputs handed to the decoder.
#[derive(Debug, Clone)]
pub struct Features<B: Backend> {
    /// Skip connections, highest resolution first.
    pub skips: Vec<Tensor<B, 4>>,
    pub bottleneck: Tensor<B, 4>,
}

pub trait Encoder: Module<Self::Backend> {
    type Backend: Backend;
    fn forward(&self, x: Tensor<Self::Backend, 4>) -> Features<Self::Backend>;
}

pub trait EncoderConfig<B: Backend> {
    type Encoder: Encoder<Backend = B>;
    fn init(&self, device: &B::Device) -> Self::Encoder;
    /// Channel count of every skip feature followed by the bottleneck.
    fn out_channels(&self) -> Vec<usize>;
}
