mod unet;

pub use unet::*;

use burn::tensor::{backend::Backend, Tensor};

use crate::encoder::Features;

pub trait Decoder {
    type Backend: Backend;
    fn forward(&self, features: Features<Self::Backend>) -> Tensor<Self::Backend, 4>;
}

pub trait DecoderConfig<B: Backend> {
    type Decoder: Decoder<Backend = B>;
    fn init(&self, device: &B::Device) -> Self::Decoder;
    fn out_channels(&self) -> usize;
    fn with_encoder_channels(&self, encoder_channels: Vec<usize>) -> Self;
}
