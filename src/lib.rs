//! Configurable U-Net for dense prediction on top of [burn].
//!
//! [`UnetConfig`] derives every layer from a handful of hyperparameters and keeps
//! spatial sizes reversible between the pooling and upsampling paths, see
//! [`padding`].

pub mod block;
pub mod decoder;
pub mod encoder;
pub mod padding;
pub mod segmentation_head;

mod error;
pub use error::*;

mod model;
pub use model::*;
