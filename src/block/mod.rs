mod conv2drelu;
mod conv_block;

pub use conv2drelu::*;
pub use conv_block::*;
