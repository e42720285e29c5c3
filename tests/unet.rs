use burn::{
    backend::ndarray::{NdArray, NdArrayDevice},
    tensor::Tensor,
};
use unet_burn::{
    padding::{downsample_padding, upsample_padding},
    Stage, UnetConfig, UnetError,
};

type B = NdArray;

#[test]
fn deep_network_without_batchnorm() {
    let device = NdArrayDevice::Cpu;
    let config = UnetConfig::new()
        .with_repeat_blocks(3)
        .with_n_filters(2)
        .with_batch_norm(false)
        .with_dropout(0.0)
        .with_in_channels(1)
        .with_out_channels(4);
    let model = config.init::<B>(&device).unwrap();

    let x = Tensor::<B, 4>::ones([1, 1, 16, 24], &device);
    let y = model.try_forward(x).unwrap();
    assert_eq!(y.dims(), [1, 4, 16, 24]);
}

#[test]
fn stride_three_pooling() {
    let device = NdArrayDevice::Cpu;
    let config = UnetConfig::new()
        .with_pool_stride(3)
        .with_pool_kernel(2)
        .with_kernel_scale(1)
        .with_n_filters(2);
    assert_eq!(config.input_multiple(), 9);
    assert_eq!(downsample_padding(3, 2, 1), 0);
    assert_eq!(upsample_padding(3, config.upsample_kernel()).padding, 0);

    let model = config.init::<B>(&device).unwrap();
    let y = model.forward(Tensor::ones([1, 3, 9, 18], &device));
    assert_eq!(y.dims(), [1, 2, 9, 18]);
}

#[test]
fn shallow_network_skips_sampling() {
    let device = NdArrayDevice::Cpu;
    let config = UnetConfig::new().with_repeat_blocks(0).with_n_filters(2);
    assert_eq!(config.input_multiple(), 1);

    let stages: Vec<_> = config.topology().iter().map(|p| p.stage).collect();
    assert_eq!(
        stages,
        vec![Stage::Input, Stage::Floor, Stage::Classification, Stage::Output]
    );

    let model = config.init::<B>(&device).unwrap();
    let y = model.forward(Tensor::ones([1, 3, 5, 7], &device));
    assert_eq!(y.dims(), [1, 2, 5, 7]);
}

#[test]
fn multitask_shares_trunk() {
    let device = NdArrayDevice::Cpu;
    let model = UnetConfig::new()
        .with_n_filters(2)
        .init_multitask::<B>(2, &device)
        .unwrap();
    let outputs = model
        .try_forward(Tensor::ones([2, 3, 12, 4], &device))
        .unwrap();
    let dims: Vec<_> = outputs.iter().map(|t| t.dims()).collect();
    assert_eq!(dims, vec![[2, 2, 12, 4], [2, 2, 12, 4]]);
}

#[test]
fn invalid_config_fails_to_build() {
    let device = NdArrayDevice::Cpu;
    let result = UnetConfig::new().with_conv_kernel(2).init::<B>(&device);
    assert!(matches!(result, Err(UnetError::EvenConvKernel(2))));
}
