// ============================================================
// Layer 5 — 3D U-Net
// ============================================================
// Encoder / decoder over [batch, channels, depth, height, width]:
//
//   level 0:  ConvBlock(in → f)                         ──skip──┐
//   level 1:  Conv3d stride 2 → ConvBlock(f → 2f)       ──skip─┐│
//   ...                                                         ││
//   bottom:   Conv3d stride 2 → ConvBlock(→ f·2^(L-1))          ││
//   decoder:  upsample ×2, crop to skip, concat, ConvBlock  ←───┘┘
//   head:     1×1×1 Conv3d → out_channels
//
// Odd spatial sizes are fine: the stride-2 conv rounds up and the
// upsampled tensor is cropped back to the skip connection's shape.

use burn::{
    nn::{
        conv::{Conv3d, Conv3dConfig},
        PaddingConfig3d,
    },
    prelude::*,
    tensor::activation::{relu, sigmoid, softmax},
};

use crate::application::config::ModelSection;
use crate::domain::error::PredictError;

/// Architectures selectable by `model.name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    UNet3D,
    ResidualUNet3D,
}

impl ModelKind {
    pub fn from_name(name: &str) -> Result<Self, PredictError> {
        match name {
            "UNet3D"         => Ok(ModelKind::UNet3D),
            "ResidualUNet3D" => Ok(ModelKind::ResidualUNet3D),
            other => Err(PredictError::InvalidConfig(format!(
                "unknown model '{other}' (expected UNet3D or ResidualUNet3D)"
            ))),
        }
    }
}

/// Build the untrained topology described by the `model` config section.
pub fn build_model<B: Backend>(
    section: &ModelSection,
    device:  &B::Device,
) -> Result<UNet3d<B>, PredictError> {
    let kind = ModelKind::from_name(&section.name)?;
    let model = UNet3dConfig::new(section.in_channels, section.out_channels)
        .with_f_maps(section.f_maps)
        .with_num_levels(section.num_levels)
        .with_final_sigmoid(section.final_sigmoid)
        .with_residual(kind == ModelKind::ResidualUNet3D)
        .init::<B>(device);
    tracing::debug!(
        "Built {} with {} levels, f_maps={}, {} parameters",
        section.name, section.num_levels, section.f_maps, model.num_params()
    );
    Ok(model)
}

#[derive(Config, Debug)]
pub struct UNet3dConfig {
    pub in_channels:   usize,
    pub out_channels:  usize,
    #[config(default = 16)]
    pub f_maps:        usize,
    #[config(default = 3)]
    pub num_levels:    usize,
    #[config(default = true)]
    pub final_sigmoid: bool,
    #[config(default = false)]
    pub residual:      bool,
}

impl UNet3dConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> UNet3d<B> {
        let levels   = self.num_levels.max(1);
        let channels: Vec<usize> = (0..levels).map(|i| self.f_maps << i).collect();

        let mut encoders     = vec![self.block(self.in_channels, channels[0], device)];
        let mut downsamplers = Vec::with_capacity(levels - 1);
        for i in 1..levels {
            downsamplers.push(
                Conv3dConfig::new([channels[i - 1], channels[i - 1]], [3, 3, 3])
                    .with_stride([2, 2, 2])
                    .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
                    .init::<B>(device),
            );
            encoders.push(self.block(channels[i - 1], channels[i], device));
        }

        // Deepest decoder first, matching the order skips are consumed in.
        let decoders = (0..levels - 1)
            .rev()
            .map(|i| self.block(channels[i] + channels[i + 1], channels[i], device))
            .collect();

        let final_conv = Conv3dConfig::new([channels[0], self.out_channels], [1, 1, 1])
            .init::<B>(device);

        UNet3d {
            encoders,
            downsamplers,
            decoders,
            final_conv,
            in_channels:   self.in_channels,
            out_channels:  self.out_channels,
            final_sigmoid: self.final_sigmoid,
        }
    }

    fn block<B: Backend>(&self, c_in: usize, c_out: usize, device: &B::Device) -> ConvBlock<B> {
        let conv = |a: usize, b: usize| {
            Conv3dConfig::new([a, b], [3, 3, 3])
                .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
                .init::<B>(device)
        };
        let shortcut = (self.residual && c_in != c_out)
            .then(|| Conv3dConfig::new([c_in, c_out], [1, 1, 1]).init::<B>(device));
        ConvBlock {
            conv1:    conv(c_in, c_out),
            conv2:    conv(c_out, c_out),
            shortcut,
            residual: self.residual,
        }
    }
}

/// Two 3×3×3 convolutions with ReLU; the residual form adds the
/// (projected) input back before the last activation.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv1:    Conv3d<B>,
    pub conv2:    Conv3d<B>,
    pub shortcut: Option<Conv3d<B>>,
    pub residual: bool,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let y = self.conv2.forward(relu(self.conv1.forward(x.clone())));
        if !self.residual {
            return relu(y);
        }
        let identity = match &self.shortcut {
            Some(proj) => proj.forward(x),
            None       => x,
        };
        relu(y + identity)
    }
}

#[derive(Module, Debug)]
pub struct UNet3d<B: Backend> {
    pub encoders:      Vec<ConvBlock<B>>,
    pub downsamplers:  Vec<Conv3d<B>>,
    pub decoders:      Vec<ConvBlock<B>>,
    pub final_conv:    Conv3d<B>,
    pub in_channels:   usize,
    pub out_channels:  usize,
    pub final_sigmoid: bool,
}

impl<B: Backend> UNet3d<B> {
    /// input: [batch, in_channels, d, h, w] → logits [batch, out_channels, d, h, w]
    pub fn forward(&self, input: Tensor<B, 5>) -> Tensor<B, 5> {
        let mut skips = Vec::with_capacity(self.downsamplers.len());
        let mut x     = input;

        for (i, encoder) in self.encoders.iter().enumerate() {
            if i > 0 {
                skips.push(x.clone());
                x = self.downsamplers[i - 1].forward(x);
            }
            x = encoder.forward(x);
        }

        for (decoder, skip) in self.decoders.iter().zip(skips.into_iter().rev()) {
            let [_, _, d, h, w] = skip.dims();
            let up = upsample_nearest(x, [d, h, w]);
            x = decoder.forward(Tensor::cat(vec![skip, up], 1));
        }

        self.final_conv.forward(x)
    }

    /// Forward pass followed by the final activation: per-channel
    /// sigmoid, or softmax across channels.
    pub fn predict(&self, input: Tensor<B, 5>) -> Tensor<B, 5> {
        let logits = self.forward(input);
        if self.final_sigmoid {
            sigmoid(logits)
        } else {
            softmax(logits, 1)
        }
    }

    pub fn in_channels(&self) -> usize  { self.in_channels }
    pub fn out_channels(&self) -> usize { self.out_channels }

    /// Device the model's parameters live on.
    pub fn device(&self) -> B::Device {
        self.final_conv.weight.val().device()
    }
}

/// Nearest-neighbour ×2 along the three spatial axes, cropped to `target`.
fn upsample_nearest<B: Backend>(x: Tensor<B, 5>, target: [usize; 3]) -> Tensor<B, 5> {
    let mut x = x;
    for axis in 2..5 {
        let mut dims = x.dims();
        dims[axis] *= 2;
        let repeated = x.unsqueeze_dim::<6>(axis + 1).repeat_dim(axis + 1, 2);
        x = repeated.reshape(dims);
    }
    let [b, c, _, _, _] = x.dims();
    x.slice([0..b, 0..c, 0..target[0], 0..target[1], 0..target[2]])
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{ndarray::NdArrayDevice, NdArray};

    type TestBackend = NdArray;

    fn tiny(residual: bool) -> UNet3d<TestBackend> {
        UNet3dConfig::new(1, 3)
            .with_f_maps(2)
            .with_num_levels(2)
            .with_residual(residual)
            .init::<TestBackend>(&NdArrayDevice::Cpu)
    }

    #[test]
    fn test_output_keeps_spatial_shape() {
        let model = tiny(false);
        let input = Tensor::<TestBackend, 5>::ones([2, 1, 4, 6, 8], &NdArrayDevice::Cpu);
        assert_eq!(model.forward(input).dims(), [2, 3, 4, 6, 8]);
    }

    #[test]
    fn test_odd_sizes_are_cropped_back() {
        let model = tiny(true);
        let input = Tensor::<TestBackend, 5>::zeros([1, 1, 3, 5, 7], &NdArrayDevice::Cpu);
        assert_eq!(model.predict(input).dims(), [1, 3, 3, 5, 7]);
    }

    #[test]
    fn test_softmax_head_sums_to_one() {
        let model = UNet3dConfig::new(1, 2)
            .with_f_maps(2)
            .with_num_levels(1)
            .with_final_sigmoid(false)
            .init::<TestBackend>(&NdArrayDevice::Cpu);
        let input = Tensor::<TestBackend, 5>::ones([1, 1, 2, 2, 2], &NdArrayDevice::Cpu);
        let sums  = model.predict(input).sum_dim(1).into_data().to_vec::<f32>().unwrap();
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_upsample_repeats_each_voxel() {
        let device = NdArrayDevice::Cpu;
        let x = Tensor::<TestBackend, 5>::from_data(
            TensorData::new(vec![1.0f32, 2.0], [1, 1, 1, 1, 2]),
            &device,
        );
        let up = upsample_nearest(x, [2, 2, 3]).into_data().to_vec::<f32>().unwrap();
        assert_eq!(up, vec![1.0, 1.0, 2.0, 1.0, 1.0, 2.0, 1.0, 1.0, 2.0, 1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_residual_adds_projection_only_when_widths_differ() {
        let model = tiny(true);
        assert!(model.encoders[0].shortcut.is_some());
        assert!(model.decoders[0].shortcut.is_some());
        assert!(tiny(false).encoders.iter().all(|e| e.shortcut.is_none()));
    }

    #[test]
    fn test_unknown_model_name() {
        assert!(ModelKind::from_name("VNet").is_err());
        assert_eq!(ModelKind::from_name("ResidualUNet3D").unwrap(), ModelKind::ResidualUNet3D);
    }
}
