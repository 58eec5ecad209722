// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// One command: `volseg --config <PATH>`. Everything about the
// run lives in the YAML file; this layer only picks the burn
// backend matching the configured device and hands off to
// Layer 2.
//
//   device: cpu                → NdArray backend
//   device: gpu | cuda | wgpu  → Wgpu backend, discrete GPU 0
//   device: gpu:N              → Wgpu backend, discrete GPU N
//
// Reference: Rust Book §12 (Building a CLI Program)

use anyhow::Result;
use burn::backend::{
    ndarray::NdArrayDevice,
    wgpu::WgpuDevice,
    NdArray, Wgpu,
};
use burn::prelude::Backend;
use clap::Parser;
use std::path::PathBuf;

use crate::application::{
    config::Config,
    predict_use_case::{PredictUseCase, RunSummary},
};
use crate::ml::device::DeviceSpec;

#[derive(Parser, Debug)]
#[command(
    name = "volseg",
    version,
    about = "Restore a trained 3D segmentation network and predict every configured volume."
)]
pub struct Cli {
    /// YAML run configuration
    #[arg(long)]
    pub config: PathBuf,
}

impl Cli {
    /// Load the config, run the prediction job on the matching
    /// backend and print one output path per processed volume.
    pub fn run(self) -> Result<()> {
        let config = Config::load(&self.config)?;
        tracing::info!("Loaded config from '{}'", self.config.display());

        let summary = match DeviceSpec::parse(&config.device)? {
            DeviceSpec::Cpu        => predict::<NdArray>(&config, NdArrayDevice::Cpu)?,
            DeviceSpec::Gpu(index) => predict::<Wgpu>(&config, WgpuDevice::DiscreteGpu(index))?,
        };

        for output in &summary.outputs {
            println!("{}", output.display());
        }
        Ok(())
    }
}

/// Monomorphised per backend; everything below is backend-generic.
fn predict<B: Backend>(config: &Config, device: B::Device) -> Result<RunSummary> {
    let mut use_case = PredictUseCase::<B>::new(config, device);
    Ok(use_case.run()?)
}
