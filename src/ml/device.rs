// ============================================================
// Layer 5 — Device Placement
// ============================================================
// Parses the config's device identifier and moves a restored
// model onto the matching burn device. Placement is all or
// nothing: the target is probed first and every parameter is
// checked afterwards.
//
// Why probe at all?
//   GPU backends do not return an error when no adapter exists;
//   the first allocation panics instead. `check_device` turns that
//   panic into `DeviceUnavailable` so the run can abort through
//   its normal error path. It must run before anything else is
//   allocated on the device, including the model topology.
//
// Reference: Burn Book §3 (Backends and Devices)

use burn::prelude::*;
use std::panic::{self, AssertUnwindSafe};

use crate::domain::error::PredictError;

/// A parsed `device` identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSpec {
    /// Host CPU, served by the NdArray backend
    Cpu,
    /// Discrete GPU by ordinal, served by the Wgpu backend
    Gpu(usize),
}

impl DeviceSpec {
    /// Parse `cpu`, `gpu`, `cuda`, `wgpu` or `<gpu kind>:N`, case-insensitive.
    ///
    /// A bare GPU kind means ordinal 0. The CPU takes no ordinal.
    pub fn parse(id: &str) -> Result<Self, PredictError> {
        let id = id.trim().to_ascii_lowercase();
        let (kind, ordinal) = match id.split_once(':') {
            Some((kind, n)) => {
                let n = n.parse::<usize>().map_err(|_| {
                    PredictError::InvalidConfig(format!("bad device ordinal in '{id}'"))
                })?;
                (kind.to_string(), Some(n))
            }
            None => (id.clone(), None),
        };

        match (kind.as_str(), ordinal) {
            ("cpu", None)                      => Ok(DeviceSpec::Cpu),
            ("gpu" | "cuda" | "wgpu", None)    => Ok(DeviceSpec::Gpu(0)),
            ("gpu" | "cuda" | "wgpu", Some(n)) => Ok(DeviceSpec::Gpu(n)),
            _ => Err(PredictError::InvalidConfig(format!(
                "unrecognised device '{id}' (expected cpu, gpu, cuda, wgpu or gpu:N)"
            ))),
        }
    }
}

/// Verify `device` can allocate by round-tripping a one-element tensor.
pub fn check_device<B: Backend>(device: &B::Device) -> Result<(), PredictError> {
    probe_allocation(device, || {
        Tensor::<B, 1>::zeros([1], device).into_data();
    })
}

/// Run `alloc`, reporting a panic inside it as `DeviceUnavailable`
/// for `device`.
pub fn probe_allocation<D, F>(device: &D, alloc: F) -> Result<(), PredictError>
where
    D: std::fmt::Debug,
    F: FnOnce(),
{
    panic::catch_unwind(AssertUnwindSafe(alloc)).map_err(|payload| {
        PredictError::DeviceUnavailable {
            device: format!("{device:?}"),
            reason: panic_message(payload.as_ref()),
        }
    })
}

/// Move `model` onto `device`.
///
/// Fails with `DeviceUnavailable` if the device cannot allocate, or
/// if any parameter is left elsewhere after the move.
pub fn place_on_device<B, M>(model: M, device: &B::Device) -> Result<M, PredictError>
where
    B: Backend,
    M: Module<B>,
{
    check_device::<B>(device)?;

    let model = model.to_device(device);
    if let Some(stray) = model.devices().into_iter().find(|d| d != device) {
        return Err(PredictError::DeviceUnavailable {
            device: format!("{device:?}"),
            reason: format!("parameters remained on {stray:?}"),
        });
    }
    Ok(model)
}

/// Text of a caught panic payload, for error messages.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "device probe panicked".to_string())
}
