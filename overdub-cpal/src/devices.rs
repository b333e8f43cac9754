//! Input device enumeration via the default cpal host.
//!
//! cpal exposes no stable device ids, so a device's name doubles as
//! its id. cpal streams are always raw: the disabled-processing
//! constraints (echo cancellation, noise suppression, auto gain)
//! hold inherently.

use cpal::traits::{DeviceTrait, HostTrait};

use overdub_core::{
    EngineError, HostCapabilities, InputDevice, InputDeviceProvider, InputStream,
    StreamConstraints,
};

use crate::input::CpalInputStream;
use crate::HostError;

/// Buffer sizes at or below this qualify the host for the
/// low-latency capture strategy.
const LOW_LATENCY_FRAMES: u32 = 256;

/// Input subsystem of the default cpal host.
#[derive(Debug, Default)]
pub struct CpalDeviceProvider;

impl CpalDeviceProvider {
    pub fn new() -> Self {
        Self
    }
}

impl InputDeviceProvider for CpalDeviceProvider {
    fn list_devices(&self) -> Result<Vec<InputDevice>, EngineError> {
        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());

        let mut devices = Vec::new();
        let iter = host
            .input_devices()
            .map_err(|e| HostError::Enumeration(e.to_string()))?;
        for device in iter {
            // Devices that refuse to report a name are unaddressable.
            let Ok(name) = device.name() else { continue };
            devices.push(InputDevice {
                id: name.clone(),
                is_default: Some(&name) == default_name.as_ref(),
                name,
            });
        }
        Ok(devices)
    }

    fn acquire(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn InputStream>, EngineError> {
        let device = resolve_input_device(constraints.device_id.as_deref())?;
        let (sample_rate, channels) = negotiate_input_format(&device, constraints)?;
        log::info!(
            "acquired input stream: {} Hz, {} ch",
            sample_rate,
            channels
        );
        Ok(Box::new(CpalInputStream::new(
            constraints.device_id.clone(),
            sample_rate,
            channels,
        )))
    }

    fn capabilities(&self) -> HostCapabilities {
        let low_latency = cpal::default_host()
            .default_input_device()
            .and_then(|d| d.default_input_config().ok())
            .map(|config| match config.buffer_size() {
                cpal::SupportedBufferSize::Range { min, .. } => *min <= LOW_LATENCY_FRAMES,
                cpal::SupportedBufferSize::Unknown => false,
            })
            .unwrap_or(false);
        HostCapabilities {
            low_latency_processing: low_latency,
        }
    }
}

/// Find the device for an id, or the host default when `None`.
pub(crate) fn resolve_input_device(id: Option<&str>) -> Result<cpal::Device, EngineError> {
    let host = cpal::default_host();
    match id {
        None => host
            .default_input_device()
            .ok_or_else(|| HostError::NoDefaultDevice("input").into()),
        Some(id) => {
            let devices = host
                .input_devices()
                .map_err(|e| EngineError::from(HostError::Enumeration(e.to_string())))?;
            for device in devices {
                if device.name().map(|n| n == id).unwrap_or(false) {
                    return Ok(device);
                }
            }
            Err(EngineError::DeviceNotFound(id.into()))
        }
    }
}

/// Keep the requested rate and channel count when the device
/// supports them, otherwise fall back to the device default. The
/// core remaps channel mismatches downstream.
fn negotiate_input_format(
    device: &cpal::Device,
    constraints: &StreamConstraints,
) -> Result<(u32, u16), EngineError> {
    let requested = cpal::SampleRate(constraints.sample_rate);
    if let Ok(ranges) = device.supported_input_configs() {
        for range in ranges {
            if range.channels() == constraints.channel_count
                && range.min_sample_rate() <= requested
                && requested <= range.max_sample_rate()
            {
                return Ok((constraints.sample_rate, constraints.channel_count));
            }
        }
    }
    let fallback = device
        .default_input_config()
        .map_err(|e| EngineError::from(HostError::Enumeration(e.to_string())))?;
    log::info!(
        "requested format unsupported, using device default: {} Hz, {} ch",
        fallback.sample_rate().0,
        fallback.channels()
    );
    Ok((fallback.sample_rate().0, fallback.channels()))
}
