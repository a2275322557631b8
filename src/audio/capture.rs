//! Real audio capture using CPAL (Cross-Platform Audio Library).

use crate::audio::recorder::AudioSource;
use crate::defaults;
use crate::error::{Result, VoxrelayError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends. The messages are harmless but confusing
/// to users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2
/// (stderr). Safe as long as no other thread is concurrently manipulating
/// fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Preferred device names for GNOME/PipeWire environments.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns to filter out (not useful for voice input).
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// List all available audio input devices with filtering and recommendations.
///
/// # Returns
/// A vector of device names, with preferred devices marked with
/// "\[recommended\]". Filters out obviously unusable devices (surround
/// channels, HDMI, etc.).
///
/// # Errors
/// Returns `VoxrelayError::AudioCapture` if device enumeration fails.
pub fn list_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices();
        (host, devices)
    });
    let _ = host; // keep host alive while iterating devices
    let devices = devices.map_err(|e| VoxrelayError::AudioCapture {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut device_names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                device_names.push(format!("{} [recommended]", name));
            } else {
                device_names.push(name);
            }
        }
    }

    Ok(device_names)
}

/// Get the best default input device, preferring PipeWire/PulseAudio.
///
/// This ensures we respect the desktop's audio device selection.
///
/// # Errors
/// Returns `VoxrelayError::DeviceUnavailable` if no input device exists.
fn get_best_default_device() -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name()
                    && is_preferred_device(&name)
                {
                    return Ok(device);
                }
            }
        }

        host.default_input_device()
            .ok_or_else(|| VoxrelayError::DeviceUnavailable {
                device: "default".to_string(),
            })
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: We ensure that the stream is only accessed from a single thread
/// at a time through the Mutex wrapper in CpalAudioSource. The stream
/// methods are called synchronously and don't cross thread boundaries
/// unsafely.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Real microphone capture implementation using CPAL.
///
/// Captures 16-bit PCM at 16kHz mono as required by the recognition stream.
/// Tries the preferred format first (i16/16kHz/mono), then falls back to
/// f32 with conversion. Samples accumulate in a shared buffer filled by the
/// CPAL callback; `read_samples` drains it.
pub struct CpalAudioSource {
    device: cpal::Device,
    stream: Arc<Mutex<Option<SendableStream>>>,
    buffer: Arc<Mutex<Vec<i16>>>,
    sample_rate: u32,
}

impl CpalAudioSource {
    /// Create a new CPAL audio source.
    ///
    /// # Arguments
    /// * `device_name` - Optional device name. If None, uses the best
    ///   default input device.
    ///
    /// # Errors
    /// Returns `VoxrelayError::DeviceUnavailable` if the device does not
    /// exist or no input device is present.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let device = with_suppressed_stderr(|| {
            let host = cpal::default_host();

            if let Some(name) = device_name {
                let devices = host
                    .input_devices()
                    .map_err(|e| VoxrelayError::AudioCapture {
                        message: format!("Failed to enumerate devices: {}", e),
                    })?;

                let mut found_device = None;
                for dev in devices {
                    if let Ok(dev_name) = dev.name()
                        && dev_name == name
                    {
                        found_device = Some(dev);
                        break;
                    }
                }

                found_device.ok_or_else(|| VoxrelayError::DeviceUnavailable {
                    device: name.to_string(),
                })
            } else {
                get_best_default_device()
            }
        })?;

        Ok(Self {
            device,
            stream: Arc::new(Mutex::new(None)),
            buffer: Arc::new(Mutex::new(Vec::new())),
            sample_rate: defaults::SAMPLE_RATE,
        })
    }

    /// Build the audio stream with the configured format.
    ///
    /// Tries i16/16kHz/mono first (PipeWire/PulseAudio convert
    /// transparently), then f32/16kHz/mono with software conversion.
    fn build_stream(&self) -> Result<cpal::Stream> {
        let preferred_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            eprintln!("voxrelay: audio stream error: {}", err);
        };

        let buffer = Arc::clone(&self.buffer);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        let buffer = Arc::clone(&self.buffer);
        self.device
            .build_input_stream(
                &preferred_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend(
                            data.iter()
                                .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                        );
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| VoxrelayError::AudioCapture {
                message: format!("Failed to build input stream: {}", e),
            })
    }
}

impl AudioSource for CpalAudioSource {
    fn start(&mut self) -> Result<()> {
        let stream = self.build_stream()?;
        stream.play().map_err(|e| VoxrelayError::AudioCapture {
            message: format!("Failed to start audio stream: {}", e),
        })?;

        if let Ok(mut slot) = self.stream.lock() {
            *slot = Some(SendableStream(stream));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        // Dropping the stream stops hardware capture. Safe to call twice.
        if let Ok(mut slot) = self.stream.lock() {
            slot.take();
        }
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        match self.buffer.lock() {
            Ok(mut buf) => Ok(std::mem::take(&mut *buf)),
            Err(_) => Err(VoxrelayError::AudioCapture {
                message: "capture buffer lock poisoned".to_string(),
            }),
        }
    }

    fn is_finite(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_filter_device() {
        assert!(should_filter_device("front:CARD=PCH,DEV=0"));
        assert!(should_filter_device("HDMI Output"));
        assert!(should_filter_device("surround51:CARD=PCH"));
        assert!(!should_filter_device("pipewire"));
        assert!(!should_filter_device("USB Microphone"));
    }

    #[test]
    fn test_is_preferred_device() {
        assert!(is_preferred_device("pipewire"));
        assert!(is_preferred_device("pulse"));
        assert!(is_preferred_device("PulseAudio Sound Server"));
        assert!(!is_preferred_device("hw:CARD=PCH,DEV=0"));
    }

    #[test]
    fn test_new_with_missing_device_is_device_unavailable() {
        // Device enumeration may fail entirely on CI machines without audio;
        // either way a nonexistent name must not be found.
        match CpalAudioSource::new(Some("voxrelay-test-nonexistent-device")) {
            Err(VoxrelayError::DeviceUnavailable { device }) => {
                assert_eq!(device, "voxrelay-test-nonexistent-device");
            }
            Err(VoxrelayError::AudioCapture { .. }) => {}
            Ok(_) => panic!("nonexistent device should not resolve"),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
}
