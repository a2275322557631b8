//! Audio capture: sources, fixed-size framing, and the device seam.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod frame;
pub mod recorder;
pub mod wav;
