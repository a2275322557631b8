use crate::error::{Result, VoxrelayError};

/// Trait for audio source devices.
///
/// This trait allows swapping implementations (real audio device vs mock vs
/// WAV replay). Sources deliver samples in strict temporal order; the
/// capture loop regroups them into fixed frames.
pub trait AudioSource: Send {
    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing audio from the source. Idempotent.
    fn stop(&mut self) -> Result<()>;

    /// Read whatever samples are currently available.
    ///
    /// An empty read from a finite source means the source is exhausted;
    /// from a live source it just means nothing has arrived yet.
    fn read_samples(&mut self) -> Result<Vec<i16>>;

    /// Whether this source ends on its own (file/replay) or runs until
    /// stopped (microphone).
    fn is_finite(&self) -> bool {
        false
    }
}

/// One phase of scripted mock output: `count` reads each returning `samples`.
#[derive(Debug, Clone)]
pub struct FramePhase {
    pub samples: Vec<i16>,
    pub count: u32,
}

/// Mock audio source for testing.
#[derive(Debug, Clone)]
pub struct MockAudioSource {
    is_started: bool,
    phases: Vec<FramePhase>,
    phase_index: usize,
    reads_in_phase: u32,
    finite: bool,
    should_fail_start: bool,
    should_fail_read: bool,
    error_message: String,
    stop_count: u32,
}

impl MockAudioSource {
    /// Create a new mock audio source with no scripted output.
    pub fn new() -> Self {
        Self {
            is_started: false,
            phases: Vec::new(),
            phase_index: 0,
            reads_in_phase: 0,
            finite: true,
            should_fail_start: false,
            should_fail_read: false,
            error_message: "mock audio error".to_string(),
            stop_count: 0,
        }
    }

    /// Script a sequence of read phases.
    pub fn with_frame_sequence(mut self, phases: Vec<FramePhase>) -> Self {
        self.phases = phases;
        self
    }

    /// Treat the mock as a live source (empty reads keep the loop polling).
    pub fn as_live_source(mut self) -> Self {
        self.finite = false;
        self
    }

    /// Configure the mock to fail on start.
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the mock to fail on every read.
    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }

    /// Configure the error message for failures.
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Check if the audio source is started.
    pub fn is_started(&self) -> bool {
        self.is_started
    }

    /// How many times stop() has been called.
    pub fn stop_count(&self) -> u32 {
        self.stop_count
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            Err(VoxrelayError::DeviceUnavailable {
                device: self.error_message.clone(),
            })
        } else {
            self.is_started = true;
            Ok(())
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.stop_count += 1;
        self.is_started = false;
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if self.should_fail_read {
            return Err(VoxrelayError::AudioCapture {
                message: self.error_message.clone(),
            });
        }

        while let Some(phase) = self.phases.get(self.phase_index) {
            if self.reads_in_phase < phase.count {
                self.reads_in_phase += 1;
                return Ok(phase.samples.clone());
            }
            self.phase_index += 1;
            self.reads_in_phase = 0;
        }

        // Script exhausted
        Ok(Vec::new())
    }

    fn is_finite(&self) -> bool {
        self.finite
    }
}
