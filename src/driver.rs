//! Panel refresh state machine
//!
//! A refresh walks `Idle → PowerOn → LoadPlanes → TriggerRefresh → WaitBusy →
//! PowerOff → Idle`. The first failing step moves the driver to
//! [`DriverState::Fault`]; every remaining step outside the power-off tail is
//! skipped, and the tail (power off, busy wait, deep sleep) still runs exactly
//! once so the charge pump is never left on. `Fault` always drains through
//! `PowerOff` back to `Idle`; the error is returned to the caller.
//!
//! The steps come from a [`PanelCommandSequence`] built from the variant's
//! static [`PanelSpec`].

use alloc::vec::Vec;
use embedded_hal::delay::DelayNs;

use crate::codec::FrameBuffer;
use crate::command::{CommandStep, PanelSpec, PanelVariant, PlaneTransfer};
use crate::error::{FaultReason, PanelError, PanelStage};
use crate::interface::DisplayInterface;

type DriverResult = core::result::Result<(), PanelError>;

/// Bytes staged per SPI write when data has to be transformed
const CHUNK: usize = 64;

/// Driver state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DriverState {
    /// Panel asleep, nothing in progress
    #[default]
    Idle,
    /// Reset, init and charge pump start
    PowerOn,
    /// Streaming planes
    LoadPlanes,
    /// Refresh command issued
    TriggerRefresh,
    /// Waiting for the refresh to finish
    WaitBusy,
    /// Charge pump shutdown and deep sleep
    PowerOff,
    /// A step failed; held until the power-off tail starts
    Fault,
}

impl From<PanelStage> for DriverState {
    fn from(stage: PanelStage) -> Self {
        match stage {
            PanelStage::PowerOn => Self::PowerOn,
            PanelStage::LoadPlanes => Self::LoadPlanes,
            PanelStage::TriggerRefresh => Self::TriggerRefresh,
            PanelStage::WaitBusy => Self::WaitBusy,
            PanelStage::PowerOff => Self::PowerOff,
        }
    }
}

/// What a sequence step does
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepAction {
    /// Hardware reset pulse
    Reset,
    /// Command byte with its payload
    Command {
        /// Command byte
        command: u8,
        /// Data sent after the command
        payload: &'static [u8],
    },
    /// Upload the frame buffer
    Planes,
    /// Wait for BUSY to clear
    WaitBusy(u32),
}

/// One step of a refresh, tagged with its stage
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SequenceStep {
    /// Stage the step belongs to
    pub stage: PanelStage,
    /// Action to perform
    pub action: StepAction,
}

/// Ordered steps of one refresh
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PanelCommandSequence {
    steps: Vec<SequenceStep>,
}

impl PanelCommandSequence {
    /// Full refresh sequence for a panel
    pub fn for_refresh(spec: &PanelSpec) -> Self {
        let mut sequence = Self { steps: Vec::new() };
        sequence.push(PanelStage::PowerOn, StepAction::Reset);
        for step in spec.init {
            sequence.push_command(PanelStage::PowerOn, step);
        }
        sequence.push_command(PanelStage::PowerOn, &spec.power_on);
        sequence.push(PanelStage::LoadPlanes, StepAction::Planes);
        sequence.push(
            PanelStage::TriggerRefresh,
            StepAction::Command {
                command: spec.refresh.command,
                payload: spec.refresh.payload,
            },
        );
        sequence.push(
            PanelStage::WaitBusy,
            StepAction::WaitBusy(spec.refresh.busy_timeout_ms),
        );
        sequence.push_tail(spec);
        sequence
    }

    /// Only the power-off tail
    pub fn power_off_tail(spec: &PanelSpec) -> Self {
        let mut sequence = Self { steps: Vec::new() };
        sequence.push_tail(spec);
        sequence
    }

    /// Steps in execution order
    pub fn steps(&self) -> &[SequenceStep] {
        &self.steps
    }

    fn push(&mut self, stage: PanelStage, action: StepAction) {
        self.steps.push(SequenceStep { stage, action });
    }

    fn push_command(&mut self, stage: PanelStage, step: &CommandStep) {
        self.push(
            stage,
            StepAction::Command {
                command: step.command,
                payload: step.payload,
            },
        );
        if step.busy_timeout_ms > 0 {
            self.push(stage, StepAction::WaitBusy(step.busy_timeout_ms));
        }
    }

    fn push_tail(&mut self, spec: &PanelSpec) {
        self.push_command(PanelStage::PowerOff, &spec.power_off);
        self.push_command(PanelStage::PowerOff, &spec.deep_sleep);
    }
}

/// Panel driver
///
/// Owns the interface and drives refreshes from the panel's command table.
pub struct PanelDriver<I>
where
    I: DisplayInterface,
{
    /// Hardware interface
    interface: I,
    /// Command table of the attached panel
    spec: &'static PanelSpec,
    /// Current state
    state: DriverState,
}

impl<I> PanelDriver<I>
where
    I: DisplayInterface,
{
    /// Create a driver for a built-in panel variant
    pub fn new(interface: I, variant: PanelVariant) -> Self {
        Self::with_spec(interface, variant.spec())
    }

    /// Create a driver for a custom command table
    pub fn with_spec(interface: I, spec: &'static PanelSpec) -> Self {
        Self {
            interface,
            spec,
            state: DriverState::Idle,
        }
    }

    /// Current state
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Command table in use
    pub fn spec(&self) -> &'static PanelSpec {
        self.spec
    }

    /// Access the interface
    pub fn interface(&self) -> &I {
        &self.interface
    }

    /// Release the interface
    pub fn release(self) -> I {
        self.interface
    }

    /// Show `frame` on the panel and put the panel back to sleep
    ///
    /// # Errors
    ///
    /// Returns the first failing stage and its reason. The power-off tail has
    /// already been issued when this returns, whatever the outcome.
    pub fn refresh<D: DelayNs>(&mut self, frame: &FrameBuffer, delay: &mut D) -> DriverResult {
        log::info!("panel {}: refresh", self.spec.variant);
        let sequence = PanelCommandSequence::for_refresh(self.spec);
        self.run(&sequence, Some(frame), delay)
    }

    /// Run only the power-off tail
    ///
    /// Used after a watchdog reset, when the panel may still be powered.
    ///
    /// # Errors
    ///
    /// Returns the first failing power-off step. Later steps still run.
    pub fn force_power_off<D: DelayNs>(&mut self, delay: &mut D) -> DriverResult {
        log::warn!("panel {}: forced power-off", self.spec.variant);
        let sequence = PanelCommandSequence::power_off_tail(self.spec);
        self.run(&sequence, None, delay)
    }

    fn run<D: DelayNs>(
        &mut self,
        sequence: &PanelCommandSequence,
        frame: Option<&FrameBuffer>,
        delay: &mut D,
    ) -> DriverResult {
        let mut first: Option<PanelError> = None;
        self.state = DriverState::Idle;

        for step in sequence.steps() {
            if first.is_some() && step.stage != PanelStage::PowerOff {
                continue;
            }
            let next = DriverState::from(step.stage);
            if next != self.state {
                log::debug!("panel: {:?} -> {:?}", self.state, next);
                self.state = next;
            }
            if let Err(reason) = self.execute(step, frame, delay) {
                let err = PanelError::new(step.stage, reason);
                if first.is_none() {
                    log::error!("panel {}: {}", self.spec.variant, err);
                    self.state = DriverState::Fault;
                    first = Some(err);
                } else {
                    log::warn!("panel {}: {} during power-off drain", self.spec.variant, err);
                }
            }
        }

        log::debug!("panel: {:?} -> {:?}", self.state, DriverState::Idle);
        self.state = DriverState::Idle;
        first.map_or(Ok(()), Err)
    }

    fn execute<D: DelayNs>(
        &mut self,
        step: &SequenceStep,
        frame: Option<&FrameBuffer>,
        delay: &mut D,
    ) -> Result<(), FaultReason> {
        match step.action {
            StepAction::Reset => self
                .interface
                .reset(delay, &self.spec.reset)
                .map_err(fault)
                .map_err(|reason| no_ack_on_power_on(step.stage, reason)),
            StepAction::Command { command, payload } => {
                self.interface.send_command(command).map_err(fault)?;
                if !payload.is_empty() {
                    self.interface.send_data(payload).map_err(fault)?;
                }
                Ok(())
            }
            StepAction::WaitBusy(timeout_ms) => self
                .interface
                .busy_wait(delay, timeout_ms)
                .map_err(fault)
                .map_err(|reason| no_ack_on_power_on(step.stage, reason)),
            StepAction::Planes => {
                let frame = frame.ok_or(FaultReason::FrameMismatch)?;
                self.load_planes(frame)
            }
        }
    }

    fn load_planes(&mut self, frame: &FrameBuffer) -> Result<(), FaultReason> {
        if frame.geometry() != &self.spec.geometry
            || frame.plane_count() != self.spec.palette.plane_count()
        {
            return Err(FaultReason::FrameMismatch);
        }

        match self.spec.transfer {
            PlaneTransfer::Planar(writes) => {
                for write in writes {
                    self.interface
                        .send_command(write.command)
                        .map_err(fault)?;
                    let plane = frame.plane(usize::from(write.plane));
                    if write.invert {
                        let mut chunk = [0u8; CHUNK];
                        for part in plane.chunks(CHUNK) {
                            for (dst, src) in chunk.iter_mut().zip(part) {
                                *dst = !src;
                            }
                            self.interface
                                .send_data(&chunk[..part.len()])
                                .map_err(fault)?;
                        }
                    } else {
                        self.interface.send_data(plane).map_err(fault)?;
                    }
                }
            }
            PlaneTransfer::Nibble { command, pad } => {
                self.interface.send_command(command).map_err(fault)?;
                let geometry = frame.geometry();
                let width = u32::from(geometry.native_width());
                let mut chunk = [0u8; CHUNK];
                let mut len = 0;
                for ny in 0..u32::from(geometry.native_height()) {
                    for nx in (0..width).step_by(2) {
                        let high = frame.native_code(nx, ny);
                        let low = if nx + 1 < width {
                            frame.native_code(nx + 1, ny)
                        } else {
                            pad
                        };
                        chunk[len] = (high << 4) | (low & 0x0F);
                        len += 1;
                        if len == CHUNK {
                            self.interface.send_data(&chunk).map_err(fault)?;
                            len = 0;
                        }
                    }
                }
                if len > 0 {
                    self.interface
                        .send_data(&chunk[..len])
                        .map_err(fault)?;
                }
            }
        }
        Ok(())
    }
}

fn fault<E: Into<FaultReason>>(err: E) -> FaultReason {
    err.into()
}

/// A controller that never releases BUSY during power-on did not acknowledge
fn no_ack_on_power_on(stage: PanelStage, reason: FaultReason) -> FaultReason {
    match (stage, reason) {
        (PanelStage::PowerOn, FaultReason::Timeout) => FaultReason::NoAck,
        _ => reason,
    }
}
