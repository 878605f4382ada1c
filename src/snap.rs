//! Scroll-intent snap controller.
//!
//! Turns a noisy stream of scroll offsets into one of a few resting positions
//! once the user lets go: fully collapsed (`0`) or the header "reveal" position.
//! While a corrective scroll is in flight (`settling`), further gesture ends are
//! ignored so two corrections never fight each other. A new drag always wins.
//!
//! All positions are in the same units as the offsets the renderer reports.

use thiserror::Error;

/// Lower bound of the reveal band, as a fraction of viewport height.
const REVEAL_MIN: f64 = 0.05;
/// Upper bound (exclusive) of the reveal band.
const REVEAL_MAX: f64 = 0.30;
/// Scrolling up and releasing at or above this point collapses to the top.
const COLLAPSE_MAX: f64 = 0.35;
/// Rest position of the reveal snap.
const REVEAL_TARGET: f64 = 0.275;

#[derive(Debug, Error, PartialEq)]
pub enum SnapError {
    #[error("Invalid viewport height: {0}")]
    InvalidViewport(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollDirection {
    Up,
    #[default]
    Down,
}

/// How the gesture ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Finger lifted with momentum; reported once the momentum scroll stops.
    Momentum,
    /// Finger lifted without momentum.
    Drag,
}

/// Command for the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnapCommand {
    /// Animate to `offset`. The controller is settling until
    /// [`SnapEvent::CorrectionFinished`] arrives.
    Settle(f64),
    /// Scroll to `offset` and stay there; not a correction, nothing to report back.
    Hold(f64),
}

impl SnapCommand {
    pub fn offset(self) -> f64 {
        match self {
            SnapCommand::Settle(y) | SnapCommand::Hold(y) => y,
        }
    }
}

/// Input events from the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnapEvent {
    Sample(f64),
    DragStart,
    GestureEnd { offset: f64, release: Release },
    CorrectionFinished,
}

/// Pixel thresholds derived from a viewport height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapThresholds {
    pub reveal_min: f64,
    pub reveal_max: f64,
    pub collapse_max: f64,
    pub reveal_target: f64,
}

impl SnapThresholds {
    pub fn for_viewport(height: f64) -> Result<Self, SnapError> {
        if !height.is_finite() || height <= 0.0 {
            return Err(SnapError::InvalidViewport(height));
        }
        Ok(Self {
            reveal_min: REVEAL_MIN * height,
            reveal_max: REVEAL_MAX * height,
            collapse_max: COLLAPSE_MAX * height,
            reveal_target: REVEAL_TARGET * height,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SnapController {
    thresholds: SnapThresholds,
    last_offset: f64,
    direction: ScrollDirection,
    settling: bool,
}

impl SnapController {
    pub fn new(viewport_height: f64) -> Result<Self, SnapError> {
        Ok(Self {
            thresholds: SnapThresholds::for_viewport(viewport_height)?,
            last_offset: 0.0,
            direction: ScrollDirection::default(),
            settling: false,
        })
    }

    pub fn thresholds(&self) -> SnapThresholds {
        self.thresholds
    }

    pub fn direction(&self) -> ScrollDirection {
        self.direction
    }

    pub fn is_settling(&self) -> bool {
        self.settling
    }

    /// Recompute thresholds after a viewport change. Direction and guard are kept.
    pub fn resize(&mut self, viewport_height: f64) -> Result<(), SnapError> {
        self.thresholds = SnapThresholds::for_viewport(viewport_height)?;
        Ok(())
    }

    pub fn handle(&mut self, event: SnapEvent) -> Option<SnapCommand> {
        match event {
            SnapEvent::Sample(offset) => {
                self.on_sample(offset);
                None
            }
            SnapEvent::DragStart => {
                self.on_drag_start();
                None
            }
            SnapEvent::GestureEnd { offset, release } => self.on_gesture_end(offset, release),
            SnapEvent::CorrectionFinished => {
                self.on_correction_finished();
                None
            }
        }
    }

    /// Equal offsets count as `Up`.
    pub fn on_sample(&mut self, offset: f64) {
        self.direction = if offset - self.last_offset > 0.0 {
            ScrollDirection::Down
        } else {
            ScrollDirection::Up
        };
        self.last_offset = offset;
    }

    pub fn on_drag_start(&mut self) {
        if self.settling {
            tracing::debug!("Drag preempts in-flight snap");
        }
        self.settling = false;
    }

    pub fn on_correction_finished(&mut self) {
        self.settling = false;
    }

    pub fn on_gesture_end(&mut self, y: f64, release: Release) -> Option<SnapCommand> {
        if self.settling {
            tracing::trace!(y, "Gesture end ignored while settling");
            return None;
        }

        let t = self.thresholds;
        let down = self.direction == ScrollDirection::Down;

        let target = if y > t.reveal_min && y < t.reveal_max && down {
            Some(t.reveal_target)
        } else if y <= t.reveal_min && down {
            Some(0.0)
        } else if y <= t.collapse_max && !down {
            Some(0.0)
        } else {
            None
        };

        match (target, release) {
            (Some(target), _) => {
                tracing::debug!(y, target, ?release, direction = ?self.direction, "Snapping");
                self.settling = true;
                Some(SnapCommand::Settle(target))
            }
            (None, Release::Momentum) => Some(SnapCommand::Hold(y)),
            (None, Release::Drag) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: f64 = 1000.0;

    fn scrolled(direction: ScrollDirection) -> SnapController {
        let mut snap = SnapController::new(H).unwrap();
        match direction {
            ScrollDirection::Down => snap.on_sample(10.0),
            ScrollDirection::Up => {
                snap.on_sample(500.0);
                snap.on_sample(400.0);
            }
        }
        assert_eq!(snap.direction(), direction);
        snap
    }

    #[test]
    fn test_thresholds_scale_with_height() {
        let t = SnapThresholds::for_viewport(H).unwrap();
        assert_eq!(t.reveal_min, 50.0);
        assert_eq!(t.reveal_max, 300.0);
        assert_eq!(t.collapse_max, 350.0);
        assert_eq!(t.reveal_target, 275.0);
    }

    #[test]
    fn test_invalid_viewport_rejected() {
        assert_eq!(
            SnapController::new(0.0).unwrap_err(),
            SnapError::InvalidViewport(0.0)
        );
        assert!(SnapController::new(f64::NAN).is_err());
        assert!(SnapController::new(-5.0).is_err());
    }

    #[test]
    fn test_initial_direction_is_down() {
        let snap = SnapController::new(H).unwrap();
        assert_eq!(snap.direction(), ScrollDirection::Down);
        assert!(!snap.is_settling());
    }

    #[test]
    fn test_equal_samples_resolve_up() {
        let mut snap = SnapController::new(H).unwrap();
        snap.on_sample(100.0);
        snap.on_sample(100.0);
        assert_eq!(snap.direction(), ScrollDirection::Up);
    }

    #[test]
    fn test_down_in_reveal_band_snaps_to_reveal() {
        let mut snap = scrolled(ScrollDirection::Down);
        assert_eq!(
            snap.on_gesture_end(100.0, Release::Drag),
            Some(SnapCommand::Settle(275.0))
        );
        assert!(snap.is_settling());
    }

    #[test]
    fn test_reveal_band_bounds_are_exclusive() {
        let mut snap = scrolled(ScrollDirection::Down);
        // y == T1 falls to rule 2
        assert_eq!(
            snap.on_gesture_end(50.0, Release::Drag),
            Some(SnapCommand::Settle(0.0))
        );

        let mut snap = scrolled(ScrollDirection::Down);
        // y == T2 is outside the band and above T1
        assert_eq!(snap.on_gesture_end(300.0, Release::Drag), None);
    }

    #[test]
    fn test_down_near_top_snaps_to_top() {
        let mut snap = scrolled(ScrollDirection::Down);
        assert_eq!(
            snap.on_gesture_end(20.0, Release::Momentum),
            Some(SnapCommand::Settle(0.0))
        );
    }

    #[test]
    fn test_up_below_collapse_snaps_to_top() {
        let mut snap = scrolled(ScrollDirection::Up);
        assert_eq!(
            snap.on_gesture_end(350.0, Release::Drag),
            Some(SnapCommand::Settle(0.0))
        );
        assert!(snap.is_settling());
    }

    #[test]
    fn test_past_thresholds_momentum_holds_drag_does_nothing() {
        let mut snap = scrolled(ScrollDirection::Up);
        assert_eq!(
            snap.on_gesture_end(351.0, Release::Momentum),
            Some(SnapCommand::Hold(351.0))
        );
        assert!(!snap.is_settling());
        assert_eq!(snap.on_gesture_end(351.0, Release::Drag), None);
    }

    #[test]
    fn test_handle_routes_events() {
        let mut snap = SnapController::new(H).unwrap();
        assert_eq!(snap.handle(SnapEvent::Sample(120.0)), None);
        assert_eq!(
            snap.handle(SnapEvent::GestureEnd {
                offset: 120.0,
                release: Release::Drag,
            }),
            Some(SnapCommand::Settle(275.0))
        );
        assert_eq!(snap.handle(SnapEvent::CorrectionFinished), None);
        assert!(!snap.is_settling());
    }

    #[test]
    fn test_resize_updates_thresholds_keeps_guard() {
        let mut snap = scrolled(ScrollDirection::Down);
        let _ = snap.on_gesture_end(100.0, Release::Drag);
        snap.resize(2000.0).unwrap();
        assert!(snap.is_settling());
        assert_eq!(snap.thresholds().reveal_target, 550.0);
        assert!(snap.resize(0.0).is_err());
        assert_eq!(snap.thresholds().reveal_target, 550.0);
    }

    #[test]
    fn test_command_offset() {
        assert_eq!(SnapCommand::Settle(275.0).offset(), 275.0);
        assert_eq!(SnapCommand::Hold(412.5).offset(), 412.5);
    }
}
