//=========================================================================
// Animation Presets
//=========================================================================
//
// Named enter/exit presets and the starting pose an element must take
// before its enter animation plays.
//
// Only the pre-animation pose lives here. Tweening between poses is the
// element's business.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fmt;
use std::str::FromStr;

//=== Constants ===========================================================

const SCALE_ENTER_FACTOR: f32 = 0.9;
const FALLBACK_SLIDE_DISTANCE: f32 = 10.0;

//=== AnimationPreset =====================================================

/// Preset an element plays when entering or leaving the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AnimationPreset {
    #[default]
    None,
    Fade,
    Scale,
    ClickPop,
    SettlePop,
    Shake,
    SlideLeft,
    SlideRight,
    SlideUp,
    SlideDown,
}

impl AnimationPreset {
    /// All presets in declaration order.
    pub const ALL: [AnimationPreset; 10] = [
        Self::None,
        Self::Fade,
        Self::Scale,
        Self::ClickPop,
        Self::SettlePop,
        Self::Shake,
        Self::SlideLeft,
        Self::SlideRight,
        Self::SlideUp,
        Self::SlideDown,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Fade => "Fade",
            Self::Scale => "Scale",
            Self::ClickPop => "ClickPop",
            Self::SettlePop => "SettlePop",
            Self::Shake => "Shake",
            Self::SlideLeft => "SlideLeft",
            Self::SlideRight => "SlideRight",
            Self::SlideUp => "SlideUp",
            Self::SlideDown => "SlideDown",
        }
    }

    /// Direction of travel for slide presets, in screen units (y up).
    fn slide_direction(self) -> Option<(f32, f32)> {
        match self {
            Self::SlideLeft => Some((-1.0, 0.0)),
            Self::SlideRight => Some((1.0, 0.0)),
            Self::SlideUp => Some((0.0, 1.0)),
            Self::SlideDown => Some((0.0, -1.0)),
            _ => None,
        }
    }

    /// Computes the pose to apply before the enter animation starts.
    ///
    /// - `Fade`: fully transparent
    /// - `Scale`: shrunk to 90% of the base scale
    /// - `Slide*`: pushed one viewport off-screen, on the side the slide
    ///   comes from (10 units when the viewport is unknown)
    /// - anything else: the base pose unchanged
    pub fn enter_start_pose(self, base: Pose, viewport: Option<Viewport>) -> Pose {
        match self {
            Self::Fade => Pose { opacity: 0.0, ..base },
            Self::Scale => Pose {
                scale: base.scale * SCALE_ENTER_FACTOR,
                ..base
            },
            _ => match self.slide_direction() {
                Some((dx, dy)) => {
                    // Start on the opposite side of travel
                    let (ox, oy) = (-dx, -dy);
                    let offset = match viewport {
                        Some(view) if ox != 0.0 && view.width > 0.0 => (ox * view.width, 0.0),
                        Some(view) if oy != 0.0 && view.height > 0.0 => (0.0, oy * view.height),
                        _ => (ox * FALLBACK_SLIDE_DISTANCE, oy * FALLBACK_SLIDE_DISTANCE),
                    };
                    Pose {
                        position: (base.position.0 + offset.0, base.position.1 + offset.1),
                        ..base
                    }
                }
                None => base,
            },
        }
    }
}

impl fmt::Display for AnimationPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for AnimationPreset {
    type Err = String;

    /// Case-insensitive; blank input means `None`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Self::None);
        }

        Self::ALL
            .iter()
            .copied()
            .find(|preset| preset.key().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| format!("unknown animation preset '{}'", trimmed))
    }
}

//=== Pose ================================================================

/// Transform and opacity of an element's animation target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: (f32, f32),
    pub scale: f32,
    pub opacity: f32,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: (0.0, 0.0),
            scale: 1.0,
            opacity: 1.0,
        }
    }
}

//=== Viewport ============================================================

/// Size of the surface the element is laid out on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

//=========================================================================
// Tests
//=========================================================================
