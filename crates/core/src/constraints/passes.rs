use super::ConstraintSettings;
use crate::color::{Channel, ColorFrame, PALETTE_SIZE};

/// Extra lightness margin added when a color is pushed away from the
/// background, so the clamped distance is not lost to rounding.
pub const CONTRAST_EPSILON: f32 = 1e-4;

/// Caps background lightness and foreground saturation.
pub fn apply_caps(frame: &mut ColorFrame, settings: &ConstraintSettings) {
    let bg = frame.background;
    if bg.lightness > settings.max_background_lightness {
        frame.background = bg.with_lightness(settings.max_background_lightness);
    }
    let fg = frame.foreground;
    if fg.saturation > settings.max_foreground_saturation {
        frame.foreground = fg.with_saturation(settings.max_foreground_saturation);
    }
}

/// Resets every protected palette entry to its baseline.
pub fn anchor_protected(
    frame: &mut ColorFrame,
    baseline: &ColorFrame,
    protected: &[bool; PALETTE_SIZE],
) {
    for (i, _) in protected.iter().enumerate().filter(|(_, &p)| p) {
        frame.palette[i] = baseline.palette[i];
    }
}

/// Pushes the foreground and unprotected palette entries at least
/// `min_contrast` lightness away from this frame's background.
///
/// The preferred side is the side the channel's baseline sits on relative to
/// the baseline background. If that side has no room, the other side is used.
pub fn enforce_contrast(
    frame: &mut ColorFrame,
    baseline: &ColorFrame,
    min_contrast: f32,
    protected: &[bool; PALETTE_SIZE],
) {
    let bg = frame.background.lightness;
    for channel in Channel::all() {
        match channel {
            Channel::Background => continue,
            Channel::Palette(i) if protected[i as usize] => continue,
            _ => {}
        }
        let color = frame.get(channel);
        if (color.lightness - bg).abs() >= min_contrast {
            continue;
        }
        let lighter = baseline.get(channel).lightness >= baseline.background.lightness;
        frame.set(
            channel,
            color.with_lightness(contrast_lightness(bg, min_contrast, lighter)),
        );
    }
}

fn contrast_lightness(background: f32, min_contrast: f32, prefer_lighter: bool) -> f32 {
    let gap = min_contrast + CONTRAST_EPSILON;
    let up = background + gap;
    let down = background - gap;
    let (up_fits, down_fits) = (up <= 1.0, down >= 0.0);
    match (prefer_lighter, up_fits, down_fits) {
        (true, true, _) | (false, true, false) => up,
        (false, _, true) | (true, false, true) => down,
        _ if background < 0.5 => 1.0,
        _ => 0.0,
    }
}

/// Nudges palette lightness so entries keep their baseline lightness order.
///
/// Best effort: an entry is only raised when the raised value still clears
/// the contrast minimum, and protected entries are never touched. Returns the
/// number of entries left out of order.
pub fn preserve_order(
    frame: &mut ColorFrame,
    baseline: &ColorFrame,
    min_contrast: f32,
    protected: &[bool; PALETTE_SIZE],
) -> usize {
    let mut order: Vec<usize> = (0..PALETTE_SIZE).collect();
    order.sort_by(|&a, &b| {
        baseline.palette[a]
            .lightness
            .total_cmp(&baseline.palette[b].lightness)
    });

    let bg = frame.background.lightness;
    let mut floor = f32::NEG_INFINITY;
    let mut group_max = f32::NEG_INFINITY;
    let mut group_base = f32::NEG_INFINITY;
    let mut unresolved = 0;

    for i in order {
        // Entries with equal baseline lightness impose no order on each other.
        let base = baseline.palette[i].lightness;
        if base > group_base {
            floor = floor.max(group_max);
            group_max = f32::NEG_INFINITY;
            group_base = base;
        }

        let current = frame.palette[i].lightness;
        if current < floor {
            if !protected[i] && (floor - bg).abs() >= min_contrast {
                frame.palette[i] = frame.palette[i].with_lightness(floor);
            } else {
                unresolved += 1;
            }
        }
        group_max = group_max.max(frame.palette[i].lightness);
    }
    unresolved
}

/// Share of the way back to baseline after `idle_seconds` of silence.
pub fn idle_weight(idle_seconds: f32, silence_seconds: f32, blend_seconds: f32) -> f32 {
    if idle_seconds <= silence_seconds {
        return 0.0;
    }
    if blend_seconds <= 0.0 {
        return 1.0;
    }
    ((idle_seconds - silence_seconds) / blend_seconds).clamp(0.0, 1.0)
}

/// Hysteresis state for adaptive protection.
#[derive(Debug, Clone, Default)]
pub struct AdaptiveProtector {
    active: [bool; PALETTE_SIZE],
}

impl AdaptiveProtector {
    pub fn update(
        &mut self,
        baseline: &ColorFrame,
        background: crate::color::Color,
        enter: f32,
        exit: f32,
    ) -> [bool; PALETTE_SIZE] {
        for (i, active) in self.active.iter_mut().enumerate() {
            let distance = (baseline.palette[i].lightness - background.lightness).abs();
            if distance < enter {
                *active = true;
            } else if distance > exit {
                *active = false;
            }
        }
        self.active
    }

    pub fn mask(&self) -> [bool; PALETTE_SIZE] {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;

    fn frame(bg_lightness: f32) -> ColorFrame {
        let mut frame = ColorFrame::splat(Color::new(30.0, 0.5, 0.5));
        frame.background = Color::new(0.0, 0.0, bg_lightness);
        frame
    }

    #[test]
    fn contrast_pushes_away_on_the_baseline_side() {
        let baseline = frame(0.1);
        let mut proposed = frame(0.1);
        proposed.foreground = Color::new(0.0, 0.0, 0.15);
        proposed.palette[3] = Color::new(0.0, 0.5, 0.05);
        enforce_contrast(&mut proposed, &baseline, 0.22, &[false; PALETTE_SIZE]);
        assert!((proposed.foreground.lightness - 0.3201).abs() < 1e-5);
        assert!(proposed.palette[3].lightness >= 0.32);
    }

    #[test]
    fn contrast_flips_side_when_there_is_no_room() {
        let mut baseline = frame(0.1);
        baseline.foreground = Color::new(0.0, 0.0, 0.02);
        let mut proposed = frame(0.1);
        proposed.foreground = Color::new(0.0, 0.0, 0.05);
        enforce_contrast(&mut proposed, &baseline, 0.22, &[false; PALETTE_SIZE]);
        assert!(proposed.foreground.lightness >= 0.32);
    }

    #[test]
    fn protected_entries_skip_contrast() {
        let baseline = frame(0.1);
        let mut proposed = frame(0.1);
        proposed.palette[0] = Color::new(0.0, 0.0, 0.0);
        let mut mask = [false; PALETTE_SIZE];
        mask[0] = true;
        anchor_protected(&mut proposed, &baseline, &mask);
        enforce_contrast(&mut proposed, &baseline, 0.22, &mask);
        assert_eq!(proposed.palette[0], baseline.palette[0]);
    }

    #[test]
    fn order_is_restored_when_contrast_allows() {
        let mut baseline = frame(0.1);
        baseline.palette[1] = Color::new(0.0, 0.5, 0.4);
        baseline.palette[2] = Color::new(0.0, 0.5, 0.6);
        let mut proposed = baseline;
        proposed.palette[1] = Color::new(0.0, 0.5, 0.7);
        proposed.palette[2] = Color::new(0.0, 0.5, 0.45);
        let left = preserve_order(&mut proposed, &baseline, 0.22, &[false; PALETTE_SIZE]);
        assert_eq!(left, 0);
        assert!(proposed.palette[2].lightness >= proposed.palette[1].lightness);
    }

    #[test]
    fn idle_weight_ramps_after_silence() {
        assert_eq!(idle_weight(0.5, 0.6, 1.0), 0.0);
        assert!((idle_weight(1.1, 0.6, 1.0) - 0.5).abs() < 1e-6);
        assert_eq!(idle_weight(3.0, 0.6, 1.0), 1.0);
        assert_eq!(idle_weight(0.7, 0.6, 0.0), 1.0);
    }

    #[test]
    fn adaptive_protection_has_hysteresis() {
        let mut baseline = frame(0.1);
        baseline.palette[0] = Color::new(0.0, 0.0, 0.12);
        let mut protector = AdaptiveProtector::default();

        let bg = |l: f32| Color::new(0.0, 0.0, l);
        assert!(protector.update(&baseline, bg(0.10), 0.05, 0.10)[0]);
        // Between enter and exit: keeps its state.
        assert!(protector.update(&baseline, bg(0.04), 0.05, 0.10)[0]);
        assert!(!protector.update(&baseline, bg(0.0), 0.05, 0.10)[0]);
        assert!(!protector.update(&baseline, bg(0.04), 0.05, 0.10)[0]);
    }
}
