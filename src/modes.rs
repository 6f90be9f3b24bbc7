//! Global operating mode, cycled by a sustained pinch.

use std::time::{Duration, Instant};

use crate::config::Thresholds;
use crate::gestures::GestureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    System,
    Media,
    Browser,
}

impl Mode {
    pub fn next(self) -> Self {
        match self {
            Mode::System => Mode::Media,
            Mode::Media => Mode::Browser,
            Mode::Browser => Mode::System,
        }
    }

    pub fn as_key(self) -> &'static str {
        match self {
            Mode::System => "system",
            Mode::Media => "media",
            Mode::Browser => "browser",
        }
    }

    pub fn from_key(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Mode::System),
            "media" => Some(Mode::Media),
            "browser" => Some(Mode::Browser),
            _ => None,
        }
    }
}

/// Cycles `System → Media → Browser → System` when a pinch is held
/// continuously for the configured duration. Any non-pinch signal clears
/// an in-progress hold; after a cycle, a short cooldown swallows pinches
/// so the next mode is not immediately skipped over.
#[derive(Debug)]
pub struct ModeManager {
    mode: Mode,
    switch_start: Option<Instant>,
    cooldown_until: Option<Instant>,
    hold: Duration,
    cooldown: Duration,
}

impl ModeManager {
    pub fn new(th: &Thresholds) -> Self {
        Self {
            mode: Mode::System,
            switch_start: None,
            cooldown_until: None,
            hold: Duration::from_secs_f32(th.mode_switch_hold_s),
            cooldown: Duration::from_secs_f32(th.mode_switch_cooldown_s),
        }
    }

    pub fn current(&self) -> Mode {
        self.mode
    }

    /// Feed this frame's gesture signal. Returns the new mode when a
    /// cycle completes on this frame.
    pub fn observe(&mut self, signal: GestureKind, now: Instant) -> Option<Mode> {
        if let Some(deadline) = self.cooldown_until {
            if now < deadline {
                return None;
            }
            self.cooldown_until = None;
        }

        if signal == GestureKind::Pinch {
            match self.switch_start {
                None => self.switch_start = Some(now),
                Some(start) => {
                    if now.saturating_duration_since(start) >= self.hold {
                        self.mode = self.mode.next();
                        self.cooldown_until = Some(now + self.cooldown);
                        self.switch_start = None;
                        return Some(self.mode);
                    }
                }
            }
        } else {
            // no partial credit across an interruption
            self.switch_start = None;
        }
        None
    }

    /// Fraction of the required hold elapsed so far, 0 when idle.
    pub fn mode_switch_progress(&self, now: Instant) -> f32 {
        match self.switch_start {
            Some(start) => {
                let elapsed = now.saturating_duration_since(start).as_secs_f32();
                (elapsed / self.hold.as_secs_f32()).clamp(0.0, 1.0)
            }
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ModeManager {
        ModeManager::new(&Thresholds::default())
    }

    fn secs(s: f32) -> Duration {
        Duration::from_secs_f32(s)
    }

    /// Hold a pinch from `start` until a cycle fires; returns the cycle time.
    fn pinch_until_cycle(m: &mut ModeManager, start: Instant) -> Instant {
        let mut now = start;
        loop {
            if m.observe(GestureKind::Pinch, now).is_some() {
                return now;
            }
            now += secs(0.1);
            assert!(now < start + secs(10.0), "cycle never fired");
        }
    }

    #[test]
    fn cycle_visits_modes_in_order() {
        let mut m = manager();
        let t0 = Instant::now();
        assert_eq!(m.current(), Mode::System);

        let t1 = pinch_until_cycle(&mut m, t0);
        assert_eq!(m.current(), Mode::Media);

        // respect the post-switch cooldown before the next hold
        let t2 = pinch_until_cycle(&mut m, t1 + secs(1.3));
        assert_eq!(m.current(), Mode::Browser);

        pinch_until_cycle(&mut m, t2 + secs(1.3));
        assert_eq!(m.current(), Mode::System);
    }

    #[test]
    fn cycle_requires_full_hold() {
        let mut m = manager();
        let t0 = Instant::now();
        assert!(m.observe(GestureKind::Pinch, t0).is_none());
        assert!(m.observe(GestureKind::Pinch, t0 + secs(2.9)).is_none());
        assert_eq!(m.current(), Mode::System);
        assert_eq!(m.observe(GestureKind::Pinch, t0 + secs(3.0)), Some(Mode::Media));
    }

    #[test]
    fn interruption_restarts_the_timer() {
        let mut m = manager();
        let t0 = Instant::now();
        m.observe(GestureKind::Pinch, t0);
        m.observe(GestureKind::Pinch, t0 + secs(2.9));
        // one frame of fist wipes the pending hold
        m.observe(GestureKind::Fist, t0 + secs(2.95));
        assert_eq!(m.mode_switch_progress(t0 + secs(2.95)), 0.0);

        // resumed pinch needs the full three seconds again
        m.observe(GestureKind::Pinch, t0 + secs(3.0));
        assert!(m.observe(GestureKind::Pinch, t0 + secs(5.9)).is_none());
        assert_eq!(m.current(), Mode::System);
        assert_eq!(m.observe(GestureKind::Pinch, t0 + secs(6.0)), Some(Mode::Media));
    }

    #[test]
    fn cooldown_swallows_pinches_after_a_cycle() {
        let mut m = manager();
        let t0 = Instant::now();
        m.observe(GestureKind::Pinch, t0);
        let t_cycle = t0 + secs(3.0);
        assert_eq!(m.observe(GestureKind::Pinch, t_cycle), Some(Mode::Media));

        // pinches inside the 1.2s cooldown neither cycle nor arm a hold
        assert!(m.observe(GestureKind::Pinch, t_cycle + secs(0.5)).is_none());
        assert_eq!(m.mode_switch_progress(t_cycle + secs(0.5)), 0.0);

        // first pinch after the cooldown starts a fresh hold
        m.observe(GestureKind::Pinch, t_cycle + secs(1.3));
        assert!(m.observe(GestureKind::Pinch, t_cycle + secs(4.2)).is_none());
        assert_eq!(
            m.observe(GestureKind::Pinch, t_cycle + secs(4.3)),
            Some(Mode::Browser)
        );
    }

    #[test]
    fn progress_reports_fraction_of_hold() {
        let mut m = manager();
        let t0 = Instant::now();
        assert_eq!(m.mode_switch_progress(t0), 0.0);
        m.observe(GestureKind::Pinch, t0);
        assert!((m.mode_switch_progress(t0 + secs(1.5)) - 0.5).abs() < 1e-3);
        assert_eq!(m.mode_switch_progress(t0 + secs(4.0)), 1.0);
    }
}
