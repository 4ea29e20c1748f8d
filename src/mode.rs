// Mode arbiter: paged query mode vs. live tail mode
//
// Exactly one mode owns the result view at a time. Every switch bumps an
// epoch; async work (search responses, tail pushes) is tagged with the epoch
// it started under and is dropped if the epoch has moved on.
//
// State Diagram:
//
//   [Paged] ──enable_live──▶ [Live]
//      ▲                        │
//      └──────disable_live──────┘
//
//   Paged → Live : invalidate in-flight searches, open tail channel
//   Live → Paged : close tail channel, re-fetch current page/filters

/// Which data source currently owns the result view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Paged,
    Live,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Paged => "paged",
            Mode::Live => "live",
        }
    }
}

/// Result of a mode switch, carrying the epoch the new mode runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeTransition {
    EnteredLive { epoch: u64 },
    EnteredPaged { epoch: u64 },
}

#[derive(Debug, Default)]
pub struct ModeArbiter {
    mode: Mode,
    epoch: u64,
}

impl ModeArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_live(&self) -> bool {
        self.mode == Mode::Live
    }

    /// Switch to live tail; `None` if already live
    pub fn enable_live(&mut self) -> Option<ModeTransition> {
        if self.mode == Mode::Live {
            return None;
        }
        self.mode = Mode::Live;
        self.epoch += 1;
        Some(ModeTransition::EnteredLive { epoch: self.epoch })
    }

    /// Switch back to paged queries; `None` if already paged
    pub fn disable_live(&mut self) -> Option<ModeTransition> {
        if self.mode == Mode::Paged {
            return None;
        }
        self.mode = Mode::Paged;
        self.epoch += 1;
        Some(ModeTransition::EnteredPaged { epoch: self.epoch })
    }

    pub fn set_live(&mut self, live: bool) -> Option<ModeTransition> {
        if live {
            self.enable_live()
        } else {
            self.disable_live()
        }
    }

    /// Whether work tagged `(mode, epoch)` still belongs to the active mode
    pub fn is_current(&self, mode: Mode, epoch: u64) -> bool {
        self.mode == mode && self.epoch == epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_mode_is_paged() {
        let arbiter = ModeArbiter::new();
        assert_eq!(arbiter.mode(), Mode::Paged);
        assert!(arbiter.is_current(Mode::Paged, 0));
    }

    #[test]
    fn test_round_trip_bumps_epoch_each_switch() {
        let mut arbiter = ModeArbiter::new();
        assert_eq!(
            arbiter.enable_live(),
            Some(ModeTransition::EnteredLive { epoch: 1 })
        );
        assert_eq!(
            arbiter.disable_live(),
            Some(ModeTransition::EnteredPaged { epoch: 2 })
        );
        assert!(!arbiter.is_current(Mode::Paged, 0));
        assert!(arbiter.is_current(Mode::Paged, 2));
    }

    #[test]
    fn test_redundant_switch_is_noop() {
        let mut arbiter = ModeArbiter::new();
        assert_eq!(arbiter.disable_live(), None);
        arbiter.enable_live();
        assert_eq!(arbiter.set_live(true), None);
        assert_eq!(arbiter.epoch(), 1);
    }

    #[test]
    fn test_stale_live_epoch_rejected() {
        let mut arbiter = ModeArbiter::new();
        arbiter.enable_live();
        arbiter.disable_live();
        arbiter.enable_live();
        assert!(!arbiter.is_current(Mode::Live, 1));
        assert!(arbiter.is_current(Mode::Live, 3));
    }
}
