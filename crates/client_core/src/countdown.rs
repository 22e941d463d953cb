use std::time::Duration;

pub const COUNTDOWN_START: u32 = 5;
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);
pub const FLASH_DURATION: Duration = Duration::from_millis(500);

/// Display-side countdown: `Inactive -> Counting(5..1) -> Flashing -> Inactive`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Countdown {
    #[default]
    Inactive,
    Counting(u32),
    Flashing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStep {
    /// New visible value, to be reported to the relay.
    Tick(u32),
    /// Reached zero; the flash has started.
    Flash,
    Ignored,
}

impl Countdown {
    /// Returns `false` when a countdown is already running.
    pub fn start(&mut self) -> bool {
        if self.is_active() {
            return false;
        }
        *self = Self::Counting(COUNTDOWN_START);
        true
    }

    pub fn tick(&mut self) -> CountdownStep {
        let Self::Counting(count) = *self else {
            return CountdownStep::Ignored;
        };
        match count.saturating_sub(1) {
            0 => {
                *self = Self::Flashing;
                CountdownStep::Flash
            }
            next => {
                *self = Self::Counting(next);
                CountdownStep::Tick(next)
            }
        }
    }

    pub fn finish_flash(&mut self) -> bool {
        if *self != Self::Flashing {
            return false;
        }
        *self = Self::Inactive;
        true
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Inactive)
    }

    pub fn visible_count(&self) -> Option<u32> {
        match self {
            Self::Counting(count) => Some(*count),
            _ => None,
        }
    }
}
