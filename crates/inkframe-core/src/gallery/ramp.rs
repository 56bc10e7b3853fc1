/// Stepped frontlight duty ramp.
///
/// Levels start at `floor` and climb by `step` while they stay below
/// `ceiling`. The ramp down walks the same levels backwards.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BacklightRamp {
    floor: u16,
    ceiling: u16,
    step: u16,
}

impl BacklightRamp {
    pub const fn new(floor: u16, ceiling: u16, step: u16) -> Self {
        Self {
            floor,
            ceiling,
            step: if step == 0 { 1 } else { step },
        }
    }

    /// Number of levels in one direction.
    pub const fn steps(&self) -> u16 {
        if self.ceiling <= self.floor {
            return 1;
        }
        (self.ceiling - self.floor).div_ceil(self.step)
    }

    /// Duty for ramp-up step `index`.
    pub fn level(&self, index: u16) -> u16 {
        let level = self.floor as u32 + index as u32 * self.step as u32;
        level.min(self.ceiling as u32) as u16
    }

    /// Duty for ramp-down step `index`.
    pub fn level_down(&self, index: u16) -> u16 {
        self.level(self.steps().saturating_sub(1).saturating_sub(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_frontlight_ramp_has_32_levels() {
        let ramp = BacklightRamp::new(100, 8000, 250);

        assert_eq!(ramp.steps(), 32);
        assert_eq!(ramp.level(0), 100);
        assert_eq!(ramp.level(31), 7850);
        assert_eq!(ramp.level_down(0), 7850);
        assert_eq!(ramp.level_down(31), 100);
    }

    #[test]
    fn degenerate_ramp_has_one_level() {
        let ramp = BacklightRamp::new(500, 500, 0);

        assert_eq!(ramp.steps(), 1);
        assert_eq!(ramp.level(0), 500);
        assert_eq!(ramp.level(7), 500);
    }
}
