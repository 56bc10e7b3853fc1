use embedded_hal::pwm::SetDutyCycle;
use inkframe_core::gallery::Backlight;

/// Frontlight LEDs behind a PWM channel.
///
/// Duty values are raw counts at the channel resolution and are clamped to
/// the channel maximum.
pub struct Frontlight<PWM> {
    pwm: PWM,
}

impl<PWM> Frontlight<PWM>
where
    PWM: SetDutyCycle,
{
    pub fn new(pwm: PWM) -> Self {
        Self { pwm }
    }

    pub fn max_duty(&self) -> u16 {
        self.pwm.max_duty_cycle()
    }
}

impl<PWM> Backlight for Frontlight<PWM>
where
    PWM: SetDutyCycle,
{
    type Error = PWM::Error;

    fn set_level(&mut self, duty: u16) -> Result<(), Self::Error> {
        let duty = duty.min(self.pwm.max_duty_cycle());
        self.pwm.set_duty_cycle(duty)
    }
}
