//! RGB status LED driver.
//!
//! Three LEDC PWM channels (CH0-2) drive a common-cathode RGB LED.
//! On host targets the colour is tracked in memory only.

use crate::drivers::hw_init;
use crate::drivers::led_patterns::Rgb;

#[derive(Debug, Default)]
pub struct StatusLed {
    current: Rgb,
}

impl StatusLed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the colour only when it changed.
    pub fn set_colour(&mut self, colour: Rgb) {
        if colour == self.current {
            return;
        }
        let (r, g, b) = colour;
        hw_init::ledc_set(hw_init::LEDC_CH_LED_R, r);
        hw_init::ledc_set(hw_init::LEDC_CH_LED_G, g);
        hw_init::ledc_set(hw_init::LEDC_CH_LED_B, b);
        self.current = colour;
    }

    pub fn off(&mut self) {
        self.set_colour((0, 0, 0));
    }

    pub fn current_colour(&self) -> Rgb {
        self.current
    }
}
