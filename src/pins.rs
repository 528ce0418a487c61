//! GPIO / peripheral pin assignments for the RepClip board (ESP32-C3).
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Accelerometer (LIS3DH on I²C0)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 4;
pub const I2C_SCL_GPIO: i32 = 5;
/// 400 kHz fast mode.
pub const I2C_FREQ_HZ: u32 = 400_000;
/// SDO/SA0 is strapped low on this board.
pub const ACCEL_I2C_ADDR: u8 = crate::sensors::lis3dh::DEFAULT_I2C_ADDR;

// ---------------------------------------------------------------------------
// Near-field presence (NFC tag field-detect output, open drain)
// ---------------------------------------------------------------------------

/// LOW = a reader field is present.
pub const FIELD_DETECT_GPIO: i32 = 7;

// ---------------------------------------------------------------------------
// Battery sense (CR2032 through a 1:2 divider)
// ---------------------------------------------------------------------------

/// ADC1 channel 0 (GPIO 0 on ESP32-C3).
pub const BATTERY_ADC_CHANNEL: u32 = 0;
pub const BATTERY_DIVIDER_RATIO: u32 = 2;

// ---------------------------------------------------------------------------
// Status LED (discrete RGB, common cathode) and haptic motor
// ---------------------------------------------------------------------------

pub const LED_R_GPIO: i32 = 1;
pub const LED_G_GPIO: i32 = 2;
pub const LED_B_GPIO: i32 = 3;
/// Coin vibration motor through an N-MOSFET, active HIGH.
pub const HAPTIC_GPIO: i32 = 10;

// ---------------------------------------------------------------------------
// PWM configuration
// ---------------------------------------------------------------------------

/// LEDC frequency for the RGB status LED.
pub const LED_PWM_FREQ_HZ: u32 = 1_000;
/// LEDC frequency for the haptic motor (above audible whine).
pub const HAPTIC_PWM_FREQ_HZ: u32 = 20_000;
/// Duty used for a haptic pulse; the motor is rated below the cell voltage.
pub const HAPTIC_DUTY: u8 = 180;
