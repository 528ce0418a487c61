//! LIS3DH three-axis accelerometer over I2C.
//!
//! Configured for 50 Hz output in high-resolution mode, ±4 g full scale,
//! block data update.  Samples are 12-bit left-justified in 16-bit
//! registers, 2 mg per digit at ±4 g.  The sample tick (26 Hz by default)
//! reads whatever set was latched last.

use embedded_hal::i2c::I2c;

use super::Vector3;
use crate::error::SensorError;

/// SDO/SA0 tied low.
pub const DEFAULT_I2C_ADDR: u8 = 0x18;
/// SDO/SA0 tied high.
pub const ALT_I2C_ADDR: u8 = 0x19;

const REG_WHO_AM_I: u8 = 0x0F;
const REG_CTRL1: u8 = 0x20;
const REG_CTRL4: u8 = 0x23;
const REG_STATUS: u8 = 0x27;
const REG_OUT_X_L: u8 = 0x28;
/// Sub-address MSB enables register auto-increment.
const AUTO_INCREMENT: u8 = 0x80;

const WHO_AM_I_VALUE: u8 = 0x33;
/// ODR = 50 Hz (0100), normal power, X/Y/Z enabled.
const CTRL1_50HZ_XYZ: u8 = 0x47;
/// BDU | FS = ±4 g | HR.
const CTRL4_BDU_4G_HR: u8 = 0x98;
const CTRL1_POWER_DOWN: u8 = 0x07;
const STATUS_ZYXDA: u8 = 0x08;

/// g per LSB after the 4-bit right shift, at ±4 g high-resolution.
const G_PER_DIGIT: f32 = 0.002;

/// Driver error, generic over the bus error.
#[derive(Debug)]
pub enum Lis3dhError<E> {
    Bus(E),
    BadWhoAmI(u8),
}

impl<E> From<Lis3dhError<E>> for SensorError {
    fn from(e: Lis3dhError<E>) -> Self {
        match e {
            Lis3dhError::Bus(_) => SensorError::BusFailed,
            Lis3dhError::BadWhoAmI(id) => SensorError::WrongDevice(id),
        }
    }
}

pub struct Lis3dh<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Lis3dh<I2C> {
    /// Probe the part and apply the sampling configuration.
    pub fn new(i2c: I2C, address: u8) -> Result<Self, Lis3dhError<I2C::Error>> {
        let mut this = Self { i2c, address };
        let who = this.read_reg(REG_WHO_AM_I)?;
        if who != WHO_AM_I_VALUE {
            return Err(Lis3dhError::BadWhoAmI(who));
        }
        this.write_reg(REG_CTRL4, CTRL4_BDU_4G_HR)?;
        this.write_reg(REG_CTRL1, CTRL1_50HZ_XYZ)?;
        Ok(this)
    }

    /// `true` when a fresh X/Y/Z set is latched.
    pub fn data_ready(&mut self) -> Result<bool, Lis3dhError<I2C::Error>> {
        Ok(self.read_reg(REG_STATUS)? & STATUS_ZYXDA != 0)
    }

    /// Raw 12-bit counts, sign-extended.
    pub fn read_raw(&mut self) -> Result<[i16; 3], Lis3dhError<I2C::Error>> {
        let mut buf = [0u8; 6];
        self.i2c
            .write_read(self.address, &[REG_OUT_X_L | AUTO_INCREMENT], &mut buf)
            .map_err(Lis3dhError::Bus)?;
        Ok([
            i16::from_le_bytes([buf[0], buf[1]]) >> 4,
            i16::from_le_bytes([buf[2], buf[3]]) >> 4,
            i16::from_le_bytes([buf[4], buf[5]]) >> 4,
        ])
    }

    /// One sample in g.
    pub fn read_accel(&mut self) -> Result<Vector3, Lis3dhError<I2C::Error>> {
        let [x, y, z] = self.read_raw()?;
        Ok(Vector3::new(
            f32::from(x) * G_PER_DIGIT,
            f32::from(y) * G_PER_DIGIT,
            f32::from(z) * G_PER_DIGIT,
        ))
    }

    /// Stop conversions (sleep current ~0.5 µA).
    pub fn power_down(&mut self) -> Result<(), Lis3dhError<I2C::Error>> {
        self.write_reg(REG_CTRL1, CTRL1_POWER_DOWN)
    }

    pub fn into_inner(self) -> I2C {
        self.i2c
    }

    fn write_reg(&mut self, reg: u8, val: u8) -> Result<(), Lis3dhError<I2C::Error>> {
        self.i2c
            .write(self.address, &[reg, val])
            .map_err(Lis3dhError::Bus)
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, Lis3dhError<I2C::Error>> {
        let mut out = [0u8];
        self.i2c
            .write_read(self.address, &[reg], &mut out)
            .map_err(Lis3dhError::Bus)?;
        Ok(out[0])
    }
}
