//! HD44780 character LCD behind a PCF8574 I2C backpack, driven in 4-bit mode.

use anyhow::Context;
use esp_idf_hal::{
    delay::{Ets, FreeRtos, BLOCK},
    i2c::I2cDriver,
};

const REGISTER_SELECT: u8 = 0x01;
const ENABLE: u8 = 0x04;
const BACKLIGHT: u8 = 0x08;

const CMD_CLEAR: u8 = 0x01;
const CMD_ENTRY_MODE_INCREMENT: u8 = 0x06;
const CMD_DISPLAY_ON: u8 = 0x0C;
const CMD_FUNCTION_4BIT_2LINE: u8 = 0x28;
const CMD_SET_DDRAM: u8 = 0x80;

const ROW_OFFSETS: [u8; 2] = [0x00, 0x40];

pub struct CharacterLcd {
    address: u8,
    backlight: u8,
}

impl CharacterLcd {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            backlight: BACKLIGHT,
        }
    }

    /// Power-on reset into 4-bit, two-line mode.
    pub fn init(&mut self, i2c: &mut I2cDriver<'static>) -> anyhow::Result<()> {
        FreeRtos::delay_ms(50);
        for wait_us in [4_500, 150, 150] {
            self.write_nibble(i2c, 0x30, 0)?;
            Ets::delay_us(wait_us);
        }
        self.write_nibble(i2c, 0x20, 0)?;

        for command in [
            CMD_FUNCTION_4BIT_2LINE,
            CMD_DISPLAY_ON,
            CMD_ENTRY_MODE_INCREMENT,
        ] {
            self.command(i2c, command)?;
        }
        self.clear(i2c)
            .with_context(|| format!("LCD at 0x{:02x} did not accept init", self.address))
    }

    pub fn clear(&mut self, i2c: &mut I2cDriver<'static>) -> anyhow::Result<()> {
        self.command(i2c, CMD_CLEAR)?;
        FreeRtos::delay_ms(2);
        Ok(())
    }

    pub fn set_backlight(&mut self, i2c: &mut I2cDriver<'static>, on: bool) -> anyhow::Result<()> {
        self.backlight = if on { BACKLIGHT } else { 0 };
        i2c.write(self.address, &[self.backlight], BLOCK)?;
        Ok(())
    }

    pub fn write_at(
        &mut self,
        i2c: &mut I2cDriver<'static>,
        col: u8,
        row: u8,
        text: &str,
    ) -> anyhow::Result<()> {
        let offset = ROW_OFFSETS.get(row as usize).copied().unwrap_or(0);
        self.command(i2c, CMD_SET_DDRAM | (offset + col.min(0x27)))?;
        for byte in text.bytes() {
            self.send(i2c, byte, REGISTER_SELECT)?;
        }
        Ok(())
    }

    fn command(&mut self, i2c: &mut I2cDriver<'static>, command: u8) -> anyhow::Result<()> {
        self.send(i2c, command, 0)
    }

    fn send(&mut self, i2c: &mut I2cDriver<'static>, byte: u8, mode: u8) -> anyhow::Result<()> {
        self.write_nibble(i2c, byte & 0xF0, mode)?;
        self.write_nibble(i2c, (byte << 4) & 0xF0, mode)
    }

    fn write_nibble(
        &mut self,
        i2c: &mut I2cDriver<'static>,
        nibble: u8,
        mode: u8,
    ) -> anyhow::Result<()> {
        let data = nibble | mode | self.backlight;
        i2c.write(self.address, &[data | ENABLE], BLOCK)?;
        Ets::delay_us(1);
        i2c.write(self.address, &[data], BLOCK)?;
        Ets::delay_us(50);
        Ok(())
    }
}
