//! Typed daemon operations.
//!
//! Each wrapper sends one request and passes the result through the
//! client's [`ErrorPolicy`](crate::ErrorPolicy): under `Raise` a negative
//! result becomes [`ClientError::Daemon`], under `ReturnCode` it is
//! returned unchanged.

use bytes::{Buf, BufMut, Bytes};
use protocol_pigpio::{Extent, Opcode};

use crate::error::ClientError;
use crate::pi::Pi;

/// Gpio function select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Mode {
    Input = 0,
    Output = 1,
    Alt5 = 2,
    Alt4 = 3,
    Alt0 = 4,
    Alt1 = 5,
    Alt2 = 6,
    Alt3 = 7,
}

impl Mode {
    /// Decode a mode as reported by [`Pi::get_mode`].
    pub fn from_code(code: i32) -> Option<Self> {
        let mode = match code {
            0 => Mode::Input,
            1 => Mode::Output,
            2 => Mode::Alt5,
            3 => Mode::Alt4,
            4 => Mode::Alt0,
            5 => Mode::Alt1,
            6 => Mode::Alt2,
            7 => Mode::Alt3,
            _ => return None,
        };
        Some(mode)
    }
}

/// Internal pull resistor setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Pull {
    Off = 0,
    Down = 1,
    Up = 2,
}

/// One step of a generic waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pulse {
    /// Gpios to switch on at the start of the pulse.
    pub gpio_on: u32,
    /// Gpios to switch off at the start of the pulse.
    pub gpio_off: u32,
    /// Microseconds before the next pulse.
    pub delay: u32,
}

impl Pulse {
    pub fn new(gpio_on: u32, gpio_off: u32, delay: u32) -> Self {
        Self {
            gpio_on,
            gpio_off,
            delay,
        }
    }
}

/// Run state and parameters of a stored script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptStatus {
    /// Run status (initing, halted, running, waiting, failed), or the raw
    /// result when the daemon sent no status block.
    pub status: i32,
    /// Parameters p0 to p9. Empty when no status block was sent.
    pub params: Vec<i32>,
}

/// Which bound a wave statistic query reports.
#[derive(Clone, Copy)]
#[repr(u32)]
enum WaveStat {
    Current = 0,
    Max = 2,
}

fn words(values: impl IntoIterator<Item = u32>) -> Vec<u8> {
    let mut buf = Vec::new();
    for value in values {
        buf.put_u32_le(value);
    }
    buf
}

impl Pi {
    async fn run(&self, cmd: Opcode, p1: u32, p2: u32) -> Result<i32, ClientError> {
        let result = self.send_command(cmd, p1, p2).await?;
        self.outcome(result)
    }

    async fn run_ext(
        &self,
        cmd: Opcode,
        p1: u32,
        p2: u32,
        extents: &[Extent<'_>],
    ) -> Result<i32, ClientError> {
        let result = self.send_extended_command(cmd, p1, p2, extents).await?;
        self.outcome(result)
    }

    pub async fn get_pigpio_version(&self) -> Result<i32, ClientError> {
        self.run(Opcode::Pigpv, 0, 0).await
    }

    /// Hardware revision of the board the daemon runs on.
    pub async fn get_hardware_revision(&self) -> Result<u32, ClientError> {
        Ok(self.send_command(Opcode::Hwver, 0, 0).await? as u32)
    }

    /// Daemon tick in microseconds. Wraps every 2^32 us.
    pub async fn get_current_tick(&self) -> Result<u32, ClientError> {
        Ok(self.send_command(Opcode::Tick, 0, 0).await? as u32)
    }

    pub async fn set_mode(&self, gpio: u32, mode: Mode) -> Result<i32, ClientError> {
        self.run(Opcode::Modes, gpio, mode as u32).await
    }

    pub async fn get_mode(&self, gpio: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Modeg, gpio, 0).await
    }

    pub async fn set_pull_up_down(&self, gpio: u32, pull: Pull) -> Result<i32, ClientError> {
        self.run(Opcode::Pud, gpio, pull as u32).await
    }

    pub async fn read(&self, gpio: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Read, gpio, 0).await
    }

    pub async fn write(&self, gpio: u32, level: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Write, gpio, level).await
    }

    /// Levels of gpios 0-31 as a bit mask.
    ///
    /// Gpio 31 sets the sign bit of the raw result, so no error policy
    /// applies here.
    pub async fn read_bank_1(&self) -> Result<u32, ClientError> {
        Ok(self.send_command(Opcode::Br1, 0, 0).await? as u32)
    }

    pub async fn set_bank_1(&self, bits: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Bs1, bits, 0).await
    }

    pub async fn clear_bank_1(&self, bits: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Bc1, bits, 0).await
    }

    /// Drive `gpio` to `level` for `pulse_len` microseconds, then back.
    pub async fn gpio_trigger(
        &self,
        gpio: u32,
        pulse_len: u32,
        level: u32,
    ) -> Result<i32, ClientError> {
        let level = level.to_le_bytes();
        self.run_ext(Opcode::Trig, gpio, pulse_len, &[Extent::Binary(&level)])
            .await
    }

    pub async fn set_glitch_filter(&self, gpio: u32, steady: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Fg, gpio, steady).await
    }

    pub async fn set_noise_filter(
        &self,
        gpio: u32,
        steady: u32,
        active: u32,
    ) -> Result<i32, ClientError> {
        let active = active.to_le_bytes();
        self.run_ext(Opcode::Fn, gpio, steady, &[Extent::Binary(&active)])
            .await
    }

    pub async fn set_pwm_dutycycle(&self, gpio: u32, dutycycle: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Pwm, gpio, dutycycle).await
    }

    pub async fn get_pwm_dutycycle(&self, gpio: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Gdc, gpio, 0).await
    }

    pub async fn set_pwm_range(&self, gpio: u32, range: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Prs, gpio, range).await
    }

    pub async fn get_pwm_range(&self, gpio: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Prg, gpio, 0).await
    }

    pub async fn get_pwm_real_range(&self, gpio: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Prrg, gpio, 0).await
    }

    /// Returns the closest frequency the daemon could set.
    pub async fn set_pwm_frequency(&self, gpio: u32, frequency: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Pfs, gpio, frequency).await
    }

    pub async fn get_pwm_frequency(&self, gpio: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Pfg, gpio, 0).await
    }

    /// 0 stops servo pulses; otherwise 500-2500 microseconds.
    pub async fn set_servo_pulsewidth(
        &self,
        gpio: u32,
        pulsewidth: u32,
    ) -> Result<i32, ClientError> {
        self.run(Opcode::Servo, gpio, pulsewidth).await
    }

    pub async fn get_servo_pulsewidth(&self, gpio: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Gpw, gpio, 0).await
    }

    pub async fn hardware_clock(&self, gpio: u32, frequency: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Hc, gpio, frequency).await
    }

    /// `duty` is out of 1,000,000.
    pub async fn hardware_pwm(
        &self,
        gpio: u32,
        frequency: u32,
        duty: u32,
    ) -> Result<i32, ClientError> {
        let duty = duty.to_le_bytes();
        self.run_ext(Opcode::Hp, gpio, frequency, &[Extent::Binary(&duty)])
            .await
    }

    /// Report a timeout level on `gpio` after `timeout_ms` without a
    /// change. 0 disables the watchdog.
    pub async fn set_watchdog(&self, gpio: u32, timeout_ms: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Wdog, gpio, timeout_ms).await
    }

    /// Open a raw notification handle, independent of this client's own
    /// notification stream.
    pub async fn notify_open(&self) -> Result<i32, ClientError> {
        self.run(Opcode::No, 0, 0).await
    }

    pub async fn notify_begin(&self, handle: u32, bits: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Nb, handle, bits).await
    }

    pub async fn notify_pause(&self, handle: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Np, handle, 0).await
    }

    pub async fn notify_close(&self, handle: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Nc, handle, 0).await
    }

    /// Store a script and return its id. An empty script is not sent.
    pub async fn store_script(&self, script: &[u8]) -> Result<i32, ClientError> {
        if script.is_empty() {
            return Ok(0);
        }
        self.run_ext(Opcode::Proc, 0, 0, &[Extent::Binary(script)])
            .await
    }

    /// Run a stored script with up to ten parameters.
    pub async fn run_script(&self, script_id: u32, params: &[u32]) -> Result<i32, ClientError> {
        let params = words(params.iter().copied());
        self.run_ext(Opcode::Procr, script_id, 0, &[Extent::Binary(&params)])
            .await
    }

    /// Run status and parameters of a stored script.
    ///
    /// A positive result is the length of a status block that follows the
    /// response: the status word, then the parameters.
    pub async fn script_status(&self, script_id: u32) -> Result<ScriptStatus, ClientError> {
        let mut guard = self.command().lock().await?;
        let len = guard.send_command(Opcode::Procp, script_id, 0).await?;
        if len <= 0 {
            return Ok(ScriptStatus {
                status: self.outcome(len)?,
                params: Vec::new(),
            });
        }

        let mut block = guard.read_payload(len as usize).await?;
        drop(guard);

        let status = if block.remaining() >= 4 {
            block.get_i32_le()
        } else {
            len
        };
        let mut params = Vec::with_capacity(block.remaining() / 4);
        while block.remaining() >= 4 {
            params.push(block.get_i32_le());
        }
        Ok(ScriptStatus { status, params })
    }

    pub async fn stop_script(&self, script_id: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Procs, script_id, 0).await
    }

    pub async fn delete_script(&self, script_id: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Procd, script_id, 0).await
    }

    /// Clear all waveforms and pending wave data.
    pub async fn wave_clear(&self) -> Result<i32, ClientError> {
        self.run(Opcode::Wvclr, 0, 0).await
    }

    /// Start a new empty waveform.
    pub async fn wave_add_new(&self) -> Result<i32, ClientError> {
        self.run(Opcode::Wvnew, 0, 0).await
    }

    /// Merge `pulses` into the pending waveform. Returns the new total
    /// pulse count; an empty slice is not sent.
    pub async fn wave_add_generic(&self, pulses: &[Pulse]) -> Result<i32, ClientError> {
        if pulses.is_empty() {
            return Ok(0);
        }
        let data = words(
            pulses
                .iter()
                .flat_map(|p| [p.gpio_on, p.gpio_off, p.delay]),
        );
        self.run_ext(Opcode::Wvag, 0, 0, &[Extent::Binary(&data)])
            .await
    }

    /// Add bit-banged serial data to the pending waveform.
    ///
    /// `bb_stop` counts half stop bits. An empty `data` is not sent.
    pub async fn wave_add_serial(
        &self,
        gpio: u32,
        baud: u32,
        data: &[u8],
        offset: u32,
        bb_bits: u32,
        bb_stop: u32,
    ) -> Result<i32, ClientError> {
        if data.is_empty() {
            return Ok(0);
        }
        let header = words([bb_bits, bb_stop, offset]);
        self.run_ext(
            Opcode::Wvas,
            gpio,
            baud,
            &[Extent::Binary(&header), Extent::Binary(data)],
        )
        .await
    }

    /// Turn the pending wave data into a waveform and return its id.
    pub async fn wave_create(&self) -> Result<i32, ClientError> {
        self.run(Opcode::Wvcre, 0, 0).await
    }

    /// Like [`wave_create`](Self::wave_create), reserving `percent` of the
    /// wave resources so deleted slots can be reused.
    pub async fn wave_create_and_pad(&self, percent: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Wvcap, percent, 0).await
    }

    pub async fn wave_delete(&self, wave_id: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Wvdel, wave_id, 0).await
    }

    pub async fn wave_send_once(&self, wave_id: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Wvtx, wave_id, 0).await
    }

    pub async fn wave_send_repeat(&self, wave_id: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Wvtxr, wave_id, 0).await
    }

    /// Transmit with an explicit daemon send mode (one-shot, repeat, and
    /// their sync variants).
    pub async fn wave_send_using_mode(&self, wave_id: u32, mode: u32) -> Result<i32, ClientError> {
        self.run(Opcode::Wvtxm, wave_id, mode).await
    }

    /// Id of the waveform being transmitted.
    pub async fn wave_tx_at(&self) -> Result<i32, ClientError> {
        self.run(Opcode::Wvtat, 0, 0).await
    }

    /// 1 while a waveform is being transmitted.
    pub async fn wave_tx_busy(&self) -> Result<i32, ClientError> {
        self.run(Opcode::Wvbsy, 0, 0).await
    }

    pub async fn wave_tx_stop(&self) -> Result<i32, ClientError> {
        self.run(Opcode::Wvhlt, 0, 0).await
    }

    /// Transmit a chain of waves and loop/delay commands.
    pub async fn wave_chain(&self, data: &[u8]) -> Result<i32, ClientError> {
        self.run_ext(Opcode::Wvcha, 0, 0, &[Extent::Binary(data)])
            .await
    }

    async fn wave_stat(&self, cmd: Opcode, which: WaveStat) -> Result<i32, ClientError> {
        self.run(cmd, which as u32, 0).await
    }

    pub async fn wave_get_micros(&self) -> Result<i32, ClientError> {
        self.wave_stat(Opcode::Wvsm, WaveStat::Current).await
    }

    pub async fn wave_get_max_micros(&self) -> Result<i32, ClientError> {
        self.wave_stat(Opcode::Wvsm, WaveStat::Max).await
    }

    pub async fn wave_get_pulses(&self) -> Result<i32, ClientError> {
        self.wave_stat(Opcode::Wvsp, WaveStat::Current).await
    }

    pub async fn wave_get_max_pulses(&self) -> Result<i32, ClientError> {
        self.wave_stat(Opcode::Wvsp, WaveStat::Max).await
    }

    pub async fn wave_get_cbs(&self) -> Result<i32, ClientError> {
        self.wave_stat(Opcode::Wvsc, WaveStat::Current).await
    }

    pub async fn wave_get_max_cbs(&self) -> Result<i32, ClientError> {
        self.wave_stat(Opcode::Wvsc, WaveStat::Max).await
    }

    /// Open an i2c device and return its handle.
    pub async fn i2c_open(&self, bus: u32, address: u32) -> Result<i32, ClientError> {
        self.run(Opcode::I2co, bus, address).await
    }

    pub async fn i2c_close(&self, handle: u32) -> Result<i32, ClientError> {
        self.run(Opcode::I2cc, handle, 0).await
    }

    pub async fn i2c_write_byte_data(
        &self,
        handle: u32,
        register: u32,
        data: u32,
    ) -> Result<i32, ClientError> {
        let data = data.to_le_bytes();
        self.run_ext(Opcode::I2cwb, handle, register, &[Extent::Binary(&data)])
            .await
    }

    pub async fn i2c_read_byte_data(&self, handle: u32, register: u32) -> Result<i32, ClientError> {
        self.run(Opcode::I2crb, handle, register).await
    }

    /// Read up to `count` bytes from `register`.
    ///
    /// Returns the daemon's result with the bytes that followed it. The
    /// data is empty unless the result is positive.
    pub async fn i2c_read_i2c_block_data(
        &self,
        handle: u32,
        register: u32,
        count: u32,
    ) -> Result<(i32, Bytes), ClientError> {
        let count = count.to_le_bytes();
        let mut guard = self.command().lock().await?;
        let len = guard
            .send_extended_command(Opcode::I2cri, handle, register, &[Extent::Binary(&count)])
            .await?;
        if len <= 0 {
            return Ok((self.outcome(len)?, Bytes::new()));
        }
        let data = guard.read_payload(len as usize).await?;
        Ok((len, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_codes() {
        assert_eq!(Mode::from_code(4), Some(Mode::Alt0));
        assert_eq!(Mode::from_code(Mode::Alt3 as i32), Some(Mode::Alt3));
        assert_eq!(Mode::from_code(8), None);
        assert_eq!(Mode::from_code(-3), None);
    }

    #[test]
    fn test_pulses_pack_as_triples() {
        let pulses = [Pulse::new(1 << 4, 0, 100), Pulse::new(0, 1 << 4, 250)];
        let data = words(pulses.iter().flat_map(|p| [p.gpio_on, p.gpio_off, p.delay]));
        assert_eq!(data.len(), 24);
        assert_eq!(&data[0..4], &16u32.to_le_bytes());
        assert_eq!(&data[8..12], &100u32.to_le_bytes());
        assert_eq!(&data[16..20], &16u32.to_le_bytes());
        assert_eq!(&data[20..24], &250u32.to_le_bytes());
    }
}
