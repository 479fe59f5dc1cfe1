//! Daemon command identifiers.

/// A pigpio socket command.
///
/// Discriminants are the values sent in the `cmd` word of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    Modes = 0,
    Modeg = 1,
    Pud = 2,
    Read = 3,
    Write = 4,
    Pwm = 5,
    Prs = 6,
    Pfs = 7,
    Servo = 8,
    Wdog = 9,
    Br1 = 10,
    Br2 = 11,
    Bc1 = 12,
    Bc2 = 13,
    Bs1 = 14,
    Bs2 = 15,
    Tick = 16,
    Hwver = 17,

    /// Open a notification pipe.
    No = 18,
    /// Set the gpio filter of a notification handle.
    Nb = 19,
    /// Pause a notification handle.
    Np = 20,
    /// Close a notification handle.
    Nc = 21,

    Prg = 22,
    Pfg = 23,
    Prrg = 24,
    Help = 25,
    Pigpv = 26,

    Wvclr = 27,
    Wvag = 28,
    Wvas = 29,
    Wvgo = 30,
    Wvgor = 31,
    Wvbsy = 32,
    Wvhlt = 33,
    Wvsm = 34,
    Wvsp = 35,
    Wvsc = 36,

    Trig = 37,

    Proc = 38,
    Procd = 39,
    Procr = 40,
    Procs = 41,

    Slro = 42,
    Slr = 43,
    Slrc = 44,

    Procp = 45,
    Micro = 46,
    Milli = 47,
    Parse = 48,

    Wvcre = 49,
    Wvdel = 50,
    Wvtx = 51,
    Wvtxr = 52,
    Wvnew = 53,

    I2co = 54,
    I2cc = 55,
    I2crd = 56,
    I2cwd = 57,
    I2cwq = 58,
    I2crs = 59,
    I2cws = 60,
    I2crb = 61,
    I2cwb = 62,
    I2crw = 63,
    I2cww = 64,
    I2crk = 65,
    I2cwk = 66,
    I2cri = 67,
    I2cwi = 68,
    I2cpc = 69,
    I2cpk = 70,

    Spio = 71,
    Spic = 72,
    Spir = 73,
    Spiw = 74,
    Spix = 75,

    Sero = 76,
    Serc = 77,
    Serrb = 78,
    Serwb = 79,
    Serr = 80,
    Serw = 81,
    Serda = 82,

    Gdc = 83,
    Gpw = 84,

    Hc = 85,
    Hp = 86,

    Cf1 = 87,
    Cf2 = 88,

    Bi2cc = 89,
    Bi2co = 90,
    Bi2cz = 91,

    I2cz = 92,

    Wvcha = 93,

    Slri = 94,

    Fg = 97,
    Fn = 98,

    /// Switch the issuing socket into in-band notification mode.
    Noib = 99,

    Wvtxm = 100,
    Wvtat = 101,

    Wvcap = 118,
}

impl From<Opcode> for u32 {
    fn from(op: Opcode) -> u32 {
        op as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_opcodes() {
        assert_eq!(u32::from(Opcode::No), 18);
        assert_eq!(u32::from(Opcode::Nb), 19);
        assert_eq!(u32::from(Opcode::Np), 20);
        assert_eq!(u32::from(Opcode::Nc), 21);
        assert_eq!(u32::from(Opcode::Noib), 99);
    }

    #[test]
    fn test_sparse_tail() {
        assert_eq!(u32::from(Opcode::Slri), 94);
        assert_eq!(u32::from(Opcode::Fg), 97);
        assert_eq!(u32::from(Opcode::Wvcap), 118);
    }
}
