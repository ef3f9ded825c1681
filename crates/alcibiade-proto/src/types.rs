#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Opcode {
    // client -> server
    Ask = 0x01,
    UpdateConfig = 0x02,
    Ping = 0x04,

    // server -> client
    Reply = 0x40,
    Status = 0x80, // pushed during retry backoff, no reply expected
}

impl TryFrom<u8> for Opcode {
    type Error = crate::ProtoError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0x01 => Ok(Opcode::Ask),
            0x02 => Ok(Opcode::UpdateConfig),
            0x04 => Ok(Opcode::Ping),
            0x40 => Ok(Opcode::Reply),
            0x80 => Ok(Opcode::Status),
            other => Err(crate::ProtoError::UnknownOpcode(other)),
        }
    }
}

impl Opcode {
    /// Channel name used by the desktop shell for this opcode.
    pub fn channel(&self) -> &'static str {
        match self {
            Opcode::Ask | Opcode::Reply => "ai:ask",
            Opcode::UpdateConfig => "ai:config",
            Opcode::Ping => "ai:ping",
            Opcode::Status => "ai:status",
        }
    }
}
