//! Message classes and subtypes.
//!
//! A frame's class byte (offset 1) and subtype byte (offset 2) are decoded
//! once, at the frame boundary, into a [`MessageKind`]. Everything after that
//! point matches on the enum instead of on raw bytes.

use crate::frame::DecodeError;
use crate::payload::Payload;
use crate::peer::PeerAddress;
use std::fmt;

/// Top-level category of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MessageClass {
    Command = 0x01,
    Info = 0x02,
    Ack = 0x03,
}

impl TryFrom<u8> for MessageClass {
    type Error = DecodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x01 => Ok(Self::Command),
            0x02 => Ok(Self::Info),
            0x03 => Ok(Self::Ack),
            other => Err(DecodeError::UnknownClass(other)),
        }
    }
}

impl fmt::Display for MessageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command => write!(f, "cmd"),
            Self::Info => write!(f, "inf"),
            Self::Ack => write!(f, "ack"),
        }
    }
}

/// Generates a subtype enum with a `Custom(u8)` catch-all and lossless
/// conversions to and from the subtype byte.
macro_rules! subtype_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident = $code:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
            /// Application-defined subtype, handled by a registered hook.
            Custom(u8),
        }

        impl $name {
            /// The subtype byte.
            pub const fn code(self) -> u8 {
                match self {
                    $(Self::$variant => $code,)+
                    Self::Custom(code) => code,
                }
            }

            /// Decode a subtype byte. Unknown codes become `Custom`.
            pub const fn from_code(code: u8) -> Self {
                match code {
                    $($code => Self::$variant,)+
                    other => Self::Custom(other),
                }
            }
        }
    };
}

subtype_enum! {
    /// Command subtypes.
    Command {
        Ping = 0x01,
        Echo = 0x02,
        /// Request the sender's full proximity table.
        Boop = 0x03,
        Reboot = 0x04,
        RunFile = 0x05,
        /// Defined on the wire; handled as a no-op.
        ResendChunks = 0x06,
        WifiConnect = 0x07,
        WifiDisconnect = 0x08,
        AccessPointEnable = 0x09,
        AccessPointDisable = 0x0A,
        Pause = 0x0B,
        Resume = 0x0C,
        SetConfig = 0x0D,
        SetName = 0x0E,
        SetAdmin = 0x0F,
        TrustAppend = 0x10,
    }
}

subtype_enum! {
    /// Informational subtypes.
    Info {
        SensorData = 0x01,
        ProximityTable = 0x02,
        Message = 0x03,
    }
}

subtype_enum! {
    /// Acknowledgement subtypes.
    Ack {
        Pong = 0x01,
        EchoReply = 0x02,
        Success = 0x03,
        Fail = 0x04,
        Confirm = 0x05,
    }
}

impl Command {
    /// Whether the command needs a trusted sender or an elevated payload.
    pub const fn is_admin(self) -> bool {
        !matches!(self, Self::Ping | Self::Echo | Self::Boop | Self::Custom(_))
    }
}

/// Class and subtype of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Command(Command),
    Info(Info),
    Ack(Ack),
}

impl MessageKind {
    /// Decode the class and subtype bytes.
    pub fn from_bytes(class: u8, subtype: u8) -> Result<Self, DecodeError> {
        Ok(match MessageClass::try_from(class)? {
            MessageClass::Command => Self::Command(Command::from_code(subtype)),
            MessageClass::Info => Self::Info(Info::from_code(subtype)),
            MessageClass::Ack => Self::Ack(Ack::from_code(subtype)),
        })
    }

    pub fn class(self) -> MessageClass {
        match self {
            Self::Command(_) => MessageClass::Command,
            Self::Info(_) => MessageClass::Info,
            Self::Ack(_) => MessageClass::Ack,
        }
    }

    pub fn subtype(self) -> u8 {
        match self {
            Self::Command(c) => c.code(),
            Self::Info(i) => i.code(),
            Self::Ack(a) => a.code(),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(c) => write!(f, "cmd:{:?}", c),
            Self::Info(i) => write!(f, "inf:{:?}", i),
            Self::Ack(a) => write!(f, "ack:{:?}", a),
        }
    }
}

/// A decoded logical message, as handed to the dispatcher and to hooks.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Link address of the sender.
    pub source: PeerAddress,
    pub kind: MessageKind,
    /// Sender's millisecond clock when the frame was built.
    pub sent_at: u32,
    /// Our millisecond clock when the datagram was processed.
    pub received_at: u32,
    /// Signal strength reported by the transport, if any.
    pub rssi: Option<i16>,
    pub payload: Payload,
}

/// A frame the node should transmit.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub dest: PeerAddress,
    pub kind: MessageKind,
    pub payload: Payload,
}

impl Outgoing {
    pub fn new(dest: PeerAddress, kind: MessageKind, payload: impl Into<Payload>) -> Self {
        Self {
            dest,
            kind,
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtype_codes_roundtrip() {
        for code in 0..=u8::MAX {
            assert_eq!(Command::from_code(code).code(), code);
            assert_eq!(Info::from_code(code).code(), code);
            assert_eq!(Ack::from_code(code).code(), code);
        }
    }

    #[test]
    fn test_unknown_subtype_is_custom() {
        assert_eq!(Command::from_code(0x42), Command::Custom(0x42));
        assert_eq!(Info::from_code(0x00), Info::Custom(0x00));
        assert_eq!(Ack::from_code(0xFF), Ack::Custom(0xFF));
    }

    #[test]
    fn test_kind_from_bytes() {
        assert_eq!(
            MessageKind::from_bytes(0x01, 0x01).unwrap(),
            MessageKind::Command(Command::Ping)
        );
        assert_eq!(
            MessageKind::from_bytes(0x02, 0x03).unwrap(),
            MessageKind::Info(Info::Message)
        );
        assert_eq!(
            MessageKind::from_bytes(0x03, 0x04).unwrap(),
            MessageKind::Ack(Ack::Fail)
        );
        assert_eq!(
            MessageKind::from_bytes(0x04, 0x01),
            Err(DecodeError::UnknownClass(0x04))
        );
    }

    #[test]
    fn test_admin_commands() {
        assert!(!Command::Ping.is_admin());
        assert!(!Command::Echo.is_admin());
        assert!(!Command::Boop.is_admin());
        assert!(!Command::Custom(0x80).is_admin());
        assert!(Command::Reboot.is_admin());
        assert!(Command::WifiConnect.is_admin());
        assert!(Command::Pause.is_admin());
        assert!(Command::TrustAppend.is_admin());
        assert!(Command::ResendChunks.is_admin());
    }

    #[test]
    fn test_kind_class_and_subtype() {
        let kind = MessageKind::Ack(Ack::Pong);
        assert_eq!(kind.class(), MessageClass::Ack);
        assert_eq!(kind.subtype(), 0x01);
        assert_eq!(kind.to_string(), "ack:Pong");
    }
}
