/// When closing an established connection an endpoint MAY indicate a reason for closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// The purpose for which the connection was established has been fulfilled
    Normal = 1000,
    /// Server going down or a browser having navigated away from a page
    Away = 1001,
    /// An endpoint is terminating the connection due to a protocol error.
    ProtocolError = 1002,
    /// It has received a type of data it cannot accept
    Unsupported = 1003,
    /// Application has received data within a message that was not consistent with the type of the message.
    InvalidPayload = 1007,
    /// This is a generic status code that can be returned when there is no other more suitable status code.
    PolicyViolation = 1008,
    /// Message that is too big for it to process.
    MessageTooBig = 1009,
    /// It has expected the server to negotiate one or more extension.
    MandatoryExt = 1010,
    /// The server has encountered an unexpected condition that prevented it from fulfilling the request.
    InternalError = 1011,
}

const CLOSE_CODES: [CloseCode; 9] = [
    CloseCode::Normal,
    CloseCode::Away,
    CloseCode::ProtocolError,
    CloseCode::Unsupported,
    CloseCode::InvalidPayload,
    CloseCode::PolicyViolation,
    CloseCode::MessageTooBig,
    CloseCode::MandatoryExt,
    CloseCode::InternalError,
];

impl CloseCode {
    /// Symbolic name as it appears in [CloseFrame::codename](crate::CloseFrame).
    pub fn name(self) -> &'static str {
        match self {
            CloseCode::Normal => "NORMAL",
            CloseCode::Away => "GOING_AWAY",
            CloseCode::ProtocolError => "PROTOCOL_ERROR",
            CloseCode::Unsupported => "UNACCEPTABLE",
            CloseCode::InvalidPayload => "MALFORMED",
            CloseCode::PolicyViolation => "POLICY_VIOLATION",
            CloseCode::MessageTooBig => "TOO_BIG",
            CloseCode::MandatoryExt => "MISSING_EXTENSION",
            CloseCode::InternalError => "UNEXPECTED_ERROR",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        CLOSE_CODES.into_iter().find(|code| code.name() == name)
    }
}

/// Name of a status code, `"UNKNOWN"` when it is not one of [CloseCode].
///
/// ```rust
/// use web_socket_wire::close_code_name;
/// assert_eq!(close_code_name(1000), "NORMAL");
/// assert_eq!(close_code_name(4321), "UNKNOWN");
/// ```
pub fn close_code_name(code: u16) -> &'static str {
    CloseCode::try_from(code).map_or("UNKNOWN", CloseCode::name)
}

impl From<CloseCode> for u16 {
    #[inline]
    fn from(code: CloseCode) -> Self {
        code as u16
    }
}

impl TryFrom<u16> for CloseCode {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        CLOSE_CODES
            .into_iter()
            .find(|code| *code as u16 == value)
            .ok_or(value)
    }
}

/// Range a status code falls in, following [Section 7.4.2](https://datatracker.ietf.org/doc/html/rfc6455#section-7.4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCodeClass {
    /// Not used by any endpoint: `0-999` and `5000` or above.
    Invalid,
    /// Defined by the protocol and allowed on the wire.
    Standard,
    /// Reserved by the protocol: `1004-1006`, `1015` and the unassigned `1012-2999`.
    /// `1005`, `1006` and `1015` MUST NOT be sent in a Close frame.
    Reserved,
    /// `3000-3999`, registered with IANA for libraries and frameworks.
    Framework,
    /// `4000-4999`, private use by applications.
    Private,
}

impl CloseCodeClass {
    pub fn of(code: u16) -> Self {
        match code {
            1000..=1003 | 1007..=1011 => CloseCodeClass::Standard,
            1004..=1006 | 1012..=2999 => CloseCodeClass::Reserved,
            3000..=3999 => CloseCodeClass::Framework,
            4000..=4999 => CloseCodeClass::Private,
            _ => CloseCodeClass::Invalid,
        }
    }

    /// Whether an endpoint may put `code` in a Close frame it writes.
    pub fn may_be_sent(code: u16) -> bool {
        match CloseCodeClass::of(code) {
            CloseCodeClass::Invalid => false,
            CloseCodeClass::Reserved => !matches!(code, 1004..=1006 | 1015),
            _ => true,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CloseCodeClass::Invalid => "INVALID",
            CloseCodeClass::Standard => "STANDARD",
            CloseCodeClass::Reserved => "RESERVED",
            CloseCodeClass::Framework => "FRAMEWORK",
            CloseCodeClass::Private => "PRIVATE",
        }
    }
}
