//! Parsers for `AT+CSQ` and `AT+CREG?` reply lines.
//!
//! Both are pure: a raw reply line in, a typed value out. Anything that does
//! not match yields the sentinel value (0 for signal, -1 for registration).

use tracing::info;

/// Lowest CSQ value considered a usable signal.
const MIN_USABLE_CSQ: i32 = 10;
/// CSQ value the modem reports when signal is not measurable.
pub const CSQ_UNKNOWN: i32 = 99;

/// Parsed `+CSQ: <rssi>,<ber>` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalQuality {
    pub raw: String,
    /// RSSI index, or 0 when the reply did not parse.
    pub value: i32,
}

impl SignalQuality {
    /// Connected with a signal good enough to send.
    pub fn is_usable(&self) -> bool {
        (MIN_USABLE_CSQ..CSQ_UNKNOWN).contains(&self.value)
    }

    /// The modem cannot measure signal at all, usually a wedged radio.
    pub fn is_unmeasurable(&self) -> bool {
        self.value == CSQ_UNKNOWN
    }
}

/// Parsed `+CREG: <n>,<stat>` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationStatus {
    pub raw: String,
    /// `<stat>` field, or -1 when the reply did not parse.
    pub value: i32,
}

impl RegistrationStatus {
    /// Registered on the home network (1) or roaming (5).
    pub fn is_registered(&self) -> bool {
        matches!(self.value, 1 | 5)
    }
}

pub fn parse_signal_quality(raw: &str) -> SignalQuality {
    let value = match_csq(raw).unwrap_or_else(|| {
        info!("csq ( {raw:?} ) didn't match +CSQ: <rssi>,");
        0
    });
    SignalQuality {
        raw: raw.to_string(),
        value,
    }
}

pub fn parse_registration(raw: &str) -> RegistrationStatus {
    let value = match_creg(raw).unwrap_or_else(|| {
        info!("creg ( {raw:?} ) didn't match +CREG: <n>,<stat>");
        -1
    });
    RegistrationStatus {
        raw: raw.to_string(),
        value,
    }
}

/// `+CSQ: ` then one or two digits then `,`.
fn match_csq(raw: &str) -> Option<i32> {
    let rest = raw.trim_start().strip_prefix("+CSQ: ")?;
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if !(1..=2).contains(&digits) || rest.as_bytes().get(digits) != Some(&b',') {
        return None;
    }
    rest[..digits].parse().ok()
}

/// `+CREG: ` then `<digit>,<digit>`; returns the second digit.
fn match_creg(raw: &str) -> Option<i32> {
    let rest = raw.trim_start().strip_prefix("+CREG: ")?;
    match rest.as_bytes() {
        [n, b',', stat, ..] if n.is_ascii_digit() && stat.is_ascii_digit() => {
            Some(i32::from(stat - b'0'))
        }
        _ => None,
    }
}
