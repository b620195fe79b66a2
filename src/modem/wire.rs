//! AT reply parsing.
//!
//! Pure functions and value types for the modem's text replies: `+CMGL:`
//! message records, `+CBC:` battery reports, `+CSQ:` signal reports, and
//! phone-number normalization. Nothing here touches the serial port; the
//! engine feeds in lines, this module gives back records or a
//! [`ParseError`] the caller turns into a dropped record.

use core::fmt;

use crate::config::SignalThresholds;
use crate::error::ParseError;

// ───────────────────────────────────────────────────────────────
// Phone numbers
// ───────────────────────────────────────────────────────────────

/// Reduce a phone number to bare digits: drops `+`, parens, dashes,
/// spaces, quotes, and anything else that is not a digit.
pub fn normalize_phone(dirty: &str) -> String {
    dirty.chars().filter(char::is_ascii_digit).collect()
}

/// Whether `number` matches any entry of the allow-list. A match in either
/// direction tolerates numbers that arrive with a leading country code.
pub fn is_allowed_number(number: &str, allow_list: &[String]) -> bool {
    if number.is_empty() {
        return false;
    }
    allow_list
        .iter()
        .any(|allowed| number.contains(allowed.as_str()) || allowed.contains(number))
}

// ───────────────────────────────────────────────────────────────
// SMS message record
// ───────────────────────────────────────────────────────────────

/// Timestamp fields of a CMGL record: `"yy/MM/dd"` date and
/// `"hh:mm:ss±zz"` time. Parse failure leaves the message without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MessageTimestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl MessageTimestamp {
    fn parse(date: &str, time: &str) -> Option<Self> {
        let date = date.trim_matches('"');
        let time = time.trim_matches('"');

        let mut d = date.splitn(3, '/');
        let year: u16 = d.next()?.parse().ok()?;
        let month: u8 = d.next()?.parse().ok()?;
        let day: u8 = d.next()?.parse().ok()?;

        // Drop the timezone quarter-hours suffix ("+32" / "-08") if present.
        let hms = time
            .split_once(['+', '-'])
            .map_or(time, |(head, _)| head);
        let mut t = hms.splitn(3, ':');
        let hour: u8 = t.next()?.parse().ok()?;
        let minute: u8 = t.next()?.parse().ok()?;
        let second: u8 = t.next()?.parse().ok()?;

        if month == 0 || month > 12 || day == 0 || day > 31 || hour > 23 || minute > 59 {
            return None;
        }
        Some(Self {
            year: 2000 + year,
            month,
            day,
            hour,
            minute,
            second,
        })
    }
}

impl fmt::Display for MessageTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// One SMS as stored on the SIM. Constructed from a paired CMGL header and
/// body line, consumed once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessage {
    /// SIM storage index; used for deletion.
    pub id: u32,
    /// Sender number as the modem reported it (may be quoted/prefixed).
    pub sender: String,
    /// Storage status, e.g. `REC UNREAD`.
    pub status: String,
    /// When the message was sent, if the timestamp fields parsed.
    pub sent_time: Option<MessageTimestamp>,
    /// Message body.
    pub text: String,
}

impl SmsMessage {
    /// Parse one record from its `+CMGL:` header line and the body line
    /// that follows it.
    ///
    /// Header shape: `+CMGL: <id>,<status>,<sender>,<alpha>,<date>,<time>`
    /// (the service-centre timestamp contains a comma, so a plain comma
    /// split yields the date and time as the last two fields).
    pub fn parse(header: &str, body: &str) -> Result<Self, ParseError> {
        let fields: Vec<&str> = header.split(',').collect();
        if fields.len() < 6 {
            return Err(ParseError::new("CMGL header", header));
        }

        let id = fields[0]
            .rsplit(':')
            .next()
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .ok_or_else(|| ParseError::new("CMGL header", header))?;

        let status = fields[1].trim().trim_matches('"').to_string();
        let sender = fields[2].trim().to_string();
        let sent_time = MessageTimestamp::parse(fields[4].trim(), fields[5].trim());

        Ok(Self {
            id,
            sender,
            status,
            sent_time,
            text: body.trim().to_string(),
        })
    }

    /// The sender number with quoting and prefixes stripped.
    pub fn sender_digits(&self) -> String {
        normalize_phone(&self.sender)
    }
}

// ───────────────────────────────────────────────────────────────
// Battery condition
// ───────────────────────────────────────────────────────────────

/// Parsed `+CBC:` reply. A missing or malformed reply yields the explicit
/// unknown state rather than an error the caller has to branch on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryCondition {
    pub charge_state: u32,
    pub charge_percent: u32,
    /// Remaining capacity in milliamp-hours.
    pub capacity_mah: f32,
    pub known: bool,
}

impl BatteryCondition {
    /// `+CBC: <charging>,<percent>,<capacity>`.
    pub fn parse(reply: &str) -> Self {
        let Some((_, values)) = reply.split_once(':') else {
            return Self::unknown();
        };
        let fields: Vec<&str> = values.split(',').map(str::trim).collect();
        if fields.len() < 3 {
            return Self::unknown();
        }
        let parsed = (
            fields[0].parse::<u32>(),
            fields[1].parse::<u32>(),
            fields[2].parse::<f32>(),
        );
        match parsed {
            (Ok(charge_state), Ok(charge_percent), Ok(raw_capacity)) => Self {
                charge_state,
                charge_percent,
                capacity_mah: raw_capacity / 10.0,
                known: true,
            },
            _ => Self::unknown(),
        }
    }

    pub fn unknown() -> Self {
        Self {
            charge_state: 0,
            charge_percent: 0,
            capacity_mah: 0.0,
            known: false,
        }
    }

    /// Battery is OK when it was readable and above the critical threshold.
    pub fn is_ok(&self, critical_percent: u32) -> bool {
        self.known && self.charge_percent > critical_percent
    }
}

// ───────────────────────────────────────────────────────────────
// Signal strength
// ───────────────────────────────────────────────────────────────

/// Discrete signal quality buckets, ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalClass {
    None,
    Poor,
    Marginal,
    Ok,
    Good,
    Excellent,
}

impl fmt::Display for SignalClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::None => "None",
            Self::Poor => "Poor",
            Self::Marginal => "Marginal",
            Self::Ok => "OK",
            Self::Good => "Good",
            Self::Excellent => "Excellent",
        };
        f.write_str(text)
    }
}

/// Parsed `+CSQ:` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalStrength {
    pub rssi: u32,
    pub bit_error_rate: u32,
}

impl SignalStrength {
    /// `+CSQ: <rssi>,<ber>`. Malformed replies degrade to rssi 0 ("None").
    pub fn parse(reply: &str) -> Self {
        let parsed = reply.split_once(':').and_then(|(_, values)| {
            let (rssi, ber) = values.split_once(',')?;
            Some(SignalStrength {
                rssi: rssi.trim().parse().ok()?,
                bit_error_rate: ber.trim().parse().ok()?,
            })
        });
        parsed.unwrap_or(Self {
            rssi: 0,
            bit_error_rate: 0,
        })
    }

    pub fn classify(&self, thresholds: &SignalThresholds) -> SignalClass {
        if self.rssi == 0 {
            SignalClass::None
        } else if self.rssi <= thresholds.poor_max {
            SignalClass::Poor
        } else if self.rssi <= thresholds.marginal_max {
            SignalClass::Marginal
        } else if self.rssi <= thresholds.ok_max {
            SignalClass::Ok
        } else if self.rssi <= thresholds.good_max {
            SignalClass::Good
        } else {
            SignalClass::Excellent
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_decorations() {
        assert_eq!(normalize_phone("\"2061234567\""), "2061234567");
        assert_eq!(normalize_phone("+2061234567"), "2061234567");
        assert_eq!(normalize_phone("\"\"+2061234567"), "2061234567");
        assert_eq!(normalize_phone("(206) 123-4567"), "2061234567");
        assert_eq!(normalize_phone("2061234567"), "2061234567");
    }

    #[test]
    fn allow_list_matches_either_direction() {
        let list = vec!["2061234567".to_string()];
        assert!(is_allowed_number("2061234567", &list));
        assert!(is_allowed_number("12061234567", &list), "leading country code");
        assert!(!is_allowed_number("2069999999", &list));
        assert!(!is_allowed_number("", &list));
    }

    #[test]
    fn cmgl_record_roundtrip() {
        let header = "+CMGL: 3,\"REC UNREAD\",\"+12065551234\",\"\",\"17/06/03\",\"09:41:22-32\"";
        let msg = SmsMessage::parse(header, "turn on please").unwrap();
        assert_eq!(msg.id, 3);
        assert_eq!(msg.status, "REC UNREAD");
        assert_eq!(msg.sender_digits(), "12065551234");
        assert_eq!(msg.text, "turn on please");
        let ts = msg.sent_time.unwrap();
        assert_eq!((ts.year, ts.month, ts.day), (2017, 6, 3));
        assert_eq!((ts.hour, ts.minute, ts.second), (9, 41, 22));
    }

    #[test]
    fn cmgl_malformed_header_is_dropped_not_fatal() {
        let err = SmsMessage::parse("+CMGL: 3,\"REC UNREAD\"", "body").unwrap_err();
        assert_eq!(err.what, "CMGL header");
    }

    #[test]
    fn cmgl_bad_id_is_dropped() {
        let header = "+CMGL: x,\"REC READ\",\"+1206\",\"\",\"17/06/03\",\"09:41:22\"";
        assert!(SmsMessage::parse(header, "body").is_err());
    }

    #[test]
    fn cmgl_bad_timestamp_keeps_message() {
        let header = "+CMGL: 7,\"REC READ\",\"+12065551234\",\"\",\"banana\",\"oops\"";
        let msg = SmsMessage::parse(header, "status").unwrap();
        assert_eq!(msg.id, 7);
        assert!(msg.sent_time.is_none());
    }

    #[test]
    fn cbc_parses_and_scales_capacity() {
        let cbc = BatteryCondition::parse("+CBC: 0,83,4175");
        assert!(cbc.known);
        assert_eq!(cbc.charge_percent, 83);
        assert!((cbc.capacity_mah - 417.5).abs() < f32::EPSILON);
        assert!(cbc.is_ok(40));
        assert!(!cbc.is_ok(90));
    }

    #[test]
    fn cbc_malformed_is_unknown_not_panic() {
        assert!(!BatteryCondition::parse("garbage").known);
        assert!(!BatteryCondition::parse("+CBC: 0").known);
        assert!(!BatteryCondition::parse("+CBC: a,b,c").known);
        assert!(!BatteryCondition::parse("").is_ok(40));
    }

    #[test]
    fn csq_classification_buckets() {
        let t = SignalThresholds::default();
        let classify = |rssi| SignalStrength { rssi, bit_error_rate: 0 }.classify(&t);
        assert_eq!(classify(0), SignalClass::None);
        assert_eq!(classify(3), SignalClass::Poor);
        assert_eq!(classify(9), SignalClass::Marginal);
        assert_eq!(classify(14), SignalClass::Ok);
        assert_eq!(classify(19), SignalClass::Good);
        assert_eq!(classify(25), SignalClass::Excellent);
    }

    #[test]
    fn csq_malformed_degrades_to_none() {
        let s = SignalStrength::parse("nonsense");
        assert_eq!(s.rssi, 0);
        assert_eq!(s.classify(&SignalThresholds::default()), SignalClass::None);
        let s = SignalStrength::parse("+CSQ: 18,0");
        assert_eq!(s.rssi, 18);
    }
}
