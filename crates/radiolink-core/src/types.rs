//! Domain types shared by the protocol engines and their collaborators.

use std::fmt;

use chrono::{DateTime, Local};

/// Readings strictly above this level are [`SignalQuality::Strong`].
pub const STRONG_THRESHOLD_DBM: i16 = -70;

/// Readings at or below this level are [`SignalQuality::Weak`].
pub const WEAK_THRESHOLD_DBM: i16 = -85;

/// Qualitative classification of a signal-strength reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalQuality {
    /// Above -70 dBm.
    Strong,
    /// Above -85 dBm, up to and including -70 dBm.
    Fair,
    /// -85 dBm or below.
    Weak,
}

impl SignalQuality {
    /// Classify a reading in dBm.
    ///
    /// ```
    /// use radiolink_core::SignalQuality;
    ///
    /// assert_eq!(SignalQuality::from_dbm(-69), SignalQuality::Strong);
    /// assert_eq!(SignalQuality::from_dbm(-70), SignalQuality::Fair);
    /// assert_eq!(SignalQuality::from_dbm(-85), SignalQuality::Weak);
    /// ```
    pub fn from_dbm(dbm: i16) -> Self {
        if dbm > STRONG_THRESHOLD_DBM {
            SignalQuality::Strong
        } else if dbm > WEAK_THRESHOLD_DBM {
            SignalQuality::Fair
        } else {
            SignalQuality::Weak
        }
    }
}

impl fmt::Display for SignalQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalQuality::Strong => "Strong",
            SignalQuality::Fair => "Fair",
            SignalQuality::Weak => "Weak",
        };
        f.write_str(s)
    }
}

/// One signal-strength reading taken after inbound traffic was observed.
///
/// `dbm` is the negation of the unsigned magnitude the modem reports, so it
/// is never positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RssiSample {
    /// Capture instant (local wall clock).
    pub timestamp: DateTime<Local>,
    /// Received signal strength in dBm.
    pub dbm: i16,
}

impl RssiSample {
    /// Build a sample from the magnitude reported by the modem.
    pub fn from_magnitude(timestamp: DateTime<Local>, magnitude: u8) -> Self {
        RssiSample {
            timestamp,
            dbm: -i16::from(magnitude),
        }
    }

    /// Qualitative classification, computed on read.
    pub fn classification(&self) -> SignalQuality {
        SignalQuality::from_dbm(self.dbm)
    }
}

/// Summary statistics over a non-empty set of samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RssiStats {
    /// Number of samples the statistics cover.
    pub count: usize,
    /// Arithmetic mean in dBm.
    pub avg: f64,
    /// Weakest reading in dBm.
    pub min: i16,
    /// Strongest reading in dBm.
    pub max: i16,
}

/// Outcome of one transmit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionStatus {
    /// The frame was written to the transport.
    Success,
    /// The serial driver did not accept the frame in time.
    Timeout,
    /// Any other transport failure during the write.
    TransportError,
}

impl fmt::Display for TransmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransmissionStatus::Success => "Success",
            TransmissionStatus::Timeout => "Timeout Error",
            TransmissionStatus::TransportError => "Transport Error",
        };
        f.write_str(s)
    }
}

/// Record of one transmit attempt, handed to the logging collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmissionRecord {
    pub timestamp: DateTime<Local>,
    pub status: TransmissionStatus,
    /// The frame as lowercase hex.
    pub frame_hex: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_strong_above_minus_70() {
        assert_eq!(SignalQuality::from_dbm(0), SignalQuality::Strong);
        assert_eq!(SignalQuality::from_dbm(-40), SignalQuality::Strong);
        assert_eq!(SignalQuality::from_dbm(-69), SignalQuality::Strong);
    }

    #[test]
    fn classify_minus_70_is_fair() {
        assert_eq!(SignalQuality::from_dbm(-70), SignalQuality::Fair);
    }

    #[test]
    fn classify_fair_band() {
        assert_eq!(SignalQuality::from_dbm(-71), SignalQuality::Fair);
        assert_eq!(SignalQuality::from_dbm(-80), SignalQuality::Fair);
        assert_eq!(SignalQuality::from_dbm(-84), SignalQuality::Fair);
    }

    #[test]
    fn classify_minus_85_is_weak() {
        assert_eq!(SignalQuality::from_dbm(-85), SignalQuality::Weak);
        assert_eq!(SignalQuality::from_dbm(-86), SignalQuality::Weak);
        assert_eq!(SignalQuality::from_dbm(-255), SignalQuality::Weak);
    }

    #[test]
    fn sample_from_magnitude_negates() {
        let s = RssiSample::from_magnitude(Local::now(), 0x4A);
        assert_eq!(s.dbm, -74);
        assert_eq!(s.classification(), SignalQuality::Fair);
    }

    #[test]
    fn sample_from_zero_magnitude() {
        let s = RssiSample::from_magnitude(Local::now(), 0);
        assert_eq!(s.dbm, 0);
    }

    #[test]
    fn sample_from_max_magnitude() {
        let s = RssiSample::from_magnitude(Local::now(), 0xFF);
        assert_eq!(s.dbm, -255);
    }

    #[test]
    fn transmission_status_display() {
        assert_eq!(TransmissionStatus::Success.to_string(), "Success");
        assert_eq!(TransmissionStatus::Timeout.to_string(), "Timeout Error");
        assert_eq!(
            TransmissionStatus::TransportError.to_string(),
            "Transport Error"
        );
    }

    #[test]
    fn signal_quality_display() {
        assert_eq!(SignalQuality::Strong.to_string(), "Strong");
        assert_eq!(SignalQuality::Fair.to_string(), "Fair");
        assert_eq!(SignalQuality::Weak.to_string(), "Weak");
    }
}
