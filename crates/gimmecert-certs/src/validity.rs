//! Validity windows of issued certificates.
//!
//! Every certificate starts 15 minutes in the past to tolerate clock drift
//! between machines and is valid for one calendar year from there on. Both
//! bounds are truncated to whole seconds. Certificates issued by a CA are
//! additionally clamped into the validity window of that CA.
use std::time::Duration;

use snafu::{OptionExt, ResultExt, Snafu};
use time::OffsetDateTime;
use x509_cert::{
    Certificate,
    der::{
        DateTime,
        asn1::{GeneralizedTime, UtcTime},
    },
    time::{Time, Validity},
};

/// How far in the past the validity of a new certificate begins.
pub const CLOCK_DRIFT_TOLERANCE: time::Duration = time::Duration::minutes(15);

/// Certificates with a validity bound in this year or later have to use
/// GeneralizedTime instead of UTCTime (RFC 5280, section 4.1.2.5).
const GENERALIZED_TIME_YEAR: u16 = 2050;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("the validity window starting at {not_before} can't be extended by a year"))]
    ExtendByYear { not_before: OffsetDateTime },

    #[snafu(display("timestamp {timestamp} is outside of the supported range"))]
    TimestampOutOfRange { timestamp: i64 },

    #[snafu(display("failed to convert timestamp {timestamp} to X.509 time"))]
    ConvertToX509Time {
        source: x509_cert::der::Error,
        timestamp: i64,
    },
}

/// The `[not_before, not_after]` range a certificate is valid for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidityWindow {
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
}

impl ValidityWindow {
    /// Both bounds are truncated to whole seconds.
    pub fn new(not_before: OffsetDateTime, not_after: OffsetDateTime) -> Self {
        Self {
            not_before: truncate_to_seconds(not_before),
            not_after: truncate_to_seconds(not_after),
        }
    }

    /// The standard window relative to the current wall-clock time.
    pub fn from_now() -> Result<Self, Error> {
        Self::starting_at(OffsetDateTime::now_utc())
    }

    /// The standard window relative to `now`: `now - 15 minutes` until one
    /// calendar year later, truncated to whole seconds. A window starting on
    /// 29 February ends on 28 February.
    pub fn starting_at(now: OffsetDateTime) -> Result<Self, Error> {
        let not_before = truncate_to_seconds(now) - CLOCK_DRIFT_TOLERANCE;
        let next_year = not_before.year() + 1;

        let not_after = not_before
            .replace_year(next_year)
            .or_else(|_| (not_before - time::Duration::days(1)).replace_year(next_year))
            .ok()
            .context(ExtendByYearSnafu { not_before })?;

        Ok(Self {
            not_before,
            not_after,
        })
    }

    /// Reads the validity window of `certificate`.
    pub fn of_certificate(certificate: &Certificate) -> Result<Self, Error> {
        Self::from_validity(&certificate.tbs_certificate.validity)
    }

    pub fn from_validity(validity: &Validity) -> Result<Self, Error> {
        Ok(Self {
            not_before: from_x509_time(&validity.not_before)?,
            not_after: from_x509_time(&validity.not_after)?,
        })
    }

    pub fn to_validity(&self) -> Result<Validity, Error> {
        Ok(Validity {
            not_before: to_x509_time(self.not_before)?,
            not_after: to_x509_time(self.not_after)?,
        })
    }

    /// Restricts this window to the window of the `issuer`, so that the
    /// result neither starts before nor ends after the issuer.
    pub fn clamp_to(self, issuer: &Self) -> Self {
        Self {
            not_before: self.not_before.max(issuer.not_before),
            not_after: self.not_after.min(issuer.not_after),
        }
    }

    pub fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }
}

fn truncate_to_seconds(time: OffsetDateTime) -> OffsetDateTime {
    time - time::Duration::nanoseconds(i64::from(time.nanosecond()))
}

fn from_x509_time(time: &Time) -> Result<OffsetDateTime, Error> {
    let timestamp = i64::try_from(time.to_unix_duration().as_secs()).unwrap_or(i64::MAX);
    OffsetDateTime::from_unix_timestamp(timestamp)
        .ok()
        .context(TimestampOutOfRangeSnafu { timestamp })
}

fn to_x509_time(time: OffsetDateTime) -> Result<Time, Error> {
    let timestamp = time.unix_timestamp();
    let seconds = u64::try_from(timestamp)
        .ok()
        .context(TimestampOutOfRangeSnafu { timestamp })?;
    let date_time = DateTime::from_unix_duration(Duration::from_secs(seconds))
        .context(ConvertToX509TimeSnafu { timestamp })?;

    if date_time.year() >= GENERALIZED_TIME_YEAR {
        Ok(Time::GeneralTime(GeneralizedTime::from_date_time(date_time)))
    } else {
        let utc_time =
            UtcTime::from_date_time(date_time).context(ConvertToX509TimeSnafu { timestamp })?;
        Ok(Time::UtcTime(utc_time))
    }
}
