use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::extensions::{normalize_dn_str, normalize_serial};

/// Label stored for entries whose CRL entry carries no reasonCode extension.
pub const UNKNOWN_REASON: &str = "UNKNOWN";

/// CRL entry reason codes (RFC 5280 §5.3.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RevocationReason {
    Unspecified,
    KeyCompromise,
    CaCompromise,
    AffiliationChanged,
    Superseded,
    CessationOfOperation,
    CertificateHold,
    RemoveFromCrl,
    PrivilegeWithdrawn,
    AaCompromise,
}

impl RevocationReason {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Unspecified),
            1 => Some(Self::KeyCompromise),
            2 => Some(Self::CaCompromise),
            3 => Some(Self::AffiliationChanged),
            4 => Some(Self::Superseded),
            5 => Some(Self::CessationOfOperation),
            6 => Some(Self::CertificateHold),
            // 7 is not assigned
            8 => Some(Self::RemoveFromCrl),
            9 => Some(Self::PrivilegeWithdrawn),
            10 => Some(Self::AaCompromise),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Unspecified => "UNSPECIFIED",
            Self::KeyCompromise => "KEY_COMPROMISE",
            Self::CaCompromise => "CA_COMPROMISE",
            Self::AffiliationChanged => "AFFILIATION_CHANGED",
            Self::Superseded => "SUPERSEDED",
            Self::CessationOfOperation => "CESSATION_OF_OPERATION",
            Self::CertificateHold => "CERTIFICATE_HOLD",
            Self::RemoveFromCrl => "REMOVE_FROM_CRL",
            Self::PrivilegeWithdrawn => "PRIVILEGE_WITHDRAWN",
            Self::AaCompromise => "AA_COMPROMISE",
        }
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One revoked-certificate record as it appears in a fetched CRL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokedEntry {
    /// Lowercase hex, no leading zeros
    pub serial_number: String,
    pub revocation_date: DateTime<Utc>,
    pub reason: Option<RevocationReason>,
}

impl RevokedEntry {
    pub fn reason_label(&self) -> String {
        self.reason
            .map(|reason| reason.label().to_string())
            .unwrap_or_else(|| UNKNOWN_REASON.to_string())
    }

    pub fn is_removal(&self) -> bool {
        self.reason == Some(RevocationReason::RemoveFromCrl)
    }
}

/// A fetched base or delta CRL, reduced to the fields the engine works with.
///
/// The signature of the CRL is not verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCrl {
    /// Normalized issuer DN taken from the CRL's own issuer field
    pub issuer_dn: String,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
    /// Decimal CRL Number, if the extension is present
    pub crl_number: Option<String>,
    /// Decimal base CRL Number named by the Delta CRL Indicator, if present
    pub delta_indicator: Option<String>,
    pub revoked: Vec<RevokedEntry>,
}

impl ParsedCrl {
    pub fn is_delta(&self) -> bool {
        self.delta_indicator.is_some()
    }
}

/// Natural cache key: the certificate's issuer DN and the issuing CA certificate's serial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssuerKey {
    issuer_dn: String,
    serial_number: String,
}

impl IssuerKey {
    pub fn new(issuer_dn: &str, serial_number: &str) -> Self {
        Self {
            issuer_dn: normalize_dn_str(issuer_dn),
            serial_number: normalize_serial(serial_number),
        }
    }

    pub fn issuer_dn(&self) -> &str {
        &self.issuer_dn
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }
}

impl fmt::Display for IssuerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.issuer_dn, self.serial_number)
    }
}

/// The cached view of one issuer's base CRL plus any delta CRLs merged on top of it.
///
/// The base CRL Number never changes for a given record: a new base CRL always produces a new
/// record with a new id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrlRecord {
    id: Uuid,
    issuer: IssuerKey,
    crl_issuer_dn: String,
    crl_number: String,
    next_update: Option<DateTime<Utc>>,
    last_revocation_date: Option<DateTime<Utc>>,
    ca_certificate_uuid: Option<Uuid>,
    crl_number_delta: Option<String>,
    next_update_delta: Option<DateTime<Utc>>,
}

impl CrlRecord {
    pub fn new(
        issuer: IssuerKey,
        crl_issuer_dn: impl Into<String>,
        crl_number: impl Into<String>,
        next_update: Option<DateTime<Utc>>,
        last_revocation_date: Option<DateTime<Utc>>,
        ca_certificate_uuid: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            issuer,
            crl_issuer_dn: crl_issuer_dn.into(),
            crl_number: crl_number.into(),
            next_update,
            last_revocation_date,
            ca_certificate_uuid,
            crl_number_delta: None,
            next_update_delta: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn issuer(&self) -> &IssuerKey {
        &self.issuer
    }

    pub fn crl_issuer_dn(&self) -> &str {
        &self.crl_issuer_dn
    }

    pub fn crl_number(&self) -> &str {
        &self.crl_number
    }

    pub fn next_update(&self) -> Option<DateTime<Utc>> {
        self.next_update
    }

    /// Highest revocation date observed across the entries held by this record.
    pub fn last_revocation_date(&self) -> Option<DateTime<Utc>> {
        self.last_revocation_date
    }

    pub fn ca_certificate_uuid(&self) -> Option<Uuid> {
        self.ca_certificate_uuid
    }

    pub fn crl_number_delta(&self) -> Option<&str> {
        self.crl_number_delta.as_deref()
    }

    pub fn next_update_delta(&self) -> Option<DateTime<Utc>> {
        self.next_update_delta
    }

    /// A record without nextUpdate is never fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.next_update.is_some_and(|next_update| now < next_update)
    }

    /// No delta merged yet, or the last merged delta has expired.
    pub fn needs_delta(&self, now: DateTime<Utc>) -> bool {
        self.next_update_delta
            .is_none_or(|next_update_delta| now >= next_update_delta)
    }

    pub(crate) fn commit_delta(
        &mut self,
        crl_number_delta: String,
        next_update_delta: Option<DateTime<Utc>>,
        last_revocation_date: Option<DateTime<Utc>>,
    ) {
        self.crl_number_delta = Some(crl_number_delta);
        self.next_update_delta = next_update_delta;
        self.last_revocation_date = last_revocation_date;
    }
}

/// A certificate currently known to be revoked under a [`CrlRecord`].
///
/// Identified by `(crl_record_id, serial_number)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrlEntry {
    pub crl_record_id: Uuid,
    /// Lowercase hex, no leading zeros
    pub serial_number: String,
    pub revocation_date: DateTime<Utc>,
    pub revocation_reason: String,
}

impl CrlEntry {
    pub fn from_revoked(crl_record_id: Uuid, revoked: &RevokedEntry) -> Self {
        Self {
            crl_record_id,
            serial_number: revoked.serial_number.clone(),
            revocation_date: revoked.revocation_date,
            revocation_reason: revoked.reason_label(),
        }
    }
}

/// Revocation-relevant view of a certificate: who issued it, its serial, and the raw payloads
/// of its CRL Distribution Points and Freshest CRL extensions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Normalized issuer DN
    pub issuer_dn: String,
    /// Lowercase hex, no leading zeros
    pub serial_number: String,
    pub crl_distribution_points: Option<Vec<u8>>,
    pub freshest_crl: Option<Vec<u8>>,
}
