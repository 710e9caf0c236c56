use chrono::{DateTime, Utc};
use tracing::debug;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::*;

use super::errors::{CrlError, CrlResult};
use super::extensions::{
    OID_DELTA_CRL_INDICATOR, decode_crl_number, normalize_dn, reason_from_code, serial_to_hex,
};
use super::types::{ParsedCrl, RevokedEntry};

const PEM_PREFIX: &[u8] = b"-----BEGIN";

impl ParsedCrl {
    /// Parses a DER or PEM encoded CRL.
    pub fn from_bytes(data: &[u8]) -> CrlResult<Self> {
        if data.trim_ascii_start().starts_with(PEM_PREFIX) {
            let (_, pem) = parse_x509_pem(data)
                .map_err(|e| CrlError::Decode(format!("Invalid PEM CRL: {e}")))?;
            return Self::from_der(&pem.contents);
        }
        Self::from_der(data)
    }

    /// Parses a DER encoded CRL.
    pub fn from_der(der: &[u8]) -> CrlResult<Self> {
        let (_, crl) =
            CertificateRevocationList::from_der(der).map_err(|e| CrlError::Parse(e.into()))?;

        let crl_number = crl.crl_number().map(|number| number.to_string());
        // x509-parser leaves the Delta CRL Indicator undecoded
        let delta_indicator = crl
            .extensions()
            .iter()
            .find(|ext| ext.oid.to_id_string() == OID_DELTA_CRL_INDICATOR)
            .map(|ext| decode_crl_number(ext.value))
            .transpose()?;

        let revoked = crl
            .iter_revoked_certificates()
            .map(|revoked_cert| {
                Ok(RevokedEntry {
                    serial_number: serial_to_hex(revoked_cert.raw_serial()),
                    revocation_date: asn1_time_to_chrono(revoked_cert.revocation_date)?,
                    reason: revoked_cert
                        .reason_code()
                        .and_then(|(_, code)| reason_from_code(code)),
                })
            })
            .collect::<CrlResult<Vec<_>>>()?;

        let parsed = Self {
            issuer_dn: normalize_dn(crl.issuer()),
            this_update: asn1_time_to_chrono(crl.last_update())?,
            next_update: crl.next_update().map(asn1_time_to_chrono).transpose()?,
            crl_number,
            delta_indicator,
            revoked,
        };

        debug!(
            "Parsed CRL from {} (number {:?}, delta of {:?}, {} entries)",
            parsed.issuer_dn,
            parsed.crl_number,
            parsed.delta_indicator,
            parsed.revoked.len()
        );
        Ok(parsed)
    }
}

fn asn1_time_to_chrono(time: ASN1Time) -> CrlResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(time.timestamp(), 0)
        .ok_or_else(|| CrlError::MalformedCrl(format!("Time out of range: {time}")))
}
