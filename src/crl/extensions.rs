//! Decoding of the X.509 extensions that drive CRL acquisition.
//!
//! - CRL Distribution Points (2.5.29.31) and Freshest CRL (2.5.29.46) share the
//!   `CRLDistributionPoints` syntax; only `fullName` URIs with an http(s) scheme are kept.
//! - CRL Number (2.5.29.20) and Delta CRL Indicator (2.5.29.27) are non-negative INTEGERs,
//!   carried as decimal strings.

use std::cmp::Ordering;

use tracing::{debug, warn};
use x509_parser::der_parser::der::parse_der_integer;
use x509_parser::extensions::{
    CRLDistributionPoints, DistributionPointName, GeneralName,
};
use x509_parser::x509::ReasonCode;
use x509_parser::num_bigint::BigUint;
use x509_parser::prelude::*;

use super::errors::{CrlError, CrlResult};
use super::types::{CertificateInfo, ParsedCrl, RevocationReason};

pub const OID_CRL_DISTRIBUTION_POINTS: &str = "2.5.29.31";
pub const OID_FRESHEST_CRL: &str = "2.5.29.46";
pub const OID_DELTA_CRL_INDICATOR: &str = "2.5.29.27";

/// Extracts the http(s) URLs from a CRL Distribution Points or Freshest CRL extension payload.
///
/// Distribution points named relative to the CRL issuer, and non-URI or non-http(s) general
/// names, are skipped. Duplicates are dropped while keeping the first occurrence.
pub fn extract_distribution_point_urls(extension_bytes: &[u8]) -> CrlResult<Vec<String>> {
    let (rest, points) =
        CRLDistributionPoints::from_der(extension_bytes).map_err(|e| CrlError::Parse(e.into()))?;
    if !rest.is_empty() {
        return Err(CrlError::Decode(format!(
            "{} trailing bytes after distribution points",
            rest.len()
        )));
    }

    let mut urls: Vec<String> = Vec::new();
    for point in &points.points {
        // reasons and cRLIssuer do not carry URLs
        let Some(name) = &point.distribution_point else {
            continue;
        };
        let DistributionPointName::FullName(general_names) = name else {
            debug!("Skipping distribution point named relative to the CRL issuer");
            continue;
        };

        for general_name in general_names {
            let GeneralName::URI(uri) = general_name else {
                continue;
            };
            if is_http_url(uri) && !urls.iter().any(|known| known == uri) {
                urls.push(uri.to_string());
            } else {
                debug!("Ignoring distribution point URI: {}", uri);
            }
        }
    }

    Ok(urls)
}

fn is_http_url(uri: &str) -> bool {
    let lower = uri.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Returns the CRL Number of a base or delta CRL.
pub fn extract_crl_number(crl: &ParsedCrl) -> CrlResult<String> {
    crl.crl_number
        .clone()
        .ok_or_else(|| CrlError::MalformedCrl("CRL Number extension is missing".into()))
}

/// Returns the CRL Number of the base CRL a delta CRL was computed against.
pub fn extract_delta_indicator(delta_crl: &ParsedCrl) -> CrlResult<String> {
    delta_crl
        .delta_indicator
        .clone()
        .ok_or_else(|| CrlError::MalformedCrl("Delta CRL Indicator extension is missing".into()))
}

/// Decodes a Delta CRL Indicator payload (a BaseCRLNumber INTEGER) to its decimal form.
pub fn decode_crl_number(extension_bytes: &[u8]) -> CrlResult<String> {
    let (rest, integer) = parse_der_integer(extension_bytes)
        .map_err(|e| CrlError::Decode(format!("Invalid CRL Number INTEGER: {e}")))?;
    if !rest.is_empty() {
        return Err(CrlError::Decode(format!(
            "{} trailing bytes after CRL Number",
            rest.len()
        )));
    }

    let number = integer
        .as_bigint()
        .ok()
        .and_then(|value| value.to_biguint())
        .ok_or_else(|| CrlError::Decode("CRL Number is not a non-negative INTEGER".into()))?;
    Ok(number.to_string())
}

/// Maps a CRL entry reasonCode. Unassigned codes map to `None`.
pub fn reason_from_code(code: ReasonCode) -> Option<RevocationReason> {
    let reason = RevocationReason::from_u8(code.0);
    if reason.is_none() {
        warn!("Unassigned CRL reason code {}", code.0);
    }
    reason
}

/// Numeric comparison of two decimal CRL Numbers.
pub fn compare_crl_numbers(left: &str, right: &str) -> CrlResult<Ordering> {
    let parse = |value: &str| {
        value.trim().parse::<BigUint>().map_err(|e| {
            CrlError::MalformedCrl(format!("CRL Number '{value}' is not a decimal integer: {e}"))
        })
    };
    Ok(parse(left)?.cmp(&parse(right)?))
}

/// Normalized form of an X.509 name.
pub fn normalize_dn(name: &X509Name) -> String {
    normalize_dn_str(&name.to_string())
}

/// Normalizes a DN string: attribute types upper-cased, values lower-cased with runs of
/// whitespace collapsed, RDNs joined with `,`.
pub fn normalize_dn_str(dn: &str) -> String {
    dn.split(',')
        .map(str::trim)
        .filter(|rdn| !rdn.is_empty())
        .map(|rdn| match rdn.split_once('=') {
            Some((key, value)) => format!(
                "{}={}",
                key.trim().to_ascii_uppercase(),
                collapse_whitespace(value).to_lowercase()
            ),
            None => collapse_whitespace(rdn).to_lowercase(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalizes a hex serial number: lowercase, no separators, no leading zeros.
pub fn normalize_serial(serial: &str) -> String {
    let serial = serial.trim();
    let serial = serial
        .strip_prefix("0x")
        .or_else(|| serial.strip_prefix("0X"))
        .unwrap_or(serial);
    let digits: String = serial
        .chars()
        .filter(|c| *c != ':' && !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Serial number of a parsed certificate or CRL entry in normalized hex.
pub fn serial_to_hex(raw_serial: &[u8]) -> String {
    normalize_serial(&hex::encode(raw_serial))
}

impl CertificateInfo {
    pub fn from_x509(cert: &X509Certificate) -> Self {
        let extension_value = |oid: &str| {
            cert.extensions()
                .iter()
                .find(|ext| ext.oid.to_id_string() == oid)
                .map(|ext| ext.value.to_vec())
        };

        Self {
            issuer_dn: normalize_dn(cert.issuer()),
            serial_number: serial_to_hex(cert.tbs_certificate.raw_serial()),
            crl_distribution_points: extension_value(OID_CRL_DISTRIBUTION_POINTS),
            freshest_crl: extension_value(OID_FRESHEST_CRL),
        }
    }

    pub fn from_der(der: &[u8]) -> CrlResult<Self> {
        let (_, cert) = X509Certificate::from_der(der).map_err(|e| CrlError::Parse(e.into()))?;
        Ok(Self::from_x509(&cert))
    }

    /// Base CRL URLs. A malformed extension is logged and treated as absent.
    pub fn crl_distribution_point_urls(&self) -> Vec<String> {
        decode_or_empty(self.crl_distribution_points.as_deref(), "CRL Distribution Points")
    }

    /// Delta CRL URLs. A malformed extension is logged and treated as absent.
    pub fn freshest_crl_urls(&self) -> Vec<String> {
        decode_or_empty(self.freshest_crl.as_deref(), "Freshest CRL")
    }
}

fn decode_or_empty(extension: Option<&[u8]>, name: &str) -> Vec<String> {
    let Some(bytes) = extension else {
        return Vec::new();
    };
    match extract_distribution_point_urls(bytes) {
        Ok(urls) => urls,
        Err(e) => {
            warn!("Ignoring undecodable {} extension: {}", name, e);
            Vec::new()
        }
    }
}
