//! DER builders for unit tests. The produced CRLs carry a dummy signature.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};

const OID_COMMON_NAME: &[u8] = &[0x55, 0x04, 0x03];
const OID_CRL_NUMBER: &[u8] = &[0x55, 0x1D, 0x14];
const OID_DELTA_CRL_INDICATOR: &[u8] = &[0x55, 0x1D, 0x1B];
const OID_REASON_CODE: &[u8] = &[0x55, 0x1D, 0x15];
const OID_SHA256_WITH_RSA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0B];

pub(crate) fn tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = value.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let len_bytes: Vec<u8> = len
            .to_be_bytes()
            .into_iter()
            .skip_while(|byte| *byte == 0)
            .collect();
        out.push(0x80 | len_bytes.len() as u8);
        out.extend_from_slice(&len_bytes);
    }
    out.extend_from_slice(value);
    out
}

fn concat(parts: &[Vec<u8>]) -> Vec<u8> {
    parts.concat()
}

fn unsigned_integer(magnitude: &[u8]) -> Vec<u8> {
    let mut bytes: Vec<u8> = magnitude.iter().copied().skip_while(|b| *b == 0).collect();
    if bytes.is_empty() || bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0);
    }
    tlv(0x02, &bytes)
}

fn utc_time(time: DateTime<Utc>) -> Vec<u8> {
    tlv(0x17, time.format("%y%m%d%H%M%SZ").to_string().as_bytes())
}

fn extension(oid: &[u8], value: &[u8]) -> Vec<u8> {
    tlv(0x30, &concat(&[tlv(0x06, oid), tlv(0x04, value)]))
}

fn algorithm() -> Vec<u8> {
    tlv(0x30, &concat(&[tlv(0x06, OID_SHA256_WITH_RSA), vec![0x05, 0x00]]))
}

/// RelativeDistinguishedName holding a single CN attribute.
pub(crate) fn rdn(common_name: &str) -> Vec<u8> {
    let attribute = tlv(
        0x30,
        &concat(&[tlv(0x06, OID_COMMON_NAME), tlv(0x0C, common_name.as_bytes())]),
    );
    tlv(0x31, &attribute)
}

fn name(common_name: &str) -> Vec<u8> {
    tlv(0x30, &rdn(common_name))
}

/// CRLDistributionPoints with one fullName URI per distribution point.
pub(crate) fn distribution_points(urls: &[&str]) -> Vec<u8> {
    let points: Vec<Vec<u8>> = urls
        .iter()
        .map(|url| {
            let full_name = tlv(0xA0, &tlv(0x86, url.as_bytes()));
            tlv(0x30, &tlv(0xA0, &full_name))
        })
        .collect();
    tlv(0x30, &concat(&points))
}

pub(crate) struct TestRevoked {
    pub serial_hex: &'static str,
    pub revocation_date: DateTime<Utc>,
    pub reason_code: Option<u8>,
}

pub(crate) struct TestCrl {
    pub issuer_cn: &'static str,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
    pub crl_number: Option<u64>,
    pub delta_indicator: Option<u64>,
    pub revoked: Vec<TestRevoked>,
}

impl TestCrl {
    pub fn to_der(&self) -> Vec<u8> {
        let mut tbs = vec![
            tlv(0x02, &[0x01]),
            algorithm(),
            name(self.issuer_cn),
            utc_time(self.this_update),
        ];
        if let Some(next_update) = self.next_update {
            tbs.push(utc_time(next_update));
        }

        if !self.revoked.is_empty() {
            let entries: Vec<Vec<u8>> = self
                .revoked
                .iter()
                .map(|revoked| {
                    let serial = hex::decode(revoked.serial_hex).unwrap_or_default();
                    let mut fields = vec![unsigned_integer(&serial), utc_time(revoked.revocation_date)];
                    if let Some(code) = revoked.reason_code {
                        let reason = extension(OID_REASON_CODE, &tlv(0x0A, &[code]));
                        fields.push(tlv(0x30, &reason));
                    }
                    tlv(0x30, &concat(&fields))
                })
                .collect();
            tbs.push(tlv(0x30, &concat(&entries)));
        }

        let mut extensions = Vec::new();
        if let Some(number) = self.crl_number {
            extensions.push(extension(
                OID_CRL_NUMBER,
                &unsigned_integer(&number.to_be_bytes()),
            ));
        }
        if let Some(indicator) = self.delta_indicator {
            extensions.push(extension(
                OID_DELTA_CRL_INDICATOR,
                &unsigned_integer(&indicator.to_be_bytes()),
            ));
        }
        if !extensions.is_empty() {
            tbs.push(tlv(0xA0, &tlv(0x30, &concat(&extensions))));
        }

        let signature = tlv(0x03, &[0x00, 0x00]);
        tlv(
            0x30,
            &concat(&[tlv(0x30, &concat(&tbs)), algorithm(), signature]),
        )
    }

    pub fn to_pem(&self) -> String {
        let encoded = STANDARD.encode(self.to_der());
        let lines: Vec<&str> = encoded
            .as_bytes()
            .chunks(64)
            .filter_map(|line| std::str::from_utf8(line).ok())
            .collect();
        format!(
            "-----BEGIN X509 CRL-----\n{}\n-----END X509 CRL-----\n",
            lines.join("\n")
        )
    }
}
