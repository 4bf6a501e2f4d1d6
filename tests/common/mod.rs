//! Shared helpers for integration tests

#![allow(dead_code)]

use rcgen::{Certificate, CertificateParams, DistinguishedName, DnType};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

pub const DAY: u64 = 24 * 60 * 60;

/// Self-signed certificate expiring `days` from now (negative: already expired)
pub fn certificate(common_name: &str, days: i64) -> Certificate {
    let mut params = CertificateParams::new(vec![format!("{}.test", common_name)]);
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, common_name);
    params.distinguished_name = name;

    let now = SystemTime::now();
    params.not_before = (now - Duration::from_secs(365 * DAY)).into();
    let not_after = if days >= 0 {
        now + Duration::from_secs(days as u64 * DAY)
    } else {
        now - Duration::from_secs(days.unsigned_abs() * DAY)
    };
    params.not_after = not_after.into();

    Certificate::from_params(params).unwrap()
}

/// PEM text of a certificate expiring `days` from now
pub fn pem(common_name: &str, days: i64) -> String {
    certificate(common_name, days).serialize_pem().unwrap()
}

/// Write a PEM file holding one certificate per entry of `days`, in order
pub fn write_chain(dir: &Path, file_name: &str, days: &[i64]) -> PathBuf {
    let contents: String = days
        .iter()
        .enumerate()
        .map(|(i, d)| pem(&format!("cert-{}", i), *d))
        .collect();

    let path = dir.join(file_name);
    fs::write(&path, contents).unwrap();
    path
}
