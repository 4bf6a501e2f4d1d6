//! Certificate file parser
//!
//! Decoding order:
//! 1. Every `CERTIFICATE` PEM block, in file order. Other PEM labels (keys,
//!    CSRs) are skipped, and so is a block whose framing or base64 is broken:
//!    decoding resumes at the next `-----BEGIN ` line and stops only when no
//!    further header exists.
//! 2. If no PEM certificate was found, the whole buffer as one DER
//!    certificate.
//!
//! A PEM certificate block with a malformed payload fails the whole file
//! with [`ScanError::Parse`]; it is never silently dropped.

use crate::cert::record::CertificateRecord;
use crate::error::{ScanError, ScanResult};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::Path;
use tracing::debug;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::*;

/// Default per-file size limit (100 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// PEM label of certificate blocks
const CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// Start of a PEM header line
const PEM_BEGIN: &[u8] = b"-----BEGIN ";

/// Outer tag of every DER certificate (SEQUENCE, constructed)
const DER_SEQUENCE_TAG: u8 = 0x30;

/// Parses certificate files into [`CertificateRecord`]s
#[derive(Debug, Clone)]
pub struct CertParser {
    include_subject: bool,
    days_threshold: i64,
    max_file_size: u64,
}

impl CertParser {
    pub fn new(include_subject: bool, days_threshold: i64) -> Self {
        Self {
            include_subject,
            days_threshold,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Override the per-file size limit
    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    pub fn include_subject(&self) -> bool {
        self.include_subject
    }

    pub fn days_threshold(&self) -> i64 {
        self.days_threshold
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Read and parse one file.
    ///
    /// The size limit is enforced from metadata before any content is read.
    pub fn parse_file(&self, path: &Path) -> ScanResult<Vec<CertificateRecord>> {
        let metadata = fs::metadata(path).map_err(|e| ScanError::Io {
            path: path.to_path_buf(),
            reason: format!("failed to stat file: {}", e),
        })?;

        if metadata.len() > self.max_file_size {
            return Err(ScanError::FileTooLarge {
                path: path.to_path_buf(),
                size: metadata.len(),
                max: self.max_file_size,
            });
        }

        let data = fs::read(path).map_err(|e| ScanError::Io {
            path: path.to_path_buf(),
            reason: format!("failed to read file: {}", e),
        })?;

        self.parse_data(path, &data)
    }

    /// Parse an in-memory buffer as if it had been read from `path`
    pub fn parse_data(&self, path: &Path, data: &[u8]) -> ScanResult<Vec<CertificateRecord>> {
        // Sampled once so a chain is classified against one instant
        let now = Utc::now();
        let mut records = Vec::new();

        let mut rest = data;
        while let Some(start) = next_pem_header(rest) {
            let pem = match parse_x509_pem(&rest[start..]) {
                Ok((remaining, pem)) => {
                    rest = remaining;
                    pem
                }
                Err(e) => {
                    debug!(path = %path.display(), error = ?e, "Skipping malformed PEM block");
                    rest = &rest[start + PEM_BEGIN.len()..];
                    continue;
                }
            };

            if pem.label != CERTIFICATE_LABEL {
                continue;
            }

            let cert = pem.parse_x509().map_err(|e| ScanError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            records.push(self.build_record(path, &cert, now)?);
        }

        if !records.is_empty() {
            return Ok(records);
        }

        match X509Certificate::from_der(data) {
            Ok((_, cert)) => Ok(vec![self.build_record(path, &cert, now)?]),
            Err(e) if data.first() == Some(&DER_SEQUENCE_TAG) => Err(ScanError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
            Err(_) => Err(ScanError::NoCertificateFound {
                path: path.to_path_buf(),
            }),
        }
    }

    fn build_record(
        &self,
        path: &Path,
        cert: &X509Certificate<'_>,
        now: DateTime<Utc>,
    ) -> ScanResult<CertificateRecord> {
        let not_after = cert.validity().not_after.timestamp();
        let expiration_date =
            DateTime::from_timestamp(not_after, 0).ok_or_else(|| ScanError::Parse {
                path: path.to_path_buf(),
                reason: format!("notAfter timestamp {} out of range", not_after),
            })?;

        let record = CertificateRecord::new(
            path.to_path_buf(),
            expiration_date,
            now,
            self.days_threshold,
            cert.tbs_certificate.serial.to_string(),
        );

        if self.include_subject {
            Ok(record.with_names(cert.subject().to_string(), cert.issuer().to_string()))
        } else {
            Ok(record)
        }
    }
}

/// Offset of the next `-----BEGIN ` that starts a line
fn next_pem_header(data: &[u8]) -> Option<usize> {
    data.windows(PEM_BEGIN.len())
        .enumerate()
        .find(|&(i, window)| window == PEM_BEGIN && (i == 0 || data[i - 1] == b'\n'))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{Certificate, CertificateParams, DistinguishedName, DnType};
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    const DAY: u64 = 24 * 60 * 60;

    fn generate(not_after: SystemTime) -> Certificate {
        let mut params = CertificateParams::new(vec!["test.local".to_string()]);
        let mut name = DistinguishedName::new();
        name.push(DnType::CommonName, "Test Cert");
        name.push(DnType::OrganizationName, "Test Org");
        params.distinguished_name = name;
        params.not_before = (SystemTime::now() - Duration::from_secs(400 * DAY)).into();
        params.not_after = not_after.into();
        Certificate::from_params(params).unwrap()
    }

    fn cert_pem(not_after: SystemTime) -> String {
        generate(not_after).serialize_pem().unwrap()
    }

    fn days_from_now(days: u64) -> SystemTime {
        SystemTime::now() + Duration::from_secs(days * DAY)
    }

    #[test]
    fn test_new_parser() {
        let parser = CertParser::new(true, 30);
        assert!(parser.include_subject());
        assert_eq!(parser.days_threshold(), 30);
        assert_eq!(parser.max_file_size(), DEFAULT_MAX_FILE_SIZE);
    }

    #[test]
    fn test_single_certificate() {
        let parser = CertParser::new(true, 30);
        let pem = cert_pem(days_from_now(60));

        let records = parser.parse_data(Path::new("test.pem"), pem.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);

        let rec = &records[0];
        assert_eq!(rec.path, PathBuf::from("test.pem"));
        assert!(!rec.is_expired);
        assert!(!rec.is_expiring_soon);
        assert!(!rec.serial_number.is_empty());
        assert!(rec.subject.as_deref().unwrap().contains("Test Cert"));
        assert!(rec.issuer.is_some());
    }

    #[test]
    fn test_subject_omitted_by_default() {
        let parser = CertParser::new(false, 30);
        let pem = cert_pem(days_from_now(60));

        let records = parser.parse_data(Path::new("test.pem"), pem.as_bytes()).unwrap();
        assert!(records[0].subject.is_none());
        assert!(records[0].issuer.is_none());
    }

    #[test]
    fn test_certificate_chain_order_and_flags() {
        let parser = CertParser::new(false, 30);
        let chain: String = [90, 15, 180]
            .iter()
            .map(|d| cert_pem(days_from_now(*d)))
            .collect();

        let records = parser.parse_data(Path::new("chain.pem"), chain.as_bytes()).unwrap();
        assert_eq!(records.len(), 3);

        let flags: Vec<bool> = records.iter().map(|r| r.is_expiring_soon).collect();
        assert_eq!(flags, vec![false, true, false]);

        assert!(records[0].expiration_date < records[2].expiration_date);
        assert!(records[1].expiration_date < records[0].expiration_date);
    }

    #[test]
    fn test_non_certificate_blocks_are_skipped() {
        let parser = CertParser::new(false, 30);
        let cert = generate(days_from_now(100));
        let bundle = format!(
            "{}{}",
            cert.serialize_private_key_pem(),
            cert.serialize_pem().unwrap()
        );

        let records = parser.parse_data(Path::new("bundle.pem"), bundle.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_corrupt_block_is_skipped() {
        let parser = CertParser::new(false, 30);
        let bundle = format!(
            "-----BEGIN CERTIFICATE-----\n!!!notbase64!!!\n-----END CERTIFICATE-----\n{}",
            cert_pem(days_from_now(100))
        );

        let records = parser.parse_data(Path::new("b.pem"), bundle.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].is_expiring_soon);
    }

    #[test]
    fn test_comment_lines_and_unterminated_block() {
        let parser = CertParser::new(false, 30);
        let bundle = format!(
            "# issued by ops\n{}# trailing\n-----BEGIN CERTIFICATE-----\nMIIB\n",
            cert_pem(days_from_now(100))
        );

        let records = parser.parse_data(Path::new("c.pem"), bundle.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_next_pem_header_needs_line_start() {
        assert_eq!(next_pem_header(b"-----BEGIN X-----"), Some(0));
        assert_eq!(next_pem_header(b"# c\n-----BEGIN X-----"), Some(4));
        assert_eq!(next_pem_header(b"x -----BEGIN X-----"), None);
        assert_eq!(next_pem_header(b""), None);
    }

    #[test]
    fn test_expired_certificate() {
        let parser = CertParser::new(false, 30);
        let pem = cert_pem(SystemTime::now() - Duration::from_secs(DAY));

        let records = parser.parse_data(Path::new("expired.pem"), pem.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_expired);
        assert!(records[0].days_until_expiry < 0);
        assert!(!records[0].is_expiring_soon);
    }

    #[test]
    fn test_der_fallback() {
        let parser = CertParser::new(false, 30);
        let der = generate(days_from_now(10)).serialize_der().unwrap();

        let records = parser.parse_data(Path::new("cert.der"), &der).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_expiring_soon);
    }

    #[test]
    fn test_invalid_data_has_no_certificate() {
        let parser = CertParser::new(false, 30);
        let err = parser
            .parse_data(Path::new("invalid.pem"), b"invalid pem data")
            .unwrap_err();
        assert!(matches!(err, ScanError::NoCertificateFound { .. }));

        let err = parser.parse_data(Path::new("empty.pem"), b"").unwrap_err();
        assert!(matches!(err, ScanError::NoCertificateFound { .. }));
    }

    #[test]
    fn test_malformed_der_is_parse_error() {
        let parser = CertParser::new(false, 30);
        let err = parser
            .parse_data(Path::new("bad.der"), &[0x30, 0x82, 0x01, 0x00, 0x01])
            .unwrap_err();
        assert!(matches!(err, ScanError::Parse { .. }));
    }

    #[test]
    fn test_malformed_pem_payload_is_parse_error() {
        let parser = CertParser::new(false, 30);
        let pem = "-----BEGIN CERTIFICATE-----\nMIIBAAAA\n-----END CERTIFICATE-----\n";
        let err = parser.parse_data(Path::new("bad.pem"), pem.as_bytes()).unwrap_err();
        assert!(matches!(err, ScanError::Parse { .. }));
    }

    #[test]
    fn test_parse_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cert.crt");
        fs::write(&path, cert_pem(days_from_now(20))).unwrap();

        let records = CertParser::new(false, 30).parse_file(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, path);
    }

    #[test]
    fn test_missing_file() {
        let err = CertParser::new(false, 30)
            .parse_file(Path::new("/non/existent/file.pem"))
            .unwrap_err();
        assert!(matches!(err, ScanError::Io { .. }));
    }

    #[test]
    fn test_large_file_rejected_from_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("large.pem");
        let file = fs::File::create(&path).unwrap();
        // Sparse file: size reported by metadata without writing content
        file.set_len(2048).unwrap();

        let parser = CertParser::new(false, 30).with_max_file_size(1024);
        let err = parser.parse_file(&path).unwrap_err();
        assert_eq!(
            err,
            ScanError::FileTooLarge {
                path,
                size: 2048,
                max: 1024
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_large_file_content_never_read() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("large.pem");
        let file = fs::File::create(&path).unwrap();
        file.set_len(4096).unwrap();
        // Unreadable: a read attempt would surface as an Io error instead
        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();

        let parser = CertParser::new(false, 30).with_max_file_size(1024);
        let err = parser.parse_file(&path).unwrap_err();
        assert!(matches!(err, ScanError::FileTooLarge { .. }));
    }
}
