//! Signature and keyword scanner for uploaded files
//!
//! Uploads are rejected, never repaired: any finding rejects the file.

use serde::Serialize;
use std::fmt;

/// Extensions that must not appear anywhere in an uploaded file name
const DANGEROUS_EXTENSIONS: &[&str] = &[
    "exe", "dll", "bat", "cmd", "sh", "php", "phtml", "jsp", "asp", "aspx", "js", "vbs", "ps1",
    "jar", "scr", "msi", "com", "cgi", "pl", "py",
];

/// Case-insensitive markers of active content
const SUSPICIOUS_KEYWORDS: &[&str] = &[
    "<script",
    "javascript:",
    "onload=",
    "onerror=",
    "<?php",
    "eval(",
    "<iframe",
    "document.cookie",
    "base64_decode(",
    "<embed",
    "<object",
];

const PDF_ACTIONS: &[&str] = &["/javascript", "/launch"];

/// Prefix of every file searched for keywords
const KEYWORD_SCAN_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Finding {
    DangerousExtension(String),
    UnsafeFilename(String),
    ExecutableSignature(String),
    TypeMismatch(String),
    SuspiciousContent(String),
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::DangerousExtension(ext) => write!(f, "dangerous extension .{}", ext),
            Finding::UnsafeFilename(why) => write!(f, "unsafe filename: {}", why),
            Finding::ExecutableSignature(kind) => write!(f, "executable content ({})", kind),
            Finding::TypeMismatch(declared) => {
                write!(f, "content does not match declared type {}", declared)
            }
            Finding::SuspiciousContent(keyword) => write!(f, "suspicious content: {}", keyword),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanReport {
    Clean,
    Rejected(Vec<Finding>),
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        matches!(self, ScanReport::Clean)
    }

    pub fn findings(&self) -> &[Finding] {
        match self {
            ScanReport::Clean => &[],
            ScanReport::Rejected(findings) => findings,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UploadScanner;

impl UploadScanner {
    pub fn new() -> Self {
        Self
    }

    pub fn scan(&self, filename: &str, declared_type: &str, bytes: &[u8]) -> ScanReport {
        let mut findings = Vec::new();

        check_filename(filename, &mut findings);
        check_executable(bytes, &mut findings);
        check_magic(declared_type, bytes, &mut findings);
        check_keywords(declared_type, bytes, &mut findings);

        if findings.is_empty() {
            ScanReport::Clean
        } else {
            ScanReport::Rejected(findings)
        }
    }
}

fn check_filename(filename: &str, findings: &mut Vec<Finding>) {
    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        findings.push(Finding::UnsafeFilename("path traversal".to_string()));
    }
    if filename.chars().any(char::is_control) {
        findings.push(Finding::UnsafeFilename("control characters".to_string()));
    }

    // Every dot-separated segment after the first counts, so `photo.php.jpg`
    // is caught as well as `shell.php`.
    let lower = filename.to_lowercase();
    for segment in lower.split('.').skip(1) {
        let segment = segment.trim();
        if DANGEROUS_EXTENSIONS.contains(&segment) {
            findings.push(Finding::DangerousExtension(segment.to_string()));
        }
    }
}

fn check_executable(bytes: &[u8], findings: &mut Vec<Finding>) {
    let kind = if bytes.starts_with(b"MZ") {
        Some("PE")
    } else if bytes.starts_with(b"\x7fELF") {
        Some("ELF")
    } else if [
        [0xFE, 0xED, 0xFA, 0xCE],
        [0xFE, 0xED, 0xFA, 0xCF],
        [0xCE, 0xFA, 0xED, 0xFE],
        [0xCF, 0xFA, 0xED, 0xFE],
        [0xCA, 0xFE, 0xBA, 0xBE],
    ]
    .iter()
    .any(|magic| bytes.starts_with(magic))
    {
        Some("Mach-O")
    } else if bytes.starts_with(b"#!") {
        Some("script")
    } else {
        None
    };

    if let Some(kind) = kind {
        findings.push(Finding::ExecutableSignature(kind.to_string()));
    }
}

/// Whether `bytes` start with the signature expected for `declared_type`.
/// Types without a known signature always match.
pub fn magic_matches(declared_type: &str, bytes: &[u8]) -> bool {
    match declared_type {
        "image/jpeg" => bytes.starts_with(&[0xFF, 0xD8, 0xFF]),
        "image/png" => bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
        "image/gif" => bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a"),
        "image/webp" => bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP",
        "application/pdf" => bytes.starts_with(b"%PDF-"),
        "image/svg+xml" => contains_ignore_case(bytes, "<svg"),
        _ => true,
    }
}

fn check_magic(declared_type: &str, bytes: &[u8], findings: &mut Vec<Finding>) {
    if !magic_matches(declared_type, bytes) {
        findings.push(Finding::TypeMismatch(declared_type.to_string()));
    }
}

fn is_text_like(declared_type: &str) -> bool {
    declared_type == "image/svg+xml" || declared_type.starts_with("text/")
}

fn check_keywords(declared_type: &str, bytes: &[u8], findings: &mut Vec<Finding>) {
    let scanned = if is_text_like(declared_type) {
        bytes
    } else {
        &bytes[..bytes.len().min(KEYWORD_SCAN_LIMIT)]
    };
    let haystack = String::from_utf8_lossy(scanned).to_lowercase();

    for keyword in SUSPICIOUS_KEYWORDS {
        if haystack.contains(keyword) {
            findings.push(Finding::SuspiciousContent((*keyword).to_string()));
        }
    }

    if declared_type == "application/pdf" {
        let whole = String::from_utf8_lossy(bytes).to_lowercase();
        for action in PDF_ACTIONS {
            if whole.contains(action) {
                findings.push(Finding::SuspiciousContent((*action).to_string()));
            }
        }
    }
}

fn contains_ignore_case(bytes: &[u8], needle: &str) -> bool {
    String::from_utf8_lossy(bytes).to_lowercase().contains(needle)
}
