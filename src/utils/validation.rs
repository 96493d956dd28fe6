use std::path::Path;

use crate::config::SecurityConfig;
use crate::error::RejectReason;
use crate::models::DetectedType;
use crate::utils::signature;

/// Extensions that are rejected unconditionally, before the allow-list is
/// even consulted, so a misconfigured allow-list cannot open these up
const BLOCKED_EXTENSIONS: &[&str] = &[
    // Executables
    "exe", "dll", "so", "dylib", "bin", "com", "msi", "scr", "pif", "cpl",
    // Scripts
    "bat", "cmd", "ps1", "sh", "bash", "js", "vbs", "php", "py", "pl", "rb", "cgi", "asp",
    "aspx", "jsp", "jar", "htaccess",
    // Macro-enabled office documents
    "docm", "xlsm", "pptm", "dotm",
];

/// Outcome of the structural checks; the orchestrator completes it into a
/// `FileIdentity` once the content hash is known
#[derive(Debug, Clone)]
pub struct StructuralReport {
    pub sanitized_filename: String,
    pub extension: String,
    pub detected_type: DetectedType,
    /// True when no signature matched and the type fell back to the extension
    pub low_confidence: bool,
}

/// Strips path components and unsafe characters from a client-supplied
/// filename. Rejects names that are empty after sanitation and hidden files.
pub fn sanitize_filename(filename: &str) -> Result<String, RejectReason> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if name.is_empty() {
        return Err(RejectReason::InvalidFilename);
    }

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!(filename, "path components stripped from upload filename");
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';')
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Clamp to 255 bytes on a char boundary
    let sanitized = if sanitized.len() > 255 {
        let mut end = 255;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    if sanitized.starts_with('.') {
        return Err(RejectReason::InvalidFilename);
    }

    Ok(sanitized)
}

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Structural validation of an upload candidate: size and emptiness, filename
/// sanitation, extension block/allow lists, magic-number detection, the
/// anti-disguise cross-check, text-extension leniency, and the dangerous
/// signature scan. Checks run in order and short-circuit on the first failure.
///
/// `header` is a sample of the first [`signature::SNIFF_LEN`] bytes; this
/// function never touches the stream itself.
pub fn validate_structure(
    filename: &str,
    size_bytes: u64,
    header: &[u8],
    config: &SecurityConfig,
) -> Result<StructuralReport, RejectReason> {
    // 1. Size bounds
    if size_bytes == 0 {
        return Err(RejectReason::EmptyFile);
    }
    if size_bytes > config.max_file_size {
        return Err(RejectReason::FileTooLarge {
            size: size_bytes,
            max: config.max_file_size,
        });
    }

    // 2. Filename sanitation
    let sanitized = sanitize_filename(filename)?;
    let extension = extension_of(&sanitized);

    // 3. Dangerous extensions, checked before the allow-list so a permissive
    //    ALLOWED_EXTENSIONS cannot re-enable them
    if BLOCKED_EXTENSIONS.contains(&extension.as_str()) {
        tracing::warn!(filename = %sanitized, extension = %extension, "blocked extension rejected");
        return Err(RejectReason::BlockedExtension { extension });
    }

    // 4. Allow-list
    if !config.is_extension_allowed(&extension) {
        return Err(RejectReason::ExtensionNotAllowed { extension });
    }

    // 5. Magic-number detection on the sampled head
    let detected = signature::detect(header);

    // 6. Anti-disguise cross-check: a signature that conflicts with the
    //    declared extension in a security-sensitive way is rejected outright.
    //    Plain text must carry no binary signature at all, and container
    //    signatures must be declared as the matching office format.
    if let Some(found) = detected {
        let sensitive_conflict = match found {
            _ if extension == "txt" => true,
            DetectedType::Docx => extension != "docx",
            DetectedType::Doc => extension != "doc",
            _ => false,
        };
        if sensitive_conflict {
            tracing::warn!(
                filename = %sanitized,
                detected = %found,
                extension = %extension,
                "signature conflicts with declared extension"
            );
            return Err(RejectReason::TypeMismatch { extension });
        }
    }

    // 7. Text leniency: .txt has no signature, but the sample must decode as
    //    UTF-8 (a trailing truncated code point is tolerated)
    if detected.is_none() && extension == "txt" {
        if let Err(e) = std::str::from_utf8(header) {
            if e.error_len().is_some() {
                return Err(RejectReason::BinaryAsText);
            }
        }
    }

    // 8. Dangerous signature scan, independent of extension. ZIP/OLE heads
    //    were already vetted by the cross-check when declared as office files.
    if let Some(format) = signature::dangerous_signature(header) {
        let declared_container = (extension == "docx" && detected == Some(DetectedType::Docx))
            || (extension == "doc" && detected == Some(DetectedType::Doc));
        if !declared_container {
            tracing::warn!(filename = %sanitized, format, "dangerous signature rejected");
            return Err(RejectReason::DangerousSignature {
                format: format.to_string(),
            });
        }
    }

    let (detected_type, low_confidence) = match detected {
        Some(ty) => (ty, false),
        None => {
            let fallback = DetectedType::from_extension(&extension);
            if extension != "txt" {
                tracing::warn!(
                    filename = %sanitized,
                    extension = %extension,
                    "no signature matched, falling back to declared extension (low confidence)"
                );
            }
            (fallback, true)
        }
    };

    Ok(StructuralReport {
        sanitized_filename: sanitized,
        extension,
        detected_type,
        low_confidence,
    })
}
