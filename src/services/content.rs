use crate::error::RejectReason;

/// Deep validation for PDF documents: the structure must parse, report at
/// least one page, and yield a minimum amount of machine-readable text.
/// Structurally valid but text-free documents (image-only scans, empty
/// templates) are rejected; that trade-off is deliberate.
pub fn validate_pdf(
    bytes: &[u8],
    min_chars: usize,
    min_words: usize,
) -> Result<(), RejectReason> {
    if !bytes.starts_with(b"%PDF") {
        return Err(RejectReason::CorruptDocument);
    }
    // The end-of-file marker may be followed by a trailing newline, so search
    // rather than suffix-match
    if !contains(bytes, b"%%EOF") {
        return Err(RejectReason::CorruptDocument);
    }

    let doc = lopdf::Document::load_mem(bytes).map_err(|e| {
        tracing::warn!(error = %e, "pdf failed to parse");
        RejectReason::CorruptDocument
    })?;

    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    if pages.is_empty() {
        return Err(RejectReason::CorruptDocument);
    }

    let text = doc.extract_text(&pages).map_err(|e| {
        tracing::warn!(error = %e, "pdf text extraction failed");
        RejectReason::CorruptDocument
    })?;

    let text = text.trim();
    let chars = text.chars().count();
    let words = text.split_whitespace().count();
    if chars < min_chars || words < min_words {
        return Err(RejectReason::NoExtractableText { chars, words });
    }

    Ok(())
}

/// Deep validation for images: the full decode must succeed
pub fn validate_image(bytes: &[u8]) -> Result<(), RejectReason> {
    image::load_from_memory(bytes).map_err(|e| {
        tracing::warn!(error = %e, "image failed to decode");
        RejectReason::CorruptImage
    })?;
    Ok(())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
