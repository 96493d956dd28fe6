use crate::models::DetectedType;

/// Bytes sampled from the head of a candidate for signature inspection
pub const SNIFF_LEN: usize = 512;

/// Magic byte prefixes for the accepted formats
const MAGIC_SIGNATURES: &[(&[u8], DetectedType)] = &[
    (&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A], DetectedType::Png),
    (&[0xFF, 0xD8, 0xFF], DetectedType::Jpg),
    (b"GIF87a", DetectedType::Gif),
    (b"GIF89a", DetectedType::Gif),
    (b"%PDF", DetectedType::Pdf),
    // OLE compound file (legacy MS Office)
    (&[0xD0, 0xCF, 0x11, 0xE0], DetectedType::Doc),
    // ZIP local file header (docx, xlsx, and every other zip)
    (&[0x50, 0x4B, 0x03, 0x04], DetectedType::Docx),
];

/// Executable and container prefixes rejected regardless of extension.
/// ZIP and OLE only count as dangerous when the declared extension does not
/// name the matching office format; the structural validator handles that.
const DANGEROUS_SIGNATURES: &[(&[u8], &str)] = &[
    (&[0x4D, 0x5A], "Windows executable"),
    (&[0x7F, 0x45, 0x4C, 0x46], "ELF executable"),
    (&[0xFE, 0xED, 0xFA, 0xCE], "Mach-O executable"),
    (&[0xFE, 0xED, 0xFA, 0xCF], "Mach-O executable"),
    (&[0xCE, 0xFA, 0xED, 0xFE], "Mach-O executable"),
    (&[0xCF, 0xFA, 0xED, 0xFE], "Mach-O executable"),
    (b"#!", "script with shebang"),
    (&[0x50, 0x4B, 0x03, 0x04], "ZIP container"),
    (&[0xD0, 0xCF, 0x11, 0xE0], "OLE container"),
];

/// Match the sampled head against the known format signatures
pub fn detect(header: &[u8]) -> Option<DetectedType> {
    MAGIC_SIGNATURES
        .iter()
        .find(|(sig, _)| header.starts_with(sig))
        .map(|(_, ty)| *ty)
}

/// Returns a description of the dangerous format the head matches, if any
pub fn dangerous_signature(header: &[u8]) -> Option<&'static str> {
    DANGEROUS_SIGNATURES
        .iter()
        .find(|(sig, _)| header.starts_with(sig))
        .map(|(_, desc)| *desc)
}
