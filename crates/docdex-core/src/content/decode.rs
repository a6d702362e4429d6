//! Byte decoding for the content pipelines.
//!
//! Decoding contract: when a charset is declared and recognized, decode with
//! exactly that encoding; otherwise default to UTF-8. A byte-order mark
//! always wins over the declared charset and is stripped from the output.

use encoding_rs::{Encoding, UTF_8};

/// Decodes raw bytes into a logical string for downstream middleware.
///
/// Returns the decoded string plus any non-fatal decode diagnostics
/// (unrecognized charset labels, replacement characters from malformed
/// input).
#[must_use]
pub fn decode_bytes(bytes: &[u8], declared_charset: Option<&str>) -> (String, Vec<String>) {
    let mut errors = Vec::new();

    let encoding = if let Some((bom_encoding, _)) = Encoding::for_bom(bytes) {
        bom_encoding
    } else if let Some(label) = declared_charset {
        match Encoding::for_label(label.as_bytes()) {
            Some(encoding) => encoding,
            None => {
                errors.push(format!("unrecognized charset '{label}', decoding as UTF-8"));
                UTF_8
            },
        }
    } else {
        UTF_8
    };

    let (decoded, had_errors) = encoding.decode_with_bom_removal(bytes);
    if had_errors {
        errors.push(format!(
            "malformed {} input replaced during decode",
            encoding.name()
        ));
    }
    (decoded.into_owned(), errors)
}
