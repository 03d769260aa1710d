use thiserror::Error;

/// How many bytes of the file the detection pass inspects.
const SNIFF_LEN: usize = 1024;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("no supported encoding decodes the file (tried {tried})")]
    UndecodableExport { tried: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportEncoding {
    Utf8,
    Utf16,
    Utf16Le,
    Utf16Be,
    Latin1,
    Cp1252,
}

impl ExportEncoding {
    pub const DETECTION_ORDER: [ExportEncoding; 6] = [
        ExportEncoding::Utf8,
        ExportEncoding::Utf16,
        ExportEncoding::Utf16Le,
        ExportEncoding::Utf16Be,
        ExportEncoding::Latin1,
        ExportEncoding::Cp1252,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ExportEncoding::Utf8 => "utf-8",
            ExportEncoding::Utf16 => "utf-16",
            ExportEncoding::Utf16Le => "utf-16-le",
            ExportEncoding::Utf16Be => "utf-16-be",
            ExportEncoding::Latin1 => "latin-1",
            ExportEncoding::Cp1252 => "cp1252",
        }
    }

    /// Strict trial decode of the sniff window. `None` means the candidate
    /// rejects these bytes.
    fn try_decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            // NUL bytes are valid utf-8 but never appear in a text export;
            // they are the signature of utf-16 content, so reject them here.
            ExportEncoding::Utf8 => {
                if bytes.contains(&0) {
                    None
                } else {
                    std::str::from_utf8(bytes).ok().map(str::to_string)
                }
            }
            // Plain "utf-16" requires a BOM to pick the byte order.
            ExportEncoding::Utf16 => match bytes {
                [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, encoding_rs::UTF_16LE),
                [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, encoding_rs::UTF_16BE),
                _ => None,
            },
            ExportEncoding::Utf16Le => decode_utf16(bytes, encoding_rs::UTF_16LE),
            ExportEncoding::Utf16Be => decode_utf16(bytes, encoding_rs::UTF_16BE),
            // Strict latin-1 maps the C1 range to control characters no bank
            // export legitimately contains; treat those bytes as a rejection
            // so cp1252 gets its turn.
            ExportEncoding::Latin1 => {
                if bytes.iter().any(|&b| (0x80..=0x9F).contains(&b)) {
                    None
                } else {
                    Some(encoding_rs::mem::decode_latin1(bytes).into_owned())
                }
            }
            ExportEncoding::Cp1252 => {
                let (text, _, had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
                if had_errors {
                    None
                } else {
                    Some(text.into_owned())
                }
            }
        }
    }
}

fn decode_utf16(bytes: &[u8], encoding: &'static encoding_rs::Encoding) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        None
    } else {
        Some(text.into_owned())
    }
}

/// Detect the export encoding from the first kilobyte, then decode the whole
/// file with the winner. The sniff is strict; the full decode is lenient so a
/// malformed tail does not lose the month's rows.
pub fn decode_export(bytes: &[u8]) -> Result<(String, ExportEncoding), DecodeError> {
    // An odd-length sniff of an even-length utf-16 file must not split a code
    // unit, so align the window down.
    let sniff_end = SNIFF_LEN.min(bytes.len());

    for candidate in ExportEncoding::DETECTION_ORDER {
        let window = match candidate {
            ExportEncoding::Utf16
            | ExportEncoding::Utf16Le
            | ExportEncoding::Utf16Be => &bytes[..sniff_end & !1],
            // A multi-byte utf-8 sequence may straddle the window edge; back
            // off up to three bytes before declaring a rejection.
            ExportEncoding::Utf8 => {
                let mut end = sniff_end;
                while end > 0 && end > sniff_end.saturating_sub(3) && !bytes.is_char_boundary_at(end) {
                    end -= 1;
                }
                &bytes[..end]
            }
            _ => &bytes[..sniff_end],
        };

        if candidate.try_decode(window).is_some() {
            let full = candidate
                .try_decode(bytes)
                .unwrap_or_else(|| lenient_decode(bytes, candidate));
            tracing::debug!(encoding = candidate.label(), "export encoding detected");
            return Ok((strip_bom(full), candidate));
        }
    }

    Err(DecodeError::UndecodableExport {
        tried: ExportEncoding::DETECTION_ORDER
            .iter()
            .map(|e| e.label())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

fn lenient_decode(bytes: &[u8], encoding: ExportEncoding) -> String {
    match encoding {
        ExportEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        ExportEncoding::Utf16 => match bytes {
            [0xFF, 0xFE, rest @ ..] => encoding_rs::UTF_16LE.decode(rest).0.into_owned(),
            [0xFE, 0xFF, rest @ ..] => encoding_rs::UTF_16BE.decode(rest).0.into_owned(),
            _ => encoding_rs::UTF_16LE.decode(bytes).0.into_owned(),
        },
        ExportEncoding::Utf16Le => encoding_rs::UTF_16LE.decode(bytes).0.into_owned(),
        ExportEncoding::Utf16Be => encoding_rs::UTF_16BE.decode(bytes).0.into_owned(),
        ExportEncoding::Latin1 => encoding_rs::mem::decode_latin1(bytes).into_owned(),
        ExportEncoding::Cp1252 => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
    }
}

fn strip_bom(text: String) -> String {
    text.strip_prefix('\u{FEFF}').map(str::to_string).unwrap_or(text)
}

/// Delimiter preference over the first kilobyte of decoded text: semicolon,
/// then tab, then comma.
pub fn detect_delimiter(text: &str) -> u8 {
    let window: String = text.chars().take(SNIFF_LEN).collect();
    if window.contains(';') {
        b';'
    } else if window.contains('\t') {
        b'\t'
    } else {
        b','
    }
}

trait CharBoundary {
    fn is_char_boundary_at(&self, index: usize) -> bool;
}

impl CharBoundary for [u8] {
    fn is_char_boundary_at(&self, index: usize) -> bool {
        if index >= self.len() {
            return true;
        }
        // A continuation byte starts with 0b10.
        self[index] & 0xC0 != 0x80
    }
}
