use chardetng::EncodingDetector;
use encoding_rs::Encoding;

/// A response body turned into UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBody {
    pub html: String,
    pub encoding: &'static str,
    /// Some byte sequences were invalid and replaced with U+FFFD.
    pub lossy: bool,
}

/// Decode raw bytes: BOM, then Content-Type charset, then chardetng guess.
///
/// Like a browser, invalid sequences are replaced rather than rejected.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> DecodedBody {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    if let Some(encoding) = content_type
        .and_then(charset_label)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        return decode_with(bytes, encoding);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    decode_with(bytes, detector.guess(None, true))
}

fn charset_label(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim_matches([' ', '"', '\'']).to_string())
    })
}

fn decode_with(bytes: &[u8], encoding: &'static Encoding) -> DecodedBody {
    let (text, _, had_errors) = encoding.decode(bytes);
    DecodedBody {
        html: text.into_owned(),
        encoding: encoding.name(),
        lossy: had_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charset_header_wins_over_detection() {
        let decoded = decode_body(b"caf\xe9", Some("text/html; Charset=\"ISO-8859-1\""));
        assert_eq!(decoded.html, "café");
        assert!(!decoded.lossy);
    }

    #[test]
    fn bom_is_honoured() {
        let decoded = decode_body(b"\xEF\xBB\xBFhello", Some("text/html"));
        assert_eq!(decoded.html, "hello");
        assert_eq!(decoded.encoding, "UTF-8");
    }

    #[test]
    fn invalid_bytes_are_replaced() {
        let decoded = decode_body(b"ok \xff\xfe\xfd", Some("text/html; charset=utf-8"));
        assert!(decoded.lossy);
        assert!(decoded.html.starts_with("ok "));
    }
}
