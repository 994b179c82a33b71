pub const DEFAULT_MIMETYPE: &str = "application/octet-stream";
pub const TEXT_MIMETYPE: &str = "text/plain";

/// Guesses by extension first, then by whether the contents are text.
pub fn guess_mime_type(path: &str, contents: &[u8]) -> String {
    if let Some(mime) = mime_guess::from_path(path).first_raw() {
        return mime.to_string();
    }

    if std::str::from_utf8(contents).is_ok() {
        TEXT_MIMETYPE.to_string()
    } else {
        DEFAULT_MIMETYPE.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_mime_type() {
        let cases: Vec<(&str, &[u8], &str)> = vec![
            ("a.txt", b"hi", "text/plain"),
            ("img/logo.png", b"\x89PNG", "image/png"),
            ("data.json", b"{}", "application/json"),
            ("README", b"plain words", "text/plain"),
            ("blob", &[0xff, 0xfe, 0x00, 0x80], "application/octet-stream"),
        ];

        for (path, contents, expected) in cases {
            assert_eq!(guess_mime_type(path, contents), expected, "failed for case: {}", path);
        }
    }
}
