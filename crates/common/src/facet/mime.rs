use mime::Mime;

/// Bytes of content inspected when sniffing.
pub const SNIFF_LEN: usize = 8192;

/// Content type detection from magic bytes and file names.
#[derive(Debug, Clone, Copy, Default)]
pub struct MimeSupport;

impl MimeSupport {
    /// Candidate types for content starting with `head` stored at `path`,
    /// most specific first: the sniffed type, then types implied by the
    /// file extension.
    pub fn detect_mime_types(&self, head: &[u8], path: &str) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        if let Some(kind) = infer::get(head) {
            types.push(kind.mime_type().to_string());
        }
        for guess in mime_guess::from_path(path).iter() {
            let essence = guess.essence_str().to_string();
            if !types.contains(&essence) {
                types.push(essence);
            }
        }
        types
    }

    pub fn detect_mime_type(&self, head: &[u8], path: &str) -> Option<String> {
        self.detect_mime_types(head, path).into_iter().next()
    }
}

/// Media type without parameters, lowercased. Unparseable values pass through trimmed.
pub fn essence(content_type: &str) -> String {
    content_type
        .parse::<Mime>()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|_| content_type.trim().to_ascii_lowercase())
}
