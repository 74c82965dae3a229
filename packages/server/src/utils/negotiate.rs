use axum::http::{HeaderMap, header};

/// Image encoding chosen from the client's `Accept` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiated {
    Png,
    Jpeg,
    Unacceptable,
}

impl Negotiated {
    pub fn content_type(self) -> Option<&'static str> {
        match self {
            Negotiated::Png => Some("image/png"),
            Negotiated::Jpeg => Some("image/jpeg"),
            Negotiated::Unacceptable => None,
        }
    }
}

/// Pick an image encoding for the response.
///
/// PNG wins when both are listed. Wildcards (`*/*`, `image/*`) and a missing
/// header select nothing.
pub fn negotiate_image(headers: &HeaderMap) -> Negotiated {
    let accept = headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join(",")
        .to_ascii_lowercase();

    let offered = |mime: &str| {
        accept
            .split(',')
            .filter_map(|part| part.split(';').next())
            .any(|m| m.trim() == mime)
    };

    if offered("image/png") {
        Negotiated::Png
    } else if offered("image/jpeg") || offered("image/jpg") {
        Negotiated::Jpeg
    } else {
        Negotiated::Unacceptable
    }
}
