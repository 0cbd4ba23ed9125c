//! Rendering of encoded tokens into scannable codes

/// Turns an encoded request or offer token into the payload a device scans
pub trait CodeRenderer: Send + Sync {
    fn render(&self, token: &str) -> String;
}

/// QR payload carrying the token as-is
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainCode;

impl CodeRenderer for PlainCode {
    fn render(&self, token: &str) -> String {
        token.to_string()
    }
}
