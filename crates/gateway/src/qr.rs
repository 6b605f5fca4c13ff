use {
    base64::{Engine as _, engine::general_purpose::STANDARD},
    qrcode::{QrCode, render::svg},
};

const DATA_URL_PREFIX: &str = "data:image/svg+xml;base64,";

/// Render a login QR payload as an SVG data URL the dashboard can drop
/// straight into an `<img src>`.
pub fn qr_data_url(payload: &str) -> Result<String, qrcode::types::QrError> {
    let code = QrCode::new(payload.as_bytes())?;
    let svg = code
        .render::<svg::Color>()
        .min_dimensions(256, 256)
        .build();
    Ok(format!("{DATA_URL_PREFIX}{}", STANDARD.encode(svg)))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_svg_data_url() {
        let url = qr_data_url("2@abc,def,ghi").unwrap();
        let encoded = url.strip_prefix(DATA_URL_PREFIX).unwrap();
        let svg = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert!(svg.contains("<svg"));
    }

    #[test]
    fn oversized_payload_is_an_error() {
        let payload = "x".repeat(8000);
        assert!(qr_data_url(&payload).is_err());
    }
}
