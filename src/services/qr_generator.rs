use qrcode::render::svg;
use qrcode::QrCode;
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum QrGenerationError {
    #[error("QR code generation failed: {0}")]
    QrCodeError(#[from] qrcode::types::QrError),

    #[error("Invalid base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("PNG encoding failed: {0}")]
    ImageError(#[from] image::ImageError),
}

/// What a check-in QR code points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckinTarget<'a> {
    /// An issued attendance token.
    Token(&'a str),
    /// Fallback when no token is active: preselect the service on the form.
    Service(&'a str),
}

/// Builds `<base-url>/checkin?token=<token>` or
/// `<base-url>/checkin?selectedService=<service-id>`.
pub fn checkin_url(base_url: &str, target: CheckinTarget<'_>) -> Result<String, QrGenerationError> {
    let mut url = Url::parse(&format!("{}/checkin", base_url.trim_end_matches('/')))?;

    match target {
        CheckinTarget::Token(token) => {
            url.query_pairs_mut().append_pair("token", token);
        }
        CheckinTarget::Service(service_id) => {
            url.query_pairs_mut()
                .append_pair("selectedService", service_id);
        }
    }

    Ok(url.into())
}

/// Renders the data as an SVG QR code
pub fn generate_qr_svg(data: &str) -> Result<String, QrGenerationError> {
    let code = QrCode::new(data.as_bytes())?;

    let svg = code.render::<svg::Color>().min_dimensions(200, 200).build();

    Ok(svg)
}

/// Renders the data as a PNG QR code with a white quiet zone
pub fn generate_qr_png(data: &str) -> Result<Vec<u8>, QrGenerationError> {
    use image::{ImageBuffer, Luma};

    let code = QrCode::new(data.as_bytes())?;

    let module_size = 10u32; // Each module is 10x10 pixels
    let quiet_zone = 4u32; // Modules of white border on each side
    let width = code.width() as u32;
    let img_size = (width + 2 * quiet_zone) * module_size;

    let img = ImageBuffer::<Luma<u8>, Vec<u8>>::from_fn(img_size, img_size, |x, y| {
        let module_x = (x / module_size) as i64 - quiet_zone as i64;
        let module_y = (y / module_size) as i64 - quiet_zone as i64;

        let inside = (0..width as i64).contains(&module_x) && (0..width as i64).contains(&module_y);
        if inside && code[(module_x as usize, module_y as usize)] == qrcode::types::Color::Dark {
            Luma([0u8])
        } else {
            Luma([255u8])
        }
    });

    let mut png_data = Vec::new();
    image::DynamicImage::ImageLuma8(img).write_to(
        &mut std::io::Cursor::new(&mut png_data),
        image::ImageFormat::Png,
    )?;

    Ok(png_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkin_url_with_token() {
        let url = checkin_url("https://church.example.org/", CheckinTarget::Token("v1.abc.def")).unwrap();
        assert_eq!(url, "https://church.example.org/checkin?token=v1.abc.def");
    }

    #[test]
    fn test_checkin_url_encodes_token() {
        let url = checkin_url("https://church.example.org", CheckinTarget::Token("v1.a+b/c=.ff")).unwrap();
        assert_eq!(url, "https://church.example.org/checkin?token=v1.a%2Bb%2Fc%3D.ff");
    }

    #[test]
    fn test_checkin_url_service_fallback() {
        let url = checkin_url(
            "http://localhost:3000",
            CheckinTarget::Service("sunday-1st-service"),
        )
        .unwrap();
        assert_eq!(
            url,
            "http://localhost:3000/checkin?selectedService=sunday-1st-service"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = checkin_url("not a url", CheckinTarget::Service("others"));
        assert!(matches!(result, Err(QrGenerationError::InvalidUrl(_))));
    }

    #[test]
    fn test_qr_svg_generation() {
        let svg = generate_qr_svg("https://church.example.org/checkin?token=v1.abc.def").unwrap();

        assert!(svg.contains("<svg"));
        assert!(svg.contains("</svg>"));
    }

    #[test]
    fn test_qr_png_generation() {
        let png = generate_qr_png("https://church.example.org/checkin?selectedService=others").unwrap();

        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
