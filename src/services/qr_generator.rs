use chrono::NaiveDate;
use qrcode::render::svg;
use qrcode::QrCode;
use serde::{Deserialize, Serialize};

use crate::models::PassDetails;
use crate::services::encryption::{EncryptionError, PayloadCipher};
use crate::services::signature;

#[derive(thiserror::Error, Debug)]
pub enum QrGenerationError {
    #[error("QR code generation failed: {0}")]
    QrCodeError(#[from] qrcode::types::QrError),

    #[error("JSON serialization failed: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Encryption failed: {0}")]
    EncryptionError(#[from] EncryptionError),

    #[error("Image encoding failed: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("QR payload signature does not match")]
    BadSignature,
}

/// What a ranger's scanner needs to check a pass at a park entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassQrPayload {
    pub pass_number: String,
    pub pass_type: String,
    pub date_start: NaiveDate,
    pub date_expiry: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_registration_1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_registration_2: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct SignedPayload {
    payload: PassQrPayload,
    signature: String,
}

impl PassQrPayload {
    pub fn from_details(details: &PassDetails) -> Self {
        let pass = &details.pass;
        Self {
            pass_number: pass.pass_number.clone().unwrap_or_default(),
            pass_type: details.pass_type_name.clone(),
            date_start: pass.date_start,
            date_expiry: pass.date_expiry,
            vehicle_registration_1: pass.vehicle_registration_1.clone(),
            vehicle_registration_2: pass.vehicle_registration_2.clone(),
        }
    }

    /// Signs the payload with HMAC-SHA256 and seals it into an opaque token
    pub fn seal(&self, key: &str) -> Result<String, QrGenerationError> {
        let json = serde_json::to_string(self)?;
        let signed = SignedPayload {
            payload: self.clone(),
            signature: signature::sign(&json, key.as_bytes()),
        };
        let cipher = PayloadCipher::from_secret(key)?;
        Ok(cipher.seal(&serde_json::to_string(&signed)?)?)
    }

    /// Opens a token produced by [`PassQrPayload::seal`], checking its signature
    pub fn open(token: &str, key: &str) -> Result<Self, QrGenerationError> {
        let cipher = PayloadCipher::from_secret(key)?;
        let signed: SignedPayload = serde_json::from_str(&cipher.open(token)?)?;
        let json = serde_json::to_string(&signed.payload)?;
        if !signature::verify(&json, &signed.signature, key.as_bytes()) {
            return Err(QrGenerationError::BadSignature);
        }
        Ok(signed.payload)
    }
}

/// Renders a sealed token as an SVG QR code
pub fn generate_qr_svg(token: &str) -> Result<String, QrGenerationError> {
    let code = QrCode::new(token.as_bytes())?;
    Ok(code.render::<svg::Color>().min_dimensions(200, 200).build())
}

/// Renders a sealed token as a PNG QR code
pub fn generate_qr_png(token: &str) -> Result<Vec<u8>, QrGenerationError> {
    use image::{ImageBuffer, Luma};

    let code = QrCode::new(token.as_bytes())?;

    let module_size = 8u32;
    let width = code.width() as u32;
    let img_size = width * module_size;

    let img = ImageBuffer::from_fn(img_size, img_size, |x, y| {
        match code[((x / module_size) as usize, (y / module_size) as usize)] {
            qrcode::types::Color::Dark => Luma([0u8]),
            qrcode::types::Color::Light => Luma([255u8]),
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

    fn payload() -> PassQrPayload {
        PassQrPayload {
            pass_number: "PP000042".to_string(),
            pass_type: "Holiday Pass".to_string(),
            date_start: NaiveDate::from_ymd_opt(2024, 12, 20).unwrap(),
            date_expiry: NaiveDate::from_ymd_opt(2025, 1, 3).unwrap(),
            vehicle_registration_1: Some("1ABC234".to_string()),
            vehicle_registration_2: None,
        }
    }

    #[test]
    fn test_sealed_payload_opens_with_same_key() {
        let token = payload().seal("qr-key").unwrap();

        assert!(!token.contains("PP000042"));
        assert_eq!(PassQrPayload::open(&token, "qr-key").unwrap(), payload());
    }

    #[test]
    fn test_sealed_payload_rejects_other_key() {
        let token = payload().seal("qr-key").unwrap();
        assert!(PassQrPayload::open(&token, "other-key").is_err());
    }

    #[test]
    fn test_qr_svg_generation() {
        let token = payload().seal("qr-key").unwrap();
        let svg = generate_qr_svg(&token).unwrap();

        assert!(svg.contains("<svg"));
        assert!(svg.contains("</svg>"));
    }

    #[test]
    fn test_qr_png_generation() {
        let png = generate_qr_png("PP000042").unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
