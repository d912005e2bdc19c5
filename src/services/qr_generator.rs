use chrono::{DateTime, Utc};
use qrcode::render::svg;
use qrcode::QrCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::access_code::AccessCode;
use crate::services::signature;

#[derive(thiserror::Error, Debug)]
pub enum QrGenerationError {
    #[error("QR code generation failed: {0}")]
    QrCodeError(#[from] qrcode::types::QrError),

    #[error("JSON serialization failed: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Signature error: {0}")]
    SignatureError(#[from] signature::SignatureError),

    #[error("QR payload is not signed")]
    MissingSignature,
}

/// Payload encoded into the attendance QR code shown at the front desk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceQrPayload {
    pub gym_id: Uuid,

    /// The access code token (`code_value`)
    pub code: String,

    pub expires_at: DateTime<Utc>,

    /// HMAC signature of the payload without this field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl AttendanceQrPayload {
    pub fn for_code(code: &AccessCode) -> Self {
        Self {
            gym_id: code.gym_id,
            code: code.code_value.clone(),
            expires_at: code.expires_at,
            signature: None,
        }
    }

    /// Serializes the payload (without signature) for signing
    fn to_signing_string(&self) -> Result<String, QrGenerationError> {
        let unsigned = Self {
            signature: None,
            ..self.clone()
        };
        Ok(serde_json::to_string(&unsigned)?)
    }

    /// Signs the payload and returns the JSON string to embed in the QR code
    pub fn encode_signed(&self, signing_key: &[u8]) -> Result<String, QrGenerationError> {
        let signing_string = self.to_signing_string()?;
        let signed = Self {
            signature: Some(signature::sign(&signing_string, signing_key)),
            ..self.clone()
        };
        Ok(serde_json::to_string(&signed)?)
    }

    /// Parses a scanned payload and checks its signature
    pub fn decode_verified(data: &str, signing_key: &[u8]) -> Result<Self, QrGenerationError> {
        let payload: Self = serde_json::from_str(data)?;
        let sig = payload
            .signature
            .as_deref()
            .ok_or(QrGenerationError::MissingSignature)?;
        signature::verify(&payload.to_signing_string()?, sig, signing_key)?;
        Ok(payload)
    }
}

/// Renders the QR data string as an SVG document
pub fn generate_qr_svg(qr_data: &str) -> Result<String, QrGenerationError> {
    let code = QrCode::new(qr_data.as_bytes())?;

    let svg = code.render::<svg::Color>().min_dimensions(240, 240).build();

    Ok(svg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_payload() -> AttendanceQrPayload {
        AttendanceQrPayload {
            gym_id: Uuid::new_v4(),
            code: "ab".repeat(32),
            expires_at: Utc::now() + Duration::minutes(5),
            signature: None,
        }
    }

    #[test]
    fn test_signed_payload_verifies() {
        let key = b"test-signing-key";
        let payload = sample_payload();

        let encoded = payload.encode_signed(key).unwrap();
        let decoded = AttendanceQrPayload::decode_verified(&encoded, key).unwrap();

        assert_eq!(decoded.code, payload.code);
        assert_eq!(decoded.gym_id, payload.gym_id);
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let encoded = sample_payload().encode_signed(b"key-one").unwrap();
        let result = AttendanceQrPayload::decode_verified(&encoded, b"key-two");

        assert!(matches!(result, Err(QrGenerationError::SignatureError(_))));
    }

    #[test]
    fn test_tampered_code_is_rejected() {
        let key = b"test-signing-key";
        let encoded = sample_payload().encode_signed(key).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        value["code"] = serde_json::Value::String("cd".repeat(32));

        let result = AttendanceQrPayload::decode_verified(&value.to_string(), key);

        assert!(result.is_err());
    }

    #[test]
    fn test_unsigned_payload_is_rejected() {
        let unsigned = serde_json::to_string(&sample_payload()).unwrap();
        let result = AttendanceQrPayload::decode_verified(&unsigned, b"key");

        assert!(matches!(result, Err(QrGenerationError::MissingSignature)));
    }

    #[test]
    fn test_qr_svg_generation() {
        let encoded = sample_payload().encode_signed(b"test-signing-key").unwrap();
        let svg = generate_qr_svg(&encoded).unwrap();

        assert!(svg.contains("<svg"));
        assert!(svg.contains("</svg>"));
    }
}
