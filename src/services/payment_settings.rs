use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::models::gym::PaymentSettingsUpdate;

const MAX_QR_IMAGE_BYTES: usize = 1024 * 1024;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PaymentSettingsError {
    #[error("Invalid UPI ID format. Expected handle@provider")]
    InvalidUpiId,

    #[error("Payment QR code must be a base64 encoded image")]
    InvalidQrImage,

    #[error("Payment QR code image is too large (max 1 MiB)")]
    QrImageTooLarge,

    #[error("No payment settings provided")]
    NothingToUpdate,
}

/// Validates and normalizes a UPI id. An empty value clears the setting.
pub fn normalize_upi_id(raw: &str) -> Result<Option<String>, PaymentSettingsError> {
    let upi_id = raw.trim();
    if upi_id.is_empty() {
        return Ok(None);
    }

    let (handle, provider) = upi_id
        .split_once('@')
        .ok_or(PaymentSettingsError::InvalidUpiId)?;

    let handle_ok = (2..=256).contains(&handle.len())
        && handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    let provider_ok =
        (2..=64).contains(&provider.len()) && provider.chars().all(|c| c.is_ascii_alphanumeric());

    if !handle_ok || !provider_ok {
        return Err(PaymentSettingsError::InvalidUpiId);
    }

    Ok(Some(upi_id.to_string()))
}

/// Checks a base64 payment QR image, with or without a `data:image/...` prefix.
/// An empty value clears the setting.
pub fn validate_qr_image(raw: &str) -> Result<Option<String>, PaymentSettingsError> {
    let value = raw.trim();
    if value.is_empty() {
        return Ok(None);
    }

    let encoded = match value.strip_prefix("data:") {
        Some(rest) => {
            let (media_type, data) = rest
                .split_once(";base64,")
                .ok_or(PaymentSettingsError::InvalidQrImage)?;
            if !media_type.starts_with("image/") {
                return Err(PaymentSettingsError::InvalidQrImage);
            }
            data
        }
        None => value,
    };

    // Cheap upper bound before decoding: 4 base64 chars per 3 bytes
    if encoded.len() / 4 * 3 > MAX_QR_IMAGE_BYTES + 3 {
        return Err(PaymentSettingsError::QrImageTooLarge);
    }

    let bytes = STANDARD
        .decode(encoded)
        .map_err(|_| PaymentSettingsError::InvalidQrImage)?;
    if bytes.is_empty() {
        return Err(PaymentSettingsError::InvalidQrImage);
    }
    if bytes.len() > MAX_QR_IMAGE_BYTES {
        return Err(PaymentSettingsError::QrImageTooLarge);
    }

    Ok(Some(value.to_string()))
}

/// Builds a settings update from the request fields that were present
pub fn build_update(
    upi_id: Option<&str>,
    qr_code: Option<&str>,
) -> Result<PaymentSettingsUpdate, PaymentSettingsError> {
    if upi_id.is_none() && qr_code.is_none() {
        return Err(PaymentSettingsError::NothingToUpdate);
    }

    Ok(PaymentSettingsUpdate {
        upi_id: upi_id.map(normalize_upi_id).transpose()?,
        payment_qr_code: qr_code.map(validate_qr_image).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_upi_ids() {
        assert_eq!(
            normalize_upi_id(" gymowner@paytm ").unwrap(),
            Some("gymowner@paytm".to_string())
        );
        assert!(normalize_upi_id("john.doe_99-x@okicici").unwrap().is_some());
    }

    #[test]
    fn test_empty_upi_clears() {
        assert_eq!(normalize_upi_id("   ").unwrap(), None);
    }

    #[test]
    fn test_invalid_upi_ids() {
        for bad in ["gymowner", "@paytm", "a@paytm", "gym@p", "gym@pay tm", "gym@@paytm", "gy m@paytm"] {
            assert_eq!(
                normalize_upi_id(bad),
                Err(PaymentSettingsError::InvalidUpiId),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_qr_image_plain_and_data_url() {
        let encoded = STANDARD.encode(b"\x89PNG fake image bytes");
        assert!(validate_qr_image(&encoded).unwrap().is_some());

        let data_url = format!("data:image/png;base64,{encoded}");
        assert_eq!(validate_qr_image(&data_url).unwrap(), Some(data_url.clone()));
    }

    #[test]
    fn test_qr_image_rejects_garbage() {
        assert_eq!(
            validate_qr_image("not base64!!"),
            Err(PaymentSettingsError::InvalidQrImage)
        );
        assert_eq!(
            validate_qr_image("data:text/plain;base64,aGVsbG8="),
            Err(PaymentSettingsError::InvalidQrImage)
        );
    }

    #[test]
    fn test_qr_image_size_limit() {
        let big = STANDARD.encode(vec![0u8; MAX_QR_IMAGE_BYTES + 1]);
        assert_eq!(
            validate_qr_image(&big),
            Err(PaymentSettingsError::QrImageTooLarge)
        );

        let at_limit = STANDARD.encode(vec![0u8; MAX_QR_IMAGE_BYTES]);
        assert!(validate_qr_image(&at_limit).is_ok());
    }

    #[test]
    fn test_build_update() {
        assert_eq!(
            build_update(None, None).unwrap_err(),
            PaymentSettingsError::NothingToUpdate
        );

        let update = build_update(Some("gym@upi"), None).unwrap();
        assert_eq!(update.upi_id, Some(Some("gym@upi".to_string())));
        assert!(update.payment_qr_code.is_none());

        let clear = build_update(Some(""), Some("")).unwrap();
        assert_eq!(clear.upi_id, Some(None));
        assert_eq!(clear.payment_qr_code, Some(None));
    }
}
