use chrono::{DateTime, Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    access_code::{AccessCode, CreateAccessCodeData},
    user::User,
};
use crate::services::attendance::AttendanceError;
use crate::services::qr_generator::AttendanceQrPayload;

const CODE_VALUE_BYTES: usize = 32;
const NUMERIC_CODE_DIGITS: usize = 6;
const NUMERIC_CODE_SPACE: u32 = 1_000_000;
const MAX_NUMERIC_ATTEMPTS: usize = 16;

/// Whether a code authorizes one toggle or any number until it expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeUsePolicy {
    SingleUse,
    ReusableUntilExpiry,
}

/// A code as presented by a member or scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentedCode {
    /// The QR token (`code_value`)
    Token(String),
    /// The 6-digit manual fallback
    Numeric(String),
}

impl PresentedCode {
    /// Accepts a signed QR payload, a bare token or a 6-digit code.
    pub fn parse(raw: &str, signing_key: &[u8]) -> Result<Self, AttendanceError> {
        let raw = raw.trim();

        if is_numeric_code(raw) {
            return Ok(PresentedCode::Numeric(raw.to_string()));
        }

        if raw.starts_with('{') {
            let payload = AttendanceQrPayload::decode_verified(raw, signing_key).map_err(|e| {
                tracing::warn!(error = %e, "Rejected QR payload");
                AttendanceError::InvalidCode
            })?;
            return Self::token(&payload.code);
        }

        Self::token(raw)
    }

    fn token(value: &str) -> Result<Self, AttendanceError> {
        if value.len() == CODE_VALUE_BYTES * 2 && value.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(PresentedCode::Token(value.to_ascii_lowercase()))
        } else {
            Err(AttendanceError::InvalidCode)
        }
    }
}

fn is_numeric_code(value: &str) -> bool {
    value.len() == NUMERIC_CODE_DIGITS && value.chars().all(|c| c.is_ascii_digit())
}

/// Checks the code lifecycle. Expiry wins over consumption.
pub fn validate_code(
    code: &AccessCode,
    now: DateTime<Utc>,
    policy: CodeUsePolicy,
) -> Result<(), AttendanceError> {
    if code.is_expired_at(now) {
        return Err(AttendanceError::ExpiredCode);
    }
    if policy == CodeUsePolicy::SingleUse && code.is_consumed() {
        return Err(AttendanceError::CodeAlreadyUsed);
    }
    Ok(())
}

/// Returns the gym an actor may issue codes for
pub fn authorize_issuer(actor: &User) -> Result<Uuid, AttendanceError> {
    if !actor.role.is_gym_staff() {
        return Err(AttendanceError::Forbidden);
    }
    actor.gym_id.ok_or(AttendanceError::NoGymAssigned)
}

/// 32 random bytes, hex encoded
pub fn generate_code_value(rng: &dyn SecureRandom) -> Result<String, AttendanceError> {
    let mut bytes = [0u8; CODE_VALUE_BYTES];
    rng.fill(&mut bytes)
        .map_err(|_| AttendanceError::RandomnessUnavailable)?;
    Ok(hex::encode(bytes))
}

/// Uniform 6-digit code, zero padded
pub fn generate_numeric_code(rng: &dyn SecureRandom) -> Result<String, AttendanceError> {
    // Rejection sampling keeps the distribution uniform over 000000..=999999
    let limit = u32::MAX - (u32::MAX % NUMERIC_CODE_SPACE);
    loop {
        let mut bytes = [0u8; 4];
        rng.fill(&mut bytes)
            .map_err(|_| AttendanceError::RandomnessUnavailable)?;
        let value = u32::from_be_bytes(bytes);
        if value < limit {
            return Ok(format!("{:06}", value % NUMERIC_CODE_SPACE));
        }
    }
}

/// Issues a new access code for the actor's gym
///
/// The numeric fallback is re-drawn while another unexpired code holds the
/// same digits, so a 6-digit code identifies one live code. The check and
/// the insert share a transaction holding the digits' advisory lock.
#[tracing::instrument(skip(pool, actor), fields(actor_id = %actor.id))]
pub async fn issue_code(
    pool: &PgPool,
    actor: &User,
    ttl: Duration,
) -> Result<AccessCode, AttendanceError> {
    let gym_id = authorize_issuer(actor).map_err(|e| {
        tracing::warn!(role = ?actor.role, error = %e, "Access code request refused");
        e
    })?;

    let rng = SystemRandom::new();
    let issued_at = Utc::now();
    let mut tx = pool.begin().await?;

    let mut numeric_code = None;
    for _ in 0..MAX_NUMERIC_ATTEMPTS {
        let candidate = generate_numeric_code(&rng)?;
        if AccessCode::claim_numeric_code(&mut tx, &candidate, issued_at).await? {
            numeric_code = Some(candidate);
            break;
        }
    }
    let numeric_code = numeric_code.ok_or(AttendanceError::CodeSpaceExhausted)?;

    let code = AccessCode::create(
        &mut *tx,
        CreateAccessCodeData {
            gym_id,
            code_value: generate_code_value(&rng)?,
            numeric_code,
            issued_by: actor.id,
            issued_at,
            expires_at: issued_at + ttl,
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        code_id = %code.id,
        gym_id = %code.gym_id,
        expires_at = %code.expires_at,
        "Access code issued"
    );

    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserRole;

    fn user_with_role(role: UserRole, gym_id: Option<Uuid>) -> User {
        User {
            id: Uuid::new_v4(),
            email: "owner@gym.com".to_string(),
            password_hash: String::new(),
            name: "Gym Owner".to_string(),
            phone: None,
            role,
            gym_id,
            created_at: Utc::now(),
        }
    }

    fn code(expires_in: Duration, consumed: bool) -> AccessCode {
        let now = Utc::now();
        AccessCode {
            id: Uuid::new_v4(),
            gym_id: Uuid::new_v4(),
            code_value: "a1".repeat(32),
            numeric_code: "042042".to_string(),
            issued_by: Uuid::new_v4(),
            issued_at: now - Duration::minutes(1),
            expires_at: now + expires_in,
            consumed_at: consumed.then_some(now),
            consumed_by: None,
        }
    }

    #[test]
    fn test_member_cannot_issue_codes() {
        let member = user_with_role(UserRole::Member, Some(Uuid::new_v4()));
        assert!(matches!(
            authorize_issuer(&member),
            Err(AttendanceError::Forbidden)
        ));
    }

    #[test]
    fn test_staff_issue_for_their_gym() {
        let gym_id = Uuid::new_v4();
        let staff = user_with_role(UserRole::Staff, Some(gym_id));
        assert_eq!(authorize_issuer(&staff).unwrap(), gym_id);
    }

    #[test]
    fn test_owner_without_gym() {
        let owner = user_with_role(UserRole::Owner, None);
        assert!(matches!(
            authorize_issuer(&owner),
            Err(AttendanceError::NoGymAssigned)
        ));
    }

    #[test]
    fn test_generated_values_have_expected_shape() {
        let rng = SystemRandom::new();

        let value = generate_code_value(&rng).unwrap();
        assert_eq!(value.len(), 64);
        assert!(value.chars().all(|c| c.is_ascii_hexdigit()));

        for _ in 0..100 {
            let numeric = generate_numeric_code(&rng).unwrap();
            assert!(is_numeric_code(&numeric));
        }
    }

    #[test]
    fn test_code_values_differ() {
        let rng = SystemRandom::new();
        assert_ne!(
            generate_code_value(&rng).unwrap(),
            generate_code_value(&rng).unwrap()
        );
    }

    #[test]
    fn test_validate_live_code() {
        let now = Utc::now();
        let live = code(Duration::minutes(4), false);
        assert!(validate_code(&live, now, CodeUsePolicy::SingleUse).is_ok());
    }

    #[test]
    fn test_validate_consumed_code_by_policy() {
        let now = Utc::now();
        let used = code(Duration::minutes(4), true);
        assert!(matches!(
            validate_code(&used, now, CodeUsePolicy::SingleUse),
            Err(AttendanceError::CodeAlreadyUsed)
        ));
        assert!(validate_code(&used, now, CodeUsePolicy::ReusableUntilExpiry).is_ok());
    }

    #[test]
    fn test_validate_expired_before_consumed() {
        let now = Utc::now();
        let expired_and_used = code(Duration::minutes(-1), true);
        assert!(matches!(
            validate_code(&expired_and_used, now, CodeUsePolicy::SingleUse),
            Err(AttendanceError::ExpiredCode)
        ));
    }

    #[test]
    fn test_parse_numeric_code() {
        assert_eq!(
            PresentedCode::parse(" 004217 ", b"key").unwrap(),
            PresentedCode::Numeric("004217".to_string())
        );
    }

    #[test]
    fn test_parse_bare_token_is_lowercased() {
        let token = "AB".repeat(32);
        assert_eq!(
            PresentedCode::parse(&token, b"key").unwrap(),
            PresentedCode::Token("ab".repeat(32))
        );
    }

    #[test]
    fn test_parse_signed_payload() {
        let key = b"test-signing-key";
        let access_code = code(Duration::minutes(5), false);
        let encoded = AttendanceQrPayload::for_code(&access_code)
            .encode_signed(key)
            .unwrap();

        assert_eq!(
            PresentedCode::parse(&encoded, key).unwrap(),
            PresentedCode::Token(access_code.code_value)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            PresentedCode::parse("12345", b"key"),
            Err(AttendanceError::InvalidCode)
        ));
        assert!(matches!(
            PresentedCode::parse("GYM-CHECKIN", b"key"),
            Err(AttendanceError::InvalidCode)
        ));
        assert!(matches!(
            PresentedCode::parse(r#"{"code":"x"}"#, b"key"),
            Err(AttendanceError::InvalidCode)
        ));
    }
}
