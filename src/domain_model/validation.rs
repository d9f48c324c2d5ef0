//! Local request validation. Anything rejected here never reaches the backend.

use crate::domain_model::CartLineId;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Mobile number is required")]
    MobileMissing,
    #[error("Invalid Egyptian mobile number")]
    MobileInvalid,
    #[error("Password is required")]
    PasswordMissing,
    #[error("Password must be at least 8 characters")]
    PasswordTooShort,
    #[error("Password must contain uppercase, lowercase, and number")]
    PasswordTooWeak,
    #[error("User ID is required")]
    UserIdMissing,
    #[error("OTP is required")]
    OtpMissing,
    #[error("OTP must be 6 digits")]
    OtpInvalid,
    #[error("Validation failed: {}", .0.join(", "))]
    ProfileInvalid(Vec<String>),
    #[error("productDetailId and qty are required")]
    CartItemMissing,
    #[error("Quantity must be greater than 0")]
    QuantityInvalid,
    #[error("Cart IDs are required")]
    CartIdsMissing,
    #[error("Address ID is required")]
    AddressMissing,
    #[error("Select at least one item")]
    NothingSelected,
    #[error("unknown cart line {0}")]
    UnknownLine(CartLineId),
}

/// Egyptian mobile numbers: `01`, an operator digit in `0`, `1`, `2` or `5`,
/// then eight digits.
pub fn validate_mobile(mobile: &str) -> Result<String, ValidationError> {
    let mobile = mobile.trim();
    if mobile.is_empty() {
        return Err(ValidationError::MobileMissing);
    }

    let bytes = mobile.as_bytes();
    let well_formed = bytes.len() == 11
        && bytes.iter().all(u8::is_ascii_digit)
        && mobile.starts_with("01")
        && matches!(bytes.get(2), Some(b'0' | b'1' | b'2' | b'5'));

    if well_formed {
        Ok(mobile.to_string())
    } else {
        Err(ValidationError::MobileInvalid)
    }
}

pub fn validate_password(password: &str) -> Result<String, ValidationError> {
    let password = password.trim();
    if password.is_empty() {
        Err(ValidationError::PasswordMissing)
    } else {
        Ok(password.to_string())
    }
}

/// Rules for a password being chosen, stricter than what login accepts.
pub fn validate_new_password(password: &str) -> Result<String, ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::PasswordMissing);
    }
    if password.chars().count() < 8 {
        return Err(ValidationError::PasswordTooShort);
    }
    let upper = password.chars().any(|c| c.is_ascii_uppercase());
    let lower = password.chars().any(|c| c.is_ascii_lowercase());
    let digit = password.chars().any(|c| c.is_ascii_digit());
    if upper && lower && digit {
        Ok(password.to_string())
    } else {
        Err(ValidationError::PasswordTooWeak)
    }
}

/// Backend user ids arrive as strings or numbers.
pub fn validate_user_id(user_id: Option<&Value>) -> Result<String, ValidationError> {
    match user_id {
        Some(Value::String(id)) if !id.trim().is_empty() => Ok(id.trim().to_string()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(ValidationError::UserIdMissing),
    }
}

pub fn validate_otp(otp: Option<&Value>) -> Result<String, ValidationError> {
    let otp = match otp {
        Some(Value::String(otp)) => otp.trim().to_string(),
        Some(Value::Number(otp)) => otp.to_string(),
        _ => String::new(),
    };
    if otp.is_empty() {
        Err(ValidationError::OtpMissing)
    } else if otp.len() == 6 && otp.bytes().all(|b| b.is_ascii_digit()) {
        Ok(otp)
    } else {
        Err(ValidationError::OtpInvalid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Gender {
    Male,
    Female,
}

impl TryFrom<u8> for Gender {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Gender::Male),
            2 => Ok(Gender::Female),
            other => Err(format!("unknown gender {other}")),
        }
    }
}

impl From<Gender> for u8 {
    fn from(value: Gender) -> Self {
        match value {
            Gender::Male => 1,
            Gender::Female => 2,
        }
    }
}

/// Personal details sent with the last signup step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInput {
    pub first_name: String,
    pub last_name: String,
    pub birthdate: DateTime<Utc>,
    pub gender: Gender,
}

fn check_name(name: Option<&str>, field: &str) -> Result<String, String> {
    let name = name.map(str::trim).unwrap_or_default();
    let len = name.chars().count();
    if len == 0 {
        return Err(format!("{field} is required"));
    }
    if len < 2 {
        return Err(format!("{field} must be at least 2 characters"));
    }
    if len > 50 {
        return Err(format!("{field} must be less than 50 characters"));
    }
    let allowed = |c: char| c.is_ascii_alphabetic() || c.is_whitespace() || ('\u{0600}'..='\u{06FF}').contains(&c);
    if name.chars().all(allowed) {
        Ok(name.to_string())
    } else {
        Err(format!("{field} contains invalid characters"))
    }
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp. Age must be 13 to 120.
fn check_birthdate(birthdate: Option<&str>, today: NaiveDate) -> Result<DateTime<Utc>, String> {
    let Some(raw) = birthdate.map(str::trim).filter(|s| !s.is_empty()) else {
        return Err("Birthdate is required".to_string());
    };
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|d| d.date_naive()))
        .ok_or_else(|| "Invalid birthdate".to_string())?;

    let mut age = today.year() - date.year();
    if (today.month(), today.day()) < (date.month(), date.day()) {
        age -= 1;
    }
    if age < 13 {
        return Err("You must be at least 13 years old".to_string());
    }
    if age > 120 {
        return Err("Invalid birthdate".to_string());
    }
    Ok(date.and_time(NaiveTime::MIN).and_utc())
}

fn check_gender(gender: Option<&Value>) -> Result<Gender, String> {
    let code = match gender {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    code.and_then(|c| u8::try_from(c).ok())
        .and_then(|c| Gender::try_from(c).ok())
        .ok_or_else(|| "Invalid gender value".to_string())
}

impl ProfileInput {
    /// Checks every field and reports all failures together.
    pub fn validate(
        first_name: Option<&str>,
        last_name: Option<&str>,
        birthdate: Option<&str>,
        gender: Option<&Value>,
        today: NaiveDate,
    ) -> Result<Self, ValidationError> {
        let first_name = check_name(first_name, "First name");
        let last_name = check_name(last_name, "Last name");
        let birthdate = check_birthdate(birthdate, today);
        let gender = check_gender(gender);

        match (first_name, last_name, birthdate, gender) {
            (Ok(first_name), Ok(last_name), Ok(birthdate), Ok(gender)) => Ok(Self {
                first_name,
                last_name,
                birthdate,
                gender,
            }),
            (first_name, last_name, birthdate, gender) => Err(ValidationError::ProfileInvalid(
                [first_name.err(), last_name.err(), birthdate.err(), gender.err()]
                    .into_iter()
                    .flatten()
                    .collect(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCart {
    pub product_detail_id: i64,
    pub qty: i64,
}

impl AddToCart {
    pub fn validate(product_detail_id: Option<i64>, qty: Option<i64>) -> Result<Self, ValidationError> {
        match (product_detail_id, qty) {
            (Some(id), Some(qty)) if id > 0 => {
                if qty <= 0 {
                    Err(ValidationError::QuantityInvalid)
                } else {
                    Ok(Self {
                        product_detail_id: id,
                        qty,
                    })
                }
            }
            _ => Err(ValidationError::CartItemMissing),
        }
    }
}

/// Body forwarded to the backend checkout. `patmentType` is the backend's spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOrder {
    pub cart_ids: Vec<CartLineId>,
    pub address_id: i64,
    #[serde(rename = "patmentType")]
    pub payment_type: PaymentType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PaymentType {
    #[default]
    Cash,
    Card,
}

impl TryFrom<u8> for PaymentType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PaymentType::Cash),
            2 => Ok(PaymentType::Card),
            other => Err(format!("unknown payment type {other}")),
        }
    }
}

impl From<PaymentType> for u8 {
    fn from(value: PaymentType) -> Self {
        match value {
            PaymentType::Cash => 1,
            PaymentType::Card => 2,
        }
    }
}

impl CheckoutOrder {
    pub fn validate(
        cart_ids: Option<Vec<CartLineId>>,
        address_id: Option<i64>,
        payment_type: Option<PaymentType>,
    ) -> Result<Self, ValidationError> {
        let cart_ids = cart_ids
            .filter(|ids| !ids.is_empty())
            .ok_or(ValidationError::CartIdsMissing)?;
        let address_id = address_id
            .filter(|id| *id > 0)
            .ok_or(ValidationError::AddressMissing)?;
        Ok(Self {
            cart_ids,
            address_id,
            payment_type: payment_type.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mobile_rules() {
        assert_eq!(validate_mobile(" 01012345678 "), Ok("01012345678".into()));
        assert_eq!(validate_mobile("01512345678"), Ok("01512345678".into()));
        assert_eq!(validate_mobile(""), Err(ValidationError::MobileMissing));
        assert_eq!(validate_mobile("01312345678"), Err(ValidationError::MobileInvalid));
        assert_eq!(validate_mobile("0101234567"), Err(ValidationError::MobileInvalid));
        assert_eq!(validate_mobile("0101234567a"), Err(ValidationError::MobileInvalid));
        assert_eq!(validate_mobile("11012345678"), Err(ValidationError::MobileInvalid));
    }

    #[test]
    fn new_password_rules() {
        assert_eq!(validate_new_password("Secret123"), Ok("Secret123".into()));
        assert_eq!(validate_new_password(""), Err(ValidationError::PasswordMissing));
        assert_eq!(validate_new_password("Sec123"), Err(ValidationError::PasswordTooShort));
        assert_eq!(validate_new_password("secret123"), Err(ValidationError::PasswordTooWeak));
        assert_eq!(validate_new_password("SecretWord"), Err(ValidationError::PasswordTooWeak));
    }

    #[test]
    fn otp_and_user_id_rules() {
        assert_eq!(validate_otp(Some(&json!("123456"))), Ok("123456".into()));
        assert_eq!(validate_otp(Some(&json!(654321))), Ok("654321".into()));
        assert_eq!(validate_otp(None), Err(ValidationError::OtpMissing));
        assert_eq!(validate_otp(Some(&json!("12345"))), Err(ValidationError::OtpInvalid));
        assert_eq!(validate_otp(Some(&json!("12345a"))), Err(ValidationError::OtpInvalid));

        assert_eq!(validate_user_id(Some(&json!(42))), Ok("42".into()));
        assert_eq!(validate_user_id(Some(&json!(" u-1 "))), Ok("u-1".into()));
        assert_eq!(validate_user_id(Some(&json!(""))), Err(ValidationError::UserIdMissing));
        assert_eq!(validate_user_id(None), Err(ValidationError::UserIdMissing));
    }

    #[test]
    fn profile_collects_every_failure() {
        let today = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        let profile = ProfileInput::validate(
            Some("Mona"),
            Some("سعيد"),
            Some("2000-06-16"),
            Some(&json!("2")),
            today,
        )
        .unwrap();
        assert_eq!(profile.gender, Gender::Female);
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["gender"], 2);
        assert_eq!(json["birthdate"], "2000-06-16T00:00:00Z");

        let Err(ValidationError::ProfileInvalid(errors)) = ProfileInput::validate(
            Some("M"),
            Some("Smith1"),
            Some("2013-06-16"),
            Some(&json!(3)),
            today,
        ) else {
            panic!("expected profile errors");
        };
        assert_eq!(
            errors,
            vec![
                "First name must be at least 2 characters",
                "Last name contains invalid characters",
                "You must be at least 13 years old",
                "Invalid gender value",
            ]
        );
    }

    #[test]
    fn add_to_cart_rules() {
        assert!(AddToCart::validate(Some(4), Some(1)).is_ok());
        assert_eq!(
            AddToCart::validate(Some(4), Some(0)),
            Err(ValidationError::QuantityInvalid)
        );
        assert_eq!(
            AddToCart::validate(None, Some(2)),
            Err(ValidationError::CartItemMissing)
        );
    }

    #[test]
    fn checkout_rules() {
        assert_eq!(
            CheckoutOrder::validate(Some(vec![]), Some(1), None),
            Err(ValidationError::CartIdsMissing)
        );
        assert_eq!(
            CheckoutOrder::validate(Some(vec![CartLineId(1)]), None, None),
            Err(ValidationError::AddressMissing)
        );
        let order = CheckoutOrder::validate(Some(vec![CartLineId(1)]), Some(9), None).unwrap();
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["patmentType"], 1);
        assert_eq!(json["cartIds"][0], 1);
    }
}
