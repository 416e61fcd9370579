//! Personal signup form validation.
//!
//! Turns the raw form into write-ready person and account records: required
//! fields are checked, free text is cut to column widths, the birth date is
//! split into numeric parts and gender is normalized to `M`/`F`.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::{DomainError, Result};

/// Column widths (in characters) of the person and account tables.
pub mod width {
    /// `ac_id`.
    pub const LOGIN_ID: usize = 50;
    /// `pe_name`.
    pub const NAME: usize = 50;
    /// `pe_email`.
    pub const EMAIL: usize = 100;
    /// `pe_phone`.
    pub const PHONE: usize = 20;
    /// `pe_zipcode`.
    pub const ZIP_CODE: usize = 10;
    /// `pe_address`.
    pub const ADDRESS: usize = 200;
    /// `pe_address_detail`.
    pub const ADDRESS_DETAIL: usize = 200;
    /// `pe_education`.
    pub const EDUCATION: usize = 50;
    /// `pe_school`.
    pub const SCHOOL: usize = 100;
    /// `pe_major`.
    pub const MAJOR: usize = 100;
    /// `pe_job`.
    pub const JOB: usize = 100;
}

/// Raw personal signup form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupForm {
    /// Login id.
    pub login_id: Option<String>,
    /// Plain-text password; hashed by the store.
    pub password: Option<String>,
    /// Full name.
    pub name: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Birth date.
    pub birth_date: Option<String>,
    /// Gender.
    pub gender: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
    /// Postal code.
    pub zip_code: Option<String>,
    /// Street address.
    pub address: Option<String>,
    /// Address detail.
    pub address_detail: Option<String>,
    /// Highest education.
    pub education: Option<String>,
    /// School name.
    pub school: Option<String>,
    /// Major.
    pub major: Option<String>,
    /// Job.
    pub job: Option<String>,
}

/// Two-valued gender code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    /// `M`.
    Male,
    /// `F`.
    Female,
}

impl Gender {
    /// The stored column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
        }
    }
}

/// Parsed birth date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BirthDate {
    /// Year.
    pub year: i32,
    /// Month (1-12).
    pub month: u32,
    /// Day (1-31).
    pub day: u32,
}

/// A validated person record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPerson {
    /// Name.
    pub name: String,
    /// Email.
    pub email: String,
    /// Birth date.
    pub birth: BirthDate,
    /// Gender.
    pub gender: Gender,
    /// Phone.
    pub phone: String,
    /// Postal code.
    pub zip_code: Option<String>,
    /// Address.
    pub address: Option<String>,
    /// Address detail.
    pub address_detail: Option<String>,
    /// Education.
    pub education: Option<String>,
    /// School.
    pub school: Option<String>,
    /// Major.
    pub major: Option<String>,
    /// Job.
    pub job: Option<String>,
}

/// A validated personal signup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPersonalAccount {
    /// Login id.
    pub login_id: String,
    /// Plain-text password, handed to the store for hashing.
    pub password: String,
    /// Person record.
    pub person: NewPerson,
}

/// Truncate `value` to at most `max` characters.
#[must_use]
pub fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

fn required(value: Option<&String>, label: &str) -> Result<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| DomainError::validation(format!("{label}을(를) 입력해주세요.")))
}

fn optional(value: Option<&String>, max: usize) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| truncate_chars(v, max))
}

/// Parse a birth date written as `YYYY-MM-DD`, `YYYY.MM.DD`, `YYYY/MM/DD` or `YYYYMMDD`.
///
/// # Errors
///
/// Returns `DomainError::Validation` if a part is missing, non-numeric, or the
/// date does not exist.
pub fn parse_birth_date(value: &str) -> Result<BirthDate> {
    let invalid = || DomainError::validation("생년월일 형식이 올바르지 않습니다.");
    let value = value.trim();

    let parts: Vec<&str> = if value.contains(['-', '.', '/']) {
        value.split(['-', '.', '/']).collect()
    } else if value.len() == 8 && value.is_ascii() {
        vec![&value[0..4], &value[4..6], &value[6..8]]
    } else {
        return Err(invalid());
    };

    let &[year, month, day] = parts.as_slice() else {
        return Err(invalid());
    };

    let numeric = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !numeric(year) || !numeric(month) || !numeric(day) {
        return Err(invalid());
    }

    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    let day: u32 = day.parse().map_err(|_| invalid())?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)?;

    Ok(BirthDate { year, month, day })
}

/// Normalize a gender input to `M`/`F`.
///
/// # Errors
///
/// Returns `DomainError::Validation` for any other value.
pub fn normalize_gender(value: &str) -> Result<Gender> {
    match value.trim().to_lowercase().as_str() {
        "m" | "male" | "man" | "남" | "남자" | "남성" => Ok(Gender::Male),
        "f" | "w" | "female" | "woman" | "여" | "여자" | "여성" => Ok(Gender::Female),
        _ => Err(DomainError::validation("성별 값이 올바르지 않습니다.")),
    }
}

impl SignupForm {
    /// Validate the form.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` with a user-facing message for the
    /// first problem found.
    pub fn validate(&self) -> Result<NewPersonalAccount> {
        let login_id = required(self.login_id.as_ref(), "아이디")?;
        let password = self
            .password
            .as_ref()
            .filter(|p| !p.is_empty())
            .cloned()
            .ok_or_else(|| DomainError::validation("비밀번호을(를) 입력해주세요."))?;
        let name = required(self.name.as_ref(), "이름")?;
        let email = required(self.email.as_ref(), "이메일")?;
        let birth_date = required(self.birth_date.as_ref(), "생년월일")?;
        let gender = required(self.gender.as_ref(), "성별")?;
        let phone = required(self.phone.as_ref(), "전화번호")?;

        if login_id.chars().count() > width::LOGIN_ID {
            return Err(DomainError::validation(format!(
                "아이디는 {}자 이하로 입력해주세요.",
                width::LOGIN_ID
            )));
        }

        Ok(NewPersonalAccount {
            login_id,
            password,
            person: NewPerson {
                name: truncate_chars(&name, width::NAME),
                email: truncate_chars(&email, width::EMAIL),
                birth: parse_birth_date(&birth_date)?,
                gender: normalize_gender(&gender)?,
                phone: truncate_chars(&phone, width::PHONE),
                zip_code: optional(self.zip_code.as_ref(), width::ZIP_CODE),
                address: optional(self.address.as_ref(), width::ADDRESS),
                address_detail: optional(self.address_detail.as_ref(), width::ADDRESS_DETAIL),
                education: optional(self.education.as_ref(), width::EDUCATION),
                school: optional(self.school.as_ref(), width::SCHOOL),
                major: optional(self.major.as_ref(), width::MAJOR),
                job: optional(self.job.as_ref(), width::JOB),
            },
        })
    }
}
