//! 学生数据模型

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::{Validate, ValidationError};

/// 学生记录（含后端分配的 id 与服务端时间戳）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: String,
    #[serde(flatten)]
    pub fields: StudentFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// 表单字段集合（不含 id）
///
/// 所有字段在表单边界都必须非空；后端不做校验。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct StudentFields {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[serde(rename = "class")]
    #[validate(length(min = 1, message = "Class is required"))]
    pub class_name: String,
    #[validate(length(min = 1, message = "Section is required"))]
    pub section: String,
    #[validate(length(min = 1, message = "Roll number is required"))]
    pub roll_number: String,
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Parent name is required"))]
    pub parent_name: String,
    #[validate(length(min = 1, message = "Parent phone is required"))]
    pub parent_phone: String,
    #[validate(custom(function = "validate_date_of_birth"))]
    pub date_of_birth: String,
    #[validate(custom(function = "validate_blood_group"))]
    pub blood_group: String,
    #[validate(custom(function = "validate_gender"))]
    pub gender: String,
}

impl StudentFields {
    /// 去掉首尾空白，并把出生日期规范为 `YYYY-MM-DD`
    pub fn normalized(mut self) -> Self {
        for value in [
            &mut self.name,
            &mut self.class_name,
            &mut self.section,
            &mut self.roll_number,
            &mut self.address,
            &mut self.phone,
            &mut self.email,
            &mut self.parent_name,
            &mut self.parent_phone,
            &mut self.blood_group,
            &mut self.gender,
        ] {
            let trimmed = value.trim();
            if trimmed.len() != value.len() {
                *value = trimmed.to_string();
            }
        }
        self.date_of_birth = normalize_date(&self.date_of_birth);
        self
    }
}

fn validate_date_of_birth(value: &str) -> Result<(), ValidationError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| {
            let mut err = ValidationError::new("date_of_birth");
            err.message = Some("Date of birth must be a YYYY-MM-DD date".into());
            err
        })
}

fn validate_blood_group(value: &str) -> Result<(), ValidationError> {
    value.parse::<BloodGroup>().map(|_| ()).map_err(|_| {
        let mut err = ValidationError::new("blood_group");
        err.message = Some("Select a blood group".into());
        err
    })
}

fn validate_gender(value: &str) -> Result<(), ValidationError> {
    value.parse::<Gender>().map(|_| ()).map_err(|_| {
        let mut err = ValidationError::new("gender");
        err.message = Some("Select a gender".into());
        err
    })
}

/// 把后端返回的日期值规范为 `YYYY-MM-DD`
///
/// 接受纯日期、RFC 3339 时间戳（按 UTC 取日期）和 Postgres 风格的
/// `YYYY-MM-DD HH:MM:SS`；无法识别的值原样返回（去掉首尾空白）。
pub fn normalize_date(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.format("%Y-%m-%d").to_string();
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.with_timezone(&Utc).date_naive().format("%Y-%m-%d").to_string();
    }
    for pattern in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, pattern) {
            return ts.date().format("%Y-%m-%d").to_string();
        }
    }
    raw.to_string()
}

/// 值不在取值范围内
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value: {0}")]
pub struct UnknownValue(pub String);

/// 血型（8 种）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BloodGroup {
    APositive,
    ANegative,
    BPositive,
    BNegative,
    OPositive,
    ONegative,
    AbPositive,
    AbNegative,
}

impl BloodGroup {
    pub const ALL: [BloodGroup; 8] = [
        BloodGroup::APositive,
        BloodGroup::ANegative,
        BloodGroup::BPositive,
        BloodGroup::BNegative,
        BloodGroup::OPositive,
        BloodGroup::ONegative,
        BloodGroup::AbPositive,
        BloodGroup::AbNegative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BloodGroup::APositive => "A+",
            BloodGroup::ANegative => "A-",
            BloodGroup::BPositive => "B+",
            BloodGroup::BNegative => "B-",
            BloodGroup::OPositive => "O+",
            BloodGroup::ONegative => "O-",
            BloodGroup::AbPositive => "AB+",
            BloodGroup::AbNegative => "AB-",
        }
    }
}

impl FromStr for BloodGroup {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| UnknownValue(s.to_string()))
    }
}

impl fmt::Display for BloodGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 性别（3 种）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub const ALL: [Gender; 3] = [Gender::Male, Gender::Female, Gender::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }
}

impl FromStr for Gender {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| UnknownValue(s.to_string()))
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ann() -> StudentFields {
        StudentFields {
            name: "Ann".to_string(),
            class_name: "5".to_string(),
            section: "A".to_string(),
            roll_number: "1".to_string(),
            address: "1 Main St".to_string(),
            phone: "555-0100".to_string(),
            email: "ann@example.com".to_string(),
            parent_name: "Beth".to_string(),
            parent_phone: "555-0101".to_string(),
            date_of_birth: "2014-03-09".to_string(),
            blood_group: "O+".to_string(),
            gender: "female".to_string(),
        }
    }

    #[test]
    fn test_normalize_date_variants() {
        assert_eq!(normalize_date("2014-03-09"), "2014-03-09");
        assert_eq!(normalize_date("2014-03-09T00:00:00Z"), "2014-03-09");
        assert_eq!(normalize_date("2014-03-09T23:30:00-02:00"), "2014-03-10");
        assert_eq!(normalize_date("2014-03-09 08:15:00"), "2014-03-09");
        assert_eq!(normalize_date("  "), "");
        assert_eq!(normalize_date("not a date"), "not a date");
    }

    #[test]
    fn test_valid_fields_pass() {
        assert!(ann().validate().is_ok());
    }

    #[test]
    fn test_empty_fields_rejected() {
        let fields = StudentFields {
            name: String::new(),
            ..ann()
        };
        let errors = fields.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("name"));
    }

    #[test]
    fn test_select_values_checked() {
        let fields = StudentFields {
            blood_group: "C+".to_string(),
            gender: String::new(),
            ..ann()
        };
        let errors = fields.validate().unwrap_err();
        let failed = errors.field_errors();
        assert!(failed.contains_key("blood_group"));
        assert!(failed.contains_key("gender"));
    }

    #[test]
    fn test_serde_uses_camel_case_and_class() {
        let json = serde_json::to_value(ann()).unwrap();
        assert_eq!(json["class"], "5");
        assert_eq!(json["rollNumber"], "1");
        assert_eq!(json["dateOfBirth"], "2014-03-09");
    }

    #[test]
    fn test_enum_round_trip_through_str() {
        for group in BloodGroup::ALL {
            assert_eq!(group.as_str().parse::<BloodGroup>(), Ok(group));
        }
        assert!("x".parse::<Gender>().is_err());
    }
}
