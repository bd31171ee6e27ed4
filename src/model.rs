use serde::{Deserialize, Serialize};

/// The three reference collections records point into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    Faculty,
    Program,
    Status,
}

impl AttrKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "faculty" => Some(Self::Faculty),
            "program" => Some(Self::Program),
            "status" => Some(Self::Status),
            _ => None,
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            Self::Faculty => "faculties",
            Self::Program => "programs",
            Self::Status => "statuses",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Faculty => "faculty",
            Self::Program => "program",
            Self::Status => "status",
        }
    }
}

/// One row of a reference collection. `ord` is set only for statuses.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrEntity {
    pub id: String,
    pub name: String,
    pub ord: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "STUDENT" => Some(Self::Student),
            "TEACHER" => Some(Self::Teacher),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "STUDENT",
            Self::Teacher => "TEACHER",
            Self::Admin => "ADMIN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
        }
    }
}

/// Singleton validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "emailSuffix")]
    pub email_suffix: String,
    #[serde(rename = "phonePrefix")]
    pub phone_prefix: String,
}
