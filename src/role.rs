use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, ToSchema)]
pub enum Role {
    None,
    Student,
    Teacher,
    Admin,
}

impl From<Role> for u8 {
    fn from(value: Role) -> u8 {
        match value {
            Role::None => 0u8,
            Role::Student => 1u8,
            Role::Teacher => 2u8,
            Role::Admin => 3u8,
        }
    }
}

impl From<u8> for Role {
    fn from(value: u8) -> Self {
        vec![Role::None, Role::Student, Role::Teacher, Role::Admin][value as usize]
    }
}

impl Role {
    /// Indicates whether a user with this role can publish time slots and
    /// manage courses they teach.
    pub fn can_teach(self) -> bool {
        self >= Role::Teacher
    }
}

impl std::default::Default for Role {
    fn default() -> Self {
        Role::None
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::None => write!(f, "none"),
            Role::Student => write!(f, "student"),
            Role::Teacher => write!(f, "teacher"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl From<Role> for String {
    fn from(value: Role) -> String {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering_gates_permissions() {
        assert!(Role::None < Role::Student);
        assert!(Role::Student < Role::Teacher);
        assert!(Role::Teacher < Role::Admin);

        assert!(!Role::Student.can_teach());
        assert!(Role::Teacher.can_teach());
        assert!(Role::Admin.can_teach());
    }

    #[test]
    fn role_u8_round_trip() {
        for role in [Role::None, Role::Student, Role::Teacher, Role::Admin] {
            assert_eq!(Role::from(u8::from(role)), role);
        }
    }
}
