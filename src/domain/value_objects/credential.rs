use std::fmt;

/// Text identifying a ticket, either decoded from a QR code or typed by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: &str) -> Result<Self, String> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("Credential cannot be empty".to_string());
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_surrounding_whitespace() {
        let credential = Credential::new("  TKT-001\n").unwrap();
        assert_eq!(credential.as_str(), "TKT-001");
    }

    #[test]
    fn rejects_blank_input() {
        assert!(Credential::new("   ").is_err());
    }
}
