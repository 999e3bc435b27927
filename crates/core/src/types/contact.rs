//! Customer contact and shipping address value types.
//!
//! These are validated once, at the edge, and then carried unchanged into
//! the order draft and the post-order notification.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when validating contact details.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ContactError {
    /// The customer name is blank.
    #[error("name cannot be empty")]
    EmptyName,
    /// The email address is empty.
    #[error("email cannot be empty")]
    EmptyEmail,
    /// The email address is too long.
    #[error("email must be at most {max} characters")]
    EmailTooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The email address is not `local@domain`.
    #[error("email must have the form local@domain")]
    MalformedEmail,
    /// The phone number has the wrong number of digits or stray characters.
    #[error("phone number must contain {min}-{max} digits")]
    InvalidPhone {
        /// Minimum digit count.
        min: usize,
        /// Maximum digit count.
        max: usize,
    },
}

/// Errors that can occur when validating a shipping address.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// A required field is blank.
    #[error("address field `{0}` cannot be empty")]
    MissingField(&'static str),
}

/// An email address with basic structural validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Maximum length of an email address (RFC 5321).
    pub const MAX_LENGTH: usize = 254;

    /// Parse an `Email`, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, longer than 254 characters,
    /// or not of the form `local@domain` with exactly one `@`.
    pub fn parse(s: &str) -> Result<Self, ContactError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ContactError::EmptyEmail);
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(ContactError::EmailTooLong {
                max: Self::MAX_LENGTH,
            });
        }
        match s.split_once('@') {
            Some((local, domain))
                if !local.is_empty() && !domain.is_empty() && !domain.contains('@') =>
            {
                Ok(Self(s.to_owned()))
            }
            _ => Err(ContactError::MalformedEmail),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Email {
    type Error = ContactError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

/// A phone number normalized to digits with an optional leading `+`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    const MIN_DIGITS: usize = 9;
    const MAX_DIGITS: usize = 15;

    /// Parse a phone number, stripping spaces, dashes, dots and parentheses.
    ///
    /// # Errors
    ///
    /// Returns [`ContactError::InvalidPhone`] if anything other than digits
    /// (and one leading `+`) remains, or the digit count is out of range.
    pub fn parse(s: &str) -> Result<Self, ContactError> {
        let invalid = ContactError::InvalidPhone {
            min: Self::MIN_DIGITS,
            max: Self::MAX_DIGITS,
        };
        let trimmed = s.trim();
        let (plus, rest) = trimmed
            .strip_prefix('+')
            .map_or((false, trimmed), |rest| (true, rest));

        let mut digits = String::with_capacity(rest.len() + 1);
        if plus {
            digits.push('+');
        }
        for c in rest.chars() {
            match c {
                '0'..='9' => digits.push(c),
                ' ' | '-' | '.' | '(' | ')' => {}
                _ => return Err(invalid),
            }
        }

        let count = digits.trim_start_matches('+').len();
        if (Self::MIN_DIGITS..=Self::MAX_DIGITS).contains(&count) {
            Ok(Self(digits))
        } else {
            Err(invalid)
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = ContactError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(phone: PhoneNumber) -> Self {
        phone.0
    }
}

/// Who the order is for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CustomerContact {
    pub name: String,
    pub email: Email,
    pub phone: PhoneNumber,
}

impl CustomerContact {
    /// Build a contact from raw form input.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure among name, email and phone.
    pub fn parse(name: &str, email: &str, phone: &str) -> Result<Self, ContactError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ContactError::EmptyName);
        }
        Ok(Self {
            name: name.to_owned(),
            email: Email::parse(email)?,
            phone: PhoneNumber::parse(phone)?,
        })
    }

    /// Re-check a contact that arrived through deserialization.
    ///
    /// # Errors
    ///
    /// Returns [`ContactError::EmptyName`] for a blank name. Email and phone
    /// are already validated by their `Deserialize` impls.
    pub fn validate(&self) -> Result<(), ContactError> {
        if self.name.trim().is_empty() {
            return Err(ContactError::EmptyName);
        }
        Ok(())
    }
}

/// Where the order ships to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ward: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "VN".to_owned()
}

impl ShippingAddress {
    /// Check that the fields a courier needs are present.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::MissingField`] naming the first blank field.
    pub fn validate(&self) -> Result<(), AddressError> {
        if self.line1.trim().is_empty() {
            return Err(AddressError::MissingField("line1"));
        }
        if self.city.trim().is_empty() {
            return Err(AddressError::MissingField("city"));
        }
        if self.country.trim().is_empty() {
            return Err(AddressError::MissingField("country"));
        }
        Ok(())
    }

    /// Single-line rendering for notifications and logs.
    #[must_use]
    pub fn one_line(&self) -> String {
        [
            Some(self.line1.as_str()),
            self.line2.as_deref(),
            self.ward.as_deref(),
            self.district.as_deref(),
            Some(self.city.as_str()),
            self.province.as_deref(),
            Some(self.country.as_str()),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}
