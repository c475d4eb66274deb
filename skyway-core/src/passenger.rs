use serde::{Deserialize, Serialize};
use uuid::Uuid;
use skyway_shared::pii::Masked;

pub const MAX_PARTY_SIZE: usize = 9;
pub const INFANT_MAX_AGE: i32 = 1;
pub const ADULT_MIN_AGE: i32 = 12;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Passport,
    NationalId,
}

/// A row of the `passengers` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passenger {
    pub id: Uuid,
    pub booking_id: Uuid,
    /// Position in the submitted party; ancillary selections refer to it.
    #[serde(default)]
    pub seq: i32,
    pub full_name: String,
    pub age: i32,
    pub gender: Gender,
    pub email: Option<Masked<String>>,
    pub phone: Option<Masked<String>>,
    pub document_type: Option<DocumentType>,
    pub document_number: Option<Masked<String>>,
    pub nationality: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

/// Every field problem found in a submitted form, in field order.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("{} field(s) failed validation", .0.len())]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn into_result(errors: Vec<FieldError>) -> Result<(), ValidationErrors> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassengerForm {
    pub full_name: String,
    pub age: i32,
    pub gender: Gender,
    pub document_type: Option<DocumentType>,
    pub document_number: Option<String>,
    pub nationality: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactForm {
    pub email: String,
    pub phone: String,
}

impl PassengerForm {
    pub fn validate(&self, prefix: &str, errors: &mut Vec<FieldError>) {
        if let Err(msg) = validate_name(&self.full_name) {
            errors.push(FieldError::new(format!("{}.full_name", prefix), msg));
        }
        if !(0..=120).contains(&self.age) {
            errors.push(FieldError::new(format!("{}.age", prefix), "Age must be between 0 and 120"));
        }
        match (&self.document_type, self.document_number.as_deref()) {
            (Some(doc_type), Some(number)) => {
                if let Err(msg) = validate_document(*doc_type, number) {
                    errors.push(FieldError::new(format!("{}.document_number", prefix), msg));
                }
            }
            (Some(_), None) => {
                errors.push(FieldError::new(format!("{}.document_number", prefix), "Document number is required"));
            }
            (None, Some(_)) => {
                errors.push(FieldError::new(format!("{}.document_type", prefix), "Document type is required"));
            }
            (None, None) => {}
        }
        if let Some(nationality) = &self.nationality {
            if nationality.len() != 2 || !nationality.chars().all(|c| c.is_ascii_alphabetic()) {
                errors.push(FieldError::new(format!("{}.nationality", prefix), "Use a two-letter country code"));
            }
        }
    }

    /// Builds the datastore row. Contact details are attached to the lead
    /// passenger only.
    pub fn into_passenger(self, booking_id: Uuid, seq: i32, contact: Option<&ContactForm>) -> Passenger {
        Passenger {
            id: Uuid::new_v4(),
            booking_id,
            seq,
            full_name: normalize_whitespace(&self.full_name),
            age: self.age,
            gender: self.gender,
            email: contact.map(|c| Masked(c.email.trim().to_ascii_lowercase())),
            phone: contact.map(|c| Masked(normalize_phone(&c.phone))),
            document_type: self.document_type,
            document_number: self.document_number.map(|d| Masked(d.trim().to_ascii_uppercase())),
            nationality: self.nationality.map(|n| n.to_ascii_uppercase()),
        }
    }
}

impl ContactForm {
    pub fn validate(&self, errors: &mut Vec<FieldError>) {
        if let Err(msg) = validate_email(&self.email) {
            errors.push(FieldError::new("contact.email", msg));
        }
        if let Err(msg) = validate_phone(&self.phone) {
            errors.push(FieldError::new("contact.phone", msg));
        }
    }
}

/// Validates the whole party: size, each form, the contact block, and that
/// infants travel with an adult.
pub fn validate_party(forms: &[PassengerForm], contact: &ContactForm) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    if forms.is_empty() {
        errors.push(FieldError::new("passengers", "At least one passenger is required"));
    } else if forms.len() > MAX_PARTY_SIZE {
        errors.push(FieldError::new(
            "passengers",
            format!("At most {} passengers per booking", MAX_PARTY_SIZE),
        ));
    }

    for (i, form) in forms.iter().enumerate() {
        form.validate(&format!("passengers[{}]", i), &mut errors);
    }
    contact.validate(&mut errors);

    let infants = forms.iter().filter(|f| (0..=INFANT_MAX_AGE).contains(&f.age)).count();
    let adults = forms.iter().filter(|f| f.age >= ADULT_MIN_AGE).count();
    if infants > 0 && adults == 0 {
        errors.push(FieldError::new("passengers", "Infants must travel with an adult"));
    } else if infants > adults {
        errors.push(FieldError::new("passengers", "Each infant needs an accompanying adult"));
    }

    ValidationErrors::into_result(errors)
}

pub fn validate_name(name: &str) -> Result<(), &'static str> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    if len < 2 {
        return Err("Name is too short");
    }
    if len > 60 {
        return Err("Name is too long");
    }
    if !trimmed
        .chars()
        .all(|c| c.is_alphabetic() || c == ' ' || c == '.' || c == '\'' || c == '-')
    {
        return Err("Name may only contain letters, spaces, dots, apostrophes and hyphens");
    }
    if !trimmed.chars().any(|c| c.is_alphabetic()) {
        return Err("Name must contain letters");
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), &'static str> {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return Err("Email must contain @");
    };
    if local.is_empty() || domain.contains('@') || email.contains(char::is_whitespace) {
        return Err("Email is malformed");
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err("Email domain is malformed");
    }
    Ok(())
}

pub fn normalize_phone(phone: &str) -> String {
    phone.trim().chars().filter(|c| *c != ' ' && *c != '-').collect()
}

pub fn validate_phone(phone: &str) -> Result<(), &'static str> {
    let normalized = normalize_phone(phone);
    let digits = normalized.strip_prefix('+').unwrap_or(&normalized);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err("Phone number may only contain digits");
    }
    if !(10..=15).contains(&digits.len()) {
        return Err("Phone number must have 10 to 15 digits");
    }
    Ok(())
}

pub fn validate_document(doc_type: DocumentType, number: &str) -> Result<(), &'static str> {
    let number = number.trim();
    if !number.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("Document number must be alphanumeric");
    }
    let range = match doc_type {
        DocumentType::Passport => 6..=9,
        DocumentType::NationalId => 4..=20,
    };
    if !range.contains(&number.len()) {
        return Err(match doc_type {
            DocumentType::Passport => "Passport number must have 6 to 9 characters",
            DocumentType::NationalId => "National ID must have 4 to 20 characters",
        });
    }
    Ok(())
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adult(name: &str) -> PassengerForm {
        PassengerForm {
            full_name: name.to_string(),
            age: 34,
            gender: Gender::Female,
            document_type: Some(DocumentType::Passport),
            document_number: Some("K1234567".to_string()),
            nationality: Some("IN".to_string()),
        }
    }

    fn contact() -> ContactForm {
        ContactForm { email: "asha@example.com".to_string(), phone: "+91 98765-43210".to_string() }
    }

    #[test]
    fn test_valid_party_passes() {
        let forms = vec![adult("Asha Rao"), adult("D'Souza-Menon")];
        assert!(validate_party(&forms, &contact()).is_ok());
    }

    #[test]
    fn test_names() {
        assert!(validate_name("Jo").is_ok());
        assert!(validate_name("Dr. K. Iyer").is_ok());
        assert!(validate_name("A").is_err());
        assert!(validate_name("R2D2").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name(&"a".repeat(61)).is_err());
    }

    #[test]
    fn test_emails() {
        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email("ab.co").is_err());
        assert!(validate_email("@b.co").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("a@b..co").is_err());
        assert!(validate_email("a@@b.co").is_err());
    }

    #[test]
    fn test_phones() {
        assert!(validate_phone("9876543210").is_ok());
        assert!(validate_phone("+91 98765 43210").is_ok());
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("98765abc10").is_err());
        assert!(validate_phone("+").is_err());
    }

    #[test]
    fn test_documents() {
        assert!(validate_document(DocumentType::Passport, "K1234567").is_ok());
        assert!(validate_document(DocumentType::Passport, "K12").is_err());
        assert!(validate_document(DocumentType::NationalId, "1234-5678").is_err());
        assert!(validate_document(DocumentType::NationalId, "123456789012").is_ok());
    }

    #[test]
    fn test_reports_all_errors_with_field_paths() {
        let mut bad = adult("X");
        bad.age = 130;
        bad.document_number = None;
        let bad_contact = ContactForm { email: "nope".to_string(), phone: "1".to_string() };

        let err = validate_party(&[bad], &bad_contact).unwrap_err();
        assert!(err.has_field("passengers[0].full_name"));
        assert!(err.has_field("passengers[0].age"));
        assert!(err.has_field("passengers[0].document_number"));
        assert!(err.has_field("contact.email"));
        assert!(err.has_field("contact.phone"));
    }

    #[test]
    fn test_party_size_limits() {
        assert!(validate_party(&[], &contact()).unwrap_err().has_field("passengers"));
        let crowd: Vec<PassengerForm> = (0..10).map(|_| adult("Asha Rao")).collect();
        assert!(validate_party(&crowd, &contact()).is_err());
    }

    #[test]
    fn test_infant_requires_adult() {
        let mut infant = adult("Baby Rao");
        infant.age = 1;
        infant.document_type = None;
        infant.document_number = None;

        assert!(validate_party(&[infant.clone()], &contact()).is_err());
        assert!(validate_party(&[adult("Asha Rao"), infant.clone()], &contact()).is_ok());
        assert!(validate_party(&[adult("Asha Rao"), infant.clone(), infant], &contact()).is_err());
    }

    #[test]
    fn test_into_passenger_normalizes() {
        let mut form = adult("  Asha   Rao ");
        form.document_number = Some("k1234567".to_string());
        let booking_id = Uuid::new_v4();
        let pax = form.into_passenger(booking_id, 0, Some(&contact()));
        assert_eq!(pax.full_name, "Asha Rao");
        assert_eq!(pax.booking_id, booking_id);
        assert_eq!(pax.phone.unwrap().into_inner(), "+919876543210");
        assert_eq!(pax.document_number.unwrap().into_inner(), "K1234567");
    }
}
