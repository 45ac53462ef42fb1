use rust_decimal::Decimal;

use super::error::ValidationError;
use super::tax_id::is_valid_tax_id;
use super::types::*;

/// Maximum length of NumSerieFactura.
pub const MAX_NUMBER_LEN: usize = 60;
/// Maximum length of DescripcionOperacion.
pub const MAX_DESCRIPTION_LEN: usize = 500;
/// Maximum length of NombreRazon.
pub const MAX_NAME_LEN: usize = 120;

/// Rounding tolerance accepted between the line sum and the declared totals.
const TOTAL_TOLERANCE: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

/// Run the pre-submission checks on a record.
///
/// Returns every problem found; an empty vector means the record may be
/// chained and sent. Only structural rules are enforced here; the
/// authority remains the judge of tax-law correctness.
pub fn validate_record(record: &Record) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    validate_issuer(record.issuer(), &mut errors);

    match record {
        Record::Registration(r) => validate_registration(r, &mut errors),
        Record::Cancellation(c) => validate_number(&c.number, &mut errors),
    }

    errors
}

fn validate_issuer(issuer: &Issuer, errors: &mut Vec<ValidationError>) {
    if !is_valid_tax_id(&issuer.tax_id) {
        errors.push(ValidationError::with_rule(
            "issuer.tax_id",
            format!("'{}' is not a valid NIF", issuer.tax_id),
            "4109",
        ));
    }
    if issuer.name.trim().is_empty() {
        errors.push(ValidationError::new("issuer.name", "must not be empty"));
    } else if issuer.name.chars().count() > MAX_NAME_LEN {
        errors.push(ValidationError::new(
            "issuer.name",
            format!("exceeds {MAX_NAME_LEN} characters"),
        ));
    }
}

fn validate_number(number: &str, errors: &mut Vec<ValidationError>) {
    let number = number.trim();
    if number.is_empty() {
        errors.push(ValidationError::new("number", "must not be empty"));
    } else if number.chars().count() > MAX_NUMBER_LEN {
        errors.push(ValidationError::new(
            "number",
            format!("exceeds {MAX_NUMBER_LEN} characters"),
        ));
    }
}

fn validate_registration(r: &InvoiceRecord, errors: &mut Vec<ValidationError>) {
    validate_number(&r.number, errors);

    if r.description.trim().is_empty() {
        errors.push(ValidationError::new("description", "must not be empty"));
    } else if r.description.chars().count() > MAX_DESCRIPTION_LEN {
        errors.push(ValidationError::new(
            "description",
            format!("exceeds {MAX_DESCRIPTION_LEN} characters"),
        ));
    }

    if r.issue_date > r.generated_at.date_naive() {
        errors.push(ValidationError::new(
            "issue_date",
            "must not be after the record generation date",
        ));
    }

    match &r.recipient {
        Some(_) if !r.invoice_type.allows_recipient() => {
            errors.push(ValidationError::new(
                "recipient",
                format!("not allowed on {} invoices", r.invoice_type.code()),
            ));
        }
        Some(recipient) if !is_valid_tax_id(&recipient.tax_id) => {
            errors.push(ValidationError::with_rule(
                "recipient.tax_id",
                format!("'{}' is not a valid NIF", recipient.tax_id),
                "4109",
            ));
        }
        None if r.invoice_type == InvoiceType::Complete => {
            errors.push(ValidationError::new(
                "recipient",
                "required on F1 invoices",
            ));
        }
        _ => {}
    }

    if r.lines.is_empty() {
        errors.push(ValidationError::new("lines", "at least one breakdown line is required"));
        return;
    }

    let line_tax: Decimal = r.lines.iter().map(|l| l.tax).sum();
    let line_total: Decimal = r.lines.iter().map(|l| l.base + l.tax).sum();
    if (line_tax - r.total_tax).abs() > TOTAL_TOLERANCE {
        errors.push(ValidationError::new(
            "total_tax",
            format!("{} does not match breakdown sum {}", r.total_tax, line_tax),
        ));
    }
    if (line_total - r.total_amount).abs() > TOTAL_TOLERANCE {
        errors.push(ValidationError::new(
            "total_amount",
            format!("{} does not match breakdown sum {}", r.total_amount, line_total),
        ));
    }
}
