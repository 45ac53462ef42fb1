use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The taxpayer on whose behalf records are issued and chained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    /// NIF of the issuer (the chain's scoping key).
    pub tax_id: String,
    /// Registered name (NombreRazon).
    pub name: String,
}

impl Issuer {
    pub fn new(tax_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tax_id: normalize_tax_id(&tax_id.into()),
            name: name.into(),
        }
    }
}

/// Wire form of a NIF: trimmed, ASCII uppercase.
pub fn normalize_tax_id(tax_id: &str) -> String {
    tax_id.trim().to_ascii_uppercase()
}

/// Invoice recipient (Destinatario).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub tax_id: String,
    pub name: String,
}

/// TipoFactura — kind of invoice being registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvoiceType {
    /// F1: complete invoice.
    Complete,
    /// F2: simplified invoice (ticket).
    Simplified,
    /// F3: complete invoice replacing simplified ones.
    Replacement,
    /// R1: corrective invoice (art. 80.1, 80.2 and error in law).
    CorrectiveR1,
    /// R2: corrective invoice (art. 80.3).
    CorrectiveR2,
    /// R3: corrective invoice (art. 80.4).
    CorrectiveR3,
    /// R4: corrective invoice (other causes).
    CorrectiveR4,
    /// R5: corrective simplified invoice.
    CorrectiveR5,
}

impl InvoiceType {
    /// Wire code used in `TipoFactura`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Complete => "F1",
            Self::Simplified => "F2",
            Self::Replacement => "F3",
            Self::CorrectiveR1 => "R1",
            Self::CorrectiveR2 => "R2",
            Self::CorrectiveR3 => "R3",
            Self::CorrectiveR4 => "R4",
            Self::CorrectiveR5 => "R5",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "F1" => Some(Self::Complete),
            "F2" => Some(Self::Simplified),
            "F3" => Some(Self::Replacement),
            "R1" => Some(Self::CorrectiveR1),
            "R2" => Some(Self::CorrectiveR2),
            "R3" => Some(Self::CorrectiveR3),
            "R4" => Some(Self::CorrectiveR4),
            "R5" => Some(Self::CorrectiveR5),
            _ => None,
        }
    }

    /// Simplified invoices carry no recipient.
    pub fn allows_recipient(&self) -> bool {
        !matches!(self, Self::Simplified | Self::CorrectiveR5)
    }
}

/// One line of the VAT breakdown (DetalleDesglose).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxLine {
    /// ClaveRegimen, e.g. "01" for the general regime.
    pub regime: String,
    /// CalificacionOperacion, e.g. "S1" for subject and not exempt.
    pub operation: String,
    /// TipoImpositivo in percent.
    pub rate: Decimal,
    /// BaseImponibleOimporteNoSujeto.
    pub base: Decimal,
    /// CuotaRepercutida.
    pub tax: Decimal,
}

impl TaxLine {
    /// General regime, subject and not exempt.
    pub fn general(rate: Decimal, base: Decimal, tax: Decimal) -> Self {
        Self {
            regime: "01".into(),
            operation: "S1".into(),
            rate,
            base,
            tax,
        }
    }
}

/// Identity of a record within an issuer's books: series number + issue date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub number: String,
    pub issue_date: NaiveDate,
}

/// Registration record (RegistroAlta).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub issuer: Issuer,
    /// NumSerieFactura.
    pub number: String,
    /// FechaExpedicionFactura.
    pub issue_date: NaiveDate,
    pub invoice_type: InvoiceType,
    /// DescripcionOperacion.
    pub description: String,
    pub recipient: Option<Recipient>,
    pub lines: Vec<TaxLine>,
    /// CuotaTotal.
    pub total_tax: Decimal,
    /// ImporteTotal.
    pub total_amount: Decimal,
    /// FechaHoraHusoGenRegistro, part of the fingerprinted content.
    pub generated_at: DateTime<FixedOffset>,
}

impl InvoiceRecord {
    /// Start a complete (F1) invoice with no lines and zero totals.
    pub fn new(
        issuer: Issuer,
        number: impl Into<String>,
        issue_date: NaiveDate,
        description: impl Into<String>,
        generated_at: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            issuer,
            number: number.into(),
            issue_date,
            invoice_type: InvoiceType::Complete,
            description: description.into(),
            recipient: None,
            lines: Vec::new(),
            total_tax: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            generated_at,
        }
    }

    pub fn invoice_type(mut self, invoice_type: InvoiceType) -> Self {
        self.invoice_type = invoice_type;
        self
    }

    pub fn recipient(mut self, tax_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.recipient = Some(Recipient {
            tax_id: tax_id.into(),
            name: name.into(),
        });
        self
    }

    /// Add a breakdown line and fold it into the totals.
    pub fn add_line(mut self, line: TaxLine) -> Self {
        self.total_tax += line.tax;
        self.total_amount += line.base + line.tax;
        self.lines.push(line);
        self
    }

    pub fn id(&self) -> RecordId {
        RecordId {
            number: self.number.trim().to_string(),
            issue_date: self.issue_date,
        }
    }
}

/// Cancellation record (RegistroAnulacion) for a previously registered invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationRecord {
    pub issuer: Issuer,
    /// NumSerieFactura of the invoice being cancelled.
    pub number: String,
    /// FechaExpedicionFactura of the invoice being cancelled.
    pub issue_date: NaiveDate,
    pub generated_at: DateTime<FixedOffset>,
}

impl CancellationRecord {
    pub fn new(
        issuer: Issuer,
        number: impl Into<String>,
        issue_date: NaiveDate,
        generated_at: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            issuer,
            number: number.into(),
            issue_date,
            generated_at,
        }
    }

    pub fn id(&self) -> RecordId {
        RecordId {
            number: self.number.trim().to_string(),
            issue_date: self.issue_date,
        }
    }
}

/// Anything that becomes a link in an issuer's chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Record {
    /// Alta.
    Registration(InvoiceRecord),
    /// Anulación.
    Cancellation(CancellationRecord),
}

impl Record {
    pub fn issuer(&self) -> &Issuer {
        match self {
            Self::Registration(r) => &r.issuer,
            Self::Cancellation(c) => &c.issuer,
        }
    }

    pub fn id(&self) -> RecordId {
        match self {
            Self::Registration(r) => r.id(),
            Self::Cancellation(c) => c.id(),
        }
    }

    pub fn generated_at(&self) -> DateTime<FixedOffset> {
        match self {
            Self::Registration(r) => r.generated_at,
            Self::Cancellation(c) => c.generated_at,
        }
    }

    /// The record as it is fingerprinted and sent: issuer NIF normalized,
    /// series number trimmed.
    pub fn normalized(mut self) -> Self {
        let (issuer, number) = match &mut self {
            Self::Registration(r) => (&mut r.issuer, &mut r.number),
            Self::Cancellation(c) => (&mut c.issuer, &mut c.number),
        };
        issuer.tax_id = normalize_tax_id(&issuer.tax_id);
        let trimmed = number.trim();
        if trimmed.len() != number.len() {
            *number = trimmed.to_string();
        }
        self
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Registration(_) => "alta",
            Self::Cancellation(_) => "anulacion",
        }
    }
}

impl From<InvoiceRecord> for Record {
    fn from(r: InvoiceRecord) -> Self {
        Self::Registration(r)
    }
}

impl From<CancellationRecord> for Record {
    fn from(c: CancellationRecord) -> Self {
        Self::Cancellation(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn add_line_accumulates_totals() {
        let at = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 11, 4, 10, 0, 0)
            .unwrap();
        let inv = InvoiceRecord::new(
            Issuer::new("b12345674", "Empresa"),
            "001",
            NaiveDate::from_ymd_opt(2024, 11, 4).unwrap(),
            "Venta",
            at,
        )
        .add_line(TaxLine::general(dec!(21), dec!(100), dec!(21)))
        .add_line(TaxLine::general(dec!(10), dec!(50), dec!(5)));

        assert_eq!(inv.issuer.tax_id, "B12345674");
        assert_eq!(inv.total_tax, dec!(26));
        assert_eq!(inv.total_amount, dec!(176));
    }

    #[test]
    fn invoice_type_codes() {
        for code in ["F1", "F2", "F3", "R1", "R2", "R3", "R4", "R5"] {
            assert_eq!(InvoiceType::from_code(code).unwrap().code(), code);
        }
        assert!(InvoiceType::from_code("X9").is_none());
        assert!(!InvoiceType::Simplified.allows_recipient());
    }

    #[test]
    fn normalized_record_matches_its_id() {
        let at = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 11, 4, 10, 0, 0)
            .unwrap();
        let mut cancel = CancellationRecord::new(
            Issuer::new("B12345674", "Empresa"),
            " 001 ",
            NaiveDate::from_ymd_opt(2024, 11, 4).unwrap(),
            at,
        );
        cancel.issuer.tax_id = " b12345674".into();

        let record = Record::from(cancel).normalized();
        assert_eq!(record.issuer().tax_id, "B12345674");
        assert_eq!(record.id().number, "001");
        let Record::Cancellation(c) = &record else {
            panic!("variant changed");
        };
        assert_eq!(c.number, "001");
    }
}
