use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::Decimal;

use super::types::{Record, normalize_tax_id};

/// Encode a record into the exact bytes its fingerprint is computed over.
///
/// `key=value` pairs in fixed order joined by `&`. Two records with the same
/// field values always encode to the same bytes, so any party holding the
/// record can recompute the chain.
pub fn canonicalize(record: &Record) -> Vec<u8> {
    let pairs: Vec<(&str, String)> = match record {
        Record::Registration(r) => vec![
            ("IDEmisorFactura", normalize_tax_id(&r.issuer.tax_id)),
            ("NumSerieFactura", r.number.trim().to_string()),
            ("FechaExpedicionFactura", format_date(&r.issue_date)),
            ("TipoFactura", r.invoice_type.code().to_string()),
            ("CuotaTotal", format_amount(r.total_tax)),
            ("ImporteTotal", format_amount(r.total_amount)),
            ("FechaHoraHusoGenRegistro", format_timestamp(&r.generated_at)),
        ],
        Record::Cancellation(c) => vec![
            ("IDEmisorFacturaAnulada", normalize_tax_id(&c.issuer.tax_id)),
            ("NumSerieFacturaAnulada", c.number.trim().to_string()),
            ("FechaExpedicionFacturaAnulada", format_date(&c.issue_date)),
            ("FechaHoraHusoGenRegistro", format_timestamp(&c.generated_at)),
        ],
    };

    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
        .into_bytes()
}

/// Format an amount: always include at least 2 decimal places,
/// strip trailing zeros beyond that.
pub fn format_amount(d: Decimal) -> String {
    let s = d.normalize().to_string();
    if let Some(dot_pos) = s.find('.') {
        let decimals = s.len() - dot_pos - 1;
        if decimals < 2 {
            format!("{s}{}", "0".repeat(2 - decimals))
        } else {
            s
        }
    } else {
        format!("{s}.00")
    }
}

/// Dates travel as `dd-mm-yyyy`.
pub fn format_date(date: &NaiveDate) -> String {
    date.format("%d-%m-%Y").to_string()
}

/// Generation timestamps travel as ISO 8601 with offset, second precision.
pub fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}
