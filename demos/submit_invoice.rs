//! Submit one invoice to the AEAT sandbox.
//!
//! ```sh
//! VERIFACTU_IDENTITY=certs/representante.pem RUST_LOG=verifactu=debug \
//!     cargo run --example submit_invoice
//! ```

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use rust_decimal_macros::dec;
use verifactu::chain::ChainSeed;
use verifactu::client::*;
use verifactu::core::*;
use verifactu::soap::{ClientIdentity, Endpoint, HttpTransport, StatusQuery};

#[tokio::main]
async fn main() -> Result<(), VerifactuError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let identity_path = std::env::var("VERIFACTU_IDENTITY")
        .map_err(|_| VerifactuError::Config("set VERIFACTU_IDENTITY to a PEM bundle".into()))?;
    let identity = ClientIdentity::from_pem_file(identity_path)?;

    let config = ClientConfig::new().with_endpoint(Endpoint::Sandbox);
    // keep a handle on the transport so the certificate can be rotated later
    let transport = Arc::new(HttpTransport::new(config.endpoint.url(), &identity)?);
    let client = VerifactuClient::new(config, transport.clone())
        .with_store(Arc::new(JsonFileChainStore::new("state/chains")));

    let issuer = Issuer::new("B12345674", "Empresa Ejemplo SL");
    if client.checkpoint(&issuer.tax_id).await?.is_none() {
        client.seed(&issuer.tax_id, ChainSeed::Genesis).await?;
    }

    let now = Local::now().fixed_offset();
    let today: NaiveDate = now.date_naive();
    let invoice = InvoiceRecord::new(
        issuer.clone(),
        format!("DEMO-{}", now.format("%Y%m%d%H%M%S")),
        today,
        "Servicios de consultoría",
        now,
    )
    .recipient("12345678Z", "Cliente SA")
    .add_line(TaxLine::general(dec!(21), dec!(100), dec!(21)));

    let report = client.submit(invoice).await?;
    println!(
        "record #{} after {} attempt(s) in {:?}",
        report.sequence_index, report.attempts, report.elapsed
    );
    match &report.outcome {
        SubmissionOutcome::Accepted(receipt) => {
            println!("accepted, CSV {:?}", receipt.csv);
            if let Some((code, description)) = &receipt.warning {
                println!("warning {code}: {description}");
            }
        }
        SubmissionOutcome::Rejected { code, description } => {
            println!("rejected {code}: {description}");
        }
        SubmissionOutcome::Failed(err) => {
            println!("failed ({}): {err}", err.kind());
        }
    }

    let query = StatusQuery::for_record(issuer, report.record.number.clone(), today);
    let status = client.check_status(&query).await?;
    println!("status query: {:?}", status.outcome);

    transport.replace_identity(&identity)?;
    Ok(())
}
