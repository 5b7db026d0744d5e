//! Parses a camt.054 debit/credit notification (spec.md §4.3): booked
//! entries become reversals, incoming payments, or outgoing payments
//! depending on `RvslInd`/`CdtDbtInd`. A currency mismatch fails only the
//! offending entry (`xml-parse`, per-entry-skip — SPEC_FULL.md §3), not the
//! whole notification; skipped entries are logged via `tracing::warn!`.

use chrono::NaiveDate;
use nexus_persistence::{Amount, IncomingPayment, OutgoingPayment, Payto};
use nexus_xml::{parse, AsRoot, Destructor, XmlError};

use crate::error::Iso20022Error;

#[derive(Debug, Clone)]
pub struct ReversalRecord {
    pub message_id: String,
    pub additional_info: Option<String>,
    pub booking_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub enum CamtRecord {
    Reversal(ReversalRecord),
    Incoming(IncomingPayment),
    Outgoing(OutgoingPayment),
}

pub fn parse_camt054(xml: &str, configured_currency: &str) -> Result<Vec<CamtRecord>, Iso20022Error> {
    let doc = parse(xml)?;
    let notification = doc.root().one("Ntfctn")?;

    let mut records = Vec::new();
    notification.each::<Iso20022Error>("Ntry", |entry| {
        if !is_booked(entry)? {
            return Ok(());
        }
        let booking_date = entry.one("BookgDt")?.one("Dt")?.date()?;
        let (entry_value, entry_currency) = entry_amount(entry)?;

        let tx_details = match entry.opt("NtryDtls")? {
            Some(details) => details.map("TxDtls", |tx| Ok::<_, XmlError>(tx))?,
            None => Vec::new(),
        };

        for tx in tx_details {
            match parse_one_transaction(tx, booking_date, &entry_value, &entry_currency, configured_currency) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "skipping camt.054 entry");
                }
            }
        }
        Ok(())
    })?;

    Ok(records)
}

fn is_booked(entry: Destructor<'_>) -> Result<bool, Iso20022Error> {
    let Some(sts) = entry.opt("Sts")? else { return Ok(false) };
    let code = match sts.opt("Cd")? {
        Some(cd) => cd.text()?,
        None => sts.text()?,
    };
    Ok(code == "BOOK")
}

fn entry_amount(entry: Destructor<'_>) -> Result<(String, String), Iso20022Error> {
    let amt = entry.one("Amt")?;
    Ok((amt.text()?, amt.attr("Ccy")?))
}

fn parse_one_transaction(
    tx: Destructor<'_>,
    booking_date: NaiveDate,
    entry_value: &str,
    entry_currency: &str,
    configured_currency: &str,
) -> Result<Option<CamtRecord>, Iso20022Error> {
    if entry_currency != configured_currency {
        return Err(Iso20022Error::CurrencyMismatch {
            entry_currency: entry_currency.to_string(),
            configured: configured_currency.to_string(),
        });
    }
    let amount = Amount::parse(&format!("{configured_currency}:{entry_value}"))?;
    let execution_time = booking_date.and_hms_opt(0, 0, 0).expect("midnight is always valid").and_utc();

    let credit_debit = tx.one("CdtDbtInd")?.text()?;
    let is_reversal = tx.opt("RvslInd")?.map(|n| n.bool()).transpose()?.unwrap_or(false);

    if is_reversal && credit_debit == "CRDT" {
        let message_id = tx.one("Refs")?.one("MsgId")?.text()?;
        let additional_info = tx.opt("AddtlNtryInf")?.map(|n| n.text()).transpose()?;
        return Ok(Some(CamtRecord::Reversal(ReversalRecord { message_id, additional_info, booking_date })));
    }

    if credit_debit == "CRDT" {
        let bank_id = tx.one("Refs")?.one("AcctSvcrRef")?.text()?;
        let debtor_payto = build_debtor_payto(tx)?;
        let subject = remittance_subject(tx)?;
        return Ok(Some(CamtRecord::Incoming(IncomingPayment {
            amount,
            debtor_payto,
            subject,
            execution_time,
            bank_id,
        })));
    }

    if credit_debit == "DBIT" {
        let message_id = tx.one("Refs")?.one("MsgId")?.text()?;
        return Ok(Some(CamtRecord::Outgoing(OutgoingPayment {
            amount,
            execution_time,
            message_id,
            creditor_payto: None,
        })));
    }

    Ok(None)
}

fn build_debtor_payto(tx: Destructor<'_>) -> Result<Payto, Iso20022Error> {
    let related = tx.one("RltdPties")?;
    let iban = related.one("DbtrAcct")?.one("Id")?.one("IBAN")?.text()?;
    let receiver_name = related
        .opt("Dbtr")?
        .and_then(|d| d.opt("Pty").ok().flatten())
        .and_then(|p| p.opt("Nm").ok().flatten())
        .map(|n| n.text())
        .transpose()?;
    Ok(Payto { method: "iban".to_string(), bic: None, iban, receiver_name })
}

fn remittance_subject(tx: Destructor<'_>) -> Result<String, Iso20022Error> {
    let parts = tx
        .opt("RmtInf")?
        .map(|r| r.map("Ustrd", |u| u.text()))
        .transpose()?
        .unwrap_or_default();
    Ok(parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(cdt_dbt: &str, rvsl: &str, extra: &str) -> String {
        format!(
            r#"<Ntry>
  <Amt Ccy="EUR">5.00</Amt>
  <Sts><Cd>BOOK</Cd></Sts>
  <BookgDt><Dt>2024-03-01</Dt></BookgDt>
  <NtryDtls>
    <TxDtls>
      <Refs><MsgId>MSG-1</MsgId><AcctSvcrRef>REF-1</AcctSvcrRef></Refs>
      <CdtDbtInd>{cdt_dbt}</CdtDbtInd>
      <RvslInd>{rvsl}</RvslInd>
      {extra}
    </TxDtls>
  </NtryDtls>
</Ntry>"#
        )
    }

    fn wrap(entry_xml: &str) -> String {
        format!(r#"<?xml version="1.0"?><Document><Ntfctn>{entry_xml}</Ntfctn></Document>"#)
    }

    #[test]
    fn incoming_credit_entry_becomes_an_incoming_payment() {
        let extra = r#"<RltdPties><DbtrAcct><Id><IBAN>CH9300762011623852957</IBAN></Id></DbtrAcct></RltdPties>
        <RmtInf><Ustrd>hello</Ustrd></RmtInf>"#;
        let xml = wrap(&entry("CRDT", "false", extra));
        let records = parse_camt054(&xml, "EUR").unwrap();
        assert_eq!(records.len(), 1);
        match &records[0] {
            CamtRecord::Incoming(p) => {
                assert_eq!(p.bank_id, "REF-1");
                assert_eq!(p.debtor_payto.iban, "CH9300762011623852957");
                assert_eq!(p.subject, "hello");
            }
            other => panic!("expected Incoming, got {other:?}"),
        }
    }

    #[test]
    fn reversal_on_a_credit_entry_is_kept_separate_from_incoming() {
        let xml = wrap(&entry("CRDT", "true", "<AddtlNtryInf>refund</AddtlNtryInf>"));
        let records = parse_camt054(&xml, "EUR").unwrap();
        assert_eq!(records.len(), 1);
        match &records[0] {
            CamtRecord::Reversal(r) => {
                assert_eq!(r.message_id, "MSG-1");
                assert_eq!(r.additional_info.as_deref(), Some("refund"));
            }
            other => panic!("expected Reversal, got {other:?}"),
        }
    }

    #[test]
    fn debit_entry_becomes_an_outgoing_payment() {
        let xml = wrap(&entry("DBIT", "false", ""));
        let records = parse_camt054(&xml, "EUR").unwrap();
        assert_eq!(records.len(), 1);
        assert!(matches!(&records[0], CamtRecord::Outgoing(p) if p.message_id == "MSG-1"));
    }

    #[test]
    fn currency_mismatch_skips_only_that_entry() {
        let matching = entry("DBIT", "false", "");
        let mismatched = matching.replace(r#"Ccy="EUR""#, r#"Ccy="CHF""#);
        let xml = wrap(&format!("{mismatched}{matching}"));
        let records = parse_camt054(&xml, "EUR").unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn entries_not_booked_are_skipped_entirely() {
        let xml = wrap(
            r#"<Ntry><Amt Ccy="EUR">5.00</Amt><Sts><Cd>PDNG</Cd></Sts><BookgDt><Dt>2024-03-01</Dt></BookgDt></Ntry>"#,
        );
        let records = parse_camt054(&xml, "EUR").unwrap();
        assert!(records.is_empty());
    }
}
