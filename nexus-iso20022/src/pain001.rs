//! pain.001.001.09 emission, one credit transfer per message (spec.md
//! §4.3). Field values that the spec fixes to a constant ("NOTPROVIDED",
//! `PmtMtd=TRF`, `BtchBookg=false`) are written literally rather than made
//! configurable — there is nothing to configure.

use chrono::SecondsFormat;
use nexus_persistence::InitiatedPayment;
use nexus_xml::Builder;

use crate::error::Iso20022Error;

const SCHEMA_LOCATION: &str = "urn:iso:std:iso:20022:tech:xsd:pain.001.001.09 pain.001.001.09.ch.03.xsd";
const XMLNS: &str = "urn:iso:std:iso:20022:tech:xsd:pain.001.001.09";
const XMLNS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// The debtor-side account details a pain.001 message needs, supplied by
/// configuration (spec.md §6: "IBAN/BIC/name of own account") rather than
/// being part of the `InitiatedPayment` record itself.
pub struct OwnAccount {
    pub iban: String,
    pub bic: Option<String>,
    pub name: String,
}

pub fn emit_pain001(payment: &InitiatedPayment, own_account: &OwnAccount) -> Result<Vec<u8>, Iso20022Error> {
    let creditor_name = payment
        .creditor_payto
        .receiver_name
        .as_deref()
        .ok_or_else(|| Iso20022Error::MissingCreditorName(payment.request_uid.clone()))?;

    let mut builder = Builder::new("Document");
    builder.root_attr("xmlns", XMLNS);
    builder.root_attr("xmlns:xsi", XMLNS_XSI);
    builder.root_attr("xsi:schemaLocation", SCHEMA_LOCATION);

    {
        let mut grp_hdr = builder.el("CstmrCdtTrfInitn/GrpHdr");
        grp_hdr.el("MsgId").text(payment.request_uid.clone());
        grp_hdr.el("CreDtTm").text(payment.initiation_time.to_rfc3339_opts(SecondsFormat::Secs, true));
        grp_hdr.el("NbOfTxs").text("1");
        grp_hdr.el("CtrlSum").text(payment.amount.to_decimal_string(2));
    }

    let mut pmt_inf = builder.el("CstmrCdtTrfInitn/PmtInf");
    pmt_inf.el("PmtInfId").text("NOTPROVIDED");
    pmt_inf.el("PmtMtd").text("TRF");
    pmt_inf.el("BtchBookg").text("false");
    pmt_inf
        .el("ReqdExctnDt")
        .el("Dt")
        .text(payment.initiation_time.date_naive().to_string());
    pmt_inf.el("Dbtr").el("Nm").text(own_account.name.clone());
    pmt_inf.el("DbtrAcct/Id").el("IBAN").text(own_account.iban.clone());
    if let Some(bic) = &own_account.bic {
        pmt_inf.el("DbtrAgt/FinInstnId").el("BICFI").text(bic.clone());
    }

    {
        let mut tx_inf = pmt_inf.el("CdtTrfTxInf");
        tx_inf.el("PmtId/InstrId").text("NOTPROVIDED");
        tx_inf.el("PmtId/EndToEndId").text("NOTPROVIDED");
        tx_inf
            .el("Amt/InstdAmt")
            .attr("Ccy", payment.amount.currency.clone())
            .text(payment.amount.to_decimal_string(2));
        tx_inf.el("Cdtr/Nm").text(creditor_name.to_string());
        tx_inf.el("CdtrAcct/Id").el("IBAN").text(payment.creditor_payto.iban.clone());
        tx_inf.el("RmtInf/Ustrd").text(payment.subject.clone());
    }

    Ok(builder.build().to_xml_document())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nexus_persistence::{Amount, InitiatedId, Payto, SubmissionState};

    fn sample_payment() -> InitiatedPayment {
        InitiatedPayment {
            id: InitiatedId(1),
            amount: Amount::parse("EUR:1.00").unwrap(),
            creditor_payto: Payto::parse("payto://iban/CH9300762011623852958?receiver-name=Creditor%20Name")
                .unwrap(),
            subject: "S".to_string(),
            initiation_time: Utc::now(),
            request_uid: "U".to_string(),
            submission_state: SubmissionState::Unsubmitted,
            last_submission_time: None,
            failure_message: None,
            order_id: None,
            submission_counter: 0,
        }
    }

    #[test]
    fn emits_exactly_one_credit_transfer_with_required_fields() {
        let own_account = OwnAccount { iban: "CH1234567890".to_string(), bic: None, name: "Debtor".to_string() };
        let xml = String::from_utf8(emit_pain001(&sample_payment(), &own_account).unwrap()).unwrap();

        assert_eq!(xml.matches("<CdtTrfTxInf>").count(), 1);
        assert!(xml.contains("<MsgId>U</MsgId>"));
        assert!(xml.contains("<CtrlSum>1.00</CtrlSum>"));
        assert!(xml.contains("Ccy=\"EUR\">1.00</InstdAmt>"));
        assert!(xml.contains("<Nm>Creditor Name</Nm>"));
        assert!(xml.contains("<IBAN>CH9300762011623852958</IBAN>"));
        assert!(xml.contains("<Ustrd>S</Ustrd>"));
    }

    #[test]
    fn rejects_a_creditor_without_a_receiver_name() {
        let mut payment = sample_payment();
        payment.creditor_payto = Payto::parse("payto://iban/CH9300762011623852958").unwrap();
        let own_account = OwnAccount { iban: "CH1234567890".to_string(), bic: None, name: "Debtor".to_string() };
        assert!(matches!(emit_pain001(&payment, &own_account), Err(Iso20022Error::MissingCreditorName(_))));
    }
}
