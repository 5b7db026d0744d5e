//! Parses a payment-status pain.002 (spec.md §4.3): a multi-level status
//! report where a transaction-level code overrides the payment-level code,
//! which in turn overrides the message-level code. This parser returns the
//! raw per-level data as received; `effective_code` applies the override
//! rule spec.md §4.3 describes.

use nexus_xml::{parse, AsRoot};

use crate::error::Iso20022Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentStatusReport {
    pub msg_id: String,
    pub payment_id: Option<String>,
    pub tx_id: Option<String>,
    pub payment_code: String,
    pub tx_code: Option<String>,
    pub reasons: Vec<String>,
}

impl PaymentStatusReport {
    /// The code that actually governs this report: tx-level if present,
    /// else the payment-level code.
    pub fn effective_code(&self) -> &str {
        self.tx_code.as_deref().unwrap_or(&self.payment_code)
    }
}

pub fn parse_payment_status(xml: &str) -> Result<PaymentStatusReport, Iso20022Error> {
    let doc = parse(xml)?;
    let report = doc.root().one("CstmrPmtStsRpt")?;

    let grp_info = report.one("OrgnlGrpInfAndSts")?;
    let msg_id = grp_info.one("OrgnlMsgId")?.text()?;
    let mut message_code = grp_info.opt("GrpSts")?.map(|n| n.text()).transpose()?;
    let mut reasons = reason_codes(grp_info)?;

    let mut payment_id = None;
    let mut tx_id = None;
    let mut tx_code = None;

    if let Some(pmt_info) = report.opt("OrgnlPmtInfAndSts")? {
        payment_id = pmt_info.opt("OrgnlPmtInfId")?.map(|n| n.text()).transpose()?;
        if let Some(pmt_sts) = pmt_info.opt("TxSts")? {
            message_code = Some(pmt_sts.text()?);
        }
        reasons.extend(reason_codes(pmt_info)?);

        if let Some(tx_info) = pmt_info.opt("TxInfAndSts")? {
            tx_id = tx_info.opt("OrgnlEndToEndId")?.map(|n| n.text()).transpose()?;
            if let Some(tx_sts) = tx_info.opt("TxSts")? {
                tx_code = Some(tx_sts.text()?);
            }
            reasons.extend(reason_codes(tx_info)?);
        }
    }

    let payment_code = message_code.ok_or_else(|| {
        Iso20022Error::Xml(nexus_xml::XmlError::BadContent {
            path: "CstmrPmtStsRpt".to_string(),
            expected: "a message- or payment-level status code",
            content: String::new(),
        })
    })?;

    Ok(PaymentStatusReport { msg_id, payment_id, tx_id, payment_code, tx_code, reasons })
}

fn reason_codes(node: nexus_xml::Destructor<'_>) -> Result<Vec<String>, Iso20022Error> {
    node.map("StsRsnInf", |rsn_inf| -> Result<Option<String>, Iso20022Error> {
        rsn_inf.opt("Rsn")?.and_then(|r| r.opt("Cd").ok().flatten()).map(|c| c.text()).transpose().map_err(Into::into)
    })
    .map(|codes| codes.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_level_code_overrides_payment_and_message_level() {
        let xml = r#"<?xml version="1.0"?>
<Document>
  <CstmrPmtStsRpt>
    <OrgnlGrpInfAndSts>
      <OrgnlMsgId>MSG-1</OrgnlMsgId>
      <GrpSts>ACTC</GrpSts>
    </OrgnlGrpInfAndSts>
    <OrgnlPmtInfAndSts>
      <OrgnlPmtInfId>PMT-1</OrgnlPmtInfId>
      <TxSts>ACSP</TxSts>
      <TxInfAndSts>
        <OrgnlEndToEndId>E2E-1</OrgnlEndToEndId>
        <TxSts>RJCT</TxSts>
        <StsRsnInf><Rsn><Cd>AC04</Cd></Rsn></StsRsnInf>
      </TxInfAndSts>
    </OrgnlPmtInfAndSts>
  </CstmrPmtStsRpt>
</Document>"#;
        let report = parse_payment_status(xml).unwrap();
        assert_eq!(report.msg_id, "MSG-1");
        assert_eq!(report.payment_id.as_deref(), Some("PMT-1"));
        assert_eq!(report.tx_id.as_deref(), Some("E2E-1"));
        assert_eq!(report.payment_code, "ACSP");
        assert_eq!(report.tx_code.as_deref(), Some("RJCT"));
        assert_eq!(report.effective_code(), "RJCT");
        assert_eq!(report.reasons, vec!["AC04".to_string()]);
    }

    #[test]
    fn falls_back_to_message_level_code_when_nothing_more_specific_exists() {
        let xml = r#"<?xml version="1.0"?>
<Document>
  <CstmrPmtStsRpt>
    <OrgnlGrpInfAndSts>
      <OrgnlMsgId>MSG-2</OrgnlMsgId>
      <GrpSts>RJCT</GrpSts>
    </OrgnlGrpInfAndSts>
  </CstmrPmtStsRpt>
</Document>"#;
        let report = parse_payment_status(xml).unwrap();
        assert_eq!(report.effective_code(), "RJCT");
        assert!(report.payment_id.is_none());
    }
}
