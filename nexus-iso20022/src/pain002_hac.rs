//! Parses the HAC variant of pain.002 — EBICS's log of subscriber/bank
//! actions (spec.md §4.3, glossary "HAC"). HAC is not itself a standard
//! ISO 20022 message; this parser follows the layout implied by the base
//! spec's field list: one `OrgnlPmtInfAndSts` per logged action, carrying
//! the action name, an optional originating order id, an optional reason
//! code, and a timestamp tucked into a keyed `Othr` entry under
//! `OrgId` (see SPEC_FULL.md §8 decision 7 for why this layout was chosen
//! over inventing a stricter one without a reference document to check
//! against).

use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use nexus_xml::{parse, AsRoot, Destructor};

use crate::error::Iso20022Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HacAction {
    FileUpload,
    FileDownload,
    EsUpload,
    EsDownload,
    EsVerification,
    /// Any `VEU_*` order type; the full action name is preserved since
    /// spec.md §4.3 only names the family, not an exhaustive enumeration.
    Veu(String),
    Additional,
    OrderHacFinalPos,
    OrderHacFinalNeg,
}

impl FromStr for HacAction {
    type Err = Iso20022Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "FILE_UPLOAD" => HacAction::FileUpload,
            "FILE_DOWNLOAD" => HacAction::FileDownload,
            "ES_UPLOAD" => HacAction::EsUpload,
            "ES_DOWNLOAD" => HacAction::EsDownload,
            "ES_VERIFICATION" => HacAction::EsVerification,
            "ADDITIONAL" => HacAction::Additional,
            "ORDER_HAC_FINAL_POS" => HacAction::OrderHacFinalPos,
            "ORDER_HAC_FINAL_NEG" => HacAction::OrderHacFinalNeg,
            other if other.starts_with("VEU_") => HacAction::Veu(other.to_string()),
            other => return Err(Iso20022Error::UnknownHacAction(other.to_string())),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerAck {
    pub action: HacAction,
    pub order_id: Option<String>,
    pub reason_code: Option<String>,
    pub timestamp: Option<DateTime<FixedOffset>>,
}

pub fn parse_hac(xml: &str) -> Result<Vec<CustomerAck>, Iso20022Error> {
    let doc = parse(xml)?;
    let report = doc.root().one("CstmrPmtStsRpt")?;
    report.map("OrgnlPmtInfAndSts", |entry| -> Result<CustomerAck, Iso20022Error> {
        let action = entry.one("OrgnlPmtInfId")?.text()?.parse::<HacAction>()?;
        let order_id = entry
            .opt("TxInfAndSts")?
            .and_then(|tx| tx.opt("OrgnlEndToEndId").ok().flatten())
            .map(|n| n.text())
            .transpose()?;
        let reason = entry
            .opt("StsRsnInf")?
            .and_then(|r| r.opt("Rsn").ok().flatten())
            .and_then(|r| r.opt("Cd").ok().flatten())
            .map(|c| c.text())
            .transpose()?;
        let timestamp = entry
            .opt("StsRsnInf")?
            .map(|r| extract_timestamp(r))
            .transpose()?
            .flatten();

        Ok(CustomerAck { action, order_id, reason_code: reason, timestamp })
    })
}

fn extract_timestamp(sts_rsn_inf: Destructor<'_>) -> Result<Option<DateTime<FixedOffset>>, Iso20022Error> {
    let Some(orgtr) = sts_rsn_inf.opt("Orgtr")? else { return Ok(None) };
    let Some(org_id) = orgtr.opt("Id")?.and_then(|id| id.opt("OrgId").ok().flatten()) else { return Ok(None) };

    let mut found = None;
    org_id.each::<Iso20022Error>("Othr", |othr| {
        let is_timestamp = othr
            .opt("SchmeNm")?
            .and_then(|s| s.opt("Prtry").ok().flatten())
            .map(|p| p.text())
            .transpose()?
            .as_deref()
            == Some("TimeStamp");
        if is_timestamp {
            found = Some(othr.one("Id")?.date_time()?);
        }
        Ok(())
    })?;
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<Document>
  <CstmrPmtStsRpt>
    <OrgnlPmtInfAndSts>
      <OrgnlPmtInfId>ORDER_HAC_FINAL_POS</OrgnlPmtInfId>
      <TxInfAndSts>
        <OrgnlEndToEndId>ORDER-1</OrgnlEndToEndId>
      </TxInfAndSts>
      <StsRsnInf>
        <Orgtr>
          <Id>
            <OrgId>
              <Othr>
                <Id>2024-03-01T10:15:00+01:00</Id>
                <SchmeNm><Prtry>TimeStamp</Prtry></SchmeNm>
              </Othr>
            </OrgId>
          </Id>
        </Orgtr>
        <Rsn><Cd>0</Cd></Rsn>
      </StsRsnInf>
    </OrgnlPmtInfAndSts>
    <OrgnlPmtInfAndSts>
      <OrgnlPmtInfId>FILE_UPLOAD</OrgnlPmtInfId>
    </OrgnlPmtInfAndSts>
  </CstmrPmtStsRpt>
</Document>"#;

    #[test]
    fn parses_entries_in_document_order() {
        let acks = parse_hac(SAMPLE).unwrap();
        assert_eq!(acks.len(), 2);
        assert_eq!(acks[0].action, HacAction::OrderHacFinalPos);
        assert_eq!(acks[0].order_id.as_deref(), Some("ORDER-1"));
        assert_eq!(acks[0].reason_code.as_deref(), Some("0"));
        assert_eq!(acks[0].timestamp.unwrap().to_rfc3339(), "2024-03-01T10:15:00+01:00");
        assert_eq!(acks[1].action, HacAction::FileUpload);
        assert!(acks[1].order_id.is_none());
    }

    #[test]
    fn veu_family_actions_retain_their_full_name() {
        assert_eq!("VEU_ORDER_ADD".parse::<HacAction>().unwrap(), HacAction::Veu("VEU_ORDER_ADD".to_string()));
    }

    #[test]
    fn rejects_an_unrecognized_action() {
        assert!("NOT_A_REAL_ACTION".parse::<HacAction>().is_err());
    }
}
