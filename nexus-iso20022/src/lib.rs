//! ISO 20022 message codecs used at the EBICS boundary (spec.md §4.3): emits
//! pain.001 credit-transfer initiations and parses the three document types
//! the bank hands back — pain.002 HAC acknowledgements, pain.002 payment
//! status reports, and camt.054 debit/credit notifications.

pub mod camt054;
pub mod error;
pub mod pain001;
pub mod pain002_hac;
pub mod pain002_status;

pub use camt054::{parse_camt054, CamtRecord, ReversalRecord};
pub use error::Iso20022Error;
pub use pain001::{emit_pain001, OwnAccount};
pub use pain002_hac::{parse_hac, CustomerAck, HacAction};
pub use pain002_status::{parse_payment_status, PaymentStatusReport};
