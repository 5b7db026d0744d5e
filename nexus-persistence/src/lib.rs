//! The shared data model (spec.md §3) and the typed persistence port
//! consumed by the core (spec.md §4.7, §9). Concrete Postgres DAOs are an
//! external collaborator; `memory::InMemoryStore` is the in-memory
//! reference implementation used by tests elsewhere in this workspace.

pub mod amount;
pub mod clock;
pub mod dialect;
pub mod error;
pub mod memory;
pub mod model;
pub mod payto;
pub mod port;

pub use amount::Amount;
pub use clock::{Clock, FixedClock, SystemClock};
pub use dialect::BankDialect;
pub use error::{AmountError, PaytoError, PersistenceError};
pub use memory::InMemoryStore;
pub use model::{
    find_reserve_pubkey, BounceId, IncomingClassification, IncomingPayment, InitiatedId, InitiatedPayment,
    NewInitiatedPayment, OutgoingPayment, PaymentId, SubmissionState, BOUNCE_GRACE_PERIOD,
};
pub use payto::Payto;
pub use port::{
    CreateInitiatedOutcome, InitiatedPort, PaymentPort, RegisterBounceOutcome, RegisterIncomingOutcome,
    RegisterOutgoingOutcome,
};
