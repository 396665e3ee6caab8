//! Event processors.
//!
//! - `CoordinatorService`: receives `CoordinatorEvent`, owns the coordinator,
//!   emits `LedgerJob`
//! - `SettlementDispatcher`: receives `LedgerJob`, calls the `LedgerGateway`,
//!   emits `CoordinatorEvent::LedgerFinished`
//! - `CoordinatorHandle`: query and connection front door used by the
//!   transport

pub mod coordinator_service;
pub mod handle;
pub mod ledger;
pub mod settlement_dispatcher;

pub use coordinator_service::CoordinatorService;
pub use handle::{ConfirmationError, CoordinatorHandle, CoordinatorUnavailable, GetMatch, GetStats};
pub use ledger::{HttpLedgerGateway, LedgerError, LedgerGateway, LoggingLedgerGateway};
pub use settlement_dispatcher::SettlementDispatcher;
