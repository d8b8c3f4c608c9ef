//! Root crate facade for the coedit engine and its control bus.

pub use coedit_bus as bus;
pub use coedit_core::{
    buffer, changelog, config, constants, engine, error, locks, models, transaction,
};

pub use coedit_bus::{BusClient, BusError, BusHost, Command, HostHandle, StreamFilter};
pub use coedit_core::{
    Config, Document, DocumentEvent, DocumentSnapshot, EngineError, ErrorKind, MutationOutcome,
    RopeBuffer, TextBuffer, UserId,
};
