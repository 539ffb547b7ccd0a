//! Registration workflow domain layer: entities, state machines, validation

pub mod entities;
pub mod state;
pub mod validation;
