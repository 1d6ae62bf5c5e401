//! Primitivas compartidas del backend VAS.
//!
//! Este crate contiene los tipos monetarios y de referencia que comparten
//! los servicios del workspace, sin dependencias de infraestructura.
//!
//! # Modules
//!
//! * `money` - Representación monetaria en kobo (unidades menores del Naira).
//! * `reference` - Generación de identificadores de idempotencia y referencias de cuenta.
//! * `phone` - Validación de números telefónicos nigerianos.

pub mod money;
pub mod phone;
pub mod reference;

pub use money::{Kobo, MoneyError};
