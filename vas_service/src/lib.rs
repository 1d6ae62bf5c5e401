//! Backend de billetera y servicios de valor agregado (VAS).
//!
//! Este crate es el núcleo del backend: los usuarios fondean una billetera
//! cerrada vía cuentas bancarias reservadas y gastan el saldo en airtime y
//! datos; cada movimiento se asienta en el ledger y en la contabilidad
//! corporativa.
//!
//! # Modules
//!
//! * `api` - Rutas HTTP (axum), mapeo de errores y envoltura de respuesta.
//! * `domain` - Entidades, reglas de negocio y puertos (repositorios y
//!   gateways de proveedor).
//! * `infrastructure` - Implementaciones concretas: PostgreSQL y clientes
//!   HTTP de Monnify/Peyflex.
//! * `use_cases` - Flujos de aplicación, uno por operación.
//! * `jobs` - Trabajo en segundo plano: workers de liquidación y barridos.

pub mod api;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod jobs;
pub mod use_cases;
