//! Mathematical primitives for SCPN UQ Core.

pub mod basis;
pub mod quadrature;
pub mod reliability;
pub mod special;
